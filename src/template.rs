//! Template rendering collaborator.
//!
//! The library ships no template engine. An [`Endpoint`](crate::Endpoint)
//! holds an optional shared renderer and hands the same reference to every
//! [`Response`](crate::Response) it creates.
//!
//! # Examples
//! ```
//! use gatekeeper::{template::{Context, TemplateRenderer}, Endpoint, Error};
//! use std::sync::Arc;
//!
//! struct Greeting;
//!
//! impl TemplateRenderer for Greeting {
//!     fn render(&self, name: &str, context: &Context) -> Result<String, Error> {
//!         match name {
//!             "hello.html" => Ok(format!(
//!                 "<h1>Hello {}</h1>",
//!                 context.get("name").map(String::as_str).unwrap_or("stranger")
//!             )),
//!             _ => Err(Error::Render(format!("unknown template {name:?}"))),
//!         }
//!     }
//! }
//!
//! let endpoint = Endpoint::new("/").unwrap().template_renderer(Arc::new(Greeting));
//! let context = Context::from([("name".to_owned(), "John".to_owned())]);
//!
//! assert_eq!(endpoint.render("hello.html", &context).unwrap(), "<h1>Hello John</h1>");
//! assert!(endpoint.render("missing.html", &context).is_err());
//! ```

use crate::Error;
use std::collections::HashMap;

/// Variables available to a template.
pub type Context = HashMap<String, String>;

/// Turns a named template and a context into text.
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, name: &str, context: &Context) -> Result<String, Error>;
}
