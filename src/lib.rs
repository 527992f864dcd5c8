//! gatekeeper - Small request-handling layer on top of a server gateway
//!
//! A hosting server hands every request over as a [`gateway::Environ`] and
//! gets back a status line, a header list and a [`gateway::Body`]. In
//! between, this crate gives application code a structured [`Request`], a
//! mutable [`Response`] and [`Endpoint`]s that bind a path pattern and a
//! set of method handlers with lifecycle hooks.
//!
//! # Features
//!
//! - **Path patterns** - `/users/:id` placeholders or explicit `^...` regular expressions
//! - **Lifecycle hooks** - `before_request`, `after_request` and `on_exception`
//! - **Early exit** - any phase can finish or replace the response with [`Halt`]
//! - **Cookies** - `Set-Cookie` builder, `Cookie` header parsing and read-once flash messages
//! - **File streaming** - file-backed bodies read lazily in fixed-size chunks
//! - **Configurable limits** - body size, query and cookie counts, chunk size
//!
//! Connection handling, TLS and concurrency belong to the hosting server.
//!
//! # Examples
//!
//! Quick start:
//! ```
//! use gatekeeper::{gateway::Environ, Endpoint};
//!
//! let endpoint = Endpoint::new("/hello/:name").unwrap().get(|req, resp| {
//!     resp.set_body("Hello, ").write(req.arg("name").unwrap_or("stranger"));
//!     Ok(())
//! });
//!
//! let environ = Environ::new()
//!     .var("REQUEST_METHOD", "GET")
//!     .var("PATH_INFO", "/hello/world");
//!
//! let body = endpoint
//!     .call(environ, |status, headers| {
//!         assert_eq!(status, "200 OK");
//!         assert_eq!(headers[0].1, "text/plain; charset=utf-8");
//!     })
//!     .unwrap();
//!
//! assert_eq!(body.read_all().unwrap(), b"Hello, world");
//! ```
//! Hooks and early exit:
//! ```
//! use gatekeeper::{gateway::Environ, Endpoint, Halt, Request, StatusCode};
//!
//! let endpoint = Endpoint::new("/admin")
//!     .unwrap()
//!     .before_request(|req, resp| {
//!         if req.cookies().get("session").is_none() {
//!             resp.redirect("/login");
//!             return Err(Halt::Finish); // skips the handler and `after_request`
//!         }
//!         Ok(())
//!     })
//!     .get(|_, resp| {
//!         resp.set_body("dashboard");
//!         Ok(())
//!     })
//!     .on_exception(|req, fault| eprintln!("{} failed: {fault}", req.path()));
//!
//! let mut request = Request::new(
//!     Environ::new()
//!         .var("REQUEST_METHOD", "GET")
//!         .var("PATH_INFO", "/admin"),
//! );
//! let response = endpoint.handle_request(&mut request).unwrap();
//!
//! assert_eq!(response.status, StatusCode::SeeOther);
//! assert_eq!(response.headers.get("Location"), Some("/login"));
//! ```
//! Custom configuration:
//! ```
//! use gatekeeper::{limits::{ReqLimits, RespLimits}, Endpoint};
//!
//! let endpoint = Endpoint::new(r"^/static/(?P<path>.+)$")
//!     .unwrap()
//!     .request_limits(ReqLimits {
//!         body_size: 0,       // Static files take no body
//!         ..ReqLimits::default()
//!     })
//!     .limits(RespLimits {
//!         file_chunk_size: 64 * 1024,
//!     })
//!     .get(|req, resp| {
//!         resp.file = Some(format!("./public/{}", req.arg("path").unwrap_or_default()).into());
//!         Ok(())
//!     });
//! # let _ = endpoint;
//! ```
//!
//! # Logging
//!
//! The crate emits [`tracing`] events (path compilation, phase changes,
//! early exits, faults, flash-message expiry) and never installs a
//! subscriber itself.

pub(crate) mod http {
    pub(crate) mod cookie;
    pub mod query;
    pub(crate) mod request;
    pub(crate) mod response;
    pub(crate) mod types;
}
pub(crate) mod endpoint {
    pub(crate) mod lifecycle;
    pub(crate) mod path;
}
pub(crate) mod errors;
pub mod gateway;
pub mod limits;
pub mod template;

pub use crate::{
    endpoint::{
        lifecycle::{Endpoint, ExceptionHook, Handler},
        path::PathPattern,
    },
    errors::{Error, Fault, Halt, Outcome},
    http::{
        cookie::{parse_cookie_header, Cookie, CookieJar, SameSite, MESSAGE_PREFIX},
        query,
        request::Request,
        response::{write::WriteBuffer, Response},
        types::{HeaderMap, Method, StatusCode},
    },
};

#[cfg(test)]
pub mod tools {
    use crate::{gateway::Environ, Request};
    use indexmap::IndexMap;
    use std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };

    pub const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
        (KHTML, like Gecko) Chrome/47.0.2526.106 Safari/537.36";

    /// Environment captured from a real gunicorn request.
    pub fn mock_env() -> Environ {
        [
            ("HTTP_ACCEPT", "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8"),
            ("HTTP_ACCEPT_ENCODING", "gzip, deflate, sdch"),
            ("HTTP_ACCEPT_LANGUAGE", "pt-BR,pt;q=0.8,en-US;q=0.6,en;q=0.4"),
            ("HTTP_CONNECTION", "keep-alive"),
            ("HTTP_HOST", "localhost:8000"),
            ("HTTP_UPGRADE_INSECURE_REQUESTS", "1"),
            ("HTTP_USER_AGENT", USER_AGENT),
            ("PATH_INFO", ""),
            ("QUERY_STRING", ""),
            ("RAW_URI", ""),
            ("REMOTE_ADDR", "127.0.0.1"),
            ("REMOTE_PORT", "54130"),
            ("REQUEST_METHOD", "GET"),
            ("SCRIPT_NAME", ""),
            ("SERVER_NAME", "127.0.0.1"),
            ("SERVER_PORT", "8000"),
            ("SERVER_PROTOCOL", "HTTP/1.1"),
            ("SERVER_SOFTWARE", "gunicorn/19.6.0"),
            ("wsgi.url_scheme", "http"),
        ]
        .into_iter()
        .collect()
    }

    /// Request carrying only a method and a path.
    pub fn request(method: &str, path: &str) -> Request {
        Request::new(
            Environ::new()
                .var("REQUEST_METHOD", method)
                .var("PATH_INFO", path),
        )
    }

    #[inline]
    pub fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[inline]
    pub fn ordered(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[inline]
    pub fn pair(value: &(String, String)) -> (&str, &str) {
        (&value.0, &value.1)
    }

    /// Shared call counter for handlers and hooks.
    #[derive(Debug, Clone, Default)]
    pub struct Counter(Arc<AtomicUsize>);

    impl Counter {
        pub fn hit(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }

        pub fn get(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }
}
