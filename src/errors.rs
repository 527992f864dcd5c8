use crate::{query, Response};
use std::{error, fmt, io};

/// Errors reported by the library itself.
///
/// Faults raised by user handlers travel separately as [`Fault`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Flash messages were read before a response was linked to the request.
    #[error("no response is set on the request")]
    ResponseNotSet,

    /// Rendering was requested without a template renderer.
    #[error("no template renderer is set")]
    TemplateRendererNotSet,

    /// An endpoint path could not be compiled into a pattern.
    #[error("invalid endpoint path {path:?}: {source}")]
    InvalidPath {
        path: String,
        #[source]
        source: regex::Error,
    },

    #[error(transparent)]
    Query(#[from] query::Error),

    /// The request body is larger than [`ReqLimits::body_size`](crate::limits::ReqLimits::body_size).
    #[error("request body too large: length={length}, limit={limit}")]
    BodyTooLarge { limit: usize, length: usize },

    #[error("request body is not valid UTF-8")]
    InvalidUtf8,

    /// A template renderer failed.
    #[error("template rendering failed: {0}")]
    Render(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Any fault raised by handler or hook code.
pub type Fault = Box<dyn error::Error + Send + Sync + 'static>;

/// Return type of handlers and hooks.
pub type Outcome = Result<(), Halt>;

/// Early exit from a handler or hook.
///
/// The first two variants are not errors: they end the current phase and
/// decide which response continues. Only [`Halt::Fault`] reaches the
/// exception hook and the caller.
///
/// Every `std::error::Error` converts into a fault, so `?` works inside
/// handlers:
/// ```
/// use gatekeeper::{Outcome, Request, Response};
///
/// fn get(req: &mut Request, resp: &mut Response) -> Outcome {
///     let id: u32 = req.arg("id").unwrap_or_default().parse()?;
///     resp.set_body(format!("user {id}"));
///     Ok(())
/// }
/// ```
pub enum Halt {
    /// Stop the phase and keep the in-flight response as the result.
    Finish,
    /// Stop the phase and replace the in-flight response.
    Respond(Response),
    /// Anything that went wrong.
    Fault(Fault),
}

impl Halt {
    /// Wraps an arbitrary fault.
    pub fn fault<E: Into<Fault>>(error: E) -> Self {
        Halt::Fault(error.into())
    }
}

impl<E> From<E> for Halt
where
    E: error::Error + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Halt::Fault(Box::new(error))
    }
}

impl fmt::Debug for Halt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Halt::Finish => f.write_str("Finish"),
            Halt::Respond(resp) => f.debug_tuple("Respond").field(&resp.status).finish(),
            Halt::Fault(fault) => f.debug_tuple("Fault").field(fault).finish(),
        }
    }
}

#[cfg(test)]
mod halt_tests {
    use super::*;

    fn parse(value: &str) -> Outcome {
        let _: u8 = value.parse()?;
        Ok(())
    }

    #[test]
    fn question_mark_converts_to_fault() {
        assert!(parse("7").is_ok());
        assert!(matches!(parse("seven"), Err(Halt::Fault(_))));
    }

    #[test]
    fn fault_from_string() {
        let Halt::Fault(fault) = Halt::fault("boom") else {
            panic!("expected a fault");
        };
        assert_eq!(fault.to_string(), "boom");
    }

    #[test]
    fn display() {
        assert_eq!(
            Error::ResponseNotSet.to_string(),
            "no response is set on the request"
        );
        assert_eq!(
            Error::BodyTooLarge {
                limit: 4,
                length: 9
            }
            .to_string(),
            "request body too large: length=9, limit=4"
        );
    }
}
