//! Request and response limits
//!
//! # Security-First Defaults
//!
//! Default limits are intentionally conservative to prevent:
//! - Memory exhaustion through oversized bodies
//! - Query string and cookie flooding
//! - Loading whole files into memory when streaming them back
//!
//! # Examples
//!
//! ```
//! use gatekeeper::{
//!     gateway::Environ,
//!     limits::{ReqLimits, RespLimits},
//!     Endpoint, Request,
//! };
//!
//! let limits = ReqLimits {
//!     body_size: 16 * 1024, // 16KB for larger payloads
//!     ..ReqLimits::default()
//! };
//! let request = Request::with_limits(Environ::new().var("PATH_INFO", "/upload"), &limits);
//! assert_eq!(request.path(), "/upload");
//!
//! let endpoint = Endpoint::new("/upload")
//!     .unwrap()
//!     .limits(RespLimits {
//!         file_chunk_size: 64 * 1024, // Fewer, larger reads for big downloads
//!     });
//! # let _ = endpoint;
//! ```

/// Limits applied while reading an incoming request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReqLimits {
    /// Maximum number of bytes read from the input stream (default: `1 MiB`).
    ///
    /// A `CONTENT_LENGTH` above this value makes [`Request::body`](crate::Request::body)
    /// fail with [`Error::BodyTooLarge`](crate::Error::BodyTooLarge) without
    /// reading anything.
    pub body_size: usize,

    /// Maximum number of query string parameters (default: `64`).
    ///
    /// Exceeding it makes [`Request::query`](crate::Request::query) fail with
    /// [`query::Error::OverLimit`](crate::query::Error::OverLimit).
    pub query_params: usize,

    /// Maximum number of cookies parsed from the `Cookie` header (default: `64`).
    ///
    /// Extra pairs are ignored.
    pub cookie_count: usize,
}

impl Default for ReqLimits {
    fn default() -> Self {
        Self {
            body_size: 1024 * 1024,
            query_params: 64,
            cookie_count: 64,
        }
    }
}

/// Limits applied while serializing a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RespLimits {
    /// Size of each chunk read from a file-backed body (default: `8 KiB`).
    ///
    /// Values below `1` are treated as `1`.
    pub file_chunk_size: usize,
}

impl Default for RespLimits {
    fn default() -> Self {
        Self {
            file_chunk_size: 8 * 1024,
        }
    }
}

#[cfg(test)]
mod defaults_tests {
    use super::*;

    #[test]
    fn defaults() {
        let req = ReqLimits::default();
        assert_eq!(req.body_size, 1_048_576);
        assert_eq!(req.query_params, 64);
        assert_eq!(req.cookie_count, 64);

        assert_eq!(RespLimits::default().file_chunk_size, 8192);
    }
}
