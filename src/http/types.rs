//! Core HTTP protocol types shared by requests, responses and endpoints

use std::fmt;

// METHOD

/// HTTP request methods an endpoint can bind a handler to
///
/// # References
///
/// - [RFC 7231, Section 4](https://datatracker.ietf.org/doc/html/rfc7231#section-4)
/// - [RFC 5789](https://datatracker.ietf.org/doc/html/rfc5789) (PATCH method)
///
/// # Disabled methods
///
/// * `TRACE` - disabled for security reasons
/// * `CONNECT` - disabled because it is no longer needed
///
/// Requests carrying any other method never match an endpoint.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Method {
    /// GET method - transfer a current representation of the target resource
    Get,
    /// POST method - perform resource-specific processing on the request payload
    Post,
    /// PUT method - replace all current representations of the target resource with the request payload
    Put,
    /// PATCH method - apply partial modifications to a resource
    Patch,
    /// DELETE method - remove all current representations of the target resource
    Delete,
    /// HEAD method - same as GET but without response body
    Head,
    /// OPTIONS method - describe the communication options for the target resource
    Options,
}

impl Method {
    /// Every method an endpoint accepts, in declaration order.
    pub const ALL: [Method; 7] = [
        Method::Get,
        Method::Post,
        Method::Put,
        Method::Patch,
        Method::Delete,
        Method::Head,
        Method::Options,
    ];

    /// Parses a method name, ignoring ASCII case.
    ///
    /// Returns `None` for anything outside the allow-list.
    ///
    /// # Examples
    /// ```
    /// use gatekeeper::Method;
    ///
    /// assert_eq!(Method::from_name("get"), Some(Method::Get));
    /// assert_eq!(Method::from_name("PATCH"), Some(Method::Patch));
    /// assert_eq!(Method::from_name("TRACE"), None);
    /// ```
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|method| method.as_str().eq_ignore_ascii_case(name))
    }

    /// Returns the upper-case wire name of the method.
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// STATUS_CODE

macro_rules! set_status_codes {
    ($(
        $(#[$docs:meta])*
        $name:ident = ($num:literal, $str:literal);
    )+) => {
        /// HTTP status codes
        ///
        /// Represents valid HTTP status codes as defined in
        /// [RFC 9110](https://datatracker.ietf.org/doc/html/rfc9110#section-15) and other standards.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum StatusCode { $(
            #[doc = concat!(stringify!($num), " ", $str)]
            $(#[$docs])*
            $name = $num,
        )+ }

        impl StatusCode {
            /// Returns the standard reason phrase (e.g., `"Not Found"`).
            #[inline]
            pub const fn reason(&self) -> &'static str {
                match self { $(
                    StatusCode::$name => $str,
                )+ }
            }

            /// Returns the gateway status line (e.g., `"404 Not Found"`).
            #[inline]
            pub const fn status_line(&self) -> &'static str {
                match self { $(
                    StatusCode::$name => concat!($num, " ", $str),
                )+ }
            }

            /// Looks up a status code by its numeric value.
            pub const fn from_u16(code: u16) -> Option<Self> {
                match code {
                    $($num => Some(StatusCode::$name),)+
                    _ => None,
                }
            }
        }
    }
}

impl StatusCode {
    /// Returns the numeric value of the code.
    #[inline]
    pub const fn as_u16(&self) -> u16 {
        *self as u16
    }
}

impl Default for StatusCode {
    fn default() -> Self {
        StatusCode::Ok
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.status_line())
    }
}

set_status_codes! {
    Continue = (100, "Continue");
    SwitchingProtocols = (101, "Switching Protocols");
    Processing = (102, "Processing");

    Ok = (200, "OK");
    Created = (201, "Created");
    Accepted = (202, "Accepted");
    NonAuthoritativeInformation = (203, "Non-Authoritative Information");
    NoContent = (204, "No Content");
    ResetContent = (205, "Reset Content");
    PartialContent = (206, "Partial Content");
    MultiStatus = (207, "Multi-Status");
    AlreadyReported = (208, "Already Reported");
    ImUsed = (226, "IM Used");

    MultipleChoices = (300, "Multiple Choices");
    MovedPermanently = (301, "Moved Permanently");
    Found = (302, "Found");
    SeeOther = (303, "See Other");
    NotModified = (304, "Not Modified");
    UseProxy = (305, "Use Proxy");
    TemporaryRedirect = (307, "Temporary Redirect");
    PermanentRedirect = (308, "Permanent Redirect");

    BadRequest = (400, "Bad Request");
    Unauthorized = (401, "Unauthorized");
    PaymentRequired = (402, "Payment Required");
    Forbidden = (403, "Forbidden");
    NotFound = (404, "Not Found");
    MethodNotAllowed = (405, "Method Not Allowed");
    NotAcceptable = (406, "Not Acceptable");
    ProxyAuthenticationRequired = (407, "Proxy Authentication Required");
    RequestTimeout = (408, "Request Timeout");
    Conflict = (409, "Conflict");
    Gone = (410, "Gone");
    LengthRequired = (411, "Length Required");
    PreconditionFailed = (412, "Precondition Failed");
    PayloadTooLarge = (413, "Payload Too Large");
    UriTooLong = (414, "URI Too Long");
    UnsupportedMediaType = (415, "Unsupported Media Type");
    RangeNotSatisfiable = (416, "Range Not Satisfiable");
    ExpectationFailed = (417, "Expectation Failed");
    ImaTeapot = (418, "I'm a teapot");
    MisdirectedRequest = (421, "Misdirected Request");
    UnprocessableEntity = (422, "Unprocessable Entity");
    Locked = (423, "Locked");
    FailedDependency = (424, "Failed Dependency");
    TooEarly = (425, "Too Early");
    UpgradeRequired = (426, "Upgrade Required");
    PreconditionRequired = (428, "Precondition Required");
    TooManyRequests = (429, "Too Many Requests");
    RequestHeaderFieldsTooLarge = (431, "Request Header Fields Too Large");
    UnavailableForLegalReasons = (451, "Unavailable For Legal Reasons");

    InternalServerError = (500, "Internal Server Error");
    NotImplemented = (501, "Not Implemented");
    BadGateway = (502, "Bad Gateway");
    ServiceUnavailable = (503, "Service Unavailable");
    GatewayTimeout = (504, "Gateway Timeout");
    HttpVersionNotSupported = (505, "HTTP Version Not Supported");
    VariantAlsoNegotiates = (506, "Variant Also Negotiates");
    InsufficientStorage = (507, "Insufficient Storage");
    LoopDetected = (508, "Loop Detected");
    NotExtended = (510, "Not Extended");
    NetworkAuthenticationRequired = (511, "Network Authentication Required");
}

// HEADER MAP

/// Insertion-ordered header collection.
///
/// Names compare case-insensitively. Inserting an existing name replaces
/// its value in place, so the original position is kept.
///
/// # Examples
/// ```
/// use gatekeeper::HeaderMap;
///
/// let mut headers = HeaderMap::new();
/// headers.insert("Content-Type", "text/plain");
/// headers.insert("X-Request-Id", "42");
/// headers.insert("content-type", "application/json");
///
/// assert_eq!(headers.get("CONTENT-TYPE"), Some("application/json"));
/// assert_eq!(
///     headers.iter().map(|(name, _)| name).collect::<Vec<_>>(),
///     ["Content-Type", "X-Request-Id"]
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HeaderMap {
    headers: Vec<(String, String)>,
}

impl HeaderMap {
    /// Creates an empty map.
    #[inline]
    pub const fn new() -> Self {
        Self {
            headers: Vec::new(),
        }
    }

    /// Sets a header, replacing any existing value under the same name.
    pub fn insert<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) -> &mut Self {
        let (name, value) = (name.into(), value.into());

        match self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            Some(header) => header.1 = value,
            None => self.headers.push((name, value)),
        }
        self
    }

    /// Returns the value for `name`, ignoring ASCII case.
    /// Uses linear search.
    #[inline]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Removes a header and returns its value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self
            .headers
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))?;

        Some(self.headers.remove(index).1)
    }

    /// Iterates over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub(crate) fn to_pairs(&self) -> Vec<(String, String)> {
        self.headers.clone()
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for HeaderMap {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut map = HeaderMap::new();
        for (name, value) in iter {
            map.insert(name, value);
        }
        map
    }
}


#[cfg(test)]
mod status_tests {
    use super::*;

    #[test]
    fn status_line() {
        let cases = [
            (StatusCode::Ok, "200 OK"),
            (StatusCode::NotFound, "404 Not Found"),
            (StatusCode::SeeOther, "303 See Other"),
            (StatusCode::BadRequest, "400 Bad Request"),
            (StatusCode::InternalServerError, "500 Internal Server Error"),
        ];

        for (status, line) in cases {
            assert_eq!(status.status_line(), line);
            assert_eq!(status.to_string(), line);
        }
    }

    #[test]
    fn from_u16() {
        assert_eq!(StatusCode::from_u16(200), Some(StatusCode::Ok));
        assert_eq!(StatusCode::from_u16(418), Some(StatusCode::ImaTeapot));
        assert_eq!(StatusCode::from_u16(299), None);
        assert_eq!(StatusCode::BadRequest.as_u16(), 400);
        assert_eq!(StatusCode::default(), StatusCode::Ok);
    }
}
