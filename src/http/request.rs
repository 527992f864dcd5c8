use crate::{
    gateway::{self, Environ},
    http::cookie::{parse_cookie_header, Cookie, CookieJar, MESSAGE_PREFIX},
    limits::ReqLimits,
    query::{self, Query},
    Error, Method, Response,
};
use indexmap::IndexMap;
use std::{collections::HashMap, io::Read};
use tracing::{debug, trace};

/// Incoming request built from a gateway [`Environ`].
///
/// Derived fields (headers, cookies) are computed once at construction;
/// the rest are read straight from the environ. The only mutable parts
/// are the path arguments filled in by [`Endpoint`](crate::Endpoint)
/// matching and the link to the response being built.
///
/// # Headers
///
/// Every `HTTP_*` variable becomes a header: the prefix is stripped, the
/// name lowercased and `_` replaced by `-`.
///
/// | Environ key            | Header name       |
/// |------------------------|-------------------|
/// | `HTTP_HOST`            | `host`            |
/// | `HTTP_USER_AGENT`      | `user-agent`      |
/// | `HTTP_X_FORWARDED_FOR` | `x-forwarded-for` |
///
/// # Examples
/// ```
/// use gatekeeper::{gateway::Environ, Request};
///
/// let request = Request::new(
///     Environ::new()
///         .var("REQUEST_METHOD", "GET")
///         .var("wsgi.url_scheme", "https")
///         .var("HTTP_HOST", "myserver.com:8080")
///         .var("PATH_INFO", "/dashboard/products")
///         .var("QUERY_STRING", "page=1&order=price")
///         .var("HTTP_COOKIE", "theme=dark"),
/// );
///
/// assert_eq!(request.url(), "https://myserver.com:8080/dashboard/products?page=1&order=price");
/// assert_eq!(request.header("Host"), Some("myserver.com:8080"));
/// assert_eq!(request.cookies()["theme"], "dark");
/// assert_eq!(request.query().unwrap()["order"], "price");
/// ```
#[derive(Debug)]
pub struct Request {
    environ: Environ,
    limits: ReqLimits,

    headers: HashMap<String, String>,
    cookies: IndexMap<String, String>,
    body: Option<Vec<u8>>,

    args: HashMap<String, String>,
    response: Option<CookieJar>,
}

impl Request {
    /// Builds a request with [`ReqLimits::default`].
    pub fn new(environ: Environ) -> Self {
        Self::with_limits(environ, &ReqLimits::default())
    }

    pub fn with_limits(environ: Environ, limits: &ReqLimits) -> Self {
        let headers: HashMap<String, String> = environ
            .iter()
            .filter_map(|(key, value)| {
                let name = key.strip_prefix(gateway::HEADER_PREFIX)?;
                Some((header_name(name), value.to_owned()))
            })
            .collect();

        let cookies = headers
            .get("cookie")
            .map(|header| parse_cookie_header(header, limits.cookie_count))
            .unwrap_or_default();

        Self {
            environ,
            limits: limits.clone(),
            headers,
            cookies,
            body: None,
            args: HashMap::new(),
            response: None,
        }
    }

    /// The raw gateway environment.
    #[inline]
    pub fn environ(&self) -> &Environ {
        &self.environ
    }

    #[inline]
    fn var(&self, key: &str) -> &str {
        self.environ.get(key).unwrap_or_default()
    }
}

/// Request line and location
impl Request {
    /// The method exactly as the gateway reported it.
    #[inline]
    pub fn method(&self) -> &str {
        self.var(gateway::REQUEST_METHOD)
    }

    /// The method if it is one of the supported ones.
    ///
    /// # Examples
    /// ```
    /// use gatekeeper::{gateway::Environ, Method, Request};
    ///
    /// let request = Request::new(Environ::new().var("REQUEST_METHOD", "post"));
    /// assert_eq!(request.method_kind(), Some(Method::Post));
    ///
    /// let request = Request::new(Environ::new().var("REQUEST_METHOD", "FOOBAR"));
    /// assert_eq!(request.method_kind(), None);
    /// ```
    #[inline]
    pub fn method_kind(&self) -> Option<Method> {
        Method::from_name(self.method())
    }

    /// `wsgi.url_scheme`, `http` when missing.
    #[inline]
    pub fn scheme(&self) -> &str {
        self.environ.get(gateway::URL_SCHEME).unwrap_or("http")
    }

    /// The `Host` header, else `SERVER_NAME` plus `SERVER_PORT` when the
    /// port is not the default one for the scheme.
    pub fn host(&self) -> String {
        if let Some(host) = self.header("host") {
            return host.to_owned();
        }

        let name = self.var(gateway::SERVER_NAME);
        match (self.scheme(), self.var(gateway::SERVER_PORT)) {
            (_, "") | ("http", "80") | ("https", "443") => name.to_owned(),
            (_, port) => format!("{name}:{port}"),
        }
    }

    #[inline]
    pub fn path(&self) -> &str {
        self.var(gateway::PATH_INFO)
    }

    /// The raw query string, without the leading `?`.
    #[inline]
    pub fn query_string(&self) -> &str {
        self.var(gateway::QUERY_STRING)
    }

    /// `scheme://host`
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme(), self.host())
    }

    /// `scheme://host/path?query`, the `?query` part only when non-empty.
    pub fn url(&self) -> String {
        let mut url = self.base_url();
        url.push_str(self.path());

        let query = self.query_string();
        if !query.is_empty() {
            url.push('?');
            url.push_str(query);
        }
        url
    }

    /// Decoded query parameters; repeated names keep the last value.
    ///
    /// Fails with [`query::Error::OverLimit`] when the string holds more
    /// than [`ReqLimits::query_params`] parameters.
    pub fn query(&self) -> Result<HashMap<String, String>, Error> {
        match Query::parse(self.query_string(), self.limits.query_params) {
            Ok(params) => Ok(params),
            Err(query::Error::Empty) => Ok(HashMap::new()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Headers and client information
impl Request {
    #[inline]
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Case-insensitive header lookup.
    #[inline]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .or_else(|| self.headers.get(&name.to_ascii_lowercase()))
            .map(String::as_str)
    }

    /// Cookies in the order the client sent them.
    #[inline]
    pub fn cookies(&self) -> &IndexMap<String, String> {
        &self.cookies
    }

    /// Client address: the first `X-Forwarded-For` entry, else `REMOTE_ADDR`.
    ///
    /// # Examples
    /// ```
    /// use gatekeeper::{gateway::Environ, Request};
    ///
    /// let request = Request::new(
    ///     Environ::new()
    ///         .var("REMOTE_ADDR", "127.0.0.1")
    ///         .var("HTTP_X_FORWARDED_FOR", "203.0.113.195, 70.41.3.18"),
    /// );
    /// assert_eq!(request.ip(), Some("203.0.113.195"));
    /// ```
    pub fn ip(&self) -> Option<&str> {
        if let Some(forwarded) = self.header("x-forwarded-for") {
            let first = forwarded.split(',').next().unwrap_or_default().trim();
            if !first.is_empty() {
                return Some(first);
            }
        }
        self.environ.get(gateway::REMOTE_ADDR)
    }

    #[inline]
    pub fn referer(&self) -> Option<&str> {
        self.header("referer")
    }

    #[inline]
    pub fn user_agent(&self) -> Option<&str> {
        self.header("user-agent")
    }
}

/// Body
impl Request {
    /// Reads the request body.
    ///
    /// The input stream is consumed on the first call and the bytes are
    /// kept for later calls. At most `CONTENT_LENGTH` bytes are read; a
    /// declared or actual length above [`ReqLimits::body_size`] fails with
    /// [`Error::BodyTooLarge`].
    ///
    /// # Examples
    /// ```
    /// use gatekeeper::{gateway::Environ, Request};
    ///
    /// let mut request = Request::new(
    ///     Environ::new()
    ///         .var("CONTENT_LENGTH", "5")
    ///         .input(&b"hello world"[..]),
    /// );
    /// assert_eq!(request.body().unwrap(), b"hello");
    /// assert_eq!(request.text().unwrap(), "hello");
    /// ```
    pub fn body(&mut self) -> Result<&[u8], Error> {
        if self.body.is_none() {
            let body = self.read_body()?;
            self.body = Some(body);
        }
        Ok(self.body.as_deref().unwrap_or_default())
    }

    /// The body as UTF-8 text.
    pub fn text(&mut self) -> Result<&str, Error> {
        let body = self.body()?;
        simdutf8::basic::from_utf8(body).map_err(|_| Error::InvalidUtf8)
    }

    fn read_body(&mut self) -> Result<Vec<u8>, Error> {
        let limit = self.limits.body_size;
        let declared = self
            .var(gateway::CONTENT_LENGTH)
            .trim()
            .parse::<usize>()
            .ok();

        if let Some(length) = declared {
            if length > limit {
                return Err(Error::BodyTooLarge { limit, length });
            }
        }

        let Some(input) = self.environ.take_input() else {
            return Ok(Vec::new());
        };

        // One byte past the limit tells an oversized stream apart
        let max = declared.unwrap_or(limit.saturating_add(1));
        let mut body = Vec::with_capacity(max.min(limit).min(64 * 1024));
        input.take(max as u64).read_to_end(&mut body)?;

        if body.len() > limit {
            return Err(Error::BodyTooLarge {
                limit,
                length: body.len(),
            });
        }

        trace!(length = body.len(), "request body read");
        Ok(body)
    }
}

/// Path arguments and the response link
impl Request {
    /// Named captures of the matched endpoint path.
    #[inline]
    pub fn args(&self) -> &HashMap<String, String> {
        &self.args
    }

    #[inline]
    pub fn arg(&self, name: &str) -> Option<&str> {
        self.args.get(name).map(String::as_str)
    }

    #[inline]
    pub fn args_mut(&mut self) -> &mut HashMap<String, String> {
        &mut self.args
    }

    #[inline]
    pub(crate) fn set_args(&mut self, args: HashMap<String, String>) {
        self.args = args;
    }

    /// Links the response whose cookies receive flash-message expiries.
    pub fn set_response(&mut self, response: &Response) {
        self.response = Some(response.cookie_jar().clone());
    }

    #[inline]
    pub fn has_response(&self) -> bool {
        self.response.is_some()
    }

    /// Whether `response` is the one linked to this request.
    pub fn is_linked_to(&self, response: &Response) -> bool {
        self.response
            .as_ref()
            .is_some_and(|jar| jar.same_jar(response.cookie_jar()))
    }

    /// Flash messages sent by the client, keyed without the `MESSAGE:`
    /// prefix.
    ///
    /// Every message returned is scheduled for deletion on the linked
    /// response, so the client sees it only once. Expiries follow the
    /// order of the `Cookie` header and are queued once however often
    /// this is called. Fails with
    /// [`Error::ResponseNotSet`] when no response is linked.
    ///
    /// # Examples
    /// ```
    /// use gatekeeper::{gateway::Environ, Request, Response};
    ///
    /// let mut request = Request::new(
    ///     Environ::new().var("HTTP_COOKIE", "MESSAGE:notice=saved; theme=dark"),
    /// );
    /// assert!(request.messages().is_err());
    ///
    /// let response = Response::default();
    /// request.set_response(&response);
    ///
    /// let messages = request.messages().unwrap();
    /// assert_eq!(messages.len(), 1);
    /// assert_eq!(messages["notice"], "saved");
    /// assert_eq!(
    ///     response.cookies()[0].to_string(),
    ///     "MESSAGE:notice=; Expires=Thu, 01 Jan 1970 00:00:00 GMT"
    /// );
    /// ```
    pub fn messages(&self) -> Result<HashMap<String, String>, Error> {
        let jar = self.response.as_ref().ok_or(Error::ResponseNotSet)?;

        let mut messages = HashMap::new();
        for (name, value) in &self.cookies {
            let Some(key) = name.strip_prefix(MESSAGE_PREFIX) else {
                continue;
            };

            if jar.push_once(Cookie::expired(name.as_str())) {
                debug!(cookie = %name, "flash message consumed, scheduling expiry");
            }
            messages.insert(key.to_owned(), value.clone());
        }

        Ok(messages)
    }
}

#[inline]
fn header_name(name: &str) -> String {
    name.chars()
        .map(|ch| match ch {
            '_' => '-',
            ch => ch.to_ascii_lowercase(),
        })
        .collect()
}


#[cfg(test)]
mod cookies_tests {
    use super::*;
    use crate::tools::*;

    #[test]
    fn basic() {
        let request = Request::new(mock_env().var("HTTP_COOKIE", "foo=bar; bar=biz"));
        assert_eq!(request.cookies(), &ordered(&[("foo", "bar"), ("bar", "biz")]));
    }

    #[test]
    fn empty() {
        assert!(Request::new(mock_env()).cookies().is_empty());
    }

    #[test]
    fn special_characters() {
        let request = Request::new(
            mock_env().var("HTTP_COOKIE", r#"token="abc/\073\054~\341\347['!\"\"]""#),
        );
        assert_eq!(request.cookies(), &ordered(&[("token", "abc/;,~áç['!\"\"]")]));
    }

    #[test]
    fn cookie_limit() {
        let limits = ReqLimits {
            cookie_count: 1,
            ..ReqLimits::default()
        };
        let request = Request::with_limits(mock_env().var("HTTP_COOKIE", "a=1; b=2"), &limits);
        assert_eq!(request.cookies().len(), 1);
    }
}

#[cfg(test)]
mod body_tests {
    use super::*;
    use crate::tools::*;

    #[test]
    fn basic() {
        let mut request = Request::new(mock_env().input(&b"<h1>Hello World</h1>"[..]));

        assert_eq!(request.body().unwrap(), b"<h1>Hello World</h1>");
        // cached after the stream is consumed
        assert_eq!(request.body().unwrap(), b"<h1>Hello World</h1>");
    }

    #[test]
    fn no_input() {
        let mut request = Request::new(mock_env());
        assert_eq!(request.body().unwrap(), b"");
    }

    #[test]
    fn content_length_bounds_read() {
        let mut request = Request::new(
            mock_env()
                .var("CONTENT_LENGTH", "3")
                .input(&b"abcdef"[..]),
        );
        assert_eq!(request.body().unwrap(), b"abc");
    }

    #[test]
    fn too_large() {
        let limits = ReqLimits {
            body_size: 4,
            ..ReqLimits::default()
        };

        let mut declared = Request::with_limits(
            mock_env().var("CONTENT_LENGTH", "10").input(&b"0123456789"[..]),
            &limits,
        );
        assert!(matches!(
            declared.body(),
            Err(Error::BodyTooLarge { limit: 4, length: 10 })
        ));

        let mut undeclared = Request::with_limits(mock_env().input(&b"0123456789"[..]), &limits);
        assert!(matches!(
            undeclared.body(),
            Err(Error::BodyTooLarge { limit: 4, length: 5 })
        ));
    }

    #[test]
    fn text() {
        let mut request = Request::new(mock_env().input("olá".as_bytes()));
        assert_eq!(request.text().unwrap(), "olá");

        let mut request = Request::new(mock_env().input(&b"\xff\xfe"[..]));
        assert!(matches!(request.text(), Err(Error::InvalidUtf8)));
    }
}

#[cfg(test)]
mod messages_tests {
    use super::*;
    use crate::tools::*;

    #[test]
    fn basic() {
        let mut request = Request::new(
            mock_env().var("HTTP_COOKIE", "MESSAGE:foo=bar; MESSAGE:bar=biz; theme=dark"),
        );
        request.set_response(&Response::default());

        assert_eq!(
            request.messages().unwrap(),
            map(&[("foo", "bar"), ("bar", "biz")])
        );
    }

    #[test]
    fn requires_response() {
        let request = Request::new(mock_env());

        assert!(!request.has_response());
        assert!(matches!(request.messages(), Err(Error::ResponseNotSet)));
    }

    #[test]
    fn unsets_message_cookies() {
        let mut request =
            Request::new(mock_env().var("HTTP_COOKIE", "MESSAGE:foo=bar; MESSAGE:bar=biz"));
        let response = Response::default();
        request.set_response(&response);
        assert!(request.is_linked_to(&response));

        request.messages().unwrap();

        let headers = response.wsgi_headers();
        let set_cookies: Vec<&str> = headers
            .iter()
            .filter(|(name, _)| name == "Set-Cookie")
            .map(|(_, value)| value.as_str())
            .collect();
        assert_eq!(
            set_cookies,
            [
                "MESSAGE:foo=; Expires=Thu, 01 Jan 1970 00:00:00 GMT",
                "MESSAGE:bar=; Expires=Thu, 01 Jan 1970 00:00:00 GMT",
            ]
        );
    }

    #[test]
    fn expiry_order_is_stable() {
        let cookie = "MESSAGE:d=4; MESSAGE:b=2; theme=dark; MESSAGE:a=1; MESSAGE:c=3";

        for _ in 0..32 {
            let mut request = Request::new(mock_env().var("HTTP_COOKIE", cookie));
            let response = Response::default();
            request.set_response(&response);
            request.messages().unwrap();

            let names: Vec<String> = response
                .cookies()
                .iter()
                .map(|cookie| cookie.name().to_owned())
                .collect();
            assert_eq!(names, ["MESSAGE:d", "MESSAGE:b", "MESSAGE:a", "MESSAGE:c"]);
        }
    }

    #[test]
    fn repeated_reads_expire_once() {
        let mut request = Request::new(mock_env().var("HTTP_COOKIE", "MESSAGE:foo=bar"));
        let response = Response::default();
        request.set_response(&response);

        assert_eq!(request.messages().unwrap(), map(&[("foo", "bar")]));
        assert_eq!(request.messages().unwrap(), map(&[("foo", "bar")]));
        assert_eq!(response.cookies().len(), 1);
    }

    #[test]
    fn args() {
        let mut request = Request::new(mock_env());
        assert!(request.args().is_empty());

        request.set_args(map(&[("id", "9")]));
        request.args_mut().insert("extra".into(), "1".into());

        assert_eq!(request.arg("id"), Some("9"));
        assert_eq!(request.arg("extra"), Some("1"));
        assert_eq!(request.arg("missing"), None);
    }
}
