//! Outgoing response model and its gateway serialization.

use crate::{
    gateway::Body,
    http::cookie::{Cookie, CookieJar, MESSAGE_PREFIX},
    http::types::{HeaderMap, StatusCode},
    limits::RespLimits,
    template::{Context, TemplateRenderer},
    Error, WriteBuffer,
};
use std::{fmt, path::PathBuf, sync::Arc};

const DEFAULT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";
const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// HTTP response under construction.
///
/// A fresh response is created by the [`Endpoint`](crate::Endpoint) for
/// every request and handed to each hook and handler in turn. Status,
/// headers, body and file are plain public fields; cookies go through
/// [`set_cookie`](Response::set_cookie) so that the request can see the
/// same list.
///
/// A response can also be returned as [`Halt::Respond`](crate::Halt::Respond)
/// from a handler to replace the in-flight response.
///
/// # Examples
/// ```
/// use gatekeeper::{Cookie, Response, StatusCode};
///
/// let mut resp = Response::default();
/// resp.status = StatusCode::Created;
/// resp.headers.insert("Content-Type", "application/json");
/// resp.set_body(r#"{"id": "#).write(9).write("}");
/// resp.set_cookie(Cookie::new("token", "abc"));
///
/// assert_eq!(resp.status_line(), "201 Created");
/// assert_eq!(resp.body, br#"{"id": 9}"#);
/// assert_eq!(
///     resp.wsgi_headers(),
///     [
///         ("Content-Type".to_owned(), "application/json".to_owned()),
///         ("Set-Cookie".to_owned(), "token=abc; HttpOnly; SameSite=Strict".to_owned()),
///     ]
/// );
/// ```
pub struct Response {
    /// Default: `200 OK`.
    pub status: StatusCode,
    /// Default: `Content-Type: text/plain; charset=utf-8`.
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    /// When set, the file contents are streamed instead of `body`.
    pub file: Option<PathBuf>,
    cookies: CookieJar,
    template_renderer: Option<Arc<dyn TemplateRenderer>>,
    limits: RespLimits,
}

impl Response {
    pub fn new(limits: &RespLimits) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert("Content-Type", DEFAULT_CONTENT_TYPE);

        Self {
            status: StatusCode::Ok,
            headers,
            body: Vec::new(),
            file: None,
            cookies: CookieJar::new(),
            template_renderer: None,
            limits: limits.clone(),
        }
    }

    #[inline]
    pub(crate) fn cookie_jar(&self) -> &CookieJar {
        &self.cookies
    }

    pub(crate) fn set_template_renderer(&mut self, renderer: Option<Arc<dyn TemplateRenderer>>) {
        self.template_renderer = renderer;
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(&RespLimits::default())
    }
}

impl Clone for Response {
    /// Clones into an independent response; the cookie list is copied,
    /// not shared.
    fn clone(&self) -> Self {
        Self {
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone(),
            file: self.file.clone(),
            cookies: self.cookies.detached(),
            template_renderer: self.template_renderer.clone(),
            limits: self.limits.clone(),
        }
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body", &String::from_utf8_lossy(&self.body))
            .field("file", &self.file)
            .field("cookies", &self.cookies.to_vec())
            .field("template_renderer", &self.template_renderer.is_some())
            .finish()
    }
}

/// Building the response
impl Response {
    /// Sets or replaces a header.
    ///
    /// # Examples
    /// ```
    /// use gatekeeper::Response;
    ///
    /// let mut resp = Response::default();
    /// resp.header("Content-Type", "text/csv").header("X-Rows", "3");
    ///
    /// assert_eq!(resp.headers.get("content-type"), Some("text/csv"));
    /// assert_eq!(resp.headers.len(), 2);
    /// ```
    #[inline]
    pub fn header<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) -> &mut Self {
        self.headers.insert(name, value);
        self
    }

    /// Replaces the body. Text is stored as UTF-8 bytes.
    ///
    /// # Examples
    /// ```
    /// use gatekeeper::Response;
    ///
    /// let mut resp = Response::default();
    /// resp.set_body("hello world");
    /// assert_eq!(resp.body, b"hello world");
    ///
    /// resp.set_body(404);
    /// assert_eq!(resp.body, b"404");
    /// ```
    #[inline]
    pub fn set_body<T: WriteBuffer>(&mut self, data: T) -> &mut Self {
        self.body.clear();
        data.write_to(&mut self.body);
        self
    }

    /// Appends to the body.
    #[inline]
    pub fn write<T: WriteBuffer>(&mut self, data: T) -> &mut Self {
        data.write_to(&mut self.body);
        self
    }

    /// Adds a cookie-set instruction.
    pub fn set_cookie(&mut self, cookie: Cookie) -> &mut Self {
        self.cookies.push(cookie);
        self
    }

    /// Tells the client to drop a cookie.
    ///
    /// # Examples
    /// ```
    /// use gatekeeper::Response;
    ///
    /// let mut resp = Response::default();
    /// resp.unset_cookie("token");
    ///
    /// assert_eq!(
    ///     resp.cookies()[0].to_string(),
    ///     "token=; Expires=Thu, 01 Jan 1970 00:00:00 GMT"
    /// );
    /// ```
    pub fn unset_cookie<N: Into<String>>(&mut self, name: N) -> &mut Self {
        self.set_cookie(Cookie::expired(name))
    }

    /// Stores a flash message for the next request that reads
    /// [`Request::messages`](crate::Request::messages).
    ///
    /// # Examples
    /// ```
    /// use gatekeeper::Response;
    ///
    /// let mut resp = Response::default();
    /// resp.flash("notice", "saved");
    ///
    /// assert_eq!(
    ///     resp.cookies()[0].to_string(),
    ///     "MESSAGE:notice=saved; HttpOnly; SameSite=Strict"
    /// );
    /// ```
    pub fn flash<N: AsRef<str>, V: Into<String>>(&mut self, name: N, value: V) -> &mut Self {
        self.set_cookie(Cookie::new(
            format!("{MESSAGE_PREFIX}{}", name.as_ref()),
            value,
        ))
    }

    /// All cookie instructions in insertion order.
    pub fn cookies(&self) -> Vec<Cookie> {
        self.cookies.to_vec()
    }

    /// Turns the response into a `303 See Other` pointing at `location`.
    ///
    /// # Examples
    /// ```
    /// use gatekeeper::{Response, StatusCode};
    ///
    /// let mut resp = Response::default();
    /// resp.redirect("/login");
    ///
    /// assert_eq!(resp.status, StatusCode::SeeOther);
    /// assert_eq!(resp.headers.get("Location"), Some("/login"));
    /// ```
    pub fn redirect<L: Into<String>>(&mut self, location: L) -> &mut Self {
        self.status = StatusCode::SeeOther;
        self.headers.insert("Location", location);
        self
    }

    /// The renderer inherited from the endpoint, if any.
    #[inline]
    pub fn template_renderer(&self) -> Option<&Arc<dyn TemplateRenderer>> {
        self.template_renderer.as_ref()
    }

    /// Renders a template into the body and marks it as HTML.
    ///
    /// Fails with [`Error::TemplateRendererNotSet`] when the response has
    /// no renderer.
    pub fn render(&mut self, name: &str, context: &Context) -> Result<&mut Self, Error> {
        let renderer = self
            .template_renderer
            .as_ref()
            .ok_or(Error::TemplateRendererNotSet)?;

        let text = renderer.render(name, context)?;
        self.headers.insert("Content-Type", HTML_CONTENT_TYPE);
        Ok(self.set_body(text))
    }
}

/// Gateway serialization
impl Response {
    /// `"<code> <reason>"`, e.g. `"400 Bad Request"`.
    #[inline]
    pub fn status_line(&self) -> &'static str {
        self.status.status_line()
    }

    /// Declared headers in order, then one `Set-Cookie` per cookie.
    pub fn wsgi_headers(&self) -> Vec<(String, String)> {
        let cookies = self.cookies.to_vec();
        let mut headers = self.headers.to_pairs();
        headers.reserve(cookies.len());

        headers.extend(
            cookies
                .iter()
                .map(|cookie| ("Set-Cookie".to_owned(), cookie.to_string())),
        );
        headers
    }

    /// The body source without consuming the response.
    pub fn wsgi_body(&self) -> Body {
        match &self.file {
            Some(path) => Body::File {
                path: path.clone(),
                chunk_size: self.limits.file_chunk_size,
            },
            None => Body::Bytes(self.body.clone()),
        }
    }

    /// Reports the status line and headers through `start_response` and
    /// returns the body source.
    ///
    /// # Examples
    /// ```
    /// use gatekeeper::{gateway::Body, Response, StatusCode};
    ///
    /// let mut resp = Response::default();
    /// resp.status = StatusCode::BadRequest;
    /// resp.headers.insert("Content-Type", "application/json");
    /// resp.set_body(r#"{"error": "Invalid token"}"#);
    ///
    /// let mut reported = None;
    /// let body = resp.wsgi(|status, headers| {
    ///     reported = Some((status.to_owned(), headers.to_vec()));
    /// });
    ///
    /// let (status, headers) = reported.unwrap();
    /// assert_eq!(status, "400 Bad Request");
    /// assert_eq!(headers, [("Content-Type".to_owned(), "application/json".to_owned())]);
    /// assert_eq!(body, Body::Bytes(br#"{"error": "Invalid token"}"#.to_vec()));
    /// ```
    pub fn wsgi<F>(self, start_response: F) -> Body
    where
        F: FnOnce(&str, &[(String, String)]),
    {
        start_response(self.status_line(), &self.wsgi_headers());

        match self.file {
            Some(path) => Body::File {
                path,
                chunk_size: self.limits.file_chunk_size,
            },
            None => Body::Bytes(self.body),
        }
    }
}

pub mod write {
    use std::{borrow::Cow, rc::Rc, sync::Arc};

    /// Trait for writing data into a [`Response`](crate::Response) body.
    ///
    /// Implemented for common types like strings, bytes, booleans
    /// and numeric types (excluding floating-point numbers)
    ///
    /// # Note on Floating-Point
    /// Floating-point numbers are not implemented to avoid locale-dependent
    /// formatting and precision surprises. Format them into a string with
    /// the precision you need.
    ///
    /// # Example
    /// ```
    /// use gatekeeper::{Response, WriteBuffer};
    ///
    /// struct Csv<'a>(&'a [&'a str]);
    ///
    /// impl WriteBuffer for Csv<'_> {
    ///     fn write_to(&self, buffer: &mut Vec<u8>) {
    ///         buffer.extend_from_slice(self.0.join(",").as_bytes())
    ///     }
    /// }
    ///
    /// let mut resp = Response::default();
    /// resp.set_body(Csv(&["a", "b", "c"]));
    /// assert_eq!(resp.body, b"a,b,c");
    /// ```
    pub trait WriteBuffer {
        /// Writes the value's representation directly to the buffer.
        fn write_to(&self, buffer: &mut Vec<u8>);
    }

    macro_rules! impl_write_buffer {
        (bytes, $conn:expr => $($t:ty),*) => {
            $(impl WriteBuffer for $t {
                #[inline] fn write_to(&self, buffer: &mut Vec<u8>) {
                    let closure = $conn;
                    closure(self, buffer);
                }
            })*
        };
        (number($type:ty), $conn:expr => $($t:ty),*) => {
            $(impl WriteBuffer for $t {
                #[inline] fn write_to(&self, buffer: &mut Vec<u8>) {
                    $conn(*self as $type, buffer);
                }
            })*
        };
    }

    impl<T: WriteBuffer + ?Sized> WriteBuffer for &T {
        #[inline]
        fn write_to(&self, buffer: &mut Vec<u8>) {
            T::write_to(*self, buffer);
        }
    }
    impl_write_buffer! {
        bytes, |value: &str, buffer: &mut Vec<u8>| {
            buffer.extend_from_slice(value.as_bytes());
        } => str, String, Box<str>, Cow<'_, str>, Arc<str>, Rc<str>
    }
    impl_write_buffer! {
        bytes, |value: &[u8], buffer: &mut Vec<u8>| {
            buffer.extend_from_slice(value);
        } => [u8], Vec<u8>, Box<[u8]>, Cow<'_, [u8]>, Arc<[u8]>, Rc<[u8]>
    }
    impl<const N: usize> WriteBuffer for [u8; N] {
        #[inline]
        fn write_to(&self, buffer: &mut Vec<u8>) {
            buffer.extend_from_slice(self);
        }
    }
    impl_write_buffer! {
        number(u128), write_unsigned => u8, u16, u32, u64, u128, usize
    }
    impl_write_buffer! {
        number(i128), write_signed => i8, i16, i32, i64, i128, isize
    }
    impl WriteBuffer for bool {
        #[inline]
        fn write_to(&self, buffer: &mut Vec<u8>) {
            buffer.extend_from_slice(match self {
                true => b"true",
                false => b"false",
            });
        }
    }
    impl WriteBuffer for char {
        #[inline]
        fn write_to(&self, buffer: &mut Vec<u8>) {
            let mut buf = [0u8; 4];
            buffer.extend_from_slice(self.encode_utf8(&mut buf).as_bytes());
        }
    }

    #[inline]
    const fn number_to_bytes(mut n: u128) -> ([u8; 39], usize) {
        let mut buffer = [b'0'; 39];
        let mut i = 39;

        if n == 0 {
            return (buffer, 38);
        }

        while n > 0 {
            i -= 1;
            buffer[i] = b'0' + (n % 10) as u8;
            n /= 10;
        }

        (buffer, i)
    }

    #[inline(always)]
    fn write_unsigned(value: u128, buffer: &mut Vec<u8>) {
        let (arr, start) = number_to_bytes(value);
        buffer.extend_from_slice(&arr[start..]);
    }

    #[inline(always)]
    fn write_signed(value: i128, buffer: &mut Vec<u8>) {
        if value < 0 {
            buffer.push(b'-');
        }
        write_unsigned(value.unsigned_abs(), buffer);
    }
}

#[cfg(test)]
mod defaults_tests {
    use super::*;

    #[test]
    fn basic() {
        let resp = Response::default();

        assert_eq!(resp.status, StatusCode::Ok);
        assert_eq!(resp.headers.get("Content-Type"), Some(DEFAULT_CONTENT_TYPE));
        assert!(resp.body.is_empty());
        assert!(resp.file.is_none());
        assert!(resp.cookies().is_empty());
        assert!(resp.template_renderer().is_none());
    }

    #[test]
    fn clone_detaches_cookies() {
        let mut resp = Response::default();
        resp.set_cookie(Cookie::new("a", "1"));

        let mut copy = resp.clone();
        copy.set_cookie(Cookie::new("b", "2"));

        assert_eq!(resp.cookies().len(), 1);
        assert_eq!(copy.cookies().len(), 2);
    }
}



#[cfg(test)]
mod wsgi_tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn status_headers_and_body() {
        let mut resp = Response::default();
        resp.status = StatusCode::BadRequest;
        resp.headers.insert("Content-Type", "application/json");
        resp.set_body(r#"{"error": "Invalid token"}"#);

        let mut calls = Vec::new();
        let body = resp.wsgi(|status, headers| calls.push((status.to_owned(), headers.to_vec())));

        assert_eq!(
            calls,
            [(
                "400 Bad Request".to_owned(),
                vec![("Content-Type".to_owned(), "application/json".to_owned())]
            )]
        );
        assert_eq!(
            body.iter().map(Result::unwrap).collect::<Vec<_>>(),
            [br#"{"error": "Invalid token"}"#.to_vec()]
        );
    }

    #[test]
    fn file_is_streamed() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello world").unwrap();
        file.flush().unwrap();

        let mut resp = Response::new(&RespLimits { file_chunk_size: 4 });
        resp.set_body("ignored");
        resp.file = Some(file.path().to_owned());

        let body = resp.wsgi(|_, _| {});
        assert!(body.is_file());

        let mut contents = Vec::new();
        for chunk in &body {
            let chunk = chunk.unwrap();
            assert!(chunk.len() <= 4);
            contents.extend_from_slice(&chunk);
        }
        assert_eq!(contents, b"hello world");
        assert_eq!(body.read_all().unwrap(), b"hello world");
    }

    #[test]
    fn redirect() {
        let mut resp = Response::default();
        resp.redirect("/login");

        assert_eq!(resp.status_line(), "303 See Other");
        assert_eq!(
            resp.wsgi_headers()[1],
            ("Location".to_owned(), "/login".to_owned())
        );
    }
}

#[cfg(test)]
mod render_tests {
    use super::*;
    use crate::template::test_renderer::Fixed;

    #[test]
    fn requires_renderer() {
        let mut resp = Response::default();
        assert!(matches!(
            resp.render("simple.html", &Context::new()),
            Err(Error::TemplateRendererNotSet)
        ));
    }

    #[test]
    fn renders_into_body() {
        let mut resp = Response::default();
        resp.set_template_renderer(Some(Arc::new(Fixed::simple())));

        let context = Context::from([("name".to_owned(), "John".to_owned())]);
        resp.render("with_context.html", &context).unwrap();

        assert_eq!(resp.body, b"<h1>Hello John</h1>");
        assert_eq!(resp.headers.get("Content-Type"), Some(HTML_CONTENT_TYPE));
    }

    #[test]
    fn renderer_error() {
        let mut resp = Response::default();
        resp.set_template_renderer(Some(Arc::new(Fixed::simple())));

        assert!(matches!(
            resp.render("missing.html", &Context::new()),
            Err(Error::Render(_))
        ));
    }
}
