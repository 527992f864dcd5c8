//! `Set-Cookie` instructions, `Cookie` header parsing and the jar shared
//! between a response and its request.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use memchr::{memchr, memchr2};
use parking_lot::Mutex;
use std::{fmt, sync::Arc};

/// Name prefix reserved for flash messages.
pub const MESSAGE_PREFIX: &str = "MESSAGE:";

const EXPIRES_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// `SameSite` cookie policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SameSite {
    #[default]
    Strict,
    Lax,
    None,
}

impl SameSite {
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// A single cookie-set instruction.
///
/// Serializes to the value of one `Set-Cookie` header. Attributes always
/// appear in the order `Expires`, `Domain`, `Path`, `Secure`, `HttpOnly`,
/// `SameSite`; `HttpOnly` and `SameSite=Strict` are on unless disabled.
///
/// # Examples
/// ```
/// use gatekeeper::{Cookie, SameSite};
///
/// assert_eq!(
///     Cookie::new("token", "abc").to_string(),
///     "token=abc; HttpOnly; SameSite=Strict"
/// );
/// assert_eq!(
///     Cookie::new("token", "abc")
///         .domain("my.domain.com")
///         .path("/foo")
///         .secure(true)
///         .same_site(Some(SameSite::Lax))
///         .to_string(),
///     "token=abc; Domain=my.domain.com; Path=/foo; Secure; HttpOnly; SameSite=Lax"
/// );
/// assert_eq!(
///     Cookie::new("token", "abc").http_only(false).same_site(None).to_string(),
///     "token=abc"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    name: String,
    value: String,
    expires: Option<DateTime<Utc>>,
    domain: Option<String>,
    path: Option<String>,
    secure: bool,
    http_only: bool,
    same_site: Option<SameSite>,
}

impl Cookie {
    pub fn new<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            expires: None,
            domain: None,
            path: None,
            secure: false,
            http_only: true,
            same_site: Some(SameSite::Strict),
        }
    }

    /// An instruction that makes the client drop `name`.
    ///
    /// Empty value, `Expires` at the Unix epoch, no other attributes.
    pub fn expired<N: Into<String>>(name: N) -> Self {
        Self::new(name, "")
            .expires(DateTime::<Utc>::UNIX_EPOCH)
            .http_only(false)
            .same_site(None)
    }

    pub fn expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }

    pub fn domain<D: Into<String>>(mut self, domain: D) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn path<P: Into<String>>(mut self, path: P) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    /// `None` leaves the attribute out entirely.
    pub fn same_site(mut self, same_site: Option<SameSite>) -> Self {
        self.same_site = same_site;
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)?;

        if let Some(expires) = &self.expires {
            write!(f, "; Expires={}", expires.format(EXPIRES_FORMAT))?;
        }
        if let Some(domain) = &self.domain {
            write!(f, "; Domain={domain}")?;
        }
        if let Some(path) = &self.path {
            write!(f, "; Path={path}")?;
        }
        if self.secure {
            f.write_str("; Secure")?;
        }
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        if let Some(same_site) = self.same_site {
            write!(f, "; SameSite={}", same_site.as_str())?;
        }

        Ok(())
    }
}

// JAR

/// Cookie instructions of one response.
///
/// Cloning yields another handle to the same list, which is how a
/// [`Request`](crate::Request) keeps a link to the response it feeds.
#[derive(Debug, Clone, Default)]
pub struct CookieJar(Arc<Mutex<Vec<Cookie>>>);

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, cookie: Cookie) {
        self.0.lock().push(cookie);
    }

    /// Pushes `cookie` unless an identical instruction is already queued.
    ///
    /// Returns whether it was added.
    pub fn push_once(&self, cookie: Cookie) -> bool {
        let mut cookies = self.0.lock();
        if cookies.contains(&cookie) {
            return false;
        }
        cookies.push(cookie);
        true
    }

    /// Copies the instructions out in insertion order.
    pub fn to_vec(&self) -> Vec<Cookie> {
        self.0.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    /// Whether both handles point to the same list.
    pub fn same_jar(&self, other: &CookieJar) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// A new jar holding copies of the current instructions.
    pub(crate) fn detached(&self) -> Self {
        Self(Arc::new(Mutex::new(self.to_vec())))
    }
}

// PARSING

/// Parses a `Cookie` request header into a name → value map kept in the
/// order the client sent.
///
/// Pairs are separated by `;`. Values in double quotes are unquoted with
/// the legacy escapes: `\ooo` (octal code point) and `\c` (literal `c`).
/// Segments without `=` are skipped; at most `limit` cookies are kept.
///
/// # Examples
/// ```
/// use gatekeeper::parse_cookie_header;
///
/// let cookies = parse_cookie_header(r#"foo=bar; token="a\073b""#, 10);
/// assert_eq!(cookies["foo"], "bar");
/// assert_eq!(cookies["token"], "a;b");
/// ```
pub fn parse_cookie_header(header: &str, limit: usize) -> IndexMap<String, String> {
    let bytes = header.as_bytes();
    let mut cookies = IndexMap::new();
    let mut pos = 0;

    while pos < bytes.len() && cookies.len() < limit {
        let Some(eq) = memchr2(b'=', b';', &bytes[pos..]).map(|i| pos + i) else {
            break;
        };
        if bytes[eq] == b';' {
            pos = eq + 1;
            continue;
        }

        let name = header[pos..eq].trim();
        let value_start = eq + 1 + leading_spaces(&bytes[eq + 1..]);

        let value_end = match bytes.get(value_start) {
            Some(b'"') => closing_quote(bytes, value_start + 1),
            _ => memchr(b';', &bytes[value_start..])
                .map(|i| value_start + i)
                .unwrap_or(bytes.len()),
        };

        if !name.is_empty() {
            let value = header[value_start..value_end].trim_end();
            cookies.insert(name.to_owned(), unquote(value));
        }

        pos = memchr(b';', &bytes[value_end..])
            .map(|i| value_end + i + 1)
            .unwrap_or(bytes.len());
    }

    cookies
}

#[inline]
fn leading_spaces(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|b| b.is_ascii_whitespace()).count()
}

// Index just past the closing quote, or the end of input when unterminated
fn closing_quote(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

fn unquote(value: &str) -> String {
    let inner = match value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    {
        Some(inner) => inner,
        None => return value.to_owned(),
    };

    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            result.push(ch);
            continue;
        }

        let rest = chars.clone().take(3).collect::<String>();
        match octal_escape(&rest) {
            Some(decoded) => {
                result.push(decoded);
                chars.nth(2);
            }
            None => {
                if let Some(next) = chars.next() {
                    result.push(next);
                }
            }
        }
    }

    result
}

// `[0-3][0-7][0-7]`
fn octal_escape(digits: &str) -> Option<char> {
    let bytes = digits.as_bytes();
    if bytes.len() != 3 || !(b'0'..=b'3').contains(&bytes[0]) {
        return None;
    }
    if !bytes[1..].iter().all(|b| (b'0'..=b'7').contains(b)) {
        return None;
    }

    u32::from_str_radix(digits, 8).ok().and_then(char::from_u32)
}
