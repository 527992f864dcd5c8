//! URL query string parser with flexible collection support.

use memchr::memchr;
use std::collections::HashMap;
use url::form_urlencoded;

/// URL query string parser.
///
/// Splits the string on `&` and `=` and decodes each name and value
/// (`+` becomes a space, `%XX` escapes are resolved, invalid UTF-8 is
/// replaced). Can be used to parse form data
/// (`application/x-www-form-urlencoded`) as well.
///
/// # Examples
/// ```rust
/// use gatekeeper::query::Query;
/// use std::collections::HashMap;
///
/// // Parse into Vec (preserves order)
/// let query = "name=john&age=25&city";
/// let vec_params: Vec<(String, String)> = Query::parse(query, 10).unwrap();
/// assert_eq!(vec_params.len(), 3);
///
/// // Parse into HashMap (deduplicates)
/// let hash_params: HashMap<String, String> = Query::parse(query, 10).unwrap();
/// assert_eq!(hash_params["age"], "25");
///
/// // Handle limits
/// let result = Query::parse::<Vec<(String, String)>>("a=1&b=2", 1);
/// assert!(result.is_err()); // Exceeds limit of 1 parameter
/// ```
/// Decoding:
/// ```rust
/// use gatekeeper::query::Query;
///
/// let params: Vec<(String, String)> =
///     Query::parse("q=hello+world&email=user%40example.com&flag", 10).unwrap();
///
/// assert_eq!(params[0], ("q".into(), "hello world".into()));
/// assert_eq!(params[1], ("email".into(), "user@example.com".into()));
/// assert_eq!(params[2], ("flag".into(), "".into()));
/// ```
pub struct Query;

impl Query {
    /// Parses a URL query string into a new collection.
    ///
    /// # Arguments
    /// - `query`: The query string
    ///   (handles optional leading `?` automatically, so `?a=1` and `a=1` are equivalent)
    /// - `limit`: Maximum number of parameters to parse
    #[inline]
    pub fn parse<C: QueryCollector>(query: &str, limit: usize) -> Result<C, Error> {
        let mut result = C::with_capacity(limit.min(16));
        Self::parse_into(&mut result, query, limit)?;
        Ok(result)
    }

    /// Parses a URL query string into an existing collection.
    ///
    /// Parameters are appended to whatever the collection already holds.
    /// Empty segments (`a=1&&b=2`) are skipped.
    ///
    /// # Examples
    /// ```
    /// use gatekeeper::query::Query;
    ///
    /// let mut collector = Vec::new();
    ///
    /// Query::parse_into(&mut collector, "a=1&b=2", 10).unwrap();
    /// Query::parse_into(&mut collector, "c=3&d=4", 10).unwrap();
    /// assert_eq!(collector.len(), 4); // parameters are appended
    ///
    /// let mut collector = Vec::new();
    /// let result = Query::parse_into(&mut collector, "a=1&b=2&c=3", 2);
    /// assert!(result.is_err()); // limit exceeded after 2 parameters
    /// ```
    pub fn parse_into<C: QueryCollector>(
        result: &mut C,
        query: &str,
        limit: usize,
    ) -> Result<(), Error> {
        let data = query.strip_prefix('?').unwrap_or(query).as_bytes();
        if data.is_empty() {
            return Err(Error::Empty);
        }

        let mut start = 0;
        while start < data.len() {
            // Find next '&' or end of string
            let end = memchr(b'&', &data[start..])
                .map(|pos| start + pos)
                .unwrap_or(data.len());

            if start < end {
                if result.length() >= limit {
                    return Err(Error::OverLimit(limit));
                }

                let segment = &data[start..end];
                let split = memchr(b'=', segment).unwrap_or(segment.len());
                let value = segment.get(split + 1..).unwrap_or_default();

                result.add_param(decode(&segment[..split]), decode(value));
            }

            start = end + 1;
        }

        Ok(())
    }
}

// `form_urlencoded` treats `=` as a separator, so it is escaped first
#[inline]
fn decode(bytes: &[u8]) -> String {
    let escaped;
    let bytes = match memchr(b'=', bytes) {
        Some(_) => {
            escaped = bytes.iter().fold(Vec::with_capacity(bytes.len() + 4), |mut acc, &b| {
                match b {
                    b'=' => acc.extend_from_slice(b"%3D"),
                    _ => acc.push(b),
                }
                acc
            });
            escaped.as_slice()
        }
        None => bytes,
    };

    form_urlencoded::parse(bytes)
        .next()
        .map(|(key, _)| key.into_owned())
        .unwrap_or_default()
}

/// A trait for types that can collect parsed query parameters.
///
/// # Examples
/// ```rust
/// use gatekeeper::query::{Query, QueryCollector};
///
/// struct Names(Vec<String>);
///
/// impl QueryCollector for Names {
///     fn add_param(&mut self, key: String, _value: String) {
///         self.0.push(key);
///     }
///
///     fn length(&self) -> usize {
///         self.0.len()
///     }
///
///     fn with_capacity(capacity: usize) -> Self {
///         Names(Vec::with_capacity(capacity))
///     }
/// }
///
/// let names: Names = Query::parse("a=1&b=2", 10).unwrap();
/// assert_eq!(names.0, ["a", "b"]);
/// ```
pub trait QueryCollector
where
    Self: Sized,
{
    /// Adds a decoded parameter to the collection.
    fn add_param(&mut self, key: String, value: String);

    /// Returns the current number of parameters in the collection.
    // `length` instead of `len` keeps clippy from asking for `is_empty`
    fn length(&self) -> usize;

    /// Creates a new collection with the specified capacity.
    fn with_capacity(capacity: usize) -> Self;
}

// Preserves parameter order
impl QueryCollector for Vec<(String, String)> {
    #[inline]
    fn add_param(&mut self, key: String, value: String) {
        self.push((key, value));
    }

    #[inline]
    fn length(&self) -> usize {
        self.len()
    }

    #[inline]
    fn with_capacity(capacity: usize) -> Self {
        Vec::with_capacity(capacity)
    }
}

// Deduplicates parameters (last wins)
impl QueryCollector for HashMap<String, String> {
    #[inline]
    fn add_param(&mut self, key: String, value: String) {
        self.insert(key, value);
    }

    #[inline]
    fn length(&self) -> usize {
        self.len()
    }

    #[inline]
    fn with_capacity(capacity: usize) -> Self {
        HashMap::with_capacity(capacity)
    }
}

/// Error types that can occur during query parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The number of parameters exceeded the specified limit.
    ///
    /// # Fields
    /// - `0`: The maximum allowed number of parameters
    #[error("Query parameter limit exceeded: limit={0}")]
    OverLimit(usize),

    /// The query string is empty or contains only a '?' character.
    #[error("Query string is empty or contains no parameters")]
    Empty,
}

#[cfg(test)]
mod parse_tests {
    use super::*;
    use crate::tools::*;

    #[test]
    fn basic() {
        let cases = ["a=1&b=2", "?a=1&b=2"];

        for line in cases {
            let params: Vec<(String, String)> = Query::parse(line, 8).unwrap();

            assert_eq!(params.len(), 2);
            assert_eq!(pair(&params[0]), ("a", "1"));
            assert_eq!(pair(&params[1]), ("b", "2"));
        }
    }

    #[test]
    fn full() {
        let params: Vec<(String, String)> = Query::parse("flag&empty=&=val&&key=value", 10).unwrap();

        assert_eq!(params.len(), 4);
        assert_eq!(pair(&params[0]), ("flag", ""));
        assert_eq!(pair(&params[1]), ("empty", ""));
        assert_eq!(pair(&params[2]), ("", "val"));
        assert_eq!(pair(&params[3]), ("key", "value"));
    }

    #[test]
    fn decoding() {
        let params: Vec<(String, String)> =
            Query::parse("na%20me=a+b&path=%2Fusers%2F9&bad=%zz&eq=a=b", 10).unwrap();

        assert_eq!(pair(&params[0]), ("na me", "a b"));
        assert_eq!(pair(&params[1]), ("path", "/users/9"));
        assert_eq!(pair(&params[2]), ("bad", "%zz"));
        assert_eq!(pair(&params[3]), ("eq", "a=b"));
    }

    #[test]
    fn last_value_wins_in_map() {
        let params: HashMap<String, String> = Query::parse("page=1&page=2", 10).unwrap();
        assert_eq!(params["page"], "2");
    }

    #[test]
    fn limit_error() {
        assert_eq!(
            Query::parse::<Vec<(String, String)>>("a&a", 1),
            Err(Error::OverLimit(1))
        );
    }

    #[test]
    fn empty_error() {
        for line in ["", "?"] {
            assert_eq!(
                Query::parse::<Vec<(String, String)>>(line, 10),
                Err(Error::Empty)
            );
        }
    }
}
