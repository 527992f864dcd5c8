//! Endpoint path declarations compiled into matchers.

use crate::Error;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use tracing::debug;

/// A whole segment that is a placeholder: `:name`.
static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^:([A-Za-z_][A-Za-z0-9_]*)$").expect("placeholder pattern is valid")
});

/// Compiled endpoint path.
///
/// A path is read in one of three ways:
///
/// | Declared path              | Kind     | Pattern                            |
/// |----------------------------|----------|------------------------------------|
/// | `^/static/(?P<path>.+)$`   | explicit | used verbatim                      |
/// | `/users/:id`               | simple   | `^/users/(?P<id>[^/]+)$`           |
/// | `/about`                   | simple   | `^/about$`                         |
/// | `/users/foo:id`, `/a/:1st` | literal  | none, compared as a plain string   |
///
/// - **Explicit**: starts with `^`. Never rewritten, even when it contains
///   `:name`-like text.
/// - **Simple**: every segment holding a colon is exactly `:name`, where
///   `name` is an ASCII letter or `_` followed by letters, digits and
///   `_`. Each such segment captures one or more non-`/` characters;
///   everything else matches verbatim.
/// - **Literal**: any other colon disables the rewrite and the path must
///   equal the declaration exactly.
///
/// Matching always covers the whole request path.
///
/// # Examples
/// ```
/// use gatekeeper::PathPattern;
///
/// let pattern = PathPattern::compile("/users/:id/:username/edit").unwrap();
/// let args = pattern.captures("/users/9/john/edit").unwrap();
///
/// assert_eq!(args["id"], "9");
/// assert_eq!(args["username"], "john");
/// assert!(pattern.captures("/users/9/john/edit/more").is_none());
/// ```
#[derive(Debug, Clone)]
pub struct PathPattern {
    source: String,
    kind: Kind,
}

#[derive(Debug, Clone)]
enum Kind {
    Regex { source: String, regex: Regex },
    Literal,
}

impl PathPattern {
    /// Compiles a declared path.
    ///
    /// Fails with [`Error::InvalidPath`] when the resulting expression
    /// does not compile, e.g. an unbalanced group or a repeated
    /// placeholder name.
    pub fn compile(path: &str) -> Result<Self, Error> {
        let kind = if path.starts_with('^') {
            // `\A..\z` keeps an explicit pattern anchored even without `$`
            let regex = build(path, &format!(r"\A(?:{path})\z"))?;
            Kind::Regex {
                source: path.to_owned(),
                regex,
            }
        } else {
            match simple_source(path) {
                Some(source) => Kind::Regex {
                    regex: build(path, &source)?,
                    source,
                },
                None => Kind::Literal,
            }
        };

        let pattern = match &kind {
            Kind::Regex { source, .. } => source.as_str(),
            Kind::Literal => "<literal>",
        };
        debug!(path, pattern, "endpoint path compiled");

        Ok(Self {
            source: path.to_owned(),
            kind,
        })
    }

    /// The declared path.
    #[inline]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The expression used for matching, `None` for a literal path.
    ///
    /// # Examples
    /// ```
    /// use gatekeeper::PathPattern;
    ///
    /// let regex = |path| PathPattern::compile(path).unwrap().regex_source().map(str::to_owned);
    ///
    /// assert_eq!(regex("/users/:id").as_deref(), Some("^/users/(?P<id>[^/]+)$"));
    /// assert_eq!(regex("^/users/:id").as_deref(), Some("^/users/:id"));
    /// assert_eq!(regex("/users/foo:id"), None);
    /// ```
    #[inline]
    pub fn regex_source(&self) -> Option<&str> {
        match &self.kind {
            Kind::Regex { source, .. } => Some(source),
            Kind::Literal => None,
        }
    }

    #[inline]
    pub fn is_match(&self, path: &str) -> bool {
        match &self.kind {
            Kind::Regex { regex, .. } => regex.is_match(path),
            Kind::Literal => path == self.source,
        }
    }

    /// Named captures of a full match, `None` when `path` does not match.
    ///
    /// Groups that took no part in the match are left out.
    pub fn captures(&self, path: &str) -> Option<HashMap<String, String>> {
        match &self.kind {
            Kind::Regex { regex, .. } => {
                let caps = regex.captures(path)?;

                Some(
                    regex
                        .capture_names()
                        .flatten()
                        .filter_map(|name| {
                            let value = caps.name(name)?;
                            Some((name.to_owned(), value.as_str().to_owned()))
                        })
                        .collect(),
                )
            }
            Kind::Literal => (path == self.source).then(HashMap::new),
        }
    }
}

fn build(path: &str, source: &str) -> Result<Regex, Error> {
    Regex::new(source).map_err(|source| Error::InvalidPath {
        path: path.to_owned(),
        source,
    })
}

// `None` when a colon does not form a whole `:name` segment
fn simple_source(path: &str) -> Option<String> {
    let mut source = String::with_capacity(path.len() + 16);
    source.push('^');

    for (i, segment) in path.split('/').enumerate() {
        if i > 0 {
            source.push('/');
        }

        if !segment.contains(':') {
            source.push_str(&regex::escape(segment));
            continue;
        }

        let name = PLACEHOLDER.captures(segment)?.get(1)?.as_str();
        source.push_str(&format!("(?P<{name}>[^/]+)"));
    }

    source.push('$');
    Some(source)
}
