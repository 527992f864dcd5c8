//! The gateway contract between a hosting server and this library.
//!
//! Inbound, the server hands over an [`Environ`]: string variables named
//! after the CGI/WSGI conventions plus a readable input stream. Outbound,
//! a [`Response`](crate::Response) reports its status line and header
//! list through a `start_response` callback and returns a [`Body`].
//!
//! ```text
//!  hosting server                     gatekeeper
//! ----------------                   ------------
//!   Environ        ──────────────▶   Request::new
//!                                    Endpoint::handle_request
//!   start_response ◀──────────────   Response::wsgi
//!   Body chunks    ◀──────────────
//! ```

use std::{
    collections::HashMap,
    fmt,
    fs::File,
    io::{self, Read},
    path::{Path, PathBuf},
};

pub const REQUEST_METHOD: &str = "REQUEST_METHOD";
pub const PATH_INFO: &str = "PATH_INFO";
pub const QUERY_STRING: &str = "QUERY_STRING";
pub const SERVER_NAME: &str = "SERVER_NAME";
pub const SERVER_PORT: &str = "SERVER_PORT";
pub const REMOTE_ADDR: &str = "REMOTE_ADDR";
pub const CONTENT_LENGTH: &str = "CONTENT_LENGTH";
pub const CONTENT_TYPE: &str = "CONTENT_TYPE";
pub const URL_SCHEME: &str = "wsgi.url_scheme";
/// Prefix of every variable carrying a request header.
pub const HEADER_PREFIX: &str = "HTTP_";

/// Inbound per-request environment supplied by the hosting server.
///
/// # Examples
/// ```
/// use gatekeeper::gateway::Environ;
///
/// let environ = Environ::new()
///     .var("REQUEST_METHOD", "POST")
///     .var("PATH_INFO", "/users")
///     .var("HTTP_CONTENT_TYPE", "application/json")
///     .input(&b"{\"name\":\"john\"}"[..]);
///
/// assert_eq!(environ.get("REQUEST_METHOD"), Some("POST"));
/// assert_eq!(environ.get("QUERY_STRING"), None);
/// ```
#[derive(Default)]
pub struct Environ {
    vars: HashMap<String, String>,
    input: Option<Box<dyn Read + Send>>,
}

impl Environ {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a variable and returns the environ for chaining.
    pub fn var<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.insert(key, value);
        self
    }

    /// Sets the request body stream.
    pub fn input<R: Read + Send + 'static>(mut self, input: R) -> Self {
        self.input = Some(Box::new(input));
        self
    }

    pub fn insert<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.vars.insert(key.into(), value.into());
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Iterates over all variables in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Takes the input stream, leaving `None` behind.
    pub(crate) fn take_input(&mut self) -> Option<Box<dyn Read + Send>> {
        self.input.take()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Environ {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            input: None,
        }
    }
}

impl fmt::Debug for Environ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environ")
            .field("vars", &self.vars)
            .field("input", &self.input.as_ref().map(|_| ".."))
            .finish()
    }
}

// BODY

/// Outbound body source.
///
/// Iterating yields `io::Result<Vec<u8>>` chunks. An in-memory body yields
/// exactly one chunk. A file body opens the file only when iteration
/// starts, reads it in `chunk_size` pieces and closes it once exhausted or
/// when the iterator is dropped; every [`Body::iter`] call starts over from
/// the beginning of the file.
///
/// # Examples
/// ```
/// use gatekeeper::gateway::Body;
///
/// let body = Body::Bytes(b"hello".to_vec());
/// let chunks: Vec<Vec<u8>> = body.iter().collect::<Result<_, _>>().unwrap();
/// assert_eq!(chunks, [b"hello".to_vec()]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Bytes(Vec<u8>),
    File { path: PathBuf, chunk_size: usize },
}

impl Body {
    /// Starts a fresh pass over the body.
    pub fn iter(&self) -> Chunks<'_> {
        match self {
            Body::Bytes(bytes) => Chunks::Bytes(Some(bytes)),
            Body::File { path, chunk_size } => Chunks::File(FileChunks {
                path,
                chunk_size: (*chunk_size).max(1),
                file: None,
                done: false,
            }),
        }
    }

    /// Reads every chunk into one buffer.
    pub fn read_all(&self) -> io::Result<Vec<u8>> {
        let mut result = Vec::new();
        for chunk in self.iter() {
            result.extend_from_slice(&chunk?);
        }
        Ok(result)
    }

    /// Whether the body streams from a file.
    #[inline]
    pub fn is_file(&self) -> bool {
        matches!(self, Body::File { .. })
    }
}

impl<'a> IntoIterator for &'a Body {
    type Item = io::Result<Vec<u8>>;
    type IntoIter = Chunks<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the chunks of a [`Body`].
#[derive(Debug)]
pub enum Chunks<'a> {
    Bytes(Option<&'a Vec<u8>>),
    File(FileChunks<'a>),
}

impl Iterator for Chunks<'_> {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Chunks::Bytes(bytes) => bytes.take().map(|b| Ok(b.clone())),
            Chunks::File(file) => file.next(),
        }
    }
}

/// Lazy fixed-size reads from a file.
#[derive(Debug)]
pub struct FileChunks<'a> {
    path: &'a Path,
    chunk_size: usize,
    file: Option<File>,
    done: bool,
}

impl FileChunks<'_> {
    #[inline]
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn finish(&mut self) {
        self.done = true;
        self.file = None;
    }
}

impl Iterator for FileChunks<'_> {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if self.file.is_none() {
            match File::open(self.path) {
                Ok(file) => self.file = Some(file),
                Err(err) => {
                    self.finish();
                    return Some(Err(err));
                }
            }
        }
        let file = self.file.as_mut()?;

        let mut chunk = Vec::with_capacity(self.chunk_size);
        match file.by_ref().take(self.chunk_size as u64).read_to_end(&mut chunk) {
            Ok(0) => {
                self.finish();
                None
            }
            Ok(_) => Some(Ok(chunk)),
            Err(err) => {
                self.finish();
                Some(Err(err))
            }
        }
    }
}


#[cfg(test)]
mod body_tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_file(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn bytes_single_chunk() {
        let body = Body::Bytes(b"hello world".to_vec());

        let chunks: Vec<_> = body.iter().map(Result::unwrap).collect();
        assert_eq!(chunks, [b"hello world".to_vec()]);
        assert!(!body.is_file());
    }

    #[test]
    fn file_chunks() {
        let file = temp_file(b"hello world");
        let body = Body::File {
            path: file.path().to_owned(),
            chunk_size: 4,
        };

        let chunks: Vec<_> = body.iter().map(Result::unwrap).collect();
        assert_eq!(chunks, [b"hell".to_vec(), b"o wo".to_vec(), b"rld".to_vec()]);
        assert_eq!(body.read_all().unwrap(), b"hello world");
    }

    #[test]
    fn file_opened_lazily_and_released() {
        let file = temp_file(b"abc");
        let body = Body::File {
            path: file.path().to_owned(),
            chunk_size: 2,
        };

        let Chunks::File(mut chunks) = body.iter() else {
            panic!("expected a file iterator");
        };
        assert!(!chunks.is_open());

        assert_eq!(chunks.next().unwrap().unwrap(), b"ab");
        assert!(chunks.is_open());
        assert_eq!(chunks.next().unwrap().unwrap(), b"c");
        assert!(chunks.next().is_none());
        assert!(!chunks.is_open());
        assert!(chunks.next().is_none());
    }

    #[test]
    fn file_restarts_from_beginning() {
        let file = temp_file(b"hello world");
        let body = Body::File {
            path: file.path().to_owned(),
            chunk_size: 3,
        };

        let mut first = body.iter();
        assert_eq!(first.next().unwrap().unwrap(), b"hel");
        drop(first);

        assert_eq!(body.read_all().unwrap(), b"hello world");
        assert_eq!(body.read_all().unwrap(), b"hello world");
    }

    #[test]
    fn missing_file() {
        let body = Body::File {
            path: PathBuf::from("/definitely/not/here.txt"),
            chunk_size: 8,
        };

        let mut chunks = body.iter();
        assert!(chunks.next().unwrap().is_err());
        assert!(chunks.next().is_none());
    }

    #[test]
    fn empty_file() {
        let file = temp_file(b"");
        let body = Body::File {
            path: file.path().to_owned(),
            chunk_size: 8,
        };

        assert_eq!(body.iter().count(), 0);
    }
}
