//! Streaming line reader over a remote or local dataset.
//! The feed can be several gigabytes, so nothing here holds more than one
//! chunk plus one partial line in memory.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use tokio::io::AsyncReadExt;
use tracing::info;

use crate::error::{AppError, Result};

const FILE_CHUNK_SIZE: usize = 64 * 1024;

pub type ByteStream = BoxStream<'static, Result<Vec<u8>>>;

/// Where the importer reads rows from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportSource {
    Url(String),
    File(PathBuf),
}

impl ImportSource {
    /// `http://` and `https://` locations are downloaded, anything else is a path.
    pub fn parse(location: &str) -> Self {
        if location.starts_with("http://") || location.starts_with("https://") {
            ImportSource::Url(location.to_string())
        } else {
            ImportSource::File(PathBuf::from(location))
        }
    }

    /// Open the source as a stream of lines.
    pub async fn open(&self, connect_timeout: Duration) -> Result<LineSource<ByteStream>> {
        let chunks: ByteStream = match self {
            ImportSource::Url(url) => {
                // No overall timeout: the body is a long-running download.
                let client = reqwest::Client::builder()
                    .connect_timeout(connect_timeout)
                    .build()?;
                let resp = client.get(url).send().await?.error_for_status()?;
                info!(url = %url, content_length = ?resp.content_length(), "Streaming dataset");
                resp.bytes_stream()
                    .map(|chunk| chunk.map(|b| b.to_vec()).map_err(AppError::from))
                    .boxed()
            }
            ImportSource::File(path) => {
                let file = tokio::fs::File::open(path).await?;
                info!(path = %path.display(), "Reading dataset file");
                stream::unfold(file, |mut file| async move {
                    let mut buf = vec![0u8; FILE_CHUNK_SIZE];
                    match file.read(&mut buf).await {
                        Ok(0) => None,
                        Ok(n) => {
                            buf.truncate(n);
                            Some((Ok(buf), file))
                        }
                        Err(e) => Some((Err(AppError::from(e)), file)),
                    }
                })
                .boxed()
            }
        };
        Ok(LineSource::new(chunks))
    }
}

impl fmt::Display for ImportSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportSource::Url(url) => write!(f, "{url}"),
            ImportSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Splits a stream of byte chunks into lines. Handles LF and CRLF endings
/// and yields a final line that has no terminating newline.
pub struct LineSource<S> {
    chunks: S,
    buf: Vec<u8>,
    /// Start of the unconsumed region of `buf`.
    pos: usize,
    /// Bytes before this offset are known to contain no newline.
    scanned: usize,
    exhausted: bool,
}

impl<S, B> LineSource<S>
where
    S: Stream<Item = Result<B>> + Unpin,
    B: AsRef<[u8]>,
{
    pub fn new(chunks: S) -> Self {
        Self {
            chunks,
            buf: Vec::new(),
            pos: 0,
            scanned: 0,
            exhausted: false,
        }
    }

    /// Next line's raw bytes without its terminator, or `None` once the
    /// stream is drained. Decoding is left to the caller.
    pub async fn next_line(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            let search_from = self.scanned.max(self.pos);
            if let Some(i) = self.buf[search_from..].iter().position(|&b| b == b'\n') {
                let end = search_from + i;
                let line = decode(&self.buf[self.pos..end]);
                self.pos = end + 1;
                self.scanned = self.pos;
                return Ok(Some(line));
            }
            self.scanned = self.buf.len();

            if self.exhausted {
                if self.pos >= self.buf.len() {
                    return Ok(None);
                }
                let line = decode(&self.buf[self.pos..]);
                self.pos = self.buf.len();
                return Ok(Some(line));
            }

            match self.chunks.next().await {
                Some(chunk) => {
                    let chunk = chunk?;
                    self.buf.drain(..self.pos);
                    self.scanned -= self.pos;
                    self.pos = 0;
                    self.buf.extend_from_slice(chunk.as_ref());
                }
                None => self.exhausted = true,
            }
        }
    }
}

fn decode(raw: &[u8]) -> Vec<u8> {
    raw.strip_suffix(b"\r").unwrap_or(raw).to_vec()
}
