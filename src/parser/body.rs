//! Request body streams.
//!
//! A [`Body`] yields the request payload as a sequence of events: a data
//! chunk (`Some(Ok(bytes))`), a stream error (`Some(Err(e))`), or the end of
//! the stream (`None`).

use std::fmt;
use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;

const CHUNK_SIZE: usize = 8192;

/// Sending side of a channel-backed [`Body`].
pub type BodySender = mpsc::Sender<io::Result<Vec<u8>>>;

/// A readable request body.
pub struct Body {
    kind: Kind,
}

enum Kind {
    Empty,
    Full(Option<Vec<u8>>),
    Reader {
        buffered: Option<Vec<u8>>,
        reader: Box<dyn AsyncRead + Send + Unpin>,
        remaining: usize,
    },
    Channel(mpsc::Receiver<io::Result<Vec<u8>>>),
}

impl Body {
    /// A body with no data.
    pub fn empty() -> Self {
        Self { kind: Kind::Empty }
    }

    /// A body that yields `bytes` as a single chunk.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: Kind::Full(Some(bytes.into())),
        }
    }

    /// A body of exactly `length` bytes read from a connection.
    ///
    /// `buffered` holds bytes already read past the request head. Anything
    /// beyond `length` is discarded. If the reader ends before `length`
    /// bytes arrive, the stream yields an `UnexpectedEof` error.
    pub fn from_reader(
        mut buffered: Vec<u8>,
        reader: Box<dyn AsyncRead + Send + Unpin>,
        length: usize,
    ) -> Self {
        buffered.truncate(length);
        let remaining = length - buffered.len();
        Self {
            kind: Kind::Reader {
                buffered: Some(buffered),
                reader,
                remaining,
            },
        }
    }

    /// A body fed through a channel. Dropping the sender ends the stream.
    pub fn channel(buffer: usize) -> (BodySender, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (tx, Self { kind: Kind::Channel(rx) })
    }

    /// Wait for the next stream event.
    pub async fn next_chunk(&mut self) -> Option<io::Result<Vec<u8>>> {
        match &mut self.kind {
            Kind::Empty => None,
            Kind::Full(bytes) => bytes.take().map(Ok),
            Kind::Reader {
                buffered,
                reader,
                remaining,
            } => {
                if let Some(bytes) = buffered.take().filter(|bytes| !bytes.is_empty()) {
                    return Some(Ok(bytes));
                }
                if *remaining == 0 {
                    return None;
                }

                let mut chunk = vec![0; CHUNK_SIZE.min(*remaining)];
                match reader.read(&mut chunk).await {
                    Ok(0) => {
                        let missing = *remaining;
                        *remaining = 0;
                        Some(Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            format!("connection closed with {missing} body bytes outstanding"),
                        )))
                    }
                    Ok(n) => {
                        *remaining -= n;
                        chunk.truncate(n);
                        Some(Ok(chunk))
                    }
                    Err(e) => {
                        *remaining = 0;
                        Some(Err(e))
                    }
                }
            }
            Kind::Channel(rx) => rx.recv().await,
        }
    }

    /// Read every chunk until the end of the stream and concatenate them.
    pub async fn collect(mut self) -> io::Result<Vec<u8>> {
        let mut data = Vec::new();
        while let Some(chunk) = self.next_chunk().await {
            data.extend_from_slice(&chunk?);
        }
        Ok(data)
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            Kind::Empty => "empty",
            Kind::Full(_) => "full",
            Kind::Reader { .. } => "reader",
            Kind::Channel(_) => "channel",
        };
        f.debug_struct("Body").field("kind", &kind).finish()
    }
}
