//! In-memory transports with controllable chunking and endings.

use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};

use bytes::{Buf, Bytes};
use tokio::io::{AsyncRead, ReadBuf};

/// What a [`ChunkedReader`] does once its payload is drained.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Tail {
    /// Report end of stream.
    #[default]
    Eof,
    /// Never complete another read.
    Stall,
    /// Fail every further read with this error kind.
    Fail(io::ErrorKind),
}

/// Transport that yields at most `chunk` bytes per read.
///
/// Implements both [`AsyncRead`] and [`std::io::Read`], so the same payload
/// can drive the asynchronous engine and its blocking adapters.
#[derive(Debug)]
pub struct ChunkedReader {
    data: Bytes,
    chunk: usize,
    tail: Tail,
    reads: usize,
}

impl ChunkedReader {
    /// Serve `data` in pieces of at most `chunk` bytes, then end.
    ///
    /// # Panics
    ///
    /// Panics if `chunk` is zero.
    pub fn new(data: impl Into<Bytes>, chunk: usize) -> Self {
        assert!(chunk > 0, "chunk size must be greater than zero");
        Self {
            data: data.into(),
            chunk,
            tail: Tail::Eof,
            reads: 0,
        }
    }

    /// Choose what happens after the payload is drained.
    #[must_use]
    pub fn with_tail(mut self, tail: Tail) -> Self {
        self.tail = tail;
        self
    }

    /// Number of reads served so far, including the final empty one.
    #[must_use]
    pub fn reads(&self) -> usize { self.reads }

    /// Bytes not yet handed out.
    #[must_use]
    pub fn remaining(&self) -> usize { self.data.len() }

    fn serve(&mut self, capacity: usize) -> Option<io::Result<Bytes>> {
        if self.data.is_empty() {
            return match self.tail {
                Tail::Eof => {
                    self.reads += 1;
                    Some(Ok(Bytes::new()))
                }
                Tail::Stall => None,
                Tail::Fail(kind) => {
                    self.reads += 1;
                    Some(Err(io::Error::new(kind, "scripted transport failure")))
                }
            };
        }
        self.reads += 1;
        let n = self.chunk.min(capacity).min(self.data.len());
        Some(Ok(self.data.split_to(n)))
    }
}

impl AsyncRead for ChunkedReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match this.serve(buf.remaining()) {
            Some(Ok(piece)) => {
                buf.put_slice(&piece);
                Poll::Ready(Ok(()))
            }
            Some(Err(err)) => Poll::Ready(Err(err)),
            None => Poll::Pending,
        }
    }
}

impl io::Read for ChunkedReader {
    fn read(&mut self, dest: &mut [u8]) -> io::Result<usize> {
        match self.serve(dest.len()) {
            Some(Ok(mut piece)) => {
                let n = piece.len();
                piece.copy_to_slice(&mut dest[..n]);
                Ok(n)
            }
            Some(Err(err)) => Err(err),
            None => Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "stalled transport cannot block",
            )),
        }
    }
}
