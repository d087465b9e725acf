#![doc(html_root_url = "https://docs.rs/batchframe/latest")]
//! Public API for the `batchframe` library.
//!
//! This crate frames and parses multipart batch payloads: a single body that
//! carries many independent HTTP requests or responses, optionally grouped
//! into change sets, behind one transport stream.
//!
//! The core is asynchronous. [`BatchReader`] walks a payload over any
//! [`tokio::io::AsyncRead`] and [`BatchWriter`] produces one over any
//! [`tokio::io::AsyncWrite`]; [`blocking`] wraps both for `std::io`
//! transports. Part bodies are exposed through [`ContentStream`], and the
//! reader or writer will not move past a part until its stream is disposed.

pub mod blocking;
pub mod config;
pub mod content;
pub mod cursor;
pub mod encoding;
pub mod error;
pub mod headers;
pub mod hooks;
pub mod message;
pub mod reader;
pub mod scanner;
pub mod uri;
pub mod writer;

pub use blocking::{BlockingBatchReader, BlockingBatchWriter, BlockingContentStream, SyncTransport};
pub use config::{BatchConfig, BatchLimits};
pub use content::{ContentStream, PartBody, PartSink, StreamMode};
pub use cursor::FramedCursor;
pub use encoding::HeaderEncoding;
pub use error::{BatchError, MalformedPayload, Result};
pub use headers::PartHeaders;
pub use hooks::{ContentStreamListener, OperationValidator};
pub use message::{
    BodyFraming,
    MessageHead,
    MessageKind,
    OperationMessage,
    OperationRequest,
    OperationResponse,
    RequestLine,
    StatusLine,
};
pub use reader::{BatchReader, BatchReaderState};
pub use uri::{PayloadUriOption, RequestTarget};
pub use writer::{BatchWriter, BatchWriterState};
