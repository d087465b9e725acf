//! Utilities for driving `batchframe` readers and writers in tests.
//!
//! [`ChunkedReader`] hands a payload out in fixed-size pieces so framing can
//! be exercised at every split point, [`BatchBuilder`] assembles raw batch
//! payloads by hand, and [`RecordingListener`] counts content stream
//! lifecycle notifications.
//!
//! ```rust
//! use batchframe_testing::{BatchBuilder, ChunkedReader};
//!
//! let payload = BatchBuilder::new("batch_1")
//!     .operation(Some("1"), "GET http://host/svc/Customers HTTP/1.1", &[], "")
//!     .finish();
//! let transport = ChunkedReader::new(payload, 3);
//! # let _ = transport;
//! ```

pub mod listener;
pub mod payloads;
pub mod transport;

pub use listener::{RecordingListener, recording_listener};
pub use payloads::BatchBuilder;
pub use transport::{ChunkedReader, Tail};
