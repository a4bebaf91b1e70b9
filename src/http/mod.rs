//! HTTP/1.1 message model and protocol state machines.
//!
//! Nothing in this module touches a socket. Every reader and writer is a
//! [`Protocol`](signal::Protocol): a transition function from an optional
//! input [`Signal`](signal::Signal) to the next output signal. The I/O
//! driver in [`crate::io`] satisfies the demands.
//!
//! # Architecture
//!
//! - **`headers`**: ordered, case-insensitive multi-map of header fields
//! - **`fields`**: registry of well-known fields and whether they fold
//! - **`version`**, **`request`**, **`response`**: start lines and messages
//! - **`parser`**: start-line trait and the header-block parser
//! - **`body`**: identity and chunked bodies, framing traits, decoding
//! - **`transfer`**: body readers and writers
//! - **`reader`** / **`writer`**: whole-message state machines
//!
//! # Reader State Machine
//!
//! ```text
//!        ┌─────────────┐
//!        │    Empty    │
//!        └──────┬──────┘
//!               │ NeedLine
//!               ▼
//!        ┌──────────────────┐
//!        │ ParsingStartLine │ ← blank lines skipped
//!        └──────┬───────────┘
//!               │ start line parsed
//!               ▼
//!        ┌──────────────────┐
//!        │  ParsingHeaders  │ ← 1xx interim → ParsingStartLine
//!        └──────┬───────────┘
//!               │ blank line
//!               ├─ no body → Complete
//!               ▼
//!        ┌──────────────────┐
//!        │   ParsingBody    │ ← identity or chunked
//!        └──────┬───────────┘
//!               ▼
//!           Complete
//! ```
//!
//! # Example
//!
//! ```
//! use nbhttp::config::Limits;
//! use nbhttp::http::reader::MessageReader;
//! use nbhttp::http::request::Method;
//! use nbhttp::http::signal::{Protocol, Signal};
//! use bytes::Bytes;
//!
//! let mut reader = MessageReader::response(Limits::default(), false, &Method::GET);
//! assert_eq!(reader.step(None).unwrap(), Signal::NeedLine);
//! for line in ["HTTP/1.1 204 No Content\r\n", "\r\n"] {
//!     reader.step(Some(Signal::HaveLine(Bytes::from(line)))).unwrap();
//! }
//! assert!(reader.is_complete());
//! assert_eq!(reader.take_response().unwrap().status.as_u16(), 204);
//! ```

pub mod body;
pub mod fields;
pub mod headers;
pub mod parser;
pub mod reader;
pub mod request;
pub mod response;
pub mod signal;
pub mod transfer;
pub mod version;
pub mod writer;
