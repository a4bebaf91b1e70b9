//! nbhttp - non-blocking HTTP/1.1 client engine
//!
//! Protocol state machines, a buffering I/O driver over plain and TLS
//! sockets, and a readiness-based multiplexor that runs many requests on
//! one thread.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod io;

pub use client::{join, Client, Exchange, ExchangeState};
pub use config::ClientConfig;
pub use error::{HttpError, Result};
pub use http::request::{Method, Request, RequestBuilder};
pub use http::response::{Response, StatusCode};
