//! Client facade: shared configuration, exchanges and the multiplexor.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use nbhttp::client::Client;
//! use nbhttp::config::ClientConfig;
//! use nbhttp::http::request::Request;
//!
//! let client = Client::new(ClientConfig::default())?;
//! let exchanges = vec![
//!     client.exchange(Request::get("http://example.com/")?)?,
//!     client.exchange(Request::get("https://example.org/")?)?,
//! ];
//! for ex in client.join(exchanges, Duration::from_secs(10))? {
//!     match ex.into_response() {
//!         Ok(resp) => println!("{} {}", resp.status, resp.content().len()),
//!         Err(e) => eprintln!("failed: {}", e),
//!     }
//! }
//! # Ok::<(), nbhttp::error::HttpError>(())
//! ```

pub mod exchange;
pub mod multiplexor;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::ClientConfig;
use crate::error::Result;
use crate::http::request::Request;
use crate::io::tls::build_client_config;

pub use exchange::{Exchange, ExchangeState};
pub use multiplexor::{join, Multiplexor};

/// Owns configuration built once and shared with every exchange.
#[derive(Debug, Clone)]
pub struct Client {
    config: Arc<ClientConfig>,
    tls: Arc<rustls::ClientConfig>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let tls = build_client_config(&config.tls)?;
        info!(
            poll_interval_ms = config.poll_interval_ms,
            decompress = config.decompress,
            "client ready"
        );
        Ok(Self {
            config: Arc::new(config),
            tls,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Wraps `request` in an exchange, adding the configured `User-Agent`
    /// when the request has none.
    pub fn exchange(&self, mut request: Request) -> Result<Exchange> {
        if let Some(agent) = &self.config.user_agent {
            if !request.headers.contains("User-Agent") {
                request.headers.add("User-Agent", agent.clone());
            }
        }
        Exchange::new(request, self.config.clone(), Some(self.tls.clone()))
    }

    /// Runs one request to completion or until `timeout`.
    pub fn execute(&self, request: Request, timeout: Duration) -> Result<crate::http::response::Response> {
        let mut exchange = self.exchange(request)?;
        exchange.execute(timeout)?;
        exchange.into_response()
    }

    pub fn join(&self, exchanges: Vec<Exchange>, timeout: Duration) -> Result<Vec<Exchange>> {
        let mut exchanges = exchanges;
        Multiplexor::new(self.config.poll_interval()).run(&mut exchanges, timeout)?;
        Ok(exchanges)
    }
}
