#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # insistent
//!
//! A JSON-over-HTTP(S) client that does not take the first failure for an answer.
//!
//! Every request is tried up to six times (one initial attempt plus five retries) with a
//! constant 100ms pause in between. Connection failures and responses with a status of 400 or
//! above are retried; everything else is final:
//!
//! - an unsupported URI scheme, an unparsable URI, or a body that cannot be serialized fails
//!   before any connection is made;
//! - a response body that breaks off after a good status fails immediately, and the fragment
//!   received so far is logged.
//!
//! Requests always carry `Accept: application/json` and `Content-Type: application/json`, plus
//! an API key header when one is configured. Response bodies come back as text.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use insistent::{Client, RequestError};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), RequestError> {
//!     let client = Client::builder().api_key("secret").build()?;
//!     let created =
//!         client.post("https://api.example.com/items", &json!({"hello": "world"})).await?;
//!     println!("{}", created);
//!
//!     // Or use the process-wide client configured from `API_KEY`.
//!     let listing = insistent::get("https://api.example.com/items").await?;
//!     println!("{}", listing);
//!     Ok(())
//! }
//! ```

pub mod backoff;
pub mod client;
pub mod config;
pub mod error;
pub mod prelude;
pub mod request;
pub mod retry;
pub mod sleeper;
pub mod transport;

// Re-exports
pub use backoff::{Backoff, BackoffError};
pub use client::{default_client, get, patch, post, Client, ClientBuilder};
pub use config::ClientConfig;
pub use error::RequestError;
pub use request::{Attempt, PreparedRequest, RequestBuilder, Scheme, Target};
pub use retry::{BuildError, RetryLayer, RetryPolicy, RetryPolicyBuilder, RetryService, RetryState};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use transport::HttpTransport;
