//! Convenient re-exports for the common types.
pub use crate::{
    backoff::{Backoff, BackoffError, MAX_BACKOFF},
    client::{Client, ClientBuilder},
    config::ClientConfig,
    error::RequestError,
    retry::{BuildError, RetryLayer, RetryPolicy, RetryPolicyBuilder, RetryState},
    sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper},
};
