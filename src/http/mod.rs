//! HTTP module containing client setup and the range probe.
//!
//! - [`client`] - HTTP client creation and middleware configuration
//! - [`probe`] - Discovery of size and range support of a resource

pub mod client;
pub mod probe;

pub use client::{create_http_client, HttpClientConfig, DEFAULT_USER_AGENT};
pub use probe::{Capabilities, RangeProbe};
