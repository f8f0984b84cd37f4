//! FCP Test Kit - Testing infrastructure for FCP streaming connectors
//!
//! This crate provides:
//!
//! - [`MockStreamServer`] - wiremock server that answers a streaming endpoint
//!   with a delimited body or an error status, and records what was sent
//! - Fixtures for delimited bodies and the messages a stream carries
//! - Tracing configuration for test output
//!
//! # Example
//!
//! ```rust,ignore
//! use fcp_testkit::{MockStreamServer, fixtures};
//!
//! #[tokio::test]
//! async fn test_my_stream() {
//!     fcp_testkit::init_test_tracing();
//!
//!     let mock = MockStreamServer::start().await;
//!     mock.expect_stream(
//!         "/1.1/statuses/filter.json",
//!         fixtures::delimited_json_body(&[fixtures::tweet("1", "hello")]),
//!     )
//!     .await;
//!
//!     // point the connector at mock.base_url() ...
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod fixtures;
mod mock_server;
mod tracing_config;

pub use mock_server::*;
pub use tracing_config::*;
