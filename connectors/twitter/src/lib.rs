//! FCP Twitter Stream Connector
//!
//! Consumer for Twitter's `statuses/filter` streaming endpoint using
//! `delimited=length` framing.
//!
//! A [`TwitterStream`] signs a POST with OAuth 1.0a, decodes the
//! length-delimited body with [`fcp_streaming::DelimitedDecoder`], classifies
//! every payload as JSON or garbage, and publishes everything that happens on
//! one ordered channel of [`StreamEvent`]s:
//!
//! | Event       | Emitted when                                |
//! |-------------|---------------------------------------------|
//! | `connected` | response status 200 or below                |
//! | `heartbeat` | bare `\r\n` keep-alive                      |
//! | `data`      | a payload that parses as JSON               |
//! | `garbage`   | a payload that does not                     |
//! | `error`     | request failure or a status above 200       |
//! | `close`     | socket error, or `"socket end"`             |
//!
//! ## Example
//!
//! ```no_run
//! use fcp_twitter::{TwitterConfig, TwitterStream};
//!
//! # async fn run() -> fcp_twitter::TwitterResult<()> {
//! let config = TwitterConfig {
//!     consumer_key: "ck".into(),
//!     consumer_secret: "cs".into(),
//!     access_token: "at".into(),
//!     access_token_secret: "ats".into(),
//!     track: "rust".into(),
//!     ..Default::default()
//! };
//!
//! let (stream, mut events) = TwitterStream::new(config)?;
//! stream.stream();
//! while let Some(event) = events.recv().await {
//!     println!("{}", event.name());
//!     if event.is_terminal() {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod classify;
mod config;
mod error;
mod event;
mod oauth;
mod stream;
mod transport;

pub use classify::{JsonDecoder, SerdeJsonDecoder, classify};
pub use config::{ParamsUpdate, TwitterConfig};
pub use error::{DecodeError, TwitterError, TwitterResult};
pub use event::{CloseReason, SOCKET_END, StreamEvent, StreamFailure};
pub use oauth::{AccessToken, OAuthSigner};
pub use stream::{ConnectionState, EVENT_BUFFER, EventReceiver, TwitterStream};
pub use transport::{
    HttpTransport, SignedRequest, SignedTransport, TransportHandle, TransportSignal,
};
