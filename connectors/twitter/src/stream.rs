//! Filter stream connection lifecycle.
//!
//! A [`TwitterStream`] owns at most one current connection. Each connection
//! is driven by its own task, which consumes the transport's signals in order,
//! feeds body chunks through a [`DelimitedDecoder`], and publishes
//! [`StreamEvent`]s on the channel handed out at construction.
//!
//! The event channel holds [`EVENT_BUFFER`] events. When the consumer falls
//! behind, the driver waits for room, the transport's signal channel fills,
//! and the body stops being read.
//!
//! There is no reconnection. After a terminal `error` or `close` event the
//! stream is idle until [`TwitterStream::stream`] is called again.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use fcp_streaming::{DelimitedDecoder, Frame, StreamResult};
use parking_lot::Mutex;
use reqwest::Method;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, trace, warn};

use crate::{
    classify::{JsonDecoder, SerdeJsonDecoder, classify},
    config::{ParamsUpdate, TwitterConfig},
    error::TwitterResult,
    event::{CloseReason, StreamEvent, StreamFailure},
    oauth::AccessToken,
    transport::{
        HttpTransport, MAX_ACCEPTED_STATUS, SignedRequest, SignedTransport, TransportHandle,
        TransportSignal,
    },
};

/// Events buffered between the drivers and the consumer.
pub const EVENT_BUFFER: usize = 256;

/// Receiving half of the event channel.
pub type EventReceiver = mpsc::Receiver<StreamEvent>;

/// Observable state of the current connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection.
    Idle,
    /// Request sent, no response yet.
    Requesting,
    /// Response accepted, body streaming.
    Streaming,
}

/// Emission gate shared by a connection's driver and [`TwitterStream::destroy`].
///
/// Held for the duration of every send (not while waiting for channel
/// capacity), so once `destroy` has set it to
/// `false` nothing more from that connection reaches the channel.
type Gate = Arc<Mutex<bool>>;

struct Connection {
    id: u64,
    state: ConnectionState,
    gate: Gate,
    request: AbortHandle,
    driver: AbortHandle,
}

type Slot = Arc<Mutex<Option<Connection>>>;

/// Consumer of a `delimited=length` filter stream.
pub struct TwitterStream<T = HttpTransport> {
    config: TwitterConfig,
    transport: Arc<T>,
    decoder: Arc<dyn JsonDecoder>,
    events: mpsc::Sender<StreamEvent>,
    current: Slot,
    next_id: AtomicU64,
}

impl TwitterStream<HttpTransport> {
    /// Create a stream over HTTPS.
    ///
    /// Returns the stream and the receiver every event will arrive on.
    pub fn new(config: TwitterConfig) -> TwitterResult<(Self, EventReceiver)> {
        config.validate()?;
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(config, transport))
    }
}

impl<T: SignedTransport> TwitterStream<T> {
    /// Create a stream over a custom transport.
    #[must_use]
    pub fn with_transport(config: TwitterConfig, transport: T) -> (Self, EventReceiver) {
        Self::with_parts(config, transport, Arc::new(SerdeJsonDecoder))
    }

    /// Create a stream over a custom transport and payload decoder.
    #[must_use]
    pub fn with_parts(
        config: TwitterConfig,
        transport: T,
        decoder: Arc<dyn JsonDecoder>,
    ) -> (Self, EventReceiver) {
        let (events, receiver) = mpsc::channel(EVENT_BUFFER);
        let stream = Self {
            config,
            transport: Arc::new(transport),
            decoder,
            events,
            current: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(1),
        };
        (stream, receiver)
    }

    /// Open a new connection with the current parameters.
    ///
    /// Returns immediately; progress is reported through events. A connection
    /// that is already open is not aborted: it keeps delivering events until
    /// its own `error` or `close`, but can no longer be destroyed.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn stream(&self) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = SignedRequest {
            method: Method::POST,
            url: self.config.filter_url(),
            token: AccessToken::new(&self.config.access_token, &self.config.access_token_secret),
            params: vec![
                ("delimited".to_string(), "length".to_string()),
                ("stall_warnings".to_string(), "true".to_string()),
                ("track".to_string(), self.config.track.clone()),
            ],
        };

        info!(connection = id, url = %request.url, track = %self.config.track, "Opening filter stream");
        let handle = self.transport.open(request);
        let request_abort = handle.abort_handle();
        let gate: Gate = Arc::new(Mutex::new(true));

        // The slot stays locked until the connection is stored, so the driver
        // cannot finish against an empty slot.
        let mut slot = self.current.lock();
        let driver = Driver {
            id,
            handle,
            decoder: DelimitedDecoder::new(),
            json: Arc::clone(&self.decoder),
            emitter: Emitter {
                events: self.events.clone(),
                gate: Arc::clone(&gate),
            },
            slot: Arc::clone(&self.current),
        };
        let task = tokio::spawn(driver.run());

        if let Some(previous) = slot.replace(Connection {
            id,
            state: ConnectionState::Requesting,
            gate,
            request: request_abort,
            driver: task.abort_handle(),
        }) {
            warn!(
                previous = previous.id,
                connection = id,
                "Replacing an open connection; the previous one keeps running"
            );
        }
    }

    /// Merge new parameters. They take effect on the next [`Self::stream`].
    ///
    /// Consumer credentials are bound to the transport and cannot change.
    pub fn change_params(&mut self, update: ParamsUpdate) {
        for field in self.config.merge(update) {
            warn!(field, "Ignoring change to consumer credential");
        }
        debug!(track = %self.config.track, "Stream parameters updated");
    }
}

impl<T> TwitterStream<T> {
    /// Abort the current connection, if any.
    ///
    /// No event from that connection is emitted after this returns. Calling
    /// it again, or while idle, does nothing.
    pub fn destroy(&self) {
        let Some(connection) = self.current.lock().take() else {
            trace!("No connection to destroy");
            return;
        };

        *connection.gate.lock() = false;
        connection.request.abort();
        connection.driver.abort();
        info!(connection = connection.id, "Filter stream destroyed");
    }

    /// State of the current connection.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.current
            .lock()
            .as_ref()
            .map_or(ConnectionState::Idle, |c| c.state)
    }

    /// Whether a connection is open.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.current.lock().is_some()
    }

    /// Current parameters.
    #[must_use]
    pub const fn config(&self) -> &TwitterConfig {
        &self.config
    }
}

impl<T> Drop for TwitterStream<T> {
    fn drop(&mut self) {
        self.destroy();
    }
}

struct Emitter {
    events: mpsc::Sender<StreamEvent>,
    gate: Gate,
}

impl Emitter {
    /// Wait for channel capacity, then send if the gate is still open.
    async fn emit(&self, event: StreamEvent) {
        let Ok(permit) = self.events.reserve().await else {
            trace!("Event receiver dropped");
            return;
        };
        let open = self.gate.lock();
        if *open {
            permit.send(event);
        }
    }
}

struct Driver {
    id: u64,
    handle: TransportHandle,
    decoder: DelimitedDecoder,
    json: Arc<dyn JsonDecoder>,
    emitter: Emitter,
    slot: Slot,
}

impl Driver {
    async fn run(mut self) {
        let mut state = ConnectionState::Requesting;

        while let Some(signal) = self.handle.next_signal().await {
            match (state, signal) {
                (ConnectionState::Requesting, TransportSignal::RequestFailed(message)) => {
                    error!(connection = self.id, error = %message, "Filter stream request failed");
                    self.finish(Some(StreamEvent::Error(StreamFailure::Request { message })))
                        .await;
                    return;
                }
                (ConnectionState::Requesting, TransportSignal::Response { status })
                    if status > MAX_ACCEPTED_STATUS =>
                {
                    warn!(connection = self.id, status, "Filter stream rejected");
                    self.handle.abort();
                    self.finish(Some(StreamEvent::Error(StreamFailure::Response {
                        code: status,
                    })))
                    .await;
                    return;
                }
                (ConnectionState::Requesting, TransportSignal::Response { status }) => {
                    state = ConnectionState::Streaming;
                    self.set_state(state);
                    info!(connection = self.id, status, "Filter stream connected");
                    self.emitter.emit(StreamEvent::Connected).await;
                }
                (ConnectionState::Streaming, TransportSignal::Chunk(chunk)) => {
                    if let Err(e) = self.on_chunk(&chunk).await {
                        error!(connection = self.id, error = %e, "Filter stream line too long");
                        self.handle.abort();
                        self.finish(Some(StreamEvent::Close(CloseReason::SocketError(
                            e.to_string(),
                        ))))
                        .await;
                        return;
                    }
                }
                (ConnectionState::Streaming, TransportSignal::SocketError(message)) => {
                    warn!(connection = self.id, error = %message, "Filter stream socket error");
                    self.finish(Some(StreamEvent::Close(CloseReason::SocketError(message))))
                        .await;
                    return;
                }
                (ConnectionState::Streaming, TransportSignal::SocketEnd) => {
                    info!(connection = self.id, "Filter stream ended by server");
                    self.finish(Some(StreamEvent::Close(CloseReason::SocketEnd)))
                        .await;
                    return;
                }
                (ConnectionState::Streaming, TransportSignal::SocketClose) => {
                    info!(connection = self.id, "Filter stream socket closed");
                    self.handle.abort();
                    self.finish(None).await;
                    return;
                }
                (state, signal) => {
                    warn!(connection = self.id, ?state, ?signal, "Ignoring out-of-sequence transport signal");
                }
            }
        }

        debug!(connection = self.id, "Transport went away without a terminal signal");
        self.finish(None).await;
    }

    /// Emit the frames a chunk completes; fails if an unterminated line has
    /// outgrown the decoder's buffer.
    async fn on_chunk(&mut self, chunk: &[u8]) -> StreamResult<()> {
        for frame in self.decoder.feed(chunk) {
            match frame {
                Frame::Heartbeat => self.emitter.emit(StreamEvent::Heartbeat).await,
                Frame::Payload(payload) => {
                    let event = classify(self.json.as_ref(), &payload);
                    self.emitter.emit(event).await;
                }
                Frame::Length(_) => {}
            }
        }
        self.decoder.check_buffer()
    }

    fn set_state(&self, state: ConnectionState) {
        if let Some(connection) = self.slot.lock().as_mut().filter(|c| c.id == self.id) {
            connection.state = state;
        }
    }

    /// Terminal transition: clear the slot if it is still ours, emit the last
    /// event, and close the gate.
    async fn finish(&self, event: Option<StreamEvent>) {
        let permit = match event {
            Some(_) => self.emitter.events.reserve().await.ok(),
            None => None,
        };

        let mut open = self.emitter.gate.lock();
        {
            let mut slot = self.slot.lock();
            if slot.as_ref().is_some_and(|c| c.id == self.id) {
                *slot = None;
            }
        }
        if let (Some(permit), Some(event)) = (permit, event)
            && *open
        {
            permit.send(event);
        }
        *open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Transport that never answers.
    struct Silent;

    impl SignedTransport for Silent {
        fn open(&self, _request: SignedRequest) -> TransportHandle {
            let (tx, rx) = mpsc::channel(1);
            let task = tokio::spawn(async move {
                let _tx = tx;
                std::future::pending::<()>().await;
            });
            TransportHandle::new(rx, task.abort_handle())
        }
    }

    fn config() -> TwitterConfig {
        TwitterConfig {
            consumer_key: "ck".into(),
            consumer_secret: "cs".into(),
            access_token: "at".into(),
            access_token_secret: "ats".into(),
            track: "rust".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_rejects_missing_credentials() {
        let result = TwitterStream::new(TwitterConfig::default());
        assert!(matches!(result, Err(crate::TwitterError::Config(_))));
    }

    #[tokio::test]
    async fn test_stream_enters_requesting() {
        let (stream, _events) = TwitterStream::with_transport(config(), Silent);
        assert_eq!(stream.state(), ConnectionState::Idle);

        stream.stream();
        assert_eq!(stream.state(), ConnectionState::Requesting);
        assert!(stream.is_active());

        stream.destroy();
        assert_eq!(stream.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn test_destroy_while_idle_is_noop() {
        let (stream, mut events) = TwitterStream::with_transport(config(), Silent);
        stream.destroy();
        stream.destroy();
        assert!(!stream.is_active());
        assert!(
            tokio::time::timeout(Duration::from_millis(20), events.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_drop_closes_event_channel() {
        let (stream, mut events) = TwitterStream::with_transport(config(), Silent);
        stream.stream();
        drop(stream);
        assert!(events.recv().await.is_none());
    }

    #[test]
    fn test_change_params_keeps_consumer_key() {
        let (mut stream, _events) = TwitterStream::with_transport(config(), Silent);
        stream.change_params(ParamsUpdate {
            consumer_key: Some("other".into()),
            track: Some("tokio".into()),
            ..ParamsUpdate::default()
        });
        assert_eq!(stream.config().consumer_key, "ck");
        assert_eq!(stream.config().track, "tokio");
    }
}
