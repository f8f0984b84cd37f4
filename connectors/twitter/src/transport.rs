//! Signed streaming transport.
//!
//! The lifecycle manager never touches HTTP directly. It hands a
//! [`SignedRequest`] to a [`SignedTransport`] and consumes the
//! [`TransportSignal`]s that come back, in order, over one channel.

use bytes::Bytes;
use futures_util::StreamExt;
use reqwest::{Client, Method, header::AUTHORIZATION};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, error, instrument};

use crate::{
    config::TwitterConfig,
    error::TwitterResult,
    oauth::{AccessToken, OAuthSigner},
};

/// Signals buffered between the transport and its consumer.
const SIGNAL_BUFFER: usize = 64;

/// Highest status that counts as a successful connection.
pub(crate) const MAX_ACCEPTED_STATUS: u16 = 200;

/// A request to be signed and sent.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    /// HTTP method.
    pub method: Method,
    /// Endpoint URL without query string.
    pub url: String,
    /// User token the request is signed with.
    pub token: AccessToken,
    /// Form parameters for POST, query parameters otherwise.
    pub params: Vec<(String, String)>,
}

/// What a transport reports about one request, in order.
///
/// A request produces either a single `RequestFailed`, or one `Response`
/// followed by any number of `Chunk`s and then the socket conditions. A
/// `Response` with a status above 200 is the last signal; its body is not
/// read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSignal {
    /// The request could not be dispatched.
    RequestFailed(String),
    /// Response headers arrived.
    Response {
        /// HTTP status code.
        status: u16,
    },
    /// A piece of the response body.
    Chunk(Bytes),
    /// Reading the body failed.
    SocketError(String),
    /// The body ended.
    SocketEnd,
    /// The connection closed.
    SocketClose,
}

/// Handle to one in-flight request.
#[derive(Debug)]
pub struct TransportHandle {
    signals: mpsc::Receiver<TransportSignal>,
    producer: AbortHandle,
}

impl TransportHandle {
    /// Wrap a signal receiver and the task producing into it.
    #[must_use]
    pub const fn new(signals: mpsc::Receiver<TransportSignal>, producer: AbortHandle) -> Self {
        Self { signals, producer }
    }

    /// Next signal, or `None` once the producer is gone.
    pub async fn next_signal(&mut self) -> Option<TransportSignal> {
        self.signals.recv().await
    }

    /// Stop the request. Calling this again has no further effect.
    pub fn abort(&self) {
        self.producer.abort();
    }

    /// A detached handle that aborts the same request.
    #[must_use]
    pub fn abort_handle(&self) -> AbortHandle {
        self.producer.clone()
    }
}

/// Something that can issue signed streaming requests.
///
/// `open` must not block: it starts the request and returns a handle
/// immediately. It is called from within a Tokio runtime.
pub trait SignedTransport: Send + Sync + 'static {
    /// Start a request.
    fn open(&self, request: SignedRequest) -> TransportHandle;
}

/// [`SignedTransport`] over `reqwest` with OAuth 1.0a signing.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    signer: OAuthSigner,
}

impl HttpTransport {
    /// Build a transport for the consumer credentials in `config`.
    pub fn new(config: &TwitterConfig) -> TwitterResult<Self> {
        // No overall timeout: the response body never ends on its own.
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(format!("fcp-twitter/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            signer: OAuthSigner::new(&config.consumer_key, &config.consumer_secret),
        })
    }
}

impl SignedTransport for HttpTransport {
    fn open(&self, request: SignedRequest) -> TransportHandle {
        let (tx, rx) = mpsc::channel(SIGNAL_BUFFER);
        let task = tokio::spawn(run_request(
            self.client.clone(),
            self.signer.clone(),
            request,
            tx,
        ));
        TransportHandle::new(rx, task.abort_handle())
    }
}

#[instrument(skip_all, fields(method = %request.method, url = %request.url))]
async fn run_request(
    client: Client,
    signer: OAuthSigner,
    request: SignedRequest,
    tx: mpsc::Sender<TransportSignal>,
) {
    let auth_header = match signer.sign(
        request.method.as_str(),
        &request.url,
        &request.token,
        &request.params,
    ) {
        Ok(header) => header,
        Err(e) => {
            error!(error = %e, "Failed to sign stream request");
            let _ = tx.send(TransportSignal::RequestFailed(e.to_string())).await;
            return;
        }
    };

    let mut req = client
        .request(request.method.clone(), &request.url)
        .header(AUTHORIZATION, auth_header);
    req = if request.method == Method::POST {
        req.form(&request.params)
    } else {
        req.query(&request.params)
    };

    let response = match req.send().await {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, "Stream request failed");
            let _ = tx.send(TransportSignal::RequestFailed(e.to_string())).await;
            return;
        }
    };

    let status = response.status().as_u16();
    debug!(status, "Received stream response");
    if tx.send(TransportSignal::Response { status }).await.is_err() {
        return;
    }
    if status > MAX_ACCEPTED_STATUS {
        debug!(status, "Stream rejected, discarding body");
        return;
    }

    let mut body = response.bytes_stream();
    let terminal = loop {
        match body.next().await {
            Some(Ok(chunk)) => {
                if tx.send(TransportSignal::Chunk(chunk)).await.is_err() {
                    debug!("Signal receiver dropped, abandoning body");
                    return;
                }
            }
            Some(Err(e)) => break TransportSignal::SocketError(e.to_string()),
            None => break TransportSignal::SocketEnd,
        }
    };

    if tx.send(terminal).await.is_ok() {
        let _ = tx.send(TransportSignal::SocketClose).await;
    }
}
