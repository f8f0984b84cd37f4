//! FCP Twitter Stream - command-line consumer
//!
//! Opens a filter stream and prints every event to stdout as one JSON line.
//! Logs go to stderr.

#![forbid(unsafe_code)]

use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use fcp_twitter::{EventReceiver, SignedTransport, StreamEvent, TwitterConfig, TwitterStream};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// How often to check whether the connection has gone away.
const IDLE_CHECK: Duration = Duration::from_millis(200);

#[derive(Debug, Parser)]
#[command(name = "fcp-twitter-stream", version, about = "Consume a Twitter filter stream")]
struct Args {
    /// OAuth consumer key (API key)
    #[arg(long, env = "TWITTER_CONSUMER_KEY", hide_env_values = true)]
    consumer_key: String,

    /// OAuth consumer secret (API secret)
    #[arg(long, env = "TWITTER_CONSUMER_SECRET", hide_env_values = true)]
    consumer_secret: String,

    /// OAuth access token
    #[arg(long, env = "TWITTER_ACCESS_TOKEN", hide_env_values = true)]
    access_token: String,

    /// OAuth access token secret
    #[arg(long, env = "TWITTER_ACCESS_TOKEN_SECRET", hide_env_values = true)]
    access_token_secret: String,

    /// Comma-separated phrases to track
    #[arg(long, env = "TWITTER_TRACK", default_value = "")]
    track: String,

    /// Base URL of the streaming API
    #[arg(long, env = "TWITTER_STREAM_URL", default_value = "https://stream.twitter.com")]
    stream_url: String,

    /// Connect timeout in seconds
    #[arg(long, default_value_t = 30)]
    connect_timeout: u64,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

impl Args {
    fn into_config(self) -> TwitterConfig {
        TwitterConfig {
            consumer_key: self.consumer_key,
            consumer_secret: self.consumer_secret,
            access_token: self.access_token,
            access_token_secret: self.access_token_secret,
            track: self.track,
            stream_url: self.stream_url,
            connect_timeout: Duration::from_secs(self.connect_timeout),
            ..TwitterConfig::default()
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    tracing::info!("FCP Twitter stream starting");

    let (stream, mut events) =
        TwitterStream::new(args.into_config()).context("Invalid stream configuration")?;
    stream.stream();

    run(&stream, &mut events, &mut std::io::stdout(), tokio::signal::ctrl_c()).await
}

/// Print events until the connection ends or `shutdown` resolves.
///
/// A connection can end without a terminal event (socket close, transport
/// gone), so the stream is also polled for activity.
async fn run<T: SignedTransport>(
    stream: &TwitterStream<T>,
    events: &mut EventReceiver,
    out: &mut impl Write,
    shutdown: impl Future<Output = std::io::Result<()>>,
) -> Result<()> {
    tokio::pin!(shutdown);
    let mut idle_check = tokio::time::interval(IDLE_CHECK);
    let mut idle_ticks = 0;

    loop {
        tokio::select! {
            signal = &mut shutdown => {
                signal.context("Failed to listen for Ctrl-C")?;
                tracing::info!("Interrupted, closing stream");
                stream.destroy();
                break;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                write_event(out, &event)?;
                if event.is_terminal() {
                    break;
                }
            }
            _ = idle_check.tick() => {
                if stream.is_active() {
                    continue;
                }
                // A finishing connection leaves the slot before its last send.
                idle_ticks += 1;
                if idle_ticks > 1 {
                    while let Ok(event) = events.try_recv() {
                        write_event(out, &event)?;
                    }
                    tracing::info!("Filter stream closed");
                    break;
                }
            }
        }
    }

    Ok(())
}

fn write_event(out: &mut impl Write, event: &StreamEvent) -> Result<()> {
    writeln!(out, "{}", serde_json::to_string(event)?)?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use fcp_twitter::{SignedRequest, TransportHandle, TransportSignal};
    use tokio::sync::mpsc;

    /// Transport that connects, sends one heartbeat, then closes the socket.
    struct ClosingTransport;

    impl SignedTransport for ClosingTransport {
        fn open(&self, _request: SignedRequest) -> TransportHandle {
            let (tx, rx) = mpsc::channel(8);
            let task = tokio::spawn(async move {
                for signal in [
                    TransportSignal::Response { status: 200 },
                    TransportSignal::Chunk(Bytes::from_static(b"\r\n")),
                    TransportSignal::SocketClose,
                ] {
                    if tx.send(signal).await.is_err() {
                        return;
                    }
                }
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
            ..TwitterConfig::default()
        }
    }

    #[tokio::test]
    async fn test_run_exits_when_socket_closes_silently() {
        let (stream, mut events) = TwitterStream::with_transport(config(), ClosingTransport);
        stream.stream();

        let mut out = Vec::new();
        tokio::time::timeout(
            Duration::from_secs(2),
            run(&stream, &mut events, &mut out, std::future::pending()),
        )
        .await
        .expect("run did not notice the closed stream")
        .unwrap();

        let lines: Vec<serde_json::Value> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(
            lines,
            vec![
                serde_json::json!({"event": "connected"}),
                serde_json::json!({"event": "heartbeat"}),
            ]
        );
    }

    #[tokio::test]
    async fn test_run_destroys_stream_on_shutdown() {
        let (stream, mut events) = TwitterStream::with_transport(config(), ClosingTransport);
        stream.stream();

        let mut out = Vec::new();
        run(&stream, &mut events, &mut out, async { Ok(()) })
            .await
            .unwrap();
        assert!(out.is_empty());
        assert!(!stream.is_active());
    }
}
