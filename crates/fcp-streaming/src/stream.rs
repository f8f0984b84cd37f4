//! Frame stream adapter.
//!
//! Wraps a byte stream (for example `reqwest::Response::bytes_stream`) and
//! yields decoded [`Frame`]s in arrival order.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use futures_util::stream::Stream;
use pin_project_lite::pin_project;

use crate::{DEFAULT_MAX_BUFFER_SIZE, DelimitedDecoder, Frame, StreamError, StreamResult};

pin_project! {
    /// Stream of frames decoded from a byte stream.
    ///
    /// Ends after reporting a buffer overflow.
    pub struct DelimitedStream<S> {
        #[pin]
        inner: S,
        decoder: DelimitedDecoder,
        pending: VecDeque<Frame>,
        overflow: Option<StreamError>,
        done: bool,
    }
}

impl<S> DelimitedStream<S> {
    /// Wrap a byte stream using the default buffer ceiling.
    pub fn new(inner: S) -> Self {
        Self::with_max_buffer_size(inner, DEFAULT_MAX_BUFFER_SIZE)
    }

    /// Wrap a byte stream, failing once an unterminated line exceeds `limit`.
    pub fn with_max_buffer_size(inner: S, limit: usize) -> Self {
        Self {
            inner,
            decoder: DelimitedDecoder::with_max_buffer_size(limit),
            pending: VecDeque::new(),
            overflow: None,
            done: false,
        }
    }

    /// The decoder driving this stream.
    pub const fn decoder(&self) -> &DelimitedDecoder {
        &self.decoder
    }
}

impl<S, E> Stream for DelimitedStream<S>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    type Item = StreamResult<Frame>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if let Some(frame) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(frame)));
            }
            if let Some(err) = this.overflow.take() {
                *this.done = true;
                return Poll::Ready(Some(Err(err)));
            }
            if *this.done {
                return Poll::Ready(None);
            }

            match ready!(this.inner.as_mut().poll_next(cx)) {
                Some(Ok(chunk)) => {
                    this.pending.extend(this.decoder.feed(&chunk));
                    if let Err(err) = this.decoder.check_buffer() {
                        *this.overflow = Some(err);
                    }
                }
                Some(Err(e)) => return Poll::Ready(Some(Err(StreamError::Transport(Box::new(e))))),
                None => {
                    *this.done = true;
                    return Poll::Ready(None);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{StreamExt, stream};

    type ChunkStream = stream::Iter<std::vec::IntoIter<Result<Bytes, std::io::Error>>>;

    fn chunks(parts: &[&'static [u8]]) -> ChunkStream {
        stream::iter(
            parts
                .iter()
                .map(|part| Ok(Bytes::from_static(*part)))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn test_stream_yields_frames_in_order() {
        let stream = DelimitedStream::new(chunks(&[b"4\r\nab\r\n", b"\r\n", b"5\r\nabc\r\n"]));
        let frames: Vec<_> = stream.map(|f| f.unwrap()).collect().await;

        assert_eq!(frames.len(), 5);
        assert!(matches!(&frames[1], Frame::Payload(p) if p.text() == "ab"));
        assert_eq!(frames[2], Frame::Heartbeat);
        assert!(matches!(&frames[4], Frame::Payload(p) if p.text() == "abc"));
    }

    #[tokio::test]
    async fn test_stream_buffer_overflow() {
        let mut stream =
            DelimitedStream::with_max_buffer_size(chunks(&[b"0123456789", b"0123456789"]), 16);

        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, StreamError::BufferOverflow { size: 20, limit: 16 }));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_stream_limit_applies_after_decoding() {
        let stream = DelimitedStream::with_max_buffer_size(
            chunks(&[b"4\r\nab\r\n5\r\nabc\r\n", b"4\r\ncd\r\n"]),
            8,
        );
        let frames: Vec<_> = stream.map(|f| f.unwrap()).collect().await;

        assert_eq!(frames.len(), 6);
        assert!(matches!(&frames[5], Frame::Payload(p) if p.text() == "cd"));
    }

    #[tokio::test]
    async fn test_stream_yields_frames_before_overflow() {
        let mut stream =
            DelimitedStream::with_max_buffer_size(chunks(&[b"4\r\nab\r\n0123456789"]), 8);

        assert!(matches!(stream.next().await, Some(Ok(Frame::Length(_)))));
        assert!(matches!(stream.next().await, Some(Ok(Frame::Payload(_)))));
        assert!(matches!(
            stream.next().await,
            Some(Err(StreamError::BufferOverflow { size: 10, limit: 8 }))
        ));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_stream_transport_error() {
        let inner = stream::iter(vec![Err::<Bytes, _>(std::io::Error::other("reset"))]);
        let mut stream = DelimitedStream::new(inner);

        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, StreamError::Transport(_)));
        assert!(stream.next().await.is_none());
    }
}
