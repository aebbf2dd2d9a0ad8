//! First-byte framing for PUT bodies.
//!
//! Finder and Explorer open a file by sending a PUT and only then decide
//! whether any bytes follow. To tell a zero-byte create apart from a real
//! upload without buffering, we wait for the first non-empty chunk (up to
//! a timeout) and hand back a stream that replays it followed by the
//! unread remainder.

use std::io;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt};

pub(crate) enum FramedBody {
    /// The client sent no bytes: connection closed, `Content-Length: 0`,
    /// or nothing arrived before the peek timeout.
    Empty,
    Data {
        head: Bytes,
        rest: BoxStream<'static, io::Result<Bytes>>,
    },
}

impl FramedBody {
    /// The body as one contiguous stream again.
    pub(crate) fn into_stream(self) -> BoxStream<'static, io::Result<Bytes>> {
        match self {
            FramedBody::Empty => stream::empty().boxed(),
            FramedBody::Data { head, rest } => stream::iter([Ok(head)]).chain(rest).boxed(),
        }
    }
}

/// Peek the first byte of `body` without consuming the stream.
///
/// Empty chunks are skipped; a stream error before any byte arrived is
/// reported as an error, afterwards it surfaces from the returned stream.
pub(crate) async fn frame_body(
    mut body: BoxStream<'static, io::Result<Bytes>>,
    peek_timeout: Duration,
) -> io::Result<FramedBody> {
    loop {
        let chunk = match tokio::time::timeout(peek_timeout, body.next()).await {
            Err(_) => return Ok(FramedBody::Empty),
            Ok(None) => return Ok(FramedBody::Empty),
            Ok(Some(res)) => res?,
        };
        if chunk.is_empty() {
            continue;
        }
        return Ok(FramedBody::Data { head: chunk, rest: body });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::TryStreamExt;

    const PEEK: Duration = Duration::from_millis(250);

    async fn collect(s: BoxStream<'static, io::Result<Bytes>>) -> Vec<u8> {
        s.try_fold(Vec::new(), |mut acc, b| async move {
            acc.extend_from_slice(&b);
            Ok(acc)
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn empty_body() {
        let body = stream::empty().boxed();
        match frame_body(body, PEEK).await.unwrap() {
            FramedBody::Empty => {}
            _ => panic!("expected empty"),
        }
    }

    #[tokio::test]
    async fn skips_empty_chunks() {
        let body = stream::iter([
            Ok(Bytes::new()),
            Ok(Bytes::from_static(b"he")),
            Ok(Bytes::from_static(b"llo")),
        ])
        .boxed();
        match frame_body(body, PEEK).await.unwrap() {
            FramedBody::Data { head, rest } => {
                assert_eq!(&head[..], b"he");
                let framed = FramedBody::Data { head, rest };
                assert_eq!(collect(framed.into_stream()).await, b"hello");
            }
            _ => panic!("expected data"),
        }
    }

    #[tokio::test]
    async fn peek_timeout_is_empty() {
        let body = stream::pending().boxed();
        match frame_body(body, Duration::from_millis(20)).await.unwrap() {
            FramedBody::Empty => {}
            _ => panic!("expected empty"),
        }
    }
}
