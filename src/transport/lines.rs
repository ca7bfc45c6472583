//! Line-oriented stream decoding (Bytes -> trimmed text lines)
//!
//! Both SSE (`data: {...}` lines) and NDJSON bodies are consumed one line at a
//! time; interpreting the line is left to the driver.

use bytes::Bytes;
use futures::{stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::{BoxStream, Error, ErrorContext, Result};

/// Split a byte stream into non-empty, whitespace-trimmed lines.
///
/// Bytes are buffered until a newline arrives, so multi-byte UTF-8 sequences
/// split across chunks decode correctly. The first error ends the stream.
pub fn line_stream(input: BoxStream<'static, Bytes>) -> BoxStream<'static, String> {
    let stream = stream::unfold(Some((input, Vec::<u8>::new())), |state| async move {
        let (mut input, mut buf) = state?;
        loop {
            if let Some(idx) = buf.iter().position(|b| *b == b'\n') {
                let raw: Vec<u8> = buf.drain(..=idx).collect();
                match decode_line(&raw) {
                    Ok(Some(line)) => return Some((Ok(line), Some((input, buf)))),
                    Ok(None) => continue,
                    Err(e) => return Some((Err(e), None)),
                }
            }

            match input.next().await {
                Some(Ok(bytes)) => buf.extend_from_slice(&bytes),
                Some(Err(e)) => return Some((Err(e), None)),
                None => {
                    // EOF: flush a trailing line without newline
                    return match decode_line(&buf) {
                        Ok(Some(line)) => Some((Ok(line), None)),
                        Ok(None) => None,
                        Err(e) => Some((Err(e), None)),
                    };
                }
            }
        }
    });

    Box::pin(stream)
}

fn decode_line(raw: &[u8]) -> Result<Option<String>> {
    let text = std::str::from_utf8(raw).map_err(|e| {
        Error::invalid_response_with_context(
            format!("stream line is not valid UTF-8: {}", e),
            ErrorContext::new().with_source("line_stream"),
        )
    })?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Ok(None)
    } else {
        Ok(Some(trimmed.to_string()))
    }
}

/// Tie a stream to a cancellation token.
///
/// Once the token fires the stream yields a single [`Error::Cancelled`] and
/// drops the inner stream (closing the underlying connection). The first error
/// from the inner stream is forwarded and ends the stream.
pub fn cancellable<T: Send + 'static>(
    inner: BoxStream<'static, T>,
    cancel: CancellationToken,
) -> BoxStream<'static, T> {
    let stream = stream::unfold(Some((inner, cancel)), |state| async move {
        let (mut inner, cancel) = state?;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Some((Err(Error::Cancelled), None)),
            item = inner.next() => match item {
                Some(Ok(v)) => Some((Ok(v), Some((inner, cancel)))),
                Some(Err(e)) => Some((Err(e), None)),
                None => None,
            },
        }
    });

    Box::pin(stream)
}
