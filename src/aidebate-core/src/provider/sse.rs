//! Line splitting for Server-Sent-Events bodies.

use async_stream::try_stream;
use futures::{Stream, StreamExt};

use crate::error::ProviderError;

/// Yield the payload of every `data: ` line in an SSE body.
///
/// Lines are reassembled across chunk boundaries before decoding, so a
/// multi-byte character split between two chunks survives intact. Lines with
/// any other prefix (`event:`, comments, blanks) are dropped.
pub(crate) fn data_payloads<S, B, E>(
    body: S,
) -> impl Stream<Item = Result<String, ProviderError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: std::fmt::Display + Send,
{
    try_stream! {
        let mut body = Box::pin(body);
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = body.next().await {
            let chunk = chunk
                .map_err(|e| ProviderError::TransportError(format!("stream read error: {e}")))?;
            buffer.extend_from_slice(chunk.as_ref());

            while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=newline).collect();
                if let Some(data) = data_payload(&line) {
                    yield data;
                }
            }
        }

        // Final line without a trailing newline.
        if let Some(data) = data_payload(&buffer) {
            yield data;
        }
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end_matches(['\n', '\r']);
    match line.strip_prefix("data: ") {
        Some(data) => Some(data.to_owned()),
        None => {
            if !line.is_empty() {
                tracing::trace!(line, "ignoring non-data SSE line");
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(chunks: Vec<&'static [u8]>) -> Vec<Result<String, ProviderError>> {
        let body = futures::stream::iter(chunks.into_iter().map(Ok::<_, std::io::Error>));
        data_payloads(body).collect().await
    }

    #[tokio::test]
    async fn test_splits_lines_across_chunks() {
        let first = &b"data: {\"a\""[..];
        let second = &b":1}\n\nevent: ping\ndata: two\r\n"[..];
        let items = collect(vec![first, second]).await;
        let items: Vec<String> = items.into_iter().map(Result::unwrap).collect();
        assert_eq!(items, vec!["{\"a\":1}".to_string(), "two".to_string()]);
    }

    #[tokio::test]
    async fn test_multibyte_character_split_between_chunks() {
        let text = "data: caf\u{e9}\n".as_bytes();
        // Split inside the two-byte encoding of 'é'.
        let (head, tail) = text.split_at(10);
        let items = collect(vec![head, tail]).await;
        assert_eq!(items, vec![Ok("café".to_string())]);
    }

    #[tokio::test]
    async fn test_trailing_line_without_newline() {
        let items = collect(vec![&b"data: last"[..]]).await;
        assert_eq!(items, vec![Ok("last".to_string())]);
    }

    #[tokio::test]
    async fn test_transport_error_ends_with_error() {
        let body = futures::stream::iter(vec![
            Ok::<&'static [u8], String>(b"data: one\n"),
            Err("connection reset".to_string()),
        ]);
        let items: Vec<_> = data_payloads(body).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], Ok("one".to_string()));
        assert!(matches!(
            &items[1],
            Err(ProviderError::TransportError(msg)) if msg.contains("connection reset")
        ));
    }
}
