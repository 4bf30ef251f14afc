// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Newline-delimited JSON decoding for Ollama's streaming responses.
//!
//! Network chunks do not align with lines, so bytes are buffered until a
//! `\n` arrives. Blank lines are skipped and a trailing line without a
//! newline is still decoded when the body ends.

use std::fmt::Display;
use std::pin::Pin;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use larder_core::LarderError;
use serde::de::DeserializeOwned;

type ByteStream<E> = Pin<Box<dyn Stream<Item = Result<Bytes, E>> + Send>>;

struct LineReader<E> {
    inner: ByteStream<E>,
    buf: Vec<u8>,
    finished: bool,
    model: String,
}

/// Decodes every line of `body` as a `T`.
///
/// A read error ends the stream after being yielded once.
pub fn decode_lines<T, S, E>(
    model: impl Into<String>,
    body: S,
) -> Pin<Box<dyn Stream<Item = Result<T, LarderError>> + Send>>
where
    T: DeserializeOwned + Send + 'static,
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + 'static,
{
    let reader = LineReader {
        inner: Box::pin(body),
        buf: Vec::new(),
        finished: false,
        model: model.into(),
    };

    stream::unfold(reader, |mut reader| async move {
        loop {
            if let Some(pos) = reader.buf.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = reader.buf.drain(..=pos).collect();
                let line = line.trim_ascii();
                if line.is_empty() {
                    continue;
                }
                let item = decode(&reader.model, line);
                return Some((item, reader));
            }

            if reader.finished {
                let rest = std::mem::take(&mut reader.buf);
                let rest = rest.trim_ascii();
                if rest.is_empty() {
                    return None;
                }
                let item = decode(&reader.model, rest);
                return Some((item, reader));
            }

            match reader.inner.next().await {
                Some(Ok(bytes)) => reader.buf.extend_from_slice(&bytes),
                Some(Err(err)) => {
                    reader.finished = true;
                    reader.buf.clear();
                    let err = LarderError::backend(&reader.model, format!("stream read failed: {err}"));
                    return Some((Err(err), reader));
                }
                None => reader.finished = true,
            }
        }
    })
    .boxed()
}

fn decode<T: DeserializeOwned>(model: &str, line: &[u8]) -> Result<T, LarderError> {
    serde_json::from_slice(line).map_err(|e| LarderError::Backend {
        model: model.to_string(),
        message: format!("malformed stream line: {e}"),
        source: Some(Box::new(e)),
    })
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Line {
        n: u32,
    }

    fn body(parts: &[&'static str]) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + use<> {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::from_static(p.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    async fn collect(parts: &[&'static str]) -> Vec<Result<Line, LarderError>> {
        decode_lines::<Line, _, _>("m", body(parts)).collect().await
    }

    #[tokio::test]
    async fn lines_split_across_chunks() {
        let lines = collect(&["{\"n\":1}\n{\"n\"", ":2}\n", "{\"n\":3}\n"]).await;
        let values: Vec<u32> = lines.into_iter().map(|l| l.unwrap().n).collect();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn blank_lines_and_crlf_are_ignored() {
        let lines = collect(&["{\"n\":1}\r\n\r\n\n{\"n\":2}\r\n"]).await;
        assert_eq!(lines.len(), 2);
    }

    #[tokio::test]
    async fn trailing_line_without_newline_is_decoded() {
        let lines = collect(&["{\"n\":1}\n{\"n\":2}"]).await;
        assert_eq!(lines.last().unwrap().as_ref().unwrap(), &Line { n: 2 });
    }

    #[tokio::test]
    async fn malformed_line_is_an_error_but_stream_continues() {
        let lines = collect(&["nope\n{\"n\":2}\n"]).await;
        assert!(matches!(lines[0], Err(LarderError::Backend { .. })));
        assert_eq!(lines[1].as_ref().unwrap().n, 2);
    }

    #[tokio::test]
    async fn read_error_ends_the_stream() {
        let parts = stream::iter(vec![
            Ok(Bytes::from_static(b"{\"n\":1}\n")),
            Err(std::io::Error::other("reset")),
            Ok(Bytes::from_static(b"{\"n\":2}\n")),
        ]);
        let lines: Vec<Result<Line, LarderError>> =
            decode_lines("m", parts).collect().await;
        assert_eq!(lines.len(), 2);
        assert!(lines[1].as_ref().unwrap_err().to_string().contains("reset"));
    }
}
