use std::time::{Duration, Instant};

use bytes::Buf;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};

use crate::error::{UpstreamError, UpstreamResult};

/// "Tens of chunks and a few seconds" per §9 — exact values are left to the
/// implementer; these are the constants this implementation exposes.
pub const EMPTY_CHUNK_THRESHOLD: usize = 30;
pub const DATA_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SseRecord {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental SSE parser over a raw byte stream, with the empty-stream
/// policy layered on top: if no `data` record has arrived within
/// [`EMPTY_CHUNK_THRESHOLD`] chunks and [`DATA_TIMEOUT`], the stream is
/// considered dead and [`UpstreamError::EmptyStream`] is raised so the
/// dispatcher can emit a synthetic error event and terminate.
pub struct SseReader<S> {
    inner: std::pin::Pin<Box<dyn Stream<Item = Result<eventsource_stream::Event, eventsource_stream::EventStreamError<std::io::Error>>> + Send>>,
    chunks_seen: usize,
    started: Instant,
    got_data: bool,
    _marker: std::marker::PhantomData<S>,
}

impl<S, B, E> SseReader<S>
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: Buf,
    E: std::error::Error + Send + Sync + 'static,
{
    pub fn new(byte_stream: S) -> Self {
        Self {
            inner: Box::pin(byte_stream.eventsource()),
            chunks_seen: 0,
            started: Instant::now(),
            got_data: false,
            _marker: std::marker::PhantomData,
        }
    }

    /// Returns the next SSE record, `Ok(None)` on normal stream end, or
    /// `Err(EmptyStream)` once the policy above trips. Blank-data
    /// keep-alive records are swallowed rather than returned.
    pub async fn next_record(&mut self) -> UpstreamResult<Option<SseRecord>> {
        loop {
            if !self.got_data && self.chunks_seen >= EMPTY_CHUNK_THRESHOLD && self.started.elapsed() >= DATA_TIMEOUT {
                return Err(UpstreamError::EmptyStream);
            }

            let Some(event) = self.inner.next().await else {
                return Ok(None);
            };
            self.chunks_seen += 1;

            let event = match event {
                Ok(event) => event,
                Err(_) => {
                    log::warn!("SSE parsing error in upstream stream");
                    continue;
                }
            };

            if event.data.is_empty() {
                continue;
            }

            self.got_data = true;
            return Ok(Some(SseRecord {
                event: if event.event.is_empty() { None } else { Some(event.event) },
                data: event.data,
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::stream;

    use super::*;

    #[tokio::test]
    async fn parses_data_lines_into_records() {
        let chunks: Vec<Result<bytes::Bytes, std::io::Error>> = vec![
            Ok(bytes::Bytes::from_static(b"event: message\ndata: {\"a\":1}\n\n")),
            Ok(bytes::Bytes::from_static(b"data: [DONE]\n\n")),
        ];
        let mut reader = SseReader::new(stream::iter(chunks));

        let first = reader.next_record().await.unwrap().unwrap();
        assert_eq!(first.event.as_deref(), Some("message"));
        assert_eq!(first.data, "{\"a\":1}");

        let second = reader.next_record().await.unwrap().unwrap();
        assert_eq!(second.data, "[DONE]");

        assert!(reader.next_record().await.unwrap().is_none());
    }
}
