// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Streamed completions that hold their model slot until they end.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use larder_core::{ChunkStream, LarderError};
use tokio::time::{Instant, Sleep};
use tokio_util::sync::{CancellationToken, DropGuard, WaitForCancellationFutureOwned};
use tracing::{debug, warn};

use crate::governor::ModelPermit;
use crate::recording;
use crate::selector::SelectionDecision;
use crate::stats::StatsBook;

/// The backend stream and the slot it occupies. Always dropped together.
struct Live {
    inner: ChunkStream,
    _permit: ModelPermit,
}

type SharedLive = Arc<Mutex<Option<Live>>>;

fn take_live(live: &SharedLive) -> Option<Live> {
    live.lock().unwrap_or_else(PoisonError::into_inner).take()
}

/// A chunk stream bound to one model call.
///
/// The backend stream and its model slot are released as soon as the
/// stream ends, fails, is dropped, or its cancellation token fires,
/// whichever happens first. Cancellation aborts generation and frees the
/// slot even if the consumer never polls again. Going longer than the
/// backend timeout without a chunk ends the stream with
/// [`LarderError::Timeout`].
pub struct CompletionStream {
    decision: SelectionDecision,
    live: SharedLive,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
    idle: Pin<Box<Sleep>>,
    idle_timeout: Duration,
    stats: Arc<StatsBook>,
    started: Instant,
    emitted_chars: usize,
    finished: bool,
    _watcher: DropGuard,
}

impl CompletionStream {
    pub(crate) fn new(
        inner: ChunkStream,
        decision: SelectionDecision,
        permit: ModelPermit,
        cancel: CancellationToken,
        idle_timeout: Duration,
        stats: Arc<StatsBook>,
    ) -> Self {
        let live: SharedLive = Arc::new(Mutex::new(Some(Live {
            inner,
            _permit: permit,
        })));
        let done = CancellationToken::new();

        // Tears down generation on cancellation without waiting for the next poll.
        {
            let live = live.clone();
            let cancel = cancel.clone();
            let done = done.clone();
            let model = decision.model.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = done.cancelled() => {}
                    _ = cancel.cancelled() => {
                        if let Some(live) = take_live(&live) {
                            drop(live);
                            debug!(model = %model, "stream cancelled, generation aborted");
                        }
                    }
                }
            });
        }

        Self {
            decision,
            live,
            cancelled: Box::pin(cancel.cancelled_owned()),
            idle: Box::pin(tokio::time::sleep(idle_timeout)),
            idle_timeout,
            stats,
            started: Instant::now(),
            emitted_chars: 0,
            finished: false,
            _watcher: done.drop_guard(),
        }
    }

    /// The selection that produced this stream.
    pub fn decision(&self) -> &SelectionDecision {
        &self.decision
    }

    pub fn model(&self) -> &str {
        &self.decision.model
    }

    fn release(&self) {
        drop(take_live(&self.live));
    }

    fn finish(&mut self, outcome: Result<(), &LarderError>) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.release();

        let model = self.decision.model.as_str();
        let latency = self.started.elapsed();
        match outcome {
            Ok(()) => {
                self.stats.record_success(
                    model,
                    latency,
                    (self.emitted_chars as u64).div_ceil(4),
                );
                recording::record_request(model, "success");
                recording::record_latency(model, latency.as_secs_f64());
                debug!(model, chars = self.emitted_chars, "stream completed");
            }
            Err(err) => {
                self.stats.record_failure(model, &err.to_string());
                recording::record_request(model, err.kind());
                warn!(model, error = %err, "stream ended with error");
            }
        }
    }
}

impl Stream for CompletionStream {
    type Item = Result<String, LarderError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        if this.cancelled.as_mut().poll(cx).is_ready() {
            let err = LarderError::Cancelled;
            this.finish(Err(&err));
            return Poll::Ready(Some(Err(err)));
        }

        let polled = {
            let mut live = this.live.lock().unwrap_or_else(PoisonError::into_inner);
            live.as_mut().map(|live| live.inner.as_mut().poll_next(cx))
        };
        let Some(polled) = polled else {
            // The watcher tore the call down before this poll saw the token.
            let err = LarderError::Cancelled;
            this.finish(Err(&err));
            return Poll::Ready(Some(Err(err)));
        };

        match polled {
            Poll::Ready(Some(Ok(chunk))) => {
                this.emitted_chars += chunk.chars().count();
                let deadline = Instant::now() + this.idle_timeout;
                this.idle.as_mut().reset(deadline);
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(err))) => {
                this.finish(Err(&err));
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                this.finish(Ok(()));
                Poll::Ready(None)
            }
            Poll::Pending => {
                if this.idle.as_mut().poll(cx).is_ready() {
                    let err = LarderError::Timeout {
                        model: this.decision.model.clone(),
                        duration: this.idle_timeout,
                    };
                    this.finish(Err(&err));
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Pending
            }
        }
    }
}

impl Drop for CompletionStream {
    fn drop(&mut self) {
        if !self.finished {
            self.finished = true;
            self.release();
            let model = self.decision.model.as_str();
            self.stats
                .record_failure(model, "stream dropped before completion");
            recording::record_request(model, "abandoned");
            debug!(model, "stream dropped by consumer");
        }
    }
}
