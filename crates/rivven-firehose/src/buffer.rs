//! Time/size-triggered buffering in front of a [`DeliveryStream`]
//!
//! Records accumulate in a *buffer cycle*. The first record into an idle
//! buffer opens a cycle and arms a timer of `max_buffer_time`. The cycle is
//! flushed as a single `put_records` call when either the timer fires or the
//! queue reaches `max_buffer_size`, whichever comes first; the size threshold
//! cancels the timer. Every caller that contributed to a cycle resolves with
//! that cycle's result.
//!
//! ```text
//!   idle ── put_records ──▶ open(cycle n, timer armed)
//!                              │
//!            ┌─────────────────┼───────────────────┐
//!            ▼                 ▼                   ▼
//!      queue ≥ max_size   timer fires (n)     flush()
//!            │                 │                   │
//!            └──────── detach cycle n ─────────────┘
//!                              │
//!                 DeliveryStream::put_records(queue)
//!                              │
//!                   result sent to every waiter
//! ```
//!
//! Detaching happens under the state lock, so a cycle is flushed exactly
//! once. The timer carries the id of the cycle it was armed for and does
//! nothing if that cycle is already gone.

use crate::config::BufferConfig;
use crate::error::{DeliveryError, DeliveryErrors, DeliveryResult};
use crate::stream::DeliveryStream;
use crate::types::Record;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

type Completion = Option<DeliveryResult<()>>;

/// One accumulation window
struct BufferCycle {
    id: u64,
    queue: Vec<Record>,
    timer: Option<JoinHandle<()>>,
    completion: watch::Sender<Completion>,
}

#[derive(Default)]
struct BufferState {
    cycle: Option<BufferCycle>,
    next_cycle_id: u64,
}

/// A [`DeliveryStream`] that batches records across calls
pub struct QueuableDeliveryStream {
    stream: Arc<DeliveryStream>,
    config: BufferConfig,
    state: Arc<Mutex<BufferState>>,
}

impl std::fmt::Debug for QueuableDeliveryStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuableDeliveryStream")
            .field("stream", &self.stream.name())
            .field("config", &self.config)
            .field("queued", &self.queued_len())
            .finish()
    }
}

impl QueuableDeliveryStream {
    pub fn new(stream: impl Into<Arc<DeliveryStream>>, config: BufferConfig) -> Self {
        Self {
            stream: stream.into(),
            config,
            state: Arc::new(Mutex::new(BufferState::default())),
        }
    }

    /// Buffer with the thresholds from the stream's `buffer` section, or the
    /// defaults if it has none
    pub fn from_stream(stream: impl Into<Arc<DeliveryStream>>) -> Self {
        let stream = stream.into();
        let config = stream.config().buffer.unwrap_or_default();
        Self::new(stream, config)
    }

    /// The underlying stream
    pub fn stream(&self) -> &Arc<DeliveryStream> {
        &self.stream
    }

    pub fn buffer_config(&self) -> &BufferConfig {
        &self.config
    }

    /// Records waiting in the current cycle
    pub fn queued_len(&self) -> usize {
        self.state
            .lock()
            .cycle
            .as_ref()
            .map_or(0, |cycle| cycle.queue.len())
    }

    /// True when no cycle is open
    pub fn is_idle(&self) -> bool {
        self.state.lock().cycle.is_none()
    }

    pub async fn put_record(&self, record: Record) -> DeliveryResult<()> {
        self.put_records(vec![record]).await
    }

    /// Queue records and wait for the flush of the cycle they joined
    ///
    /// Calling this with no records on an idle buffer still opens a cycle;
    /// if nothing else arrives its timer flush resolves `Ok` without a sink
    /// call.
    pub async fn put_records(&self, records: Vec<Record>) -> DeliveryResult<()> {
        let (completion, full) = {
            let mut guard = self.state.lock();
            let BufferState {
                cycle,
                next_cycle_id,
            } = &mut *guard;

            let cycle = cycle.get_or_insert_with(|| {
                let id = *next_cycle_id;
                *next_cycle_id += 1;
                self.open_cycle(id)
            });
            cycle.queue.extend(records);
            let completion = cycle.completion.subscribe();

            let full = if cycle.queue.len() >= self.config.max_buffer_size {
                guard.cycle.take()
            } else {
                None
            };
            (completion, full)
        };

        if let Some(cycle) = full {
            self.start_flush(cycle, "size");
        }
        wait_for_completion(completion).await
    }

    /// Flush the current cycle now and wait for its result
    ///
    /// Resolves `Ok` immediately when the buffer is idle.
    pub async fn flush(&self) -> DeliveryResult<()> {
        let (cycle, completion) = {
            let mut guard = self.state.lock();
            let Some(cycle) = guard.cycle.take() else {
                return Ok(());
            };
            let completion = cycle.completion.subscribe();
            (cycle, completion)
        };

        self.start_flush(cycle, "explicit");
        wait_for_completion(completion).await
    }

    fn open_cycle(&self, id: u64) -> BufferCycle {
        debug!(
            "Stream '{}' opened buffer cycle {} (flush in {:?} or at {} record(s))",
            self.stream.name(),
            id,
            self.config.max_buffer_time(),
            self.config.max_buffer_size
        );
        let (completion, _) = watch::channel(None);
        BufferCycle {
            id,
            queue: Vec::new(),
            timer: Some(self.arm_timer(id)),
            completion,
        }
    }

    fn arm_timer(&self, id: u64) -> JoinHandle<()> {
        let stream = Arc::clone(&self.stream);
        let state = Arc::clone(&self.state);
        let delay = self.config.max_buffer_time();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let expired = {
                let mut guard = state.lock();
                if guard.cycle.as_ref().is_some_and(|cycle| cycle.id == id) {
                    guard.cycle.take()
                } else {
                    None
                }
            };

            if let Some(mut cycle) = expired {
                // Our own handle; dropping it detaches rather than aborts
                cycle.timer = None;
                flush_cycle(stream, cycle, "time").await;
            }
        })
    }

    fn start_flush(&self, mut cycle: BufferCycle, trigger: &'static str) {
        if let Some(timer) = cycle.timer.take() {
            timer.abort();
        }
        let stream = Arc::clone(&self.stream);
        tokio::spawn(async move {
            flush_cycle(stream, cycle, trigger).await;
        });
    }
}

async fn flush_cycle(stream: Arc<DeliveryStream>, cycle: BufferCycle, trigger: &'static str) {
    let BufferCycle {
        id,
        queue,
        completion,
        ..
    } = cycle;

    debug!(
        "Stream '{}' flushing buffer cycle {} ({} record(s), trigger: {})",
        stream.name(),
        id,
        queue.len(),
        trigger
    );
    let result = stream.put_records(queue).await;
    completion.send_replace(Some(result));
}

async fn wait_for_completion(mut completion: watch::Receiver<Completion>) -> DeliveryResult<()> {
    let outcome = completion
        .wait_for(Option::is_some)
        .await
        .map(|result| result.clone());

    match outcome {
        Ok(Some(result)) => result,
        Ok(None) | Err(_) => Err(DeliveryErrors::new(vec![DeliveryError::Transport {
            details: json!({ "message": "buffer cycle dropped before flush" }),
        }])),
    }
}
