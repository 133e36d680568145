//! Event types, async event sources and the preview refresh loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

// -------------------------------------------------------------------------------------------------
// Channel Policy
// -------------------------------------------------------------------------------------------------
// One bounded mpsc channel carries every event to the main loop. Producers await `send`, so a slow
// consumer applies backpressure instead of dropping events. A closed channel is the stop signal for
// every source.
// -------------------------------------------------------------------------------------------------
pub const EVENT_CHANNEL_CAP: usize = 1024;

/// Refresh ticks that found the document dirty and emitted a refresh.
pub static PREVIEW_REFRESHES: AtomicU64 = AtomicU64::new(0);
/// Refresh ticks skipped because nothing changed since the last refresh.
pub static PREVIEW_IDLE_TICKS: AtomicU64 = AtomicU64::new(0);

/// Top-level event enum consumed by the central event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Re-render the preview; emitted at most once per refresh interval.
    PreviewRefresh,
    /// The watched source file changed on disk.
    SourceChanged(PathBuf),
    /// An image fetch finished; observers should re-query the cache.
    ImageReady { base_uri: String, uri: String },
    Shutdown,
}

// -------------------------------------------------------------------------------------------------
// Async Event Sources
// -------------------------------------------------------------------------------------------------
// Each producer (refresh timer, file watcher bridge, image cache forwarder) owns one background task
// and pushes `Event`s into the shared channel. On send failure (consumer dropped) it must terminate
// promptly.

/// Trait implemented by any async event producer.
pub trait AsyncEventSource: Send + 'static {
    /// Stable identifier used in logs.
    fn name(&self) -> &'static str;
    /// Consume self and spawn the background task. Implementors stop when
    /// `tx.send(..).await` fails or on their own stop condition, and never busy loop.
    fn spawn(self: Box<Self>, tx: Sender<Event>) -> JoinHandle<()>;
}

/// Registry of event sources spawned together at startup.
pub struct EventSourceRegistry {
    sources: Vec<Box<dyn AsyncEventSource>>,
}

impl Default for EventSourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSourceRegistry {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    pub fn register<S: AsyncEventSource>(&mut self, src: S) {
        self.sources.push(Box::new(src));
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Spawn all registered sources, returning their JoinHandles. Each source receives its own
    /// `Sender` clone; the registry is drained so a second call spawns nothing.
    ///
    /// During shutdown the caller should drop its final `Sender` before awaiting the returned
    /// handles so sources observe the closed channel and exit.
    pub fn spawn_all(&mut self, tx: &Sender<Event>) -> Vec<JoinHandle<()>> {
        let mut out = Vec::with_capacity(self.sources.len());
        for src in self.sources.drain(..) {
            let name = src.name();
            info!(target: "runtime.events", source = name, "spawning_event_source");
            out.push(src.spawn(tx.clone()));
        }
        out
    }
}

// -------------------------------------------------------------------------------------------------
// Preview refresh
// -------------------------------------------------------------------------------------------------

/// Shared "edited since last refresh" flag. Starts dirty so the first tick renders.
#[derive(Debug, Clone)]
pub struct EditSignal(Arc<AtomicBool>);

impl Default for EditSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl EditSignal {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn mark(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Clear the flag, returning whether it was set.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }

    pub fn is_dirty(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Repeating timer that emits `Event::PreviewRefresh` on ticks where the edit
/// signal was set. Bursts of edits within one interval coalesce into one
/// refresh.
pub struct PreviewRefreshSource {
    interval: Duration,
    signal: EditSignal,
    cancel: CancellationToken,
}

/// Caller side of a `PreviewRefreshSource`.
#[derive(Debug, Clone)]
pub struct PreviewControl {
    signal: EditSignal,
    cancel: CancellationToken,
}

impl PreviewControl {
    pub fn notify_edit(&self) {
        self.signal.mark();
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl PreviewRefreshSource {
    pub fn new(interval: Duration) -> (Self, PreviewControl) {
        let signal = EditSignal::new();
        let cancel = CancellationToken::new();
        let control = PreviewControl {
            signal: signal.clone(),
            cancel: cancel.clone(),
        };
        (
            Self {
                interval,
                signal,
                cancel,
            },
            control,
        )
    }
}

impl AsyncEventSource for PreviewRefreshSource {
    fn name(&self) -> &'static str {
        "preview_refresh"
    }

    fn spawn(self: Box<Self>, tx: Sender<Event>) -> JoinHandle<()> {
        let Self {
            interval,
            signal,
            cancel,
        } = *self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!(target: "events.preview", "refresh_cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        if !signal.take() {
                            PREVIEW_IDLE_TICKS.fetch_add(1, Ordering::Relaxed);
                            continue;
                        }
                        PREVIEW_REFRESHES.fetch_add(1, Ordering::Relaxed);
                        if tx.send(Event::PreviewRefresh).await.is_err() {
                            debug!(target: "events.preview", "refresh_channel_closed");
                            break;
                        }
                    }
                }
            }
        })
    }
}

/// Owned preview refresh loop: spawn, notify edits, stop and join.
pub struct PreviewRefresher {
    control: PreviewControl,
    handle: Option<JoinHandle<()>>,
}

impl PreviewRefresher {
    pub fn spawn(interval: Duration, tx: &Sender<Event>) -> Self {
        let (source, control) = PreviewRefreshSource::new(interval);
        info!(
            target: "events.preview",
            interval_ms = interval.as_millis() as u64,
            "preview_refresher_started"
        );
        let handle = Box::new(source).spawn(tx.clone());
        Self {
            control,
            handle: Some(handle),
        }
    }

    pub fn control(&self) -> PreviewControl {
        self.control.clone()
    }

    pub fn notify_edit(&self) {
        self.control.notify_edit();
    }

    /// Cancel the loop and wait for it to finish.
    pub async fn stop(&mut self) {
        self.control.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!(target: "events.preview", "preview_refresher_stopped");
    }
}

impl Drop for PreviewRefresher {
    fn drop(&mut self) {
        self.control.cancel();
    }
}
