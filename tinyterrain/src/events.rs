//! Per-terrain "chunk loaded" notifications.
//!
//! The original design fired this event from a single process-wide
//! singleton. Re-architected per-instance: each `TerrainStore` owns one
//! notifier, and dispatch happens through a bounded channel drained by a
//! dedicated thread so a slow subscriber can never block the file lock that
//! produced the event (Open Question 5).

use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::warn;

use crate::coord::Coord2;

/// Why a chunk was loaded into the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkLoadCause {
    /// Loaded on demand by a direct `get`/`set` call.
    Demand,
    /// Loaded by the background streaming worker.
    Prefetch,
}

/// A `(coordinate, cause)` notification for one loaded chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLoadedEvent {
    pub coord: Coord2,
    pub cause: ChunkLoadCause,
}

/// A boxed subscriber callback, invoked once per event, off the calling
/// thread that produced it.
pub type ChunkLoadedCallback = Box<dyn Fn(ChunkLoadedEvent) + Send + Sync>;

const CHANNEL_CAPACITY: usize = 256;

/// Owns the bounded channel and the drain thread for one terrain's
/// chunk-loaded notifications.
pub(crate) struct ChunkLoadedNotifier {
    sender: Option<SyncSender<ChunkLoadedEvent>>,
    drain_thread: Option<JoinHandle<()>>,
}

impl ChunkLoadedNotifier {
    pub fn new(subscriber: Option<ChunkLoadedCallback>) -> Self {
        let (sender, receiver): (_, Receiver<ChunkLoadedEvent>) = sync_channel(CHANNEL_CAPACITY);
        let drain_thread = subscriber.map(|callback| {
            std::thread::Builder::new()
                .name("tinyterrain-notify".into())
                .spawn(move || {
                    while let Ok(event) = receiver.recv() {
                        callback(event);
                    }
                })
                .expect("failed to spawn chunk-loaded notifier thread")
        });
        Self {
            sender: Some(sender),
            drain_thread,
        }
    }

    /// Best-effort publish: drops the event (with a logged warning) rather
    /// than block the file lock if the channel is full.
    pub fn publish(&self, coord: Coord2, cause: ChunkLoadCause) {
        let Some(sender) = &self.sender else {
            return;
        };
        match sender.try_send(ChunkLoadedEvent { coord, cause }) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(?coord, "chunk-loaded notification dropped: subscriber too slow");
            }
            Err(TrySendError::Disconnected(_)) => {
                // No subscriber registered; nothing to do.
            }
        }
    }
}

impl Drop for ChunkLoadedNotifier {
    fn drop(&mut self) {
        // Drop the sender first so the drain thread's `recv` unblocks.
        self.sender.take();
        if let Some(handle) = self.drain_thread.take() {
            let _ = handle.join();
        }
    }
}

/// Shared handle so multiple worker components can publish through the
/// same notifier without fighting over ownership.
pub(crate) type SharedNotifier = Arc<ChunkLoadedNotifier>;
