//! Client-held streaming handles and the registry the background worker
//! scans each pass.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

/// Mutable state behind a [`StreamingHandle`]: position, radius, and the
/// dirty flag the worker clears after servicing a region load.
struct HandleState {
    position: (f32, f32),
    radius: u8,
    dirty: bool,
}

struct HandleInner {
    state: Mutex<HandleState>,
}

/// A client-held declaration of interest in the terrain around a position.
///
/// Dirty iff the position has ever changed, or the radius was set to a
/// value greater than its previous one. The background worker clears
/// `dirty` after it services a region load for this handle. Cloning shares
/// the same underlying state — the worker holds only a [`Weak`] reference,
/// so a handle stops being scanned once every clone of it is dropped.
#[derive(Clone)]
pub struct StreamingHandle {
    inner: Arc<HandleInner>,
}

impl StreamingHandle {
    pub(crate) fn new(position: (f32, f32), radius: u8) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                state: Mutex::new(HandleState {
                    position,
                    radius,
                    dirty: true, // dirty immediately after construction
                }),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<HandleInner> {
        Arc::downgrade(&self.inner)
    }

    pub fn position(&self) -> (f32, f32) {
        self.inner.state.lock().position
    }

    pub fn radius(&self) -> u8 {
        self.inner.state.lock().radius
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.state.lock().dirty
    }

    pub fn set_position(&self, position: (f32, f32)) {
        let mut state = self.inner.state.lock();
        if state.position != position {
            state.dirty = true;
        }
        state.position = position;
    }

    pub fn set_radius(&self, radius: u8) {
        let mut state = self.inner.state.lock();
        if radius > state.radius {
            state.dirty = true;
        }
        state.radius = radius;
    }
}

/// A snapshot of one handle's state, taken by the worker before deciding
/// whether to service it.
pub(crate) struct HandleSnapshot {
    pub position: (f32, f32),
    pub radius: u8,
}

/// The shared list of weakly-held handles the worker scans each pass.
pub(crate) struct HandleRegistry {
    handles: Mutex<Vec<Weak<HandleInner>>>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self {
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn register(&self, handle: &StreamingHandle) {
        self.handles.lock().push(handle.downgrade());
    }

    pub fn is_empty(&self) -> bool {
        self.handles.lock().iter().all(|w| w.upgrade().is_none())
    }

    /// Visits every still-live handle that is dirty and has `radius >= 1`,
    /// calling `f` with a snapshot of its state and clearing its dirty flag
    /// immediately after `f` returns. Dead weak references are dropped from
    /// the registry as part of this pass.
    pub fn service_dirty<F: FnMut(HandleSnapshot)>(&self, mut f: F) {
        let mut handles = self.handles.lock();
        handles.retain(|weak| {
            let Some(inner) = weak.upgrade() else {
                return false;
            };
            let snapshot = {
                let mut state = inner.state.lock();
                if state.radius < 1 || !state.dirty {
                    None
                } else {
                    let snapshot = HandleSnapshot {
                        position: state.position,
                        radius: state.radius,
                    };
                    state.dirty = false;
                    Some(snapshot)
                }
            };
            if let Some(snapshot) = snapshot {
                f(snapshot);
            }
            true
        });
    }
}
