//! Per-session stack of propagation frames
//!
//! Each `begin` pushes exactly one frame, so the depth always equals the
//! number of begins not yet matched by a commit or rollback. A frame either
//! refers to a physical transaction handle or is idle (the unit of work runs
//! without a transaction). Joined frames share the handle below them; a
//! handle is released to the caller when the last frame referring to it is
//! popped, which is when the physical commit or rollback must happen.

use super::Propagation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Frame {
    handle: Option<usize>,
    propagation: Propagation,
}

/// What a `pop` removed
#[derive(Debug)]
pub struct Popped<T> {
    pub propagation: Propagation,
    /// The physical handle, when no remaining frame refers to it
    pub released: Option<T>,
}

/// LIFO stack of `(handle, propagation)` frames
#[derive(Debug)]
pub struct TxStack<T> {
    frames: Vec<Frame>,
    handles: Vec<T>,
}

impl<T> Default for TxStack<T> {
    fn default() -> Self {
        Self {
            frames: Vec::new(),
            handles: Vec::new(),
        }
    }
}

impl<T> TxStack<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open frames
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Number of distinct physical transactions held
    pub fn handle_count(&self) -> usize {
        self.handles.len()
    }

    /// True when the top frame runs inside a physical transaction
    pub fn has_active(&self) -> bool {
        self.frames.last().is_some_and(|f| f.handle.is_some())
    }

    /// The transaction the top frame runs in
    pub fn active_mut(&mut self) -> Option<&mut T> {
        let index = self.frames.last()?.handle?;
        self.handles.get_mut(index)
    }

    pub fn last_propagation(&self) -> Option<Propagation> {
        self.frames.last().map(|f| f.propagation)
    }

    /// Push a frame owning a freshly begun transaction
    pub fn push_new(&mut self, handle: T, propagation: Propagation) {
        self.handles.push(handle);
        self.frames.push(Frame {
            handle: Some(self.handles.len() - 1),
            propagation,
        });
    }

    /// Push a frame sharing the active transaction. Returns false, pushing
    /// nothing, when no transaction is active.
    pub fn push_join(&mut self, propagation: Propagation) -> bool {
        match self.frames.last().and_then(|f| f.handle) {
            Some(handle) => {
                self.frames.push(Frame {
                    handle: Some(handle),
                    propagation,
                });
                true
            }
            None => false,
        }
    }

    /// Push a frame that runs without a transaction
    pub fn push_idle(&mut self, propagation: Propagation) {
        self.frames.push(Frame {
            handle: None,
            propagation,
        });
    }

    /// Pop one frame, releasing its handle if nothing else refers to it
    pub fn pop(&mut self) -> Option<Popped<T>> {
        let frame = self.frames.pop()?;
        let released = match frame.handle {
            Some(index) if !self.frames.iter().any(|f| f.handle == Some(index)) => {
                debug_assert_eq!(index + 1, self.handles.len());
                self.handles.pop()
            }
            _ => None,
        };
        Some(Popped {
            propagation: frame.propagation,
            released,
        })
    }

    /// Remove every frame, returning the handles newest first
    pub fn drain(&mut self) -> Vec<T> {
        self.frames.clear();
        let mut handles = std::mem::take(&mut self.handles);
        handles.reverse();
        handles
    }
}
