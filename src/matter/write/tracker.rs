//! Tracking of attribute paths claimed by in-flight write transactions.

use super::path::ConcreteAttributePath;
use log::debug;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Identity of one write handler.
pub type WriteHandlerId = u64;

/// Arbitrates between concurrent write transactions.
pub trait WriteHandlerDelegate: Send + Sync {
    /// Whether another transaction is currently writing `path`.
    fn has_conflict_write_requests(
        &self,
        handler: WriteHandlerId,
        path: &ConcreteAttributePath,
    ) -> bool;

    /// The attribute `handler` is working on changed; `None` when it is done.
    fn processing_path_changed(
        &self,
        _handler: WriteHandlerId,
        _path: Option<&ConcreteAttributePath>,
    ) {
    }
}

/// Registry of the attribute each live write handler is processing.
///
/// A chunked list write keeps its attribute claimed between chunks, so a
/// second transaction touching the same list is answered with `Busy` until
/// the first one finishes.
#[derive(Default)]
pub struct ActiveWrites {
    processing: Mutex<HashMap<WriteHandlerId, ConcreteAttributePath>>,
}

impl ActiveWrites {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attribute currently claimed by `handler`.
    pub fn processing_path(&self, handler: WriteHandlerId) -> Option<ConcreteAttributePath> {
        self.processing.lock().get(&handler).copied()
    }

    pub fn active_count(&self) -> usize {
        self.processing.lock().len()
    }
}

impl WriteHandlerDelegate for ActiveWrites {
    fn has_conflict_write_requests(
        &self,
        handler: WriteHandlerId,
        path: &ConcreteAttributePath,
    ) -> bool {
        let conflict = self
            .processing
            .lock()
            .iter()
            .any(|(id, p)| *id != handler && p == path);
        if conflict {
            debug!("Write conflict on {} for handler {}", path, handler);
        }
        conflict
    }

    fn processing_path_changed(
        &self,
        handler: WriteHandlerId,
        path: Option<&ConcreteAttributePath>,
    ) {
        let mut processing = self.processing.lock();
        match path {
            Some(path) => {
                processing.insert(handler, *path);
            }
            None => {
                processing.remove(&handler);
            }
        }
    }
}
