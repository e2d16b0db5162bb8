// edgert: Label store
// Named fixed-size shared variables with linearisable per-label reads/writes

use crate::error::{RtError, RtResult};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::debug;

/// Opaque, stable identifier of a registered label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LabelId(pub(crate) u32);

impl LabelId {
    /// Raw index value, for diagnostics only.
    #[inline(always)]
    pub fn raw(self) -> u32 {
        self.0
    }
}

struct Label {
    name: String,
    data: RwLock<Box<[u8]>>,
}

/// Shared name→value map used by runnables to exchange data within a node.
///
/// Each label is a fixed-size byte region behind its own reader/writer lock;
/// the critical section per access is exactly one memcpy, so readers always
/// observe a consistent snapshot and writers publish atomically. Lookup by id
/// is O(1) table indexing; lookup by name happens only at registration and
/// wiring time.
pub struct LabelStore {
    labels: RwLock<Vec<Arc<Label>>>,
    by_name: Mutex<FxHashMap<String, LabelId>>,
}

impl LabelStore {
    pub fn new() -> Self {
        Self {
            labels: RwLock::new(Vec::new()),
            by_name: Mutex::new(FxHashMap::default()),
        }
    }

    /// Allocate storage for a new label and return its stable id.
    pub fn register(&self, name: &str, size: usize) -> RtResult<LabelId> {
        let mut by_name = self.by_name.lock();
        if by_name.contains_key(name) {
            return Err(RtError::AlreadyExists(format!("label {}", name)));
        }
        let mut labels = self.labels.write();
        let id = LabelId(labels.len() as u32);
        labels.push(Arc::new(Label {
            name: name.to_string(),
            data: RwLock::new(vec![0u8; size].into_boxed_slice()),
        }));
        by_name.insert(name.to_string(), id);
        debug!(label = name, id = id.0, size, "registered label");
        Ok(id)
    }

    /// Resolve a label name to its id (wiring time only).
    pub fn lookup(&self, name: &str) -> RtResult<LabelId> {
        self.by_name
            .lock()
            .get(name)
            .copied()
            .ok_or_else(|| RtError::NotFound(format!("label {}", name)))
    }

    /// Registered size of a label in bytes.
    pub fn size_of(&self, id: LabelId) -> RtResult<usize> {
        Ok(self.get(id)?.data.read().len())
    }

    /// Registered name of a label.
    pub fn name_of(&self, id: LabelId) -> RtResult<String> {
        Ok(self.get(id)?.name.clone())
    }

    /// Copy the current value into `dst`. `dst` must match the registered
    /// size exactly; a mismatch is fatal for the calling job.
    pub fn read(&self, id: LabelId, dst: &mut [u8]) -> RtResult<()> {
        let label = self.get(id)?;
        let data = label.data.read();
        if data.len() != dst.len() {
            return Err(RtError::SizeMismatch {
                id: id.0,
                expected: data.len(),
                got: dst.len(),
            });
        }
        dst.copy_from_slice(&data);
        Ok(())
    }

    /// Publish a new value atomically with respect to concurrent readers and
    /// other writers.
    pub fn write(&self, id: LabelId, src: &[u8]) -> RtResult<()> {
        let label = self.get(id)?;
        let mut data = label.data.write();
        if data.len() != src.len() {
            return Err(RtError::SizeMismatch {
                id: id.0,
                expected: data.len(),
                got: src.len(),
            });
        }
        data.copy_from_slice(src);
        Ok(())
    }

    /// Number of registered labels.
    pub fn len(&self) -> usize {
        self.labels.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, id: LabelId) -> RtResult<Arc<Label>> {
        self.labels
            .read()
            .get(id.0 as usize)
            .cloned()
            .ok_or_else(|| RtError::NotFound(format!("label id {}", id.0)))
    }
}

impl Default for LabelStore {
    fn default() -> Self {
        Self::new()
    }
}
