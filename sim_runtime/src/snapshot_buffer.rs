use std::sync::Arc;

use parking_lot::RwLock;
use sim_proto::Snapshot;

/// Latest snapshot shared with the renderer.
///
/// Writers swap the whole `Arc`; readers clone it, so a frame being drawn is
/// never mixed with a newer one.
#[derive(Debug, Clone, Default)]
pub struct SnapshotBuffer {
    latest: Arc<RwLock<Option<Arc<Snapshot>>>>,
}

impl SnapshotBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = Arc::new(snapshot);
        *self.latest.write() = Some(Arc::clone(&snapshot));
        snapshot
    }

    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.latest.read().clone()
    }

    pub fn timestep(&self) -> Option<u64> {
        self.latest.read().as_ref().map(|snapshot| snapshot.timestep)
    }
}
