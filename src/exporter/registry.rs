//! Set of studies with a background build in progress.

use crate::types::StudyUid;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};

/// Studies currently being built, guarded by one async mutex
///
/// Cloning shares the underlying set.
#[derive(Clone, Debug, Default)]
pub struct InFlightRegistry {
    studies: Arc<Mutex<HashSet<StudyUid>>>,
    build_locks: Arc<Mutex<HashMap<StudyUid, Arc<Mutex<()>>>>>,
}

impl InFlightRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the set for a check-then-register sequence
    pub(crate) async fn lock(&self) -> MutexGuard<'_, HashSet<StudyUid>> {
        self.studies.lock().await
    }

    /// Whether a build for `study_uid` is registered
    pub async fn contains(&self, study_uid: &StudyUid) -> bool {
        self.studies.lock().await.contains(study_uid)
    }

    /// Drop `study_uid` from the set, returning whether it was present
    pub async fn remove(&self, study_uid: &StudyUid) -> bool {
        self.studies.lock().await.remove(study_uid)
    }

    /// Registered studies in no particular order
    pub async fn snapshot(&self) -> Vec<StudyUid> {
        self.studies.lock().await.iter().cloned().collect()
    }

    /// Wait for exclusive permission to build `study_uid`
    ///
    /// The permission lasts until the returned guard is dropped.
    pub(crate) async fn build_lock(&self, study_uid: &StudyUid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.build_locks.lock().await;
            // Locks nobody holds or waits for
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(study_uid.clone()).or_default())
        };
        lock.lock_owned().await
    }
}
