//! Writer serialization shared by the services
//!
//! Lock order is always `merge` → `graph` → `candidates`. Readers never take
//! these locks; they read the store directly.

use tokio::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct WriteLocks {
    /// Single-writer merge queue: every resolver write and actor merge
    merge: Mutex<()>,
    /// Edge inserts, deactivations and merge edge rewrites
    graph: Mutex<()>,
    /// Read-modify-write of sanction candidates
    candidates: Mutex<()>,
}

impl WriteLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn merge(&self) -> MutexGuard<'_, ()> {
        self.merge.lock().await
    }

    pub async fn graph(&self) -> MutexGuard<'_, ()> {
        self.graph.lock().await
    }

    pub async fn candidates(&self) -> MutexGuard<'_, ()> {
        self.candidates.lock().await
    }
}
