//! In-process submission claims
//!
//! A record id is claimed for the duration of one registry write. A second
//! caller that fails to claim the same id skips it, so two concurrent passes
//! never both create a remote resource for one record.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Shared set of record ids currently being submitted
#[derive(Debug, Clone, Default)]
pub struct SubmissionGuard {
    claimed: Arc<Mutex<HashSet<String>>>,
}

impl SubmissionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `key`, or returns `None` if someone else holds it
    pub fn try_claim(&self, key: impl Into<String>) -> Option<SubmissionClaim> {
        let key = key.into();
        let mut claimed = self
            .claimed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !claimed.insert(key.clone()) {
            return None;
        }
        Some(SubmissionClaim {
            key,
            claimed: Arc::clone(&self.claimed),
        })
    }

    pub fn is_claimed(&self, key: &str) -> bool {
        self.claimed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(key)
    }
}

/// Releases its key when dropped
#[derive(Debug)]
pub struct SubmissionClaim {
    key: String,
    claimed: Arc<Mutex<HashSet<String>>>,
}

impl Drop for SubmissionClaim {
    fn drop(&mut self) {
        self.claimed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.key);
    }
}
