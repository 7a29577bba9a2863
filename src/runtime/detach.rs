//! Process-wide collection of background children.

use std::sync::{Mutex, PoisonError};

use tracing::info;

use super::closure::decode_wait_status;

/// Children started with `&`, reaped outside any closure's wait queue.
#[derive(Debug, Default)]
pub struct Detachables {
    pids: Mutex<Vec<libc::pid_t>>,
}

impl Detachables {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a background child.
    pub fn push(&self, pid: libc::pid_t) {
        self.pids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(pid);
    }

    /// Returns the number of children not yet reaped.
    pub fn len(&self) -> usize {
        self.pids.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns `true` when every background child was reaped.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reaps finished children without blocking and returns their statuses.
    pub fn reap(&self) -> Vec<(libc::pid_t, i32)> {
        let mut pids = self.pids.lock().unwrap_or_else(PoisonError::into_inner);
        let mut finished = Vec::new();
        pids.retain(|&pid| {
            let mut raw = 0;
            // SAFETY: waitpid only writes the status word.
            let rc = unsafe { libc::waitpid(pid, &mut raw, libc::WNOHANG) };
            match rc {
                0 => true,
                rc if rc == pid => {
                    let status = decode_wait_status(raw);
                    info!(pid, status, "background job finished");
                    finished.push((pid, status));
                    false
                }
                // Already reaped elsewhere or not our child.
                _ => false,
            }
        });
        finished
    }
}
