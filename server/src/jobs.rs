//! Running `/dub` jobs by id.
//!
//! A job id names a clip cache directory, so two requests running the same
//! id at once would race on the same clips. The second one is refused until
//! the first has finished its blocking work.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

#[derive(Clone, Default)]
pub struct JobRegistry {
    running: Arc<Mutex<HashSet<String>>>,
}

impl JobRegistry {
    /// Claims `job_id` for the caller, or `None` while another request holds it.
    pub fn claim(&self, job_id: &str) -> Option<JobGuard> {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if !running.insert(job_id.to_string()) {
            return None;
        }
        Some(JobGuard {
            running: self.running.clone(),
            job_id: job_id.to_string(),
        })
    }

    pub fn is_running(&self, job_id: &str) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(job_id)
    }
}

/// Releases the job id when dropped.
pub struct JobGuard {
    running: Arc<Mutex<HashSet<String>>>,
    job_id: String,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.job_id);
    }
}
