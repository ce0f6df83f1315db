//! Credential rotation: a process-wide ring of cookie bundles.
//!
//! `next` hands out the bundle at the cursor and advances modulo the ring
//! size, so N consecutive calls over N credentials visit each exactly once.
//! Hot add/remove is safe; a harvest snapshots its credential at start, so
//! mid-run mutations never affect the in-flight run.

use std::sync::{Mutex, OnceLock};

use crate::models::CredentialBundle;

#[derive(Default)]
struct RingState {
    bundles: Vec<CredentialBundle>,
    cursor: usize,
}

pub struct CredentialRotator {
    state: Mutex<RingState>,
}

impl CredentialRotator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RingState::default()),
        }
    }

    /// The shared ring used by all harvests in this process.
    pub fn global() -> &'static CredentialRotator {
        static ROTATOR: OnceLock<CredentialRotator> = OnceLock::new();
        ROTATOR.get_or_init(CredentialRotator::new)
    }

    pub fn set_all(&self, bundles: Vec<CredentialBundle>) {
        if let Ok(mut state) = self.state.lock() {
            state.bundles = bundles;
            state.cursor = 0;
        }
    }

    /// Replace the ring only when the configured bundles actually changed,
    /// keeping the cursor (and round-robin fairness) across runs otherwise.
    pub fn sync(&self, bundles: Vec<CredentialBundle>) {
        if let Ok(mut state) = self.state.lock() {
            if state.bundles != bundles {
                state.bundles = bundles;
                state.cursor = 0;
            }
        }
    }

    pub fn add(&self, bundle: CredentialBundle) {
        if let Ok(mut state) = self.state.lock() {
            state.bundles.push(bundle);
        }
    }

    /// Remove the bundle at `index`. The cursor is clamped back to zero if
    /// it would overflow the shrunken ring.
    pub fn remove_at(&self, index: usize) -> Option<CredentialBundle> {
        let mut state = self.state.lock().ok()?;
        if index >= state.bundles.len() {
            return None;
        }
        let removed = state.bundles.remove(index);
        if state.cursor >= state.bundles.len() {
            state.cursor = 0;
        }
        Some(removed)
    }

    pub fn count(&self) -> usize {
        self.state.lock().map(|s| s.bundles.len()).unwrap_or(0)
    }

    pub fn current_index(&self) -> usize {
        self.state.lock().map(|s| s.cursor).unwrap_or(0)
    }

    /// Hand out the bundle at the cursor and advance. Empty ring yields
    /// `None`; the harvest may still run anonymously and will usually hit
    /// the login wall.
    pub fn next(&self) -> Option<CredentialBundle> {
        let mut state = self.state.lock().ok()?;
        if state.bundles.is_empty() {
            return None;
        }
        let bundle = state.bundles[state.cursor].clone();
        state.cursor = (state.cursor + 1) % state.bundles.len();
        Some(bundle)
    }
}

impl Default for CredentialRotator {
    fn default() -> Self {
        Self::new()
    }
}
