//! Delayed commits of rapidly changing settings.
//!
//! Each asset has at most one pending commit. Scheduling again before the
//! delay runs out replaces the pending settings and restarts the delay, so
//! only the last change of a burst is committed. Commits never overlap, so
//! a flush cannot be overtaken by an older commit still in flight.

use std::{
    collections::HashMap,
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::{
    assets::{AssetId, AssetStore},
    editor::{EditError, Editor},
    model::EditSettings,
};

type CommitFn = dyn Fn(&AssetId, EditSettings) -> Result<(), EditError> + Send + Sync;

struct Pending {
    deadline: Instant,
    settings: EditSettings,
}

#[derive(Default)]
struct State {
    pending: HashMap<AssetId, Pending>,
    committing: bool,
    shutdown: bool,
}

struct Shared {
    state: Mutex<State>,
    wake: Condvar,
    commit: Box<CommitFn>,
}

impl Shared {
    /// Runs `due` with the state unlocked. The caller must have waited for
    /// `committing` to clear.
    fn commit_all(
        &self,
        state: &mut MutexGuard<'_, State>,
        due: Vec<(AssetId, EditSettings)>,
    ) {
        state.committing = true;
        MutexGuard::unlocked(state, || {
            for (id, settings) in due {
                if let Err(error) = (self.commit)(&id, settings) {
                    warn!(asset = %id, %error, "debounced commit failed");
                }
            }
        });
        state.committing = false;
        self.wake.notify_all();
    }
}

pub struct DebouncedCommitter {
    delay: Duration,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl DebouncedCommitter {
    pub fn new<F>(delay: Duration, commit: F) -> Self
    where
        F: Fn(&AssetId, EditSettings) -> Result<(), EditError> + Send + Sync + 'static,
    {
        let shared = Arc::new(Shared {
            state: Mutex::new(State::default()),
            wake: Condvar::new(),
            commit: Box::new(commit),
        });
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("clipsmith-debounce".to_string())
            .spawn(move || run_worker(&worker_shared))
            .ok();
        if worker.is_none() {
            warn!("could not spawn debounce worker, commits only happen on flush");
        }

        Self {
            delay,
            shared,
            worker,
        }
    }

    /// Commits through [`Editor::apply_to_asset`] against `store`.
    pub fn for_editor(editor: Arc<Editor>, store: Arc<dyn AssetStore>, delay: Duration) -> Self {
        Self::new(delay, move |id, settings| {
            editor
                .apply_to_asset(store.as_ref(), id, &settings)
                .map(|_| ())
        })
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Commits `settings` for `id` once `delay` passes without another
    /// schedule for the same asset.
    pub fn schedule(&self, id: AssetId, settings: EditSettings) {
        let deadline = Instant::now() + self.delay;
        let mut state = self.shared.state.lock();
        if state
            .pending
            .insert(id.clone(), Pending { deadline, settings })
            .is_some()
        {
            debug!(asset = %id, "pending commit superseded");
        }
        drop(state);
        self.shared.wake.notify_all();
    }

    /// Drops the pending commit for `id`. Returns whether one existed.
    pub fn cancel(&self, id: &AssetId) -> bool {
        let removed = self.shared.state.lock().pending.remove(id).is_some();
        if removed {
            debug!(asset = %id, "pending commit cancelled");
        }
        removed
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    /// Nothing is pending and no commit is running.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        let state = self.shared.state.lock();
        state.pending.is_empty() && !state.committing
    }

    /// Commits everything pending right away on the calling thread, after
    /// any commit already in flight has finished.
    pub fn flush(&self) {
        let mut state = self.shared.state.lock();
        while state.committing {
            self.shared.wake.wait(&mut state);
        }
        let due: Vec<(AssetId, EditSettings)> = state
            .pending
            .drain()
            .map(|(id, pending)| (id, pending.settings))
            .collect();
        if !due.is_empty() {
            self.shared.commit_all(&mut state, due);
        }
    }
}

impl Drop for DebouncedCommitter {
    /// Pending commits are discarded; call [`DebouncedCommitter::flush`]
    /// first to keep them.
    fn drop(&mut self) {
        let discarded = {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            state.pending.len()
        };
        self.shared.wake.notify_all();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("debounce worker panicked");
            }
        }
        if discarded > 0 {
            debug!(discarded, "debouncer dropped with pending commits");
        }
    }
}

fn run_worker(shared: &Shared) {
    let mut state = shared.state.lock();
    loop {
        if state.shutdown {
            return;
        }
        if state.committing {
            shared.wake.wait(&mut state);
            continue;
        }

        let now = Instant::now();
        let due = take_due(&mut state, now);
        if !due.is_empty() {
            shared.commit_all(&mut state, due);
            continue;
        }

        match state.pending.values().map(|pending| pending.deadline).min() {
            Some(deadline) => {
                shared.wake.wait_until(&mut state, deadline);
            }
            None => shared.wake.wait(&mut state),
        }
    }
}

fn take_due(state: &mut State, now: Instant) -> Vec<(AssetId, EditSettings)> {
    let due_ids: Vec<AssetId> = state
        .pending
        .iter()
        .filter(|(_, pending)| pending.deadline <= now)
        .map(|(id, _)| id.clone())
        .collect();

    due_ids
        .into_iter()
        .filter_map(|id| {
            state
                .pending
                .remove(&id)
                .map(|pending| (id, pending.settings))
        })
        .collect()
}
