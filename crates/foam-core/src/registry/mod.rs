use std::{
    collections::{HashMap, VecDeque},
    path::Path,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::SystemTime,
};

use foam_model::{LaunchMode, RunId, RunInfo, RunState};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::CoreError;

/// Name of the streamed log inside every run directory.
pub const LOG_FILE_NAME: &str = "simulation.log";

const DEFAULT_HISTORY: usize = 32;

/// In-memory run storage with a single active slot.
///
/// Every operation takes the one mutex, so "is a run active?" and "register a
/// new run" happen atomically.
#[derive(Clone)]
pub struct RunRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

struct RegistryInner {
    runs: HashMap<RunId, RunEntry>,
    /// Registration order, oldest first.
    order: VecDeque<RunId>,
    /// Run holding the active slot (Pending or Running).
    active: Option<RunId>,
    max_history: usize,
}

struct RunEntry {
    info: RunInfo,
    stop: Option<CancellationToken>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::with_history(DEFAULT_HISTORY)
    }

    /// Keep at most `max_history` runs (at least one).
    pub fn with_history(max_history: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryInner {
                runs: HashMap::new(),
                order: VecDeque::new(),
                active: None,
                max_history: max_history.max(1),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new Pending run under `runs_root`.
    ///
    /// Fails with [`CoreError::AlreadyRunning`] while another run is Pending or Running.
    pub fn create_run(
        &self,
        command: impl Into<String>,
        mode: LaunchMode,
        runs_root: &Path,
    ) -> Result<RunInfo, CoreError> {
        let mut inner = self.lock();

        if let Some(active) = &inner.active {
            return Err(CoreError::AlreadyRunning(active.clone()));
        }

        let mut run_id = RunId::generate();
        while inner.runs.contains_key(&run_id) {
            run_id = RunId::generate();
        }

        let run_dir = runs_root.join(run_id.as_str());
        let info = RunInfo {
            run_id: run_id.clone(),
            state: RunState::Pending,
            command: command.into(),
            mode,
            log_file: run_dir.join(LOG_FILE_NAME),
            run_dir,
            start_time: SystemTime::now(),
            end_time: None,
            exit_code: None,
            error: None,
            stop_requested: false,
        };

        inner.runs.insert(
            run_id.clone(),
            RunEntry {
                info: info.clone(),
                stop: None,
            },
        );
        inner.order.push_back(run_id.clone());
        inner.active = Some(run_id.clone());
        inner.evict_overflow();

        debug!(target: "foam.core.registry", %run_id, "run registered");
        Ok(info)
    }

    /// Move a run along the state machine.
    ///
    /// Entering a terminal state records `end_time`, stores `exit_code` and frees the active slot.
    pub fn transition(
        &self,
        id: &RunId,
        next: RunState,
        exit_code: Option<i32>,
        error: Option<String>,
    ) -> Result<RunInfo, CoreError> {
        let mut inner = self.lock();

        let entry = inner
            .runs
            .get_mut(id)
            .ok_or_else(|| CoreError::UnknownRun(id.clone()))?;

        let from = entry.info.state;
        if !from.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                run_id: id.clone(),
                from,
                to: next,
            });
        }

        entry.info.state = next;
        if let Some(err) = error {
            entry.info.error = Some(err);
        }
        if next.is_terminal() {
            entry.info.end_time = Some(SystemTime::now());
            entry.info.exit_code = exit_code;
            entry.stop = None;
        }
        let snapshot = entry.info.clone();

        if next.is_terminal() && inner.active.as_ref() == Some(id) {
            inner.active = None;
            inner.evict_overflow();
        }

        trace!(target: "foam.core.registry", run_id = %id, %from, to = %next, "transition");
        Ok(snapshot)
    }

    /// Store the token used to cancel the run's process.
    pub fn attach_stop(&self, id: &RunId, token: CancellationToken) -> Result<(), CoreError> {
        let mut inner = self.lock();
        let entry = inner
            .runs
            .get_mut(id)
            .ok_or_else(|| CoreError::UnknownRun(id.clone()))?;
        entry.stop = Some(token);
        Ok(())
    }

    /// Flag a Running run as stopping and cancel its process.
    ///
    /// Returns `Ok(false)` when a stop was already requested.
    pub fn request_stop(&self, id: &RunId) -> Result<bool, CoreError> {
        let mut inner = self.lock();
        let entry = inner
            .runs
            .get_mut(id)
            .ok_or_else(|| CoreError::UnknownRun(id.clone()))?;

        if entry.info.state != RunState::Running {
            return Err(CoreError::NotRunning(id.clone()));
        }
        if entry.info.stop_requested {
            return Ok(false);
        }

        entry.info.stop_requested = true;
        if let Some(token) = &entry.stop {
            token.cancel();
        }
        Ok(true)
    }

    /// Evict a terminal run.
    pub fn clear(&self, id: &RunId) -> Result<RunInfo, CoreError> {
        let mut inner = self.lock();
        let state = inner
            .runs
            .get(id)
            .map(|e| e.info.state)
            .ok_or_else(|| CoreError::UnknownRun(id.clone()))?;

        if state.is_active() {
            return Err(CoreError::StillActive(id.clone()));
        }

        inner.order.retain(|r| r != id);
        let entry = inner
            .runs
            .remove(id)
            .ok_or_else(|| CoreError::UnknownRun(id.clone()))?;
        Ok(entry.info)
    }

    pub fn get(&self, id: &RunId) -> Option<RunInfo> {
        self.lock().runs.get(id).map(|e| e.info.clone())
    }

    /// Run currently holding the active slot.
    pub fn active(&self) -> Option<RunInfo> {
        let inner = self.lock();
        inner
            .active
            .as_ref()
            .and_then(|id| inner.runs.get(id))
            .map(|e| e.info.clone())
    }

    /// Most recently registered run.
    pub fn latest(&self) -> Option<RunInfo> {
        let inner = self.lock();
        inner
            .order
            .back()
            .and_then(|id| inner.runs.get(id))
            .map(|e| e.info.clone())
    }

    /// All runs, newest first.
    pub fn list(&self) -> Vec<RunInfo> {
        let inner = self.lock();
        inner
            .order
            .iter()
            .rev()
            .filter_map(|id| inner.runs.get(id))
            .map(|e| e.info.clone())
            .collect()
    }
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryInner {
    /// Drop the oldest terminal runs beyond `max_history`.
    fn evict_overflow(&mut self) {
        while self.order.len() > self.max_history {
            let victim = self
                .order
                .iter()
                .position(|id| Some(id) != self.active.as_ref());
            let Some(pos) = victim else { break };
            if let Some(id) = self.order.remove(pos) {
                self.runs.remove(&id);
                trace!(target: "foam.core.registry", run_id = %id, "evicted from history");
            }
        }
    }
}
