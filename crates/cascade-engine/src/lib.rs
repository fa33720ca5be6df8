//! Pipeline runtime: streams, the step lifecycle, quiescence detection, and
//! unroll (spec §4, §4.7).
//!
//! `Engine` is the only type external callers construct directly; everything
//! else (`Manager`, `Stream`, `Subscription`) is reached through it or
//! through the `Source`/`Transform`/`Sink` traits a step implements.

pub mod error;
pub mod manager;
pub mod params;
pub mod ports;
pub mod step;
pub mod stream;
pub mod subscription;
pub mod unroll;

pub use cascade_storage::Storage;
pub use error::{EngineError, Result, StepResult};
pub use manager::Manager;
pub use params::Params;
pub use ports::PortSpec;
pub use step::{Sink, Source, Step, Transform};
pub use stream::Stream;
pub use subscription::Subscription;

use std::sync::Arc;
use tokio::task::JoinHandle;

/// Owns one storage handle, one [`Manager`], and the registered steps.
/// `new` / `register` / `run` are the whole external control surface (spec
/// §6, §4.7).
pub struct Engine {
    project_name: String,
    manager: Arc<Manager>,
    steps: Vec<Step>,
}

impl Engine {
    /// Create an engine over `storage`. The database file convention
    /// (`<project>.db`) lives on [`cascade_storage::SqliteStorage`]; the
    /// engine itself is storage-implementation-agnostic.
    pub fn new(project_name: impl Into<String>, storage: Arc<dyn Storage>) -> Self {
        Self {
            project_name: project_name.into(),
            manager: Arc::new(Manager::new(storage)),
            steps: Vec::new(),
        }
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    /// Direct access to the manager, e.g. for a CLI's `unroll` subcommand
    /// that wants read access without running the pipeline.
    pub fn manager(&self) -> Arc<Manager> {
        self.manager.clone()
    }

    /// Set up `step` against this engine's manager (resolving its ports into
    /// streams and subscriptions, running its custom initialiser) and
    /// register it to run. Must be called before [`Engine::run`]; no
    /// consumer may attach to a stream after the engine begins running
    /// (spec §3 invariant 3).
    pub async fn register(&mut self, mut step: Step) -> Result<()> {
        step.setup(&self.manager).await?;
        tracing::debug!(step = step.name(), "registered");
        self.steps.push(step);
        Ok(())
    }

    /// Rehydrate queues from storage, run every step to quiescence, then
    /// cancel and tear down (spec §4.7):
    ///
    /// 1. `manager.restore_state()`.
    /// 2. Spawn each step's `run` as a task.
    /// 3. `manager.wait_for_completion()`.
    /// 4. Cancellation has already propagated via the shared completion
    ///    token by the time step 3 returns; await every task's termination.
    pub async fn run(mut self) -> Result<()> {
        self.manager.restore_state().await?;

        let token = self.manager.completion_token();
        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(self.steps.len());
        for step in self.steps.drain(..) {
            let manager = self.manager.clone();
            let token = token.clone();
            let step_name = step.name().to_string();
            handles.push(tokio::spawn(async move {
                step.run(manager, token).await;
                tracing::debug!(step = step_name.as_str(), "worker task exited");
            }));
        }

        tracing::info!(project = self.project_name.as_str(), "pipeline running");
        self.manager.wait_for_completion().await;
        tracing::info!(project = self.project_name.as_str(), "pipeline quiescent, shutting down");

        // The completion token is already cancelled (it IS the quiescence
        // signal per Manager), so every worker is already unwinding; this
        // just waits for that to finish. Re-cancelling is a no-op but kept
        // explicit in case `run` is ever called on an engine whose manager
        // was cancelled externally before quiescence fired.
        token.cancel();
        for handle in handles {
            let _ = handle.await;
        }

        Ok(())
    }
}
