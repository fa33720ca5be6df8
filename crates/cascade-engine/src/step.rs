//! Step lifecycle: `setup -> run -> shutdown`, and the worker loops for the
//! three step shapes (spec §4.5).

use async_trait::async_trait;
use cascade_core::{cascade_id, Message};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

use crate::error::{EngineError, Result, StepResult};
use crate::manager::Manager;
use crate::params::Params;
use crate::ports::PortSpec;
use crate::stream::Stream;
use crate::subscription::Subscription;

/// A step that emits seed messages into its output stream. `generate`
/// returning `None` skips that index without publishing (spec §4.5).
#[async_trait]
pub trait Source: Send + Sync {
    /// Optional step-specific initialisation, run once at the end of setup.
    async fn setup(&mut self, _params: &Params) -> StepResult<()> {
        Ok(())
    }

    async fn generate(&mut self) -> StepResult<Option<Value>>;

    /// Optional teardown, run once the step's run loop has exited.
    async fn shutdown(&mut self) {}
}

/// A step that maps one input message to zero-or-one derived output
/// messages. Side-effect publishing (fan-out with its own idempotence
/// checks) is allowed; a `process` that does its own publishing returns
/// `Ok(None)`.
#[async_trait]
pub trait Transform: Send + Sync {
    async fn setup(&mut self, _params: &Params) -> StepResult<()> {
        Ok(())
    }

    async fn process(&mut self, message: &Message) -> StepResult<Option<Value>>;

    /// Optional teardown, run once this worker's run loop has exited.
    async fn shutdown(&mut self) {}
}

/// A step that consumes terminally.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn setup(&mut self, _params: &Params) -> StepResult<()> {
        Ok(())
    }

    async fn sink(&mut self, message: &Message) -> StepResult<()>;

    /// Optional teardown, run once this step's run loop has exited.
    async fn shutdown(&mut self) {}
}

enum StepBody {
    Source(Box<dyn Source>),
    Transform { body: Arc<AsyncMutex<Box<dyn Transform>>>, parallel: usize },
    Sink(Box<dyn Sink>),
}

/// A user-defined processing stage bound to zero or more streams via named
/// ports (spec §3). Built via [`Step::source`], [`Step::transform`], or
/// [`Step::sink`].
pub struct Step {
    name: String,
    port_specs: HashMap<String, PortSpec>,
    params: Params,
    body: StepBody,
    streams: HashMap<String, Arc<Stream>>,
    subs: HashMap<String, Subscription>,
}

fn parse_ports(ports: HashMap<String, String>) -> Result<HashMap<String, PortSpec>> {
    ports
        .into_iter()
        .map(|(port, spec)| PortSpec::parse(&spec).map(|p| (port, p)))
        .collect()
}

impl Step {
    pub fn source(
        name: impl Into<String>,
        ports: HashMap<String, String>,
        params: Params,
        body: Box<dyn Source>,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            port_specs: parse_ports(ports)?,
            params,
            body: StepBody::Source(body),
            streams: HashMap::new(),
            subs: HashMap::new(),
        })
    }

    pub fn transform(
        name: impl Into<String>,
        ports: HashMap<String, String>,
        params: Params,
        body: Box<dyn Transform>,
    ) -> Result<Self> {
        let parallel = params.get_i64_or("parallel", 1).max(1) as usize;
        Ok(Self {
            name: name.into(),
            port_specs: parse_ports(ports)?,
            params,
            body: StepBody::Transform { body: Arc::new(AsyncMutex::new(body)), parallel },
            streams: HashMap::new(),
            subs: HashMap::new(),
        })
    }

    pub fn sink(
        name: impl Into<String>,
        ports: HashMap<String, String>,
        params: Params,
        body: Box<dyn Sink>,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            port_specs: parse_ports(ports)?,
            params,
            body: StepBody::Sink(body),
            streams: HashMap::new(),
            subs: HashMap::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The port names this step's shape requires to have resolved to a
    /// stream during setup: a source only ever publishes, so it needs
    /// `"output"`; a transform needs both `"input"` and `"output"`; a sink
    /// only ever consumes, so it needs `"input"`.
    fn required_ports(&self) -> &'static [&'static str] {
        match &self.body {
            StepBody::Source(_) => &["output"],
            StepBody::Transform { .. } => &["input", "output"],
            StepBody::Sink(_) => &["input"],
        }
    }

    /// Resolve every declared port against the manager (creating streams
    /// and subscriptions as needed) then run the step's custom initialiser.
    pub async fn setup(&mut self, manager: &Manager) -> Result<()> {
        for (port, spec) in &self.port_specs {
            let stream = manager.get_or_create_stream(spec.stream_name()).await;
            if let PortSpec::Subscribe { weight, .. } = spec {
                let (_, sub) = stream.register_subscription(*weight).await?;
                self.subs.insert(port.clone(), sub);
            }
            self.streams.insert(port.clone(), stream);
        }

        for port in self.required_ports() {
            if !self.streams.contains_key(port) {
                return Err(EngineError::UnresolvedPort {
                    step: self.name.clone(),
                    port: port.to_string(),
                });
            }
        }

        match &mut self.body {
            StepBody::Source(body) => body
                .setup(&self.params)
                .await
                .map_err(|e| EngineError::step(&self.name, BoxedStepError(e)))?,
            StepBody::Transform { body, .. } => body
                .lock()
                .await
                .setup(&self.params)
                .await
                .map_err(|e| EngineError::step(&self.name, BoxedStepError(e)))?,
            StepBody::Sink(body) => body
                .setup(&self.params)
                .await
                .map_err(|e| EngineError::step(&self.name, BoxedStepError(e)))?,
        }

        Ok(())
    }

    /// Consume the step and run its lifecycle to completion (quiescence or
    /// cancellation). `token` is the manager's completion token: workers
    /// select on it so that the moment quiescence fires, every blocked
    /// worker wakes and exits.
    pub async fn run(self, manager: Arc<Manager>, token: CancellationToken) {
        let Step { name, params, body, streams, subs } = self;
        match body {
            StepBody::Source(mut body) => {
                let count = params.get_i64_or("count", 1).max(0);
                run_source(&name, manager, &streams, body.as_mut(), count).await;
            }
            StepBody::Transform { body, parallel } => {
                run_transform(&name, manager, token, &streams, &subs, body, parallel).await;
            }
            StepBody::Sink(mut body) => {
                run_sink(&name, manager, token, &subs, body.as_mut()).await;
            }
        }
    }
}

/// Wraps a boxed step error so it satisfies `std::error::Error + Send +
/// Sync + 'static` for [`EngineError::step`].
struct BoxedStepError(Box<dyn std::error::Error + Send + Sync>);

impl std::fmt::Debug for BoxedStepError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.0, f)
    }
}

impl std::fmt::Display for BoxedStepError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for BoxedStepError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

async fn run_source(
    name: &str,
    manager: Arc<Manager>,
    streams: &HashMap<String, Arc<Stream>>,
    body: &mut dyn Source,
    count: i64,
) {
    manager.mark_step_active(name).await;

    let Some(output) = streams.get("output") else {
        tracing::error!(step = name, "source step has no 'output' port");
        manager.mark_step_idle(name).await;
        return;
    };

    for i in 0..count {
        let id = match cascade_id::derive("", name, &[("count", cascade_core::ParamValue::Int(i))]) {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(step = name, error = %e, "failed to derive source cascade id");
                continue;
            }
        };

        match output.check_exists(&id).await {
            Ok(true) => continue,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(step = name, error = %e, "exists check failed, skipping");
                continue;
            }
        }

        match body.generate().await {
            Ok(Some(payload)) => {
                let msg = Message::from_step(id, payload, name);
                if let Err(e) = output.publish(msg, true).await {
                    tracing::warn!(step = name, error = %e, "publish failed");
                }
            }
            Ok(None) => {}
            Err(e) => tracing::error!(step = name, error = %e, "generate failed"),
        }
    }

    manager.mark_step_idle(name).await;
    body.shutdown().await;
}

#[allow(clippy::too_many_arguments)]
async fn run_transform(
    name: &str,
    manager: Arc<Manager>,
    token: CancellationToken,
    streams: &HashMap<String, Arc<Stream>>,
    subs: &HashMap<String, Subscription>,
    body: Arc<AsyncMutex<Box<dyn Transform>>>,
    parallel: usize,
) {
    let Some(input) = subs.get("input").cloned() else {
        tracing::error!(step = name, "transform step has no 'input' port");
        return;
    };
    let Some(output) = streams.get("output").cloned() else {
        tracing::error!(step = name, "transform step has no 'output' port");
        return;
    };

    let mut handles = Vec::with_capacity(parallel);
    for worker in 0..parallel {
        let worker_id = format!("{name}:worker{worker}");
        let input = input.clone();
        let output = output.clone();
        let body = body.clone();
        let manager = manager.clone();
        let token = token.clone();
        let step_name = name.to_string();

        handles.push(tokio::spawn(async move {
            loop {
                manager.mark_step_idle(&worker_id).await;
                let received = tokio::select! {
                    _ = token.cancelled() => None,
                    msg = input.receive() => msg,
                };
                let Some(msg) = received else { break };
                manager.mark_step_active(&worker_id).await;

                let processed = body.lock().await.process(&msg).await;
                match processed {
                    Ok(Some(payload)) => match msg.derive_cascade_id(&step_name, &[]) {
                        Ok(out_id) => match output.check_exists(&out_id).await {
                            Ok(false) => {
                                let out_msg = Message::from_step(out_id, payload, &step_name);
                                if let Err(e) = output.publish(out_msg, true).await {
                                    tracing::warn!(step = step_name, error = %e, "publish failed");
                                }
                            }
                            Ok(true) => {}
                            Err(e) => tracing::warn!(step = step_name, error = %e, "exists check failed"),
                        },
                        Err(e) => tracing::error!(step = step_name, error = %e, "cascade id derivation failed"),
                    },
                    Ok(None) => {}
                    Err(e) => tracing::error!(step = step_name, error = %e, "process failed"),
                }
            }
        }));
    }

    for handle in handles {
        let _ = handle.await;
    }
    body.lock().await.shutdown().await;
}

async fn run_sink(name: &str, manager: Arc<Manager>, token: CancellationToken, subs: &HashMap<String, Subscription>, body: &mut dyn Sink) {
    let Some(input) = subs.get("input").cloned() else {
        tracing::error!(step = name, "sink step has no 'input' port");
        return;
    };

    loop {
        manager.mark_step_idle(name).await;
        let received = tokio::select! {
            _ = token.cancelled() => None,
            msg = input.receive() => msg,
        };
        let Some(msg) = received else { break };
        manager.mark_step_active(name).await;

        if let Err(e) = body.sink(&msg).await {
            tracing::error!(step = name, error = %e, "sink failed");
        }
    }
    body.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_storage::InMemoryStorage;

    struct NoopSink;

    #[async_trait]
    impl Sink for NoopSink {
        async fn sink(&mut self, _message: &Message) -> StepResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn setup_rejects_sink_missing_required_input_port() {
        let manager = Manager::new(Arc::new(InMemoryStorage::new()));
        // A sink declares no ports at all, so its required "input" port can
        // never resolve to a stream.
        let mut step = Step::sink("log", HashMap::new(), Params::default(), Box::new(NoopSink)).unwrap();

        let err = step.setup(&manager).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::UnresolvedPort { ref step, ref port } if step == "log" && port == "input"
        ));
    }

    #[tokio::test]
    async fn setup_accepts_sink_with_declared_input_port() {
        let manager = Manager::new(Arc::new(InMemoryStorage::new()));
        let mut ports = HashMap::new();
        ports.insert("input".to_string(), "X:1".to_string());
        let mut step = Step::sink("log", ports, Params::default(), Box::new(NoopSink)).unwrap();

        step.setup(&manager).await.unwrap();
    }
}
