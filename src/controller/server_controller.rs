use crate::configuration::settings::Settings;
use crate::engine::behaviour::{MailEngine, ServerBehaviour};
use crate::engine::types::{Message, Session};
use crate::error_handling::types::EngineError;
use crate::events::hook::Event;
use crate::policy::behaviour_policy::BehaviourPolicy;
use log::{debug, error, info, warn};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tokio::task::{self, JoinHandle};

/// Builds a fresh engine instance for each run. Restart never reuses an
/// engine: a new instance is constructed against the current policy snapshot.
pub type EngineFactory = Box<dyn Fn() -> Arc<dyn MailEngine> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Stopped,
    Starting,
    Running,
    Stopping,
}

struct ActiveRun {
    engine: Arc<dyn MailEngine>,
    supervisor: JoinHandle<()>,
}

/// Runs the protocol engine on a dedicated background execution context and
/// makes its lifecycle observable.
///
/// States: `Stopped → Starting → Running → Stopping → Stopped`. Start, stop
/// and restart are serialized through an internal operation lock, so a
/// restart is one logical operation and two concurrent starts launch exactly
/// one engine.
///
/// Contract: once [`ServerController::stop`] returns, no further
/// message-received or session-completed events fire for that run.
pub struct ServerController {
    settings: Mutex<Settings>,
    factory: EngineFactory,
    phase: Arc<Mutex<Phase>>,
    active: Mutex<Option<ActiveRun>>,
    op_lock: tokio::sync::Mutex<()>,
    server_started: Event<()>,
    server_stopped: Event<()>,
    message_received: Event<Message>,
    session_completed: Event<Session>,
}

impl ServerController {
    pub fn new(settings: Settings, factory: EngineFactory) -> Self {
        Self {
            settings: Mutex::new(settings),
            factory,
            phase: Arc::new(Mutex::new(Phase::Stopped)),
            active: Mutex::new(None),
            op_lock: tokio::sync::Mutex::new(()),
            server_started: Event::new(),
            server_stopped: Event::new(),
            message_received: Event::new(),
            session_completed: Event::new(),
        }
    }

    /// Raised after a successful bind, once per run.
    pub fn server_started(&self) -> &Event<()> {
        &self.server_started
    }

    /// Raised when a run that reached `Running` has fully exited, whether by
    /// an orderly stop or an engine crash.
    pub fn server_stopped(&self) -> &Event<()> {
        &self.server_stopped
    }

    /// Republished engine callbacks; survive restarts, so subscribers stay
    /// attached across configuration changes.
    pub fn message_received(&self) -> &Event<Message> {
        &self.message_received
    }

    pub fn session_completed(&self) -> &Event<Session> {
        &self.session_completed
    }

    /// True from the moment a start is requested until the engine has fully
    /// exited: `Starting`, `Running` and `Stopping` all count as running.
    pub fn is_running(&self) -> bool {
        *self.phase.lock().unwrap() != Phase::Stopped
    }

    pub fn settings(&self) -> Settings {
        self.settings.lock().unwrap().clone()
    }

    /// Replaces the stored configuration snapshot. A running engine keeps the
    /// snapshot it was started with; the new one takes effect on the next
    /// start or restart.
    pub fn update_settings(&self, settings: Settings) {
        *self.settings.lock().unwrap() = settings;
    }

    /// Launches the engine on a new background execution context. No-op when
    /// a run is already in progress. Resolves once the bind outcome is known:
    /// `Ok` after the listener is up (and `ServerStarted` has been raised),
    /// `Err` when the bind failed and the controller is back at rest.
    pub async fn start(&self) -> Result<(), EngineError> {
        let _op = self.op_lock.lock().await;
        self.start_locked().await
    }

    /// Signals the engine to unbind and terminate active connections, then
    /// waits until the background execution context has fully exited. No-op
    /// when already stopped.
    pub async fn stop(&self) {
        let _op = self.op_lock.lock().await;
        self.stop_locked().await;
    }

    /// Stop followed by start as one serialized operation, used after
    /// configuration edits the running engine cannot pick up live.
    pub async fn restart(&self) -> Result<(), EngineError> {
        let _op = self.op_lock.lock().await;
        self.stop_locked().await;
        self.start_locked().await
    }

    async fn start_locked(&self) -> Result<(), EngineError> {
        {
            let mut phase = self.phase.lock().unwrap();
            if *phase != Phase::Stopped {
                debug!("start requested while {:?}, ignoring", *phase);
                return Ok(());
            }
            *phase = Phase::Starting;
        }

        let engine = (self.factory)();
        let policy: Arc<dyn ServerBehaviour> = Arc::new(BehaviourPolicy::new(
            self.settings.lock().unwrap().clone(),
            self.message_received.clone(),
            self.session_completed.clone(),
        ));

        let (bound_tx, bound_rx) = oneshot::channel::<Result<(), EngineError>>();
        let worker_engine = Arc::clone(&engine);
        let worker_policy = Arc::clone(&policy);
        let worker = task::spawn_blocking(move || {
            match worker_engine.bind(worker_policy.as_ref()) {
                Ok(()) => {
                    let _ = bound_tx.send(Ok(()));
                }
                Err(err) => {
                    let _ = bound_tx.send(Err(err));
                    return Ok(());
                }
            }
            worker_engine.run(worker_policy)
        });

        let phase_handle = Arc::clone(&self.phase);
        let stopped_event = self.server_stopped.clone();
        let supervisor = tokio::spawn(async move {
            let outcome = worker.await;

            // Settle the state machine before telling anyone, so observers
            // that query is_running from the callback see the rest state.
            let was_listening = {
                let mut phase = phase_handle.lock().unwrap();
                let was = matches!(*phase, Phase::Running | Phase::Stopping);
                *phase = Phase::Stopped;
                was
            };

            match outcome {
                Ok(Ok(())) => debug!("engine exited cleanly"),
                Ok(Err(err)) => warn!("engine terminated with error: {}", err),
                Err(err) => error!("engine task panicked: {}", err),
            }

            // A crash before ServerStarted never raises ServerStopped;
            // observers were never told the server was listening.
            if was_listening {
                stopped_event.emit(&());
            }
        });

        match bound_rx.await {
            Ok(Ok(())) => {
                let became_running = {
                    let mut phase = self.phase.lock().unwrap();
                    if *phase == Phase::Starting {
                        *phase = Phase::Running;
                        true
                    } else {
                        false
                    }
                };
                *self.active.lock().unwrap() = Some(ActiveRun { engine, supervisor });
                if became_running {
                    info!("server listening on {}", policy.bind_address());
                    self.server_started.emit(&());
                }
                Ok(())
            }
            Ok(Err(err)) => {
                warn!("engine failed to bind: {}", err);
                let _ = supervisor.await;
                Err(err)
            }
            Err(_) => {
                // The worker died before reporting a bind outcome.
                let _ = supervisor.await;
                Err(EngineError::Terminated(
                    "engine exited before reporting bind outcome".to_string(),
                ))
            }
        }
    }

    async fn stop_locked(&self) {
        {
            let mut phase = self.phase.lock().unwrap();
            match *phase {
                Phase::Stopped | Phase::Stopping => {
                    debug!("stop requested while {:?}, ignoring", *phase);
                    return;
                }
                _ => *phase = Phase::Stopping,
            }
        }

        let run = self.active.lock().unwrap().take();
        match run {
            Some(run) => {
                run.engine.shutdown();
                if let Err(err) = run.supervisor.await {
                    error!("failed to join engine supervisor: {}", err);
                }
            }
            None => {
                // No run was ever recorded; unwedge the phase.
                let mut phase = self.phase.lock().unwrap();
                if *phase == Phase::Stopping {
                    *phase = Phase::Stopped;
                }
            }
        }
        info!("server stopped");
    }
}
