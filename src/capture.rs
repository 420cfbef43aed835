use crate::error::OrchestratorError;
use crate::permissions::{screen_recording_help_message, screen_recording_status};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;

/// A live screen-capture stream. Dropping it without `stop_tracks` is a bug;
/// the manager always stops it first.
pub trait CaptureHandle: Send {
    /// Fires if the source ends the stream on its own. Only the first call
    /// gets the receiver.
    fn on_ended(&mut self) -> Option<oneshot::Receiver<()>>;

    fn stop_tracks(&mut self);
}

#[async_trait]
pub trait CaptureSource: Send + Sync {
    /// Asks the platform for a new stream. Refusal maps to `CaptureDenied`.
    async fn acquire(&self) -> Result<Box<dyn CaptureHandle>, OrchestratorError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    Started,
    Stopped,
    EndedExternally,
    Denied { message: String },
}

#[derive(Default)]
struct CaptureState {
    handle: Option<Box<dyn CaptureHandle>>,
    watcher: Option<JoinHandle<()>>,
    generation: u64,
}

impl CaptureState {
    fn release(&mut self) -> bool {
        self.generation += 1;
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
        match self.handle.take() {
            Some(mut handle) => {
                handle.stop_tracks();
                true
            }
            None => false,
        }
    }
}

/// Holds at most one capture handle. Explicit stop and source-side
/// termination both end in the same released, inactive state.
#[derive(Clone)]
pub struct CaptureManager {
    source: Arc<dyn CaptureSource>,
    state: Arc<Mutex<CaptureState>>,
    notify: Arc<dyn Fn(CaptureEvent) + Send + Sync>,
}

impl CaptureManager {
    pub fn new(
        source: Arc<dyn CaptureSource>,
        notify: impl Fn(CaptureEvent) + Send + Sync + 'static,
    ) -> Self {
        Self {
            source,
            state: Arc::new(Mutex::new(CaptureState::default())),
            notify: Arc::new(notify),
        }
    }

    pub async fn is_active(&self) -> bool {
        self.state.lock().await.handle.is_some()
    }

    /// Starts capture when inactive, stops it when active. Returns the new
    /// active flag.
    pub async fn toggle(&self) -> Result<bool, OrchestratorError> {
        let mut state = self.state.lock().await;

        if state.handle.is_some() {
            state.release();
            log::info!("screen capture stopped");
            (self.notify)(CaptureEvent::Stopped);
            return Ok(false);
        }

        let mut handle = match self.source.acquire().await {
            Ok(handle) => handle,
            Err(err) => {
                log::warn!("{err}");
                (self.notify)(CaptureEvent::Denied {
                    message: err.to_string(),
                });
                return Err(err);
            }
        };

        state.generation += 1;
        let generation = state.generation;
        if let Some(ended) = handle.on_ended() {
            state.watcher = Some(self.spawn_end_watch(ended, generation));
        }
        state.handle = Some(handle);

        log::info!("screen capture started");
        (self.notify)(CaptureEvent::Started);
        Ok(true)
    }

    /// Releases the handle if one is held. Used on reset and shutdown.
    pub async fn stop(&self) {
        if self.state.lock().await.release() {
            log::info!("screen capture stopped");
            (self.notify)(CaptureEvent::Stopped);
        }
    }

    fn spawn_end_watch(&self, ended: oneshot::Receiver<()>, generation: u64) -> JoinHandle<()> {
        let state = Arc::clone(&self.state);
        let notify = Arc::clone(&self.notify);
        tokio::spawn(async move {
            if ended.await.is_err() {
                return;
            }
            let mut state = state.lock().await;
            if state.generation != generation {
                return;
            }
            // The watcher is this task; drop its handle instead of aborting it.
            state.watcher = None;
            state.release();
            log::info!("screen capture ended by the source");
            notify(CaptureEvent::EndedExternally);
        })
    }
}

/// Runs an external screen-recording command. The running process is the
/// capture handle; killing it stops the stream, and the process exiting on its
/// own counts as the source ending it.
#[derive(Debug, Clone)]
pub struct ProcessCaptureSource {
    command: String,
    args: Vec<String>,
}

impl ProcessCaptureSource {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }
}

/// How long a capture command has to stay up before it counts as started.
pub const STARTUP_GRACE: Duration = Duration::from_millis(300);

#[async_trait]
impl CaptureSource for ProcessCaptureSource {
    async fn acquire(&self) -> Result<Box<dyn CaptureHandle>, OrchestratorError> {
        if !screen_recording_status().is_granted() {
            return Err(OrchestratorError::CaptureDenied {
                message: screen_recording_help_message().to_string(),
            });
        }

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| OrchestratorError::CaptureDenied {
                message: format!("failed to start {}: {err}", self.command),
            })?;

        // A recorder that refuses to share quits right away; only a process
        // still running after the grace window counts as a started capture.
        if let Ok(status) = tokio::time::timeout(STARTUP_GRACE, child.wait()).await {
            let message = match status {
                Ok(status) => format!("{} exited during startup ({status})", self.command),
                Err(err) => format!("failed to wait for {}: {err}", self.command),
            };
            log::warn!("{message}");
            return Err(OrchestratorError::CaptureDenied { message });
        }

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let (ended_tx, ended_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    log::debug!("capture process exited: {status:?}");
                    let _ = ended_tx.send(());
                }
                _ = stop_rx => {
                    if let Err(err) = child.kill().await {
                        log::warn!("failed to stop capture process: {err}");
                    }
                }
            }
        });

        Ok(Box::new(ProcessCaptureHandle {
            stop_tx: Some(stop_tx),
            ended_rx: Some(ended_rx),
        }))
    }
}

struct ProcessCaptureHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    ended_rx: Option<oneshot::Receiver<()>>,
}

impl CaptureHandle for ProcessCaptureHandle {
    fn on_ended(&mut self) -> Option<oneshot::Receiver<()>> {
        self.ended_rx.take()
    }

    fn stop_tracks(&mut self) {
        if let Some(stop) = self.stop_tx.take() {
            let _ = stop.send(());
        }
    }
}
