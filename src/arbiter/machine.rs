//! The arbiter control loop
//!
//! Owns the scan mode, the camera while no session holds it, and the one
//! running session. Commands are handled to completion before the next
//! listen starts, so camera hand-over never races a new command.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};

use super::mode::ScanMode;
use crate::camera::CameraResource;
use crate::command::{Command, CommandSource};
use crate::events::{ScanEndReason, TerminalEvent};
use crate::output::{LogPresenter, OutputSink, ResultPresenter};
use crate::session::{
    AnalyzerFactory, RecognitionSession, ScanKind, SessionHandle, SessionReport, SessionTerminal,
};

type PendingCommand = Pin<Box<dyn Future<Output = Command> + Send>>;

/// Tunables for the control loop
#[derive(Debug, Clone, Copy)]
pub struct ArbiterSettings {
    /// Listening window for each command request
    pub listen_timeout: Duration,
    /// Consecutive analyzer failures a session tolerates
    pub analyzer_failure_limit: u32,
}

/// Counters exposed for status reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArbiterStats {
    /// Completed `acquire_command` calls
    pub listen_cycles: u64,
    /// Sessions that got the camera
    pub sessions_started: u64,
    pub matches: u64,
}

/// Why `run` returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArbiterExit {
    /// A `Stop`/`Quit` command was heard
    StopCommand,
    /// The shutdown future resolved
    Interrupted,
}

enum Flow {
    Continue,
    Exit,
}

enum Step {
    Interrupted,
    Command(Command),
    SessionEnded(Result<SessionReport, JoinError>),
}

/// Drives the scan-mode state machine
pub struct ModeArbiter {
    commands: CommandSource,
    /// Present whenever no session holds the camera
    camera: Option<CameraResource>,
    active: Option<SessionHandle>,
    analyzers: Arc<dyn AnalyzerFactory>,
    sink: Arc<dyn OutputSink>,
    presenter: Arc<dyn ResultPresenter>,
    event_tx: broadcast::Sender<TerminalEvent>,
    settings: ArbiterSettings,
    stats: ArbiterStats,
    stopped: bool,
}

impl ModeArbiter {
    /// Create an arbiter in Idle mode holding the released camera
    pub fn new(
        commands: CommandSource,
        camera: CameraResource,
        analyzers: Arc<dyn AnalyzerFactory>,
        sink: Arc<dyn OutputSink>,
        event_tx: broadcast::Sender<TerminalEvent>,
        settings: ArbiterSettings,
    ) -> Self {
        Self {
            commands,
            camera: Some(camera),
            active: None,
            analyzers,
            sink,
            presenter: Arc::new(LogPresenter),
            event_tx,
            settings,
            stats: ArbiterStats::default(),
            stopped: false,
        }
    }

    /// Replace the default log presenter
    #[cfg(test)]
    pub fn with_presenter(mut self, presenter: Arc<dyn ResultPresenter>) -> Self {
        self.presenter = presenter;
        self
    }

    /// The current scan mode, derived from the running session
    pub fn mode(&self) -> ScanMode {
        self.active
            .as_ref()
            .map_or(ScanMode::Idle, |session| ScanMode::from(session.kind()))
    }

    pub fn stats(&self) -> ArbiterStats {
        self.stats
    }

    /// Whether `shutdown` has completed
    #[cfg(test)]
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Run until a stop command or until `shutdown` resolves.
    ///
    /// Either way the active session is stopped and the camera released
    /// before this returns.
    pub async fn run<F>(&mut self, shutdown: F) -> ArbiterExit
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!("arbiter started in Idle mode");
        self.sink.speak("LEO ready");

        // A listen outlives a session ending on its own; its command is
        // then evaluated against Idle.
        let mut pending: Option<PendingCommand> = None;

        let exit = loop {
            let listen = pending.get_or_insert_with(|| self.listen());

            let step = match self.active.as_mut() {
                Some(session) => tokio::select! {
                    biased;
                    () = &mut shutdown => Step::Interrupted,
                    report = session.wait() => Step::SessionEnded(report),
                    command = listen => Step::Command(command),
                },
                None => tokio::select! {
                    biased;
                    () = &mut shutdown => Step::Interrupted,
                    command = listen => Step::Command(command),
                },
            };

            match step {
                Step::Interrupted => {
                    info!("interrupt received");
                    break ArbiterExit::Interrupted;
                }
                Step::SessionEnded(report) => {
                    if let Some(session) = self.active.take() {
                        self.finish(session.kind(), session.started_at(), report, None);
                    }
                }
                Step::Command(command) => {
                    pending = None;
                    self.stats.listen_cycles += 1;
                    if let Flow::Exit = self.handle_command(command).await {
                        break ArbiterExit::StopCommand;
                    }
                }
            }
        };

        self.shutdown().await;
        exit
    }

    /// Stop any session and release the camera. Safe to call more than once.
    pub async fn shutdown(&mut self) {
        if self.stopped {
            return;
        }

        info!(mode = %self.mode(), "arbiter shutting down");
        self.stop_active(ScanEndReason::Shutdown).await;
        if let Some(camera) = self.camera.as_mut() {
            if let Err(e) = camera.release() {
                warn!(?e, "failed to release camera on shutdown");
            }
        }

        self.stopped = true;
        self.sink.speak("Shutting down");
        self.emit(TerminalEvent::ShuttingDown);
        info!(stats = ?self.stats, "arbiter stopped");
    }

    fn listen(&self) -> PendingCommand {
        let commands = self.commands.clone();
        let timeout = self.settings.listen_timeout;
        Box::pin(async move { commands.acquire_command(timeout).await })
    }

    /// Apply one command to the current mode
    async fn handle_command(&mut self, command: Command) -> Flow {
        if command.is_actionable() {
            info!(%command, mode = %self.mode(), "command received");
        }

        match command {
            Command::Scan => self.enter(ScanKind::Face).await,
            Command::License => self.enter(ScanKind::Plate).await,
            Command::StopScan => self.leave(ScanKind::Face).await,
            Command::StopLicense => self.leave(ScanKind::Plate).await,
            Command::Stop => return Flow::Exit,
            Command::Unknown => debug!("ignoring unrecognized phrase"),
            Command::NoInput => {}
            Command::Error => {
                self.sink.speak("Speech recognition error");
                self.emit(TerminalEvent::SpeechError);
            }
        }

        Flow::Continue
    }

    /// Switch to `kind`, stopping the other scan first
    async fn enter(&mut self, kind: ScanKind) {
        match self.active.as_ref().map(SessionHandle::kind) {
            Some(current) if current == kind => {
                debug!(%kind, "scan already active");
                return;
            }
            Some(_) => self.stop_active(ScanEndReason::Preempted).await,
            None => {}
        }

        self.start_session(kind).await;
    }

    /// Stop `kind` if it is the running scan
    async fn leave(&mut self, kind: ScanKind) {
        if self.mode().kind() != Some(kind) {
            debug!(%kind, mode = %self.mode(), "no matching scan active");
            return;
        }
        self.stop_active(ScanEndReason::Requested).await;
    }

    async fn start_session(&mut self, kind: ScanKind) {
        let Some(mut camera) = self.camera.take() else {
            error!(%kind, "camera lost by an earlier session");
            self.sink.speak("Camera unavailable");
            self.emit(TerminalEvent::ScanStartFailed {
                kind,
                error: "camera unavailable".to_string(),
            });
            return;
        };

        let analyzer = match self.analyzers.create(kind) {
            Ok(analyzer) => analyzer,
            Err(e) => {
                warn!(%kind, %e, "no analyzer for scan");
                self.camera = Some(camera);
                self.start_failed(kind, e.to_string());
                return;
            }
        };

        if let Err(e) = camera.acquire(kind).await {
            error!(%kind, %e, "failed to acquire camera");
            self.camera = Some(camera);
            self.start_failed(kind, e.to_string());
            return;
        }

        info!(from = %ScanMode::Idle, to = %ScanMode::from(kind), "state transition");
        self.stats.sessions_started += 1;
        self.sink.speak(&format!("{} started", kind.label()));
        self.emit(TerminalEvent::ScanStarted { kind });

        let session = RecognitionSession::new(
            kind,
            camera,
            analyzer,
            self.settings.analyzer_failure_limit,
        );
        self.active = Some(SessionHandle::spawn(session));
    }

    fn start_failed(&self, kind: ScanKind, error: String) {
        self.sink.speak(&format!("{} unavailable", kind.label()));
        self.emit(TerminalEvent::ScanStartFailed { kind, error });
    }

    /// Stop the running session, if any, and take the camera back
    async fn stop_active(&mut self, reason: ScanEndReason) {
        let Some(session) = self.active.take() else {
            return;
        };

        let kind = session.kind();
        let started_at = session.started_at();
        debug!(%kind, %reason, "stopping session");
        let report = session.stop().await;
        self.finish(kind, started_at, report, Some(reason));
    }

    /// Handle a session that reached its terminal state.
    ///
    /// `requested` is set when the arbiter asked the session to stop.
    fn finish(
        &mut self,
        kind: ScanKind,
        started_at: Instant,
        report: Result<SessionReport, JoinError>,
        requested: Option<ScanEndReason>,
    ) {
        let duration_ms = started_at.elapsed().as_millis() as u64;

        let report = match report {
            Ok(report) => report,
            Err(e) => {
                // the camera went down with the task
                error!(%kind, ?e, "session task died");
                self.sink.speak(&format!("{} failed", kind.label()));
                self.sink.speak(&format!("{} ended", kind.label()));
                self.emit(TerminalEvent::ScanEnded {
                    kind,
                    reason: ScanEndReason::Failed,
                    frames: 0,
                    duration_ms,
                    error: Some(e.to_string()),
                });
                return;
            }
        };

        let SessionReport {
            terminal,
            frames,
            mut camera,
        } = report;

        let mut error = None;
        let reason = match terminal {
            SessionTerminal::Matched(result) => {
                self.stats.matches += 1;
                self.sink.speak(&format!(
                    "Match found: {}. {}",
                    result.subject_id,
                    result.record.summary()
                ));
                self.presenter.present(&result);
                self.emit(TerminalEvent::MatchFound { kind, result });
                requested.unwrap_or(ScanEndReason::Matched)
            }
            SessionTerminal::Stopped => requested.unwrap_or(ScanEndReason::Requested),
            SessionTerminal::Failed(e) => {
                warn!(%kind, %e, frames, "session failed");
                self.sink.speak(&format!("{} failed", kind.label()));
                error = Some(e.to_string());
                ScanEndReason::Failed
            }
        };

        if let Err(e) = camera.release() {
            error!(%kind, %e, "failed to release camera");
            self.sink.speak("Camera release failed");
            error.get_or_insert(e.to_string());
        }
        self.camera = Some(camera);

        info!(
            from = %ScanMode::from(kind),
            to = %ScanMode::Idle,
            %reason,
            frames,
            duration_ms,
            "state transition"
        );
        self.sink.speak(&format!("{} ended", kind.label()));
        self.emit(TerminalEvent::ScanEnded {
            kind,
            reason,
            frames,
            duration_ms,
            error,
        });
    }

    fn emit(&self, event: TerminalEvent) {
        debug!(%event, "emitting event");
        let _ = self.event_tx.send(event);
    }
}
