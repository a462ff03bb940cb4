//! The run session: one engine process, one telemetry listener and the
//! prompts in between, driven to a single final state.
//!
//! [`RunSession::start`] spawns the session as a task and returns a
//! [`SessionHandle`] plus the stream of [`SessionEvent`]s a view consumes.
//! The session task is the only caller of the listener's and the runner's
//! lifecycle methods. Teardown (kill the process, then stop the listener)
//! runs exactly once, whatever ends the run.

use std::fmt::{Display, Formatter};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::broker::{ConfirmationRequest, InteractionBroker};
use crate::config::SessionSettings;
use crate::error::{Error, Result, LISTENER_ERROR_TITLE};
use crate::listener::{ListenerEvent, StatusListener};
use crate::process::{ExitWatch, OutputChunk, ProcessRunner, RunOutcome};
use crate::run_target::RunTarget;
use crate::status::RunStatusMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotStarted,
    Running,
    Completed(Completion),
    Cancelled,
}

impl SessionState {
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Cancelled)
    }

    fn can_advance_to(&self, next: &SessionState) -> bool {
        match self {
            Self::NotStarted => matches!(next, Self::Running) || next.is_final(),
            Self::Running => next.is_final(),
            Self::Completed(_) | Self::Cancelled => false,
        }
    }
}

impl Display for SessionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => f.write_str("not started"),
            Self::Running => f.write_str("running"),
            Self::Completed(Completion::Success) => f.write_str("completed"),
            Self::Completed(Completion::Failure) => f.write_str("failed"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Everything a view needs to follow a run.
#[derive(Debug)]
pub enum SessionEvent {
    /// The listener is bound and the engine process is running.
    Started {
        address: SocketAddr,
        command: String,
        pid: Option<u32>,
    },
    Status(Box<RunStatusMessage>),
    Output(OutputChunk),
    /// The engine waits for a yes/no answer. Output is held back until
    /// `reply` is used or dropped; dropping it answers no.
    ConfirmationRequested {
        request: ConfirmationRequest,
        reply: oneshot::Sender<bool>,
    },
    Message(String),
    Error { title: &'static str, message: String },
    /// Always the last event.
    Finished(SessionState),
}

/// Control over a running session.
#[derive(Debug)]
pub struct SessionHandle {
    cancel_tx: watch::Sender<bool>,
    state_rx: watch::Receiver<SessionState>,
    status_rx: watch::Receiver<Option<Arc<RunStatusMessage>>>,
    task: JoinHandle<SessionState>,
}

impl SessionHandle {
    /// Asks the session to stop. Calling it again, or after the run ended,
    /// does nothing.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// The newest run-status snapshot received so far.
    pub fn latest_status(&self) -> Option<Arc<RunStatusMessage>> {
        self.status_rx.borrow().clone()
    }

    /// Waits for the session to end and returns its final state.
    pub async fn wait(self) -> SessionState {
        match self.task.await {
            Ok(state) => state,
            Err(e) => {
                warn!("Run session task failed: {e}");
                let state = *self.state_rx.borrow();
                if state.is_final() {
                    state
                } else {
                    SessionState::Completed(Completion::Failure)
                }
            }
        }
    }
}

enum RunEnd {
    Cancelled,
    Exited(Result<RunOutcome>),
    TimedOut(Duration),
    ListenerFailed(String),
}

pub struct RunSession {
    target: RunTarget,
    settings: SessionSettings,
    listener: StatusListener,
    runner: Option<ProcessRunner>,
    broker: InteractionBroker,
    events: mpsc::Sender<SessionEvent>,
    state_tx: watch::Sender<SessionState>,
    status_tx: watch::Sender<Option<Arc<RunStatusMessage>>>,
    torn_down: bool,
}

impl RunSession {
    /// Starts running `target` on the current tokio runtime.
    ///
    /// The returned receiver yields every [`SessionEvent`] up to and
    /// including [`SessionEvent::Finished`]. It is bounded, so it must be
    /// drained for the session to make progress.
    pub fn start(
        target: RunTarget,
        settings: SessionSettings,
    ) -> (SessionHandle, mpsc::Receiver<SessionEvent>) {
        let (events, events_rx) = mpsc::channel(settings.output_capacity.max(1));
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(SessionState::NotStarted);
        let (status_tx, status_rx) = watch::channel(None);

        let session = RunSession {
            listener: StatusListener::new(settings.listen_address()),
            target,
            settings,
            runner: None,
            broker: InteractionBroker::new(),
            events,
            state_tx,
            status_tx,
            torn_down: false,
        };

        let task = tokio::spawn(session.run(cancel_rx));

        let handle = SessionHandle {
            cancel_tx,
            state_rx,
            status_rx,
            task,
        };

        (handle, events_rx)
    }

    async fn run(mut self, mut cancel_rx: watch::Receiver<bool>) -> SessionState {
        self.advance(SessionState::Running);

        let capacity = self.settings.output_capacity.max(1);
        let (telemetry_tx, mut telemetry_rx) = mpsc::channel(capacity);
        let address = match self.listener.start(telemetry_tx).await {
            Ok(address) => address,
            Err(e) => return self.fail(e, telemetry_rx).await,
        };

        let (output_tx, mut output_rx) = mpsc::channel(capacity);
        let command_line = self.target.shell_command(address.port());
        let command = self.target.command(&self.settings.shell, address.port());
        let mut exit = match ProcessRunner::spawn(
            command,
            &command_line,
            self.settings.process_options(),
            output_tx,
        ) {
            Ok((runner, exit)) => {
                self.runner = Some(runner);
                exit
            }
            Err(e) => return self.fail(e, telemetry_rx).await,
        };

        let pid = self.runner.as_ref().and_then(ProcessRunner::pid);
        self.emit(SessionEvent::Started {
            address,
            command: command_line,
            pid,
        })
        .await;

        let run_timeout = self.settings.run_timeout;
        let deadline = async move {
            match run_timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(deadline);

        let mut pending_reply: Option<oneshot::Receiver<bool>> = None;

        let end = loop {
            if pending_reply.is_none() {
                if let Some(request) = self.broker.next_confirmation() {
                    pending_reply = Some(self.request_confirmation(request).await);
                    continue;
                }
            }

            tokio::select! {
                biased;

                _ = cancelled(&mut cancel_rx) => break RunEnd::Cancelled,
                answer = wait_reply(&mut pending_reply), if pending_reply.is_some() => {
                    pending_reply = None;
                    self.answer(answer).await;
                }
                Some(chunk) = output_rx.recv(), if pending_reply.is_none() => {
                    self.broker.feed(chunk.stream, &chunk.text);
                    self.emit(SessionEvent::Output(chunk)).await;
                }
                Some(event) = telemetry_rx.recv() => match event {
                    ListenerEvent::Status(status) => self.publish_status(status).await,
                    ListenerEvent::Failed(message) => break RunEnd::ListenerFailed(message),
                },
                outcome = &mut exit => break RunEnd::Exited(outcome),
                _ = &mut deadline => break RunEnd::TimedOut(run_timeout.unwrap_or_default()),
            }
        };

        self.finish(end, exit, output_rx, telemetry_rx).await
    }

    async fn finish(
        mut self,
        end: RunEnd,
        exit: ExitWatch,
        mut output_rx: mpsc::Receiver<OutputChunk>,
        mut telemetry_rx: mpsc::Receiver<ListenerEvent>,
    ) -> SessionState {
        self.broker.clear_requests();

        let state = match end {
            RunEnd::Exited(outcome) => {
                while let Ok(chunk) = output_rx.try_recv() {
                    self.emit(SessionEvent::Output(chunk)).await;
                }

                let state = match &outcome {
                    Ok(RunOutcome::Success) => SessionState::Completed(Completion::Success),
                    Ok(RunOutcome::Killed) => SessionState::Cancelled,
                    Err(_) => SessionState::Completed(Completion::Failure),
                };
                self.advance(state);

                // The engine usually reports its final snapshot right before
                // exiting, so it may still sit in the socket.
                self.teardown(&mut telemetry_rx).await;
                if let Err(e) = outcome {
                    self.emit_error(&e).await;
                }
                state
            }
            RunEnd::Cancelled => {
                self.stop_engine(exit, output_rx).await;
                self.teardown(&mut telemetry_rx).await;
                self.emit(SessionEvent::Message("Run cancelled.".to_string()))
                    .await;
                SessionState::Cancelled
            }
            RunEnd::TimedOut(timeout) => {
                self.stop_engine(exit, output_rx).await;
                self.teardown(&mut telemetry_rx).await;
                self.emit_error(&Error::Timeout(timeout)).await;
                SessionState::Completed(Completion::Failure)
            }
            RunEnd::ListenerFailed(message) => {
                self.stop_engine(exit, output_rx).await;
                self.teardown(&mut telemetry_rx).await;
                self.emit(SessionEvent::Error {
                    title: LISTENER_ERROR_TITLE,
                    message,
                })
                .await;
                SessionState::Completed(Completion::Failure)
            }
        };

        self.conclude(state).await
    }

    /// Kills the engine and waits for it to go away, forwarding its last
    /// output without scanning it for prompts.
    async fn stop_engine(&mut self, mut exit: ExitWatch, mut output_rx: mpsc::Receiver<OutputChunk>) {
        if let Some(runner) = &mut self.runner {
            runner.kill();
        }

        let outcome = loop {
            tokio::select! {
                outcome = &mut exit => break outcome,
                Some(chunk) = output_rx.recv() => self.emit(SessionEvent::Output(chunk)).await,
            }
        };

        debug!("Engine stopped: {outcome:?}");
    }

    /// Kills the engine, then stops the listener and publishes every snapshot
    /// it delivered on the way out.
    async fn teardown(&mut self, telemetry_rx: &mut mpsc::Receiver<ListenerEvent>) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        if let Some(runner) = &mut self.runner {
            runner.kill();
        }

        let mut late = Vec::new();
        {
            let stop = self.listener.stop();
            tokio::pin!(stop);
            loop {
                tokio::select! {
                    _ = &mut stop => break,
                    Some(event) = telemetry_rx.recv() => late.push(event),
                }
            }
        }
        while let Ok(event) = telemetry_rx.try_recv() {
            late.push(event);
        }

        for event in late {
            if let ListenerEvent::Status(status) = event {
                self.publish_status(status).await;
            }
        }
    }

    async fn fail(mut self, error: Error, mut telemetry_rx: mpsc::Receiver<ListenerEvent>) -> SessionState {
        self.teardown(&mut telemetry_rx).await;
        self.emit_error(&error).await;
        self.conclude(SessionState::Completed(Completion::Failure))
            .await
    }

    async fn conclude(mut self, state: SessionState) -> SessionState {
        self.advance(state);
        info!("Run session ended: {state}");
        self.emit(SessionEvent::Finished(state)).await;
        state
    }

    fn advance(&mut self, next: SessionState) {
        self.state_tx.send_if_modified(|state| {
            if *state == next {
                false
            } else if state.can_advance_to(&next) {
                *state = next;
                true
            } else {
                warn!("Ignoring session transition from {state} to {next}");
                false
            }
        });
    }

    async fn request_confirmation(&mut self, request: ConfirmationRequest) -> oneshot::Receiver<bool> {
        let (reply, reply_rx) = oneshot::channel();
        info!("Engine waits for confirmation: {:?}", request.context);
        self.emit(SessionEvent::ConfirmationRequested { request, reply })
            .await;
        reply_rx
    }

    async fn answer(&mut self, confirmed: bool) {
        let bytes = self.broker.answer(confirmed);
        let Some(runner) = &mut self.runner else {
            return;
        };

        if let Err(e) = runner.write(bytes).await {
            warn!("Dropping confirmation answer: {e}");
        }
    }

    async fn publish_status(&mut self, status: Box<RunStatusMessage>) {
        self.status_tx
            .send_replace(Some(Arc::new(status.as_ref().clone())));
        self.emit(SessionEvent::Status(status)).await;
    }

    async fn emit_error(&self, error: &Error) {
        self.emit(SessionEvent::Error {
            title: error.title(),
            message: error.to_string(),
        })
        .await;
    }

    async fn emit(&self, event: SessionEvent) {
        if self.events.send(event).await.is_err() {
            debug!("Session event dropped, nobody is listening");
        }
    }
}

async fn cancelled(cancel_rx: &mut watch::Receiver<bool>) {
    if cancel_rx.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// A dropped reply counts as "no".
async fn wait_reply(pending_reply: &mut Option<oneshot::Receiver<bool>>) -> bool {
    match pending_reply {
        Some(reply) => reply.await.unwrap_or(false),
        None => std::future::pending().await,
    }
}
