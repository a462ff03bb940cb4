//! Follows a run session on the terminal.
//!
//! Engine output is passed through as it arrives, telemetry is printed as a
//! summary line whenever it changes, confirmations are asked on the terminal
//! and Ctrl-C cancels the run.

use std::io::{stderr, stdout, Write};
use std::process::ExitCode;

use log::{debug, info, warn};
use runwatch_core::error::Result;
use runwatch_core::process::{OutputChunk, OutputStream};
use runwatch_core::session::{Completion, SessionEvent, SessionHandle, SessionState};
use tokio::sync::{mpsc, oneshot};

use crate::confirmation::prompt_confirmation;
use crate::status_view::{format_summary, print_summary, print_tree};

/// Exit status for a run that was cancelled, as if killed by SIGINT.
const CANCELLED_EXIT_CODE: u8 = 130;

/// Maps how a session ended to the process exit status.
pub fn exit_status(state: SessionState) -> u8 {
    match state {
        SessionState::Completed(Completion::Success) => 0,
        SessionState::Cancelled => CANCELLED_EXIT_CODE,
        _ => 1,
    }
}

pub fn exit_code(state: SessionState) -> ExitCode {
    ExitCode::from(exit_status(state))
}

pub struct RunView {
    auto_confirm: bool,
    last_summary: Option<String>,
    interrupted: bool,
}

impl RunView {
    pub fn new(auto_confirm: bool) -> Self {
        Self {
            auto_confirm,
            last_summary: None,
            interrupted: false,
        }
    }

    /// Cancels the session on the first Ctrl-C. Returns false if the run was
    /// already interrupted.
    fn interrupt(&mut self, handle: &SessionHandle) -> bool {
        if self.interrupted {
            return false;
        }

        self.interrupted = true;
        eprintln!("\nCancelling run...");
        handle.cancel();
        true
    }

    /// Consumes every session event and returns the final state.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to the terminal fails; the session is
    /// cancelled first.
    pub async fn follow(
        &mut self,
        handle: SessionHandle,
        mut events: mpsc::Receiver<SessionEvent>,
    ) -> Result<SessionState> {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut listening = true;

        loop {
            let event = tokio::select! {
                result = &mut ctrl_c, if listening && !self.interrupted => {
                    listening = false;
                    match result {
                        Ok(()) => {
                            self.interrupt(&handle);
                        }
                        Err(e) => warn!("Unable to listen for Ctrl-C: {e}"),
                    }
                    continue;
                }
                event = events.recv() => event,
            };

            let Some(event) = event else {
                break;
            };

            if let Err(e) = self.handle_event(event, &handle).await {
                handle.cancel();
                return Err(e);
            }
        }

        let latest_status = handle.latest_status();
        let state = handle.wait().await;

        if let Some(status) = latest_status {
            println!();
            print_tree(&status)?;
        }

        Ok(state)
    }

    async fn handle_event(&mut self, event: SessionEvent, handle: &SessionHandle) -> Result<()> {
        match event {
            SessionEvent::Started {
                address,
                command,
                pid,
            } => {
                info!("Listening for telemetry on {address}");
                if let Some(pid) = pid {
                    debug!("Engine process id: {pid}");
                }
                println!("Running: {command}");
            }
            SessionEvent::Status(status) => {
                let summary = format_summary(&status);
                if self.last_summary.as_ref() != Some(&summary) {
                    print_summary(&status)?;
                    self.last_summary = Some(summary);
                }
            }
            SessionEvent::Output(chunk) => write_output(&chunk)?,
            SessionEvent::ConfirmationRequested { request, reply } => {
                self.confirm(request.message(), reply, handle).await?;
            }
            SessionEvent::Message(message) => println!("{message}"),
            SessionEvent::Error { title, message } => eprintln!("{title}: {message}"),
            SessionEvent::Finished(state) => println!("Run ended: {state}"),
        }

        Ok(())
    }

    async fn confirm(
        &mut self,
        message: String,
        reply: oneshot::Sender<bool>,
        handle: &SessionHandle,
    ) -> Result<()> {
        if self.auto_confirm {
            println!("{message} (answered yes)");
            let _ = reply.send(true);
            return Ok(());
        }

        // Reading the terminal blocks, so it must not hold up the runtime.
        let answer = tokio::task::spawn_blocking(move || prompt_confirmation(&message));

        tokio::select! {
            answer = answer => {
                let confirmed = match answer {
                    Ok(answer) => answer?,
                    Err(e) => {
                        warn!("Confirmation prompt failed: {e}");
                        false
                    }
                };
                debug!("Confirmation answered: {confirmed}");
                let _ = reply.send(confirmed);
            }
            _ = tokio::signal::ctrl_c() => {
                self.interrupt(handle);
            }
        }

        Ok(())
    }
}

fn write_output(chunk: &OutputChunk) -> Result<()> {
    match chunk.stream {
        OutputStream::Stdout => {
            let mut stdout = stdout();
            stdout.write_all(chunk.text.as_bytes())?;
            stdout.flush()?;
        }
        OutputStream::Stderr => {
            let mut stderr = stderr();
            stderr.write_all(chunk.text.as_bytes())?;
            stderr.flush()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use runwatch_core::config::SessionSettings;
    use runwatch_core::run_target::RunTarget;
    use runwatch_core::session::RunSession;

    use super::*;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_interrupt_cancels_once() {
        let target = RunTarget::new("engine() { sleep 30; }; engine", ["scripts/a.json"]).unwrap();
        let settings = SessionSettings {
            port: 0,
            shell: "/bin/sh".to_string(),
            ..SessionSettings::default()
        };
        let (handle, mut events) = RunSession::start(target, settings);
        let mut view = RunView::new(false);

        assert!(view.interrupt(&handle));
        assert!(!view.interrupt(&handle));

        while events.recv().await.is_some() {}
        assert_eq!(handle.wait().await, SessionState::Cancelled);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_status(SessionState::Completed(Completion::Success)), 0);
        assert_eq!(exit_status(SessionState::Completed(Completion::Failure)), 1);
        assert_eq!(exit_status(SessionState::Cancelled), 130);
    }
}
