use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

const READ_CHUNK_SIZE: usize = 8192;

/// How long to wait for the pipes to drain once the engine has exited.
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// One read from the engine's stdout or stderr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    pub stream: OutputStream,
    pub text: String,
}

/// How the engine process ended, when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    Killed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessOptions {
    /// Most recent stderr bytes kept for the failure message.
    pub stderr_ceiling: usize,
    /// Time between the interrupt and a forced kill.
    pub kill_grace: Duration,
}

/// Resolves once the engine process is gone.
///
/// Yields `Ok(Success)` for exit code 0, `Ok(Killed)` after [`ProcessRunner::kill`],
/// and [`Error::ProcessExit`] with the captured stderr for anything else.
#[derive(Debug)]
pub struct ExitWatch(oneshot::Receiver<Result<RunOutcome>>);

impl Future for ExitWatch {
    type Output = Result<RunOutcome>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(Error::ProcessNotRunning)))
    }
}

/// Owns the engine process: its stdin, its identity and its kill switch.
///
/// Output is pushed to the channel given at spawn time; the exit is observed
/// through the [`ExitWatch`] returned alongside the runner. Dropping the
/// runner interrupts the engine like [`ProcessRunner::kill`].
#[derive(Debug)]
pub struct ProcessRunner {
    pid: Option<u32>,
    stdin: Option<ChildStdin>,
    kill_tx: watch::Sender<bool>,
    exited: Arc<AtomicBool>,
    killed: bool,
}

#[derive(Clone)]
struct StderrCapture {
    bytes: Arc<Mutex<VecDeque<u8>>>,
    ceiling: usize,
}

impl StderrCapture {
    fn new(ceiling: usize) -> Self {
        Self {
            bytes: Arc::new(Mutex::new(VecDeque::new())),
            ceiling,
        }
    }

    fn append(&self, chunk: &[u8]) {
        let Ok(mut bytes) = self.bytes.lock() else {
            return;
        };

        bytes.extend(chunk);
        if bytes.len() > self.ceiling {
            let excess = bytes.len() - self.ceiling;
            bytes.drain(..excess);
        }
    }

    fn text(&self) -> String {
        match self.bytes.lock() {
            Ok(mut bytes) => String::from_utf8_lossy(bytes.make_contiguous()).into_owned(),
            Err(_) => String::new(),
        }
    }
}

impl ProcessRunner {
    /// Spawns `command` in its own process group with piped standard streams.
    ///
    /// Every chunk read from stdout or stderr is sent to `output` in arrival
    /// order per stream. `output` is bounded: a consumer that stops reading
    /// eventually stalls the engine instead of growing memory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Launch`] if the process cannot be spawned.
    pub fn spawn(
        mut command: Command,
        label: &str,
        options: ProcessOptions,
        output: mpsc::Sender<OutputChunk>,
    ) -> Result<(Self, ExitWatch)> {
        #[cfg(unix)]
        command.process_group(0);
        command.kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| Error::launch_error(label.to_string(), e))?;
        let pid = child.id();
        info!("Started engine process {:?}: {}", pid, label);

        let capture = StderrCapture::new(options.stderr_ceiling);
        let mut readers = Vec::new();

        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(read_stream(
                stdout,
                OutputStream::Stdout,
                output.clone(),
                None,
            )));
        }

        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(read_stream(
                stderr,
                OutputStream::Stderr,
                output,
                Some(capture.clone()),
            )));
        }

        let stdin = child.stdin.take();
        let exited = Arc::new(AtomicBool::new(false));
        let (kill_tx, kill_rx) = watch::channel(false);
        let (exit_tx, exit_rx) = oneshot::channel();

        tokio::spawn(supervise(
            child,
            readers,
            kill_rx,
            options.kill_grace,
            capture,
            exited.clone(),
            exit_tx,
        ));

        let runner = Self {
            pid,
            stdin,
            kill_tx,
            exited,
            killed: false,
        };

        Ok((runner, ExitWatch(exit_rx)))
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether the process has exited or been told to stop.
    pub fn is_finished(&self) -> bool {
        self.killed || self.exited.load(Ordering::SeqCst)
    }

    /// Writes raw bytes to the engine's stdin.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProcessNotRunning`] once the process has exited, has
    /// been killed, or has closed its stdin.
    pub async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if self.is_finished() {
            self.stdin = None;
            return Err(Error::ProcessNotRunning);
        }

        let stdin = self.stdin.as_mut().ok_or(Error::ProcessNotRunning)?;
        let written = async {
            stdin.write_all(bytes).await?;
            stdin.flush().await
        }
        .await;

        if let Err(e) = written {
            warn!("Failed writing to engine stdin: {e}");
            self.stdin = None;
            return Err(Error::ProcessNotRunning);
        }

        Ok(())
    }

    /// Interrupts the engine if it is still running. Safe to call repeatedly.
    pub fn kill(&mut self) {
        if self.is_finished() {
            return;
        }

        info!("Interrupting engine process {:?}", self.pid);
        self.killed = true;
        self.stdin = None;
        let _ = self.kill_tx.send(true);
    }
}

async fn supervise(
    mut child: Child,
    readers: Vec<JoinHandle<()>>,
    mut kill_rx: watch::Receiver<bool>,
    kill_grace: Duration,
    capture: StderrCapture,
    exited: Arc<AtomicBool>,
    exit_tx: oneshot::Sender<Result<RunOutcome>>,
) {
    let waited: std::io::Result<(ExitStatus, bool)> = tokio::select! {
        status = child.wait() => status.map(|status| (status, false)),
        _ = kill_rx.changed() => {
            interrupt(&mut child);
            let status = match tokio::time::timeout(kill_grace, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    warn!("Engine ignored the interrupt for {kill_grace:?}, killing it");
                    force_kill(&mut child);
                    child.wait().await
                }
            };
            status.map(|status| (status, true))
        }
    };

    for mut reader in readers {
        if tokio::time::timeout(READER_DRAIN_TIMEOUT, &mut reader).await.is_err() {
            debug!("Output pipe still open after exit, abandoning it");
            reader.abort();
        }
    }

    exited.store(true, Ordering::SeqCst);

    let outcome = match waited {
        Ok((_, true)) => Ok(RunOutcome::Killed),
        Ok((status, false)) if status.success() => Ok(RunOutcome::Success),
        Ok((status, false)) => Err(Error::ProcessExit {
            code: status.code(),
            stderr: capture.text(),
        }),
        Err(e) => Err(Error::launch_error("engine".to_string(), e)),
    };

    info!("Engine process finished: {outcome:?}");
    let _ = exit_tx.send(outcome);
}

#[cfg(unix)]
fn signal_group(child: &mut Child, signal: libc::c_int) -> bool {
    let Some(pid) = child.id() else {
        return false;
    };

    // The child leads its own process group, so this reaches the shell and
    // the engine it started.
    let result = unsafe { libc::kill(-(pid as libc::pid_t), signal) };
    result == 0
}

#[cfg(unix)]
fn interrupt(child: &mut Child) {
    if !signal_group(child, libc::SIGINT) {
        let _ = child.start_kill();
    }
}

#[cfg(not(unix))]
fn interrupt(child: &mut Child) {
    let _ = child.start_kill();
}

fn force_kill(child: &mut Child) {
    #[cfg(unix)]
    signal_group(child, libc::SIGKILL);
    let _ = child.start_kill();
}

async fn read_stream<R: AsyncRead + Unpin>(
    mut reader: R,
    stream: OutputStream,
    output: mpsc::Sender<OutputChunk>,
    capture: Option<StderrCapture>,
) {
    let mut buf = [0u8; READ_CHUNK_SIZE];
    let mut incomplete: Vec<u8> = Vec::new();
    let mut forwarding = true;

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!("Stopped reading {stream:?}: {e}");
                break;
            }
        };

        if let Some(capture) = &capture {
            capture.append(&buf[..n]);
        }

        let text = decode_utf8(&mut incomplete, &buf[..n]);
        if forwarding && !text.is_empty() {
            // Keep draining the pipe even if nobody listens any more.
            forwarding = output.send(OutputChunk { stream, text }).await.is_ok();
        }
    }

    if forwarding && !incomplete.is_empty() {
        let text = String::from_utf8_lossy(&incomplete).into_owned();
        let _ = output.send(OutputChunk { stream, text }).await;
    }
}

/// Decodes `bytes`, holding back a multi-byte sequence cut off at the end.
fn decode_utf8(incomplete: &mut Vec<u8>, bytes: &[u8]) -> String {
    incomplete.extend_from_slice(bytes);

    let keep = match std::str::from_utf8(incomplete) {
        Ok(_) => 0,
        Err(e) if e.error_len().is_none() => incomplete.len() - e.valid_up_to(),
        Err(_) => 0,
    };

    let split = incomplete.len() - keep;
    let rest = incomplete.split_off(split);
    let text = String::from_utf8_lossy(incomplete).into_owned();
    *incomplete = rest;
    text
}
