//! Child process plumbing: the stdin writer, the stdout pump and the
//! stderr logger.

use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::time::Instant;

use gattlink_app::ports::{BridgeError, GattListener, IoBridge};
use gattlink_app::session::{GattSession, StreamEnd};

use crate::config::GatttoolConfig;
use crate::error::ProcessError;

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A session driving a `gatttool` child process.
pub type GatttoolSession = GattSession<ProcessBridge>;

/// [`IoBridge`] writing to the stdin of a child process.
///
/// Lines are queued on an unbounded channel and written by a dedicated
/// task, so `send_line` never blocks. A failed write stops that task; the
/// next `send_line` returns its error.
pub struct ProcessBridge {
    lines: Mutex<Option<mpsc::UnboundedSender<String>>>,
    write_error: Arc<Mutex<Option<std::io::Error>>>,
    child: Arc<Mutex<Child>>,
}

impl IoBridge for ProcessBridge {
    fn send_line(&self, line: &str) -> Result<(), BridgeError> {
        if let Some(err) = self
            .write_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            return Err(BridgeError::Io(err));
        }

        let lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = lines.as_ref() else {
            return Err(BridgeError::Closed);
        };
        sender
            .send(line.to_string())
            .map_err(|_| BridgeError::Closed)
    }

    fn shutdown(&self) {
        // closing the queue ends the writer task and closes stdin
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let mut child = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = child.start_kill() {
            tracing::debug!(%err, "interpreter already stopped");
        }
    }
}

/// Start the interpreter and wire it to a new session.
///
/// `listener` is bound before the first output line is read. The returned
/// session is released automatically when the process output ends.
///
/// Must be called from within a tokio runtime.
///
/// # Errors
///
/// Returns [`ProcessError`] if the program cannot be started.
pub async fn spawn(
    config: &GatttoolConfig,
    listener: Option<Arc<dyn GattListener>>,
) -> Result<Arc<GatttoolSession>, ProcessError> {
    let args = config.command_args();
    let mut child = Command::new(&config.program)
        .args(&args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ProcessError::Spawn {
            program: config.program.clone(),
            source,
        })?;

    let stdin = child.stdin.take().ok_or(ProcessError::MissingPipe("stdin"))?;
    let stdout = child.stdout.take().ok_or(ProcessError::MissingPipe("stdout"))?;
    let stderr = child.stderr.take().ok_or(ProcessError::MissingPipe("stderr"))?;

    tracing::info!(
        program = %config.program,
        args = ?args,
        pid = ?child.id(),
        "interpreter started"
    );

    let child = Arc::new(Mutex::new(child));
    let (tx, rx) = mpsc::unbounded_channel();
    let write_error = Arc::new(Mutex::new(None));
    let bridge = ProcessBridge {
        lines: Mutex::new(Some(tx)),
        write_error: Arc::clone(&write_error),
        child: Arc::clone(&child),
    };

    let session = Arc::new(GattSession::new(bridge));
    if let Some(listener) = listener {
        session.set_listener(listener).await;
    }

    tokio::spawn(write_lines(stdin, rx, write_error));
    tokio::spawn(log_stderr(stderr));
    tokio::spawn(pump_output(
        stdout,
        Arc::clone(&session),
        child,
        config.exit_grace(),
    ));

    Ok(session)
}

async fn write_lines(
    mut stdin: ChildStdin,
    mut rx: mpsc::UnboundedReceiver<String>,
    write_error: Arc<Mutex<Option<std::io::Error>>>,
) {
    while let Some(line) = rx.recv().await {
        tracing::trace!(%line, "writing to interpreter");
        if let Err(err) = write_line(&mut stdin, &line).await {
            tracing::warn!(%err, "failed to write to interpreter");
            rx.close();
            *write_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(err);
            break;
        }
    }
    tracing::debug!("interpreter input closed");
}

async fn write_line(stdin: &mut ChildStdin, line: &str) -> std::io::Result<()> {
    stdin.write_all(line.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await
}

async fn log_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(%line, "interpreter stderr");
    }
}

async fn pump_output<B: IoBridge>(
    stdout: ChildStdout,
    session: Arc<GattSession<B>>,
    child: Arc<Mutex<Child>>,
    exit_grace: Duration,
) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => session.line_received(&line).await,
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(%err, "failed to read interpreter output");
                break;
            }
        }
    }

    let end = wait_for_exit(&child, exit_grace).await;
    tracing::debug!(?end, "interpreter output ended");
    session.end_of_stream(end).await;
}

/// Poll the child until it exits or `grace` elapses.
async fn wait_for_exit(child: &Mutex<Child>, grace: Duration) -> StreamEnd {
    let deadline = Instant::now() + grace;
    loop {
        match try_wait(child) {
            Ok(Some(status)) => return StreamEnd::Exited(status.code()),
            Ok(None) if Instant::now() < deadline => tokio::time::sleep(EXIT_POLL_INTERVAL).await,
            Ok(None) => return StreamEnd::StillRunning,
            Err(err) => {
                tracing::warn!(%err, "failed to query interpreter status");
                return StreamEnd::Exited(None);
            }
        }
    }
}

fn try_wait(child: &Mutex<Child>) -> std::io::Result<Option<ExitStatus>> {
    child
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .try_wait()
}
