//! Script execution collaborators.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use crate::error::ExecError;

/// Poll interval while waiting on a script with a timeout.
const WAIT_POLL: Duration = Duration::from_millis(20);

/// How long output pipes are read after the process has exited. Background
/// processes started by a script can hold the pipes open indefinitely.
pub(crate) const PIPE_GRACE: Duration = Duration::from_millis(200);

/// What a finished script produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl ExecutionReport {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs the text of a script to completion.
///
/// Called from the receive loop, one script at a time. A non-zero exit is
/// reported as [`ExecError::Failed`].
pub trait ScriptExecutor: Send {
    fn execute(&mut self, script: &str) -> Result<ExecutionReport, ExecError>;
}

impl<E: ScriptExecutor + ?Sized> ScriptExecutor for Box<E> {
    fn execute(&mut self, script: &str) -> Result<ExecutionReport, ExecError> {
        (**self).execute(script)
    }
}

/// Runs scripts through an external interpreter that reads the script text
/// from stdin (`python3 -` by default).
///
/// On unix the interpreter leads its own process group, so a timeout kills
/// everything the script started.
#[derive(Debug, Clone)]
pub struct InterpreterExecutor {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
    working_dir: Option<PathBuf>,
}

impl InterpreterExecutor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: None,
            working_dir: None,
        }
    }

    /// `python3 -`.
    pub fn python() -> Self {
        Self::new("python3").with_args(["-"])
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Kill the interpreter if it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_working_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn wait(&self, child: &mut Child) -> Result<ExitStatus, ExecError> {
        let Some(timeout) = self.timeout else {
            return Ok(child.wait()?);
        };

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                terminate(child);
                return Err(ExecError::TimedOut(timeout));
            }
            std::thread::sleep(WAIT_POLL);
        }
    }
}

impl Default for InterpreterExecutor {
    fn default() -> Self {
        Self::python()
    }
}

impl ScriptExecutor for InterpreterExecutor {
    fn execute(&mut self, script: &str) -> Result<ExecutionReport, ExecError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let started = Instant::now();
        let mut child = command.spawn().map_err(|source| ExecError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        tracing::debug!(program = %self.program, pid = child.id(), "script started");

        feed(child.stdin.take(), script);
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let status = self.wait(&mut child);
        let deadline = Instant::now() + PIPE_GRACE;
        let stdout = collect(stdout, deadline);
        let stderr = collect(stderr, deadline);
        let status = status?;

        let report = ExecutionReport {
            exit_code: status.code(),
            stdout,
            stderr,
            elapsed: started.elapsed(),
        };

        if report.success() {
            Ok(report)
        } else {
            Err(ExecError::Failed {
                exit_code: report.exit_code,
                stderr: report.stderr.trim_end().to_string(),
            })
        }
    }
}

/// Kill the interpreter and, on unix, the rest of its process group.
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
            // SAFETY: killpg(2) takes no pointers. The group was created by
            // `process_group(0)` at spawn and its leader is not reaped yet.
            unsafe {
                libc::killpg(pgid, libc::SIGKILL);
            }
        }
    }
    // The process may exit between try_wait and kill.
    let _ = child.kill();
    let _ = child.wait();
}

/// Write the script to the interpreter's stdin on its own thread, then close
/// it. A script larger than the pipe buffer would otherwise block the caller
/// until the interpreter reads it.
fn feed<W>(stdin: Option<W>, script: &str)
where
    W: Write + Send + 'static,
{
    if let Some(mut stdin) = stdin {
        let script = script.to_owned();
        std::thread::spawn(move || {
            // The interpreter may exit without reading everything.
            let _ = stdin.write_all(script.as_bytes());
        });
    }
}

/// Read a child pipe on its own thread so a chatty process cannot fill the
/// pipe and block. Output arrives in chunks until end of file.
pub(crate) fn drain<R>(pipe: Option<R>) -> Option<Receiver<Vec<u8>>>
where
    R: Read + Send + 'static,
{
    pipe.map(|mut pipe| {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match pipe.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(_) => break,
                }
            }
        });
        rx
    })
}

/// Gather what a [`drain`] thread read, giving up at `deadline`.
///
/// Output written after the deadline is dropped; the reader thread exits on
/// its own once the last holder of the pipe closes it.
pub(crate) fn collect(chunks: Option<Receiver<Vec<u8>>>, deadline: Instant) -> String {
    let Some(chunks) = chunks else {
        return String::new();
    };
    let mut buf = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match chunks.recv_timeout(remaining) {
            Ok(chunk) => buf.extend_from_slice(&chunk),
            Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                tracing::debug!("output pipe still open after exit; not waiting further");
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
