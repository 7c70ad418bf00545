//! External executable invocation.
//!
//! Extractor and scorer binaries are run as blocking subprocesses with
//! captured output. Both pipes are drained on helper threads so a chatty tool
//! cannot stall on a full pipe while the caller polls for its deadline.

mod scratch;

pub use scratch::ScratchDir;

use crate::trace::trace_debug;
use crate::util::{FpMatchError, FpMatchResult};
use std::ffi::OsStr;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Program plus leading arguments placed before the per-call arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolSpec {
    /// Creates a spec for `program` without leading arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Appends leading arguments (e.g. an interpreter script path).
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

/// Runnable external tool with an optional wall-clock limit per call.
#[derive(Clone, Debug)]
pub struct Tool {
    spec: ToolSpec,
    timeout: Option<Duration>,
}

impl Tool {
    /// Creates a tool from its spec.
    pub fn new(spec: ToolSpec, timeout: Option<Duration>) -> Self {
        Self { spec, timeout }
    }

    /// Returns the program name used in error messages.
    pub fn program(&self) -> &str {
        &self.spec.program
    }

    /// Runs the tool with `args` appended and returns its stdout.
    ///
    /// Fails with `ToolFailure` on a non-zero exit and with `ToolTimeout`
    /// when the deadline passes; the child is killed and reaped first.
    pub fn output<I, S>(&self, args: I) -> FpMatchResult<Vec<u8>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut child = Command::new(&self.spec.program)
            .args(&self.spec.args)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| FpMatchError::io(format!("spawning {}", self.program()), err))?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let status = self.wait(&mut child)?;

        let stdout = join(stdout, self.program())?;
        let stderr = join(stderr, self.program())?;
        if !status.success() {
            trace_debug!(
                "tool_failed",
                program = self.program(),
                stderr = &*String::from_utf8_lossy(&stderr)
            );
            return Err(FpMatchError::ToolFailure {
                program: self.program().to_string(),
                status,
            });
        }
        Ok(stdout)
    }

    fn wait(&self, child: &mut Child) -> FpMatchResult<ExitStatus> {
        let context = || format!("waiting for {}", self.program());
        let Some(timeout) = self.timeout else {
            return child.wait().map_err(|err| FpMatchError::io(context(), err));
        };

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = child
                .try_wait()
                .map_err(|err| FpMatchError::io(context(), err))?
            {
                return Ok(status);
            }
            let now = Instant::now();
            if now >= deadline {
                // kill fails only if the child already exited; reap either way
                let _ = child.kill();
                let _ = child.wait();
                return Err(FpMatchError::ToolTimeout {
                    program: self.program().to_string(),
                    timeout,
                });
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<std::io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buf)?;
        }
        Ok(buf)
    })
}

fn join(handle: JoinHandle<std::io::Result<Vec<u8>>>, program: &str) -> FpMatchResult<Vec<u8>> {
    let context = || format!("reading output of {program}");
    match handle.join() {
        Ok(result) => result.map_err(|err| FpMatchError::io(context(), err)),
        Err(_) => Err(FpMatchError::io(
            context(),
            std::io::Error::other("pipe reader panicked"),
        )),
    }
}
