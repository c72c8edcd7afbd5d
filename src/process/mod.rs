//! Running the external patch tool.
//!
//! The tool reads the diff on stdin and may write a lot of output while it
//! is still reading. Writing everything first and reading afterwards can
//! deadlock once both pipe buffers are full, so [`PipeRunner`] puts all
//! three pipes in non-blocking mode and services whichever one `poll(2)`
//! reports ready until the input is flushed and both outputs hit EOF.

mod errors;
mod tool;

pub use errors::ProcessError;
pub use tool::{PatchTool, PATCH_TOOL};

use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsFd, AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::process::{ChildStderr, ChildStdin, ChildStdout, Command, Stdio};
use tracing::debug;

const CHUNK: usize = 8192;

/// Program plus arguments, as executed (no shell involved).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// What a finished child process produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code; `None` if the process was killed by a signal
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// stdout followed by stderr, lossily decoded.
    pub fn combined(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&self.stderr));
        text
    }
}

/// Runs a command in a directory with the given stdin.
pub trait ProcessRunner {
    fn run(
        &self,
        command: &CommandLine,
        working_dir: &Path,
        stdin: &[u8],
    ) -> Result<ProcessOutput, ProcessError>;
}

/// [`ProcessRunner`] spawning real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipeRunner;

impl ProcessRunner for PipeRunner {
    fn run(
        &self,
        command: &CommandLine,
        working_dir: &Path,
        stdin: &[u8],
    ) -> Result<ProcessOutput, ProcessError> {
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .current_dir(working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                program: command.program.clone(),
                source,
            })?;

        let pipes = Pipes {
            stdin: child.stdin.take(),
            stdout: child.stdout.take(),
            stderr: child.stderr.take(),
        };

        let (stdout, stderr) = match pipes.pump(stdin) {
            Ok(streams) => streams,
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(err);
            }
        };

        let status = child.wait()?;
        debug!(command = %command, code = ?status.code(), "child exited");

        Ok(ProcessOutput {
            code: status.code(),
            stdout,
            stderr,
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdin,
    Stdout,
    Stderr,
}

/// The child's open pipe ends; `None` once closed.
struct Pipes {
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
}

impl Pipes {
    /// Feed `input` and collect (stdout, stderr) until all pipes are closed.
    fn pump(mut self, input: &[u8]) -> Result<(Vec<u8>, Vec<u8>), ProcessError> {
        if input.is_empty() {
            self.stdin = None;
        }

        let fds = [
            self.stdin.as_ref().map(AsRawFd::as_raw_fd),
            self.stdout.as_ref().map(AsRawFd::as_raw_fd),
            self.stderr.as_ref().map(AsRawFd::as_raw_fd),
        ];
        for fd in fds.into_iter().flatten() {
            set_nonblocking(fd)?;
        }

        let mut written = 0;
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut buf = [0u8; CHUNK];

        while self.stdin.is_some() || self.stdout.is_some() || self.stderr.is_some() {
            for stream in self.wait_ready()? {
                match stream {
                    Stream::Stdin => {
                        written = self.write_input(input, written)?;
                        if written >= input.len() {
                            // Closing stdin is how the tool learns the diff ended.
                            self.stdin = None;
                        }
                    }
                    Stream::Stdout => drain(&mut self.stdout, &mut stdout, &mut buf)?,
                    Stream::Stderr => drain(&mut self.stderr, &mut stderr, &mut buf)?,
                }
            }
        }

        Ok((stdout, stderr))
    }

    /// Block until at least one open pipe is ready.
    fn wait_ready(&self) -> Result<Vec<Stream>, ProcessError> {
        let mut streams = Vec::with_capacity(3);
        let mut fds = Vec::with_capacity(3);

        if let Some(pipe) = &self.stdin {
            streams.push(Stream::Stdin);
            fds.push(PollFd::new(pipe.as_fd(), PollFlags::POLLOUT));
        }
        if let Some(pipe) = &self.stdout {
            streams.push(Stream::Stdout);
            fds.push(PollFd::new(pipe.as_fd(), PollFlags::POLLIN));
        }
        if let Some(pipe) = &self.stderr {
            streams.push(Stream::Stderr);
            fds.push(PollFd::new(pipe.as_fd(), PollFlags::POLLIN));
        }

        loop {
            match poll(&mut fds, PollTimeout::NONE) {
                Ok(_) => break,
                Err(Errno::EINTR) => continue,
                Err(errno) => return Err(errno.into()),
            }
        }

        Ok(streams
            .into_iter()
            .zip(&fds)
            .filter(|(_, fd)| fd.revents().is_some_and(|r| !r.is_empty()))
            .map(|(stream, _)| stream)
            .collect())
    }

    /// Write the next chunk of `input`, returning the new offset.
    fn write_input(&mut self, input: &[u8], written: usize) -> Result<usize, ProcessError> {
        let Some(pipe) = self.stdin.as_mut() else {
            return Ok(written);
        };
        let end = (written + CHUNK).min(input.len());

        match pipe.write(&input[written..end]) {
            Ok(n) => Ok(written + n),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                Ok(written)
            }
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                debug!(remaining = input.len() - written, "child closed stdin early");
                Ok(input.len())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Read one chunk from `pipe` into `sink`, closing it on EOF.
fn drain<R: Read>(pipe: &mut Option<R>, sink: &mut Vec<u8>, buf: &mut [u8]) -> Result<(), ProcessError> {
    let Some(reader) = pipe.as_mut() else {
        return Ok(());
    };

    match reader.read(buf) {
        Ok(0) => *pipe = None,
        Ok(n) => sink.extend_from_slice(&buf[..n]),
        Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {}
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

fn set_nonblocking(fd: RawFd) -> Result<(), ProcessError> {
    let flags = OFlag::from_bits_truncate(fcntl(fd, FcntlArg::F_GETFL)?);
    fcntl(fd, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;
    Ok(())
}
