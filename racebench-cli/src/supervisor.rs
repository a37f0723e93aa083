//! Supervisor Process
//!
//! Spawns worker processes for the process-pool model and drives them over
//! the fd 3/4 pipe pair. Each worker is a re-execution of a racebench binary
//! with `--worker`; chunks go down the command pipe and values come back up
//! the message pipe. Nothing else is shared with the worker.
//!
//! Pipe ends are created close-on-exec and above fd 4, so a worker inherits
//! exactly its own two ends on fd 3 and 4 even while sibling workers are
//! being spawned from other coordinator threads.

use racebench_core::{Chunk, HarnessError};
use racebench_ipc::{
    CoordinatorCommand, FailureKind, FrameError, FrameReceiver, FrameSender, IPC_FD_ENV,
    PROTOCOL_VERSION, WORKER_FLAG, WorkerCapabilities, WorkerMessage, WorkloadSpec,
};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use std::io;
use std::os::unix::io::{FromRawFd, RawFd};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Failures talking to a worker process
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(#[from] io::Error),

    #[error("IPC error: {0}")]
    IpcError(String),

    #[error("Worker crashed: {0}")]
    WorkerCrashed(String),

    #[error("Worker protocol error: expected {expected}, got {got}")]
    ProtocolError { expected: String, got: String },
}

impl From<FrameError> for SupervisorError {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::Closed | FrameError::Truncated { .. } => {
                SupervisorError::WorkerCrashed(format!("Worker closed its pipe ({})", e))
            }
            other => SupervisorError::IpcError(other.to_string()),
        }
    }
}

/// Reply to one `Evaluate` command
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkOutcome {
    /// The worker evaluated the chunk
    Complete { value: u64, duration: Duration },
    /// The workload failed or panicked inside the worker
    Failed { kind: FailureKind, message: String },
}

/// Lowest descriptor a pipe end may occupy; 3 and 4 are the worker's IPC slots
const FIRST_FREE_FD: RawFd = 5;

#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
fn open_cloexec_pipe(fds: &mut [RawFd; 2]) -> io::Result<()> {
    if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

// No pipe2 here; a fork between pipe() and fcntl() can still inherit the ends.
#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
)))]
fn open_cloexec_pipe(fds: &mut [RawFd; 2]) -> io::Result<()> {
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(io::Error::last_os_error());
    }
    for &fd in fds.iter() {
        unsafe {
            let flags = libc::fcntl(fd, libc::F_GETFD);
            libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC);
        }
    }
    Ok(())
}

/// Move `fd` to the lowest free descriptor `>= FIRST_FREE_FD`, closing the original
fn raise_fd(fd: RawFd) -> io::Result<RawFd> {
    if fd >= FIRST_FREE_FD {
        return Ok(fd);
    }
    let raised = unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, FIRST_FREE_FD) };
    let result = if raised == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(raised)
    };
    close_fd(fd);
    result
}

/// Create a close-on-exec pipe, returning (read_fd, write_fd), both `>= FIRST_FREE_FD`.
///
/// A fresh process has fd 3 and 4 free, so `pipe` hands them out; left
/// there, the child's `dup2` onto 3/4 would clobber its own pipe ends.
fn create_pipe() -> io::Result<(RawFd, RawFd)> {
    let mut fds = [0 as RawFd; 2];
    open_cloexec_pipe(&mut fds)?;

    let read_fd = match raise_fd(fds[0]) {
        Ok(fd) => fd,
        Err(e) => {
            close_fd(fds[1]);
            return Err(e);
        }
    };
    let write_fd = match raise_fd(fds[1]) {
        Ok(fd) => fd,
        Err(e) => {
            close_fd(read_fd);
            return Err(e);
        }
    };
    Ok((read_fd, write_fd))
}

fn close_fd(fd: RawFd) {
    unsafe {
        libc::close(fd);
    }
}

fn send_sigterm(pid: u32) -> io::Result<()> {
    let ret = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Worker process handle
pub struct WorkerHandle {
    child: Child,
    replies: FrameReceiver<std::fs::File, WorkerMessage>,
    commands: FrameSender<std::fs::File, CoordinatorCommand>,
    capabilities: Option<WorkerCapabilities>,
}

impl WorkerHandle {
    /// Spawn a worker from `binary`, wait for its hello and check the protocol version.
    pub fn spawn(binary: &Path) -> Result<Self, SupervisorError> {
        // cmd_pipe: coordinator writes commands → worker reads from fd 3
        let (cmd_read, cmd_write) = create_pipe()?;
        // msg_pipe: worker writes messages from fd 4 → coordinator reads
        let (msg_read, msg_write) = match create_pipe() {
            Ok(fds) => fds,
            Err(e) => {
                close_fd(cmd_read);
                close_fd(cmd_write);
                return Err(SupervisorError::SpawnFailed(e));
            }
        };

        let mut command = Command::new(binary);
        command
            .arg(WORKER_FLAG)
            .env(IPC_FD_ENV, "3,4")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());

        // Both ends sit above fd 4, so neither dup2 can land on the other.
        // The copies on 3 and 4 lose FD_CLOEXEC; every other end closes on exec.
        unsafe {
            command.pre_exec(move || {
                if libc::dup2(cmd_read, 3) == -1 || libc::dup2(msg_write, 4) == -1 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let child = match command.spawn() {
            Ok(c) => c,
            Err(e) => {
                close_fd(cmd_read);
                close_fd(cmd_write);
                close_fd(msg_read);
                close_fd(msg_write);
                return Err(SupervisorError::SpawnFailed(e));
            }
        };

        close_fd(cmd_read);
        close_fd(msg_write);

        let writer_file = unsafe { std::fs::File::from_raw_fd(cmd_write) };
        let reader_file = unsafe { std::fs::File::from_raw_fd(msg_read) };

        let mut handle = Self {
            child,
            replies: FrameReceiver::new(reader_file),
            commands: FrameSender::new(writer_file),
            capabilities: None,
        };

        handle.wait_for_hello()?;
        debug!(pid = handle.child.id(), "worker ready");
        Ok(handle)
    }

    fn wait_for_hello(&mut self) -> Result<(), SupervisorError> {
        let msg = self.replies.recv()?;

        match msg {
            WorkerMessage::Hello(caps) => {
                if caps.protocol_version != PROTOCOL_VERSION {
                    return Err(SupervisorError::ProtocolError {
                        expected: format!("protocol version {}", PROTOCOL_VERSION),
                        got: format!("protocol version {}", caps.protocol_version),
                    });
                }
                self.capabilities = Some(caps);
                Ok(())
            }
            other => Err(SupervisorError::ProtocolError {
                expected: "Hello".to_string(),
                got: format!("{:?}", other),
            }),
        }
    }

    /// Capabilities the worker advertised
    pub fn capabilities(&self) -> Option<&WorkerCapabilities> {
        self.capabilities.as_ref()
    }

    /// Evaluate one chunk; blocks until the worker replies
    pub fn evaluate(
        &mut self,
        chunk_index: u32,
        chunk: Chunk,
        workload: WorkloadSpec,
    ) -> Result<ChunkOutcome, SupervisorError> {
        self.commands.send(&CoordinatorCommand::Evaluate {
            chunk_index,
            chunk: chunk.into(),
            workload,
        })?;

        let msg = match self.replies.recv() {
            Ok(msg) => msg,
            Err(e) => {
                if !self.is_alive() {
                    return Err(SupervisorError::WorkerCrashed(format!(
                        "Worker exited while evaluating chunk {}",
                        chunk
                    )));
                }
                return Err(e.into());
            }
        };

        match msg {
            WorkerMessage::ChunkComplete {
                chunk_index: got,
                value,
                duration_nanos,
            } if got == chunk_index => Ok(ChunkOutcome::Complete {
                value,
                duration: Duration::from_nanos(duration_nanos),
            }),
            WorkerMessage::ChunkFailed {
                chunk_index: got,
                kind,
                message,
            } if got == chunk_index => Ok(ChunkOutcome::Failed { kind, message }),
            other => Err(SupervisorError::ProtocolError {
                expected: format!("reply for chunk {}", chunk_index),
                got: format!("{:?}", other),
            }),
        }
    }

    /// Shutdown the worker gracefully
    pub fn shutdown(mut self) -> Result<(), SupervisorError> {
        self.commands.send(&CoordinatorCommand::Shutdown)?;
        let _ = self.child.wait();
        Ok(())
    }

    /// OS process id of the worker
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Check if worker process is still running
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if self.is_alive() {
            // SIGTERM first, brief wait, then SIGKILL
            let _ = send_sigterm(self.child.id());
            std::thread::sleep(Duration::from_millis(50));
            if self.is_alive() {
                let _ = self.child.kill();
            }
            let _ = self.child.wait();
        }
    }
}

/// Pool of persistent worker processes evaluating chunks of one workload
pub struct ProcessPool {
    binary: PathBuf,
    num_workers: usize,
}

impl ProcessPool {
    /// Pool of up to `num_workers` workers spawned from `binary`
    pub fn new(binary: impl Into<PathBuf>, num_workers: usize) -> Self {
        Self {
            binary: binary.into(),
            num_workers: num_workers.max(1),
        }
    }

    /// Evaluate every chunk and return the values in chunk order.
    ///
    /// Chunks are sharded round-robin across `min(num_workers, chunks)`
    /// workers. Any failed chunk fails the whole call.
    pub fn evaluate(&self, chunks: &[Chunk], workload: WorkloadSpec) -> Result<Vec<u64>, HarnessError> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }
        if u32::try_from(chunks.len()).is_err() {
            return Err(HarnessError::InvalidArgument(format!(
                "too many chunks for the process pool ({})",
                chunks.len()
            )));
        }

        let worker_count = self.num_workers.min(chunks.len());
        let mut shards: Vec<Vec<(u32, Chunk)>> = vec![Vec::new(); worker_count];
        for (index, &chunk) in chunks.iter().enumerate() {
            shards[index % worker_count].push((index as u32, chunk));
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(worker_count)
            .thread_name(|i| format!("racebench-coord-{}", i))
            .build()
            .map_err(|e| HarnessError::Pool(format!("Failed to build coordinator pool: {}", e)))?;

        let shard_results: Vec<Result<Vec<(u32, u64)>, HarnessError>> = pool.install(|| {
            shards
                .into_par_iter()
                .map(|shard| self.run_shard(&shard, workload))
                .collect()
        });

        let mut indexed = Vec::with_capacity(chunks.len());
        for result in shard_results {
            indexed.extend(result?);
        }
        indexed.sort_by_key(|(index, _)| *index);

        if indexed.len() != chunks.len() {
            return Err(HarnessError::Pool(format!(
                "Internal error: expected {} results, got {}",
                chunks.len(),
                indexed.len()
            )));
        }

        Ok(indexed.into_iter().map(|(_, value)| value).collect())
    }

    fn run_shard(
        &self,
        shard: &[(u32, Chunk)],
        workload: WorkloadSpec,
    ) -> Result<Vec<(u32, u64)>, HarnessError> {
        let mut worker = WorkerHandle::spawn(&self.binary)
            .map_err(|e| HarnessError::Pool(format!("{} ({})", e, self.binary.display())))?;

        let mut results = Vec::with_capacity(shard.len());
        for &(index, chunk) in shard {
            match worker.evaluate(index, chunk, workload) {
                Ok(ChunkOutcome::Complete { value, duration }) => {
                    debug!(chunk = %chunk, value, ?duration, "chunk complete");
                    results.push((index, value));
                }
                Ok(ChunkOutcome::Failed { kind, message }) => {
                    let _ = worker.shutdown();
                    return Err(chunk_failure(chunk, kind, message));
                }
                // The worker is dropped (and killed) on the way out.
                Err(e) => return Err(HarnessError::workload_failure(chunk, e.to_string())),
            }
        }

        let _ = worker.shutdown();
        Ok(results)
    }
}

/// `WorkloadFailure` for a `ChunkFailed` reply, worded like in-process failures
fn chunk_failure(chunk: Chunk, kind: FailureKind, message: String) -> HarnessError {
    let message = match kind {
        FailureKind::Panic => format!("panicked: {}", message),
        FailureKind::Workload => message,
    };
    HarnessError::workload_failure(chunk, message)
}
