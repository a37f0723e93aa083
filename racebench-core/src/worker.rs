//! Worker Process Entry Point
//!
//! Handles the worker side of the process-pool model. The coordinator
//! re-executes the current binary with `--worker`; the worker rebuilds the
//! requested workload from its descriptor and evaluates one chunk per
//! command in its own address space.
//!
//! On Unix, uses fd 3/4 for IPC (set via `RACEBENCH_IPC_FD`) and installs
//! a SIGTERM handler for graceful shutdown. On non-Unix, falls back to
//! stdin/stdout and skips signal handling.

use crate::error::panic_message;
use crate::range::Range;
use crate::workload::workload_from_spec;
use racebench_ipc::{
    CoordinatorCommand, FailureKind, FrameError, FrameReceiver, FrameSender, IPC_FD_ENV,
    WireRange, WorkerCapabilities, WorkerMessage, WorkloadSpec,
};
use std::io::{Read, Write};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

#[cfg(unix)]
use std::os::unix::io::FromRawFd;

/// Set by the SIGTERM handler to request graceful shutdown.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::Relaxed)
}

/// The handler only sets an atomic, so it is async-signal-safe.
#[cfg(unix)]
fn install_sigterm_handler() {
    unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = sigterm_handler as *const () as usize;
        sa.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&mut sa.sa_mask);
        libc::sigaction(libc::SIGTERM, &sa, std::ptr::null_mut());
    }
}

#[cfg(unix)]
extern "C" fn sigterm_handler(_sig: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::Relaxed);
}

#[cfg(not(unix))]
fn install_sigterm_handler() {}

enum IpcTransport {
    #[cfg(unix)]
    Fds { read_fd: i32, write_fd: i32 },
    Stdio,
}

fn parse_fd_pair(val: &str) -> Option<(i32, i32)> {
    let (r, w) = val.split_once(',')?;
    Some((r.trim().parse().ok()?, w.trim().parse().ok()?))
}

fn detect_transport() -> IpcTransport {
    #[cfg(unix)]
    if let Ok(val) = std::env::var(IPC_FD_ENV) {
        if let Some((read_fd, write_fd)) = parse_fd_pair(&val) {
            return IpcTransport::Fds { read_fd, write_fd };
        }
        eprintln!(
            "racebench: warning: invalid {IPC_FD_ENV}={val:?} (expected format: <read_fd>,<write_fd>), falling back to stdio"
        );
    }
    IpcTransport::Stdio
}

/// Worker main loop
pub struct WorkerMain {
    commands: FrameReceiver<Box<dyn Read>, CoordinatorCommand>,
    replies: FrameSender<Box<dyn Write>, WorkerMessage>,
}

impl WorkerMain {
    /// Create a worker on fd 3/4 if `RACEBENCH_IPC_FD` is set, otherwise stdin/stdout
    pub fn new() -> Self {
        match detect_transport() {
            #[cfg(unix)]
            IpcTransport::Fds { read_fd, write_fd } => {
                // The coordinator dup2'd both pipe ends onto these descriptors before exec.
                let read_file = unsafe { std::fs::File::from_raw_fd(read_fd) };
                let write_file = unsafe { std::fs::File::from_raw_fd(write_fd) };
                Self::from_streams(Box::new(read_file), Box::new(write_file))
            }
            IpcTransport::Stdio => {
                Self::from_streams(Box::new(std::io::stdin()), Box::new(std::io::stdout()))
            }
        }
    }

    /// Create a worker over arbitrary streams
    pub fn from_streams(reader: Box<dyn Read>, writer: Box<dyn Write>) -> Self {
        Self {
            commands: FrameReceiver::new(reader),
            replies: FrameSender::new(writer),
        }
    }

    /// Run until `Shutdown`, SIGTERM, or the coordinator closes the pipe
    pub fn run(&mut self) -> Result<(), FrameError> {
        install_sigterm_handler();

        self.replies
            .send(&WorkerMessage::Hello(WorkerCapabilities::default()))?;

        loop {
            if shutdown_requested() {
                break;
            }

            let command = match self.commands.recv() {
                Ok(command) => command,
                Err(FrameError::Closed) => break,
                Err(e) => return Err(e),
            };

            match command {
                CoordinatorCommand::Evaluate {
                    chunk_index,
                    chunk,
                    workload,
                } => {
                    let reply = evaluate(chunk_index, chunk, workload);
                    self.replies.send(&reply)?;
                }
                CoordinatorCommand::Shutdown => break,
            }
        }

        Ok(())
    }
}

impl Default for WorkerMain {
    fn default() -> Self {
        Self::new()
    }
}

fn evaluate(chunk_index: u32, chunk: WireRange, spec: WorkloadSpec) -> WorkerMessage {
    let failed = |kind, message| WorkerMessage::chunk_failed(chunk_index, kind, message);

    let range = match Range::try_from(chunk) {
        Ok(range) => range,
        Err(e) => return failed(FailureKind::Workload, e.to_string()),
    };
    let workload = workload_from_spec(spec);

    let start = Instant::now();
    match catch_unwind(AssertUnwindSafe(|| workload.apply(range))) {
        Ok(Ok(value)) => WorkerMessage::ChunkComplete {
            chunk_index,
            value,
            duration_nanos: start.elapsed().as_nanos().min(u128::from(u64::MAX)) as u64,
        },
        Ok(Err(e)) => failed(FailureKind::Workload, e.message),
        Err(panic) => failed(FailureKind::Panic, panic_message(panic.as_ref())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    /// Write half that keeps its bytes reachable after the worker drops it
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn encode(commands: &[CoordinatorCommand]) -> Vec<u8> {
        let mut sender = FrameSender::new(Vec::new());
        for command in commands {
            sender.send(command).unwrap();
        }
        sender.into_inner()
    }

    fn decode(bytes: Vec<u8>) -> Vec<WorkerMessage> {
        let mut receiver = FrameReceiver::<_, WorkerMessage>::new(Cursor::new(bytes));
        let mut messages = Vec::new();
        loop {
            match receiver.recv() {
                Ok(msg) => messages.push(msg),
                Err(FrameError::Closed) => break,
                Err(e) => panic!("bad frame: {e}"),
            }
        }
        messages
    }

    fn run_worker(commands: &[CoordinatorCommand]) -> Vec<WorkerMessage> {
        let output = SharedBuf::default();
        let mut worker = WorkerMain::from_streams(
            Box::new(Cursor::new(encode(commands))),
            Box::new(output.clone()),
        );
        worker.run().unwrap();
        drop(worker);
        let bytes = output.0.lock().unwrap().clone();
        decode(bytes)
    }

    #[test]
    fn test_parse_fd_pair() {
        assert_eq!(parse_fd_pair("3,4"), Some((3, 4)));
        assert_eq!(parse_fd_pair(" 3 , 4 "), Some((3, 4)));
        assert_eq!(parse_fd_pair("3"), None);
        assert_eq!(parse_fd_pair("a,4"), None);
    }

    #[test]
    fn test_worker_evaluates_chunks_then_shuts_down() {
        let messages = run_worker(&[
            CoordinatorCommand::Evaluate {
                chunk_index: 0,
                chunk: WireRange { start: 2, end: 100 },
                workload: WorkloadSpec::CountPrimes,
            },
            CoordinatorCommand::Evaluate {
                chunk_index: 1,
                chunk: WireRange { start: 0, end: 3 },
                workload: WorkloadSpec::Sleep { delay_nanos: 1_000 },
            },
            CoordinatorCommand::Shutdown,
        ]);

        assert_eq!(messages.len(), 3);
        assert!(matches!(messages[0], WorkerMessage::Hello(_)));
        assert!(matches!(
            messages[1],
            WorkerMessage::ChunkComplete {
                chunk_index: 0,
                value: 25,
                ..
            }
        ));
        assert!(matches!(
            messages[2],
            WorkerMessage::ChunkComplete {
                chunk_index: 1,
                value: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_worker_stops_at_end_of_stream() {
        let messages = run_worker(&[]);
        assert_eq!(messages.len(), 1);
        assert!(matches!(messages[0], WorkerMessage::Hello(_)));
    }

    #[test]
    fn test_reversed_chunk_reports_failure() {
        let messages = run_worker(&[CoordinatorCommand::Evaluate {
            chunk_index: 7,
            chunk: WireRange { start: 10, end: 5 },
            workload: WorkloadSpec::CountPrimes,
        }]);
        match &messages[1] {
            WorkerMessage::ChunkFailed {
                chunk_index, kind, ..
            } => {
                assert_eq!(*chunk_index, 7);
                assert_eq!(*kind, FailureKind::Workload);
            }
            other => panic!("expected ChunkFailed, got {other:?}"),
        }
    }
}
