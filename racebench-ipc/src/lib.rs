#![warn(missing_docs)]
//! racebench IPC Protocol
//!
//! Binary protocol between the process-pool coordinator and its worker
//! processes. Messages are rkyv archives wrapped in length-prefixed frames,
//! so a worker never shares memory with the coordinator: chunk requests go
//! down one pipe and chunk results come back up the other.

mod framing;
mod messages;

pub use framing::{FrameError, FrameReceiver, FrameSender, MAX_FRAME_SIZE, PipeMessage};
pub use messages::{
    CoordinatorCommand, FailureKind, MAX_FAILURE_MESSAGE, WireRange, WorkerCapabilities,
    WorkerMessage, WorkloadSpec,
};

/// Protocol version for compatibility checking
pub const PROTOCOL_VERSION: u32 = 1;

/// Environment variable carrying the `<read_fd>,<write_fd>` pair for a worker
pub const IPC_FD_ENV: &str = "RACEBENCH_IPC_FD";

/// Command-line flag that switches the binary into worker mode
pub const WORKER_FLAG: &str = "--worker";
