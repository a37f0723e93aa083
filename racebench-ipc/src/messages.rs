//! IPC Message Types
//!
//! All messages are serialized with rkyv and validated on receipt.

use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};

/// Longest failure text a worker sends back, in bytes
pub const MAX_FAILURE_MESSAGE: usize = 4 * 1024;

/// Half-open `[start, end)` interval as it travels over the pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct WireRange {
    /// Inclusive lower bound
    pub start: i64,
    /// Exclusive upper bound
    pub end: i64,
}

/// Serializable descriptor of a workload a worker knows how to evaluate.
///
/// Functions cannot cross a process boundary, so the worker rebuilds the
/// workload from this descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum WorkloadSpec {
    /// Count primes in the chunk by trial division
    CountPrimes,
    /// Block for `delay_nanos` per unit, each unit contributing 1
    Sleep {
        /// Blocking interval per unit in nanoseconds
        delay_nanos: u64,
    },
}

/// Worker capabilities advertised during handshake
#[derive(Debug, Clone, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct WorkerCapabilities {
    /// Protocol version for compatibility
    pub protocol_version: u32,
    /// Number of logical CPUs visible to the worker
    pub cpu_count: u32,
    /// Worker process id (for logs)
    pub pid: u32,
}

impl Default for WorkerCapabilities {
    fn default() -> Self {
        Self {
            protocol_version: crate::PROTOCOL_VERSION,
            cpu_count: num_cpus(),
            pid: std::process::id(),
        }
    }
}

/// Messages sent from Worker to Coordinator
#[derive(Debug, Clone, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum WorkerMessage {
    /// Initial handshake with worker capabilities
    Hello(WorkerCapabilities),

    /// A chunk was evaluated successfully
    ChunkComplete {
        /// Index of the chunk in the coordinator's partition
        chunk_index: u32,
        /// Workload value for the chunk
        value: u64,
        /// Time the worker spent on the chunk
        duration_nanos: u64,
    },

    /// A chunk failed; the coordinator discards the whole run
    ChunkFailed {
        /// Index of the chunk in the coordinator's partition
        chunk_index: u32,
        /// Error category
        kind: FailureKind,
        /// Human-readable error message
        message: String,
    },
}

impl WorkerMessage {
    /// `ChunkFailed` reply with `message` cut to [`MAX_FAILURE_MESSAGE`] bytes
    pub fn chunk_failed(chunk_index: u32, kind: FailureKind, mut message: String) -> Self {
        if message.len() > MAX_FAILURE_MESSAGE {
            let mut end = MAX_FAILURE_MESSAGE;
            while !message.is_char_boundary(end) {
                end -= 1;
            }
            message.truncate(end);
        }
        WorkerMessage::ChunkFailed {
            chunk_index,
            kind,
            message,
        }
    }
}

/// Categories of chunk failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum FailureKind {
    /// Rust panic (caught)
    Panic,
    /// The workload returned an error
    Workload,
}

/// Commands sent from Coordinator to Worker
#[derive(Debug, Clone, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum CoordinatorCommand {
    /// Evaluate one chunk of a workload
    Evaluate {
        /// Index of the chunk in the coordinator's partition
        chunk_index: u32,
        /// The chunk bounds
        chunk: WireRange,
        /// Which workload to apply
        workload: WorkloadSpec,
    },

    /// Request graceful shutdown
    Shutdown,
}

fn num_cpus() -> u32 {
    std::thread::available_parallelism()
        .map(|p| p.get() as u32)
        .unwrap_or(1)
}
