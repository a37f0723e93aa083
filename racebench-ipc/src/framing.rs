//! Pipe Framing
//!
//! Each pipe carries one message type in one direction: `CoordinatorCommand`
//! frames down the command pipe and `WorkerMessage` frames up the result
//! pipe. [`FrameSender`] and [`FrameReceiver`] are typed by that message, so
//! a coordinator cannot read its own commands back by mistake.
//!
//! ```text
//! +------------------+----------------------------+
//! | payload len (LE) | rkyv archive of M          |
//! | u32              | len bytes, validated on rx |
//! +------------------+----------------------------+
//! ```
//!
//! Every message in this protocol is a few dozen bytes except `ChunkFailed`,
//! whose text is capped at [`MAX_FAILURE_MESSAGE`](crate::MAX_FAILURE_MESSAGE).
//! A length prefix above [`MAX_FRAME_SIZE`] therefore means a corrupt stream.

use crate::messages::{CoordinatorCommand, WorkerMessage};
use rkyv::ser::serializers::AllocSerializer;
use rkyv::validation::validators::DefaultValidator;
use rkyv::{AlignedVec, Archive, CheckBytes, Deserialize, Infallible, Serialize};
use std::io::{self, BufReader, ErrorKind, Read, Write};
use std::marker::PhantomData;
use thiserror::Error;

/// Largest payload accepted in either direction
pub const MAX_FRAME_SIZE: usize = 8 * 1024;

const LEN_PREFIX: usize = 4;

/// Errors raised while moving frames over a worker pipe
#[derive(Debug, Error)]
pub enum FrameError {
    /// The pipe itself failed
    #[error("pipe I/O failed: {0}")]
    Io(#[from] io::Error),

    /// rkyv could not archive an outgoing message
    #[error("could not encode {kind}: {reason}")]
    Encode {
        /// Message type being sent
        kind: &'static str,
        /// Serializer error
        reason: String,
    },

    /// The payload failed validation or the frame is empty
    #[error("malformed {kind} frame: {reason}")]
    Malformed {
        /// Message type expected
        kind: &'static str,
        /// What was wrong with it
        reason: String,
    },

    /// A length prefix or outgoing payload above [`MAX_FRAME_SIZE`]
    #[error("{kind} frame of {len} bytes exceeds the {max}-byte limit")]
    Oversized {
        /// Message type involved
        kind: &'static str,
        /// Offending payload length
        len: usize,
        /// Always [`MAX_FRAME_SIZE`]
        max: usize,
    },

    /// The pipe closed in the middle of a frame
    #[error("pipe closed inside a {kind} frame ({expected} payload bytes announced)")]
    Truncated {
        /// Message type expected
        kind: &'static str,
        /// Payload length from the prefix
        expected: usize,
    },

    /// The peer closed the pipe cleanly between frames
    #[error("peer closed the pipe")]
    Closed,
}

/// A message type that travels over a worker pipe
pub trait PipeMessage: Sized {
    /// Name used in error messages
    const KIND: &'static str;

    /// Archive `self` into frame payload bytes
    fn encode(&self) -> Result<AlignedVec, FrameError>;

    /// Validate and rebuild a message from an aligned payload
    fn decode(payload: &AlignedVec) -> Result<Self, FrameError>;
}

fn encode_archive<T>(kind: &'static str, message: &T) -> Result<AlignedVec, FrameError>
where
    T: Serialize<AllocSerializer<256>>,
{
    rkyv::to_bytes::<_, 256>(message).map_err(|e| FrameError::Encode {
        kind,
        reason: e.to_string(),
    })
}

fn decode_archive<T>(kind: &'static str, payload: &AlignedVec) -> Result<T, FrameError>
where
    T: Archive,
    T::Archived: for<'a> CheckBytes<DefaultValidator<'a>> + Deserialize<T, Infallible>,
{
    let archived = rkyv::check_archived_root::<T>(payload).map_err(|e| FrameError::Malformed {
        kind,
        reason: e.to_string(),
    })?;
    archived
        .deserialize(&mut Infallible)
        .map_err(|_| FrameError::Malformed {
            kind,
            reason: "archive could not be rebuilt".to_string(),
        })
}

impl PipeMessage for CoordinatorCommand {
    const KIND: &'static str = "command";

    fn encode(&self) -> Result<AlignedVec, FrameError> {
        encode_archive(Self::KIND, self)
    }

    fn decode(payload: &AlignedVec) -> Result<Self, FrameError> {
        decode_archive(Self::KIND, payload)
    }
}

impl PipeMessage for WorkerMessage {
    const KIND: &'static str = "worker message";

    fn encode(&self) -> Result<AlignedVec, FrameError> {
        encode_archive(Self::KIND, self)
    }

    fn decode(payload: &AlignedVec) -> Result<Self, FrameError> {
        decode_archive(Self::KIND, payload)
    }
}

/// Sending half of a pipe, writing one whole frame per message
pub struct FrameSender<W: Write, M: PipeMessage> {
    writer: W,
    frame: Vec<u8>,
    _message: PhantomData<fn(&M)>,
}

impl<W: Write, M: PipeMessage> FrameSender<W, M> {
    /// Wrap the write end of a pipe
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            frame: Vec::with_capacity(LEN_PREFIX + 256),
            _message: PhantomData,
        }
    }

    /// Send one message; the frame is flushed before returning
    pub fn send(&mut self, message: &M) -> Result<(), FrameError> {
        let payload = message.encode()?;
        if payload.len() > MAX_FRAME_SIZE {
            return Err(FrameError::Oversized {
                kind: M::KIND,
                len: payload.len(),
                max: MAX_FRAME_SIZE,
            });
        }

        // Prefix and payload go out in one write so a frame is never split
        // across two syscalls on the pipe.
        self.frame.clear();
        self.frame
            .extend_from_slice(&(payload.len() as u32).to_le_bytes());
        self.frame.extend_from_slice(&payload);
        self.writer.write_all(&self.frame)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Unwrap the underlying writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Receiving half of a pipe
pub struct FrameReceiver<R: Read, M: PipeMessage> {
    reader: BufReader<R>,
    payload: AlignedVec,
    _message: PhantomData<fn() -> M>,
}

impl<R: Read, M: PipeMessage> FrameReceiver<R, M> {
    /// Wrap the read end of a pipe
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            payload: AlignedVec::new(),
            _message: PhantomData,
        }
    }

    /// Block until the next message arrives.
    ///
    /// Returns [`FrameError::Closed`] when the peer closed the pipe on a
    /// frame boundary and [`FrameError::Truncated`] when it closed mid-frame.
    pub fn recv(&mut self) -> Result<M, FrameError> {
        let mut prefix = [0u8; LEN_PREFIX];
        match self.reader.read_exact(&mut prefix) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Err(FrameError::Closed),
            Err(e) => return Err(FrameError::Io(e)),
        }

        let len = u32::from_le_bytes(prefix) as usize;
        if len == 0 {
            return Err(FrameError::Malformed {
                kind: M::KIND,
                reason: "empty frame".to_string(),
            });
        }
        if len > MAX_FRAME_SIZE {
            return Err(FrameError::Oversized {
                kind: M::KIND,
                len,
                max: MAX_FRAME_SIZE,
            });
        }

        self.payload.clear();
        self.payload.resize(len, 0);
        match self.reader.read_exact(&mut self.payload) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                return Err(FrameError::Truncated {
                    kind: M::KIND,
                    expected: len,
                });
            }
            Err(e) => return Err(FrameError::Io(e)),
        }

        M::decode(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FailureKind, MAX_FAILURE_MESSAGE, WireRange, WorkloadSpec};
    use std::io::Cursor;

    fn receiver<M: PipeMessage>(bytes: Vec<u8>) -> FrameReceiver<Cursor<Vec<u8>>, M> {
        FrameReceiver::new(Cursor::new(bytes))
    }

    #[test]
    fn test_commands_arrive_in_order() {
        let mut sender = FrameSender::new(Vec::new());
        sender
            .send(&CoordinatorCommand::Evaluate {
                chunk_index: 3,
                chunk: WireRange { start: 10, end: 20 },
                workload: WorkloadSpec::CountPrimes,
            })
            .unwrap();
        sender.send(&CoordinatorCommand::Shutdown).unwrap();

        let mut rx = receiver::<CoordinatorCommand>(sender.into_inner());
        match rx.recv().unwrap() {
            CoordinatorCommand::Evaluate {
                chunk_index,
                chunk,
                workload,
            } => {
                assert_eq!(chunk_index, 3);
                assert_eq!(chunk, WireRange { start: 10, end: 20 });
                assert_eq!(workload, WorkloadSpec::CountPrimes);
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert!(matches!(rx.recv().unwrap(), CoordinatorCommand::Shutdown));
        assert!(matches!(rx.recv(), Err(FrameError::Closed)));
    }

    #[test]
    fn test_empty_pipe_is_closed() {
        let mut rx = receiver::<WorkerMessage>(Vec::new());
        assert!(matches!(rx.recv(), Err(FrameError::Closed)));
    }

    #[test]
    fn test_close_inside_payload_is_truncated() {
        let mut bytes = 40u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[1, 2, 3]);
        let mut rx = receiver::<WorkerMessage>(bytes);
        assert!(matches!(
            rx.recv(),
            Err(FrameError::Truncated { expected: 40, .. })
        ));
    }

    #[test]
    fn test_empty_frame_rejected() {
        let mut rx = receiver::<WorkerMessage>(0u32.to_le_bytes().to_vec());
        assert!(matches!(rx.recv(), Err(FrameError::Malformed { .. })));
    }

    #[test]
    fn test_oversized_prefix_rejected() {
        let bytes = ((MAX_FRAME_SIZE + 1) as u32).to_le_bytes().to_vec();
        let mut rx = receiver::<WorkerMessage>(bytes);
        assert!(matches!(
            rx.recv(),
            Err(FrameError::Oversized { len, .. }) if len == MAX_FRAME_SIZE + 1
        ));
    }

    #[test]
    fn test_garbage_payload_fails_validation() {
        let mut bytes = 8u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0xFF; 8]);
        let mut rx = receiver::<CoordinatorCommand>(bytes);
        assert!(matches!(rx.recv(), Err(FrameError::Malformed { .. })));
    }

    #[test]
    fn test_longest_failure_message_fits_in_a_frame() {
        let mut sender = FrameSender::new(Vec::new());
        let reply = WorkerMessage::chunk_failed(1, FailureKind::Panic, "x".repeat(100_000));
        sender.send(&reply).unwrap();

        let mut rx = receiver::<WorkerMessage>(sender.into_inner());
        match rx.recv().unwrap() {
            WorkerMessage::ChunkFailed { message, .. } => {
                assert_eq!(message.len(), MAX_FAILURE_MESSAGE)
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }
}
