//! Chunked input and the driver loop shared by the row parsers.
//!
//! A [`StreamDriver`] pulls chunks from a [`ChunkStream`] and feeds them to a
//! [`StateMachine`] until the machine stops, the stream ends, or the byte
//! budget is spent. Consumers stop a parse by returning [`Proceed::No`] from
//! any callback; the unconsumed tail of the current chunk is retained and the
//! next `run()` resumes exactly where the parse left off.

use crate::types::IndexableElement;
use bytes::Bytes;
use reef_core::Result;
use tracing::trace;

/// Consumer verdict after each delivered event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Proceed {
    Yes,
    No,
}

/// How a `run()` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveOutcome {
    /// The consumer asked to stop. Calling `run()` again resumes the parse.
    Stopped,
    /// The stream (or the byte budget) ended and the machine verified its
    /// terminal state.
    Done,
}

/// Source of raw data-file bytes, already positioned at a partition boundary.
/// An empty chunk signals end of stream. Chunks may be of any size.
pub trait ChunkStream {
    /// # Errors
    /// Propagates failures of the underlying source.
    fn next_chunk(&mut self) -> Result<Bytes>;
}

/// A state machine the driver can feed chunk by chunk.
pub trait StateMachine {
    /// Advance on the front of `data`, consuming what the current states
    /// need. Returns the consumer's verdict.
    ///
    /// # Errors
    /// Fails on any wire-format violation. Errors are fatal to the parse.
    fn process(&mut self, data: &mut Bytes) -> Result<Proceed>;

    /// Whether the current state makes progress without consuming input, so
    /// the driver may invoke `process` with an empty chunk.
    fn non_consuming(&self) -> bool;

    /// Check that the machine sits on a legal element boundary at end of
    /// input.
    ///
    /// # Errors
    /// Fails when the stream ended mid-element.
    fn verify_end_state(&mut self) -> Result<()>;

    /// Re-position the machine after the reader fast-forwarded the stream.
    ///
    /// # Errors
    /// Fails when the format does not support the requested element kind.
    fn reset(&mut self, element: IndexableElement) -> Result<()>;
}

/// Drives one state machine over one chunk stream with a byte budget.
pub struct StreamDriver<M, S> {
    machine: M,
    stream: S,
    remaining: u64,
    current: Bytes,
}

impl<M: StateMachine, S: ChunkStream> StreamDriver<M, S> {
    pub fn new(machine: M, stream: S, maxlen: u64) -> Self {
        Self {
            machine,
            stream,
            remaining: maxlen,
            current: Bytes::new(),
        }
    }

    /// Run until the consumer stops the parse or the input ends.
    ///
    /// # Errors
    /// Propagates stream failures and wire-format violations.
    pub fn run(&mut self) -> Result<DriveOutcome> {
        loop {
            while !self.current.is_empty() || self.machine.non_consuming() {
                match self.machine.process(&mut self.current)? {
                    Proceed::Yes => {}
                    Proceed::No => return Ok(DriveOutcome::Stopped),
                }
            }
            if self.remaining == 0 {
                self.machine.verify_end_state()?;
                return Ok(DriveOutcome::Done);
            }
            let mut chunk = self.stream.next_chunk()?;
            if chunk.is_empty() {
                self.machine.verify_end_state()?;
                return Ok(DriveOutcome::Done);
            }
            if chunk.len() as u64 > self.remaining {
                chunk.truncate(self.remaining as usize);
            }
            self.remaining -= chunk.len() as u64;
            trace!(
                target: "reef::sstable",
                len = chunk.len(),
                remaining = self.remaining,
                "fetched chunk"
            );
            self.current = chunk;
        }
    }

    /// Re-position after the caller fast-forwarded the underlying stream to
    /// `element`, discarding buffered data and installing a new byte budget.
    ///
    /// # Errors
    /// Fails when the machine does not support the element kind.
    pub fn reset(&mut self, element: IndexableElement, maxlen: u64) -> Result<()> {
        self.machine.reset(element)?;
        self.current = Bytes::new();
        self.remaining = maxlen;
        Ok(())
    }

    #[must_use]
    pub fn machine(&self) -> &M {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut M {
        &mut self.machine
    }

    #[must_use]
    pub fn into_machine(self) -> M {
        self.machine
    }
}

/// Replays one buffer as a sequence of fixed-size chunks. The main stream
/// implementation for tests and for callers that already hold the data.
pub struct SliceStream {
    data: Bytes,
    chunk_size: usize,
}

impl SliceStream {
    #[must_use]
    pub fn new(data: impl Into<Bytes>, chunk_size: usize) -> Self {
        Self {
            data: data.into(),
            chunk_size: chunk_size.max(1),
        }
    }

    /// The whole buffer as a single chunk.
    #[must_use]
    pub fn whole(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let chunk_size = data.len().max(1);
        Self { data, chunk_size }
    }
}

impl ChunkStream for SliceStream {
    fn next_chunk(&mut self) -> Result<Bytes> {
        let take = self.chunk_size.min(self.data.len());
        Ok(self.data.split_to(take))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_stream_chunks() {
        let mut stream = SliceStream::new(&b"abcdefg"[..], 3);
        assert_eq!(stream.next_chunk().unwrap().as_ref(), b"abc");
        assert_eq!(stream.next_chunk().unwrap().as_ref(), b"def");
        assert_eq!(stream.next_chunk().unwrap().as_ref(), b"g");
        assert!(stream.next_chunk().unwrap().is_empty());
        assert!(stream.next_chunk().unwrap().is_empty());
    }

    #[test]
    fn test_slice_stream_whole() {
        let mut stream = SliceStream::whole(&b"abc"[..]);
        assert_eq!(stream.next_chunk().unwrap().as_ref(), b"abc");
        assert!(stream.next_chunk().unwrap().is_empty());
    }
}
