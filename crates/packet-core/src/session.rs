//! Explicit request queue for hosts that batch decode work.

use std::collections::VecDeque;

use thiserror::Error;

use crate::api::{Device, Provenance, StreamKind};
use crate::decode::{Cursor, Limit};
use crate::facade::build_stream;
use crate::fault::BuildError;
use crate::present::RecordingPresenter;

/// Default number of requests a session holds before refusing more.
pub const DEFAULT_SESSION_CAPACITY: usize = 64;

/// One buffer waiting to be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct DecodeRequest {
    /// Packet format of the words.
    pub kind: StreamKind,
    /// Captured words.
    pub words: Vec<u32>,
    /// Origin of the words.
    pub provenance: Provenance,
    /// Top-level packets to present.
    pub limit: Limit,
    /// Walk nested streams while presenting.
    pub follow: bool,
}

impl DecodeRequest {
    /// Request that presents every packet and follows nested streams.
    #[must_use]
    pub const fn new(kind: StreamKind, words: Vec<u32>, provenance: Provenance) -> Self {
        Self {
            kind,
            words,
            provenance,
            limit: Limit::All,
            follow: true,
        }
    }
}

/// Result of one drained request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeOutcome {
    /// Packet format of the request.
    pub kind: StreamKind,
    /// Origin of the request.
    pub provenance: Provenance,
    /// Recorded presentation, or why no stream was built.
    pub result: Result<RecordingPresenter, BuildError>,
    /// Where a follow-up decode would resume.
    pub cursor: Cursor,
}

/// Refusal to queue another request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum SessionError {
    /// The session already holds its capacity of requests.
    #[error("decode session is full ({capacity} requests)")]
    QueueFull {
        /// Capacity of the session.
        capacity: usize,
    },
}

/// Bounded FIFO of decode requests, drained against one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeSession {
    queue: VecDeque<DecodeRequest>,
    capacity: usize,
}

impl Default for DecodeSession {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_CAPACITY)
    }
}

impl DecodeSession {
    /// Creates an empty session holding at most `capacity` requests.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            capacity,
        }
    }

    /// Queues a request behind the ones already waiting.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::QueueFull`] when the session is at capacity.
    pub fn enqueue(&mut self, request: DecodeRequest) -> Result<(), SessionError> {
        if self.is_full() {
            return Err(SessionError::QueueFull {
                capacity: self.capacity,
            });
        }
        self.queue.push_back(request);
        Ok(())
    }

    /// Requests waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns true when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Returns true when another enqueue would be refused.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.queue.len() >= self.capacity
    }

    /// Builds and presents every queued request in FIFO order.
    pub fn drain(&mut self, device: &mut Device<'_>) -> Vec<DecodeOutcome> {
        let mut outcomes = Vec::with_capacity(self.queue.len());
        while let Some(request) = self.queue.pop_front() {
            let built = build_stream(request.kind, &request.words, request.provenance, device);
            let (result, cursor) = match built {
                Ok(stream) => {
                    let mut presenter = RecordingPresenter::new();
                    let cursor = stream.decode(
                        Cursor::Start,
                        request.limit,
                        request.follow,
                        device,
                        &mut presenter,
                    );
                    (Ok(presenter), cursor)
                }
                Err(err) => {
                    tracing::debug!(kind = %request.kind, error = %err, "queued decode failed");
                    (Err(err), Cursor::End)
                }
            };
            outcomes.push(DecodeOutcome {
                kind: request.kind,
                provenance: request.provenance,
                result,
                cursor,
            });
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::NoRegisterNames;
    use crate::diag::DiagnosticCounters;
    use crate::encoding::sdma;
    use crate::memory::SparseMemory;

    fn trap() -> Vec<u32> {
        vec![sdma::header(sdma::SDMA_OP_TRAP, 0, 0), 0]
    }

    #[test]
    fn enqueue_refuses_past_capacity() {
        let mut session = DecodeSession::new(1);
        let request = DecodeRequest::new(StreamKind::Sdma, trap(), Provenance::default());
        assert!(session.enqueue(request.clone()).is_ok());
        assert!(session.is_full());
        assert_eq!(
            session.enqueue(request),
            Err(SessionError::QueueFull { capacity: 1 })
        );
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn drain_runs_requests_in_order() {
        let mut session = DecodeSession::default();
        session
            .enqueue(DecodeRequest::new(StreamKind::Sdma, trap(), Provenance::default()))
            .expect("room");
        session
            .enqueue(DecodeRequest::new(StreamKind::Sdma, vec![0xFE], Provenance::default()))
            .expect("room");

        let mut memory = SparseMemory::new();
        let mut diagnostics = DiagnosticCounters::new();
        let mut device = Device::new(&mut memory, &NoRegisterNames, &mut diagnostics);
        let outcomes = session.drain(&mut device);

        assert!(session.is_empty());
        assert_eq!(outcomes.len(), 2);
        let first = outcomes[0].result.as_ref().expect("decoded");
        assert_eq!(first.packets().count(), 1);
        assert_eq!(outcomes[0].cursor, Cursor::End);
        assert!(matches!(
            outcomes[1].result,
            Err(BuildError::UnknownOpcode { opcode: 0xFE, .. })
        ));
    }
}
