//! Decoding engine for AMD GPU front-end command packet streams.

/// Host-facing contracts: stream kinds, provenance, configuration and collaborators.
pub mod api;
pub use api::{
    register_label, BufferRef, DecoderConfig, Device, DeviceFeatures, Dialect, GfxLevel,
    NoRegisterNames, Provenance, RegisterNames, RingDump, RingReadError, RingSource, RingWrap,
    StreamKind, VmReadError, VmReader, DEFAULT_MAX_REFERENCE_BYTES,
    DEFAULT_SHADER_SCAN_LIMIT_BYTES, DEFAULT_SHADER_SCAN_PAGE_BYTES,
};

/// Arena-owned packet node model.
pub mod arena;
pub use arena::{
    DataBlock, DataBlockKind, NestedBuffer, PacketHeader, PacketNode, PacketStream, ShaderProgram,
    ShaderStage, StreamId, StreamRecord,
};

/// Stream builders for every dialect.
pub mod build;
pub use build::{BuildOptions, SizeRecovery, UnknownPacket};

/// Field decoders driving the presentation protocol.
pub mod decode;
pub use decode::{decode_stream, emit_fields, Cursor, Describe, Limit, WordAddresses, UNKNOWN};

/// Diagnostic collaborator and default sinks.
pub mod diag;
pub use diag::{Diagnostic, DiagnosticCounters, DiagnosticSink, TracingDiagnostics};

/// Static opcode tables and declarative field layouts.
pub mod encoding;
pub use encoding::{FieldKind, FieldSpec, Layout, OpcodeEntry, PacketLength};

/// Unified facade over the seven stream kinds.
pub mod facade;
pub use facade::{
    build_stream, build_stream_with, linearize_ring, AnyStream, LinearRing, PacketDecoder,
    RingWindow, RING_HEADER_WORDS,
};

/// Error taxonomy and diagnostic kinds.
pub mod fault;
pub use fault::{BuildError, DecoderError, DiagnosticClass, DiagnosticKind};

/// Packet listing rows projected from recorded presentations.
pub mod listing;
pub use listing::{listing_rows, render_listing, ListingRow};

/// In-memory VM image and register name table.
pub mod memory;
pub use memory::{words_from_le_bytes, words_to_le_bytes, RegisterTable, SparseMemory};

/// Presentation protocol and the recording presenter.
pub mod present;
pub use present::{
    BufferInfo, Field, PacketInfo, PacketRecord, PresentEvent, Presenter, Radix,
    RecordingPresenter,
};

/// Explicit decode request queue.
pub mod session;
pub use session::{
    DecodeOutcome, DecodeRequest, DecodeSession, SessionError, DEFAULT_SESSION_CAPACITY,
};

/// Video decode message buffers.
pub mod video;
pub use video::{decode_message_buffer, MessageDecode, MessageId, MessageRecord};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
