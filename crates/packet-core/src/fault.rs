//! Error taxonomy: fatal build errors, facade errors and soft diagnostic kinds.

use thiserror::Error;

use crate::api::{RingReadError, StreamKind};

/// Fatal failures that abort a build and produce no stream.
///
/// Everything softer than these (unreadable references, size mismatches,
/// recovered opcodes) is reported through [`crate::DiagnosticSink`] instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// Arena storage could not be reserved.
    #[error("out of memory while building a {kind} stream")]
    OutOfMemory {
        /// Stream kind being built when allocation failed.
        kind: StreamKind,
    },
    /// A table-driven dialect met an opcode with no length entry.
    #[error("unknown {kind} opcode 0x{opcode:02x}/0x{sub_opcode:02x} at word {offset}")]
    UnknownOpcode {
        /// Stream kind being built.
        kind: StreamKind,
        /// Primary opcode from the header.
        opcode: u32,
        /// Sub-opcode (or API type) from the header.
        sub_opcode: u32,
        /// Word offset of the offending header.
        offset: usize,
    },
    /// Not even the first packet fits in the supplied words.
    #[error("{kind} packet needs {needed} words but only {available} are available")]
    InsufficientWords {
        /// Stream kind being built.
        kind: StreamKind,
        /// Words the first packet declares.
        needed: usize,
        /// Words actually supplied.
        available: usize,
    },
    /// No words were supplied at all.
    #[error("empty {kind} buffer")]
    EmptyBuffer {
        /// Stream kind being built.
        kind: StreamKind,
    },
}

impl BuildError {
    /// Stream kind the failed build was for.
    #[must_use]
    pub const fn kind(&self) -> StreamKind {
        match self {
            Self::OutOfMemory { kind }
            | Self::UnknownOpcode { kind, .. }
            | Self::InsufficientWords { kind, .. }
            | Self::EmptyBuffer { kind } => *kind,
        }
    }

    /// Allocation failures are the only errors that must also abort nested builds.
    #[must_use]
    pub const fn is_out_of_memory(&self) -> bool {
        matches!(self, Self::OutOfMemory { .. })
    }
}

/// Failures of the unified facade.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecoderError {
    /// The ring source could not supply the ring.
    #[error(transparent)]
    Ring(#[from] RingReadError),
    /// The stream could not be built.
    #[error(transparent)]
    Build(#[from] BuildError),
    /// No stream kind is known for the ring name.
    #[error("cannot tell the packet format of ring {0:?}")]
    UnknownRingKind(String),
    /// The ring dump is too short to hold its pointer words.
    #[error("ring dump of {words} words has no body after its 3 pointer words")]
    RingTooShort {
        /// Words in the dump.
        words: usize,
    },
}

/// Diagnostic classes used for counter aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum DiagnosticClass {
    /// A pointer into another buffer could not be followed.
    Reference,
    /// Opcode-level irregularities.
    Opcode,
    /// Video message layout irregularities.
    Message,
    /// Shader discovery irregularities.
    Shader,
}

/// Soft conditions observed while building or decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum DiagnosticKind {
    /// VM read of a referenced buffer or program failed.
    UnreadableReference = 0x01,
    /// Reference larger than the configured follow limit.
    OversizedReference = 0x02,
    /// Reference points at a buffer already being built.
    ReferenceCycle = 0x03,
    /// Nested buffer was read but could not be built.
    NestedBuildFailed = 0x04,
    /// Unknown opcode whose length came from the recovery callback.
    UnknownOpcodeRecovered = 0x05,
    /// Video message bytes consumed differ from its declared size.
    MessageSizeMismatch = 0x06,
    /// Video message index names an id with no layout.
    UnknownMessage = 0x07,
    /// Shader sentinel scan hit the configured byte limit.
    ShaderScanLimit = 0x08,
    /// Packet already holds a nested buffer; a further reference is skipped.
    ExtraReference = 0x09,
}

impl DiagnosticKind {
    /// Converts a kind to its stable byte value.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Converts a stable byte value back into a kind.
    #[must_use]
    pub const fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::UnreadableReference),
            0x02 => Some(Self::OversizedReference),
            0x03 => Some(Self::ReferenceCycle),
            0x04 => Some(Self::NestedBuildFailed),
            0x05 => Some(Self::UnknownOpcodeRecovered),
            0x06 => Some(Self::MessageSizeMismatch),
            0x07 => Some(Self::UnknownMessage),
            0x08 => Some(Self::ShaderScanLimit),
            0x09 => Some(Self::ExtraReference),
            _ => None,
        }
    }

    /// Returns the aggregation class for this kind.
    #[must_use]
    pub const fn class(self) -> DiagnosticClass {
        match self {
            Self::UnreadableReference
            | Self::OversizedReference
            | Self::ReferenceCycle
            | Self::NestedBuildFailed
            | Self::ExtraReference => DiagnosticClass::Reference,
            Self::UnknownOpcodeRecovered => DiagnosticClass::Opcode,
            Self::MessageSizeMismatch | Self::UnknownMessage => DiagnosticClass::Message,
            Self::ShaderScanLimit => DiagnosticClass::Shader,
        }
    }

    /// Short stable label used in log output.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::UnreadableReference => "unreadable-reference",
            Self::OversizedReference => "oversized-reference",
            Self::ReferenceCycle => "reference-cycle",
            Self::NestedBuildFailed => "nested-build-failed",
            Self::UnknownOpcodeRecovered => "unknown-opcode-recovered",
            Self::MessageSizeMismatch => "message-size-mismatch",
            Self::UnknownMessage => "unknown-message",
            Self::ShaderScanLimit => "shader-scan-limit",
            Self::ExtraReference => "extra-reference",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BuildError, DecoderError, DiagnosticClass, DiagnosticKind};
    use crate::api::{RingReadError, StreamKind};

    #[test]
    fn stable_code_roundtrip_is_bijective_for_defined_values() {
        for code in 0x01u8..=0x09 {
            let kind = DiagnosticKind::from_u8(code).expect("defined diagnostic code");
            assert_eq!(kind.as_u8(), code);
        }
    }

    #[test]
    fn unknown_code_is_rejected() {
        assert!(DiagnosticKind::from_u8(0x00).is_none());
        assert!(DiagnosticKind::from_u8(0xFF).is_none());
    }

    #[test]
    fn class_mapping_matches_taxonomy() {
        assert_eq!(
            DiagnosticKind::UnreadableReference.class(),
            DiagnosticClass::Reference
        );
        assert_eq!(
            DiagnosticKind::ReferenceCycle.class(),
            DiagnosticClass::Reference
        );
        assert_eq!(
            DiagnosticKind::UnknownOpcodeRecovered.class(),
            DiagnosticClass::Opcode
        );
        assert_eq!(
            DiagnosticKind::MessageSizeMismatch.class(),
            DiagnosticClass::Message
        );
        assert_eq!(
            DiagnosticKind::ShaderScanLimit.class(),
            DiagnosticClass::Shader
        );
    }

    #[test]
    fn build_error_reports_kind_and_message() {
        let err = BuildError::UnknownOpcode {
            kind: StreamKind::Sdma,
            opcode: 0x3f,
            sub_opcode: 0,
            offset: 2,
        };
        assert_eq!(err.kind(), StreamKind::Sdma);
        assert!(!err.is_out_of_memory());
        assert_eq!(err.to_string(), "unknown sdma opcode 0x3f/0x00 at word 2");
        assert!(BuildError::OutOfMemory {
            kind: StreamKind::Pm4
        }
        .is_out_of_memory());
    }

    #[test]
    fn decoder_error_wraps_sources() {
        let err: DecoderError = RingReadError::UnknownRing("gfx".to_string()).into();
        assert_eq!(err.to_string(), "no ring named \"gfx\"");
        let err: DecoderError = BuildError::EmptyBuffer {
            kind: StreamKind::Vcn,
        }
        .into();
        assert!(matches!(err, DecoderError::Build(_)));
    }
}
