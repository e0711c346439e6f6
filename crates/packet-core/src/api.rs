//! Host-facing contracts: stream kinds, provenance, configuration and the
//! collaborator traits the decoding engine consumes.

use std::fmt;

use thiserror::Error;

use crate::diag::DiagnosticSink;

/// Largest referenced buffer the builders will follow by default (8 MiB).
pub const DEFAULT_MAX_REFERENCE_BYTES: u64 = 8 << 20;

/// Default read granularity of the shader sentinel scan.
pub const DEFAULT_SHADER_SCAN_PAGE_BYTES: u32 = 4096;

/// Default upper bound of the shader sentinel scan.
pub const DEFAULT_SHADER_SCAN_LIMIT_BYTES: u64 = 8 << 20;

/// Front-end engine packet format a stream was decoded under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum StreamKind {
    /// Graphics/compute command processor packets.
    Pm4,
    /// Register-write-only command processor rings (UVD/VCN decode).
    Pm4Lite,
    /// System DMA engine packets.
    Sdma,
    /// Video processing engine packets.
    Vpe,
    /// Micro engine scheduler API frames.
    Mes,
    /// Unified media scheduler API frames.
    Umsch,
    /// Video codec engine ring commands.
    Vcn,
}

/// Structural packet format families shared by several stream kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// Self-describing type-0/2/3 headers.
    CommandProcessor,
    /// Opcode/sub-opcode headers with table-driven lengths.
    Dma,
    /// Fixed-size scheduler API frames.
    Scheduler,
    /// Full-word commands with table-driven lengths.
    VideoControl,
}

impl StreamKind {
    /// Every stream kind, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Pm4,
        Self::Pm4Lite,
        Self::Sdma,
        Self::Vpe,
        Self::Mes,
        Self::Umsch,
        Self::Vcn,
    ];

    /// Returns the packet format family of this kind.
    #[must_use]
    pub const fn dialect(self) -> Dialect {
        match self {
            Self::Pm4 | Self::Pm4Lite => Dialect::CommandProcessor,
            Self::Sdma | Self::Vpe => Dialect::Dma,
            Self::Mes | Self::Umsch => Dialect::Scheduler,
            Self::Vcn => Dialect::VideoControl,
        }
    }

    /// Lower-case name used in logs and on the command line.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Pm4 => "pm4",
            Self::Pm4Lite => "pm4-lite",
            Self::Sdma => "sdma",
            Self::Vpe => "vpe",
            Self::Mes => "mes",
            Self::Umsch => "umsch",
            Self::Vcn => "vcn",
        }
    }

    /// Parses a name produced by [`StreamKind::name`].
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Guesses the packet format of a kernel ring from its name.
    ///
    /// Decode rings of the video engines carry register writes only, encode
    /// and unified rings carry VCN commands.
    #[must_use]
    pub fn from_ring_name(ring: &str) -> Option<Self> {
        let ring = ring.to_ascii_lowercase();
        if ring.starts_with("uvd") || ring.starts_with("vcn_dec") || ring.starts_with("jpeg_dec")
        {
            Some(Self::Pm4Lite)
        } else if ring.starts_with("vcn_enc") || ring.starts_with("vcn_unified") {
            Some(Self::Vcn)
        } else if ring.starts_with("sdma") || ring.starts_with("page") {
            Some(Self::Sdma)
        } else if ring.starts_with("vpe") {
            Some(Self::Vpe)
        } else if ring.starts_with("umsch") {
            Some(Self::Umsch)
        } else if ring.starts_with("mes") {
            Some(Self::Mes)
        } else if ring.starts_with("gfx") || ring.starts_with("comp") || ring.starts_with("kiq") {
            Some(Self::Pm4)
        } else {
            None
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a buffer's bytes came from.
///
/// Carried for display and traceability only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct BufferRef {
    /// Virtual memory space identifier.
    pub vmid: u32,
    /// GPU virtual address of the first byte.
    pub address: u64,
    /// Size in bytes.
    pub size: u64,
}

/// Origin of a top-level buffer handed to a builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Provenance {
    /// Virtual memory space identifier.
    pub vmid: u32,
    /// GPU virtual address of the first word.
    pub address: u64,
    /// Memory partition the address is translated in.
    pub partition: u32,
}

impl Provenance {
    /// Describes `words` words starting at this origin.
    #[must_use]
    pub const fn buffer(self, words: usize) -> BufferRef {
        BufferRef {
            vmid: self.vmid,
            address: self.address,
            size: words as u64 * 4,
        }
    }
}

/// Graphics IP generation, used to pick the shader terminator encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum GfxLevel {
    /// GFX9 (Vega).
    Gfx9,
    /// GFX10 (RDNA1/2).
    #[default]
    Gfx10,
    /// GFX11 (RDNA3).
    Gfx11,
    /// GFX12 (RDNA4).
    Gfx12,
}

impl GfxLevel {
    /// Word the shader compiler pads program ends with.
    ///
    /// GFX9 pads with `s_endpgm`, later generations with `s_code_end`.
    #[must_use]
    pub const fn terminator_word(self) -> u32 {
        match self {
            Self::Gfx9 => 0xBF81_0000,
            Self::Gfx10 | Self::Gfx11 | Self::Gfx12 => 0xBF9F_0000,
        }
    }
}

/// Per-device toggles that change shader-stage classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct DeviceFeatures {
    /// Graphics generation.
    pub gfx_level: GfxLevel,
    /// ES is merged into GS and LS into HS.
    pub merged_shader_stages: bool,
    /// VS and GS run as next-generation geometry shaders.
    pub ngg: bool,
}

/// Top-level configuration shared by every build and decode call.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct DecoderConfig {
    /// Build nested streams for indirect buffers.
    pub follow_references: bool,
    /// Estimate shader program sizes by sentinel scanning.
    pub scan_shaders: bool,
    /// References larger than this are not followed.
    pub max_reference_bytes: u64,
    /// Read granularity of the shader sentinel scan.
    pub shader_scan_page_bytes: u32,
    /// Upper bound of the shader sentinel scan.
    pub shader_scan_limit_bytes: u64,
    /// Device feature toggles.
    pub features: DeviceFeatures,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            follow_references: true,
            scan_shaders: true,
            max_reference_bytes: DEFAULT_MAX_REFERENCE_BYTES,
            shader_scan_page_bytes: DEFAULT_SHADER_SCAN_PAGE_BYTES,
            shader_scan_limit_bytes: DEFAULT_SHADER_SCAN_LIMIT_BYTES,
            features: DeviceFeatures::default(),
        }
    }
}

/// Failure reported by the VM read collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmReadError {
    /// No valid translation for the address.
    #[error("no mapping for vmid {vmid} address 0x{address:x}")]
    Unmapped {
        /// Virtual memory space identifier.
        vmid: u32,
        /// First unmapped address.
        address: u64,
    },
    /// The device or transport refused the read.
    #[error("vm read failed: {0}")]
    Device(String),
}

/// Byte-read primitive over GPU virtual memory.
pub trait VmReader {
    /// Fills `buf` with the bytes at `address` in `vmid` on `partition`.
    ///
    /// # Errors
    ///
    /// Returns [`VmReadError`] when any byte of the range cannot be read.
    fn read(
        &mut self,
        partition: u32,
        vmid: u32,
        address: u64,
        buf: &mut [u8],
    ) -> Result<(), VmReadError>;
}

/// Register address to symbolic name collaborator.
pub trait RegisterNames {
    /// Returns the name of the register at dword address `register`.
    fn register_name(&self, register: u32) -> Option<String>;
}

/// Resolves a register name, falling back to its hex address.
#[must_use]
pub fn register_label(names: &dyn RegisterNames, register: u32) -> String {
    names
        .register_name(register)
        .unwrap_or_else(|| format!("0x{register:05x}"))
}

/// Register names are optional; this collaborator knows none.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRegisterNames;

impl RegisterNames for NoRegisterNames {
    fn register_name(&self, _register: u32) -> Option<String> {
        None
    }
}

/// Failure reported by the ring source collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RingReadError {
    /// No ring with that name exists on the device.
    #[error("no ring named {0:?}")]
    UnknownRing(String),
    /// The ring exists but its contents could not be read.
    #[error("ring read failed: {0}")]
    Device(String),
}

/// Raw ring dump: three pointer words followed by the ring body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RingDump {
    /// Read pointer, write pointer, doorbell pointer, then the body.
    pub words: Vec<u32>,
    /// GPU virtual address of the ring body, when known.
    pub base_address: u64,
    /// Virtual memory space the ring lives in.
    pub vmid: u32,
}

/// Point in a linearized ring window where the copy restarts at body
/// index 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct RingWrap {
    /// Index of the first linear word copied from body index 0.
    pub at_word: usize,
    /// GPU virtual address of body index 0.
    pub address: u64,
}

/// Source of named live rings.
pub trait RingSource {
    /// Reads the raw words of ring `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RingReadError`] when the ring is unknown or unreadable.
    fn read_ring(&mut self, name: &str) -> Result<RingDump, RingReadError>;
}

/// Bundle of collaborators and configuration for one device.
pub struct Device<'a> {
    /// GPU virtual memory reader.
    pub vm: &'a mut dyn VmReader,
    /// Register name resolver.
    pub registers: &'a dyn RegisterNames,
    /// Diagnostic collaborator.
    pub diagnostics: &'a mut dyn DiagnosticSink,
    /// Build and decode configuration.
    pub config: DecoderConfig,
}

impl<'a> Device<'a> {
    /// Creates a device bundle with default configuration.
    pub fn new(
        vm: &'a mut dyn VmReader,
        registers: &'a dyn RegisterNames,
        diagnostics: &'a mut dyn DiagnosticSink,
    ) -> Self {
        Self {
            vm,
            registers,
            diagnostics,
            config: DecoderConfig::default(),
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: DecoderConfig) -> Self {
        self.config = config;
        self
    }

    /// Resolves a register name, falling back to its hex address.
    #[must_use]
    pub fn register_label(&self, register: u32) -> String {
        register_label(self.registers, register)
    }
}

#[cfg(test)]
mod tests {
    use super::{DecoderConfig, Dialect, GfxLevel, Provenance, StreamKind};

    #[test]
    fn default_config_matches_documented_limits() {
        let config = DecoderConfig::default();
        assert!(config.follow_references);
        assert!(config.scan_shaders);
        assert_eq!(config.max_reference_bytes, 8 * 1024 * 1024);
        assert_eq!(config.shader_scan_page_bytes, 4096);
        assert_eq!(config.features.gfx_level, GfxLevel::Gfx10);
    }

    #[test]
    fn kind_names_roundtrip() {
        for kind in StreamKind::ALL {
            assert_eq!(StreamKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(StreamKind::from_name("pm5"), None);
    }

    #[test]
    fn dialects_group_kinds() {
        assert_eq!(StreamKind::Pm4Lite.dialect(), Dialect::CommandProcessor);
        assert_eq!(StreamKind::Vpe.dialect(), Dialect::Dma);
        assert_eq!(StreamKind::Umsch.dialect(), Dialect::Scheduler);
        assert_eq!(StreamKind::Vcn.dialect(), Dialect::VideoControl);
    }

    #[test]
    fn ring_names_guess_kinds() {
        assert_eq!(StreamKind::from_ring_name("gfx_0.0.0"), Some(StreamKind::Pm4));
        assert_eq!(StreamKind::from_ring_name("comp_1.2.1"), Some(StreamKind::Pm4));
        assert_eq!(StreamKind::from_ring_name("sdma0"), Some(StreamKind::Sdma));
        assert_eq!(StreamKind::from_ring_name("vcn_dec_0"), Some(StreamKind::Pm4Lite));
        assert_eq!(StreamKind::from_ring_name("vcn_unified_0"), Some(StreamKind::Vcn));
        assert_eq!(StreamKind::from_ring_name("mes_kiq_3.1.0"), Some(StreamKind::Mes));
        assert_eq!(StreamKind::from_ring_name("umsch"), Some(StreamKind::Umsch));
        assert_eq!(StreamKind::from_ring_name("vpe"), Some(StreamKind::Vpe));
        assert_eq!(StreamKind::from_ring_name("ih"), None);
    }

    #[test]
    fn provenance_describes_buffer_bytes() {
        let origin = Provenance {
            vmid: 3,
            address: 0x1000,
            partition: 0,
        };
        let buffer = origin.buffer(4);
        assert_eq!(buffer.size, 16);
        assert_eq!(buffer.vmid, 3);
    }
}
