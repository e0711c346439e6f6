//! Push-style presentation protocol driven by the field decoders.
//!
//! Call order per decode: `begin_buffer`, then for each packet
//! `begin_packet`, its fields in wire order, the fields expanded from any
//! video message it read, its discovered programs and data blocks, and the
//! nested buffer (itself bracketed by `begin_buffer`/`end_buffer`); finally
//! `end_buffer`.

use std::borrow::Cow;
use std::fmt::Write as _;

use crate::api::{BufferRef, StreamKind};
use crate::arena::{DataBlock, ShaderProgram};

/// Display hint attached to a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Radix {
    /// Unsigned decimal.
    #[default]
    Decimal,
    /// Hexadecimal.
    Hex,
    /// Two's-complement decimal of the sign-extended value.
    Signed,
    /// Value is not meant to be shown; the symbol carries the meaning.
    None,
}

/// Start or end of one buffer walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct BufferInfo {
    /// Stream kind of the buffer.
    pub kind: StreamKind,
    /// Origin of the buffer.
    pub buffer: BufferRef,
    /// Nesting depth; zero for the top-level buffer.
    pub depth: usize,
}

/// Everything known about a packet before its fields are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketInfo<'a> {
    /// Stream kind the packet was parsed under.
    pub kind: StreamKind,
    /// Byte address of the header word.
    pub address: u64,
    /// Virtual memory space of the buffer.
    pub vmid: u32,
    /// Primary opcode.
    pub opcode: u32,
    /// Secondary opcode.
    pub sub_opcode: u32,
    /// Mnemonic, or `UNKNOWN`.
    pub name: &'static str,
    /// Raw header word.
    pub header: u32,
    /// Every word of the packet, header first.
    pub words: &'a [u32],
}

/// One named sub-field of a packet.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Field {
    /// Byte address of the word the field starts in.
    pub address: u64,
    /// Field name; register names are resolved at decode time.
    pub name: Cow<'static, str>,
    /// Extracted value. Signed values are stored sign-extended.
    pub value: u64,
    /// Pre-rendered symbolic meaning of the value.
    pub symbol: Option<String>,
    /// Display hint.
    pub radix: Radix,
}

impl Field {
    /// Renders the value per its radix, followed by the symbol if any.
    #[must_use]
    pub fn render(&self) -> String {
        let mut text = match self.radix {
            Radix::Decimal => self.value.to_string(),
            Radix::Hex => format!("0x{:x}", self.value),
            #[allow(clippy::cast_possible_wrap)]
            Radix::Signed => (self.value as i64).to_string(),
            Radix::None => String::new(),
        };
        if let Some(symbol) = &self.symbol {
            if text.is_empty() {
                text.push_str(symbol);
            } else {
                let _ = write!(text, " ({symbol})");
            }
        }
        text
    }
}

/// Caller-supplied sink for decoded packets.
pub trait Presenter {
    /// A buffer walk starts.
    fn begin_buffer(&mut self, info: &BufferInfo);
    /// A packet starts.
    fn begin_packet(&mut self, packet: &PacketInfo<'_>);
    /// One field of the current packet.
    fn field(&mut self, field: Field);
    /// A shader program discovered by the current packet.
    fn program(&mut self, program: &ShaderProgram);
    /// A side buffer read by the current packet.
    fn data_block(&mut self, block: &DataBlock);
    /// The current packet has no field layout.
    fn unhandled(&mut self, packet: &PacketInfo<'_>);
    /// A buffer walk ends.
    fn end_buffer(&mut self, info: &BufferInfo);
}

/// Owned copy of [`PacketInfo`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct PacketRecord {
    /// Stream kind the packet was parsed under.
    pub kind: StreamKind,
    /// Byte address of the header word.
    pub address: u64,
    /// Virtual memory space of the buffer.
    pub vmid: u32,
    /// Primary opcode.
    pub opcode: u32,
    /// Secondary opcode.
    pub sub_opcode: u32,
    /// Mnemonic.
    pub name: String,
    /// Raw header word.
    pub header: u32,
    /// Every word of the packet.
    pub words: Vec<u32>,
}

impl From<&PacketInfo<'_>> for PacketRecord {
    fn from(info: &PacketInfo<'_>) -> Self {
        Self {
            kind: info.kind,
            address: info.address,
            vmid: info.vmid,
            opcode: info.opcode,
            sub_opcode: info.sub_opcode,
            name: info.name.to_string(),
            header: info.header,
            words: info.words.to_vec(),
        }
    }
}

/// One presentation callback, as recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum PresentEvent {
    /// `begin_buffer`.
    BeginBuffer(BufferInfo),
    /// `begin_packet`.
    BeginPacket(PacketRecord),
    /// `field`.
    Field(Field),
    /// `program`.
    Program(ShaderProgram),
    /// `data_block`.
    DataBlock(DataBlock),
    /// `unhandled`.
    Unhandled(PacketRecord),
    /// `end_buffer`.
    EndBuffer(BufferInfo),
}

/// Presenter that keeps every callback in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct RecordingPresenter {
    /// Recorded callbacks.
    pub events: Vec<PresentEvent>,
}

impl RecordingPresenter {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded field, in order.
    pub fn fields(&self) -> impl Iterator<Item = &Field> + '_ {
        self.events.iter().filter_map(|event| match event {
            PresentEvent::Field(field) => Some(field),
            _ => None,
        })
    }

    /// Every packet passed to `begin_packet`, in order.
    pub fn packets(&self) -> impl Iterator<Item = &PacketRecord> + '_ {
        self.events.iter().filter_map(|event| match event {
            PresentEvent::BeginPacket(packet) => Some(packet),
            _ => None,
        })
    }

    /// First field with `name`, if any.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields().find(|field| field.name == name)
    }

    /// Drops everything recorded so far.
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl Presenter for RecordingPresenter {
    fn begin_buffer(&mut self, info: &BufferInfo) {
        self.events.push(PresentEvent::BeginBuffer(*info));
    }

    fn begin_packet(&mut self, packet: &PacketInfo<'_>) {
        self.events.push(PresentEvent::BeginPacket(packet.into()));
    }

    fn field(&mut self, field: Field) {
        self.events.push(PresentEvent::Field(field));
    }

    fn program(&mut self, program: &ShaderProgram) {
        self.events.push(PresentEvent::Program(*program));
    }

    fn data_block(&mut self, block: &DataBlock) {
        self.events.push(PresentEvent::DataBlock(block.clone()));
    }

    fn unhandled(&mut self, packet: &PacketInfo<'_>) {
        self.events.push(PresentEvent::Unhandled(packet.into()));
    }

    fn end_buffer(&mut self, info: &BufferInfo) {
        self.events.push(PresentEvent::EndBuffer(*info));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(value: u64, radix: Radix, symbol: Option<&str>) -> Field {
        Field {
            address: 0,
            name: Cow::Borrowed("f"),
            value,
            symbol: symbol.map(str::to_string),
            radix,
        }
    }

    #[test]
    fn render_follows_radix() {
        assert_eq!(field(26, Radix::Decimal, None).render(), "26");
        assert_eq!(field(26, Radix::Hex, None).render(), "0x1a");
        assert_eq!(field(u64::MAX, Radix::Signed, None).render(), "-1");
    }

    #[test]
    fn render_appends_symbol() {
        assert_eq!(
            field(4, Radix::Decimal, Some("CACHE_FLUSH_TS")).render(),
            "4 (CACHE_FLUSH_TS)"
        );
        assert_eq!(field(0, Radix::None, Some("memory")).render(), "memory");
    }

    #[test]
    fn recorder_keeps_order() {
        let mut recorder = RecordingPresenter::new();
        let info = BufferInfo {
            kind: StreamKind::Pm4,
            buffer: BufferRef::default(),
            depth: 0,
        };
        recorder.begin_buffer(&info);
        Presenter::field(&mut recorder, field(1, Radix::Decimal, None));
        recorder.end_buffer(&info);
        assert_eq!(recorder.events.len(), 3);
        assert_eq!(recorder.field("f").map(|f| f.value), Some(1));
        assert!(matches!(recorder.events[2], PresentEvent::EndBuffer(_)));
    }
}
