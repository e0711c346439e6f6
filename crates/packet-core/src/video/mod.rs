//! Video decode message buffers handed to the video engine's VCPU.
//!
//! A buffer starts with a 24-byte header and `num_buffers` 16-byte index
//! entries, each locating one message by id, offset and size. Every message
//! is walked against its declarative layout into a flat list of
//! [`MessageRecord`]s; the text dump and the label array are projections of
//! that list.

pub mod layouts;

use std::borrow::Cow;
use std::fmt::Write as _;

use crate::diag::{Diagnostic, DiagnosticSink};
use crate::fault::DiagnosticKind;
use crate::present::Radix;

use layouts::{MsgField, MsgItem, MsgLayout, MsgType};

/// Bytes of the fixed buffer header.
pub const HEADER_BYTES: usize = 24;

/// Bytes of one index entry.
pub const INDEX_ENTRY_BYTES: usize = 16;

/// Declared size that selects the addressed dynamic DPB layout.
const ADDRESSED_DPB_BYTES: usize = layouts::layout_size(layouts::DYNAMIC_DPB_ADDRESSED, 0);

/// Message kinds the decoder knows a layout for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum MessageId {
    /// Session creation.
    Create,
    /// Per-frame decode target description.
    Decode,
    /// Content protection keys.
    Drm,
    /// H.264 picture parameters.
    Avc,
    /// VC-1 picture parameters.
    Vc1,
    /// MPEG-2 picture parameters.
    Mpeg2Vld,
    /// MPEG-4 part 2 picture parameters.
    Mpeg4AspVld,
    /// H.265 picture parameters.
    Hevc,
    /// VP9 frame parameters.
    Vp9,
    /// Dynamic decoded picture buffer description.
    DynamicDpb,
    /// H.265 per-slice direct reference lists.
    HevcDirectRefList,
    /// AV1 frame parameters.
    Av1,
}

impl MessageId {
    /// Parses a wire message id.
    #[must_use]
    pub const fn from_u32(id: u32) -> Option<Self> {
        match id {
            0x01 => Some(Self::Create),
            0x02 => Some(Self::Decode),
            0x03 => Some(Self::Drm),
            0x06 => Some(Self::Avc),
            0x07 => Some(Self::Vc1),
            0x0A => Some(Self::Mpeg2Vld),
            0x0B => Some(Self::Mpeg4AspVld),
            0x0D => Some(Self::Hevc),
            0x0E => Some(Self::Vp9),
            0x10 => Some(Self::DynamicDpb),
            0x12 => Some(Self::HevcDirectRefList),
            0x13 => Some(Self::Av1),
            _ => None,
        }
    }

    /// Wire message id.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        match self {
            Self::Create => 0x01,
            Self::Decode => 0x02,
            Self::Drm => 0x03,
            Self::Avc => 0x06,
            Self::Vc1 => 0x07,
            Self::Mpeg2Vld => 0x0A,
            Self::Mpeg4AspVld => 0x0B,
            Self::Hevc => 0x0D,
            Self::Vp9 => 0x0E,
            Self::DynamicDpb => 0x10,
            Self::HevcDirectRefList => 0x12,
            Self::Av1 => 0x13,
        }
    }

    /// Lower-case name used as the record prefix.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Decode => "decode",
            Self::Drm => "drm",
            Self::Avc => "avc",
            Self::Vc1 => "vc1",
            Self::Mpeg2Vld => "mpeg2_vld",
            Self::Mpeg4AspVld => "mpeg4_asp_vld",
            Self::Hevc => "hevc",
            Self::Vp9 => "vp9",
            Self::DynamicDpb => "dynamic_dpb",
            Self::HevcDirectRefList => "hevc_direct_ref_list",
            Self::Av1 => "av1",
        }
    }

    /// Layout for a message of this kind declaring `size` bytes.
    ///
    /// The two dynamic DPB variants share an id and differ only in size.
    #[must_use]
    pub const fn layout(self, size: usize) -> MsgLayout {
        match self {
            Self::Create => layouts::CREATE,
            Self::Decode => layouts::DECODE,
            Self::Drm => layouts::DRM,
            Self::Avc => layouts::AVC,
            Self::Vc1 => layouts::VC1,
            Self::Mpeg2Vld => layouts::MPEG2_VLD,
            Self::Mpeg4AspVld => layouts::MPEG4_ASP_VLD,
            Self::Hevc => layouts::HEVC,
            Self::Vp9 => layouts::VP9,
            Self::DynamicDpb if size >= ADDRESSED_DPB_BYTES => layouts::DYNAMIC_DPB_ADDRESSED,
            Self::DynamicDpb => layouts::DYNAMIC_DPB,
            Self::HevcDirectRefList => layouts::HEVC_DIRECT_REF_LIST,
            Self::Av1 => layouts::AV1,
        }
    }
}

/// One decoded scalar.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct MessageRecord {
    /// Byte offset from the start of the message buffer.
    pub offset: usize,
    /// Bytes the scalar occupies.
    pub width: usize,
    /// Dotted name, e.g. `hevc.poc_list[3]`.
    pub name: Cow<'static, str>,
    /// Value; signed types are sign-extended.
    pub value: u64,
    /// Display hint.
    pub radix: Radix,
}

impl MessageRecord {
    /// Renders the value per its radix.
    #[must_use]
    pub fn value_text(&self) -> String {
        match self.radix {
            Radix::Hex => format!("0x{:x}", self.value),
            #[allow(clippy::cast_possible_wrap)]
            Radix::Signed => (self.value as i64).to_string(),
            Radix::Decimal | Radix::None => self.value.to_string(),
        }
    }
}

/// Raw bytes of a message whose size did not check out.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct HexDump {
    /// Message name, or `unknown`.
    pub message: &'static str,
    /// Byte offset of the first dumped byte.
    pub offset: usize,
    /// Dumped bytes.
    pub bytes: Vec<u8>,
}

/// Per-message outcome of the size self-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct MessageSummary {
    /// Wire id from the index.
    pub id: u32,
    /// Parsed kind, when known.
    pub kind: Option<MessageId>,
    /// Byte offset of the message.
    pub offset: usize,
    /// Size the index declares.
    pub declared: usize,
    /// Size the layout accounts for.
    pub consumed: usize,
}

impl MessageSummary {
    /// Returns true when the layout accounts for exactly the declared bytes.
    #[must_use]
    pub const fn size_matches(&self) -> bool {
        self.kind.is_some() && self.declared == self.consumed
    }
}

/// Everything decoded from one message buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MessageDecode {
    /// Header, index and message scalars in buffer order.
    pub records: Vec<MessageRecord>,
    /// Raw dumps of messages that failed the self-check.
    pub dumps: Vec<HexDump>,
    /// One summary per walked index entry.
    pub messages: Vec<MessageSummary>,
}

impl MessageDecode {
    /// One `offset name = value` line per record, then the hex dumps.
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut text = String::new();
        for record in &self.records {
            let _ = writeln!(
                text,
                "0x{:04x} {} = {}",
                record.offset,
                record.name,
                record.value_text()
            );
        }
        for dump in &self.dumps {
            let _ = write!(text, "{} raw @0x{:04x}:", dump.message, dump.offset);
            for byte in &dump.bytes {
                let _ = write!(text, " {byte:02x}");
            }
            text.push('\n');
        }
        text
    }

    /// Label of the record starting at each byte offset.
    ///
    /// The array is as long as the furthest byte any record covers.
    #[must_use]
    pub fn label_array(&self) -> Vec<Option<&str>> {
        let len = self
            .records
            .iter()
            .map(|record| record.offset + record.width)
            .max()
            .unwrap_or(0);
        let mut labels = vec![None; len];
        for record in &self.records {
            labels[record.offset] = Some(record.name.as_ref());
        }
        labels
    }

    /// First record named `name`.
    #[must_use]
    pub fn record(&self, name: &str) -> Option<&MessageRecord> {
        self.records.iter().find(|record| record.name == name)
    }
}

fn read_scalar(bytes: &[u8], ty: MsgType) -> u64 {
    match ty {
        MsgType::U8 => u64::from(bytes[0]),
        MsgType::I8 => i64::from(bytes[0] as i8) as u64,
        MsgType::U16 => u64::from(u16::from_le_bytes([bytes[0], bytes[1]])),
        MsgType::I16 => i64::from(i16::from_le_bytes([bytes[0], bytes[1]])) as u64,
        MsgType::U32 => u64::from(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        MsgType::I32 => {
            i64::from(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])) as u64
        }
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let chunk = bytes.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
}

/// Emits layout fields into a record list, never reading past `end`.
struct LayoutWalker<'b, 'o> {
    bytes: &'b [u8],
    end: usize,
    cursor: usize,
    prefix: Cow<'static, str>,
    out: &'o mut Vec<MessageRecord>,
    first: usize,
}

impl LayoutWalker<'_, '_> {
    fn path(&self) -> String {
        format!("{}.", self.prefix)
    }

    /// Emits one field; `path` is everything before the field name.
    fn field(&mut self, field: &MsgField, path: &str) {
        let width = field.ty.size();
        for i in 0..field.count {
            let offset = self.cursor;
            self.cursor += width;
            if self.cursor > self.end {
                continue;
            }
            let name = if field.count == 1 {
                format!("{path}{}", field.name)
            } else {
                format!("{path}{}[{i}]", field.name)
            };
            self.out.push(MessageRecord {
                offset,
                width,
                name: Cow::Owned(name),
                value: read_scalar(&self.bytes[offset..self.cursor], field.ty),
                radix: field.radix,
            });
        }
    }

    fn group(&mut self, name: &str, count: usize, fields: &[MsgField]) {
        for i in 0..count {
            let path = if name.is_empty() {
                format!("{}[{i}].", self.prefix)
            } else {
                format!("{}.{name}[{i}].", self.prefix)
            };
            for field in fields {
                self.field(field, &path);
            }
        }
    }

    fn scalar(&self, name: &str) -> Option<u64> {
        let full = format!("{}.{name}", self.prefix);
        self.out[self.first..]
            .iter()
            .find(|record| record.name == full)
            .map(|record| record.value)
    }
}

/// Walks one message body; returns the bytes its layout accounts for.
fn walk_message(
    bytes: &[u8],
    offset: usize,
    declared: usize,
    id: MessageId,
    out: &mut Vec<MessageRecord>,
    sink: &mut dyn DiagnosticSink,
) -> usize {
    let end = offset.saturating_add(declared).min(bytes.len());
    let mut walker = LayoutWalker {
        bytes,
        end,
        cursor: offset,
        prefix: Cow::Borrowed(id.name()),
        first: out.len(),
        out,
    };
    let path = walker.path();
    for item in id.layout(declared) {
        match *item {
            MsgItem::Field(field) => walker.field(&field, &path),
            MsgItem::Group {
                name,
                count,
                fields,
            } => walker.group(name, count, fields),
            MsgItem::Bounded {
                name,
                count_field,
                max,
                fields,
            } => {
                let wanted = walker.scalar(count_field).unwrap_or(0);
                let count = usize::try_from(wanted).map_or(max, |n| n.min(max));
                if wanted > max as u64 {
                    sink.log(Diagnostic::new(
                        DiagnosticKind::MessageSizeMismatch,
                        format!("{} {count_field} {wanted} exceeds {max}", id.name()),
                    ));
                }
                walker.group(name, count, fields);
            }
        }
    }
    walker.cursor - offset
}

fn dump(bytes: &[u8], message: &'static str, offset: usize, len: usize) -> HexDump {
    let start = offset.min(bytes.len());
    let end = offset.saturating_add(len).min(bytes.len());
    HexDump {
        message,
        offset: start,
        bytes: bytes[start..end].to_vec(),
    }
}

/// Decodes a whole message buffer.
///
/// Size mismatches and unknown ids are logged to `sink` and the offending
/// message is attached as a raw dump; decoding carries on with the next
/// index entry.
pub fn decode_message_buffer(bytes: &[u8], sink: &mut dyn DiagnosticSink) -> MessageDecode {
    let mut decoded = MessageDecode::default();
    if bytes.len() < HEADER_BYTES {
        sink.log(Diagnostic::new(
            DiagnosticKind::MessageSizeMismatch,
            format!(
                "message buffer holds {} bytes, header needs {HEADER_BYTES}",
                bytes.len()
            ),
        ));
        decoded.dumps.push(dump(bytes, "header", 0, bytes.len()));
        return decoded;
    }

    let mut header = LayoutWalker {
        bytes,
        end: HEADER_BYTES,
        cursor: 0,
        prefix: Cow::Borrowed("header"),
        first: 0,
        out: &mut decoded.records,
    };
    let path = header.path();
    for item in layouts::HEADER {
        if let MsgItem::Field(field) = item {
            header.field(field, &path);
        }
    }

    let declared_buffers = read_u32(bytes, 8).unwrap_or(0) as usize;
    let room = (bytes.len() - HEADER_BYTES) / INDEX_ENTRY_BYTES;
    if declared_buffers > room {
        sink.log(Diagnostic::new(
            DiagnosticKind::MessageSizeMismatch,
            format!("message buffer declares {declared_buffers} entries, room for {room}"),
        ));
    }
    let entries = declared_buffers.min(room);

    let mut index = LayoutWalker {
        bytes,
        end: HEADER_BYTES + entries * INDEX_ENTRY_BYTES,
        cursor: HEADER_BYTES,
        prefix: Cow::Borrowed("index"),
        first: decoded.records.len(),
        out: &mut decoded.records,
    };
    index.group("", entries, layouts::INDEX_ENTRY);

    for entry in 0..entries {
        let at = HEADER_BYTES + entry * INDEX_ENTRY_BYTES;
        let (Some(id), Some(offset), Some(size)) = (
            read_u32(bytes, at),
            read_u32(bytes, at + 4),
            read_u32(bytes, at + 8),
        ) else {
            break;
        };
        let (offset, declared) = (offset as usize, size as usize);
        let Some(kind) = MessageId::from_u32(id) else {
            sink.log(Diagnostic::new(
                DiagnosticKind::UnknownMessage,
                format!("message id 0x{id:x} at offset 0x{offset:x} has no layout"),
            ));
            decoded.dumps.push(dump(bytes, "unknown", offset, declared));
            decoded.messages.push(MessageSummary {
                id,
                kind: None,
                offset,
                declared,
                consumed: 0,
            });
            continue;
        };

        let consumed = walk_message(bytes, offset, declared, kind, &mut decoded.records, sink);
        let available = bytes.len().saturating_sub(offset).min(declared);
        if consumed != declared || available != declared {
            sink.log(Diagnostic::new(
                DiagnosticKind::MessageSizeMismatch,
                format!(
                    "{} message declares {declared} bytes, layout accounts for {consumed}, buffer holds {available}",
                    kind.name()
                ),
            ));
            decoded.dumps.push(dump(bytes, kind.name(), offset, declared));
        }
        decoded.messages.push(MessageSummary {
            id,
            kind: Some(kind),
            offset,
            declared,
            consumed,
        });
    }
    tracing::trace!(
        bytes = bytes.len(),
        messages = decoded.messages.len(),
        records = decoded.records.len(),
        "video message buffer decoded"
    );
    decoded
}
