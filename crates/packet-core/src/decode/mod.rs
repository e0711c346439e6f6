//! Field decoder: walks a built stream and drives a [`Presenter`].

mod fields;

pub use fields::{emit_fields, WordAddresses};

use std::borrow::Cow;

use crate::api::{Device, StreamKind};
use crate::arena::{DataBlock, DataBlockKind, PacketHeader, PacketNode, PacketStream, StreamId};
use crate::encoding::mes::SchedHeader;
use crate::encoding::pm4::{Pm4Header, Pm4Type, TYPE0_LAYOUT};
use crate::encoding::sdma::DmaHeader;
use crate::encoding::vcn::VcnHeader;
use crate::encoding::{lookup, table_for, Layout};
use crate::present::{BufferInfo, Field, PacketInfo, Presenter, Radix};
use crate::video::decode_message_buffer;

/// Name shown for packets no table describes.
pub const UNKNOWN: &str = "UNKNOWN";

const NO_FIELDS: Layout = &[];

/// How many top-level packets one decode call may process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Limit {
    /// Every remaining packet.
    #[default]
    All,
    /// At most this many packets.
    Packets(usize),
}

/// Resume position within a stream's top-level packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Cursor {
    /// Before the first packet.
    #[default]
    Start,
    /// Before the packet at this position.
    Packet(usize),
    /// Past the last packet.
    End,
}

impl Cursor {
    fn position(self, len: usize) -> usize {
        match self {
            Self::Start => 0,
            Self::Packet(position) => position.min(len),
            Self::End => len,
        }
    }

    fn at(position: usize, len: usize) -> Self {
        if position >= len {
            Self::End
        } else {
            Self::Packet(position)
        }
    }
}

/// Mnemonic and field layout of a header.
pub trait Describe: PacketHeader {
    /// Returns the packet name and its layout; `None` routes the packet to
    /// [`Presenter::unhandled`].
    fn describe(&self, kind: StreamKind) -> (&'static str, Option<Layout>);
}

impl Describe for Pm4Header {
    fn describe(&self, _kind: StreamKind) -> (&'static str, Option<Layout>) {
        match self.packet_type() {
            Pm4Type::Type0 => (self.name(), Some(TYPE0_LAYOUT)),
            Pm4Type::Type1 | Pm4Type::Type2 => (self.name(), Some(NO_FIELDS)),
            // Unlisted type-3 opcodes still decode, just without fields.
            Pm4Type::Type3 => self.entry().map_or((UNKNOWN, Some(NO_FIELDS)), |entry| {
                (entry.name, Some(entry.fields.unwrap_or(NO_FIELDS)))
            }),
        }
    }
}

fn describe_table(kind: StreamKind, header: &impl PacketHeader) -> (&'static str, Option<Layout>) {
    lookup(table_for(kind), header.opcode(), header.sub_opcode())
        .map_or((UNKNOWN, None), |entry| (entry.name, entry.fields))
}

impl Describe for DmaHeader {
    fn describe(&self, kind: StreamKind) -> (&'static str, Option<Layout>) {
        describe_table(kind, self)
    }
}

impl Describe for SchedHeader {
    fn describe(&self, kind: StreamKind) -> (&'static str, Option<Layout>) {
        describe_table(kind, self)
    }
}

impl Describe for VcnHeader {
    fn describe(&self, kind: StreamKind) -> (&'static str, Option<Layout>) {
        describe_table(kind, self)
    }
}

/// Decodes the root stream of `stream` from `cursor`, processing at most
/// `limit` top-level packets, and returns where to resume.
///
/// Nested streams are walked in full when `follow` is set; the limit only
/// counts top-level packets.
pub fn decode_stream<H: Describe, P: Presenter + ?Sized>(
    stream: &PacketStream<H>,
    cursor: Cursor,
    limit: Limit,
    follow: bool,
    device: &mut Device<'_>,
    presenter: &mut P,
) -> Cursor {
    let root = stream.root();
    let len = stream.record(root).len();
    if cursor == Cursor::End {
        return Cursor::End;
    }
    let start = cursor.position(len);
    let end = match limit {
        Limit::All => len,
        Limit::Packets(n) => start.saturating_add(n).min(len),
    };
    let mut walker = Walker {
        stream,
        follow,
        device,
        presenter,
    };
    walker.buffer(root, 0, start..end);
    Cursor::at(end, len)
}

struct Walker<'s, 'd, 'a, H, P: ?Sized> {
    stream: &'s PacketStream<H>,
    follow: bool,
    device: &'d mut Device<'a>,
    presenter: &'d mut P,
}

impl<H: Describe, P: Presenter + ?Sized> Walker<'_, '_, '_, H, P> {
    fn buffer(&mut self, id: StreamId, depth: usize, range: std::ops::Range<usize>) {
        let stream = self.stream;
        let record = stream.record(id);
        let info = BufferInfo {
            kind: record.kind,
            buffer: record.buffer,
            depth,
        };
        let addresses = WordAddresses::wrapped(record.buffer.address, record.wrap());
        self.presenter.begin_buffer(&info);
        for position in range {
            if let Some(node) = stream.packet(id, position) {
                self.packet(&info, addresses.skip(node.offset), node);
            }
        }
        self.presenter.end_buffer(&info);
    }

    fn packet(&mut self, buffer: &BufferInfo, addresses: WordAddresses, node: &PacketNode<H>) {
        let stream = self.stream;
        let words = stream.words_of(node);
        let address = addresses.word(0);
        let (name, layout) = node.header.describe(buffer.kind);
        let info = PacketInfo {
            kind: buffer.kind,
            address,
            vmid: buffer.buffer.vmid,
            opcode: node.header.opcode(),
            sub_opcode: node.header.sub_opcode(),
            name,
            header: node.header.raw(),
            words,
        };
        self.presenter.begin_packet(&info);
        match layout {
            Some(layout) => emit_fields(
                layout,
                words,
                addresses,
                self.device.registers,
                &mut *self.presenter,
            ),
            None => self.presenter.unhandled(&info),
        }
        for block in &node.data_blocks {
            self.block_fields(block);
        }
        for program in &node.programs {
            self.presenter.program(program);
        }
        for block in &node.data_blocks {
            self.presenter.data_block(block);
        }
        if self.follow {
            if let Some(child) = node.nested.and_then(|nested| nested.stream) {
                let len = stream.record(child).len();
                self.buffer(child, buffer.depth + 1, 0..len);
            }
        }
    }

    fn block_fields(&mut self, block: &DataBlock) {
        match block.kind {
            DataBlockKind::VideoDecodeMessage => {
                let decoded = decode_message_buffer(&block.bytes, &mut *self.device.diagnostics);
                for record in decoded.records {
                    self.presenter.field(Field {
                        address: block.address.wrapping_add(record.offset as u64),
                        name: record.name,
                        value: record.value,
                        symbol: None,
                        radix: record.radix,
                    });
                }
                for dump in decoded.dumps {
                    for (i, chunk) in dump.bytes.chunks(4).enumerate() {
                        let mut word = [0u8; 4];
                        word[..chunk.len()].copy_from_slice(chunk);
                        self.presenter.field(Field {
                            address: block.address.wrapping_add((dump.offset + 4 * i) as u64),
                            name: Cow::Owned(format!("{}.raw[{i}]", dump.message)),
                            value: u64::from(u32::from_le_bytes(word)),
                            symbol: None,
                            radix: Radix::Hex,
                        });
                    }
                }
            }
        }
    }
}
