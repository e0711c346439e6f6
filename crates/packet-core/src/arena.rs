//! Arena-owned packet node model.
//!
//! Every node, word and nested stream produced by one top-level build lives
//! in a single [`PacketStream`]; dropping it releases the whole tree.

use std::ops::Range;

use crate::api::{BufferRef, RingWrap, StreamKind};
use crate::fault::BuildError;

/// Header accessors shared by every dialect's decoded header word.
pub trait PacketHeader: Copy + std::fmt::Debug {
    /// Decodes the first word of a packet.
    fn from_word(word: u32) -> Self;
    /// Raw header word.
    fn raw(&self) -> u32;
    /// Primary opcode.
    fn opcode(&self) -> u32;
    /// Secondary opcode (sub-opcode, API type, or zero).
    fn sub_opcode(&self) -> u32;
}

/// Index of one stream (top-level or nested) inside an arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId(usize);

impl StreamId {
    /// Position of the stream record in its arena.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Pipeline stage a discovered shader program runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ShaderStage {
    /// Pixel shader.
    Pixel,
    /// Vertex shader.
    Vertex,
    /// Geometry shader.
    Geometry,
    /// Export shader (vertex stage feeding geometry).
    Export,
    /// Hull shader.
    Hull,
    /// Local shader (vertex stage feeding hull).
    Local,
    /// Next-generation geometry shader.
    Ngg,
    /// Compute shader.
    Compute,
}

impl ShaderStage {
    /// Short display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Pixel => "PS",
            Self::Vertex => "VS",
            Self::Geometry => "GS",
            Self::Export => "ES",
            Self::Hull => "HS",
            Self::Local => "LS",
            Self::Ngg => "NGG",
            Self::Compute => "CS",
        }
    }
}

/// Shader program discovered from register writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ShaderProgram {
    /// Virtual memory space of the program.
    pub vmid: u32,
    /// GPU virtual address of the first instruction.
    pub address: u64,
    /// Estimated size in bytes (sentinel scan); zero when scanning is disabled.
    pub size: u64,
    /// Pipeline stage classification.
    pub stage: ShaderStage,
    /// Raw `PGM_RSRC1` value.
    pub rsrc1: u32,
    /// Raw `PGM_RSRC2` value.
    pub rsrc2: u32,
}

/// What a discovered data block contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum DataBlockKind {
    /// Video decode message buffer handed to the VCPU.
    VideoDecodeMessage,
}

/// Side buffer read while building and owned by the discovering node.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct DataBlock {
    /// Contents classification.
    pub kind: DataBlockKind,
    /// Virtual memory space the block was read from.
    pub vmid: u32,
    /// GPU virtual address of the first byte.
    pub address: u64,
    /// Raw bytes.
    pub bytes: Vec<u8>,
}

/// Buffer a node points at, and the stream built from it when followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NestedBuffer {
    /// Where the referenced bytes live.
    pub buffer: BufferRef,
    /// Stream built from the buffer; absent when not followed or unreadable.
    pub stream: Option<StreamId>,
}

/// One decoded packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketNode<H> {
    /// Dialect-specific header.
    pub header: H,
    /// Word offset of the header inside its stream's buffer.
    pub offset: usize,
    words: Range<usize>,
    /// Referenced buffer, if the packet carries a pointer.
    pub nested: Option<NestedBuffer>,
    /// Shader programs selected by this packet.
    pub programs: Vec<ShaderProgram>,
    /// Side buffers read on behalf of this packet.
    pub data_blocks: Vec<DataBlock>,
}

impl<H> PacketNode<H> {
    /// Words in the packet, header included.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.words.end - self.words.start
    }

    /// Always false; every packet has at least its header word.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.words.end == self.words.start
    }

    /// Words following the header.
    #[must_use]
    pub const fn payload_len(&self) -> usize {
        self.len().saturating_sub(1)
    }
}

/// Bookkeeping for one stream inside the arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRecord {
    /// Stream kind the words were parsed under.
    pub kind: StreamKind,
    /// Origin of the buffer.
    pub buffer: BufferRef,
    /// Memory partition the buffer was read from.
    pub partition: u32,
    words: Range<usize>,
    nodes: Vec<usize>,
    wrap: Option<RingWrap>,
}

impl StreamRecord {
    /// Where a ring window's words continue from the ring start, if they do.
    #[must_use]
    pub const fn wrap(&self) -> Option<RingWrap> {
        self.wrap
    }

    /// Number of packets in this stream.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true when the stream holds no packets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Arena position captured before a nested build, for rollback on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ArenaMark {
    nodes: usize,
    words: usize,
    streams: usize,
}

/// A top-level stream and every nested stream reachable from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketStream<H> {
    kind: StreamKind,
    nodes: Vec<PacketNode<H>>,
    words: Vec<u32>,
    streams: Vec<StreamRecord>,
    root: StreamId,
}

impl<H: PacketHeader> PacketStream<H> {
    pub(crate) const fn new(kind: StreamKind) -> Self {
        Self {
            kind,
            nodes: Vec::new(),
            words: Vec::new(),
            streams: Vec::new(),
            root: StreamId(0),
        }
    }

    /// Stream kind of the top-level buffer (and every nested one).
    #[must_use]
    pub const fn kind(&self) -> StreamKind {
        self.kind
    }

    /// The top-level stream.
    #[must_use]
    pub const fn root(&self) -> StreamId {
        self.root
    }

    /// Bookkeeping of a stream.
    ///
    /// # Panics
    ///
    /// Panics if `id` did not come from this arena.
    #[must_use]
    pub fn record(&self, id: StreamId) -> &StreamRecord {
        &self.streams[id.0]
    }

    pub(crate) fn set_root_wrap(&mut self, wrap: Option<RingWrap>) {
        if let Some(root) = self.streams.get_mut(self.root.0) {
            root.wrap = wrap;
        }
    }

    /// Number of streams in the arena, top-level included.
    #[must_use]
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Number of packets across every stream.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Packets of stream `id` in buffer order.
    pub fn packets(&self, id: StreamId) -> impl Iterator<Item = &PacketNode<H>> + '_ {
        self.streams[id.0].nodes.iter().map(|&index| &self.nodes[index])
    }

    /// Every packet in the arena in allocation order, nested ones included.
    pub fn nodes(&self) -> impl Iterator<Item = &PacketNode<H>> + '_ {
        self.nodes.iter()
    }

    /// The `position`-th packet of stream `id`.
    #[must_use]
    pub fn packet(&self, id: StreamId, position: usize) -> Option<&PacketNode<H>> {
        self.streams
            .get(id.0)
            .and_then(|record| record.nodes.get(position))
            .map(|&index| &self.nodes[index])
    }

    /// Words of `node`, header first.
    #[must_use]
    pub fn words_of(&self, node: &PacketNode<H>) -> &[u32] {
        &self.words[node.words.clone()]
    }

    /// Every word of stream `id`'s buffer, including any truncated tail.
    #[must_use]
    pub fn buffer_words(&self, id: StreamId) -> &[u32] {
        &self.words[self.streams[id.0].words.clone()]
    }

    pub(crate) const fn mark(&self) -> ArenaMark {
        ArenaMark {
            nodes: self.nodes.len(),
            words: self.words.len(),
            streams: self.streams.len(),
        }
    }

    /// Discards everything allocated after `mark`.
    pub(crate) fn rollback(&mut self, mark: ArenaMark) {
        self.nodes.truncate(mark.nodes);
        self.words.truncate(mark.words);
        self.streams.truncate(mark.streams);
    }

    /// Copies a buffer into the arena and opens an empty stream over it.
    pub(crate) fn open_stream(
        &mut self,
        buffer: BufferRef,
        partition: u32,
        words: &[u32],
    ) -> Result<StreamId, BuildError> {
        let kind = self.kind;
        let oom = |_| BuildError::OutOfMemory { kind };
        self.words.try_reserve(words.len()).map_err(oom)?;
        self.streams.try_reserve(1).map_err(oom)?;
        let start = self.words.len();
        self.words.extend_from_slice(words);
        let id = StreamId(self.streams.len());
        self.streams.push(StreamRecord {
            kind,
            buffer,
            partition,
            words: start..self.words.len(),
            nodes: Vec::new(),
            wrap: None,
        });
        if self.streams.len() == 1 {
            self.root = id;
        }
        Ok(id)
    }

    /// Appends a packet covering `len` words at `offset` of stream `id`.
    pub(crate) fn push_packet(
        &mut self,
        id: StreamId,
        header: H,
        offset: usize,
        len: usize,
    ) -> Result<usize, BuildError> {
        let kind = self.kind;
        let oom = |_| BuildError::OutOfMemory { kind };
        self.nodes.try_reserve(1).map_err(oom)?;
        let record = &mut self.streams[id.0];
        record.nodes.try_reserve(1).map_err(oom)?;
        let start = record.words.start + offset;
        let index = self.nodes.len();
        record.nodes.push(index);
        self.nodes.push(PacketNode {
            header,
            offset,
            words: start..start + len,
            nested: None,
            programs: Vec::new(),
            data_blocks: Vec::new(),
        });
        Ok(index)
    }

    pub(crate) fn node_mut(&mut self, index: usize) -> &mut PacketNode<H> {
        &mut self.nodes[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy)]
    struct Raw(u32);

    impl PacketHeader for Raw {
        fn from_word(word: u32) -> Self {
            Self(word)
        }
        fn raw(&self) -> u32 {
            self.0
        }
        fn opcode(&self) -> u32 {
            self.0 & 0xFF
        }
        fn sub_opcode(&self) -> u32 {
            0
        }
    }

    #[test]
    fn packets_slice_their_stream_words() {
        let mut arena = PacketStream::<Raw>::new(StreamKind::Vcn);
        let root = arena
            .open_stream(BufferRef::default(), 0, &[1, 2, 3, 4])
            .expect("open");
        arena.push_packet(root, Raw(1), 0, 1).expect("push");
        arena.push_packet(root, Raw(2), 1, 3).expect("push");

        let lens: Vec<_> = arena.packets(root).map(PacketNode::len).collect();
        assert_eq!(lens, vec![1, 3]);
        let second = arena.packet(root, 1).expect("second");
        assert_eq!(arena.words_of(second), &[2, 3, 4]);
        assert_eq!(second.payload_len(), 2);
    }

    #[test]
    fn rollback_discards_nested_allocations() {
        let mut arena = PacketStream::<Raw>::new(StreamKind::Vcn);
        let root = arena
            .open_stream(BufferRef::default(), 0, &[1])
            .expect("open");
        arena.push_packet(root, Raw(1), 0, 1).expect("push");
        let mark = arena.mark();
        let nested = arena
            .open_stream(BufferRef::default(), 0, &[9, 9])
            .expect("nested");
        arena.push_packet(nested, Raw(9), 0, 2).expect("push");
        arena.rollback(mark);

        assert_eq!(arena.stream_count(), 1);
        assert_eq!(arena.node_count(), 1);
        assert_eq!(arena.root(), root);
        assert_eq!(arena.buffer_words(root), &[1]);
    }
}
