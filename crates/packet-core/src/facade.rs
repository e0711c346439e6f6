//! Unified facade over the seven stream kinds, plus ring linearization.

use crate::api::{Device, Provenance, RingDump, RingSource, RingWrap, StreamKind};
use crate::arena::{PacketStream, ShaderProgram, StreamRecord};
use crate::build::cp::build_cp;
use crate::build::table::build_table;
use crate::build::{build_root, BuildOptions};
use crate::decode::{decode_stream, Cursor, Limit};
use crate::encoding::mes::SchedHeader;
use crate::encoding::pm4::Pm4Header;
use crate::encoding::sdma::DmaHeader;
use crate::encoding::vcn::VcnHeader;
use crate::fault::{BuildError, DecoderError};
use crate::present::Presenter;

/// Words preceding the body of a ring dump: read, write and doorbell pointers.
pub const RING_HEADER_WORDS: usize = 3;

/// A built stream of any kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnyStream {
    /// Command processor stream.
    Pm4(PacketStream<Pm4Header>),
    /// Register-write-only command processor stream.
    Pm4Lite(PacketStream<Pm4Header>),
    /// System DMA stream.
    Sdma(PacketStream<DmaHeader>),
    /// Video processing engine stream.
    Vpe(PacketStream<DmaHeader>),
    /// Micro engine scheduler stream.
    Mes(PacketStream<SchedHeader>),
    /// Unified media scheduler stream.
    Umsch(PacketStream<SchedHeader>),
    /// Video codec engine stream.
    Vcn(PacketStream<VcnHeader>),
}

/// Evaluates `$body` with `$stream` bound to the inner arena, whatever its header type.
macro_rules! dispatch {
    ($any:expr, $stream:ident => $body:expr) => {
        match $any {
            AnyStream::Pm4($stream) | AnyStream::Pm4Lite($stream) => $body,
            AnyStream::Sdma($stream) | AnyStream::Vpe($stream) => $body,
            AnyStream::Mes($stream) | AnyStream::Umsch($stream) => $body,
            AnyStream::Vcn($stream) => $body,
        }
    };
}

impl AnyStream {
    /// Stream kind the words were parsed under.
    #[must_use]
    pub fn kind(&self) -> StreamKind {
        dispatch!(self, stream => stream.kind())
    }

    /// Bookkeeping of the top-level stream.
    #[must_use]
    pub fn root_record(&self) -> &StreamRecord {
        dispatch!(self, stream => stream.record(stream.root()))
    }

    /// Number of top-level packets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.root_record().len()
    }

    /// Returns true when the top-level stream holds no packets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root_record().is_empty()
    }

    /// Streams in the arena, nested ones included.
    #[must_use]
    pub fn stream_count(&self) -> usize {
        dispatch!(self, stream => stream.stream_count())
    }

    /// Packets in the arena, nested ones included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        dispatch!(self, stream => stream.node_count())
    }

    /// Word counts of the top-level packets, in order.
    #[must_use]
    pub fn packet_lengths(&self) -> Vec<usize> {
        dispatch!(self, stream => stream.packets(stream.root()).map(|node| node.len()).collect())
    }

    /// Every shader program discovered anywhere in the arena.
    #[must_use]
    pub fn programs(&self) -> Vec<ShaderProgram> {
        dispatch!(self, stream => stream
            .nodes()
            .flat_map(|node| node.programs.iter().copied())
            .collect())
    }

    pub(crate) fn set_ring_wrap(&mut self, wrap: Option<RingWrap>) {
        dispatch!(self, stream => stream.set_root_wrap(wrap));
    }

    /// The command processor arena, when this is a PM4 or PM4-lite stream.
    #[must_use]
    pub const fn as_cp(&self) -> Option<&PacketStream<Pm4Header>> {
        match self {
            Self::Pm4(stream) | Self::Pm4Lite(stream) => Some(stream),
            _ => None,
        }
    }

    /// Drives `presenter` over the top-level stream; see [`decode_stream`].
    pub fn decode<P: Presenter + ?Sized>(
        &self,
        cursor: Cursor,
        limit: Limit,
        follow: bool,
        device: &mut Device<'_>,
        presenter: &mut P,
    ) -> Cursor {
        dispatch!(self, stream => decode_stream(stream, cursor, limit, follow, device, presenter))
    }
}

/// Builds a stream of `kind`, following references as the device config says.
///
/// # Errors
///
/// Returns [`BuildError`] when no stream can be produced.
pub fn build_stream(
    kind: StreamKind,
    words: &[u32],
    provenance: Provenance,
    device: &mut Device<'_>,
) -> Result<AnyStream, BuildError> {
    let follow = device.config.follow_references;
    build_stream_with(kind, words, BuildOptions::new(provenance).follow(follow), device)
}

/// Builds a stream of `kind` with explicit options.
///
/// # Errors
///
/// Returns [`BuildError`] when no stream can be produced.
pub fn build_stream_with(
    kind: StreamKind,
    words: &[u32],
    options: BuildOptions<'_>,
    device: &mut Device<'_>,
) -> Result<AnyStream, BuildError> {
    Ok(match kind {
        StreamKind::Pm4 => AnyStream::Pm4(build_root(kind, words, options, device, build_cp)?),
        StreamKind::Pm4Lite => {
            AnyStream::Pm4Lite(build_root(kind, words, options, device, build_cp)?)
        }
        StreamKind::Sdma => AnyStream::Sdma(build_root(
            kind,
            words,
            options,
            device,
            build_table::<DmaHeader>,
        )?),
        StreamKind::Vpe => AnyStream::Vpe(build_root(
            kind,
            words,
            options,
            device,
            build_table::<DmaHeader>,
        )?),
        StreamKind::Mes => AnyStream::Mes(build_root(
            kind,
            words,
            options,
            device,
            build_table::<SchedHeader>,
        )?),
        StreamKind::Umsch => AnyStream::Umsch(build_root(
            kind,
            words,
            options,
            device,
            build_table::<SchedHeader>,
        )?),
        StreamKind::Vcn => AnyStream::Vcn(build_root(
            kind,
            words,
            options,
            device,
            build_table::<VcnHeader>,
        )?),
    })
}

/// Which part of a ring body to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum RingWindow {
    /// From the read pointer up to the write pointer.
    #[default]
    Live,
    /// From `start` up to `end`, both body word indices.
    Span {
        /// First word.
        start: u32,
        /// One past the last word.
        end: u32,
    },
}

/// A ring window copied out into a flat word buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearRing {
    /// Words from the window start, wrapped around the ring end if needed.
    pub words: Vec<u32>,
    /// Body index the window starts at.
    pub start: usize,
    /// GPU virtual address of the first copied word.
    pub address: u64,
    /// Where the copy restarts at body index 0, when the window wraps.
    pub wrap: Option<RingWrap>,
}

/// Copies a window of a ring dump into a flat buffer.
///
/// Pointers are reduced modulo the body length. When the window wraps, the
/// words past the ring end continue from body index 0.
///
/// # Errors
///
/// Returns [`DecoderError::RingTooShort`] when the dump has no body.
pub fn linearize_ring(dump: &RingDump, window: RingWindow) -> Result<LinearRing, DecoderError> {
    let body = dump.words.get(RING_HEADER_WORDS..).unwrap_or_default();
    let len = body.len();
    if len == 0 {
        return Err(DecoderError::RingTooShort {
            words: dump.words.len(),
        });
    }
    let (start, end) = match window {
        RingWindow::Live => (dump.words[0], dump.words[1]),
        RingWindow::Span { start, end } => (start, end),
    };
    let start = start as usize % len;
    let end = end as usize % len;
    let mut wrap = None;
    let words = if start <= end {
        body[start..end].to_vec()
    } else {
        wrap = Some(RingWrap {
            at_word: len - start,
            address: dump.base_address,
        });
        let mut words = Vec::with_capacity(len - start + end);
        words.extend_from_slice(&body[start..]);
        words.extend_from_slice(&body[..end]);
        words
    };
    Ok(LinearRing {
        words,
        start,
        address: dump.base_address.wrapping_add(4 * start as u64),
        wrap,
    })
}

/// One stream, its device and its presenter, decoded incrementally.
pub struct PacketDecoder<'a, P> {
    kind: StreamKind,
    stream: Option<AnyStream>,
    cursor: Cursor,
    device: Device<'a>,
    presenter: P,
}

impl<'a, P: Presenter> PacketDecoder<'a, P> {
    /// Builds `words` as a stream of `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`DecoderError::Build`] when no stream can be produced.
    pub fn from_words(
        kind: StreamKind,
        words: &[u32],
        provenance: Provenance,
        mut device: Device<'a>,
        presenter: P,
    ) -> Result<Self, DecoderError> {
        let stream = build_stream(kind, words, provenance, &mut device)?;
        Ok(Self::from_stream(stream, device, presenter))
    }

    /// Wraps an already built stream.
    pub fn from_stream(stream: AnyStream, device: Device<'a>, presenter: P) -> Self {
        Self {
            kind: stream.kind(),
            stream: Some(stream),
            cursor: Cursor::Start,
            device,
            presenter,
        }
    }

    /// Reads ring `name` from `source`, linearizes `window` and builds it.
    ///
    /// With no explicit `kind` the packet format is guessed from the ring name.
    ///
    /// # Errors
    ///
    /// Returns [`DecoderError`] when the ring cannot be read, its kind cannot
    /// be guessed, its dump has no body, or the window builds no stream.
    pub fn from_ring(
        source: &mut dyn RingSource,
        name: &str,
        kind: Option<StreamKind>,
        window: RingWindow,
        partition: u32,
        device: Device<'a>,
        presenter: P,
    ) -> Result<Self, DecoderError> {
        let kind = kind
            .or_else(|| StreamKind::from_ring_name(name))
            .ok_or_else(|| DecoderError::UnknownRingKind(name.to_string()))?;
        let dump = source.read_ring(name)?;
        Self::from_ring_dump(&dump, kind, window, partition, device, presenter)
    }

    /// Linearizes `window` of an already read ring dump and builds it.
    ///
    /// # Errors
    ///
    /// Returns [`DecoderError`] when the dump has no body or the window
    /// builds no stream.
    pub fn from_ring_dump(
        dump: &RingDump,
        kind: StreamKind,
        window: RingWindow,
        partition: u32,
        device: Device<'a>,
        presenter: P,
    ) -> Result<Self, DecoderError> {
        let ring = linearize_ring(dump, window)?;
        tracing::debug!(
            kind = %kind,
            start = ring.start,
            words = ring.words.len(),
            "ring window linearized"
        );
        let provenance = Provenance {
            vmid: dump.vmid,
            address: ring.address,
            partition,
        };
        let mut decoder = Self::from_words(kind, &ring.words, provenance, device, presenter)?;
        if let Some(stream) = &mut decoder.stream {
            stream.set_ring_wrap(ring.wrap);
        }
        Ok(decoder)
    }

    /// Decodes up to `limit` top-level packets from the saved cursor and
    /// returns the new cursor. Released decoders return [`Cursor::End`].
    pub fn decode(&mut self, limit: Limit, follow: bool) -> Cursor {
        let Some(stream) = &self.stream else {
            return Cursor::End;
        };
        self.cursor = stream.decode(
            self.cursor,
            limit,
            follow,
            &mut self.device,
            &mut self.presenter,
        );
        self.cursor
    }

    /// Rewinds to the first packet.
    pub fn reset_cursor(&mut self) {
        self.cursor = Cursor::Start;
    }

    /// Saved cursor.
    #[must_use]
    pub const fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Drops the built stream and every nested stream with it.
    pub fn release(&mut self) {
        self.stream = None;
        self.cursor = Cursor::End;
    }

    /// Stream kind the decoder was created for.
    #[must_use]
    pub const fn kind(&self) -> StreamKind {
        self.kind
    }

    /// The built stream, unless released.
    #[must_use]
    pub const fn stream(&self) -> Option<&AnyStream> {
        self.stream.as_ref()
    }

    /// The presenter.
    #[must_use]
    pub const fn presenter(&self) -> &P {
        &self.presenter
    }

    /// The presenter, mutably.
    pub fn presenter_mut(&mut self) -> &mut P {
        &mut self.presenter
    }

    /// Consumes the decoder and returns its presenter.
    pub fn into_presenter(self) -> P {
        self.presenter
    }
}
