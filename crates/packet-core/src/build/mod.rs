//! Stream builders: word arrays in, arena-owned packet streams out.
//!
//! Builders resolve packet lengths, follow buffer references eagerly and
//! record discovered side structures on the packets that produced them.

pub(crate) mod cp;
pub(crate) mod track;
pub(crate) mod table;

use crate::api::{BufferRef, Device, Provenance, StreamKind, VmReadError};
use crate::arena::{PacketHeader, PacketStream, StreamId};
use crate::diag::Diagnostic;
use crate::encoding::ReferenceTarget;
use crate::fault::{BuildError, DiagnosticKind};
use crate::memory::words_from_le_bytes;

/// Packet the length tables do not cover, offered to a [`SizeRecovery`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownPacket<'w> {
    /// Stream kind being built.
    pub kind: StreamKind,
    /// Word offset of the header in its buffer.
    pub offset: usize,
    /// Raw header word.
    pub header: u32,
    /// Words from the header to the end of the buffer.
    pub words: &'w [u32],
}

/// Caller-supplied length for packets with unknown opcodes.
///
/// Returning `None` (or zero) leaves the opcode unknown and fails the build.
pub type SizeRecovery<'r> = dyn FnMut(&UnknownPacket<'_>) -> Option<usize> + 'r;

/// Per-build options.
pub struct BuildOptions<'r> {
    /// Origin of the top-level buffer.
    pub provenance: Provenance,
    /// Build nested streams for referenced buffers.
    pub follow: bool,
    /// Length recovery for unknown opcodes in table-driven dialects.
    pub recovery: Option<&'r mut SizeRecovery<'r>>,
}

impl<'r> BuildOptions<'r> {
    /// Options that follow references and have no recovery callback.
    #[must_use]
    pub const fn new(provenance: Provenance) -> Self {
        Self {
            provenance,
            follow: true,
            recovery: None,
        }
    }

    /// Enables or disables reference following.
    #[must_use]
    pub const fn follow(mut self, follow: bool) -> Self {
        self.follow = follow;
        self
    }

    /// Installs a length recovery callback.
    #[must_use]
    pub fn recovery(mut self, recovery: &'r mut SizeRecovery<'r>) -> Self {
        self.recovery = Some(recovery);
        self
    }
}

impl std::fmt::Debug for BuildOptions<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildOptions")
            .field("provenance", &self.provenance)
            .field("follow", &self.follow)
            .field("recovery", &self.recovery.is_some())
            .finish()
    }
}

/// `(partition, vmid, address)` of a buffer currently being built.
type ActiveBuffer = (u32, u32, u64);

/// Builder entry point of one dialect.
pub(crate) type BuildFn<H> = fn(
    &mut BuildContext<'_, '_, '_>,
    &mut PacketStream<H>,
    BufferRef,
    u32,
    &[u32],
) -> Result<StreamId, BuildError>;

/// State threaded through one top-level build and all its nested builds.
pub(crate) struct BuildContext<'b, 'a, 'r> {
    pub(crate) kind: StreamKind,
    pub(crate) device: &'b mut Device<'a>,
    follow: bool,
    recovery: Option<&'r mut SizeRecovery<'r>>,
    active: Vec<ActiveBuffer>,
}

impl<'b, 'a, 'r> BuildContext<'b, 'a, 'r> {
    fn new(kind: StreamKind, device: &'b mut Device<'a>, options: BuildOptions<'r>) -> Self {
        Self {
            kind,
            device,
            follow: options.follow,
            recovery: options.recovery,
            active: Vec::new(),
        }
    }

    pub(crate) fn log(&mut self, kind: DiagnosticKind, message: String) {
        self.device.diagnostics.log(Diagnostic::new(kind, message));
    }

    /// Asks the recovery callback for the length of an unknown packet.
    pub(crate) fn recover(
        &mut self,
        offset: usize,
        words: &[u32],
        opcode: u32,
        sub_opcode: u32,
    ) -> Result<usize, BuildError> {
        let kind = self.kind;
        let header = words.first().copied().unwrap_or_default();
        let recovered = self.recovery.as_mut().and_then(|recover| {
            recover(&UnknownPacket {
                kind,
                offset,
                header,
                words,
            })
        });
        match recovered {
            Some(len) if len > 0 => {
                self.log(
                    DiagnosticKind::UnknownOpcodeRecovered,
                    format!(
                        "{kind} opcode 0x{opcode:02x}/0x{sub_opcode:02x} at word {offset} \
                         recovered as {len} words"
                    ),
                );
                Ok(len)
            }
            _ => Err(BuildError::UnknownOpcode {
                kind,
                opcode,
                sub_opcode,
                offset,
            }),
        }
    }

    /// Reads `len` bytes of GPU memory. The outer error is fatal.
    pub(crate) fn read_bytes(
        &mut self,
        partition: u32,
        vmid: u32,
        address: u64,
        len: usize,
    ) -> Result<Result<Vec<u8>, VmReadError>, BuildError> {
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(len)
            .map_err(|_| BuildError::OutOfMemory { kind: self.kind })?;
        bytes.resize(len, 0);
        Ok(self
            .device
            .vm
            .read(partition, vmid, address, &mut bytes)
            .map(|()| bytes))
    }

    /// Reads a referenced buffer and builds it as a nested stream.
    ///
    /// Everything but allocation failure is soft: the caller keeps the
    /// referencing packet and records `None` as its nested stream.
    pub(crate) fn follow<H: PacketHeader>(
        &mut self,
        arena: &mut PacketStream<H>,
        target: ReferenceTarget,
        partition: u32,
        build: BuildFn<H>,
    ) -> Result<Option<StreamId>, BuildError> {
        if !self.follow || target.size == 0 {
            return Ok(None);
        }
        let kind = self.kind;
        if target.size > self.device.config.max_reference_bytes {
            self.log(
                DiagnosticKind::OversizedReference,
                format!(
                    "{kind} reference vmid {} 0x{:x} is {} bytes, limit {}",
                    target.vmid, target.address, target.size, self.device.config.max_reference_bytes
                ),
            );
            return Ok(None);
        }
        let key = (partition, target.vmid, target.address);
        if self.active.contains(&key) {
            self.log(
                DiagnosticKind::ReferenceCycle,
                format!(
                    "{kind} reference vmid {} 0x{:x} is already being built",
                    target.vmid, target.address
                ),
            );
            return Ok(None);
        }
        let Ok(len) = usize::try_from(target.size) else {
            return Ok(None);
        };
        tracing::debug!(
            kind = %kind,
            vmid = target.vmid,
            address = format_args!("{:#x}", target.address),
            size = target.size,
            depth = self.active.len(),
            "following reference"
        );
        let bytes = match self.read_bytes(partition, target.vmid, target.address, len)? {
            Ok(bytes) => bytes,
            Err(err) => {
                self.log(
                    DiagnosticKind::UnreadableReference,
                    format!("{kind} reference unreadable: {err}"),
                );
                return Ok(None);
            }
        };
        let words = words_from_le_bytes(&bytes);
        let buffer = BufferRef {
            vmid: target.vmid,
            address: target.address,
            size: target.size,
        };
        let mark = arena.mark();
        self.active.push(key);
        let built = build(self, arena, buffer, partition, &words);
        self.active.pop();
        match built {
            Ok(id) => Ok(Some(id)),
            Err(err) if err.is_out_of_memory() => Err(err),
            Err(err) => {
                arena.rollback(mark);
                self.log(
                    DiagnosticKind::NestedBuildFailed,
                    format!("nested buffer at 0x{:x}: {err}", target.address),
                );
                Ok(None)
            }
        }
    }
}

/// Builds a top-level stream of `kind` with dialect entry point `build`.
pub(crate) fn build_root<H: PacketHeader>(
    kind: StreamKind,
    words: &[u32],
    options: BuildOptions<'_>,
    device: &mut Device<'_>,
    build: BuildFn<H>,
) -> Result<PacketStream<H>, BuildError> {
    let provenance = options.provenance;
    let buffer = provenance.buffer(words.len());
    let mut arena = PacketStream::new(kind);
    let mut ctx = BuildContext::new(kind, device, options);
    ctx.active
        .push((provenance.partition, provenance.vmid, provenance.address));
    build(&mut ctx, &mut arena, buffer, provenance.partition, words)?;
    tracing::trace!(
        kind = %kind,
        packets = arena.record(arena.root()).len(),
        streams = arena.stream_count(),
        "stream built"
    );
    Ok(arena)
}

/// A buffer without one complete packet is an error; a partial tail is not.
///
/// `needed` is zero when the buffer ended on a packet boundary.
pub(crate) fn finish_stream<H: PacketHeader>(
    arena: &PacketStream<H>,
    stream: StreamId,
    kind: StreamKind,
    needed: usize,
    available: usize,
) -> Result<StreamId, BuildError> {
    if arena.record(stream).is_empty() {
        return Err(BuildError::InsufficientWords {
            kind,
            needed,
            available,
        });
    }
    if needed > 0 {
        tracing::trace!(kind = %kind, needed, available, "trailing partial packet dropped");
    }
    Ok(stream)
}
