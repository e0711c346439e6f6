//! Builder for dialects whose packet lengths come from opcode tables
//! (SDMA, VPE, MES, UMSCH and VCN).

use super::{finish_stream, BuildContext};
use crate::api::BufferRef;
use crate::arena::{NestedBuffer, PacketHeader, PacketStream, StreamId};
use crate::encoding::{lookup, table_for, ResolvedLength};
use crate::fault::BuildError;

/// Parses `words` as a stream of the context's kind and appends it to `arena`.
pub(crate) fn build_table<H: PacketHeader>(
    ctx: &mut BuildContext<'_, '_, '_>,
    arena: &mut PacketStream<H>,
    buffer: BufferRef,
    partition: u32,
    words: &[u32],
) -> Result<StreamId, BuildError> {
    let kind = ctx.kind;
    if words.is_empty() {
        return Err(BuildError::EmptyBuffer { kind });
    }
    let table = table_for(kind);
    let stream = arena.open_stream(buffer, partition, words)?;
    let mut offset = 0;
    let mut needed = 0;
    while offset < words.len() {
        let rest = &words[offset..];
        let header = H::from_word(rest[0]);
        let entry = lookup(table, header.opcode(), header.sub_opcode());
        let len = match entry.map(|entry| entry.length.resolve(rest)) {
            Some(ResolvedLength::Words(n)) => n.max(1),
            Some(ResolvedLength::NeedsWords(n)) => n,
            None => ctx.recover(offset, rest, header.opcode(), header.sub_opcode())?,
        };
        if len > rest.len() {
            needed = len;
            break;
        }
        let node = arena.push_packet(stream, header, offset, len)?;
        if let Some(reference) = entry.and_then(|entry| entry.reference) {
            if let Some(target) = reference.resolve(&rest[..len], buffer.vmid) {
                let nested = ctx.follow(arena, target, partition, build_table::<H>)?;
                arena.node_mut(node).nested = Some(NestedBuffer {
                    buffer: BufferRef {
                        vmid: target.vmid,
                        address: target.address,
                        size: target.size,
                    },
                    stream: nested,
                });
            }
        }
        offset += len;
    }
    finish_stream(arena, stream, kind, needed, words.len() - offset)
}
