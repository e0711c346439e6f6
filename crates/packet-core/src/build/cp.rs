//! Builder for self-describing command-processor streams (PM4 and PM4-lite).

use super::track::{read_message_block, scan_program_size, Discovery, RegisterTracker};
use super::{finish_stream, BuildContext};
use crate::api::BufferRef;
use crate::arena::{NestedBuffer, PacketHeader, PacketStream, ShaderProgram, StreamId};
use crate::encoding::bits;
use crate::encoding::pm4::{set_reg_space, Pm4Header, Pm4Type};
use crate::fault::{BuildError, DiagnosticKind};

/// `WRITE_DATA` opcode; register writes are tracked when `dst_sel` is 0.
const OP_WRITE_DATA: u8 = 0x37;

/// Parses `words` as command-processor packets and appends them to `arena`.
pub(crate) fn build_cp(
    ctx: &mut BuildContext<'_, '_, '_>,
    arena: &mut PacketStream<Pm4Header>,
    buffer: BufferRef,
    partition: u32,
    words: &[u32],
) -> Result<StreamId, BuildError> {
    let kind = ctx.kind;
    if words.is_empty() {
        return Err(BuildError::EmptyBuffer { kind });
    }
    let stream = arena.open_stream(buffer, partition, words)?;
    let mut tracker = RegisterTracker::new(ctx.device.config.features);
    let mut offset = 0;
    let mut needed = 0;
    while offset < words.len() {
        let rest = &words[offset..];
        let header = Pm4Header::from_word(rest[0]);
        let len = header.total_words();
        if len > rest.len() {
            needed = len;
            break;
        }
        let packet = &rest[..len];
        let node = arena.push_packet(stream, header, offset, len)?;

        if let Some((base, data)) = register_writes(header, packet) {
            let names = ctx.device.registers;
            for (register, &value) in (base..).zip(data) {
                if let Some(name) = names.register_name(register) {
                    tracker.observe(&name, value);
                }
            }
        }

        if let Some(reference) = header.entry().and_then(|entry| entry.reference) {
            if let Some(target) = reference.resolve(packet, buffer.vmid) {
                let nested = ctx.follow(arena, target, partition, build_cp)?;
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

        for discovery in tracker.finish_packet() {
            attach(ctx, arena, node, buffer.vmid, partition, discovery)?;
        }
        offset += len;
    }
    finish_stream(arena, stream, kind, needed, words.len() - offset)
}

/// First register and data words of a packet that writes registers.
fn register_writes(header: Pm4Header, packet: &[u32]) -> Option<(u32, &[u32])> {
    match header.packet_type() {
        Pm4Type::Type0 => Some((header.base_register(), &packet[1..])),
        Pm4Type::Type3 => {
            let opcode = header.opcode_byte();
            if let Some(space) = set_reg_space(opcode) {
                let offset = bits(*packet.get(1)?, 0, 15);
                return Some((space + offset, packet.get(2..)?));
            }
            if opcode == OP_WRITE_DATA && bits(*packet.get(1)?, 8, 11) == 0 {
                let register = bits(*packet.get(2)?, 0, 17);
                return Some((register, packet.get(4..)?));
            }
            None
        }
        Pm4Type::Type1 | Pm4Type::Type2 => None,
    }
}

fn attach(
    ctx: &mut BuildContext<'_, '_, '_>,
    arena: &mut PacketStream<Pm4Header>,
    node: usize,
    vmid: u32,
    partition: u32,
    discovery: Discovery,
) -> Result<(), BuildError> {
    match discovery {
        Discovery::Program {
            stage,
            address,
            rsrc1,
            rsrc2,
        } => {
            let size = scan_program_size(ctx, partition, vmid, address)?;
            tracing::debug!(
                stage = stage.name(),
                vmid,
                address = format_args!("{address:#x}"),
                size,
                "shader program"
            );
            arena.node_mut(node).programs.push(ShaderProgram {
                vmid,
                address,
                size,
                stage,
                rsrc1,
                rsrc2,
            });
        }
        Discovery::IndirectBuffer { .. } => {
            let Some(target) = discovery.ib_target(vmid) else {
                return Ok(());
            };
            // One nested buffer per packet; later ones are reported, not read.
            if arena.node_mut(node).nested.is_some() {
                ctx.log(
                    DiagnosticKind::ExtraReference,
                    format!(
                        "packet already holds a nested buffer; skipping vmid {} 0x{:x}",
                        target.vmid, target.address
                    ),
                );
                return Ok(());
            }
            let nested = ctx.follow(arena, target, partition, build_cp)?;
            arena.node_mut(node).nested = Some(NestedBuffer {
                buffer: BufferRef {
                    vmid: target.vmid,
                    address: target.address,
                    size: target.size,
                },
                stream: nested,
            });
        }
        Discovery::MessageBuffer { address } => {
            if let Some(block) = read_message_block(ctx, partition, vmid, address)? {
                arena.node_mut(node).data_blocks.push(block);
            }
        }
    }
    Ok(())
}
