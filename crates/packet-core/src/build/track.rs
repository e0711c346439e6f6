//! Register-write tracking for command-processor streams.
//!
//! Shader programs, legacy video IBs and video message buffers are not
//! referenced by a single packet; they are assembled from a sequence of
//! register writes and surface once the selecting write is seen.

use super::BuildContext;
use crate::api::DeviceFeatures;
use crate::arena::{DataBlock, DataBlockKind, ShaderStage};
use crate::encoding::ReferenceTarget;
use crate::fault::{BuildError, DiagnosticKind};

/// Program register sets, one per stage name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StageSlot {
    Ps,
    Vs,
    Gs,
    Es,
    Hs,
    Ls,
    Compute,
}

impl StageSlot {
    const COUNT: usize = 7;

    fn parse(suffix: &str) -> Option<Self> {
        // Merged stages carry compound suffixes such as `ES_GS`; the last
        // component names the hardware stage that runs the program.
        let stage = suffix.rsplit('_').next()?;
        match stage {
            "PS" => Some(Self::Ps),
            "VS" => Some(Self::Vs),
            "GS" => Some(Self::Gs),
            "ES" => Some(Self::Es),
            "HS" => Some(Self::Hs),
            "LS" => Some(Self::Ls),
            _ => None,
        }
    }

    const fn index(self) -> usize {
        self as usize
    }

    const fn stage(self, features: DeviceFeatures) -> ShaderStage {
        match self {
            Self::Ps => ShaderStage::Pixel,
            Self::Vs | Self::Gs if features.ngg => ShaderStage::Ngg,
            Self::Vs => ShaderStage::Vertex,
            Self::Gs => ShaderStage::Geometry,
            Self::Es if features.merged_shader_stages => ShaderStage::Geometry,
            Self::Es => ShaderStage::Export,
            Self::Hs => ShaderStage::Hull,
            Self::Ls if features.merged_shader_stages => ShaderStage::Hull,
            Self::Ls => ShaderStage::Local,
            Self::Compute => ShaderStage::Compute,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProgramRegister {
    Lo,
    Hi,
    Rsrc1,
    Rsrc2,
}

impl ProgramRegister {
    fn parse(field: &str) -> Option<Self> {
        match field {
            "LO" => Some(Self::Lo),
            "HI" => Some(Self::Hi),
            "RSRC1" => Some(Self::Rsrc1),
            "RSRC2" => Some(Self::Rsrc2),
            _ => None,
        }
    }
}

/// Classifies a shader program register from its symbolic name.
fn program_register(name: &str) -> Option<(StageSlot, ProgramRegister)> {
    if let Some(at) = name.find("SPI_SHADER_PGM_") {
        let rest = &name[at + "SPI_SHADER_PGM_".len()..];
        let (field, suffix) = rest.split_once('_')?;
        return Some((StageSlot::parse(suffix)?, ProgramRegister::parse(field)?));
    }
    let field = name.strip_prefix("COMPUTE_PGM_")?;
    Some((StageSlot::Compute, ProgramRegister::parse(field)?))
}

#[derive(Debug, Clone, Copy, Default)]
struct ProgramRegisters {
    lo: u32,
    hi: u32,
    rsrc1: u32,
    rsrc2: u32,
    selected: bool,
}

/// Something a packet's register writes pointed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Discovery {
    /// Shader program selected by a LO/HI address write.
    Program {
        stage: ShaderStage,
        address: u64,
        rsrc1: u32,
        rsrc2: u32,
    },
    /// Legacy video ring IB; `vmid` 0 inherits the parent buffer's VMID.
    IndirectBuffer { vmid: u32, address: u64, size: u64 },
    /// Video decode message buffer handed to the VCPU.
    MessageBuffer { address: u64 },
}

/// Running register state of one command-processor stream.
#[derive(Debug, Clone, Default)]
pub(crate) struct RegisterTracker {
    features: DeviceFeatures,
    programs: [ProgramRegisters; StageSlot::COUNT],
    ib_vmid: u32,
    ib_lo: u32,
    ib_hi: u32,
    gpcom_lo: u32,
    gpcom_hi: u32,
    found: Vec<Discovery>,
}

impl RegisterTracker {
    pub(crate) fn new(features: DeviceFeatures) -> Self {
        Self {
            features,
            ..Self::default()
        }
    }

    /// Records a write of `value` to the register called `name`.
    pub(crate) fn observe(&mut self, name: &str, value: u32) {
        let name = name.strip_prefix("mm").unwrap_or(name);
        if let Some((slot, register)) = program_register(name) {
            let regs = &mut self.programs[slot.index()];
            match register {
                ProgramRegister::Lo => {
                    regs.lo = value;
                    regs.selected = true;
                }
                ProgramRegister::Hi => {
                    regs.hi = value;
                    regs.selected = true;
                }
                ProgramRegister::Rsrc1 => regs.rsrc1 = value,
                ProgramRegister::Rsrc2 => regs.rsrc2 = value,
            }
            return;
        }
        match name {
            "UVD_LMI_RBC_IB_VMID" => self.ib_vmid = value,
            "UVD_LMI_RBC_IB_64BIT_BAR_LOW" => self.ib_lo = value,
            "UVD_LMI_RBC_IB_64BIT_BAR_HIGH" => self.ib_hi = value,
            "UVD_RBC_IB_SIZE" => self.found.push(Discovery::IndirectBuffer {
                vmid: self.ib_vmid,
                address: (u64::from(self.ib_hi) << 32) | u64::from(self.ib_lo),
                size: u64::from(value) * 4,
            }),
            "UVD_GPCOM_VCPU_DATA0" => self.gpcom_lo = value,
            "UVD_GPCOM_VCPU_DATA1" => self.gpcom_hi = value,
            "UVD_GPCOM_VCPU_CMD" if value >> 1 == 0 => self.found.push(Discovery::MessageBuffer {
                address: (u64::from(self.gpcom_hi) << 32) | u64::from(self.gpcom_lo),
            }),
            _ => {}
        }
    }

    /// Discoveries of the packet just observed, programs last.
    pub(crate) fn finish_packet(&mut self) -> Vec<Discovery> {
        let slots = [
            StageSlot::Ps,
            StageSlot::Vs,
            StageSlot::Gs,
            StageSlot::Es,
            StageSlot::Hs,
            StageSlot::Ls,
            StageSlot::Compute,
        ];
        for slot in slots {
            let regs = &mut self.programs[slot.index()];
            if !std::mem::take(&mut regs.selected) {
                continue;
            }
            self.found.push(Discovery::Program {
                stage: slot.stage(self.features),
                address: (u64::from(regs.hi & 0xFF) << 40) | (u64::from(regs.lo) << 8),
                rsrc1: regs.rsrc1,
                rsrc2: regs.rsrc2,
            });
        }
        std::mem::take(&mut self.found)
    }
}

/// Estimates a program's size by reading forward to five consecutive
/// terminator words.
///
/// Returns the byte offset just past the fifth terminator, the bytes scanned
/// when a read fails, or the configured limit.
pub(crate) fn scan_program_size(
    ctx: &mut BuildContext<'_, '_, '_>,
    partition: u32,
    vmid: u32,
    address: u64,
) -> Result<u64, BuildError> {
    const RUN: u32 = 5;

    let config = &ctx.device.config;
    if !config.scan_shaders {
        return Ok(0);
    }
    let page = u64::from(config.shader_scan_page_bytes.max(4) & !3);
    let limit = config.shader_scan_limit_bytes & !3;
    let terminator = config.features.gfx_level.terminator_word();

    let mut scanned = 0u64;
    let mut run = 0;
    let mut chunk = page - (address % page);
    while scanned < limit {
        let len = chunk.min(limit - scanned);
        let Ok(read_len) = usize::try_from(len) else {
            break;
        };
        // Running off the top of the address space ends the mapping too.
        let Some(cursor) = address.checked_add(scanned) else {
            return Ok(scanned);
        };
        let Ok(bytes) = ctx.read_bytes(partition, vmid, cursor, read_len)? else {
            return Ok(scanned);
        };
        for (i, word) in bytes.chunks_exact(4).enumerate() {
            let word = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
            if word == terminator {
                run += 1;
                if run == RUN {
                    return Ok(scanned + (i as u64 + 1) * 4);
                }
            } else {
                run = 0;
            }
        }
        scanned += len;
        chunk = page;
    }
    ctx.log(
        DiagnosticKind::ShaderScanLimit,
        format!("shader at vmid {vmid} 0x{address:x} has no terminator within {limit} bytes"),
    );
    Ok(limit)
}

/// Message buffer header bytes: `header_size` then `total_size`.
const MESSAGE_PREFIX_BYTES: usize = 8;

/// Reads a video decode message buffer whose size is given by its header.
pub(crate) fn read_message_block(
    ctx: &mut BuildContext<'_, '_, '_>,
    partition: u32,
    vmid: u32,
    address: u64,
) -> Result<Option<DataBlock>, BuildError> {
    let prefix = match ctx.read_bytes(partition, vmid, address, MESSAGE_PREFIX_BYTES)? {
        Ok(prefix) => prefix,
        Err(err) => {
            ctx.log(
                DiagnosticKind::UnreadableReference,
                format!("video message header unreadable: {err}"),
            );
            return Ok(None);
        }
    };
    let total = u32::from_le_bytes([prefix[4], prefix[5], prefix[6], prefix[7]]);
    let total = u64::from(total);
    if total > ctx.device.config.max_reference_bytes {
        ctx.log(
            DiagnosticKind::OversizedReference,
            format!(
                "video message at vmid {vmid} 0x{address:x} declares {total} bytes, limit {}",
                ctx.device.config.max_reference_bytes
            ),
        );
        return Ok(None);
    }
    let Ok(len) = usize::try_from(total) else {
        return Ok(None);
    };
    match ctx.read_bytes(partition, vmid, address, len)? {
        Ok(bytes) => Ok(Some(DataBlock {
            kind: DataBlockKind::VideoDecodeMessage,
            vmid,
            address,
            bytes,
        })),
        Err(err) => {
            ctx.log(
                DiagnosticKind::UnreadableReference,
                format!("video message body unreadable: {err}"),
            );
            Ok(None)
        }
    }
}

impl Discovery {
    /// Reference target of an IB discovery, with VMID 0 inheriting `parent_vmid`.
    pub(crate) const fn ib_target(self, parent_vmid: u32) -> Option<ReferenceTarget> {
        match self {
            Self::IndirectBuffer {
                vmid,
                address,
                size,
            } => Some(ReferenceTarget {
                vmid: if vmid == 0 { parent_vmid } else { vmid },
                address,
                size,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn tracker(ngg: bool, merged: bool) -> RegisterTracker {
        RegisterTracker::new(DeviceFeatures {
            ngg,
            merged_shader_stages: merged,
            ..DeviceFeatures::default()
        })
    }

    #[rstest]
    #[case("mmSPI_SHADER_PGM_LO_PS", false, false, ShaderStage::Pixel)]
    #[case("SPI_SHADER_PGM_LO_VS", false, false, ShaderStage::Vertex)]
    #[case("SPI_SHADER_PGM_LO_VS", true, false, ShaderStage::Ngg)]
    #[case("SPI_SHADER_PGM_HI_GS", true, false, ShaderStage::Ngg)]
    #[case("SPI_SHADER_PGM_LO_ES", false, false, ShaderStage::Export)]
    #[case("SPI_SHADER_PGM_LO_ES", false, true, ShaderStage::Geometry)]
    #[case("SPI_SHADER_PGM_LO_LS", false, true, ShaderStage::Hull)]
    #[case("SPI_SHADER_PGM_LO_LS", false, false, ShaderStage::Local)]
    #[case("mmCOMPUTE_PGM_LO", false, false, ShaderStage::Compute)]
    fn stage_classification(
        #[case] register: &str,
        #[case] ngg: bool,
        #[case] merged: bool,
        #[case] expected: ShaderStage,
    ) {
        let mut tracker = tracker(ngg, merged);
        tracker.observe(register, 0x10);
        match tracker.finish_packet().as_slice() {
            [Discovery::Program { stage, .. }] => assert_eq!(*stage, expected),
            other => panic!("unexpected discoveries {other:?}"),
        }
    }

    #[test]
    fn program_address_combines_lo_and_hi() {
        let mut tracker = tracker(false, false);
        tracker.observe("mmSPI_SHADER_PGM_RSRC1_PS", 0xAB);
        tracker.observe("mmSPI_SHADER_PGM_RSRC2_PS", 0xCD);
        tracker.observe("mmSPI_SHADER_PGM_LO_PS", 0x0012_3456);
        tracker.observe("mmSPI_SHADER_PGM_HI_PS", 0x1FF);
        let found = tracker.finish_packet();
        assert_eq!(
            found,
            vec![Discovery::Program {
                stage: ShaderStage::Pixel,
                address: 0xFF_1234_5600,
                rsrc1: 0xAB,
                rsrc2: 0xCD,
            }]
        );
        assert!(tracker.finish_packet().is_empty());
    }

    #[test]
    fn resource_writes_alone_select_nothing() {
        let mut tracker = tracker(false, false);
        tracker.observe("SPI_SHADER_PGM_RSRC1_HS", 1);
        tracker.observe("SPI_SHADER_PGM_RSRC3_HS", 1);
        assert!(tracker.finish_packet().is_empty());
    }

    #[test]
    fn uvd_ib_sequence_yields_dword_sized_reference() {
        let mut tracker = tracker(false, false);
        tracker.observe("mmUVD_LMI_RBC_IB_VMID", 0);
        tracker.observe("mmUVD_LMI_RBC_IB_64BIT_BAR_LOW", 0x4000);
        tracker.observe("mmUVD_LMI_RBC_IB_64BIT_BAR_HIGH", 0x1);
        tracker.observe("mmUVD_RBC_IB_SIZE", 16);
        let found = tracker.finish_packet();
        let target = found[0].ib_target(7).expect("ib");
        assert_eq!(target.vmid, 7);
        assert_eq!(target.address, 0x1_0000_4000);
        assert_eq!(target.size, 64);
    }

    #[test]
    fn gpcom_only_command_zero_references_message() {
        let mut tracker = tracker(false, false);
        tracker.observe("UVD_GPCOM_VCPU_DATA0", 0x9000);
        tracker.observe("UVD_GPCOM_VCPU_DATA1", 0);
        tracker.observe("UVD_GPCOM_VCPU_CMD", 4);
        assert!(tracker.finish_packet().is_empty());
        tracker.observe("UVD_GPCOM_VCPU_CMD", 1);
        assert_eq!(
            tracker.finish_packet(),
            vec![Discovery::MessageBuffer { address: 0x9000 }]
        );
    }
}
