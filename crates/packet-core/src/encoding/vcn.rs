//! Video codec engine ring commands. The whole header word is the command.

use super::{FieldSpec as F, Layout, OpcodeEntry, PacketLength, ReferenceSpec, RegisterBase, VmidSource};
use crate::arena::PacketHeader;

/// `NO_OP`.
pub const CMD_NO_OP: u32 = 0;
/// `END`.
pub const CMD_END: u32 = 1;
/// `IB`.
pub const CMD_IB: u32 = 2;
/// `FENCE`.
pub const CMD_FENCE: u32 = 3;
/// `TRAP`.
pub const CMD_TRAP: u32 = 4;
/// `REG_WRITE`.
pub const CMD_REG_WRITE: u32 = 0xB;
/// `REG_WAIT`.
pub const CMD_REG_WAIT: u32 = 0xC;

/// Decoded VCN command word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VcnHeader {
    command: u32,
}

impl PacketHeader for VcnHeader {
    fn from_word(word: u32) -> Self {
        Self { command: word }
    }

    fn raw(&self) -> u32 {
        self.command
    }

    fn opcode(&self) -> u32 {
        self.command
    }

    fn sub_opcode(&self) -> u32 {
        0
    }
}

const IB: Layout = &[
    F::word("vmid", 1),
    F::address("ib_address", 2, 3, 32, 0),
    F::word("ib_size", 4),
];
const FENCE: Layout = &[F::address("address", 1, 2, 32, 0), F::hex("data", 3)];
const REG_WRITE: Layout = &[F::register_data(
    2,
    RegisterBase::Word {
        word: 1,
        lo: 0,
        hi: 31,
        space: 0,
    },
)];
const REG_WAIT: Layout = &[
    F::register("register", 1, 0, 31, 0),
    F::hex("mask", 2),
    F::hex("value", 3),
];

const IB_REFERENCE: ReferenceSpec = ReferenceSpec {
    lo: 2,
    hi: 3,
    hi_bits: 32,
    align: 0,
    size_word: 4,
    size_lo: 0,
    size_hi: 31,
    vmid: VmidSource::Bits {
        word: 1,
        lo: 0,
        hi: 3,
    },
};

const fn cmd(command: u32, name: &'static str, words: usize, layout: Layout) -> OpcodeEntry {
    OpcodeEntry::new(command, 0, name, PacketLength::Fixed(words)).fields(layout)
}

/// VCN ring commands.
pub const OPCODES: &[OpcodeEntry] = &[
    cmd(CMD_NO_OP, "NO_OP", 1, &[]),
    cmd(CMD_END, "END", 1, &[]),
    cmd(CMD_IB, "IB", 5, IB).reference(IB_REFERENCE),
    cmd(CMD_FENCE, "FENCE", 4, FENCE),
    cmd(CMD_TRAP, "TRAP", 1, &[]),
    cmd(CMD_REG_WRITE, "REG_WRITE", 3, REG_WRITE),
    cmd(CMD_REG_WAIT, "REG_WAIT", 4, REG_WAIT),
];

#[cfg(test)]
mod tests {
    use super::super::lookup;
    use super::*;

    #[test]
    fn ib_reference_uses_dword_size() {
        let entry = lookup(OPCODES, CMD_IB, 0).expect("ib");
        let target = entry
            .reference
            .expect("reference")
            .resolve(&[CMD_IB, 4, 0x2000, 0x1, 8], 0)
            .expect("complete");
        assert_eq!(target.vmid, 4);
        assert_eq!(target.address, 0x1_0000_2000);
        assert_eq!(target.size, 32);
    }

    #[test]
    fn unknown_command_has_no_entry() {
        assert!(lookup(OPCODES, 0x99, 0).is_none());
    }
}
