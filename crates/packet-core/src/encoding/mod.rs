//! Declarative packet layouts: lengths, field slices, references and symbol
//! tables for every dialect.
//!
//! Word index 0 of every layout is the header word.

pub mod mes;
pub mod pm4;
pub mod sdma;
pub mod vcn;

use crate::api::StreamKind;
use crate::present::Radix;

/// Value-to-name table for enumerated fields.
pub type SymbolTable = &'static [(u32, &'static str)];

/// Looks up `value` in `table`.
#[must_use]
pub fn symbol(table: SymbolTable, value: u32) -> Option<&'static str> {
    table
        .iter()
        .find(|(key, _)| *key == value)
        .map(|(_, name)| *name)
}

/// Extracts bits `lo..=hi` of `word`.
#[must_use]
pub const fn bits(word: u32, lo: u8, hi: u8) -> u32 {
    let width = hi - lo + 1;
    if width >= 32 {
        word >> lo
    } else {
        (word >> lo) & ((1u32 << width) - 1)
    }
}

/// Where a register-run's first register address comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterBase {
    /// Type-0 header: bits 15:0 of the header word.
    Header,
    /// Bits `lo..=hi` of a payload word, plus a register space base.
    Word {
        /// Word holding the offset.
        word: u8,
        /// Lowest offset bit.
        lo: u8,
        /// Highest offset bit.
        hi: u8,
        /// Register space base added to the offset.
        space: u32,
    },
}

/// How a field's value is pulled from the packet words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Bits `lo..=hi` of one word.
    Bits {
        /// Word index.
        word: u8,
        /// Lowest bit.
        lo: u8,
        /// Highest bit.
        hi: u8,
    },
    /// Address split across a low and a high word.
    Address {
        /// Word with the low 32 bits.
        lo: u8,
        /// Word with the high bits.
        hi: u8,
        /// Number of valid bits in the high word.
        hi_bits: u8,
        /// Low bits masked off the low word.
        align: u8,
    },
    /// 64-bit value from two consecutive words, low first.
    Wide {
        /// Word with the low half.
        word: u8,
    },
    /// Bits naming a register, plus a register space base.
    Register {
        /// Word index.
        word: u8,
        /// Lowest bit.
        lo: u8,
        /// Highest bit.
        hi: u8,
        /// Register space base.
        space: u32,
    },
    /// `count` consecutive whole words named `name[i]`.
    Array {
        /// First word.
        first: u8,
        /// Number of words.
        count: u8,
    },
    /// Every word from `first` on, each written to the next register.
    RegisterData {
        /// First data word.
        first: u8,
        /// Register of the first data word.
        base: RegisterBase,
    },
    /// `(register offset, dword count)` pairs from `first` on.
    RegisterPairs {
        /// First pair word.
        first: u8,
        /// Register space base.
        space: u32,
    },
    /// Every word from `first` on, named `name[i]`.
    Data {
        /// First data word.
        first: u8,
    },
}

impl FieldKind {
    /// Number of words the field needs to be emitted at all.
    #[must_use]
    pub const fn min_words(self) -> usize {
        match self {
            Self::Bits { word, .. } | Self::Register { word, .. } => word as usize + 1,
            Self::Address { lo, hi, .. } => {
                if lo > hi {
                    lo as usize + 1
                } else {
                    hi as usize + 1
                }
            }
            Self::Wide { word } => word as usize + 2,
            Self::Array { first, count } => first as usize + count as usize,
            Self::RegisterData { first, base } => match base {
                RegisterBase::Header => first as usize,
                RegisterBase::Word { word, .. } => {
                    if word as usize + 1 > first as usize {
                        word as usize + 1
                    } else {
                        first as usize
                    }
                }
            },
            Self::RegisterPairs { first, .. } | Self::Data { first } => first as usize,
        }
    }
}

/// Gate on a bit slice of another word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Condition {
    /// Word index.
    pub word: u8,
    /// Lowest bit.
    pub lo: u8,
    /// Highest bit.
    pub hi: u8,
    /// Value compared against.
    pub value: u32,
    /// Emit when the slice differs from `value` instead.
    pub negate: bool,
}

impl Condition {
    /// Evaluates the gate; a missing word fails it.
    #[must_use]
    pub fn holds(&self, words: &[u32]) -> bool {
        words
            .get(usize::from(self.word))
            .is_some_and(|&w| (bits(w, self.lo, self.hi) == self.value) != self.negate)
    }
}

/// One named field of a packet layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Field name.
    pub name: &'static str,
    /// Extraction rule.
    pub kind: FieldKind,
    /// Display hint.
    pub radix: Radix,
    /// Symbol table for enumerated values.
    pub symbols: Option<SymbolTable>,
    /// Optional gate.
    pub when: Option<Condition>,
}

impl FieldSpec {
    const fn new(name: &'static str, kind: FieldKind, radix: Radix) -> Self {
        Self {
            name,
            kind,
            radix,
            symbols: None,
            when: None,
        }
    }

    /// Decimal bit slice.
    #[must_use]
    pub const fn bits(name: &'static str, word: u8, lo: u8, hi: u8) -> Self {
        Self::new(name, FieldKind::Bits { word, lo, hi }, Radix::Decimal)
    }

    /// Whole word, decimal.
    #[must_use]
    pub const fn word(name: &'static str, word: u8) -> Self {
        Self::bits(name, word, 0, 31)
    }

    /// Whole word, hexadecimal.
    #[must_use]
    pub const fn hex(name: &'static str, word: u8) -> Self {
        Self::bits(name, word, 0, 31).radix(Radix::Hex)
    }

    /// Low/high split address, hexadecimal.
    #[must_use]
    pub const fn address(name: &'static str, lo: u8, hi: u8, hi_bits: u8, align: u8) -> Self {
        Self::new(
            name,
            FieldKind::Address {
                lo,
                hi,
                hi_bits,
                align,
            },
            Radix::Hex,
        )
    }

    /// 64-bit value from two words, hexadecimal.
    #[must_use]
    pub const fn wide(name: &'static str, word: u8) -> Self {
        Self::new(name, FieldKind::Wide { word }, Radix::Hex)
    }

    /// Register-selecting bit slice.
    #[must_use]
    pub const fn register(name: &'static str, word: u8, lo: u8, hi: u8, space: u32) -> Self {
        Self::new(name, FieldKind::Register { word, lo, hi, space }, Radix::Hex)
    }

    /// Fixed run of whole words.
    #[must_use]
    pub const fn array(name: &'static str, first: u8, count: u8) -> Self {
        Self::new(name, FieldKind::Array { first, count }, Radix::Hex)
    }

    /// Register write run.
    #[must_use]
    pub const fn register_data(first: u8, base: RegisterBase) -> Self {
        Self::new("", FieldKind::RegisterData { first, base }, Radix::Hex)
    }

    /// Register/count pair list.
    #[must_use]
    pub const fn register_pairs(first: u8, space: u32) -> Self {
        Self::new("", FieldKind::RegisterPairs { first, space }, Radix::Hex)
    }

    /// Trailing words.
    #[must_use]
    pub const fn data(name: &'static str, first: u8) -> Self {
        Self::new(name, FieldKind::Data { first }, Radix::Hex)
    }

    /// Replaces the radix.
    #[must_use]
    pub const fn radix(mut self, radix: Radix) -> Self {
        self.radix = radix;
        self
    }

    /// Attaches a symbol table.
    #[must_use]
    pub const fn symbols(mut self, table: SymbolTable) -> Self {
        self.symbols = Some(table);
        self
    }

    /// Emits only when bits `lo..=hi` of `word` equal `value`.
    #[must_use]
    pub const fn when(mut self, word: u8, lo: u8, hi: u8, value: u32) -> Self {
        self.when = Some(Condition {
            word,
            lo,
            hi,
            value,
            negate: false,
        });
        self
    }

    /// Emits only when bits `lo..=hi` of `word` differ from `value`.
    #[must_use]
    pub const fn unless(mut self, word: u8, lo: u8, hi: u8, value: u32) -> Self {
        self.when = Some(Condition {
            word,
            lo,
            hi,
            value,
            negate: true,
        });
        self
    }
}

/// Ordered field list of one opcode.
pub type Layout = &'static [FieldSpec];

/// How a table-driven dialect derives a packet's total word count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketLength {
    /// Derived from the command-processor header itself.
    SelfDescribing,
    /// Constant word count.
    Fixed(usize),
    /// `base + scale * header[lo..=hi]`.
    HeaderCount {
        /// Constant part.
        base: usize,
        /// Lowest count bit.
        lo: u8,
        /// Highest count bit.
        hi: u8,
        /// Words per count unit.
        scale: usize,
    },
    /// `base + scale * words[word][lo..=hi]`.
    PayloadCount {
        /// Constant part.
        base: usize,
        /// Word holding the count.
        word: u8,
        /// Lowest count bit.
        lo: u8,
        /// Highest count bit.
        hi: u8,
        /// Words per count unit.
        scale: usize,
    },
}

/// Outcome of evaluating a [`PacketLength`] against available words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedLength {
    /// Total word count, header included.
    Words(usize),
    /// The count lives in a word past the end; at least this many are needed.
    NeedsWords(usize),
}

impl PacketLength {
    /// Evaluates the rule against `words` (header first).
    #[must_use]
    pub fn resolve(self, words: &[u32]) -> ResolvedLength {
        let header = words.first().copied().unwrap_or_default();
        match self {
            Self::SelfDescribing => ResolvedLength::Words(words.len().max(1)),
            Self::Fixed(n) => ResolvedLength::Words(n),
            Self::HeaderCount { base, lo, hi, scale } => {
                ResolvedLength::Words(base + scale * bits(header, lo, hi) as usize)
            }
            Self::PayloadCount {
                base,
                word,
                lo,
                hi,
                scale,
            } => match words.get(usize::from(word)) {
                Some(&w) => ResolvedLength::Words(base + scale * bits(w, lo, hi) as usize),
                None => ResolvedLength::NeedsWords(usize::from(word) + 1),
            },
        }
    }
}

/// Where a referenced buffer's VMID comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmidSource {
    /// Bits of a packet word; zero means the parent's VMID.
    Bits {
        /// Word index.
        word: u8,
        /// Lowest bit.
        lo: u8,
        /// Highest bit.
        hi: u8,
    },
    /// Always the parent's VMID.
    Inherit,
}

/// Declarative description of a pointer to another packet buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceSpec {
    /// Word with the low address bits.
    pub lo: u8,
    /// Word with the high address bits.
    pub hi: u8,
    /// Valid bits of the high word.
    pub hi_bits: u8,
    /// Low bits masked off the low word.
    pub align: u8,
    /// Word with the size in dwords.
    pub size_word: u8,
    /// Lowest size bit.
    pub size_lo: u8,
    /// Highest size bit.
    pub size_hi: u8,
    /// VMID source.
    pub vmid: VmidSource,
}

/// Resolved pointer target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceTarget {
    /// Target VMID.
    pub vmid: u32,
    /// Target address.
    pub address: u64,
    /// Size in bytes.
    pub size: u64,
}

impl ReferenceSpec {
    /// Resolves the target from a complete packet; `None` if words are missing.
    #[must_use]
    pub fn resolve(&self, words: &[u32], parent_vmid: u32) -> Option<ReferenceTarget> {
        let address = split_address(words, self.lo, self.hi, self.hi_bits, self.align)?;
        let size_word = *words.get(usize::from(self.size_word))?;
        let vmid = match self.vmid {
            VmidSource::Bits { word, lo, hi } => {
                let v = bits(*words.get(usize::from(word))?, lo, hi);
                if v == 0 {
                    parent_vmid
                } else {
                    v
                }
            }
            VmidSource::Inherit => parent_vmid,
        };
        Some(ReferenceTarget {
            vmid,
            address,
            size: u64::from(bits(size_word, self.size_lo, self.size_hi)) * 4,
        })
    }
}

/// Joins a low/high word pair into an address.
#[must_use]
pub fn split_address(words: &[u32], lo: u8, hi: u8, hi_bits: u8, align: u8) -> Option<u64> {
    let lo_word = *words.get(usize::from(lo))?;
    let hi_word = *words.get(usize::from(hi))?;
    let hi_part = if hi_bits == 0 {
        0
    } else {
        bits(hi_word, 0, hi_bits - 1)
    };
    let lo_part = if align == 0 {
        lo_word
    } else {
        lo_word & !((1u32 << align) - 1)
    };
    Some((u64::from(hi_part) << 32) | u64::from(lo_part))
}

/// Opcode sub-key that matches any sub-opcode.
pub const ANY_SUB: u32 = u32::MAX;

/// Static description of one opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeEntry {
    /// Primary opcode.
    pub opcode: u32,
    /// Sub-opcode, or [`ANY_SUB`].
    pub sub_opcode: u32,
    /// Mnemonic.
    pub name: &'static str,
    /// Length rule.
    pub length: PacketLength,
    /// Field layout; `None` sends the packet to `unhandled`.
    pub fields: Option<Layout>,
    /// Pointer to another packet buffer.
    pub reference: Option<ReferenceSpec>,
}

impl OpcodeEntry {
    /// Entry with a length rule and no layout.
    #[must_use]
    pub const fn new(opcode: u32, sub_opcode: u32, name: &'static str, length: PacketLength) -> Self {
        Self {
            opcode,
            sub_opcode,
            name,
            length,
            fields: None,
            reference: None,
        }
    }

    /// Attaches a field layout.
    #[must_use]
    pub const fn fields(mut self, layout: Layout) -> Self {
        self.fields = Some(layout);
        self
    }

    /// Attaches a buffer reference.
    #[must_use]
    pub const fn reference(mut self, reference: ReferenceSpec) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Returns true if the entry covers `(opcode, sub_opcode)`.
    #[must_use]
    pub const fn matches(&self, opcode: u32, sub_opcode: u32) -> bool {
        self.opcode == opcode && (self.sub_opcode == ANY_SUB || self.sub_opcode == sub_opcode)
    }
}

/// Finds the entry for `(opcode, sub_opcode)`; exact sub-opcodes win over [`ANY_SUB`].
#[must_use]
pub fn lookup(
    table: &'static [OpcodeEntry],
    opcode: u32,
    sub_opcode: u32,
) -> Option<&'static OpcodeEntry> {
    table
        .iter()
        .find(|entry| entry.opcode == opcode && entry.sub_opcode == sub_opcode)
        .or_else(|| table.iter().find(|entry| entry.matches(opcode, sub_opcode)))
}

/// Opcode table of a stream kind.
#[must_use]
pub const fn table_for(kind: StreamKind) -> &'static [OpcodeEntry] {
    match kind {
        StreamKind::Pm4 | StreamKind::Pm4Lite => pm4::OPCODES,
        StreamKind::Sdma => sdma::SDMA_OPCODES,
        StreamKind::Vpe => sdma::VPE_OPCODES,
        StreamKind::Mes => mes::MES_OPCODES,
        StreamKind::Umsch => mes::UMSCH_OPCODES,
        StreamKind::Vcn => vcn::OPCODES,
    }
}
