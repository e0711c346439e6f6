//! Layout interpreter: turns a packet's words into `field` callbacks.

use std::borrow::Cow;

use crate::api::{register_label, RegisterNames, RingWrap};
use crate::encoding::{bits, split_address, symbol, FieldKind, FieldSpec, Layout, RegisterBase};
use crate::present::{Field, Presenter, Radix};

const WORD_BYTES: u64 = 4;

/// Byte addresses of a run of words, which may continue at a ring start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WordAddresses {
    base: u64,
    wrap: Option<RingWrap>,
}

impl WordAddresses {
    /// Words laid out contiguously from `base`.
    #[must_use]
    pub const fn linear(base: u64) -> Self {
        Self { base, wrap: None }
    }

    /// Words from `base` that continue at `wrap.address` from `wrap.at_word`.
    #[must_use]
    pub const fn wrapped(base: u64, wrap: Option<RingWrap>) -> Self {
        Self { base, wrap }
    }

    /// Address of word `index`.
    #[must_use]
    pub fn word(&self, index: usize) -> u64 {
        match self.wrap {
            Some(wrap) if index >= wrap.at_word => offset(wrap.address, index - wrap.at_word),
            _ => offset(self.base, index),
        }
    }

    /// The same run, starting `words` words later.
    #[must_use]
    pub fn skip(&self, words: usize) -> Self {
        match self.wrap {
            Some(wrap) if words >= wrap.at_word => {
                Self::linear(offset(wrap.address, words - wrap.at_word))
            }
            Some(wrap) => Self::wrapped(
                offset(self.base, words),
                Some(RingWrap {
                    at_word: wrap.at_word - words,
                    address: wrap.address,
                }),
            ),
            None => Self::linear(offset(self.base, words)),
        }
    }
}

fn offset(base: u64, word: usize) -> u64 {
    base.wrapping_add(word as u64 * WORD_BYTES)
}

/// Emits every field of `layout` present in `words`.
///
/// `base` gives the byte address of each word. Fields whose words lie past
/// the end of the packet, or whose condition does not hold, are skipped.
pub fn emit_fields<P: Presenter + ?Sized>(
    layout: Layout,
    words: &[u32],
    base: WordAddresses,
    names: &dyn RegisterNames,
    presenter: &mut P,
) {
    for spec in layout {
        if spec.kind.min_words() > words.len() {
            continue;
        }
        if spec.when.is_some_and(|condition| !condition.holds(words)) {
            continue;
        }
        emit(spec, words, base, names, presenter);
    }
}

fn at(base: WordAddresses, word: usize) -> u64 {
    base.word(word)
}

fn scalar(spec: &FieldSpec, address: u64, value: u64) -> Field {
    let symbol = spec
        .symbols
        .and_then(|table| u32::try_from(value).ok().and_then(|v| symbol(table, v)))
        .map(str::to_string);
    Field {
        address,
        name: Cow::Borrowed(spec.name),
        value,
        symbol,
        radix: spec.radix,
    }
}

fn sign_extend(value: u32, width: u8) -> u64 {
    let shift = 64 - u32::from(width);
    (((u64::from(value)) << shift) as i64 >> shift) as u64
}

fn indexed(name: &'static str, index: usize) -> Cow<'static, str> {
    Cow::Owned(format!("{name}[{index}]"))
}

fn emit<P: Presenter + ?Sized>(
    spec: &FieldSpec,
    words: &[u32],
    base: WordAddresses,
    names: &dyn RegisterNames,
    presenter: &mut P,
) {
    match spec.kind {
        FieldKind::Bits { word, lo, hi } => {
            let raw = bits(words[usize::from(word)], lo, hi);
            let value = if spec.radix == Radix::Signed {
                sign_extend(raw, hi - lo + 1)
            } else {
                u64::from(raw)
            };
            presenter.field(scalar(spec, at(base, word.into()), value));
        }
        FieldKind::Address {
            lo,
            hi,
            hi_bits,
            align,
        } => {
            if let Some(value) = split_address(words, lo, hi, hi_bits, align) {
                presenter.field(scalar(spec, at(base, lo.into()), value));
            }
        }
        FieldKind::Wide { word } => {
            let w = usize::from(word);
            let value = u64::from(words[w]) | (u64::from(words[w + 1]) << 32);
            presenter.field(scalar(spec, at(base, w), value));
        }
        FieldKind::Register {
            word,
            lo,
            hi,
            space,
        } => {
            let register = space + bits(words[usize::from(word)], lo, hi);
            presenter.field(Field {
                address: at(base, word.into()),
                name: Cow::Borrowed(spec.name),
                value: u64::from(register),
                symbol: Some(register_label(names, register)),
                radix: Radix::Hex,
            });
        }
        FieldKind::Array { first, count } => {
            let first = usize::from(first);
            for (i, &value) in words[first..first + usize::from(count)].iter().enumerate() {
                presenter.field(Field {
                    name: indexed(spec.name, i),
                    ..scalar(spec, at(base, first + i), u64::from(value))
                });
            }
        }
        FieldKind::RegisterData { first, base: origin } => {
            let first_register = match origin {
                RegisterBase::Header => bits(words[0], 0, 15),
                RegisterBase::Word {
                    word,
                    lo,
                    hi,
                    space,
                } => space + bits(words[usize::from(word)], lo, hi),
            };
            let first = usize::from(first);
            for (i, &value) in words[first..].iter().enumerate() {
                let register = first_register.wrapping_add(i as u32);
                presenter.field(Field {
                    address: at(base, first + i),
                    name: Cow::Owned(register_label(names, register)),
                    value: u64::from(value),
                    symbol: None,
                    radix: Radix::Hex,
                });
            }
        }
        FieldKind::RegisterPairs { first, space } => {
            let first = usize::from(first);
            for (i, pair) in words[first..].chunks_exact(2).enumerate() {
                let word = first + 2 * i;
                let register = space + bits(pair[0], 0, 15);
                presenter.field(Field {
                    address: at(base, word),
                    name: Cow::Borrowed("reg_offset"),
                    value: u64::from(register),
                    symbol: Some(register_label(names, register)),
                    radix: Radix::Hex,
                });
                presenter.field(Field {
                    address: at(base, word + 1),
                    name: Cow::Borrowed("num_dwords"),
                    value: u64::from(bits(pair[1], 0, 13)),
                    symbol: None,
                    radix: Radix::Decimal,
                });
            }
        }
        FieldKind::Data { first } => {
            let first = usize::from(first);
            for (i, &value) in words[first..].iter().enumerate() {
                presenter.field(Field {
                    name: indexed(spec.name, i),
                    ..scalar(spec, at(base, first + i), u64::from(value))
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::NoRegisterNames;
    use crate::encoding::FieldSpec as F;
    use crate::memory::RegisterTable;
    use crate::present::RecordingPresenter;

    const SIGNED: &[F] = &[F::bits("delta", 1, 0, 7).radix(Radix::Signed)];

    #[test]
    fn signed_fields_are_sign_extended() {
        let mut out = RecordingPresenter::new();
        emit_fields(SIGNED, &[0, 0xFE], WordAddresses::linear(0), &NoRegisterNames, &mut out);
        let field = out.field("delta").expect("delta");
        assert_eq!(field.value as i64, -2);
        assert_eq!(field.render(), "-2");
    }

    #[test]
    fn missing_words_skip_fields() {
        const LAYOUT: &[F] = &[F::hex("a", 1), F::hex("b", 3)];
        let mut out = RecordingPresenter::new();
        emit_fields(LAYOUT, &[0, 1, 2], WordAddresses::linear(0x100), &NoRegisterNames, &mut out);
        let names: Vec<_> = out.fields().map(|f| f.name.to_string()).collect();
        assert_eq!(names, vec!["a"]);
        assert_eq!(out.field("a").map(|f| f.address), Some(0x104));
    }

    #[test]
    fn register_data_names_consecutive_registers() {
        const LAYOUT: &[F] = &[F::register_data(1, RegisterBase::Header)];
        let mut names = RegisterTable::new();
        names.insert(0x2C00, "mmSPI_SHADER_PGM_LO_PS");
        let mut out = RecordingPresenter::new();
        emit_fields(LAYOUT, &[0x0001_2C00, 7, 9], WordAddresses::linear(0), &names, &mut out);
        let fields: Vec<_> = out.fields().collect();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].name, "mmSPI_SHADER_PGM_LO_PS");
        assert_eq!(fields[1].name, "0x02c01");
        assert_eq!(fields[1].address, 8);
        assert_eq!(fields[1].value, 9);
    }

    #[test]
    fn conditional_fields_follow_selector() {
        const LAYOUT: &[F] = &[
            F::hex("register", 2).when(1, 0, 0, 0),
            F::address("address", 2, 3, 16, 2).when(1, 0, 0, 1),
        ];
        let mut out = RecordingPresenter::new();
        emit_fields(LAYOUT, &[0, 1, 0x1003, 0x2], WordAddresses::linear(0), &NoRegisterNames, &mut out);
        assert!(out.field("register").is_none());
        assert_eq!(out.field("address").map(|f| f.value), Some(0x2_0000_1000));
    }

    #[test]
    fn wrapped_words_continue_at_the_ring_start() {
        let wrap = RingWrap {
            at_word: 2,
            address: 0x4000,
        };
        let addresses = WordAddresses::wrapped(0x4038, Some(wrap));
        assert_eq!(addresses.word(1), 0x403C);
        assert_eq!(addresses.word(2), 0x4000);
        assert_eq!(addresses.skip(1).word(1), 0x4000);
        assert_eq!(addresses.skip(3), WordAddresses::linear(0x4004));
    }

    #[test]
    fn addresses_near_the_top_wrap_instead_of_overflowing() {
        const LAYOUT: &[F] = &[F::hex("a", 1)];
        let mut out = RecordingPresenter::new();
        let base = WordAddresses::linear(u64::MAX - 1);
        emit_fields(LAYOUT, &[0, 5], base, &NoRegisterNames, &mut out);
        assert_eq!(out.field("a").map(|f| f.address), Some(2));
    }
}
