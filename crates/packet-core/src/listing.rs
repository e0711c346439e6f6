//! Row-per-packet listing projected from recorded presentation events.

use std::fmt::Write as _;

use crate::api::StreamKind;
use crate::present::{PresentEvent, RecordingPresenter};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Raw words shown per row before the rest is elided.
pub const RAW_WORDS_SHOWN: usize = 4;

/// A single listed packet.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ListingRow {
    /// Nesting depth of the buffer the packet is in.
    pub depth: usize,
    /// Stream kind of that buffer.
    pub kind: StreamKind,
    /// Byte address of the header word.
    pub address: u64,
    /// Virtual memory space of the buffer.
    pub vmid: u32,
    /// Every word of the packet.
    pub words: Vec<u32>,
    /// Mnemonic (e.g. `SET_SH_REG`, `WRITE_LINEAR`).
    pub name: String,
    /// Rendered `name=value` fields in wire order.
    pub fields: Vec<String>,
    /// Discovered programs and data blocks.
    pub notes: Vec<String>,
    /// The packet had no field layout.
    pub unhandled: bool,
}

impl ListingRow {
    /// Fields joined by spaces.
    #[must_use]
    pub fn summary(&self) -> String {
        self.fields.join(" ")
    }
}

/// Folds a recorded event sequence into one row per packet.
///
/// Fields, programs and data blocks attach to the most recent packet.
#[must_use]
pub fn listing_rows(recording: &RecordingPresenter) -> Vec<ListingRow> {
    let mut rows: Vec<ListingRow> = Vec::new();
    let mut depth = 0;
    let mut open: Option<usize> = None;
    for event in &recording.events {
        match event {
            PresentEvent::BeginBuffer(info) => {
                depth = info.depth;
                open = None;
            }
            PresentEvent::BeginPacket(packet) => {
                rows.push(ListingRow {
                    depth,
                    kind: packet.kind,
                    address: packet.address,
                    vmid: packet.vmid,
                    words: packet.words.clone(),
                    name: packet.name.clone(),
                    fields: Vec::new(),
                    notes: Vec::new(),
                    unhandled: false,
                });
                open = Some(rows.len() - 1);
            }
            PresentEvent::Field(field) => {
                if let Some(row) = open.and_then(|i| rows.get_mut(i)) {
                    row.fields.push(format!("{}={}", field.name, field.render()));
                }
            }
            PresentEvent::Program(program) => {
                if let Some(row) = open.and_then(|i| rows.get_mut(i)) {
                    row.notes.push(format!(
                        "{} program vmid {} @0x{:x} size {}",
                        program.stage.name(),
                        program.vmid,
                        program.address,
                        program.size
                    ));
                }
            }
            PresentEvent::DataBlock(block) => {
                if let Some(row) = open.and_then(|i| rows.get_mut(i)) {
                    row.notes.push(format!(
                        "data block vmid {} @0x{:x} {} bytes",
                        block.vmid,
                        block.address,
                        block.bytes.len()
                    ));
                }
            }
            PresentEvent::Unhandled(_) => {
                if let Some(row) = open.and_then(|i| rows.get_mut(i)) {
                    row.unhandled = true;
                }
            }
            PresentEvent::EndBuffer(info) => {
                // Packets after a nested buffer belong to the parent again.
                depth = info.depth.saturating_sub(1);
                open = rows.iter().rposition(|row| row.depth == depth);
            }
        }
    }
    rows
}

/// Renders rows as indented text, one packet per line plus note lines.
#[must_use]
pub fn render_listing(rows: &[ListingRow]) -> String {
    let mut text = String::new();
    for row in rows {
        let indent = "  ".repeat(row.depth);
        let mut raw = row
            .words
            .iter()
            .take(RAW_WORDS_SHOWN)
            .map(|word| format!("{word:08x}"))
            .collect::<Vec<_>>()
            .join(" ");
        if row.words.len() > RAW_WORDS_SHOWN {
            raw.push_str(" ..");
        }
        let _ = write!(text, "{indent}{}:{:012x} [{raw}] {}", row.vmid, row.address, row.name);
        if row.unhandled {
            text.push_str(" (unhandled)");
        } else if !row.fields.is_empty() {
            let _ = write!(text, " {}", row.summary());
        }
        text.push('\n');
        for note in &row.notes {
            let _ = writeln!(text, "{indent}    # {note}");
        }
    }
    text
}
