use packet_core::{
    decode_message_buffer, linearize_ring, listing_rows, Cursor, DecoderConfig, Device, Diagnostic,
    DiagnosticCounters, Limit, ListingRow, PacketDecoder, Provenance, RecordingPresenter,
    RegisterTable, RingDump, RingWindow, SparseMemory, StreamKind,
};
use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

macro_rules! console_log {
    ($($t:tt)*) => (web_sys::console::log_1(&format!($($t)*).into()))
}

/// JS-compatible result of one decode call.
#[derive(Debug, Serialize, Deserialize)]
pub struct WasmListing {
    pub rows: Vec<ListingRow>,
    pub diagnostics: Vec<Diagnostic>,
    /// Top-level packets left undecoded by the limit.
    pub remaining: usize,
}

/// Builds and lists `words` against the given memory image and names.
fn list_words(
    memory: &mut SparseMemory,
    registers: &RegisterTable,
    config: &DecoderConfig,
    kind: StreamKind,
    words: &[u32],
    provenance: Provenance,
    limit: Limit,
) -> Result<WasmListing, String> {
    let mut diagnostics = DiagnosticCounters::new();
    let (rows, remaining) = {
        let device =
            Device::new(memory, registers, &mut diagnostics).with_config(config.clone());
        let mut decoder = PacketDecoder::from_words(
            kind,
            words,
            provenance,
            device,
            RecordingPresenter::new(),
        )
        .map_err(|e| e.to_string())?;
        let cursor = decoder.decode(limit, config.follow_references);
        let total = decoder.stream().map_or(0, |stream| stream.len());
        let remaining = match cursor {
            Cursor::Start => total,
            Cursor::Packet(position) => total - position,
            Cursor::End => 0,
        };
        (listing_rows(decoder.presenter()), remaining)
    };
    Ok(WasmListing {
        rows,
        diagnostics: diagnostics.records,
        remaining,
    })
}

fn parse_kind(kind: &str) -> Result<StreamKind, JsValue> {
    StreamKind::from_name(kind)
        .ok_or_else(|| JsValue::from_str(&format!("unknown stream kind: {kind}")))
}

#[wasm_bindgen]
pub struct WasmDecoder {
    memory: SparseMemory,
    registers: RegisterTable,
    config: DecoderConfig,
}

#[wasm_bindgen]
impl WasmDecoder {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        console_error_panic_hook::set_once();
        Self {
            memory: SparseMemory::new(),
            registers: RegisterTable::new(),
            config: DecoderConfig::default(),
        }
    }

    /// Maps a memory image at `address`, visible to every VMID.
    pub fn map_memory(&mut self, address: u64, bytes: &[u8]) {
        console_log!("Mapped {} bytes at {:#x}", bytes.len(), address);
        self.memory.map_any(address, bytes.to_vec());
    }

    /// Loads `name address` register lines; returns the number skipped.
    pub fn load_registers(&mut self, text: &str) -> usize {
        let (table, skipped) = RegisterTable::parse(text);
        self.registers = table;
        skipped
    }

    pub fn set_follow_references(&mut self, follow: bool) {
        self.config.follow_references = follow;
    }

    pub fn set_scan_shaders(&mut self, scan: bool) {
        self.config.scan_shaders = scan;
    }

    /// Decodes `words` as a stream of `kind` and returns its listing rows.
    pub fn decode(
        &mut self,
        kind: &str,
        words: &[u32],
        address: u64,
        vmid: u32,
        limit: Option<u32>,
    ) -> Result<JsValue, JsValue> {
        let kind = parse_kind(kind)?;
        let limit = limit.map_or(Limit::All, |n| Limit::Packets(n as usize));
        let provenance = Provenance {
            vmid,
            address,
            partition: 0,
        };
        let listing = list_words(
            &mut self.memory,
            &self.registers,
            &self.config,
            kind,
            words,
            provenance,
            limit,
        )
        .map_err(|e| JsValue::from_str(&e))?;
        Ok(serde_wasm_bindgen::to_value(&listing)?)
    }

    /// Decodes a video decode message buffer into records and dumps.
    pub fn decode_video(&self, bytes: &[u8]) -> Result<JsValue, JsValue> {
        let mut diagnostics = DiagnosticCounters::new();
        let decoded = decode_message_buffer(bytes, &mut diagnostics);
        Ok(serde_wasm_bindgen::to_value(&decoded)?)
    }
}

impl Default for WasmDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the live span of a ring dump (three pointer words, then the body).
#[wasm_bindgen]
pub fn ring_live_words(dump: &[u32]) -> Result<js_sys::Uint32Array, JsValue> {
    let dump = RingDump {
        words: dump.to_vec(),
        base_address: 0,
        vmid: 0,
    };
    let ring = linearize_ring(&dump, RingWindow::Live).map_err(|e| JsValue::from_str(&e.to_string()))?;
    Ok(js_sys::Uint32Array::from(ring.words.as_slice()))
}

/// Names accepted by [`WasmDecoder::decode`].
#[wasm_bindgen]
pub fn stream_kinds() -> Vec<JsValue> {
    StreamKind::ALL
        .iter()
        .map(|kind| JsValue::from_str(kind.name()))
        .collect()
}
