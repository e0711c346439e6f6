//! CLI entry point for the `amdpkt` packet stream dumper.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use packet_core::memory::parse_u64;
use packet_core::{
    decode_message_buffer, listing_rows, render_listing, words_from_le_bytes, Cursor,
    DecoderConfig, Device, DeviceFeatures, DiagnosticCounters, GfxLevel, Limit, PacketDecoder,
    Provenance, RecordingPresenter, RegisterTable, RingDump, RingReadError, RingSource,
    RingWindow, SparseMemory, StreamKind,
};
#[cfg(test)]
use tempfile as _;
use tracing_subscriber::EnvFilter;

const USAGE_TEXT: &str = "\
Usage: amdpkt <command> [options]

Commands:
  decode <file> --kind <kind> [options]  List packets of a captured buffer
  ring   <file> [options]                List the live span of a ring dump
  video  <file>                          Decode a video decode message buffer

Options:
  -k, --kind <kind>        pm4, pm4-lite, sdma, vpe, mes, umsch or vcn
                           (ring: guessed from the file name when omitted)
  -a, --addr <address>     GPU virtual address of the first word (default 0)
      --vmid <vmid>        VM space of the buffer (default 0)
      --partition <n>      Memory partition (default 0)
  -n, --limit <packets>    Stop after this many top-level packets
      --no-follow          Do not build or list indirect buffers
      --no-scan            Do not estimate shader program sizes
      --gfx <9|10|11|12>   Graphics generation for shader scans (default 10)
      --mem <addr>:<file>  Map a memory image at an address (repeatable)
      --regs <file>        Register names, one `name address` per line
      --window <start>:<end>
                           Ring word window instead of the read/write pointers
  -h, --help               Show this help message

Examples:
  amdpkt decode ib.bin --kind pm4 --addr 0x400000 --vmid 3
  amdpkt ring sdma0.bin --mem 0x100000:vram.bin
  amdpkt video msg.bin
";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Decode(StreamArgs),
    Ring(StreamArgs),
    Video(VideoArgs),
}

#[derive(Debug, PartialEq, Eq)]
struct StreamArgs {
    input: PathBuf,
    kind: Option<StreamKind>,
    address: u64,
    vmid: u32,
    partition: u32,
    limit: Limit,
    follow: bool,
    scan: bool,
    gfx: GfxLevel,
    memory: Vec<(u64, PathBuf)>,
    registers: Option<PathBuf>,
    window: RingWindow,
}

#[derive(Debug, PartialEq, Eq)]
struct VideoArgs {
    input: PathBuf,
}

#[derive(Debug)]
enum ParseResult {
    Command(Command),
    Help,
}

fn parse_args(mut args: impl Iterator<Item = OsString>) -> Result<ParseResult, String> {
    let first = args.next().ok_or_else(|| "missing command".to_string())?;

    if first == "--help" || first == "-h" {
        return Ok(ParseResult::Help);
    }

    let command_str = first.to_string_lossy().to_string();

    match command_str.as_str() {
        "decode" => {
            let parsed = parse_stream_args(args, false)?;
            if parsed.kind.is_none() {
                return Err("decode needs --kind".to_string());
            }
            Ok(ParseResult::Command(Command::Decode(parsed)))
        }
        "ring" => parse_stream_args(args, true)
            .map(Command::Ring)
            .map(ParseResult::Command),
        "video" => parse_video_args(args)
            .map(Command::Video)
            .map(ParseResult::Command),
        other => Err(format!("unknown command: {other}")),
    }
}

fn number(flag: &str, value: Option<OsString>) -> Result<u64, String> {
    let value = value.ok_or_else(|| format!("missing value for {flag}"))?;
    let text = value.to_string_lossy();
    parse_u64(&text).ok_or_else(|| format!("invalid number for {flag}: {text}"))
}

fn small_number(flag: &str, value: Option<OsString>) -> Result<u32, String> {
    let value = number(flag, value)?;
    u32::try_from(value).map_err(|_| format!("{flag} out of range: {value}"))
}

fn parse_kind(value: Option<OsString>) -> Result<StreamKind, String> {
    let value = value.ok_or_else(|| "missing value for --kind".to_string())?;
    let text = value.to_string_lossy();
    StreamKind::from_name(&text).ok_or_else(|| format!("unknown stream kind: {text}"))
}

fn parse_gfx(value: Option<OsString>) -> Result<GfxLevel, String> {
    match number("--gfx", value)? {
        9 => Ok(GfxLevel::Gfx9),
        10 => Ok(GfxLevel::Gfx10),
        11 => Ok(GfxLevel::Gfx11),
        12 => Ok(GfxLevel::Gfx12),
        other => Err(format!("unsupported graphics generation: {other}")),
    }
}

fn parse_mapping(value: Option<OsString>) -> Result<(u64, PathBuf), String> {
    let value = value.ok_or_else(|| "missing value for --mem".to_string())?;
    let text = value.to_string_lossy();
    let (address, path) = text
        .split_once(':')
        .ok_or_else(|| format!("--mem expects <addr>:<file>, got {text}"))?;
    let address = parse_u64(address).ok_or_else(|| format!("invalid --mem address: {address}"))?;
    Ok((address, PathBuf::from(path)))
}

fn parse_window(value: Option<OsString>) -> Result<RingWindow, String> {
    let value = value.ok_or_else(|| "missing value for --window".to_string())?;
    let text = value.to_string_lossy();
    let (start, end) = text
        .split_once(':')
        .ok_or_else(|| format!("--window expects <start>:<end>, got {text}"))?;
    let word = |part: &str| {
        parse_u64(part)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| format!("invalid --window bound: {part}"))
    };
    Ok(RingWindow::Span {
        start: word(start)?,
        end: word(end)?,
    })
}

#[allow(clippy::while_let_on_iterator)]
fn parse_stream_args(
    mut args: impl Iterator<Item = OsString>,
    ring: bool,
) -> Result<StreamArgs, String> {
    let mut input: Option<PathBuf> = None;
    let mut parsed = StreamArgs {
        input: PathBuf::new(),
        kind: None,
        address: 0,
        vmid: 0,
        partition: 0,
        limit: Limit::All,
        follow: true,
        scan: true,
        gfx: GfxLevel::default(),
        memory: Vec::new(),
        registers: None,
        window: RingWindow::Live,
    };

    while let Some(arg) = args.next() {
        let flag = arg.to_string_lossy().to_string();
        match flag.as_str() {
            "--help" | "-h" => return Err(USAGE_TEXT.to_string()),
            "--kind" | "-k" => parsed.kind = Some(parse_kind(args.next())?),
            "--addr" | "-a" => parsed.address = number(&flag, args.next())?,
            "--vmid" => parsed.vmid = small_number(&flag, args.next())?,
            "--partition" => parsed.partition = small_number(&flag, args.next())?,
            "--limit" | "-n" => {
                let packets = number(&flag, args.next())?;
                let packets = usize::try_from(packets)
                    .map_err(|_| format!("{flag} out of range: {packets}"))?;
                parsed.limit = Limit::Packets(packets);
            }
            "--no-follow" => parsed.follow = false,
            "--no-scan" => parsed.scan = false,
            "--gfx" => parsed.gfx = parse_gfx(args.next())?,
            "--mem" => parsed.memory.push(parse_mapping(args.next())?),
            "--regs" => {
                let path = args
                    .next()
                    .ok_or_else(|| "missing value for --regs".to_string())?;
                parsed.registers = Some(PathBuf::from(path));
            }
            "--window" if ring => parsed.window = parse_window(args.next())?,
            _ if flag.starts_with('-') => return Err(format!("unknown option: {flag}")),
            _ => {
                if input.is_some() {
                    return Err("multiple input paths provided".to_string());
                }
                input = Some(PathBuf::from(arg));
            }
        }
    }

    parsed.input = input.ok_or_else(|| "missing input path".to_string())?;
    Ok(parsed)
}

fn parse_video_args(args: impl Iterator<Item = OsString>) -> Result<VideoArgs, String> {
    let mut input: Option<PathBuf> = None;

    for arg in args {
        if arg == "--help" || arg == "-h" {
            return Err(USAGE_TEXT.to_string());
        }

        if arg.to_string_lossy().starts_with('-') {
            return Err(format!("unknown option: {}", arg.to_string_lossy()));
        }

        if input.is_some() {
            return Err("multiple input paths provided".to_string());
        }
        input = Some(PathBuf::from(arg));
    }

    let input = input.ok_or_else(|| "missing input path".to_string())?;
    Ok(VideoArgs { input })
}

fn read_input(path: &Path) -> Result<Vec<u8>, i32> {
    fs::read(path).map_err(|e| {
        eprintln!("error: failed to read {}: {e}", path.display());
        1
    })
}

/// A ring dump file; its stem is the ring name.
struct RingFile<'p> {
    path: &'p Path,
    base_address: u64,
    vmid: u32,
}

impl RingFile<'_> {
    fn name(&self) -> String {
        self.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

impl RingSource for RingFile<'_> {
    fn read_ring(&mut self, name: &str) -> Result<RingDump, RingReadError> {
        if name != self.name() {
            return Err(RingReadError::UnknownRing(name.to_string()));
        }
        let bytes = fs::read(self.path).map_err(|e| RingReadError::Device(e.to_string()))?;
        Ok(RingDump {
            words: words_from_le_bytes(&bytes),
            base_address: self.base_address,
            vmid: self.vmid,
        })
    }
}

fn load_memory(mappings: &[(u64, PathBuf)]) -> Result<SparseMemory, i32> {
    let mut memory = SparseMemory::new();
    for (address, path) in mappings {
        let bytes = read_input(path)?;
        tracing::debug!(path = %path.display(), address, bytes = bytes.len(), "memory image mapped");
        memory.map_any(*address, bytes);
    }
    Ok(memory)
}

fn load_registers(path: Option<&Path>) -> Result<RegisterTable, i32> {
    let Some(path) = path else {
        return Ok(RegisterTable::new());
    };
    let text = fs::read_to_string(path).map_err(|e| {
        eprintln!("error: failed to read {}: {e}", path.display());
        1
    })?;
    let (table, skipped) = RegisterTable::parse(&text);
    if skipped > 0 {
        eprintln!("warning: skipped {skipped} malformed lines in {}", path.display());
    }
    Ok(table)
}

fn report_diagnostics(diagnostics: &DiagnosticCounters) {
    for diagnostic in &diagnostics.records {
        eprintln!("warning: {}: {}", diagnostic.kind.label(), diagnostic.message);
    }
}

fn run_stream(args: &StreamArgs, ring: bool) -> Result<(), i32> {
    let mut memory = load_memory(&args.memory)?;
    let registers = load_registers(args.registers.as_deref())?;
    let mut diagnostics = DiagnosticCounters::new();
    let config = DecoderConfig {
        follow_references: args.follow,
        scan_shaders: args.scan,
        features: DeviceFeatures {
            gfx_level: args.gfx,
            ..DeviceFeatures::default()
        },
        ..DecoderConfig::default()
    };

    let (text, remaining) = {
        let device = Device::new(&mut memory, &registers, &mut diagnostics).with_config(config);
        let presenter = RecordingPresenter::new();
        let built = if ring {
            let mut source = RingFile {
                path: &args.input,
                base_address: args.address,
                vmid: args.vmid,
            };
            let name = source.name();
            PacketDecoder::from_ring(
                &mut source,
                &name,
                args.kind,
                args.window,
                args.partition,
                device,
                presenter,
            )
        } else {
            let bytes = read_input(&args.input)?;
            let provenance = Provenance {
                vmid: args.vmid,
                address: args.address,
                partition: args.partition,
            };
            let Some(kind) = args.kind else {
                eprintln!("error: decode needs --kind");
                return Err(1);
            };
            PacketDecoder::from_words(kind, &words_from_le_bytes(&bytes), provenance, device, presenter)
        };
        let mut decoder = match built {
            Ok(decoder) => decoder,
            Err(e) => {
                eprintln!("error: {e}");
                return Err(1);
            }
        };
        let cursor = decoder.decode(args.limit, args.follow);
        let total = decoder.stream().map_or(0, |stream| stream.len());
        let remaining = match cursor {
            Cursor::Packet(position) => total - position,
            Cursor::Start => total,
            Cursor::End => 0,
        };
        (render_listing(&listing_rows(decoder.presenter())), remaining)
    };

    print!("{text}");
    if remaining > 0 {
        println!("# {remaining} more packets");
    }
    report_diagnostics(&diagnostics);
    Ok(())
}

fn run_video(args: &VideoArgs) -> Result<(), i32> {
    let bytes = read_input(&args.input)?;
    let mut diagnostics = DiagnosticCounters::new();
    let decoded = decode_message_buffer(&bytes, &mut diagnostics);
    print!("{}", decoded.render_text());
    report_diagnostics(&diagnostics);
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let exit_code = match parse_args(env::args_os().skip(1)) {
        Ok(ParseResult::Help) => {
            println!("{USAGE_TEXT}");
            0
        }
        Ok(ParseResult::Command(Command::Decode(args))) => match run_stream(&args, false) {
            Ok(()) => 0,
            Err(code) => code,
        },
        Ok(ParseResult::Command(Command::Ring(args))) => match run_stream(&args, true) {
            Ok(()) => 0,
            Err(code) => code,
        },
        Ok(ParseResult::Command(Command::Video(args))) => match run_video(&args) {
            Ok(()) => 0,
            Err(code) => code,
        },
        Err(error) => {
            if error.starts_with("Usage:") {
                println!("{error}");
            } else {
                eprintln!("error: {error}");
                eprintln!("{USAGE_TEXT}");
            }
            1
        }
    };

    std::process::exit(exit_code);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn os(args: &[&str]) -> impl Iterator<Item = OsString> {
        args.iter().map(OsString::from).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn parses_decode_command() {
        let result = parse_args(os(&[
            "decode", "ib.bin", "--kind", "sdma", "--addr", "0x4000", "--vmid", "3", "-n", "2",
            "--no-follow", "--mem", "0x100:vram.bin",
        ]))
        .expect("valid decode args should parse");

        let ParseResult::Command(Command::Decode(args)) = result else {
            panic!("expected decode command");
        };
        assert_eq!(args.input, PathBuf::from("ib.bin"));
        assert_eq!(args.kind, Some(StreamKind::Sdma));
        assert_eq!(args.address, 0x4000);
        assert_eq!(args.vmid, 3);
        assert_eq!(args.limit, Limit::Packets(2));
        assert!(!args.follow);
        assert_eq!(args.memory, vec![(0x100, PathBuf::from("vram.bin"))]);
    }

    #[test]
    fn decode_requires_kind() {
        let error = parse_args(os(&["decode", "ib.bin"])).expect_err("kind is required");
        assert!(error.contains("--kind"));
    }

    #[test]
    fn ring_accepts_window_and_guesses_kind_later() {
        let args = parse_stream_args(os(&["sdma0.bin", "--window", "4:2"]), true)
            .expect("ring args should parse");
        assert_eq!(args.kind, None);
        assert_eq!(args.window, RingWindow::Span { start: 4, end: 2 });
    }

    #[test]
    fn decode_rejects_window() {
        let error = parse_stream_args(os(&["ib.bin", "--window", "0:1"]), false)
            .expect_err("window is ring-only");
        assert!(error.contains("unknown option"));
    }

    #[test]
    fn rejects_unknown_kind() {
        let error = parse_stream_args(os(&["ib.bin", "--kind", "gcn"]), false)
            .expect_err("unknown kind");
        assert!(error.contains("unknown stream kind"));
    }

    #[test]
    fn parses_gfx_level() {
        let args = parse_stream_args(os(&["ib.bin", "--gfx", "9", "--no-scan"]), false)
            .expect("gfx parses");
        assert_eq!(args.gfx, GfxLevel::Gfx9);
        assert!(!args.scan);
        assert!(parse_stream_args(os(&["ib.bin", "--gfx", "8"]), false).is_err());
    }

    #[test]
    fn parses_help_flag() {
        let result = parse_args(os(&["--help"])).expect("help should parse without error");
        assert!(matches!(result, ParseResult::Help));
    }

    #[test]
    fn rejects_unknown_command() {
        let error = parse_args(os(&["unknown"])).expect_err("unknown command should fail parse");
        assert!(error.contains("unknown command"));
    }

    #[test]
    fn video_rejects_options() {
        let error =
            parse_video_args(os(&["--kind"])).expect_err("video should reject options");
        assert!(error.contains("unknown option"));
    }

    #[test]
    fn ring_file_is_named_by_its_stem() {
        let path = PathBuf::from("dumps/sdma0.bin");
        let mut ring = RingFile {
            path: &path,
            base_address: 0,
            vmid: 0,
        };
        assert_eq!(ring.name(), "sdma0");
        assert_eq!(
            ring.read_ring("gfx"),
            Err(RingReadError::UnknownRing("gfx".to_string()))
        );
    }
}
