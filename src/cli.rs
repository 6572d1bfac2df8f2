// Command-line front end for the delta-chain decoder.
//
// Subcommands apply delta files to a base, replay a recorded channel log,
// classify payloads and dump VCDIFF headers.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};
use serde::Deserialize;

use crate::chain::{BasePayload, ChannelDecoder, ChannelMessage, VcdiffDecoder};
use crate::engine::{EngineOptions, VcdiffEngine};
use crate::vcdiff::decoder::DEFAULT_MAX_OUTPUT_LEN;
use crate::vcdiff::header::{
    self, DeltaIndicator, HARD_MAX_WINSIZE, HeaderIndicator, WindowIndicator,
};

const BUF_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// Stateful VCDIFF delta-chain decoder.
#[derive(Parser, Debug)]
#[command(
    name = "deltachain",
    version,
    about = "Apply chains of VCDIFF deltas",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Force overwrite existing output files.
    #[arg(short = 'f', long, global = true)]
    force: bool,

    /// Quiet mode (suppress non-error output).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (use multiple times for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Output stats as JSON to stderr.
    #[arg(long = "json", global = true)]
    json_output: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Apply delta files, in order, to a base file.
    Apply(ApplyArgs),
    /// Replay a JSON Lines channel log through a channel decoder.
    Replay(ReplayArgs),
    /// Report which files carry the VCDIFF magic.
    Sniff(SniffArgs),
    /// Print the file and window headers of a delta.
    Header(HeaderArgs),
    /// Print build/configuration details.
    Config,
}

#[derive(Args, Debug)]
struct ApplyArgs {
    /// Base document.
    #[arg(long, short = 'b', value_hint = ValueHint::FilePath)]
    base: PathBuf,

    /// Base and delta files hold base64 text.
    #[arg(long)]
    base64: bool,

    /// Output file (default: stdout).
    #[arg(long, short = 'o', value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,

    /// Skip Adler-32 verification of delta windows.
    #[arg(long = "no-checksum")]
    no_checksum: bool,

    /// Delta files, oldest first.
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    deltas: Vec<PathBuf>,
}

#[derive(Args, Debug)]
struct ReplayArgs {
    /// Stop at the first message that fails to decode.
    #[arg(long)]
    strict: bool,

    /// Output file (default: stdout).
    #[arg(long, short = 'o', value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,

    /// Channel log (default: stdin).
    #[arg(value_hint = ValueHint::FilePath)]
    input: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct SniffArgs {
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    files: Vec<PathBuf>,
}

#[derive(Args, Debug)]
struct HeaderArgs {
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,
}

// ---------------------------------------------------------------------------
// Resolved options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Apply,
    Replay,
    Sniff,
    Header,
    Config,
}

#[derive(Debug)]
struct Options {
    command: Command,
    force: bool,
    quiet: bool,
    verbose: u8,
    json_output: bool,
    base_file: Option<PathBuf>,
    base64: bool,
    no_checksum: bool,
    strict: bool,
    input_files: Vec<PathBuf>,
    output_file: Option<PathBuf>,
}

fn resolve_options(cli: Cli) -> Options {
    let mut opts = Options {
        command: Command::Config,
        force: cli.force,
        quiet: cli.quiet,
        verbose: cli.verbose.min(2),
        json_output: cli.json_output,
        base_file: None,
        base64: false,
        no_checksum: false,
        strict: false,
        input_files: Vec::new(),
        output_file: None,
    };

    match cli.command {
        Cmd::Apply(args) => {
            opts.command = Command::Apply;
            opts.base_file = Some(args.base);
            opts.base64 = args.base64;
            opts.output_file = args.output;
            opts.no_checksum = args.no_checksum;
            opts.input_files = args.deltas;
        }
        Cmd::Replay(args) => {
            opts.command = Command::Replay;
            opts.strict = args.strict;
            opts.output_file = args.output;
            opts.input_files = args.input.into_iter().collect();
        }
        Cmd::Sniff(args) => {
            opts.command = Command::Sniff;
            opts.input_files = args.files;
        }
        Cmd::Header(args) => {
            opts.command = Command::Header;
            opts.input_files = vec![args.input];
        }
        Cmd::Config => {}
    }

    opts
}

fn log_filter(opts: &Options) -> &'static str {
    match (opts.quiet, opts.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "debug",
        (false, _) => "trace",
    }
}

#[cfg(any(test, feature = "fuzzing"))]
pub fn fuzz_try_parse_args(args: &[String]) {
    let argv: Vec<String> = std::iter::once("deltachain".to_string())
        .chain(args.iter().cloned())
        .collect();
    if let Ok(cli) = Cli::try_parse_from(argv) {
        let _ = resolve_options(cli);
    }
}

// ---------------------------------------------------------------------------
// Shared I/O helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path, what: &str) -> Option<Vec<u8>> {
    match std::fs::read(path) {
        Ok(data) => Some(data),
        Err(e) => {
            eprintln!("deltachain: {what}: {}: {e}", path.display());
            None
        }
    }
}

fn open_output(opts: &Options) -> Option<Box<dyn Write>> {
    let Some(path) = &opts.output_file else {
        return Some(Box::new(BufWriter::with_capacity(
            BUF_SIZE,
            io::stdout().lock(),
        )));
    };
    if path.exists() && !opts.force {
        eprintln!(
            "deltachain: output file exists, use -f to overwrite: {}",
            path.display()
        );
        return None;
    }
    match File::create(path) {
        Ok(f) => Some(Box::new(BufWriter::with_capacity(BUF_SIZE, f))),
        Err(e) => {
            eprintln!("deltachain: output file: {}: {e}", path.display());
            None
        }
    }
}

/// File contents as base64 text, surrounding whitespace removed.
fn as_base64_text<'a>(data: &'a [u8], path: &Path) -> Option<&'a str> {
    match std::str::from_utf8(data) {
        Ok(text) => Some(text.trim()),
        Err(e) => {
            eprintln!("deltachain: {}: not base64 text: {e}", path.display());
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Config command
// ---------------------------------------------------------------------------

fn cmd_config() -> i32 {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!("deltachain version {version} (Rust)");

    let adler32 = cfg!(feature = "adler32") as u8;
    let json = cfg!(feature = "json") as u8;
    let ptr_size = std::mem::size_of::<*const ()>();

    eprintln!("ADLER32={adler32}");
    eprintln!("JSON={json}");
    eprintln!("HARD_MAX_WINSIZE={HARD_MAX_WINSIZE}");
    eprintln!("MAX_OUTPUT_LEN={DEFAULT_MAX_OUTPUT_LEN}");
    eprintln!("sizeof(usize)={ptr_size}");

    0
}

// ---------------------------------------------------------------------------
// Apply command
// ---------------------------------------------------------------------------

fn cmd_apply(opts: &Options) -> i32 {
    let Some(base_path) = &opts.base_file else {
        eprintln!("deltachain: apply requires --base");
        return 1;
    };
    let Some(base) = read_file(base_path, "base file") else {
        return 1;
    };

    let engine = VcdiffEngine::with_options(EngineOptions {
        verify_checksum: !opts.no_checksum,
        ..EngineOptions::default()
    });
    let mut decoder = VcdiffDecoder::with_engine(engine);

    let set = if opts.base64 {
        let Some(text) = as_base64_text(&base, base_path) else {
            return 1;
        };
        decoder.set_base64_base(text)
    } else {
        decoder.set_base(&base)
    };
    if let Err(e) = set {
        eprintln!("deltachain: base file: {}: {e}", base_path.display());
        return 1;
    }

    let mut document = base;
    for path in &opts.input_files {
        let Some(delta) = read_file(path, "delta file") else {
            return 1;
        };
        let applied = if opts.base64 {
            let Some(text) = as_base64_text(&delta, path) else {
                return 1;
            };
            decoder.apply_base64_delta(text)
        } else {
            decoder.apply_delta(&delta)
        };
        match applied {
            Ok(result) => {
                if opts.verbose > 0 && !opts.quiet {
                    eprintln!(
                        "deltachain: {}: {} byte delta -> {} bytes",
                        path.display(),
                        delta.len(),
                        result.len()
                    );
                }
                document = result.into_bytes();
            }
            Err(e) => {
                eprintln!("deltachain: {}: {e}", path.display());
                return 1;
            }
        }
    }

    let Some(mut out) = open_output(opts) else {
        return 1;
    };
    if let Err(e) = out.write_all(&document).and_then(|()| out.flush()) {
        eprintln!("deltachain: write error: {e}");
        return 1;
    }

    if opts.json_output {
        let json = serde_json::json!({
            "command": "apply",
            "deltas": opts.input_files.len(),
            "output_size": document.len(),
        });
        eprintln!("{json:#}");
    }

    0
}

// ---------------------------------------------------------------------------
// Replay command
// ---------------------------------------------------------------------------

/// One line of a channel log.
#[derive(Debug, Deserialize)]
struct LogRecord {
    id: Option<String>,
    data: Option<String>,
    #[serde(default)]
    encoding: Encoding,
    delta: Option<DeltaExtras>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Encoding {
    #[default]
    Utf8,
    Base64,
}

#[derive(Debug, Deserialize)]
struct DeltaExtras {
    from: String,
    format: Option<String>,
}

impl LogRecord {
    fn message(&self) -> Result<ChannelMessage<'_>, String> {
        if let Some(format) = self.delta.as_ref().and_then(|d| d.format.as_deref())
            && format != "vcdiff"
        {
            return Err(format!("unsupported delta format '{format}'"));
        }
        let data = self.data.as_deref().map(|text| match self.encoding {
            Encoding::Utf8 => BasePayload::Utf8(text),
            Encoding::Base64 => BasePayload::Base64(text),
        });
        Ok(ChannelMessage {
            id: self.id.as_deref(),
            data,
            delta_from: self.delta.as_ref().map(|d| d.from.as_str()),
        })
    }
}

fn cmd_replay(opts: &Options) -> i32 {
    let reader: Box<dyn BufRead> = match opts.input_files.first() {
        Some(path) => match File::open(path) {
            Ok(f) => Box::new(BufReader::with_capacity(BUF_SIZE, f)),
            Err(e) => {
                eprintln!("deltachain: input file: {}: {e}", path.display());
                return 1;
            }
        },
        None => Box::new(BufReader::new(io::stdin())),
    };
    let Some(mut out) = open_output(opts) else {
        return 1;
    };

    let mut channel = ChannelDecoder::new();
    let mut exit_code = 0;

    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                eprintln!("deltachain: read error: {e}");
                exit_code = 1;
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let routed = serde_json::from_str::<LogRecord>(&line)
            .map_err(|e| format!("invalid record: {e}"))
            .and_then(|record| {
                let message = record.message()?;
                channel.route(message).map_err(|e| e.to_string())
            });

        match routed {
            Ok(outcome) => {
                let text = outcome.data().as_utf8_str();
                if let Err(e) = writeln!(out, "{text}") {
                    eprintln!("deltachain: write error: {e}");
                    exit_code = 1;
                    break;
                }
            }
            Err(e) => {
                eprintln!("deltachain: line {line_no}: {e}");
                if opts.strict {
                    exit_code = 1;
                    break;
                }
            }
        }
    }

    if let Err(e) = out.flush() {
        eprintln!("deltachain: write flush error: {e}");
        exit_code = 1;
    }

    let stats = channel.stats();
    if opts.verbose > 0 && !opts.quiet {
        eprintln!(
            "deltachain: replay: bases: {}, deltas: {}, failures: {}",
            stats.bases_set, stats.deltas_applied, stats.failures
        );
    }
    if opts.json_output {
        let json = serde_json::json!({
            "command": "replay",
            "bases_set": stats.bases_set,
            "deltas_applied": stats.deltas_applied,
            "failures": stats.failures,
            "bytes_decoded": stats.bytes_decoded,
        });
        eprintln!("{json:#}");
    }

    exit_code
}

// ---------------------------------------------------------------------------
// Sniff command
// ---------------------------------------------------------------------------

fn cmd_sniff(opts: &Options) -> i32 {
    let mut report = Vec::with_capacity(opts.input_files.len());

    for path in &opts.input_files {
        let mut head = Vec::with_capacity(header::VCDIFF_MAGIC.len() + 1);
        let read = File::open(path).and_then(|f| {
            f.take(header::VCDIFF_MAGIC.len() as u64 + 1)
                .read_to_end(&mut head)
        });
        if let Err(e) = read {
            eprintln!("deltachain: {}: {e}", path.display());
            return 1;
        }

        let is_delta = header::is_vcdiff(&head);
        if !opts.quiet {
            let kind = if is_delta { "vcdiff delta" } else { "not a delta" };
            println!("{}: {kind}", path.display());
        }
        report.push(serde_json::json!({
            "file": path.display().to_string(),
            "delta": is_delta,
        }));
    }

    if opts.json_output {
        let json = serde_json::json!({ "command": "sniff", "files": report });
        eprintln!("{json:#}");
    }

    0
}

// ---------------------------------------------------------------------------
// Header command
// ---------------------------------------------------------------------------

fn flag_names<const N: usize>(names: [(bool, &str); N]) -> String {
    let set: Vec<&str> = names
        .iter()
        .filter(|(on, _)| *on)
        .map(|(_, name)| *name)
        .collect();
    if set.is_empty() {
        "none".into()
    } else {
        set.join(" ")
    }
}

fn cmd_header(opts: &Options) -> i32 {
    let Some(path) = opts.input_files.first() else {
        eprintln!("deltachain: header requires an input file");
        return 1;
    };
    let Some(delta) = read_file(path, "delta file") else {
        return 1;
    };

    let headers = match header::read_headers(&delta) {
        Ok(headers) => headers,
        Err(e) => {
            eprintln!("deltachain: invalid VCDIFF delta: {e}");
            return 1;
        }
    };

    let file = &headers.file;
    println!("VCDIFF version:               0");
    println!(
        "VCDIFF header indicator:      {}",
        flag_names([
            (file.indicator.contains(HeaderIndicator::SECONDARY), "VCD_SECONDARY"),
            (file.indicator.contains(HeaderIndicator::CODETABLE), "VCD_CODETABLE"),
            (file.indicator.contains(HeaderIndicator::APPHEADER), "VCD_APPHEADER"),
        ])
    );
    if let Some(id) = file.secondary_id {
        println!("VCDIFF secondary compressor:  id={id}");
    }
    if let Some(data) = &file.app_header
        && !data.is_empty()
    {
        println!(
            "VCDIFF application header:    {}",
            String::from_utf8_lossy(data)
        );
    }

    let mut target_offset: u64 = 0;
    for (window_num, wh) in headers.windows.iter().enumerate() {
        println!();
        println!("VCDIFF window number:         {window_num}");
        println!(
            "VCDIFF window indicator:      {}",
            flag_names([
                (wh.indicator.contains(WindowIndicator::SOURCE), "VCD_SOURCE"),
                (wh.indicator.contains(WindowIndicator::TARGET), "VCD_TARGET"),
                (wh.indicator.contains(WindowIndicator::ADLER32), "VCD_ADLER32"),
            ])
        );
        if let Some(cksum) = wh.adler32 {
            println!("VCDIFF adler32 checksum:      {cksum:08X}");
        }
        if !wh.delta_indicator.is_empty() {
            println!(
                "VCDIFF delta indicator:       {}",
                flag_names([
                    (wh.delta_indicator.contains(DeltaIndicator::DATACOMP), "VCD_DATACOMP"),
                    (wh.delta_indicator.contains(DeltaIndicator::INSTCOMP), "VCD_INSTCOMP"),
                    (wh.delta_indicator.contains(DeltaIndicator::ADDRCOMP), "VCD_ADDRCOMP"),
                ])
            );
        }
        if target_offset > 0 {
            println!("VCDIFF window at offset:      {target_offset}");
        }
        if wh.has_source() || wh.has_target() {
            println!("VCDIFF copy window length:    {}", wh.copy_window_len);
            println!("VCDIFF copy window offset:    {}", wh.copy_window_offset);
        }
        println!("VCDIFF delta encoding length: {}", wh.enc_len);
        println!("VCDIFF target window length:  {}", wh.target_window_len);
        println!("VCDIFF data section length:   {}", wh.data_len);
        println!("VCDIFF inst section length:   {}", wh.inst_len);
        println!("VCDIFF addr section length:   {}", wh.addr_len);
        target_offset += wh.target_window_len;
    }

    if opts.json_output {
        let json = serde_json::json!({
            "command": "header",
            "windows": headers.windows.len(),
            "target_size": target_offset,
        });
        eprintln!("{json:#}");
    }

    0
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run() -> ! {
    let cli = Cli::parse();
    let opts = resolve_options(cli);

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_filter(&opts)),
    )
        .format_timestamp(None)
        .format_target(false)
        .init();

    let exit_code = match opts.command {
        Command::Apply => cmd_apply(&opts),
        Command::Replay => cmd_replay(&opts),
        Command::Sniff => cmd_sniff(&opts),
        Command::Header => cmd_header(&opts),
        Command::Config => cmd_config(),
    };

    process::exit(exit_code);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_opts(args: &[&str]) -> Options {
        let argv: Vec<String> = std::iter::once("deltachain".to_string())
            .chain(args.iter().map(|s| s.to_string()))
            .collect();
        let cli = Cli::try_parse_from(argv).expect("cli parse failed");
        resolve_options(cli)
    }

    fn record(line: &str) -> LogRecord {
        serde_json::from_str(line).expect("record parse failed")
    }

    #[test]
    fn apply_subcommand_maps_correctly() {
        let opts = parse_opts(&[
            "apply",
            "--base",
            "base.bin",
            "--base64",
            "-o",
            "out.bin",
            "--no-checksum",
            "d1.vcdiff",
            "d2.vcdiff",
        ]);
        assert_eq!(opts.command, Command::Apply);
        assert_eq!(opts.base_file, Some(PathBuf::from("base.bin")));
        assert!(opts.base64);
        assert!(opts.no_checksum);
        assert_eq!(opts.output_file, Some(PathBuf::from("out.bin")));
        assert_eq!(
            opts.input_files,
            vec![PathBuf::from("d1.vcdiff"), PathBuf::from("d2.vcdiff")]
        );
    }

    #[test]
    fn apply_requires_base_and_deltas() {
        let argv = ["deltachain", "apply", "d1.vcdiff"];
        assert!(Cli::try_parse_from(argv).is_err());
        let argv = ["deltachain", "apply", "--base", "b"];
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn replay_defaults_to_stdin() {
        let opts = parse_opts(&["replay", "--strict"]);
        assert_eq!(opts.command, Command::Replay);
        assert!(opts.strict);
        assert!(opts.input_files.is_empty());

        let opts = parse_opts(&["replay", "log.jsonl"]);
        assert!(!opts.strict);
        assert_eq!(opts.input_files, vec![PathBuf::from("log.jsonl")]);
    }

    #[test]
    fn sniff_header_and_config_map() {
        assert_eq!(parse_opts(&["sniff", "a", "b"]).input_files.len(), 2);
        assert_eq!(parse_opts(&["header", "in"]).command, Command::Header);
        assert_eq!(parse_opts(&["config"]).command, Command::Config);
    }

    #[test]
    fn global_flags_and_log_filter() {
        let opts = parse_opts(&["--force", "--json", "sniff", "a"]);
        assert!(opts.force);
        assert!(opts.json_output);
        assert_eq!(log_filter(&opts), "warn");

        let opts = parse_opts(&["-vvv", "config"]);
        assert_eq!(opts.verbose, 2);
        assert_eq!(log_filter(&opts), "trace");

        assert_eq!(log_filter(&parse_opts(&["-q", "config"])), "error");
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["deltachain", "-q", "-v", "config"]).is_err());
    }

    #[test]
    fn log_record_with_delta_extras() {
        let rec = record(
            r#"{"id":"m2","data":"1sPE","encoding":"base64","delta":{"from":"m1","format":"vcdiff"}}"#,
        );
        let msg = rec.message().unwrap();
        assert_eq!(msg.id, Some("m2"));
        assert_eq!(msg.data, Some(BasePayload::Base64("1sPE")));
        assert_eq!(msg.delta_from, Some("m1"));
    }

    #[test]
    fn log_record_defaults_to_utf8_base() {
        let msg = record(r#"{"id":"m1","data":"{\"foo\":\"bar\"}"}"#);
        let msg = msg.message().unwrap();
        assert_eq!(msg.data, Some(BasePayload::Utf8(r#"{"foo":"bar"}"#)));
        assert_eq!(msg.delta_from, None);
    }

    #[test]
    fn log_record_rejects_other_delta_formats() {
        let rec = record(r#"{"id":"m2","data":"x","delta":{"from":"m1","format":"xdelta"}}"#);
        assert!(rec.message().unwrap_err().contains("xdelta"));
    }

    #[test]
    fn flag_names_lists_set_flags() {
        assert_eq!(flag_names([(false, "A"), (false, "B")]), "none");
        assert_eq!(flag_names([(true, "A"), (false, "B"), (true, "C")]), "A C");
    }

    #[test]
    fn fuzz_parse_never_panics() {
        fuzz_try_parse_args(&["apply".into(), "--base".into()]);
        fuzz_try_parse_args(&["--json".into(), "replay".into(), "x".into()]);
    }
}
