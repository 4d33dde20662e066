//! Kirole Sync CLI - inspect and exercise the BLE sync protocol
//!
//! Commands:
//! - crc: CRC16-CCITT-FALSE of some bytes
//! - packetize: split a payload into wire packets
//! - assemble: reassemble captured packets
//! - decode-events: decode event log records
//! - fingerprint: fingerprint (and optionally encode) a day pack
//! - should-sync: evaluate the sync policy
//! - doctor: diagnose configuration and environment

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use kirole_sync::daypack::encode_day_pack;
use kirole_sync::events::{decode_record, parse_batch};
use kirole_sync::wire::packetize_bytes;
use kirole_sync::{
    crc16, DayPack, PacketAssembler, ScreenSize, SyncConfig, SyncError, SyncPolicy, SYNC_VERSION,
};

/// Kirole Sync - BLE synchronization core for the Kirole e-ink companion
#[derive(Parser)]
#[command(name = "kirole-sync")]
#[command(author = "Kirole")]
#[command(version = SYNC_VERSION)]
#[command(about = "Inspect and exercise the Kirole BLE sync protocol", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the CRC16-CCITT-FALSE of some bytes
    Crc {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Treat input as hex text instead of raw bytes
        #[arg(long)]
        hex: bool,
    },

    /// Split a payload into hex-encoded wire packets, one per line
    Packetize {
        /// Message type byte (decimal or 0x-prefixed hex)
        #[arg(short = 't', long = "type", value_parser = parse_u8)]
        message_type: u8,

        /// Message id
        #[arg(long, default_value = "0")]
        id: u16,

        /// Payload bytes per packet
        #[arg(long, default_value = "17")]
        chunk_size: usize,

        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Treat input as hex text instead of raw bytes
        #[arg(long)]
        hex: bool,
    },

    /// Reassemble hex-encoded packets (one per line) and print completed messages
    Assemble {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,
    },

    /// Decode hex-encoded event log records
    DecodeEvents {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Input is a batch payload (count byte + records) instead of one record per line
        #[arg(long)]
        batch: bool,
    },

    /// Fingerprint a day pack JSON document
    Fingerprint {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Also print the binary encoding for this panel size
        #[arg(long, value_parser = parse_screen)]
        encode: Option<ScreenSize>,
    },

    /// Evaluate the sync policy
    ShouldSync {
        /// Current time (RFC 3339, with the user's local offset)
        #[arg(long)]
        now: Option<String>,

        /// Last successful sync (RFC 3339)
        #[arg(long)]
        last_sync: Option<String>,

        /// The day pack changed since the last sync
        #[arg(long)]
        content_changed: bool,

        /// Sync regardless of the interval
        #[arg(long)]
        force: bool,

        /// Configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Diagnose configuration and environment
    Doctor {
        /// Check a configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

fn run(cli: Cli) -> Result<(), KiroleCliError> {
    match cli.command {
        Commands::Crc { input, hex } => cmd_crc(&input, hex),

        Commands::Packetize {
            message_type,
            id,
            chunk_size,
            input,
            hex,
        } => cmd_packetize(message_type, id, chunk_size, &input, hex),

        Commands::Assemble { input } => cmd_assemble(&input),

        Commands::DecodeEvents { input, batch } => cmd_decode_events(&input, batch),

        Commands::Fingerprint { input, encode } => cmd_fingerprint(&input, encode),

        Commands::ShouldSync {
            now,
            last_sync,
            content_changed,
            force,
            config,
        } => cmd_should_sync(
            now.as_deref(),
            last_sync.as_deref(),
            content_changed,
            force,
            config.as_deref(),
        ),

        Commands::Doctor { config, json } => cmd_doctor(config.as_deref(), json),
    }
}

fn cmd_crc(input: &Path, hex: bool) -> Result<(), KiroleCliError> {
    let data = read_payload(input, hex)?;
    println!("0x{:04X}", crc16(&data));
    Ok(())
}

fn cmd_packetize(
    message_type: u8,
    id: u16,
    chunk_size: usize,
    input: &Path,
    hex: bool,
) -> Result<(), KiroleCliError> {
    let payload = read_payload(input, hex)?;
    for packet in packetize_bytes(message_type, id, &payload, chunk_size)? {
        println!("{}", hex::encode(packet));
    }
    Ok(())
}

fn cmd_assemble(input: &Path) -> Result<(), KiroleCliError> {
    let text = read_input(input)?;
    let assembler = PacketAssembler::new();

    for line in hex_lines(&text) {
        let packet = hex::decode(line)?;
        if let Some(message) = assembler.append(&packet) {
            let output = serde_json::json!({
                "message_type": message.message_type,
                "kind": message.kind(),
                "message_id": message.message_id,
                "payload": hex::encode(&message.payload),
            });
            println!("{}", output);
        }
    }

    let pending = assembler.pending_messages();
    if !pending.is_empty() {
        log::warn!("incomplete messages left: {:?}", pending);
    }
    Ok(())
}

fn cmd_decode_events(input: &Path, batch: bool) -> Result<(), KiroleCliError> {
    let text = read_input(input)?;

    if batch {
        let payload = hex::decode(strip_whitespace(&text))?;
        for event in parse_batch(&payload) {
            println!("{}", serde_json::to_string(&event)?);
        }
        return Ok(());
    }

    for line in hex_lines(&text) {
        let record = hex::decode(line)?;
        match decode_record(&record) {
            Ok(event) => println!("{}", serde_json::to_string(&event)?),
            Err(e) => log::warn!("skipping record {}: {}", line, e),
        }
    }
    Ok(())
}

fn cmd_fingerprint(input: &Path, encode: Option<ScreenSize>) -> Result<(), KiroleCliError> {
    let pack: DayPack = serde_json::from_str(&read_input(input)?)?;
    println!("{}", pack.stable_fingerprint());

    if let Some(screen) = encode {
        println!("{}", hex::encode(encode_day_pack(&pack, screen)));
    }
    Ok(())
}

fn cmd_should_sync(
    now: Option<&str>,
    last_sync: Option<&str>,
    content_changed: bool,
    force: bool,
    config: Option<&Path>,
) -> Result<(), KiroleCliError> {
    let config = load_config(config)?;
    let policy = SyncPolicy::new(config.policy)?;

    let now = match now {
        Some(s) => parse_time(s)?,
        None => Utc::now().fixed_offset(),
    };
    let last_sync = last_sync
        .map(|s| parse_time(s).map(|t| t.with_timezone(&Utc)))
        .transpose()?;

    let decision = policy.evaluate(&now, last_sync, content_changed, force);
    let remaining_seconds = match decision {
        kirole_sync::SyncDecision::TooSoon { remaining } => Some(remaining.num_seconds()),
        _ => None,
    };

    let report = serde_json::json!({
        "should_sync": decision.should_sync(),
        "decision": decision.as_str(),
        "remaining_seconds": remaining_seconds,
        "next_sync": policy.next_sync_time(&now, last_sync).to_rfc3339(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn cmd_doctor(config: Option<&Path>, json: bool) -> Result<(), KiroleCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Kirole Sync version {}", SYNC_VERSION),
    });

    // Reference vector for CRC16-CCITT-FALSE
    let crc = crc16(b"123456789");
    checks.push(if crc == 0x29B1 {
        DoctorCheck {
            name: "crc16".to_string(),
            status: CheckStatus::Ok,
            message: "CRC16 reference vector matches (0x29B1)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "crc16".to_string(),
            status: CheckStatus::Error,
            message: format!("CRC16 reference vector gave 0x{:04X}, expected 0x29B1", crc),
        }
    });

    if let Some(config_path) = config {
        let check = if !config_path.exists() {
            DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Warning,
                message: "Configuration file does not exist".to_string(),
            }
        } else {
            match fs::read_to_string(config_path).map(|json| SyncConfig::from_json(&json)) {
                Ok(Ok(config)) => DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Ok,
                    message: format!(
                        "Configuration valid (chunk size {}, day/night intervals {}/{} min)",
                        config.link.max_chunk_size,
                        config.policy.day_interval_minutes,
                        config.policy.night_interval_minutes
                    ),
                },
                Ok(Err(e)) => DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: e.to_string(),
                },
                Err(e) => DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Cannot read configuration file: {}", e),
                },
            }
        };
        checks.push(check);
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (pass --input or pipe captured packets)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (ready for captured packets)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        version: SYNC_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Kirole Sync Doctor Report");
        println!("=========================");
        println!("Version: {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(KiroleCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper functions

fn read_input(input: &Path) -> Result<String, KiroleCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn read_payload(input: &Path, hex: bool) -> Result<Vec<u8>, KiroleCliError> {
    if hex {
        return Ok(hex::decode(strip_whitespace(&read_input(input)?))?);
    }
    if input.to_string_lossy() == "-" {
        let mut buffer = Vec::new();
        io::stdin().read_to_end(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read(input)?)
    }
}

fn load_config(path: Option<&Path>) -> Result<SyncConfig, KiroleCliError> {
    match path {
        Some(path) => Ok(SyncConfig::from_json(&fs::read_to_string(path)?)?),
        None => Ok(SyncConfig::default()),
    }
}

/// Non-empty lines with `#` comments removed.
fn hex_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty())
}

fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

fn parse_time(s: &str) -> Result<DateTime<chrono::FixedOffset>, KiroleCliError> {
    DateTime::parse_from_rfc3339(s)
        .map_err(|e| KiroleCliError::ParseError(format!("Invalid timestamp '{}': {}", s, e)))
}

fn parse_u8(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid byte '{}': {}", s, e))
}

fn parse_screen(s: &str) -> Result<ScreenSize, String> {
    match s {
        "four_inch" | "4" => Ok(ScreenSize::FourInch),
        "seven_inch" | "7" => Ok(ScreenSize::SevenInch),
        _ => Err(format!("unknown screen size '{}' (four_inch, seven_inch)", s)),
    }
}

// Error types

#[derive(Debug)]
enum KiroleCliError {
    Io(io::Error),
    Sync(SyncError),
    Json(serde_json::Error),
    Hex(hex::FromHexError),
    ParseError(String),
    DoctorFailed,
}

impl From<io::Error> for KiroleCliError {
    fn from(e: io::Error) -> Self {
        KiroleCliError::Io(e)
    }
}

impl From<SyncError> for KiroleCliError {
    fn from(e: SyncError) -> Self {
        KiroleCliError::Sync(e)
    }
}

impl From<serde_json::Error> for KiroleCliError {
    fn from(e: serde_json::Error) -> Self {
        KiroleCliError::Json(e)
    }
}

impl From<hex::FromHexError> for KiroleCliError {
    fn from(e: hex::FromHexError) -> Self {
        KiroleCliError::Hex(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<KiroleCliError> for CliError {
    fn from(e: KiroleCliError) -> Self {
        match e {
            KiroleCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            KiroleCliError::Sync(SyncError::InvalidChunkSize) => CliError {
                code: "INVALID_CHUNK_SIZE".to_string(),
                message: SyncError::InvalidChunkSize.to_string(),
                hint: Some("Pass --chunk-size of at least 1".to_string()),
            },
            KiroleCliError::Sync(e @ SyncError::InvalidConfig(_)) => CliError {
                code: "INVALID_CONFIG".to_string(),
                message: e.to_string(),
                hint: Some("Run 'kirole-sync doctor --config <file>' for details".to_string()),
            },
            KiroleCliError::Sync(e) => CliError {
                code: "SYNC_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            KiroleCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            KiroleCliError::Hex(e) => CliError {
                code: "HEX_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Input lines must be an even number of hex digits".to_string()),
            },
            KiroleCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Timestamps use RFC 3339, e.g. 2026-02-04T10:00:00+08:00".to_string()),
            },
            KiroleCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct DoctorReport {
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
