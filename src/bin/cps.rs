//! `cps`: the command-line surface over the `radio_cps` library.
//!
//! Every subcommand is a thin driver over the library API also available to an embedding GUI
//! (§4.L) — this binary owns argument parsing, endpoint string parsing, and mapping the library's
//! error taxonomy onto the documented exit codes, and nothing else.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;

use clap::{Parser, Subcommand};

use radio_cps::codeplug::Severity;
use radio_cps::error::Error;
use radio_cps::transport::net::NetTransport;
use radio_cps::transport::serial::SerialTransport;
use radio_cps::transport::{Transport, DEFAULT_RADIO_IP, XNL_PORT};
use radio_cps::{container, model, program};

#[derive(Parser)]
#[command(name = "cps", about = "Codeplug inspection and radio programming")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a codeplug file's metadata and a hex preview of its image.
    Dump {
        file: PathBuf,
        #[arg(long)]
        password: Option<String>,
    },
    /// Parse a codeplug file and run model-level validation against it.
    Verify {
        file: PathBuf,
        #[arg(long)]
        password: Option<String>,
    },
    /// Read a codeplug live from a radio and save it to a file.
    Read {
        #[arg(long)]
        model: String,
        #[arg(long)]
        endpoint: String,
        #[arg(long)]
        out: PathBuf,
    },
    /// Write a codeplug file to a radio, verifying the write afterward.
    Write {
        #[arg(long = "in")]
        input: PathBuf,
        #[arg(long)]
        endpoint: String,
        #[arg(long)]
        password: Option<String>,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(cli.command) {
        Ok(()) => ExitCode::from(0),
        Err(code) => {
            log::error!("cps: exiting with code {code}");
            ExitCode::from(code)
        }
    }
}

fn run(command: Command) -> Result<(), u8> {
    match command {
        Command::Dump { file, password } => dump(&file, password.as_deref()),
        Command::Verify { file, password } => verify(&file, password.as_deref()),
        Command::Read { model: model_id, endpoint, out } => read(&model_id, &endpoint, &out),
        Command::Write { input, endpoint, password } => write(&input, &endpoint, password.as_deref()),
    }
}

fn dump(file: &PathBuf, password: Option<&str>) -> Result<(), u8> {
    let cp = load(file, password)?;
    println!("model:            {}", cp.model().id());
    println!("serial number:    {}", cp.metadata.serial_number.as_deref().unwrap_or("-"));
    println!("model name:       {}", cp.metadata.model_name.as_deref().unwrap_or("-"));
    println!("firmware version: {}", cp.metadata.firmware_version.as_deref().unwrap_or("-"));
    println!("created:          {}", cp.metadata.created_date);
    println!("last modified:    {}", cp.metadata.last_modified);
    println!("notes:            {}", cp.metadata.notes);
    println!();
    let image = cp.as_bytes();
    println!("image ({} bytes, first {} shown):", image.len(), image.len().min(256));
    print_hex_preview(&image[..image.len().min(256)]);
    Ok(())
}

fn verify(file: &PathBuf, password: Option<&str>) -> Result<(), u8> {
    let cp = load(file, password)?;
    let issues = cp.validate();
    for issue in &issues {
        println!(
            "{:?}: {}{}",
            issue.severity,
            issue.field_id.as_deref().map(|f| format!("{f}: ")).unwrap_or_default(),
            issue.message
        );
    }
    if issues.iter().any(|i| i.severity == Severity::Error) {
        return Err(5);
    }
    println!("OK");
    Ok(())
}

fn read(model_id: &str, endpoint: &str, out: &PathBuf) -> Result<(), u8> {
    let radio_model = model::model(model_id).map_err(|e| exit_code_for(&e))?;
    let transport = open_endpoint(endpoint)?;
    let cancel = AtomicBool::new(false);
    let cp = program::read_codeplug(transport, radio_model, &cancel, |p| {
        eprint!("\rreading... {:>5.1}%", p * 100.0);
    })
    .map_err(|e| exit_code_for(&e))?;
    eprintln!();
    let buf = container::serialize(&cp, None).map_err(|e| exit_code_for(&e))?;
    fs::write(out, buf).map_err(io_err)?;
    println!("wrote {}", out.display());
    Ok(())
}

fn write(input: &PathBuf, endpoint: &str, password: Option<&str>) -> Result<(), u8> {
    let cp = load(input, password)?;
    let transport = open_endpoint(endpoint)?;
    let cancel = AtomicBool::new(false);
    program::write_codeplug(transport, &cp, &cancel, |p| {
        eprint!("\rwriting... {:>5.1}%", p * 100.0);
    })
    .map_err(|e| exit_code_for(&e))?;
    eprintln!();
    println!("write verified");
    Ok(())
}

fn load(file: &PathBuf, password: Option<&str>) -> Result<radio_cps::codeplug::Codeplug, u8> {
    let bytes = fs::read(file).map_err(io_err)?;
    container::deserialize(&bytes, password).map_err(|e| exit_code_for(&e))
}

/// `<serial-device-path>` (anything starting with `/`) or `[host][:port]`; a bare host defaults
/// to the XNL port, and an empty host falls back to `RADIO_HOST` or the default radio IP (§6).
fn open_endpoint(endpoint: &str) -> Result<Box<dyn Transport>, u8> {
    if endpoint.starts_with('/') {
        return Ok(Box::new(SerialTransport::new(endpoint.to_string())));
    }
    let (host, port) = match endpoint.split_once(':') {
        Some((h, p)) => (h, p.parse::<u16>().map_err(|_| 2u8)?),
        None => (endpoint, XNL_PORT),
    };
    let host = if host.is_empty() {
        std::env::var("RADIO_HOST").unwrap_or_else(|_| DEFAULT_RADIO_IP.to_string())
    } else {
        host.to_string()
    };
    Ok(Box::new(NetTransport::new(host, port)))
}

fn print_hex_preview(buf: &[u8]) {
    for (i, chunk) in buf.chunks(16).enumerate() {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
        println!("{:06x}  {}", i * 16, hex.join(" "));
    }
}

fn io_err(e: std::io::Error) -> u8 {
    exit_code_for(&Error::TransportError(e))
}

/// Exit codes per §6: 0 success, 2 invalid arguments, 3 I/O error, 4 protocol error,
/// 5 validation error, 6 verify mismatch.
fn exit_code_for(err: &Error) -> u8 {
    match err {
        Error::InvalidFormat(_) | Error::UnsupportedVersion(_) | Error::UnknownModel(_) | Error::UnknownField(_) => 2,
        Error::TransportError(_) => 3,
        Error::Timeout(_)
        | Error::Corrupted(_)
        | Error::MissingPassword
        | Error::BadPassword
        | Error::AuthFailed(_)
        | Error::UnsupportedAuth(_)
        | Error::XcmpError { .. }
        | Error::ModelMismatch { .. }
        | Error::PartitionSizeMismatch { .. }
        | Error::Aborted(_) => 4,
        Error::ValidationFailed(_) | Error::ConstraintFailed(_) | Error::BoundsError(_) => 5,
        Error::VerifyFailed(_) => 6,
        _ => 4,
    }
}
