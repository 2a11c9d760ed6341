use a64img_core::{build_image, inspect_image, BuildReport, Header, Inspection, DEFAULT_LOAD_OFFSET};
use anyhow::Result;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use std::process;
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// Wrap a flat kernel binary in an ARM64 Linux Image header
#[derive(Parser)]
#[command(
    name = "a64img",
    about = "Create ARM64 Linux Image files from flat kernel binaries",
    version
)]
struct Cli {
    /// Flat kernel binary to wrap
    #[arg(required_unless_present = "inspect")]
    input: Option<PathBuf>,

    /// Path of the Image to write (overwritten if it exists)
    #[arg(required_unless_present = "inspect")]
    output: Option<PathBuf>,

    /// Load offset stored as text_offset, decimal or 0x-prefixed hex
    #[arg(value_parser = parse_offset)]
    load_offset: Option<u64>,

    /// Decode the header of an existing Image instead of building one
    #[arg(
        long,
        value_name = "IMAGE",
        conflicts_with_all = ["input", "output", "load_offset"]
    )]
    inspect: Option<PathBuf>,

    /// Print the inspected header as JSON
    #[arg(long, requires = "inspect")]
    json: bool,
}

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "Offset")]
    offset: String,
    #[tabled(rename = "Field")]
    field: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Serialize)]
struct HeaderJson {
    path: String,
    format: &'static str,
    file_size: u64,
    code0: u32,
    code1: u32,
    text_offset: u64,
    image_size: u64,
    flags: u64,
    magic: u32,
    magic_valid: bool,
    size_matches: bool,
    endianness: String,
    page_size: String,
    placement: String,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::try_parse().unwrap_or_else(|err| exit_usage(err));

    match cli.inspect {
        Some(image) => {
            let inspection = inspect_image(&image)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&header_json(&inspection))?);
            } else {
                print_inspection(&inspection);
            }
        }

        None => {
            let (Some(input), Some(output)) = (cli.input, cli.output) else {
                exit_usage(Cli::command().error(
                    ErrorKind::MissingRequiredArgument,
                    "an input binary and an output image are required",
                ));
            };
            let load_offset = cli.load_offset.unwrap_or(DEFAULT_LOAD_OFFSET);
            let report = build_image(&input, &output, load_offset)?;
            print_report(&report);
        }
    }

    Ok(())
}

/// Prints a clap error and exits: 0 for help/version, 1 for usage errors.
fn exit_usage(err: clap::Error) -> ! {
    let code = if err.use_stderr() { 1 } else { 0 };
    let _ = err.print();
    process::exit(code);
}

fn parse_offset(raw: &str) -> Result<u64, String> {
    let cleaned = raw.trim().replace('_', "");
    let (digits, radix) = match cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
    {
        Some(hex) => (hex, 16),
        None => (cleaned.as_str(), 10),
    };
    if digits.starts_with('+') {
        return Err(format!("invalid load offset '{raw}': unexpected sign"));
    }
    u64::from_str_radix(digits, radix).map_err(|e| format!("invalid load offset '{raw}': {e}"))
}

fn print_report(report: &BuildReport) {
    println!("Created ARM64 Image: {}", report.output.display());
    println!("  Header size: {} bytes", report.header_size);
    println!("  Kernel size: {} bytes", report.kernel_size);
    println!("  Total size: {} bytes", report.total_size);
    println!("  Load offset: 0x{:x}", report.load_offset);
}

fn print_inspection(inspection: &Inspection) {
    let hdr = &inspection.header;
    let flags = hdr.header_flags();

    let magic = if hdr.has_valid_magic() {
        format!("0x{:08x} {}", hdr.magic, "(ARM\\x64)".green())
    } else {
        format!("0x{:08x} {}", hdr.magic, "(bad magic)".red().bold())
    };
    let image_size = if inspection.size_matches() {
        format!("0x{:x}", hdr.image_size)
    } else {
        let note = format!("(file is {} bytes)", inspection.file_size);
        format!("0x{:x} {}", hdr.image_size, note.as_str().yellow())
    };

    let rows = vec![
        row(0x00, "code0", format!("0x{:08x}", hdr.code0)),
        row(0x04, "code1", format!("0x{:08x}", hdr.code1)),
        row(0x08, "text_offset", format!("0x{:x}", hdr.text_offset)),
        row(0x10, "image_size", image_size),
        row(0x18, "flags", format!("0x{:x}", hdr.flags)),
        row(0x20, "res2", format!("0x{:x}", hdr.res2)),
        row(0x28, "res3", format!("0x{:x}", hdr.res3)),
        row(0x30, "res4", format!("0x{:x}", hdr.res4)),
        row(0x38, "magic", magic),
        row(0x3c, "res5", format!("0x{:x}", hdr.res5)),
    ];

    println!("{}: {}", inspection.path.display(), hdr.format_name());
    println!("{}", Table::new(rows).with(Style::modern()));
    println!(
        "Flags: {}, {} pages, placement {}",
        flags.endianness, flags.page_size, flags.placement
    );
    if flags.reserved != 0 {
        let note = format!("Reserved flag bits set: 0x{:x}", flags.reserved);
        println!("{}", note.as_str().yellow());
    }
}

fn row(offset: usize, field: &'static str, value: String) -> FieldRow {
    FieldRow {
        offset: format!("0x{offset:02x}"),
        field,
        value,
    }
}

fn header_json(inspection: &Inspection) -> HeaderJson {
    let hdr = &inspection.header;
    let flags = hdr.header_flags();
    HeaderJson {
        path: inspection.path.display().to_string(),
        format: hdr.format_name(),
        file_size: inspection.file_size,
        code0: hdr.code0,
        code1: hdr.code1,
        text_offset: hdr.text_offset,
        image_size: hdr.image_size,
        flags: hdr.flags,
        magic: hdr.magic,
        magic_valid: hdr.has_valid_magic(),
        size_matches: inspection.size_matches(),
        endianness: flags.endianness.to_string(),
        page_size: flags.page_size.to_string(),
        placement: flags.placement.to_string(),
    }
}
