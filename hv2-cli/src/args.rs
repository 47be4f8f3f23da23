use clap::Parser;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// ELF executable to load into main memory.
    pub elf: Option<PathBuf>,

    /// BIOS image, mapped read-only at physical address 0.
    #[arg(short, long)]
    pub bios: Option<PathBuf>,

    /// Size of main memory, with an optional k, M or G (binary) suffix.
    #[arg(short = 'M', long, default_value = "4M", value_parser = parse_size)]
    pub memory_size: u32,

    /// Physical base address of main memory, decimal or 0x-prefixed hexadecimal.
    #[arg(long, default_value = "0x80000000", value_parser = parse_number)]
    pub memory_base: u32,

    /// Core clock in Hz, with an optional k, M or G (decimal) suffix. 0 runs unthrottled.
    #[arg(short = 's', long, default_value = "0", value_parser = parse_frequency)]
    pub cpu_speed: u64,

    /// Stop after this many cycles.
    #[arg(short, long)]
    pub cycles: Option<u64>,

    /// Log every executed instruction.
    #[arg(short, long)]
    pub trace: bool,

    /// Flush the pipeline on branches and writes to the program counter.
    #[arg(long)]
    pub flush_on_flow_transfer: bool,

    /// Print the disassembly of the executable segments of the ELF file and exit.
    #[arg(short, long, requires = "elf")]
    pub disassemble: bool,
}

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum ArgumentError {
    #[error("`{0}` is not a number")]
    InvalidNumber(String),
    #[error("unknown suffix `{0}`")]
    InvalidSuffix(char),
    #[error("`{0}` is too large")]
    TooLarge(String),
}

/// Parses a decimal or `0x`-prefixed hexadecimal number.
pub fn parse_number(value: &str) -> Result<u32, ArgumentError> {
    let invalid = || ArgumentError::InvalidNumber(value.to_string());
    match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(&hex.replace('_', ""), 16).map_err(|_| invalid()),
        None => value.replace('_', "").parse().map_err(|_| invalid()),
    }
}

/// Parses a byte count such as `4M`. Suffixes are binary multiples.
pub fn parse_size(value: &str) -> Result<u32, ArgumentError> {
    let size = parse_suffixed(value, 1 << 10)?;
    u32::try_from(size).map_err(|_| ArgumentError::TooLarge(value.to_string()))
}

/// Parses a frequency in Hz such as `1500k`. Suffixes are decimal multiples.
pub fn parse_frequency(value: &str) -> Result<u64, ArgumentError> {
    parse_suffixed(value, 1000)
}

fn parse_suffixed(value: &str, base: u64) -> Result<u64, ArgumentError> {
    let hex = value.starts_with("0x") || value.starts_with("0X");
    let (digits, exponent) = match value.chars().last() {
        Some(suffix) if suffix.is_ascii_alphabetic() && !hex => {
            let exponent = match suffix {
                'k' | 'K' => 1,
                'm' | 'M' => 2,
                'g' | 'G' => 3,
                _ => return Err(ArgumentError::InvalidSuffix(suffix)),
            };
            (&value[..value.len() - 1], exponent)
        }
        _ => (value, 0),
    };
    let number = u64::from(parse_number(digits)?);
    number
        .checked_mul(base.pow(exponent))
        .ok_or_else(|| ArgumentError::TooLarge(value.to_string()))
}
