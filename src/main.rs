//! wblog - inspect write-behind log files
//!
//! Prints every record of a log file in file order, either as one line per
//! record or as JSON lines for other tools to consume.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use log::{info, warn};
use serde::Serialize;

use wblog::logging::{LogReader, TupleRecord};
use wblog::WalError;

#[derive(Serialize)]
struct DumpEntry<'a> {
    offset: u64,
    record_type: String,
    transaction_id: u64,
    table_id: u32,
    block: u32,
    slot: u32,
    image_len: usize,
    image: &'a [u8],
}

impl<'a> DumpEntry<'a> {
    fn new(offset: u64, record: &'a TupleRecord) -> Self {
        let location = record.tuple_location();
        Self {
            offset,
            record_type: record.record_type().to_string(),
            transaction_id: record.transaction_id(),
            table_id: record.table_id(),
            block: location.block,
            slot: location.offset,
            image_len: record.tuple_image().len(),
            image: record.tuple_image(),
        }
    }
}

fn print_help() {
    println!("wblog - inspect write-behind log files");
    println!();
    println!("Usage: wblog dump FILE [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -j, --json    One JSON object per record");
    println!("  -h, --help    Show this help");
}

fn dump(path: PathBuf, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let file = File::open(&path)?;
    let mut reader = LogReader::new(BufReader::new(file));

    let mut records = 0usize;
    let mut corrupted = 0usize;
    loop {
        let offset = reader.offset();
        let record = match reader.next() {
            Some(Ok(record)) => record,
            Some(Err(WalError::Corrupted(msg))) => {
                warn!("{}", msg);
                corrupted += 1;
                continue;
            }
            Some(Err(e)) => return Err(e.into()),
            None => break,
        };
        records += 1;

        if json {
            println!("{}", serde_json::to_string(&DumpEntry::new(offset, &record))?);
        } else {
            println!("{:>10}  {}", offset, record);
        }
    }

    info!(
        "{:?}: {} records, {} corrupted, {} bytes",
        path,
        records,
        corrupted,
        reader.offset()
    );
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")
    ).init();

    let args: Vec<String> = std::env::args().collect();

    let mut command: Option<String> = None;
    let mut file: Option<PathBuf> = None;
    let mut json = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--json" | "-j" => json = true,
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            arg if command.is_none() => command = Some(arg.to_string()),
            arg if file.is_none() => file = Some(PathBuf::from(arg)),
            arg => {
                eprintln!("Unexpected argument: {}", arg);
                print_help();
                std::process::exit(2);
            }
        }
        i += 1;
    }

    match (command.as_deref(), file) {
        (Some("dump"), Some(path)) => dump(path, json),
        _ => {
            print_help();
            std::process::exit(2);
        }
    }
}
