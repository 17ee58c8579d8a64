mod analyser;
mod config;
mod error;
mod ui;

use analyser::capture::{CaptureSegmenter, TsharkDecoder};
use analyser::labels::LabelTable;
use clap::{ArgAction, Parser};
use config::ExtractConfig;
use error::{Error, Result};
use log::LevelFilter;
use simple_logger::SimpleLogger;
use std::fs;
use std::path::PathBuf;
use ui::output;

/// Capture file the traffic generator's tcpdump writes into the run folder.
const CAPTURE_FILE: &str = "Packets.pcap";
/// Label table the traffic generator writes into the run folder.
const LABEL_FILE: &str = "Client Requests.csv";

/// tlsniff turns a capture of TLS handshakes into a labeled feature table
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Folder that contains Packets.pcap and Client Requests.csv; outputs are written there too
    #[arg(short = 'f', long, value_parser)]
    folder: Option<PathBuf>,

    /// pcap/pcapng file to analyze, overrides the one in --folder
    #[arg(short = 'c', long, value_parser)]
    capture: Option<PathBuf>,

    /// Label table CSV, overrides the one in --folder
    #[arg(short = 'l', long, value_parser)]
    labels: Option<PathBuf>,

    /// Directory to write the tables to, defaults to --folder
    #[arg(short = 'o', long, value_parser)]
    output_dir: Option<PathBuf>,

    /// Number of TCP streams decoded per tshark pass
    #[arg(short = 's', long, default_value_t = 10_000, value_parser)]
    slice_size: u64,

    /// Sessions with fewer extracted features are dropped
    #[arg(long, default_value_t = 3, value_parser)]
    min_features: usize,

    /// Stop after this many slices
    #[arg(long, value_parser)]
    max_slices: Option<usize>,

    /// Give up on the capture after this many failed slices in a row
    #[arg(long, default_value_t = 3, value_parser)]
    max_consecutive_failures: usize,

    /// Print the dataset as formatted JSON instead of the summary
    #[arg(short = 'j', long, action = ArgAction::SetTrue)]
    json: bool,

    /// Log per-session details
    #[arg(short = 'v', long, action = ArgAction::SetTrue)]
    verbose: bool,

    /// Do not print the summary
    #[arg(short = 'q', long, action = ArgAction::SetTrue)]
    quiet: bool,
}

impl Args {
    fn config(&self) -> ExtractConfig {
        ExtractConfig {
            slice_size: self.slice_size,
            min_features: self.min_features,
            max_slices: self.max_slices,
            max_consecutive_failures: self.max_consecutive_failures,
        }
    }

    fn input(&self, explicit: &Option<PathBuf>, default_name: &str) -> Option<PathBuf> {
        explicit
            .clone()
            .or_else(|| self.folder.as_ref().map(|folder| folder.join(default_name)))
    }
}

fn main() {
    let args = Args::parse();

    let level = if args.verbose { LevelFilter::Debug } else { LevelFilter::Info };
    SimpleLogger::new()
        .with_level(level)
        .env()
        .init()
        .unwrap_or_else(|err| eprintln!("Could not initialise logging: {err}"));

    if let Err(err) = run(&args) {
        log::error!("{err}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let config = args.config();

    let capture = args
        .input(&args.capture, CAPTURE_FILE)
        .ok_or(Error::MissingInput { what: "capture" })?;
    let labels = args
        .input(&args.labels, LABEL_FILE)
        .ok_or(Error::MissingInput { what: "label table" })?;

    let out_dir = match (&args.output_dir, &args.folder) {
        (Some(dir), _) | (None, Some(dir)) => dir.clone(),
        (None, None) => PathBuf::from("."),
    };
    log::info!("Output directory {}", out_dir.display());
    fs::create_dir_all(&out_dir)?;

    let labels = LabelTable::from_path(&labels)?;
    let decoder = TsharkDecoder::new(&capture.to_string_lossy())?;
    let segmenter = CaptureSegmenter::new(decoder, &config);
    log::debug!("Segmenting with {} streams per slice", segmenter.slice_size());

    let dataset = analyser::core::analyse(segmenter, &labels, &config);

    // ---- Output ----
    output::save_tables(&dataset, &out_dir)?;
    if args.json {
        println!("{}", output::data_as_json(&dataset)?);
    } else if !args.quiet {
        output::print_results(&dataset);
    }

    Ok(())
}
