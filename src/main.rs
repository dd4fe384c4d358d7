use clap::{Args, Parser, Subcommand};
use crossbeam_channel::{unbounded, RecvTimeoutError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use modem_intel::output::{self, ANOMALIES_FILE, METRICS_FILE, QUALITY_FILE};
use modem_intel::{analyze_file, read_prefix, Analysis, Config, Detector, Extractor, PcapFileSource, Sensitivity};

#[derive(Parser, Debug)]
#[command(name = "modem-intel")]
#[command(about = "5G modem performance metrics and anomaly detection from packet captures")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Directory to save analysis results
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Packets read from the start of each capture
    #[arg(long, global = true)]
    max_packets: Option<usize>,

    /// Detection sensitivity: low, medium or high
    #[arg(long, global = true)]
    sensitivity: Option<String>,

    /// Metric families to compute, comma separated, or "all"
    #[arg(long, global = true)]
    metrics: Option<String>,

    /// Enable debug output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read, extract, grade and detect; writes metrics.json, quality.json and anomalies.json per capture
    Analyze {
        /// Capture files; PCAP_FILE_PATH when none are given
        pcaps: Vec<PathBuf>,
    },
    /// Print the metrics document for one capture
    Extract { pcap: Option<PathBuf> },
    /// Print the detection document for a metrics JSON file
    Detect { metrics_json: PathBuf },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = build_config(&cli.common)?;
    init_tracing(&config, cli.common.verbose);

    match cli.command {
        Command::Analyze { pcaps } => {
            let pcaps = if pcaps.is_empty() { vec![config.pcap_file.clone()] } else { pcaps };
            run_batch(pcaps, config)?;
        }
        Command::Extract { pcap } => {
            let mut config = config;
            if let Some(pcap) = pcap {
                config.pcap_file = pcap;
            }
            config.validate()?;
            let mut source = PcapFileSource::open(&config.pcap_file)?;
            let prefix = read_prefix(&mut source, config.max_packets)?;
            let document = Extractor::new(config.extractor_config()).extract_json(&prefix.records);
            println!("{}", serde_json::to_string_pretty(&document)?);
        }
        Command::Detect { metrics_json } => {
            let raw = std::fs::read_to_string(&metrics_json)?;
            let report = Detector::new(config.sensitivity).detect_json(&raw)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

fn build_config(args: &CommonArgs) -> Result<Config, modem_intel::Error> {
    let mut config = Config::from_env()?;
    if let Some(dir) = &args.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(max_packets) = args.max_packets {
        config.max_packets = max_packets;
    }
    if let Some(sensitivity) = &args.sensitivity {
        config.sensitivity = sensitivity.parse().unwrap_or(Sensitivity::Medium);
    }
    if let Some(metrics) = &args.metrics {
        config.families = metrics.parse()?;
    }
    if args.verbose {
        config.verbose_level = 2;
    }
    Ok(config)
}

fn init_tracing(config: &Config, verbose: bool) {
    let default_level = match (verbose, config.verbose_level) {
        (true, _) => "debug",
        (false, 0) => "warn",
        (false, 1) => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

// One worker thread per capture; results come back over a channel. Ctrl-C
// stops collecting and leaves outstanding workers behind.
fn run_batch(pcaps: Vec<PathBuf>, config: Config) -> Result<(), Box<dyn std::error::Error>> {
    for pcap in &pcaps {
        let mut probe = config.clone();
        probe.pcap_file = pcap.clone();
        probe.validate()?;
    }

    let run_dir = output::create_timestamped_dir(&config.output_dir)?;
    info!(captures = pcaps.len(), output = %run_dir.display(), "starting analysis");

    let running = Arc::new(AtomicBool::new(true));
    let running_handler = running.clone();
    ctrlc::set_handler(move || running_handler.store(false, Ordering::SeqCst))?;

    let (tx, rx) = unbounded();
    for (index, pcap) in pcaps.iter().cloned().enumerate() {
        let tx = tx.clone();
        let config = config.clone();
        thread::spawn(move || {
            let result = analyze_file(&pcap, &config);
            if tx.send((index, pcap, result)).is_err() {
                warn!("result channel closed before the analysis finished");
            }
        });
    }
    drop(tx);

    let single = pcaps.len() == 1;
    let mut failures = 0usize;
    let mut remaining = pcaps.len();
    while remaining > 0 && running.load(Ordering::SeqCst) {
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok((index, pcap, Ok(analysis))) => {
                remaining -= 1;
                let dir = if single { run_dir.clone() } else { output::capture_dir(&run_dir, index, &pcap) };
                save_analysis(&dir, &analysis)?;
                info!(
                    capture = %pcap.display(),
                    anomalies = analysis.report.total_anomalies,
                    "results saved to {}",
                    dir.display()
                );
            }
            Ok((_, pcap, Err(e))) => {
                remaining -= 1;
                failures += 1;
                error!(capture = %pcap.display(), "analysis failed: {}", e);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    if remaining > 0 {
        warn!(abandoned = remaining, "analysis interrupted");
    }
    if failures > 0 {
        return Err(format!("{} of {} captures failed", failures, pcaps.len()).into());
    }
    Ok(())
}

fn save_analysis(dir: &Path, analysis: &Analysis) -> Result<(), modem_intel::Error> {
    output::write_json(dir, METRICS_FILE, &[analysis.metrics])?;
    output::write_json(dir, QUALITY_FILE, &analysis.quality)?;
    output::write_json(dir, ANOMALIES_FILE, &analysis.report)?;
    Ok(())
}
