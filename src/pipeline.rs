// Capture Reader -> Metrics Extractor -> Anomaly Detector, one bounded prefix
// per call. Nothing is shared between calls.

use serde::Serialize;
use tracing::info;

use crate::capture::{read_prefix, PacketSource};
use crate::config::Config;
use crate::detection::Detector;
use crate::error::Result;
use crate::metrics::Extractor;
use crate::models::dto::{DetectionReport, MetricsSnapshot};
use crate::quality::{assess, QualityReport};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub packets_read: usize,
    pub packets_dropped: usize,
    pub metrics: MetricsSnapshot,
    pub quality: QualityReport,
    pub report: DetectionReport,
}

pub fn analyze_source<S: PacketSource + ?Sized>(source: &mut S, config: &Config) -> Result<Analysis> {
    let prefix = read_prefix(source, config.max_packets)?;
    let metrics = Extractor::new(config.extractor_config()).extract(&prefix.records);
    let quality = assess(&metrics);
    let report = Detector::new(config.sensitivity).detect_snapshot(&metrics);

    info!(
        packets = prefix.packets_read,
        anomalies = report.total_anomalies,
        "analysis complete"
    );
    Ok(Analysis {
        packets_read: prefix.packets_read,
        packets_dropped: prefix.dropped,
        metrics,
        quality,
        report,
    })
}

#[cfg(feature = "pcap")]
pub fn analyze_file<P: AsRef<std::path::Path>>(path: P, config: &Config) -> Result<Analysis> {
    let mut source = crate::capture::PcapFileSource::open(path)?;
    analyze_source(&mut source, config)
}
