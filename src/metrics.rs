//! Metrics Extractor.
//!
//! Turns a bounded sequence of [`PacketRecord`]s into one [`MetricsSnapshot`].
//! Extraction is a pure function of the records: samples gathered per flow
//! are sorted before aggregation so the result does not depend on grouping
//! order.

use multimap::MultiMap;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::debug;

use crate::error::Error;
use crate::models::domain::{ConnectionKey, PacketRecord};
use crate::models::dto::{
    ConnectionStats, LatencyMetrics, MetricsSnapshot, PacketLossMetrics, SignalMetrics, ThroughputMetrics,
};

pub const DEFAULT_MAX_PACKETS: usize = 1000;

/// Width of the windows used for peak throughput.
pub const PEAK_WINDOW_SECS: f64 = 0.1;

/// Fewer TTL samples than this and the signal proxy treats variation as zero.
const MIN_TTL_SAMPLES: usize = 11;

const BASE_RSSI_DBM: f64 = -65.0;
const RSSI_RANGE_DBM: (f64, f64) = (-120.0, -45.0);
const SINR_RANGE_DB: (f64, f64) = (0.0, 30.0);

/// Which metric families an extraction computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FamilySelection {
    pub latency: bool,
    pub throughput: bool,
    pub signal: bool,
    pub packet_loss: bool,
    pub connections: bool,
}

impl FamilySelection {
    pub const ALL: FamilySelection = FamilySelection {
        latency: true,
        throughput: true,
        signal: true,
        packet_loss: true,
        connections: true,
    };

    const NONE: FamilySelection = FamilySelection {
        latency: false,
        throughput: false,
        signal: false,
        packet_loss: false,
        connections: false,
    };
}

impl Default for FamilySelection {
    fn default() -> Self {
        FamilySelection::ALL
    }
}

impl FromStr for FamilySelection {
    type Err = Error;

    /// Comma separated family names, or `all`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut selection = FamilySelection::NONE;
        for name in s.split(',').map(|n| n.trim().to_lowercase()).filter(|n| !n.is_empty()) {
            match name.as_str() {
                "all" => return Ok(FamilySelection::ALL),
                "latency" => selection.latency = true,
                "throughput" => selection.throughput = true,
                "signal" | "signal_strength" => selection.signal = true,
                "packet_loss" => selection.packet_loss = true,
                "connections" | "connection" | "connection_stats" => selection.connections = true,
                other => return Err(Error::Config(format!("unknown metric family '{}'", other))),
            }
        }
        if selection == FamilySelection::NONE {
            return Ok(FamilySelection::ALL);
        }
        Ok(selection)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractorConfig {
    pub max_packets: usize,
    /// Values reported for empty input and for families not selected.
    pub fallback: MetricsSnapshot,
    pub families: FamilySelection,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        ExtractorConfig {
            max_packets: DEFAULT_MAX_PACKETS,
            fallback: MetricsSnapshot::NO_DATA,
            families: FamilySelection::ALL,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Extractor {
    config: ExtractorConfig,
}

impl Extractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Extractor { config }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn extract(&self, records: &[PacketRecord]) -> MetricsSnapshot {
        let records = &records[..records.len().min(self.config.max_packets)];
        let fallback = self.config.fallback;
        if records.is_empty() {
            debug!("no packets to measure, using fallback metrics");
            return fallback;
        }

        let families = self.config.families;
        let snapshot = MetricsSnapshot {
            latency: if families.latency { latency(records) } else { fallback.latency },
            throughput: if families.throughput { throughput(records) } else { fallback.throughput },
            signal_strength: if families.signal { signal_strength(records) } else { fallback.signal_strength },
            packet_loss: if families.packet_loss { packet_loss(records) } else { fallback.packet_loss },
            connection_stats: if families.connections { connection_stats(records) } else { fallback.connection_stats },
        };
        debug!(packets = records.len(), ?snapshot, "metrics extracted");
        snapshot
    }

    /// Extracts and wraps the snapshot in the one-element array document.
    pub fn extract_json(&self, records: &[PacketRecord]) -> serde_json::Value {
        serde_json::json!([self.extract(records)])
    }
}

fn group_by_connection<'a, I>(records: I) -> MultiMap<ConnectionKey, &'a PacketRecord>
where
    I: IntoIterator<Item = &'a PacketRecord>,
{
    records
        .into_iter()
        .filter_map(|record| record.connection_key().map(|key| (key, record)))
        .collect()
}

/// SYN to SYN-ACK round trips within each flow.
pub fn latency(records: &[PacketRecord]) -> LatencyMetrics {
    let flows = group_by_connection(records);
    let mut rtts = Vec::new();

    for (_, group) in flows.iter_all() {
        for syn in group.iter().filter(|r| r.tcp().is_some_and(|t| t.flags.is_syn())) {
            let reply = earliest_after(group, syn.timestamp, |r| r.tcp().is_some_and(|t| t.flags.is_syn_ack()));
            if let Some(reply) = reply {
                rtts.push((reply.timestamp - syn.timestamp) * 1000.0);
            }
        }
    }

    if rtts.is_empty() {
        return LatencyMetrics::default();
    }
    rtts.sort_by(f64::total_cmp);

    LatencyMetrics {
        avg_ms: round_to(mean(&rtts), 2),
        min_ms: round_to(rtts[0], 2),
        max_ms: round_to(rtts[rtts.len() - 1], 2),
        jitter_ms: round_to(sample_std_dev(&rtts), 2),
    }
}

pub fn throughput(records: &[PacketRecord]) -> ThroughputMetrics {
    let Some((start, end)) = time_span(records) else {
        return ThroughputMetrics::default();
    };
    let duration = end - start;
    if duration <= 0.0 {
        return ThroughputMetrics::default();
    }

    let total_bytes: u64 = records.iter().map(|r| u64::from(r.length)).sum();
    let avg_kbps = (total_bytes as f64 * 8.0) / (duration * 1000.0);

    let mut windows: HashMap<u64, u64> = HashMap::new();
    for record in records {
        let index = ((record.timestamp - start) / PEAK_WINDOW_SECS).floor() as u64;
        *windows.entry(index).or_insert(0) += u64::from(record.length);
    }
    let busiest = windows.values().copied().max().unwrap_or(0);
    let windowed_peak = (busiest as f64 * 8.0) / (PEAK_WINDOW_SECS * 1000.0);

    // The whole capture is itself a candidate window
    let peak_kbps = windowed_peak.max(avg_kbps);

    ThroughputMetrics {
        avg_kbps: round_to(avg_kbps, 2),
        peak_kbps: round_to(peak_kbps, 2),
    }
}

/// TTL-variation proxy for radio signal quality. Not a radio measurement.
pub fn signal_strength(records: &[PacketRecord]) -> SignalMetrics {
    let ttls: Vec<f64> = records.iter().filter_map(|r| r.ttl).map(f64::from).collect();
    let ttl_std_dev = if ttls.len() < MIN_TTL_SAMPLES { 0.0 } else { sample_std_dev(&ttls) };

    let rssi_dbm = round_to((BASE_RSSI_DBM - 2.0 * ttl_std_dev).clamp(RSSI_RANGE_DBM.0, RSSI_RANGE_DBM.1), 1);
    let sinr_db = round_to(((rssi_dbm + 120.0) / 3.0 - 5.0).clamp(SINR_RANGE_DB.0, SINR_RANGE_DB.1), 1);

    SignalMetrics { rssi_dbm, sinr_db }
}

/// Retransmissions are repeated sequence numbers within a flow.
pub fn packet_loss(records: &[PacketRecord]) -> PacketLossMetrics {
    let flows = group_by_connection(records.iter().filter(|r| r.is_tcp()));

    let mut total_packets = 0usize;
    let mut retransmits = 0usize;
    for (_, group) in flows.iter_all() {
        total_packets += group.len();

        let mut seen: HashMap<u32, usize> = HashMap::new();
        for seq in group.iter().filter_map(|r| r.tcp().and_then(|t| t.seq)) {
            *seen.entry(seq).or_insert(0) += 1;
        }
        retransmits += seen.values().map(|count| count - 1).sum::<usize>();
    }

    if total_packets == 0 {
        return PacketLossMetrics::default();
    }

    PacketLossMetrics {
        loss_percentage: round_to(100.0 * retransmits as f64 / total_packets as f64, 2),
        retransmits: retransmits as f64,
        total_packets: None,
    }
}

pub fn connection_stats(records: &[PacketRecord]) -> ConnectionStats {
    let flows = group_by_connection(records.iter().filter(|r| r.is_tcp()));

    let mut handshakes: Vec<f64> = flows
        .iter_all()
        .filter_map(|(_, group)| handshake_ms(group))
        .collect();
    handshakes.sort_by(f64::total_cmp);

    ConnectionStats {
        total_connections: flows.keys().count() as f64,
        handshake_time_ms: if handshakes.is_empty() { 0.0 } else { round_to(mean(&handshakes), 2) },
    }
}

/// Earliest SYN, then the earliest SYN-ACK after it, then the earliest pure
/// ACK after that.
fn handshake_ms(group: &[&PacketRecord]) -> Option<f64> {
    let syn = group
        .iter()
        .filter(|r| r.tcp().is_some_and(|t| t.flags.is_syn()))
        .min_by(|a, b| a.timestamp.total_cmp(&b.timestamp))?;
    let syn_ack = earliest_after(group, syn.timestamp, |r| r.tcp().is_some_and(|t| t.flags.is_syn_ack()))?;
    let ack = earliest_after(group, syn_ack.timestamp, |r| r.tcp().is_some_and(|t| t.flags.is_pure_ack()))?;
    Some((ack.timestamp - syn.timestamp) * 1000.0)
}

fn earliest_after<'a, F>(group: &[&'a PacketRecord], after: f64, matches: F) -> Option<&'a PacketRecord>
where
    F: Fn(&PacketRecord) -> bool,
{
    group
        .iter()
        .copied()
        .filter(|r| r.timestamp > after && matches(*r))
        .min_by(|a, b| a.timestamp.total_cmp(&b.timestamp))
}

fn time_span(records: &[PacketRecord]) -> Option<(f64, f64)> {
    let first = records.first()?.timestamp;
    Some(records.iter().fold((first, first), |(lo, hi), r| (lo.min(r.timestamp), hi.max(r.timestamp))))
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample (n - 1) standard deviation; 0 for fewer than two values.
fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
