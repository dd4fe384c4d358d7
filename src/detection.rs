//! Anomaly Detector.
//!
//! Findings come from a fixed table of threshold rules evaluated in family
//! order (latency, throughput, signal, packet loss, connection/handover).
//! Each rule stands alone; overlapping causes are not merged.

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::models::dto::{Anomaly, DetectionReport, DetectorInput, MetricsSnapshot, Severity};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    Low,
    #[default]
    Medium,
    High,
}

impl Sensitivity {
    pub fn threshold_factor(self) -> f64 {
        match self {
            Sensitivity::Low => 3.0,
            Sensitivity::Medium => 2.5,
            Sensitivity::High => 2.0,
        }
    }
}

impl FromStr for Sensitivity {
    type Err = std::convert::Infallible;

    /// Case-insensitive; anything unrecognised is `Medium`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "low" => Sensitivity::Low,
            "high" => Sensitivity::High,
            _ => Sensitivity::Medium,
        })
    }
}

impl fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sensitivity::Low => write!(f, "low"),
            Sensitivity::Medium => write!(f, "medium"),
            Sensitivity::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Latency,
    Throughput,
    Signal,
    PacketLoss,
    Connection,
}

/// Passed to every rule. No rule in [`RULES`] scales with the factor yet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleContext {
    pub threshold_factor: f64,
}

/// The measured value of a rule and the threshold it is held against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub value: f64,
    pub threshold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Above,
    Below,
}

impl Comparator {
    fn breached(self, reading: Reading) -> bool {
        match self {
            Comparator::Above => reading.value > reading.threshold,
            Comparator::Below => reading.value < reading.threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Escalation {
    Fixed(Severity),
    /// High past the bound, medium otherwise.
    HighAbove(f64),
    HighBelow(f64),
}

impl Escalation {
    fn severity(self, value: f64) -> Severity {
        match self {
            Escalation::Fixed(severity) => severity,
            Escalation::HighAbove(bound) if value > bound => Severity::High,
            Escalation::HighBelow(bound) if value < bound => Severity::High,
            _ => Severity::Medium,
        }
    }
}

pub struct Rule {
    pub kind: &'static str,
    pub metric: &'static str,
    pub family: Family,
    /// `None` when the family is missing or the rule's preconditions fail.
    pub reading: fn(&DetectorInput, &RuleContext) -> Option<Reading>,
    pub comparator: Comparator,
    pub escalation: Escalation,
    pub description: &'static str,
    pub impact: &'static str,
    pub possible_causes: &'static [&'static str],
}

impl Rule {
    pub fn evaluate(&self, input: &DetectorInput, ctx: &RuleContext, detected_at: NaiveDateTime) -> Option<Anomaly> {
        let reading = (self.reading)(input, ctx)?;
        if !self.comparator.breached(reading) {
            return None;
        }
        Some(Anomaly {
            kind: self.kind.to_string(),
            metric: self.metric.to_string(),
            value: reading.value,
            threshold: reading.threshold,
            severity: self.escalation.severity(reading.value),
            description: self.description.to_string(),
            impact: self.impact.to_string(),
            possible_causes: self.possible_causes.iter().map(|c| c.to_string()).collect(),
            detected_at,
        })
    }
}

fn fixed(value: f64, threshold: f64) -> Option<Reading> {
    Some(Reading { value, threshold })
}

// Ratio of two readings, only when both are positive
fn ratio(numerator: f64, denominator: f64, threshold: f64) -> Option<Reading> {
    (numerator > 0.0 && denominator > 0.0).then(|| Reading { value: numerator / denominator, threshold })
}

pub static RULES: &[Rule] = &[
    Rule {
        kind: "High Latency",
        metric: "avg_ms",
        family: Family::Latency,
        reading: |m, _| fixed(m.latency?.avg_ms, 150.0),
        comparator: Comparator::Above,
        escalation: Escalation::HighAbove(200.0),
        description: "Average latency is above the acceptable threshold for 5G.",
        impact: "High latency affects real-time applications, gaming, and video calls.",
        possible_causes: &["Network congestion", "Distance from base station", "Interference", "Backhaul limitations"],
    },
    Rule {
        kind: "High Jitter",
        metric: "jitter_ms",
        family: Family::Latency,
        reading: |m, _| fixed(m.latency?.jitter_ms, 30.0),
        comparator: Comparator::Above,
        escalation: Escalation::HighAbove(50.0),
        description: "Latency variation (jitter) is above acceptable levels.",
        impact: "High jitter causes instability in real-time applications and streaming.",
        possible_causes: &[
            "Network congestion",
            "Interference",
            "Cell tower handover issues",
            "Radio resource scheduling inconsistency",
        ],
    },
    Rule {
        kind: "Latency Spikes",
        metric: "latency_ratio",
        family: Family::Latency,
        reading: |m, _| {
            let latency = m.latency?;
            ratio(latency.max_ms, latency.min_ms, 10.0)
        },
        comparator: Comparator::Above,
        escalation: Escalation::Fixed(Severity::Medium),
        description: "Large discrepancy between minimum and maximum latency.",
        impact: "Intermittent performance issues and unpredictable user experience.",
        possible_causes: &[
            "Interference spikes",
            "Cell tower handovers",
            "Congestion patterns",
            "Competing network traffic",
        ],
    },
    Rule {
        kind: "Low Throughput",
        metric: "avg_kbps",
        family: Family::Throughput,
        // 50 Mbps, compared in kbps
        reading: |m, _| fixed(m.throughput?.avg_kbps, 50_000.0),
        comparator: Comparator::Below,
        escalation: Escalation::HighBelow(20_000.0),
        description: "Average throughput is below expected 5G performance.",
        impact: "Slow data transfers, buffering during streaming, and poor download/upload speeds.",
        possible_causes: &[
            "Poor signal quality",
            "Network congestion",
            "Suboptimal frequency band allocation",
            "Cell edge conditions",
            "Backhaul limitations",
        ],
    },
    Rule {
        kind: "Inconsistent Throughput",
        metric: "throughput_ratio",
        family: Family::Throughput,
        reading: |m, _| {
            let throughput = m.throughput?;
            ratio(throughput.peak_kbps, throughput.avg_kbps, 10.0)
        },
        comparator: Comparator::Above,
        escalation: Escalation::Fixed(Severity::Medium),
        description: "Large discrepancy between average and peak throughput.",
        impact: "Inconsistent user experience with periods of high performance followed by slowdowns.",
        possible_causes: &[
            "Network load fluctuations",
            "Interference patterns",
            "Dynamic frequency allocation issues",
            "Scheduling algorithm inefficiencies",
        ],
    },
    Rule {
        kind: "Weak Signal",
        metric: "rssi_dbm",
        family: Family::Signal,
        reading: |m, _| fixed(m.signal_strength?.rssi_dbm, -100.0),
        comparator: Comparator::Below,
        escalation: Escalation::HighBelow(-110.0),
        description: "Signal strength (RSSI) is below the acceptable threshold.",
        impact: "Poor connection quality, frequent disconnections, and reduced data rates.",
        possible_causes: &[
            "Distance from cell tower",
            "Physical obstructions",
            "Building penetration losses",
            "Antenna misalignment",
        ],
    },
    Rule {
        kind: "Poor Signal Quality",
        metric: "sinr_db",
        family: Family::Signal,
        reading: |m, _| fixed(m.signal_strength?.sinr_db, 5.0),
        comparator: Comparator::Below,
        escalation: Escalation::HighBelow(0.0),
        description: "Signal-to-interference-plus-noise ratio (SINR) is below the acceptable threshold.",
        impact: "Reduced throughput, higher error rates, and more frequent retransmissions.",
        possible_causes: &[
            "Interference from other transmitters",
            "Cell overlap issues",
            "Environmental noise",
            "Multipath fading",
        ],
    },
    Rule {
        kind: "High Packet Loss",
        metric: "loss_percentage",
        family: Family::PacketLoss,
        reading: |m, _| fixed(m.packet_loss?.loss_percentage, 2.0),
        comparator: Comparator::Above,
        escalation: Escalation::HighAbove(5.0),
        description: "Packet loss rate is above the acceptable threshold.",
        impact: "Connection instability, retransmissions, and degraded application performance.",
        possible_causes: &[
            "Poor signal quality",
            "Network congestion",
            "Radio interference",
            "Hardware issues",
            "Mobility challenges during handovers",
        ],
    },
    Rule {
        kind: "Excessive Retransmissions",
        metric: "retransmits",
        family: Family::PacketLoss,
        reading: |m, _| {
            let loss = m.packet_loss?;
            let total = loss.total_packets.filter(|t| *t > 0.0)?;
            fixed(loss.retransmits, total * 0.05)
        },
        comparator: Comparator::Above,
        escalation: Escalation::Fixed(Severity::Medium),
        description: "High number of packet retransmissions.",
        impact: "Reduced effective throughput and increased latency due to retransmission overhead.",
        possible_causes: &[
            "Signal quality fluctuations",
            "Interference spikes",
            "Suboptimal modulation and coding scheme selection",
            "Error correction limitations",
        ],
    },
    Rule {
        kind: "Slow Connection Establishment",
        metric: "handshake_time_ms",
        family: Family::Connection,
        reading: |m, _| fixed(m.connection_stats?.handshake_time_ms, 300.0),
        comparator: Comparator::Above,
        escalation: Escalation::Fixed(Severity::Medium),
        description: "TCP handshake time is abnormally high.",
        impact: "Delayed connection setup affecting application start times and responsiveness.",
        possible_causes: &[
            "Network congestion",
            "High latency",
            "Suboptimal TCP parameters",
            "Middlebox interference",
        ],
    },
    Rule {
        kind: "Handover Failures",
        metric: "handover_success_rate",
        family: Family::Connection,
        reading: |m, _| fixed(m.handovers?.success_rate, 90.0),
        comparator: Comparator::Below,
        escalation: Escalation::HighBelow(80.0),
        description: "Cell handover success rate is below the acceptable threshold.",
        impact: "Connection drops during mobility and service interruptions when changing cells.",
        possible_causes: &[
            "Coverage gaps between cells",
            "Improper handover parameter configuration",
            "Timing synchronization issues",
            "Interference in overlapping areas",
        ],
    },
];

#[derive(Clone, Copy)]
pub struct Detector {
    sensitivity: Sensitivity,
    rules: &'static [Rule],
}

impl Detector {
    pub fn new(sensitivity: Sensitivity) -> Self {
        Detector { sensitivity, rules: RULES }
    }

    pub fn sensitivity(&self) -> Sensitivity {
        self.sensitivity
    }

    pub fn detect(&self, input: &DetectorInput) -> DetectionReport {
        self.detect_at(input, Local::now().naive_local())
    }

    pub fn detect_snapshot(&self, snapshot: &MetricsSnapshot) -> DetectionReport {
        self.detect(&DetectorInput::from(snapshot))
    }

    /// Accepts a snapshot object or the extractor's one-element array.
    pub fn detect_json(&self, json: &str) -> Result<DetectionReport> {
        let input = parse_input(json)?;
        Ok(self.detect(&input))
    }

    pub fn detect_at(&self, input: &DetectorInput, detected_at: NaiveDateTime) -> DetectionReport {
        let ctx = RuleContext { threshold_factor: self.sensitivity.threshold_factor() };

        let anomalies: Vec<Anomaly> = self
            .rules
            .iter()
            .filter_map(|rule| rule.evaluate(input, &ctx, detected_at))
            .inspect(|a| {
                warn!(kind = %a.kind, value = a.value, threshold = a.threshold, severity = %a.severity, "anomaly detected")
            })
            .collect();

        info!(total = anomalies.len(), sensitivity = %self.sensitivity, "anomaly detection finished");
        DetectionReport {
            total_anomalies: anomalies.len(),
            anomalies,
            sensitivity: self.sensitivity,
        }
    }
}

impl Default for Detector {
    fn default() -> Self {
        Detector::new(Sensitivity::default())
    }
}

pub fn parse_input(json: &str) -> Result<DetectorInput> {
    let value: serde_json::Value = serde_json::from_str(json).map_err(|e| Error::DataFormat(e.to_string()))?;
    let object = match value {
        object @ serde_json::Value::Object(_) => object,
        serde_json::Value::Array(mut items) => {
            if items.len() != 1 || !items[0].is_object() {
                return Err(Error::DataFormat(format!("expected one metrics record, found {} items", items.len())));
            }
            items.remove(0)
        }
        _ => return Err(Error::DataFormat("expected a metrics object".to_string())),
    };
    serde_json::from_value(object).map_err(|e| Error::DataFormat(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::dto::{LatencyMetrics, PacketLossMetrics, ThroughputMetrics};

    fn at() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2025-03-01 12:00:00", "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn kinds(report: &DetectionReport) -> Vec<&str> {
        report.anomalies.iter().map(|a| a.kind.as_str()).collect()
    }

    #[test]
    fn test_sensitivity_factor() {
        assert_eq!("LOW".parse::<Sensitivity>().unwrap().threshold_factor(), 3.0);
        assert_eq!("medium".parse::<Sensitivity>().unwrap().threshold_factor(), 2.5);
        assert_eq!("high".parse::<Sensitivity>().unwrap().threshold_factor(), 2.0);
        assert_eq!("extreme".parse::<Sensitivity>().unwrap(), Sensitivity::Medium);
    }

    #[test]
    fn test_rules_are_in_family_order() {
        let order = [Family::Latency, Family::Throughput, Family::Signal, Family::PacketLoss, Family::Connection];
        let positions: Vec<usize> = RULES
            .iter()
            .map(|r| order.iter().position(|f| *f == r.family).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_latency_threshold_is_strict() {
        let detector = Detector::default();
        let mut input = DetectorInput {
            latency: Some(LatencyMetrics { avg_ms: 150.0, ..Default::default() }),
            ..Default::default()
        };
        assert!(detector.detect_at(&input, at()).anomalies.is_empty());

        input.latency = Some(LatencyMetrics { avg_ms: 150.01, ..Default::default() });
        let report = detector.detect_at(&input, at());
        assert_eq!(kinds(&report), vec!["High Latency"]);
        assert_eq!(report.anomalies[0].severity, Severity::Medium);
    }

    #[test]
    fn test_missing_family_is_not_evaluated() {
        let report = Detector::default().detect_at(&DetectorInput::default(), at());
        assert_eq!(report.total_anomalies, 0);
    }

    #[test]
    fn test_present_family_defaults_are_evaluated() {
        let input = DetectorInput { throughput: Some(ThroughputMetrics::default()), ..Default::default() };
        let report = Detector::default().detect_at(&input, at());
        assert_eq!(kinds(&report), vec!["Low Throughput"]);
        assert_eq!(report.anomalies[0].severity, Severity::High);
        assert_eq!(report.anomalies[0].threshold, 50_000.0);
    }

    #[test]
    fn test_retransmissions_need_total_packets() {
        let mut input = DetectorInput {
            packet_loss: Some(PacketLossMetrics { loss_percentage: 1.0, retransmits: 40.0, total_packets: None }),
            ..Default::default()
        };
        assert!(Detector::default().detect_at(&input, at()).anomalies.is_empty());

        input.packet_loss = Some(PacketLossMetrics { loss_percentage: 1.0, retransmits: 40.0, total_packets: Some(500.0) });
        let report = Detector::default().detect_at(&input, at());
        assert_eq!(kinds(&report), vec!["Excessive Retransmissions"]);
        assert_eq!(report.anomalies[0].threshold, 25.0);
    }

    #[test]
    fn test_parse_input_shapes() {
        let object = parse_input(r#"{"latency": {"avg_ms": 10}}"#).unwrap();
        assert_eq!(object.latency.unwrap().avg_ms, 10.0);
        assert!(object.throughput.is_none());

        let array = parse_input(r#"[{"throughput": {"avg_kbps": 1.5}}]"#).unwrap();
        assert_eq!(array.throughput.unwrap().avg_kbps, 1.5);

        assert!(matches!(parse_input("not json"), Err(Error::DataFormat(_))));
        assert!(matches!(parse_input("[]"), Err(Error::DataFormat(_))));
        assert!(matches!(parse_input("[{}, {}]"), Err(Error::DataFormat(_))));
        assert!(matches!(parse_input("42"), Err(Error::DataFormat(_))));
        assert!(matches!(parse_input(r#"{"latency": "fast"}"#), Err(Error::DataFormat(_))));
        assert!(matches!(parse_input(r#"{"latency": {"avg_ms": "high"}}"#), Err(Error::DataFormat(_))));
    }

    #[test]
    fn test_report_json_shape() {
        let input = DetectorInput {
            latency: Some(LatencyMetrics { avg_ms: 220.0, jitter_ms: 10.0, min_ms: 50.0, max_ms: 600.0 }),
            ..Default::default()
        };
        let report = Detector::new(Sensitivity::High).detect_at(&input, at());
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["total_anomalies"], 2);
        assert_eq!(json["sensitivity"], "high");
        let first = &json["anomalies"][0];
        assert_eq!(first["type"], "High Latency");
        assert_eq!(first["severity"], "high");
        assert_eq!(first["detected_at"], "2025-03-01 12:00:00");
        assert_eq!(first["possible_causes"].as_array().unwrap().len(), 4);
        assert_eq!(json["anomalies"][1]["metric"], "latency_ratio");
    }
}
