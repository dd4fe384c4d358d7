//! Quality grading of an extracted [`MetricsSnapshot`].
//!
//! Each family gets a grade from fixed cut-offs plus the issues and
//! recommendations that apply to its values. Grading reads the snapshot only;
//! the metrics document itself is unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::models::dto::MetricsSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quality::Excellent => write!(f, "excellent"),
            Quality::Good => write!(f, "good"),
            Quality::Fair => write!(f, "fair"),
            Quality::Poor => write!(f, "poor"),
        }
    }
}

/// Cut-offs for excellent, good and fair, in that order. Anything past the
/// last one is poor.
#[derive(Clone, Copy)]
pub enum Grading {
    /// Lower is better; each bound is exclusive.
    Below(fn(&MetricsSnapshot) -> f64, [f64; 3]),
    /// Higher is better; each bound is exclusive.
    Above(fn(&MetricsSnapshot) -> f64, [f64; 3]),
    /// Both values must clear their bound for the grade.
    BothAbove(fn(&MetricsSnapshot) -> (f64, f64), [(f64, f64); 3]),
}

const GRADES: [Quality; 3] = [Quality::Excellent, Quality::Good, Quality::Fair];

impl Grading {
    pub fn grade(&self, snapshot: &MetricsSnapshot) -> Quality {
        let position = match *self {
            Grading::Below(value, cutoffs) => {
                let v = value(snapshot);
                cutoffs.iter().position(|&c| v < c)
            }
            Grading::Above(value, cutoffs) => {
                let v = value(snapshot);
                cutoffs.iter().position(|&c| v > c)
            }
            Grading::BothAbove(value, cutoffs) => {
                let (a, b) = value(snapshot);
                cutoffs.iter().position(|&(ca, cb)| a > ca && b > cb)
            }
        };
        position.map_or(Quality::Poor, |i| GRADES[i])
    }
}

/// A fixed text that applies when its condition holds.
#[derive(Clone, Copy)]
pub struct Note {
    pub when: fn(&MetricsSnapshot) -> bool,
    pub text: &'static str,
}

pub struct QualityRule {
    pub family: &'static str,
    pub grading: Grading,
    pub issues: &'static [Note],
    /// Recommendations are all given together once any trigger holds.
    pub recommend_when: fn(&MetricsSnapshot) -> bool,
    pub recommendations: &'static [&'static str],
}

impl QualityRule {
    pub fn assess(&self, snapshot: &MetricsSnapshot) -> FamilyAssessment {
        let issues = self.issues.iter().filter(|n| (n.when)(snapshot)).map(|n| n.text.to_string()).collect();
        let recommendations = if (self.recommend_when)(snapshot) {
            self.recommendations.iter().map(|r| r.to_string()).collect()
        } else {
            Vec::new()
        };
        FamilyAssessment {
            family: self.family.to_string(),
            quality: self.grading.grade(snapshot),
            issues,
            recommendations,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyAssessment {
    pub family: String,
    pub quality: Quality,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub families: Vec<FamilyAssessment>,
}

impl QualityReport {
    pub fn get(&self, family: &str) -> Option<&FamilyAssessment> {
        self.families.iter().find(|a| a.family == family)
    }
}

fn throughput_mbps(m: &MetricsSnapshot) -> (f64, f64) {
    (m.throughput.avg_kbps / 1000.0, m.throughput.peak_kbps / 1000.0)
}

/// One entry per family, in document order.
pub static QUALITY_RULES: &[QualityRule] = &[
    QualityRule {
        family: "latency",
        grading: Grading::Below(|m| m.latency.avg_ms, [50.0, 100.0, 150.0]),
        issues: &[
            Note { when: |m| m.latency.avg_ms > 100.0, text: "High average latency" },
            Note { when: |m| m.latency.jitter_ms > 20.0, text: "High jitter indicates unstable connection" },
        ],
        recommend_when: |m| m.latency.avg_ms > 100.0 || m.latency.jitter_ms > 20.0,
        recommendations: &[
            "Optimize network parameters to reduce latency and jitter",
            "Check for network congestion or interference",
        ],
    },
    QualityRule {
        family: "throughput",
        grading: Grading::Above(|m| throughput_mbps(m).0, [100.0, 50.0, 10.0]),
        issues: &[
            Note { when: |m| throughput_mbps(m).0 < 10.0, text: "Low average throughput for 5G" },
            Note { when: |m| throughput_mbps(m).1 < 20.0, text: "Low peak throughput indicates potential limitations" },
            Note {
                when: |m| {
                    let (avg, peak) = throughput_mbps(m);
                    peak > avg * 5.0
                },
                text: "Large discrepancy between average and peak throughput",
            },
        ],
        recommend_when: |m| throughput_mbps(m).0 < 50.0,
        recommendations: &[
            "Check for signal quality issues affecting throughput",
            "Verify if the modem is connecting to optimal 5G bands",
        ],
    },
    QualityRule {
        family: "signal_strength",
        grading: Grading::BothAbove(
            |m| (m.signal_strength.rssi_dbm, m.signal_strength.sinr_db),
            [(-70.0, 20.0), (-80.0, 10.0), (-90.0, 5.0)],
        ),
        issues: &[
            Note { when: |m| m.signal_strength.rssi_dbm < -90.0, text: "Weak signal strength (RSSI)" },
            Note { when: |m| m.signal_strength.sinr_db < 5.0, text: "Poor signal-to-noise ratio (SINR)" },
        ],
        recommend_when: |m| m.signal_strength.rssi_dbm < -85.0 || m.signal_strength.sinr_db < 10.0,
        recommendations: &[
            "Check for physical obstructions or interference sources",
            "Consider repositioning the modem or using external antennas",
            "Verify if the modem is connecting to the optimal cell tower",
        ],
    },
    QualityRule {
        family: "packet_loss",
        grading: Grading::Below(|m| m.packet_loss.loss_percentage, [0.1, 0.5, 2.0]),
        issues: &[Note { when: |m| m.packet_loss.loss_percentage > 1.0, text: "High packet loss rate" }],
        recommend_when: |m| m.packet_loss.loss_percentage > 1.0,
        recommendations: &[
            "Check for interference or signal quality issues",
            "Verify if error correction mechanisms are properly configured",
        ],
    },
    QualityRule {
        family: "connection_stats",
        grading: Grading::Below(|m| m.connection_stats.handshake_time_ms, [50.0, 100.0, 200.0]),
        issues: &[Note { when: |m| m.connection_stats.handshake_time_ms > 150.0, text: "Slow TCP handshake times" }],
        recommend_when: |m| m.connection_stats.handshake_time_ms > 150.0,
        recommendations: &[
            "Optimize TCP parameters for better connection establishment",
            "Check for network congestion affecting connection setup",
        ],
    },
];

pub fn assess(snapshot: &MetricsSnapshot) -> QualityReport {
    let families: Vec<FamilyAssessment> = QUALITY_RULES.iter().map(|rule| rule.assess(snapshot)).collect();
    for a in &families {
        debug!(family = %a.family, quality = %a.quality, issues = a.issues.len(), "family graded");
    }
    QualityReport { families }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> MetricsSnapshot {
        let mut m = MetricsSnapshot::NO_DATA;
        m.latency.avg_ms = 20.0;
        m.throughput.avg_kbps = 150_000.0;
        m.throughput.peak_kbps = 200_000.0;
        m.signal_strength.rssi_dbm = -60.0;
        m.signal_strength.sinr_db = 25.0;
        m
    }

    fn grade_of(family: &str, m: &MetricsSnapshot) -> Quality {
        assess(m).get(family).unwrap().quality
    }

    #[test]
    fn test_grade_boundaries() {
        type Set = fn(&mut MetricsSnapshot, f64);
        let set_latency: Set = |m, v| m.latency.avg_ms = v;
        let set_throughput: Set = |m, v| m.throughput.avg_kbps = v;
        let set_loss: Set = |m, v| m.packet_loss.loss_percentage = v;
        let set_handshake: Set = |m, v| m.connection_stats.handshake_time_ms = v;

        use Quality::*;
        let cases: &[(&str, Set, f64, Quality)] = &[
            ("latency", set_latency, 49.99, Excellent),
            ("latency", set_latency, 50.0, Good),
            ("latency", set_latency, 99.99, Good),
            ("latency", set_latency, 100.0, Fair),
            ("latency", set_latency, 149.99, Fair),
            ("latency", set_latency, 150.0, Poor),
            ("throughput", set_throughput, 100_001.0, Excellent),
            ("throughput", set_throughput, 100_000.0, Good),
            ("throughput", set_throughput, 50_001.0, Good),
            ("throughput", set_throughput, 50_000.0, Fair),
            ("throughput", set_throughput, 10_001.0, Fair),
            ("throughput", set_throughput, 10_000.0, Poor),
            ("packet_loss", set_loss, 0.09, Excellent),
            ("packet_loss", set_loss, 0.1, Good),
            ("packet_loss", set_loss, 0.49, Good),
            ("packet_loss", set_loss, 0.5, Fair),
            ("packet_loss", set_loss, 1.99, Fair),
            ("packet_loss", set_loss, 2.0, Poor),
            ("connection_stats", set_handshake, 49.0, Excellent),
            ("connection_stats", set_handshake, 50.0, Good),
            ("connection_stats", set_handshake, 100.0, Fair),
            ("connection_stats", set_handshake, 199.0, Fair),
            ("connection_stats", set_handshake, 200.0, Poor),
        ];
        for &(family, set, value, expected) in cases {
            let mut m = snapshot();
            set(&mut m, value);
            assert_eq!(grade_of(family, &m), expected, "{} = {}", family, value);
        }
    }

    #[test]
    fn test_signal_grade_needs_both_values() {
        use Quality::*;
        let cases = [
            (-69.9, 20.1, Excellent),
            (-70.0, 25.0, Good),
            (-60.0, 20.0, Good),
            (-79.9, 10.1, Good),
            (-80.0, 15.0, Fair),
            (-75.0, 10.0, Fair),
            (-89.9, 5.1, Fair),
            (-90.0, 10.0, Poor),
            (-60.0, 5.0, Poor),
        ];
        for (rssi, sinr, expected) in cases {
            let mut m = snapshot();
            m.signal_strength.rssi_dbm = rssi;
            m.signal_strength.sinr_db = sinr;
            assert_eq!(grade_of("signal_strength", &m), expected, "rssi {} sinr {}", rssi, sinr);
        }
    }

    #[test]
    fn test_issues_and_recommendations() {
        let clean = assess(&snapshot());
        for a in &clean.families {
            assert!(a.issues.is_empty(), "{}: {:?}", a.family, a.issues);
            assert!(a.recommendations.is_empty(), "{}", a.family);
        }

        let mut m = snapshot();
        m.latency.jitter_ms = 25.0;
        m.throughput.avg_kbps = 3_000.0;
        m.throughput.peak_kbps = 18_000.0;
        let report = assess(&m);

        let latency = report.get("latency").unwrap();
        assert_eq!(latency.quality, Quality::Excellent);
        assert_eq!(latency.issues, vec!["High jitter indicates unstable connection"]);
        assert_eq!(latency.recommendations.len(), 2);

        let throughput = report.get("throughput").unwrap();
        assert_eq!(throughput.quality, Quality::Poor);
        assert_eq!(
            throughput.issues,
            vec![
                "Low average throughput for 5G",
                "Low peak throughput indicates potential limitations",
                "Large discrepancy between average and peak throughput",
            ]
        );
        assert_eq!(throughput.recommendations.len(), 2);
    }

    #[test]
    fn test_recommendation_triggers_differ_from_issues() {
        // Signal recommendations start at -85 dBm, the issue only below -90
        let mut m = snapshot();
        m.signal_strength.rssi_dbm = -87.0;
        let signal = assess(&m).get("signal_strength").cloned().unwrap();
        assert!(signal.issues.is_empty());
        assert_eq!(signal.recommendations.len(), 3);
        assert_eq!(signal.quality, Quality::Fair);
    }

    #[test]
    fn test_family_order_and_no_data() {
        let report = assess(&MetricsSnapshot::NO_DATA);
        let families: Vec<&str> = report.families.iter().map(|a| a.family.as_str()).collect();
        assert_eq!(families, vec!["latency", "throughput", "signal_strength", "packet_loss", "connection_stats"]);
        // zero latency grades excellent; zero throughput grades poor
        assert_eq!(report.get("latency").unwrap().quality, Quality::Excellent);
        assert_eq!(report.get("throughput").unwrap().quality, Quality::Poor);
        assert_eq!(report.get("signal_strength").unwrap().quality, Quality::Good);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["families"][0]["quality"], "excellent");
    }
}
