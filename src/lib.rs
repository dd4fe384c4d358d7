//! Packet-capture performance metrics and threshold anomaly detection for
//! 5G modem traffic.
//!
//! The pipeline reads a bounded prefix of a capture ([`capture`]), computes a
//! [`MetricsSnapshot`] ([`metrics`]), grades it ([`quality`]) and flags
//! out-of-range values ([`detection`]). The extractor and detector also work on their own, on
//! records or snapshots supplied by the caller.
//!
//! Signal strength figures are a proxy derived from IP TTL variation, not a
//! radio-layer measurement.

pub mod capture;
pub mod config;
pub mod detection;
pub mod error;
pub mod metrics;
pub mod models;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod quality;

pub use capture::{read_prefix, CaptureError, CapturePrefix, CapturedPacket, PacketSource, VecSource};
#[cfg(feature = "pcap")]
pub use capture::PcapFileSource;
pub use config::Config;
pub use detection::{Detector, Sensitivity};
pub use error::{Error, Result};
pub use metrics::{Extractor, ExtractorConfig, FamilySelection};
pub use models::domain::{ConnectionKey, PacketRecord, TcpFlags, TcpSegment, Transport};
pub use models::dto::{Anomaly, DetectionReport, DetectorInput, MetricsSnapshot, Severity};
pub use pipeline::{analyze_source, Analysis};
pub use quality::{assess, FamilyAssessment, Quality, QualityReport};
#[cfg(feature = "pcap")]
pub use pipeline::analyze_file;
