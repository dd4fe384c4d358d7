pub mod domain {
    use serde::{Deserialize, Serialize};
    use std::fmt;
    use std::net::IpAddr;

    /// One decoded packet from a capture.
    ///
    /// Every optional field is `None` when the packet did not carry it. A value
    /// of zero is an observed zero.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct PacketRecord {
        pub timestamp: f64,
        pub length: u32,
        #[serde(flatten)]
        pub transport: Transport,
        pub src_ip: Option<IpAddr>,
        pub dst_ip: Option<IpAddr>,
        pub ttl: Option<u8>,
        pub src_port: Option<u16>,
        pub dst_port: Option<u16>,
        #[serde(default)]
        pub is_5g_control: bool,
    }

    impl PacketRecord {
        pub fn new(timestamp: f64, length: u32, transport: Transport) -> Self {
            PacketRecord {
                timestamp,
                length,
                transport,
                src_ip: None,
                dst_ip: None,
                ttl: None,
                src_port: None,
                dst_port: None,
                is_5g_control: false,
            }
        }

        pub fn tcp(&self) -> Option<&TcpSegment> {
            match &self.transport {
                Transport::Tcp(segment) => Some(segment),
                _ => None,
            }
        }

        pub fn is_tcp(&self) -> bool {
            self.tcp().is_some()
        }

        pub fn connection_key(&self) -> Option<ConnectionKey> {
            Some(ConnectionKey {
                src_ip: self.src_ip?,
                dst_ip: self.dst_ip?,
                src_port: self.src_port?,
                dst_port: self.dst_port?,
            })
        }
    }

    /// Transport layer of a packet. TCP segments always carry their flags.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "transport")]
    pub enum Transport {
        #[serde(rename = "TCP")]
        Tcp(TcpSegment),
        #[serde(rename = "UDP")]
        Udp,
        #[serde(rename = "OTHER")]
        Other,
        #[serde(rename = "UNKNOWN")]
        Unknown,
    }

    impl Transport {
        pub fn name(&self) -> &'static str {
            match self {
                Transport::Tcp(_) => "TCP",
                Transport::Udp => "UDP",
                Transport::Other => "OTHER",
                Transport::Unknown => "UNKNOWN",
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct TcpSegment {
        #[serde(rename = "tcp_flags")]
        pub flags: TcpFlags,
        pub seq: Option<u32>,
        pub ack: Option<u32>,
    }

    impl TcpSegment {
        pub fn new(flags: TcpFlags) -> Self {
            TcpSegment { flags, seq: None, ack: None }
        }
    }

    /// TCP control bits, written as the usual flag letters (`FSRPAUEC`).
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(from = "String", into = "String")]
    pub struct TcpFlags {
        pub fin: bool,
        pub syn: bool,
        pub rst: bool,
        pub psh: bool,
        pub ack: bool,
        pub urg: bool,
        pub ece: bool,
        pub cwr: bool,
    }

    const FLAG_LETTERS: [char; 8] = ['F', 'S', 'R', 'P', 'A', 'U', 'E', 'C'];

    impl TcpFlags {
        /// Builds the set from flag letters. Letters outside `FSRPAUEC` are ignored.
        pub fn from_letters(letters: &str) -> Self {
            let mut flags = TcpFlags::default();
            for c in letters.chars() {
                match c.to_ascii_uppercase() {
                    'F' => flags.fin = true,
                    'S' => flags.syn = true,
                    'R' => flags.rst = true,
                    'P' => flags.psh = true,
                    'A' => flags.ack = true,
                    'U' => flags.urg = true,
                    'E' => flags.ece = true,
                    'C' => flags.cwr = true,
                    _ => {}
                }
            }
            flags
        }

        pub fn contains(&self, letter: char) -> bool {
            match letter.to_ascii_uppercase() {
                'F' => self.fin,
                'S' => self.syn,
                'R' => self.rst,
                'P' => self.psh,
                'A' => self.ack,
                'U' => self.urg,
                'E' => self.ece,
                'C' => self.cwr,
                _ => false,
            }
        }

        /// Opening segment of a handshake: S without A.
        pub fn is_syn(&self) -> bool {
            self.syn && !self.ack
        }

        pub fn is_syn_ack(&self) -> bool {
            self.syn && self.ack
        }

        /// Handshake completion: A without S.
        pub fn is_pure_ack(&self) -> bool {
            self.ack && !self.syn
        }
    }

    impl fmt::Display for TcpFlags {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            for letter in FLAG_LETTERS {
                if self.contains(letter) {
                    write!(f, "{}", letter)?;
                }
            }
            Ok(())
        }
    }

    impl From<String> for TcpFlags {
        fn from(letters: String) -> Self {
            TcpFlags::from_letters(&letters)
        }
    }

    impl From<TcpFlags> for String {
        fn from(flags: TcpFlags) -> Self {
            flags.to_string()
        }
    }

    /// Flow identity used for grouping. Direction matters: a reply travels
    /// under the reversed key.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct ConnectionKey {
        pub src_ip: IpAddr,
        pub dst_ip: IpAddr,
        pub src_port: u16,
        pub dst_port: u16,
    }

    impl fmt::Display for ConnectionKey {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}:{} -> {}:{}", self.src_ip, self.src_port, self.dst_ip, self.dst_port)
        }
    }
}

pub mod dto {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Serialize};
    use std::fmt;

    #[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct LatencyMetrics {
        pub avg_ms: f64,
        pub min_ms: f64,
        pub max_ms: f64,
        pub jitter_ms: f64,
    }

    #[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct ThroughputMetrics {
        pub avg_kbps: f64,
        pub peak_kbps: f64,
    }

    /// Signal figures derived from TTL variation. A proxy only: a packet
    /// capture carries no radio-layer measurements.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct SignalMetrics {
        pub rssi_dbm: f64,
        pub sinr_db: f64,
    }

    #[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct PacketLossMetrics {
        pub loss_percentage: f64,
        pub retransmits: f64,
        /// Packet count the retransmissions are measured against. Only present
        /// when a producer supplies it.
        #[serde(skip_serializing_if = "Option::is_none")]
        pub total_packets: Option<f64>,
    }

    #[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct ConnectionStats {
        pub total_connections: f64,
        pub handshake_time_ms: f64,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct HandoverMetrics {
        pub handovers_detected: f64,
        pub success_rate: f64,
        pub avg_duration_ms: f64,
    }

    impl Default for HandoverMetrics {
        fn default() -> Self {
            HandoverMetrics {
                handovers_detected: 0.0,
                success_rate: 100.0,
                avg_duration_ms: 0.0,
            }
        }
    }

    /// The five metric families computed for one capture prefix.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
    pub struct MetricsSnapshot {
        pub latency: LatencyMetrics,
        pub throughput: ThroughputMetrics,
        pub signal_strength: SignalMetrics,
        pub packet_loss: PacketLossMetrics,
        pub connection_stats: ConnectionStats,
    }

    impl MetricsSnapshot {
        /// Values reported when there is nothing to measure. The signal pair is
        /// what the TTL proxy yields with no observed variation.
        pub const NO_DATA: MetricsSnapshot = MetricsSnapshot {
            latency: LatencyMetrics { avg_ms: 0.0, min_ms: 0.0, max_ms: 0.0, jitter_ms: 0.0 },
            throughput: ThroughputMetrics { avg_kbps: 0.0, peak_kbps: 0.0 },
            signal_strength: SignalMetrics { rssi_dbm: -65.0, sinr_db: 13.3 },
            packet_loss: PacketLossMetrics { loss_percentage: 0.0, retransmits: 0.0, total_packets: None },
            connection_stats: ConnectionStats { total_connections: 0.0, handshake_time_ms: 0.0 },
        };
    }

    /// Detector view of a metrics document: any family may be missing.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
    pub struct DetectorInput {
        #[serde(skip_serializing_if = "Option::is_none")]
        pub latency: Option<LatencyMetrics>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub throughput: Option<ThroughputMetrics>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub signal_strength: Option<SignalMetrics>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub packet_loss: Option<PacketLossMetrics>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub connection_stats: Option<ConnectionStats>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub handovers: Option<HandoverMetrics>,
    }

    impl From<&MetricsSnapshot> for DetectorInput {
        fn from(snapshot: &MetricsSnapshot) -> Self {
            DetectorInput {
                latency: Some(snapshot.latency),
                throughput: Some(snapshot.throughput),
                signal_strength: Some(snapshot.signal_strength),
                packet_loss: Some(snapshot.packet_loss),
                connection_stats: Some(snapshot.connection_stats),
                handovers: None,
            }
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum Severity {
        Low,
        Medium,
        High,
    }

    impl fmt::Display for Severity {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Severity::Low => write!(f, "low"),
                Severity::Medium => write!(f, "medium"),
                Severity::High => write!(f, "high"),
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Anomaly {
        #[serde(rename = "type")]
        pub kind: String,
        pub metric: String,
        pub value: f64,
        pub threshold: f64,
        pub severity: Severity,
        pub description: String,
        pub impact: String,
        pub possible_causes: Vec<String>,
        #[serde(with = "detected_at_format")]
        pub detected_at: NaiveDateTime,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct DetectionReport {
        pub anomalies: Vec<Anomaly>,
        pub total_anomalies: usize,
        pub sensitivity: crate::detection::Sensitivity,
    }

    mod detected_at_format {
        use chrono::NaiveDateTime;
        use serde::{Deserialize, Deserializer, Serializer};

        const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

        pub fn serialize<S: Serializer>(at: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.collect_str(&at.format(FORMAT))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
            let raw = String::deserialize(deserializer)?;
            NaiveDateTime::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
        }
    }
}
