// Capture Reader: pulls a bounded prefix of packets from a source and keeps
// the ones that decode.

use thiserror::Error;
use tracing::{debug, info};

use crate::models::domain::PacketRecord;

#[cfg(feature = "pcap")]
pub use self::file::PcapFileSource;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "pcap")]
    #[error("pcap error: {0}")]
    Pcap(#[from] pcap::Error),
    #[error("unsupported link type {0}")]
    UnsupportedLinkType(i32),
}

/// One packet pulled from a source.
#[derive(Debug, Clone, PartialEq)]
pub enum CapturedPacket {
    Parsed(PacketRecord),
    Unparseable,
}

/// Anything that yields packets in capture order.
pub trait PacketSource {
    /// `Ok(None)` once the source is exhausted.
    fn next_packet(&mut self) -> Result<Option<CapturedPacket>, CaptureError>;
}

/// Records that were decoded elsewhere.
pub struct VecSource {
    records: std::vec::IntoIter<PacketRecord>,
}

impl VecSource {
    pub fn new(records: Vec<PacketRecord>) -> Self {
        VecSource { records: records.into_iter() }
    }
}

impl PacketSource for VecSource {
    fn next_packet(&mut self) -> Result<Option<CapturedPacket>, CaptureError> {
        Ok(self.records.next().map(CapturedPacket::Parsed))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapturePrefix {
    pub records: Vec<PacketRecord>,
    pub packets_read: usize,
    pub dropped: usize,
}

/// Reads at most `max_packets` packets from the source. Unparseable packets
/// count against the cap and are dropped.
pub fn read_prefix<S: PacketSource + ?Sized>(source: &mut S, max_packets: usize) -> Result<CapturePrefix, CaptureError> {
    let mut prefix = CapturePrefix::default();

    while prefix.packets_read < max_packets {
        let Some(packet) = source.next_packet()? else {
            break;
        };
        prefix.packets_read += 1;
        match packet {
            CapturedPacket::Parsed(record) => prefix.records.push(record),
            CapturedPacket::Unparseable => {
                debug!(index = prefix.packets_read - 1, "dropping unparseable packet");
                prefix.dropped += 1;
            }
        }
    }

    info!(
        read = prefix.packets_read,
        parsed = prefix.records.len(),
        dropped = prefix.dropped,
        "capture prefix read"
    );
    Ok(prefix)
}

#[cfg(feature = "pcap")]
mod file {
    use pcap::{Capture, Offline};
    use std::path::Path;
    use tracing::info;

    use super::{CaptureError, CapturedPacket, PacketSource};
    use crate::parser::{parse_frame, LinkKind};

    /// Offline capture file opened through libpcap.
    pub struct PcapFileSource {
        cap: Capture<Offline>,
        link: LinkKind,
    }

    impl PcapFileSource {
        pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CaptureError> {
            let path = path.as_ref();
            let cap = Capture::from_file(path)?;
            let dlt = cap.get_datalink().0;
            let link = LinkKind::from_dlt(dlt).ok_or(CaptureError::UnsupportedLinkType(dlt))?;
            info!(path = %path.display(), ?link, "opened capture file");
            Ok(PcapFileSource { cap, link })
        }
    }

    impl PacketSource for PcapFileSource {
        fn next_packet(&mut self) -> Result<Option<CapturedPacket>, CaptureError> {
            match self.cap.next_packet() {
                Ok(packet) => {
                    let ts = packet.header.ts;
                    let timestamp = ts.tv_sec as f64 + ts.tv_usec as f64 / 1_000_000.0;
                    let record = parse_frame(self.link, timestamp, packet.header.len, packet.data);
                    Ok(Some(record.map_or(CapturedPacket::Unparseable, CapturedPacket::Parsed)))
                }
                Err(pcap::Error::NoMorePackets) => Ok(None),
                Err(e) => Err(e.into()),
            }
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::domain::Transport;

    struct MixedSource {
        remaining: usize,
    }

    impl PacketSource for MixedSource {
        fn next_packet(&mut self) -> Result<Option<CapturedPacket>, CaptureError> {
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            if self.remaining % 3 == 0 {
                Ok(Some(CapturedPacket::Unparseable))
            } else {
                Ok(Some(CapturedPacket::Parsed(PacketRecord::new(self.remaining as f64, 100, Transport::Udp))))
            }
        }
    }

    #[test]
    fn test_cap_counts_raw_packets() {
        let mut source = MixedSource { remaining: 30 };
        let prefix = read_prefix(&mut source, 12).unwrap();
        assert_eq!(prefix.packets_read, 12);
        assert_eq!(prefix.dropped, 4);
        assert_eq!(prefix.records.len(), 8);
    }

    #[test]
    fn test_short_source() {
        let records = vec![PacketRecord::new(0.0, 60, Transport::Other); 5];
        let mut source = VecSource::new(records.clone());
        let prefix = read_prefix(&mut source, 1000).unwrap();
        assert_eq!(prefix.records, records);
        assert_eq!(prefix.dropped, 0);
        assert!(source.next_packet().unwrap().is_none());
    }

    #[test]
    fn test_zero_cap_reads_nothing() {
        let mut source = MixedSource { remaining: 3 };
        let prefix = read_prefix(&mut source, 0).unwrap();
        assert_eq!(prefix, CapturePrefix::default());
        assert_eq!(source.remaining, 3);
    }
}
