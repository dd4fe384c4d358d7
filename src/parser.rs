// Frame decoding: link-layer bytes from a capture into a PacketRecord.
// Frames whose link layer does not decode are dropped (None). Frames cut
// short by the snapshot length decode as far as their captured bytes go.

use etherparse::{LaxNetSlice, LaxSlicedPacket, TransportSlice};
use std::net::IpAddr;

use crate::models::domain::{PacketRecord, TcpFlags, TcpSegment, Transport};

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_IPV6: u16 = 0x86DD;
const LINUX_SLL_HEADER_LEN: usize = 16;

const IP_PROTO_SCTP: u8 = 132;
const NGAP_SCTP_PORT: u16 = 38412;
const PFCP_UDP_PORT: u16 = 8805;
const GTPV2C_UDP_PORT: u16 = 2123;

/// Link-layer framing of a capture file, from its DLT number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Ethernet,
    LinuxSll,
    RawIp,
}

impl LinkKind {
    pub fn from_dlt(dlt: i32) -> Option<Self> {
        match dlt {
            1 => Some(LinkKind::Ethernet),
            113 => Some(LinkKind::LinuxSll),
            12 | 101 | 228 | 229 => Some(LinkKind::RawIp),
            _ => None,
        }
    }
}

pub fn parse_frame(link: LinkKind, timestamp: f64, wire_len: u32, data: &[u8]) -> Option<PacketRecord> {
    let sliced = match link {
        LinkKind::Ethernet => LaxSlicedPacket::from_ethernet(data).ok()?,
        LinkKind::RawIp => LaxSlicedPacket::from_ip(data).ok()?,
        LinkKind::LinuxSll => {
            if data.len() < LINUX_SLL_HEADER_LEN {
                return None;
            }
            let protocol = u16::from_be_bytes([data[14], data[15]]);
            if protocol != ETHERTYPE_IPV4 && protocol != ETHERTYPE_IPV6 {
                // Cooked header decoded, nothing IP behind it
                return Some(PacketRecord::new(timestamp, wire_len, Transport::Unknown));
            }
            LaxSlicedPacket::from_ip(&data[LINUX_SLL_HEADER_LEN..]).ok()?
        }
    };

    let mut record = PacketRecord::new(timestamp, wire_len, Transport::Unknown);

    let ip_payload = match &sliced.net {
        Some(LaxNetSlice::Ipv4(ipv4)) => {
            let header = ipv4.header();
            record.src_ip = Some(IpAddr::V4(header.source_addr()));
            record.dst_ip = Some(IpAddr::V4(header.destination_addr()));
            record.ttl = Some(header.ttl());
            Some((ipv4.payload().ip_number.0, ipv4.payload().payload))
        }
        Some(LaxNetSlice::Ipv6(ipv6)) => {
            let header = ipv6.header();
            record.src_ip = Some(IpAddr::V6(header.source_addr()));
            record.dst_ip = Some(IpAddr::V6(header.destination_addr()));
            record.ttl = Some(header.hop_limit());
            Some((ipv6.payload().ip_number.0, ipv6.payload().payload))
        }
        #[allow(unreachable_patterns)]
        _ => None,
    };

    let Some((ip_number, payload)) = ip_payload else {
        return Some(record);
    };

    record.transport = match &sliced.transport {
        Some(TransportSlice::Tcp(tcp)) => {
            record.src_port = Some(tcp.source_port());
            record.dst_port = Some(tcp.destination_port());
            let flags = TcpFlags {
                fin: tcp.fin(),
                syn: tcp.syn(),
                rst: tcp.rst(),
                psh: tcp.psh(),
                ack: tcp.ack(),
                urg: tcp.urg(),
                ece: tcp.ece(),
                cwr: tcp.cwr(),
            };
            Transport::Tcp(TcpSegment {
                flags,
                seq: Some(tcp.sequence_number()),
                ack: Some(tcp.acknowledgment_number()),
            })
        }
        Some(TransportSlice::Udp(udp)) => {
            record.src_port = Some(udp.source_port());
            record.dst_port = Some(udp.destination_port());
            record.is_5g_control = is_5g_udp_port(udp.source_port()) || is_5g_udp_port(udp.destination_port());
            Transport::Udp
        }
        _ => {
            if ip_number == IP_PROTO_SCTP {
                handle_sctp(payload, &mut record);
            }
            Transport::Other
        }
    };

    Some(record)
}

fn is_5g_udp_port(port: u16) -> bool {
    port == PFCP_UDP_PORT || port == GTPV2C_UDP_PORT
}

// SCTP common header: source port, destination port, then tag and checksum
fn handle_sctp(payload: &[u8], record: &mut PacketRecord) {
    if payload.len() < 12 {
        return;
    }
    let src_port = u16::from_be_bytes([payload[0], payload[1]]);
    let dst_port = u16::from_be_bytes([payload[2], payload[3]]);
    record.src_port = Some(src_port);
    record.dst_port = Some(dst_port);
    record.is_5g_control = src_port == NGAP_SCTP_PORT || dst_port == NGAP_SCTP_PORT;
}
