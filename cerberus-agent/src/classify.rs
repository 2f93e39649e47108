//! Traffic-type classification.
//!
//! Pure decision tables from event metadata (ports, flags, type codes,
//! payload prefix) to one tag of the closed [`TrafficType`] set. The
//! kernel already decided the event family; this refines it.

use serde::{Deserialize, Serialize};

use cerberus_common::{
    WireEvent, EVENT_TYPE_ARP, EVENT_TYPE_DNS, EVENT_TYPE_HTTP, EVENT_TYPE_ICMP, EVENT_TYPE_TCP,
    EVENT_TYPE_TLS, EVENT_TYPE_UDP, L7_PAYLOAD_LEN, TCP_FLAG_ACK, TCP_FLAG_FIN, TCP_FLAG_RST,
    TCP_FLAG_SYN,
};

use crate::l7::{self, TlsHandshake};

/// Semantic flavour of a single packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrafficType {
    ArpRequest,
    ArpReply,
    ArpProbe,
    ArpAnnounce,
    /// Reserved for a sweep heuristic; never produced by the classifier.
    ArpScan,

    TcpSyn,
    TcpSynack,
    TcpAck,
    TcpFin,
    TcpRst,
    TcpHttp,
    TcpHttps,
    TcpSsh,
    TcpCustom,

    UdpDns,
    UdpDhcp,
    UdpNtp,
    UdpSnmp,
    UdpCustom,

    IcmpEchoRequest,
    IcmpEchoReply,
    IcmpDestUnreachable,
    IcmpTimeExceeded,
    IcmpRedirect,
    IcmpCustom,

    DnsQuery,
    DnsResponse,

    HttpGet,
    HttpPost,
    HttpRequest,

    TlsClientHello,
    TlsServerHello,
    TlsHandshake,
}

impl TrafficType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficType::ArpRequest => "ARP_REQUEST",
            TrafficType::ArpReply => "ARP_REPLY",
            TrafficType::ArpProbe => "ARP_PROBE",
            TrafficType::ArpAnnounce => "ARP_ANNOUNCE",
            TrafficType::ArpScan => "ARP_SCAN",
            TrafficType::TcpSyn => "TCP_SYN",
            TrafficType::TcpSynack => "TCP_SYNACK",
            TrafficType::TcpAck => "TCP_ACK",
            TrafficType::TcpFin => "TCP_FIN",
            TrafficType::TcpRst => "TCP_RST",
            TrafficType::TcpHttp => "TCP_HTTP",
            TrafficType::TcpHttps => "TCP_HTTPS",
            TrafficType::TcpSsh => "TCP_SSH",
            TrafficType::TcpCustom => "TCP_CUSTOM",
            TrafficType::UdpDns => "UDP_DNS",
            TrafficType::UdpDhcp => "UDP_DHCP",
            TrafficType::UdpNtp => "UDP_NTP",
            TrafficType::UdpSnmp => "UDP_SNMP",
            TrafficType::UdpCustom => "UDP_CUSTOM",
            TrafficType::IcmpEchoRequest => "ICMP_ECHO_REQUEST",
            TrafficType::IcmpEchoReply => "ICMP_ECHO_REPLY",
            TrafficType::IcmpDestUnreachable => "ICMP_DEST_UNREACHABLE",
            TrafficType::IcmpTimeExceeded => "ICMP_TIME_EXCEEDED",
            TrafficType::IcmpRedirect => "ICMP_REDIRECT",
            TrafficType::IcmpCustom => "ICMP_CUSTOM",
            TrafficType::DnsQuery => "DNS_QUERY",
            TrafficType::DnsResponse => "DNS_RESPONSE",
            TrafficType::HttpGet => "HTTP_GET",
            TrafficType::HttpPost => "HTTP_POST",
            TrafficType::HttpRequest => "HTTP_REQUEST",
            TrafficType::TlsClientHello => "TLS_CLIENT_HELLO",
            TrafficType::TlsServerHello => "TLS_SERVER_HELLO",
            TrafficType::TlsHandshake => "TLS_HANDSHAKE",
        }
    }
}

impl std::fmt::Display for TrafficType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify ARP by the sender/target addresses first, opcode second.
pub fn classify_arp(src_ip: &str, dst_ip: &str, op: u16) -> TrafficType {
    if src_ip == "0.0.0.0" {
        return TrafficType::ArpProbe;
    }
    if src_ip == dst_ip {
        return TrafficType::ArpAnnounce;
    }
    match op {
        1 => TrafficType::ArpRequest,
        2 => TrafficType::ArpReply,
        _ => TrafficType::ArpRequest,
    }
}

/// Classify TCP: well-known destination ports win over flag patterns.
pub fn classify_tcp(dst_port: u16, tcp_flags: u8) -> TrafficType {
    match dst_port {
        80 => return TrafficType::TcpHttp,
        443 => return TrafficType::TcpHttps,
        22 => return TrafficType::TcpSsh,
        _ => {}
    }

    if tcp_flags & TCP_FLAG_SYN != 0 && tcp_flags & TCP_FLAG_ACK == 0 {
        TrafficType::TcpSyn
    } else if tcp_flags & TCP_FLAG_SYN != 0 && tcp_flags & TCP_FLAG_ACK != 0 {
        TrafficType::TcpSynack
    } else if tcp_flags & TCP_FLAG_FIN != 0 {
        TrafficType::TcpFin
    } else if tcp_flags & TCP_FLAG_RST != 0 {
        TrafficType::TcpRst
    } else if tcp_flags & TCP_FLAG_ACK != 0 {
        TrafficType::TcpAck
    } else {
        TrafficType::TcpCustom
    }
}

pub fn classify_udp(src_port: u16, dst_port: u16) -> TrafficType {
    if dst_port == 53 || src_port == 53 {
        TrafficType::UdpDns
    } else if dst_port == 67 || dst_port == 68 {
        TrafficType::UdpDhcp
    } else if dst_port == 123 {
        TrafficType::UdpNtp
    } else if dst_port == 161 || dst_port == 162 {
        TrafficType::UdpSnmp
    } else {
        TrafficType::UdpCustom
    }
}

pub fn classify_icmp(icmp_type: u8) -> TrafficType {
    match icmp_type {
        0 => TrafficType::IcmpEchoReply,
        3 => TrafficType::IcmpDestUnreachable,
        5 => TrafficType::IcmpRedirect,
        8 => TrafficType::IcmpEchoRequest,
        11 => TrafficType::IcmpTimeExceeded,
        _ => TrafficType::IcmpCustom,
    }
}

/// DNS queries carry QR = 0, responses QR = 1. The flags word sits at
/// payload bytes 2..4, big-endian.
pub fn classify_dns(payload: &[u8; L7_PAYLOAD_LEN]) -> TrafficType {
    let flags = u16::from_be_bytes([payload[2], payload[3]]);
    if flags & 0x8000 != 0 {
        TrafficType::DnsResponse
    } else {
        TrafficType::DnsQuery
    }
}

pub fn classify_http(payload: &[u8; L7_PAYLOAD_LEN]) -> TrafficType {
    if payload.starts_with(b"GET ") {
        TrafficType::HttpGet
    } else if payload.starts_with(b"POST ") {
        TrafficType::HttpPost
    } else {
        TrafficType::HttpRequest
    }
}

pub fn classify_tls(payload: &[u8; L7_PAYLOAD_LEN]) -> TrafficType {
    match l7::tls_handshake_type(payload) {
        TlsHandshake::ClientHello => TrafficType::TlsClientHello,
        TlsHandshake::ServerHello => TrafficType::TlsServerHello,
        TlsHandshake::Other => TrafficType::TlsHandshake,
    }
}

/// Classify an already-parsed event into its traffic-type tag.
///
/// Returns `None` for unknown event types (e.g. an all-zero record);
/// such events must not be counted.
pub fn classify(ev: &WireEvent, src_ip: &str, dst_ip: &str) -> Option<TrafficType> {
    let tag = match ev.event_type {
        EVENT_TYPE_ARP => classify_arp(src_ip, dst_ip, { ev.arp_op }),
        EVENT_TYPE_TCP => classify_tcp({ ev.dst_port }, ev.tcp_flags),
        EVENT_TYPE_UDP => classify_udp({ ev.src_port }, { ev.dst_port }),
        EVENT_TYPE_ICMP => classify_icmp(ev.icmp_type),
        EVENT_TYPE_DNS => classify_dns(&ev.l7_payload),
        EVENT_TYPE_HTTP => classify_http(&ev.l7_payload),
        EVENT_TYPE_TLS => classify_tls(&ev.l7_payload),
        _ => return None,
    };
    Some(tag)
}
