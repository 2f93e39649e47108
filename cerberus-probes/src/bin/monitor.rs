//! TC ingress classifier for the cerberus monitor
//!
//! For every frame entering a monitored interface this program decodes
//! Ethernet + {ARP, IPv4/TCP, IPv4/UDP, IPv4/ICMP}, copies up to 32
//! bytes of transport payload, and submits one 75-byte event to the
//! shared ring buffer. The verdict is always TC_ACT_OK: the classifier
//! observes, it never filters.
//!
//! Every multi-byte header read goes through `ctx.load`, which the
//! verifier can bound; the payload copy is a fixed 32-iteration loop
//! with a per-byte tail check. Reservation failure drops the event
//! silently (backpressure = drop).

#![no_std]
#![no_main]

use aya_ebpf::{
    bindings::TC_ACT_OK,
    macros::{classifier, map},
    maps::RingBuf,
    programs::TcContext,
};
use cerberus_common::{
    WireEvent, EVENT_TYPE_ARP, EVENT_TYPE_DNS, EVENT_TYPE_HTTP, EVENT_TYPE_ICMP, EVENT_TYPE_TCP,
    EVENT_TYPE_TLS, EVENT_TYPE_UDP, L7_PAYLOAD_LEN,
};

/// Ring buffer size in bytes. 256KB holds ~3400 events before dropping.
const RING_BUF_SIZE: u32 = 256 * 1024;

#[map]
static EVENTS: RingBuf = RingBuf::with_byte_size(RING_BUF_SIZE, 0);

const ETH_P_ARP: u16 = 0x0806;
const ETH_P_IP: u16 = 0x0800;

const PROTO_ICMP: u8 = 1;
const PROTO_TCP: u8 = 6;
const PROTO_UDP: u8 = 17;

const DNS_PORT: u16 = 53;
const HTTP_PORT: u16 = 80;
const HTTP_ALT_PORT: u16 = 8080;
const HTTPS_PORT: u16 = 443;
const HTTPS_ALT_PORT: u16 = 8443;

const ETH_HLEN: usize = 14;
const ARP_HLEN: usize = 8;

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct EthHdr {
    dst: [u8; 6],
    src: [u8; 6],
    ether_type: u16,
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct ArpHdr {
    hrd: u16,
    pro: u16,
    hln: u8,
    pln: u8,
    op: u16,
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct Ipv4Hdr {
    version_ihl: u8,
    tos: u8,
    total_len: u16,
    id: u16,
    flags_frag: u16,
    ttl: u8,
    protocol: u8,
    checksum: u16,
    src_ip: u32,
    dst_ip: u32,
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct TcpHdr {
    source: u16,
    dest: u16,
    seq: u32,
    ack_seq: u32,
    doff_res: u8,
    flags: u8,
    window: u16,
    check: u16,
    urg_ptr: u16,
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct UdpHdr {
    source: u16,
    dest: u16,
    len: u16,
    check: u16,
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct IcmpHdr {
    type_: u8,
    code: u8,
    checksum: u16,
}

#[classifier]
pub fn cerberus_monitor(ctx: TcContext) -> i32 {
    match try_cerberus_monitor(&ctx) {
        Ok(ret) => ret,
        Err(_) => TC_ACT_OK,
    }
}

fn try_cerberus_monitor(ctx: &TcContext) -> Result<i32, ()> {
    let eth: EthHdr = ctx.load(0).map_err(|_| ())?;

    match u16::from_be(eth.ether_type) {
        ETH_P_ARP => handle_arp(ctx, &eth),
        ETH_P_IP => {
            let iph: Ipv4Hdr = ctx.load(ETH_HLEN).map_err(|_| ())?;
            let l4_off = ETH_HLEN + ((iph.version_ihl & 0x0f) as usize) * 4;
            match iph.protocol {
                PROTO_TCP => handle_tcp(ctx, &eth, &iph, l4_off),
                PROTO_UDP => handle_udp(ctx, &eth, &iph, l4_off),
                PROTO_ICMP => handle_icmp(ctx, &eth, &iph, l4_off),
                _ => Ok(TC_ACT_OK),
            }
        }
        _ => Ok(TC_ACT_OK),
    }
}

fn handle_arp(ctx: &TcContext, eth: &EthHdr) -> Result<i32, ()> {
    let arp: ArpHdr = ctx.load(ETH_HLEN).map_err(|_| ())?;

    if u16::from_be(arp.hrd) != 1
        || u16::from_be(arp.pro) != ETH_P_IP
        || arp.hln != 6
        || arp.pln != 4
    {
        return Ok(TC_ACT_OK);
    }

    // sha[6] spa[4] tha[6] tpa[4] follow the fixed ARP header.
    let body = ETH_HLEN + ARP_HLEN;
    let sha: [u8; 6] = ctx.load(body).map_err(|_| ())?;
    let spa: [u8; 4] = ctx.load(body + 6).map_err(|_| ())?;
    let tha: [u8; 6] = ctx.load(body + 10).map_err(|_| ())?;
    let tpa: [u8; 4] = ctx.load(body + 16).map_err(|_| ())?;

    let mut ev = WireEvent::zeroed();
    ev.event_type = EVENT_TYPE_ARP;
    ev.src_mac = eth.src;
    ev.dst_mac = eth.dst;
    ev.arp_sha = sha;
    ev.src_ip = u32::from_ne_bytes(spa);
    ev.arp_tha = tha;
    ev.dst_ip = u32::from_ne_bytes(tpa);
    ev.arp_op = u16::from_be(arp.op);

    submit(ev);
    Ok(TC_ACT_OK)
}

fn handle_tcp(ctx: &TcContext, eth: &EthHdr, iph: &Ipv4Hdr, l4_off: usize) -> Result<i32, ()> {
    let tcph: TcpHdr = ctx.load(l4_off).map_err(|_| ())?;
    let src_port = u16::from_be(tcph.source);
    let dst_port = u16::from_be(tcph.dest);

    let mut ev = WireEvent::zeroed();
    ev.event_type = EVENT_TYPE_TCP;
    ev.src_mac = eth.src;
    ev.dst_mac = eth.dst;
    ev.src_ip = iph.src_ip;
    ev.dst_ip = iph.dst_ip;
    ev.src_port = src_port;
    ev.dst_port = dst_port;
    ev.protocol = PROTO_TCP;
    // FIN/SYN/RST/PSH/ACK occupy the low five bits of the flags byte,
    // which is exactly the layout the agent expects.
    ev.tcp_flags = tcph.flags & 0x1f;

    let payload_off = l4_off + ((tcph.doff_res >> 4) as usize) * 4;
    let copied = copy_payload(ctx, payload_off, &mut ev.l7_payload);

    if copied >= 4
        && (dst_port == HTTP_PORT
            || dst_port == HTTP_ALT_PORT
            || src_port == HTTP_PORT
            || src_port == HTTP_ALT_PORT)
        && is_http_request(&ev.l7_payload)
    {
        ev.event_type = EVENT_TYPE_HTTP;
    }

    if copied >= 6
        && (dst_port == HTTPS_PORT
            || dst_port == HTTPS_ALT_PORT
            || src_port == HTTPS_PORT
            || src_port == HTTPS_ALT_PORT)
        && is_tls_handshake(&ev.l7_payload)
    {
        ev.event_type = EVENT_TYPE_TLS;
    }

    submit(ev);
    Ok(TC_ACT_OK)
}

fn handle_udp(ctx: &TcContext, eth: &EthHdr, iph: &Ipv4Hdr, l4_off: usize) -> Result<i32, ()> {
    let udph: UdpHdr = ctx.load(l4_off).map_err(|_| ())?;
    let src_port = u16::from_be(udph.source);
    let dst_port = u16::from_be(udph.dest);

    let mut ev = WireEvent::zeroed();
    ev.event_type = if src_port == DNS_PORT || dst_port == DNS_PORT {
        EVENT_TYPE_DNS
    } else {
        EVENT_TYPE_UDP
    };
    ev.src_mac = eth.src;
    ev.dst_mac = eth.dst;
    ev.src_ip = iph.src_ip;
    ev.dst_ip = iph.dst_ip;
    ev.src_port = src_port;
    ev.dst_port = dst_port;
    ev.protocol = PROTO_UDP;

    copy_payload(ctx, l4_off + core::mem::size_of::<UdpHdr>(), &mut ev.l7_payload);

    submit(ev);
    Ok(TC_ACT_OK)
}

fn handle_icmp(ctx: &TcContext, eth: &EthHdr, iph: &Ipv4Hdr, l4_off: usize) -> Result<i32, ()> {
    let icmph: IcmpHdr = ctx.load(l4_off).map_err(|_| ())?;

    let mut ev = WireEvent::zeroed();
    ev.event_type = EVENT_TYPE_ICMP;
    ev.src_mac = eth.src;
    ev.dst_mac = eth.dst;
    ev.src_ip = iph.src_ip;
    ev.dst_ip = iph.dst_ip;
    ev.protocol = PROTO_ICMP;
    ev.icmp_type = icmph.type_;
    ev.icmp_code = icmph.code;

    submit(ev);
    Ok(TC_ACT_OK)
}

/// Copy up to 32 payload bytes into `buf`, stopping at the frame tail.
/// Returns the number of bytes copied.
fn copy_payload(ctx: &TcContext, payload_off: usize, buf: &mut [u8; L7_PAYLOAD_LEN]) -> usize {
    let mut copied = 0;
    for i in 0..L7_PAYLOAD_LEN {
        match ctx.load::<u8>(payload_off + i) {
            Ok(b) => {
                buf[i] = b;
                copied += 1;
            }
            Err(_) => break,
        }
    }
    copied
}

/// "GET ", "POST", "HEAD", "PUT ", "DELE" (DELETE) request prefixes.
fn is_http_request(payload: &[u8; L7_PAYLOAD_LEN]) -> bool {
    matches!(
        payload,
        [b'G', b'E', b'T', b' ', ..]
            | [b'P', b'O', b'S', b'T', ..]
            | [b'H', b'E', b'A', b'D', ..]
            | [b'P', b'U', b'T', b' ', ..]
            | [b'D', b'E', b'L', b'E', ..]
    )
}

/// TLS handshake record: 0x16, version 0x03 0x00..=0x04.
fn is_tls_handshake(payload: &[u8; L7_PAYLOAD_LEN]) -> bool {
    payload[0] == 0x16 && payload[1] == 0x03 && payload[2] <= 0x04
}

fn submit(ev: WireEvent) {
    if let Some(mut entry) = EVENTS.reserve::<WireEvent>(0) {
        entry.write(ev);
        entry.submit(0);
    }
    // If reserve() fails (ring buffer full) the event is dropped silently.
}

// The ring-buffer helpers are GPL-gated.
#[link_section = "license"]
#[no_mangle]
static LICENSE: [u8; 4] = *b"GPL\0";

#[cfg(not(test))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}
