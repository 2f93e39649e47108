//! Shared types between eBPF (kernel) and userspace
//!
//! This crate defines the event record that must be:
//! - `#[repr(C, packed)]` for a byte-exact layout on both sides
//! - `no_std` compatible for eBPF
//! - Shared between the kernel classifier and the userspace agent
//!
//! The record is the only contract between the two halves; a layout
//! divergence is silent corruption, so it is defined once, here.

#![cfg_attr(not(feature = "userspace"), no_std)]

/// Event family tags written into [`WireEvent::event_type`].
pub const EVENT_TYPE_ARP: u8 = 1;
pub const EVENT_TYPE_TCP: u8 = 2;
pub const EVENT_TYPE_UDP: u8 = 3;
pub const EVENT_TYPE_ICMP: u8 = 4;
pub const EVENT_TYPE_DNS: u8 = 5;
pub const EVENT_TYPE_HTTP: u8 = 6;
pub const EVENT_TYPE_TLS: u8 = 7;

/// TCP flag bits as packed by the classifier.
pub const TCP_FLAG_FIN: u8 = 0x01;
pub const TCP_FLAG_SYN: u8 = 0x02;
pub const TCP_FLAG_RST: u8 = 0x04;
pub const TCP_FLAG_PSH: u8 = 0x08;
pub const TCP_FLAG_ACK: u8 = 0x10;

/// Number of transport-payload bytes the classifier copies for L7 peeking.
pub const L7_PAYLOAD_LEN: usize = 32;

/// Wire size of one ring-buffer record.
pub const WIRE_EVENT_LEN: usize = 75;

/// One captured packet, as written by the kernel classifier.
///
/// Ports and `arp_op` are converted to host byte order before the kernel
/// stores them; IPv4 addresses are memcpy'd in network byte order and
/// decoded little-endian by the agent. Fields that do not apply to the
/// event family are zero-filled.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "userspace", derive(PartialEq, Eq))]
pub struct WireEvent {
    pub event_type: u8,
    pub src_mac: [u8; 6],
    pub dst_mac: [u8; 6],
    pub src_ip: u32,
    pub dst_ip: u32,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: u8,
    pub tcp_flags: u8,
    pub arp_op: u16,
    pub arp_sha: [u8; 6],
    pub arp_tha: [u8; 6],
    pub icmp_type: u8,
    pub icmp_code: u8,
    pub l7_payload: [u8; L7_PAYLOAD_LEN],
}

impl WireEvent {
    /// A zero-filled record; the classifier starts from this and fills in
    /// the fields its event family uses.
    pub const fn zeroed() -> Self {
        Self {
            event_type: 0,
            src_mac: [0; 6],
            dst_mac: [0; 6],
            src_ip: 0,
            dst_ip: 0,
            src_port: 0,
            dst_port: 0,
            protocol: 0,
            tcp_flags: 0,
            arp_op: 0,
            arp_sha: [0; 6],
            arp_tha: [0; 6],
            icmp_type: 0,
            icmp_code: 0,
            l7_payload: [0; L7_PAYLOAD_LEN],
        }
    }
}

#[cfg(feature = "userspace")]
const _: () = {
    assert!(
        core::mem::size_of::<WireEvent>() == WIRE_EVENT_LEN,
        "WireEvent must be exactly 75 bytes"
    );
    assert!(
        core::mem::align_of::<WireEvent>() == 1,
        "WireEvent must be packed (no padding)"
    );
};
