//! Ring-buffer record decoding and address rendering.
//!
//! The decode mirrors the kernel-side layout field by field; both sides
//! are pinned by the compile-time size assertion in cerberus-common.

use cerberus_common::{WireEvent, WIRE_EVENT_LEN};

use crate::error::MonitorError;

/// Decode one raw ring-buffer record.
///
/// Reads every field at its documented offset. Records shorter than 75
/// bytes are rejected; no semantic validation beyond that (an event with
/// an unknown type or odd flags is still returned).
pub fn parse_event(data: &[u8]) -> Result<WireEvent, MonitorError> {
    if data.len() < WIRE_EVENT_LEN {
        return Err(MonitorError::ShortRecord {
            len: data.len(),
            expected: WIRE_EVENT_LEN,
        });
    }

    let mut ev = WireEvent::zeroed();
    ev.event_type = data[0];
    ev.src_mac.copy_from_slice(&data[1..7]);
    ev.dst_mac.copy_from_slice(&data[7..13]);
    ev.src_ip = u32::from_le_bytes([data[13], data[14], data[15], data[16]]);
    ev.dst_ip = u32::from_le_bytes([data[17], data[18], data[19], data[20]]);
    ev.src_port = u16::from_le_bytes([data[21], data[22]]);
    ev.dst_port = u16::from_le_bytes([data[23], data[24]]);
    ev.protocol = data[25];
    ev.tcp_flags = data[26];
    ev.arp_op = u16::from_le_bytes([data[27], data[28]]);
    ev.arp_sha.copy_from_slice(&data[29..35]);
    ev.arp_tha.copy_from_slice(&data[35..41]);
    ev.icmp_type = data[41];
    ev.icmp_code = data[42];
    ev.l7_payload.copy_from_slice(&data[43..75]);

    Ok(ev)
}

/// Render a MAC as lowercase colon-separated hex.
pub fn format_mac(mac: &[u8; 6]) -> String {
    format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    )
}

/// Render a stored IPv4 address as a dotted quad.
///
/// The kernel memcpys the address in network byte order and the decoder
/// reads it little-endian, so emitting the bytes in little-endian order
/// restores the on-wire sequence. The two transforms cancel only on
/// little-endian hosts; this agent requires one.
pub fn format_ipv4(ip: u32) -> String {
    let b = ip.to_le_bytes();
    format!("{}.{}.{}.{}", b[0], b[1], b[2], b[3])
}

#[cfg(test)]
mod tests {
    use super::*;
    use cerberus_common::EVENT_TYPE_TCP;

    /// Test-side mirror of the kernel's write routine.
    fn encode(ev: &WireEvent) -> Vec<u8> {
        let mut out = Vec::with_capacity(WIRE_EVENT_LEN);
        out.push(ev.event_type);
        out.extend_from_slice(&ev.src_mac);
        out.extend_from_slice(&ev.dst_mac);
        out.extend_from_slice(&{ ev.src_ip }.to_le_bytes());
        out.extend_from_slice(&{ ev.dst_ip }.to_le_bytes());
        out.extend_from_slice(&{ ev.src_port }.to_le_bytes());
        out.extend_from_slice(&{ ev.dst_port }.to_le_bytes());
        out.push(ev.protocol);
        out.push(ev.tcp_flags);
        out.extend_from_slice(&{ ev.arp_op }.to_le_bytes());
        out.extend_from_slice(&ev.arp_sha);
        out.extend_from_slice(&ev.arp_tha);
        out.push(ev.icmp_type);
        out.push(ev.icmp_code);
        out.extend_from_slice(&ev.l7_payload);
        out
    }

    #[test]
    fn wire_round_trip() {
        let mut ev = WireEvent::zeroed();
        ev.event_type = EVENT_TYPE_TCP;
        ev.src_mac = [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff];
        ev.dst_mac = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06];
        ev.src_ip = u32::from_le_bytes([192, 168, 0, 100]);
        ev.dst_ip = u32::from_le_bytes([8, 8, 8, 8]);
        ev.src_port = 51000;
        ev.dst_port = 443;
        ev.protocol = 6;
        ev.tcp_flags = 0x02;
        ev.l7_payload[0] = 0x16;

        let bytes = encode(&ev);
        assert_eq!(bytes.len(), WIRE_EVENT_LEN);
        assert_eq!(parse_event(&bytes).unwrap(), ev);
    }

    #[test]
    fn short_record_rejected() {
        let err = parse_event(&[0u8; 74]).unwrap_err();
        assert!(err.to_string().contains("74"));
    }

    #[test]
    fn all_zero_record_parses_as_type_zero() {
        let ev = parse_event(&[0u8; WIRE_EVENT_LEN]).unwrap();
        assert_eq!(ev.event_type, 0);
        assert_eq!({ ev.src_ip }, 0);
    }

    #[test]
    fn trailing_bytes_ignored() {
        let mut bytes = vec![0u8; WIRE_EVENT_LEN + 5];
        bytes[0] = EVENT_TYPE_TCP;
        let ev = parse_event(&bytes).unwrap();
        assert_eq!(ev.event_type, EVENT_TYPE_TCP);
    }

    #[test]
    fn mac_formats_lowercase() {
        assert_eq!(
            format_mac(&[0xAA, 0xBB, 0xCC, 0x01, 0x02, 0x03]),
            "aa:bb:cc:01:02:03"
        );
    }

    #[test]
    fn ipv4_renders_wire_order() {
        // 192.168.1.50 as memcpy'd from the wire then decoded LE.
        let ip = u32::from_le_bytes([192, 168, 1, 50]);
        assert_eq!(format_ipv4(ip), "192.168.1.50");
        assert_eq!(format_ipv4(0), "0.0.0.0");
    }
}
