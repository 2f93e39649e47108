//! Shallow layer-7 inspection over the 32-byte payload peek.
//!
//! All functions here are total: malformed input yields an empty result,
//! never an error. 32 bytes is enough to recognise a protocol and pull
//! out a first token, not to parse it properly.

use cerberus_common::{
    WireEvent, EVENT_TYPE_DNS, EVENT_TYPE_HTTP, EVENT_TYPE_TLS, L7_PAYLOAD_LEN,
};

/// DNS header size; the question section starts right after it.
const DNS_HEADER_LEN: usize = 12;

/// Maximum label length per RFC 1035 §2.3.4.
const MAX_LABEL_LEN: usize = 63;

/// Extract the query name from a DNS message prefix.
///
/// Walks the length-prefixed labels after the 12-byte header and joins
/// them with dots. Stops at the zero-length terminator, at a label that
/// is longer than 63 bytes, or where the label would run past the peek
/// window. No compression-pointer support; 32 bytes rarely contains one.
pub fn dns_query_name(payload: &[u8; L7_PAYLOAD_LEN]) -> String {
    let mut offset = DNS_HEADER_LEN;
    let mut labels: Vec<String> = Vec::new();

    while offset < payload.len() {
        let label_len = payload[offset] as usize;
        if label_len == 0 {
            break;
        }
        if label_len > MAX_LABEL_LEN || offset + label_len + 1 > payload.len() {
            break;
        }
        offset += 1;
        let label = &payload[offset..offset + label_len];
        labels.push(String::from_utf8_lossy(label).into_owned());
        offset += label_len;
    }

    labels.join(".")
}

/// Extract the HTTP method and, when it fits the window, the request path.
pub fn http_request_line(payload: &[u8; L7_PAYLOAD_LEN]) -> (Option<&'static str>, String) {
    const METHODS: [&str; 5] = ["GET ", "POST ", "HEAD ", "PUT ", "DELETE "];

    // The peek window is zero-padded; anything past the first NUL is
    // not packet data.
    let end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
    let text = String::from_utf8_lossy(&payload[..end]);
    for prefix in METHODS {
        if text.starts_with(prefix) {
            let method = prefix.trim_end();
            let path = text
                .split_whitespace()
                .nth(1)
                .map(str::to_owned)
                .unwrap_or_default();
            return (Some(method), path);
        }
    }
    (None, String::new())
}

/// TLS handshake kinds distinguishable from the first record bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsHandshake {
    ClientHello,
    ServerHello,
    Other,
}

/// Identify a TLS handshake from the record header: content type 0x16 at
/// byte 0, handshake type at byte 5.
pub fn tls_handshake_type(payload: &[u8; L7_PAYLOAD_LEN]) -> TlsHandshake {
    if payload[0] == 0x16 && payload[5] == 0x01 {
        TlsHandshake::ClientHello
    } else if payload[0] == 0x16 && payload[5] == 0x02 {
        TlsHandshake::ServerHello
    } else {
        TlsHandshake::Other
    }
}

/// The human-readable L7 string for an event, per family.
///
/// DNS: the query name. HTTP: `"METHOD"` or `"METHOD path"`. TLS: the
/// literal `"TLS"` when the record type matches (SNI extraction needs
/// more than the 32-byte window provides). Everything else: empty.
pub fn l7_info(ev: &WireEvent) -> String {
    match ev.event_type {
        EVENT_TYPE_DNS => dns_query_name(&ev.l7_payload),
        EVENT_TYPE_HTTP => {
            let (method, path) = http_request_line(&ev.l7_payload);
            match method {
                Some(m) if path.is_empty() => m.to_string(),
                Some(m) => format!("{} {}", m, path),
                None => String::new(),
            }
        }
        EVENT_TYPE_TLS => {
            if ev.l7_payload[0] == 0x16 {
                "TLS".to_string()
            } else {
                String::new()
            }
        }
        _ => String::new(),
    }
}
