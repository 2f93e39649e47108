//! Console subscribers for the notification channels.
//!
//! Each consumer owns its receiver and runs until the aggregator drops
//! the matching sender. These are the only mandated human outputs of
//! the capture core; the query surface gets its own subscribers.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::aggregator::NetworkMonitor;
use crate::device::{CommunicationPattern, DeviceInfo};

/// Print a block for every newly catalogued device.
pub async fn run_device_printer(mut rx: mpsc::Receiver<DeviceInfo>) {
    while let Some(device) = rx.recv().await {
        println!("\nNEW DEVICE DETECTED!");
        println!("   MAC:     {}", device.mac);
        println!("   IP:      {}", device.ip);
        println!("   Vendor:  {}", device.vendor);
        println!(
            "   First Seen: {}\n",
            device.first_seen.format("%Y-%m-%d %H:%M:%S")
        );
    }
}

/// Print one line for every first-seen communication pattern.
pub async fn run_pattern_printer(
    mut rx: mpsc::Receiver<CommunicationPattern>,
    monitor: Arc<NetworkMonitor>,
) {
    while let Some(pattern) = rx.recv().await {
        let vendor = monitor
            .vendor_of(&pattern.src_mac)
            .await
            .unwrap_or_else(|| "Unknown".to_string());
        println!("{}", format_pattern_line(&pattern, &vendor));
    }
}

/// `[iface] [PROTO] src_ip (mac) [vendor] → dst (SERVICE) [l7]`, with the
/// interface prefix, the port and the l7 suffix each present only when
/// known.
pub fn format_pattern_line(pattern: &CommunicationPattern, vendor: &str) -> String {
    let if_prefix = if pattern.interface.is_empty() {
        String::new()
    } else {
        format!("[{}] ", pattern.interface)
    };
    let l7_suffix = if pattern.l7_info.is_empty() {
        String::new()
    } else {
        format!(" [{}]", pattern.l7_info)
    };

    if pattern.dst_port > 0 {
        format!(
            "{}[{}] {} ({}) [{}] → {}:{} ({}){}",
            if_prefix,
            pattern.protocol,
            pattern.src_ip,
            pattern.src_mac,
            vendor,
            pattern.dst_ip,
            pattern.dst_port,
            pattern.service,
            l7_suffix,
        )
    } else {
        format!(
            "{}[{}] {} ({}) [{}] → {} ({}){}",
            if_prefix,
            pattern.protocol,
            pattern.src_ip,
            pattern.src_mac,
            vendor,
            pattern.dst_ip,
            pattern.service,
            l7_suffix,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::TrafficType;
    use chrono::Utc;

    fn pattern() -> CommunicationPattern {
        CommunicationPattern {
            src_mac: "aa:bb:cc:dd:ee:ff".into(),
            src_ip: "192.168.0.100".into(),
            dst_ip: "8.8.8.8".into(),
            dst_port: 443,
            protocol: "TCP".into(),
            traffic_type: TrafficType::TcpHttps,
            service: "HTTPS".into(),
            timestamp: Utc::now(),
            l7_info: String::new(),
            interface: String::new(),
        }
    }

    #[test]
    fn line_with_port() {
        let line = format_pattern_line(&pattern(), "Unknown");
        assert_eq!(
            line,
            "[TCP] 192.168.0.100 (aa:bb:cc:dd:ee:ff) [Unknown] → 8.8.8.8:443 (HTTPS)"
        );
    }

    #[test]
    fn line_without_port_with_l7() {
        let mut p = pattern();
        p.dst_port = 0;
        p.protocol = "DNS".into();
        p.service = "DNS".into();
        p.l7_info = "google.com".into();
        let line = format_pattern_line(&p, "Raspberry Pi");
        assert_eq!(
            line,
            "[DNS] 192.168.0.100 (aa:bb:cc:dd:ee:ff) [Raspberry Pi] → 8.8.8.8 (DNS) [google.com]"
        );
    }
}
