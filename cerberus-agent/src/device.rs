//! Per-device aggregate state and the records derived from it.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::TrafficType;

/// How many distinct recent destination addresses a device keeps.
pub const MAX_RECENT_TARGETS: usize = 20;

/// First occurrence of a distinct communication pattern on a device.
///
/// Emitted once per pattern key per device incarnation in the cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunicationPattern {
    pub src_mac: String,
    pub src_ip: String,
    pub dst_ip: String,
    pub dst_port: u16,
    pub protocol: String,
    pub traffic_type: TrafficType,
    pub service: String,
    pub timestamp: DateTime<Utc>,
    /// DNS domain, HTTP method+path, TLS marker.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub l7_info: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub interface: String,
}

/// Per-flow counters. Transient: never snapshotted.
///
/// The wire record carries no frame length, so `byte_count` keeps its
/// creation value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowStats {
    pub packet_count: u64,
    pub byte_count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl FlowStats {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            packet_count: 1,
            byte_count: 0,
            first_seen: now,
            last_seen: now,
        }
    }

    pub fn record(&mut self, now: DateTime<Utc>) {
        self.packet_count += 1;
        self.last_seen = now;
    }
}

/// Everything the monitor knows about one MAC address.
///
/// The unit of caching and of snapshot storage. `seen_patterns` and
/// `flow_stats` are transient: a device rehydrated from the snapshot
/// store starts with both empty, so patterns may be re-emitted across
/// an eviction boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub mac: String,
    pub ip: String,
    pub vendor: String,
    #[serde(default)]
    pub interface: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub request_count: u64,
    #[serde(default)]
    pub reply_count: u64,
    #[serde(default)]
    pub tcp_connections: u64,
    #[serde(default)]
    pub udp_connections: u64,
    #[serde(default)]
    pub icmp_packets: u64,
    #[serde(default)]
    pub dns_queries: u64,
    #[serde(default)]
    pub http_requests: u64,
    #[serde(default)]
    pub tls_connections: u64,
    /// Last distinct destination addresses, oldest first, capped at 20.
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub services: HashMap<String, u64>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub dns_domains: HashMap<String, u64>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub http_hosts: HashMap<String, u64>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tls_snis: HashMap<String, u64>,
    #[serde(default)]
    pub traffic_type_counts: HashMap<TrafficType, u64>,
    #[serde(skip)]
    pub seen_patterns: HashSet<String>,
    #[serde(skip)]
    pub flow_stats: HashMap<String, FlowStats>,
}

impl DeviceInfo {
    /// A fresh record for a MAC observed for the first time.
    pub fn new(mac: String, ip: String, vendor: String, now: DateTime<Utc>) -> Self {
        Self {
            mac,
            ip,
            vendor,
            interface: String::new(),
            first_seen: now,
            last_seen: now,
            request_count: 0,
            reply_count: 0,
            tcp_connections: 0,
            udp_connections: 0,
            icmp_packets: 0,
            dns_queries: 0,
            http_requests: 0,
            tls_connections: 0,
            targets: Vec::new(),
            services: HashMap::new(),
            dns_domains: HashMap::new(),
            http_hosts: HashMap::new(),
            tls_snis: HashMap::new(),
            traffic_type_counts: HashMap::new(),
            seen_patterns: HashSet::new(),
            flow_stats: HashMap::new(),
        }
    }

    /// Remember a destination address, deduplicated, oldest-out at the cap.
    pub fn push_target(&mut self, dst_ip: &str) {
        if dst_ip == "0.0.0.0" || self.targets.iter().any(|t| t == dst_ip) {
            return;
        }
        self.targets.push(dst_ip.to_string());
        if self.targets.len() > MAX_RECENT_TARGETS {
            self.targets.remove(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_round_trip_skips_transient_state() {
        let now = Utc::now();
        let mut d = DeviceInfo::new(
            "aa:bb:cc:dd:ee:ff".into(),
            "192.168.0.100".into(),
            "Unknown".into(),
            now,
        );
        d.tcp_connections = 3;
        d.services.insert("HTTPS".into(), 3);
        d.traffic_type_counts.insert(TrafficType::TcpHttps, 3);
        d.push_target("8.8.8.8");
        d.seen_patterns.insert("TCP:a->b:443:TCP_HTTPS".into());
        d.flow_stats
            .insert("TCP:a->b:443".into(), FlowStats::new(now));

        let json = serde_json::to_string(&d).unwrap();
        assert!(!json.contains("seen_patterns"));
        assert!(!json.contains("flow_stats"));

        let back: DeviceInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back.mac, d.mac);
        assert_eq!(back.tcp_connections, 3);
        assert_eq!(back.services["HTTPS"], 3);
        assert_eq!(back.targets, vec!["8.8.8.8".to_string()]);
        assert!(back.seen_patterns.is_empty());
        assert!(back.flow_stats.is_empty());
    }

    #[test]
    fn empty_l7_maps_are_omitted() {
        let d = DeviceInfo::new("aa:bb:cc:dd:ee:ff".into(), String::new(), "X".into(), Utc::now());
        let json = serde_json::to_string(&d).unwrap();
        assert!(!json.contains("dns_domains"));
        assert!(!json.contains("http_hosts"));
        assert!(!json.contains("tls_snis"));
    }

    #[test]
    fn targets_dedupe_and_cap() {
        let mut d = DeviceInfo::new("aa:bb:cc:dd:ee:ff".into(), String::new(), "X".into(), Utc::now());
        for i in 1..=25 {
            d.push_target(&format!("192.168.0.{}", i));
        }
        // Duplicate and zero addresses are ignored.
        d.push_target("192.168.0.25");
        d.push_target("0.0.0.0");

        assert_eq!(d.targets.len(), MAX_RECENT_TARGETS);
        assert_eq!(d.targets[0], "192.168.0.6");
        assert_eq!(d.targets[19], "192.168.0.25");
    }

    #[test]
    fn flow_stats_counts_packets() {
        let now = Utc::now();
        let mut f = FlowStats::new(now);
        f.record(now);
        f.record(now);
        assert_eq!(f.packet_count, 3);
        assert_eq!(f.byte_count, 0);
        assert!(f.last_seen >= f.first_seen);
    }
}
