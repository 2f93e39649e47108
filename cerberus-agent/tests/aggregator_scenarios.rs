//! End-to-end aggregation scenarios over literal wire events.
//!
//! Each test feeds hand-built 75-byte-equivalent events through
//! `NetworkMonitor::ingest` and checks the resulting catalogue state,
//! notifications and counters.

use std::sync::atomic::Ordering;

use cerberus_agent::aggregator::{NetworkMonitor, NotificationStreams};
use cerberus_agent::classify::TrafficType;
use cerberus_agent::store::SnapshotStore;
use cerberus_common::{
    WireEvent, EVENT_TYPE_ARP, EVENT_TYPE_DNS, EVENT_TYPE_HTTP, EVENT_TYPE_TCP, TCP_FLAG_SYN,
};

const SRC_MAC: [u8; 6] = [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff];

fn scratch_monitor(cache_size: usize) -> (tempfile::TempDir, NetworkMonitor, NotificationStreams) {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::open(dir.path().to_str().unwrap()).unwrap();
    let (monitor, streams) = NetworkMonitor::new(cache_size, store);
    (dir, monitor, streams)
}

fn ip(a: u8, b: u8, c: u8, d: u8) -> u32 {
    u32::from_le_bytes([a, b, c, d])
}

/// Ethernet(src=aa:bb:cc:dd:ee:ff) / ARP probe for 192.168.1.50.
fn arp_probe_event() -> WireEvent {
    let mut ev = WireEvent::zeroed();
    ev.event_type = EVENT_TYPE_ARP;
    ev.src_mac = SRC_MAC;
    ev.dst_mac = [0xff; 6];
    ev.arp_op = 1;
    ev.arp_sha = SRC_MAC;
    ev.src_ip = 0;
    ev.dst_ip = ip(192, 168, 1, 50);
    ev
}

/// IPv4(192.168.0.100 -> 8.8.8.8) / TCP(51000 -> 443, SYN).
fn tcp_https_syn_event() -> WireEvent {
    let mut ev = WireEvent::zeroed();
    ev.event_type = EVENT_TYPE_TCP;
    ev.src_mac = SRC_MAC;
    ev.src_ip = ip(192, 168, 0, 100);
    ev.dst_ip = ip(8, 8, 8, 8);
    ev.src_port = 51000;
    ev.dst_port = 443;
    ev.protocol = 6;
    ev.tcp_flags = TCP_FLAG_SYN;
    ev
}

/// UDP(192.168.0.100:54321 -> 8.8.8.8:53) carrying a query for
/// google.com, upgraded to DNS by the kernel.
fn dns_query_event() -> WireEvent {
    let mut ev = WireEvent::zeroed();
    ev.event_type = EVENT_TYPE_DNS;
    ev.src_mac = SRC_MAC;
    ev.src_ip = ip(192, 168, 0, 100);
    ev.dst_ip = ip(8, 8, 8, 8);
    ev.src_port = 54321;
    ev.dst_port = 53;
    ev.protocol = 17;
    let query = [
        0x00, 0x01, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 6, b'g', b'o',
        b'o', b'g', b'l', b'e', 3, b'c', b'o', b'm', 0,
    ];
    ev.l7_payload[..query.len()].copy_from_slice(&query);
    ev
}

/// TCP(:80) with a "GET /index.html" payload, upgraded to HTTP.
fn http_get_event() -> WireEvent {
    let mut ev = WireEvent::zeroed();
    ev.event_type = EVENT_TYPE_HTTP;
    ev.src_mac = SRC_MAC;
    ev.src_ip = ip(192, 168, 0, 100);
    ev.dst_ip = ip(93, 184, 216, 34);
    ev.src_port = 50123;
    ev.dst_port = 80;
    ev.protocol = 6;
    let line = b"GET /index.html HTTP/1.1\r\nHost:";
    ev.l7_payload[..line.len()].copy_from_slice(line);
    ev
}

#[tokio::test]
async fn arp_probe_creates_device_and_pattern() {
    let (_dir, monitor, mut streams) = scratch_monitor(1000);

    monitor.ingest(&arp_probe_event()).await;

    assert_eq!(monitor.stats.total_packets.load(Ordering::Relaxed), 1);
    assert_eq!(monitor.stats.arp_packets.load(Ordering::Relaxed), 1);

    let devices = monitor.snapshot_devices().await;
    assert_eq!(devices.len(), 1);
    let d = &devices[0];
    assert_eq!(d.mac, "aa:bb:cc:dd:ee:ff");
    assert_eq!(d.ip, "0.0.0.0");
    assert_eq!(d.request_count, 1);
    assert!(d
        .seen_patterns
        .contains("ARP:0.0.0.0->192.168.1.50:0:ARP_PROBE"));

    let new_device = streams.new_devices.try_recv().expect("device announced");
    assert_eq!(new_device.mac, "aa:bb:cc:dd:ee:ff");

    let pattern = streams.new_patterns.try_recv().expect("pattern emitted");
    assert_eq!(pattern.protocol, "ARP");
    assert_eq!(pattern.traffic_type, TrafficType::ArpProbe);
    assert_eq!(pattern.service, "ARP_PROBE");
    assert_eq!(pattern.dst_ip, "192.168.1.50");
    assert_eq!(pattern.dst_port, 0);
}

#[tokio::test]
async fn tcp_https_syn_classifies_by_port() {
    let (_dir, monitor, mut streams) = scratch_monitor(1000);

    monitor.ingest(&tcp_https_syn_event()).await;

    let devices = monitor.snapshot_devices().await;
    let d = &devices[0];
    assert_eq!(d.ip, "192.168.0.100");
    assert_eq!(d.tcp_connections, 1);
    assert_eq!(d.services["HTTPS"], 1);
    assert!(d
        .seen_patterns
        .contains("TCP:192.168.0.100->8.8.8.8:443:TCP_HTTPS"));

    let pattern = streams.new_patterns.try_recv().unwrap();
    // The well-known port wins over the SYN flag pattern.
    assert_eq!(pattern.traffic_type, TrafficType::TcpHttps);
    assert_eq!(pattern.service, "HTTPS");
}

#[tokio::test]
async fn dns_query_tracks_domain() {
    let (_dir, monitor, mut streams) = scratch_monitor(1000);

    monitor.ingest(&dns_query_event()).await;

    assert_eq!(monitor.stats.dns_packets.load(Ordering::Relaxed), 1);

    let devices = monitor.snapshot_devices().await;
    let d = &devices[0];
    assert_eq!(d.dns_queries, 1);
    assert_eq!(d.dns_domains["google.com"], 1);
    assert_eq!(d.udp_connections, 1);

    let pattern = streams.new_patterns.try_recv().unwrap();
    assert_eq!(pattern.traffic_type, TrafficType::DnsQuery);
    assert_eq!(pattern.l7_info, "google.com");
}

#[tokio::test]
async fn http_get_tracks_request_line() {
    let (_dir, monitor, mut streams) = scratch_monitor(1000);

    monitor.ingest(&http_get_event()).await;

    let devices = monitor.snapshot_devices().await;
    let d = &devices[0];
    assert_eq!(d.http_requests, 1);
    assert_eq!(d.http_hosts["GET /index.html"], 1);
    assert_eq!(d.tcp_connections, 1);

    let pattern = streams.new_patterns.try_recv().unwrap();
    assert_eq!(pattern.traffic_type, TrafficType::HttpGet);
    assert_eq!(pattern.l7_info, "GET /index.html");
}

#[tokio::test]
async fn repeated_pattern_notifies_once() {
    let (_dir, monitor, mut streams) = scratch_monitor(1000);

    for _ in 0..3 {
        monitor.ingest(&tcp_https_syn_event()).await;
    }

    let devices = monitor.snapshot_devices().await;
    let d = &devices[0];
    assert_eq!(d.tcp_connections, 3);
    assert_eq!(d.services["HTTPS"], 3);
    assert_eq!(d.seen_patterns.len(), 1);

    assert!(streams.new_patterns.try_recv().is_ok());
    assert!(streams.new_patterns.try_recv().is_err());
}

#[tokio::test]
async fn recent_targets_keep_last_twenty() {
    let (_dir, monitor, _streams) = scratch_monitor(1000);

    for i in 1..=25u8 {
        let mut ev = tcp_https_syn_event();
        ev.dst_ip = ip(192, 168, 0, i);
        monitor.ingest(&ev).await;
    }

    let devices = monitor.snapshot_devices().await;
    let targets = &devices[0].targets;
    assert_eq!(targets.len(), 20);
    assert_eq!(targets[0], "192.168.0.6");
    assert_eq!(targets[19], "192.168.0.25");
}

#[tokio::test]
async fn zero_record_is_rejected() {
    let (_dir, monitor, mut streams) = scratch_monitor(1000);

    monitor.ingest(&WireEvent::zeroed()).await;

    assert_eq!(monitor.stats.total_packets.load(Ordering::Relaxed), 0);
    assert_eq!(monitor.device_count().await, 0);
    assert!(streams.new_devices.try_recv().is_err());
}

#[tokio::test]
async fn zero_destination_never_targeted() {
    let (_dir, monitor, _streams) = scratch_monitor(1000);

    let mut ev = tcp_https_syn_event();
    ev.dst_ip = 0;
    monitor.ingest(&ev).await;

    let devices = monitor.snapshot_devices().await;
    assert!(devices[0].targets.is_empty());
}

#[tokio::test]
async fn rehydrated_device_is_not_announced() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().to_str().unwrap().to_string();

    // First incarnation: observe one device, snapshot it, shut down.
    {
        let store = SnapshotStore::open(&path).unwrap();
        let (monitor, _streams) = NetworkMonitor::new(1000, store);
        monitor.ingest(&tcp_https_syn_event()).await;
        monitor.persist_once().await;
    }

    // Second incarnation: the same MAC comes back from the store.
    let store = SnapshotStore::open(&path).unwrap();
    let (monitor, mut streams) = NetworkMonitor::new(1000, store);
    monitor.ingest(&tcp_https_syn_event()).await;

    let devices = monitor.snapshot_devices().await;
    let d = &devices[0];
    // Counter continues from the snapshot.
    assert_eq!(d.tcp_connections, 2);
    // Not new, so no device announcement.
    assert!(streams.new_devices.try_recv().is_err());
    // seen_patterns is transient, so the pattern is re-emitted.
    assert!(streams.new_patterns.try_recv().is_ok());
}

#[tokio::test]
async fn cache_never_exceeds_bound() {
    let (_dir, monitor, _streams) = scratch_monitor(2);

    for i in 0..3u8 {
        let mut ev = tcp_https_syn_event();
        ev.src_mac = [0x02, 0x00, 0x00, 0x00, 0x00, i];
        monitor.ingest(&ev).await;
    }

    assert_eq!(monitor.device_count().await, 2);
}

#[tokio::test]
async fn device_channel_drops_when_full() {
    let (_dir, monitor, mut streams) = scratch_monitor(1000);

    for i in 0..150u16 {
        let mut ev = tcp_https_syn_event();
        ev.src_mac = [0x02, 0x00, 0x00, 0x00, (i >> 8) as u8, i as u8];
        monitor.ingest(&ev).await;
    }

    let mut received = 0;
    while streams.new_devices.try_recv().is_ok() {
        received += 1;
    }
    // The channel buffers 100 announcements; the rest were dropped, but
    // every device still made it into the catalogue.
    assert_eq!(received, 100);
    assert_eq!(monitor.device_count().await, 150);
}

#[tokio::test]
async fn short_records_are_counted() {
    let (_dir, monitor, _streams) = scratch_monitor(1000);

    monitor.record_short_event(41);
    monitor.record_short_event(10);

    assert_eq!(monitor.short_records(), 2);
    assert_eq!(monitor.stats.total_packets.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn snapshot_worker_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().to_str().unwrap().to_string();

    // The store handle is exclusive; release it before inspecting.
    {
        let store = SnapshotStore::open(&path).unwrap();
        let (monitor, _streams) = NetworkMonitor::new(1000, store);
        monitor.ingest(&dns_query_event()).await;
        monitor.persist_once().await;
    }

    let store = SnapshotStore::open(&path).unwrap();
    let d = store.get("aa:bb:cc:dd:ee:ff").unwrap().unwrap();
    assert_eq!(d.dns_queries, 1);
    assert_eq!(d.dns_domains["google.com"], 1);
    assert!(d.seen_patterns.is_empty());
}
