//! The device catalogue: LRU cache, global counters, pattern detection.
//!
//! `NetworkMonitor::ingest` is the single mutator, called from the
//! ring-buffer drain loop. The snapshot worker and the stats printers
//! only read. One reader-writer lock over the cache covers all of it;
//! the global counters are atomics and never need the lock.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use log::{debug, warn};
use lru::LruCache;
use tokio::sync::{mpsc, RwLock};

use cerberus_common::{
    WireEvent, EVENT_TYPE_ARP, EVENT_TYPE_DNS, EVENT_TYPE_HTTP, EVENT_TYPE_ICMP, EVENT_TYPE_TCP,
    EVENT_TYPE_TLS, EVENT_TYPE_UDP,
};

use crate::classify::{classify, TrafficType};
use crate::device::{CommunicationPattern, DeviceInfo, FlowStats};
use crate::event::{format_ipv4, format_mac};
use crate::l7;
use crate::store::SnapshotStore;
use crate::tables::{self, ServiceInfo};

/// Default bound on the device cache.
pub const DEFAULT_CACHE_SIZE: usize = 1000;

/// New-device notifications buffered before dropping.
const NEW_DEVICE_CAPACITY: usize = 100;

/// New-pattern notifications buffered before dropping.
const NEW_PATTERN_CAPACITY: usize = 1000;

/// Process-lifetime packet counters, one per event family.
#[derive(Debug, Default)]
pub struct GlobalStats {
    pub total_packets: AtomicU64,
    pub arp_packets: AtomicU64,
    pub tcp_packets: AtomicU64,
    pub udp_packets: AtomicU64,
    pub icmp_packets: AtomicU64,
    pub dns_packets: AtomicU64,
    pub http_packets: AtomicU64,
    pub tls_packets: AtomicU64,
}

impl GlobalStats {
    fn bump_family(&self, event_type: u8) {
        let counter = match event_type {
            EVENT_TYPE_ARP => &self.arp_packets,
            EVENT_TYPE_TCP => &self.tcp_packets,
            EVENT_TYPE_UDP => &self.udp_packets,
            EVENT_TYPE_ICMP => &self.icmp_packets,
            EVENT_TYPE_DNS => &self.dns_packets,
            EVENT_TYPE_HTTP => &self.http_packets,
            EVENT_TYPE_TLS => &self.tls_packets,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.total_packets.fetch_add(1, Ordering::Relaxed);
    }
}

/// Receive ends of the notification channels, handed to subscribers.
pub struct NotificationStreams {
    pub new_devices: mpsc::Receiver<DeviceInfo>,
    pub new_patterns: mpsc::Receiver<CommunicationPattern>,
}

pub struct NetworkMonitor {
    cache: RwLock<LruCache<String, DeviceInfo>>,
    store: SnapshotStore,
    ouis: HashMap<&'static str, &'static str>,
    services: HashMap<u16, ServiceInfo>,
    pub stats: GlobalStats,
    new_device_tx: mpsc::Sender<DeviceInfo>,
    new_pattern_tx: mpsc::Sender<CommunicationPattern>,
    short_records: AtomicU64,
}

impl NetworkMonitor {
    /// Build a monitor over an opened snapshot store.
    pub fn new(cache_size: usize, store: SnapshotStore) -> (Self, NotificationStreams) {
        let (new_device_tx, new_devices) = mpsc::channel(NEW_DEVICE_CAPACITY);
        let (new_pattern_tx, new_patterns) = mpsc::channel(NEW_PATTERN_CAPACITY);

        let capacity = NonZeroUsize::new(cache_size)
            .or(NonZeroUsize::new(DEFAULT_CACHE_SIZE))
            .expect("default cache size is non-zero");

        let monitor = Self {
            cache: RwLock::new(LruCache::new(capacity)),
            store,
            ouis: tables::oui_table(),
            services: tables::service_table(),
            stats: GlobalStats::default(),
            new_device_tx,
            new_pattern_tx,
            short_records: AtomicU64::new(0),
        };

        (
            monitor,
            NotificationStreams {
                new_devices,
                new_patterns,
            },
        )
    }

    /// Account one decoded event into the catalogue.
    ///
    /// Unknown event types (an all-zero record, a corrupt tag) are
    /// rejected before any counter moves.
    pub async fn ingest(&self, ev: &WireEvent) {
        let src_ip = format_ipv4({ ev.src_ip });
        let dst_ip = format_ipv4({ ev.dst_ip });

        let Some(traffic_type) = classify(ev, &src_ip, &dst_ip) else {
            debug!("unclassifiable event type {}, dropped", ev.event_type);
            return;
        };

        self.stats.bump_family(ev.event_type);

        let (protocol, service) = self.protocol_and_service(ev, traffic_type);
        let l7_info = l7::l7_info(ev);
        let src_mac = format_mac(&ev.src_mac);
        let dst_port = { ev.dst_port };
        let now = Utc::now();

        let mut cache = self.cache.write().await;

        let mut is_new = false;
        let mut device = match cache.pop(&src_mac) {
            Some(d) => d,
            None => match self.store.get(&src_mac) {
                Ok(Some(d)) => d,
                Ok(None) => {
                    is_new = true;
                    let vendor = tables::vendor_name(&self.ouis, &src_mac);
                    DeviceInfo::new(src_mac.clone(), src_ip.clone(), vendor, now)
                }
                Err(e) => {
                    warn!("snapshot lookup for {} failed: {}", src_mac, e);
                    is_new = true;
                    let vendor = tables::vendor_name(&self.ouis, &src_mac);
                    DeviceInfo::new(src_mac.clone(), src_ip.clone(), vendor, now)
                }
            },
        };

        device.last_seen = now;
        if device.ip != src_ip && src_ip != "0.0.0.0" {
            device.ip = src_ip.clone();
        }

        *device
            .traffic_type_counts
            .entry(traffic_type)
            .or_insert(0) += 1;
        *device.services.entry(service.clone()).or_insert(0) += 1;

        if !l7_info.is_empty() {
            match ev.event_type {
                EVENT_TYPE_DNS => {
                    *device.dns_domains.entry(l7_info.clone()).or_insert(0) += 1;
                    device.dns_queries += 1;
                }
                EVENT_TYPE_HTTP => {
                    *device.http_hosts.entry(l7_info.clone()).or_insert(0) += 1;
                    device.http_requests += 1;
                }
                EVENT_TYPE_TLS => {
                    *device.tls_snis.entry(l7_info.clone()).or_insert(0) += 1;
                    device.tls_connections += 1;
                }
                _ => {}
            }
        }

        match ev.event_type {
            EVENT_TYPE_TCP | EVENT_TYPE_HTTP | EVENT_TYPE_TLS => device.tcp_connections += 1,
            EVENT_TYPE_UDP | EVENT_TYPE_DNS => device.udp_connections += 1,
            EVENT_TYPE_ICMP => device.icmp_packets += 1,
            EVENT_TYPE_ARP => {
                if { ev.arp_op } == 1 {
                    device.request_count += 1;
                } else {
                    device.reply_count += 1;
                }
            }
            _ => {}
        }

        let flow_key = format!("{}:{}->{}:{}", protocol, src_ip, dst_ip, dst_port);
        device
            .flow_stats
            .entry(flow_key)
            .and_modify(|f| f.record(now))
            .or_insert_with(|| FlowStats::new(now));

        device.push_target(&dst_ip);

        let pattern_key = format!(
            "{}:{}->{}:{}:{}",
            protocol, src_ip, dst_ip, dst_port, traffic_type
        );
        if device.seen_patterns.insert(pattern_key) {
            let pattern = CommunicationPattern {
                src_mac: src_mac.clone(),
                src_ip,
                dst_ip,
                dst_port,
                protocol: protocol.to_string(),
                traffic_type,
                service,
                timestamp: now,
                l7_info,
                interface: device.interface.clone(),
            };
            // Non-blocking: a stalled subscriber loses patterns, the
            // catalogue does not.
            let _ = self.new_pattern_tx.try_send(pattern);
        }

        let announce = is_new.then(|| device.clone());
        if let Some((evicted_mac, _)) = cache.push(src_mac, device) {
            debug!("cache full, evicted {}", evicted_mac);
        }
        drop(cache);

        if let Some(device) = announce {
            let _ = self.new_device_tx.try_send(device);
        }
    }

    fn protocol_and_service(
        &self,
        ev: &WireEvent,
        traffic_type: TrafficType,
    ) -> (&'static str, String) {
        match ev.event_type {
            EVENT_TYPE_ARP => ("ARP", traffic_type.as_str().to_string()),
            EVENT_TYPE_TCP => (
                "TCP",
                tables::service_name(&self.services, { ev.dst_port }, "TCP"),
            ),
            EVENT_TYPE_UDP => (
                "UDP",
                tables::service_name(&self.services, { ev.dst_port }, "UDP"),
            ),
            EVENT_TYPE_ICMP => ("ICMP", traffic_type.as_str().to_string()),
            EVENT_TYPE_DNS => ("DNS", "DNS".to_string()),
            EVENT_TYPE_HTTP => ("HTTP", "HTTP".to_string()),
            EVENT_TYPE_TLS => ("TLS", "TLS".to_string()),
            _ => ("", String::new()),
        }
    }

    /// Count (and log) a record the parser rejected.
    pub fn record_short_event(&self, len: usize) {
        let n = self.short_records.fetch_add(1, Ordering::Relaxed) + 1;
        warn!("short ring-buffer record ({} bytes), {} so far", len, n);
    }

    pub fn short_records(&self) -> u64 {
        self.short_records.load(Ordering::Relaxed)
    }

    /// Number of devices currently cached.
    pub async fn device_count(&self) -> usize {
        self.cache.read().await.len()
    }

    /// Copy the current catalogue out under the read lock.
    ///
    /// Recency order is left untouched; serialisation happens on the
    /// caller's time, not under the lock.
    pub async fn snapshot_devices(&self) -> Vec<DeviceInfo> {
        let cache = self.cache.read().await;
        cache.iter().map(|(_, d)| d.clone()).collect()
    }

    /// Vendor of a cached device, if present.
    pub async fn vendor_of(&self, mac: &str) -> Option<String> {
        let cache = self.cache.read().await;
        cache.peek(mac).map(|d| d.vendor.clone())
    }

    /// Write every cached device to the snapshot store. Failures are
    /// per-device: one bad write never blocks the rest.
    pub async fn persist_once(&self) {
        let devices = self.snapshot_devices().await;
        let mut written = 0usize;
        for device in &devices {
            match self.store.upsert(device) {
                Ok(()) => written += 1,
                Err(e) => warn!("snapshot write for {} failed: {}", device.mac, e),
            }
        }
        if let Err(e) = self.store.flush() {
            warn!("snapshot flush failed: {}", e);
        }
        debug!("snapshot tick: {}/{} devices written", written, devices.len());
    }

    /// One-line liveness summary for the 10 s tick.
    pub async fn liveness_line(&self) -> String {
        format!(
            "Alive - Packets: Total={} ARP={} TCP={} UDP={} | Devices={}",
            self.stats.total_packets.load(Ordering::Relaxed),
            self.stats.arp_packets.load(Ordering::Relaxed),
            self.stats.tcp_packets.load(Ordering::Relaxed),
            self.stats.udp_packets.load(Ordering::Relaxed),
            self.device_count().await,
        )
    }

    /// The 60 s full statistics summary.
    pub async fn print_stats(&self) {
        let devices = self.snapshot_devices().await;
        let s = &self.stats;

        println!("\n╔═══════════════════════════════════════════════════════════════╗");
        println!("║              NETWORK STATISTICS SUMMARY                       ║");
        println!("╠═══════════════════════════════════════════════════════════════╣");
        println!("║ Total Devices: {:<47} ║", devices.len());
        println!(
            "║ Total Packets: {:<47} ║",
            s.total_packets.load(Ordering::Relaxed)
        );
        println!("║   - ARP:  {:<52} ║", s.arp_packets.load(Ordering::Relaxed));
        println!("║   - TCP:  {:<52} ║", s.tcp_packets.load(Ordering::Relaxed));
        println!("║   - UDP:  {:<52} ║", s.udp_packets.load(Ordering::Relaxed));
        println!("║   - ICMP: {:<52} ║", s.icmp_packets.load(Ordering::Relaxed));
        println!("║   - DNS:  {:<52} ║", s.dns_packets.load(Ordering::Relaxed));
        println!("║   - HTTP: {:<52} ║", s.http_packets.load(Ordering::Relaxed));
        println!("║   - TLS:  {:<52} ║", s.tls_packets.load(Ordering::Relaxed));
        println!("╚═══════════════════════════════════════════════════════════════╝\n");

        for device in &devices {
            println!("┌─ Device: {}", device.mac);
            println!("│  IP: {} | Vendor: {}", device.ip, device.vendor);
            println!(
                "│  ARP: Req={} Reply={} | TCP: {} | UDP: {} | ICMP: {}",
                device.request_count,
                device.reply_count,
                device.tcp_connections,
                device.udp_connections,
                device.icmp_packets
            );

            if device.dns_queries > 0 {
                print!("│  DNS Queries: {}", device.dns_queries);
                if !device.dns_domains.is_empty() {
                    print!(" | Top Domains: ");
                    for (domain, count) in device.dns_domains.iter().take(3) {
                        print!("{}({}) ", domain, count);
                    }
                }
                println!();
            }
            if device.http_requests > 0 {
                println!("│  HTTP Requests: {}", device.http_requests);
            }
            if device.tls_connections > 0 {
                println!("│  TLS Connections: {}", device.tls_connections);
            }
            if !device.services.is_empty() {
                print!("│  Top Services: ");
                for (svc, count) in device.services.iter().take(5) {
                    print!("{}({}) ", svc, count);
                }
                println!();
            }

            println!(
                "│  First: {} | Last: {}",
                device.first_seen.format("%H:%M:%S"),
                device.last_seen.format("%H:%M:%S")
            );

            if !device.targets.is_empty() {
                let tail = device.targets.len().saturating_sub(3);
                println!("│  Recent Targets: {:?}", &device.targets[tail..]);
            }
            println!("└─");
        }
    }
}
