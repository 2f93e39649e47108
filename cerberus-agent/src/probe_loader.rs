//! eBPF classifier loading and interface attachment.
//!
//! One classifier program, one clsact qdisc and one ingress attachment
//! per eligible interface. Per-interface failures are logged and the
//! interface is skipped; attaching to nothing at all is fatal. Dropping
//! the manager detaches every hook and releases the kernel objects.

use anyhow::{anyhow, bail, Context, Result};
use aya::{
    maps::RingBuf,
    programs::{tc, SchedClassifier, TcAttachType},
    Ebpf,
};
use log::{info, warn};
use std::fs;
use std::path::Path;

use cerberus_common::WireEvent;

use crate::aggregator::NetworkMonitor;
use crate::event::parse_event;

/// Interface name prefixes that are never monitored (container and
/// overlay plumbing).
const VIRTUAL_PREFIXES: [&str; 5] = ["veth", "cali", "docker", "br-", "flannel"];

const IFF_UP: u32 = 0x1;
const IFF_LOOPBACK: u32 = 0x8;

/// One successful attachment: `Unbound → Attached → Detached`, where
/// detach happens when the manager is unloaded.
#[derive(Debug, Clone)]
pub struct InterfaceBinding {
    pub name: String,
    pub index: u32,
}

/// Manages the classifier lifecycle from load to detach.
pub struct ProbeManager {
    bpf: Ebpf,
    attached: Vec<InterfaceBinding>,
}

impl ProbeManager {
    /// Run preflight checks and load the classifier object.
    pub fn new() -> Result<Self> {
        run_preflight_checks();

        info!("Loading network classifier...");
        let bpf = Ebpf::load(aya::include_bytes_aligned!(concat!(
            env!("OUT_DIR"),
            "/monitor"
        )))
        .context("Failed to load eBPF classifier")?;

        Ok(Self {
            bpf,
            attached: Vec::new(),
        })
    }

    /// Attach the classifier at the ingress hook of every interface.
    ///
    /// Fails only when not a single interface could be attached.
    pub fn attach_to_interfaces(&mut self, interfaces: &[String]) -> Result<()> {
        info!("Attaching classifier to {} interface(s)...", interfaces.len());

        // The qdisc may already exist from a previous run; that is fine.
        for iface in interfaces {
            if let Err(e) = tc::qdisc_add_clsact(iface) {
                log::debug!("clsact qdisc on {}: {} (may already exist)", iface, e);
            }
        }

        let prog: &mut SchedClassifier = self
            .bpf
            .program_mut("cerberus_monitor")
            .ok_or_else(|| anyhow!("cerberus_monitor program not found in eBPF object"))?
            .try_into()?;
        prog.load()?;

        for iface in interfaces {
            match prog.attach(iface, TcAttachType::Ingress) {
                Ok(_) => {
                    info!("Attached to {}", iface);
                    self.attached.push(InterfaceBinding {
                        name: iface.clone(),
                        index: read_interface_index(iface).unwrap_or(0),
                    });
                }
                Err(e) => warn!("Failed to attach to {}: {}", iface, e),
            }
        }

        if self.attached.is_empty() {
            bail!("failed to attach to any interface");
        }
        info!("Monitoring {} interface(s)", self.attached.len());
        Ok(())
    }

    /// Interfaces the classifier is currently attached to.
    pub fn attached_interfaces(&self) -> &[InterfaceBinding] {
        &self.attached
    }

    /// Enumerate candidate interfaces: up, not loopback, not container
    /// plumbing.
    pub fn discover_interfaces() -> Vec<String> {
        let mut interfaces = Vec::new();

        let entries = match fs::read_dir("/sys/class/net") {
            Ok(entries) => entries,
            Err(e) => {
                warn!("cannot enumerate /sys/class/net: {}", e);
                return interfaces;
            }
        };

        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_monitorable_name(&name) {
                info!("Skipping virtual interface: {}", name);
                continue;
            }
            match read_interface_flags(&name) {
                Some(flags) if is_usable(flags) => interfaces.push(name),
                Some(_) => log::debug!("skipping {} (down or loopback)", name),
                None => warn!("cannot read flags for {}", name),
            }
        }

        interfaces.sort();
        interfaces
    }

    /// Get mutable access to the loaded object, for EbpfLogger setup.
    pub fn bpf_mut(&mut self) -> &mut Ebpf {
        &mut self.bpf
    }

    /// The events ring buffer shared by all attached interfaces.
    pub fn events_ring_buf(&mut self) -> Result<RingBuf<&mut aya::maps::MapData>> {
        let available_maps: Vec<_> = self.bpf.maps().map(|(name, _)| name.to_string()).collect();
        let map = self.bpf.map_mut("EVENTS").ok_or_else(|| {
            anyhow!(
                "EVENTS map not found in eBPF object. Available maps: {:?}",
                available_maps
            )
        })?;
        RingBuf::try_from(map).context("Failed to create RingBuf from EVENTS map")
    }

    /// Detach all hooks and release the kernel objects.
    pub fn unload(self) {
        info!("Detaching classifier from {} interface(s)...", self.attached.len());
        drop(self.bpf);
        info!("Classifier unloaded");
    }
}

/// Drain the ring buffer, FIFO, up to one batch.
///
/// Short records are counted on the monitor and skipped; everything
/// else is decoded as-is.
pub fn poll_events(
    ring_buf: &mut RingBuf<&mut aya::maps::MapData>,
    monitor: &NetworkMonitor,
) -> Vec<WireEvent> {
    const MAX_BATCH_SIZE: usize = 1024;
    let mut events = Vec::new();

    while let Some(item) = ring_buf.next() {
        if events.len() >= MAX_BATCH_SIZE {
            warn!("Hit maximum batch size ({}), stopping poll", MAX_BATCH_SIZE);
            break;
        }
        match parse_event(&item) {
            Ok(ev) => events.push(ev),
            Err(_) => monitor.record_short_event(item.len()),
        }
    }
    events
}

fn is_monitorable_name(name: &str) -> bool {
    !VIRTUAL_PREFIXES.iter().any(|p| name.starts_with(p))
}

fn is_usable(flags: u32) -> bool {
    flags & IFF_UP != 0 && flags & IFF_LOOPBACK == 0
}

fn read_interface_flags(name: &str) -> Option<u32> {
    let raw = fs::read_to_string(format!("/sys/class/net/{}/flags", name)).ok()?;
    parse_interface_flags(&raw)
}

fn read_interface_index(name: &str) -> Option<u32> {
    let raw = fs::read_to_string(format!("/sys/class/net/{}/ifindex", name)).ok()?;
    raw.trim().parse().ok()
}

/// `/sys/class/net/<if>/flags` holds a hex literal like `0x1003`.
fn parse_interface_flags(raw: &str) -> Option<u32> {
    let trimmed = raw.trim();
    let hex = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    u32::from_str_radix(hex, 16).ok()
}

fn run_preflight_checks() {
    if !kernel_version_sufficient() {
        warn!("Kernel older than 5.8; TC classifier and ring buffer may be unavailable");
    }
    if !Path::new("/sys/kernel/btf/vmlinux").exists() {
        warn!("BTF not found at /sys/kernel/btf/vmlinux; loading may fail");
    }
    let euid = unsafe { libc::geteuid() };
    if euid != 0 {
        warn!(
            "Not running as root (euid={}). CAP_BPF and CAP_NET_ADMIN are required.",
            euid
        );
    }
}

fn kernel_version_sufficient() -> bool {
    let version = match fs::read_to_string("/proc/version") {
        Ok(v) => v,
        Err(_) => return false,
    };
    parse_kernel_version(&version)
        .map(|(major, minor)| major > 5 || (major == 5 && minor >= 8))
        .unwrap_or(false)
}

/// Extract (major, minor) from a `/proc/version` string.
///
/// Finds the "version" keyword and parses the following token, which
/// copes with vendor strings like
/// `"Linux (compiled by user) version 5.15.0"`.
fn parse_kernel_version(version_str: &str) -> Option<(u32, u32)> {
    let tokens: Vec<&str> = version_str.split_whitespace().collect();
    let version_part = tokens
        .iter()
        .position(|&t| t.eq_ignore_ascii_case("version"))
        .and_then(|i| tokens.get(i + 1))?;

    let mut parts = version_part.split('.');
    let major: u32 = parts.next()?.parse().ok()?;
    let minor: u32 = parts
        .next()?
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect::<String>()
        .parse()
        .ok()?;

    Some((major, minor))
}
