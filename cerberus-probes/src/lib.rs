//! eBPF probes for cerberus
//!
//! This crate contains the kernel-side classifier that runs at the TC
//! ingress hook of every monitored interface. It decodes Ethernet + one
//! of {ARP, IPv4/TCP, IPv4/UDP, IPv4/ICMP}, peeks at the first 32 bytes
//! of transport payload, and emits one fixed-layout event per packet
//! into a shared ring buffer.
//!
//! Note: this crate must be built for the bpfel-unknown-none target.
//! cerberus-agent's build.rs handles cross-compilation automatically.

#![no_std]
#![no_main]

#[cfg(not(test))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}
