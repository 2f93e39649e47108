//! Static lookup tables: OUI prefix → vendor, port → service.
//!
//! Both are built once at startup and never mutated. The entry sets are
//! the embedded fallbacks; refreshing them from an external source is a
//! packaging concern, not a capture concern.

use std::collections::HashMap;

/// One well-known port registration.
#[derive(Debug, Clone, Copy)]
pub struct ServiceInfo {
    pub port: u16,
    /// "TCP", "UDP" or "BOTH".
    pub protocol: &'static str,
    pub service: &'static str,
    pub description: &'static str,
}

/// OUI prefix (uppercase, colon-separated first three octets) → vendor.
pub fn oui_table() -> HashMap<&'static str, &'static str> {
    HashMap::from([
        ("00:00:5E", "IANA"),
        ("00:01:42", "Cisco"),
        ("00:03:93", "Apple"),
        ("00:0C:29", "VMware"),
        ("00:0D:3A", "Microsoft"),
        ("00:15:5D", "Microsoft"),
        ("00:16:3E", "Xensource"),
        ("00:1A:11", "Google"),
        ("00:1B:21", "Intel"),
        ("00:1C:42", "Parallels"),
        ("00:50:56", "VMware"),
        ("08:00:27", "Oracle VirtualBox"),
        ("18:03:73", "Texas Instruments"),
        ("28:6A:BA", "Tp-Link"),
        ("3C:46:D8", "Tp-Link"),
        ("6C:4F:89", "Router/Gateway"),
        ("DC:62:79", "IoT Device"),
        ("52:54:00", "QEMU/KVM"),
        ("AC:DE:48", "Private"),
        ("B8:27:EB", "Raspberry Pi"),
        ("DC:A6:32", "Raspberry Pi"),
        ("E4:5F:01", "Raspberry Pi"),
    ])
}

/// Port → service registration.
pub fn service_table() -> HashMap<u16, ServiceInfo> {
    let entries = [
        ServiceInfo { port: 20, protocol: "TCP", service: "FTP-DATA", description: "File Transfer Protocol (Data)" },
        ServiceInfo { port: 21, protocol: "TCP", service: "FTP", description: "File Transfer Protocol (Control)" },
        ServiceInfo { port: 22, protocol: "TCP", service: "SSH", description: "Secure Shell" },
        ServiceInfo { port: 23, protocol: "TCP", service: "TELNET", description: "Telnet" },
        ServiceInfo { port: 25, protocol: "TCP", service: "SMTP", description: "Simple Mail Transfer Protocol" },
        ServiceInfo { port: 53, protocol: "UDP", service: "DNS", description: "Domain Name System" },
        ServiceInfo { port: 67, protocol: "UDP", service: "DHCP-SERVER", description: "DHCP Server" },
        ServiceInfo { port: 68, protocol: "UDP", service: "DHCP-CLIENT", description: "DHCP Client" },
        ServiceInfo { port: 80, protocol: "TCP", service: "HTTP", description: "Hypertext Transfer Protocol" },
        ServiceInfo { port: 110, protocol: "TCP", service: "POP3", description: "Post Office Protocol v3" },
        ServiceInfo { port: 123, protocol: "UDP", service: "NTP", description: "Network Time Protocol" },
        ServiceInfo { port: 143, protocol: "TCP", service: "IMAP", description: "Internet Message Access Protocol" },
        ServiceInfo { port: 161, protocol: "UDP", service: "SNMP", description: "Simple Network Management Protocol" },
        ServiceInfo { port: 162, protocol: "UDP", service: "SNMP-TRAP", description: "SNMP Trap" },
        ServiceInfo { port: 443, protocol: "TCP", service: "HTTPS", description: "HTTP over TLS/SSL" },
        ServiceInfo { port: 445, protocol: "TCP", service: "SMB", description: "Server Message Block" },
        ServiceInfo { port: 514, protocol: "UDP", service: "SYSLOG", description: "System Logging" },
        ServiceInfo { port: 1194, protocol: "UDP", service: "OPENVPN", description: "OpenVPN" },
        ServiceInfo { port: 1883, protocol: "TCP", service: "MQTT", description: "Message Queuing Telemetry Transport" },
        ServiceInfo { port: 3306, protocol: "TCP", service: "MYSQL", description: "MySQL Database" },
        ServiceInfo { port: 3389, protocol: "TCP", service: "RDP", description: "Remote Desktop Protocol" },
        ServiceInfo { port: 5432, protocol: "TCP", service: "POSTGRESQL", description: "PostgreSQL Database" },
        ServiceInfo { port: 5672, protocol: "TCP", service: "AMQP", description: "Advanced Message Queuing Protocol" },
        ServiceInfo { port: 6379, protocol: "TCP", service: "REDIS", description: "Redis Database" },
        ServiceInfo { port: 8080, protocol: "TCP", service: "HTTP-ALT", description: "HTTP Alternate" },
        ServiceInfo { port: 8443, protocol: "TCP", service: "HTTPS-ALT", description: "HTTPS Alternate" },
        ServiceInfo { port: 9200, protocol: "TCP", service: "ELASTICSEARCH", description: "Elasticsearch" },
        ServiceInfo { port: 27017, protocol: "TCP", service: "MONGODB", description: "MongoDB Database" },
    ];
    entries.into_iter().map(|e| (e.port, e)).collect()
}

/// Resolve a service label for a port, or the `"<PROTO>/<port>"` fallback.
///
/// `protocol` is "TCP" or "UDP"; a registration only matches when its
/// protocol agrees or is "BOTH".
pub fn service_name(services: &HashMap<u16, ServiceInfo>, port: u16, protocol: &str) -> String {
    match services.get(&port) {
        Some(svc) if svc.protocol == protocol || svc.protocol == "BOTH" => {
            svc.service.to_string()
        }
        _ => format!("{}/{}", protocol, port),
    }
}

/// Resolve a vendor from a lowercase colon-hex MAC, or "Unknown".
pub fn vendor_name(ouis: &HashMap<&'static str, &'static str>, mac: &str) -> String {
    let upper = mac.to_uppercase();
    let parts: Vec<&str> = upper.split(':').collect();
    if parts.len() < 3 {
        return "Unknown".to_string();
    }
    let oui = parts[..3].join(":");
    ouis.get(oui.as_str())
        .map(|v| v.to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_tcp_service() {
        let services = service_table();
        assert_eq!(service_name(&services, 443, "TCP"), "HTTPS");
        assert_eq!(service_name(&services, 22, "TCP"), "SSH");
    }

    #[test]
    fn protocol_mismatch_falls_back() {
        let services = service_table();
        // 443 is registered TCP-only.
        assert_eq!(service_name(&services, 443, "UDP"), "UDP/443");
        // 53 is registered UDP-only.
        assert_eq!(service_name(&services, 53, "TCP"), "TCP/53");
    }

    #[test]
    fn unknown_port_falls_back() {
        let services = service_table();
        assert_eq!(service_name(&services, 51000, "TCP"), "TCP/51000");
    }

    #[test]
    fn vendor_lookup_is_case_insensitive() {
        let ouis = oui_table();
        assert_eq!(vendor_name(&ouis, "b8:27:eb:12:34:56"), "Raspberry Pi");
        assert_eq!(vendor_name(&ouis, "B8:27:EB:12:34:56"), "Raspberry Pi");
    }

    #[test]
    fn unknown_vendor() {
        let ouis = oui_table();
        assert_eq!(vendor_name(&ouis, "aa:bb:cc:dd:ee:ff"), "Unknown");
        assert_eq!(vendor_name(&ouis, "aabbcc"), "Unknown");
    }
}
