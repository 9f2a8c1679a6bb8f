//! Kernel socket table decoding.
//!
//! `/proc/net/tcp` and `/proc/net/tcp6` encode each endpoint as
//! `ADDRESS:PORT` in hex. The port is plain big-endian hex. The address is
//! stored as host-order 32-bit words, so on little-endian machines every
//! 4-byte group appears byte-reversed. IPv6 addresses are four such words,
//! each reversed on its own.
//!
//! Decoding never fails: malformed fields decode to an empty address and
//! port 0, and the caller treats that as "address unknown".

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// TCP connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TcpState {
    Established,
    SynSent,
    SynRecv,
    FinWait1,
    FinWait2,
    TimeWait,
    Close,
    CloseWait,
    LastAck,
    Listen,
    Closing,
    Unknown,
}

impl TcpState {
    /// Parse TCP state from the `st` column of /proc/net/tcp.
    pub fn from_hex(hex: u8) -> Self {
        match hex {
            0x01 => TcpState::Established,
            0x02 => TcpState::SynSent,
            0x03 => TcpState::SynRecv,
            0x04 => TcpState::FinWait1,
            0x05 => TcpState::FinWait2,
            0x06 => TcpState::TimeWait,
            0x07 => TcpState::Close,
            0x08 => TcpState::CloseWait,
            0x09 => TcpState::LastAck,
            0x0A => TcpState::Listen,
            0x0B => TcpState::Closing,
            _ => TcpState::Unknown,
        }
    }

    /// Parse the state names printed by `netstat`, `lsof` and `sockstat`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "ESTABLISHED" => TcpState::Established,
            "SYN_SENT" => TcpState::SynSent,
            "SYN_RECV" | "SYN_RECEIVED" => TcpState::SynRecv,
            "FIN_WAIT1" | "FIN_WAIT_1" => TcpState::FinWait1,
            "FIN_WAIT2" | "FIN_WAIT_2" => TcpState::FinWait2,
            "TIME_WAIT" => TcpState::TimeWait,
            "CLOSE" | "CLOSED" => TcpState::Close,
            "CLOSE_WAIT" => TcpState::CloseWait,
            "LAST_ACK" => TcpState::LastAck,
            "LISTEN" | "LISTENING" => TcpState::Listen,
            "CLOSING" => TcpState::Closing,
            _ => TcpState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TcpState::Established => "ESTABLISHED",
            TcpState::SynSent => "SYN_SENT",
            TcpState::SynRecv => "SYN_RECV",
            TcpState::FinWait1 => "FIN_WAIT1",
            TcpState::FinWait2 => "FIN_WAIT2",
            TcpState::TimeWait => "TIME_WAIT",
            TcpState::Close => "CLOSE",
            TcpState::CloseWait => "CLOSE_WAIT",
            TcpState::LastAck => "LAST_ACK",
            TcpState::Listen => "LISTEN",
            TcpState::Closing => "CLOSING",
            TcpState::Unknown => "UNKNOWN",
        }
    }

    /// Whether this state is a listening socket.
    pub fn is_listen(&self) -> bool {
        matches!(self, TcpState::Listen)
    }
}

impl std::fmt::Display for TcpState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of a kernel TCP socket table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketEntry {
    pub local_addr: String,
    pub local_port: u16,
    pub state: TcpState,
    /// Socket inode; 0 for sockets with no owner in this namespace.
    pub inode: u64,
    pub is_ipv6: bool,
}

/// Parse the content of /proc/net/tcp or /proc/net/tcp6.
pub fn parse_socket_table(content: &str, is_ipv6: bool) -> Vec<SocketEntry> {
    let mut entries = Vec::new();

    for line in content.lines().skip(1) {
        // Format: sl local_address rem_address st tx_queue:rx_queue tr:tm->when retrnsmt uid timeout inode
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 10 {
            continue;
        }

        let (local_addr, local_port) = parse_addr(parts[1], is_ipv6);
        let state = u8::from_str_radix(parts[3], 16)
            .map(TcpState::from_hex)
            .unwrap_or(TcpState::Unknown);
        let inode = parts[9].parse().unwrap_or(0);

        entries.push(SocketEntry {
            local_addr,
            local_port,
            state,
            inode,
            is_ipv6,
        });
    }

    entries
}

/// Decode a kernel `ADDRESS:PORT` hex pair.
///
/// The port is decoded independently of the address, so a garbled address
/// with a valid port yields `("", port)`. IPv6 addresses shorter than 16
/// bytes are zero-padded; longer ones are truncated.
pub fn parse_addr(raw: &str, is_ipv6: bool) -> (String, u16) {
    let Some((addr_hex, port_hex)) = raw.split_once(':') else {
        return (String::new(), 0);
    };

    let port = if is_hex(port_hex) {
        u16::from_str_radix(port_hex, 16).unwrap_or(0)
    } else {
        0
    };

    let addr = if is_ipv6 {
        decode_ipv6(addr_hex)
    } else {
        decode_ipv4(addr_hex)
    };

    (addr.unwrap_or_default(), port)
}

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_hexdigit())
}

fn decode_hex_bytes(s: &str) -> Option<Vec<u8>> {
    if !is_hex(s) || s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

fn decode_ipv4(hex: &str) -> Option<String> {
    if hex.len() != 8 {
        return None;
    }
    let mut bytes = decode_hex_bytes(hex)?;
    bytes.reverse();
    Some(Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]).to_string())
}

fn decode_ipv6(hex: &str) -> Option<String> {
    let mut bytes = decode_hex_bytes(hex)?;
    bytes.resize(16, 0);
    for word in bytes.chunks_mut(4) {
        word.reverse();
    }
    let mut octets = [0u8; 16];
    octets.copy_from_slice(&bytes);
    Some(Ipv6Addr::from(octets).to_string())
}

/// Encode an address and port the way the kernel prints them.
pub fn encode_addr(addr: IpAddr, port: u16) -> String {
    let mut out = String::new();
    match addr {
        IpAddr::V4(v4) => {
            for b in v4.octets().iter().rev() {
                out.push_str(&format!("{b:02X}"));
            }
        }
        IpAddr::V6(v6) => {
            for word in v6.octets().chunks(4) {
                for b in word.iter().rev() {
                    out.push_str(&format!("{b:02X}"));
                }
            }
        }
    }
    out.push_str(&format!(":{port:04X}"));
    out
}

/// Inodes of LISTEN sockets bound to `port`.
pub fn listen_inodes_for_port(entries: &[SocketEntry], port: u16) -> BTreeSet<u64> {
    entries
        .iter()
        .filter(|e| e.state.is_listen() && e.local_port == port && e.inode != 0)
        .map(|e| e.inode)
        .collect()
}

/// Whether any LISTEN row exists for `port`, owned or not.
pub fn has_listener(entries: &[SocketEntry], port: u16) -> bool {
    entries
        .iter()
        .any(|e| e.state.is_listen() && e.local_port == port)
}

/// Parse an fd symlink target of the form `socket:[12345]`.
pub fn socket_inode_from_link(link: &str) -> Option<u64> {
    link.strip_prefix("socket:[")?
        .strip_suffix(']')?
        .parse()
        .ok()
}

/// Whether a bind address is reachable from other hosts.
///
/// Wildcards count as public. Loopback and link-local addresses do not.
/// Anything unparseable is treated as unknown, not public.
pub fn is_public_bind(addr: &str) -> bool {
    let trimmed = addr.trim().trim_start_matches('[').trim_end_matches(']');
    let Ok(ip) = trimmed.parse::<IpAddr>() else {
        return false;
    };
    match ip {
        IpAddr::V4(v4) => !v4.is_loopback() && !v4.is_link_local(),
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return !mapped.is_loopback() && !mapped.is_link_local();
            }
            let link_local = (v6.segments()[0] & 0xffc0) == 0xfe80;
            !v6.is_loopback() && !link_local
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tcp_state_from_hex() {
        assert_eq!(TcpState::from_hex(0x01), TcpState::Established);
        assert_eq!(TcpState::from_hex(0x06), TcpState::TimeWait);
        assert_eq!(TcpState::from_hex(0x0A), TcpState::Listen);
        assert_eq!(TcpState::from_hex(0xFF), TcpState::Unknown);
    }

    #[test]
    fn test_tcp_state_from_name() {
        assert_eq!(TcpState::from_name("LISTENING"), TcpState::Listen);
        assert_eq!(TcpState::from_name("close-wait"), TcpState::CloseWait);
        assert_eq!(TcpState::from_name("bogus"), TcpState::Unknown);
    }

    #[test]
    fn test_parse_addr_table() {
        let zeros = "0".repeat(32);
        let cases: Vec<(String, bool, &str, u16)> = vec![
            ("0100007F:0277".into(), false, "127.0.0.1", 631),
            ("00000000:0050".into(), false, "0.0.0.0", 80),
            (
                "00000000000000000000000001000000:0277".into(),
                true,
                "::1",
                631,
            ),
            (format!("{zeros}:01BB"), true, "::", 443),
            (
                "000080FE000000000000000001000000:1F90".into(),
                true,
                "fe80::1",
                8080,
            ),
            ("".into(), false, "", 0),
            ("0100007F0277".into(), false, "", 0),
            ("ZZZZZZZZ:0050".into(), false, "", 80),
            (format!("{}:0050", "Z".repeat(32)), true, "", 80),
            ("0000000000000000:0277".into(), true, "::", 631),
            ("01007F:0277".into(), false, "", 631),
            (":".into(), false, "", 0),
        ];

        for (raw, v6, want_addr, want_port) in cases {
            let (addr, port) = parse_addr(&raw, v6);
            assert_eq!(addr, want_addr, "address for {raw:?}");
            assert_eq!(port, want_port, "port for {raw:?}");
        }
    }

    #[test]
    fn test_encode_matches_kernel_format() {
        let addr: IpAddr = "127.0.0.1".parse().unwrap();
        assert_eq!(encode_addr(addr, 631), "0100007F:0277");
        let addr: IpAddr = "fe80::1".parse().unwrap();
        assert_eq!(
            encode_addr(addr, 8080),
            "000080FE000000000000000001000000:1F90"
        );
    }

    #[test]
    fn test_parse_socket_table() {
        let content = r#"  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 0100007F:0035 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 12345 1 0000000000000000 100 0 0 10 0
   1: 0100007F:0CEA 0100007F:0035 01 00000000:00000000 00:00000000 00000000  1000        0 67890 1 0000000000000000 20 0 0 10 -1
   2: short line
"#;

        let entries = parse_socket_table(content, false);
        assert_eq!(entries.len(), 2);

        assert_eq!(entries[0].local_addr, "127.0.0.1");
        assert_eq!(entries[0].local_port, 53);
        assert_eq!(entries[0].state, TcpState::Listen);
        assert_eq!(entries[0].inode, 12345);

        assert_eq!(entries[1].local_port, 3306);
        assert_eq!(entries[1].state, TcpState::Established);
    }

    #[test]
    fn test_listen_inodes_for_port() {
        let content = r#"  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 00000000:0050 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 111 1 0000000000000000 100 0 0 10 0
   1: 00000000:0050 0100007F:C350 01 00000000:00000000 00:00000000 00000000     0        0 222 1 0000000000000000 100 0 0 10 0
   2: 0100007F:0050 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 0 1 0000000000000000 100 0 0 10 0
"#;
        let entries = parse_socket_table(content, false);
        let inodes = listen_inodes_for_port(&entries, 80);
        assert_eq!(inodes.into_iter().collect::<Vec<_>>(), vec![111]);
        assert!(has_listener(&entries, 80));
        assert!(!has_listener(&entries, 443));
    }

    #[test]
    fn test_socket_inode_from_link() {
        assert_eq!(socket_inode_from_link("socket:[4242]"), Some(4242));
        assert_eq!(socket_inode_from_link("pipe:[4242]"), None);
        assert_eq!(socket_inode_from_link("socket:[abc]"), None);
    }

    #[test]
    fn test_is_public_bind() {
        assert!(is_public_bind("0.0.0.0"));
        assert!(is_public_bind("::"));
        assert!(is_public_bind("192.168.1.10"));
        assert!(!is_public_bind("127.0.0.1"));
        assert!(!is_public_bind("::1"));
        assert!(!is_public_bind("[::1]"));
        assert!(!is_public_bind("169.254.3.4"));
        assert!(!is_public_bind("fe80::1"));
        assert!(!is_public_bind(""));
        assert!(!is_public_bind("*"));
    }
}
