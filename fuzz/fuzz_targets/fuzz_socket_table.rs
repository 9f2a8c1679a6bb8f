//! Fuzz target for /proc/net/tcp and /proc/net/tcp6 decoding.

#![no_main]

use libfuzzer_sys::fuzz_target;
use witr_core::collect::net::{listen_inodes_for_port, parse_addr, parse_socket_table};

fuzz_target!(|data: &str| {
    for is_ipv6 in [false, true] {
        let entries = parse_socket_table(data, is_ipv6);
        let _ = listen_inodes_for_port(&entries, 80);
        for field in data.split_whitespace().take(8) {
            let _ = parse_addr(field, is_ipv6);
        }
    }
});
