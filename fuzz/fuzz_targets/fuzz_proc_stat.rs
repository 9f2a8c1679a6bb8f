//! Fuzz target for /proc/[pid]/stat parsing.
//!
//! `parse_stat` must return `None` for malformed input, never panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use witr_core::collect::proc_parsers::{health_from_stat, parse_stat};

fuzz_target!(|data: &str| {
    if let Some(stat) = parse_stat(data) {
        let _ = health_from_stat(&stat, 100, 4096);
    }
});
