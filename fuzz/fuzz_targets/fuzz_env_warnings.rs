//! Fuzz target for the warning rules over arbitrary processes.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use witr_common::{Process, Source, SourceType};
use witr_core::source::{env_warnings, warnings};

#[derive(Debug, Arbitrary)]
struct Input {
    command: String,
    user: String,
    working_dir: String,
    service: Option<String>,
    env: Vec<String>,
    exe_deleted: bool,
}

fuzz_target!(|input: Input| {
    let _ = env_warnings(&input.env);
    let process = Process {
        command: input.command,
        user: input.user,
        working_dir: input.working_dir,
        service: input.service,
        env: input.env,
        exe_deleted: input.exe_deleted,
        ..Default::default()
    };
    let first = warnings(std::slice::from_ref(&process), &Source::new(SourceType::Shell, "bash"));
    let again = warnings(std::slice::from_ref(&process), &Source::new(SourceType::Shell, "bash"));
    assert_eq!(first, again);
});
