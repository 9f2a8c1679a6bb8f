//! witr core library.
//!
//! Answers "why is this running?" for a process, port, file or name:
//! - Target resolution to candidate PIDs
//! - Ancestry walking up to the init process
//! - Source classification (container, service manager, cron, shell)
//! - Warning rules and TCP socket state descriptions
//! - Per-platform process collection behind one trait
//!
//! The binary entry point is in `main.rs`.

pub mod ancestry;
pub mod app;
pub mod collect;
pub mod config;
pub mod exit_codes;
pub mod logging;
pub mod output;
pub mod source;
pub mod target;

// In-memory process table for pipeline and integration tests.
pub mod mock_process;
