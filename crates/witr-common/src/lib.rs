//! witr common types and errors.
//!
//! This crate provides the value types shared by the resolver, the
//! classifier and the renderers:
//! - The query target and process snapshot model
//! - Source classification and socket state descriptions
//! - The error taxonomy with codes and remediation hints
//! - Output format selection

pub mod error;
pub mod model;
pub mod output;

pub use error::{Error, Result};
pub use model::{
    DockerPortMatch, ExtendedInfo, Forked, Health, Listener, Process, ProcessEntry, QueryResult,
    SocketInfo, Source, SourceType, Target, TargetKind,
};
pub use output::OutputFormat;
