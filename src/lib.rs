//! sockowner library
//!
//! Resolves kernel socket inodes to the processes holding them by scanning
//! the descriptor tables under `/proc`, with a cache that only rescans when a
//! lookup cannot be answered from the last scan.

pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod process;

pub use diagnostics::{Diagnostics, LogDiagnostics};
pub use process::{InodeCache, InodeSnapshot, ProcessDetails, ProcessHandle};
