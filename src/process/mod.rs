// process/mod.rs - Socket inode to process resolution
//
// - procfs.rs: filesystem seam (host and in-memory process tables)
// - enumerator.rs: full scan producing an InodeSnapshot
// - cache.rs: InodeCache with the attempt-then-rebuild-once lookup policy

mod cache;
mod enumerator;
pub mod procfs;

pub use cache::{CacheStats, InodeCache};
pub use enumerator::{InodeSnapshot, build_snapshot, extract_socket_inode};
pub use procfs::{HostProcFs, MemoryProcFs, ProcFs};

use crate::diagnostics::Diagnostics;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Descriptive fields of a process, loaded together on first use
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessDetails {
    /// Effective user id (owner of the process directory)
    pub uid: u32,
    /// Resolved target of the executable link
    pub exe_path: PathBuf,
    /// Argument vector with NUL separators replaced by spaces
    pub cmdline: String,
}

/// One operating-system process seen during a scan
///
/// A handle only knows its pid until [`ProcessHandle::materialize`] succeeds.
/// After that the details never change for the life of the handle. The pid is
/// not re-verified either: if the kernel recycles the pid while a loaded
/// handle is still cached, lookups keep returning the old details until a
/// rebuild drops the handle.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: u32,
    details: OnceLock<ProcessDetails>,
}

impl ProcessHandle {
    pub fn new(pid: u32) -> Self {
        Self {
            pid,
            details: OnceLock::new(),
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Details, if they were loaded
    pub fn details(&self) -> Option<&ProcessDetails> {
        self.details.get()
    }

    pub fn is_loaded(&self) -> bool {
        self.details.get().is_some()
    }

    pub fn uid(&self) -> Option<u32> {
        self.details().map(|d| d.uid)
    }

    pub fn exe_path(&self) -> Option<&Path> {
        self.details().map(|d| d.exe_path.as_path())
    }

    pub fn cmdline(&self) -> Option<&str> {
        self.details().map(|d| d.cmdline.as_str())
    }

    /// Load the details from `fs` unless they are already loaded
    ///
    /// Returns false when any of the executable link, the command line or the
    /// directory owner cannot be read; the handle then stays unloaded.
    pub fn materialize(&self, fs: &dyn ProcFs, diagnostics: &dyn Diagnostics) -> bool {
        if self.is_loaded() {
            return true;
        }

        match load_details(fs, self.pid) {
            Ok(details) => {
                // The cache serializes callers, so nobody else can have set it
                let _ = self.details.set(details);
                true
            }
            Err(e) => {
                let message = format!("Could not load details for pid {}: {}", self.pid, e);
                if e.kind() == io::ErrorKind::NotFound {
                    diagnostics.debug(&message);
                } else {
                    diagnostics.warn(&message);
                }
                false
            }
        }
    }
}

fn load_details(fs: &dyn ProcFs, pid: u32) -> io::Result<ProcessDetails> {
    let dir = fs.root().join(pid.to_string());

    let exe_path = fs.read_link(&dir.join("exe"))?;
    let cmdline = printable_cmdline(fs.read(&dir.join("cmdline"))?);
    let uid = fs.owner_uid(&dir)?;

    Ok(ProcessDetails {
        uid,
        exe_path,
        cmdline,
    })
}

/// Join a raw argument vector into one line by turning every NUL into a space
fn printable_cmdline(mut raw: Vec<u8>) -> String {
    for byte in raw.iter_mut() {
        if *byte == 0 {
            *byte = b' ';
        }
    }
    String::from_utf8_lossy(&raw).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RecordingDiagnostics;
    use log::Level;

    #[test]
    fn test_printable_cmdline_replaces_every_nul() {
        assert_eq!(printable_cmdline(b"nc\0-l\080\0".to_vec()), "nc -l 80 ");
        assert_eq!(printable_cmdline(b"a\0\0b".to_vec()), "a  b");
        assert_eq!(printable_cmdline(Vec::new()), "");
    }

    #[test]
    fn test_materialize_loads_all_fields() {
        let fs = MemoryProcFs::default();
        fs.add_process(100, 1000, "/usr/bin/nc", b"nc\0-l\08080\0");
        let diag = RecordingDiagnostics::new();

        let handle = ProcessHandle::new(100);
        assert!(!handle.is_loaded());
        assert!(handle.materialize(&fs, &diag));

        let details = handle.details().unwrap();
        assert_eq!(details.uid, 1000);
        assert_eq!(details.exe_path, PathBuf::from("/usr/bin/nc"));
        assert_eq!(details.cmdline, "nc -l 8080 ");
        assert!(diag.records().is_empty());
    }

    #[test]
    fn test_materialize_is_memoized() {
        let fs = MemoryProcFs::default();
        fs.add_process(5, 0, "/bin/sleep", b"sleep\0100\0");
        let diag = RecordingDiagnostics::new();

        let handle = ProcessHandle::new(5);
        assert!(handle.materialize(&fs, &diag));
        let after_first = fs.accesses();

        // Even once the process is gone, loaded details stay
        fs.remove_process(5);
        assert!(handle.materialize(&fs, &diag));
        assert!(handle.materialize(&fs, &diag));
        assert_eq!(fs.accesses(), after_first);
        assert_eq!(handle.cmdline(), Some("sleep 100 "));
    }

    #[test]
    fn test_materialize_fails_for_exited_process() {
        let fs = MemoryProcFs::default();
        let diag = RecordingDiagnostics::new();

        let handle = ProcessHandle::new(4242);
        assert!(!handle.materialize(&fs, &diag));
        assert!(!handle.is_loaded());
        assert_eq!(handle.uid(), None);

        // Exited processes are expected, so nothing at warning level
        assert!(diag.messages_at(Level::Warn).is_empty());
        assert_eq!(diag.messages_at(Level::Debug).len(), 1);
    }

    #[test]
    fn test_materialize_warns_on_unexpected_failure() {
        let fs = MemoryProcFs::default();
        fs.add_process(12, 0, "/usr/sbin/sshd", b"sshd\0");
        fs.fail_with("/proc/12/cmdline", io::ErrorKind::PermissionDenied);
        let diag = RecordingDiagnostics::new();

        let handle = ProcessHandle::new(12);
        assert!(!handle.materialize(&fs, &diag));
        assert!(!handle.is_loaded());

        let warnings = diag.messages_at(Level::Warn);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("pid 12"));
    }

    #[test]
    fn test_materialize_retries_after_failure() {
        let fs = MemoryProcFs::default();
        let diag = RecordingDiagnostics::new();
        let handle = ProcessHandle::new(77);
        assert!(!handle.materialize(&fs, &diag));

        fs.add_process(77, 33, "/usr/bin/python3", b"python3\0app.py\0");
        assert!(handle.materialize(&fs, &diag));
        assert_eq!(handle.uid(), Some(33));
    }
}
