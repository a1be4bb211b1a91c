// process/enumerator.rs - Full scan of the process table for socket inodes

use super::ProcessHandle;
use super::procfs::ProcFs;
use crate::diagnostics::Diagnostics;
use std::collections::{HashMap, HashSet, hash_map};
use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::sync::Arc;

const SOCKET_PREFIX: &str = "socket:[";
const SOCKET_SUFFIX: &str = "]";

/// Immutable socket inode -> process mapping produced by one scan
#[derive(Debug, Default)]
pub struct InodeSnapshot {
    inodes: HashMap<u64, Arc<ProcessHandle>>,
}

impl InodeSnapshot {
    pub fn get(&self, inode: u64) -> Option<&Arc<ProcessHandle>> {
        self.inodes.get(&inode)
    }

    pub fn contains(&self, inode: u64) -> bool {
        self.inodes.contains_key(&inode)
    }

    /// Number of socket inodes
    pub fn len(&self) -> usize {
        self.inodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inodes.is_empty()
    }

    /// Number of distinct processes owning at least one socket
    pub fn process_count(&self) -> usize {
        self.inodes
            .values()
            .map(|h| h.pid())
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn iter(&self) -> hash_map::Iter<'_, u64, Arc<ProcessHandle>> {
        self.inodes.iter()
    }
}

impl<'a> IntoIterator for &'a InodeSnapshot {
    type Item = (&'a u64, &'a Arc<ProcessHandle>);
    type IntoIter = hash_map::Iter<'a, u64, Arc<ProcessHandle>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Scan every live process under `fs.root()` and map its socket inodes
///
/// Never fails: unreadable entries are reported to `diagnostics` and skipped.
/// If two processes hold the same socket, the one scanned last wins.
pub fn build_snapshot(fs: &dyn ProcFs, diagnostics: &dyn Diagnostics) -> InodeSnapshot {
    let mut inodes = HashMap::new();
    let root = fs.root();

    for name in read_dir_names(fs, root, diagnostics) {
        let Some(pid) = live_pid(fs, root, &name) else {
            continue;
        };

        let handle = Arc::new(ProcessHandle::new(pid));
        for inode in socket_inodes(fs, root, pid, diagnostics) {
            inodes.insert(inode, Arc::clone(&handle));
        }
    }

    log::debug!(
        "Built inode snapshot from {}: {} socket inodes",
        root.display(),
        inodes.len()
    );

    InodeSnapshot { inodes }
}

/// Parse a process directory name and probe that its descriptor table exists
fn live_pid(fs: &dyn ProcFs, root: &Path, name: &OsString) -> Option<u32> {
    let pid = name.to_str()?.parse::<u32>().ok()?;
    if pid == 0 {
        return None;
    }

    match fs.is_dir(&root.join(pid.to_string()).join("fd")) {
        Ok(true) => Some(pid),
        _ => None,
    }
}

fn socket_inodes(
    fs: &dyn ProcFs,
    root: &Path,
    pid: u32,
    diagnostics: &dyn Diagnostics,
) -> Vec<u64> {
    let fd_dir = root.join(pid.to_string()).join("fd");
    let mut inodes = Vec::new();

    for fd in read_dir_names(fs, &fd_dir, diagnostics) {
        let fd_path = fd_dir.join(&fd);
        let link = match fs.read_link(&fd_path) {
            Ok(link) => link,
            // The descriptor was closed between listing and resolution
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => {
                diagnostics.warn(&format!(
                    "Error reading link {}: {}",
                    fd_path.display(),
                    e
                ));
                continue;
            }
        };

        let Some(target) = link.to_str() else {
            continue;
        };
        match extract_socket_inode(target) {
            Some(Ok(inode)) => inodes.push(inode),
            Some(Err(e)) => diagnostics.warn(&format!(
                "Error parsing inode value from {} ({}): {}",
                target,
                fd_path.display(),
                e
            )),
            None => {}
        }
    }

    inodes
}

/// Directory listing that treats a vanished or unreadable directory as empty
fn read_dir_names(fs: &dyn ProcFs, dir: &Path, diagnostics: &dyn Diagnostics) -> Vec<OsString> {
    match fs.read_dir_names(dir) {
        Ok(names) => names,
        Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
        Err(e) => {
            diagnostics.warn(&format!("Error reading directory {}: {}", dir.display(), e));
            Vec::new()
        }
    }
}

/// Extract the inode from a descriptor link target of the form `socket:[<digits>]`
///
/// Returns `None` for anything that is not a socket link and `Some(Err(_))`
/// when the brackets hold something other than an unsigned 64-bit number.
pub fn extract_socket_inode(link: &str) -> Option<Result<u64, std::num::ParseIntError>> {
    let digits = link.strip_prefix(SOCKET_PREFIX)?.strip_suffix(SOCKET_SUFFIX)?;
    Some(digits.parse::<u64>())
}
