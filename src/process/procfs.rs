// process/procfs.rs - Filesystem access for process-table scans
//
// Every read the enumerator and the detail loader perform goes through the
// ProcFs trait:
// - HostProcFs: the real pseudo-filesystem under a configurable root
// - MemoryProcFs: an in-memory process table that counts every access

use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Default location of the process table
pub const DEFAULT_PROC_ROOT: &str = "/proc";

/// Read-only view of a process-table pseudo-filesystem
pub trait ProcFs: Send + Sync {
    /// Directory holding one entry per process
    fn root(&self) -> &Path;

    /// Names of the entries of a directory
    fn read_dir_names(&self, path: &Path) -> io::Result<Vec<OsString>>;

    /// Whether `path` (following symlinks) is a directory
    fn is_dir(&self, path: &Path) -> io::Result<bool>;

    /// Target of a symbolic link
    fn read_link(&self, path: &Path) -> io::Result<PathBuf>;

    /// Full contents of a file
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Owning user id of a directory entry
    fn owner_uid(&self, path: &Path) -> io::Result<u32>;
}

/// Process table backed by the host filesystem
#[derive(Debug, Clone)]
pub struct HostProcFs {
    root: PathBuf,
}

impl HostProcFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for HostProcFs {
    fn default() -> Self {
        Self::new(DEFAULT_PROC_ROOT)
    }
}

impl ProcFs for HostProcFs {
    fn root(&self) -> &Path {
        &self.root
    }

    fn read_dir_names(&self, path: &Path) -> io::Result<Vec<OsString>> {
        // Entries that error while iterating have usually just vanished
        Ok(fs::read_dir(path)?
            .flatten()
            .map(|entry| entry.file_name())
            .collect())
    }

    fn is_dir(&self, path: &Path) -> io::Result<bool> {
        Ok(fs::metadata(path)?.is_dir())
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        fs::read_link(path)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    #[cfg(unix)]
    fn owner_uid(&self, path: &Path) -> io::Result<u32> {
        use std::os::unix::fs::MetadataExt;
        Ok(fs::metadata(path)?.uid())
    }

    #[cfg(not(unix))]
    fn owner_uid(&self, path: &Path) -> io::Result<u32> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("ownership of {} is not available on this platform", path.display()),
        ))
    }
}

#[derive(Debug, Clone)]
enum Node {
    Dir { uid: u32 },
    File { data: Vec<u8> },
    Link { target: PathBuf },
}

/// In-memory process table
///
/// Mutations take `&self`, so a table shared with an `InodeCache` through an
/// `Arc` can still gain and lose processes while the cache is in use. Every
/// `ProcFs` call bumps [`MemoryProcFs::accesses`], including failed ones.
#[derive(Debug)]
pub struct MemoryProcFs {
    root: PathBuf,
    nodes: Mutex<BTreeMap<PathBuf, Node>>,
    failures: Mutex<HashMap<PathBuf, io::ErrorKind>>,
    accesses: AtomicUsize,
}

impl Default for MemoryProcFs {
    fn default() -> Self {
        Self::new(DEFAULT_PROC_ROOT)
    }
}

impl MemoryProcFs {
    /// Create an empty table whose root directory exists
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let mut nodes = BTreeMap::new();
        nodes.insert(root.clone(), Node::Dir { uid: 0 });
        Self {
            root,
            nodes: Mutex::new(nodes),
            failures: Mutex::new(HashMap::new()),
            accesses: AtomicUsize::new(0),
        }
    }

    /// Number of `ProcFs` calls served so far
    pub fn accesses(&self) -> usize {
        self.accesses.load(Ordering::SeqCst)
    }

    /// Add a process with an empty descriptor table
    pub fn add_process(&self, pid: u32, uid: u32, exe: impl Into<PathBuf>, cmdline: &[u8]) {
        let dir = self.root.join(pid.to_string());
        self.insert(dir.clone(), Node::Dir { uid });
        self.insert(dir.join("fd"), Node::Dir { uid });
        self.insert(dir.join("exe"), Node::Link { target: exe.into() });
        self.insert(
            dir.join("cmdline"),
            Node::File {
                data: cmdline.to_vec(),
            },
        );
    }

    /// Add descriptor `fd` of `pid` pointing at any link target
    pub fn add_fd(&self, pid: u32, fd: u32, target: impl Into<PathBuf>) {
        let path = self.root.join(pid.to_string()).join("fd").join(fd.to_string());
        self.insert(path, Node::Link { target: target.into() });
    }

    /// Add descriptor `fd` of `pid` referencing the socket `inode`
    pub fn add_socket(&self, pid: u32, fd: u32, inode: u64) {
        self.add_fd(pid, fd, format!("socket:[{}]", inode));
    }

    /// Add a regular file anywhere in the table
    pub fn add_file(&self, path: impl Into<PathBuf>, data: &[u8]) {
        self.insert(
            path.into(),
            Node::File {
                data: data.to_vec(),
            },
        );
    }

    /// Add a directory anywhere in the table
    pub fn add_dir(&self, path: impl Into<PathBuf>, uid: u32) {
        self.insert(path.into(), Node::Dir { uid });
    }

    /// Remove a process directory and everything below it
    pub fn remove_process(&self, pid: u32) {
        self.remove(&self.root.join(pid.to_string()));
    }

    /// Remove `path` and everything below it
    pub fn remove(&self, path: &Path) {
        self.nodes().retain(|p, _| !p.starts_with(path));
    }

    /// Make every access to exactly `path` fail with `kind`
    pub fn fail_with(&self, path: impl Into<PathBuf>, kind: io::ErrorKind) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.into(), kind);
    }

    fn insert(&self, path: PathBuf, node: Node) {
        self.nodes().insert(path, node);
    }

    fn nodes(&self) -> std::sync::MutexGuard<'_, BTreeMap<PathBuf, Node>> {
        self.nodes.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Count the access, apply injected failures and fetch the node
    fn access(&self, path: &Path) -> io::Result<Node> {
        self.accesses.fetch_add(1, Ordering::SeqCst);

        if let Some(kind) = self
            .failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
        {
            return Err(io::Error::new(*kind, format!("{}: injected failure", path.display())));
        }

        self.nodes()
            .get(path)
            .cloned()
            .ok_or_else(|| not_found(path))
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{}: no such file or directory", path.display()),
    )
}

fn wrong_kind(path: &Path, expected: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("{}: not a {}", path.display(), expected),
    )
}

impl ProcFs for MemoryProcFs {
    fn root(&self) -> &Path {
        &self.root
    }

    fn read_dir_names(&self, path: &Path) -> io::Result<Vec<OsString>> {
        match self.access(path)? {
            Node::Dir { .. } => Ok(self
                .nodes()
                .keys()
                .filter(|p| p.parent() == Some(path))
                .filter_map(|p| p.file_name().map(|n| n.to_os_string()))
                .collect()),
            _ => Err(wrong_kind(path, "directory")),
        }
    }

    fn is_dir(&self, path: &Path) -> io::Result<bool> {
        Ok(matches!(self.access(path)?, Node::Dir { .. }))
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        match self.access(path)? {
            Node::Link { target } => Ok(target),
            _ => Err(wrong_kind(path, "symbolic link")),
        }
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        match self.access(path)? {
            Node::File { data } => Ok(data),
            _ => Err(wrong_kind(path, "regular file")),
        }
    }

    fn owner_uid(&self, path: &Path) -> io::Result<u32> {
        match self.access(path)? {
            Node::Dir { uid } => Ok(uid),
            // Only directories carry ownership in the in-memory table
            _ => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_lists_direct_children_only() {
        let fs = MemoryProcFs::default();
        fs.add_process(42, 1000, "/bin/true", b"true\0");
        fs.add_socket(42, 3, 777);
        fs.add_file("/proc/uptime", b"1.0 2.0\n");

        let mut root: Vec<_> = fs.read_dir_names(Path::new("/proc")).unwrap();
        root.sort();
        assert_eq!(root, vec![OsString::from("42"), OsString::from("uptime")]);

        let fds = fs.read_dir_names(Path::new("/proc/42/fd")).unwrap();
        assert_eq!(fds, vec![OsString::from("3")]);
        assert_eq!(
            fs.read_link(Path::new("/proc/42/fd/3")).unwrap(),
            PathBuf::from("socket:[777]")
        );
    }

    #[test]
    fn test_memory_counts_accesses_and_injects_failures() {
        let fs = MemoryProcFs::default();
        fs.add_process(7, 0, "/sbin/init", b"init\0");
        assert_eq!(fs.accesses(), 0);

        assert!(fs.is_dir(Path::new("/proc/7/fd")).unwrap());
        assert_eq!(fs.owner_uid(Path::new("/proc/7")).unwrap(), 0);
        assert_eq!(fs.accesses(), 2);

        fs.fail_with("/proc/7/cmdline", io::ErrorKind::PermissionDenied);
        let err = fs.read(Path::new("/proc/7/cmdline")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        assert_eq!(fs.accesses(), 3);
    }

    #[test]
    fn test_memory_remove_process() {
        let fs = MemoryProcFs::default();
        fs.add_process(9, 0, "/bin/sh", b"sh\0");
        fs.add_process(90, 0, "/bin/sh", b"sh\0");
        fs.remove_process(9);

        let err = fs.read_link(Path::new("/proc/9/exe")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        // Sibling with a shared name prefix survives
        assert!(fs.read_link(Path::new("/proc/90/exe")).is_ok());
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_host_reads_own_process() {
        let fs = HostProcFs::default();
        let own = fs.root().join("self");
        assert!(fs.is_dir(&own.join("fd")).unwrap());
        assert!(!fs.read(&own.join("cmdline")).unwrap().is_empty());
        assert!(fs.read_link(&own.join("exe")).is_ok());
        assert!(fs.owner_uid(&own).is_ok());
    }
}
