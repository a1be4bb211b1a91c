// process/cache.rs - Socket inode cache with rebuild-on-miss

use super::enumerator::{InodeSnapshot, build_snapshot};
use super::procfs::{HostProcFs, ProcFs};
use super::ProcessHandle;
use crate::diagnostics::{Diagnostics, LogDiagnostics};
use anyhow::{Context, Result, bail};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

/// Lookup counters since the cache was created
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Calls to `lookup`
    pub lookups: u64,
    /// Lookups answered from the existing snapshot
    pub hits: u64,
    /// Snapshots built, including explicit refreshes
    pub rebuilds: u64,
}

struct CacheState {
    snapshot: Arc<InodeSnapshot>,
    stats: CacheStats,
}

/// Resolves socket inodes to owning processes
///
/// Every lookup holds one exclusive lock for its whole
/// attempt-rebuild-retry sequence, so concurrent callers queue behind a
/// running rebuild instead of starting their own.
pub struct InodeCache {
    fs: Arc<dyn ProcFs>,
    diagnostics: Arc<dyn Diagnostics>,
    state: Mutex<CacheState>,
}

impl InodeCache {
    /// Cache over the host `/proc`, reporting through the `log` facade
    pub fn new() -> Self {
        Self::with_parts(Arc::new(HostProcFs::default()), Arc::new(LogDiagnostics))
    }

    /// Cache over the host process table rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let metadata = std::fs::metadata(&root)
            .with_context(|| format!("Cannot access process table at {}", root.display()))?;
        if !metadata.is_dir() {
            bail!("Process table root {} is not a directory", root.display());
        }

        log::info!("Using process table at {}", root.display());
        Ok(Self::with_parts(
            Arc::new(HostProcFs::new(root)),
            Arc::new(LogDiagnostics),
        ))
    }

    /// Cache over any process table and diagnostic sink
    ///
    /// Starts with an empty snapshot, so the first lookup always scans.
    pub fn with_parts(fs: Arc<dyn ProcFs>, diagnostics: Arc<dyn Diagnostics>) -> Self {
        Self {
            fs,
            diagnostics,
            state: Mutex::new(CacheState {
                snapshot: Arc::new(InodeSnapshot::default()),
                stats: CacheStats::default(),
            }),
        }
    }

    /// Find the process holding socket `inode`
    ///
    /// Tries the current snapshot first. If the inode is missing, or its
    /// process can no longer be loaded, rescans once and tries again.
    /// `None` is a normal outcome: the socket may be kernel-internal, closed,
    /// or owned by a process this user cannot inspect.
    pub fn lookup(&self, inode: u64) -> Option<Arc<ProcessHandle>> {
        let mut state = self.lock();
        state.stats.lookups += 1;

        if let Some(handle) = self.resolve(&state.snapshot, inode) {
            state.stats.hits += 1;
            return Some(handle);
        }

        log::debug!("Inode {} not resolvable from snapshot, rebuilding", inode);
        self.rebuild(&mut state);
        self.resolve(&state.snapshot, inode)
    }

    /// Replace the snapshot with a fresh scan
    pub fn refresh(&self) {
        let mut state = self.lock();
        self.rebuild(&mut state);
    }

    /// The snapshot currently in use
    pub fn snapshot(&self) -> Arc<InodeSnapshot> {
        Arc::clone(&self.lock().snapshot)
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    /// The process table this cache scans
    pub fn proc_fs(&self) -> &dyn ProcFs {
        self.fs.as_ref()
    }

    /// The sink receiving this cache's diagnostics
    pub fn diagnostics(&self) -> &dyn Diagnostics {
        self.diagnostics.as_ref()
    }

    fn resolve(&self, snapshot: &InodeSnapshot, inode: u64) -> Option<Arc<ProcessHandle>> {
        let handle = snapshot.get(inode)?;
        if handle.materialize(self.fs.as_ref(), self.diagnostics.as_ref()) {
            Some(Arc::clone(handle))
        } else {
            None
        }
    }

    fn rebuild(&self, state: &mut CacheState) {
        let snapshot = build_snapshot(self.fs.as_ref(), self.diagnostics.as_ref());
        state.snapshot = Arc::new(snapshot);
        state.stats.rebuilds += 1;
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        // A panic mid-lookup leaves either the old or the new snapshot in place
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for InodeCache {
    fn default() -> Self {
        Self::new()
    }
}
