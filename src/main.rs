use anyhow::{Context, Result, anyhow};
use log::{LevelFilter, debug, info};
use simplelog::{ColorChoice, Config as LogConfig, TermLogger, TerminalMode, WriteLogger};
use sockowner::cli::build_cli;
use sockowner::config::Config;
use sockowner::{InodeCache, ProcessHandle};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

fn main() -> Result<ExitCode> {
    let matches = build_cli().get_matches();

    let mut config = Config::load(matches.get_one::<String>("config").map(Path::new))?;

    // Command line flags override the configuration file
    if let Some(root) = matches.get_one::<String>("proc-root") {
        config.proc_root = PathBuf::from(root);
    }
    if let Some(level) = matches.get_one::<String>("log-level") {
        let level = level
            .parse::<LevelFilter>()
            .map_err(|_| anyhow!("Invalid log level: {}", level))?;
        config.log_level = Some(level);
    }
    if let Some(file) = matches.get_one::<String>("log-file") {
        config.log_file = Some(PathBuf::from(file));
    }

    // Set up logging only if a log level was provided
    if let Some(level) = config.log_level {
        setup_logging(level, &config)?;
    }

    if let Some(path) = &config.config_path {
        info!("Loaded configuration from {}", path.display());
    }

    let cache = InodeCache::open(config.proc_root.clone())?;

    let all_found = if matches.get_flag("all") {
        list_all(&cache);
        true
    } else {
        let inodes: Vec<u64> = matches
            .get_many::<u64>("inode")
            .map(|values| values.copied().collect())
            .unwrap_or_default();
        resolve_inodes(&cache, &inodes)
    };

    let stats = cache.stats();
    debug!(
        "Finished: {} lookups, {} hits, {} rebuilds",
        stats.lookups, stats.hits, stats.rebuilds
    );

    Ok(if all_found {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Print one line per inode, returning whether every inode was found
fn resolve_inodes(cache: &InodeCache, inodes: &[u64]) -> bool {
    let mut all_found = true;

    for &inode in inodes {
        match cache.lookup(inode) {
            Some(handle) => println!("{}", describe(inode, &handle)),
            None => {
                all_found = false;
                println!("{}\tnot found", inode);
            }
        }
    }

    all_found
}

/// Print the owner of every socket in a fresh snapshot
fn list_all(cache: &InodeCache) {
    cache.refresh();
    let snapshot = cache.snapshot();
    info!(
        "Snapshot holds {} sockets across {} processes",
        snapshot.len(),
        snapshot.process_count()
    );

    let mut entries: Vec<_> = snapshot.iter().collect();
    entries.sort_by_key(|(inode, _)| **inode);

    for (inode, handle) in entries {
        if handle.materialize(cache.proc_fs(), cache.diagnostics()) {
            println!("{}", describe(*inode, handle));
        } else {
            println!("{}\t{}", inode, handle.pid());
        }
    }
}

fn describe(inode: u64, handle: &ProcessHandle) -> String {
    match handle.details() {
        Some(details) => format!(
            "{}\t{}\t{}\t{}\t{}",
            inode,
            handle.pid(),
            details.uid,
            details.exe_path.display(),
            details.cmdline.trim_end()
        ),
        None => format!("{}\t{}", inode, handle.pid()),
    }
}

fn setup_logging(level: LevelFilter, config: &Config) -> Result<()> {
    let log_file_path = match (&config.log_file, &config.log_dir) {
        (Some(file), _) => Some(file.clone()),
        (None, Some(dir)) => {
            // Create logs directory if it doesn't exist
            if !dir.exists() {
                fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
            }

            // Create timestamped log file name
            let timestamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
            Some(dir.join(format!("sockowner_{}.log", timestamp)))
        }
        (None, None) => None,
    };

    match log_file_path {
        Some(path) => {
            let file = File::create(&path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            WriteLogger::init(level, LogConfig::default(), file)?;
        }
        None => {
            TermLogger::init(
                level,
                LogConfig::default(),
                TerminalMode::Stderr,
                ColorChoice::Auto,
            )?;
        }
    }

    Ok(())
}
