//! Locating the R interpreter.
//!
//! The search is an ordered chain of strategies: `PATH` lookup first, then a
//! fixed list of known install paths, then a scan of the install root for
//! versioned directories. The first candidate that exists on disk wins.

use crate::config::BackendConfig;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One way of producing candidate executable paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// Resolve a bare executable name through `PATH`.
    SearchPath(String),
    /// Probe fixed paths in order.
    FixedPaths(Vec<PathBuf>),
    /// List `root`, and for each subdirectory whose name starts with
    /// `prefix`, check `<subdir>/<relative>`. Directory-listing order.
    InstallScan {
        root: PathBuf,
        prefix: String,
        relative: PathBuf,
    },
}

impl Strategy {
    /// Candidate paths produced by this strategy, in priority order.
    pub fn candidates(&self) -> Vec<PathBuf> {
        match self {
            Strategy::SearchPath(name) => which::which(name).into_iter().collect(),
            Strategy::FixedPaths(paths) => paths.clone(),
            Strategy::InstallScan {
                root,
                prefix,
                relative,
            } => scan_install_root(root, prefix, relative),
        }
    }
}

fn scan_install_root(root: &Path, prefix: &str, relative: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Cannot list {}: {}", root.display(), e);
            return Vec::new();
        }
    };

    entries
        .flatten()
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(prefix))
        .map(|entry| entry.path().join(relative))
        .collect()
}

/// Finds the backend interpreter by trying strategies in order.
#[derive(Debug, Clone)]
pub struct ExecutableLocator {
    strategies: Vec<Strategy>,
}

impl ExecutableLocator {
    pub fn new(strategies: Vec<Strategy>) -> Self {
        Self { strategies }
    }

    /// The standard chain built from backend settings.
    pub fn from_config(config: &BackendConfig) -> Self {
        Self::new(vec![
            Strategy::SearchPath(config.executable.clone()),
            Strategy::FixedPaths(config.candidate_paths.iter().map(PathBuf::from).collect()),
            Strategy::InstallScan {
                root: PathBuf::from(&config.install_root),
                prefix: config.install_prefix.clone(),
                relative: config.relative_executable_path(),
            },
        ])
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    /// First existing candidate, or `None` if every strategy comes up empty.
    pub fn locate(&self) -> Option<PathBuf> {
        for strategy in &self.strategies {
            for candidate in strategy.candidates() {
                if candidate.exists() {
                    debug!("Found interpreter via {:?}: {}", strategy, candidate.display());
                    return Some(candidate);
                }
                debug!("Candidate missing: {}", candidate.display());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    fn relative() -> PathBuf {
        ["bin", "x64", "Rscript.exe"].iter().collect()
    }

    const MISSING_NAME: &str = "rbridge-no-such-interpreter-3f9a";

    #[test]
    fn test_nothing_found_returns_none() {
        let dir = TempDir::new().unwrap();
        let locator = ExecutableLocator::new(vec![
            Strategy::SearchPath(MISSING_NAME.to_string()),
            Strategy::FixedPaths(vec![dir.path().join("missing.exe")]),
            Strategy::InstallScan {
                root: dir.path().join("no-root"),
                prefix: "R-".to_string(),
                relative: relative(),
            },
        ]);
        assert_eq!(locator.locate(), None);
    }

    #[test]
    fn test_fixed_paths_first_existing_wins() {
        let dir = TempDir::new().unwrap();
        let second = dir.path().join("R-4.4.0").join("Rscript.exe");
        let third = dir.path().join("R-4.3.3").join("Rscript.exe");
        touch(&second);
        touch(&third);

        let locator = ExecutableLocator::new(vec![Strategy::FixedPaths(vec![
            dir.path().join("R-4.4.1").join("Rscript.exe"),
            second.clone(),
            third,
        ])]);
        assert_eq!(locator.locate(), Some(second));
    }

    #[test]
    fn test_install_scan_respects_prefix_and_relative_path() {
        let root = TempDir::new().unwrap();
        // Wrong prefix, has the executable.
        touch(&root.path().join("Rtools").join(relative()));
        // Right prefix, missing the executable.
        fs::create_dir_all(root.path().join("R-4.1.0").join("bin")).unwrap();
        // Right prefix, has the executable.
        let expected = root.path().join("R-4.6.0").join(relative());
        touch(&expected);
        // A plain file with the prefix is not a directory.
        touch(&root.path().join("R-notes.txt"));

        let strategy = Strategy::InstallScan {
            root: root.path().to_path_buf(),
            prefix: "R-".to_string(),
            relative: relative(),
        };
        let candidates = strategy.candidates();
        assert_eq!(candidates.len(), 2);
        assert!(!candidates.contains(&root.path().join("Rtools").join(relative())));

        let locator = ExecutableLocator::new(vec![strategy]);
        assert_eq!(locator.locate(), Some(expected));
    }

    #[test]
    fn test_earlier_strategy_takes_priority() {
        let dir = TempDir::new().unwrap();
        let fixed = dir.path().join("fixed").join("Rscript.exe");
        touch(&fixed);
        let scanned_root = dir.path().join("R");
        touch(&scanned_root.join("R-9.9.9").join(relative()));

        let locator = ExecutableLocator::new(vec![
            Strategy::SearchPath(MISSING_NAME.to_string()),
            Strategy::FixedPaths(vec![fixed.clone()]),
            Strategy::InstallScan {
                root: scanned_root,
                prefix: "R-".to_string(),
                relative: relative(),
            },
        ]);
        assert_eq!(locator.locate(), Some(fixed));
    }

    #[cfg(unix)]
    #[test]
    fn test_search_path_resolves_known_binary() {
        let candidates = Strategy::SearchPath("sh".to_string()).candidates();
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].is_absolute());
    }

    #[test]
    fn test_from_config_builds_standard_chain() {
        let locator = ExecutableLocator::from_config(&BackendConfig::default());
        let strategies = locator.strategies();
        assert_eq!(strategies.len(), 3);
        assert_eq!(strategies[0], Strategy::SearchPath("Rscript".to_string()));
        assert!(matches!(&strategies[1], Strategy::FixedPaths(p) if p.len() == 4));
        assert!(matches!(
            &strategies[2],
            Strategy::InstallScan { prefix, .. } if prefix == "R-"
        ));
    }
}
