//! Fuzz target resolution
//!
//! A target is a directory under the fuzz root. Where its crash corpus and
//! binary live depends on how the campaign was laid out, so both lookups are
//! ordered lists of named conventions taken from configuration.

use crate::config::FuzzConfig;
use crate::error::{self, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;
use wildmatch::WildMatch;

/// Where a target keeps its crash inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CorpusLayout {
    /// `<target>/<output_dir>/<instance>/crashes`
    Campaign,
    /// `<target>/crashes`
    Flat,
}

impl CorpusLayout {
    pub fn crash_dir(self, workspace_root: &Path, config: &FuzzConfig) -> PathBuf {
        match self {
            CorpusLayout::Campaign => workspace_root
                .join(&config.output_dir)
                .join(&config.instance)
                .join("crashes"),
            CorpusLayout::Flat => workspace_root.join("crashes"),
        }
    }
}

/// How to find the program a crash is replayed against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BinaryStrategy {
    /// `<target>/target/<basename of target name>`
    ExpectedPath,
    /// First executable regular file in a sorted walk of the campaign directory
    SearchCampaign,
}

/// Shell-style name patterns (`*`, `?`) for files that are not programs or crash inputs
#[derive(Debug, Clone, Default)]
pub struct NamePatterns {
    patterns: Vec<WildMatch>,
}

impl NamePatterns {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        Self {
            patterns: patterns.iter().map(|p| WildMatch::new(p.as_ref())).collect(),
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(name))
    }
}

/// A fuzz target resolved for one triage run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FuzzTarget {
    pub name: String,
    pub workspace_root: PathBuf,
    pub campaign_dir: PathBuf,
    pub resolved_binary: Option<PathBuf>,
    pub crash_corpus_dir: Option<PathBuf>,
}

impl FuzzTarget {
    /// Compute a target's directories without probing the filesystem.
    ///
    /// `name` must be a relative path with no `..` components. A relative fuzz
    /// root is resolved against the current directory so that replays started
    /// from a workspace still find the binary.
    pub fn locate(name: &str, config: &FuzzConfig) -> Result<Self> {
        let relative = Path::new(name);
        let well_formed = !name.trim().is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !well_formed {
            return Err(error::invalid_target_name(name).with_operation("target::locate"));
        }

        let root = if config.root.is_absolute() {
            config.root.clone()
        } else {
            std::env::current_dir()
                .map_err(|e| error::io_at(&config.root, e).with_operation("target::locate"))?
                .join(&config.root)
        };
        let workspace_root = root.join(relative);
        Ok(Self {
            name: name.to_string(),
            campaign_dir: workspace_root.join(&config.output_dir),
            workspace_root,
            resolved_binary: None,
            crash_corpus_dir: None,
        })
    }

    /// Locate the target and resolve its crash corpus and binary
    pub fn resolve(name: &str, config: &FuzzConfig) -> Result<Self> {
        let mut target = Self::locate(name, config)?;
        let patterns = NamePatterns::new(&config.non_binary_patterns);

        target.crash_corpus_dir = config
            .corpus_layouts
            .iter()
            .map(|layout| layout.crash_dir(&target.workspace_root, config))
            .find(|dir| dir.is_dir());

        target.resolved_binary = match target.find_binary(&config.binary_strategies, &patterns) {
            Ok(binary) => Some(binary),
            Err(err) => {
                tracing::debug!(target = %target.name, error = %err, "binary not resolved");
                None
            }
        };

        tracing::info!(
            target = %target.name,
            corpus = ?target.crash_corpus_dir,
            binary = ?target.resolved_binary,
            "resolved fuzz target"
        );
        Ok(target)
    }

    /// Basename used by the expected-path convention
    pub fn basename(&self) -> &str {
        Path::new(&self.name)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.name)
    }

    fn find_binary(&self, strategies: &[BinaryStrategy], patterns: &NamePatterns) -> Result<PathBuf> {
        strategies
            .iter()
            .find_map(|strategy| match strategy {
                BinaryStrategy::ExpectedPath => {
                    let path = self.workspace_root.join("target").join(self.basename());
                    path.is_file().then_some(path)
                }
                BinaryStrategy::SearchCampaign => search_campaign(&self.campaign_dir, patterns),
            })
            .ok_or_else(|| Error::target_not_found(self.name.clone()).with_operation("target::find_binary"))
    }
}

fn search_campaign(campaign_dir: &Path, patterns: &NamePatterns) -> Option<PathBuf> {
    if !campaign_dir.is_dir() {
        return None;
    }
    WalkDir::new(campaign_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| !entry.file_name().to_str().is_some_and(|name| patterns.matches(name)))
        .find(|entry| is_executable(entry.path()))
        .map(|entry| entry.into_path())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    true
}

/// Regular files of a crash directory, sorted by name, minus `ignore` matches
pub fn list_corpus(dir: &Path, ignore: &NamePatterns) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| error::io_at(dir, e).with_operation("target::list_corpus"))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|entry| !entry.file_name().to_str().is_some_and(|name| ignore.matches(name)))
        .map(|entry| entry.path())
        .collect();
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}
