//! # Workspace
//!
//! A handle on the directory every command runs in. Requests never share a
//! working directory: each session gets its own subdirectory under the
//! configured root.

use crate::error::{self, Error, Result};
use std::path::{Path, PathBuf};

const SESSIONS_DIR: &str = "sessions";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Open (and create if needed) a workspace at `root`.
    ///
    /// Relative roots are resolved against the current directory once, here,
    /// so later changes to the process cwd do not move the workspace.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let root = if root.is_absolute() {
            root.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|e| error::io_at(root, e).with_operation("workspace::open"))?
                .join(root)
        };
        let workspace = Self { root };
        workspace.ensure()?;
        Ok(workspace)
    }

    /// Open a fresh session workspace with a random id
    pub fn new_session(root: impl AsRef<Path>) -> Result<Self> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        Self::open(root)?.session(&id)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Session id when this workspace is a session subdirectory
    pub fn session_id(&self) -> Option<&str> {
        let parent = self.root.parent()?;
        if parent.file_name()? != std::ffi::OsStr::new(SESSIONS_DIR) {
            return None;
        }
        self.root.file_name()?.to_str()
    }

    /// Create the root directory if absent. Safe to call repeatedly.
    pub fn ensure(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)
            .map_err(|e| error::io_at(&self.root, e).with_operation("workspace::ensure"))
    }

    /// Child workspace for one session
    pub fn session(&self, id: &str) -> Result<Self> {
        if id.is_empty() || id.contains(['/', '\\']) || id == "." || id == ".." {
            return Err(Error::invalid_argument(format!("invalid session id '{}'", id))
                .with_operation("workspace::session")
                .with_context("session", id));
        }
        let workspace = Self {
            root: self.sessions_dir().join(id),
        };
        workspace.ensure()?;
        Ok(workspace)
    }

    /// Ids of the sessions under this workspace, sorted
    pub fn list_sessions(&self) -> Result<Vec<String>> {
        let dir = self.sessions_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&dir)
            .map_err(|e| error::io_at(&dir, e).with_operation("workspace::list_sessions"))?;

        let mut ids: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|e| e.file_name().to_str().map(|s| s.to_string()))
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn sessions_dir(&self) -> PathBuf {
        self.root.join(SESSIONS_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_creates_root_idempotently() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("ws");

        let first = Workspace::open(&root).unwrap();
        let second = Workspace::open(&root).unwrap();

        assert!(root.is_dir());
        assert_eq!(first, second);
        second.ensure().unwrap();
    }

    #[test]
    fn test_sessions_are_isolated_subdirectories() {
        let tmp = tempfile::tempdir().unwrap();
        let base = Workspace::open(tmp.path()).unwrap();

        let a = base.session("alpha").unwrap();
        let b = base.session("beta").unwrap();

        assert_ne!(a.root(), b.root());
        assert!(a.root().starts_with(tmp.path()));
        assert_eq!(a.session_id(), Some("alpha"));
        assert_eq!(base.session_id(), None);
        assert_eq!(base.list_sessions().unwrap(), vec!["alpha".to_string(), "beta".to_string()]);
    }

    #[test]
    fn test_session_id_cannot_escape() {
        let tmp = tempfile::tempdir().unwrap();
        let base = Workspace::open(tmp.path()).unwrap();
        assert!(base.session("../elsewhere").is_err());
        assert!(base.session("..").is_err());
        assert!(base.session("").is_err());
    }

    #[test]
    fn test_new_session_has_random_id() {
        let tmp = tempfile::tempdir().unwrap();
        let a = Workspace::new_session(tmp.path()).unwrap();
        let b = Workspace::new_session(tmp.path()).unwrap();
        assert_ne!(a.session_id(), b.session_id());
    }
}
