//! Version-control exclusion query using the `git2` crate.
//!
//! One status query per snapshot, never one per file.

use crate::error::SnapshotError;
use git2::{ErrorCode, Repository, StatusOptions};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// Which paths the snapshot leaves out based on version control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VcsExclusion {
    /// Copy everything the filter accepts
    None,
    /// Skip paths the repository ignores
    #[default]
    Ignored,
    /// Skip ignored and untracked paths
    IgnoredAndUntracked,
}

/// List ignored (and optionally untracked) paths below `root`.
///
/// Paths are relative to `root`, forward-slash separated, without trailing
/// slash. Directories are reported once, not recursed into. A `root` outside
/// any repository yields an empty set.
pub fn list_excluded(root: &Path, mode: VcsExclusion) -> Result<BTreeSet<String>, SnapshotError> {
    let mut excluded = BTreeSet::new();
    if mode == VcsExclusion::None {
        return Ok(excluded);
    }

    let repo = match Repository::discover(root) {
        Ok(repo) => repo,
        Err(e) if e.code() == ErrorCode::NotFound => {
            log::debug!("[Snapshot] {} is not inside a repository", root.display());
            return Ok(excluded);
        }
        Err(e) => return Err(SnapshotError::Git(e)),
    };

    let Some(workdir) = repo.workdir() else {
        return Ok(excluded);
    };
    let workdir = fs::canonicalize(workdir)?;
    let root = fs::canonicalize(root)?;
    let prefix = match root.strip_prefix(&workdir) {
        Ok(rel) => to_forward_slashes(rel),
        Err(_) => return Ok(excluded),
    };

    let mut opts = StatusOptions::new();
    opts.include_ignored(true)
        .include_untracked(mode == VcsExclusion::IgnoredAndUntracked)
        .recurse_ignored_dirs(false)
        .recurse_untracked_dirs(false)
        .exclude_submodules(true);

    let statuses = repo.statuses(Some(&mut opts))?;
    for entry in statuses.iter() {
        let status = entry.status();
        let wanted = status.is_ignored()
            || (mode == VcsExclusion::IgnoredAndUntracked && status.is_wt_new());
        if !wanted {
            continue;
        }
        let Some(path) = entry.path() else {
            continue;
        };

        let path = path.trim_end_matches('/');
        let relative = if prefix.is_empty() {
            Some(path)
        } else {
            path.strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
        };
        if let Some(relative) = relative.filter(|r| !r.is_empty()) {
            excluded.insert(relative.to_string());
        }
    }

    log::debug!(
        "[Snapshot] {} path(s) excluded by version control under {}",
        excluded.len(),
        root.display()
    );
    Ok(excluded)
}

pub(crate) fn to_forward_slashes(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
