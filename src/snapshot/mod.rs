//! Snapshot builder.
//!
//! Produces a filtered copy of a source tree. The version-control query runs
//! once, then the tree is walked depth-first in sorted order so two builds
//! of an unchanged tree yield identical snapshots.

pub mod filter;
pub mod git;

pub use filter::PathFilter;
pub use git::{list_excluded, VcsExclusion};

use crate::error::SnapshotError;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// A finished snapshot: destination root and every copied relative path in
/// walk order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub root: PathBuf,
    pub entries: Vec<String>,
}

impl Snapshot {
    pub fn file_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| self.root.join(e).is_file())
            .count()
    }
}

pub struct SnapshotBuilder {
    source: PathBuf,
    filter: PathFilter,
    vcs: VcsExclusion,
}

impl SnapshotBuilder {
    pub fn new(source: impl Into<PathBuf>, filter: PathFilter) -> Self {
        SnapshotBuilder {
            source: source.into(),
            filter,
            vcs: VcsExclusion::default(),
        }
    }

    pub fn vcs_exclusion(mut self, vcs: VcsExclusion) -> Self {
        self.vcs = vcs;
        self
    }

    /// Rebuild `dest` from scratch. Any previous content is deleted.
    pub fn build(&self, dest: &Path) -> Result<Snapshot, SnapshotError> {
        if !self.source.is_dir() {
            return Err(SnapshotError::SourceNotFound(self.source.clone()));
        }

        if dest.exists() {
            fs::remove_dir_all(dest)?;
        }
        fs::create_dir_all(dest)?;

        let excluded = list_excluded(&self.source, self.vcs)?;
        // The destination may live inside the source tree
        let dest_canonical = fs::canonicalize(dest)?;

        let mut walk = Walk {
            filter: &self.filter,
            excluded: &excluded,
            skip: &dest_canonical,
            entries: Vec::new(),
        };
        walk.copy_dir(&self.source, dest, "")?;

        log::info!(
            "[Snapshot] Copied {} entries from {} to {}",
            walk.entries.len(),
            self.source.display(),
            dest.display()
        );

        Ok(Snapshot {
            root: dest.to_path_buf(),
            entries: walk.entries,
        })
    }
}

struct Walk<'a> {
    filter: &'a PathFilter,
    excluded: &'a BTreeSet<String>,
    skip: &'a Path,
    entries: Vec<String>,
}

impl Walk<'_> {
    fn copy_dir(&mut self, src: &Path, dest: &Path, relative: &str) -> Result<(), SnapshotError> {
        let mut children: Vec<_> = fs::read_dir(src)?.collect::<Result<_, _>>()?;
        children.sort_by_key(|entry| entry.file_name());

        for child in children {
            let name = child.file_name().to_string_lossy().into_owned();
            let child_rel = if relative.is_empty() {
                name.clone()
            } else {
                format!("{}/{}", relative, name)
            };

            if name == ".git"
                || self.excluded.contains(&child_rel)
                || !self.filter.accepts(&child_rel)
            {
                continue;
            }

            let src_path = child.path();
            let dest_path = dest.join(&name);

            // Plain files and directories only, links are never followed
            let file_type = child.file_type()?;
            if file_type.is_dir() {
                if fs::canonicalize(&src_path)? == self.skip {
                    continue;
                }
                fs::create_dir_all(&dest_path)?;
                self.entries.push(child_rel.clone());
                self.copy_dir(&src_path, &dest_path, &child_rel)?;
            } else if file_type.is_file() {
                fs::copy(&src_path, &dest_path)?;
                self.entries.push(child_rel);
            } else {
                log::debug!("[Snapshot] Skipping {} (not a plain file)", child_rel);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_filter_applied() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src");
        write(&src, "src/koffi/index.js", "module.exports = {};");
        write(&src, "src/koffi/test/sync.js", "test");
        write(&src, "src/other/x.c", "x");

        let filter = PathFilter::new(vec!["src/koffi".to_string()], vec!["src/koffi/test".to_string()]);
        let snapshot = SnapshotBuilder::new(&src, filter)
            .vcs_exclusion(VcsExclusion::None)
            .build(&temp_dir.path().join("out"))
            .unwrap();

        assert_eq!(snapshot.entries, vec!["src", "src/koffi", "src/koffi/index.js"]);
        assert_eq!(snapshot.file_count(), 1);
        assert_eq!(
            fs::read_to_string(temp_dir.path().join("out/src/koffi/index.js")).unwrap(),
            "module.exports = {};"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src");
        write(&src, "src/koffi/index.js", "x");
        std::os::unix::fs::symlink(src.join("src/koffi/gone.js"), src.join("src/koffi/broken.js")).unwrap();

        let filter = PathFilter::new(vec!["src".to_string()], vec![]);
        let snapshot = SnapshotBuilder::new(&src, filter)
            .vcs_exclusion(VcsExclusion::None)
            .build(&temp_dir.path().join("out"))
            .unwrap();

        assert_eq!(snapshot.entries, vec!["src", "src/koffi", "src/koffi/index.js"]);
        assert!(!temp_dir.path().join("out/src/koffi/broken.js").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_cycle_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src");
        write(&src, "src/koffi/index.js", "x");
        std::os::unix::fs::symlink("..", src.join("src/koffi/parent")).unwrap();
        std::os::unix::fs::symlink(src.join("src/koffi/index.js"), src.join("src/koffi/alias.js")).unwrap();

        let filter = PathFilter::new(vec!["src".to_string()], vec![]);
        let snapshot = SnapshotBuilder::new(&src, filter)
            .vcs_exclusion(VcsExclusion::None)
            .build(&temp_dir.path().join("out"))
            .unwrap();

        assert_eq!(snapshot.file_count(), 1);
        let out = temp_dir.path().join("out/src/koffi");
        assert!(out.join("index.js").is_file());
        assert!(fs::symlink_metadata(out.join("parent")).is_err());
        assert!(fs::symlink_metadata(out.join("alias.js")).is_err());
    }

    #[test]
    fn test_previous_content_removed() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src");
        let out = temp_dir.path().join("out");
        write(&src, "a.txt", "a");
        write(&out, "stale.txt", "stale");

        SnapshotBuilder::new(&src, PathFilter::all())
            .vcs_exclusion(VcsExclusion::None)
            .build(&out)
            .unwrap();
        assert!(out.join("a.txt").exists());
        assert!(!out.join("stale.txt").exists());
    }

    #[test]
    fn test_destination_inside_source_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().to_path_buf();
        write(&src, "a.txt", "a");
        let out = src.join("build/snapshot");

        let snapshot = SnapshotBuilder::new(&src, PathFilter::all())
            .vcs_exclusion(VcsExclusion::None)
            .build(&out)
            .unwrap();
        assert!(snapshot.entries.contains(&"a.txt".to_string()));
        assert!(!snapshot.entries.iter().any(|e| e.starts_with("build/snapshot")));
    }

    #[test]
    fn test_missing_source() {
        let temp_dir = TempDir::new().unwrap();
        let result = SnapshotBuilder::new(temp_dir.path().join("nope"), PathFilter::all())
            .build(&temp_dir.path().join("out"));
        assert!(matches!(result, Err(SnapshotError::SourceNotFound(_))));
    }
}
