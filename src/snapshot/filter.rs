//! Path-prefix allow/deny policy for snapshots.

use serde::{Deserialize, Serialize};

/// Path-prefix predicate over forward-slash relative paths.
///
/// A path is accepted when it is not inside a denied prefix and it is either
/// inside an allowed prefix or an ancestor directory of one (so the walk can
/// reach it). An empty allow list accepts everything not denied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathFilter {
    pub allow: Vec<String>,
    pub deny: Vec<String>,
}

fn normalize(path: &str) -> String {
    path.replace('\\', "/").trim_matches('/').to_string()
}

fn is_within(path: &str, prefix: &str) -> bool {
    path == prefix
        || (path.len() > prefix.len()
            && path.starts_with(prefix)
            && path.as_bytes()[prefix.len()] == b'/')
}

impl PathFilter {
    pub fn new(allow: Vec<String>, deny: Vec<String>) -> Self {
        PathFilter {
            allow: allow.iter().map(|p| normalize(p)).collect(),
            deny: deny.iter().map(|p| normalize(p)).collect(),
        }
    }

    /// Accept everything.
    pub fn all() -> Self {
        PathFilter::default()
    }

    pub fn accepts(&self, relative: &str) -> bool {
        let path = normalize(relative);
        if path.is_empty() {
            return true;
        }

        if self
            .deny
            .iter()
            .map(|d| normalize(d))
            .any(|deny| is_within(&path, &deny))
        {
            return false;
        }

        if self.allow.is_empty() {
            return true;
        }

        self.allow.iter().map(|a| normalize(a)).any(|allow| {
            is_within(&path, &allow) || is_within(&allow, &path)
        })
    }
}
