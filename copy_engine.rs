//! Recursive copy of files and directory trees.
//!
//! [`copy`] walks `strategy.source()`: files are handed to the strategy,
//! directories are mirrored at the destination and their children are copied
//! concurrently, each with its own strategy from
//! [`CopyStrategy::clone_with`]. Siblings finish in no particular order; the
//! first failure is returned once the level's join gives up, and copies that
//! already completed are left in place.

use crate::error::Result;
use crate::exclude::Excludes;
use crate::file_ops::{self, FileKind};
use crate::strategy::CopyStrategy;
use futures::future::{try_join_all, BoxFuture, FutureExt};
use std::ops::AddAssign;
use std::path::{is_separator, Path};
use tracing::{debug, warn};

/// Totals for one copy call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyReport {
    /// Files copied
    pub files: u64,
    /// Bytes read from copied files
    pub bytes: u64,
    /// Paths pruned by the exclusion list
    pub excluded: u64,
    /// Entries that are neither files nor directories (e.g. symlinks)
    pub skipped: u64,
}

impl AddAssign for CopyReport {
    fn add_assign(&mut self, other: Self) {
        self.files += other.files;
        self.bytes += other.bytes;
        self.excluded += other.excluded;
        self.skipped += other.skipped;
    }
}

fn has_trailing_separator(path: &Path) -> bool {
    path.as_os_str()
        .to_string_lossy()
        .chars()
        .last()
        .is_some_and(is_separator)
}

/// Copy a file or a directory tree according to `strategy`, skipping every
/// path (full path or bare entry name) matched by `excludes`.
pub fn copy(strategy: CopyStrategy, excludes: &Excludes) -> BoxFuture<'_, Result<CopyReport>> {
    async move {
        let from = strategy.source().to_path_buf();
        let to = strategy.destination().to_path_buf();

        if let Some(rule) = excludes.find(&from.to_string_lossy()) {
            debug!(path = %from.display(), rule = %rule, "excluded");
            return Ok(CopyReport {
                excluded: 1,
                ..Default::default()
            });
        }

        match file_ops::lstat(&from).await? {
            FileKind::File => {
                let mut strategy = strategy;
                let bytes = strategy.copy().await?;
                Ok(CopyReport {
                    files: 1,
                    bytes,
                    ..Default::default()
                })
            }
            FileKind::Directory => {
                if !file_ops::exists(&to).await {
                    file_ops::mkdir(&to, true).await?;
                }

                if has_trailing_separator(&to) {
                    if let Some(name) = from.file_name() {
                        return copy(strategy.clone_with(&from, to.join(name)), excludes).await;
                    }
                }

                let mut report = CopyReport::default();
                let mut children = Vec::new();
                for name in file_ops::read_dir(&from).await? {
                    if let Some(rule) = excludes.find(&name) {
                        debug!(path = %from.join(&name).display(), rule = %rule, "excluded");
                        report.excluded += 1;
                        continue;
                    }
                    let child = strategy.clone_with(from.join(&name), to.join(&name));
                    children.push(copy(child, excludes));
                }

                debug!(dir = %from.display(), children = children.len(), "copying directory");
                for child in try_join_all(children).await? {
                    report += child;
                }
                Ok(report)
            }
            FileKind::Other => {
                warn!(path = %from.display(), "not a regular file or directory, skipping");
                Ok(CopyReport {
                    skipped: 1,
                    ..Default::default()
                })
            }
        }
    }
    .boxed()
}
