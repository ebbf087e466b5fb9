// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Directory-wide patch sweeps.
//!
//! Some patches target one file, but prefix swaps and version
//! conformance touch every metadata document in a retrieved source tree.
//! [`FileSet`] walks a directory tree and selects files whose base name
//! matches a glob pattern, and [`Sweeper`] applies one [`SweepAction`]
//! to every selected file, rewriting only the files where the action
//! actually changed bytes.
//!
//! # One Bad File Does Not Stop a Sweep
//!
//! A sweep over a few thousand retrieved files should not abort because
//! one of them is unreadable. Per-file failures are logged, collected
//! into the [`SweepReport`], and the sweep moves on. The caller decides
//! afterwards whether a dirty report is fatal.
//!
//! # Literal Replacement Is Brute Force
//!
//! [`SweepAction::Swaps`] performs plain byte-level substitution with no
//! notion of markup, which is exactly what makes it safe on any file the
//! pattern matches, text or not. The flip side is that search text must
//! be uncommon enough not to collide, and must not match its own
//! replacement, or a second sweep will keep finding work to do.

use crate::{config::Swap, metadata, patch::atomic_write};

use glob::Pattern;
use ignore::WalkBuilder;
use indicatif::{ProgressBar, ProgressStyle};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument, warn};

/// Files under one root whose base names match a glob pattern.
#[derive(Clone, Debug)]
pub struct FileSet {
    root: PathBuf,
    pattern: Pattern,
}

impl FileSet {
    /// Construct new file set.
    ///
    /// # Errors
    ///
    /// - Return [`SweepError::BadPattern`] if `pattern` is not a valid
    ///   glob pattern.
    pub fn new(root: impl Into<PathBuf>, pattern: impl AsRef<str>) -> Result<Self> {
        let pattern = Pattern::new(pattern.as_ref()).map_err(|error| SweepError::BadPattern {
            source: error,
            pattern: pattern.as_ref().to_owned(),
        })?;

        Ok(Self {
            root: root.into(),
            pattern,
        })
    }

    /// Root directory this set walks.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Glob pattern file base names must match.
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Collect every matching file under the root, in path order.
    ///
    /// Unreadable directory entries are logged and skipped so one broken
    /// entry cannot hide the rest of the tree.
    ///
    /// # Errors
    ///
    /// - Return [`SweepError::MissingRoot`] if the root is not a
    ///   directory.
    pub fn files(&self) -> Result<Vec<PathBuf>> {
        if !self.root.is_dir() {
            return Err(SweepError::MissingRoot {
                root: self.root.clone(),
            });
        }

        let mut builder = WalkBuilder::new(&self.root);
        builder
            .standard_filters(false)
            .follow_links(false)
            .sort_by_file_path(|left, right| left.cmp(right));

        let mut files = Vec::new();
        for entry in builder.build() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    warn!("skipping unreadable entry: {error}");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|kind| kind.is_file()) {
                continue;
            }
            if self.pattern.matches(&entry.file_name().to_string_lossy()) {
                files.push(entry.into_path());
            }
        }

        Ok(files)
    }
}

/// Patch action a sweep applies to each file.
#[derive(Clone, Debug)]
pub enum SweepAction {
    /// Apply literal byte replacements, in listing order.
    Swaps(Vec<Swap>),

    /// Conform matching `<packageVersions>` blocks to one version.
    Conform {
        /// Namespace prefix blocks must name to be rewritten.
        prefix: String,

        /// Target major number.
        major: u32,

        /// Target minor number.
        minor: u32,
    },
}

impl SweepAction {
    fn check(&self) -> Result<()> {
        if let SweepAction::Swaps(swaps) = self {
            if swaps.iter().any(|swap| swap.from.is_empty()) {
                return Err(SweepError::EmptySwap);
            }
        }

        Ok(())
    }

    fn apply(&self, bytes: &[u8], path: &Path) -> Result<Option<(Vec<u8>, usize)>> {
        match self {
            SweepAction::Swaps(swaps) => {
                let mut data = bytes.to_vec();
                let mut hits = 0;
                for swap in swaps {
                    let (next, count) = replace_bytes(&data, swap.from.as_bytes(), swap.to.as_bytes());
                    data = next;
                    hits += count;
                }
                if hits == 0 || data == bytes {
                    return Ok(None);
                }
                Ok(Some((data, hits)))
            }
            SweepAction::Conform {
                prefix,
                major,
                minor,
            } => {
                let text = std::str::from_utf8(bytes).map_err(|_| SweepError::NotText {
                    path: path.to_owned(),
                })?;
                let (patched, changed) =
                    metadata::conform_package_versions(text, prefix, *major, *minor).map_err(
                        |error| SweepError::Conform {
                            source: error,
                            path: path.to_owned(),
                        },
                    )?;
                if changed == 0 {
                    return Ok(None);
                }
                Ok(Some((patched.into_bytes(), changed)))
            }
        }
    }
}

/// Outcome tally of one finished sweep.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// How many files the sweep inspected.
    pub scanned: usize,

    /// Rewritten files paired with their hit counts.
    pub changed: Vec<(PathBuf, usize)>,

    /// Per-file failures the sweep stepped over.
    pub failures: Vec<SweepError>,
}

impl SweepReport {
    /// Total hits across every rewritten file.
    pub fn hits(&self) -> usize {
        self.changed.iter().map(|(_, hits)| hits).sum()
    }

    /// How many files were rewritten.
    pub fn files_changed(&self) -> usize {
        self.changed.len()
    }

    /// Whether the sweep finished without stepping over failures.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Apply one action to every file of a file set.
#[derive(Clone, Debug)]
pub struct Sweeper {
    fileset: FileSet,
    action: SweepAction,
}

impl Sweeper {
    /// Construct new sweeper.
    pub fn new(fileset: FileSet, action: SweepAction) -> Self {
        Self { fileset, action }
    }

    /// Run the sweep without progress reporting.
    ///
    /// # Errors
    ///
    /// - Return [`SweepError::EmptySwap`] if a replacement has empty
    ///   search text.
    /// - Return [`SweepError::MissingRoot`] if the file set root does
    ///   not exist.
    pub fn run(&self) -> Result<SweepReport> {
        self.run_with_progress(&ProgressBar::hidden())
    }

    /// Run the sweep, tracking each patched file on a progress bar.
    ///
    /// # Errors
    ///
    /// - Return [`SweepError::EmptySwap`] if a replacement has empty
    ///   search text.
    /// - Return [`SweepError::MissingRoot`] if the file set root does
    ///   not exist.
    /// - Return [`SweepError::IndicatifStyleTemplate`] if the progress
    ///   bar style cannot be set.
    #[instrument(skip(self, bar), level = "debug")]
    pub fn run_with_progress(&self, bar: &ProgressBar) -> Result<SweepReport> {
        self.action.check()?;
        let files = self.fileset.files()?;

        let style = ProgressStyle::with_template(
            "{elapsed_precise:.green}  {msg:<50}  [{wide_bar:.yellow/blue}] {pos}/{len}",
        )?
        .progress_chars("-Cco.");
        bar.set_style(style);
        bar.set_message(format!(
            "sweeping {} under {:?}",
            self.fileset.pattern(),
            self.fileset.root().display()
        ));
        bar.reset();
        bar.set_length(files.len() as u64);

        let mut report = SweepReport::default();
        for path in files {
            bar.inc(1);
            report.scanned += 1;
            match self.patch_file(&path) {
                Ok(Some(hits)) => {
                    debug!("{hits} hits at {:?}", path.display());
                    report.changed.push((path, hits));
                }
                Ok(None) => {}
                Err(error) => {
                    warn!("{error}");
                    report.failures.push(error);
                }
            }
        }

        Ok(report)
    }

    fn patch_file(&self, path: &Path) -> Result<Option<usize>> {
        let bytes = fs::read(path).map_err(|error| SweepError::Read {
            source: error,
            path: path.to_owned(),
        })?;

        match self.action.apply(&bytes, path)? {
            Some((patched, hits)) => {
                atomic_write(path, &patched).map_err(|error| SweepError::Write {
                    source: error,
                    path: path.to_owned(),
                })?;
                Ok(Some(hits))
            }
            None => Ok(None),
        }
    }
}

/// Replacement listing that retires one namespace prefix for another.
///
/// Searches for the prefix in its field form, its member form, and its
/// markup form, which covers how packaged names appear in metadata
/// without needing to parse any of it.
pub fn prefix_swaps(old: &str, new: &str) -> Vec<Swap> {
    vec![
        Swap::new(format!("{old}__"), format!("{new}__")),
        Swap::new(format!("{old}."), format!("{new}.")),
        Swap::new(format!("<namespace>{old}"), format!("<namespace>{new}")),
    ]
}

/// Rename direct children of `dir` that carry an old package prefix.
///
/// Packaged object files live flat in their folder under names like
/// `acme__Invoice__c.object`, so only direct children are considered.
/// Renames happen in name order and the performed renames come back as
/// from/to pairs.
///
/// # Errors
///
/// - Return [`SweepError::MissingRoot`] if `dir` is not a directory.
/// - Return [`SweepError::ListDir`] or [`SweepError::Rename`] if file
///   I/O fails.
#[instrument(level = "debug")]
pub fn rename_prefixed(dir: &Path, old: &str, new: &str) -> Result<Vec<(PathBuf, PathBuf)>> {
    if !dir.is_dir() {
        return Err(SweepError::MissingRoot {
            root: dir.to_owned(),
        });
    }

    let old_prefix = format!("{old}__");
    let new_prefix = format!("{new}__");

    let listing = fs::read_dir(dir).map_err(|error| SweepError::ListDir {
        source: error,
        path: dir.to_owned(),
    })?;
    let mut names = Vec::new();
    for entry in listing {
        let entry = entry.map_err(|error| SweepError::ListDir {
            source: error,
            path: dir.to_owned(),
        })?;
        names.push(entry.file_name());
    }
    names.sort();

    let mut renamed = Vec::new();
    for name in names {
        let name = name.to_string_lossy().into_owned();
        if !name.starts_with(&old_prefix) {
            continue;
        }
        let from = dir.join(&name);
        let to = dir.join(name.replace(&old_prefix, &new_prefix));
        fs::rename(&from, &to).map_err(|error| SweepError::Rename {
            source: error,
            path: from.clone(),
        })?;
        renamed.push((from, to));
    }

    Ok(renamed)
}

fn replace_bytes(data: &[u8], from: &[u8], to: &[u8]) -> (Vec<u8>, usize) {
    let mut out = Vec::with_capacity(data.len());
    let mut hits = 0;
    let mut rest = data;
    while let Some(found) = find_bytes(rest, from) {
        out.extend_from_slice(&rest[..found]);
        out.extend_from_slice(to);
        rest = &rest[found + from.len()..];
        hits += 1;
    }
    out.extend_from_slice(rest);

    (out, hits)
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }

    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Sweep error types.
#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    /// File pattern is not a valid glob.
    #[error("invalid file pattern {pattern:?}")]
    BadPattern {
        #[source]
        source: glob::PatternError,
        pattern: String,
    },

    /// Sweep root does not exist.
    #[error("no such directory {:?}", root.display())]
    MissingRoot { root: PathBuf },

    /// Replacement search text is empty.
    #[error("replacement search text cannot be empty")]
    EmptySwap,

    /// Swept file cannot be read.
    #[error("failed to read {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Swept file cannot be rewritten.
    #[error("failed to write {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Directory listing cannot be read.
    #[error("failed to list directory {:?}", path.display())]
    ListDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Prefixed file cannot be renamed.
    #[error("failed to rename {:?}", path.display())]
    Rename {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Swept file must be text for this action.
    #[error("{:?} is not UTF-8 text", path.display())]
    NotText { path: PathBuf },

    /// Swept file cannot be conformed.
    #[error("cannot conform {:?}", path.display())]
    Conform {
        #[source]
        source: crate::metadata::MetadataError,
        path: PathBuf,
    },

    /// Style template cannot be set for progress bars.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),
}

/// Friendly result alias :3
pub type Result<T, E = SweepError> = std::result::Result<T, E>;
