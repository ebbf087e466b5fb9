// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Whole-file patching.
//!
//! [`ManifestFile`] and [`MetadataFile`] bind the in-memory operations of
//! [`crate::manifest::edit`] and [`crate::metadata`] to paths on disk.
//! Both follow the same read, patch, rewrite cycle.
//!
//! # Skip Writing When Nothing Changed
//!
//! A rule whose outcome is already satisfied leaves the target file
//! completely alone. No rewrite means no timestamp churn, which keeps
//! repeated runs of the same patch invisible to build tooling that
//! watches modification times.
//!
//! # Atomic Replacement
//!
//! A rewrite never truncates the target in place. New content goes to a
//! sibling temporary file first and only replaces the target through a
//! rename, so a reader either sees the old document or the new one, and
//! a crash mid-write cannot leave a half-written manifest behind.
//!
//! # No Partial Writes on Failure
//!
//! Validation happens on the in-memory copy before any write. A file
//! that fails to parse, or an edit that would corrupt it, reports an
//! error with the target byte-for-byte as it was.

use crate::manifest::{
    edit::{EditError, EditOutcome, ManifestEdit},
    Manifest,
};
use crate::metadata::{self, MetadataError};

use std::{
    fs::read_to_string,
    io::Write,
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

/// Handle on a manifest file.
///
/// Owns nothing but the path. Every operation reads the file fresh,
/// applies one rule through [`ManifestEdit`], and rewrites the file only
/// when the rule changed something.
#[derive(Clone, Debug)]
pub struct ManifestFile {
    path: PathBuf,
}

impl ManifestFile {
    /// Construct new manifest file handle.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path this handle operates on.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse the manifest currently on disk.
    ///
    /// # Errors
    ///
    /// - Return [`PatchError::Read`] if the file cannot be read.
    /// - Return [`PatchError::Edit`] if the content is not a valid
    ///   manifest.
    pub fn load(&self) -> Result<Manifest> {
        let content = read_file(&self.path)?;
        Ok(content.parse::<Manifest>().map_err(EditError::from)?)
    }

    /// Guarantee that a section declaring `type_name` exists on disk.
    ///
    /// # Errors
    ///
    /// - Return [`PatchError::Read`] or [`PatchError::Write`] if file I/O
    ///   fails.
    /// - Return [`PatchError::Edit`] if the manifest is malformed or the
    ///   rule arguments are unusable.
    #[instrument(skip(self, members), level = "debug")]
    pub fn ensure_section(&self, type_name: &str, members: &[String]) -> Result<EditOutcome> {
        self.rewrite(|edit| edit.ensure_section(type_name, members.iter().cloned()))
    }

    /// Guarantee that no section declaring `type_name` exists on disk.
    ///
    /// # Errors
    ///
    /// - Return [`PatchError::Read`] or [`PatchError::Write`] if file I/O
    ///   fails.
    /// - Return [`PatchError::Edit`] if the manifest is malformed.
    #[instrument(skip(self), level = "debug")]
    pub fn remove_section(&self, type_name: &str) -> Result<EditOutcome> {
        self.rewrite(|edit| edit.remove_section(type_name))
    }

    /// Set the manifest's version value on disk.
    ///
    /// # Errors
    ///
    /// - Return [`PatchError::Read`] or [`PatchError::Write`] if file I/O
    ///   fails.
    /// - Return [`PatchError::Edit`] if the manifest is malformed or the
    ///   version shape is invalid.
    #[instrument(skip(self), level = "debug")]
    pub fn set_version(&self, version: &str) -> Result<EditOutcome> {
        self.rewrite(|edit| edit.set_version(version))
    }

    fn rewrite<F>(&self, apply: F) -> Result<EditOutcome>
    where
        F: FnOnce(&mut ManifestEdit) -> crate::manifest::edit::Result<EditOutcome>,
    {
        let content = read_file(&self.path)?;
        let mut edit = ManifestEdit::new(content)?;
        let outcome = apply(&mut edit)?;
        if !edit.changed() {
            debug!("nothing to rewrite at {:?}", self.path.display());
            return Ok(outcome);
        }

        write_file(&self.path, edit.as_str())?;
        Ok(outcome)
    }
}

/// Handle on a metadata document file.
///
/// Covers the sibling documents a deployment patches next to the
/// manifest, like object definitions and installed package descriptors.
#[derive(Clone, Debug)]
pub struct MetadataFile {
    path: PathBuf,
}

impl MetadataFile {
    /// Construct new metadata file handle.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path this handle operates on.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove every block of the named element, reporting how many went.
    ///
    /// The file is rewritten only when at least one block was removed.
    ///
    /// # Errors
    ///
    /// - Return [`PatchError::Read`] or [`PatchError::Write`] if file I/O
    ///   fails.
    /// - Return [`PatchError::Metadata`] if the document or element name
    ///   is unusable.
    #[instrument(skip(self), level = "debug")]
    pub fn strip_elements(&self, element: &str) -> Result<usize> {
        let content = read_file(&self.path)?;
        let (patched, removed) = metadata::strip_elements(&content, element)?;
        if removed == 0 {
            debug!("no <{element}> blocks at {:?}", self.path.display());
            return Ok(0);
        }

        write_file(&self.path, &patched)?;
        Ok(removed)
    }

    /// Read the installed package version out of this document.
    ///
    /// # Errors
    ///
    /// - Return [`PatchError::Read`] if the file cannot be read.
    /// - Return [`PatchError::Metadata`] if the document carries no
    ///   usable version number.
    pub fn installed_version(&self) -> Result<(u32, u32)> {
        let content = read_file(&self.path)?;
        Ok(metadata::installed_version(&content)?)
    }
}

/// Replace `path` with `bytes` through a sibling temporary file.
///
/// The temporary lives in the target's directory so the final rename
/// stays on one filesystem and readers never observe a half-written
/// file.
pub(crate) fn atomic_write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|error| error.error)?;
    Ok(())
}

fn read_file(path: &Path) -> Result<String> {
    read_to_string(path).map_err(|error| PatchError::Read {
        source: error,
        path: path.to_owned(),
    })
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    atomic_write(path, content.as_bytes()).map_err(|error| PatchError::Write {
        source: error,
        path: path.to_owned(),
    })
}

/// File patching error types.
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    /// Target file cannot be read.
    #[error("failed to read {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Target file cannot be rewritten.
    #[error("failed to write {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Manifest rule failed to apply.
    #[error(transparent)]
    Edit(#[from] EditError),

    /// Metadata document operation failed.
    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

/// Friendly result alias :3
pub type Result<T, E = PatchError> = std::result::Result<T, E>;
