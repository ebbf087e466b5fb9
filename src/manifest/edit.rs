// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Manifest patch rule application.
//!
//! Utilities to apply patch rules to manifest content held in memory. File
//! I/O is left to the caller to figure out.
//!
//! # Splicing Instead of Re-rendering
//!
//! Every rule here rewrites the smallest possible byte range of the
//! original text. Sections that a rule does not touch stay byte-for-byte
//! identical, including their indentation and ordering. This matters
//! because manifests live under version control in practice, and a patch
//! that reflows the whole file drowns the actual change in noise.
//!
//! A new section block is spliced in immediately before the `<version>`
//! element, keeping the sections-then-version ordering that the manifest
//! format demands. The block copies the file's own indentation style, or
//! collapses to a single line when the manifest itself is a single line.
//!
//! # Idempotence
//!
//! Applying the same rule twice is always safe. The second application
//! reports [`EditOutcome::AlreadyPresent`] or [`EditOutcome::Absent`]
//! without touching the content, and [`ManifestEdit::changed`] stays
//! `false` for a no-op, so callers can skip rewriting files that did not
//! move.
//!
//! # Structural Re-validation
//!
//! After computing a splice, the candidate text is parsed again as a
//! [`Manifest`] before it replaces the held content. A splice that would
//! produce an unparseable document is rejected and the content keeps its
//! previous value, so no sequence of rules can corrupt a manifest.

use crate::manifest::{line_start_of, widen_to_line, Manifest, ManifestError};

use std::fmt::{Display, Formatter, Result as FmtResult};

/// Outcome of one applied patch rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditOutcome {
    /// Content was modified.
    Applied,

    /// Requested state already holds, so content was left untouched.
    AlreadyPresent,

    /// Removal target does not exist, so content was left untouched.
    Absent,
}

/// Manifest content editor.
///
/// Holds raw manifest text and applies patch rules to it in place. The
/// content is validated on construction and after every splice.
///
/// # Invariant
///
/// - Held content always parses as a [`Manifest`].
/// - [`ManifestEdit::changed`] flips only when a rule modified content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManifestEdit {
    content: String,
    changed: bool,
}

impl ManifestEdit {
    /// Construct new manifest editor from raw content.
    ///
    /// # Errors
    ///
    /// - Return [`EditError::Manifest`] if the content is not a
    ///   structurally valid manifest.
    pub fn new(content: impl Into<String>) -> Result<Self> {
        let content = content.into();
        content.parse::<Manifest>()?;

        Ok(Self {
            content,
            changed: false,
        })
    }

    /// Guarantee that a section declaring `type_name` exists.
    ///
    /// When the manifest already declares the type, nothing changes and the
    /// existing member list is kept as-is, whatever it contains. Otherwise
    /// a new section block with the given members is spliced in directly
    /// before the `<version>` element. Duplicate members are inserted once,
    /// in first-mention order.
    ///
    /// # Errors
    ///
    /// - Return [`EditError::EmptyTypeName`] if `type_name` is empty.
    /// - Return [`EditError::NoMembers`] if no members are given.
    /// - Return [`EditError::EmptyMember`] if any member name is empty.
    /// - Return [`EditError::UnsafeName`] if any name carries markup
    ///   characters that would break the document.
    /// - Return [`EditError::Manifest`] if the content no longer parses.
    pub fn ensure_section(
        &mut self,
        type_name: impl AsRef<str>,
        members: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<EditOutcome> {
        let type_name = type_name.as_ref();
        if type_name.is_empty() {
            return Err(EditError::EmptyTypeName);
        }
        check_name(type_name)?;

        let mut wanted: Vec<String> = Vec::new();
        for member in members {
            let member = member.into();
            if member.is_empty() {
                return Err(EditError::EmptyMember);
            }
            check_name(&member)?;
            if !wanted.contains(&member) {
                wanted.push(member);
            }
        }
        if wanted.is_empty() {
            return Err(EditError::NoMembers(type_name.to_owned()));
        }

        let manifest: Manifest = self.content.parse()?;
        if manifest.section(type_name).is_some() {
            return Ok(EditOutcome::AlreadyPresent);
        }

        // INVARIANT: Insert before the version anchor so the new section
        // stays inside the root element and ahead of the version element.
        let anchor = manifest.version_span.start;
        let line_start = line_start_of(&self.content, anchor);
        let prefix = self.content[line_start..anchor].to_owned();
        let newline = if self.content.contains("\r\n") {
            "\r\n"
        } else {
            "\n"
        };

        let (rendered, insert_at) = if prefix.trim().is_empty() && line_start > 0 {
            let unit = indent_unit(&self.content, &manifest);
            let mut block = String::new();
            block.push_str(&format!("{prefix}<types>{newline}"));
            for member in &wanted {
                block.push_str(&format!("{prefix}{unit}<members>{member}</members>{newline}"));
            }
            block.push_str(&format!("{prefix}{unit}<name>{type_name}</name>{newline}"));
            block.push_str(&format!("{prefix}</types>{newline}"));
            (block, line_start)
        } else {
            let mut block = String::from("<types>");
            for member in &wanted {
                block.push_str(&format!("<members>{member}</members>"));
            }
            block.push_str(&format!("<name>{type_name}</name></types>"));
            (block, anchor)
        };

        let mut candidate = self.content.clone();
        candidate.insert_str(insert_at, &rendered);
        candidate.parse::<Manifest>()?;

        self.content = candidate;
        self.changed = true;
        Ok(EditOutcome::Applied)
    }

    /// Guarantee that no section declaring `type_name` exists.
    ///
    /// Absence of the section is the expected common case and reports
    /// [`EditOutcome::Absent`] without touching the content. When the
    /// section exists, its whole block is excised along with the line it
    /// occupied, so removal exactly reverses an earlier insertion.
    ///
    /// # Errors
    ///
    /// - Return [`EditError::Manifest`] if the content no longer parses.
    pub fn remove_section(&mut self, type_name: impl AsRef<str>) -> Result<EditOutcome> {
        let manifest: Manifest = self.content.parse()?;
        let section = match manifest.section(type_name.as_ref()) {
            Some(section) => section,
            None => return Ok(EditOutcome::Absent),
        };

        // INVARIANT: Consume surrounding whitespace only when the block
        // held its line alone, so inline neighbors stay untouched.
        let span = widen_to_line(&self.content, section.span.clone());

        let mut candidate = self.content.clone();
        candidate.replace_range(span, "");
        candidate.parse::<Manifest>()?;

        self.content = candidate;
        self.changed = true;
        Ok(EditOutcome::Applied)
    }

    /// Set the manifest's version value.
    ///
    /// # Errors
    ///
    /// - Return [`EditError::InvalidVersion`] if `version` is not two
    ///   dot-separated numeric fields.
    /// - Return [`EditError::Manifest`] if the content no longer parses.
    pub fn set_version(&mut self, version: impl AsRef<str>) -> Result<EditOutcome> {
        let version = version.as_ref();
        check_version(version)?;

        let manifest: Manifest = self.content.parse()?;
        if manifest.version() == version {
            return Ok(EditOutcome::AlreadyPresent);
        }

        let mut candidate = self.content.clone();
        candidate.replace_range(manifest.version_value_span.clone(), version);
        candidate.parse::<Manifest>()?;

        self.content = candidate;
        self.changed = true;
        Ok(EditOutcome::Applied)
    }

    /// Whether any applied rule modified the content.
    pub fn changed(&self) -> bool {
        self.changed
    }

    /// Current content as a string slice.
    pub fn as_str(&self) -> &str {
        &self.content
    }

    /// Consume the editor, yielding the final content.
    pub fn into_content(self) -> String {
        self.content
    }
}

impl Display for ManifestEdit {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        write!(fmt, "{}", self.content)
    }
}

fn indent_unit(content: &str, manifest: &Manifest) -> String {
    for section in manifest.sections() {
        let outer = whitespace_prefix(content, section.span.start);
        let inner = whitespace_prefix(content, section.name_open);
        if let (Some(outer), Some(inner)) = (outer, inner) {
            if inner.len() > outer.len() && inner.starts_with(outer) {
                return inner[outer.len()..].to_owned();
            }
        }
    }

    "    ".to_owned()
}

fn whitespace_prefix(content: &str, at: usize) -> Option<&str> {
    let prefix = &content[line_start_of(content, at)..at];
    prefix.chars().all(char::is_whitespace).then_some(prefix)
}

fn check_name(value: &str) -> Result<()> {
    if value.contains(['<', '>', '&', '"']) {
        return Err(EditError::UnsafeName(value.to_owned()));
    }

    Ok(())
}

fn check_version(version: &str) -> Result<()> {
    let mut parts = version.split('.');
    let valid = matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(major), Some(minor), None)
            if !major.is_empty()
                && !minor.is_empty()
                && major.bytes().all(|byte| byte.is_ascii_digit())
                && minor.bytes().all(|byte| byte.is_ascii_digit())
    );
    if !valid {
        return Err(EditError::InvalidVersion(version.to_owned()));
    }

    Ok(())
}

/// Manifest editing error types.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EditError {
    /// Content is not a structurally valid manifest.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Section insertion was given an empty type name.
    #[error("type name cannot be empty")]
    EmptyTypeName,

    /// Section insertion was given no members at all.
    #[error("section {0} needs at least one member")]
    NoMembers(String),

    /// Section insertion was given an empty member name.
    #[error("member names cannot be empty")]
    EmptyMember,

    /// Name contains characters that would break the document.
    #[error("{0:?} contains markup characters and cannot appear in a manifest")]
    UnsafeName(String),

    /// Version value is not a dotted major.minor pair.
    #[error("version {0:?} is not a dotted major.minor value")]
    InvalidVersion(String),
}

/// Friendly result alias :3
pub type Result<T, E = EditError> = std::result::Result<T, E>;
