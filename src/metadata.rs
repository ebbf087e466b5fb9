// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Metadata document patch operations.
//!
//! The manifest is not the only XML document a deployment needs patched.
//! Object definitions carry `<listViews>` blocks that collide between
//! orgs, and most component documents pin a `<packageVersions>` block to
//! whatever package version the source org had installed. The operations
//! here rewrite those sibling documents with the same splicing discipline
//! as [`crate::manifest::edit`]: scan for literal markers outside
//! comments, replace the smallest byte range possible, and leave the rest
//! of the file byte-for-byte intact.
//!
//! # Element Stripping
//!
//! [`strip_elements`] excises every `<tag>...</tag>` block of one element
//! from a document. Blocks of the stripped element must not nest, which
//! holds for every element worth stripping in this dialect.
//!
//! # Version Conformance
//!
//! [`conform_package_versions`] rewrites the `<majorNumber>` and
//! `<minorNumber>` values of every `<packageVersions>` block that names a
//! given `<namespace>`, so a retrieved component can deploy against
//! the package version the target org actually has. The target version
//! usually comes from the org's own `.installedPackage` document, which
//! [`installed_version`] reads.

use crate::manifest::{comment_spans, find_marker, widen_to_line, ManifestError};

use std::ops::Range;

/// Remove every block of the named element from a document.
///
/// Returns the patched content together with the number of blocks
/// removed. Content comes back unchanged when no block matched. A block
/// that held its lines alone is excised with its indentation and
/// trailing newline, same as section removal in a manifest.
///
/// # Errors
///
/// - Return [`MetadataError::BadElementName`] if `element` cannot form a
///   scannable tag.
/// - Return [`MetadataError::UnterminatedElement`] if a block never
///   closes.
/// - Return [`MetadataError::Scan`] if a comment never closes.
pub fn strip_elements(content: &str, element: &str) -> Result<(String, usize)> {
    check_element(element)?;

    let comments = comment_spans(content)?;
    let open_marker = format!("<{element}>");
    let close_marker = format!("</{element}>");

    let mut spans = Vec::new();
    let mut at = 0;
    while let Some(open) = find_marker(content, &comments, at, &open_marker) {
        let close = find_marker(content, &comments, open + open_marker.len(), &close_marker)
            .ok_or_else(|| MetadataError::UnterminatedElement {
                element: element.to_owned(),
                at: open,
            })?;
        let end = close + close_marker.len();
        spans.push(widen_to_line(content, open..end));
        at = end;
    }

    if spans.is_empty() {
        return Ok((content.to_owned(), 0));
    }

    // INVARIANT: Excise back to front so earlier spans stay valid.
    let mut patched = content.to_owned();
    for span in spans.iter().rev() {
        patched.replace_range(span.clone(), "");
    }

    Ok((patched, spans.len()))
}

/// Pin matching `<packageVersions>` blocks to one version.
///
/// Every block whose `<namespace>` value equals `prefix` gets its
/// `<majorNumber>` and `<minorNumber>` values rewritten to `major` and
/// `minor`. Blocks naming other prefixes are left alone, and blocks that
/// already carry the target version are not rewritten, so conforming
/// twice is a no-op.
///
/// Returns the patched content together with the number of blocks that
/// actually changed.
///
/// # Errors
///
/// - Return [`MetadataError::UnterminatedElement`] if a block or one of
///   its inner elements never closes.
/// - Return [`MetadataError::IncompleteVersionBlock`] if a matching
///   block lacks a number element to rewrite.
/// - Return [`MetadataError::Scan`] if a comment never closes.
pub fn conform_package_versions(
    content: &str,
    prefix: &str,
    major: u32,
    minor: u32,
) -> Result<(String, usize)> {
    let comments = comment_spans(content)?;
    let major_text = major.to_string();
    let minor_text = minor.to_string();

    let mut edits: Vec<(Range<usize>, String)> = Vec::new();
    let mut blocks = 0;
    let mut at = 0;
    while let Some(open) = find_marker(content, &comments, at, "<packageVersions>") {
        let close = find_marker(
            content,
            &comments,
            open + "<packageVersions>".len(),
            "</packageVersions>",
        )
        .ok_or(MetadataError::UnterminatedElement {
            element: "packageVersions".to_owned(),
            at: open,
        })?;
        at = close + "</packageVersions>".len();
        let inner = open + "<packageVersions>".len()..close;

        let prefix_span = match element_value(content, &comments, &inner, "namespace")? {
            Some(span) => span,
            None => continue,
        };
        if content[prefix_span].trim() != prefix {
            continue;
        }

        let major_span = element_value(content, &comments, &inner, "majorNumber")?.ok_or(
            MetadataError::IncompleteVersionBlock {
                element: "majorNumber".to_owned(),
                at: open,
            },
        )?;
        let minor_span = element_value(content, &comments, &inner, "minorNumber")?.ok_or(
            MetadataError::IncompleteVersionBlock {
                element: "minorNumber".to_owned(),
                at: open,
            },
        )?;

        let mut changed = false;
        if content[major_span.clone()].trim() != major_text {
            edits.push((major_span, major_text.clone()));
            changed = true;
        }
        if content[minor_span.clone()].trim() != minor_text {
            edits.push((minor_span, minor_text.clone()));
            changed = true;
        }
        if changed {
            blocks += 1;
        }
    }

    if edits.is_empty() {
        return Ok((content.to_owned(), 0));
    }

    let mut patched = content.to_owned();
    for (span, value) in edits.iter().rev() {
        patched.replace_range(span.clone(), value);
    }

    Ok((patched, blocks))
}

/// Read the installed version out of an `.installedPackage` document.
///
/// Takes the first two dot-separated fields of the `<versionNumber>`
/// value as the major and minor numbers. Trailing fields like a patch
/// number are ignored.
///
/// # Errors
///
/// - Return [`MetadataError::MissingVersionNumber`] if the document has
///   no complete `<versionNumber>` element.
/// - Return [`MetadataError::BadVersionNumber`] if the value does not
///   start with two numeric fields.
/// - Return [`MetadataError::Scan`] if a comment never closes.
pub fn installed_version(content: &str) -> Result<(u32, u32)> {
    let comments = comment_spans(content)?;
    let span = element_value(content, &comments, &(0..content.len()), "versionNumber")?
        .ok_or(MetadataError::MissingVersionNumber)?;
    let value = content[span].trim();

    let mut fields = value.split('.');
    let major = fields.next().and_then(|field| field.parse().ok());
    let minor = fields.next().and_then(|field| field.parse().ok());
    match (major, minor) {
        (Some(major), Some(minor)) => Ok((major, minor)),
        _ => Err(MetadataError::BadVersionNumber(value.to_owned())),
    }
}

fn element_value(
    content: &str,
    comments: &[Range<usize>],
    bounds: &Range<usize>,
    element: &str,
) -> Result<Option<Range<usize>>> {
    let open_marker = format!("<{element}>");
    let close_marker = format!("</{element}>");

    let open = match find_marker(content, comments, bounds.start, &open_marker) {
        Some(found) if found < bounds.end => found,
        _ => return Ok(None),
    };
    let close = find_marker(content, comments, open + open_marker.len(), &close_marker)
        .filter(|found| *found < bounds.end)
        .ok_or_else(|| MetadataError::UnterminatedElement {
            element: element.to_owned(),
            at: open,
        })?;

    Ok(Some(open + open_marker.len()..close))
}

fn check_element(element: &str) -> Result<()> {
    let scannable = !element.is_empty()
        && element
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
    if !scannable {
        return Err(MetadataError::BadElementName(element.to_owned()));
    }

    Ok(())
}

/// Metadata document error types.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum MetadataError {
    /// Document comments cannot be scanned.
    #[error(transparent)]
    Scan(#[from] ManifestError),

    /// Element name cannot form a scannable tag.
    #[error("element name {0:?} cannot be scanned for")]
    BadElementName(String),

    /// Element block is missing its closing tag.
    #[error("<{element}> opened at byte {at} is never closed")]
    UnterminatedElement { element: String, at: usize },

    /// Package version block lacks a number element to rewrite.
    #[error("<packageVersions> block at byte {at} has no complete <{element}> element")]
    IncompleteVersionBlock { element: String, at: usize },

    /// Installed package document has no version number element.
    #[error("document has no complete <versionNumber> element")]
    MissingVersionNumber,

    /// Version number value does not start with two numeric fields.
    #[error("version number {0:?} is not a dotted numeric value")]
    BadVersionNumber(String),
}

/// Friendly result alias :3
pub type Result<T, E = MetadataError> = std::result::Result<T, E>;
