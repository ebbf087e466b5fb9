// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Package manifest model.
//!
//! Parse and represent the deployment manifest that tells the metadata API
//! which components a retrieve or deploy covers.
//!
//! # Manifest Layout
//!
//! A manifest is a small XML document with a fixed shape: one root element
//! (conventionally `<Package>`), zero or more `<types>` blocks, then a
//! single `<version>` element, then the root close. Each `<types>` block
//! groups the __members__ of one component type under exactly one `<name>`
//! element:
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <Package xmlns="http://soap.sforce.com/2006/04/metadata">
//!     <types>
//!         <members>*</members>
//!         <name>ApexClass</name>
//!     </types>
//!     <version>43.0</version>
//! </Package>
//! ```
//!
//! The member entry `*` is a wildcard covering every component of the type.
//! Type names are unique within a manifest, and every `<types>` block sits
//! before the `<version>` element. Both rules come from the manifest format
//! itself, so [`Manifest`] rejects documents that break them.
//!
//! # Why Not a Full XML Parser?
//!
//! The manifest dialect is rigid enough that a marker scan is both simpler
//! and more predictable than a generic XML stack: the only tags that matter
//! are `<types>`, `<members>`, `<name>`, and `<version>`, and none of them
//! nest. The scanner still has to be structural rather than a substring
//! grep, though. A type name mentioned inside an XML comment, or appearing
//! as a member value of some other type, must not count as a section. So
//! the scan tracks comment spans and only reads `<name>` elements that sit
//! inside a `<types>` block.
//!
//! # See Also
//!
//! - [`edit`] for applying patch rules to manifest content.

pub mod edit;

use std::{collections::HashSet, ops::Range, str::FromStr};

/// Member entry matching every component of a type.
pub const WILDCARD: &str = "*";

/// A parsed package manifest.
///
/// Holds the section list and version value along with the byte spans they
/// were scanned from, so editing code can splice the original text instead
/// of re-rendering it. Construct through [`FromStr`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Manifest {
    sections: Vec<Section>,
    version: String,
    pub(crate) version_span: Range<usize>,
    pub(crate) version_value_span: Range<usize>,
    pub(crate) root_close: usize,
}

impl Manifest {
    /// All sections in document order.
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Look up the section declaring the given type name.
    pub fn section(&self, type_name: impl AsRef<str>) -> Option<&Section> {
        self.sections
            .iter()
            .find(|section| section.type_name == type_name.as_ref())
    }

    /// The manifest's API version value.
    pub fn version(&self) -> &str {
        &self.version
    }
}

impl FromStr for Manifest {
    type Err = ManifestError;

    fn from_str(content: &str) -> Result<Self> {
        let comments = comment_spans(content)?;
        let (root_open, root_name) =
            find_root_open(content, &comments).ok_or(ManifestError::MissingRoot)?;
        let root_close = find_root_close(content, &comments, &root_name)
            .ok_or_else(|| ManifestError::UnclosedRoot(root_name.clone()))?;

        let mut sections = Vec::new();
        let mut seen = HashSet::new();
        let mut at = root_open;
        while let Some(open) = find_marker(content, &comments, at, "<types>") {
            if open >= root_close {
                break;
            }
            let close = find_marker(content, &comments, open + "<types>".len(), "</types>")
                .filter(|found| *found < root_close)
                .ok_or(ManifestError::UnterminatedSection(open))?;
            let section = scan_section(content, &comments, open, close)?;
            if !seen.insert(section.type_name.clone()) {
                return Err(ManifestError::DuplicateSection(section.type_name));
            }
            sections.push(section);
            at = close + "</types>".len();
        }

        let (version_span, version_value_span) =
            scan_version(content, &comments, &sections, root_open, root_close)?;
        let version = content[version_value_span.clone()].trim().to_owned();

        // INVARIANT: Every section must precede the version element.
        for section in &sections {
            if section.span.start > version_span.start {
                return Err(ManifestError::SectionAfterVersion(
                    section.type_name.clone(),
                ));
            }
        }

        Ok(Self {
            sections,
            version,
            version_span,
            version_value_span,
            root_close,
        })
    }
}

/// One `<types>` block of a manifest.
///
/// Groups the member entries declared for a single component type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Section {
    type_name: String,
    members: Vec<String>,
    pub(crate) span: Range<usize>,
    pub(crate) name_open: usize,
}

impl Section {
    /// The component type this section declares.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Member entries in document order.
    pub fn members(&self) -> &[String] {
        &self.members
    }

    /// Whether the section claims every component of its type.
    pub fn is_wildcard(&self) -> bool {
        self.members.iter().any(|member| member == WILDCARD)
    }
}

fn scan_section(
    content: &str,
    comments: &[Range<usize>],
    open: usize,
    close: usize,
) -> Result<Section> {
    let name_open = find_marker(content, comments, open + "<types>".len(), "<name>")
        .filter(|found| *found < close)
        .ok_or(ManifestError::UnnamedSection(open))?;
    let name_close = find_marker(content, comments, name_open + "<name>".len(), "</name>")
        .filter(|found| *found < close)
        .ok_or(ManifestError::UnnamedSection(open))?;
    let type_name = content[name_open + "<name>".len()..name_close]
        .trim()
        .to_owned();
    if type_name.is_empty() {
        return Err(ManifestError::UnnamedSection(open));
    }

    let mut members = Vec::new();
    let mut at = open + "<types>".len();
    while let Some(member_open) = find_marker(content, comments, at, "<members>") {
        if member_open >= close {
            break;
        }
        let member_close = find_marker(
            content,
            comments,
            member_open + "<members>".len(),
            "</members>",
        )
        .filter(|found| *found < close)
        .ok_or(ManifestError::UnterminatedMember(member_open))?;
        members.push(
            content[member_open + "<members>".len()..member_close]
                .trim()
                .to_owned(),
        );
        at = member_close + "</members>".len();
    }

    Ok(Section {
        type_name,
        members,
        span: open..close + "</types>".len(),
        name_open,
    })
}

fn scan_version(
    content: &str,
    comments: &[Range<usize>],
    sections: &[Section],
    root_open: usize,
    root_close: usize,
) -> Result<(Range<usize>, Range<usize>)> {
    let mut at = root_open;
    let open = loop {
        let found = find_marker(content, comments, at, "<version>")
            .filter(|found| *found < root_close)
            .ok_or(ManifestError::MissingVersion)?;
        // INVARIANT: The version anchor sits outside every section block.
        if sections.iter().any(|section| section.span.contains(&found)) {
            at = found + "<version>".len();
            continue;
        }
        break found;
    };
    let close = find_marker(content, comments, open + "<version>".len(), "</version>")
        .filter(|found| *found < root_close)
        .ok_or(ManifestError::MissingVersion)?;

    Ok((
        open..close + "</version>".len(),
        open + "<version>".len()..close,
    ))
}

pub(crate) fn comment_spans(content: &str) -> Result<Vec<Range<usize>>> {
    let mut spans = Vec::new();
    let mut at = 0;
    while let Some(found) = content[at..].find("<!--") {
        let open = at + found;
        let close = content[open + "<!--".len()..]
            .find("-->")
            .ok_or(ManifestError::UnterminatedComment(open))?;
        let end = open + "<!--".len() + close + "-->".len();
        spans.push(open..end);
        at = end;
    }
    Ok(spans)
}

fn in_comment(comments: &[Range<usize>], at: usize) -> bool {
    comments.iter().any(|span| span.contains(&at))
}

pub(crate) fn find_marker(
    content: &str,
    comments: &[Range<usize>],
    from: usize,
    marker: &str,
) -> Option<usize> {
    let mut at = from;
    while let Some(found) = content.get(at..).and_then(|rest| rest.find(marker)) {
        let found = at + found;
        if !in_comment(comments, found) {
            return Some(found);
        }
        at = found + marker.len();
    }
    None
}

fn find_root_open(content: &str, comments: &[Range<usize>]) -> Option<(usize, String)> {
    let bytes = content.as_bytes();
    let mut at = 0;
    while at < bytes.len() {
        if bytes[at] == b'<' && !in_comment(comments, at) {
            match bytes.get(at + 1) {
                // Skip the XML declaration and comment openers.
                Some(b'?') | Some(b'!') => {}
                Some(_) => {
                    let name: String = content[at + 1..]
                        .chars()
                        .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
                        .collect();
                    if name.is_empty() {
                        return None;
                    }
                    return Some((at, name));
                }
                None => return None,
            }
        }
        at += 1;
    }
    None
}

fn find_root_close(content: &str, comments: &[Range<usize>], name: &str) -> Option<usize> {
    let marker = format!("</{name}>");
    let mut end = content.len();
    while let Some(found) = content[..end].rfind(&marker) {
        if !in_comment(comments, found) {
            return Some(found);
        }
        end = found;
    }
    None
}

pub(crate) fn line_start_of(content: &str, at: usize) -> usize {
    content[..at].rfind('\n').map_or(0, |newline| newline + 1)
}

/// Grow a block span so removing it takes its whole line, indentation and
/// trailing newline included. Spans that share a line with other markup are
/// returned untouched.
pub(crate) fn widen_to_line(content: &str, span: Range<usize>) -> Range<usize> {
    let line_start = line_start_of(content, span.start);
    let prefix = &content[line_start..span.start];
    if line_start == 0 || !prefix.chars().all(char::is_whitespace) {
        return span;
    }
    let mut end = span.end;
    if content[end..].starts_with("\r\n") {
        end += 2;
    } else if content[end..].starts_with('\n') {
        end += 1;
    }
    line_start..end
}

/// Manifest structure error types.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ManifestError {
    /// Document contains no root element.
    #[error("manifest has no root element")]
    MissingRoot,

    /// Root element opens but never closes.
    #[error("root element <{0}> is never closed")]
    UnclosedRoot(String),

    /// XML comment opens but never closes.
    #[error("comment opened at byte {0} is never closed")]
    UnterminatedComment(usize),

    /// Section block is missing its closing tag.
    #[error("section opened at byte {0} is missing its closing </types> tag")]
    UnterminatedSection(usize),

    /// Section block has no usable `<name>` element.
    #[error("section opened at byte {0} has no complete <name> element")]
    UnnamedSection(usize),

    /// Member entry is missing its closing tag.
    #[error("member entry opened at byte {0} is missing its closing </members> tag")]
    UnterminatedMember(usize),

    /// Two sections declare the same type name.
    #[error("manifest declares type {0} more than once")]
    DuplicateSection(String),

    /// No complete version element exists to anchor edits on.
    #[error("manifest has no complete <version> element")]
    MissingVersion,

    /// Section block appears after the version element.
    #[error("section {0} appears after the <version> element")]
    SectionAfterVersion(String),
}

/// Friendly result alias :3
pub type Result<T, E = ManifestError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_collects_sections_and_version() {
        let content = indoc! {r#"
            <?xml version="1.0" encoding="UTF-8"?>
            <Package xmlns="http://soap.sforce.com/2006/04/metadata">
                <types>
                    <members>*</members>
                    <name>ApexClass</name>
                </types>
                <types>
                    <members>Account_Summary</members>
                    <members>Contact_Summary</members>
                    <name>FieldSet</name>
                </types>
                <version>43.0</version>
            </Package>
        "#};

        let manifest: Manifest = content.parse().unwrap();
        assert_eq!(manifest.version(), "43.0");
        assert_eq!(manifest.sections().len(), 2);

        let apex = manifest.section("ApexClass").unwrap();
        assert_eq!(apex.members(), ["*"]);
        assert!(apex.is_wildcard());

        let field_sets = manifest.section("FieldSet").unwrap();
        assert_eq!(field_sets.members(), ["Account_Summary", "Contact_Summary"]);
        assert!(!field_sets.is_wildcard());

        assert_eq!(manifest.section("Flow"), None);
    }

    #[test]
    fn parse_accepts_single_line_documents() {
        let manifest: Manifest = "<Package><version>43.0</version></Package>"
            .parse()
            .unwrap();
        assert_eq!(manifest.version(), "43.0");
        assert!(manifest.sections().is_empty());
    }

    #[test]
    fn parse_ignores_commented_out_markup() {
        let content = indoc! {r#"
            <Package>
                <!-- <types><members>*</members><name>Flow</name></types> -->
                <types>
                    <members>*</members>
                    <name>ApexClass</name>
                </types>
                <!-- bump <version> with care -->
                <version>43.0</version>
            </Package>
        "#};

        let manifest: Manifest = content.parse().unwrap();
        assert_eq!(manifest.sections().len(), 1);
        assert_eq!(manifest.section("Flow"), None);
        assert_eq!(manifest.version(), "43.0");
    }

    #[test]
    fn parse_does_not_mistake_member_values_for_sections() {
        let content = indoc! {r#"
            <Package>
                <types>
                    <members>FlowDefinition</members>
                    <name>ApexClass</name>
                </types>
                <version>43.0</version>
            </Package>
        "#};

        let manifest: Manifest = content.parse().unwrap();
        assert_eq!(manifest.section("FlowDefinition"), None);
        assert_eq!(
            manifest.section("ApexClass").unwrap().members(),
            ["FlowDefinition"]
        );
    }

    #[test]
    fn parse_rejects_missing_version() {
        let result = "<Package><types><members>*</members><name>ApexClass</name></types></Package>"
            .parse::<Manifest>();
        assert_eq!(result, Err(ManifestError::MissingVersion));
    }

    #[test]
    fn parse_rejects_version_inside_comment() {
        let result = "<Package><!-- <version>43.0</version> --></Package>".parse::<Manifest>();
        assert_eq!(result, Err(ManifestError::MissingVersion));
    }

    #[test]
    fn parse_rejects_duplicate_type_names() {
        let content = indoc! {r#"
            <Package>
                <types>
                    <members>One</members>
                    <name>ApexClass</name>
                </types>
                <types>
                    <members>Two</members>
                    <name>ApexClass</name>
                </types>
                <version>43.0</version>
            </Package>
        "#};

        let result = content.parse::<Manifest>();
        assert_eq!(
            result,
            Err(ManifestError::DuplicateSection("ApexClass".into()))
        );
    }

    #[test]
    fn parse_rejects_unterminated_section() {
        let result = "<Package><types><members>*</members><name>ApexClass</name><version>43.0</version></Package>"
            .parse::<Manifest>();
        assert!(matches!(
            result,
            Err(ManifestError::UnterminatedSection(_))
        ));
    }

    #[test]
    fn parse_rejects_section_without_name() {
        let result = "<Package><types><members>*</members></types><version>43.0</version></Package>"
            .parse::<Manifest>();
        assert!(matches!(result, Err(ManifestError::UnnamedSection(_))));
    }

    #[test]
    fn parse_rejects_section_after_version() {
        let content = indoc! {r#"
            <Package>
                <version>43.0</version>
                <types>
                    <members>*</members>
                    <name>ApexClass</name>
                </types>
            </Package>
        "#};

        let result = content.parse::<Manifest>();
        assert_eq!(
            result,
            Err(ManifestError::SectionAfterVersion("ApexClass".into()))
        );
    }

    #[test]
    fn parse_rejects_unclosed_root() {
        let result = "<Package><version>43.0</version>".parse::<Manifest>();
        assert_eq!(result, Err(ManifestError::UnclosedRoot("Package".into())));
    }

    #[test]
    fn parse_rejects_empty_documents() {
        let result = "".parse::<Manifest>();
        assert_eq!(result, Err(ManifestError::MissingRoot));

        let result = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>".parse::<Manifest>();
        assert_eq!(result, Err(ManifestError::MissingRoot));
    }

    #[test]
    fn parse_rejects_unterminated_comment() {
        let result = "<Package><!-- oops <version>43.0</version></Package>".parse::<Manifest>();
        assert!(matches!(result, Err(ManifestError::UnterminatedComment(_))));
    }
}
