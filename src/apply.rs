// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Patch plan application.
//!
//! [`Runner`] executes the rules of a [`PatchPlan`] in order against one
//! home directory. Relative rule paths resolve against that directory,
//! so the same plan can patch whichever checkout it is pointed at.
//!
//! # Strictness
//!
//! Removing something that is already gone is a success by default,
//! because the point of a rule is the state it guarantees, not the work
//! it performs. A strict runner flips that and treats a missing removal
//! target as an error, for pipelines that want to know their assumptions
//! went stale. Real failures, like unreadable files or malformed
//! documents, are fatal under either mode.

use crate::{
    config::{PatchPlan, PlanRule},
    manifest::edit::EditOutcome,
    patch::{ManifestFile, MetadataFile, PatchError},
    sweep::{
        prefix_swaps, rename_prefixed, FileSet, SweepAction, SweepError, SweepReport, Sweeper,
    },
};

use indicatif::ProgressBar;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Patch plan runner.
#[derive(Clone, Debug)]
pub struct Runner {
    home: PathBuf,
    strict: bool,
    bar: ProgressBar,
}

impl Runner {
    /// Construct new plan runner rooted at `home`.
    pub fn new(home: impl Into<PathBuf>, strict: bool) -> Self {
        Self {
            home: home.into(),
            strict,
            bar: ProgressBar::hidden(),
        }
    }

    /// Construct new plan runner that tracks sweeps on a progress bar.
    pub fn with_progress(home: impl Into<PathBuf>, strict: bool, bar: ProgressBar) -> Self {
        Self {
            home: home.into(),
            strict,
            bar,
        }
    }

    /// Apply every rule of a plan, in listing order.
    ///
    /// # Errors
    ///
    /// - Return [`ApplyError::MissingSection`] if a strict removal found
    ///   nothing to remove.
    /// - Return [`ApplyError::SweepFailures`] if a sweep stepped over
    ///   per-file failures.
    /// - Return [`ApplyError::Patch`] or [`ApplyError::Sweep`] if an
    ///   individual rule fails outright.
    #[instrument(skip(self, plan), level = "debug")]
    pub fn apply(&self, plan: &PatchPlan) -> Result<ApplySummary> {
        if let Some(description) = plan.description.as_deref() {
            info!("{description}");
        }

        let mut summary = ApplySummary::default();
        for rule in plan.rules.as_deref().unwrap_or_default() {
            if self.apply_rule(rule)? {
                summary.changed += 1;
            }
            summary.rules += 1;
        }

        Ok(summary)
    }

    /// Apply one rule, reporting whether it changed anything on disk.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Runner::apply`], for a single rule.
    pub fn apply_rule(&self, rule: &PlanRule) -> Result<bool> {
        match rule {
            PlanRule::EnsureSection {
                manifest,
                type_name,
                members,
            } => {
                let file = ManifestFile::new(self.under(manifest));
                match file.ensure_section(type_name, members)? {
                    EditOutcome::Applied => {
                        info!("declared {type_name} in {:?}", file.path().display());
                        Ok(true)
                    }
                    _ => {
                        debug!("{type_name} already declared in {:?}", file.path().display());
                        Ok(false)
                    }
                }
            }
            PlanRule::RemoveSection {
                manifest,
                type_name,
            } => {
                let file = ManifestFile::new(self.under(manifest));
                match file.remove_section(type_name)? {
                    EditOutcome::Applied => {
                        info!("undeclared {type_name} in {:?}", file.path().display());
                        Ok(true)
                    }
                    EditOutcome::Absent if self.strict => Err(ApplyError::MissingSection {
                        type_name: type_name.clone(),
                        manifest: file.path().to_owned(),
                    }),
                    _ => {
                        info!(
                            "{type_name} not declared in {:?}, nothing to do",
                            file.path().display()
                        );
                        Ok(false)
                    }
                }
            }
            PlanRule::SetVersion { manifest, version } => {
                let file = ManifestFile::new(self.under(manifest));
                match file.set_version(version)? {
                    EditOutcome::Applied => {
                        info!("pinned {:?} to version {version}", file.path().display());
                        Ok(true)
                    }
                    _ => {
                        debug!("{:?} already at version {version}", file.path().display());
                        Ok(false)
                    }
                }
            }
            PlanRule::StripElements { file, element } => {
                let target = MetadataFile::new(self.under(file));
                let removed = target.strip_elements(element)?;
                if removed > 0 {
                    info!(
                        "removed {removed} <{element}> blocks from {:?}",
                        target.path().display()
                    );
                } else {
                    debug!("no <{element}> blocks in {:?}", target.path().display());
                }
                Ok(removed > 0)
            }
            PlanRule::Conform {
                root,
                prefix,
                pattern,
                version,
            } => {
                let root = self.under(root);
                let (major, minor) = match version {
                    Some(value) => version_pair(value)?,
                    None => {
                        let lookup = root
                            .join("installedPackages")
                            .join(format!("{prefix}.installedPackage"));
                        if !lookup.is_file() {
                            warn!("{prefix} is not installed, nothing to conform");
                            return Ok(false);
                        }
                        MetadataFile::new(lookup).installed_version()?
                    }
                };

                let fileset = FileSet::new(&root, pattern.as_deref().unwrap_or("*-meta.xml"))?;
                let action = SweepAction::Conform {
                    prefix: prefix.clone(),
                    major,
                    minor,
                };
                let report = Sweeper::new(fileset, action).run_with_progress(&self.bar)?;
                info!(
                    "set {} metadata files to {prefix} {major}.{minor}",
                    report.files_changed()
                );
                self.check_sweep(report)
            }
            PlanRule::PrefixSwap { root, old, new } => {
                let root = self.under(root);
                let objects = root.join("objects");
                let mut renamed = 0;
                if objects.is_dir() {
                    for (from, to) in rename_prefixed(&objects, old, new)? {
                        info!("renamed {:?} to {:?}", from.display(), to.display());
                        renamed += 1;
                    }
                }

                let fileset = FileSet::new(&root, "*")?;
                let report = Sweeper::new(fileset, SweepAction::Swaps(prefix_swaps(old, new)))
                    .run_with_progress(&self.bar)?;
                info!("{} matches in {} files", report.hits(), report.files_changed());
                let swept = self.check_sweep(report)?;
                Ok(swept || renamed > 0)
            }
            PlanRule::Replace {
                root,
                pattern,
                swaps,
            } => {
                let fileset =
                    FileSet::new(self.under(root), pattern.as_deref().unwrap_or("*"))?;
                let report = Sweeper::new(fileset, SweepAction::Swaps(swaps.clone()))
                    .run_with_progress(&self.bar)?;
                info!("{} matches in {} files", report.hits(), report.files_changed());
                self.check_sweep(report)
            }
        }
    }

    fn under(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_owned()
        } else {
            self.home.join(path)
        }
    }

    fn check_sweep(&self, report: SweepReport) -> Result<bool> {
        if !report.is_clean() {
            return Err(ApplyError::SweepFailures {
                failed: report.failures.len(),
                scanned: report.scanned,
            });
        }

        Ok(report.files_changed() > 0)
    }
}

/// Tally of one finished plan application.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApplySummary {
    /// How many rules were applied.
    pub rules: usize,

    /// How many of them changed something on disk.
    pub changed: usize,
}

fn version_pair(value: &str) -> Result<(u32, u32)> {
    let mut fields = value.split('.');
    let major = fields.next().and_then(|field| field.parse().ok());
    let minor = fields.next().and_then(|field| field.parse().ok());
    match (major, minor, fields.next()) {
        (Some(major), Some(minor), None) => Ok((major, minor)),
        _ => Err(ApplyError::BadRuleVersion(value.to_owned())),
    }
}

/// Plan application error types.
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    /// Strict removal found nothing to remove.
    #[error("no section {type_name} in {:?}", manifest.display())]
    MissingSection {
        type_name: String,
        manifest: PathBuf,
    },

    /// Rule version value is not a dotted major.minor pair.
    #[error("rule version {0:?} is not a dotted major.minor value")]
    BadRuleVersion(String),

    /// Sweep stepped over per-file failures.
    #[error("{failed} of {scanned} swept files failed to patch")]
    SweepFailures { failed: usize, scanned: usize },

    /// File patch operation failed.
    #[error(transparent)]
    Patch(#[from] PatchError),

    /// Sweep operation failed.
    #[error(transparent)]
    Sweep(#[from] SweepError),
}

/// Friendly result alias :3
pub type Result<T, E = ApplyError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::fs;

    #[sealed_test]
    fn apply_runs_each_rule_in_order() -> anyhow::Result<()> {
        fs::create_dir_all("work/src")?;
        fs::write("work/src/package.xml", "<Package><version>43.0</version></Package>")?;
        let plan: PatchPlan = indoc! {r#"
            [[rule]]
            kind = "ensure-section"
            manifest = "src/package.xml"
            type_name = "FlowDefinition"
            members = ["*"]

            [[rule]]
            kind = "set-version"
            manifest = "src/package.xml"
            version = "58.0"
        "#}
        .parse()?;

        let summary = Runner::new("work", false).apply(&plan)?;

        assert_eq!(
            summary,
            ApplySummary {
                rules: 2,
                changed: 2,
            }
        );
        let content = fs::read_to_string("work/src/package.xml")?;
        assert!(content.contains("<name>FlowDefinition</name>"));
        assert!(content.contains("<version>58.0</version>"));
        Ok(())
    }

    #[sealed_test]
    fn apply_is_idempotent() -> anyhow::Result<()> {
        fs::create_dir_all("work/src")?;
        fs::write("work/src/package.xml", "<Package><version>43.0</version></Package>")?;
        let plan: PatchPlan = indoc! {r#"
            [[rule]]
            kind = "ensure-section"
            manifest = "src/package.xml"
            type_name = "FlowDefinition"
            members = ["*"]

            [[rule]]
            kind = "set-version"
            manifest = "src/package.xml"
            version = "58.0"
        "#}
        .parse()?;
        let runner = Runner::new("work", false);

        runner.apply(&plan)?;
        let before = fs::read_to_string("work/src/package.xml")?;
        let summary = runner.apply(&plan)?;

        assert_eq!(
            summary,
            ApplySummary {
                rules: 2,
                changed: 0,
            }
        );
        assert_eq!(fs::read_to_string("work/src/package.xml")?, before);
        Ok(())
    }

    #[sealed_test]
    fn strict_runner_rejects_removing_missing_section() -> anyhow::Result<()> {
        fs::create_dir_all("work")?;
        fs::write("work/package.xml", "<Package><version>43.0</version></Package>")?;
        let plan: PatchPlan = indoc! {r#"
            [[rule]]
            kind = "remove-section"
            manifest = "package.xml"
            type_name = "Document"
        "#}
        .parse()?;

        let summary = Runner::new("work", false).apply(&plan)?;
        assert_eq!(
            summary,
            ApplySummary {
                rules: 1,
                changed: 0,
            }
        );

        let result = Runner::new("work", true).apply(&plan);
        assert!(matches!(result, Err(ApplyError::MissingSection { .. })));
        Ok(())
    }

    #[sealed_test]
    fn conform_rule_looks_up_installed_version() -> anyhow::Result<()> {
        fs::create_dir_all("work/src/installedPackages")?;
        fs::create_dir_all("work/src/classes")?;
        fs::write(
            "work/src/installedPackages/acme.installedPackage",
            "<InstalledPackage><versionNumber>2.4</versionNumber></InstalledPackage>",
        )?;
        fs::write(
            "work/src/classes/Foo.cls-meta.xml",
            indoc! {r#"
                <ApexClass>
                    <packageVersions>
                        <majorNumber>1</majorNumber>
                        <minorNumber>7</minorNumber>
                        <namespace>acme</namespace>
                    </packageVersions>
                </ApexClass>
            "#},
        )?;
        let plan: PatchPlan = indoc! {r#"
            [[rule]]
            kind = "conform"
            root = "src"
            prefix = "acme"
        "#}
        .parse()?;

        let summary = Runner::new("work", false).apply(&plan)?;

        assert_eq!(summary.changed, 1);
        let patched = fs::read_to_string("work/src/classes/Foo.cls-meta.xml")?;
        assert!(patched.contains("<majorNumber>2</majorNumber>"));
        assert!(patched.contains("<minorNumber>4</minorNumber>"));
        Ok(())
    }

    #[sealed_test]
    fn conform_rule_skips_missing_installed_package() -> anyhow::Result<()> {
        fs::create_dir_all("work/src")?;
        let plan: PatchPlan = indoc! {r#"
            [[rule]]
            kind = "conform"
            root = "src"
            prefix = "acme"
        "#}
        .parse()?;

        let summary = Runner::new("work", false).apply(&plan)?;

        assert_eq!(
            summary,
            ApplySummary {
                rules: 1,
                changed: 0,
            }
        );
        Ok(())
    }

    #[sealed_test]
    fn conform_rule_accepts_explicit_version() -> anyhow::Result<()> {
        fs::create_dir_all("work/src")?;
        fs::write(
            "work/src/Foo-meta.xml",
            indoc! {r#"
                <ApexClass>
                    <packageVersions>
                        <majorNumber>1</majorNumber>
                        <minorNumber>7</minorNumber>
                        <namespace>acme</namespace>
                    </packageVersions>
                </ApexClass>
            "#},
        )?;
        let plan: PatchPlan = indoc! {r#"
            [[rule]]
            kind = "conform"
            root = "src"
            prefix = "acme"
            version = "3.1"
        "#}
        .parse()?;

        let summary = Runner::new("work", false).apply(&plan)?;

        assert_eq!(summary.changed, 1);
        let patched = fs::read_to_string("work/src/Foo-meta.xml")?;
        assert!(patched.contains("<majorNumber>3</majorNumber>"));
        assert!(patched.contains("<minorNumber>1</minorNumber>"));
        Ok(())
    }

    #[sealed_test]
    fn conform_rule_rejects_bad_explicit_version() -> anyhow::Result<()> {
        fs::create_dir_all("work/src")?;
        let plan: PatchPlan = indoc! {r#"
            [[rule]]
            kind = "conform"
            root = "src"
            prefix = "acme"
            version = "3.1.4"
        "#}
        .parse()?;

        let result = Runner::new("work", false).apply(&plan);

        assert!(matches!(result, Err(ApplyError::BadRuleVersion(_))));
        Ok(())
    }

    #[sealed_test]
    fn prefix_swap_rule_renames_and_rewrites() -> anyhow::Result<()> {
        fs::create_dir_all("work/src/objects")?;
        fs::write(
            "work/src/objects/acme__Invoice__c.object",
            "<CustomObject><field>acme__Total__c</field></CustomObject>",
        )?;
        let plan: PatchPlan = indoc! {r#"
            [[rule]]
            kind = "prefix-swap"
            root = "src"
            old = "acme"
            new = "blah"
        "#}
        .parse()?;

        let summary = Runner::new("work", false).apply(&plan)?;

        assert_eq!(summary.changed, 1);
        assert_eq!(
            fs::read_to_string("work/src/objects/blah__Invoice__c.object")?,
            "<CustomObject><field>blah__Total__c</field></CustomObject>"
        );
        Ok(())
    }
}
