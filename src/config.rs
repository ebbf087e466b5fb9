// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Patch plan layout.
//!
//! Specify the layout for the TOML patch plans that Mdpatch applies, to
//! simplify the process of serialization and deserialization. File I/O is
//! left to the caller to figure out.

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::PathBuf,
    str::FromStr,
};

/// Patch plan layout.
///
/// A patch plan gathers the individual patch rules a deployment needs
/// into one reviewable file, so the whole sequence can be applied with a
/// single command instead of a shell script full of one-off invocations.
///
/// # General Layout
///
/// A plan is an optional description followed by any number of
/// `[[rule]]` tables. Every rule names its kind plus whatever arguments
/// that kind takes. Rules apply in the order they are written, and since
/// every rule is idempotent the whole plan is too.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct PatchPlan {
    /// Brief description of what the plan prepares.
    pub description: Option<String>,

    /// Ordered rule listing to apply.
    #[serde(rename = "rule")]
    pub rules: Option<Vec<PlanRule>>,
}

impl FromStr for PatchPlan {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut plan: PatchPlan = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every rule path field.
        if let Some(rules) = plan.rules.as_mut() {
            for rule in rules {
                match rule {
                    PlanRule::EnsureSection { manifest, .. }
                    | PlanRule::RemoveSection { manifest, .. }
                    | PlanRule::SetVersion { manifest, .. } => expand_field(manifest)?,
                    PlanRule::StripElements { file, .. } => expand_field(file)?,
                    PlanRule::Conform { root, .. }
                    | PlanRule::PrefixSwap { root, .. }
                    | PlanRule::Replace { root, .. } => expand_field(root)?,
                }
            }
        }

        Ok(plan)
    }
}

impl Display for PatchPlan {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// One rule of a patch plan.
///
/// Paths in rules may use `~` and environment variables, and relative
/// paths resolve against the plan runner's home directory.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PlanRule {
    /// Guarantee that a manifest declares a component type.
    EnsureSection {
        /// Manifest file to patch.
        manifest: PathBuf,

        /// Component type the section must declare.
        type_name: String,

        /// Member listing for a freshly inserted section.
        members: Vec<String>,
    },

    /// Guarantee that a manifest does not declare a component type.
    RemoveSection {
        /// Manifest file to patch.
        manifest: PathBuf,

        /// Component type the section must not declare.
        type_name: String,
    },

    /// Pin a manifest's API version.
    SetVersion {
        /// Manifest file to patch.
        manifest: PathBuf,

        /// Dotted major.minor version value.
        version: String,
    },

    /// Remove every block of one element from a metadata document.
    StripElements {
        /// Metadata document to patch.
        file: PathBuf,

        /// Element whose blocks get removed.
        element: String,
    },

    /// Conform package version blocks to the installed package version.
    Conform {
        /// Directory tree holding the metadata documents.
        root: PathBuf,

        /// Namespace prefix of the package to conform against.
        prefix: String,

        /// File name pattern to sweep, `*-meta.xml` when omitted.
        pattern: Option<String>,

        /// Explicit target version, looked up from the installed package
        /// document under `root` when omitted.
        version: Option<String>,
    },

    /// Swap a namespace prefix across a directory tree.
    PrefixSwap {
        /// Directory tree holding the metadata documents.
        root: PathBuf,

        /// Namespace prefix to retire.
        old: String,

        /// Namespace prefix to adopt.
        new: String,
    },

    /// Replace literal text across a directory tree.
    Replace {
        /// Directory tree holding the files to sweep.
        root: PathBuf,

        /// File name pattern to sweep, every file when omitted.
        pattern: Option<String>,

        /// Replacement listing to apply to each file.
        #[serde(rename = "swap")]
        swaps: Vec<Swap>,
    },
}

/// One literal text replacement.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Swap {
    /// Literal text to search for.
    pub from: String,

    /// Literal text to put in its place.
    pub to: String,
}

impl Swap {
    /// Construct new swap pair.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

fn expand_field(path: &mut PathBuf) -> Result<()> {
    *path = PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    );

    Ok(())
}

/// Configuration error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
