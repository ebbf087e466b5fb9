// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Paths handed over on the command line may use `~` and environment
//! variables the way a shell would accept them, so they get expanded
//! here before any file I/O sees them.

use std::path::PathBuf;

/// Expand `~` and environment variables in a user-supplied path.
///
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`ExpandError`] if the path names an environment variable
///   that is not set.
pub fn expand(input: impl AsRef<str>) -> Result<PathBuf> {
    let expanded = shellexpand::full(input.as_ref()).map_err(ExpandError)?;
    Ok(PathBuf::from(expanded.into_owned()))
}

/// Shell expansion failed for a user-supplied path.
#[derive(Clone, Debug, thiserror::Error)]
#[error(transparent)]
pub struct ExpandError(#[from] shellexpand::LookupError<std::env::VarError>);

/// Friendly result alias :3
pub type Result<T, E = ExpandError> = std::result::Result<T, E>;
