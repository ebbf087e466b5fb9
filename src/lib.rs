// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Mdpatch rewrites Salesforce deployment metadata in place.
//!
//! A metadata deployment is driven by a manifest, conventionally named
//! `package.xml`, that declares which component types ship. Target
//! environments differ in what they need declared, and hand-editing the
//! same handful of fixes into every retrieved checkout is the kind of
//! chore that silently goes wrong. Mdpatch turns those fixes into patch
//! rules. Every rule states an outcome instead of an action, so applying
//! a rule twice changes nothing the second time, and a document the rule
//! cannot safely edit is reported without being modified.
//!
//! The crate splits along how much of a source tree an operation sees:
//!
//! - [`manifest`] models the manifest and splices sections in and out.
//! - [`metadata`] patches sibling documents like object definitions.
//! - [`patch`] binds those operations to files with atomic rewrites.
//! - [`sweep`] applies brute-force patches across whole directory trees.
//! - [`config`] lays out the TOML patch plan format.
//! - [`apply`] runs a plan's rules in order.
//! - [`path`] expands user-supplied paths.

pub mod apply;
pub mod config;
pub mod manifest;
pub mod metadata;
pub mod patch;
pub mod path;
pub mod sweep;
