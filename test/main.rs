// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

mod integration;

use anyhow::Result;
use simple_txtar::Archive;
use std::{
    fs::{create_dir_all, read_to_string, write},
    path::{Path, PathBuf},
};

pub(crate) struct ProjectFixture {
    root: PathBuf,
}

impl ProjectFixture {
    pub(crate) fn new(root: impl Into<PathBuf>, archive: impl AsRef<str>) -> Result<Self> {
        let root = root.into();
        let archive = Archive::from(archive.as_ref());

        // INVARIANT: Parent directories must exist before any file write.
        for file in archive.iter() {
            let path = root.join(&file.name);
            if let Some(parent) = path.parent() {
                create_dir_all(parent)?;
            }
            write(&path, &file.content)?;
        }

        Ok(Self { root })
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn path(&self, name: impl AsRef<Path>) -> PathBuf {
        self.root.join(name.as_ref())
    }

    pub(crate) fn read(&self, name: impl AsRef<Path>) -> Result<String> {
        Ok(read_to_string(self.root.join(name.as_ref()))?)
    }
}
