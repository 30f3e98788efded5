//! The local, authoritative set of patch files.
//!
//! The catalog is loaded once per run from an explicit directory and is
//! read-only afterwards; every reconciliation borrows entries from it.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::types::{IdentityError, PackageIdentity, PatchFile};

/// Errors from loading the local catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read patch catalog at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid patch file in catalog: {0}")]
    InvalidFileName(#[from] IdentityError),

    #[error("patch catalog contains two patches for package '{name}': {first} and {second}")]
    DuplicatePackage {
        name: String,
        first: String,
        second: String,
    },
}

/// Patches loaded from the source-of-truth directory, in file-name order.
#[derive(Debug, Clone, Default)]
pub struct PatchCatalog {
    patches: Vec<PatchFile>,
}

impl PatchCatalog {
    /// Loads every patch in `dir`.
    ///
    /// `remote_dir` is the directory the patches live in inside target
    /// repositories; it prefixes each patch's canonical path. Dot-files are
    /// ignored. Any other file whose name does not parse is an error.
    pub fn load(dir: &Path, remote_dir: &str) -> Result<Self, CatalogError> {
        let io_err = |source| CatalogError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut files = Vec::new();
        for entry in fs::read_dir(dir).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            if !entry.file_type().map_err(io_err)?.is_file() {
                continue;
            }
            let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
                tracing::warn!(path = %entry.path().display(), "Skipping non UTF-8 file name");
                continue;
            };
            if file_name.starts_with('.') {
                continue;
            }
            files.push((file_name, entry.path()));
        }
        files.sort();

        let mut patches = Vec::with_capacity(files.len());
        for (file_name, path) in files {
            let identity = PackageIdentity::parse_file_name(&file_name)?;
            let content = fs::read(&path).map_err(|source| CatalogError::Io {
                path: path.clone(),
                source,
            })?;
            patches.push(PatchFile {
                canonical_path: canonical_path(remote_dir, &file_name),
                identity,
                file_name,
                content,
            });
        }

        Self::from_patches(patches)
    }

    /// Builds a catalog from already-loaded patches.
    ///
    /// Two patches for the same package at different versions would fight over
    /// the same branch, so they are rejected.
    pub fn from_patches(patches: Vec<PatchFile>) -> Result<Self, CatalogError> {
        for (i, patch) in patches.iter().enumerate() {
            if let Some(other) = patches
                .iter()
                .skip(i + 1)
                .find(|p| p.identity.name == patch.identity.name)
            {
                return Err(CatalogError::DuplicatePackage {
                    name: patch.identity.name.clone(),
                    first: patch.file_name.clone(),
                    second: other.file_name.clone(),
                });
            }
        }
        Ok(PatchCatalog { patches })
    }

    pub fn patches(&self) -> &[PatchFile] {
        &self.patches
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    /// Looks up a patch by package identity or display name.
    pub fn find(&self, package: &str) -> Option<&PatchFile> {
        self.patches.iter().find(|p| p.identity.is_named(package))
    }
}

/// Joins the remote patch directory and a file name into a repository path.
pub fn canonical_path(remote_dir: &str, file_name: &str) -> String {
    let dir = remote_dir.trim_matches('/');
    if dir.is_empty() {
        file_name.to_string()
    } else {
        format!("{dir}/{file_name}")
    }
}
