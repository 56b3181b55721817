// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Managed tree bootstrapping.
//!
//! A managed tree can start out in one of three ways:
//!
//! 1. __Fresh__: neither the dataset nor the public path exist yet.
//! 2. __Backend migration__: an existing childless dataset is adopted as the
//!    root clone without copying any data. The dataset is renamed aside, a
//!    managed root is created in its place, and the dataset is renamed back
//!    in as clone `00000000`.
//! 3. __Path migration__: an existing plain directory is renamed aside, a
//!    fresh tree is created at its path, and the directory content is copied
//!    into the root clone.
//!
//! Every precondition is checked before the first mutation. Once mutation
//! starts, nothing is rolled back automatically. A failed directory copy
//! leaves the original content at its temporary location, and the error
//! names that location.

use crate::{
    backend::{Backend, MOUNTPOINT},
    manager::{
        model::CloneId, path_str, Error, Manager, Result, Structural, CLONES_DIR,
        MANAGED_PROPERTY,
    },
};

use rand::{distr::Alphanumeric, Rng};
use std::{
    fs, io,
    os::unix::fs::symlink,
    path::{Path, PathBuf},
};
use tracing::{info, instrument, warn};
use walkdir::WalkDir;

const TEMP_SUFFIX_LEN: usize = 8;

/// Existing data to adopt into a new managed tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Migrate {
    /// Adopt an existing dataset as the root clone.
    Backend,

    /// Copy an existing directory into the root clone.
    Path,
}

impl<B> Manager<B>
where
    B: Backend,
{
    /// Initialize new managed tree.
    ///
    /// Temporary names needed during migration are drawn from the thread
    /// local generator.
    ///
    /// # Errors
    ///
    /// - Return any error of [`Manager::initialize_with`].
    pub fn initialize(
        backend: B,
        backend_id: &str,
        path: impl AsRef<Path>,
        migrate: Option<Migrate>,
    ) -> Result<Self> {
        Self::initialize_with(backend, backend_id, path, migrate, &mut rand::rng())
    }

    /// Initialize new managed tree, drawing temporary names from `rng`.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Structural`] if the starting condition does not match
    ///   `migrate`, e.g., the dataset exists but no migration was requested.
    /// - Return [`Error::Migrate`] if directory content could not be copied.
    /// - Return [`Error::MigrateAborted`] if the managed tree could not be set
    ///   up after the directory was moved aside.
    /// - Return [`Error::Io`] if the directory could not be renamed aside.
    /// - Return [`Error::Backend`] if a backend operation fails.
    #[instrument(skip(backend, path, rng), level = "debug")]
    pub fn initialize_with<R>(
        backend: B,
        backend_id: &str,
        path: impl AsRef<Path>,
        migrate: Option<Migrate>,
        rng: &mut R,
    ) -> Result<Self>
    where
        R: Rng + ?Sized,
    {
        let path = path.as_ref();
        let structural = |reason| Error::Structural {
            reason,
            dataset: backend_id.to_owned(),
        };

        path_str(path, backend_id)?;
        if !path.is_absolute() {
            return Err(structural(Structural::InvalidManagedPath(path.to_path_buf())));
        }

        let dataset_exists = backend.exists(backend_id)?;
        let path_exists = path.try_exists().map_err(|source| Error::Io {
            source,
            path: path.to_path_buf(),
        })?;

        match migrate {
            None => {
                if dataset_exists {
                    return Err(structural(Structural::DatasetExists));
                }
                if path_exists {
                    return Err(structural(Structural::PathExists(path.to_path_buf())));
                }

                create_tree(&backend, backend_id, path)?;
            }
            Some(Migrate::Backend) => {
                if !dataset_exists {
                    return Err(structural(Structural::MissingDataset));
                }
                let (parent, _) = backend_id
                    .rsplit_once('/')
                    .ok_or_else(|| structural(Structural::TopLevelDataset))?;
                if backend
                    .find_local_property(MANAGED_PROPERTY)?
                    .iter()
                    .any(|(name, _)| name == backend_id)
                {
                    return Err(structural(Structural::AlreadyManaged));
                }
                if backend.list(Some(backend_id), &[], true)?.len() > 1 {
                    return Err(structural(Structural::HasChildren));
                }

                let temp = format!("{parent}/zcm-{}", temp_suffix(rng));
                adopt_dataset(&backend, backend_id, &temp, path)?;
            }
            Some(Migrate::Path) => {
                if dataset_exists {
                    return Err(structural(Structural::DatasetExists));
                }
                if path_exists && !path.is_dir() {
                    return Err(structural(Structural::PathExists(path.to_path_buf())));
                }

                let temp = path_exists.then(|| temp_path(path, rng)).transpose()?;
                adopt_directory(&backend, backend_id, path, temp)?;
            }
        }

        info!("initialized clone manager {backend_id} at {}", path.display());
        Self::open(backend, backend_id)
    }
}

fn create_tree(backend: &impl Backend, backend_id: &str, path: &Path) -> Result<()> {
    let public_path = path_str(path, backend_id)?;
    let clones_dir = path.join(CLONES_DIR);
    let root_clone = format!("{backend_id}/{}", CloneId::ROOT);

    backend.create(
        backend_id,
        None,
        &[(MANAGED_PROPERTY, public_path), (MOUNTPOINT, "none")],
    )?;
    info!("created managed root {backend_id}");

    backend.create(&root_clone, Some(path), &[])?;
    info!("created root clone {root_clone}");

    backend.set_property(backend_id, MOUNTPOINT, path_str(&clones_dir, backend_id)?)?;
    ensure_mounted(backend, backend_id)
}

fn adopt_dataset(
    backend: &impl Backend,
    backend_id: &str,
    temp: &str,
    path: &Path,
) -> Result<()> {
    let root_clone = format!("{backend_id}/{}", CloneId::ROOT);

    backend.rename(backend_id, temp)?;
    info!("renamed {backend_id} to {temp}");

    backend.create(
        backend_id,
        Some(&path.join(CLONES_DIR)),
        &[(MANAGED_PROPERTY, path_str(path, backend_id)?)],
    )?;
    info!("created managed root {backend_id}");

    if is_mounted(backend, backend_id)? {
        backend.unmount(backend_id)?;
    }

    backend.rename(temp, &root_clone)?;
    info!("renamed {temp} to {root_clone}");

    backend.set_property(&root_clone, MOUNTPOINT, path_str(path, backend_id)?)?;
    ensure_mounted(backend, &root_clone)?;
    ensure_mounted(backend, backend_id)
}

fn adopt_directory(
    backend: &impl Backend,
    backend_id: &str,
    path: &Path,
    temp: Option<PathBuf>,
) -> Result<()> {
    let Some(temp) = temp else {
        return create_tree(backend, backend_id, path);
    };

    fs::rename(path, &temp).map_err(|source| Error::Io {
        source,
        path: path.to_path_buf(),
    })?;
    info!("moved {} aside to {}", path.display(), temp.display());

    create_tree(backend, backend_id, path).map_err(|error| Error::MigrateAborted {
        source: Box::new(error),
        temp_path: temp.clone(),
    })?;

    copy_tree(&temp, path).map_err(|source| Error::Migrate {
        source,
        temp_path: temp.clone(),
    })?;
    info!("copied content of {} into root clone", temp.display());

    if let Err(error) = fs::remove_dir_all(&temp) {
        warn!("cannot remove {}: {error}", temp.display());
    }

    Ok(())
}

fn is_mounted(backend: &impl Backend, dataset: &str) -> Result<bool> {
    Ok(backend
        .list(Some(dataset), &[], false)?
        .first()
        .is_some_and(|info| info.mounted))
}

fn ensure_mounted(backend: &impl Backend, dataset: &str) -> Result<()> {
    if !is_mounted(backend, dataset)? {
        backend.mount(dataset)?;
        info!("mounted {dataset}");
    }

    Ok(())
}

fn temp_suffix<R>(rng: &mut R) -> String
where
    R: Rng + ?Sized,
{
    (0..TEMP_SUFFIX_LEN)
        .map(|_| char::from(rng.sample(Alphanumeric)).to_ascii_lowercase())
        .collect()
}

fn temp_path<R>(path: &Path, rng: &mut R) -> Result<PathBuf>
where
    R: Rng + ?Sized,
{
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| Error::Io {
            source: io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"),
            path: path.to_path_buf(),
        })?;

    Ok(path.with_file_name(format!(".{name}.zcm-{}", temp_suffix(rng))))
}

/// Copy directory content recursively, recreating symlinks as symlinks.
///
/// The target directory must already exist. Directory permissions are
/// applied last so that read-only directories can still be filled.
pub(crate) fn copy_tree(from: &Path, to: &Path) -> io::Result<()> {
    fs::create_dir_all(to)?;
    let mut directories = Vec::new();

    for entry in WalkDir::new(from).min_depth(1).follow_links(false) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(from).map_err(io::Error::other)?;
        let target = to.join(relative);
        let file_type = entry.file_type();

        if file_type.is_symlink() {
            symlink(fs::read_link(entry.path())?, &target)?;
        } else if file_type.is_dir() {
            fs::create_dir(&target)?;
            directories.push((target, entry.metadata()?.permissions()));
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }

    for (directory, permissions) in directories.into_iter().rev() {
        fs::set_permissions(directory, permissions)?;
    }

    Ok(())
}
