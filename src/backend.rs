// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Copy-on-write storage backend.
//!
//! The clone manager never touches raw storage itself. Everything it does to
//! disk goes through a __backend__, i.e., a tree of datasets that can be
//! snapshotted, cloned from snapshots, promoted, renamed, destroyed, and
//! mounted. ZFS is the reference backend.
//!
//! # Dataset Naming
//!
//! Datasets are addressed by slash separated names in the backend's own
//! namespace, e.g., `rpool/home`. Snapshots are addressed by the name of the
//! dataset they belong to, followed by `@` and the snapshot name, e.g.,
//! `rpool/home@00000001`.
//!
//! # See Also
//!
//! - [`zfs`]
//! - [`memory`]

pub mod memory;
pub mod zfs;

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

/// Property that holds the mountpoint of a dataset.
pub const MOUNTPOINT: &str = "mountpoint";

/// One row of a dataset listing.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DatasetInfo {
    /// Full dataset name.
    pub name: String,

    /// Snapshot this dataset was cloned from, if any.
    pub origin: Option<String>,

    /// Effective mountpoint, absent for "none" or "legacy".
    pub mountpoint: Option<PathBuf>,

    /// Whether the dataset is currently mounted.
    pub mounted: bool,

    /// Creation time in seconds since the Unix epoch.
    pub created_at: i64,

    /// Space consumed by the dataset and its descendants.
    pub used_bytes: u64,

    /// Requested user properties that carry a value.
    pub properties: BTreeMap<String, String>,
}

impl DatasetInfo {
    /// Value of a requested user property.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

/// Primitive operations on a copy-on-write dataset tree.
///
/// Every primitive is synchronous and blocking. Implementations must list
/// datasets in name order, since callers derive creation order from it.
pub trait Backend {
    /// List datasets.
    ///
    /// With `root` set, list that dataset first followed by its descendants
    /// when `recursive` is true. Without `root`, list every dataset known to
    /// the backend. User properties named in `properties` are fetched along
    /// the standard columns.
    fn list(
        &self,
        root: Option<&str>,
        properties: &[&str],
        recursive: bool,
    ) -> Result<Vec<DatasetInfo>>;

    /// List every dataset that has a locally set value for a user property.
    fn find_local_property(&self, key: &str) -> Result<Vec<(String, String)>>;

    /// Check whether a dataset exists.
    fn exists(&self, name: &str) -> Result<bool>;

    /// Create a new dataset.
    fn create(
        &self,
        name: &str,
        mountpoint: Option<&Path>,
        properties: &[(&str, &str)],
    ) -> Result<()>;

    /// Snapshot a dataset, returning the full snapshot name.
    fn snapshot(&self, dataset: &str, snapshot: &str) -> Result<String>;

    /// Create a writable dataset from a snapshot.
    fn clone_snapshot(&self, snapshot: &str, name: &str) -> Result<()>;

    /// Destroy a dataset or snapshot.
    fn destroy(&self, name: &str, recursive: bool) -> Result<()>;

    /// Rename a dataset.
    fn rename(&self, from: &str, to: &str) -> Result<()>;

    /// Promote a clone so that it owns the blocks of its origin.
    fn promote(&self, dataset: &str) -> Result<()>;

    /// Set a property locally.
    fn set_property(&self, dataset: &str, key: &str, value: &str) -> Result<()>;

    /// Clear a locally set property, falling back to the inherited value.
    fn inherit_property(&self, dataset: &str, key: &str) -> Result<()>;

    /// Mount a dataset at its mountpoint.
    fn mount(&self, dataset: &str) -> Result<()>;

    /// Unmount a dataset.
    fn unmount(&self, dataset: &str) -> Result<()>;
}

impl<B> Backend for &B
where
    B: Backend + ?Sized,
{
    fn list(
        &self,
        root: Option<&str>,
        properties: &[&str],
        recursive: bool,
    ) -> Result<Vec<DatasetInfo>> {
        (**self).list(root, properties, recursive)
    }

    fn find_local_property(&self, key: &str) -> Result<Vec<(String, String)>> {
        (**self).find_local_property(key)
    }

    fn exists(&self, name: &str) -> Result<bool> {
        (**self).exists(name)
    }

    fn create(
        &self,
        name: &str,
        mountpoint: Option<&Path>,
        properties: &[(&str, &str)],
    ) -> Result<()> {
        (**self).create(name, mountpoint, properties)
    }

    fn snapshot(&self, dataset: &str, snapshot: &str) -> Result<String> {
        (**self).snapshot(dataset, snapshot)
    }

    fn clone_snapshot(&self, snapshot: &str, name: &str) -> Result<()> {
        (**self).clone_snapshot(snapshot, name)
    }

    fn destroy(&self, name: &str, recursive: bool) -> Result<()> {
        (**self).destroy(name, recursive)
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        (**self).rename(from, to)
    }

    fn promote(&self, dataset: &str) -> Result<()> {
        (**self).promote(dataset)
    }

    fn set_property(&self, dataset: &str, key: &str, value: &str) -> Result<()> {
        (**self).set_property(dataset, key, value)
    }

    fn inherit_property(&self, dataset: &str, key: &str) -> Result<()> {
        (**self).inherit_property(dataset, key)
    }

    fn mount(&self, dataset: &str) -> Result<()> {
        (**self).mount(dataset)
    }

    fn unmount(&self, dataset: &str) -> Result<()> {
        (**self).unmount(dataset)
    }
}

/// Backend error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Backend command could not be spawned.
    #[error("failed to run {command:?}")]
    Spawn {
        #[source]
        source: std::io::Error,
        command: String,
    },

    /// Backend command exited unsuccessfully.
    #[error("command {command:?} failed: {message}")]
    Command { command: String, message: String },

    /// Backend output could not be understood.
    #[error("cannot parse backend output line {line:?}")]
    Parse { line: String },

    /// Dataset or snapshot does not exist.
    #[error("{0:?} does not exist")]
    NotFound(String),

    /// Dataset or snapshot already exists.
    #[error("{0:?} already exists")]
    Exists(String),

    /// Dataset is in use and cannot be unmounted.
    #[error("{0:?} is busy")]
    Busy(String),

    /// Snapshot still has clones depending on it.
    #[error("{0:?} has dependent clones")]
    HasDependents(String),

    /// Dataset still has children or snapshots.
    #[error("{0:?} has children")]
    HasChildren(String),

    /// Dataset is not mounted.
    #[error("{0:?} is not mounted")]
    NotMounted(String),

    /// Dataset is already mounted.
    #[error("{0:?} is already mounted")]
    AlreadyMounted(String),

    /// Operation makes no sense for the given dataset.
    #[error("invalid operation on {name:?}: {reason}")]
    Invalid { name: String, reason: String },
}

/// Friendly result alias :3
pub type Result<T, E = Error> = std::result::Result<T, E>;
