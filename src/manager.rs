// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Clone manager.
//!
//! A __clone manager__ keeps an ordered chain of copy-on-write clones of a
//! working directory, and makes exactly one of them visible at a public path.
//! Clones are cheap because they share unchanged blocks with the snapshot
//! they were cloned from, which is also why a clone cannot simply be deleted
//! while other clones still depend on its snapshots.
//!
//! # Managed Tree Layout
//!
//! Every manager owns one __managed root__ dataset in the backend. The root
//! carries the [`MANAGED_PROPERTY`] user property, whose value is the public
//! path, and is mounted at the hidden `.clones` directory inside the public
//! path. Each clone is a direct child of the root named after its
//! [`CloneId`]:
//!
//! ```text
//! rpool/t             zcm:path=/tmp/t  mountpoint=/tmp/t/.clones
//! rpool/t/00000000                     mountpoint=/tmp/t/.clones/00000000
//! rpool/t/00000001                     mountpoint=/tmp/t
//! ```
//!
//! The clone mounted at the public path is the __active clone__. The snapshot
//! that seeds a new clone is taken from the active clone and named after the
//! new clone, e.g., `rpool/t/00000001@00000002` seeds `rpool/t/00000002`.
//!
//! # State
//!
//! Nothing is cached across mutations. Every mutating operation ends by
//! reloading the full state from the backend, whether it succeeded or not, so
//! the model always reflects what is actually on disk.
//!
//! # See Also
//!
//! 1. [`bootstrap`]
//! 2. [`retention`]
//! 3. [`mount`]

pub mod bootstrap;
pub mod model;
pub mod mount;
pub mod retention;

use crate::{
    backend::{self, Backend, DatasetInfo, MOUNTPOINT},
    manager::{
        model::{CloneEntry, CloneId},
        mount::UnmountedTree,
        retention::{CloneCounts, Limit, RetentionPolicy},
    },
};

use std::{
    fs,
    io,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// User property that marks a dataset as a managed root.
pub const MANAGED_PROPERTY: &str = "zcm:path";

/// Directory inside the public path where the managed root is mounted.
pub const CLONES_DIR: &str = ".clones";

/// Where the manager is in its load/mutate cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// State mirrors the backend.
    Loaded,

    /// A mutation started and the state has not been reloaded since.
    Mutating,
}

/// Handle on one managed tree.
#[derive(Debug)]
pub struct Manager<B>
where
    B: Backend,
{
    backend: B,
    backend_id: String,
    public_path: PathBuf,
    clones: Vec<CloneEntry>,
    active: Option<usize>,
    root_mounted: bool,
    next_id: Option<CloneId>,
    size: u64,
    phase: Phase,
}

impl<B> Manager<B>
where
    B: Backend,
{
    /// Open existing manager.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Structural`] if dataset is not a valid manager.
    /// - Return [`Error::Backend`] if backend cannot be queried.
    #[instrument(skip(backend), level = "debug")]
    pub fn open(backend: B, backend_id: impl Into<String> + std::fmt::Debug) -> Result<Self> {
        let backend_id = backend_id.into();
        if !backend.exists(&backend_id)? {
            return Err(Error::Structural {
                reason: Structural::NotManaged,
                dataset: backend_id,
            });
        }

        let mut manager = Self {
            backend,
            backend_id,
            public_path: PathBuf::new(),
            clones: Vec::new(),
            active: None,
            root_mounted: false,
            next_id: Some(CloneId::ROOT),
            size: 0,
            phase: Phase::Mutating,
        };
        manager.load()?;

        Ok(manager)
    }

    /// Rebuild state from the backend.
    ///
    /// Has no side effects on the backend, so it is always safe to call to
    /// pick up external changes.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Structural`] if the managed root lacks a valid
    ///   managed path, a child is not named after a clone id, or more than one
    ///   clone is mounted at the public path.
    /// - Return [`Error::Backend`] if backend cannot be queried.
    #[instrument(skip(self), fields(manager = %self.backend_id), level = "debug")]
    pub fn load(&mut self) -> Result<()> {
        let listing = self
            .backend
            .list(Some(&self.backend_id), &[MANAGED_PROPERTY], true)?;
        let mut datasets = listing.into_iter();

        let root = datasets
            .next()
            .filter(|root| root.name == self.backend_id)
            .ok_or_else(|| self.structural(Structural::NotManaged))?;
        let public_path = root
            .property(MANAGED_PROPERTY)
            .ok_or_else(|| self.structural(Structural::NotManaged))?;
        let public_path = PathBuf::from(public_path);
        if !public_path.is_absolute() {
            return Err(self.structural(Structural::InvalidManagedPath(public_path)));
        }

        let clones = datasets
            .map(|dataset| parse_clone(&self.backend_id, dataset))
            .collect::<Result<Vec<_>>>()?;

        let mut active = clones
            .iter()
            .enumerate()
            .filter(|(_, clone)| clone.mountpoint.as_deref() == Some(public_path.as_path()))
            .map(|(index, _)| index);
        let active_index = active.next();
        if active.next().is_some() {
            return Err(self.structural(Structural::MultipleActive));
        }

        let next_id = match clones.iter().map(|clone| clone.id).max() {
            Some(max) => max.next(),
            None => Some(CloneId::ROOT),
        };

        debug!(
            "loaded {} clones, active {:?}",
            clones.len(),
            active_index.map(|index| clones[index].id)
        );

        self.public_path = public_path;
        self.clones = clones;
        self.active = active_index;
        self.root_mounted = root.mounted;
        self.next_id = next_id;
        self.size = root.used_bytes;
        self.phase = Phase::Loaded;

        Ok(())
    }

    /// Backend this manager operates on.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Name of the managed root dataset.
    pub fn backend_id(&self) -> &str {
        &self.backend_id
    }

    /// Path where the active clone is mounted.
    pub fn public_path(&self) -> &Path {
        &self.public_path
    }

    /// All clones in creation order.
    pub fn clones(&self) -> &[CloneEntry] {
        &self.clones
    }

    /// Clone mounted at the public path.
    pub fn active_clone(&self) -> Option<&CloneEntry> {
        self.active.map(|index| &self.clones[index])
    }

    /// Clones created before the active clone.
    pub fn older_clones(&self) -> &[CloneEntry] {
        match self.active {
            Some(index) => &self.clones[..index],
            None => &[],
        }
    }

    /// Clones created after the active clone.
    ///
    /// Without an active clone, every clone counts as newer.
    pub fn newer_clones(&self) -> &[CloneEntry] {
        match self.active {
            Some(index) => &self.clones[index + 1..],
            None => &self.clones,
        }
    }

    /// Identifier the next clone will get.
    pub fn next_id(&self) -> Option<CloneId> {
        self.next_id
    }

    /// Space used by the whole managed tree.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Current phase of the load/mutate cycle.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Find clone by identifier.
    pub fn clone_by_id(&self, id: CloneId) -> Option<&CloneEntry> {
        self.clones.iter().find(|clone| clone.id == id)
    }

    /// Snapshot the active clone and create a new clone from it.
    ///
    /// Unless `auto_remove` is set, the newer and total caps of the policy
    /// are checked before anything is touched. With `auto_remove` set, the
    /// full policy is enforced by eviction once the clone exists.
    ///
    /// # Errors
    ///
    /// - Return [`Error::PolicyViolation`] if a cap would be exceeded.
    /// - Return [`Error::Structural`] if there is no active clone, or the
    ///   clone id space is exhausted.
    /// - Return [`Error::Backend`] if a backend operation fails.
    #[instrument(skip(self), fields(manager = %self.backend_id), level = "debug")]
    pub fn create_clone(
        &mut self,
        policy: RetentionPolicy,
        auto_remove: bool,
    ) -> Result<CloneEntry> {
        let active = self
            .active_clone()
            .cloned()
            .ok_or_else(|| self.structural(Structural::NoActiveClone))?;

        if !auto_remove {
            let preflight = RetentionPolicy {
                max_older: None,
                ..policy
            };
            preflight.check(CloneCounts {
                older: self.older_clones().len(),
                newer: self.newer_clones().len() + 1,
                total: self.clones.len() + 1,
            })?;
        }

        let id = self
            .next_id
            .ok_or_else(|| self.structural(Structural::IdSpaceExhausted))?;
        self.mutate(|manager| {
            let snapshot = manager
                .backend
                .snapshot(&active.backend_id, &id.to_string())?;
            info!("snapshot {snapshot}");

            let dataset = manager.clone_name(id);
            manager.backend.clone_snapshot(&snapshot, &dataset)?;
            info!("clone {snapshot} into {dataset}");

            Ok(())
        })?;

        let created = self
            .clone_by_id(id)
            .cloned()
            .ok_or_else(|| self.structural(Structural::UnknownClone(id)))?;

        if auto_remove && !policy.is_unbounded() {
            self.auto_remove(policy)?;
        }

        Ok(created)
    }

    /// Make a clone the active clone.
    ///
    /// Unmounts the whole tree, moves the public mountpoint from the current
    /// active clone to the target, then mounts everything again. If any
    /// dataset refuses to unmount, the tree is mounted again unchanged.
    ///
    /// # Errors
    ///
    /// - Return [`Error::AlreadyActive`] if the clone is already active.
    /// - Return [`Error::PolicyViolation`] if a cap would be exceeded.
    /// - Return [`Error::Busy`] if any dataset refused to unmount.
    /// - Return [`Error::Remount`] if any dataset failed to mount afterwards.
    /// - Return [`Error::Structural`] if the clone does not exist.
    /// - Return [`Error::Backend`] if a backend operation fails.
    #[instrument(skip(self), fields(manager = %self.backend_id), level = "debug")]
    pub fn activate(
        &mut self,
        id: CloneId,
        policy: RetentionPolicy,
        auto_remove: bool,
    ) -> Result<()> {
        let index = self.index_of(id)?;
        if self.active == Some(index) {
            return Err(Error::AlreadyActive(id));
        }

        if !auto_remove {
            policy.check(CloneCounts {
                older: index,
                newer: self.clones.len() - index - 1,
                total: self.clones.len(),
            })?;
        }

        let target = self.clones[index].clone();
        let previous = self.active_clone().cloned();
        self.mutate(|manager| manager.swap_active(&target, previous.as_ref()))?;
        info!("activated clone {id}");

        if auto_remove && !policy.is_unbounded() {
            self.auto_remove(policy)?;
        }

        Ok(())
    }

    /// Remove a clone.
    ///
    /// If other clones depend on snapshots of the target, the one on the
    /// newest snapshot is promoted first, so that it takes over the blocks
    /// they share. The snapshot that becomes unreferenced is destroyed along with
    /// the clone.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Structural`] if the clone does not exist or is active.
    /// - Return [`Error::Backend`] if a backend operation fails.
    #[instrument(skip(self), fields(manager = %self.backend_id), level = "debug")]
    pub fn remove(&mut self, id: CloneId) -> Result<()> {
        let index = self.index_of(id)?;
        if self.active == Some(index) {
            return Err(self.structural(Structural::CloneIsActive(id)));
        }

        // INVARIANT: Promotion only moves snapshots up to the promoted clone's
        // origin, so the dependent on the newest snapshot must be the one
        // promoted for the target to end up without snapshots.
        let target = self.clones[index].clone();
        let promoted = self
            .clones
            .iter()
            .filter(|clone| clone.origin_id == Some(id))
            .max_by_key(|clone| origin_snapshot_id(clone))
            .cloned();

        self.mutate(|manager| {
            if let Some(dependent) = &promoted {
                info!("promote {} before removing {id}", dependent.backend_id);
                manager.backend.promote(&dependent.backend_id)?;
            }

            manager.backend.destroy(&target.backend_id, false)?;
            info!("destroyed {}", target.backend_id);

            // INVARIANT: Promotion hands the target's own origin to the dependent,
            // leaving the dependent's seed snapshot as the one nobody needs.
            let stale = match &promoted {
                Some(dependent) => dependent
                    .origin
                    .as_deref()
                    .and_then(|origin| origin.split_once('@'))
                    .map(|(_, name)| format!("{}@{name}", dependent.backend_id)),
                None => target.origin.clone().filter(|_| target.origin_id.is_some()),
            };
            if let Some(snapshot) = stale {
                manager.backend.destroy(&snapshot, false)?;
                info!("destroyed {snapshot}");
            }

            Ok(())
        })
    }

    /// Evict clones until the policy holds.
    ///
    /// Older clones beyond `max_older` are evicted oldest first, then newer
    /// clones beyond `max_newer`, oldest first. While the total exceeds
    /// `max_total`, the oldest older clone goes, falling back to the oldest
    /// newer clone. Counts are recomputed after every removal.
    ///
    /// Returns identifiers of removed clones in removal order.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Structural`] if only the active clone is left but the
    ///   total cap is still exceeded.
    /// - Return any error of [`Manager::remove`].
    #[instrument(skip(self), fields(manager = %self.backend_id), level = "debug")]
    pub fn auto_remove(&mut self, policy: RetentionPolicy) -> Result<Vec<CloneId>> {
        let mut removed = Vec::new();

        if let Some(max) = policy.max_older {
            while self.older_clones().len() > max {
                let id = self.older_clones()[0].id;
                self.remove(id)?;
                removed.push(id);
            }
        }

        if let Some(max) = policy.max_newer {
            while self.newer_clones().len() > max {
                let id = self.newer_clones()[0].id;
                self.remove(id)?;
                removed.push(id);
            }
        }

        if let Some(max) = policy.max_total {
            while self.clones.len() > max {
                let id = self
                    .older_clones()
                    .first()
                    .or_else(|| self.newer_clones().first())
                    .map(|clone| clone.id)
                    .ok_or_else(|| self.structural(Structural::NothingToEvict))?;
                self.remove(id)?;
                removed.push(id);
            }
        }

        if !removed.is_empty() {
            info!("evicted {} clones", removed.len());
        }

        Ok(removed)
    }

    /// Mount the whole tree.
    ///
    /// Mounts the active clone, the managed root, then every other clone,
    /// skipping datasets that are already mounted.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Remount`] naming every dataset that failed to mount.
    #[instrument(skip(self), fields(manager = %self.backend_id), level = "debug")]
    pub fn mount(&mut self) -> Result<()> {
        self.mutate(|manager| {
            let active = manager.active_clone().filter(|clone| !clone.mounted);
            let root = (!manager.root_mounted).then_some(manager.backend_id.as_str());
            let others = manager
                .clones
                .iter()
                .filter(|clone| !clone.mounted && Some(clone.id) != active.map(|a| a.id));

            let order = active
                .map(|clone| clone.backend_id.as_str())
                .into_iter()
                .chain(root)
                .chain(others.map(|clone| clone.backend_id.as_str()));

            let failed = order
                .filter(|dataset| match manager.backend.mount(dataset) {
                    Ok(()) => {
                        info!("mounted {dataset}");
                        false
                    }
                    Err(error) => {
                        warn!("cannot mount {dataset}: {error}");
                        true
                    }
                })
                .map(str::to_owned)
                .collect::<Vec<_>>();

            if !failed.is_empty() {
                return Err(Error::Remount { datasets: failed });
            }

            Ok(())
        })
    }

    /// Unmount the whole tree.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Busy`] if any dataset refused to unmount, in which
    ///   case the tree is mounted again.
    #[instrument(skip(self), fields(manager = %self.backend_id), level = "debug")]
    pub fn unmount(&mut self) -> Result<()> {
        self.mutate(|manager| {
            manager.unmount_tree()?.release();
            info!("unmounted {}", manager.backend_id);
            Ok(())
        })
    }

    /// Unmount and destroy the whole managed tree.
    ///
    /// Nothing is destroyed unless every dataset unmounts. Removing the
    /// directories left behind at the public path is best effort.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Busy`] if any dataset refused to unmount.
    /// - Return [`Error::Backend`] if the tree cannot be destroyed.
    #[instrument(skip(self), fields(manager = %self.backend_id), level = "debug")]
    pub fn destroy(self) -> Result<Teardown> {
        let tree = self.unmount_tree()?;
        self.backend.destroy(&self.backend_id, true)?;
        tree.release();
        info!("destroyed {}", self.backend_id);

        let clones_dir = self.public_path.join(CLONES_DIR);
        let leftover = [clones_dir.as_path(), self.public_path.as_path()]
            .into_iter()
            .filter_map(|dir| match fs::remove_dir(dir) {
                Ok(()) => None,
                Err(error) if error.kind() == io::ErrorKind::NotFound => None,
                Err(error) => {
                    warn!("cannot remove {:?}: {error}", dir.display());
                    Some(dir.to_path_buf())
                }
            })
            .collect();

        Ok(Teardown { leftover })
    }

    fn mutate<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.phase = Phase::Mutating;
        let outcome = op(self);
        let reload = self.load();

        match (outcome, reload) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(error)) => Err(error),
            (Err(error), Ok(())) => Err(error),
            (Err(error), Err(reload)) => {
                warn!("cannot reload state after failure: {reload}");
                Err(error)
            }
        }
    }

    fn swap_active(&self, target: &CloneEntry, previous: Option<&CloneEntry>) -> Result<()> {
        let tree = self.unmount_tree()?;
        let public_path = path_str(&self.public_path, &self.backend_id)?;

        if let Some(previous) = previous {
            self.backend
                .inherit_property(&previous.backend_id, MOUNTPOINT)?;
        }

        if let Err(error) = self
            .backend
            .set_property(&target.backend_id, MOUNTPOINT, public_path)
        {
            if let Some(previous) = previous {
                warn!("restore mountpoint of {}", previous.backend_id);
                if let Err(restore) =
                    self.backend
                        .set_property(&previous.backend_id, MOUNTPOINT, public_path)
                {
                    warn!("cannot restore mountpoint of {}: {restore}", previous.backend_id);
                }
            }
            return Err(error.into());
        }

        tree.resume(&target.backend_id)
    }

    fn unmount_tree(&self) -> Result<UnmountedTree<'_, B>> {
        let active = self.active_clone().filter(|clone| clone.mounted);
        let clones = self
            .clones
            .iter()
            .filter(|clone| clone.mounted && Some(clone.id) != active.map(|a| a.id))
            .map(|clone| clone.backend_id.as_str());
        let root = self.root_mounted.then_some(self.backend_id.as_str());

        UnmountedTree::unmount(
            &self.backend,
            clones,
            root,
            active.map(|clone| clone.backend_id.as_str()),
        )
    }

    fn index_of(&self, id: CloneId) -> Result<usize> {
        self.clones
            .iter()
            .position(|clone| clone.id == id)
            .ok_or_else(|| self.structural(Structural::UnknownClone(id)))
    }

    fn clone_name(&self, id: CloneId) -> String {
        format!("{}/{id}", self.backend_id)
    }

    fn structural(&self, reason: Structural) -> Error {
        Error::Structural {
            reason,
            dataset: self.backend_id.clone(),
        }
    }
}

/// Outcome of destroying a manager.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Teardown {
    /// Directories that could not be removed after the tree was destroyed.
    pub leftover: Vec<PathBuf>,
}

fn parse_clone(root: &str, dataset: DatasetInfo) -> Result<CloneEntry> {
    let id = dataset
        .name
        .strip_prefix(root)
        .and_then(|rest| rest.strip_prefix('/'))
        .and_then(|leaf| leaf.parse::<CloneId>().ok())
        .ok_or_else(|| Error::Structural {
            reason: Structural::MalformedClone,
            dataset: dataset.name.clone(),
        })?;

    let origin_id = dataset
        .origin
        .as_deref()
        .and_then(|origin| origin.split_once('@'))
        .and_then(|(parent, _)| parent.strip_prefix(root))
        .and_then(|rest| rest.strip_prefix('/'))
        .and_then(|leaf| leaf.parse::<CloneId>().ok());

    Ok(CloneEntry {
        id,
        backend_id: dataset.name,
        origin: dataset.origin,
        origin_id,
        mountpoint: dataset.mountpoint,
        mounted: dataset.mounted,
        created_at: dataset.created_at,
        used_bytes: dataset.used_bytes,
    })
}

/// Snapshot names are clone identifiers handed out in increasing order, so
/// they order snapshots of one dataset by age.
fn origin_snapshot_id(clone: &CloneEntry) -> Option<CloneId> {
    clone
        .origin
        .as_deref()
        .and_then(|origin| origin.split_once('@'))
        .and_then(|(_, name)| name.parse().ok())
}

pub(crate) fn path_str<'p>(path: &'p Path, dataset: &str) -> Result<&'p str> {
    path.to_str().ok_or_else(|| Error::Structural {
        reason: Structural::InvalidManagedPath(path.to_path_buf()),
        dataset: dataset.to_owned(),
    })
}

/// Reasons for structural failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Structural {
    /// Dataset does not carry a managed path.
    #[error("not a clone manager")]
    NotManaged,

    /// Managed path is unusable.
    #[error("managed path {:?} is not an absolute UTF-8 path", .0.display())]
    InvalidManagedPath(PathBuf),

    /// Managed tree holds a dataset that is not a clone.
    #[error("dataset is not named after a clone id")]
    MalformedClone,

    /// No clone has the requested identifier.
    #[error("no clone {0}")]
    UnknownClone(CloneId),

    /// Operation needs an active clone.
    #[error("no active clone")]
    NoActiveClone,

    /// Active clone cannot be removed.
    #[error("clone {0} is active")]
    CloneIsActive(CloneId),

    /// More than one clone is mounted at the public path.
    #[error("more than one clone is mounted at the managed path")]
    MultipleActive,

    /// Dataset is a managed root already.
    #[error("already a clone manager")]
    AlreadyManaged,

    /// Dataset to migrate has children.
    #[error("dataset has children")]
    HasChildren,

    /// Dataset exists although it should not.
    #[error("dataset already exists")]
    DatasetExists,

    /// Dataset does not exist although it should.
    #[error("dataset does not exist")]
    MissingDataset,

    /// Path exists although it should not.
    #[error("path {:?} already exists", .0.display())]
    PathExists(PathBuf),

    /// Pool level datasets cannot be renamed aside.
    #[error("top-level dataset cannot be migrated")]
    TopLevelDataset,

    /// Total cap cannot be met without evicting the active clone.
    #[error("only the active clone is left to evict")]
    NothingToEvict,

    /// Every clone id has been used.
    #[error("clone id space exhausted")]
    IdSpaceExhausted,
}

/// Broad category of a manager error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// System fault, or a managed tree in an unexpected state.
    Structural,

    /// Operation rejected by policy, nothing was changed.
    Business,
}

/// Clone manager error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Precondition failed, or managed tree is corrupted.
    #[error("{dataset}: {reason}")]
    Structural { reason: Structural, dataset: String },

    /// Retention cap would be exceeded.
    #[error("{limit} clones would number {current}, exceeding the limit of {max}")]
    PolicyViolation {
        limit: Limit,
        current: usize,
        max: usize,
    },

    /// Clone to activate is already active.
    #[error("clone {0} is already active")]
    AlreadyActive(CloneId),

    /// Datasets refused to unmount. The tree was mounted again.
    #[error("cannot unmount {}", datasets.join(", "))]
    Busy { datasets: Vec<String> },

    /// Datasets failed to mount.
    #[error("cannot mount {}", datasets.join(", "))]
    Remount { datasets: Vec<String> },

    /// Directory content could not be copied into the new clone.
    #[error("failed to copy directory content, original content kept at {:?}", temp_path.display())]
    Migrate {
        #[source]
        source: io::Error,
        temp_path: PathBuf,
    },

    /// Managed tree could not be set up after the directory was moved aside.
    #[error("failed to set up managed tree, original content kept at {:?}", temp_path.display())]
    MigrateAborted {
        #[source]
        source: Box<Error>,
        temp_path: PathBuf,
    },

    /// File system operation failed.
    #[error("i/o failure at {:?}", path.display())]
    Io {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Backend operation failed.
    #[error(transparent)]
    Backend(#[from] backend::Error),
}

impl Error {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PolicyViolation { .. } | Self::AlreadyActive(_) => ErrorKind::Business,
            _ => ErrorKind::Structural,
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = Error> = std::result::Result<T, E>;
