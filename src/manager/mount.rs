// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Whole tree unmounting.
//!
//! Swapping the active clone requires the entire managed tree to be
//! unmounted first. Mounts nest: inactive clones live inside the managed
//! root, which lives inside the active clone. Unmounting is all-or-nothing:
//! if any dataset refuses to unmount, everything that was already unmounted
//! gets mounted again before the failure is reported.
//!
//! A successfully unmounted tree is represented by [`UnmountedTree`]. The tree
//! is mounted again when the guard is dropped, unless it is explicitly
//! [resumed](UnmountedTree::resume) in a new order or
//! [released](UnmountedTree::release) to stay unmounted.

use crate::{
    backend::Backend,
    manager::{Error, Result},
};

use tracing::{debug, info, warn};

/// Managed tree whose datasets are currently unmounted.
#[derive(Debug)]
#[must_use = "dropping an unmounted tree mounts it again"]
pub struct UnmountedTree<'a, B>
where
    B: Backend,
{
    backend: &'a B,
    clones: Vec<String>,
    root: Option<String>,
    active: Option<String>,
    armed: bool,
}

impl<'a, B> UnmountedTree<'a, B>
where
    B: Backend,
{
    /// Unmount inactive clones, then the managed root, then the active clone.
    ///
    /// The managed root is mounted inside the active clone, and every other
    /// clone inside the managed root, hence the order. Only datasets that are
    /// currently mounted should be passed in, so only those are restored on
    /// failure.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Busy`] naming every dataset that refused to unmount.
    pub(crate) fn unmount<'n>(
        backend: &'a B,
        clones: impl IntoIterator<Item = &'n str>,
        root: Option<&str>,
        active: Option<&str>,
    ) -> Result<Self> {
        let mut tree = Self {
            backend,
            clones: Vec::new(),
            root: None,
            active: None,
            armed: true,
        };
        let mut refused = Vec::new();

        for clone in clones {
            if unmount_one(backend, clone, &mut refused) {
                tree.clones.push(clone.to_owned());
            }
        }

        if let Some(root) = root {
            if unmount_one(backend, root, &mut refused) {
                tree.root = Some(root.to_owned());
            }
        }

        // INVARIANT: Active clone stays mounted if anything inside it refused.
        if let Some(active) = active.filter(|_| refused.is_empty()) {
            if unmount_one(backend, active, &mut refused) {
                tree.active = Some(active.to_owned());
            }
        }

        if !refused.is_empty() {
            info!("remount tree after failed unmount");
            drop(tree);
            return Err(Error::Busy { datasets: refused });
        }

        Ok(tree)
    }

    /// Datasets this guard has unmounted, in unmount order.
    pub fn datasets(&self) -> impl Iterator<Item = &str> {
        self.clones
            .iter()
            .chain(self.root.iter())
            .chain(self.active.iter())
            .map(String::as_str)
    }

    /// Mount the tree again, starting with a given dataset.
    ///
    /// Mounts `first`, then the managed root, then every other dataset that
    /// was unmounted. All mounts are attempted even if some fail.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Remount`] naming every dataset that failed to mount.
    pub(crate) fn resume(mut self, first: &str) -> Result<()> {
        self.armed = false;

        let mut order = vec![first.to_owned()];
        order.extend(self.root.take());
        order.extend(
            self.active
                .take()
                .into_iter()
                .chain(self.clones.drain(..))
                .filter(|dataset| dataset != first),
        );

        let failed = order
            .into_iter()
            .filter(|dataset| match self.backend.mount(dataset) {
                Ok(()) => {
                    debug!("mounted {dataset}");
                    false
                }
                Err(error) => {
                    warn!("cannot mount {dataset}: {error}");
                    true
                }
            })
            .collect::<Vec<_>>();

        if !failed.is_empty() {
            return Err(Error::Remount { datasets: failed });
        }

        Ok(())
    }

    /// Leave the tree unmounted.
    pub(crate) fn release(mut self) {
        self.armed = false;
    }

    fn restore(&mut self) {
        let order = self
            .active
            .take()
            .into_iter()
            .chain(self.root.take())
            .chain(self.clones.drain(..))
            .collect::<Vec<_>>();

        for dataset in order {
            if let Err(error) = self.backend.mount(&dataset) {
                warn!("cannot restore mount of {dataset}: {error}");
            }
        }
    }
}

impl<B> Drop for UnmountedTree<'_, B>
where
    B: Backend,
{
    fn drop(&mut self) {
        if self.armed {
            self.restore();
        }
    }
}

fn unmount_one(backend: &impl Backend, dataset: &str, refused: &mut Vec<String>) -> bool {
    match backend.unmount(dataset) {
        Ok(()) => {
            debug!("unmounted {dataset}");
            true
        }
        Err(error) => {
            warn!("cannot unmount {dataset}: {error}");
            refused.push(dataset.to_owned());
            false
        }
    }
}
