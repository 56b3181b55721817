// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Host-wide manager discovery.
//!
//! Every managed root carries the [`MANAGED_PROPERTY`] user property with a
//! locally set value, so the managers on a host are exactly the datasets
//! holding that property locally. Clones inherit the property from their
//! managed root, which is why only local values count.
//!
//! Discovery is a pure query over the backend. Nothing is cached between
//! calls, so a manager created or destroyed by another process shows up on
//! the next call.

use crate::{
    backend::Backend,
    manager::{bootstrap::Migrate, Manager, Result, MANAGED_PROPERTY},
};

use std::path::Path;
use tracing::{instrument, warn};

/// Entry point for every manager reachable through one backend.
#[derive(Debug)]
pub struct ManagerStore<B>
where
    B: Backend,
{
    backend: B,
}

impl<B> ManagerStore<B>
where
    B: Backend,
{
    /// Construct new manager store over backend.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Backend of the store.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Names of managed root datasets with their public paths.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Backend`](crate::manager::Error::Backend) if backend
    ///   cannot be queried.
    pub fn names(&self) -> Result<Vec<(String, String)>> {
        Ok(self.backend.find_local_property(MANAGED_PROPERTY)?)
    }

    /// Load every manager on the host.
    ///
    /// Datasets that carry the managed property but fail to load are skipped
    /// with a warning rather than failing the whole listing.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Backend`](crate::manager::Error::Backend) if backend
    ///   cannot be queried.
    #[instrument(skip(self), level = "debug")]
    pub fn managers(&self) -> Result<Vec<Manager<&B>>> {
        let managers = self
            .names()?
            .into_iter()
            .filter_map(|(name, _)| match Manager::open(&self.backend, name.as_str()) {
                Ok(manager) => Some(manager),
                Err(error) => {
                    warn!("skipping {name}: {error}");
                    None
                }
            })
            .collect();

        Ok(managers)
    }

    /// Open manager by name of its managed root.
    ///
    /// # Errors
    ///
    /// - Return any error of [`Manager::open`].
    pub fn open(&self, name: &str) -> Result<Manager<&B>> {
        Manager::open(&self.backend, name)
    }

    /// Initialize new manager.
    ///
    /// # Errors
    ///
    /// - Return any error of [`Manager::initialize`].
    pub fn initialize(
        &self,
        name: &str,
        path: impl AsRef<Path>,
        migrate: Option<Migrate>,
    ) -> Result<Manager<&B>> {
        Manager::initialize(&self.backend, name, path, migrate)
    }
}
