// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Copy-on-write clone manager.
//!
//! Keep an ordered chain of disk-efficient, point-in-time clones of a working
//! directory on top of a snapshot capable backend, switch which clone is
//! visible at the working directory's path, and evict old clones according to
//! a retention policy.
//!
//! # See Also
//!
//! 1. [`manager`]
//! 2. [`backend`]
//! 3. [`store`]

pub mod backend;
pub mod config;
pub mod manager;
pub mod path;
pub mod store;

pub use backend::{memory::MemoryBackend, zfs::ZfsBackend, Backend};
pub use manager::{
    bootstrap::Migrate,
    model::{CloneEntry, CloneId},
    retention::RetentionPolicy,
    Error, ErrorKind, Manager, CLONES_DIR, MANAGED_PROPERTY,
};
pub use store::ManagerStore;
