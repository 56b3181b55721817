// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! In-memory backend.
//!
//! Models a ZFS dataset tree without touching real storage: datasets,
//! snapshots, clone origins, promotion, property inheritance, and mount state.
//! Refusals mirror what ZFS itself refuses, e.g., destroying a snapshot that
//! still has clones, or unmounting a dataset that is busy.
//!
//! Mutating calls are recorded in a call log, and can be made to fail on
//! demand, which makes it possible to test failure paths of the clone manager
//! deterministically.

use crate::backend::{Backend, DatasetInfo, Error, Result, MOUNTPOINT};

use std::{
    cell::RefCell,
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};
use tracing::debug;

const EPOCH: i64 = 1_700_000_000;
const BLOCK: u64 = 4096;

/// Backend that keeps its whole dataset tree in memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: RefCell<State>,
}

#[derive(Debug, Default)]
struct State {
    datasets: BTreeMap<String, Dataset>,
    snapshots: BTreeMap<String, u64>,
    txg: u64,
    busy: BTreeSet<String>,
    failures: Vec<String>,
    calls: Vec<String>,
}

#[derive(Debug, Default, Clone)]
struct Dataset {
    origin: Option<String>,
    mountpoint: Option<String>,
    mounted: bool,
    created_at: i64,
    properties: BTreeMap<String, String>,
}

impl MemoryBackend {
    /// Construct new empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct new backend holding one pool dataset.
    pub fn with_pool(pool: &str) -> Self {
        let backend = Self::new();
        backend.state.borrow_mut().insert(pool, None, None);
        backend
    }

    /// Mark a dataset as busy, so that unmounting it fails.
    pub fn set_busy(&self, dataset: impl Into<String>) {
        self.state.borrow_mut().busy.insert(dataset.into());
    }

    /// Clear busy mark of a dataset.
    pub fn clear_busy(&self, dataset: &str) {
        self.state.borrow_mut().busy.remove(dataset);
    }

    /// Fail every mutating call whose log entry starts with `prefix`.
    pub fn fail_on(&self, prefix: impl Into<String>) {
        self.state.borrow_mut().failures.push(prefix.into());
    }

    /// Stop injecting failures.
    pub fn clear_failures(&self) {
        self.state.borrow_mut().failures.clear();
    }

    /// Log of mutating calls made so far.
    pub fn calls(&self) -> Vec<String> {
        self.state.borrow().calls.clone()
    }

    /// Forget logged calls.
    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    /// Full names of the snapshots of a dataset, oldest first.
    pub fn snapshots_of(&self, dataset: &str) -> Vec<String> {
        let state = self.state.borrow();
        let mut snapshots = state
            .snapshots
            .iter()
            .filter(|(name, _)| snapshot_parent(name) == dataset)
            .map(|(name, txg)| (*txg, name.clone()))
            .collect::<Vec<_>>();
        snapshots.sort();
        snapshots.into_iter().map(|(_, name)| name).collect()
    }

    /// Check whether a dataset is mounted.
    pub fn is_mounted(&self, dataset: &str) -> bool {
        self.state
            .borrow()
            .datasets
            .get(dataset)
            .is_some_and(|dataset| dataset.mounted)
    }

    fn record(&self, call: String) -> Result<std::cell::RefMut<'_, State>> {
        let mut state = self.state.borrow_mut();
        debug!("memory backend: {call}");
        let failing = state
            .failures
            .iter()
            .any(|prefix| call.starts_with(prefix.as_str()));
        state.calls.push(call.clone());
        if failing {
            return Err(Error::Command {
                command: call,
                message: "injected failure".into(),
            });
        }

        Ok(state)
    }
}

impl State {
    fn insert(&mut self, name: &str, origin: Option<String>, mountpoint: Option<String>) {
        self.txg += 1;
        let dataset = Dataset {
            origin,
            mountpoint,
            mounted: false,
            created_at: EPOCH + self.txg as i64,
            properties: BTreeMap::new(),
        };
        self.datasets.insert(name.to_owned(), dataset);

        let mounted = self.effective_mountpoint(name).is_some();
        if let Some(dataset) = self.datasets.get_mut(name) {
            dataset.mounted = mounted;
        }
    }

    fn dataset(&self, name: &str) -> Result<&Dataset> {
        self.datasets
            .get(name)
            .ok_or_else(|| Error::NotFound(name.to_owned()))
    }

    fn dataset_mut(&mut self, name: &str) -> Result<&mut Dataset> {
        self.datasets
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(name.to_owned()))
    }

    fn require_parent(&self, name: &str) -> Result<()> {
        match name.rsplit_once('/') {
            Some((parent, _)) if !self.datasets.contains_key(parent) => {
                Err(Error::NotFound(parent.to_owned()))
            }
            _ => Ok(()),
        }
    }

    fn require_vacant(&self, name: &str) -> Result<()> {
        if self.datasets.contains_key(name) {
            return Err(Error::Exists(name.to_owned()));
        }

        Ok(())
    }

    fn effective_mountpoint(&self, name: &str) -> Option<PathBuf> {
        let dataset = self.datasets.get(name)?;
        match dataset.mountpoint.as_deref() {
            Some("none" | "legacy") => None,
            Some(path) => Some(PathBuf::from(path)),
            None => match name.rsplit_once('/') {
                Some((parent, leaf)) => self
                    .effective_mountpoint(parent)
                    .map(|path| path.join(leaf)),
                None => Some(Path::new("/").join(name)),
            },
        }
    }

    fn effective_property(&self, name: &str, key: &str) -> Option<String> {
        let mut current = Some(name);
        while let Some(name) = current {
            if let Some(value) = self
                .datasets
                .get(name)
                .and_then(|dataset| dataset.properties.get(key))
            {
                return Some(value.clone());
            }
            current = name.rsplit_once('/').map(|(parent, _)| parent);
        }

        None
    }

    fn subtree(&self, root: &str) -> Vec<String> {
        let prefix = format!("{root}/");
        self.datasets
            .keys()
            .filter(|name| name.as_str() == root || name.starts_with(&prefix))
            .cloned()
            .collect()
    }

    fn info(&self, name: &str, properties: &[&str]) -> DatasetInfo {
        let dataset = self.datasets.get(name).cloned().unwrap_or_default();
        let subtree = self.subtree(name).len() as u64;
        DatasetInfo {
            name: name.to_owned(),
            origin: dataset.origin,
            mountpoint: self.effective_mountpoint(name),
            mounted: dataset.mounted,
            created_at: dataset.created_at,
            used_bytes: subtree * BLOCK,
            properties: properties
                .iter()
                .filter_map(|key| {
                    self.effective_property(name, key)
                        .map(|value| ((*key).to_owned(), value))
                })
                .collect(),
        }
    }

    fn rewrite_origins(&mut self, renames: &BTreeMap<String, String>, skip: Option<&str>) {
        for (name, dataset) in self.datasets.iter_mut() {
            if Some(name.as_str()) == skip {
                continue;
            }
            if let Some(renamed) = dataset
                .origin
                .as_ref()
                .and_then(|origin| renames.get(origin))
            {
                dataset.origin = Some(renamed.clone());
            }
        }
    }
}

impl Backend for MemoryBackend {
    fn list(
        &self,
        root: Option<&str>,
        properties: &[&str],
        recursive: bool,
    ) -> Result<Vec<DatasetInfo>> {
        let state = self.state.borrow();
        let names = match root {
            Some(root) => {
                state.dataset(root)?;
                if recursive {
                    state.subtree(root)
                } else {
                    vec![root.to_owned()]
                }
            }
            None => state.datasets.keys().cloned().collect(),
        };

        Ok(names
            .iter()
            .map(|name| state.info(name, properties))
            .collect())
    }

    fn find_local_property(&self, key: &str) -> Result<Vec<(String, String)>> {
        let state = self.state.borrow();
        Ok(state
            .datasets
            .iter()
            .filter_map(|(name, dataset)| {
                dataset
                    .properties
                    .get(key)
                    .map(|value| (name.clone(), value.clone()))
            })
            .collect())
    }

    fn exists(&self, name: &str) -> Result<bool> {
        let state = self.state.borrow();
        Ok(state.datasets.contains_key(name) || state.snapshots.contains_key(name))
    }

    fn create(
        &self,
        name: &str,
        mountpoint: Option<&Path>,
        properties: &[(&str, &str)],
    ) -> Result<()> {
        let mut state = self.record(format!("create {name}"))?;
        state.require_vacant(name)?;
        state.require_parent(name)?;

        let mountpoint = properties
            .iter()
            .find(|(key, _)| *key == MOUNTPOINT)
            .map(|(_, value)| (*value).to_owned())
            .or_else(|| mountpoint.map(|path| path.to_string_lossy().into_owned()));
        state.insert(name, None, mountpoint);
        let dataset = state.dataset_mut(name)?;
        for (key, value) in properties.iter().filter(|(key, _)| *key != MOUNTPOINT) {
            dataset.properties.insert((*key).to_owned(), (*value).to_owned());
        }

        Ok(())
    }

    fn snapshot(&self, dataset: &str, snapshot: &str) -> Result<String> {
        let name = format!("{dataset}@{snapshot}");
        let mut state = self.record(format!("snapshot {name}"))?;
        state.dataset(dataset)?;
        if state.snapshots.contains_key(&name) {
            return Err(Error::Exists(name));
        }

        state.txg += 1;
        let txg = state.txg;
        state.snapshots.insert(name.clone(), txg);

        Ok(name)
    }

    fn clone_snapshot(&self, snapshot: &str, name: &str) -> Result<()> {
        let mut state = self.record(format!("clone {snapshot} {name}"))?;
        if !state.snapshots.contains_key(snapshot) {
            return Err(Error::NotFound(snapshot.to_owned()));
        }
        state.require_vacant(name)?;
        state.require_parent(name)?;
        state.insert(name, Some(snapshot.to_owned()), None);

        Ok(())
    }

    fn destroy(&self, name: &str, recursive: bool) -> Result<()> {
        let call = if recursive {
            format!("destroy -r {name}")
        } else {
            format!("destroy {name}")
        };
        let mut state = self.record(call)?;

        if name.contains('@') {
            if !state.snapshots.contains_key(name) {
                return Err(Error::NotFound(name.to_owned()));
            }
            if state
                .datasets
                .values()
                .any(|dataset| dataset.origin.as_deref() == Some(name))
            {
                return Err(Error::HasDependents(name.to_owned()));
            }
            state.snapshots.remove(name);
            return Ok(());
        }

        state.dataset(name)?;
        let doomed = if recursive {
            state.subtree(name)
        } else {
            vec![name.to_owned()]
        };
        let doomed_snapshots = state
            .snapshots
            .keys()
            .filter(|snapshot| doomed.iter().any(|dataset| snapshot_parent(snapshot) == dataset))
            .cloned()
            .collect::<Vec<_>>();

        if !recursive && (state.subtree(name).len() > 1 || !doomed_snapshots.is_empty()) {
            return Err(Error::HasChildren(name.to_owned()));
        }
        if let Some((dependent, _)) = state.datasets.iter().find(|(dataset, info)| {
            !doomed.contains(dataset)
                && info
                    .origin
                    .as_ref()
                    .is_some_and(|origin| doomed_snapshots.contains(origin))
        }) {
            return Err(Error::HasDependents(dependent.clone()));
        }
        if let Some(busy) = doomed.iter().find(|dataset| {
            state.busy.contains(*dataset)
                && state
                    .datasets
                    .get(*dataset)
                    .is_some_and(|dataset| dataset.mounted)
        }) {
            return Err(Error::Busy(busy.clone()));
        }

        for dataset in &doomed {
            state.datasets.remove(dataset);
        }
        for snapshot in &doomed_snapshots {
            state.snapshots.remove(snapshot);
        }

        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        let mut state = self.record(format!("rename {from} {to}"))?;
        state.dataset(from)?;
        state.require_vacant(to)?;
        state.require_parent(to)?;
        if to.starts_with(&format!("{from}/")) {
            return Err(Error::Invalid {
                name: from.to_owned(),
                reason: "cannot rename into own subtree".into(),
            });
        }

        let renamed = |name: &str| format!("{to}{}", &name[from.len()..]);
        for name in state.subtree(from) {
            if let Some(dataset) = state.datasets.remove(&name) {
                state.datasets.insert(renamed(&name), dataset);
            }
        }

        let mut renames = BTreeMap::new();
        let moved = state
            .snapshots
            .keys()
            .filter(|snapshot| {
                let parent = snapshot_parent(snapshot);
                parent == from || parent.starts_with(&format!("{from}/"))
            })
            .cloned()
            .collect::<Vec<_>>();
        for snapshot in moved {
            if let Some(txg) = state.snapshots.remove(&snapshot) {
                let new_name = renamed(&snapshot);
                state.snapshots.insert(new_name.clone(), txg);
                renames.insert(snapshot, new_name);
            }
        }
        state.rewrite_origins(&renames, None);

        Ok(())
    }

    fn promote(&self, dataset: &str) -> Result<()> {
        let mut state = self.record(format!("promote {dataset}"))?;
        let origin = state
            .dataset(dataset)?
            .origin
            .clone()
            .ok_or_else(|| Error::Invalid {
                name: dataset.to_owned(),
                reason: "not a clone".into(),
            })?;
        let origin_parent = snapshot_parent(&origin).to_owned();
        let origin_txg = *state
            .snapshots
            .get(&origin)
            .ok_or_else(|| Error::NotFound(origin.clone()))?;

        let mut renames = BTreeMap::new();
        for (snapshot, txg) in state.snapshots.iter() {
            if snapshot_parent(snapshot) == origin_parent && *txg <= origin_txg {
                let short = &snapshot[origin_parent.len() + 1..];
                renames.insert(snapshot.clone(), format!("{dataset}@{short}"));
            }
        }
        if let Some(taken) = renames
            .values()
            .find(|name| state.snapshots.contains_key(name.as_str()))
        {
            return Err(Error::Exists(taken.clone()));
        }

        for (old, new) in &renames {
            if let Some(txg) = state.snapshots.remove(old) {
                state.snapshots.insert(new.clone(), txg);
            }
        }
        state.rewrite_origins(&renames, Some(dataset));

        let inherited_origin = state.dataset(&origin_parent)?.origin.clone();
        let origin_short = &origin[origin_parent.len() + 1..];
        let demoted_origin = format!("{dataset}@{origin_short}");
        state.dataset_mut(dataset)?.origin = inherited_origin;
        state.dataset_mut(&origin_parent)?.origin = Some(demoted_origin);

        Ok(())
    }

    fn set_property(&self, dataset: &str, key: &str, value: &str) -> Result<()> {
        let mut state = self.record(format!("set {dataset} {key}={value}"))?;
        let entry = state.dataset_mut(dataset)?;
        if key == MOUNTPOINT {
            entry.mountpoint = Some(value.to_owned());
            if matches!(value, "none" | "legacy") {
                entry.mounted = false;
            }
        } else {
            entry.properties.insert(key.to_owned(), value.to_owned());
        }

        Ok(())
    }

    fn inherit_property(&self, dataset: &str, key: &str) -> Result<()> {
        let mut state = self.record(format!("inherit {dataset} {key}"))?;
        let entry = state.dataset_mut(dataset)?;
        if key == MOUNTPOINT {
            entry.mountpoint = None;
        } else {
            entry.properties.remove(key);
        }

        Ok(())
    }

    fn mount(&self, dataset: &str) -> Result<()> {
        let mut state = self.record(format!("mount {dataset}"))?;
        if state.effective_mountpoint(dataset).is_none() {
            state.dataset(dataset)?;
            return Err(Error::Invalid {
                name: dataset.to_owned(),
                reason: "no mountpoint".into(),
            });
        }
        let entry = state.dataset_mut(dataset)?;
        if entry.mounted {
            return Err(Error::AlreadyMounted(dataset.to_owned()));
        }
        entry.mounted = true;

        Ok(())
    }

    fn unmount(&self, dataset: &str) -> Result<()> {
        let mut state = self.record(format!("unmount {dataset}"))?;
        let busy = state.busy.contains(dataset);
        let entry = state.dataset_mut(dataset)?;
        if !entry.mounted {
            return Err(Error::NotMounted(dataset.to_owned()));
        }
        if busy {
            return Err(Error::Busy(dataset.to_owned()));
        }
        entry.mounted = false;

        Ok(())
    }
}

fn snapshot_parent(snapshot: &str) -> &str {
    snapshot
        .split_once('@')
        .map_or(snapshot, |(parent, _)| parent)
}
