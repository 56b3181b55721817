// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{active_id, ids, ManagerFixture, ROOT};

use anyhow::Result;
use pretty_assertions::assert_eq;
use rand::{rngs::StdRng, Rng, SeedableRng};
use zcm::{
    manager::{Phase, Structural},
    Backend, CloneEntry, CloneId, Error, Manager, ManagerStore, MemoryBackend, RetentionPolicy,
};

fn assert_partition(manager: &Manager<&MemoryBackend>) {
    let mut joined: Vec<CloneEntry> = manager.older_clones().to_vec();
    joined.extend(manager.active_clone().cloned());
    joined.extend(manager.newer_clones().iter().cloned());
    assert_eq!(joined, manager.clones().to_vec());
}

/// Every snapshot in the tree is the origin of exactly one clone.
fn assert_no_stray_snapshots(backend: &MemoryBackend, manager: &Manager<&MemoryBackend>) {
    let snapshots = manager
        .clones()
        .iter()
        .map(|clone| backend.snapshots_of(&clone.backend_id).len())
        .sum::<usize>();
    let dependents = manager
        .clones()
        .iter()
        .filter(|clone| clone.origin_id.is_some())
        .count();
    assert_eq!(snapshots, dependents);
}

fn promotions(backend: &MemoryBackend) -> Vec<String> {
    backend
        .calls()
        .into_iter()
        .filter(|call| call.starts_with("promote "))
        .collect()
}

#[test]
fn end_to_end_scenario() -> Result<()> {
    let fixture = ManagerFixture::new()?;
    let unbounded = RetentionPolicy::unbounded();

    let mut manager = fixture.init()?;
    assert_eq!(ids(manager.clones()), vec!["00000000"]);
    assert_eq!(active_id(&manager), Some("00000000".into()));
    assert_eq!(manager.next_id(), Some(CloneId::new(1)));
    assert_eq!(manager.public_path(), fixture.path().as_path());

    let first = manager.create_clone(unbounded, false)?;
    assert_eq!(first.id.to_string(), "00000001");
    assert_eq!(ids(manager.newer_clones()), vec!["00000001"]);
    assert_eq!(active_id(&manager), Some("00000000".into()));

    manager.activate(first.id, unbounded, false)?;
    assert_eq!(active_id(&manager), Some("00000001".into()));
    assert_eq!(ids(manager.older_clones()), vec!["00000000"]);
    assert_partition(&manager);

    assert_eq!(manager.next_id(), Some(CloneId::new(2)));
    let second = manager.create_clone(unbounded, false)?;
    assert_eq!(second.id.to_string(), "00000002");
    assert_eq!(ids(manager.newer_clones()), vec!["00000002"]);

    fixture.backend().clear_calls();
    manager.remove(CloneId::ROOT)?;
    assert_eq!(promotions(fixture.backend()), vec!["promote rpool/t/00000001"]);
    assert_eq!(ids(manager.clones()), vec!["00000001", "00000002"]);
    assert_eq!(
        manager
            .clone_by_id(CloneId::new(1))
            .map(|clone| clone.origin.clone()),
        Some(None)
    );
    assert_eq!(manager.next_id(), Some(CloneId::new(3)));

    manager.destroy()?;
    assert!(!fixture.backend().exists(ROOT)?);
    assert!(!fixture.path().exists());

    let store = ManagerStore::new(fixture.backend());
    assert!(store.managers()?.is_empty());

    Ok(())
}

#[test]
fn busy_unmount_leaves_activation_untouched() -> Result<()> {
    let fixture = ManagerFixture::new()?;
    let mut manager = fixture.init_with_clones(1)?;
    let before = manager.clones().to_vec();

    fixture.backend().set_busy("rpool/t/00000000");
    let result = manager.activate(CloneId::new(1), RetentionPolicy::unbounded(), false);

    match result {
        Err(Error::Busy { datasets }) => {
            assert_eq!(datasets, vec!["rpool/t/00000000".to_owned()])
        }
        other => panic!("expected busy error, got {other:?}"),
    }
    manager.load()?;
    assert_eq!(manager.clones().to_vec(), before);
    assert_eq!(active_id(&manager), Some("00000000".into()));
    assert!(fixture.backend().is_mounted(ROOT));
    assert!(fixture.backend().is_mounted("rpool/t/00000001"));

    Ok(())
}

#[test]
fn failed_swap_restores_previous_active_clone() -> Result<()> {
    let fixture = ManagerFixture::new()?;
    let mut manager = fixture.init_with_clones(1)?;

    fixture.backend().fail_on("set rpool/t/00000001 mountpoint");
    let result = manager.activate(CloneId::new(1), RetentionPolicy::unbounded(), false);

    assert!(matches!(result, Err(Error::Backend(_))));
    assert_eq!(manager.phase(), Phase::Loaded);
    assert_eq!(active_id(&manager), Some("00000000".into()));
    assert!(manager.clones().iter().all(|clone| clone.mounted));
    assert!(fixture.backend().is_mounted(ROOT));

    Ok(())
}

#[test]
fn remove_without_dependents_never_promotes() -> Result<()> {
    let fixture = ManagerFixture::new()?;
    let mut manager = fixture.init_with_clones(1)?;
    fixture.backend().clear_calls();

    manager.remove(CloneId::new(1))?;

    assert!(promotions(fixture.backend()).is_empty());
    assert!(fixture.backend().snapshots_of("rpool/t/00000000").is_empty());
    assert_eq!(ids(manager.clones()), vec!["00000000"]);
    assert_eq!(manager.next_id(), Some(CloneId::new(1)));

    Ok(())
}

#[test]
fn remove_with_many_dependents_promotes_exactly_one() -> Result<()> {
    let fixture = ManagerFixture::new()?;
    let mut manager = fixture.init_with_clones(2)?;
    manager.activate(CloneId::new(1), RetentionPolicy::unbounded(), false)?;
    fixture.backend().clear_calls();

    manager.remove(CloneId::ROOT)?;

    assert_eq!(promotions(fixture.backend()), vec!["promote rpool/t/00000002"]);
    assert_eq!(ids(manager.clones()), vec!["00000001", "00000002"]);
    assert_eq!(active_id(&manager), Some("00000001".into()));
    assert_eq!(
        fixture.backend().snapshots_of("rpool/t/00000002"),
        vec!["rpool/t/00000002@00000001".to_owned()]
    );

    Ok(())
}

#[test]
fn active_clone_cannot_be_removed() -> Result<()> {
    let fixture = ManagerFixture::new()?;
    let mut manager = fixture.init_with_clones(1)?;

    let result = manager.remove(CloneId::ROOT);
    assert!(matches!(
        result,
        Err(Error::Structural {
            reason: Structural::CloneIsActive(_),
            ..
        })
    ));
    assert_eq!(manager.clones().len(), 2);

    Ok(())
}

#[test]
fn unknown_clone_is_rejected() -> Result<()> {
    let fixture = ManagerFixture::new()?;
    let mut manager = fixture.init()?;

    let result = manager.remove(CloneId::new(9));
    assert!(matches!(
        result,
        Err(Error::Structural {
            reason: Structural::UnknownClone(_),
            ..
        })
    ));

    Ok(())
}

#[test]
fn activating_active_clone_is_rejected() -> Result<()> {
    let fixture = ManagerFixture::new()?;
    let mut manager = fixture.init()?;
    fixture.backend().clear_calls();

    let result = manager.activate(CloneId::ROOT, RetentionPolicy::unbounded(), false);
    assert!(matches!(result, Err(Error::AlreadyActive(_))));
    assert!(fixture.backend().calls().is_empty());

    Ok(())
}

#[test]
fn root_clone_never_gains_origin() -> Result<()> {
    let fixture = ManagerFixture::new()?;
    let unbounded = RetentionPolicy::unbounded();
    let mut manager = fixture.init_with_clones(2)?;

    manager.activate(CloneId::new(2), unbounded, false)?;
    manager.create_clone(unbounded, false)?;
    manager.remove(CloneId::new(1))?;
    manager.activate(CloneId::ROOT, unbounded, false)?;
    manager.remove(CloneId::new(2))?;

    let root = manager
        .clone_by_id(CloneId::ROOT)
        .map(|clone| clone.origin.clone());
    assert_eq!(root, Some(None));
    assert_eq!(ids(manager.clones()), vec!["00000000", "00000003"]);

    Ok(())
}

#[test]
fn next_clone_id_follows_largest_existing_id() -> Result<()> {
    let fixture = ManagerFixture::new()?;
    let unbounded = RetentionPolicy::unbounded();
    let mut manager = fixture.init()?;

    let mut seen = Vec::new();
    for _ in 0..3 {
        let clone = manager.create_clone(unbounded, false)?;
        seen.push(clone.id);
        assert_partition(&manager);
    }
    manager.remove(CloneId::new(3))?;
    let next = manager.create_clone(unbounded, false)?;

    assert_eq!(seen, vec![CloneId::new(1), CloneId::new(2), CloneId::new(3)]);
    assert_eq!(next.id, CloneId::new(3));

    Ok(())
}

#[test]
fn unmount_then_mount_restores_tree() -> Result<()> {
    let fixture = ManagerFixture::new()?;
    let mut manager = fixture.init_with_clones(1)?;

    manager.unmount()?;
    assert!(!fixture.backend().is_mounted(ROOT));
    assert!(manager.clones().iter().all(|clone| !clone.mounted));
    assert_eq!(active_id(&manager), Some("00000000".into()));

    fixture.backend().clear_calls();
    manager.mount()?;
    assert_eq!(
        fixture.backend().calls(),
        vec![
            "mount rpool/t/00000000".to_owned(),
            "mount rpool/t".to_owned(),
            "mount rpool/t/00000001".to_owned(),
        ]
    );
    assert!(manager.clones().iter().all(|clone| clone.mounted));

    Ok(())
}

#[test]
fn busy_tree_is_not_destroyed() -> Result<()> {
    let fixture = ManagerFixture::new()?;
    let manager = fixture.init_with_clones(1)?;
    fixture.backend().set_busy("rpool/t/00000001");

    let result = manager.destroy();
    assert!(matches!(result, Err(Error::Busy { .. })));
    assert!(fixture.backend().exists("rpool/t/00000001")?);
    assert!(fixture.backend().is_mounted(ROOT));
    assert!(fixture.backend().is_mounted("rpool/t/00000000"));

    Ok(())
}

#[test]
fn destroy_removes_leftover_directories() -> Result<()> {
    let fixture = ManagerFixture::new()?;
    let manager = fixture.init()?;
    std::fs::create_dir_all(fixture.path().join(zcm::CLONES_DIR))?;

    let teardown = manager.destroy()?;
    assert!(teardown.leftover.is_empty());
    assert!(!fixture.path().exists());

    Ok(())
}

#[test]
fn destroy_reports_every_directory_left_behind() -> Result<()> {
    let fixture = ManagerFixture::new()?;
    let manager = fixture.init()?;
    let clones_dir = fixture.path().join(zcm::CLONES_DIR);
    std::fs::create_dir_all(&clones_dir)?;
    std::fs::write(clones_dir.join("stray.txt"), "left behind")?;

    let teardown = manager.destroy()?;

    assert_eq!(teardown.leftover, vec![clones_dir, fixture.path()]);
    assert!(!fixture.backend().exists(ROOT)?);

    Ok(())
}

#[test]
fn remove_parent_of_previously_promoted_clone() -> Result<()> {
    let fixture = ManagerFixture::new()?;
    let unbounded = RetentionPolicy::unbounded();
    let mut manager = fixture.init()?;

    manager.create_clone(unbounded, false)?;
    manager.activate(CloneId::new(1), unbounded, false)?;
    manager.create_clone(unbounded, false)?;
    manager.activate(CloneId::new(2), unbounded, false)?;
    manager.remove(CloneId::new(1))?;
    assert_eq!(
        manager
            .clone_by_id(CloneId::new(2))
            .and_then(|clone| clone.origin.clone()),
        Some("rpool/t/00000000@00000001".into())
    );

    manager.remove(CloneId::ROOT)?;

    assert_eq!(ids(manager.clones()), vec!["00000002"]);
    assert!(fixture.backend().snapshots_of("rpool/t/00000002").is_empty());
    assert_no_stray_snapshots(fixture.backend(), &manager);

    Ok(())
}

#[test]
fn remove_promotes_dependent_on_newest_snapshot() -> Result<()> {
    let fixture = ManagerFixture::new()?;
    let unbounded = RetentionPolicy::unbounded();
    let mut manager = fixture.init_with_clones(2)?;

    manager.activate(CloneId::new(1), unbounded, false)?;
    manager.create_clone(unbounded, false)?;
    manager.activate(CloneId::new(2), unbounded, false)?;
    manager.remove(CloneId::new(1))?;
    fixture.backend().clear_calls();

    manager.remove(CloneId::ROOT)?;

    assert_eq!(promotions(fixture.backend()), vec!["promote rpool/t/00000002"]);
    assert_eq!(ids(manager.clones()), vec!["00000002", "00000003"]);
    assert_eq!(
        manager
            .clone_by_id(CloneId::new(3))
            .and_then(|clone| clone.origin_id),
        Some(CloneId::new(2))
    );
    assert_no_stray_snapshots(fixture.backend(), &manager);

    Ok(())
}

#[test]
fn random_lifecycle_keeps_tree_consistent() -> Result<()> {
    let unbounded = RetentionPolicy::unbounded();

    for seed in 0..64 {
        let fixture = ManagerFixture::new()?;
        let mut manager = fixture.init()?;
        let mut rng = StdRng::seed_from_u64(seed);

        for _ in 0..24 {
            let clones = manager.clones();
            let pick = clones[rng.random_range(0..clones.len())].id;
            let is_active = manager.active_clone().map(|clone| clone.id) == Some(pick);

            match rng.random_range(0..3) {
                1 if !is_active => manager.activate(pick, unbounded, false)?,
                2 if !is_active => manager.remove(pick)?,
                _ => {
                    manager.create_clone(unbounded, false)?;
                }
            }

            assert_partition(&manager);
            assert!(manager.active_clone().is_some(), "seed {seed}");
            if let Some(root) = manager.clone_by_id(CloneId::ROOT) {
                assert_eq!(root.origin, None, "seed {seed}");
            }
            assert_no_stray_snapshots(fixture.backend(), &manager);
        }
    }

    Ok(())
}
