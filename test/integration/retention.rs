// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{active_id, ids, ManagerFixture};

use anyhow::Result;
use pretty_assertions::assert_eq;
use zcm::{
    manager::{retention::Limit, Structural},
    CloneId, Error, RetentionPolicy,
};

#[test]
fn clone_preflight_rejects_without_touching_backend() -> Result<()> {
    let fixture = ManagerFixture::new()?;
    let mut manager = fixture.init_with_clones(1)?;
    fixture.backend().clear_calls();

    let policy = RetentionPolicy {
        max_newer: Some(1),
        ..RetentionPolicy::unbounded()
    };
    let result = manager.create_clone(policy, false);

    assert!(matches!(
        result,
        Err(Error::PolicyViolation {
            limit: Limit::Newer,
            current: 2,
            max: 1
        })
    ));
    assert!(fixture.backend().calls().is_empty());
    assert_eq!(manager.clones().len(), 2);

    Ok(())
}

#[test]
fn clone_preflight_ignores_older_cap() -> Result<()> {
    let fixture = ManagerFixture::new()?;
    let mut manager = fixture.init_with_clones(2)?;
    manager.activate(CloneId::new(2), RetentionPolicy::unbounded(), false)?;

    let policy = RetentionPolicy {
        max_older: Some(0),
        ..RetentionPolicy::unbounded()
    };
    let created = manager.create_clone(policy, false)?;

    assert_eq!(created.id, CloneId::new(3));
    assert_eq!(ids(manager.older_clones()), vec!["00000000", "00000001"]);

    Ok(())
}

#[test]
fn clone_with_auto_remove_evicts_to_fit() -> Result<()> {
    let fixture = ManagerFixture::new()?;
    let mut manager = fixture.init_with_clones(1)?;

    let policy = RetentionPolicy {
        max_total: Some(2),
        ..RetentionPolicy::unbounded()
    };
    let created = manager.create_clone(policy, true)?;

    assert_eq!(created.id, CloneId::new(2));
    assert_eq!(ids(manager.clones()), vec!["00000000", "00000002"]);
    assert_eq!(active_id(&manager), Some("00000000".into()));

    Ok(())
}

#[test]
fn activate_preflight_counts_around_target() -> Result<()> {
    let fixture = ManagerFixture::new()?;
    let mut manager = fixture.init_with_clones(2)?;
    fixture.backend().clear_calls();

    let policy = RetentionPolicy {
        max_older: Some(1),
        ..RetentionPolicy::unbounded()
    };
    let result = manager.activate(CloneId::new(2), policy, false);

    assert!(matches!(
        result,
        Err(Error::PolicyViolation {
            limit: Limit::Older,
            current: 2,
            max: 1
        })
    ));
    assert!(fixture.backend().calls().is_empty());
    assert_eq!(active_id(&manager), Some("00000000".into()));

    manager.activate(CloneId::new(1), policy, false)?;
    assert_eq!(active_id(&manager), Some("00000001".into()));

    Ok(())
}

#[test]
fn activate_with_auto_remove_evicts_older_clones() -> Result<()> {
    let fixture = ManagerFixture::new()?;
    let mut manager = fixture.init_with_clones(2)?;

    let policy = RetentionPolicy {
        max_older: Some(1),
        ..RetentionPolicy::unbounded()
    };
    manager.activate(CloneId::new(2), policy, true)?;

    assert_eq!(active_id(&manager), Some("00000002".into()));
    assert_eq!(ids(manager.older_clones()), vec!["00000001"]);
    assert!(manager.newer_clones().is_empty());

    Ok(())
}

#[test]
fn auto_remove_is_idempotent() -> Result<()> {
    let fixture = ManagerFixture::new()?;
    let mut manager = fixture.init_with_clones(4)?;
    manager.activate(CloneId::new(2), RetentionPolicy::unbounded(), false)?;

    let policy = RetentionPolicy {
        max_older: Some(1),
        max_newer: Some(1),
        max_total: Some(3),
    };
    let first = manager.auto_remove(policy)?;
    assert_eq!(first, vec![CloneId::new(0), CloneId::new(3)]);
    assert_eq!(ids(manager.clones()), vec!["00000001", "00000002", "00000004"]);

    fixture.backend().clear_calls();
    let second = manager.auto_remove(policy)?;
    assert!(second.is_empty());
    assert!(fixture.backend().calls().is_empty());

    Ok(())
}

#[test]
fn total_cap_prefers_older_clones() -> Result<()> {
    let fixture = ManagerFixture::new()?;
    let mut manager = fixture.init_with_clones(3)?;
    manager.activate(CloneId::new(1), RetentionPolicy::unbounded(), false)?;

    let policy = RetentionPolicy {
        max_total: Some(2),
        ..RetentionPolicy::unbounded()
    };
    let removed = manager.auto_remove(policy)?;

    assert_eq!(removed, vec![CloneId::new(0), CloneId::new(2)]);
    assert_eq!(ids(manager.clones()), vec!["00000001", "00000003"]);

    Ok(())
}

#[test]
fn total_cap_below_one_cannot_be_met() -> Result<()> {
    let fixture = ManagerFixture::new()?;
    let mut manager = fixture.init_with_clones(1)?;

    let policy = RetentionPolicy {
        max_total: Some(0),
        ..RetentionPolicy::unbounded()
    };
    let result = manager.auto_remove(policy);

    assert!(matches!(
        result,
        Err(Error::Structural {
            reason: Structural::NothingToEvict,
            ..
        })
    ));
    assert_eq!(ids(manager.clones()), vec!["00000000"]);

    Ok(())
}
