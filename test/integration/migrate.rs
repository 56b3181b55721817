// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{active_id, ids, ManagerFixture, POOL};

use anyhow::Result;
use pretty_assertions::assert_eq;
use rand::{rngs::StdRng, SeedableRng};
use std::{
    fs,
    os::unix::{fs::symlink, net::UnixListener},
    path::Path,
};
use zcm::{
    manager::Structural, Backend, CloneId, Error, Manager, MemoryBackend, Migrate,
    MANAGED_PROPERTY,
};

const DATASET: &str = "rpool/data";

fn leftover_temp_dirs(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let name = entry?.file_name().to_string_lossy().into_owned();
        if name.contains(".zcm-") {
            names.push(name);
        }
    }

    Ok(names)
}

#[test]
fn path_migration_copies_directory_content() -> Result<()> {
    let fixture = ManagerFixture::new()?;
    let path = fixture.path();
    fs::create_dir_all(path.join("notes"))?;
    fs::write(path.join("notes/todo.txt"), "buy milk")?;
    symlink("notes/todo.txt", path.join("current"))?;

    let manager = Manager::initialize_with(
        fixture.backend(),
        DATASET,
        &path,
        Some(Migrate::Path),
        &mut StdRng::seed_from_u64(11),
    )?;

    assert_eq!(ids(manager.clones()), vec!["00000000"]);
    assert_eq!(active_id(&manager), Some("00000000".into()));
    assert_eq!(fs::read_to_string(path.join("notes/todo.txt"))?, "buy milk");
    assert_eq!(fs::read_link(path.join("current"))?, Path::new("notes/todo.txt"));
    assert!(leftover_temp_dirs(fixture.scratch().path())?.is_empty());

    Ok(())
}

#[test]
fn path_migration_without_directory_starts_fresh() -> Result<()> {
    let fixture = ManagerFixture::new()?;

    let manager = Manager::initialize_with(
        fixture.backend(),
        DATASET,
        fixture.path(),
        Some(Migrate::Path),
        &mut StdRng::seed_from_u64(11),
    )?;

    assert_eq!(ids(manager.clones()), vec!["00000000"]);
    assert_eq!(manager.next_id(), Some(CloneId::new(1)));

    Ok(())
}

#[test]
fn existing_directory_requires_migration() -> Result<()> {
    let fixture = ManagerFixture::new()?;
    fs::create_dir_all(fixture.path())?;

    let result = Manager::initialize(fixture.backend(), DATASET, fixture.path(), None);

    assert!(matches!(
        result,
        Err(Error::Structural {
            reason: Structural::PathExists(_),
            ..
        })
    ));
    assert!(!fixture.backend().exists(DATASET)?);

    Ok(())
}

#[test]
fn backend_migration_adopts_dataset_without_copying() -> Result<()> {
    let fixture = ManagerFixture::new()?;
    fixture.backend().create(DATASET, None, &[])?;
    fixture.backend().clear_calls();

    let manager = Manager::initialize_with(
        fixture.backend(),
        DATASET,
        fixture.path(),
        Some(Migrate::Backend),
        &mut StdRng::seed_from_u64(5),
    )?;

    let calls = fixture.backend().calls();
    let first = calls.first().cloned().unwrap_or_default();
    assert!(
        first.starts_with("rename rpool/data rpool/zcm-"),
        "unexpected first call {first}"
    );
    assert_eq!(ids(manager.clones()), vec!["00000000"]);
    assert_eq!(active_id(&manager), Some("00000000".into()));
    assert_eq!(
        fixture.backend().find_local_property(MANAGED_PROPERTY)?,
        vec![(
            DATASET.to_owned(),
            fixture.path().to_string_lossy().into_owned()
        )]
    );
    assert!(fixture.backend().is_mounted(DATASET));
    assert_eq!(
        fixture
            .backend()
            .list(Some(POOL), &[], true)?
            .iter()
            .filter(|dataset| dataset.name.contains("zcm-"))
            .count(),
        0
    );

    Ok(())
}

#[test]
fn seeded_generator_gives_reproducible_temp_names() -> Result<()> {
    let mut calls = Vec::new();
    for _ in 0..2 {
        let fixture = ManagerFixture::new()?;
        fixture.backend().create(DATASET, None, &[])?;
        fixture.backend().clear_calls();
        Manager::initialize_with(
            fixture.backend(),
            DATASET,
            "/nonexistent/zcm/data",
            Some(Migrate::Backend),
            &mut StdRng::seed_from_u64(99),
        )?;
        calls.push(fixture.backend().calls());
    }

    assert_eq!(calls[0], calls[1]);

    Ok(())
}

#[test]
fn backend_migration_rejects_dataset_with_children() -> Result<()> {
    let backend = MemoryBackend::with_pool(POOL);
    backend.create(DATASET, None, &[])?;
    backend.create("rpool/data/child", None, &[])?;
    backend.clear_calls();

    let result = Manager::initialize(
        &backend,
        DATASET,
        "/nonexistent/zcm/data",
        Some(Migrate::Backend),
    );

    assert!(matches!(
        result,
        Err(Error::Structural {
            reason: Structural::HasChildren,
            ..
        })
    ));
    assert!(backend.calls().is_empty());

    Ok(())
}

#[test]
fn backend_migration_rejects_managed_dataset() -> Result<()> {
    let fixture = ManagerFixture::new()?;
    fixture.init()?;
    fixture.backend().clear_calls();

    let result = Manager::initialize(
        fixture.backend(),
        crate::ROOT,
        "/nonexistent/zcm/other",
        Some(Migrate::Backend),
    );

    assert!(matches!(
        result,
        Err(Error::Structural {
            reason: Structural::AlreadyManaged,
            ..
        })
    ));
    assert!(fixture.backend().calls().is_empty());

    Ok(())
}

#[test]
fn failed_copy_keeps_original_content_at_temp_path() -> Result<()> {
    let fixture = ManagerFixture::new()?;
    let path = fixture.path();
    fs::create_dir_all(&path)?;
    fs::write(path.join("a.txt"), "kept")?;
    let _socket = UnixListener::bind(path.join("socket"))?;

    let result = Manager::initialize_with(
        fixture.backend(),
        DATASET,
        &path,
        Some(Migrate::Path),
        &mut StdRng::seed_from_u64(3),
    );

    let temp_path = match result {
        Err(Error::Migrate { temp_path, .. }) => temp_path,
        Err(error) => panic!("expected copy failure, got {error:?}"),
        Ok(_) => panic!("expected copy failure, got manager"),
    };
    assert_eq!(temp_path.parent(), path.parent());
    assert_eq!(fs::read_to_string(temp_path.join("a.txt"))?, "kept");
    assert_eq!(
        leftover_temp_dirs(fixture.scratch().path())?,
        vec![temp_path.file_name().unwrap().to_string_lossy().into_owned()]
    );

    Ok(())
}

#[test]
fn backend_failure_after_move_names_temp_path() -> Result<()> {
    let fixture = ManagerFixture::new()?;
    let path = fixture.path();
    fs::create_dir_all(&path)?;
    fs::write(path.join("a.txt"), "kept")?;
    fixture.backend().fail_on("create rpool/data");

    let result = Manager::initialize_with(
        fixture.backend(),
        DATASET,
        &path,
        Some(Migrate::Path),
        &mut StdRng::seed_from_u64(3),
    );

    let (source, temp_path) = match result {
        Err(Error::MigrateAborted { source, temp_path }) => (source, temp_path),
        Err(error) => panic!("expected aborted migration, got {error:?}"),
        Ok(_) => panic!("expected aborted migration, got manager"),
    };
    assert!(matches!(*source, Error::Backend(_)));
    assert!(!path.exists());
    assert_eq!(fs::read_to_string(temp_path.join("a.txt"))?, "kept");

    Ok(())
}
