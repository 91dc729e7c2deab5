//! End-to-end scenarios driving `Engine` directly, covering the concrete
//! scenarios and testable properties from spec.md §8.

use anyhow::{Context, Result};
use omnifs::config::Config;
use omnifs::engine::Engine;
use omnifs::error::OfsError;
use tempfile::NamedTempFile;

fn fresh_engine() -> Result<Engine> {
    let config = Config {
        total_size: 1 << 20,
        header_size: 0,
        block_size: 4096,
        max_files: 64,
        max_filename_length: 255,
        max_users: 16,
        admin_username: "admin".into(),
        admin_password: "admin".into(),
        require_auth: false,
        port: 8080,
        max_connections: 64,
        queue_timeout: 0,
    };
    let file = NamedTempFile::new().context("creating temp container path")?;
    let path = file.path().to_path_buf();
    drop(file);
    Engine::open_or_format(path, config).context("formatting and loading a fresh container")
}

#[test]
fn scenario_1_format_then_init_has_only_admin_and_empty_root() -> Result<()> {
    let engine = fresh_engine()?;
    let users = engine.user_list();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].username, "admin");
    assert!(users[0].is_admin);
    assert!(users[0].is_active);
    assert!(engine.dir_list("/")?.is_empty());
    Ok(())
}

#[test]
fn scenario_2_login_and_session_gate() -> Result<()> {
    let mut engine = fresh_engine()?;
    let session = engine.user_login("admin", "admin")?;
    assert!(!session.session_id.is_empty());
    match engine.user_login("admin", "wrong") {
        Err(OfsError::PermissionDenied) => {}
        other => panic!("expected PermissionDenied, got {other:?}"),
    }
    Ok(())
}

#[test]
fn scenario_3_dir_create_is_idempotent_free_and_root_is_protected() -> Result<()> {
    let mut engine = fresh_engine()?;
    engine.dir_create("/a")?;
    match engine.dir_create("/a") {
        Err(OfsError::FileExists(_)) => {}
        other => panic!("expected FileExists, got {other:?}"),
    }
    engine.dir_delete("/a")?;
    match engine.dir_delete("/") {
        Err(OfsError::InvalidOperation(_)) => {}
        other => panic!("expected InvalidOperation, got {other:?}"),
    }
    Ok(())
}

#[test]
fn scenario_4_file_create_read_and_metadata() -> Result<()> {
    let mut engine = fresh_engine()?;
    engine.file_create("/f", Some(b"hello"), 5)?;
    let content = engine.file_read("/f")?;
    assert_eq!(String::from_utf8(content)?, "hello");
    let meta = engine.get_metadata("/f")?;
    assert_eq!(meta.blocks_used, 1);
    Ok(())
}

#[test]
fn scenario_5_no_space_clears_once_a_run_reappears() -> Result<()> {
    let mut engine = fresh_engine()?;
    let mut created = 0;
    loop {
        let name = format!("/f{created}");
        match engine.file_create(&name, None, 4096) {
            Ok(()) => created += 1,
            Err(OfsError::NoSpace) => break,
            Err(e) => return Err(e.into()),
        }
    }
    assert!(created > 0);
    engine.file_delete("/f0")?;
    engine.file_create("/overflow", None, 4096)?;
    Ok(())
}

#[test]
fn scenario_6_directory_not_empty_then_cleared() -> Result<()> {
    let mut engine = fresh_engine()?;
    engine.dir_create("/d")?;
    engine.file_create("/d/x", Some(b""), 0)?;
    match engine.dir_delete("/d") {
        Err(OfsError::DirectoryNotEmpty(_)) => {}
        other => panic!("expected DirectoryNotEmpty, got {other:?}"),
    }
    engine.file_delete("/d/x")?;
    engine.dir_delete("/d")?;
    Ok(())
}

/// P1: format -> init -> save -> init round-trips users, tree shape, and
/// file contents byte-for-byte.
#[test]
fn property_round_trip_through_save_and_reinit() -> Result<()> {
    let config = Config {
        total_size: 1 << 20,
        header_size: 0,
        block_size: 4096,
        max_files: 64,
        max_filename_length: 255,
        max_users: 16,
        admin_username: "admin".into(),
        admin_password: "admin".into(),
        require_auth: false,
        port: 8080,
        max_connections: 64,
        queue_timeout: 0,
    };
    let file = NamedTempFile::new()?;
    let path = file.path().to_path_buf();
    drop(file);

    let mut engine = Engine::open_or_format(&path, config.clone())?;
    engine.dir_create("/docs")?;
    engine.file_create("/docs/readme", Some(b"contents"), 8)?;
    engine.user_create("alice", "secret", false)?;

    let reloaded = Engine::open_or_format(&path, config)?;
    assert_eq!(reloaded.user_list().len(), 2);
    assert_eq!(reloaded.dir_list("/")?.len(), 1);
    assert_eq!(reloaded.file_read("/docs/readme")?, b"contents");
    Ok(())
}

/// P6: metadata after create reports the requested size and the expected
/// block count.
#[test]
fn property_metadata_matches_create_arguments() -> Result<()> {
    let mut engine = fresh_engine()?;
    engine.file_create("/big", None, 5000)?;
    let meta = engine.get_metadata("/big")?;
    assert_eq!(meta.size, 5000);
    assert_eq!(meta.blocks_used, 2); // ceil(5000 / 4096)
    Ok(())
}
