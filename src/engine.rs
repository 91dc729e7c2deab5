//! `Engine` composes the bitmap, tree, users index, and session store into
//! the typed filesystem operations of spec.md §4.5. Every operation
//! validates its arguments before mutating anything, so a returned `Err`
//! leaves the engine's in-memory state untouched; every successful mutation
//! is followed by a full metadata-region save (spec.md §4.4).

use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::bitmap::FreeSpaceBitmap;
use crate::config::Config;
use crate::container::record::{string_into_fixed, UserRecord, ROLE_ADMIN, ROLE_NORMAL, SECRET_MAX, USERNAME_MAX};
use crate::container::{self, io::now, Layout};
use crate::error::{OfsError, OfsResult};
use crate::index::OrderedIndex;
use crate::session::{SessionInfo, SessionStore};
use crate::tree::{parse_path, EntryKind, FsTree, TreeNode, ROOT};

/// One child of a directory, as returned by `dir_list`.
#[derive(Debug, Clone)]
pub struct DirEntrySummary {
    pub name: String,
    pub is_directory: bool,
    pub size: u64,
}

/// A user, as returned by `user_list`.
#[derive(Debug, Clone)]
pub struct UserSummary {
    pub username: String,
    pub is_admin: bool,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct Metadata {
    pub name: String,
    pub size: u64,
    pub permissions: u32,
    pub blocks_used: usize,
}

#[derive(Debug, Clone)]
pub struct Stats {
    pub total_size: u64,
    pub used_space: u64,
    pub free_space: u64,
    pub total_files: usize,
    pub total_directories: usize,
    pub total_users: usize,
    pub active_sessions: usize,
}

/// The composite engine owned by the server. Passed explicitly into every
/// operation rather than kept as process-wide state (spec.md §9 "Global
/// mutable state").
pub struct Engine {
    pub config: Config,
    pub sessions: SessionStore,
    container_path: PathBuf,
    layout: Layout,
    tree: FsTree,
    users: OrderedIndex<UserRecord>,
    bitmap: FreeSpaceBitmap,
}

impl Engine {
    /// Formats a fresh container if `container_path` does not already
    /// exist, then loads it. Mirrors the original's `initFileSystem`
    /// sequence (`fs_format` only if absent, then `fs_init`).
    pub fn open_or_format(container_path: impl AsRef<Path>, config: Config) -> OfsResult<Engine> {
        let container_path = container_path.as_ref().to_path_buf();
        if !container_path.exists() {
            info!("container not found, formatting a new one");
            container::format(&container_path, &config)?;
        }
        let state = container::init(&container_path, &config)?;
        Ok(Engine {
            config,
            sessions: SessionStore::new(),
            container_path,
            layout: state.layout,
            tree: state.tree,
            users: state.users,
            bitmap: state.bitmap,
        })
    }

    fn save(&mut self) -> OfsResult<()> {
        container::save(
            &self.container_path,
            &self.layout,
            &self.tree,
            &self.users,
            &mut self.bitmap,
        )
    }

    // ---- users ----

    pub fn user_create(&mut self, username: &str, password: &str, is_admin: bool) -> OfsResult<()> {
        if self.users.contains(username) {
            return Err(OfsError::FileExists(username.to_string()));
        }
        let record = UserRecord {
            username: string_into_fixed::<USERNAME_MAX>(username),
            password_hash: string_into_fixed::<SECRET_MAX>(password),
            role: if is_admin { ROLE_ADMIN } else { ROLE_NORMAL },
            is_active: 1,
            _pad: [0; 6],
            created_at: now(),
        };
        self.users.insert(username, record);
        self.save()
    }

    pub fn user_delete(&mut self, username: &str) -> OfsResult<()> {
        if self.users.remove(username).is_none() {
            return Err(OfsError::NotFound(username.to_string()));
        }
        self.save()
    }

    pub fn user_list(&self) -> Vec<UserSummary> {
        self.users
            .list_in_order()
            .map(|(_, u)| UserSummary {
                username: u.username_str(),
                is_admin: u.role == ROLE_ADMIN,
                is_active: u.is_active == 1,
            })
            .collect()
    }

    pub fn user_login(&mut self, username: &str, password: &str) -> OfsResult<SessionInfo> {
        let user = self
            .users
            .find(username)
            .ok_or_else(|| OfsError::NotFound(username.to_string()))?;
        if user.password_str() != password {
            return Err(OfsError::PermissionDenied);
        }
        debug!("user_login: session created for {username}");
        Ok(self.sessions.create(user, now()))
    }

    pub fn user_logout(&mut self, session_id: &str) -> OfsResult<()> {
        if self.sessions.remove(session_id) {
            Ok(())
        } else {
            Err(OfsError::InvalidSession)
        }
    }

    // ---- directories ----

    pub fn dir_create(&mut self, path: &str) -> OfsResult<()> {
        let (parent_path, name) = parse_path(path);
        let parent_id = self.require_directory(&parent_path)?;
        if self.tree.has_child(parent_id, &name) {
            return Err(OfsError::FileExists(path.to_string()));
        }
        let node = TreeNode {
            name: name.clone(),
            kind: EntryKind::Directory {
                children: OrderedIndex::new(),
            },
            parent: Some(parent_id),
            permissions: 0o755,
            owner: "admin".to_string(),
            size: 0,
            created_at: now(),
            modified_at: now(),
        };
        let id = self.tree.alloc(node);
        self.tree.link_child(parent_id, &name, id);
        self.save()
    }

    pub fn dir_delete(&mut self, path: &str) -> OfsResult<()> {
        if path == "/" {
            return Err(OfsError::InvalidOperation("cannot delete root".to_string()));
        }
        let (parent_path, name) = parse_path(path);
        let parent_id = self
            .tree
            .find_by_path(&parent_path)
            .ok_or_else(|| OfsError::NotFound(parent_path.clone()))?;
        let node_id = self
            .tree
            .find_child(parent_id, &name)
            .ok_or_else(|| OfsError::NotFound(path.to_string()))?;
        let node = self.tree.get(node_id).expect("just looked up");
        if !node.is_directory() {
            return Err(OfsError::InvalidOperation(format!("{path} is a file")));
        }
        if !self.tree.list_children(node_id).is_empty() {
            return Err(OfsError::DirectoryNotEmpty(path.to_string()));
        }
        self.tree.unlink_child(parent_id, &name);
        self.tree.dealloc(node_id);
        self.save()
    }

    pub fn dir_list(&self, path: &str) -> OfsResult<Vec<DirEntrySummary>> {
        let id = self.require_directory(path)?;
        Ok(self
            .tree
            .list_children(id)
            .into_iter()
            .map(|child_id| {
                let child = self.tree.get(child_id).expect("listed child must resolve");
                DirEntrySummary {
                    name: child.name.clone(),
                    is_directory: child.is_directory(),
                    size: child.size,
                }
            })
            .collect())
    }

    pub fn dir_exists(&self, path: &str) -> OfsResult<()> {
        match self.tree.find_by_path(path) {
            Some(id) if self.tree.get(id).is_some_and(|n| n.is_directory()) => Ok(()),
            _ => Err(OfsError::NotFound(path.to_string())),
        }
    }

    pub fn file_exists(&self, path: &str) -> OfsResult<()> {
        match self.tree.find_by_path(path) {
            Some(id) if self.tree.get(id).is_some_and(|n| !n.is_directory()) => Ok(()),
            _ => Err(OfsError::NotFound(path.to_string())),
        }
    }

    // ---- files ----

    pub fn file_create(&mut self, path: &str, data: Option<&[u8]>, size: u64) -> OfsResult<()> {
        let (parent_path, name) = parse_path(path);
        let parent_id = self.require_directory(&parent_path)?;
        if self.tree.has_child(parent_id, &name) {
            return Err(OfsError::FileExists(path.to_string()));
        }

        let blocks_needed = if size == 0 {
            1
        } else {
            ((size + self.config.block_size - 1) / self.config.block_size) as usize
        };
        let start = self
            .bitmap
            .find_free_run(blocks_needed)
            .ok_or(OfsError::NoSpace)?;
        self.bitmap.set_run(start, blocks_needed);

        let data_blocks: Vec<u32> = (start..start + blocks_needed).map(|b| b as u32).collect();
        let node = TreeNode {
            name: name.clone(),
            kind: EntryKind::File {
                data_blocks: data_blocks.clone(),
            },
            parent: Some(parent_id),
            permissions: 0o644,
            owner: "admin".to_string(),
            size,
            created_at: now(),
            modified_at: now(),
        };
        let id = self.tree.alloc(node);
        self.tree.link_child(parent_id, &name, id);

        if let Some(bytes) = data {
            if !bytes.is_empty() {
                container::write_blocks(&self.container_path, &self.layout, &data_blocks, bytes)?;
            }
        }

        self.save()
    }

    pub fn file_delete(&mut self, path: &str) -> OfsResult<()> {
        let (parent_path, name) = parse_path(path);
        let parent_id = self
            .tree
            .find_by_path(&parent_path)
            .ok_or_else(|| OfsError::NotFound(parent_path.clone()))?;
        let node_id = self
            .tree
            .find_child(parent_id, &name)
            .ok_or_else(|| OfsError::NotFound(path.to_string()))?;
        let node = self.tree.get(node_id).expect("just looked up");
        if node.is_directory() {
            return Err(OfsError::InvalidOperation(format!("{path} is a directory")));
        }
        if let EntryKind::File { data_blocks } = &node.kind {
            if let (Some(&start), len) = (data_blocks.first(), data_blocks.len()) {
                self.bitmap.free_run(start as usize, len);
            }
        }
        self.tree.unlink_child(parent_id, &name);
        self.tree.dealloc(node_id);
        self.save()
    }

    pub fn file_read(&self, path: &str) -> OfsResult<Vec<u8>> {
        let id = self
            .tree
            .find_by_path(path)
            .ok_or_else(|| OfsError::NotFound(path.to_string()))?;
        let node = self.tree.get(id).expect("found id must resolve");
        if node.is_directory() {
            return Err(OfsError::NotFound(path.to_string()));
        }
        if node.size == 0 {
            return Ok(Vec::new());
        }
        let EntryKind::File { data_blocks } = &node.kind else {
            unreachable!("checked not a directory above")
        };
        container::read_blocks(&self.container_path, &self.layout, data_blocks, node.size)
    }

    pub fn file_edit(&mut self, path: &str, data: &[u8], size: u64, index: u32) -> OfsResult<()> {
        let id = self
            .tree
            .find_by_path(path)
            .ok_or_else(|| OfsError::NotFound(path.to_string()))?;
        {
            let node = self.tree.get(id).expect("found id must resolve");
            if node.is_directory() {
                return Err(OfsError::NotFound(path.to_string()));
            }
        }
        if index != 0 {
            return Err(OfsError::NotImplemented("file_edit at non-zero index".to_string()));
        }
        let data_blocks = match &self.tree.get(id).unwrap().kind {
            EntryKind::File { data_blocks } => data_blocks.clone(),
            EntryKind::Directory { .. } => unreachable!(),
        };
        let capacity = data_blocks.len() as u64 * self.config.block_size;
        if size > capacity {
            return Err(OfsError::NoSpace);
        }
        container::write_blocks(&self.container_path, &self.layout, &data_blocks, data)?;
        self.tree.get_mut(id).unwrap().size = size;
        self.tree.get_mut(id).unwrap().modified_at = now();
        self.save()
    }

    pub fn file_truncate(&mut self, path: &str) -> OfsResult<()> {
        let id = self
            .tree
            .find_by_path(path)
            .ok_or_else(|| OfsError::NotFound(path.to_string()))?;
        if self.tree.get(id).unwrap().is_directory() {
            return Err(OfsError::NotFound(path.to_string()));
        }
        let node = self.tree.get_mut(id).unwrap();
        node.size = 0;
        node.modified_at = now();
        self.save()
    }

    /// Renames the basename of `old_path` to the basename of `new_path`
    /// within `old_path`'s current parent. The destination parent is
    /// validated to exist but the node is NOT relinked under it — this
    /// matches the original implementation exactly (see SPEC_FULL.md §9.2).
    pub fn file_rename(&mut self, old_path: &str, new_path: &str) -> OfsResult<()> {
        let id = self
            .tree
            .find_by_path(old_path)
            .ok_or_else(|| OfsError::NotFound(old_path.to_string()))?;
        let (new_parent_path, new_name) = parse_path(new_path);
        self.tree
            .find_by_path(&new_parent_path)
            .ok_or_else(|| OfsError::NotFound(new_parent_path.clone()))?;

        let current_parent = self.tree.get(id).unwrap().parent.unwrap_or(ROOT);
        let old_name = self.tree.get(id).unwrap().name.clone();
        if new_name != old_name && self.tree.has_child(current_parent, &new_name) {
            return Err(OfsError::FileExists(new_path.to_string()));
        }
        self.tree.unlink_child(current_parent, &old_name);
        self.tree.get_mut(id).unwrap().name = new_name.clone();
        let linked = self.tree.link_child(current_parent, &new_name, id);
        debug_assert!(linked, "collision already ruled out above");
        self.save()
    }

    pub fn get_metadata(&self, path: &str) -> OfsResult<Metadata> {
        let id = self
            .tree
            .find_by_path(path)
            .ok_or_else(|| OfsError::NotFound(path.to_string()))?;
        let node = self.tree.get(id).expect("found id must resolve");
        let blocks_used = match &node.kind {
            EntryKind::File { data_blocks } => data_blocks.len(),
            EntryKind::Directory { .. } => 0,
        };
        Ok(Metadata {
            name: node.name.clone(),
            size: node.size,
            permissions: node.permissions,
            blocks_used,
        })
    }

    pub fn set_permissions(&mut self, path: &str, mode: u32) -> OfsResult<()> {
        let id = self
            .tree
            .find_by_path(path)
            .ok_or_else(|| OfsError::NotFound(path.to_string()))?;
        self.tree.get_mut(id).unwrap().permissions = mode;
        self.save()
    }

    pub fn get_stats(&self) -> Stats {
        let mut total_files = 0usize;
        let mut total_directories = 0usize;
        let mut used_space = 0u64;
        let mut stack = vec![ROOT];
        while let Some(id) = stack.pop() {
            let node = self.tree.get(id).expect("stack only holds live ids");
            if node.is_directory() {
                total_directories += 1;
                stack.extend(self.tree.list_children(id));
            } else {
                total_files += 1;
                used_space += node.size;
            }
        }
        Stats {
            total_size: self.config.total_size,
            used_space,
            free_space: self.config.total_size.saturating_sub(used_space),
            total_files,
            total_directories,
            total_users: self.users.len(),
            active_sessions: self.sessions.count(),
        }
    }

    fn require_directory(&self, path: &str) -> OfsResult<crate::tree::NodeId> {
        let id = self
            .tree
            .find_by_path(path)
            .ok_or_else(|| OfsError::NotFound(path.to_string()))?;
        if !self.tree.get(id).unwrap().is_directory() {
            return Err(OfsError::NotFound(path.to_string()));
        }
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn test_engine() -> Engine {
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
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_path_buf();
        // drop the handle so Engine can create it fresh via `format`
        drop(file);
        Engine::open_or_format(path, config).unwrap()
    }

    #[test]
    fn scenario_login_and_bad_password() {
        let mut engine = test_engine();
        assert!(engine.user_login("admin", "admin").is_ok());
        assert!(matches!(
            engine.user_login("admin", "wrong"),
            Err(OfsError::PermissionDenied)
        ));
    }

    #[test]
    fn scenario_dir_create_duplicate_and_root_delete() {
        let mut engine = test_engine();
        engine.dir_create("/a").unwrap();
        assert!(matches!(engine.dir_create("/a"), Err(OfsError::FileExists(_))));
        assert!(engine.dir_delete("/a").is_ok());
        assert!(matches!(engine.dir_delete("/"), Err(OfsError::InvalidOperation(_))));
    }

    #[test]
    fn scenario_file_create_read_metadata() {
        let mut engine = test_engine();
        engine.file_create("/f", Some(b"hello"), 5).unwrap();
        let content = engine.file_read("/f").unwrap();
        assert_eq!(content, b"hello");
        let meta = engine.get_metadata("/f").unwrap();
        assert_eq!(meta.size, 5);
        assert_eq!(meta.blocks_used, 1);
    }

    #[test]
    fn scenario_directory_not_empty_then_cleared() {
        let mut engine = test_engine();
        engine.dir_create("/d").unwrap();
        engine.file_create("/d/x", Some(b""), 0).unwrap();
        assert!(matches!(
            engine.dir_delete("/d"),
            Err(OfsError::DirectoryNotEmpty(_))
        ));
        engine.file_delete("/d/x").unwrap();
        assert!(engine.dir_delete("/d").is_ok());
    }

    #[test]
    fn scenario_no_space_then_reclaimed() {
        let mut engine = test_engine();
        let usable_blocks =
            (engine.layout.total_blocks - engine.layout.data_blocks_start_block) as u64;
        for i in 0..usable_blocks {
            engine
                .file_create(&format!("/f{i}"), None, engine.config.block_size)
                .unwrap();
        }
        assert!(matches!(
            engine.file_create("/overflow", None, engine.config.block_size),
            Err(OfsError::NoSpace)
        ));
        engine.file_delete("/f0").unwrap();
        assert!(engine.file_create("/overflow", None, engine.config.block_size).is_ok());
    }

    #[test]
    fn file_edit_rejects_growth_past_allocation() {
        let mut engine = test_engine();
        engine.file_create("/f", Some(b"hi"), 2).unwrap();
        let big = vec![0u8; (engine.config.block_size + 1) as usize];
        assert!(matches!(
            engine.file_edit("/f", &big, big.len() as u64, 0),
            Err(OfsError::NoSpace)
        ));
    }

    #[test]
    fn file_truncate_keeps_allocation_for_later_edit() {
        let mut engine = test_engine();
        engine.file_create("/f", Some(b"hello"), 5).unwrap();
        engine.file_truncate("/f").unwrap();
        assert_eq!(engine.get_metadata("/f").unwrap().size, 0);
        assert_eq!(engine.get_metadata("/f").unwrap().blocks_used, 1);
        engine.file_edit("/f", b"hi", 2, 0).unwrap();
        assert_eq!(engine.get_metadata("/f").unwrap().size, 2);
    }

    #[test]
    fn stats_report_logical_bytes() {
        let mut engine = test_engine();
        engine.file_create("/f", Some(b"hello"), 5).unwrap();
        let stats = engine.get_stats();
        assert_eq!(stats.used_space, 5);
        assert_eq!(stats.total_files, 1);
    }
}
