//! Container lifecycle: `format`, `init`, `save`, and raw block I/O.
//!
//! The container file is opened fresh for every operation (format, init,
//! save, and each block read/write) rather than held open across calls —
//! coarse but deterministic, matching spec.md §4.4/§5.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::info;
use zerocopy::{FromBytes, IntoBytes};

use crate::bitmap::FreeSpaceBitmap;
use crate::config::Config;
use crate::container::layout::Layout;
use crate::container::record::{
    string_into_fixed, EntryRecord, OmniHeader, UserRecord, ENTRY_TYPE_DIRECTORY,
    ENTRY_TYPE_FILE, MAGIC, OWNER_MAX, ROLE_ADMIN, SECRET_MAX, USERNAME_MAX,
};
use crate::error::{OfsError, OfsResult};
use crate::index::OrderedIndex;
use crate::tree::{parse_path, EntryKind, FsTree, TreeNode, ROOT};

/// Result of a successful `init`: everything `Engine` needs to resume operation.
pub struct LoadedState {
    pub layout: Layout,
    pub tree: FsTree,
    pub users: OrderedIndex<UserRecord>,
    pub bitmap: FreeSpaceBitmap,
}

pub(crate) fn now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Creates the container file at exact length `config.total_size`, with a
/// freshly-formatted header, user table (admin only), entry table (root
/// only), and bitmap with the metadata reservation marked allocated.
pub fn format(path: impl AsRef<Path>, config: &Config) -> OfsResult<Layout> {
    let layout = Layout::from_config(config);
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path.as_ref())?;

    let header = OmniHeader {
        magic: MAGIC,
        total_size: config.total_size,
        header_size: OmniHeader::SIZE as u64,
        block_size: config.block_size,
        max_users: config.max_users as u32,
        _pad: 0,
        user_table_offset: layout.user_table_offset,
    };
    file.seek(SeekFrom::Start(0))?;
    file.write_all(header.as_bytes())?;

    // User table: all slots zeroed, then slot 0 overwritten with the admin user.
    file.seek(SeekFrom::Start(layout.user_table_offset))?;
    let empty_user = UserRecord::empty();
    for _ in 0..config.max_users {
        file.write_all(empty_user.as_bytes())?;
    }
    let admin = UserRecord {
        username: string_into_fixed::<USERNAME_MAX>(&config.admin_username),
        password_hash: string_into_fixed::<SECRET_MAX>(&config.admin_password),
        role: ROLE_ADMIN,
        is_active: 1,
        _pad: [0; 6],
        created_at: now(),
    };
    file.seek(SeekFrom::Start(layout.user_table_offset))?;
    file.write_all(admin.as_bytes())?;

    // Entry table: root entry first, then zeroed slots.
    let root_entry = EntryRecord {
        name: string_into_fixed("/"),
        entry_type: ENTRY_TYPE_DIRECTORY,
        _pad0: [0; 3],
        permissions: 0o755,
        size: 0,
        owner: string_into_fixed::<OWNER_MAX>("admin"),
        inode: 0,
        parent_inode: 0,
        created_at: now(),
        modified_at: now(),
    };
    file.seek(SeekFrom::Start(layout.entry_table_offset))?;
    file.write_all(root_entry.as_bytes())?;
    let empty_entry = EntryRecord::empty();
    for _ in 0..config.max_files - 1 {
        file.write_all(empty_entry.as_bytes())?;
    }

    // Bitmap: metadata reservation marked allocated, everything else free.
    let mut bitmap = FreeSpaceBitmap::new(layout.total_blocks);
    bitmap.set_run(0, layout.data_blocks_start_block);
    file.seek(SeekFrom::Start(layout.bitmap_offset))?;
    let mut padded = bitmap.as_bytes().to_vec();
    padded.resize(layout.bitmap_aligned_size as usize, 0);
    file.write_all(&padded)?;

    // Extend the (sparse) file to its exact final length.
    file.seek(SeekFrom::Start(config.total_size - 1))?;
    file.write_all(&[0u8])?;
    file.flush()?;

    info!("fs_format: formatted container at {:?}", path.as_ref());
    Ok(layout)
}

/// Loads the container at `path`, validating the magic and reconstructing
/// the in-memory users index, tree, and bitmap.
pub fn init(path: impl AsRef<Path>, config: &Config) -> OfsResult<LoadedState> {
    let mut file = File::open(path.as_ref())?;

    let mut header_bytes = vec![0u8; OmniHeader::SIZE];
    file.read_exact(&mut header_bytes)?;
    let header = OmniHeader::read_from_bytes(&header_bytes)
        .map_err(|_| OfsError::Io("truncated header".to_string()))?;
    if header.magic != MAGIC {
        return Err(OfsError::Io("magic mismatch".to_string()));
    }

    let layout = Layout::from_config(config);

    let mut users = OrderedIndex::new();
    file.seek(SeekFrom::Start(header.user_table_offset))?;
    for _ in 0..header.max_users {
        let mut buf = [0u8; UserRecord::SIZE];
        file.read_exact(&mut buf)?;
        let user = UserRecord::read_from_bytes(&buf)
            .map_err(|_| OfsError::Io("truncated user record".to_string()))?;
        if user.is_active == 1 {
            users.insert(user.username_str(), user);
        }
    }

    let mut tree = FsTree::empty();
    let root_id = tree.alloc(TreeNode {
        name: "/".to_string(),
        kind: EntryKind::Directory {
            children: OrderedIndex::new(),
        },
        parent: None,
        permissions: 0o755,
        owner: "admin".to_string(),
        size: 0,
        created_at: now(),
        modified_at: now(),
    });
    debug_assert_eq!(root_id, ROOT);

    file.seek(SeekFrom::Start(layout.entry_table_offset))?;
    for _ in 0..config.max_files {
        let mut buf = [0u8; EntryRecord::SIZE];
        file.read_exact(&mut buf)?;
        let entry = EntryRecord::read_from_bytes(&buf)
            .map_err(|_| OfsError::Io("truncated entry record".to_string()))?;
        if entry.is_empty_slot() {
            continue;
        }
        let full_path = entry.name_str();
        if full_path == "/" {
            continue;
        }
        let (parent_path, basename) = parse_path(&full_path);
        let Some(parent_id) = tree.find_by_path(&parent_path) else {
            continue;
        };

        let kind = if entry.is_directory() {
            EntryKind::Directory {
                children: OrderedIndex::new(),
            }
        } else {
            let mut blocks = Vec::new();
            if entry.size > 0 {
                let blocks_needed =
                    (entry.size + config.block_size - 1) / config.block_size;
                for b in 0..blocks_needed {
                    blocks.push(entry.inode + b as u32);
                }
            }
            EntryKind::File { data_blocks: blocks }
        };

        let node = TreeNode {
            name: basename.clone(),
            kind,
            parent: Some(parent_id),
            permissions: entry.permissions,
            owner: entry.owner_str(),
            size: entry.size,
            created_at: entry.created_at,
            modified_at: entry.modified_at,
        };
        let id = tree.alloc(node);
        tree.link_child(parent_id, &basename, id);
    }

    let mut bitmap = FreeSpaceBitmap::new(layout.total_blocks);
    file.seek(SeekFrom::Start(layout.bitmap_offset))?;
    let mut bitmap_bytes = vec![0u8; layout.bitmap_aligned_size as usize];
    file.read_exact(&mut bitmap_bytes)?;
    bitmap.load_from_bytes(&bitmap_bytes);

    info!("fs_init: loaded container from {:?}", path.as_ref());
    Ok(LoadedState {
        layout,
        tree,
        users,
        bitmap,
    })
}

/// Rewrites the user table, entry table, and bitmap in full. Never shrinks
/// or extends the container.
///
/// Per spec.md §9.1, the root directory is never written back to the entry
/// table: `tree.preorder_descendants()` enumerates the root's descendants
/// only. `init` always synthesizes the root in memory, so this is safe.
pub fn save(
    path: impl AsRef<Path>,
    layout: &Layout,
    tree: &FsTree,
    users: &OrderedIndex<UserRecord>,
    bitmap: &mut FreeSpaceBitmap,
) -> OfsResult<()> {
    let mut file = OpenOptions::new().read(true).write(true).open(path.as_ref())?;

    file.seek(SeekFrom::Start(layout.user_table_offset))?;
    let empty_user = UserRecord::empty();
    for _ in 0..layout.max_users {
        file.write_all(empty_user.as_bytes())?;
    }
    file.seek(SeekFrom::Start(layout.user_table_offset))?;
    for (_, user) in users.list_in_order() {
        file.write_all(user.as_bytes())?;
    }

    let descendants = tree.preorder_descendants();

    file.seek(SeekFrom::Start(layout.entry_table_offset))?;
    let empty_entry = EntryRecord::empty();
    for _ in 0..layout.max_files {
        file.write_all(empty_entry.as_bytes())?;
    }
    file.seek(SeekFrom::Start(layout.entry_table_offset))?;
    for (path_str, id) in &descendants {
        let node = tree.get(*id).expect("descendant id must resolve");
        let (entry_type, inode, data_blocks): (u8, u32, &[u32]) = match &node.kind {
            EntryKind::Directory { .. } => (ENTRY_TYPE_DIRECTORY, 0, &[]),
            EntryKind::File { data_blocks } => (
                ENTRY_TYPE_FILE,
                data_blocks.first().copied().unwrap_or(0),
                data_blocks,
            ),
        };
        let record = EntryRecord {
            name: string_into_fixed(path_str),
            entry_type,
            _pad0: [0; 3],
            permissions: node.permissions,
            size: node.size,
            owner: string_into_fixed(&node.owner),
            inode,
            parent_inode: 0,
            created_at: node.created_at,
            modified_at: node.modified_at,
        };
        file.write_all(record.as_bytes())?;
        let _ = data_blocks;
    }

    bitmap.initialize(layout.total_blocks);
    bitmap.set_run(0, layout.data_blocks_start_block);
    for (_, id) in &descendants {
        if let EntryKind::File { data_blocks } = &tree.get(*id).unwrap().kind {
            for &block in data_blocks {
                if (block as usize) < layout.total_blocks {
                    bitmap.set(block as usize);
                }
            }
        }
    }
    file.seek(SeekFrom::Start(layout.bitmap_offset))?;
    let mut padded = bitmap.as_bytes().to_vec();
    padded.resize(layout.bitmap_aligned_size as usize, 0);
    file.write_all(&padded)?;

    file.flush()?;
    Ok(())
}

/// Writes `data` sequentially across `blocks`, each write bounded by `block_size`.
pub fn write_blocks(
    path: impl AsRef<Path>,
    layout: &Layout,
    blocks: &[u32],
    data: &[u8],
) -> OfsResult<()> {
    let mut file = OpenOptions::new().read(true).write(true).open(path.as_ref())?;
    let mut remaining = data;
    for &block in blocks {
        if remaining.is_empty() {
            break;
        }
        let to_write = remaining.len().min(layout.block_size as usize);
        file.seek(SeekFrom::Start(layout.block_offset(block)))?;
        file.write_all(&remaining[..to_write])?;
        remaining = &remaining[to_write..];
    }
    Ok(())
}

/// Reads the concatenation of `blocks`, truncated to `size` bytes.
pub fn read_blocks(
    path: impl AsRef<Path>,
    layout: &Layout,
    blocks: &[u32],
    size: u64,
) -> OfsResult<Vec<u8>> {
    let mut file = File::open(path.as_ref())?;
    let mut out = vec![0u8; size as usize];
    let mut remaining = size as usize;
    let mut offset = 0usize;
    for &block in blocks {
        if remaining == 0 {
            break;
        }
        let to_read = remaining.min(layout.block_size as usize);
        file.seek(SeekFrom::Start(layout.block_offset(block)))?;
        file.read_exact(&mut out[offset..offset + to_read])?;
        offset += to_read;
        remaining -= to_read;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::record::UserRecord as UR;
    use tempfile::NamedTempFile;

    fn test_config() -> Config {
        Config {
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
        }
    }

    #[test]
    fn format_then_init_yields_admin_and_empty_root() {
        let file = NamedTempFile::new().unwrap();
        let config = test_config();
        format(file.path(), &config).unwrap();
        let state = init(file.path(), &config).unwrap();
        let users: Vec<&UR> = state.users.list_in_order().map(|(_, v)| v).collect();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].username_str(), "admin");
        assert_eq!(state.tree.list_children(ROOT).len(), 0);
        assert_eq!(
            std::fs::metadata(file.path()).unwrap().len(),
            config.total_size
        );
    }

    #[test]
    fn init_rejects_bad_magic() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), vec![0u8; 4096]).unwrap();
        let config = test_config();
        assert!(init(file.path(), &config).is_err());
    }
}
