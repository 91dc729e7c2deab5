//! Fixed-width on-disk records.
//!
//! Each record derives zerocopy's `FromBytes`/`IntoBytes`/`KnownLayout`/
//! `Immutable`, the pattern the teacher uses for `fuse_abi.rs`'s kernel-ABI
//! structs, so the container codec reads and writes these as raw byte
//! slices instead of hand-rolled `memcpy`/`reinterpret_cast` equivalents.
//! All padding is explicit so the derive has no uninitialized bytes to
//! reason about.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

pub const MAGIC: [u8; 8] = *b"OMNIFS01";
pub const NAME_MAX: usize = 256;
pub const USERNAME_MAX: usize = 64;
pub const SECRET_MAX: usize = 64;
pub const OWNER_MAX: usize = 64;

pub const ROLE_ADMIN: u8 = 0;
pub const ROLE_NORMAL: u8 = 1;

pub const ENTRY_TYPE_FILE: u8 = 0;
pub const ENTRY_TYPE_DIRECTORY: u8 = 1;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct OmniHeader {
    pub magic: [u8; 8],
    pub total_size: u64,
    pub header_size: u64,
    pub block_size: u64,
    pub max_users: u32,
    pub _pad: u32,
    pub user_table_offset: u64,
}

impl OmniHeader {
    pub const SIZE: usize = std::mem::size_of::<OmniHeader>();
}

/// On-disk user table slot. `password_hash` holds the plaintext password
/// (spec.md §3/§9.5: treat as an opaque secret, not actually hashed).
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct UserRecord {
    pub username: [u8; USERNAME_MAX],
    pub password_hash: [u8; SECRET_MAX],
    pub role: u8,
    pub is_active: u8,
    pub _pad: [u8; 6],
    pub created_at: u64,
}

impl UserRecord {
    pub const SIZE: usize = std::mem::size_of::<UserRecord>();

    pub fn empty() -> Self {
        UserRecord {
            username: [0; USERNAME_MAX],
            password_hash: [0; SECRET_MAX],
            role: ROLE_NORMAL,
            is_active: 0,
            _pad: [0; 6],
            created_at: 0,
        }
    }

    pub fn username_str(&self) -> String {
        bytes_to_string(&self.username)
    }

    pub fn password_str(&self) -> String {
        bytes_to_string(&self.password_hash)
    }
}

/// On-disk entry table slot. `name` holds the full absolute path on disk;
/// the in-memory `TreeNode` holds only the basename (spec.md §3).
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct EntryRecord {
    pub name: [u8; NAME_MAX],
    pub entry_type: u8,
    pub _pad0: [u8; 3],
    pub permissions: u32,
    pub size: u64,
    pub owner: [u8; OWNER_MAX],
    pub inode: u32,
    pub parent_inode: u32,
    pub created_at: u64,
    pub modified_at: u64,
}

impl EntryRecord {
    pub const SIZE: usize = std::mem::size_of::<EntryRecord>();

    pub fn empty() -> Self {
        EntryRecord {
            name: [0; NAME_MAX],
            entry_type: ENTRY_TYPE_FILE,
            _pad0: [0; 3],
            permissions: 0,
            size: 0,
            owner: [0; OWNER_MAX],
            inode: 0,
            parent_inode: 0,
            created_at: 0,
            modified_at: 0,
        }
    }

    pub fn is_empty_slot(&self) -> bool {
        self.name[0] == 0
    }

    pub fn name_str(&self) -> String {
        bytes_to_string(&self.name)
    }

    pub fn owner_str(&self) -> String {
        bytes_to_string(&self.owner)
    }

    pub fn is_directory(&self) -> bool {
        self.entry_type == ENTRY_TYPE_DIRECTORY
    }
}

/// Copies `s` into a fixed-size, zero-padded byte array, truncating if
/// `s` is too long to fit (leaving room for no terminator, since length is
/// recovered by scanning for the first zero byte on read).
pub fn string_into_fixed<const N: usize>(s: &str) -> [u8; N] {
    let mut buf = [0u8; N];
    let bytes = s.as_bytes();
    let n = bytes.len().min(N);
    buf[..n].copy_from_slice(&bytes[..n]);
    buf
}

fn bytes_to_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_round_trips_through_fixed_buffer() {
        let buf: [u8; USERNAME_MAX] = string_into_fixed("admin");
        assert_eq!(bytes_to_string(&buf), "admin");
    }

    #[test]
    fn record_sizes_are_stable() {
        // Sanity check that derive didn't silently introduce trailing padding.
        assert_eq!(OmniHeader::SIZE % 8, 0);
        assert_eq!(UserRecord::SIZE % 8, 0);
        assert_eq!(EntryRecord::SIZE % 8, 0);
    }
}
