//! On-disk layout math (spec.md §4.4). Computed once from `Config` and
//! carried alongside the running instance so offsets are never recomputed
//! ad hoc mid-operation.

use crate::config::Config;
use crate::container::record::{EntryRecord, OmniHeader, UserRecord};

#[derive(Debug, Clone, Copy)]
pub struct Layout {
    pub total_size: u64,
    pub block_size: u64,
    pub max_users: usize,
    pub max_files: usize,
    pub total_blocks: usize,
    pub user_table_offset: u64,
    pub entry_table_offset: u64,
    pub bitmap_offset: u64,
    pub bitmap_aligned_size: u64,
    pub data_blocks_offset: u64,
    pub data_blocks_start_block: usize,
}

impl Layout {
    pub fn from_config(config: &Config) -> Layout {
        let total_blocks = (config.total_size / config.block_size) as usize;
        let user_table_offset = OmniHeader::SIZE as u64;
        let entry_table_offset = user_table_offset + (config.max_users * UserRecord::SIZE) as u64;
        let bitmap_offset = entry_table_offset + (config.max_files * EntryRecord::SIZE) as u64;
        let bitmap_size_bytes = (total_blocks as u64 + 7) / 8;
        let bitmap_aligned_size =
            div_ceil(bitmap_size_bytes, config.block_size) * config.block_size;
        let data_blocks_offset = bitmap_offset + bitmap_aligned_size;
        let data_blocks_start_block =
            div_ceil(data_blocks_offset, config.block_size) as usize;

        Layout {
            total_size: config.total_size,
            block_size: config.block_size,
            max_users: config.max_users,
            max_files: config.max_files,
            total_blocks,
            user_table_offset,
            entry_table_offset,
            bitmap_offset,
            bitmap_aligned_size,
            data_blocks_offset,
            data_blocks_start_block,
        }
    }

    pub fn block_offset(&self, block: u32) -> u64 {
        block as u64 * self.block_size
    }
}

fn div_ceil(a: u64, b: u64) -> u64 {
    (a + b - 1) / b
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            total_size: 1048576,
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
    fn offsets_are_monotonically_increasing() {
        let layout = Layout::from_config(&test_config());
        assert!(layout.user_table_offset < layout.entry_table_offset);
        assert!(layout.entry_table_offset < layout.bitmap_offset);
        assert!(layout.bitmap_offset < layout.data_blocks_offset);
        assert_eq!(layout.data_blocks_offset % layout.block_size, 0);
    }

    #[test]
    fn data_start_block_covers_metadata() {
        let layout = Layout::from_config(&test_config());
        assert_eq!(
            layout.data_blocks_start_block as u64 * layout.block_size,
            layout.data_blocks_offset
        );
    }
}
