//! The OMNI container: on-disk layout, fixed-width records, and the
//! format/init/save lifecycle (spec.md §4.4).

pub mod io;
pub mod layout;
pub mod record;

pub use io::{format, init, read_blocks, save, write_blocks, LoadedState};
pub use layout::Layout;
pub use record::{EntryRecord, OmniHeader, UserRecord};
