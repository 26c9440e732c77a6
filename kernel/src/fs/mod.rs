//! Filesystem layer (spec §4.7 "VFS", §4.7b "Concrete VFS drivers").
//!
//! One VFS module, concrete drivers alongside it: `ramfs` (read-write,
//! the root filesystem), `fat32` (read-only), `devfs` (block-device
//! nodes) — the driver set this spec calls for.

pub mod vfs;

pub fn init() {
    vfs::init();
}
