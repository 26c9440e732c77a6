//! Filesystem driver registry record (spec §4.7 "Driver registry").
//!
//! A trait-object-free function-table shape, matching the `.defs`-style
//! `FileSystemDriver` record directly: plain fn pointers rather than a
//! `dyn Trait`, since every field is genuinely just dispatch, with no
//! per-instance state of its own (the per-mount state lives in
//! `FileSystem::driver_ctx`).

pub use super::vnode::VnodeOps;
use crate::errno::KResult;
use super::FileSystem;

pub struct FileSystemDriver {
    pub name: &'static str,
    /// Disk-backed drivers probe a source in registration order; ram-
    /// backed ones (`generic_probe = false`) are only tried when `mount`
    /// was called with a matching explicit `type=`.
    pub generic_probe: bool,
    pub init: fn(&mut FileSystem, src: &str) -> KResult<()>,
    pub destroy: fn(&mut FileSystem),
    pub mkfile: fn(&mut FileSystem, path: &str, mode: u16) -> KResult<()>,
    pub rmnode: fn(&mut FileSystem, path: &str) -> KResult<()>,
    pub vnode_ops: &'static VnodeOps,
}
