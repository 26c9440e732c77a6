//! Virtual File System (spec §4.7).
//!
//! One module owning mount table + fd table + open/read/write/seek/close.
//! The driver-registry + longest-prefix-mount + linked-list-vnode-cache
//! model is what spec §4.7 specifies directly; `OpenFlags`' POSIX
//! open-flag parsing follows ordinary POSIX `open(2)` semantics.

pub mod devfs;
pub mod driver;
pub mod fat32;
pub mod ramfs;
pub mod vnode;

use crate::errno::{KError, KResult};
use crate::process::process::ProcessId;
use crate::spinlock::SpinLock;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

pub use driver::{FileSystemDriver, VnodeOps};
pub use vnode::{Vnode, VnodeKind};

/// POSIX open flags (spec §4.7 "Open"), the same bit layout
/// `syscall::handlers::sys_open` receives off the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags(pub u32);

impl OpenFlags {
    pub const O_RDONLY: u32 = 0;
    pub const O_WRONLY: u32 = 1;
    pub const O_RDWR: u32 = 2;
    pub const O_CREAT: u32 = 0x40;
    pub const O_TRUNC: u32 = 0x200;
    pub const O_APPEND: u32 = 0x400;

    fn access(self) -> u32 {
        self.0 & 0x3
    }
    pub fn can_read(self) -> bool {
        self.access() == Self::O_RDONLY || self.access() == Self::O_RDWR
    }
    pub fn can_write(self) -> bool {
        self.access() == Self::O_WRONLY || self.access() == Self::O_RDWR
    }
    pub fn creat(self) -> bool {
        self.0 & Self::O_CREAT != 0
    }
    pub fn trunc(self) -> bool {
        self.0 & Self::O_TRUNC != 0
    }
    pub fn append(self) -> bool {
        self.0 & Self::O_APPEND != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekWhence {
    Set,
    Cur,
    End,
}

/// A mounted filesystem instance (spec §4.7 "Mount"). `driver_ctx` is the
/// driver's own opaque per-mount state, boxed behind `Any` so this module
/// doesn't need a generic parameter per mount.
pub struct FileSystem {
    pub mountpoint: String,
    pub flags: u32,
    pub driver: &'static FileSystemDriver,
    pub driver_ctx: SpinLock<Option<alloc::boxed::Box<dyn core::any::Any + Send>>>,
    pub vnodes: vnode::VnodeCache,
}

/// A system-wide open-file-table entry (spec §4.7 "Open" step 5). `fd ==
/// 0` marks a free slot, mirroring the source's "reuse a slot with
/// `fd==0`" convention — a real local fd is never 0 here since local fd 0
/// is reserved the same way stdio reserves it in the wider syscall ABI.
struct SystemFd {
    localfd: usize,
    pid: ProcessId,
    offset: u64,
    flags: OpenFlags,
    vnode: *const Vnode,
}

unsafe impl Send for SystemFd {}

struct VfsState {
    drivers: Vec<&'static FileSystemDriver>,
    mounts: Vec<FileSystem>,
    system_fds: Vec<SystemFd>,
}

static STATE: SpinLock<Option<VfsState>> = SpinLock::new(None);

pub fn init() {
    *STATE.lock() = Some(VfsState {
        drivers: Vec::new(),
        mounts: Vec::new(),
        system_fds: Vec::new(),
    });
    register_driver(&ramfs::DRIVER);
    register_driver(&fat32::DRIVER);
    register_driver(&devfs::DRIVER);
    mount("ramfs", "/", "ramfs", 0).expect("root ramfs mount must succeed");
    log::info!("vfs: initialized, root mounted on ramfs");
}

pub fn register_driver(driver: &'static FileSystemDriver) {
    let mut guard = STATE.lock();
    let state = guard.as_mut().expect("vfs not initialized");
    state.drivers.push(driver);
}

/// `mount(src, mntpoint, type, args, flags)` (spec §4.7 "Mount"): try each
/// registered driver's `init` in registration order (disk-backed drivers
/// probe the source; ram-backed ones are matched by exact `type`); first
/// success wins.
pub fn mount(src: &str, mntpoint: &str, fs_type: &str, flags: u32) -> KResult<()> {
    let drivers: Vec<&'static FileSystemDriver> = {
        let guard = STATE.lock();
        guard.as_ref().expect("vfs not initialized").drivers.clone()
    };

    for driver in drivers {
        if !driver.generic_probe && driver.name != fs_type {
            continue;
        }
        let mut fs = FileSystem {
            mountpoint: mntpoint.to_string(),
            flags,
            driver,
            driver_ctx: SpinLock::new(None),
            vnodes: vnode::VnodeCache::new(),
        };
        if (driver.init)(&mut fs, src).is_ok() {
            let mut guard = STATE.lock();
            guard.as_mut().expect("vfs not initialized").mounts.push(fs);
            return Ok(());
        }
    }
    Err(KError::NotFound)
}

/// `unmount(mntpoint)` (spec §4.7 "Mount" / §8 scenario 5): tear down the
/// most-recently-mounted filesystem at the exact `mntpoint`, so a mount
/// that shadowed an older one at the same point un-shadows it.
pub fn unmount(mntpoint: &str) -> KResult<()> {
    let mut guard = STATE.lock();
    let state = guard.as_mut().expect("vfs not initialized");
    let idx = state
        .mounts
        .iter()
        .rposition(|fs| fs.mountpoint == mntpoint)
        .ok_or(KError::NotFound)?;
    let mut fs = state.mounts.remove(idx);
    (fs.driver.destroy)(&mut fs);
    Ok(())
}

/// Pick the filesystem whose mountpoint is the longest prefix of `path`;
/// equal-length prefixes shadow in mount order, most recent wins (spec
/// §4.7 "Topmost-fs resolution").
fn resolve_topmost<'a>(mounts: &'a [FileSystem], path: &str) -> Option<&'a FileSystem> {
    mounts
        .iter()
        .filter(|fs| path.starts_with(fs.mountpoint.as_str()))
        .max_by_key(|fs| fs.mountpoint.len())
}

fn strip_mountpoint<'a>(fs: &FileSystem, path: &'a str) -> &'a str {
    let rest = &path[fs.mountpoint.len()..];
    rest.trim_start_matches('/')
}

/// `vfs_open` (spec §4.7 "Open"). Allocates a system-wide fd (reusing any
/// slot whose `localfd == 0`) and populates it.
pub fn open(path: &str, flags: OpenFlags, mode: u16, pid: ProcessId) -> KResult<usize> {
    let mut guard = STATE.lock();
    let state = guard.as_mut().expect("vfs not initialized");

    let mount_idx = state
        .mounts
        .iter()
        .enumerate()
        .filter(|(_, fs)| path.starts_with(fs.mountpoint.as_str()))
        .max_by_key(|(_, fs)| fs.mountpoint.len())
        .map(|(i, _)| i)
        .ok_or(KError::NotFound)?;

    let rest = strip_mountpoint(&state.mounts[mount_idx], path).to_string();

    let mut vnode_ptr = state.mounts[mount_idx].vnodes.lookup(&rest);
    if vnode_ptr.is_none() {
        if !flags.creat() {
            return Err(KError::NotFound);
        }
        let fs = &mut state.mounts[mount_idx];
        (fs.driver.mkfile)(fs, &rest, mode)?;
        vnode_ptr = fs.vnodes.lookup(&rest);
    }
    let vnode = vnode_ptr.ok_or(KError::NotFound)?;

    if flags.can_write() && flags.trunc() {
        return Err(KError::Invalid);
    }

    let sysfd_idx = match state.system_fds.iter().position(|f| f.localfd == 0) {
        Some(i) => i,
        None => {
            state.system_fds.push(SystemFd {
                localfd: 0,
                pid,
                offset: 0,
                flags,
                vnode,
            });
            state.system_fds.len() - 1
        }
    };
    state.system_fds[sysfd_idx] = SystemFd {
        localfd: 0,
        pid,
        offset: 0,
        flags,
        vnode,
    };

    Ok(sysfd_idx)
}

/// `vfs_read`/`vfs_write` (spec §4.7 "Read/Write"). `is_write` selects the
/// direction; permission, `O_APPEND` repositioning, and offset
/// advancement are handled here so `VnodeOps::read`/`write` only deal in
/// bytes at an offset.
fn rw(sysfd: usize, buf: &mut [u8], is_write: bool) -> KResult<usize> {
    let mut guard = STATE.lock();
    let state = guard.as_mut().expect("vfs not initialized");
    let entry = state.system_fds.get_mut(sysfd).ok_or(KError::NotFound)?;
    if entry.localfd != 0 {
        return Err(KError::NotFound);
    }

    if is_write {
        if !entry.flags.can_write() {
            return Err(KError::Perm);
        }
    } else if !entry.flags.can_read() {
        return Err(KError::Perm);
    }

    let vnode = unsafe { &*entry.vnode };
    if is_write && entry.flags.append() {
        entry.offset = vnode.size();
    }

    let n = if is_write {
        (vnode.ops.write)(vnode, entry.offset, buf)?
    } else {
        (vnode.ops.read)(vnode, entry.offset, buf)?
    };
    entry.offset += n as u64;
    Ok(n)
}

pub fn read(sysfd: usize, buf: &mut [u8]) -> KResult<usize> {
    rw(sysfd, buf, false)
}

pub fn write(sysfd: usize, buf: &[u8]) -> KResult<usize> {
    // `VnodeOps::write` takes `&mut [u8]` purely to share `rw`'s single
    // code path with reads; the write direction never mutates `buf`.
    let ptr = buf.as_ptr() as *mut u8;
    let len = buf.len();
    let slice = unsafe { core::slice::from_raw_parts_mut(ptr, len) };
    rw(sysfd, slice, true)
}

/// `vfs_seek` (spec §4.7 "Seek"): no bounds enforcement beyond signed
/// overflow, matching the source semantics exactly.
pub fn seek(sysfd: usize, offset: i64, whence: SeekWhence) -> KResult<u64> {
    let mut guard = STATE.lock();
    let state = guard.as_mut().expect("vfs not initialized");
    let entry = state.system_fds.get_mut(sysfd).ok_or(KError::NotFound)?;
    let vnode = unsafe { &*entry.vnode };

    let base = match whence {
        SeekWhence::Set => 0,
        SeekWhence::Cur => entry.offset as i64,
        SeekWhence::End => vnode.size() as i64,
    };
    let new_offset = base.checked_add(offset).ok_or(KError::Invalid)?;
    entry.offset = new_offset as u64;
    Ok(entry.offset)
}

/// `vfs_close` (spec §4.7 "Close"): zero the system-wide slot.
pub fn close(sysfd: usize) -> KResult<()> {
    let mut guard = STATE.lock();
    let state = guard.as_mut().expect("vfs not initialized");
    let entry = state.system_fds.get_mut(sysfd).ok_or(KError::NotFound)?;
    entry.localfd = 0;
    entry.offset = 0;
    Ok(())
}

/// Not part of spec §4.7's own surface — a small convenience
/// `process::manager::spawn` needs to pull an entire ELF image off the
/// VFS in one call rather than open/read-loop/close by hand.
pub fn read_whole_file(path: &str) -> KResult<Vec<u8>> {
    let flags = OpenFlags(OpenFlags::O_RDONLY);
    let sysfd = open(path, flags, 0, ProcessId(0))?;
    let mut out = Vec::new();
    let mut chunk = [0u8; 512];
    loop {
        let n = read(sysfd, &mut chunk)?;
        if n == 0 {
            break;
        }
        out.extend_from_slice(&chunk[..n]);
    }
    close(sysfd)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_prefix_wins_on_shadowed_mounts() {
        let a = FileSystem {
            mountpoint: "/".to_string(),
            flags: 0,
            driver: &ramfs::DRIVER,
            driver_ctx: SpinLock::new(None),
            vnodes: vnode::VnodeCache::new(),
        };
        let b = FileSystem {
            mountpoint: "/mnt".to_string(),
            flags: 0,
            driver: &ramfs::DRIVER,
            driver_ctx: SpinLock::new(None),
            vnodes: vnode::VnodeCache::new(),
        };
        let mounts = alloc::vec![a, b];
        let chosen = resolve_topmost(&mounts, "/mnt/data/file").unwrap();
        assert_eq!(chosen.mountpoint, "/mnt");
        let chosen = resolve_topmost(&mounts, "/etc/passwd").unwrap();
        assert_eq!(chosen.mountpoint, "/");
    }

    #[test]
    fn open_flags_decode_access_mode() {
        let ro = OpenFlags(OpenFlags::O_RDONLY);
        assert!(ro.can_read() && !ro.can_write());
        let rw = OpenFlags(OpenFlags::O_RDWR);
        assert!(rw.can_read() && rw.can_write());
    }

    #[test]
    fn unmount_removes_the_most_recent_shadowing_mount() {
        init();
        mount("ramfs", "/", "ramfs", 0).unwrap();
        {
            let guard = STATE.lock();
            assert_eq!(guard.as_ref().unwrap().mounts.len(), 2);
        }
        unmount("/").unwrap();
        let guard = STATE.lock();
        assert_eq!(guard.as_ref().unwrap().mounts.len(), 1);
    }

    #[test]
    fn unmount_on_unknown_mountpoint_is_not_found() {
        init();
        assert_eq!(unmount("/nope"), Err(KError::NotFound));
    }
}
