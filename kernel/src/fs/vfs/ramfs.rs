//! RAM-backed filesystem driver (spec §4.7b): the root filesystem, and
//! the driver VFS mount-shadowing/open/read/write/seek/close tests run
//! against.
//!
//! A plain in-memory-byte-vector tmpfs: every file is a `Vec<u8>` keyed
//! by path, with no on-disk backing at all.

use super::driver::FileSystemDriver;
use super::vnode::{Vnode, VnodeKind, VnodeOps};
use super::FileSystem;
use crate::errno::{KError, KResult};
use crate::spinlock::SpinLock;
use alloc::sync::Arc;
use alloc::vec::Vec;

type Contents = SpinLock<Vec<u8>>;

fn contents(vnode: &Vnode) -> &Contents {
    vnode
        .data
        .downcast_ref::<Contents>()
        .expect("ramfs vnode data is always a SpinLock<Vec<u8>>")
}

fn read(vnode: &Vnode, offset: u64, buf: &mut [u8]) -> KResult<usize> {
    let data = contents(vnode).lock();
    let offset = offset as usize;
    if offset >= data.len() {
        return Ok(0);
    }
    let n = core::cmp::min(buf.len(), data.len() - offset);
    buf[..n].copy_from_slice(&data[offset..offset + n]);
    Ok(n)
}

fn write(vnode: &Vnode, offset: u64, buf: &mut [u8]) -> KResult<usize> {
    let mut data = contents(vnode).lock();
    let offset = offset as usize;
    if data.len() < offset + buf.len() {
        data.resize(offset + buf.len(), 0);
    }
    data[offset..offset + buf.len()].copy_from_slice(buf);
    Ok(buf.len())
}

fn size(vnode: &Vnode) -> u64 {
    contents(vnode).lock().len() as u64
}

static OPS: VnodeOps = VnodeOps { read, write, size };

fn init(_fs: &mut FileSystem, _src: &str) -> KResult<()> {
    Ok(())
}

fn destroy(_fs: &mut FileSystem) {}

fn mkfile(fs: &mut FileSystem, path: &str, _mode: u16) -> KResult<()> {
    if fs.vnodes.lookup(path).is_some() {
        return Err(KError::Exists);
    }
    fs.vnodes.insert(Vnode {
        path: path.into(),
        kind: VnodeKind::File,
        ops: &OPS,
        data: Arc::new(SpinLock::new(Vec::new())),
    });
    Ok(())
}

fn rmnode(fs: &mut FileSystem, path: &str) -> KResult<()> {
    if fs.vnodes.remove(path) {
        Ok(())
    } else {
        Err(KError::NotFound)
    }
}

pub static DRIVER: FileSystemDriver = FileSystemDriver {
    name: "ramfs",
    generic_probe: false,
    init,
    destroy,
    mkfile,
    rmnode,
    vnode_ops: &OPS,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::vfs::{self, OpenFlags};
    use crate::process::process::ProcessId;

    #[test]
    fn write_then_read_back_round_trips() {
        vfs::init();
        vfs::mount("ramfs", "/scratch", "ramfs", 0).unwrap();
        let fd = vfs::open(
            "/scratch/a.txt",
            OpenFlags(OpenFlags::O_RDWR | OpenFlags::O_CREAT),
            0o644,
            ProcessId(1),
        )
        .unwrap();
        assert_eq!(vfs::write(fd, b"hello").unwrap(), 5);
        vfs::seek(fd, 0, vfs::SeekWhence::Set).unwrap();
        let mut buf = [0u8; 16];
        let n = vfs::read(fd, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello");
        vfs::close(fd).unwrap();
    }

    #[test]
    fn shadowed_mount_hides_root_file_of_same_name() {
        vfs::init();
        vfs::mount("ramfs", "/over", "ramfs", 0).unwrap();
        let root_fd = vfs::open(
            "/shared.txt",
            OpenFlags(OpenFlags::O_WRONLY | OpenFlags::O_CREAT),
            0o644,
            ProcessId(1),
        )
        .unwrap();
        vfs::write(root_fd, b"root").unwrap();
        vfs::close(root_fd).unwrap();

        let over_fd = vfs::open(
            "/over/shared.txt",
            OpenFlags(OpenFlags::O_WRONLY | OpenFlags::O_CREAT),
            0o644,
            ProcessId(1),
        )
        .unwrap();
        vfs::write(over_fd, b"overlay").unwrap();
        vfs::close(over_fd).unwrap();

        let reopened = vfs::open(
            "/over/shared.txt",
            OpenFlags(OpenFlags::O_RDONLY),
            0,
            ProcessId(1),
        )
        .unwrap();
        let mut buf = [0u8; 16];
        let n = vfs::read(reopened, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"overlay");
    }
}
