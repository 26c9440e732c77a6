//! Device-node filesystem (spec §4.7b): exposes block devices registered
//! by `block::` (`hda`, `hda p1`, ...) as openable nodes under `/dev`. A
//! filesystem whose files are device handles, not disk bytes.

use super::driver::FileSystemDriver;
use super::vnode::{Vnode, VnodeKind, VnodeOps};
use super::FileSystem;
use crate::errno::{KError, KResult};
use alloc::string::String;
use alloc::sync::Arc;

const SECTOR_SIZE: u64 = 512;

fn device_name(vnode: &Vnode) -> &str {
    vnode
        .data
        .downcast_ref::<String>()
        .expect("devfs vnode data is always the device name")
}

fn read(vnode: &Vnode, offset: u64, buf: &mut [u8]) -> KResult<usize> {
    let name = device_name(vnode);
    let lba = offset / SECTOR_SIZE;
    crate::block::read_by_name(name, lba, buf)
}

fn write(vnode: &Vnode, offset: u64, buf: &mut [u8]) -> KResult<usize> {
    let name = device_name(vnode);
    let lba = offset / SECTOR_SIZE;
    crate::block::write_by_name(name, lba, buf)
}

fn size(vnode: &Vnode) -> u64 {
    let name = device_name(vnode);
    crate::block::device_size_bytes(name).unwrap_or(0)
}

static OPS: VnodeOps = VnodeOps { read, write, size };

fn init(fs: &mut FileSystem, _src: &str) -> KResult<()> {
    for name in crate::block::device_names() {
        fs.vnodes.insert(Vnode {
            path: name.clone(),
            kind: VnodeKind::Device,
            ops: &OPS,
            data: Arc::new(name),
        });
    }
    Ok(())
}

fn destroy(_fs: &mut FileSystem) {}

fn mkfile(_fs: &mut FileSystem, _path: &str, _mode: u16) -> KResult<()> {
    Err(KError::Perm)
}

fn rmnode(_fs: &mut FileSystem, _path: &str) -> KResult<()> {
    Err(KError::Perm)
}

pub static DRIVER: FileSystemDriver = FileSystemDriver {
    name: "devfs",
    generic_probe: false,
    init,
    destroy,
    mkfile,
    rmnode,
    vnode_ops: &OPS,
};
