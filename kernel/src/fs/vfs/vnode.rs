//! Vnode cache (spec §4.7 "Vnode cache").
//!
//! "Linked-list per filesystem... the linked-list choice is explicit:
//! vnode pointers are persistently referenced by FileDescriptors and must
//! never move." A `Vec<Vnode>` would violate that the moment it
//! reallocates; a singly linked list of boxed nodes gives every `Vnode` a
//! heap address that is fixed for the node's lifetime, so the raw
//! pointers `vfs::open` hands out to `SystemFd` stay valid indefinitely.
//!
//! A plain `Clone`-able inode value with no cache behind it would let an
//! inode get copied around freely — exactly the pattern this spec's
//! pointer-stability requirement rules out.

use crate::errno::KResult;
use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use core::any::Any;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VnodeKind {
    File,
    Directory,
    Device,
}

/// Per-driver read/write/size behavior. One static table per driver,
/// shared by every vnode that driver creates.
pub struct VnodeOps {
    pub read: fn(&Vnode, u64, &mut [u8]) -> KResult<usize>,
    pub write: fn(&Vnode, u64, &mut [u8]) -> KResult<usize>,
    pub size: fn(&Vnode) -> u64,
}

/// A single cached file/directory/device entry. `data` is the driver's
/// own per-vnode payload (ramfs's byte buffer, fat32's first-cluster +
/// size, devfs's device index), boxed behind `Any` so `Vnode` itself
/// stays driver-agnostic.
pub struct Vnode {
    pub path: String,
    pub kind: VnodeKind,
    pub ops: &'static VnodeOps,
    pub data: Arc<dyn Any + Send + Sync>,
}

impl Vnode {
    pub fn size(&self) -> u64 {
        (self.ops.size)(self)
    }
}

struct Node {
    vnode: Vnode,
    next: Option<Box<Node>>,
}

pub struct VnodeCache {
    head: Option<Box<Node>>,
}

impl VnodeCache {
    pub const fn new() -> Self {
        VnodeCache { head: None }
    }

    /// `fs_new_vnode_cache(name, fs)` (spec §4.7): append (front-insert;
    /// order doesn't matter for a cache) and return a stable pointer.
    pub fn insert(&mut self, vnode: Vnode) -> *const Vnode {
        let node = Box::new(Node {
            vnode,
            next: self.head.take(),
        });
        self.head = Some(node);
        &self.head.as_ref().unwrap().vnode as *const Vnode
    }

    /// `fs_lookup_vnode(path, fs)` (spec §4.7): locate by the
    /// mountpoint-relative path. Returns `None` on a cache miss; callers
    /// that need driver delegation on miss (disk-backed filesystems) do
    /// that themselves and re-`insert`.
    pub fn lookup(&self, path: &str) -> Option<*const Vnode> {
        let mut cur = self.head.as_deref();
        while let Some(node) = cur {
            if node.vnode.path == path {
                return Some(&node.vnode as *const Vnode);
            }
            cur = node.next.as_deref();
        }
        None
    }

    pub fn remove(&mut self, path: &str) -> bool {
        let mut cur = &mut self.head;
        loop {
            match cur {
                None => return false,
                Some(node) if node.vnode.path == path => {
                    *cur = node.next.take();
                    return true;
                }
                Some(node) => cur = &mut node.next,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static NOOP_OPS: VnodeOps = VnodeOps {
        read: |_, _, _| Ok(0),
        write: |_, _, _| Ok(0),
        size: |_| 0,
    };

    #[test]
    fn insert_then_lookup_finds_same_path() {
        let mut cache = VnodeCache::new();
        cache.insert(Vnode {
            path: "etc/passwd".into(),
            kind: VnodeKind::File,
            ops: &NOOP_OPS,
            data: Arc::new(()),
        });
        assert!(cache.lookup("etc/passwd").is_some());
        assert!(cache.lookup("etc/shadow").is_none());
    }

    #[test]
    fn insertion_returns_a_pointer_stable_across_further_inserts() {
        let mut cache = VnodeCache::new();
        let first = cache.insert(Vnode {
            path: "a".into(),
            kind: VnodeKind::File,
            ops: &NOOP_OPS,
            data: Arc::new(()),
        });
        cache.insert(Vnode {
            path: "b".into(),
            kind: VnodeKind::File,
            ops: &NOOP_OPS,
            data: Arc::new(()),
        });
        let relookup = cache.lookup("a").unwrap();
        assert_eq!(first, relookup);
    }

    #[test]
    fn remove_drops_the_node() {
        let mut cache = VnodeCache::new();
        cache.insert(Vnode {
            path: "a".into(),
            kind: VnodeKind::File,
            ops: &NOOP_OPS,
            data: Arc::new(()),
        });
        assert!(cache.remove("a"));
        assert!(cache.lookup("a").is_none());
    }
}
