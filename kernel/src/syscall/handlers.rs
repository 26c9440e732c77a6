//! The ten concrete syscalls named in `syscalls.defs` (spec §4.13).
//!
//! One function per syscall number, raw register-width arguments in, raw
//! retval out.

use crate::config::PATH_MAX;
use crate::errno::KError;
use crate::fs::vfs::{self, OpenFlags, SeekWhence};
use crate::process::{self, manager, ProcessId};
use crate::useraccess::{copy_from_user, copy_to_user};
use alloc::string::String;
use alloc::vec::Vec;

const IO_COPY_CHUNK: usize = crate::config::IO_COPY_CHUNK as usize;

fn current_pid() -> Option<ProcessId> {
    process::current_pid()
}

/// Read a NUL-terminated path out of user space one byte at a time,
/// bounded at `PATH_MAX` (spec §7 `ENAMETOOLONG`).
fn read_user_cstr(ptr: u32) -> Result<String, KError> {
    let mut bytes = Vec::new();
    let mut cursor = ptr;
    loop {
        if bytes.len() as u64 >= PATH_MAX {
            return Err(KError::NameTooLong);
        }
        let mut byte = 0u8;
        unsafe {
            copy_from_user(&mut byte as *mut u8, cursor as *const u8, 1)?;
        }
        if byte == 0 {
            break;
        }
        bytes.push(byte);
        cursor += 1;
    }
    String::from_utf8(bytes).map_err(|_| KError::Invalid)
}

pub fn sys_exit(status: u32, _a2: u32, _a3: u32, _a4: u32, _a5: u32, _a6: u32) -> i32 {
    process::exit_current(status as i32)
}

pub fn sys_read(fd: u32, buf_ptr: u32, count: u32, _a4: u32, _a5: u32, _a6: u32) -> i32 {
    let Some(pid) = current_pid() else {
        return KError::Invalid.as_retval() as i32;
    };
    let Some(sysfd) = manager::fd_system_index(pid, fd as usize) else {
        return KError::NotFound.as_retval() as i32;
    };
    let len = (count as usize).min(IO_COPY_CHUNK);
    let mut kbuf = alloc::vec![0u8; len];
    match vfs::read(sysfd, &mut kbuf) {
        Ok(n) => {
            if unsafe { copy_to_user(buf_ptr as *mut u8, kbuf.as_ptr(), n) }.is_err() {
                return KError::Fault.as_retval() as i32;
            }
            n as i32
        }
        Err(e) => e.as_retval() as i32,
    }
}

pub fn sys_write(fd: u32, buf_ptr: u32, count: u32, _a4: u32, _a5: u32, _a6: u32) -> i32 {
    let Some(pid) = current_pid() else {
        return KError::Invalid.as_retval() as i32;
    };
    let Some(sysfd) = manager::fd_system_index(pid, fd as usize) else {
        return KError::NotFound.as_retval() as i32;
    };
    let len = (count as usize).min(IO_COPY_CHUNK);
    let mut kbuf = alloc::vec![0u8; len];
    if unsafe { copy_from_user(kbuf.as_mut_ptr(), buf_ptr as *const u8, len) }.is_err() {
        return KError::Fault.as_retval() as i32;
    }
    match vfs::write(sysfd, &kbuf) {
        Ok(n) => n as i32,
        Err(e) => e.as_retval() as i32,
    }
}

pub fn sys_open(path_ptr: u32, flags: u32, mode: u32, _a4: u32, _a5: u32, _a6: u32) -> i32 {
    let Some(pid) = current_pid() else {
        return KError::Invalid.as_retval() as i32;
    };
    let path = match read_user_cstr(path_ptr) {
        Ok(p) => p,
        Err(e) => return e.as_retval() as i32,
    };
    let sysfd = match vfs::open(&path, OpenFlags(flags), mode as u16, pid) {
        Ok(fd) => fd,
        Err(e) => return e.as_retval() as i32,
    };
    match manager::alloc_fd(pid, sysfd) {
        Some(localfd) => localfd as i32,
        None => {
            let _ = vfs::close(sysfd);
            KError::Invalid.as_retval() as i32
        }
    }
}

pub fn sys_close(fd: u32, _a2: u32, _a3: u32, _a4: u32, _a5: u32, _a6: u32) -> i32 {
    let Some(pid) = current_pid() else {
        return KError::Invalid.as_retval() as i32;
    };
    let Some(sysfd) = manager::free_fd(pid, fd as usize) else {
        return KError::NotFound.as_retval() as i32;
    };
    match vfs::close(sysfd) {
        Ok(()) => 0,
        Err(e) => e.as_retval() as i32,
    }
}

pub fn sys_lseek(fd: u32, offset: u32, whence: u32, _a4: u32, _a5: u32, _a6: u32) -> i32 {
    let Some(pid) = current_pid() else {
        return KError::Invalid.as_retval() as i32;
    };
    let Some(sysfd) = manager::fd_system_index(pid, fd as usize) else {
        return KError::NotFound.as_retval() as i32;
    };
    let whence = match whence {
        0 => SeekWhence::Set,
        1 => SeekWhence::Cur,
        2 => SeekWhence::End,
        _ => return KError::Invalid.as_retval() as i32,
    };
    match vfs::seek(sysfd, offset as i32 as i64, whence) {
        Ok(new_offset) => new_offset as i32,
        Err(e) => e.as_retval() as i32,
    }
}

/// No vnode driver registers an ioctl of its own (spec §4.7's surface
/// names `ioctl` but defines no request codes), so every request is
/// currently unsupported.
pub fn sys_ioctl(_fd: u32, _request: u32, _arg: u32, _a4: u32, _a5: u32, _a6: u32) -> i32 {
    KError::Invalid.as_retval() as i32
}

pub fn sys_getpid(_a1: u32, _a2: u32, _a3: u32, _a4: u32, _a5: u32, _a6: u32) -> i32 {
    match current_pid() {
        Some(pid) => pid.as_u32() as i32,
        None => KError::Invalid.as_retval() as i32,
    }
}

/// `waitpid(pid, status_ptr, options)`: `pid == -1` waits for any child,
/// else for that exact pid. `options` bit 0 is `WNOHANG`. Blocks by
/// cooperatively yielding until a matching zombie shows up, since this
/// kernel has no sleep/wake queue to park on instead.
pub fn sys_waitpid(pid: u32, status_ptr: u32, options: u32, _a4: u32, _a5: u32, _a6: u32) -> i32 {
    const WNOHANG: u32 = 1;
    let Some(parent) = current_pid() else {
        return KError::Invalid.as_retval() as i32;
    };
    let target = if pid as i32 == -1 {
        None
    } else {
        Some(ProcessId(pid))
    };

    loop {
        if let Some((child, status)) = manager::reap_zombie_child(parent, target) {
            if status_ptr != 0 {
                let bytes = status.to_le_bytes();
                if unsafe { copy_to_user(status_ptr as *mut u8, bytes.as_ptr(), 4) }.is_err() {
                    return KError::Fault.as_retval() as i32;
                }
            }
            return child.as_u32() as i32;
        }
        if !manager::has_child(parent, target) {
            return KError::NotFound.as_retval() as i32;
        }
        if options & WNOHANG != 0 {
            return 0;
        }
        crate::sched::yield_now();
    }
}

/// `exec(path)`: this kernel has no copy-on-write `fork`, so there is no
/// in-place image to replace — spawning a fresh process from `path` with
/// the caller as its parent is the whole of `exec` here (two `exec`s of
/// the same binary produce processes identical but for kernel-stack
/// addresses, same as `spawn` run twice).
pub fn sys_exec(path_ptr: u32, _a2: u32, _a3: u32, _a4: u32, _a5: u32, _a6: u32) -> i32 {
    let Some(parent) = current_pid() else {
        return KError::Invalid.as_retval() as i32;
    };
    let path = match read_user_cstr(path_ptr) {
        Ok(p) => p,
        Err(e) => return e.as_retval() as i32,
    };
    match manager::spawn(&path, Some(parent)) {
        Ok(pid) => pid.as_u32() as i32,
        Err(e) => e.as_retval() as i32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Every handler above starts by resolving the caller's pid and then
    // touches the live process table / VFS, neither of which a unit test
    // stands up (same boundary `process/manager.rs`'s tests document).
    // What's left to check without that context is the error-code mapping
    // these handlers promise callers.

    #[test]
    fn no_current_process_is_reported_as_invalid() {
        assert_eq!(KError::Invalid.as_retval(), -22);
    }

    #[test]
    fn unmapped_fd_is_reported_as_not_found() {
        assert_eq!(KError::NotFound.as_retval(), -2);
    }

    #[test]
    fn ioctl_is_unconditionally_unsupported() {
        assert_eq!(
            sys_ioctl(0, 0, 0, 0, 0, 0),
            KError::Invalid.as_retval() as i32
        );
    }

    #[test]
    fn io_copy_chunk_matches_config() {
        assert_eq!(IO_COPY_CHUNK as u64, crate::config::IO_COPY_CHUNK);
    }
}
