//! ELF32 loader (spec §4.6 "Spawn flow" steps 2-4, §6 "File formats").
//!
//! Parses header/program-header layout and returns a loadable segment
//! list, over the 32-bit ELF layout this kernel's address space uses
//! (`Elf32Header`/`Elf32ProgramHeader`). Mapping the segments into a
//! process's address space is `process::manager::spawn`'s job, not this
//! module's — this module only parses and validates.

use crate::errno::{KError, KResult};
use alloc::vec::Vec;
use core::mem::size_of;

pub const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
pub const ELFCLASS32: u8 = 1;
pub const ELFDATA2LSB: u8 = 1;
const ET_EXEC: u16 = 2;
const PT_LOAD: u32 = 1;

const PF_X: u32 = 1 << 0;
const PF_W: u32 = 1 << 1;
const PF_R: u32 = 1 << 2;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct Elf32Header {
    magic: [u8; 4],
    class: u8,
    data: u8,
    ident_version: u8,
    osabi: u8,
    abiversion: u8,
    _pad: [u8; 7],
    elf_type: u16,
    machine: u16,
    version: u32,
    entry: u32,
    phoff: u32,
    shoff: u32,
    flags: u32,
    ehsize: u16,
    phentsize: u16,
    phnum: u16,
    shentsize: u16,
    shnum: u16,
    shstrndx: u16,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct Elf32ProgramHeader {
    p_type: u32,
    p_offset: u32,
    p_vaddr: u32,
    p_paddr: u32,
    p_filesz: u32,
    p_memsz: u32,
    p_flags: u32,
    p_align: u32,
}

/// One `PT_LOAD` segment, flags already reduced to the `R/W/X` triple
/// spec §6 maps onto `PAGE_R/W/X`.
#[derive(Debug, Clone, Copy)]
pub struct LoadSegment {
    pub vaddr: u32,
    pub offset: u32,
    pub filesz: u32,
    pub memsz: u32,
    pub readable: bool,
    pub writable: bool,
    pub executable: bool,
}

#[derive(Debug, Clone)]
pub struct ElfImage {
    pub entry: u32,
    pub segments: Vec<LoadSegment>,
}

fn read_u16(data: &[u8], off: usize) -> Option<u16> {
    data.get(off..off + 2).map(|b| u16::from_le_bytes([b[0], b[1]]))
}

fn read_u32(data: &[u8], off: usize) -> Option<u32> {
    data.get(off..off + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// Parse and validate an ELF32 `ET_EXEC` image (spec §4.6 step 3: "read
/// and validate the ELF identity (`ET_EXEC`, class 32 or 64); only 32-bit
/// is implemented").
pub fn load(data: &[u8]) -> KResult<ElfImage> {
    if data.len() < size_of::<Elf32Header>() {
        return Err(KError::NoExec);
    }
    if data[0..4] != ELF_MAGIC {
        return Err(KError::NoExec);
    }
    if data[4] != ELFCLASS32 || data[5] != ELFDATA2LSB {
        return Err(KError::NoExec);
    }

    let elf_type = read_u16(data, 16).ok_or(KError::NoExec)?;
    if elf_type != ET_EXEC {
        return Err(KError::NoExec);
    }

    let entry = read_u32(data, 24).ok_or(KError::NoExec)?;
    let phoff = read_u32(data, 28).ok_or(KError::NoExec)? as usize;
    let phentsize = read_u16(data, 42).ok_or(KError::NoExec)? as usize;
    let phnum = read_u16(data, 44).ok_or(KError::NoExec)? as usize;

    if phentsize < size_of::<Elf32ProgramHeader>() {
        return Err(KError::NoExec);
    }

    let mut segments = Vec::new();
    for i in 0..phnum {
        let base = phoff + i * phentsize;
        let p_type = read_u32(data, base).ok_or(KError::NoExec)?;
        if p_type != PT_LOAD {
            continue;
        }
        let p_offset = read_u32(data, base + 4).ok_or(KError::NoExec)?;
        let p_vaddr = read_u32(data, base + 8).ok_or(KError::NoExec)?;
        let p_filesz = read_u32(data, base + 16).ok_or(KError::NoExec)?;
        let p_memsz = read_u32(data, base + 20).ok_or(KError::NoExec)?;
        let p_flags = read_u32(data, base + 24).ok_or(KError::NoExec)?;

        if p_filesz > p_memsz {
            return Err(KError::NoExec);
        }
        if data.get(p_offset as usize..(p_offset + p_filesz) as usize).is_none() {
            return Err(KError::NoExec);
        }

        segments.push(LoadSegment {
            vaddr: p_vaddr,
            offset: p_offset,
            filesz: p_filesz,
            memsz: p_memsz,
            readable: p_flags & PF_R != 0,
            writable: p_flags & PF_W != 0,
            executable: p_flags & PF_X != 0,
        });
    }

    if segments.is_empty() {
        return Err(KError::NoExec);
    }

    Ok(ElfImage { entry, segments })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_elf() -> Vec<u8> {
        // Header (52 bytes) + one program header (32 bytes) + 16 bytes of
        // NOPs, matching spec §8 end-to-end scenario 3.
        let mut data = alloc::vec![0u8; 52 + 32 + 16];
        data[0..4].copy_from_slice(&ELF_MAGIC);
        data[4] = ELFCLASS32;
        data[5] = ELFDATA2LSB;
        data[16..18].copy_from_slice(&(ET_EXEC as u16).to_le_bytes());
        data[24..28].copy_from_slice(&0x0040_0000u32.to_le_bytes()); // entry
        data[28..32].copy_from_slice(&52u32.to_le_bytes()); // phoff
        data[42..44].copy_from_slice(&32u16.to_le_bytes()); // phentsize
        data[44..46].copy_from_slice(&1u16.to_le_bytes()); // phnum

        let ph = 52;
        data[ph..ph + 4].copy_from_slice(&PT_LOAD.to_le_bytes());
        data[ph + 4..ph + 8].copy_from_slice(&84u32.to_le_bytes()); // offset
        data[ph + 8..ph + 12].copy_from_slice(&0x0040_0000u32.to_le_bytes()); // vaddr
        data[ph + 16..ph + 20].copy_from_slice(&16u32.to_le_bytes()); // filesz
        data[ph + 20..ph + 24].copy_from_slice(&32u32.to_le_bytes()); // memsz
        data[ph + 24..ph + 28].copy_from_slice(&(PF_R | PF_X).to_le_bytes());

        for b in &mut data[84..100] {
            *b = 0x90;
        }
        data
    }

    #[test]
    fn parses_single_load_segment() {
        let image = load(&sample_elf()).unwrap();
        assert_eq!(image.entry, 0x0040_0000);
        assert_eq!(image.segments.len(), 1);
        let seg = image.segments[0];
        assert_eq!(seg.vaddr, 0x0040_0000);
        assert_eq!(seg.filesz, 16);
        assert_eq!(seg.memsz, 32);
        assert!(seg.readable && seg.executable && !seg.writable);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut data = sample_elf();
        data[0] = 0;
        assert_eq!(load(&data), Err(KError::NoExec));
    }

    #[test]
    fn rejects_64_bit_class() {
        let mut data = sample_elf();
        data[4] = 2;
        assert_eq!(load(&data), Err(KError::NoExec));
    }
}
