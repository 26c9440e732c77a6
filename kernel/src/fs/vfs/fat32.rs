//! Read-only FAT32 driver (spec §4.7b).
//!
//! Grounded structurally (not textually) on
//! `examples/original_source/fs/fat/fat.h`'s `Fat32BootRecord`/`FATEntry`
//! layout and its `FAT32Ctx` driver-context fields — this module's
//! `Bpb`/`FatCtx` mirror that field set, reimplemented as a Rust struct
//! read out of a raw sector buffer rather than a packed C struct cast.
//! Only the flat root directory is indexed (no subdirectory recursion,
//! no long filenames) — directory traversal beyond the root is out of
//! scope here the same way the distilled spec leaves FAT12/16 out
//! entirely; 8.3 short names are read back verbatim, trimmed of padding.

use super::driver::FileSystemDriver;
use super::vnode::{Vnode, VnodeKind, VnodeOps};
use super::FileSystem;
use crate::errno::{KError, KResult};
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;

const SECTOR_SIZE: usize = 512;
const DIR_ENTRY_SIZE: usize = 32;
const ATTR_DIRECTORY: u8 = 0x10;
const ATTR_VOLUME_ID: u8 = 0x08;
const ATTR_LFN: u8 = 0x0F;
const FAT32_EOC_MIN: u32 = 0x0FFF_FFF8;

struct Bpb {
    bytes_per_sector: u16,
    sectors_per_cluster: u8,
    reserved_sectors: u16,
    fat_count: u8,
    sectors_per_fat: u32,
    root_cluster: u32,
}

fn read_u16(b: &[u8], o: usize) -> u16 {
    u16::from_le_bytes([b[o], b[o + 1]])
}
fn read_u32(b: &[u8], o: usize) -> u32 {
    u32::from_le_bytes([b[o], b[o + 1], b[o + 2], b[o + 3]])
}

fn parse_bpb(sector0: &[u8]) -> Option<Bpb> {
    if sector0.len() < SECTOR_SIZE {
        return None;
    }
    if read_u16(sector0, 510) != 0xAA55 {
        return None;
    }
    let bytes_per_sector = read_u16(sector0, 11);
    let sectors_per_cluster = sector0[13];
    let reserved_sectors = read_u16(sector0, 14);
    let fat_count = sector0[16];
    let sector_count16 = read_u16(sector0, 19);
    let sectors_per_fat16 = read_u16(sector0, 22);
    let sectors_per_fat32 = read_u32(sector0, 36);
    let root_cluster = read_u32(sector0, 44);

    // FAT32 always reports 0 in both 16-bit sector-count fields; FAT12/16
    // volumes are explicitly unimplemented (spec §6) and rejected here.
    if sector_count16 != 0 || sectors_per_fat16 != 0 || sectors_per_fat32 == 0 {
        return None;
    }

    Some(Bpb {
        bytes_per_sector,
        sectors_per_cluster,
        reserved_sectors,
        fat_count,
        sectors_per_fat: sectors_per_fat32,
        root_cluster,
    })
}

struct FatCtx {
    device: String,
    bpb_bytes_per_sector: u16,
    sectors_per_cluster: u8,
    fat_start_lba: u64,
    data_start_lba: u64,
}

impl FatCtx {
    fn cluster_to_lba(&self, cluster: u32) -> u64 {
        self.data_start_lba + (cluster as u64 - 2) * self.sectors_per_cluster as u64
    }

    fn cluster_bytes(&self) -> usize {
        self.sectors_per_cluster as usize * self.bpb_bytes_per_sector as usize
    }

    fn read_cluster(&self, cluster: u32, out: &mut [u8]) -> KResult<()> {
        let lba = self.cluster_to_lba(cluster);
        crate::block::read_by_name(&self.device, lba, out)?;
        Ok(())
    }

    fn next_cluster(&self, cluster: u32) -> KResult<u32> {
        let fat_offset = cluster as u64 * 4;
        let sector = self.fat_start_lba + fat_offset / self.bpb_bytes_per_sector as u64;
        let mut buf = alloc::vec![0u8; self.bpb_bytes_per_sector as usize];
        crate::block::read_by_name(&self.device, sector, &mut buf)?;
        let in_sector = (fat_offset % self.bpb_bytes_per_sector as u64) as usize;
        Ok(read_u32(&buf, in_sector) & 0x0FFF_FFFF)
    }
}

struct FatFile {
    first_cluster: u32,
    size: u32,
}

fn read(vnode: &Vnode, offset: u64, buf: &mut [u8]) -> KResult<usize> {
    let file = vnode
        .data
        .downcast_ref::<(Arc<FatCtx>, FatFile)>()
        .ok_or(KError::Invalid)?;
    let (ctx, info) = file;
    if offset >= info.size as u64 {
        return Ok(0);
    }
    let cluster_size = ctx.cluster_bytes() as u64;
    let mut remaining = core::cmp::min(buf.len() as u64, info.size as u64 - offset) as usize;
    let mut cluster = info.first_cluster;
    let mut skip = offset;
    while skip >= cluster_size {
        cluster = ctx.next_cluster(cluster)?;
        if cluster >= FAT32_EOC_MIN {
            return Ok(0);
        }
        skip -= cluster_size;
    }

    let mut written = 0usize;
    let mut cluster_buf = alloc::vec![0u8; cluster_size as usize];
    let mut in_cluster_offset = skip as usize;
    while remaining > 0 {
        ctx.read_cluster(cluster, &mut cluster_buf)?;
        let n = core::cmp::min(remaining, cluster_buf.len() - in_cluster_offset);
        buf[written..written + n]
            .copy_from_slice(&cluster_buf[in_cluster_offset..in_cluster_offset + n]);
        written += n;
        remaining -= n;
        in_cluster_offset = 0;
        if remaining > 0 {
            cluster = ctx.next_cluster(cluster)?;
            if cluster >= FAT32_EOC_MIN {
                break;
            }
        }
    }
    Ok(written)
}

fn write(_vnode: &Vnode, _offset: u64, _buf: &mut [u8]) -> KResult<usize> {
    Err(KError::Perm)
}

fn size(vnode: &Vnode) -> u64 {
    vnode
        .data
        .downcast_ref::<(Arc<FatCtx>, FatFile)>()
        .map(|(_, f)| f.size as u64)
        .unwrap_or(0)
}

static OPS: VnodeOps = VnodeOps { read, write, size };

fn parse_short_name(entry: &[u8]) -> String {
    let name = core::str::from_utf8(&entry[0..8]).unwrap_or("").trim_end();
    let ext = core::str::from_utf8(&entry[8..11]).unwrap_or("").trim_end();
    if ext.is_empty() {
        name.to_string()
    } else {
        alloc::format!("{}.{}", name, ext)
    }
}

fn index_root_directory(fs: &mut FileSystem, ctx: &Arc<FatCtx>, root_cluster: u32) -> KResult<()> {
    let cluster_size = ctx.cluster_bytes();
    let mut buf = alloc::vec![0u8; cluster_size];
    let mut cluster = root_cluster;
    loop {
        ctx.read_cluster(cluster, &mut buf)?;
        for entry in buf.chunks_exact(DIR_ENTRY_SIZE) {
            let first_byte = entry[0];
            if first_byte == 0x00 {
                break;
            }
            if first_byte == 0xE5 {
                continue;
            }
            let attr = entry[11];
            if attr == ATTR_LFN || attr & ATTR_VOLUME_ID != 0 || attr & ATTR_DIRECTORY != 0 {
                continue;
            }
            let name = parse_short_name(entry);
            let cluster_hi = read_u16(entry, 20) as u32;
            let cluster_lo = read_u16(entry, 26) as u32;
            let first_cluster = (cluster_hi << 16) | cluster_lo;
            let file_size = read_u32(entry, 28);
            fs.vnodes.insert(Vnode {
                path: name,
                kind: VnodeKind::File,
                ops: &OPS,
                data: Arc::new((
                    ctx.clone(),
                    FatFile {
                        first_cluster,
                        size: file_size,
                    },
                )),
            });
        }
        let next = ctx.next_cluster(cluster)?;
        if next >= FAT32_EOC_MIN {
            break;
        }
        cluster = next;
    }
    Ok(())
}

fn init(fs: &mut FileSystem, src: &str) -> KResult<()> {
    let mut sector0 = [0u8; SECTOR_SIZE];
    crate::block::read_by_name(src, 0, &mut sector0)?;
    let bpb = parse_bpb(&sector0).ok_or(KError::NoExec)?;

    let fat_start_lba = bpb.reserved_sectors as u64;
    let data_start_lba =
        fat_start_lba + bpb.fat_count as u64 * bpb.sectors_per_fat as u64;

    let ctx = Arc::new(FatCtx {
        device: src.to_string(),
        bpb_bytes_per_sector: bpb.bytes_per_sector,
        sectors_per_cluster: bpb.sectors_per_cluster,
        fat_start_lba,
        data_start_lba,
    });

    index_root_directory(fs, &ctx, bpb.root_cluster)?;
    *fs.driver_ctx.lock() = Some(alloc::boxed::Box::new(ctx));
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
    name: "fat32",
    generic_probe: true,
    init,
    destroy,
    mkfile,
    rmnode,
    vnode_ops: &OPS,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_sector_without_boot_signature() {
        let sector = [0u8; SECTOR_SIZE];
        assert!(parse_bpb(&sector).is_none());
    }

    #[test]
    fn parses_minimal_valid_bpb() {
        let mut sector = [0u8; SECTOR_SIZE];
        sector[11..13].copy_from_slice(&512u16.to_le_bytes());
        sector[13] = 8; // sectors per cluster
        sector[14..16].copy_from_slice(&32u16.to_le_bytes()); // reserved
        sector[16] = 2; // fat count
        sector[36..40].copy_from_slice(&100u32.to_le_bytes()); // sectors per fat32
        sector[44..48].copy_from_slice(&2u32.to_le_bytes()); // root cluster
        sector[510..512].copy_from_slice(&0xAA55u16.to_le_bytes());

        let bpb = parse_bpb(&sector).unwrap();
        assert_eq!(bpb.bytes_per_sector, 512);
        assert_eq!(bpb.sectors_per_cluster, 8);
        assert_eq!(bpb.root_cluster, 2);
    }

    #[test]
    fn short_name_trims_and_joins_extension() {
        let mut entry = [0x20u8; DIR_ENTRY_SIZE];
        entry[0..8].copy_from_slice(b"README  ");
        entry[8..11].copy_from_slice(b"TXT");
        assert_eq!(parse_short_name(&entry), "README.TXT");
    }
}
