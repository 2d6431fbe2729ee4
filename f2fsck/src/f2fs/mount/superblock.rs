// SPDX-License-Identifier: MIT
//! Superblock loading and write-back

use alloc::boxed::Box;

use bitflags::bitflags;
use f2io::prelude::*;
use zerocopy::{FromBytes, IntoBytes};

use crate::core::errors::*;
use crate::f2fs::{constant::*, crc::superblock_chksum, types::F2fsSuperBlock};

bitflags! {
    /// Which superblock copies to write.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct SbMask: u32 {
        const PRIMARY = 1 << 0;
        const BACKUP  = 1 << 1;
        const ALL     = Self::PRIMARY.bits() | Self::BACKUP.bits();
    }
}

bitflags! {
    /// Error marks collected while loading the superblock.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct SbState: u32 {
        /// A stop reason is recorded.
        const FORCE_STOP    = 0x1;
        /// A stop reason other than a plain shutdown is recorded.
        const ABNORMAL_STOP = 0x2;
        /// The kernel recorded a corruption.
        const FS_ERRORS     = 0x4;
        /// The primary copy failed validation.
        const INVALID       = 0x8;
        const NEED_FIX = Self::ABNORMAL_STOP.bits() | Self::FS_ERRORS.bits() | Self::INVALID.bits();
    }
}

/// Outcome of a successful superblock load.
#[derive(Debug)]
pub struct LoadedSuper {
    pub sb: Box<F2fsSuperBlock>,
    /// Block the accepted copy was read from (0 or 1).
    pub addr: u32,
    pub state: SbState,
    /// `segment_count` was realigned to the main area end.
    pub realigned: bool,
}

/// Reads the copy stored in block `addr`.
pub fn read_superblock<IO: F2IO + ?Sized>(io: &mut IO, addr: u32) -> MountResult<Box<F2fsSuperBlock>> {
    let mut buf = vec![0u8; F2FS_BLKSIZE];
    io.read_block(addr as u64, &mut buf)?;
    let start = F2FS_SUPER_OFFSET as usize;
    let sb = F2fsSuperBlock::read_from_bytes(&buf[start..start + F2FS_SUPERBLOCK_SIZE])
        .map_err(|_| MountError::Other("short superblock"))?;
    Ok(Box::new(sb))
}

/// Writes `sb` to the copies named by `mask`, refreshing the checksum first.
pub fn update_superblock<IO: F2IO + ?Sized>(
    io: &mut IO,
    sb: &mut F2fsSuperBlock,
    mask: SbMask,
) -> F2IOResult {
    let old = sb.crc;
    sb.update_crc();
    if sb.has_feature(F2FS_FEATURE_SB_CHKSUM) {
        let new = sb.crc;
        log::debug!("superblock crc {old:#x} -> {new:#x}");
    }

    let mut buf = vec![0u8; F2FS_BLKSIZE];
    let start = F2FS_SUPER_OFFSET as usize;
    buf[start..start + F2FS_SUPERBLOCK_SIZE].copy_from_slice(sb.as_bytes());
    for (addr, bit) in [(0u64, SbMask::PRIMARY), (1u64, SbMask::BACKUP)] {
        if mask.contains(bit) {
            io.write_block(addr, &buf)?;
        }
    }
    log::info!("superblock updated ({mask:?})");
    Ok(())
}

fn verify_sb_chksum(sb: &F2fsSuperBlock) -> MountResult {
    let ofs = sb.checksum_offset as usize;
    if ofs != F2FS_SB_CHKSUM_OFFSET {
        log::warn!("invalid superblock crc offset {ofs}");
        return Err(MountError::BadChecksum);
    }
    let crc = sb.crc;
    if superblock_chksum(sb.as_bytes(), ofs) != crc {
        log::warn!("invalid superblock crc {crc:#x}");
        return Err(MountError::BadChecksum);
    }
    Ok(())
}

/// Area chain check. Returns `true` when `segment_count` had to shrink
/// to the end of the main area.
fn sanity_check_area_boundary(sb: &mut F2fsSuperBlock) -> MountResult<bool> {
    let shift = sb.log_blocks_per_seg;
    let seg0 = sb.segment0_blkaddr;
    let cp = sb.cp_blkaddr;
    let sit = sb.sit_blkaddr;
    let nat = sb.nat_blkaddr;
    let ssa = sb.ssa_blkaddr;
    let main = sb.main_blkaddr;

    let bound = |start: u32, count: u32| start as u64 + ((count as u64) << shift);

    if seg0 != cp {
        return Err(MountError::BadGeometry("segment0 and cp_blkaddr differ"));
    }
    if bound(cp, sb.segment_count_ckpt) != sit as u64 {
        return Err(MountError::BadGeometry("wrong CP boundary"));
    }
    if bound(sit, sb.segment_count_sit) != nat as u64 {
        return Err(MountError::BadGeometry("wrong SIT boundary"));
    }
    if bound(nat, sb.segment_count_nat) != ssa as u64 {
        return Err(MountError::BadGeometry("wrong NAT boundary"));
    }
    if bound(ssa, sb.segment_count_ssa) != main as u64 {
        return Err(MountError::BadGeometry("wrong SSA boundary"));
    }

    let main_end = bound(main, sb.segment_count_main);
    let seg_end = bound(seg0, sb.segment_count);
    if main_end > seg_end {
        return Err(MountError::BadGeometry("main area past the last segment"));
    }
    if main_end < seg_end {
        sb.segment_count = ((main_end - seg0 as u64) >> shift) as u32;
        log::info!(
            "fix alignment: main {main:#x}, segment_count -> {}",
            { sb.segment_count }
        );
        return Ok(true);
    }
    Ok(false)
}

/// Validates one superblock copy. Geometry realignment is applied in memory.
pub fn sanity_check_raw_super(sb: &mut F2fsSuperBlock) -> MountResult<bool> {
    if sb.magic != F2FS_SUPER_MAGIC {
        let magic = sb.magic;
        log::warn!("magic mismatch, read {magic:#x}");
        return Err(MountError::BadMagic);
    }
    if sb.has_feature(F2FS_FEATURE_SB_CHKSUM) {
        verify_sb_chksum(sb)?;
    }
    if sb.log_blocksize != F2FS_BLKSIZE_BITS {
        return Err(MountError::Unsupported("only 4 KiB blocks are supported"));
    }
    if sb.log_blocks_per_seg != LOG_BLOCKS_PER_SEG {
        return Err(MountError::BadGeometry("invalid log blocks per segment"));
    }
    let log_sector = sb.log_sectorsize;
    if !(F2FS_MIN_LOG_SECTOR_SIZE..=F2FS_MAX_LOG_SECTOR_SIZE).contains(&log_sector) {
        return Err(MountError::BadGeometry("invalid log sector size"));
    }
    if sb.log_sectors_per_block + log_sector != F2FS_MAX_LOG_SECTOR_SIZE {
        return Err(MountError::BadGeometry("invalid log sectors per block"));
    }

    let segment_count = sb.segment_count;
    let segs_per_sec = sb.segs_per_sec;
    let secs_per_zone = sb.secs_per_zone;
    let total_sections = sb.section_count;

    if !(F2FS_MIN_SEGMENTS..=F2FS_MAX_SEGMENT).contains(&segment_count) {
        return Err(MountError::BadGeometry("invalid segment count"));
    }
    if !sb.has_feature(F2FS_FEATURE_RO)
        && (total_sections > segment_count
            || total_sections < F2FS_MIN_SEGMENTS
            || segs_per_sec > segment_count
            || segs_per_sec == 0)
    {
        return Err(MountError::BadGeometry("invalid segment/section count"));
    }
    if segs_per_sec == 0 || segment_count / segs_per_sec < total_sections {
        return Err(MountError::BadGeometry("segment count too small for sections"));
    }
    if segment_count as u64 > sb.block_count >> LOG_BLOCKS_PER_SEG {
        return Err(MountError::BadGeometry("segment count exceeds block count"));
    }

    let devs = sb.devs;
    if devs[0].path[0] != 0 {
        let segs_per_zone = segs_per_sec * secs_per_zone.max(1);
        let dev_segs: u32 = devs
            .iter()
            .take_while(|d| d.path[0] != 0)
            .map(|d| d.total_segments)
            .sum();
        if segment_count != dev_segs / segs_per_zone * segs_per_zone {
            return Err(MountError::BadGeometry("segment count differs from devices"));
        }
    }

    if secs_per_zone > total_sections || secs_per_zone == 0 {
        return Err(MountError::BadGeometry("wrong secs_per_zone"));
    }
    let ext = sb.extension_count as usize;
    let hot = sb.hot_ext_count as usize;
    if ext > F2FS_MAX_EXTENSION || hot > F2FS_MAX_EXTENSION || ext + hot > F2FS_MAX_EXTENSION {
        return Err(MountError::BadGeometry("corrupted extension count"));
    }
    if sb.cp_payload > BLOCKS_PER_SEG - F2FS_CP_PACKS {
        return Err(MountError::BadGeometry("insane cp_payload"));
    }
    if sb.node_ino != F2FS_NODE_INO || sb.meta_ino != F2FS_META_INO || sb.root_ino != F2FS_ROOT_INO {
        return Err(MountError::BadGeometry("invalid reserved inode numbers"));
    }

    sanity_check_area_boundary(sb)
}

/// Stop reasons and error marks left by the kernel.
pub fn sb_error_state(sb: &F2fsSuperBlock) -> SbState {
    let mut state = SbState::empty();
    let stop = sb.s_stop_reason;
    if stop.iter().any(|&r| r != 0) {
        state |= SbState::FORCE_STOP;
    }
    // reason 0 is a plain shutdown
    if stop.iter().skip(1).any(|&r| r != 0) {
        state |= SbState::ABNORMAL_STOP;
    }
    let errs = sb.s_errors;
    if errs.iter().any(|&e| e != 0) {
        state |= SbState::FS_ERRORS;
    }
    state
}

/// Loads the primary copy, falling back to the backup.
///
/// A realigned `segment_count` is only written back when `writable`.
pub fn validate_super_block<IO: F2IO + ?Sized>(io: &mut IO, writable: bool) -> MountResult<LoadedSuper> {
    let mut state = SbState::empty();
    let mut last_err = MountError::BadMagic;

    for addr in 0..2u32 {
        let mut sb = read_superblock(io, addr)?;
        match sanity_check_raw_super(&mut sb) {
            Ok(realigned) => {
                if realigned && writable {
                    let mask = if addr == 0 { SbMask::PRIMARY } else { SbMask::BACKUP };
                    update_superblock(io, &mut sb, mask)?;
                }
                state |= sb_error_state(&sb);
                log::info!("superblock {addr} accepted");
                return Ok(LoadedSuper {
                    sb,
                    addr,
                    state,
                    realigned,
                });
            }
            Err(e) => {
                log::warn!("can't find a valid superblock at block {addr}: {}", e.msg());
                state |= SbState::INVALID;
                last_err = e;
            }
        }
    }
    Err(last_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample_sb() -> F2fsSuperBlock {
        let mut sb = F2fsSuperBlock::default();
        sb.log_sectorsize = 9;
        sb.log_sectors_per_block = 3;
        sb.block_count = 64 * 512;
        sb.segment0_blkaddr = 512;
        sb.cp_blkaddr = 512;
        sb.segment_count_ckpt = 2;
        sb.sit_blkaddr = 512 + 2 * 512;
        sb.segment_count_sit = 2;
        sb.nat_blkaddr = 512 + 4 * 512;
        sb.segment_count_nat = 2;
        sb.ssa_blkaddr = 512 + 6 * 512;
        sb.segment_count_ssa = 1;
        sb.main_blkaddr = 512 + 7 * 512;
        sb.segment_count_main = 32;
        sb.segment_count = 39;
        sb.section_count = 32;
        sb.secs_per_zone = 1;
        sb
    }

    #[test]
    fn accepts_sane_geometry() {
        let mut sb = sample_sb();
        assert_eq!(sanity_check_raw_super(&mut sb), Ok(false));
    }

    #[test]
    fn realigns_segment_count() {
        let mut sb = sample_sb();
        sb.segment_count = 41;
        assert_eq!(sanity_check_raw_super(&mut sb), Ok(true));
        assert_eq!({ sb.segment_count }, 39);
    }

    #[test]
    fn rejects_bad_chain_and_inos() {
        let mut sb = sample_sb();
        sb.nat_blkaddr += 1;
        assert!(matches!(
            sanity_check_raw_super(&mut sb),
            Err(MountError::BadGeometry(_))
        ));

        let mut sb = sample_sb();
        sb.root_ino = 4;
        assert!(sanity_check_raw_super(&mut sb).is_err());

        let mut sb = sample_sb();
        sb.magic = 0;
        assert_eq!(sanity_check_raw_super(&mut sb), Err(MountError::BadMagic));
    }

    #[test]
    fn crc_checked_when_enabled() {
        let mut sb = sample_sb();
        sb.feature |= F2FS_FEATURE_SB_CHKSUM;
        sb.checksum_offset = F2FS_SB_CHKSUM_OFFSET as u32;
        sb.update_crc();
        assert!(sanity_check_raw_super(&mut sb).is_ok());
        sb.crc ^= 1;
        assert_eq!(sanity_check_raw_super(&mut sb), Err(MountError::BadChecksum));
    }

    #[test]
    fn stop_reasons() {
        let mut sb = sample_sb();
        sb.s_stop_reason[0] = 1;
        assert_eq!(sb_error_state(&sb), SbState::FORCE_STOP);
        sb.s_stop_reason[3] = 1;
        sb.s_errors[2] = 1;
        let st = sb_error_state(&sb);
        assert!(st.contains(SbState::ABNORMAL_STOP | SbState::FS_ERRORS));
        assert!(st.intersects(SbState::NEED_FIX));
    }

    #[test]
    fn falls_back_to_backup() {
        let mut img = vec![0u8; 4 * F2FS_BLKSIZE];
        let mut sb = sample_sb();
        let start = F2FS_BLKSIZE + F2FS_SUPER_OFFSET as usize;
        img[start..start + F2FS_SUPERBLOCK_SIZE].copy_from_slice(sb.as_bytes());
        let mut io = MemF2IO::new(&mut img);
        let loaded = validate_super_block(&mut io, false).unwrap();
        assert_eq!(loaded.addr, 1);
        assert!(loaded.state.contains(SbState::INVALID));

        sb.magic = 0;
        let mut img = vec![0u8; 4 * F2FS_BLKSIZE];
        let mut io = MemF2IO::new(&mut img);
        assert!(validate_super_block(&mut io, false).is_err());
    }
}
