// SPDX-License-Identifier: MIT
//! Checkpoint pack selection, sanity checks and write-back

use alloc::vec::Vec;
use core::ops::Range;

use f2io::prelude::*;
use zerocopy::{FromBytes, IntoBytes};

use crate::core::errors::*;
use crate::f2fs::{
    constant::*,
    crc::checkpoint_chksum,
    mount::superblock::{SbMask, SbState, update_superblock},
    session::CheckSession,
    types::*,
};

const CP_HEADER_SIZE: usize = core::mem::size_of::<F2fsCheckpoint>();

/// The checkpoint pack in use.
#[derive(Debug, Clone)]
pub struct CheckpointState {
    pub cp: F2fsCheckpoint,
    /// Checkpoint block followed by its payload blocks.
    pub raw: Vec<u8>,
    /// Pack number, 1 or 2.
    pub cur_cp: u32,
    pub version: u64,
}

impl CheckpointState {
    /// First block of the pack `cur_cp`.
    #[inline]
    pub fn pack_start(&self, cp_blkaddr: u32) -> u32 {
        cp_blkaddr + ((self.cur_cp - 1) << LOG_BLOCKS_PER_SEG)
    }

    /// First summary block of the pack.
    #[inline]
    pub fn start_sum_block(&self, cp_blkaddr: u32) -> u32 {
        self.pack_start(cp_blkaddr) + self.cp.cp_pack_start_sum
    }

    /// Summary block `ty` counted back from the pack end, `base` blocks
    /// before the trailer.
    #[inline]
    pub fn sum_blk_addr(&self, cp_blkaddr: u32, base: u32, ty: u32) -> u32 {
        self.pack_start(cp_blkaddr) + self.cp.cp_pack_total_block_count - (base + 1) + ty
    }

    fn bitmap_range(&self, nat: bool) -> Range<usize> {
        let sit_size = self.cp.sit_ver_bitmap_bytesize as usize;
        let nat_size = self.cp.nat_ver_bitmap_bytesize as usize;
        let (start, len) = if self.cp.is_set(CP_LARGE_NAT_BITMAP_FLAG) {
            // a crc word sits in front of the bitmaps
            let base = CP_BITMAP_OFFSET + 4;
            if nat { (base, nat_size) } else { (base + nat_size, sit_size) }
        } else if self.raw.len() > F2FS_BLKSIZE {
            // with payload blocks, SIT takes the payload and NAT stays inline
            if nat {
                (CP_BITMAP_OFFSET, nat_size)
            } else {
                (F2FS_BLKSIZE, sit_size)
            }
        } else if nat {
            (CP_BITMAP_OFFSET + sit_size, nat_size)
        } else {
            (CP_BITMAP_OFFSET, sit_size)
        };
        let end = (start + len).min(self.raw.len());
        start.min(end)..end
    }

    /// NAT version bitmap, one bit per NAT block.
    pub fn nat_bitmap(&self) -> &[u8] {
        &self.raw[self.bitmap_range(true)]
    }

    /// SIT version bitmap, one bit per SIT block.
    pub fn sit_bitmap(&self) -> &[u8] {
        &self.raw[self.bitmap_range(false)]
    }

    /// Refreshes the header and the checksum in `raw`.
    pub fn seal(&mut self) {
        self.raw[..CP_HEADER_SIZE].copy_from_slice(self.cp.as_bytes());
        let ofs = self.cp.checksum_offset as usize;
        if (CP_MIN_CHKSUM_OFFSET..=CP_CHKSUM_OFFSET).contains(&ofs) {
            let crc = checkpoint_chksum(&self.raw[..F2FS_BLKSIZE]);
            self.raw[ofs..ofs + 4].copy_from_slice(&crc.to_le_bytes());
        }
    }
}

fn read_cp_block<IO: F2IO + ?Sized>(io: &mut IO, blkaddr: u32) -> MountResult<(F2fsCheckpoint, Vec<u8>)> {
    let mut buf = vec![0u8; F2FS_BLKSIZE];
    io.read_block(blkaddr as u64, &mut buf)?;
    let ofs = u32::from_le_bytes([buf[164], buf[165], buf[166], buf[167]]) as usize;
    if !(CP_MIN_CHKSUM_OFFSET..=CP_CHKSUM_OFFSET).contains(&ofs) {
        return Err(MountError::BadChecksum);
    }
    let stored = u32::from_le_bytes([buf[ofs], buf[ofs + 1], buf[ofs + 2], buf[ofs + 3]]);
    if checkpoint_chksum(&buf) != stored {
        return Err(MountError::BadChecksum);
    }
    let (cp, _) = F2fsCheckpoint::read_from_prefix(&buf).map_err(|_| MountError::Other("short checkpoint"))?;
    Ok((cp, buf))
}

/// Reads the pack starting at `addr`; both header and trailer must carry
/// a valid checksum and the same version.
fn validate_checkpoint<IO: F2IO + ?Sized>(io: &mut IO, addr: u32) -> MountResult<(F2fsCheckpoint, Vec<u8>)> {
    let (cp1, buf) = read_cp_block(io, addr)?;
    let total = cp1.cp_pack_total_block_count;
    if total == 0 || total > BLOCKS_PER_SEG {
        return Err(MountError::BadGeometry("cp pack too long"));
    }
    let (cp2, _) = read_cp_block(io, addr + total - 1)?;
    if { cp1.checkpoint_ver } != { cp2.checkpoint_ver } {
        return Err(MountError::Other("cp header and trailer disagree"));
    }
    Ok((cp1, buf))
}

/// Picks the newer valid pack; pack 1 wins a tie.
pub fn load_checkpoint<IO: F2IO + ?Sized>(io: &mut IO, sb: &F2fsSuperBlock) -> MountResult<CheckpointState> {
    let payload = sb.cp_payload;
    if payload > BLOCKS_PER_SEG - CP_PACK_FIXED_BLOCKS {
        return Err(MountError::BadGeometry("cp_payload too large"));
    }
    let pack1 = sb.cp_blkaddr;
    let pack2 = pack1 + BLOCKS_PER_SEG;

    let cp1 = validate_checkpoint(io, pack1).inspect_err(|e| log::warn!("cp pack 1: {}", e.msg()));
    let cp2 = validate_checkpoint(io, pack2).inspect_err(|e| log::warn!("cp pack 2: {}", e.msg()));

    let (cur_cp, (cp, mut raw)) = match (cp1, cp2) {
        (Ok(a), Ok(b)) => {
            if ver_after(b.0.checkpoint_ver, a.0.checkpoint_ver) {
                (2, b)
            } else {
                (1, a)
            }
        }
        (Ok(a), Err(_)) => (1, a),
        (Err(_), Ok(b)) => (2, b),
        (Err(_), Err(_)) => return Err(MountError::NoValidCheckpoint),
    };

    let start = if cur_cp == 1 { pack1 } else { pack2 };
    for i in 0..payload {
        let mut blk = vec![0u8; F2FS_BLKSIZE];
        io.read_block((start + 1 + i) as u64, &mut blk)?;
        raw.extend_from_slice(&blk);
    }
    let version = cp.checkpoint_ver;
    Ok(CheckpointState {
        cp,
        raw,
        cur_cp,
        version,
    })
}

impl<'a, IO: F2IO + ?Sized> CheckSession<'a, IO> {
    /// Geometry checks of the selected pack.
    ///
    /// A wrong `user_block_count` is recomputed when the checkpoint asks
    /// for a check and repairs are on; a bad `cp_pack_start_sum` moves
    /// `cp_payload` in the superblock unless it carries a checksum.
    pub(crate) fn sanity_check_ckpt(&mut self) -> MountResult {
        let sb = &self.sb;
        let cp = &self.ckpt.cp;
        let ro = self.meta.readonly();
        let fsmeta = sb.segment_count_ckpt
            + sb.segment_count_sit
            + sb.segment_count_nat
            + cp.rsvd_segment_count
            + sb.segment_count_ssa;
        if fsmeta >= sb.segment_count {
            return Err(MountError::BadGeometry("metadata covers the whole device"));
        }
        let ovp = cp.overprov_segment_count;
        let rsvd = cp.rsvd_segment_count;
        if !ro && (fsmeta < F2FS_MIN_SEGMENT || ovp == 0 || rsvd == 0) {
            return Err(MountError::BadGeometry("wrong layout"));
        }
        self.sm.reserved_segments = rsvd;
        self.sm.ovp_segments = ovp;

        let ubc = cp.user_block_count;
        let main = sb.segment_count_main + ro as u32;
        if ubc == 0 || ubc >= (main as u64) << LOG_BLOCKS_PER_SEG {
            log::warn!("wrong user_block_count({ubc})");
            if !self.should_proceed() || !self.run.fix_on {
                return Err(MountError::BadGeometry("wrong user_block_count"));
            }
            if self.ckpt.cp.is_set(CP_FSCK_FLAG | CP_RESIZEFS_FLAG) {
                let sb = &self.sb;
                let seg_cnt_main = sb.segment_count
                    - (sb.segment_count_ckpt + sb.segment_count_sit + sb.segment_count_nat + sb.segment_count_ssa);
                if seg_cnt_main != sb.segment_count_main {
                    return Err(MountError::BadGeometry("inconsistent segment_count_main"));
                }
                let fixed = ((sb.segment_count_main - ovp) as u64) << LOG_BLOCKS_PER_SEG;
                self.ckpt.cp.user_block_count = fixed;
                crate::fsck_fix!(self, "CP.USER_BLOCKS", "user_block_count {ubc} -> {fixed}");
                self.run.bug_on = true;
            }
        }

        let main_segs = self.sb.segment_count_main;
        for ty in 0..NR_CURSEG_TYPE {
            if self.ckpt.cp.cur_segno(ty) >= main_segs || self.ckpt.cp.cur_blkoff(ty) as u32 >= BLOCKS_PER_SEG {
                return Err(MountError::BadGeometry("curseg out of range"));
            }
        }

        let cp = &self.ckpt.cp;
        let want_sit = ((self.sb.segment_count_sit / 2) << LOG_BLOCKS_PER_SEG) / 8;
        let want_nat = ((self.sb.segment_count_nat / 2) << LOG_BLOCKS_PER_SEG) / 8;
        if cp.sit_ver_bitmap_bytesize != want_sit || cp.nat_ver_bitmap_bytesize != want_nat {
            return Err(MountError::BadGeometry("wrong version bitmap size"));
        }

        let start_sum = cp.cp_pack_start_sum;
        let payload = self.sb.cp_payload;
        if start_sum < payload + 1 || start_sum > BLOCKS_PER_SEG - 1 - NR_CURSEG_TYPE as u32 {
            log::warn!("wrong cp_pack_start_sum({start_sum}) or cp_payload({payload})");
            if self.meta.has_feature(F2FS_FEATURE_SB_CHKSUM) {
                return Err(MountError::BadGeometry("wrong cp_pack_start_sum"));
            }
            self.sb.cp_payload = start_sum.saturating_sub(1);
            self.meta.cp_payload = self.sb.cp_payload;
            if self.opts.writes_enabled() {
                update_superblock(&mut *self.io, &mut self.sb, SbMask::ALL)?;
            }
        }
        Ok(())
    }

    /// Decides whether an auto/preen run must do the full check.
    ///
    /// Turns repairs on when the checkpoint or superblock carry error
    /// marks; returns `false` when the image is clean and the run can stop.
    pub(crate) fn should_proceed(&mut self) -> bool {
        if self.run.fix_on
            || self.opts.force
            || !(self.opts.auto_fix || self.opts.preen != crate::core::options::PreenMode::Off)
        {
            return true;
        }
        let cp = &self.ckpt.cp;
        let has_qf = (0..F2FS_MAX_QUOTAS).any(|q| self.sb.quota_ino(q) != 0);
        if cp.is_set(CP_FSCK_FLAG)
            || cp.is_set(CP_DISABLED_FLAG)
            || cp.is_set(CP_QUOTA_NEED_FSCK_FLAG)
            || self.run.invalid_sb.intersects(SbState::NEED_FIX)
            || (has_qf && cp.is_set(CP_ERROR_FLAG))
        {
            self.run.fix_on = true;
            return true;
        }
        if self.opts.preen == crate::core::options::PreenMode::Off {
            log::info!("checkpoint state {:#x}: clean, skipping", { cp.ckpt_flags });
            return false;
        }
        true
    }

    /// Copies the selected pack over the other one, once per run.
    pub(crate) fn duplicate_checkpoint(&mut self) -> FsckResult {
        if self.run.cp_backuped {
            return Ok(());
        }
        let src = self.ckpt.pack_start(self.meta.cp_blkaddr);
        let dst = if self.ckpt.cur_cp == 1 {
            src + BLOCKS_PER_SEG
        } else {
            self.meta.cp_blkaddr
        };
        let mut buf = vec![0u8; F2FS_BLKSIZE];
        for i in 0..BLOCKS_PER_SEG {
            self.read_block(src + i, &mut buf)?;
            self.write_block(dst + i, &buf)?;
        }
        self.flush()?;
        log::info!("duplicate checkpoint to pack {}", if dst == self.meta.cp_blkaddr { 1 } else { 2 });
        self.run.cp_backuped = true;
        Ok(())
    }

    /// Writes the in-memory checkpoint into pack `cur_cp`.
    ///
    /// Counters come from the walk; current summaries go to the pack and,
    /// on writable images, to their SSA blocks.
    pub(crate) fn write_checkpoint(&mut self) -> FsckResult {
        let mut flags = if self.run.roll_forward { 0 } else { CP_UMOUNT_FLAG };
        let mut orphan_blks = 0;
        let free = self.free_segments();
        let chk = self.fsck.chk;
        let cp = &mut self.ckpt.cp;

        if cp.is_set(CP_ORPHAN_PRESENT_FLAG) {
            orphan_blks = cp.cp_pack_start_sum.saturating_sub(1 + self.meta.cp_payload);
            flags |= CP_ORPHAN_PRESENT_FLAG;
        }
        flags |= cp.ckpt_flags & (CP_TRIMMED_FLAG | CP_DISABLED_FLAG);
        if cp.is_set(CP_LARGE_NAT_BITMAP_FLAG) {
            flags |= CP_LARGE_NAT_BITMAP_FLAG;
            cp.checksum_offset = CP_MIN_CHKSUM_OFFSET as u32;
        } else {
            cp.checksum_offset = CP_CHKSUM_OFFSET as u32;
        }
        cp.free_segment_count = free;
        cp.valid_block_count = chk.valid_blk_cnt;
        cp.valid_node_count = chk.valid_node_cnt;
        cp.valid_inode_count = chk.valid_inode_cnt;
        if self.run.alloc_failed {
            flags |= CP_FSCK_FLAG;
        }
        flags |= CP_NOCRC_RECOVERY_FLAG;
        // without UMOUNT the node summaries stay out of the pack
        let fixed = if flags & CP_UMOUNT_FLAG != 0 {
            CP_PACK_FIXED_BLOCKS
        } else {
            CP_PACK_FIXED_BLOCKS - NR_CURSEG_NODE_TYPE as u32
        };
        cp.cp_pack_total_block_count = fixed + orphan_blks + self.meta.cp_payload;
        cp.ckpt_flags = flags;
        let total = cp.cp_pack_total_block_count;
        self.ckpt.seal();

        let start = self.ckpt.pack_start(self.meta.cp_blkaddr);
        let head = self.ckpt.raw[..F2FS_BLKSIZE].to_vec();
        self.write_block(start, &head)?;
        let mut blk = start + 1 + self.meta.cp_payload + orphan_blks;

        for ty in 0..NR_CURSEG_TYPE {
            if flags & CP_UMOUNT_FLAG == 0 && ty >= CURSEG_HOT_NODE {
                continue;
            }
            let sum = *self.cursegs[ty].sum;
            self.write_block(blk, sum.as_bytes())?;
            blk += 1;
            if !self.meta.readonly() {
                let ssa = self.meta.sum_blkaddr(self.cursegs[ty].segno);
                self.write_block(ssa, sum.as_bytes())?;
            }
        }
        self.flush()?;
        self.write_block(start + total - 1, &head)?;
        self.flush()?;
        log::info!("write_checkpoint() cur_cp:{}", self.ckpt.cur_cp);
        Ok(())
    }

    /// Mirrors the current pack then rewrites pack 1.
    pub(crate) fn write_checkpoints(&mut self) -> FsckResult {
        self.duplicate_checkpoint()?;
        self.ckpt.cur_cp = 1;
        self.write_checkpoint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(flags: u32, payload: usize) -> CheckpointState {
        let mut cp = F2fsCheckpoint::default();
        cp.ckpt_flags = flags;
        cp.sit_ver_bitmap_bytesize = 64;
        cp.nat_ver_bitmap_bytesize = 128;
        cp.checksum_offset = CP_CHKSUM_OFFSET as u32;
        CheckpointState {
            cp,
            raw: vec![0u8; F2FS_BLKSIZE * (1 + payload)],
            cur_cp: 1,
            version: 1,
        }
    }

    #[test]
    fn bitmap_placement() {
        let s = state(0, 0);
        assert_eq!(s.bitmap_range(false), 192..256);
        assert_eq!(s.bitmap_range(true), 256..384);

        let s = state(0, 1);
        assert_eq!(s.bitmap_range(true), 192..320);
        assert_eq!(s.bitmap_range(false), 4096..4160);

        let s = state(CP_LARGE_NAT_BITMAP_FLAG, 0);
        assert_eq!(s.bitmap_range(true), 196..324);
        assert_eq!(s.bitmap_range(false), 324..388);
    }

    #[test]
    fn seal_makes_a_valid_block() {
        let mut s = state(CP_UMOUNT_FLAG, 0);
        s.cp.checkpoint_ver = 7;
        s.seal();
        let stored = u32::from_le_bytes(s.raw[4092..4096].try_into().unwrap());
        assert_eq!(checkpoint_chksum(&s.raw), stored);
    }

    #[test]
    fn summary_addressing() {
        let mut s = state(0, 0);
        s.cur_cp = 2;
        s.cp.cp_pack_total_block_count = 8;
        s.cp.cp_pack_start_sum = 1;
        assert_eq!(s.pack_start(512), 1024);
        assert_eq!(s.start_sum_block(512), 1025);
        // data summaries of an unmount pack start right after the header
        assert_eq!(s.sum_blk_addr(512, NR_CURSEG_TYPE as u32, 0), 1025);
        assert_eq!(s.sum_blk_addr(512, 3, 0), 1028);
    }
}
