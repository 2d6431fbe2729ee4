// SPDX-License-Identifier: MIT
//! `f2fsck info`: superblock and checkpoint summary

use colored::Colorize;
use f2fsck::f2fs::{
    constant::*,
    mount::{checkpoint::load_checkpoint, superblock::validate_super_block},
};
use f2fsck::prelude::*;

const FEATURES: &[(u32, &str)] = &[
    (F2FS_FEATURE_ENCRYPT, "encrypt"),
    (F2FS_FEATURE_BLKZONED, "blkzoned"),
    (F2FS_FEATURE_ATOMIC_WRITE, "atomic_write"),
    (F2FS_FEATURE_EXTRA_ATTR, "extra_attr"),
    (F2FS_FEATURE_PRJQUOTA, "project_quota"),
    (F2FS_FEATURE_INODE_CHKSUM, "inode_checksum"),
    (F2FS_FEATURE_FLEXIBLE_INLINE_XATTR, "flexible_inline_xattr"),
    (F2FS_FEATURE_QUOTA_INO, "quota_ino"),
    (F2FS_FEATURE_INODE_CRTIME, "inode_crtime"),
    (F2FS_FEATURE_LOST_FOUND, "lost_found"),
    (F2FS_FEATURE_VERITY, "verity"),
    (F2FS_FEATURE_SB_CHKSUM, "sb_checksum"),
    (F2FS_FEATURE_CASEFOLD, "casefold"),
    (F2FS_FEATURE_COMPRESSION, "compression"),
    (F2FS_FEATURE_RO, "ro"),
    (F2FS_FEATURE_DEVICE_ALIAS, "device_alias"),
];

const CP_FLAGS: &[(u32, &str)] = &[
    (CP_UMOUNT_FLAG, "umount"),
    (CP_ORPHAN_PRESENT_FLAG, "orphan"),
    (CP_COMPACT_SUM_FLAG, "compact_sum"),
    (CP_ERROR_FLAG, "error"),
    (CP_FSCK_FLAG, "fsck"),
    (CP_QUOTA_NEED_FSCK_FLAG, "quota_need_fsck"),
    (CP_LARGE_NAT_BITMAP_FLAG, "large_nat_bitmap"),
    (CP_NOCRC_RECOVERY_FLAG, "nocrc_recovery"),
    (CP_CRC_RECOVERY_FLAG, "crc_recovery"),
    (CP_TRIMMED_FLAG, "trimmed"),
    (CP_DISABLED_FLAG, "disabled"),
];

fn names(bits: u32, table: &[(u32, &'static str)]) -> String {
    let v: Vec<&str> = table.iter().filter(|(m, _)| bits & m != 0).map(|(_, n)| *n).collect();
    if v.is_empty() { "-".to_string() } else { v.join(", ") }
}

fn row(label: &str, value: impl core::fmt::Display) {
    println!("  {:<22} {value}", label.bold());
}

/// Prints the accepted superblock copy and the selected checkpoint pack.
pub fn print_info<IO: F2IO + ?Sized>(io: &mut IO) -> anyhow::Result<()> {
    let loaded = validate_super_block(io, false).map_err(FsError::from)?;
    let sb = &loaded.sb;
    let ckpt = load_checkpoint(io, sb).map_err(FsError::from)?;
    let cp = &ckpt.cp;

    println!("{}", "Superblock".underline());
    row("copy", loaded.addr);
    row("version", format!("{}.{}", { sb.major_ver }, { sb.minor_ver }));
    row("uuid", uuid::Uuid::from_bytes(sb.uuid));
    row("block_count", { sb.block_count });
    row("segment_count", { sb.segment_count });
    row("section_count", { sb.section_count });
    row("main_segments", { sb.segment_count_main });
    row("cp/sit/nat/ssa/main", format!(
        "{:#x} / {:#x} / {:#x} / {:#x} / {:#x}",
        { sb.cp_blkaddr },
        { sb.sit_blkaddr },
        { sb.nat_blkaddr },
        { sb.ssa_blkaddr },
        { sb.main_blkaddr }
    ));
    row("features", names({ sb.feature }, FEATURES));
    if !loaded.state.is_empty() {
        row("state", format!("{:?}", loaded.state).yellow());
    }

    println!("{}", "Checkpoint".underline());
    row("pack", ckpt.cur_cp);
    row("version", format!("{:#x}", ckpt.version));
    row("flags", names({ cp.ckpt_flags }, CP_FLAGS));
    row("user_block_count", { cp.user_block_count });
    row("valid_block_count", { cp.valid_block_count });
    row("valid_node_count", { cp.valid_node_count });
    row("valid_inode_count", { cp.valid_inode_count });
    row("free_segment_count", { cp.free_segment_count });
    row("next_free_nid", { cp.next_free_nid });
    for ty in 0..NR_CURSEG_TYPE {
        row(&format!("curseg[{ty}]"), format!("segno {:#x} blkoff {}", cp.cur_segno(ty), cp.cur_blkoff(ty)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_names() {
        assert_eq!(names(0, CP_FLAGS), "-");
        assert_eq!(names(CP_UMOUNT_FLAG | CP_FSCK_FLAG, CP_FLAGS), "umount, fsck");
    }
}
