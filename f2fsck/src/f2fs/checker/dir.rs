// SPDX-License-Identifier: MIT
//! Directory walk
//!
//! Dentry blocks and inline dentry areas share one slot walker. Each
//! occupied slot names a child inode that is checked recursively; broken
//! entries are cleared from the slot bitmap. The walker returns the number
//! of live entries, or `-1` when it changed the buffer.

use alloc::{string::String, vec};

use f2io::prelude::*;
use zerocopy::IntoBytes;

use crate::core::errors::*;
use crate::f2fs::{
    constant::*,
    hash::{dentry_hash, is_dot_dotdot},
    session::{CheckSession, ChildInfo, ComprBlkCnt, DOT_SEEN, DOTDOT_SEEN},
    types::*,
};

use super::data::DirCtx;

impl<'a, IO: F2IO + ?Sized> CheckSession<'a, IO> {
    /// Walks the dentry block at `blk`. `parent` holds the address and
    /// follows the block if it has to move.
    pub(crate) fn chk_dentry_blk(&mut self, dir: DirCtx, blk: u32, child: &mut ChildInfo, parent: &mut F2fsNode) -> FsckResult {
        if crate::fsck_bug!(
            self,
            self.fsck.dentry_depth >= self.opts.max_depth,
            "DIR.DEPTH",
            "directory tree deeper than {} at block {blk:#x}",
            self.opts.max_depth
        ) {
            return Ok(());
        }
        let mut buf = vec![0u8; F2FS_BLKSIZE];
        self.read_block(blk, &mut buf)?;

        self.fsck.dentry_depth += 1;
        let r = self.chk_dentries(DentryLayout::BLOCK, &mut buf, child, dir);
        self.fsck.dentry_depth -= 1;
        let dentries = r?;

        if dentries < 0 && self.writable() {
            let mut at = blk;
            self.update_block(&buf, &mut at, Some(parent))?;
            crate::fsck_fix!(
                self,
                "DIR.BLOCK",
                "[{:3}] Dentry Block [{at:#x}] fixed",
                self.fsck.dentry_depth
            );
        }
        log::debug!(
            "[{:3}] dentry block {blk:#x} done: dentries {dentries}, pgofs {}",
            self.fsck.dentry_depth,
            child.pgofs
        );
        Ok(())
    }

    /// Walks the inline dentry area of `node`; changes land in `node`.
    pub(crate) fn chk_inline_dentries(&mut self, node: &mut F2fsNode, child: &mut ChildInfo) -> FsckResult<i32> {
        let flex = self.meta.flexible_inline_xattr();
        let dir = DirCtx::of_inode(node);
        let start = node.inline_data_offset();
        let max = node.max_inline_data(flex);
        let layout = DentryLayout::inline(max);
        let mut area = node.inline_data(flex).to_vec();

        self.fsck.dentry_depth += 1;
        let r = self.chk_dentries(layout, &mut area, child, dir);
        self.fsck.dentry_depth -= 1;
        let dentries = r?;

        if dentries < 0 {
            let end = start + area.len();
            node.as_mut_bytes()[start..end].copy_from_slice(&area);
            log::debug!("[{:3}] inline dentry of {:#x} fixed", self.fsck.dentry_depth, node.nid());
        }
        Ok(dentries)
    }

    fn chk_dentries(&mut self, layout: DentryLayout, buf: &mut [u8], child: &mut ChildInfo, dir: DirCtx) -> FsckResult<i32> {
        let mut dentries = 0i32;
        let mut fixed = false;
        let mut i = 0;

        while i < layout.nr {
            if !layout.test_slot(buf, i) {
                i += 1;
                continue;
            }
            let mut de = layout.entry(buf, i);
            let ino = de.ino;
            let ftype = de.file_type;
            let name_len = de.name_len as usize;

            let bad = if !self.meta.is_valid_nid(ino) {
                Some(alloc::format!("Bad dentry {i:#x} with invalid NID/ino {ino:#x}"))
            } else if ftype == F2FS_FT_UNKNOWN || ftype > F2FS_FT_LAST_FILE_TYPE {
                Some(alloc::format!("Bad dentry {ino:#x} with unexpected ftype {ftype:#x}"))
            } else if name_len == 0 || name_len > F2FS_NAME_LEN {
                Some(alloc::format!("Bad dentry {i:#x} with invalid name_len {name_len}"))
            } else {
                None
            };
            if let Some(msg) = bad {
                crate::fsck_bug!(self, true, "DENTRY.BAD", "{msg}");
                if self.run.fix_on {
                    layout.set_slot(buf, i, false);
                    fixed = true;
                    crate::fsck_fix!(self, "DENTRY.BAD", "Clear bad dentry {i:#x}");
                }
                i += 1;
                continue;
            }

            let name = layout.name(buf, i, name_len).to_vec();
            let slots = name_slots(name_len);

            if ftype == F2FS_FT_DIR && is_dot_dotdot(&name) {
                let seen = if name.len() == 1 { DOT_SEEN } else { DOTDOT_SEEN };
                if self.chk_dots_dentry(&mut de, &name, child, dir) {
                    layout.set_entry(buf, i, &de);
                    fixed = true;
                }
                if crate::fsck_bug!(
                    self,
                    child.dots & seen != 0,
                    "DENTRY.DOTS",
                    "More than one '{}' in directory {:#x}, delete the extra one",
                    String::from_utf8_lossy(&name),
                    child.p_ino
                ) {
                    layout.nullify(buf, i);
                    fixed = true;
                }
                child.dots |= seen;
                i += 1;
                continue;
            }

            if self.chk_hash_code(&mut de, &name, dir) {
                layout.set_entry(buf, i, &de);
                fixed = true;
            }

            let shown = printable_name(&name, dir.enc_name);
            if layout.is_block() {
                if let Err((level, bidx, end)) = dirent_in_bucket(de.hash_code, child.pgofs, child.dir_level) {
                    crate::fsck_bug!(
                        self,
                        true,
                        "DENTRY.POS",
                        "Wrong position of dirent pino:{:#x}, name:{shown}, level:{level}, dir_level:{}, pgofs:{}, correct range:[{bidx}, {end}]",
                        child.p_ino,
                        child.dir_level,
                        child.pgofs
                    );
                    if self.run.fix_on {
                        layout.set_slot(buf, i, false);
                        fixed = true;
                        crate::fsck_fix!(self, "DENTRY.POS", "Clear bad dentry {i:#x}");
                    }
                    i += 1;
                    continue;
                }
            }

            log::debug!(
                "[{:3}] {} ino {ino:#x} name {shown}",
                self.fsck.dentry_depth,
                if ftype == F2FS_FT_DIR { "dir" } else { "file" }
            );

            let mut blk_cnt = 1u64;
            let mut cbc = ComprBlkCnt::default();
            child.i_namelen = name_len as u32;
            if ftype == F2FS_FT_DIR {
                self.fsck.path.push(shown.clone());
            }
            let r = self.chk_node_blk(None, ino, ftype, NodeKind::Inode, &mut blk_cnt, &mut cbc, child);
            if ftype == F2FS_FT_DIR {
                self.fsck.path.pop();
            }
            match r {
                Ok(()) => {
                    if ftype == F2FS_FT_DIR {
                        child.links += 1;
                    }
                    dentries += 1;
                    child.files += 1;
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    log::debug!("dentry {shown} -> {ino:#x}: {e}");
                    if self.run.fix_on {
                        for j in 0..slots {
                            layout.set_slot(buf, i + j, false);
                        }
                        fixed = true;
                        crate::fsck_fix!(
                            self,
                            "DENTRY.UNLINK",
                            "Unlink [{ino:#x}] - {shown} len[{name_len:#x}], type[{ftype:#x}]"
                        );
                    }
                }
            }
            i += slots.max(1);
        }
        Ok(if fixed { -1 } else { dentries })
    }

    /// `.` must point at the directory itself, `..` at its parent (the
    /// root is its own parent). Returns true when `de` was changed.
    fn chk_dots_dentry(&mut self, de: &mut F2fsDirEntry, name: &[u8], child: &ChildInfo, dir: DirCtx) -> bool {
        let mut fixed = false;
        let ino = de.ino;
        let root = self.meta.root_ino;

        let want = if name.len() == 1 {
            child.p_ino
        } else if child.p_ino == root {
            root
        } else {
            child.pp_ino
        };
        if crate::fsck_bug!(
            self,
            ino != want,
            "DENTRY.DOTS",
            "Bad inode number[{ino:#x}] for '{}', parent is [{want:#x}]",
            String::from_utf8_lossy(name)
        ) {
            de.ino = want;
            fixed = true;
            if self.run.fix_on {
                crate::fsck_fix!(self, "DENTRY.DOTS", "'{}' of {:#x}: ino {ino:#x} -> {want:#x}", String::from_utf8_lossy(name), child.p_ino);
            }
        }
        if self.chk_hash_code(de, name, dir) {
            fixed = true;
        }
        fixed
    }

    /// Recomputes the hash of `name`; returns true when `de` was changed.
    fn chk_hash_code(&mut self, de: &mut F2fsDirEntry, name: &[u8], dir: DirCtx) -> bool {
        // hashes of encrypted casefolded names cannot be recomputed
        if dir.enc_name && dir.casefolded {
            return false;
        }
        let hash = dentry_hash(dir.casefolded, name);
        let stored = de.hash_code;
        if !crate::fsck_bug!(
            self,
            stored != hash,
            "DENTRY.HASH",
            "Mismatch hash_code for \"{}\" [{stored:#x}:{hash:#x}]",
            printable_name(name, dir.enc_name)
        ) {
            return false;
        }
        de.hash_code = hash;
        if self.run.fix_on {
            crate::fsck_fix!(self, "DENTRY.HASH", "hash_code {stored:#x} -> {hash:#x}");
        }
        true
    }
}

/// Name for messages; encrypted names are shown as hex.
fn printable_name(name: &[u8], encrypted: bool) -> String {
    if !encrypted {
        return String::from_utf8_lossy(name).into_owned();
    }
    let mut out = String::with_capacity(name.len() * 2);
    for b in name.iter().take(16) {
        out.push_str(&alloc::format!("{b:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_for_messages() {
        assert_eq!(printable_name(b"foo", false), "foo");
        assert_eq!(printable_name(&[0xab, 0x01], true), "ab01");
    }
}
