// SPDX-License-Identifier: MIT

//! Directory entry name hash (TEA based, from ext3).

use crate::f2fs::constant::F2FS_DOT_HASH;

const DELTA: u32 = 0x9E37_79B9;

fn tea_transform(buf: &mut [u32; 4], input: &[u32; 4]) {
    let mut sum: u32 = 0;
    let (mut b0, mut b1) = (buf[0], buf[1]);
    let [a, b, c, d] = *input;

    for _ in 0..16 {
        sum = sum.wrapping_add(DELTA);
        b0 = b0.wrapping_add(
            (b1 << 4).wrapping_add(a) ^ b1.wrapping_add(sum) ^ (b1 >> 5).wrapping_add(b),
        );
        b1 = b1.wrapping_add(
            (b0 << 4).wrapping_add(c) ^ b0.wrapping_add(sum) ^ (b0 >> 5).wrapping_add(d),
        );
    }

    buf[0] = buf[0].wrapping_add(b0);
    buf[1] = buf[1].wrapping_add(b1);
}

// `len` is the remaining name length, which may exceed the 16 bytes consumed.
fn str2hashbuf(msg: &[u8], len: usize, out: &mut [u32; 4]) {
    let mut pad = (len as u32) | ((len as u32) << 8);
    pad |= pad << 16;

    let mut val = pad;
    let take = len.min(16);
    let mut num = 4usize;
    let mut pos = 0usize;
    for (i, &byte) in msg.iter().take(take).enumerate() {
        if i % 4 == 0 {
            val = pad;
        }
        val = (byte as u32).wrapping_add(val << 8);
        if i % 4 == 3 {
            out[pos] = val;
            pos += 1;
            val = pad;
            num -= 1;
        }
    }
    if num > 0 {
        out[pos] = val;
        pos += 1;
        num -= 1;
    }
    while num > 0 {
        out[pos] = pad;
        pos += 1;
        num -= 1;
    }
}

#[inline]
pub fn is_dot_dotdot(name: &[u8]) -> bool {
    name == b"." || name == b".."
}

/// Raw TEA hash of `name`.
pub fn dentry_hash_raw(name: &[u8]) -> u32 {
    if is_dot_dotdot(name) {
        return F2FS_DOT_HASH;
    }

    let mut buf = [0x6745_2301u32, 0xefcd_ab89, 0x98ba_dcfe, 0x1032_5476];
    let mut input = [0u32; 4];
    let mut rest = name;
    let mut len = name.len();
    loop {
        str2hashbuf(rest, len, &mut input);
        tea_transform(&mut buf, &input);
        if len <= 16 {
            break;
        }
        rest = &rest[16..];
        len -= 16;
    }
    buf[0]
}

/// Hash stored in a dentry. Casefolded directories hash the folded name;
/// only ASCII folding is supported, other names use the opaque hash.
pub fn dentry_hash(casefolded: bool, name: &[u8]) -> u32 {
    if casefolded && !name.is_empty() && name.is_ascii() {
        let folded: alloc::vec::Vec<u8> = name.iter().map(|c| c.to_ascii_lowercase()).collect();
        return dentry_hash_raw(&folded);
    }
    dentry_hash_raw(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dots_hash_to_zero() {
        assert_eq!(dentry_hash_raw(b"."), 0);
        assert_eq!(dentry_hash_raw(b".."), 0);
        assert_ne!(dentry_hash_raw(b"..."), 0);
    }

    #[test]
    fn long_names_use_every_chunk() {
        let a = dentry_hash_raw(b"0123456789abcdef_tail_one");
        let b = dentry_hash_raw(b"0123456789abcdef_tail_two");
        assert_ne!(a, b);
    }

    #[test]
    fn casefold_ascii_only() {
        assert_eq!(dentry_hash(true, b"README"), dentry_hash(false, b"readme"));
        assert_ne!(dentry_hash(false, b"README"), dentry_hash(false, b"readme"));
        let utf = "caf\u{e9}".as_bytes();
        assert_eq!(dentry_hash(true, utf), dentry_hash_raw(utf));
    }

    #[test]
    fn stable_value() {
        // Same name, same hash; padding depends on the length.
        assert_eq!(dentry_hash_raw(b"foo"), dentry_hash_raw(b"foo"));
        assert_ne!(dentry_hash_raw(b"foo"), dentry_hash_raw(b"foo\0"));
    }
}
