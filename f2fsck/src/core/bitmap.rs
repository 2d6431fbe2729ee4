// SPDX-License-Identifier: MIT

//! Bitmap operations on byte slices.
//!
//! Two bit orders coexist on an F2FS image:
//! - dentry bitmaps are little-endian (bit 0 is the LSB of byte 0), see [`BitmapOps`];
//! - SIT valid maps, NAT/SIT version bitmaps and the checker's own bitmaps
//!   are MSB-first (bit 0 is the MSB of byte 0), see [`MsbBitmapOps`].

/// LSB-first bitmaps (dentry slot maps). Out-of-range bits read as clear
/// and ignore writes.
pub trait BitmapOps {
    fn set_bit(&mut self, bit: usize, value: bool);

    fn get_bit(&self, bit: usize) -> bool;

    /// Set bits in `[start, end)`.
    fn count_ones_in_range(&self, start: usize, end: usize) -> usize;

    fn find_first_zero(&self, start: usize) -> Option<usize>;

    /// First set bit in `[start, end)`.
    fn find_next_set(&self, start: usize, end: usize) -> Option<usize>;

    fn count_ones(&self) -> usize;
}

#[inline]
fn lsb_mask(bit: usize) -> u8 {
    1 << (bit % 8)
}

#[inline]
fn msb_mask(bit: usize) -> u8 {
    0x80 >> (bit % 8)
}

/// First bit in `[start, end)` whose value is `want`, whole bytes skipped
/// when they cannot match.
fn scan(map: &[u8], start: usize, end: usize, want: bool, mask: fn(usize) -> u8) -> Option<usize> {
    let end = end.min(map.len() * 8);
    let skip = if want { 0x00 } else { 0xFF };
    let mut bit = start;
    while bit < end {
        let byte = map[bit / 8];
        if bit % 8 == 0 && byte == skip {
            bit += 8;
            continue;
        }
        if (byte & mask(bit) != 0) == want {
            return Some(bit);
        }
        bit += 1;
    }
    None
}

impl BitmapOps for [u8] {
    #[inline]
    fn set_bit(&mut self, bit: usize, value: bool) {
        if let Some(byte) = self.get_mut(bit / 8) {
            if value {
                *byte |= lsb_mask(bit);
            } else {
                *byte &= !lsb_mask(bit);
            }
        }
    }

    #[inline]
    fn get_bit(&self, bit: usize) -> bool {
        self.get(bit / 8).is_some_and(|b| b & lsb_mask(bit) != 0)
    }

    fn count_ones_in_range(&self, start: usize, end: usize) -> usize {
        (start..end).filter(|&i| self.get_bit(i)).count()
    }

    fn find_first_zero(&self, start: usize) -> Option<usize> {
        scan(self, start, self.len() * 8, false, lsb_mask)
    }

    fn find_next_set(&self, start: usize, end: usize) -> Option<usize> {
        scan(self, start, end, true, lsb_mask)
    }

    fn count_ones(&self) -> usize {
        self.iter().map(|b| b.count_ones() as usize).sum()
    }
}

/// MSB-first bitmap operations.
pub trait MsbBitmapOps {
    /// Sets a bit, returning its previous value.
    fn set_msb(&mut self, bit: usize) -> bool;

    /// Clears a bit, returning its previous value.
    fn clear_msb(&mut self, bit: usize) -> bool;

    fn test_msb(&self, bit: usize) -> bool;

    /// Finds the first clear bit in `[start, end)`.
    fn find_next_zero_msb(&self, start: usize, end: usize) -> Option<usize>;

    /// Finds the first set bit in `[start, end)`.
    fn find_next_set_msb(&self, start: usize, end: usize) -> Option<usize>;

    /// Finds the last set bit in `[0, end)`.
    fn find_last_set_msb(&self, end: usize) -> Option<usize>;
}

impl MsbBitmapOps for [u8] {
    #[inline]
    fn set_msb(&mut self, bit: usize) -> bool {
        match self.get_mut(bit / 8) {
            Some(byte) => {
                let old = *byte & msb_mask(bit) != 0;
                *byte |= msb_mask(bit);
                old
            }
            None => false,
        }
    }

    #[inline]
    fn clear_msb(&mut self, bit: usize) -> bool {
        match self.get_mut(bit / 8) {
            Some(byte) => {
                let old = *byte & msb_mask(bit) != 0;
                *byte &= !msb_mask(bit);
                old
            }
            None => false,
        }
    }

    #[inline]
    fn test_msb(&self, bit: usize) -> bool {
        self.get(bit / 8).is_some_and(|b| b & msb_mask(bit) != 0)
    }

    fn find_next_zero_msb(&self, start: usize, end: usize) -> Option<usize> {
        scan(self, start, end, false, msb_mask)
    }

    fn find_next_set_msb(&self, start: usize, end: usize) -> Option<usize> {
        scan(self, start, end, true, msb_mask)
    }

    fn find_last_set_msb(&self, end: usize) -> Option<usize> {
        let end = end.min(self.len() * 8);
        (0..end).rev().find(|&bit| self.test_msb(bit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lsb_set_and_clear() {
        let mut bitmap = [0u8; 4];

        bitmap.set_bit(0, true);
        assert_eq!(bitmap[0], 0b00000001);
        bitmap.set_bit(7, true);
        assert_eq!(bitmap[0], 0b10000001);
        bitmap.set_bit(8, true);
        assert_eq!(bitmap[1], 0b00000001);
        bitmap.set_bit(0, false);
        assert_eq!(bitmap[0], 0b10000000);
    }

    #[test]
    fn out_of_range_bits_are_ignored() {
        let mut bitmap = [0u8; 2];
        bitmap.set_bit(100, true);
        assert_eq!(bitmap, [0, 0]);
        assert!(!bitmap.get_bit(100));
        assert!(!bitmap.set_msb(100));
        assert!(!bitmap.test_msb(100));
    }

    #[test]
    fn lsb_count_and_search() {
        let bitmap = [0b10101010u8, 0b11110000, 0b00001111];
        assert_eq!(bitmap.count_ones(), 12);
        assert_eq!(bitmap.count_ones_in_range(0, 8), 4);
        assert_eq!(bitmap.find_next_set(0, 24), Some(1));
        assert_eq!(bitmap.find_next_set(8, 24), Some(12));
        assert_eq!([0u8; 3].find_next_set(0, 24), None);

        let full = [0xFFu8, 0b11111101, 0];
        assert_eq!(full.find_first_zero(0), Some(9));
    }

    #[test]
    fn msb_order_and_search() {
        let mut bitmap = [0u8; 2];
        assert!(!bitmap.set_msb(0));
        assert_eq!(bitmap[0], 0x80);
        assert!(bitmap.set_msb(0));
        bitmap.set_msb(9);
        assert_eq!(bitmap[1], 0x40);
        assert!(bitmap.test_msb(9));
        assert_eq!(bitmap.find_next_zero_msb(0, 16), Some(1));
        assert_eq!(bitmap.find_next_set_msb(1, 16), Some(9));
        assert_eq!(bitmap.find_last_set_msb(16), Some(9));
        assert!(bitmap.clear_msb(9));
        assert_eq!(bitmap.find_last_set_msb(16), Some(0));
    }

    #[test]
    fn msb_scan_skips_whole_bytes() {
        let map = [0xFFu8, 0xFF, 0b1110_1111, 0x00, 0x00, 0b0000_0100];
        assert_eq!(map.find_next_zero_msb(0, 48), Some(19));
        assert_eq!(map.find_next_zero_msb(20, 48), Some(24));
        assert_eq!(map.find_next_set_msb(24, 48), Some(45));
        assert_eq!(map.find_next_set_msb(24, 45), None);
        assert_eq!(map.find_last_set_msb(48), Some(45));
    }
}
