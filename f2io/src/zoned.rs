// SPDX-License-Identifier: MIT

//! Zoned block device model.
//!
//! Offsets and lengths are in bytes, like the rest of `F2IO`. A sequential
//! zone only accepts data at its write pointer; everything past the pointer
//! reads back as zeroes.

#[cfg(feature = "mem")]
use alloc::vec::Vec;

use crate::F2IOResult;
#[cfg(feature = "mem")]
use crate::{F2IO, F2IOError, F2IOExt, mem::MemF2IO};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ZoneType {
    Conventional,
    SeqWriteRequired,
    SeqWritePreferred,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ZoneCondition {
    NotWritePointer,
    Empty,
    ImplicitOpen,
    ExplicitOpen,
    Closed,
    ReadOnly,
    Full,
    Offline,
}

/// One entry of a zone report.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Zone {
    pub start: u64,
    pub len: u64,
    pub wp: u64,
    pub zone_type: ZoneType,
    pub cond: ZoneCondition,
}

impl Zone {
    #[inline]
    pub fn is_sequential(&self) -> bool {
        self.zone_type != ZoneType::Conventional
    }

    #[inline]
    pub fn end(&self) -> u64 {
        self.start + self.len
    }

    /// Partially written and still taking writes.
    #[inline]
    pub fn is_open(&self) -> bool {
        matches!(self.cond, ZoneCondition::ImplicitOpen | ZoneCondition::ExplicitOpen)
    }

    /// Zones whose write pointer carries no meaning.
    #[inline]
    pub fn wp_is_meaningless(&self) -> bool {
        matches!(
            self.cond,
            ZoneCondition::NotWritePointer | ZoneCondition::ReadOnly | ZoneCondition::Offline
        )
    }
}

/// Zone management commands.
pub trait F2IOZoned {
    /// Size of every zone in bytes.
    fn zone_size(&self) -> u64;

    /// Number of zones on the device.
    fn zone_count(&self) -> usize;

    /// Reports the zone containing byte `offset`.
    fn report_zone(&mut self, offset: u64) -> F2IOResult<Zone>;

    /// Moves the write pointer of the zone at `offset` back to its start.
    fn reset_zone(&mut self, offset: u64) -> F2IOResult;

    /// Moves the write pointer of the zone at `offset` to its end.
    fn finish_zone(&mut self, offset: u64) -> F2IOResult;

    /// True when sequential zones must be written strictly at the pointer.
    fn host_managed(&self) -> bool {
        true
    }
}

/// In-memory host-managed zoned device built on top of [`MemF2IO`].
///
/// The first `conventional` zones accept random writes; the remaining zones
/// only accept writes at their write pointer.
#[cfg(feature = "mem")]
#[derive(Debug)]
pub struct MemZonedF2IO<'a> {
    inner: MemF2IO<'a>,
    zone_size: u64,
    zones: Vec<Zone>,
}

#[cfg(feature = "mem")]
impl<'a> MemZonedF2IO<'a> {
    /// Splits `buffer` into zones of `zone_size` bytes. Sequential zones
    /// start empty; use [`MemZonedF2IO::set_wp`] to model a written zone.
    pub fn new(buffer: &'a mut [u8], zone_size: u64, conventional: usize) -> Self {
        let count = (buffer.len() as u64 / zone_size) as usize;
        let zones = (0..count)
            .map(|i| {
                let start = i as u64 * zone_size;
                if i < conventional {
                    Zone {
                        start,
                        len: zone_size,
                        wp: start,
                        zone_type: ZoneType::Conventional,
                        cond: ZoneCondition::NotWritePointer,
                    }
                } else {
                    Zone {
                        start,
                        len: zone_size,
                        wp: start,
                        zone_type: ZoneType::SeqWriteRequired,
                        cond: ZoneCondition::Empty,
                    }
                }
            })
            .collect();
        Self {
            inner: MemF2IO::new(buffer),
            zone_size,
            zones,
        }
    }

    /// Forces the write pointer of the zone containing `offset`. A zone
    /// left partially written reports as implicitly open.
    pub fn set_wp(&mut self, offset: u64, wp: u64) -> F2IOResult {
        let zone = self.zone_mut(offset)?;
        if !zone.is_sequential() || wp < zone.start || wp > zone.end() {
            return Err(F2IOError::Zone("set_wp: invalid write pointer"));
        }
        zone.wp = wp;
        zone.cond = if wp == zone.start {
            ZoneCondition::Empty
        } else if wp == zone.end() {
            ZoneCondition::Full
        } else {
            ZoneCondition::ImplicitOpen
        };
        Ok(())
    }

    fn zone_mut(&mut self, offset: u64) -> F2IOResult<&mut Zone> {
        let idx = (offset / self.zone_size) as usize;
        self.zones.get_mut(idx).ok_or(F2IOError::OutOfBounds)
    }

    fn zone_at(&self, offset: u64) -> F2IOResult<&Zone> {
        let idx = (offset / self.zone_size) as usize;
        self.zones.get(idx).ok_or(F2IOError::OutOfBounds)
    }
}

#[cfg(feature = "mem")]
impl<'a> F2IO for MemZonedF2IO<'a> {
    fn write_at(&mut self, offset: u64, data: &[u8]) -> F2IOResult {
        let zone = *self.zone_at(offset)?;
        if zone.is_sequential() {
            if offset != zone.wp {
                return Err(F2IOError::Zone("unaligned write in sequential zone"));
            }
            if offset + data.len() as u64 > zone.end() {
                return Err(F2IOError::Zone("write crosses zone boundary"));
            }
        }
        self.inner.write_at(offset, data)?;
        if zone.is_sequential() {
            let wp = offset + data.len() as u64;
            self.set_wp(offset, wp)?;
        }
        Ok(())
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> F2IOResult {
        self.inner.read_at(offset, buf)
    }

    fn flush(&mut self) -> F2IOResult {
        self.inner.flush()
    }

    fn as_zoned(&mut self) -> Option<&mut dyn F2IOZoned> {
        Some(self)
    }
}

#[cfg(feature = "mem")]
impl<'a> F2IOZoned for MemZonedF2IO<'a> {
    fn zone_size(&self) -> u64 {
        self.zone_size
    }

    fn zone_count(&self) -> usize {
        self.zones.len()
    }

    fn report_zone(&mut self, offset: u64) -> F2IOResult<Zone> {
        self.zone_at(offset).copied()
    }

    fn reset_zone(&mut self, offset: u64) -> F2IOResult {
        let zone = *self.zone_at(offset)?;
        if !zone.is_sequential() {
            return Err(F2IOError::Zone("reset on conventional zone"));
        }
        self.inner.zero_fill(zone.start, (zone.wp - zone.start) as usize)?;
        self.set_wp(offset, zone.start)
    }

    fn finish_zone(&mut self, offset: u64) -> F2IOResult {
        let zone = *self.zone_at(offset)?;
        if !zone.is_sequential() {
            return Err(F2IOError::Zone("finish on conventional zone"));
        }
        self.set_wp(offset, zone.end())
    }
}

#[cfg(all(test, feature = "mem", feature = "std"))]
mod tests {
    use super::*;
    use crate::prelude::*;

    const ZONE: u64 = 4 * BLOCK_SIZE as u64;

    #[test]
    fn sequential_write_advances_wp() {
        let mut buf = vec![0u8; (ZONE * 4) as usize];
        let mut dev = MemZonedF2IO::new(&mut buf, ZONE, 1);

        let block = vec![1u8; BLOCK_SIZE];
        dev.write_block(4, &block).unwrap();
        let z = dev.report_zone(ZONE).unwrap();
        assert_eq!(z.wp, ZONE + BLOCK_SIZE as u64);
        assert_eq!(z.cond, ZoneCondition::ImplicitOpen);
        assert!(z.is_open());

        // Not at the pointer.
        assert!(dev.write_block(6, &block).is_err());
        // Conventional zone accepts random writes.
        dev.write_block(2, &block).unwrap();
    }

    #[test]
    fn reset_and_finish() {
        let mut buf = vec![0u8; (ZONE * 2) as usize];
        let mut dev = MemZonedF2IO::new(&mut buf, ZONE, 1);

        dev.write_block(4, &vec![7u8; BLOCK_SIZE]).unwrap();
        dev.reset_zone(ZONE).unwrap();
        let z = dev.report_zone(ZONE).unwrap();
        assert_eq!(z.wp, z.start);
        assert_eq!(z.cond, ZoneCondition::Empty);

        let mut out = vec![0xFFu8; BLOCK_SIZE];
        dev.read_block(4, &mut out).unwrap();
        assert!(out.iter().all(|&b| b == 0));

        dev.finish_zone(ZONE).unwrap();
        let z = dev.report_zone(ZONE).unwrap();
        assert_eq!(z.wp, z.end());
        assert_eq!(z.cond, ZoneCondition::Full);

        assert!(dev.finish_zone(0).is_err());
    }

    #[test]
    fn exposed_through_as_zoned() {
        let mut buf = vec![0u8; (ZONE * 2) as usize];
        let mut dev = MemZonedF2IO::new(&mut buf, ZONE, 1);
        let io: &mut dyn F2IO = &mut dev;
        let zoned = io.as_zoned().unwrap();
        assert_eq!(zoned.zone_count(), 2);
        assert!(zoned.host_managed());
    }
}
