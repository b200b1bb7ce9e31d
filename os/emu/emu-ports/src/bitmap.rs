//! # Port Bitmaps
//!
//! One bit per I/O port. Used for the direct-access (`ioperm`) map, the
//! trace map and the force-fast map.

use crate::access::Width;

const WORDS: usize = 0x1_0000 / 64;

#[derive(Clone)]
pub struct PortBitmap {
    bits: Box<[u64; WORDS]>,
}

impl Default for PortBitmap {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for PortBitmap {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PortBitmap")
            .field("set", &self.count())
            .finish()
    }
}

impl PortBitmap {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bits: Box::new([0; WORDS]),
        }
    }

    #[inline]
    const fn locate(port: u16) -> (usize, u64) {
        let port = port as usize;
        (port / 64, 1 << (port % 64))
    }

    #[inline]
    #[must_use]
    pub fn test(&self, port: u16) -> bool {
        let (word, bit) = Self::locate(port);
        self.bits[word] & bit != 0
    }

    #[inline]
    pub fn set(&mut self, port: u16) {
        let (word, bit) = Self::locate(port);
        self.bits[word] |= bit;
    }

    #[inline]
    pub fn clear(&mut self, port: u16) {
        let (word, bit) = Self::locate(port);
        self.bits[word] &= !bit;
    }

    /// Sets or clears `len` consecutive ports starting at `start`.
    /// Ports past 0xFFFF are ignored.
    pub fn assign_range(&mut self, start: u16, len: usize, value: bool) {
        for port in (usize::from(start)..usize::from(start) + len).take_while(|&p| p <= 0xFFFF) {
            #[allow(clippy::cast_possible_truncation)]
            let port = port as u16;
            if value {
                self.set(port);
            } else {
                self.clear(port);
            }
        }
    }

    /// `true` if every port touched by an access of `width` at `port` is set.
    /// The span wraps at 0xFFFF like the port address itself.
    #[inline]
    #[must_use]
    pub fn covers(&self, port: u16, width: Width) -> bool {
        (0..width.bytes()).all(|offset| self.test(port.wrapping_add(offset)))
    }

    pub fn clear_all(&mut self) {
        self.bits.fill(0);
    }

    #[must_use]
    pub fn any(&self) -> bool {
        self.bits.iter().any(|w| *w != 0)
    }

    #[must_use]
    pub fn count(&self) -> u32 {
        self.bits.iter().map(|w| w.count_ones()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_test_clear() {
        let mut map = PortBitmap::new();
        assert!(!map.test(0x3f8));
        map.set(0x3f8);
        assert!(map.test(0x3f8));
        assert!(!map.test(0x3f9));
        map.clear(0x3f8);
        assert!(!map.any());
    }

    #[test]
    fn range_stops_at_last_port() {
        let mut map = PortBitmap::new();
        map.assign_range(0xfffe, 8, true);
        assert_eq!(map.count(), 2);
        assert!(map.test(0xffff));
    }

    #[test]
    fn covers_requires_every_byte() {
        let mut map = PortBitmap::new();
        map.assign_range(0x100, 3, true);
        assert!(map.covers(0x100, Width::Word));
        assert!(!map.covers(0x100, Width::Dword));
        map.set(0x103);
        assert!(map.covers(0x100, Width::Dword));
    }

    #[test]
    fn covers_wraps_around() {
        let mut map = PortBitmap::new();
        map.set(0xffff);
        map.set(0x0000);
        assert!(map.covers(0xffff, Width::Word));
    }
}
