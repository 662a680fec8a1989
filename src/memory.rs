//! Sparse memory for the simulated machine. Real-mode addresses are
//! formed as (segment << 4) + offset and wrap at the 20-bit boundary.
//! Unwritten bytes read as zero. Every write is journaled so a front end
//! can repaint exactly the cells that changed since it last asked.
use std::collections::HashMap;

#[derive(Default)]
pub struct Memory {
    bytes: HashMap<u32, u8>,
    journal: Vec<(u32, u8)>,
}

/// Physical address of segment:offset, wrapped to 20 bits.
pub fn phys(seg: u16, off: u16) -> u32 { ((seg as u32) << 4).wrapping_add(off as u32) & 0xf_ffff }

impl Memory {
    pub fn read_u8(&self, seg: u16, off: u16) -> u8 { self.bytes.get(&phys(seg, off)).copied().unwrap_or(0) }
    /// Little-endian word read; the offset wraps within the segment.
    pub fn read_u16(&self, seg: u16, off: u16) -> u16 {
        let lo = self.read_u8(seg, off) as u16;
        let hi = self.read_u8(seg, off.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }
    pub fn write_u8(&mut self, seg: u16, off: u16, val: u8) {
        let addr = phys(seg, off);
        self.bytes.insert(addr, val);
        self.journal.push((addr, val));
    }
    pub fn write_u16(&mut self, seg: u16, off: u16, val: u16) {
        self.write_u8(seg, off, val as u8);
        self.write_u8(seg, off.wrapping_add(1), (val >> 8) as u8);
    }
    /// Copy a program image into memory, journaling each byte.
    pub fn load(&mut self, seg: u16, off: u16, bytes: &[u8]) {
        for (i, b) in bytes.iter().enumerate() {
            self.write_u8(seg, off.wrapping_add(i as u16), *b);
        }
    }
    /// Drain the journal of (physical address, value) writes.
    pub fn take_deltas(&mut self) -> Vec<(u32, u8)> { std::mem::take(&mut self.journal) }
}

/// The 256-port I/O space. Reads return whatever a front end last
/// staged with set; writes are surfaced to the caller as interrupts by
/// the runtime, not stored here.
pub struct Ports {
    vals: [u8; 256],
}

impl Default for Ports {
    fn default() -> Ports { Ports { vals: [0; 256] } }
}

impl Ports {
    pub fn get(&self, port: u8) -> u8 { self.vals[port as usize] }
    pub fn set(&mut self, port: u8, val: u8) { self.vals[port as usize] = val; }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn physical_addresses_wrap_at_20_bits() {
        assert_eq!(phys(0x0100, 0x0000), 0x01000);
        assert_eq!(phys(0x0100, 0xffff), 0x10fff);
        assert_eq!(phys(0xffff, 0xffff), 0x0ffef);
    }

    #[test]
    fn words_are_little_endian_and_wrap_the_offset() {
        let mut m = Memory::default();
        m.write_u16(0x0100, 0x0010, 0xbeef);
        assert_eq!(m.read_u8(0x0100, 0x0010), 0xef);
        assert_eq!(m.read_u8(0x0100, 0x0011), 0xbe);
        assert_eq!(m.read_u16(0x0100, 0x0010), 0xbeef);
        m.write_u16(0x0100, 0xffff, 0x1234);
        assert_eq!(m.read_u8(0x0100, 0xffff), 0x34);
        assert_eq!(m.read_u8(0x0100, 0x0000), 0x12);
    }

    #[test]
    fn unwritten_memory_reads_zero() {
        let m = Memory::default();
        assert_eq!(m.read_u8(0x2000, 0x1234), 0);
        assert_eq!(m.read_u16(0x2000, 0x1234), 0);
    }

    #[test]
    fn journal_records_and_drains() {
        let mut m = Memory::default();
        m.write_u8(0, 0x10, 7);
        m.write_u16(0, 0x20, 0x0102);
        assert_eq!(m.take_deltas(), vec![(0x10, 7), (0x20, 2), (0x21, 1)]);
        assert!(m.take_deltas().is_empty());
        m.load(0, 0, &[1, 2]);
        assert_eq!(m.take_deltas(), vec![(0, 1), (1, 2)]);
    }

    #[test]
    fn ports_default_to_zero() {
        let mut p = Ports::default();
        assert_eq!(p.get(0x60), 0);
        p.set(0x60, 0xaa);
        assert_eq!(p.get(0x60), 0xaa);
    }
}
