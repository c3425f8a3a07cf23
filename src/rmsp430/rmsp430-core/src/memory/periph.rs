use crate::interrupts::InterruptRequest;

/// Memory-mapped device attached inside a peripheral window
///
/// Addresses passed to the device are absolute bus addresses, so a device can
/// decode its registers against the datasheet offsets directly. Reads take
/// `&self`; a device that needs read side effects should latch them on the
/// next `tick`.
pub trait Peripheral {
    fn read(&self, addr: u32) -> u8;
    fn write(&mut self, addr: u32, value: u8);

    /// Word read, little endian
    fn read_word(&self, addr: u32) -> u16 {
        u16::from_le_bytes([self.read(addr), self.read(addr + 1)])
    }

    /// Word write, little endian
    fn write_word(&mut self, addr: u32, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.write(addr, lo);
        self.write(addr + 1, hi);
    }

    /// Advance device time by the cycles the last step consumed
    fn tick(&mut self, _cycles: u32) {}

    /// Check interrupt status, a returned request is queued by the CPU
    fn is_interrupt(&mut self) -> Option<InterruptRequest> {
        None
    }

    fn reset(&mut self) {}
}
