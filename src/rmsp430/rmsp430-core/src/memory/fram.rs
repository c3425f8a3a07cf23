use crate::memory::MemoryType;

/// Non-volatile storage (program and information FRAM, boot memory, TLV)
///
/// Contents survive a device reset. Write protection is enforced by the
/// region permissions in the memory map, not here, so loaders can still fill
/// the array through the map's backdoor.
pub struct Fram<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> Fram<N> {
    /// Erased FRAM reads back as 0xFF
    pub fn erased() -> Self {
        Self { bytes: [0xFF; N] }
    }
}

impl<const N: usize> MemoryType for Fram<N> {
    fn read(&self, offset: usize) -> u8 {
        self.bytes[offset]
    }

    fn write(&mut self, offset: usize, value: u8) {
        self.bytes[offset] = value;
    }
}
