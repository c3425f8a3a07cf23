use crate::memory::MemoryType;

/// Volatile byte-addressed memory, cleared on reset
pub struct Ram<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> Ram<N> {
    pub fn new() -> Self {
        Self { bytes: [0; N] }
    }

    pub fn reset(&mut self) {
        self.bytes = [0; N];
    }
}

impl<const N: usize> MemoryType for Ram<N> {
    fn read(&self, offset: usize) -> u8 {
        self.bytes[offset]
    }

    fn write(&mut self, offset: usize, value: u8) {
        self.bytes[offset] = value;
    }
}
