use super::periph::Peripheral;
use crate::constants::address_space::*;
use crate::constants::limits::MAX_PERIPHERALS;
use crate::error::AttachError;
use crate::interrupts::InterruptRequest;

use heapless::Vec;
use log::debug;

struct Attached<'a> {
    start: u32,
    len: u32,
    dev: &'a mut dyn Peripheral,
}

impl<'a> Attached<'a> {
    fn contains(&self, addr: u32) -> bool {
        addr >= self.start && addr - self.start < self.len
    }
}

/// Routes the peripheral windows (0x0000-0x0FFF) to attached devices
///
/// Registers nobody has claimed are backed by a scratch array so firmware can
/// touch unmodeled hardware (watchdog, clock system, port setup) without
/// faulting.
pub struct IoController<'a> {
    scratch: [u8; PERIPHERAL_SIZE],
    devices: Vec<Attached<'a>, MAX_PERIPHERALS>,
}

impl<'a> IoController<'a> {
    pub fn new() -> Self {
        Self {
            scratch: [0; PERIPHERAL_SIZE],
            devices: Vec::new(),
        }
    }

    pub fn attach(
        &mut self,
        start: u32,
        len: u32,
        dev: &'a mut dyn Peripheral,
    ) -> Result<(), AttachError> {
        if len == 0 || start as u64 + len as u64 > PERIPHERAL_SIZE as u64 {
            return Err(AttachError::OutsideWindow { start, len });
        }
        let end = start + len;
        let overlaps = self
            .devices
            .iter()
            .any(|d| start < d.start + d.len && d.start < end);
        if overlaps {
            return Err(AttachError::Overlap { start, len });
        }
        self.devices
            .push(Attached { start, len, dev })
            .map_err(|_| AttachError::TableFull)
    }

    fn device(&self, addr: u32) -> Option<&Attached<'a>> {
        self.devices.iter().find(|d| d.contains(addr))
    }

    fn device_mut(&mut self, addr: u32) -> Option<&mut Attached<'a>> {
        self.devices.iter_mut().find(|d| d.contains(addr))
    }

    pub fn read(&self, addr: u32) -> u8 {
        match self.device(addr) {
            Some(d) => d.dev.read(addr),
            None => self.scratch[addr as usize],
        }
    }

    pub fn read_word(&self, addr: u32) -> u16 {
        match self.device(addr) {
            Some(d) => d.dev.read_word(addr),
            None => u16::from_le_bytes([
                self.scratch[addr as usize],
                self.scratch[addr as usize + 1],
            ]),
        }
    }

    pub fn write(&mut self, addr: u32, value: u8) {
        match self.device_mut(addr) {
            Some(d) => d.dev.write(addr, value),
            None => {
                debug!("Unmodeled peripheral write 0x{:04x} <- 0x{:02x}", addr, value);
                self.scratch[addr as usize] = value;
            }
        }
    }

    pub fn write_word(&mut self, addr: u32, value: u16) {
        match self.device_mut(addr) {
            Some(d) => d.dev.write_word(addr, value),
            None => {
                debug!("Unmodeled peripheral write 0x{:04x} <- 0x{:04x}", addr, value);
                let [lo, hi] = value.to_le_bytes();
                self.scratch[addr as usize] = lo;
                self.scratch[addr as usize + 1] = hi;
            }
        }
    }

    pub fn tick(&mut self, cycles: u32) {
        for d in self.devices.iter_mut() {
            d.dev.tick(cycles);
        }
    }

    /// Collects interrupt requests from all attached devices
    pub fn get_interrupt_status(&mut self) -> Vec<InterruptRequest, MAX_PERIPHERALS> {
        let mut requests = Vec::new();
        for d in self.devices.iter_mut() {
            if let Some(req) = d.dev.is_interrupt() {
                // Capacity matches the device table
                let _ = requests.push(req);
            }
        }
        requests
    }

    pub fn reset(&mut self) {
        self.scratch = [0; PERIPHERAL_SIZE];
        for d in self.devices.iter_mut() {
            d.dev.reset();
        }
    }
}
