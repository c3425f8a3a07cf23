mod fram;
pub mod io;
pub mod periph;
mod ram;

pub use io::IoController;

use self::periph::Peripheral;
use crate::constants::address_space::*;
use crate::constants::limits::MAX_PERIPHERALS;
use crate::error::{Access, AccessFault, AttachError};
use crate::interrupts::InterruptRequest;
use bitflags::bitflags;

/// Byte storage behind a region, addressed by offset into the region
trait MemoryType {
    fn read(&self, offset: usize) -> u8;
    fn write(&mut self, offset: usize, value: u8);
}

bitflags! {
    /// Access rights of a memory region
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Perm: u8 {
        const R = 1 << 0;
        const W = 1 << 1;
        const X = 1 << 2;
    }
}

impl Perm {
    fn allows(self, access: Access) -> bool {
        match access {
            Access::Read => self.contains(Perm::R),
            Access::Write => self.contains(Perm::W),
            Access::Execute => self.contains(Perm::X),
        }
    }
}

/// Storage a region is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backing {
    Peripheral,
    Bsl,
    InfoFram,
    Tlv,
    Sram,
    MainFram,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub name: &'static str,
    pub start: u32,
    pub end: u32,
    pub perm: Perm,
    pub backing: Backing,
}

impl Region {
    pub fn contains(&self, addr: u32) -> bool {
        addr >= self.start && addr <= self.end
    }
}

const fn region(name: &'static str, start: u32, end: u32, perm: Perm, backing: Backing) -> Region {
    Region {
        name,
        start,
        end,
        perm,
        backing,
    }
}

/// MSP430FR2355 layout, ordered and non-overlapping
pub static REGIONS: [Region; 9] = [
    region(
        "peripherals",
        PERIPHERAL_LOW_START,
        PERIPHERAL_LOW_END,
        Perm::R.union(Perm::W),
        Backing::Peripheral,
    ),
    region(
        "sfr",
        SFR_START,
        SFR_END,
        Perm::R.union(Perm::W),
        Backing::Peripheral,
    ),
    region(
        "peripherals",
        PERIPHERAL_HIGH_START,
        PERIPHERAL_HIGH_END,
        Perm::R.union(Perm::W),
        Backing::Peripheral,
    ),
    region("bsl", BSL_START, BSL_END, Perm::R.union(Perm::X), Backing::Bsl),
    region(
        "info-fram",
        INFO_FRAM_START,
        INFO_FRAM_END,
        Perm::R.union(Perm::W),
        Backing::InfoFram,
    ),
    region("tlv", TLV_START, TLV_END, Perm::R, Backing::Tlv),
    region("sram", SRAM_START, SRAM_END, Perm::all(), Backing::Sram),
    // Program FRAM stays write protected (PFWP=1 after reset)
    region(
        "main-fram",
        MAIN_FRAM_START,
        MAIN_FRAM_END,
        Perm::R.union(Perm::X),
        Backing::MainFram,
    ),
    region("vectors", VECTORS_START, VECTORS_END, Perm::R, Backing::MainFram),
];

/// Finds the region holding an address, `None` when unmapped
pub fn region_of(addr: u32) -> Option<&'static Region> {
    REGIONS.iter().find(|r| r.contains(addr))
}

/// Memory controller for the 20-bit address space
///
/// Every access is validated against the region table before it reaches a
/// backing store. Peripheral windows are routed through the I/O controller.
pub struct MemoryMap<'a> {
    sram: ram::Ram<SRAM_SIZE>,
    bsl: fram::Fram<BSL_SIZE>,
    info: fram::Fram<INFO_FRAM_SIZE>,
    tlv: fram::Fram<TLV_SIZE>,
    main: fram::Fram<MAIN_FRAM_SIZE>,
    io: io::IoController<'a>,
}

impl<'a> Default for MemoryMap<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> MemoryMap<'a> {
    /// Creates a map with erased FRAM, cleared SRAM and no peripherals
    pub fn new() -> MemoryMap<'a> {
        MemoryMap {
            sram: ram::Ram::new(),
            bsl: fram::Fram::erased(),
            info: fram::Fram::erased(),
            tlv: fram::Fram::erased(),
            main: fram::Fram::erased(),
            io: io::IoController::new(),
        }
    }

    /// Clears volatile state; FRAM contents are kept
    pub fn reset(&mut self) {
        self.sram.reset();
        self.io.reset();
    }

    pub fn region(&self, addr: u32) -> Option<&'static Region> {
        region_of(addr)
    }

    /// Registers a device for `len` bytes starting at `start`
    pub fn attach(
        &mut self,
        start: u32,
        len: u32,
        dev: &'a mut dyn Peripheral,
    ) -> Result<(), AttachError> {
        self.io.attach(start, len, dev)
    }

    fn lookup(addr: u32, access: Access) -> Result<&'static Region, AccessFault> {
        let region = region_of(addr).ok_or(AccessFault::Unmapped { addr })?;
        if !region.perm.allows(access) {
            return Err(AccessFault::Permission {
                addr,
                access,
                region: region.name,
            });
        }
        Ok(region)
    }

    fn aligned(addr: u32) -> Result<(), AccessFault> {
        match addr & 1 {
            0 => Ok(()),
            _ => Err(AccessFault::Misaligned { addr }),
        }
    }

    fn load(&self, region: &Region, addr: u32) -> u8 {
        let offset = (addr - region.start) as usize;
        match region.backing {
            Backing::Peripheral => self.io.read(addr),
            Backing::Bsl => self.bsl.read(offset),
            Backing::InfoFram => self.info.read(offset),
            Backing::Tlv => self.tlv.read(offset),
            Backing::Sram => self.sram.read(offset),
            // Vectors share the program FRAM array
            Backing::MainFram => self.main.read((addr - MAIN_FRAM_START) as usize),
        }
    }

    fn store(&mut self, region: &Region, addr: u32, value: u8) {
        let offset = (addr - region.start) as usize;
        match region.backing {
            Backing::Peripheral => self.io.write(addr, value),
            Backing::Bsl => self.bsl.write(offset, value),
            Backing::InfoFram => self.info.write(offset, value),
            Backing::Tlv => self.tlv.write(offset, value),
            Backing::Sram => self.sram.write(offset, value),
            Backing::MainFram => self.main.write((addr - MAIN_FRAM_START) as usize, value),
        }
    }

    fn load_word(&self, region: &Region, addr: u32) -> u16 {
        match region.backing {
            Backing::Peripheral => self.io.read_word(addr),
            _ => u16::from_le_bytes([self.load(region, addr), self.load(region, addr + 1)]),
        }
    }

    pub fn read_byte(&self, addr: u32) -> Result<u8, AccessFault> {
        let region = Self::lookup(addr, Access::Read)?;
        Ok(self.load(region, addr))
    }

    pub fn read_word(&self, addr: u32) -> Result<u16, AccessFault> {
        Self::aligned(addr)?;
        let region = Self::lookup(addr, Access::Read)?;
        Ok(self.load_word(region, addr))
    }

    /// Instruction fetch, requires execute permission
    pub fn fetch_word(&self, addr: u32) -> Result<u16, AccessFault> {
        Self::aligned(addr)?;
        let region = Self::lookup(addr, Access::Execute)?;
        Ok(self.load_word(region, addr))
    }

    pub fn write_byte(&mut self, addr: u32, value: u8) -> Result<(), AccessFault> {
        let region = Self::lookup(addr, Access::Write)?;
        self.store(region, addr, value);
        Ok(())
    }

    pub fn write_word(&mut self, addr: u32, value: u16) -> Result<(), AccessFault> {
        Self::aligned(addr)?;
        let region = Self::lookup(addr, Access::Write)?;
        match region.backing {
            Backing::Peripheral => self.io.write_word(addr, value),
            _ => {
                let [lo, hi] = value.to_le_bytes();
                self.store(region, addr, lo);
                self.store(region, addr + 1, hi);
            }
        }
        Ok(())
    }

    /// 20-bit value stored as two words, bits 19:16 in the low nibble of the second
    pub fn read_addr(&self, addr: u32) -> Result<u32, AccessFault> {
        let lo = self.read_word(addr)? as u32;
        let hi = self.read_word(addr + 2)? as u32;
        Ok((hi & 0xF) << 16 | lo)
    }

    pub fn write_addr(&mut self, addr: u32, value: u32) -> Result<(), AccessFault> {
        self.check_write(addr, 4)?;
        self.write_word(addr, value as u16)?;
        self.write_word(addr + 2, ((value >> 16) & 0xF) as u16)
    }

    /// Validates a write of `len` bytes (1, 2 or 4) without performing it
    pub fn check_write(&self, addr: u32, len: u32) -> Result<(), AccessFault> {
        if len > 1 {
            Self::aligned(addr)?;
        }
        for a in addr..addr + len {
            Self::lookup(a, Access::Write)?;
        }
        Ok(())
    }

    /// Loader backdoor: copies bytes ignoring permissions
    ///
    /// Fails without writing anything if any byte lands on an unmapped address.
    pub fn write_block(&mut self, start: u32, bytes: &[u8]) -> Result<(), AccessFault> {
        for i in 0..bytes.len() as u32 {
            let addr = start + i;
            region_of(addr).ok_or(AccessFault::Unmapped { addr })?;
        }
        for (i, b) in bytes.iter().enumerate() {
            let addr = start + i as u32;
            if let Some(region) = region_of(addr) {
                self.store(region, addr, *b);
            }
        }
        Ok(())
    }

    /// Copies memory into `buf` for inspection, ignoring permissions
    pub fn read_block(&self, start: u32, buf: &mut [u8]) -> Result<(), AccessFault> {
        for (i, b) in buf.iter_mut().enumerate() {
            let addr = start + i as u32;
            let region = region_of(addr).ok_or(AccessFault::Unmapped { addr })?;
            *b = self.load(region, addr);
        }
        Ok(())
    }

    pub fn tick(&mut self, cycles: u32) {
        self.io.tick(cycles);
    }

    /// Aggregate interrupt requests from attached peripherals
    pub fn check_interrupts(&mut self) -> heapless::Vec<InterruptRequest, MAX_PERIPHERALS> {
        self.io.get_interrupt_status()
    }
}
