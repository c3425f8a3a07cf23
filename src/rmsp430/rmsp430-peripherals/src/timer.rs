use log::debug;
use rmsp430_core::constants::vectors::VECTOR_TIMER0_B0;
use rmsp430_core::{InterruptRequest, Peripheral};

pub mod registers {
    // Timer0_B3 subset: control, CCR0 control, counter and CCR0
    pub const TB0CTL: u32 = 0x0380;
    pub const TB0CCTL0: u32 = 0x0382;
    pub const TB0R: u32 = 0x0390;
    pub const TB0CCR0: u32 = 0x0392;

    pub const TIMER_BASE: u32 = 0x0380;
    pub const TIMER_LEN: u32 = 0x30;
}

use registers::*;

// TB0CTL
const MC_MASK: u16 = 0x0030;
const MC_UP: u16 = 0x0010;
const MC_CONTINUOUS: u16 = 0x0020;
const TBCLR: u16 = 0x0004;

// TB0CCTL0
const CCIE: u16 = 0x0010;
const CCIFG: u16 = 0x0001;

/// Interval timer modelled on Timer0_B CCR0
///
/// Counts CPU cycles in up or continuous mode and raises the TIMER0_B0 vector
/// when the counter reaches TB0CCR0 with CCIE set. The flag is cleared when the
/// request is handed to the CPU, the way the CCR0 vector clears it on accept.
#[derive(Debug, Default)]
pub struct IntervalTimer {
    ctl: u16,
    cctl0: u16,
    counter: u16,
    ccr0: u16,
}

impl IntervalTimer {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, addr: u32) -> Option<u16> {
        match addr & !1 {
            TB0CTL => Some(self.ctl),
            TB0CCTL0 => Some(self.cctl0),
            TB0R => Some(self.counter),
            TB0CCR0 => Some(self.ccr0),
            _ => None,
        }
    }

    fn register_mut(&mut self, addr: u32) -> Option<&mut u16> {
        match addr & !1 {
            TB0CTL => Some(&mut self.ctl),
            TB0CCTL0 => Some(&mut self.cctl0),
            TB0R => Some(&mut self.counter),
            TB0CCR0 => Some(&mut self.ccr0),
            _ => None,
        }
    }

    fn count(&mut self) {
        match self.ctl & MC_MASK {
            MC_UP => {
                if self.ccr0 == 0 {
                    return;
                }
                if self.counter >= self.ccr0 {
                    self.counter = 0;
                } else {
                    self.counter += 1;
                    if self.counter == self.ccr0 {
                        self.cctl0 |= CCIFG;
                    }
                }
            }
            MC_CONTINUOUS => {
                self.counter = self.counter.wrapping_add(1);
                if self.counter == self.ccr0 {
                    self.cctl0 |= CCIFG;
                }
            }
            _ => {}
        }
    }
}

impl Peripheral for IntervalTimer {
    fn read(&self, addr: u32) -> u8 {
        let value = self.register(addr).unwrap_or(0);
        match addr & 1 {
            0 => value as u8,
            _ => (value >> 8) as u8,
        }
    }

    fn write(&mut self, addr: u32, value: u8) {
        let reg = match self.register_mut(addr) {
            Some(reg) => reg,
            None => {
                debug!("Timer write to unmodelled register 0x{:04x}", addr);
                return;
            }
        };
        *reg = match addr & 1 {
            0 => (*reg & 0xFF00) | value as u16,
            _ => (*reg & 0x00FF) | (value as u16) << 8,
        };

        if addr & !1 == TB0CTL && self.ctl & TBCLR != 0 {
            self.counter = 0;
            self.ctl &= !TBCLR;
        }
    }

    fn tick(&mut self, cycles: u32) {
        for _ in 0..cycles {
            self.count();
        }
    }

    fn is_interrupt(&mut self) -> Option<InterruptRequest> {
        if self.cctl0 & CCIE != 0 && self.cctl0 & CCIFG != 0 {
            self.cctl0 &= !CCIFG;
            return Some(InterruptRequest::at(VECTOR_TIMER0_B0));
        }
        None
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}
