use crossbeam_channel::{unbounded, Receiver, Sender};
use log::debug;
use std::io::Write;
use std::thread::JoinHandle;

use rmsp430_core::constants::vectors::VECTOR_EUSCI_A0;
use rmsp430_core::{InterruptRequest, Peripheral};

pub mod registers {
    // eUSCI_A0 in UART mode
    pub const UCA0CTLW0: u32 = 0x0500;
    pub const UCA0RXBUF: u32 = 0x050C;
    pub const UCA0TXBUF: u32 = 0x050E;
    pub const UCA0IE: u32 = 0x051A;
    pub const UCA0IFG: u32 = 0x051C;

    pub const CONSOLE_BASE: u32 = 0x0500;
    pub const CONSOLE_LEN: u32 = 0x20;
}

use registers::*;

const UCTXIFG: u16 = 0x0002;
const UCTXIE: u16 = 0x0002;

/// Byte sink on UCA0TXBUF
///
/// The transmitter is always ready: UCTXIFG reads as set and every byte
/// written to TXBUF is forwarded to a printer thread. Dropping the console
/// closes the channel and waits for the printer to drain it.
pub struct ConsolePeriph {
    tx: Option<Sender<u8>>,
    printer: Option<JoinHandle<()>>,
    ctlw0: u16,
    ie: u16,
}

// Thread responsible for writing console bytes out
fn printer_thread<W: Write>(rx: Receiver<u8>, mut out: W) {
    for byte in rx.iter() {
        if out.write_all(&[byte]).and_then(|_| out.flush()).is_err() {
            break;
        }
    }
}

impl ConsolePeriph {
    /// Console printing to stdout
    pub fn new() -> Self {
        Self::with_writer(std::io::stdout())
    }

    /// Console printing to `out` from its own thread
    pub fn with_writer<W: Write + Send + 'static>(out: W) -> Self {
        let (tx, rx) = unbounded();

        // Spawn thread to print transmitted bytes
        let printer = std::thread::spawn(move || printer_thread(rx, out));
        let mut console = Self::with_sender(tx);
        console.printer = Some(printer);
        console
    }

    /// Console forwarding into a caller supplied channel
    pub fn with_sender(tx: Sender<u8>) -> Self {
        ConsolePeriph {
            tx: Some(tx),
            printer: None,
            ctlw0: 0x0001, // UCSWRST set after reset
            ie: 0,
        }
    }
}

impl Drop for ConsolePeriph {
    fn drop(&mut self) {
        // The printer exits once the channel is closed
        drop(self.tx.take());
        if let Some(printer) = self.printer.take() {
            if printer.join().is_err() {
                debug!("Console printer thread panicked");
            }
        }
    }
}

impl Default for ConsolePeriph {
    fn default() -> Self {
        Self::new()
    }
}

impl Peripheral for ConsolePeriph {
    fn read(&self, addr: u32) -> u8 {
        let value = match addr & !1 {
            UCA0CTLW0 => self.ctlw0,
            UCA0IE => self.ie,
            UCA0IFG => UCTXIFG,
            _ => 0,
        };
        match addr & 1 {
            0 => value as u8,
            _ => (value >> 8) as u8,
        }
    }

    fn write(&mut self, addr: u32, value: u8) {
        let lane = |reg: u16| match addr & 1 {
            0 => (reg & 0xFF00) | value as u16,
            _ => (reg & 0x00FF) | (value as u16) << 8,
        };
        match addr {
            UCA0TXBUF => {
                let sent = self.tx.as_ref().map(|tx| tx.send(value).is_ok());
                if sent != Some(true) {
                    debug!("Console printer gone, dropping 0x{:02x}", value);
                }
            }
            a if a & !1 == UCA0CTLW0 => self.ctlw0 = lane(self.ctlw0),
            a if a & !1 == UCA0IE => self.ie = lane(self.ie),
            _ => {}
        }
    }

    fn is_interrupt(&mut self) -> Option<InterruptRequest> {
        // TXBUF is always empty, so an enabled TX interrupt is always requested
        if self.ie & UCTXIE != 0 {
            return Some(InterruptRequest::at(VECTOR_EUSCI_A0));
        }
        None
    }

    fn reset(&mut self) {
        self.ctlw0 = 0x0001;
        self.ie = 0;
    }
}
