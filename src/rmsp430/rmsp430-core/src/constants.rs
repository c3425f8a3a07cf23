// Width of the MSP430X address bus
pub const ADDRESS_MASK: u32 = 0xF_FFFF;

pub mod address_space {
    // Peripheral register windows (routed, never backed by SRAM/FRAM)
    pub const PERIPHERAL_LOW_START: u32 = 0x0000;
    pub const PERIPHERAL_LOW_END: u32 = 0x00FF;
    pub const SFR_START: u32 = 0x0100;
    pub const SFR_END: u32 = 0x011F;
    pub const PERIPHERAL_HIGH_START: u32 = 0x0120;
    pub const PERIPHERAL_HIGH_END: u32 = 0x0FFF;

    // Bootloader memory
    pub const BSL_START: u32 = 0x1000;
    pub const BSL_END: u32 = 0x17FF;

    // Information FRAM
    pub const INFO_FRAM_START: u32 = 0x1800;
    pub const INFO_FRAM_END: u32 = 0x19FF;

    // Device descriptor (TLV)
    pub const TLV_START: u32 = 0x1A00;
    pub const TLV_END: u32 = 0x1AFF;

    // Volatile memory
    pub const SRAM_START: u32 = 0x2000;
    pub const SRAM_END: u32 = 0x2FFF;

    // Program FRAM, the top 32 bytes hold the interrupt vectors
    pub const MAIN_FRAM_START: u32 = 0x8000;
    pub const MAIN_FRAM_END: u32 = 0xFFDF;
    pub const VECTORS_START: u32 = 0xFFE0;
    pub const VECTORS_END: u32 = 0xFFFF;

    pub const PERIPHERAL_SIZE: usize = (PERIPHERAL_HIGH_END - PERIPHERAL_LOW_START + 1) as usize;
    pub const BSL_SIZE: usize = (BSL_END - BSL_START + 1) as usize;
    pub const INFO_FRAM_SIZE: usize = (INFO_FRAM_END - INFO_FRAM_START + 1) as usize;
    pub const TLV_SIZE: usize = (TLV_END - TLV_START + 1) as usize;
    pub const SRAM_SIZE: usize = (SRAM_END - SRAM_START + 1) as usize;
    pub const MAIN_FRAM_SIZE: usize = (VECTORS_END - MAIN_FRAM_START + 1) as usize;
}

pub mod registers {
    // Registers with hardware roles
    pub const REGISTER_PC: usize = 0;
    pub const REGISTER_SP: usize = 1;
    pub const REGISTER_SR: usize = 2;
    pub const REGISTER_CG: usize = 3;
    pub const REGISTER_MAX: usize = 16;

    // Register cells are 20 bits wide on the CPUX
    pub const REGISTER_MASK: u32 = 0xF_FFFF;
}

pub mod status {
    // Status register bit positions
    pub const SR_C: u8 = 0;
    pub const SR_Z: u8 = 1;
    pub const SR_N: u8 = 2;
    pub const SR_GIE: u8 = 3;
    pub const SR_CPUOFF: u8 = 4;
    pub const SR_OSCOFF: u8 = 5;
    pub const SR_SCG0: u8 = 6;
    pub const SR_SCG1: u8 = 7;
    pub const SR_V: u8 = 8;

    // Bits 9-15 are reserved
    pub const SR_MASK: u16 = 0x01FF;
}

pub mod vectors {
    // Fixed vector table, one word per vector
    pub const VECTOR_TABLE_START: u32 = 0xFFE0;
    pub const VECTOR_TABLE_END: u32 = 0xFFFE;

    pub const VECTOR_RESET: u32 = 0xFFFE;
    pub const VECTOR_SYSNMI: u32 = 0xFFFC;
    pub const VECTOR_UNMI: u32 = 0xFFFA;
    pub const VECTOR_TIMER0_B0: u32 = 0xFFF8;
    pub const VECTOR_TIMER0_B1: u32 = 0xFFF6;
    pub const VECTOR_TIMER1_B0: u32 = 0xFFF4;
    pub const VECTOR_TIMER1_B1: u32 = 0xFFF2;
    pub const VECTOR_TIMER2_B0: u32 = 0xFFF0;
    pub const VECTOR_TIMER2_B1: u32 = 0xFFEE;
    pub const VECTOR_TIMER3_B0: u32 = 0xFFEC;
    pub const VECTOR_TIMER3_B1: u32 = 0xFFEA;
    pub const VECTOR_RTC: u32 = 0xFFE8;
    pub const VECTOR_EUSCI_A0: u32 = 0xFFE6;
    pub const VECTOR_EUSCI_A1: u32 = 0xFFE4;
    pub const VECTOR_EUSCI_B0: u32 = 0xFFE2;
    pub const VECTOR_EUSCI_B1: u32 = 0xFFE0;
}

pub mod timing {
    // Fixed latencies from the CPUX timing tables
    pub const INTERRUPT_LATENCY: u32 = 6;
    pub const RETI_CYCLES: u32 = 5;
    pub const RESET_CYCLES: u32 = 4;
    pub const JUMP_CYCLES: u32 = 2;

    // Cycles charged per step while the CPU is off
    pub const HALTED_CYCLES: u32 = 1;
}

pub mod limits {
    // Capacities of the fixed-size tables in the core
    pub const MAX_PENDING_INTERRUPTS: usize = 16;
    pub const MAX_PERIPHERALS: usize = 16;
    pub const MAX_PENDING_WRITES: usize = 40;
}
