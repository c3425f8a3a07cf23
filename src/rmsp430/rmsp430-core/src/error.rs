use core::fmt;
use thiserror::Error;

/// Kind of access checked against a region's permissions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    Execute,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Access::Read => "read",
            Access::Write => "write",
            Access::Execute => "execute",
        };
        f.write_str(name)
    }
}

/// Memory controller rejection of a read, write or fetch
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AccessFault {
    #[error("unmapped address 0x{addr:05x}")]
    Unmapped { addr: u32 },

    #[error("{access} denied at 0x{addr:05x} ({region})")]
    Permission {
        addr: u32,
        access: Access,
        region: &'static str,
    },

    #[error("misaligned word access at 0x{addr:05x}")]
    Misaligned { addr: u32 },
}

/// Failure to turn an instruction stream into an [`Instruction`](crate::instructions::Instruction)
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("instruction fetch failed: {0}")]
    Access(#[from] AccessFault),

    #[error("invalid instruction 0x{word:04x}: {reason}")]
    Invalid { word: u16, reason: &'static str },
}

/// Result of a step that did not commit
///
/// The register file and memory are left exactly as they were before the step.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    #[error("access fault at pc 0x{pc:05x}: {source}")]
    Access {
        pc: u32,
        #[source]
        source: AccessFault,
    },

    #[error("invalid instruction 0x{word:04x} at pc 0x{pc:05x}: {reason}")]
    InvalidInstruction {
        pc: u32,
        word: u16,
        reason: &'static str,
    },
}

impl Fault {
    pub(crate) fn from_decode(pc: u32, err: DecodeError) -> Self {
        match err {
            DecodeError::Access(source) => Fault::Access { pc, source },
            DecodeError::Invalid { word, reason } => Fault::InvalidInstruction { pc, word, reason },
        }
    }
}

/// Peripheral registration failure
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AttachError {
    #[error("range 0x{start:05x}+{len} is outside the peripheral windows")]
    OutsideWindow { start: u32, len: u32 },

    #[error("range 0x{start:05x}+{len} overlaps an attached peripheral")]
    Overlap { start: u32, len: u32 },

    #[error("peripheral table is full")]
    TableFull,
}
