#![cfg_attr(not(any(test, feature = "std-peripherals")), no_std)]

pub mod timer;

#[cfg(feature = "std-peripherals")]
pub mod console;
