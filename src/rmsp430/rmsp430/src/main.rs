extern crate clap;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{error, info};

// Internal project modules
use rmsp430_core::{Cpu, Fault, MemoryMap, Status, StepEvent};
use rmsp430_peripherals::console::{registers as console_regs, ConsolePeriph};
use rmsp430_peripherals::timer::{registers as timer_regs, IntervalTimer};

mod loader;
use loader::ImageFormat;

const MAX_BREAKPOINTS: usize = 16;

/// Why the runner stopped
enum Halt {
    Breakpoint(u32),
    CpuOff,
    StepLimit(u64),
    Interrupted,
    Fault(Fault),
}

impl fmt::Display for Halt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Halt::Breakpoint(addr) => write!(f, "breakpoint at 0x{:05x}", addr),
            Halt::CpuOff => write!(f, "CPU off with interrupts disabled"),
            Halt::StepLimit(n) => write!(f, "step limit of {} reached", n),
            Halt::Interrupted => write!(f, "interrupted"),
            Halt::Fault(fault) => write!(f, "fault: {}", fault),
        }
    }
}

/// Configures command-line interface using clap
fn get_cli_config<'a>() -> clap::ArgMatches<'a> {
    let description = "MSP430FR2355 emulator implementation in Rust";
    clap::App::new("Rust MSP430 Emulator (RMSP430)")
        .version("0.1")
        .about(description)
        .arg(
            clap::Arg::with_name("IMAGE")
                .help("Firmware image to load")
                .required(true)
                .index(1),
        )
        .arg(
            clap::Arg::with_name("format")
                .long("format")
                .takes_value(true)
                .possible_values(&["raw", "titxt"])
                .help("Image format, guessed from the extension when omitted"),
        )
        .arg(
            clap::Arg::with_name("load-addr")
                .long("load-addr")
                .takes_value(true)
                .default_value("0x8000")
                .help("Load address of a raw image"),
        )
        .arg(
            clap::Arg::with_name("max-steps")
                .long("max-steps")
                .takes_value(true)
                .help("Stop after this many steps"),
        )
        .arg(
            clap::Arg::with_name("break")
                .long("break")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1)
                .help("Stop when PC reaches this address (repeatable)"),
        )
        .arg(
            clap::Arg::with_name("console")
                .long("console")
                .help("Print bytes written to UCA0TXBUF"),
        )
        .get_matches()
}

/// Parses `0x` prefixed hex or decimal
fn parse_number(text: &str) -> Option<u64> {
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

fn print_state(cpu: &Cpu) {
    let regs = cpu.registers().to_array();
    for (row, chunk) in regs.chunks(4).enumerate() {
        let line: Vec<String> = chunk
            .iter()
            .enumerate()
            .map(|(i, v)| format!("R{:<2} 0x{:05x}", row * 4 + i, v))
            .collect();
        println!("{}", line.join("  "));
    }

    let sr = cpu.status();
    let flag = |s: Status| if sr.contains(s) { 1 } else { 0 };
    println!(
        "SR: C={} Z={} N={} V={} GIE={} CPUOFF={}",
        flag(Status::C),
        flag(Status::Z),
        flag(Status::N),
        flag(Status::V),
        flag(Status::GIE),
        flag(Status::CPUOFF)
    );
    println!(
        "Instructions: {}  Cycles: {}",
        cpu.instructions_retired(),
        cpu.total_cycles()
    );
}

/// Main entry point for the MSP430 emulator
fn main() {
    env_logger::init();

    // Set up Ctrl-C handler, a second press exits immediately
    let cancel = Arc::new(AtomicBool::new(false));
    let handler_flag = cancel.clone();
    let handler_result = ctrlc::set_handler(move || {
        if handler_flag.swap(true, Ordering::SeqCst) {
            std::process::exit(-1);
        }
    });

    if let Err(e) = handler_result {
        error!("Signal handler failed: {:?}", e);
        return;
    }

    // Parse command-line arguments
    let cli_matches = get_cli_config();

    let path = Path::new(cli_matches.value_of("IMAGE").unwrap_or_default());
    let format = cli_matches
        .value_of("format")
        .and_then(ImageFormat::from_name)
        .unwrap_or_else(|| ImageFormat::from_path(path));

    let load_addr = match cli_matches.value_of("load-addr").and_then(parse_number) {
        Some(addr) => addr as u32,
        None => {
            error!("Invalid load address");
            return;
        }
    };

    let max_steps = match cli_matches.value_of("max-steps").map(parse_number) {
        Some(None) => {
            error!("Invalid step limit");
            return;
        }
        Some(n) => n,
        None => None,
    };

    let mut breakpoints: heapless::Vec<u32, MAX_BREAKPOINTS> = heapless::Vec::new();
    for text in cli_matches.values_of("break").into_iter().flatten() {
        let addr = match parse_number(text) {
            Some(addr) => addr as u32,
            None => {
                error!("Invalid breakpoint address {}", text);
                return;
            }
        };
        if breakpoints.push(addr).is_err() {
            error!("At most {} breakpoints are supported", MAX_BREAKPOINTS);
            return;
        }
    }

    let segments = match loader::load(path, format, load_addr) {
        Ok(segments) => segments,
        Err(e) => {
            error!("{}", e);
            return;
        }
    };

    // Initialize peripherals, they must outlive the CPU borrowing them
    let mut timer = IntervalTimer::new();
    let mut console = if cli_matches.is_present("console") {
        Some(ConsolePeriph::new())
    } else {
        None
    };

    let mut cpu = Cpu::new(MemoryMap::new());
    if let Err(e) = cpu.attach(timer_regs::TIMER_BASE, timer_regs::TIMER_LEN, &mut timer) {
        error!("Unable to attach timer: {}", e);
        return;
    }
    if let Some(console) = console.as_mut() {
        if let Err(e) = cpu.attach(console_regs::CONSOLE_BASE, console_regs::CONSOLE_LEN, console) {
            error!("Unable to attach console: {}", e);
            return;
        }
    }

    match loader::place(&mut cpu, &segments) {
        Ok(bytes) => info!("Loaded {} bytes from {}", bytes, path.display()),
        Err(e) => {
            error!("{}", e);
            return;
        }
    }

    // Cold start, PC comes from the reset vector
    cpu.reset();

    let mut steps: u64 = 0;
    let mut halt = Halt::Interrupted;
    let result = cpu.run_until(&cancel, |cpu, step| {
        steps += 1;
        if let StepEvent::Executed { .. } = step.event {
            if breakpoints.contains(&cpu.pc()) {
                halt = Halt::Breakpoint(cpu.pc());
                return true;
            }
        }
        if cpu.is_halted() && !cpu.status().contains(Status::GIE) {
            halt = Halt::CpuOff;
            return true;
        }
        match max_steps {
            Some(limit) if steps >= limit => {
                halt = Halt::StepLimit(limit);
                true
            }
            _ => false,
        }
    });
    if let Err(fault) = result {
        halt = Halt::Fault(fault);
    }

    println!("Stopped: {}", halt);
    print_state(&cpu);
}
