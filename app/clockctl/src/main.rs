// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use drv_clockgen::ops::Clock;
use drv_clockgen::ClockError;
use drv_i2c_api::I2cBus;
use log::info;

mod config;

use config::BoardConfig;

#[derive(Debug, Parser)]
#[clap(max_term_width = 80, about = "Load and identify clock designs")]
struct Args {
    /// Board description (TOML)
    #[clap(short, long, default_value = "/etc/clockctl/board.toml")]
    config: PathBuf,
    /// Log more; repeat for even more
    #[clap(short, long, parse(from_occurrences))]
    verbose: u64,
    #[clap(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// List the clocks on this board
    #[clap(name = "listclock")]
    ListClock,
    /// Print the design a clock is running
    #[clap(name = "getclock")]
    GetClock { clock: String },
    /// Switch a clock to a design until the next power cycle
    #[clap(name = "setclock")]
    SetClock { clock: String, design: String },
    /// Make a design the one a clock boots with, and switch to it
    #[clap(name = "setbootclock")]
    SetBootClock { clock: String, design: String },
    /// Return a clock to its default design
    #[clap(name = "restoreclock")]
    RestoreClock { clock: String },
    /// Check a clock's boot EEPROM against a design
    #[clap(name = "verifyclock")]
    VerifyClock { clock: String, design: String },
    /// Blank a clock's boot EEPROM so it boots its factory default
    #[clap(name = "eraseclock")]
    EraseClock { clock: String },
    /// List the designs available for a clock
    #[clap(name = "listdesigns")]
    ListDesigns { clock: String },
}

/// What to do to a device once it is open.
enum Action<'a> {
    Get,
    Set(&'a str),
    SetBoot(&'a str),
    Restore,
    Verify(&'a str),
    Erase,
}

impl Cmd {
    fn clock(&self) -> Option<&str> {
        match self {
            Cmd::ListClock => None,
            Cmd::GetClock { clock }
            | Cmd::SetClock { clock, .. }
            | Cmd::SetBootClock { clock, .. }
            | Cmd::RestoreClock { clock }
            | Cmd::VerifyClock { clock, .. }
            | Cmd::EraseClock { clock }
            | Cmd::ListDesigns { clock } => Some(clock),
        }
    }

    fn action(&self) -> Option<Action<'_>> {
        match self {
            Cmd::ListClock | Cmd::ListDesigns { .. } => None,
            Cmd::GetClock { .. } => Some(Action::Get),
            Cmd::SetClock { design, .. } => Some(Action::Set(design)),
            Cmd::SetBootClock { design, .. } => Some(Action::SetBoot(design)),
            Cmd::RestoreClock { .. } => Some(Action::Restore),
            Cmd::VerifyClock { design, .. } => Some(Action::Verify(design)),
            Cmd::EraseClock { .. } => Some(Action::Erase),
        }
    }
}

#[cfg(target_os = "linux")]
fn open_bus(bus: u8) -> Result<drv_i2c_api::LinuxI2c> {
    let i2c = drv_i2c_api::LinuxI2c::open_bus(bus)
        .with_context(|| format!("could not open I2C bus {bus}"))?;
    log::debug!("opened {}", i2c.path().display());
    Ok(i2c)
}

#[cfg(not(target_os = "linux"))]
fn open_bus(bus: u8) -> Result<Box<dyn I2cBus>> {
    anyhow::bail!("no I2C transport for bus {bus} on this platform")
}

fn run_device<B: I2cBus + ?Sized>(
    action: Action<'_>,
    cx: &drv_clockgen::ops::Context,
    clock: &Clock,
    bus: &mut B,
) -> Result<()> {
    let name = clock.name();

    match action {
        Action::Get => {
            let design = clock.get(cx, bus)?;
            println!("{design}");
        }
        Action::Set(design) => {
            clock
                .set(cx, bus, design)
                .with_context(|| format!("setting {name} to {design}"))?;
        }
        Action::SetBoot(design) => {
            clock
                .set_boot(cx, bus, design)
                .with_context(|| format!("setting {name} to boot {design}"))?;
        }
        Action::Restore => {
            clock
                .restore(cx, bus)
                .with_context(|| format!("restoring {name}"))?;
        }
        Action::Verify(design) => {
            clock
                .verify(cx, bus, design)
                .with_context(|| format!("verifying {name} against {design}"))?;
        }
        Action::Erase => {
            clock
                .erase(cx, bus)
                .with_context(|| format!("erasing {name}"))?;
        }
    }

    Ok(())
}

fn run(args: &Args) -> Result<()> {
    let board = BoardConfig::from_file(&args.config)?;
    let cx = board.context();

    let Some(name) = args.cmd.clock() else {
        for name in board.clocks.keys() {
            println!("{name}");
        }
        return Ok(());
    };

    let (bus_number, clock) = board.clock(name)?;
    info!("{name}: {} on bus {bus_number}", clock.chip());

    let Some(action) = args.cmd.action() else {
        for design in clock.designs(&cx)? {
            println!("{design}");
        }
        return Ok(());
    };

    let mut bus = open_bus(bus_number)?;
    run_device(action, &cx, &clock, &mut bus)
}

/// Maps a failure onto the process exit status.
fn exit_code(err: &anyhow::Error) -> i32 {
    let Some(err) = err.chain().find_map(|e| e.downcast_ref::<ClockError>())
    else {
        return 1;
    };

    match err {
        ClockError::Transport(_) => 2,
        ClockError::ProtocolTimeout { .. } => 3,
        ClockError::CandidateNotFound { .. } => 4,
        ClockError::MalformedImage { .. }
        | ClockError::ImageTooLarge { .. } => 5,
        ClockError::UnidentifiedConfiguration { .. } => 6,
        ClockError::VerifyMismatch { .. } => 7,
        ClockError::Unsupported { .. } => 8,
        ClockError::BadBufferSize(_) | ClockError::Io { .. } => 1,
    }
}

fn main() {
    let args = Args::parse();

    let level = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(level),
    )
    .init();

    if let Err(err) = run(&args) {
        eprintln!("ERROR: {err:#}");
        std::process::exit(exit_code(&err));
    }
}
