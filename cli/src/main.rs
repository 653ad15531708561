// This file is part of ocflash, a tool to program FPGA configuration flash and reload FPGA images over PCIe configuration space.
//
// Copyright 2025 Canonical Ltd.
//
// SPDX-License-Identifier: GPL-3.0-only
//
// ocflash is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License version 3, as published by the Free Software Foundation.
//
// ocflash is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranties of MERCHANTABILITY, SATISFACTORY QUALITY, or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with this program.  If not, see http://www.gnu.org/licenses/.

//! ocflash - command line front end of the ocflash library.
//!
//! # Usage
//!
//! ```bash
//! # Program both flash parts of an x8 card
//! ocflash --device 0006:00:00.0 program --image-file1 primary.bin --image-file2 secondary.bin
//!
//! # Program a single part, starting at 1 MiB
//! ocflash --device 0006:00:00.0 program --single-spi --image-file1 user.bin --start-addr 0x00100000
//!
//! # Partial reconfiguration is picked from the file name
//! ocflash --device 0006:00:00.0 program --image-file1 action_partial.bin
//!
//! # Boot the user image without a power cycle
//! ocflash --device 0006:00:00.0 reload --image-location user
//!
//! # Identity, controller registers and IDCODE
//! ocflash --device 0006:00:00.0 status
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG` - Overrides the log filter, which is `info` by default and `debug` with
//!   `--verbose`.

mod program;
mod reload;
mod status;

use clap::{Parser, Subcommand, ValueEnum, arg, command};
use log::{debug, error};
use ocflash::config::{Settings, load_settings};
use ocflash::context::{FlashContext, TraceFlags};
use ocflash::device::{PciDevice, open_device};
use ocflash::image::CountRule;
use ocflash::poll::{CancelToken, PollPolicy};
use std::error::Error;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ocflash")]
#[command(bin_name = "ocflash")]
#[command(version, about = "Program and reload OpenCAPI FPGA card images over PCIe")]
struct Cli {
    #[arg(
        long = "device",
        help = "PCI bus:device.function of the card, e.g. 0006:00:00.0"
    )]
    device: String,
    #[arg(short, long, help = "Log diagnostics and register dumps")]
    verbose: bool,
    #[arg(
        long,
        value_enum,
        value_delimiter = ',',
        help = "Trace register traffic of the given layers"
    )]
    trace: Vec<TraceLayer>,
    #[arg(
        long = "poll-timeout-ms",
        help = "Give up on any hardware poll after this many milliseconds (0 waits forever)"
    )]
    poll_timeout_ms: Option<u64>,
    #[arg(long, help = "Config file to use instead of /etc/ocflash/config.toml")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum TraceLayer {
    Config,
    Axi,
    Flash,
    FlashCmd,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write an image to the card
    Program {
        #[arg(long = "image-file1", help = "Primary image, or the only one")]
        image_file1: PathBuf,
        #[arg(long = "image-file2", help = "Secondary image for dual SPI cards")]
        image_file2: Option<PathBuf>,
        #[arg(long = "single-spi", help = "Only program the primary flash part")]
        single_spi: bool,
        #[arg(
            long = "start-addr",
            value_parser = program::parse_start_address,
            default_value = "0x00000000",
            help = "Flash address of the first image byte"
        )]
        start_addr: u32,
        #[arg(
            long = "exact-counts",
            help = "Erase and program exactly the sectors and pages the image covers"
        )]
        exact_counts: bool,
    },
    /// Reboot the FPGA from one of its flash images
    Reload {
        #[arg(long = "image-location", value_enum)]
        image_location: reload::LocationArg,
        #[arg(long, value_enum, default_value_t = reload::ModeArg::WaitEachWord)]
        mode: reload::ModeArg,
    },
    /// Show the card identity and controller registers
    Status,
}

fn trace_flags(layers: &[TraceLayer]) -> TraceFlags {
    TraceFlags {
        config: layers.contains(&TraceLayer::Config),
        axi: layers.contains(&TraceLayer::Axi),
        flash: layers.contains(&TraceLayer::Flash),
        flash_cmd: layers.contains(&TraceLayer::FlashCmd),
    }
}

fn default_filter(cli: &Cli) -> &'static str {
    if !cli.trace.is_empty() {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    }
}

fn open_context(cli: &Cli, settings: &Settings) -> Result<FlashContext<PciDevice>, Box<dyn Error>> {
    let trace = trace_flags(&cli.trace);
    let cancel = CancelToken::new();
    let device = open_device(&cli.device, settings, trace, cancel.clone())?;
    Ok(settings.context(device, trace).with_cancel(cancel))
}

fn run(cli: &Cli) -> Result<String, Box<dyn Error>> {
    let mut settings = load_settings(cli.config.as_deref())?;
    if let Some(ms) = cli.poll_timeout_ms {
        settings.poll_policy = PollPolicy::from_millis(ms);
    }
    if let Commands::Program {
        exact_counts: true, ..
    } = cli.command
    {
        settings.count_rule = CountRule::Exact;
    }
    debug!("Using settings {settings:?}");
    let mut ctx = open_context(cli, &settings)?;

    match &cli.command {
        Commands::Program {
            image_file1,
            image_file2,
            single_spi,
            start_addr,
            ..
        } => {
            let request = program::ProgramArgs {
                image_file1: image_file1.clone(),
                image_file2: image_file2.clone(),
                single_spi: *single_spi,
                start_addr: *start_addr,
                verbose: cli.verbose,
            };
            Ok(program::program_handler(&mut ctx, &request)?)
        }
        Commands::Reload {
            image_location,
            mode,
        } => Ok(reload::reload_handler(
            &mut ctx,
            settings.reload,
            *image_location,
            *mode,
        )?),
        Commands::Status => Ok(status::status_handler(&mut ctx)?),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter(&cli)))
        .init();
    debug!("parsed cli command with {cli:?}");
    match run(&cli) {
        Ok(message) => {
            println!("{message}");
            Ok(())
        }
        Err(e) => {
            error!("{e}");
            Err(e)
        }
    }
}
