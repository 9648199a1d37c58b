// This file is part of m2sdr, a userspace driver for the LiteX M2SDR PCIe software-defined radio.
//
// Copyright 2025 Canonical Ltd.
//
// SPDX-License-Identifier: GPL-3.0-only
//
// m2sdr is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License version 3, as published by the Free Software Foundation.
//
// m2sdr is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranties of MERCHANTABILITY, SATISFACTORY QUALITY, or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with this program.  If not, see http://www.gnu.org/licenses/.

mod capture;
mod info;
mod loopback;
mod reg;
mod sensor;

use clap::{Parser, Subcommand, arg, command};
use log::{debug, error, warn};
use m2sdr::{
    DeviceArgs, DriverConfig, M2sdrDevice, M2sdrError, PcieLink, SimulatedPcie,
    SimulatedTransceiver,
};
use std::path::PathBuf;

/// The CLI drives the transceiver through its register-level model; no vendor chip driver is
/// linked in.
pub(crate) type Device<P> = M2sdrDevice<P, SimulatedTransceiver>;

#[derive(Parser, Debug)]
#[command(name = "m2sdr")]
#[command(bin_name = "m2sdr")]
struct Cli {
    #[arg(
        long = "device",
        help = r#"LitePCIe device node of the board.
Defaults to the device_path of the config files, or /dev/m2sdr0.
        "#
    )]
    device: Option<PathBuf>,
    #[arg(
        long = "bypass-init",
        help = "Keep the board as it is instead of resetting and configuring the transceiver"
    )]
    bypass_init: bool,
    #[arg(
        long = "simulate",
        help = "Run against an in-memory board model instead of real hardware"
    )]
    simulate: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print identification and current settings of the board
    Info,
    /// List all sensors with their values, or read a single one
    Sensor {
        /// Sensor key such as `fpga_temp` or `ad9361_temp`
        key: Option<String>,
    },
    /// Raw gateware register access
    Reg {
        #[command(subcommand)]
        command: reg::RegCommands,
    },
    /// Receive samples from one channel
    Capture(capture::CaptureArgs),
    /// Send a test pattern through the FPGA DMA loopback and check it comes back intact
    Loopback {
        #[arg(long, default_value_t = 8)]
        buffers: usize,
    },
}

fn run<P: PcieLink>(device: &Device<P>, command: &Commands) -> Result<String, M2sdrError> {
    match command {
        Commands::Info => info::info_handler(device),
        Commands::Sensor { key } => sensor::sensor_handler(device, key.as_deref()),
        Commands::Reg { command } => reg::reg_handler(device, command),
        Commands::Capture(args) => capture::capture_handler(device, args),
        Commands::Loopback { buffers } => loopback::loopback_handler(device, *buffers),
    }
}

fn open_and_run(cli: &Cli) -> Result<String, M2sdrError> {
    let mut config = DriverConfig::load();
    if let Some(path) = &cli.device {
        config.device_path = path.clone();
    }
    config.bypass_init |= cli.bypass_init;
    let rfic = SimulatedTransceiver::new(config.oversampling);

    if cli.simulate {
        let link = SimulatedPcie::new(8192, 32, config.csr);
        let device = M2sdrDevice::new(link, rfic, config)?;
        run(&device, &cli.command)
    } else {
        warn!("No AD9361 chip driver available, transceiver settings are only modelled");
        let args = DeviceArgs::from_config(&config);
        let device = M2sdrDevice::open(&args, config, rfic)?;
        run(&device, &cli.command)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    debug!("parsed cli command with {cli:?}");
    match open_and_run(&cli) {
        Ok(output) => {
            println!("{output}");
            Ok(())
        }
        Err(e) => {
            error!("{e}");
            Err(e.into())
        }
    }
}
