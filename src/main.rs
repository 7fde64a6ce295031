/*
 * This file is part of Pifan.
 *
 * Copyright (C) 2025 Pifan contributors
 *
 * Pifan is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Pifan is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Pifan. If not, see <https://www.gnu.org/licenses/>.
 */

use std::env;
use std::time::Instant;

use anyhow::Context;
use tracing::{debug, error, info, warn};

use pifan::config::{self, Settings};
use pifan::controller::FanController;
use pifan::duty::FileDutySource;
use pifan::hardware::HardwarePort;
use pifan::logging;
use pifan::shutdown::ShutdownSignal;
use pifan::status::FileStatusSink;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> anyhow::Result<()> {
    let log_level = logging::log_level();
    let target = logging::init_logging(&log_level);

    info!("STARTUP: pifand {} starting", VERSION);
    info!("STARTUP: Logging to {} (level {})", target.describe(), log_level);

    let settings_path = config::settings_path();
    let settings = config::load_settings_from(&settings_path)
        .with_context(|| format!("loading settings from {}", settings_path.display()))?;

    match env::current_dir() {
        Ok(cwd) => info!("STARTUP: Working directory {}", cwd.display()),
        Err(e) => warn!("STARTUP: Working directory unavailable: {}", e),
    }
    info!(
        "STARTUP: Duty file {}, status file {}",
        settings.duty_file.display(),
        settings.status_file.display()
    );

    let shutdown = ShutdownSignal::new();
    if let Err(e) = shutdown.install_handler() {
        warn!("{:#}. Shutdown via signals will skip the fail-safe duty.", e);
    }

    #[cfg(feature = "pi")]
    {
        let hw = connect();
        run(hw, settings, &shutdown)
    }

    #[cfg(not(feature = "pi"))]
    {
        let _ = (settings, shutdown);
        fatal("pifand was built without the `pi` feature; no GPIO adapter available");
    }
}

#[cfg(feature = "pi")]
fn connect() -> pifan::rpi::RppalPort {
    match open_hardware(pifan::rpi::RppalPort::connect) {
        Ok(hw) => hw,
        Err(msg) => fatal(&msg),
    }
}

/// Run the adapter constructor, turning a failure into the operator diagnostic.
#[cfg_attr(not(feature = "pi"), allow(dead_code))]
fn open_hardware<H, F>(open: F) -> Result<H, String>
where
    F: FnOnce() -> pf_error::Result<H>,
{
    open().map_err(|e| format!("{}. Check that /dev/gpiomem exists and is accessible.", e))
}

fn fatal(msg: &str) -> ! {
    error!("{}", msg);
    eprintln!("Error: {}", msg);
    std::process::exit(1);
}

#[cfg_attr(not(feature = "pi"), allow(dead_code))]
fn run<H: HardwarePort>(hw: H, settings: Settings, shutdown: &ShutdownSignal) -> anyhow::Result<()> {
    let tach = settings.tach_pin;
    let duty_source = FileDutySource::new(&settings.duty_file);
    let sink = FileStatusSink::new(&settings.status_file);

    let mut controller = FanController::start(hw, duty_source, sink, settings, Instant::now())
        .with_context(|| format!("configuring tachometer on GPIO {}", tach))?;

    match controller.hardware().read(tach) {
        Ok(level) => debug!("Tachometer line idle level: {:?}", level),
        Err(e) => debug!("Tachometer level query suppressed: {}", e),
    }

    controller.run(shutdown);
    info!("SHUTDOWN: pifand terminated gracefully");
    Ok(())
}
