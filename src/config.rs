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
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pf_error::{PifanError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::hardware::pwm_channel_for;

/// Environment variable naming an alternate settings file.
pub const SETTINGS_ENV: &str = "PIFAN_SETTINGS";

pub const DEFAULT_SETTINGS_PATH: &str = "/etc/pifan/settings.json";

/// Operating parameters for the fan controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// BCM pin driving the fan's PWM input.
    pub pwm_pin: u8,
    /// BCM pin wired to the fan's tachometer output.
    pub tach_pin: u8,
    pub pwm_frequency_hz: u32,
    /// Duty used until the duty file has been read successfully once.
    pub default_duty_percent: f32,
    /// Falling edges closer together than this are discarded as bounce.
    pub min_pulse_width_us: u32,
    pub pulses_per_revolution: u32,
    pub report_interval_ms: u64,
    pub poll_interval_ms: u64,
    pub duty_file: PathBuf,
    pub status_file: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pwm_pin: 12,
            tach_pin: 16,
            pwm_frequency_hz: 25_000,
            default_duty_percent: 80.0,
            min_pulse_width_us: 1_000,
            pulses_per_revolution: 2,
            report_interval_ms: 1_000,
            poll_interval_ms: 100,
            duty_file: PathBuf::from("config.txt"),
            status_file: PathBuf::from("fan_rpm.log"),
        }
    }
}

impl Settings {
    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if pwm_channel_for(self.pwm_pin).is_none() {
            return Err(PifanError::invalid_setting(
                "pwm_pin",
                format!("GPIO {} has no hardware PWM channel", self.pwm_pin),
            ));
        }
        if self.tach_pin == self.pwm_pin {
            return Err(PifanError::invalid_setting("tach_pin", "must differ from pwm_pin"));
        }
        if self.tach_pin > 27 {
            return Err(PifanError::invalid_setting("tach_pin", "header GPIOs are 0-27"));
        }
        if self.pwm_frequency_hz == 0 {
            return Err(PifanError::invalid_setting("pwm_frequency_hz", "must be non-zero"));
        }
        if !(0.0..=100.0).contains(&self.default_duty_percent) {
            return Err(PifanError::invalid_setting(
                "default_duty_percent",
                "must be within 0.0-100.0",
            ));
        }
        if self.pulses_per_revolution == 0 {
            return Err(PifanError::invalid_setting("pulses_per_revolution", "must be non-zero"));
        }
        if self.report_interval_ms == 0 {
            return Err(PifanError::invalid_setting("report_interval_ms", "must be non-zero"));
        }
        if self.poll_interval_ms == 0 {
            return Err(PifanError::invalid_setting("poll_interval_ms", "must be non-zero"));
        }
        Ok(())
    }
}

pub fn settings_path() -> PathBuf {
    match env::var_os(SETTINGS_ENV) {
        Some(p) if !p.is_empty() => PathBuf::from(p),
        _ => PathBuf::from(DEFAULT_SETTINGS_PATH),
    }
}

/// Load and validate settings from `path`. A missing file yields defaults.
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("No settings at {}, using defaults", path.display());
            return Ok(Settings::default());
        }
        Err(source) => {
            return Err(PifanError::SettingsRead {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let settings: Settings = serde_json::from_str(&data)?;
    settings.validate()?;
    Ok(settings)
}
