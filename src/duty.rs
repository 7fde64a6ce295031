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

//! Desired duty cycle, read from a `KEY=value` text file.

use std::fs;
use std::path::{Path, PathBuf};

use pf_error::{PifanError, Result};
use tracing::{debug, info, warn};

const DUTY_KEY: &str = "PWM_DUTY=";

/// Something that can be polled for the desired duty in percent.
pub trait DutySource {
    fn load(&mut self) -> Result<f32>;
}

/// Parse the first `PWM_DUTY=<float>` line and clamp it to `[0, 100]`.
pub fn parse_duty(text: &str, path: &Path) -> Result<f32> {
    let line = text
        .lines()
        .find(|l| l.starts_with(DUTY_KEY))
        .ok_or_else(|| PifanError::duty_parse(path, "no PWM_DUTY entry"))?;

    let raw = line[DUTY_KEY.len()..].trim();
    let value: f32 = raw
        .parse()
        .map_err(|_| PifanError::duty_parse(path, format!("invalid duty value '{}'", raw)))?;
    if !value.is_finite() {
        return Err(PifanError::duty_parse(path, format!("invalid duty value '{}'", raw)));
    }
    Ok(value.clamp(0.0, 100.0))
}

pub fn load_duty(path: &Path) -> Result<f32> {
    let text = fs::read_to_string(path).map_err(|source| PifanError::DutyRead {
        path: path.to_path_buf(),
        source,
    })?;
    parse_duty(&text, path)
}

/// Duty file on disk, re-read on every poll.
#[derive(Debug, Clone)]
pub struct FileDutySource {
    path: PathBuf,
}

impl FileDutySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DutySource for FileDutySource {
    fn load(&mut self) -> Result<f32> {
        load_duty(&self.path)
    }
}

/// Resolves each poll to a usable duty, falling back on failure.
///
/// Failures fall back to the last successfully loaded value, or to the
/// configured default before the first success.
#[derive(Debug)]
pub struct DutyTracker {
    default_percent: f32,
    last_good: Option<f32>,
    failing: bool,
    failures: u64,
}

impl DutyTracker {
    pub fn new(default_percent: f32) -> Self {
        Self {
            default_percent: default_percent.clamp(0.0, 100.0),
            last_good: None,
            failing: false,
            failures: 0,
        }
    }

    pub fn resolve(&mut self, loaded: Result<f32>) -> f32 {
        match loaded {
            Ok(duty) => {
                if self.failing {
                    info!("Duty source recovered after {} failed read(s)", self.failures);
                    self.failing = false;
                    self.failures = 0;
                }
                self.last_good = Some(duty);
                duty
            }
            Err(e) => {
                let fallback = self.fallback();
                self.failures += 1;
                if self.failing {
                    debug!("Duty source still failing: {}", e);
                } else {
                    warn!("Failed to load duty: {} - using {:.1}%", e, fallback);
                    self.failing = true;
                }
                fallback
            }
        }
    }

    pub fn fallback(&self) -> f32 {
        self.last_good.unwrap_or(self.default_percent)
    }

    #[cfg(test)]
    pub(crate) fn is_failing(&self) -> bool {
        self.failing
    }
}
