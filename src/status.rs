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

use std::fs;
use std::path::PathBuf;

use pf_error::{PifanError, Result};

use crate::tach::RpmSample;

/// Receives one sample per reporting window.
pub trait StatusSink {
    fn publish(&mut self, sample: &RpmSample) -> Result<()>;
}

/// `RPM=<5-wide integer>  PWM=<duty, 1 decimal>`
pub fn format_status(sample: &RpmSample) -> String {
    format!("RPM={:5}  PWM={:.1}", sample.rpm, sample.duty_percent)
}

/// Overwrites a file with the latest status line.
#[derive(Debug, Clone)]
pub struct FileStatusSink {
    path: PathBuf,
}

impl FileStatusSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[cfg(test)]
    pub(crate) fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl StatusSink for FileStatusSink {
    fn publish(&mut self, sample: &RpmSample) -> Result<()> {
        let line = format_status(sample) + "\n";
        fs::write(&self.path, line).map_err(|source| PifanError::StatusWrite {
            path: self.path.clone(),
            source,
        })
    }
}
