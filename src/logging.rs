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

//! Tracing subscriber setup for `pifand`.

use std::env;
use std::path::Path;

/// Environment variable holding the `EnvFilter` directive.
pub const LOG_ENV: &str = "PIFAN_LOG";

const JOURNALD_SOCKET: &str = "/run/systemd/journal/socket";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Journald,
    Stdout,
}

impl LogTarget {
    pub fn describe(self) -> &'static str {
        match self {
            Self::Journald => "systemd journal",
            Self::Stdout => "stdout",
        }
    }
}

pub fn log_level() -> String {
    env::var(LOG_ENV).unwrap_or_else(|_| "info".to_string())
}

/// Install the global subscriber: journald when available, stdout otherwise.
pub fn init_logging(log_level: &str) -> LogTarget {
    if Path::new(JOURNALD_SOCKET).exists() {
        match tracing_journald::layer() {
            Ok(journald_layer) => {
                use tracing_subscriber::prelude::*;
                tracing_subscriber::registry()
                    .with(journald_layer)
                    .with(tracing_subscriber::EnvFilter::new(log_level))
                    .init();
                return LogTarget::Journald;
            }
            Err(e) => {
                eprintln!("Failed to create journald layer: {}, falling back to stdout", e);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(log_level)
        .init();
    LogTarget::Stdout
}
