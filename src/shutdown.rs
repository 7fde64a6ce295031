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

//! Interruptible sleep tripped by SIGINT/SIGTERM.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use parking_lot::{Condvar, Mutex};
use tracing::info;

#[derive(Debug, Default)]
struct Inner {
    stop: Mutex<bool>,
    cvar: Condvar,
}

/// Cloneable shutdown flag whose sleeps wake as soon as it is triggered.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<Inner>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        let mut stop = self.inner.stop.lock();
        *stop = true;
        self.inner.cvar.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        *self.inner.stop.lock()
    }

    /// Sleep for `timeout` or until triggered. Returns true if triggered.
    pub fn sleep(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut stop = self.inner.stop.lock();
        while !*stop {
            if self.inner.cvar.wait_until(&mut stop, deadline).timed_out() {
                break;
            }
        }
        *stop
    }

    /// Route SIGINT and SIGTERM to this signal.
    pub fn install_handler(&self) -> anyhow::Result<()> {
        let signal = self.clone();
        ctrlc::set_handler(move || {
            info!("SIGNAL: Received SIGINT/SIGTERM - initiating shutdown");
            signal.trigger();
        })
        .context("failed to install signal handler")
    }
}
