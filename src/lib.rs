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

//! Pifan - hardware PWM fan control with tachometer feedback for the Raspberry Pi
//!
//! The library drives a 4-pin fan from a duty file, measures its speed from
//! tachometer pulses and reports RPM once per interval.

pub mod config;
pub mod controller;
pub mod duty;
pub mod hardware;
pub mod logging;
#[cfg(feature = "pi")]
pub mod rpi;
pub mod shutdown;
pub mod status;
pub mod tach;
