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

//! Hardware access port.
//!
//! The controller only talks to GPIO through [`HardwarePort`], so it can run
//! against the Raspberry Pi adapter or against a scripted port in tests.

use pf_error::Result;

use crate::tach::{EdgeEvent, Level};

/// Callback invoked for each edge on a subscribed line.
///
/// Runs on the binding's interrupt thread and must not block.
pub type EdgeHandler = Box<dyn FnMut(EdgeEvent) + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pull {
    Off,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
    Either,
}

/// Handle returned by [`HardwarePort::subscribe_edge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId {
    pub pin: u8,
}

/// BCM2835-family PWM channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PwmChannel {
    Pwm0,
    Pwm1,
}

/// Hardware PWM channel routed to a header pin, if any.
///
/// GPIO12/13 reach PWM0/1 through ALT0, GPIO18/19 through ALT5.
pub fn pwm_channel_for(pin: u8) -> Option<PwmChannel> {
    match pin {
        12 | 18 => Some(PwmChannel::Pwm0),
        13 | 19 => Some(PwmChannel::Pwm1),
        _ => None,
    }
}

/// Line-level primitives the fan controller needs.
#[cfg_attr(test, mockall::automock)]
pub trait HardwarePort {
    fn set_mode(&mut self, pin: u8, mode: PinMode) -> Result<()>;

    fn set_pull_up_down(&mut self, pin: u8, pull: Pull) -> Result<()>;

    fn read(&self, pin: u8) -> Result<Level>;

    /// Drive hardware PWM on `pin`. `duty` is a fraction in `[0, 1]`.
    fn set_hardware_pwm(&mut self, pin: u8, frequency_hz: u32, duty: f64) -> Result<()>;

    fn subscribe_edge(&mut self, pin: u8, edge: Edge, handler: EdgeHandler) -> Result<SubscriptionId>;

    fn cancel(&mut self, subscription: SubscriptionId) -> Result<()>;

    /// Release the hardware handle. PWM outputs keep their last setting.
    fn disconnect(&mut self);
}
