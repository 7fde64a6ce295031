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

//! Raspberry Pi adapter for [`HardwarePort`], backed by rppal.

use std::collections::HashMap;

use pf_error::{PifanError, Result};
use rppal::gpio::{Event, Gpio, InputPin, OutputPin, Trigger};
use rppal::pwm::{Channel, Polarity, Pwm};
use tracing::{debug, warn};

use crate::hardware::{pwm_channel_for, Edge, EdgeHandler, HardwarePort, PinMode, Pull, PwmChannel, SubscriptionId};
use crate::tach::{tick_from_duration, EdgeEvent, Level};

enum Line {
    Input(InputPin),
    Output(OutputPin),
}

pub struct RppalPort {
    gpio: Option<Gpio>,
    lines: HashMap<u8, Line>,
    pwms: HashMap<u8, Pwm>,
}

impl RppalPort {
    /// Open the GPIO peripheral. Fails when `/dev/gpiomem` is unavailable.
    pub fn connect() -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| PifanError::NotConnected(e.to_string()))?;
        debug!("Connected to GPIO peripheral");
        Ok(Self {
            gpio: Some(gpio),
            lines: HashMap::new(),
            pwms: HashMap::new(),
        })
    }

    fn gpio(&self) -> Result<&Gpio> {
        self.gpio
            .as_ref()
            .ok_or_else(|| PifanError::NotConnected("handle already released".to_string()))
    }

    fn input_mut(&mut self, op: &'static str, pin: u8) -> Result<&mut InputPin> {
        match self.lines.get_mut(&pin) {
            Some(Line::Input(p)) => Ok(p),
            Some(Line::Output(_)) => Err(PifanError::hardware(op, pin, "pin is configured as output")),
            None => Err(PifanError::hardware(op, pin, "pin is not configured")),
        }
    }
}

impl HardwarePort for RppalPort {
    fn set_mode(&mut self, pin: u8, mode: PinMode) -> Result<()> {
        // The previous owner must be dropped before the pin can be taken again.
        self.lines.remove(&pin);
        let p = self.gpio()?.get(pin).map_err(|e| PifanError::hardware("set_mode", pin, e))?;
        let line = match mode {
            PinMode::Input => Line::Input(p.into_input()),
            PinMode::Output => Line::Output(p.into_output()),
        };
        self.lines.insert(pin, line);
        Ok(())
    }

    fn set_pull_up_down(&mut self, pin: u8, pull: Pull) -> Result<()> {
        self.input_mut("set_pull_up_down", pin)?;
        self.lines.remove(&pin);
        let p = self
            .gpio()?
            .get(pin)
            .map_err(|e| PifanError::hardware("set_pull_up_down", pin, e))?;
        let input = match pull {
            Pull::Off => p.into_input(),
            Pull::Up => p.into_input_pullup(),
            Pull::Down => p.into_input_pulldown(),
        };
        self.lines.insert(pin, Line::Input(input));
        Ok(())
    }

    fn read(&self, pin: u8) -> Result<Level> {
        let high = match self.lines.get(&pin) {
            Some(Line::Input(p)) => p.is_high(),
            Some(Line::Output(p)) => p.is_set_high(),
            None => return Err(PifanError::hardware("read", pin, "pin is not configured")),
        };
        Ok(if high { Level::High } else { Level::Low })
    }

    fn set_hardware_pwm(&mut self, pin: u8, frequency_hz: u32, duty: f64) -> Result<()> {
        let duty = duty.clamp(0.0, 1.0);
        if let Some(pwm) = self.pwms.get(&pin) {
            return pwm
                .set_frequency(frequency_hz as f64, duty)
                .map_err(|e| PifanError::hardware("set_hardware_pwm", pin, e));
        }

        let channel = match pwm_channel_for(pin) {
            Some(PwmChannel::Pwm0) => Channel::Pwm0,
            Some(PwmChannel::Pwm1) => Channel::Pwm1,
            None => {
                return Err(PifanError::NotSupported(format!(
                    "GPIO {} has no hardware PWM channel",
                    pin
                )))
            }
        };
        let pwm = Pwm::with_frequency(channel, frequency_hz as f64, duty, Polarity::Normal, true)
            .map_err(|e| PifanError::hardware("set_hardware_pwm", pin, e))?;
        self.pwms.insert(pin, pwm);
        Ok(())
    }

    fn subscribe_edge(&mut self, pin: u8, edge: Edge, mut handler: EdgeHandler) -> Result<SubscriptionId> {
        let trigger = match edge {
            Edge::Rising => Trigger::RisingEdge,
            Edge::Falling => Trigger::FallingEdge,
            Edge::Either => Trigger::Both,
        };
        let input = self.input_mut("subscribe_edge", pin)?;
        input
            .set_async_interrupt(trigger, None, move |event: Event| {
                let level = match event.trigger {
                    Trigger::RisingEdge => Level::High,
                    _ => Level::Low,
                };
                handler(EdgeEvent {
                    tick: tick_from_duration(event.timestamp),
                    level,
                });
            })
            .map_err(|e| PifanError::hardware("subscribe_edge", pin, e))?;
        Ok(SubscriptionId { pin })
    }

    fn cancel(&mut self, subscription: SubscriptionId) -> Result<()> {
        let pin = subscription.pin;
        self.input_mut("cancel", pin)?
            .clear_async_interrupt()
            .map_err(|e| PifanError::hardware("cancel", pin, e))
    }

    fn disconnect(&mut self) {
        for (pin, pwm) in self.pwms.iter_mut() {
            // Leave the channel running at its last duty after exit.
            pwm.set_reset_on_drop(false);
            debug!("Releasing PWM on GPIO {}", pin);
        }
        self.pwms.clear();
        self.lines.clear();
        if self.gpio.take().is_none() {
            warn!("disconnect called on a released GPIO handle");
        }
    }
}
