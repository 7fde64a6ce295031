/*
 * Scripted in-memory hardware port for integration tests.
 */

#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use pf_error::{PifanError, Result};
use pifan::hardware::{Edge, EdgeHandler, HardwarePort, PinMode, Pull, SubscriptionId};
use pifan::tach::{EdgeEvent, Level};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    SetMode(u8, PinMode),
    SetPull(u8, Pull),
    Read(u8),
    Pwm(u8, u32, f64),
    Subscribe(u8, Edge),
    Cancel(u8),
    Disconnect,
}

/// Records every call in a log that outlives the port.
pub struct FakePort {
    log: Arc<Mutex<Vec<Call>>>,
    handler: Option<EdgeHandler>,
    pwm_failures: usize,
}

impl FakePort {
    pub fn new() -> (Self, Arc<Mutex<Vec<Call>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let port = Self {
            log: log.clone(),
            handler: None,
            pwm_failures: 0,
        };
        (port, log)
    }

    /// Fail the next `n` PWM writes.
    pub fn fail_pwm(&mut self, n: usize) {
        self.pwm_failures = n;
    }

    /// Deliver an edge as the interrupt thread would.
    pub fn fire(&mut self, event: EdgeEvent) {
        if let Some(handler) = self.handler.as_mut() {
            handler(event);
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.handler.is_some()
    }
}

impl HardwarePort for FakePort {
    fn set_mode(&mut self, pin: u8, mode: PinMode) -> Result<()> {
        self.log.lock().push(Call::SetMode(pin, mode));
        Ok(())
    }

    fn set_pull_up_down(&mut self, pin: u8, pull: Pull) -> Result<()> {
        self.log.lock().push(Call::SetPull(pin, pull));
        Ok(())
    }

    fn read(&self, pin: u8) -> Result<Level> {
        self.log.lock().push(Call::Read(pin));
        Ok(Level::High)
    }

    fn set_hardware_pwm(&mut self, pin: u8, frequency_hz: u32, duty: f64) -> Result<()> {
        if self.pwm_failures > 0 {
            self.pwm_failures -= 1;
            return Err(PifanError::hardware("set_hardware_pwm", pin, "channel busy"));
        }
        self.log.lock().push(Call::Pwm(pin, frequency_hz, duty));
        Ok(())
    }

    fn subscribe_edge(&mut self, pin: u8, edge: Edge, handler: EdgeHandler) -> Result<SubscriptionId> {
        self.log.lock().push(Call::Subscribe(pin, edge));
        self.handler = Some(handler);
        Ok(SubscriptionId { pin })
    }

    fn cancel(&mut self, subscription: SubscriptionId) -> Result<()> {
        self.log.lock().push(Call::Cancel(subscription.pin));
        self.handler = None;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.log.lock().push(Call::Disconnect);
    }
}

pub fn pwm_calls(log: &[Call]) -> Vec<f64> {
    log.iter()
        .filter_map(|c| match c {
            Call::Pwm(_, _, duty) => Some(*duty),
            _ => None,
        })
        .collect()
}
