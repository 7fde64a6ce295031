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

//! Fan control loop.
//!
//! Polls the duty source, reprograms hardware PWM only when the desired duty
//! changes, and publishes an RPM sample every reporting interval while the
//! tachometer edge handler counts pulses in the background.
//!
//! # Shutdown
//! Whether the loop ends by signal, error or unwinding, the controller drives
//! the fan to 100% before cancelling the edge subscription and releasing the
//! hardware handle.

use std::sync::Arc;
use std::time::Instant;

use pf_error::Result;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::duty::{DutySource, DutyTracker};
use crate::hardware::{Edge, HardwarePort, PinMode, Pull, SubscriptionId};
use crate::shutdown::ShutdownSignal;
use crate::status::{format_status, StatusSink};
use crate::tach::{EdgeEvent, PulseCounter, PulseFilter, RpmEstimator, RpmSample};

/// Duty used on shutdown.
pub const FAILSAFE_DUTY_PERCENT: f32 = 100.0;

/// What the PWM output is currently programmed to.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DutyState {
    pub current_percent: Option<f32>,
    pub last_applied: Option<Instant>,
}

pub struct FanController<H: HardwarePort, D: DutySource, S: StatusSink> {
    hw: H,
    duty_source: D,
    sink: S,
    settings: Settings,
    counter: Arc<PulseCounter>,
    estimator: RpmEstimator,
    tracker: DutyTracker,
    duty: DutyState,
    window_start: Instant,
    last_sample: Option<RpmSample>,
    subscription: Option<SubscriptionId>,
    finalized: bool,
}

impl<H: HardwarePort, D: DutySource, S: StatusSink> FanController<H, D, S> {
    /// Configure the tachometer line and start counting pulses.
    ///
    /// `hw` must already be connected. If any setup step fails the controller
    /// is dropped, which still applies the shutdown sequence.
    pub fn start(hw: H, duty_source: D, sink: S, settings: Settings, now: Instant) -> Result<Self> {
        let counter = Arc::new(PulseCounter::new());
        let mut controller = Self {
            hw,
            duty_source,
            sink,
            estimator: RpmEstimator::new(settings.pulses_per_revolution),
            tracker: DutyTracker::new(settings.default_duty_percent),
            settings,
            counter: counter.clone(),
            duty: DutyState::default(),
            window_start: now,
            last_sample: None,
            subscription: None,
            finalized: false,
        };

        let tach = controller.settings.tach_pin;
        controller.hw.set_mode(tach, PinMode::Input)?;
        controller.hw.set_pull_up_down(tach, Pull::Up)?;

        let mut filter = PulseFilter::new(controller.settings.min_pulse_width_us, counter);
        let sub = controller.hw.subscribe_edge(
            tach,
            Edge::Falling,
            Box::new(move |event: EdgeEvent| {
                filter.on_edge(event);
            }),
        )?;
        controller.subscription = Some(sub);

        // Reset the window now that pulses can arrive.
        controller.counter.take();
        info!(
            "Tachometer on GPIO {} (min pulse {} us, {} pulses/rev)",
            tach, controller.settings.min_pulse_width_us, controller.settings.pulses_per_revolution
        );
        Ok(controller)
    }

    /// Run until `shutdown` is triggered, then apply the shutdown sequence.
    pub fn run(&mut self, shutdown: &ShutdownSignal) {
        info!("Fan control loop starting");
        let slice = self.settings.poll_interval();
        while !shutdown.sleep(slice) {
            self.poll(Instant::now());
        }
        info!("Fan control loop shutting down");
        self.shutdown();
    }

    /// One loop iteration: reload duty, then report if the window has elapsed.
    pub fn poll(&mut self, now: Instant) {
        let loaded = self.duty_source.load();
        let desired = self.tracker.resolve(loaded);
        self.apply_duty(desired, now);

        if now.saturating_duration_since(self.window_start) >= self.settings.report_interval() {
            self.report(now);
        }
    }

    fn apply_duty(&mut self, percent: f32, now: Instant) {
        if self.duty.current_percent == Some(percent) {
            return;
        }
        match self.set_pwm(percent) {
            Ok(()) => {
                self.duty = DutyState {
                    current_percent: Some(percent),
                    last_applied: Some(now),
                };
            }
            // Not recorded, so the next poll retries.
            Err(e) => warn!("Failed to set PWM to {:.1}%: {}", percent, e),
        }
    }

    fn set_pwm(&mut self, percent: f32) -> Result<()> {
        let freq = self.settings.pwm_frequency_hz;
        self.hw
            .set_hardware_pwm(self.settings.pwm_pin, freq, percent as f64 / 100.0)?;
        info!("PWM output @ {} Hz, duty = {:.1}%", freq, percent);
        Ok(())
    }

    fn report(&mut self, now: Instant) {
        let pulses = self.counter.take();
        let duty = self.duty.current_percent.unwrap_or(0.0);
        let sample = self.estimator.sample(pulses, duty, self.window_start, now);
        self.window_start = now;

        debug!("{} ({} pulses)", format_status(&sample), pulses);
        if let Err(e) = self.sink.publish(&sample) {
            warn!("Failed to publish status: {}", e);
        }
        self.last_sample = Some(sample);
    }

    /// Force 100% duty, cancel the edge subscription and disconnect.
    ///
    /// Runs at most once; later calls and the drop are no-ops.
    pub fn shutdown(&mut self) {
        if self.finalized {
            return;
        }
        self.finalized = true;

        info!("Stopping - setting PWM = {:.0}%", FAILSAFE_DUTY_PERCENT);
        match self.set_pwm(FAILSAFE_DUTY_PERCENT) {
            Ok(()) => self.duty.current_percent = Some(FAILSAFE_DUTY_PERCENT),
            Err(e) => warn!("Failed to apply shutdown duty: {}", e),
        }
        if let Some(sub) = self.subscription.take() {
            if let Err(e) = self.hw.cancel(sub) {
                warn!("Failed to cancel edge subscription on GPIO {}: {}", sub.pin, e);
            }
        }
        self.hw.disconnect();
        info!("Stopped");
    }

    pub fn duty_state(&self) -> DutyState {
        self.duty
    }

    pub fn last_sample(&self) -> Option<&RpmSample> {
        self.last_sample.as_ref()
    }

    pub fn pulse_counter(&self) -> &Arc<PulseCounter> {
        &self.counter
    }

    pub fn hardware(&self) -> &H {
        &self.hw
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hw
    }
}

impl<H: HardwarePort, D: DutySource, S: StatusSink> Drop for FanController<H, D, S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::MockHardwarePort;
    use mockall::predicate::*;
    use mockall::Sequence;
    use pf_error::PifanError;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Replays scripted loads, repeating the last one when exhausted.
    struct ScriptedDuty {
        script: VecDeque<Option<f32>>,
        last: Option<f32>,
    }

    impl ScriptedDuty {
        fn new(script: &[Option<f32>]) -> Self {
            Self {
                script: script.iter().copied().collect(),
                last: None,
            }
        }
    }

    impl DutySource for ScriptedDuty {
        fn load(&mut self) -> Result<f32> {
            if let Some(next) = self.script.pop_front() {
                self.last = next;
            }
            self.last
                .ok_or_else(|| PifanError::duty_parse("config.txt", "no PWM_DUTY entry"))
        }
    }

    #[derive(Default)]
    struct CollectingSink(Vec<RpmSample>);

    impl StatusSink for CollectingSink {
        fn publish(&mut self, sample: &RpmSample) -> Result<()> {
            self.0.push(*sample);
            Ok(())
        }
    }

    fn duty_is(expected: f64) -> impl Fn(&u8, &u32, &f64) -> bool {
        move |pin, freq, duty| *pin == 12 && *freq == 25_000 && (*duty - expected).abs() < 1e-9
    }

    fn expect_startup(hw: &mut MockHardwarePort, seq: &mut Sequence) {
        hw.expect_set_mode()
            .with(eq(16), eq(PinMode::Input))
            .times(1)
            .in_sequence(seq)
            .returning(|_, _| Ok(()));
        hw.expect_set_pull_up_down()
            .with(eq(16), eq(Pull::Up))
            .times(1)
            .in_sequence(seq)
            .returning(|_, _| Ok(()));
        hw.expect_subscribe_edge()
            .with(eq(16), eq(Edge::Falling), always())
            .times(1)
            .in_sequence(seq)
            .returning(|pin, _, _| Ok(SubscriptionId { pin }));
    }

    fn expect_shutdown(hw: &mut MockHardwarePort, seq: &mut Sequence) {
        hw.expect_set_hardware_pwm()
            .withf(duty_is(1.0))
            .times(1)
            .in_sequence(seq)
            .returning(|_, _, _| Ok(()));
        hw.expect_cancel()
            .with(eq(SubscriptionId { pin: 16 }))
            .times(1)
            .in_sequence(seq)
            .returning(|_| Ok(()));
        hw.expect_disconnect().times(1).in_sequence(seq).return_const(());
    }

    fn start(
        hw: MockHardwarePort,
        script: &[Option<f32>],
        now: Instant,
    ) -> FanController<MockHardwarePort, ScriptedDuty, CollectingSink> {
        FanController::start(
            hw,
            ScriptedDuty::new(script),
            CollectingSink::default(),
            Settings::default(),
            now,
        )
        .unwrap()
    }

    #[test]
    fn test_unchanged_duty_is_applied_once() {
        let mut hw = MockHardwarePort::new();
        let mut seq = Sequence::new();
        expect_startup(&mut hw, &mut seq);
        hw.expect_set_hardware_pwm()
            .withf(duty_is(0.5))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        expect_shutdown(&mut hw, &mut seq);

        let t0 = Instant::now();
        let mut c = start(hw, &[Some(50.0)], t0);
        for i in 1..=5 {
            c.poll(t0 + Duration::from_millis(100 * i));
        }
        assert_eq!(c.duty_state().current_percent, Some(50.0));
        assert_eq!(c.duty_state().last_applied, Some(t0 + Duration::from_millis(100)));
    }

    #[test]
    fn test_changed_duty_is_reapplied() {
        let mut hw = MockHardwarePort::new();
        let mut seq = Sequence::new();
        expect_startup(&mut hw, &mut seq);
        hw.expect_set_hardware_pwm()
            .withf(duty_is(0.5))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        hw.expect_set_hardware_pwm()
            .withf(duty_is(0.7))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        expect_shutdown(&mut hw, &mut seq);

        let t0 = Instant::now();
        let mut c = start(hw, &[Some(50.0), Some(50.0), Some(70.0), Some(70.0)], t0);
        for i in 1..=4 {
            c.poll(t0 + Duration::from_millis(100 * i));
        }
        assert_eq!(c.duty_state().current_percent, Some(70.0));
    }

    #[test]
    fn test_load_failure_falls_back_to_default_then_last_good() {
        let mut hw = MockHardwarePort::new();
        let mut seq = Sequence::new();
        expect_startup(&mut hw, &mut seq);
        hw.expect_set_hardware_pwm()
            .withf(duty_is(0.8))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        hw.expect_set_hardware_pwm()
            .withf(duty_is(0.4))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        expect_shutdown(&mut hw, &mut seq);

        let t0 = Instant::now();
        let mut c = start(hw, &[None, Some(40.0), None, None], t0);
        for i in 1..=4 {
            c.poll(t0 + Duration::from_millis(100 * i));
        }
        assert_eq!(c.duty_state().current_percent, Some(40.0));
    }

    #[test]
    fn test_shutdown_forces_full_duty_before_cleanup() {
        let mut hw = MockHardwarePort::new();
        let mut seq = Sequence::new();
        expect_startup(&mut hw, &mut seq);
        hw.expect_set_hardware_pwm()
            .withf(duty_is(0.3))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        expect_shutdown(&mut hw, &mut seq);

        let t0 = Instant::now();
        let mut c = start(hw, &[Some(30.0)], t0);
        c.poll(t0 + Duration::from_millis(100));
        c.shutdown();
        assert_eq!(c.duty_state().current_percent, Some(100.0));
        // Idempotent: the drop must not repeat the sequence.
        c.shutdown();
    }

    #[test]
    fn test_run_exits_on_signal_with_failsafe() {
        let mut hw = MockHardwarePort::new();
        let mut seq = Sequence::new();
        expect_startup(&mut hw, &mut seq);
        expect_shutdown(&mut hw, &mut seq);

        let mut c = start(hw, &[Some(30.0)], Instant::now());
        let signal = ShutdownSignal::new();
        signal.trigger();
        c.run(&signal);
        assert_eq!(c.duty_state().current_percent, Some(100.0));
    }

    #[test]
    fn test_failed_setup_still_disconnects() {
        let mut hw = MockHardwarePort::new();
        hw.expect_set_mode()
            .returning(|pin, _| Err(PifanError::hardware("set_mode", pin, "busy")));
        hw.expect_set_hardware_pwm()
            .withf(duty_is(1.0))
            .times(1)
            .returning(|_, _, _| Ok(()));
        hw.expect_cancel().never();
        hw.expect_disconnect().times(1).return_const(());

        let result = FanController::start(
            hw,
            ScriptedDuty::new(&[Some(50.0)]),
            CollectingSink::default(),
            Settings::default(),
            Instant::now(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_report_waits_for_interval() {
        let mut hw = MockHardwarePort::new();
        let mut seq = Sequence::new();
        expect_startup(&mut hw, &mut seq);
        hw.expect_set_hardware_pwm()
            .withf(duty_is(0.5))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        expect_shutdown(&mut hw, &mut seq);

        let t0 = Instant::now();
        let mut c = start(hw, &[Some(50.0)], t0);
        for _ in 0..10 {
            c.pulse_counter().record();
        }
        c.poll(t0 + Duration::from_millis(999));
        assert!(c.last_sample().is_none());

        c.poll(t0 + Duration::from_millis(1000));
        let s = *c.last_sample().unwrap();
        assert_eq!(s.rpm, 300);
        assert_eq!(s.duty_percent, 50.0);
        assert_eq!(c.pulse_counter().peek(), 0);

        // Stalled fan: next window reports zero.
        c.poll(t0 + Duration::from_millis(2000));
        assert_eq!(c.last_sample().unwrap().rpm, 0);
        assert_eq!(c.sink.0.len(), 2);
    }
}
