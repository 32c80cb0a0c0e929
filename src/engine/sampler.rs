//! One sampling tick.
//!
//! Order within a tick, for every pad:
//!
//! 1. Scan its lines through the hotkey session.
//! 2. Report the d-pad, on the hat axes when the matching analog axis is
//!    enabled.
//! 3. Sample every enabled analog axis and report it. A failed read drops
//!    that axis for this pad only.
//! 4. Report every wired button from index 4 up, then sync.
//! 5. Apply the force feedback requests the host queued on its device.
//!
//! Deferred PWM writes are drained once all pads are done.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::analog::{AnalogChannel, Axis, CalibrationReport};
use crate::bus::{AbsAxis, AdcBank, Button, GpioBus, InputSink, PwmBus};
use crate::ffb::ForceFeedback;
use crate::pad::{dpad_axes, ButtonBuffer, HotkeySession, Pad, BUTTON_COUNT};

/// Ticks per benchmark report.
const BENCHMARK_TICKS: u32 = 200;

/// A pad with its host device and per-pad session state.
struct PadSlot {
    pad: Pad,
    session: HotkeySession,
    buttons: ButtonBuffer,
    sink: Box<dyn InputSink>,
}

/// Longest tick over a window of [`BENCHMARK_TICKS`].
#[derive(Debug, Default)]
struct TickBenchmark {
    ticks: u32,
    longest: Duration,
}

impl TickBenchmark {
    fn record(&mut self, elapsed: Duration) {
        self.ticks += 1;
        self.longest = self.longest.max(elapsed);
        if self.ticks >= BENCHMARK_TICKS {
            debug!(
                "Longest tick over {} ticks: {:?}",
                BENCHMARK_TICKS, self.longest
            );
            *self = Self::default();
        }
    }
}

/// Everything one tick reads or writes, owned by the sampling task.
pub struct Sampler {
    pads: Vec<PadSlot>,
    gpio: Box<dyn GpioBus>,
    adc: Option<Box<dyn AdcBank>>,
    channels: Vec<AnalogChannel>,
    ffb: Arc<ForceFeedback>,
    pwm: Option<Box<dyn PwmBus>>,
    benchmark: TickBenchmark,
}

impl Sampler {
    #[must_use]
    pub fn new(gpio: Box<dyn GpioBus>, ffb: Arc<ForceFeedback>) -> Self {
        Self {
            pads: Vec::new(),
            gpio,
            adc: None,
            channels: Vec::new(),
            ffb,
            pwm: None,
            benchmark: TickBenchmark::default(),
        }
    }

    /// Adds a pad reporting to `sink`, with fresh session state.
    pub fn add_pad(&mut self, pad: Pad, sink: Box<dyn InputSink>) {
        self.pads.push(PadSlot {
            pad,
            session: HotkeySession::new(),
            buttons: ButtonBuffer::new(),
            sink,
        });
    }

    /// Sets the converter and the axes it serves.
    pub fn set_analog(&mut self, adc: Box<dyn AdcBank>, channels: Vec<AnalogChannel>) {
        self.adc = Some(adc);
        self.channels = channels;
    }

    pub fn set_pwm(&mut self, pwm: Box<dyn PwmBus>) {
        self.pwm = Some(pwm);
    }

    /// The actuator this sampler drains.
    #[must_use]
    pub fn force_feedback(&self) -> Arc<ForceFeedback> {
        Arc::clone(&self.ffb)
    }

    #[must_use]
    pub fn pad_count(&self) -> usize {
        self.pads.len()
    }

    fn axis_enabled(&self, axis: Axis) -> bool {
        self.channels.iter().any(|channel| channel.axis() == axis)
    }

    /// Runs one tick.
    pub fn tick(&mut self) {
        let started = Instant::now();

        let (dpad_x, dpad_y) = (
            if self.axis_enabled(Axis::X1) { AbsAxis::Hat0X } else { AbsAxis::X },
            if self.axis_enabled(Axis::Y1) { AbsAxis::Hat0Y } else { AbsAxis::Y },
        );

        let Self {
            pads,
            gpio,
            adc,
            channels,
            ffb,
            ..
        } = self;

        for slot in pads.iter_mut() {
            slot.pad
                .scan(gpio.as_mut(), &mut slot.session, &mut slot.buttons);

            let (x, y) = dpad_axes(&slot.buttons);
            slot.sink.report_axis(dpad_x, x);
            slot.sink.report_axis(dpad_y, y);

            if let Some(bank) = adc.as_deref_mut() {
                for (axis, value) in sample_analog(bank, channels) {
                    slot.sink.report_axis(axis.report_axis(), value);
                }
            }

            for index in 4..BUTTON_COUNT {
                if slot.pad.line(index).is_none() {
                    continue;
                }
                if let Some(button) = Button::for_index(index) {
                    slot.sink.report_button(button, slot.buttons.is_pressed(index));
                }
            }

            if let Err(e) = slot.sink.sync() {
                warn!("Pad {} event batch rejected: {}", slot.pad.index(), e);
            }
            slot.sink.poll_effects(ffb);
        }

        self.drain();
        self.benchmark.record(started.elapsed());
    }

    /// Forgets hotkey gestures and button states, for a fresh start.
    pub fn reset_sessions(&mut self) {
        for slot in &mut self.pads {
            slot.session = HotkeySession::new();
            slot.buttons = ButtonBuffer::new();
        }
    }

    /// Issues pending PWM writes, if a PWM chip is present.
    pub fn drain(&mut self) {
        if let Some(pwm) = self.pwm.as_mut() {
            self.ffb.drain(pwm.as_mut());
        }
    }

    /// Drives every force feedback output to rest, PWM included.
    pub fn deactivate(&mut self) {
        self.ffb.deactivate_all();
        self.drain();
    }

    /// Restores the PWM chip. Called once, at final shutdown.
    pub fn release_pwm(&mut self) {
        if let Some(pwm) = self.pwm.as_mut() {
            if let Err(e) = pwm.release() {
                warn!("Failed to release PWM chip: {}", e);
            }
        }
    }

    /// Observed travel of every axis sampled at least once.
    #[must_use]
    pub fn calibration_reports(&self) -> Vec<CalibrationReport> {
        self.channels.iter().filter_map(AnalogChannel::report).collect()
    }
}

/// Calibrated value of every axis that answered.
fn sample_analog(adc: &mut dyn AdcBank, channels: &mut [AnalogChannel]) -> Vec<(Axis, i32)> {
    let mut values = Vec::with_capacity(channels.len());
    for channel in channels.iter_mut() {
        match adc.sample(channel.axis()) {
            Ok(raw) => {
                let value = channel.process(raw);
                trace!("{} raw {} -> {}", channel.axis(), raw, value);
                values.push((channel.axis(), value));
            }
            Err(e) => debug!("Dropping {} sample: {}", channel.axis(), e),
        }
    }
    values
}
