//! # Force Feedback Module
//!
//! Rumble actuator driving two motors ("strong" and "weak") plus an optional
//! shared direction line.
//!
//! Each motor can be wired to a digital output, a PWM output on a PCA9633,
//! or both. Effects arrive from the host at any time through an
//! [`EffectHandle`]:
//!
//! - Digital outputs are driven immediately.
//! - PWM duty values are parked in a one-slot mailbox per motor and written
//!   by the sampling task on its next tick ([`ForceFeedback::drain`]), so the
//!   effect path never touches the I2C bus.
//!
//! Effects uploaded by the host into device slots are tracked per input
//! device by [`HostEffects`].
//!
//! A motor only changes state on a transition: a non-zero magnitude while
//! idle starts it, a zero magnitude while running stops it. Everything else
//! is a no-op for that motor.

pub mod host;
pub mod pca9633;

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::bus::{OutputPins, PwmBus};

pub use host::HostEffects;
pub use pca9633::Pca9633;

/// Effect types the host can upload. Only rumble is acted upon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectKind {
    Rumble,
    Constant,
    Periodic,
    Ramp,
    Spring,
    Friction,
    Damper,
    Inertia,
}

/// One effect playback request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Effect {
    pub kind: EffectKind,
    pub strong_magnitude: u16,
    pub weak_magnitude: u16,
    /// Host direction, 0..=65535 clockwise from "down".
    pub direction: u16,
}

impl Effect {
    #[must_use]
    pub fn rumble(strong_magnitude: u16, weak_magnitude: u16, direction: u16) -> Self {
        Self {
            kind: EffectKind::Rumble,
            strong_magnitude,
            weak_magnitude,
            direction,
        }
    }
}

/// How an effect was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectOutcome {
    Applied,
    /// Not a rumble effect, acknowledged without touching any output.
    Ignored,
}

/// An output index plus its polarity.
///
/// In the configuration a negative id selects reverse logic, so output 0
/// cannot be reversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputId {
    pub id: u32,
    pub reverse: bool,
}

impl OutputId {
    #[must_use]
    pub fn from_signed(value: i32) -> Self {
        Self {
            id: value.unsigned_abs(),
            reverse: value < 0,
        }
    }

    /// Digital level that leaves the motor at rest.
    #[must_use]
    pub fn off_level(&self) -> bool {
        self.reverse
    }

    /// PWM duty that leaves the motor at rest.
    #[must_use]
    pub fn off_duty(&self) -> u8 {
        if self.reverse {
            0xFF
        } else {
            0x00
        }
    }

    /// PWM duty for a start command of `magnitude`.
    #[must_use]
    pub fn duty(&self, magnitude: u16) -> u8 {
        let duty = (magnitude / 256) as u8;
        if self.reverse {
            0xFF - duty
        } else {
            duty
        }
    }
}

/// Outputs of one motor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MotorWiring {
    pub gpio: Option<OutputId>,
    /// PCA9633 output 0..=3.
    pub pwm: Option<OutputId>,
}

impl MotorWiring {
    #[must_use]
    pub fn is_wired(&self) -> bool {
        self.gpio.is_some() || self.pwm.is_some()
    }
}

/// Outputs of the whole actuator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FfbWiring {
    pub strong: MotorWiring,
    pub weak: MotorWiring,
    pub direction: Option<OutputId>,
}

impl FfbWiring {
    /// PWM outputs in use, for chip bring-up.
    #[must_use]
    pub fn pwm_outputs(&self) -> Vec<OutputId> {
        [self.strong.pwm, self.weak.pwm].into_iter().flatten().collect()
    }

    /// Digital outputs in use.
    #[must_use]
    pub fn gpio_outputs(&self) -> Vec<OutputId> {
        [self.strong.gpio, self.weak.gpio, self.direction]
            .into_iter()
            .flatten()
            .collect()
    }
}

/// Which motor a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorKind {
    Strong,
    Weak,
}

impl fmt::Display for MotorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotorKind::Strong => f.write_str("strong"),
            MotorKind::Weak => f.write_str("weak"),
        }
    }
}

/// Duty register of a PCA9633 output.
#[must_use]
pub fn duty_register(output: u32) -> u8 {
    (output as u8).wrapping_add(pca9633::PWM0)
}

/// Deferred PWM write, taken exactly once by the drain.
#[derive(Debug, Clone, Copy, Default)]
struct Mailbox {
    pending: bool,
    value: u8,
}

#[derive(Debug)]
struct Motor {
    kind: MotorKind,
    wiring: MotorWiring,
    running: bool,
    mailbox: Mailbox,
}

impl Motor {
    fn new(kind: MotorKind, wiring: MotorWiring) -> Self {
        Self {
            kind,
            wiring,
            running: false,
            mailbox: Mailbox::default(),
        }
    }

    fn command(&mut self, magnitude: u16, pins: &mut dyn OutputPins) {
        if !self.wiring.is_wired() {
            return;
        }

        if magnitude != 0 && !self.running {
            debug!("Force feedback {} start ({})", self.kind, magnitude);
            if let Some(pwm) = self.wiring.pwm {
                self.post(pwm.duty(magnitude));
            }
            if let Some(gpio) = self.wiring.gpio {
                drive(pins, gpio.id, !gpio.off_level());
            }
            self.running = true;
        } else if magnitude == 0 && self.running {
            debug!("Force feedback {} stop", self.kind);
            self.stop(pins);
        }
    }

    fn stop(&mut self, pins: &mut dyn OutputPins) {
        if let Some(pwm) = self.wiring.pwm {
            self.post(pwm.off_duty());
        }
        if let Some(gpio) = self.wiring.gpio {
            drive(pins, gpio.id, gpio.off_level());
        }
        self.running = false;
    }

    fn post(&mut self, value: u8) {
        self.mailbox = Mailbox {
            pending: true,
            value,
        };
    }

    fn take(&mut self) -> Option<(u8, u8)> {
        let pwm = self.wiring.pwm?;
        if !self.mailbox.pending {
            return None;
        }
        self.mailbox.pending = false;
        Some((duty_register(pwm.id), self.mailbox.value))
    }
}

fn drive(pins: &mut dyn OutputPins, pin: u32, high: bool) {
    if let Err(e) = pins.set_level(pin, high) {
        warn!("Failed to drive force feedback GPIO{}: {}", pin, e);
    }
}

struct Actuator {
    strong: Motor,
    weak: Motor,
    direction: Option<OutputId>,
    pins: Box<dyn OutputPins>,
}

impl Actuator {
    fn motor_mut(&mut self, kind: MotorKind) -> &mut Motor {
        match kind {
            MotorKind::Strong => &mut self.strong,
            MotorKind::Weak => &mut self.weak,
        }
    }
}

/// The actuator state shared by the effect path and the sampling task.
pub struct ForceFeedback {
    inner: Mutex<Actuator>,
}

impl ForceFeedback {
    /// Creates an idle actuator.
    ///
    /// `pins` must already be configured as outputs for every digital line in
    /// `wiring`.
    #[must_use]
    pub fn new(wiring: FfbWiring, pins: Box<dyn OutputPins>) -> Self {
        for (kind, motor) in [(MotorKind::Strong, wiring.strong), (MotorKind::Weak, wiring.weak)] {
            if let Some(gpio) = motor.gpio {
                info!(
                    "Force feedback {} on GPIO{}{}",
                    kind,
                    gpio.id,
                    if gpio.reverse { " (reverse logic)" } else { "" }
                );
            }
            if let Some(pwm) = motor.pwm {
                info!(
                    "Force feedback {} on PWM output {}{}",
                    kind,
                    pwm.id,
                    if pwm.reverse { " (reverse logic)" } else { "" }
                );
            }
        }
        if let Some(direction) = wiring.direction {
            info!("Force feedback direction on GPIO{}", direction.id);
        }

        Self {
            inner: Mutex::new(Actuator {
                strong: Motor::new(MotorKind::Strong, wiring.strong),
                weak: Motor::new(MotorKind::Weak, wiring.weak),
                direction: wiring.direction,
                pins,
            }),
        }
    }

    /// Applies one effect command.
    ///
    /// Never blocks on the I2C bus. Digital write failures are logged and do
    /// not change the outcome.
    pub fn submit(&self, effect: Effect) -> EffectOutcome {
        if effect.kind != EffectKind::Rumble {
            debug!("Ignoring {:?} force feedback effect", effect.kind);
            return EffectOutcome::Ignored;
        }

        let mut guard = self.inner.lock();
        let actuator = &mut *guard;

        actuator
            .strong
            .command(effect.strong_magnitude, actuator.pins.as_mut());
        actuator
            .weak
            .command(effect.weak_magnitude, actuator.pins.as_mut());

        if let Some(direction) = actuator.direction {
            let down = is_down(effect.direction);
            debug!(
                "Force feedback direction {} ({})",
                if down { "down" } else { "up" },
                effect.direction
            );
            // Down is the low level unless reversed
            drive(actuator.pins.as_mut(), direction.id, down == direction.reverse);
        }

        EffectOutcome::Applied
    }

    /// Issues the deferred PWM writes.
    ///
    /// Values are taken under the lock and written after releasing it. Each
    /// posted value is written exactly once.
    pub fn drain(&self, pwm: &mut dyn PwmBus) {
        let writes: Vec<(u8, u8)> = {
            let mut actuator = self.inner.lock();
            [MotorKind::Strong, MotorKind::Weak]
                .into_iter()
                .filter_map(|kind| actuator.motor_mut(kind).take())
                .collect()
        };

        for (register, value) in writes {
            debug!("Force feedback PWM register 0x{:02X} <- {}", register, value);
            if let Err(e) = pwm.write_register(register, value) {
                warn!("Force feedback PWM write failed: {}", e);
            }
        }
    }

    /// Drives every output to its rest level and forgets running effects.
    ///
    /// Digital outputs are written immediately. PWM rest values replace
    /// whatever the mailboxes held and go out with the next [`drain`].
    /// Every write is attempted even if an earlier one fails.
    ///
    /// [`drain`]: ForceFeedback::drain
    pub fn deactivate_all(&self) {
        let mut guard = self.inner.lock();
        let actuator = &mut *guard;

        for motor in [&mut actuator.strong, &mut actuator.weak] {
            if let Some(gpio) = motor.wiring.gpio {
                drive(actuator.pins.as_mut(), gpio.id, gpio.off_level());
            }
            if let Some(pwm) = motor.wiring.pwm {
                motor.post(pwm.off_duty());
            }
            motor.running = false;
        }

        if let Some(direction) = actuator.direction {
            drive(actuator.pins.as_mut(), direction.id, direction.off_level());
        }
        debug!("Force feedback outputs deactivated");
    }

    /// Whether `kind` is currently running.
    #[must_use]
    pub fn is_running(&self, kind: MotorKind) -> bool {
        self.inner.lock().motor_mut(kind).running
    }

    /// Whether `kind` has a PWM value waiting for the drain.
    #[must_use]
    pub fn is_pending(&self, kind: MotorKind) -> bool {
        self.inner.lock().motor_mut(kind).mailbox.pending
    }
}

/// Directions within a quarter turn of "down" count as down.
#[must_use]
pub fn is_down(direction: u16) -> bool {
    direction < 16384 || direction > 49152
}

/// Cloneable entry point for the host's effect callbacks.
#[derive(Clone)]
pub struct EffectHandle {
    ffb: Arc<ForceFeedback>,
}

impl EffectHandle {
    #[must_use]
    pub fn new(ffb: Arc<ForceFeedback>) -> Self {
        Self { ffb }
    }

    pub fn submit(&self, effect: Effect) -> EffectOutcome {
        self.ffb.submit(effect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::mocks::{RecordingPins, RecordingPwm};
    use crate::bus::MockOutputPins;

    const STRONG_PIN: u32 = 5;
    const WEAK_PIN: u32 = 6;
    const DIR_PIN: u32 = 13;

    fn gpio_wiring(reverse: bool) -> FfbWiring {
        let sign = if reverse { -1 } else { 1 };
        FfbWiring {
            strong: MotorWiring {
                gpio: Some(OutputId::from_signed(sign * STRONG_PIN as i32)),
                pwm: None,
            },
            weak: MotorWiring {
                gpio: Some(OutputId::from_signed(sign * WEAK_PIN as i32)),
                pwm: None,
            },
            direction: Some(OutputId::from_signed(sign * DIR_PIN as i32)),
        }
    }

    fn pwm_wiring(strong: i32, weak: i32) -> FfbWiring {
        FfbWiring {
            strong: MotorWiring {
                gpio: None,
                pwm: Some(OutputId::from_signed(strong)),
            },
            weak: MotorWiring {
                gpio: None,
                pwm: Some(OutputId::from_signed(weak)),
            },
            direction: None,
        }
    }

    fn actuator(wiring: FfbWiring) -> (ForceFeedback, RecordingPins) {
        let pins = RecordingPins::new();
        (ForceFeedback::new(wiring, Box::new(pins.clone())), pins)
    }

    // ==================== Output Id Tests ====================

    #[test]
    fn test_output_id_from_signed() {
        assert_eq!(OutputId::from_signed(5), OutputId { id: 5, reverse: false });
        assert_eq!(OutputId::from_signed(-5), OutputId { id: 5, reverse: true });
    }

    #[test]
    fn test_duty_values() {
        let plain = OutputId::from_signed(1);
        let reversed = OutputId::from_signed(-1);
        assert_eq!(plain.duty(0xFFFF), 255);
        assert_eq!(plain.duty(0x8000), 128);
        assert_eq!(plain.duty(255), 0);
        assert_eq!(reversed.duty(0x8000), 127);
        assert_eq!(plain.off_duty(), 0x00);
        assert_eq!(reversed.off_duty(), 0xFF);
    }

    #[test]
    fn test_direction_classification() {
        assert!(is_down(0));
        assert!(is_down(16383));
        assert!(!is_down(16384));
        assert!(!is_down(32768));
        assert!(!is_down(49152));
        assert!(is_down(49153));
        assert!(is_down(65535));
    }

    // ==================== GPIO Motor Tests ====================

    #[test]
    fn test_gpio_start_and_stop() {
        let (ffb, pins) = actuator(gpio_wiring(false));

        assert_eq!(ffb.submit(Effect::rumble(0x4000, 0, 0)), EffectOutcome::Applied);
        assert!(ffb.is_running(MotorKind::Strong));
        assert!(!ffb.is_running(MotorKind::Weak));
        assert_eq!(pins.get_writes(), vec![(STRONG_PIN, true), (DIR_PIN, false)]);

        ffb.submit(Effect::rumble(0, 0, 0));
        assert!(!ffb.is_running(MotorKind::Strong));
        assert_eq!(
            pins.get_writes()[2..],
            [(STRONG_PIN, false), (DIR_PIN, false)]
        );
    }

    #[test]
    fn test_gpio_reverse_logic() {
        let (ffb, pins) = actuator(gpio_wiring(true));

        ffb.submit(Effect::rumble(0, 0x4000, 32768));
        assert_eq!(pins.get_writes(), vec![(WEAK_PIN, false), (DIR_PIN, false)]);

        ffb.submit(Effect::rumble(0, 0, 0));
        assert_eq!(
            pins.get_writes()[2..],
            [(WEAK_PIN, true), (DIR_PIN, true)]
        );
    }

    #[test]
    fn test_repeated_start_is_noop() {
        let (ffb, pins) = actuator(FfbWiring {
            direction: None,
            ..gpio_wiring(false)
        });

        ffb.submit(Effect::rumble(0x4000, 0, 0));
        ffb.submit(Effect::rumble(0x8000, 0, 0));
        assert_eq!(pins.get_writes(), vec![(STRONG_PIN, true)]);
    }

    #[test]
    fn test_stop_while_idle_is_noop() {
        let (ffb, pins) = actuator(FfbWiring {
            direction: None,
            ..gpio_wiring(false)
        });

        ffb.submit(Effect::rumble(0, 0, 0));
        assert!(pins.get_writes().is_empty());
    }

    #[test]
    fn test_direction_up_drives_high() {
        let (ffb, pins) = actuator(gpio_wiring(false));
        ffb.submit(Effect::rumble(0, 0, 32768));
        assert_eq!(pins.get_writes(), vec![(DIR_PIN, true)]);
    }

    #[test]
    fn test_gpio_failure_is_logged_not_fatal() {
        let (ffb, pins) = actuator(gpio_wiring(false));
        pins.set_fail(true);

        assert_eq!(ffb.submit(Effect::rumble(0x4000, 0x4000, 0)), EffectOutcome::Applied);
        assert!(ffb.is_running(MotorKind::Strong));
        assert!(ffb.is_running(MotorKind::Weak));
    }

    #[test]
    fn test_non_rumble_effect_ignored() {
        let mut pins = MockOutputPins::new();
        pins.expect_set_level().never();
        let ffb = ForceFeedback::new(gpio_wiring(false), Box::new(pins));

        let effect = Effect {
            kind: EffectKind::Periodic,
            ..Effect::rumble(0xFFFF, 0xFFFF, 0)
        };
        assert_eq!(ffb.submit(effect), EffectOutcome::Ignored);
        assert!(!ffb.is_running(MotorKind::Strong));
    }

    // ==================== PWM Deferral Tests ====================

    #[test]
    fn test_pwm_write_deferred_until_drain() {
        let (ffb, _pins) = actuator(pwm_wiring(0, 1));
        let mut pwm = RecordingPwm::new();

        ffb.submit(Effect::rumble(0x8000, 0, 0));
        assert!(ffb.is_pending(MotorKind::Strong));
        assert!(pwm.get_writes().is_empty());

        ffb.drain(&mut pwm);
        assert_eq!(pwm.get_writes(), vec![(0x02, 128)]);
        assert!(!ffb.is_pending(MotorKind::Strong));

        ffb.drain(&mut pwm);
        assert_eq!(pwm.get_writes().len(), 1, "value must be written exactly once");
    }

    #[test]
    fn test_pwm_stop_posts_off_duty() {
        let (ffb, _pins) = actuator(pwm_wiring(-2, 3));
        let mut pwm = RecordingPwm::new();

        ffb.submit(Effect::rumble(0x8000, 0x4000, 0));
        ffb.drain(&mut pwm);
        assert_eq!(pwm.get_writes(), vec![(0x04, 127), (0x05, 64)]);

        ffb.submit(Effect::rumble(0, 0, 0));
        ffb.drain(&mut pwm);
        assert_eq!(pwm.get_writes()[2..], [(0x04, 0xFF), (0x05, 0x00)]);
    }

    #[test]
    fn test_latest_value_wins_before_drain() {
        let (ffb, _pins) = actuator(pwm_wiring(0, 1));
        let mut pwm = RecordingPwm::new();

        ffb.submit(Effect::rumble(0x8000, 0, 0));
        ffb.submit(Effect::rumble(0, 0, 0));
        ffb.drain(&mut pwm);
        assert_eq!(pwm.get_writes(), vec![(0x02, 0x00)]);
    }

    #[test]
    fn test_gpio_and_pwm_on_same_motor() {
        let wiring = FfbWiring {
            strong: MotorWiring {
                gpio: Some(OutputId::from_signed(STRONG_PIN as i32)),
                pwm: Some(OutputId::from_signed(0)),
            },
            ..FfbWiring::default()
        };
        let (ffb, pins) = actuator(wiring);
        let mut pwm = RecordingPwm::new();

        ffb.submit(Effect::rumble(0xFFFF, 0, 0));
        assert_eq!(pins.get_writes(), vec![(STRONG_PIN, true)]);
        ffb.drain(&mut pwm);
        assert_eq!(pwm.get_writes(), vec![(0x02, 0xFF)]);
    }

    // ==================== Teardown Tests ====================

    #[test]
    fn test_deactivate_all_drives_off_levels() {
        let wiring = FfbWiring {
            strong: MotorWiring {
                gpio: Some(OutputId::from_signed(STRONG_PIN as i32)),
                pwm: Some(OutputId::from_signed(-1)),
            },
            weak: MotorWiring {
                gpio: Some(OutputId::from_signed(-(WEAK_PIN as i32))),
                pwm: None,
            },
            direction: Some(OutputId::from_signed(DIR_PIN as i32)),
        };
        let (ffb, pins) = actuator(wiring);
        let mut pwm = RecordingPwm::new();

        ffb.submit(Effect::rumble(0xFFFF, 0xFFFF, 32768));
        ffb.deactivate_all();

        assert!(!ffb.is_running(MotorKind::Strong));
        assert!(!ffb.is_running(MotorKind::Weak));
        assert_eq!(
            pins.get_writes()[3..],
            [(STRONG_PIN, false), (WEAK_PIN, true), (DIR_PIN, false)]
        );

        // The start duty is superseded by the rest duty
        ffb.drain(&mut pwm);
        assert_eq!(pwm.get_writes(), vec![(0x03, 0xFF)]);

        ffb.drain(&mut pwm);
        assert_eq!(pwm.get_writes().len(), 1);
    }

    #[test]
    fn test_deactivate_all_attempts_every_write() {
        let (ffb, pins) = actuator(gpio_wiring(false));
        pins.set_fail(true);

        ffb.deactivate_all();
        assert_eq!(pins.get_writes().len(), 3);
    }

    #[test]
    fn test_effect_handle_shares_state() {
        let (ffb, _pins) = actuator(pwm_wiring(0, 1));
        let ffb = Arc::new(ffb);
        let handle = EffectHandle::new(Arc::clone(&ffb));
        let clone = handle.clone();

        clone.submit(Effect::rumble(0x1000, 0, 0));
        assert!(ffb.is_pending(MotorKind::Strong));
    }
}
