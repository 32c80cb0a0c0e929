//! Linux implementations of the bus traits.
//!
//! - Input and output lines through the GPIO character device (`gpiocdev`).
//!   Button lines are requested with pull-up bias, inverted lines without.
//! - One uinput gamepad per pad (`evdev`), with rumble support when force
//!   feedback is wired
//! - `/dev/i2c-N` for the analog converters and the PWM chip
//!   (`linux-embedded-hal`)

use std::collections::HashSet;
use std::io;
use std::time::{Duration, Instant};

use evdev::uinput::{UInputEvent, VirtualDevice, VirtualDeviceBuilder};
use evdev::{
    AbsInfo, AbsoluteAxisType, AttributeSet, BusType, EventType, FFEffectData, FFEffectKind,
    FFEffectType, InputEvent, InputEventKind, InputId, Key, UInputEventType, UinputAbsSetup,
};
use gpiocdev::line::{Bias, Value};
use gpiocdev::Request;
use linux_embedded_hal::I2cdev;
use tracing::{debug, info, warn};

use super::{AbsAxis, Button, GpioBus, InputSink, OutputPins};
use crate::analog::{AnalogParams, Axis};
use crate::error::{ArcadeError, Result};
use crate::ffb::{Effect, EffectKind, ForceFeedback, HostEffects, OutputId};
use crate::pad::{InputLines, Layout, Pad, BUTTON_COUNT};

const CONSUMER: &str = "arcade-joystick";

/// Effect slots offered to the host per device.
const FF_EFFECTS_MAX: u32 = 16;

fn gpio_error(what: &str, chip_path: &str, err: gpiocdev::Error) -> ArcadeError {
    ArcadeError::Bus(format!("{} on {} failed: {}", what, chip_path, err))
}

fn level(high: bool) -> Value {
    if high {
        Value::Active
    } else {
        Value::Inactive
    }
}

/// Button input lines requested from one GPIO chip.
pub struct CdevInputs {
    request: Option<Request>,
    pins: HashSet<u32>,
}

impl CdevInputs {
    /// Requests every line as an input, with pull-up bias where asked.
    ///
    /// # Errors
    ///
    /// Returns a bus error if the chip cannot be opened, a line is busy or
    /// the kernel refuses the bias.
    pub fn open(chip_path: &str, lines: &InputLines) -> Result<Self> {
        let pull_up: Vec<u32> = lines.pull_up.iter().copied().collect();
        let plain: Vec<u32> = lines.plain.iter().copied().collect();
        let pins: HashSet<u32> = pull_up.iter().chain(&plain).copied().collect();
        if pins.is_empty() {
            return Ok(Self {
                request: None,
                pins,
            });
        }

        let mut builder = Request::builder();
        builder.on_chip(chip_path).with_consumer(CONSUMER);
        if !pull_up.is_empty() {
            builder.with_lines(&pull_up).as_input().with_bias(Bias::PullUp);
        }
        if !plain.is_empty() {
            builder.with_lines(&plain).as_input();
        }
        let request = builder
            .request()
            .map_err(|e| gpio_error("Requesting inputs", chip_path, e))?;

        info!(
            "{} input lines requested on {} ({} pulled up)",
            pins.len(),
            chip_path,
            pull_up.len()
        );
        Ok(Self {
            request: Some(request),
            pins,
        })
    }
}

impl GpioBus for CdevInputs {
    fn is_high(&mut self, pin: u32) -> bool {
        let Some(request) = self.request.as_ref().filter(|_| self.pins.contains(&pin)) else {
            return true;
        };
        // Read as the idle level so a glitch never reports a press
        request.value(pin).map_or_else(
            |e| {
                warn!("Reading GPIO{} failed: {}", pin, e);
                true
            },
            |value| value == Value::Active,
        )
    }
}

/// Force feedback output lines, requested at their rest level.
pub struct CdevOutputs {
    request: Option<Request>,
    pins: HashSet<u32>,
}

impl CdevOutputs {
    /// # Errors
    ///
    /// Returns a bus error if the chip cannot be opened or a line is busy.
    pub fn open(chip_path: &str, outputs: &[OutputId]) -> Result<Self> {
        let pins: HashSet<u32> = outputs.iter().map(|output| output.id).collect();
        if outputs.is_empty() {
            return Ok(Self {
                request: None,
                pins,
            });
        }

        let mut builder = Request::builder();
        builder.on_chip(chip_path).with_consumer(CONSUMER);
        for output in outputs {
            builder
                .with_line(output.id)
                .as_output(level(output.off_level()));
        }
        let request = builder
            .request()
            .map_err(|e| gpio_error("Requesting outputs", chip_path, e))?;

        Ok(Self {
            request: Some(request),
            pins,
        })
    }
}

impl OutputPins for CdevOutputs {
    fn set_level(&mut self, pin: u32, high: bool) -> Result<()> {
        let request = self
            .request
            .as_ref()
            .filter(|_| self.pins.contains(&pin))
            .ok_or_else(|| ArcadeError::Bus(format!("GPIO{} was not requested as output", pin)))?;
        request
            .set_value(pin, level(high))
            .map_err(|e| ArcadeError::Bus(format!("Writing GPIO{} failed: {}", pin, e)))
    }
}

/// Opens an I2C bus device.
///
/// Each chip gets its own handle so the converter and the PWM chip can be
/// owned separately.
///
/// # Errors
///
/// Returns a bus error if the device cannot be opened.
pub fn open_i2c(path: &str) -> Result<I2cdev> {
    I2cdev::new(path).map_err(|e| ArcadeError::Bus(format!("Cannot open {}: {}", path, e)))
}

fn key_code(button: Button) -> Key {
    match button {
        Button::Start => Key::BTN_START,
        Button::Select => Key::BTN_SELECT,
        Button::A => Key::BTN_SOUTH,
        Button::B => Key::BTN_EAST,
        Button::TR => Key::BTN_TR,
        Button::Y => Key::BTN_WEST,
        Button::X => Key::BTN_NORTH,
        Button::TL => Key::BTN_TL,
        Button::Mode => Key::BTN_MODE,
        Button::TL2 => Key::BTN_TL2,
        Button::TR2 => Key::BTN_TR2,
        Button::C => Key::BTN_C,
        Button::Z => Key::BTN_Z,
        Button::Top => Key::BTN_TOP,
        Button::Top2 => Key::BTN_TOP2,
        Button::Base => Key::BTN_BASE,
        Button::Base2 => Key::BTN_BASE2,
    }
}

fn axis_code(axis: AbsAxis) -> AbsoluteAxisType {
    match axis {
        AbsAxis::X => AbsoluteAxisType::ABS_X,
        AbsAxis::Y => AbsoluteAxisType::ABS_Y,
        AbsAxis::RX => AbsoluteAxisType::ABS_RX,
        AbsAxis::RY => AbsoluteAxisType::ABS_RY,
        AbsAxis::Hat0X => AbsoluteAxisType::ABS_HAT0X,
        AbsAxis::Hat0Y => AbsoluteAxisType::ABS_HAT0Y,
    }
}

/// Product id announced for a pad.
fn product_id(pad: &Pad) -> u16 {
    match pad.layout() {
        Layout::Gpio => 1,
        Layout::GpioBplus => 2,
        Layout::GpioTft => 3,
        Layout::Custom if pad.index() == 0 => 4,
        Layout::Custom => 5,
    }
}

fn sink_error(err: std::io::Error) -> ArcadeError {
    ArcadeError::Sink(err.to_string())
}

/// Actuator command for an effect the host uploaded.
///
/// Only rumble carries magnitudes. Other kinds are stored under their own
/// kind and never played.
fn host_effect(data: &FFEffectData) -> Effect {
    let kind = match data.kind {
        FFEffectKind::Rumble {
            strong_magnitude,
            weak_magnitude,
        } => return Effect::rumble(strong_magnitude, weak_magnitude, data.direction),
        FFEffectKind::Constant { .. } => EffectKind::Constant,
        FFEffectKind::Periodic { .. } => EffectKind::Periodic,
        FFEffectKind::Ramp { .. } => EffectKind::Ramp,
        FFEffectKind::Spring { .. } => EffectKind::Spring,
        FFEffectKind::Friction { .. } => EffectKind::Friction,
        FFEffectKind::Damper { .. } => EffectKind::Damper,
        FFEffectKind::Inertia { .. } => EffectKind::Inertia,
    };
    Effect {
        kind,
        strong_magnitude: 0,
        weak_magnitude: 0,
        direction: data.direction,
    }
}

/// A uinput gamepad fed by one pad.
///
/// Events are buffered until [`InputSink::sync`], which emits the batch
/// followed by a report marker. With force feedback enabled the device
/// offers rumble to the host, and the upload, erase and playback requests
/// it queues are applied on every [`InputSink::poll_effects`].
pub struct UinputSink {
    device: VirtualDevice,
    pending: Vec<InputEvent>,
    /// `None` when the device has no force feedback
    effects: Option<HostEffects>,
}

impl UinputSink {
    /// Registers the device for `pad`.
    ///
    /// The directional axes move to the hat when the matching analog axis is
    /// in `analog`. `force_feedback` adds the rumble capability.
    ///
    /// # Errors
    ///
    /// Returns a sink error if `/dev/uinput` refuses the device.
    pub fn register(
        pad: &Pad,
        analog: &[(Axis, AnalogParams)],
        force_feedback: bool,
    ) -> Result<Self> {
        let name = pad.layout().device_name(pad.index());

        let mut keys = AttributeSet::<Key>::new();
        for index in 4..BUTTON_COUNT {
            if pad.line(index).is_none() {
                continue;
            }
            if let Some(button) = Button::for_index(index) {
                keys.insert(key_code(button));
            }
        }

        let hat = AbsInfo::new(0, -1, 1, 0, 0, 0);
        let mut axes = Vec::new();
        let enabled = |axis: Axis| analog.iter().any(|(a, _)| *a == axis);
        for (analog_axis, dpad) in [(Axis::X1, AbsAxis::Hat0X), (Axis::Y1, AbsAxis::Hat0Y)] {
            if enabled(analog_axis) {
                axes.push(UinputAbsSetup::new(axis_code(dpad), hat));
            } else {
                axes.push(UinputAbsSetup::new(axis_code(analog_axis.report_axis()), hat));
            }
        }
        for &(axis, params) in analog {
            let info = AbsInfo::new(
                0,
                0,
                0x0FFF,
                i32::from(params.fuzz),
                i32::from(params.flat),
                0,
            );
            axes.push(UinputAbsSetup::new(axis_code(axis.report_axis()), info));
        }

        let mut builder = VirtualDeviceBuilder::new()
            .map_err(sink_error)?
            .name(&name)
            .input_id(InputId::new(BusType::BUS_PARPORT, 0x0001, product_id(pad), 0x0100))
            .with_keys(&keys)
            .map_err(sink_error)?;
        for setup in &axes {
            builder = builder.with_absolute_axis(setup).map_err(sink_error)?;
        }
        if force_feedback {
            let mut rumble = AttributeSet::<FFEffectType>::new();
            rumble.insert(FFEffectType::FF_RUMBLE);
            builder = builder
                .with_ff(&rumble)
                .map_err(sink_error)?
                .with_ff_effects_max(FF_EFFECTS_MAX);
        }
        let device = builder.build().map_err(sink_error)?;

        info!(
            "Registered \"{}\" for pad {}{}",
            name,
            pad.index(),
            if force_feedback { " with rumble" } else { "" }
        );
        Ok(Self {
            device,
            pending: Vec::with_capacity(BUTTON_COUNT + 4),
            effects: force_feedback.then(HostEffects::new),
        })
    }

    /// Requests the host queued since the last poll.
    fn queued_requests(&mut self) -> Vec<UInputEvent> {
        match self.device.fetch_events() {
            Ok(events) => events.collect(),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Vec::new(),
            Err(e) => {
                warn!("Reading force feedback requests failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Accepts one upload and stores its effect.
    fn upload(&mut self, event: UInputEvent) -> Option<Effect> {
        let upload = match self.device.process_ff_upload(event) {
            Ok(upload) => upload,
            Err(e) => {
                warn!("Force feedback upload failed: {}", e);
                return None;
            }
        };
        let data = upload.effect();
        let length = Duration::from_millis(u64::from(data.replay.length));
        let id = upload.effect_id();
        // Dropping the upload hands it back to the host as accepted
        drop(upload);

        self.effects.as_mut()?.upload(id, host_effect(&data), length)
    }

    fn erase(&mut self, event: UInputEvent) -> Option<Effect> {
        let erase = match self.device.process_ff_erase(event) {
            Ok(erase) => erase,
            Err(e) => {
                warn!("Force feedback erase failed: {}", e);
                return None;
            }
        };
        let id = erase.effect_id() as i16;
        drop(erase);

        self.effects.as_mut()?.erase(id)
    }
}

impl InputSink for UinputSink {
    fn report_axis(&mut self, axis: AbsAxis, value: i32) {
        self.pending
            .push(InputEvent::new(EventType::ABSOLUTE, axis_code(axis).0, value));
    }

    fn report_button(&mut self, button: Button, pressed: bool) {
        self.pending.push(InputEvent::new(
            EventType::KEY,
            key_code(button).code(),
            i32::from(pressed),
        ));
    }

    fn sync(&mut self) -> Result<()> {
        let result = self.device.emit(&self.pending).map_err(sink_error);
        if result.is_err() {
            debug!("Dropping {} buffered events", self.pending.len());
        }
        self.pending.clear();
        result
    }

    fn poll_effects(&mut self, ffb: &ForceFeedback) {
        if self.effects.is_none() {
            return;
        }

        let now = Instant::now();
        for event in self.queued_requests() {
            let command = match event.kind() {
                InputEventKind::UInput(code) if code == UInputEventType::UI_FF_UPLOAD.0 => {
                    self.upload(event)
                }
                InputEventKind::UInput(code) if code == UInputEventType::UI_FF_ERASE.0 => {
                    self.erase(event)
                }
                InputEventKind::ForceFeedback(id) => self
                    .effects
                    .as_mut()
                    .and_then(|effects| effects.play(id as i16, event.value(), now)),
                _ => None,
            };
            if let Some(effect) = command {
                ffb.submit(effect);
            }
        }

        if let Some(effect) = self.effects.as_mut().and_then(|effects| effects.expire(now)) {
            ffb.submit(effect);
        }
    }
}
