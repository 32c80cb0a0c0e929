//! # Bus Module
//!
//! Trait abstraction for the hardware the engine drives, so the sampling
//! core can be exercised without a board attached.
//!
//! This module handles:
//! - Raw input line levels ([`GpioBus`])
//! - Force feedback digital outputs ([`OutputPins`])
//! - Analog samples from an external converter ([`AdcBank`])
//! - PWM duty registers on the force feedback chip ([`PwmBus`])
//! - Event delivery to the host input subsystem, and the host's force
//!   feedback requests coming back ([`InputSink`])

pub mod event;
#[cfg(feature = "linux")]
pub mod linux;

use crate::analog::Axis;
use crate::error::Result;
use crate::ffb::ForceFeedback;

pub use event::{AbsAxis, Button};

/// Raw level reads of physical input lines.
///
/// Lines are validated when the implementation is built, so a read cannot
/// fail once the engine is running.
#[cfg_attr(test, mockall::automock)]
pub trait GpioBus: Send {
    /// Returns `true` when the physical line reads high.
    fn is_high(&mut self, pin: u32) -> bool;
}

/// Digital outputs used by the force feedback actuator.
#[cfg_attr(test, mockall::automock)]
pub trait OutputPins: Send {
    /// Drives `pin` high or low.
    fn set_level(&mut self, pin: u32, high: bool) -> Result<()>;
}

/// A converter that samples analog axes.
#[cfg_attr(test, mockall::automock)]
pub trait AdcBank: Send {
    /// Returns one 12-bit sample for `axis`.
    fn sample(&mut self, axis: Axis) -> Result<u16>;
}

/// Register writes on the PWM force feedback chip.
#[cfg_attr(test, mockall::automock)]
pub trait PwmBus: Send {
    /// Writes a single duty register.
    fn write_register(&mut self, register: u8, value: u8) -> Result<()>;

    /// Returns the chip to the state it had before bring-up.
    fn release(&mut self) -> Result<()>;
}

/// One host input device, fed once per tick.
#[cfg_attr(test, mockall::automock)]
pub trait InputSink: Send {
    fn report_axis(&mut self, axis: AbsAxis, value: i32);

    fn report_button(&mut self, button: Button, pressed: bool);

    /// Terminates the current event batch.
    fn sync(&mut self) -> Result<()>;

    /// Applies host force feedback requests queued on this device.
    ///
    /// Called once per tick, after [`InputSink::sync`]. Devices without
    /// force feedback keep the default, which does nothing.
    fn poll_effects(&mut self, _ffb: &ForceFeedback) {}
}
