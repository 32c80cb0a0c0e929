//! # Arcade Joystick Library
//!
//! Periodic sampling, calibration and force feedback engine for GPIO wired
//! arcade controllers.
//!
//! Every tick the engine reads up to two pads worth of button lines, decodes
//! the hotkey combo gesture, samples up to four analog axes through an
//! external ADC, reports the result to one input sink per pad, and flushes
//! force feedback PWM writes deferred by the effect callback.

pub mod analog;
pub mod bus;
pub mod config;
pub mod engine;
pub mod error;
pub mod ffb;
pub mod pad;
