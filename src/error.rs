//! # Error Types
//!
//! Custom error types for the arcade joystick engine using `thiserror`.

use thiserror::Error;

use crate::analog::Axis;

/// Main error type for the arcade joystick engine
#[derive(Debug, Error)]
pub enum ArcadeError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// GPIO or I2C transaction failures
    #[error("Bus error: {0}")]
    Bus(String),

    /// An analog axis could not be sampled during bring-up
    #[error("Analog {axis} probe failed: {reason}")]
    AnalogProbe { axis: Axis, reason: String },

    /// The PWM chip did not answer during bring-up
    #[error("PWM chip probe failed: {0}")]
    PwmProbe(String),

    /// The host input device rejected an event batch
    #[error("Input sink error: {0}")]
    Sink(String),
}

/// Result type alias for the arcade joystick engine
pub type Result<T> = std::result::Result<T, ArcadeError>;
