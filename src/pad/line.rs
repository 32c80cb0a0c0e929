//! Digital line reader.
//!
//! Buttons are wired active-low against the SoC pull-ups, so a line reading
//! low is a pressed button. A negative line id flips that: the button is
//! pressed while the line reads high.

use std::fmt;

use crate::bus::GpioBus;

/// Marker for an unused logical button in a signed line map.
pub const UNUSED_LINE: i32 = -1;

/// A physical line plus its polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineId {
    pin: u32,
    inverted: bool,
}

impl LineId {
    #[must_use]
    pub const fn new(pin: u32, inverted: bool) -> Self {
        Self { pin, inverted }
    }

    /// Decodes a signed line id, `None` for [`UNUSED_LINE`].
    ///
    /// # Examples
    ///
    /// ```
    /// use arcade_joystick::pad::line::LineId;
    ///
    /// assert_eq!(LineId::from_signed(-7), Some(LineId::new(7, true)));
    /// assert_eq!(LineId::from_signed(4), Some(LineId::new(4, false)));
    /// assert_eq!(LineId::from_signed(-1), None);
    /// ```
    #[must_use]
    pub fn from_signed(id: i32) -> Option<Self> {
        if id == UNUSED_LINE {
            None
        } else {
            Some(Self::new(id.unsigned_abs(), id < 0))
        }
    }

    #[must_use]
    pub fn pin(&self) -> u32 {
        self.pin
    }

    #[must_use]
    pub fn is_inverted(&self) -> bool {
        self.inverted
    }

    /// Signed form, negative when inverted.
    #[must_use]
    pub fn signed(&self) -> i32 {
        let pin = self.pin as i32;
        if self.inverted {
            -pin
        } else {
            pin
        }
    }
}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.inverted {
            write!(f, "GPIO{} (inverted)", self.pin)
        } else {
            write!(f, "GPIO{}", self.pin)
        }
    }
}

/// Reads the logical "pressed" state of a line.
pub fn read_line(gpio: &mut dyn GpioBus, line: LineId) -> bool {
    let high = gpio.is_high(line.pin);
    high == line.inverted
}
