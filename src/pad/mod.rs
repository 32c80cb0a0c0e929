//! # Pad Module
//!
//! Digital side of a controller: which physical line backs each logical
//! button, and how the lines are turned into button states every tick.
//!
//! This module handles:
//! - Built-in and custom line maps ([`layout`])
//! - Polarity-aware line reads ([`line`])
//! - The hotkey combo gesture ([`hotkey`])
//! - D-pad axis derivation from the four directional buttons
//! - Input line bias ([`input_lines`])

pub mod hotkey;
pub mod layout;
pub mod line;

use std::collections::BTreeSet;

use serde::de::Error;
use serde::Deserialize;

use crate::bus::GpioBus;
use crate::error::{ArcadeError, Result};

pub use hotkey::HotkeySession;
pub use layout::Layout;
pub use line::{read_line, LineId, UNUSED_LINE};

/// Number of logical buttons per pad.
pub const BUTTON_COUNT: usize = 21;

/// Logical index of the hotkey button.
pub const HOTKEY_INDEX: usize = 12;

/// Logical indices of the directional buttons.
pub const UP: usize = 0;
pub const DOWN: usize = 1;
pub const LEFT: usize = 2;
pub const RIGHT: usize = 3;

/// How the hotkey line is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HotkeyMode {
    /// Legacy "undefined" mode: the line is reported as a plain button.
    Off,
    /// The line level is reported directly as the hotkey button.
    Normal,
    /// The line arms a combo window, see [`hotkey`].
    #[default]
    Toggle,
}

/// One pressed flag per logical button.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ButtonBuffer([bool; BUTTON_COUNT]);

impl ButtonBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_pressed(&self, index: usize) -> bool {
        self.0.get(index).copied().unwrap_or(false)
    }

    pub fn set(&mut self, index: usize, pressed: bool) {
        if let Some(slot) = self.0.get_mut(index) {
            *slot = pressed;
        }
    }
}

/// Derives the two d-pad axes from the directional buttons.
///
/// Returns `(x, y)` with -1 for left/up, +1 for right/down and 0 when
/// neither or both opposing buttons are held.
///
/// # Examples
///
/// ```
/// use arcade_joystick::pad::{dpad_axes, ButtonBuffer, DOWN, UP};
///
/// let mut buttons = ButtonBuffer::new();
/// buttons.set(DOWN, true);
/// assert_eq!(dpad_axes(&buttons), (0, 1));
///
/// buttons.set(UP, true);
/// assert_eq!(dpad_axes(&buttons), (0, 0));
/// ```
#[must_use]
pub fn dpad_axes(buttons: &ButtonBuffer) -> (i32, i32) {
    let axis = |negative: usize, positive: usize| {
        i32::from(!buttons.is_pressed(negative)) - i32::from(!buttons.is_pressed(positive))
    };
    (axis(LEFT, RIGHT), axis(UP, DOWN))
}

/// One physical controller, immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pad {
    index: usize,
    layout: Layout,
    hotkey_mode: HotkeyMode,
    lines: [Option<LineId>; BUTTON_COUNT],
}

impl Pad {
    /// Builds a pad from its layout.
    ///
    /// `custom_map` is required for [`Layout::Custom`] and rejected for the
    /// built-in layouts. It holds exactly [`BUTTON_COUNT`] signed line ids.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the map is missing, superfluous or
    /// of the wrong length.
    pub fn new(
        index: usize,
        layout: Layout,
        custom_map: Option<&[i32]>,
        hotkey_mode: HotkeyMode,
    ) -> Result<Self> {
        let map: &[i32] = match (layout.builtin_map(), custom_map) {
            (Some(builtin), None) => builtin,
            (None, Some(custom)) => custom,
            (None, None) => {
                return Err(ArcadeError::Config(toml::de::Error::custom(format!(
                    "pad {} uses the custom layout but has no map",
                    index
                ))));
            }
            (Some(_), Some(_)) => {
                return Err(ArcadeError::Config(toml::de::Error::custom(format!(
                    "pad {} has a map but layout {:?} is not custom",
                    index, layout
                ))));
            }
        };

        if map.len() != BUTTON_COUNT {
            return Err(ArcadeError::Config(toml::de::Error::custom(format!(
                "pad {} map must have exactly {} entries, got {}",
                index,
                BUTTON_COUNT,
                map.len()
            ))));
        }

        let mut lines = [None; BUTTON_COUNT];
        for (slot, &id) in lines.iter_mut().zip(map) {
            *slot = LineId::from_signed(id);
        }

        Ok(Self {
            index,
            layout,
            hotkey_mode,
            lines,
        })
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    #[must_use]
    pub fn hotkey_mode(&self) -> HotkeyMode {
        self.hotkey_mode
    }

    /// Line backing a logical button.
    #[must_use]
    pub fn line(&self, index: usize) -> Option<LineId> {
        self.lines.get(index).copied().flatten()
    }

    /// Every wired line in logical order.
    pub fn used_lines(&self) -> impl Iterator<Item = LineId> + '_ {
        self.lines.iter().flatten().copied()
    }

    /// Refreshes `buttons` from the physical lines.
    ///
    /// Unused indices are forced to not-pressed. In toggle mode the hotkey
    /// slot is owned by the gesture state machine rather than the line.
    pub fn scan(
        &self,
        gpio: &mut dyn GpioBus,
        session: &mut HotkeySession,
        buttons: &mut ButtonBuffer,
    ) {
        for (index, line) in self.lines.iter().enumerate() {
            let Some(line) = *line else {
                buttons.set(index, false);
                continue;
            };

            let pressed = read_line(gpio, line);

            if index == HOTKEY_INDEX && self.hotkey_mode == HotkeyMode::Toggle {
                session.hotkey_level(pressed, buttons);
                continue;
            }

            let previous = buttons.is_pressed(index);
            buttons.set(index, pressed);
            if previous != pressed {
                session.button_edge(index, pressed, buttons);
            }
        }
    }
}

/// Physical input lines of every pad, grouped by bias.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputLines {
    /// Active-low buttons, pulled up so an open switch reads high.
    pub pull_up: BTreeSet<u32>,
    /// Inverted lines, left without bias for external wiring.
    pub plain: BTreeSet<u32>,
}

/// Collects the lines `pads` read.
///
/// A line used both plain and inverted is pulled up.
#[must_use]
pub fn input_lines(pads: &[Pad]) -> InputLines {
    let mut lines = InputLines::default();
    for line in pads.iter().flat_map(Pad::used_lines) {
        if line.is_inverted() {
            lines.plain.insert(line.pin());
        } else {
            lines.pull_up.insert(line.pin());
        }
    }
    lines.plain.retain(|pin| !lines.pull_up.contains(pin));
    lines
}
