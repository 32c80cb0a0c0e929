//! # Hotkey State Machine
//!
//! Turns the hotkey line plus every other button into a virtual hotkey
//! button and a single combo partner.
//!
//! In [`HotkeyMode::Toggle`](super::HotkeyMode::Toggle) the hotkey line is a
//! momentary control that only arms a combo window:
//!
//! 1. Pressing the hotkey arms the window. Nothing is reported yet.
//! 2. The next button pressed becomes the combo partner and the virtual
//!    hotkey is reported pressed together with it.
//! 3. Releasing the partner releases the virtual hotkey and disarms.
//!
//! Pressing the hotkey a second time while armed makes the hotkey line its
//! own partner, so a double tap reports a plain hotkey press.
//!
//! ```text
//!   hotkey ↓        button 5 ↓          button 5 ↑
//! idle ──────► armed ──────────► combo(5) ─────────► idle
//!                │ hotkey ↓         virtual=1         virtual=0
//!                ▼
//!            combo(hotkey) ── hotkey ↑ ──► idle
//!              virtual=1                  virtual=0
//! ```

use super::{ButtonBuffer, HOTKEY_INDEX};

/// Per-pad gesture state kept across ticks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HotkeySession {
    /// Last polarity-corrected hotkey level, `None` before the first read.
    previous_level: Option<bool>,
    /// A hotkey press is waiting for its partner.
    armed: bool,
    /// Index of the button holding the virtual hotkey down.
    combo: Option<usize>,
}

impl HotkeySession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    #[must_use]
    pub fn combo_button(&self) -> Option<usize> {
        self.combo
    }

    /// Feeds the current hotkey level. Only transitions have an effect.
    pub fn hotkey_level(&mut self, pressed: bool, buttons: &mut ButtonBuffer) {
        if self.previous_level == Some(pressed) {
            return;
        }
        self.previous_level = Some(pressed);

        if pressed {
            if self.armed && !buttons.is_pressed(HOTKEY_INDEX) {
                buttons.set(HOTKEY_INDEX, true);
                self.combo = Some(HOTKEY_INDEX);
            } else {
                self.armed = true;
                self.combo = None;
            }
        } else if self.combo == Some(HOTKEY_INDEX) {
            self.finish(buttons);
        }
    }

    /// Feeds a state change of any other button.
    pub fn button_edge(&mut self, index: usize, pressed: bool, buttons: &mut ButtonBuffer) {
        if !self.armed {
            return;
        }

        if pressed {
            buttons.set(HOTKEY_INDEX, true);
            self.combo = Some(index);
        } else if self.combo == Some(index) {
            self.finish(buttons);
        }
    }

    fn finish(&mut self, buttons: &mut ButtonBuffer) {
        buttons.set(HOTKEY_INDEX, false);
        self.armed = false;
        self.combo = None;
    }
}
