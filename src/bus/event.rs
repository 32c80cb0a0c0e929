//! Input event codes reported to the host input subsystem.

use std::fmt;

/// Absolute axes a pad can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbsAxis {
    X,
    Y,
    RX,
    RY,
    Hat0X,
    Hat0Y,
}

impl fmt::Display for AbsAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AbsAxis::X => "ABS_X",
            AbsAxis::Y => "ABS_Y",
            AbsAxis::RX => "ABS_RX",
            AbsAxis::RY => "ABS_RY",
            AbsAxis::Hat0X => "ABS_HAT0X",
            AbsAxis::Hat0Y => "ABS_HAT0Y",
        };
        f.write_str(name)
    }
}

/// Key codes for the non-directional logical buttons (indices 4..21).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    Start,
    Select,
    A,
    B,
    TR,
    Y,
    X,
    TL,
    Mode,
    TL2,
    TR2,
    C,
    Z,
    Top,
    Top2,
    Base,
    Base2,
}

impl Button {
    /// Key codes in logical index order, starting at logical index 4.
    pub const ORDER: [Button; 17] = [
        Button::Start,
        Button::Select,
        Button::A,
        Button::B,
        Button::TR,
        Button::Y,
        Button::X,
        Button::TL,
        Button::Mode,
        Button::TL2,
        Button::TR2,
        Button::C,
        Button::Z,
        Button::Top,
        Button::Top2,
        Button::Base,
        Button::Base2,
    ];

    /// Key code reported for a logical button index, `None` for the four
    /// directional indices and anything out of range.
    #[must_use]
    pub fn for_index(index: usize) -> Option<Button> {
        index.checked_sub(4).and_then(|i| Self::ORDER.get(i).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directional_indices_have_no_key() {
        for index in 0..4 {
            assert_eq!(Button::for_index(index), None);
        }
    }

    #[test]
    fn test_hotkey_index_reports_mode() {
        assert_eq!(Button::for_index(12), Some(Button::Mode));
    }

    #[test]
    fn test_last_index_is_base2() {
        assert_eq!(Button::for_index(20), Some(Button::Base2));
        assert_eq!(Button::for_index(21), None);
    }

    #[test]
    fn test_axis_display() {
        assert_eq!(AbsAxis::Hat0X.to_string(), "ABS_HAT0X");
        assert_eq!(AbsAxis::RY.to_string(), "ABS_RY");
    }
}
