//! Built-in pad wirings.
//!
//! Logical order of every map:
//!
//! | Index | Button | Index | Button |
//! |-------|--------|-------|--------|
//! | 0 | Up | 11 | TL |
//! | 1 | Down | 12 | Hotkey |
//! | 2 | Left | 13 | TL2 |
//! | 3 | Right | 14 | TR2 |
//! | 4 | Start | 15 | C |
//! | 5 | Select | 16 | Z |
//! | 6 | A | 17 | Top |
//! | 7 | B | 18 | Top2 |
//! | 8 | TR | 19 | Base |
//! | 9 | Y | 20 | Base2 |
//! | 10 | X | | |

use serde::Deserialize;

use super::BUTTON_COUNT;

/// Pad wiring selected in the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Layout {
    /// First joystick on the early 26-pin header.
    Gpio,
    /// Second joystick on the B+ 40-pin header.
    GpioBplus,
    /// Joystick on the B+ header with a TFT hat attached.
    GpioTft,
    /// Wiring given explicitly as a signed line map.
    Custom,
}

#[rustfmt::skip]
const GPIO_MAP: [i32; BUTTON_COUNT] =
    [4, 17, 27, 22, 10, 9, 25, 24, 23, 18, 15, 14, 2, -1, -1, -1, -1, -1, -1, -1, -1];

#[rustfmt::skip]
const GPIO_BPLUS_MAP: [i32; BUTTON_COUNT] =
    [11, 5, 6, 13, 19, 26, 21, 20, 16, 12, 7, 8, 3, -1, -1, -1, -1, -1, -1, -1, -1];

#[rustfmt::skip]
const GPIO_TFT_MAP: [i32; BUTTON_COUNT] =
    [21, 13, 26, 19, 5, 6, 22, 4, 20, 17, 27, 16, 12, -1, -1, -1, -1, -1, -1, -1, -1];

impl Layout {
    /// Signed line map of a built-in layout, `None` for [`Layout::Custom`].
    #[must_use]
    pub fn builtin_map(&self) -> Option<&'static [i32; BUTTON_COUNT]> {
        match self {
            Layout::Gpio => Some(&GPIO_MAP),
            Layout::GpioBplus => Some(&GPIO_BPLUS_MAP),
            Layout::GpioTft => Some(&GPIO_TFT_MAP),
            Layout::Custom => None,
        }
    }

    /// Device name registered with the host.
    #[must_use]
    pub fn device_name(&self, pad_index: usize) -> String {
        match self {
            Layout::GpioBplus => "GPIO Controller 2".to_string(),
            Layout::Custom => format!("GPIO Controller {}", pad_index + 1),
            Layout::Gpio | Layout::GpioTft => "GPIO Controller 1".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::HOTKEY_INDEX;

    #[test]
    fn test_builtin_maps_have_hotkey() {
        for layout in [Layout::Gpio, Layout::GpioBplus, Layout::GpioTft] {
            let map = layout.builtin_map().unwrap();
            assert_ne!(map[HOTKEY_INDEX], -1, "{:?} should wire the hotkey", layout);
        }
    }

    #[test]
    fn test_builtin_maps_have_no_duplicate_pins() {
        for layout in [Layout::Gpio, Layout::GpioBplus, Layout::GpioTft] {
            let mut used: Vec<i32> = layout
                .builtin_map()
                .unwrap()
                .iter()
                .copied()
                .filter(|&id| id != -1)
                .collect();
            let total = used.len();
            used.sort_unstable();
            used.dedup();
            assert_eq!(used.len(), total, "{:?} reuses a pin", layout);
        }
    }

    #[test]
    fn test_custom_has_no_builtin_map() {
        assert!(Layout::Custom.builtin_map().is_none());
    }

    #[test]
    fn test_device_names() {
        assert_eq!(Layout::Gpio.device_name(0), "GPIO Controller 1");
        assert_eq!(Layout::GpioBplus.device_name(1), "GPIO Controller 2");
        assert_eq!(Layout::Custom.device_name(1), "GPIO Controller 2");
    }

    #[test]
    fn test_layout_names_deserialize() {
        #[derive(Deserialize)]
        struct Wrapper {
            layout: Layout,
        }

        let parsed: Wrapper = toml::from_str("layout = \"gpio-bplus\"").unwrap();
        assert_eq!(parsed.layout, Layout::GpioBplus);
    }
}
