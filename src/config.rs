//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::analog::{AnalogParams, Axis};
use crate::error::{ArcadeError, Result};
use crate::ffb::{FfbWiring, MotorWiring, OutputId};
use crate::pad::{HotkeyMode, Layout, Pad};

/// Highest GPIO line on the 40-pin header SoC.
const MAX_GPIO_LINE: u32 = 53;

/// Valid 7-bit I2C device addresses.
const I2C_ADDRESSES: std::ops::RangeInclusive<u8> = 0x03..=0x77;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub gpio: GpioConfig,

    pub pads: Vec<PadConfig>,

    #[serde(default)]
    pub analog: Option<AnalogConfig>,

    #[serde(default)]
    pub force_feedback: Option<ForceFeedbackConfig>,
}

/// Sampling loop configuration
#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    #[serde(default = "default_refresh_ms")]
    pub refresh_ms: u64,

    /// Directory for daily rolling log files, stdout only when unset
    #[serde(default)]
    pub log_dir: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            refresh_ms: default_refresh_ms(),
            log_dir: None,
        }
    }
}

/// GPIO character device configuration
#[derive(Debug, Deserialize, Clone)]
pub struct GpioConfig {
    #[serde(default = "default_gpio_chip")]
    pub chip: String,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            chip: default_gpio_chip(),
        }
    }
}

/// One controller
#[derive(Debug, Deserialize, Clone)]
pub struct PadConfig {
    pub layout: Layout,

    /// Signed line ids, required for the custom layout only
    #[serde(default)]
    pub map: Option<Vec<i32>>,

    #[serde(default)]
    pub hotkey_mode: HotkeyMode,
}

/// Analog converter type
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Converter {
    /// One MCP3021 per axis
    Mcp3021,
    /// One ADS1015 for all axes
    Ads1015,
}

/// Analog sticks configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AnalogConfig {
    /// I2C bus device, also used by the PWM chip
    pub bus: String,

    #[serde(default = "default_converter")]
    pub converter: Converter,

    #[serde(default = "default_ads1015_address")]
    pub ads1015_address: u8,

    #[serde(default)]
    pub auto_center: bool,

    #[serde(default)]
    pub x1: Option<AxisConfig>,

    #[serde(default)]
    pub y1: Option<AxisConfig>,

    #[serde(default)]
    pub x2: Option<AxisConfig>,

    #[serde(default)]
    pub y2: Option<AxisConfig>,
}

impl AnalogConfig {
    /// Configured axes in [`Axis::ALL`] order.
    #[must_use]
    pub fn axes(&self) -> Vec<(Axis, &AxisConfig)> {
        Axis::ALL
            .into_iter()
            .zip([&self.x1, &self.y1, &self.x2, &self.y2])
            .filter_map(|(axis, config)| config.as_ref().map(|c| (axis, c)))
            .collect()
    }
}

/// One analog axis
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AxisConfig {
    /// MCP3021 address
    #[serde(default)]
    pub address: Option<u8>,

    /// ADS1015 analog input
    #[serde(default)]
    pub input: Option<u8>,

    #[serde(default)]
    pub reverse: bool,

    #[serde(default)]
    pub min: Option<u16>,

    #[serde(default)]
    pub max: Option<u16>,

    #[serde(default)]
    pub fuzz: Option<u16>,

    #[serde(default)]
    pub flat: Option<u16>,
}

impl AxisConfig {
    /// Calibration range, unset values taken from the axis defaults.
    #[must_use]
    pub fn params(&self, axis: Axis) -> AnalogParams {
        let defaults = axis.default_params();
        AnalogParams {
            min: self.min.unwrap_or(defaults.min),
            max: self.max.unwrap_or(defaults.max),
            fuzz: self.fuzz.unwrap_or(defaults.fuzz),
            flat: self.flat.unwrap_or(defaults.flat),
        }
    }
}

/// Rumble motor wiring, negative ids select reverse logic
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ForceFeedbackConfig {
    #[serde(default)]
    pub strong_pin: Option<i32>,

    #[serde(default)]
    pub weak_pin: Option<i32>,

    #[serde(default)]
    pub direction_pin: Option<i32>,

    #[serde(default)]
    pub pwm: Option<PwmConfig>,
}

impl ForceFeedbackConfig {
    #[must_use]
    pub fn wiring(&self) -> FfbWiring {
        let pwm = self.pwm.as_ref();
        FfbWiring {
            strong: MotorWiring {
                gpio: self.strong_pin.map(OutputId::from_signed),
                pwm: pwm.and_then(|p| p.strong_output).map(OutputId::from_signed),
            },
            weak: MotorWiring {
                gpio: self.weak_pin.map(OutputId::from_signed),
                pwm: pwm.and_then(|p| p.weak_output).map(OutputId::from_signed),
            },
            direction: self.direction_pin.map(OutputId::from_signed),
        }
    }
}

/// PCA9633 outputs
#[derive(Debug, Deserialize, Clone)]
pub struct PwmConfig {
    #[serde(default = "default_pca9633_address")]
    pub address: u8,

    #[serde(default)]
    pub strong_output: Option<i32>,

    #[serde(default)]
    pub weak_output: Option<i32>,
}

// Default value functions
fn default_refresh_ms() -> u64 { 10 }
fn default_gpio_chip() -> String { "/dev/gpiochip0".to_string() }
fn default_converter() -> Converter { Converter::Mcp3021 }
fn default_ads1015_address() -> u8 { 0x48 }
fn default_pca9633_address() -> u8 { 0x62 }

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use arcade_joystick::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Tick period of the sampling loop.
    #[must_use]
    pub fn refresh_period(&self) -> Duration {
        Duration::from_millis(self.engine.refresh_ms)
    }

    /// Builds every configured pad.
    ///
    /// # Errors
    ///
    /// Returns error if a pad map is missing or malformed
    pub fn build_pads(&self) -> Result<Vec<Pad>> {
        self.pads
            .iter()
            .enumerate()
            .map(|(index, pad)| Pad::new(index, pad.layout, pad.map.as_deref(), pad.hotkey_mode))
            .collect()
    }

    /// Force feedback wiring, empty when the section is absent.
    #[must_use]
    pub fn ffb_wiring(&self) -> FfbWiring {
        self.force_feedback
            .as_ref()
            .map(ForceFeedbackConfig::wiring)
            .unwrap_or_default()
    }

    /// Validate configuration values
    ///
    /// # Returns
    ///
    /// * `Result<()>` - Ok if valid, Err if invalid
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        // Validate engine configuration
        if self.engine.refresh_ms == 0 || self.engine.refresh_ms > 1000 {
            return Err(ArcadeError::Config(
                toml::de::Error::custom("refresh_ms must be between 1 and 1000")
            ));
        }

        if matches!(&self.engine.log_dir, Some(dir) if dir.is_empty()) {
            return Err(ArcadeError::Config(
                toml::de::Error::custom("log_dir cannot be empty when set")
            ));
        }

        if self.gpio.chip.is_empty() {
            return Err(ArcadeError::Config(
                toml::de::Error::custom("gpio chip cannot be empty")
            ));
        }

        // Validate pads
        if self.pads.is_empty() || self.pads.len() > 2 {
            return Err(ArcadeError::Config(
                toml::de::Error::custom("between 1 and 2 pads must be configured")
            ));
        }

        for (index, pad) in self.build_pads()?.iter().enumerate() {
            if let Some(line) = pad.used_lines().find(|line| line.pin() > MAX_GPIO_LINE) {
                return Err(ArcadeError::Config(
                    toml::de::Error::custom(format!("pad {} uses {} which is out of range (0-{})", index, line, MAX_GPIO_LINE))
                ));
            }
        }

        if let Some(analog) = &self.analog {
            self.validate_analog(analog)?;
        }

        if let Some(ffb) = &self.force_feedback {
            self.validate_force_feedback(ffb)?;
        }

        Ok(())
    }

    fn validate_analog(&self, analog: &AnalogConfig) -> Result<()> {
        if analog.bus.is_empty() {
            return Err(ArcadeError::Config(
                toml::de::Error::custom("analog bus cannot be empty")
            ));
        }

        if analog.converter == Converter::Ads1015 && !I2C_ADDRESSES.contains(&analog.ads1015_address) {
            return Err(ArcadeError::Config(
                toml::de::Error::custom("ads1015_address must be between 0x03 and 0x77")
            ));
        }

        for (axis, config) in analog.axes() {
            let params = config.params(axis);
            if params.min >= params.max {
                return Err(ArcadeError::Config(
                    toml::de::Error::custom(format!("{} min must be less than max", axis))
                ));
            }

            if params.max > 0x0FFF {
                return Err(ArcadeError::Config(
                    toml::de::Error::custom(format!("{} max must fit in 12 bits (0-4095)", axis))
                ));
            }

            match analog.converter {
                Converter::Mcp3021 => match config.address {
                    Some(address) if I2C_ADDRESSES.contains(&address) => {}
                    Some(_) => {
                        return Err(ArcadeError::Config(
                            toml::de::Error::custom(format!("{} address must be between 0x03 and 0x77", axis))
                        ));
                    }
                    None => {
                        return Err(ArcadeError::Config(
                            toml::de::Error::custom(format!("{} needs an MCP3021 address", axis))
                        ));
                    }
                },
                Converter::Ads1015 => match config.input {
                    Some(input) if input <= 3 => {}
                    Some(_) => {
                        return Err(ArcadeError::Config(
                            toml::de::Error::custom(format!("{} input must be between 0 and 3", axis))
                        ));
                    }
                    None => {
                        return Err(ArcadeError::Config(
                            toml::de::Error::custom(format!("{} needs an ADS1015 input", axis))
                        ));
                    }
                },
            }
        }

        Ok(())
    }

    fn validate_force_feedback(&self, ffb: &ForceFeedbackConfig) -> Result<()> {
        for (name, pin) in [
            ("strong_pin", ffb.strong_pin),
            ("weak_pin", ffb.weak_pin),
            ("direction_pin", ffb.direction_pin),
        ] {
            if let Some(pin) = pin {
                if pin.unsigned_abs() > MAX_GPIO_LINE {
                    return Err(ArcadeError::Config(
                        toml::de::Error::custom(format!("{} must be between -{} and {}", name, MAX_GPIO_LINE, MAX_GPIO_LINE))
                    ));
                }
            }
        }

        if let Some(pwm) = &ffb.pwm {
            if self.analog.is_none() {
                return Err(ArcadeError::Config(
                    toml::de::Error::custom("force_feedback.pwm requires [analog] bus to be set")
                ));
            }

            if !I2C_ADDRESSES.contains(&pwm.address) {
                return Err(ArcadeError::Config(
                    toml::de::Error::custom("pwm address must be between 0x03 and 0x77")
                ));
            }

            for (name, output) in [("strong_output", pwm.strong_output), ("weak_output", pwm.weak_output)] {
                if let Some(output) = output {
                    if output.unsigned_abs() > 3 {
                        return Err(ArcadeError::Config(
                            toml::de::Error::custom(format!("{} must be between -3 and 3", name))
                        ));
                    }
                }
            }
        }

        let wiring = ffb.wiring();
        if !wiring.strong.is_wired() && !wiring.weak.is_wired() && wiring.direction.is_some() {
            return Err(ArcadeError::Config(
                toml::de::Error::custom("direction_pin requires a strong or weak motor output")
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pad::UNUSED_LINE;

    fn create_valid_config() -> Config {
        Config {
            engine: EngineConfig::default(),
            gpio: GpioConfig::default(),
            pads: vec![PadConfig {
                layout: Layout::Gpio,
                map: None,
                hotkey_mode: HotkeyMode::Toggle,
            }],
            analog: None,
            force_feedback: None,
        }
    }

    fn analog_config() -> AnalogConfig {
        AnalogConfig {
            bus: "/dev/i2c-1".to_string(),
            converter: Converter::Mcp3021,
            ads1015_address: default_ads1015_address(),
            auto_center: false,
            x1: Some(AxisConfig {
                address: Some(0x4D),
                ..AxisConfig::default()
            }),
            y1: None,
            x2: None,
            y2: None,
        }
    }

    fn custom_map() -> Vec<i32> {
        let mut map = vec![UNUSED_LINE; 21];
        map[0] = 4;
        map[12] = -2;
        map
    }

    #[test]
    fn test_default_config() {
        let config = create_valid_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.refresh_period(), Duration::from_millis(10));
        assert_eq!(config.gpio.chip, "/dev/gpiochip0");
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[engine]
refresh_ms = 5

[[pads]]
layout = "gpio"

[[pads]]
layout = "custom"
hotkey_mode = "normal"
map = [4, 17, 27, 22, 10, 9, 25, 24, 23, 18, 15, 14, -2, -1, -1, -1, -1, -1, -1, -1, -1]

[analog]
bus = "/dev/i2c-1"
converter = "ads1015"
auto_center = true

[analog.x1]
input = 0

[analog.y1]
input = 1
reverse = true
min = 500
max = 3500

[force_feedback]
strong_pin = 5
direction_pin = -13

[force_feedback.pwm]
address = 0x62
weak_output = -1
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.refresh_period(), Duration::from_millis(5));
        assert_eq!(config.pads.len(), 2);
        assert_eq!(config.pads[0].hotkey_mode, HotkeyMode::Toggle);
        assert_eq!(config.pads[1].hotkey_mode, HotkeyMode::Normal);

        let analog = config.analog.as_ref().unwrap();
        assert_eq!(analog.converter, Converter::Ads1015);
        assert_eq!(analog.ads1015_address, 0x48);
        let axes = analog.axes();
        assert_eq!(axes.len(), 2);
        assert_eq!(axes[1].0, Axis::Y1);
        assert!(axes[1].1.reverse);
        assert_eq!(
            axes[1].1.params(Axis::Y1),
            AnalogParams { min: 500, max: 3500, fuzz: 16, flat: 384 }
        );

        let wiring = config.ffb_wiring();
        assert_eq!(wiring.strong.gpio, Some(OutputId { id: 5, reverse: false }));
        assert_eq!(wiring.weak.pwm, Some(OutputId { id: 1, reverse: true }));
        assert_eq!(wiring.direction, Some(OutputId { id: 13, reverse: true }));
    }

    #[test]
    fn test_load_shipped_default_config() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/default.toml");
        let config = Config::load(path).unwrap();

        assert_eq!(config.refresh_period(), Duration::from_millis(10));
        assert_eq!(config.gpio.chip, "/dev/gpiochip0");
        assert_eq!(config.engine.log_dir, None);
        assert_eq!(config.pads.len(), 1);
        assert_eq!(config.pads[0].layout, Layout::Gpio);
        assert_eq!(config.pads[0].hotkey_mode, HotkeyMode::Toggle);
        assert!(config.analog.is_none());
        assert!(config.force_feedback.is_none());
        assert_eq!(config.build_pads().unwrap().len(), 1);
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("/nonexistent/arcade.toml");
        assert!(matches!(result, Err(ArcadeError::Io(_))));
    }

    #[test]
    fn test_load_malformed_toml() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[[pads]]\nlayout = \"snes\"\n").unwrap();
        temp_file.flush().unwrap();

        let result = Config::load(temp_file.path());
        assert!(matches!(result, Err(ArcadeError::Config(_))));
    }

    // ==================== Engine Validation Tests ====================

    #[test]
    fn test_refresh_ms_zero() {
        let mut config = create_valid_config();
        config.engine.refresh_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_refresh_ms_too_high() {
        let mut config = create_valid_config();
        config.engine.refresh_ms = 1001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_log_dir() {
        let mut config = create_valid_config();
        config.engine.log_dir = Some(String::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_gpio_chip() {
        let mut config = create_valid_config();
        config.gpio.chip = String::new();
        assert!(config.validate().is_err());
    }

    // ==================== Pad Validation Tests ====================

    #[test]
    fn test_no_pads() {
        let mut config = create_valid_config();
        config.pads.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_three_pads() {
        let mut config = create_valid_config();
        let pad = config.pads[0].clone();
        config.pads.push(pad.clone());
        config.pads.push(pad);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_custom_pad_without_map() {
        let mut config = create_valid_config();
        config.pads[0].layout = Layout::Custom;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_custom_pad_with_map() {
        let mut config = create_valid_config();
        config.pads[0].layout = Layout::Custom;
        config.pads[0].map = Some(custom_map());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_custom_map_wrong_length() {
        let mut config = create_valid_config();
        config.pads[0].layout = Layout::Custom;
        config.pads[0].map = Some(vec![4, 17, 27]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_custom_map_line_out_of_range() {
        let mut config = create_valid_config();
        let mut map = custom_map();
        map[5] = 54;
        config.pads[0].layout = Layout::Custom;
        config.pads[0].map = Some(map);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builtin_layout_with_map() {
        let mut config = create_valid_config();
        config.pads[0].map = Some(custom_map());
        assert!(config.validate().is_err());
    }

    // ==================== Analog Validation Tests ====================

    #[test]
    fn test_valid_analog() {
        let mut config = create_valid_config();
        config.analog = Some(analog_config());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_axis_defaults_follow_axis() {
        let axis = AxisConfig::default();
        assert_eq!(axis.params(Axis::X2), AnalogParams::X_DEFAULT);
        assert_eq!(axis.params(Axis::Y2), AnalogParams::Y_DEFAULT);
    }

    #[test]
    fn test_analog_min_not_below_max() {
        let mut config = create_valid_config();
        let mut analog = analog_config();
        if let Some(x1) = analog.x1.as_mut() {
            x1.min = Some(3000);
            x1.max = Some(3000);
        }
        config.analog = Some(analog);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_analog_max_over_twelve_bits() {
        let mut config = create_valid_config();
        let mut analog = analog_config();
        if let Some(x1) = analog.x1.as_mut() {
            x1.max = Some(4096);
        }
        config.analog = Some(analog);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mcp3021_axis_needs_address() {
        let mut config = create_valid_config();
        let mut analog = analog_config();
        analog.y1 = Some(AxisConfig::default());
        config.analog = Some(analog);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mcp3021_address_out_of_range() {
        let mut config = create_valid_config();
        let mut analog = analog_config();
        analog.x1 = Some(AxisConfig {
            address: Some(0x78),
            ..AxisConfig::default()
        });
        config.analog = Some(analog);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ads1015_axis_needs_input() {
        let mut config = create_valid_config();
        let mut analog = analog_config();
        analog.converter = Converter::Ads1015;
        config.analog = Some(analog);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ads1015_input_out_of_range() {
        let mut config = create_valid_config();
        let mut analog = analog_config();
        analog.converter = Converter::Ads1015;
        analog.x1 = Some(AxisConfig {
            input: Some(4),
            ..AxisConfig::default()
        });
        config.analog = Some(analog);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_analog_bus() {
        let mut config = create_valid_config();
        let mut analog = analog_config();
        analog.bus = String::new();
        config.analog = Some(analog);
        assert!(config.validate().is_err());
    }

    // ==================== Force Feedback Validation Tests ====================

    #[test]
    fn test_gpio_force_feedback() {
        let mut config = create_valid_config();
        config.force_feedback = Some(ForceFeedbackConfig {
            strong_pin: Some(5),
            weak_pin: Some(-6),
            ..ForceFeedbackConfig::default()
        });
        assert!(config.validate().is_ok());
        assert_eq!(config.ffb_wiring().weak.gpio, Some(OutputId { id: 6, reverse: true }));
    }

    #[test]
    fn test_no_force_feedback_is_empty_wiring() {
        let config = create_valid_config();
        assert_eq!(config.ffb_wiring(), FfbWiring::default());
    }

    #[test]
    fn test_force_feedback_pin_out_of_range() {
        let mut config = create_valid_config();
        config.force_feedback = Some(ForceFeedbackConfig {
            strong_pin: Some(-54),
            ..ForceFeedbackConfig::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_direction_without_motor() {
        let mut config = create_valid_config();
        config.force_feedback = Some(ForceFeedbackConfig {
            direction_pin: Some(13),
            ..ForceFeedbackConfig::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pwm_requires_analog_bus() {
        let mut config = create_valid_config();
        config.force_feedback = Some(ForceFeedbackConfig {
            pwm: Some(PwmConfig {
                address: default_pca9633_address(),
                strong_output: Some(0),
                weak_output: None,
            }),
            ..ForceFeedbackConfig::default()
        });
        assert!(config.validate().is_err());

        config.analog = Some(analog_config());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_pwm_output_out_of_range() {
        let mut config = create_valid_config();
        config.analog = Some(analog_config());
        config.force_feedback = Some(ForceFeedbackConfig {
            pwm: Some(PwmConfig {
                address: default_pca9633_address(),
                strong_output: Some(-4),
                weak_output: None,
            }),
            ..ForceFeedbackConfig::default()
        });
        assert!(config.validate().is_err());
    }
}
