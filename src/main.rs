//! # Arcade Joystick
//!
//! Turns arcade buttons wired to the GPIO header into Linux gamepads, with
//! optional analog sticks on I2C converters and rumble motors driven from
//! GPIO or a PCA9633.
//!
//! ```bash
//! arcade-joystick config/default.toml
//! ```

use anyhow::{Context, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use arcade_joystick::analog::{Ads1015Bank, AnalogParams, Axis, Mcp3021Bank};
use arcade_joystick::bus::linux::{open_i2c, CdevInputs, CdevOutputs, UinputSink};
use arcade_joystick::bus::{AdcBank, InputSink, PwmBus};
use arcade_joystick::config::{AnalogConfig, Config, Converter};
use arcade_joystick::engine::{Engine, Hardware};
use arcade_joystick::ffb::Pca9633;
use arcade_joystick::pad::input_lines;

/// Configuration used when no path is given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Log file prefix inside `[engine] log_dir`
const LOG_FILE_PREFIX: &str = "arcade-joystick.log";

/// Main entry point
///
/// # Control Flow
///
/// 1. Load the configuration and set up logging
/// 2. Open the GPIO lines (button lines pulled up), I2C chips and one uinput
///    device per pad, offering rumble when a motor is wired
/// 3. Start sampling and wait for Ctrl+C
/// 4. Stop sampling, rest every rumble output and log the measured stick travel
///
/// # Errors
///
/// Returns error if the configuration is invalid or any device cannot be
/// opened or probed.
#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    // Keep the guard alive so buffered log lines are flushed on exit
    let _log_guard = init_logging(&config);

    info!("Arcade Joystick v{} starting...", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from {}", config_path);

    let hardware = open_hardware(&config)?;
    let engine = Engine::build(&config, hardware).context("Failed to build engine")?;

    engine.start().await;
    info!("Press Ctrl+C to exit");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Received Ctrl+C, shutting down...");

    let reports = engine.shutdown().await;
    info!("Shutdown complete, {} analog axes reported", reports.len());

    Ok(())
}

/// Installs the stdout subscriber, plus a daily rolling file when
/// `[engine] log_dir` is set.
fn init_logging(config: &Config) -> Option<WorkerGuard> {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    let (file_layer, guard) = match &config.engine.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    guard
}

/// Opens every device the configuration names.
fn open_hardware(config: &Config) -> Result<Hardware> {
    let pads = config.build_pads()?;
    let wiring = config.ffb_wiring();

    let gpio = CdevInputs::open(&config.gpio.chip, &input_lines(&pads))?;
    let outputs = CdevOutputs::open(&config.gpio.chip, &wiring.gpio_outputs())?;

    let (adc, analog) = match &config.analog {
        Some(analog) => (open_adc(analog)?, axis_params(analog)),
        None => (None, Vec::new()),
    };

    let pwm_outputs = wiring.pwm_outputs();
    let pwm_config = config.force_feedback.as_ref().and_then(|ffb| ffb.pwm.as_ref());
    let pwm = match (&config.analog, pwm_config) {
        (Some(analog), Some(pwm_config)) if !pwm_outputs.is_empty() => {
            let chip = Pca9633::bring_up(open_i2c(&analog.bus)?, pwm_config.address, &pwm_outputs)
                .context("PCA9633 bring-up failed")?;
            Some(Box::new(chip) as Box<dyn PwmBus>)
        }
        _ => None,
    };

    // Host rumble requests are routed into the actuator by the sampling task
    let rumble = wiring.strong.is_wired() || wiring.weak.is_wired();
    let sinks = pads
        .iter()
        .map(|pad| {
            UinputSink::register(pad, &analog, rumble).map(|sink| Box::new(sink) as Box<dyn InputSink>)
        })
        .collect::<arcade_joystick::error::Result<Vec<_>>>()?;

    Ok(Hardware {
        gpio: Box::new(gpio),
        outputs: Box::new(outputs),
        adc,
        pwm,
        sinks,
    })
}

fn axis_params(analog: &AnalogConfig) -> Vec<(Axis, AnalogParams)> {
    analog
        .axes()
        .into_iter()
        .map(|(axis, config)| (axis, config.params(axis)))
        .collect()
}

/// Opens the configured converter, `None` when no axis is enabled.
fn open_adc(analog: &AnalogConfig) -> Result<Option<Box<dyn AdcBank>>> {
    let axes = analog.axes();
    if axes.is_empty() {
        return Ok(None);
    }

    let i2c = open_i2c(&analog.bus)?;
    let bank: Box<dyn AdcBank> = match analog.converter {
        Converter::Mcp3021 => {
            let mut bank = Mcp3021Bank::new(i2c);
            for (axis, config) in axes {
                if let Some(address) = config.address {
                    bank = bank.with_axis(axis, address);
                }
            }
            Box::new(bank)
        }
        Converter::Ads1015 => {
            let mut bank = Ads1015Bank::new(i2c, linux_embedded_hal::Delay, analog.ads1015_address);
            for (axis, config) in axes {
                if let Some(input) = config.input {
                    bank = bank.with_axis(axis, input)?;
                }
            }
            Box::new(bank)
        }
    };

    info!("{:?} converter on {}", analog.converter, analog.bus);
    Ok(Some(bank))
}
