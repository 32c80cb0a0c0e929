//! I2C analog converter drivers.
//!
//! Both drivers are generic over [`embedded_hal::i2c::I2c`], so they run on
//! `/dev/i2c-N` through `linux-embedded-hal` and on a fake bus in tests.
//!
//! - **MCP3021**: one chip per axis. A sample is a two-byte big-endian read
//!   of register 0.
//! - **ADS1015**: one chip, axes multiplexed onto AIN0..AIN3. Every sample
//!   starts a single-shot conversion and waits for it to finish.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use super::Axis;
use crate::bus::AdcBank;
use crate::error::{ArcadeError, Result};

/// Largest valid 12-bit sample.
const SAMPLE_MAX: u16 = 0x0FFF;

const ADS1015_REG_CONVERSION: u8 = 0x00;
const ADS1015_REG_CONFIG: u8 = 0x01;

/// Single shot, ±4.096 V full scale, 3300 samples/s, comparator off.
const ADS1015_CONFIG: u16 = 0x83E3;

/// Input multiplexer bits for AIN0..AIN3 against ground.
const ADS1015_MUX: [u16; 4] = [0x4000, 0x5000, 0x6000, 0x7000];

/// Worst-case conversion time is 390 µs at 3300 SPS.
const ADS1015_CONVERSION_US: u32 = 450;

fn bus_error<E: std::fmt::Debug>(axis: Axis, address: u8, err: E) -> ArcadeError {
    ArcadeError::Bus(format!("{} read at 0x{:02X} failed: {:?}", axis, address, err))
}

/// One MCP3021 per axis.
pub struct Mcp3021Bank<I2C> {
    i2c: I2C,
    addresses: [Option<u8>; 4],
}

impl<I2C: I2c> Mcp3021Bank<I2C> {
    #[must_use]
    pub fn new(i2c: I2C) -> Self {
        Self {
            i2c,
            addresses: [None; 4],
        }
    }

    /// Assigns the chip address sampling `axis`.
    #[must_use]
    pub fn with_axis(mut self, axis: Axis, address: u8) -> Self {
        self.addresses[axis.index()] = Some(address);
        self
    }
}

impl<I2C> AdcBank for Mcp3021Bank<I2C>
where
    I2C: I2c + Send,
{
    fn sample(&mut self, axis: Axis) -> Result<u16> {
        let address = self.addresses[axis.index()]
            .ok_or_else(|| ArcadeError::Bus(format!("{} has no MCP3021 assigned", axis)))?;

        let mut word = [0u8; 2];
        self.i2c
            .write_read(address, &[0x00], &mut word)
            .map_err(|e| bus_error(axis, address, e))?;

        let value = u16::from_be_bytes(word);
        if value > SAMPLE_MAX {
            return Err(ArcadeError::Bus(format!(
                "{} sample 0x{:04X} out of range",
                axis, value
            )));
        }
        Ok(value)
    }
}

/// One ADS1015 shared by every axis.
pub struct Ads1015Bank<I2C, D> {
    i2c: I2C,
    delay: D,
    address: u8,
    inputs: [Option<u8>; 4],
}

impl<I2C: I2c, D: DelayNs> Ads1015Bank<I2C, D> {
    #[must_use]
    pub fn new(i2c: I2C, delay: D, address: u8) -> Self {
        Self {
            i2c,
            delay,
            address,
            inputs: [None; 4],
        }
    }

    /// Routes `axis` to analog input `input` (0..=3).
    ///
    /// # Errors
    ///
    /// Returns a bus error for an input outside 0..=3.
    pub fn with_axis(mut self, axis: Axis, input: u8) -> Result<Self> {
        if usize::from(input) >= ADS1015_MUX.len() {
            return Err(ArcadeError::Bus(format!(
                "ADS1015 has no input AIN{} for {}",
                input, axis
            )));
        }
        self.inputs[axis.index()] = Some(input);
        Ok(self)
    }
}

impl<I2C, D> AdcBank for Ads1015Bank<I2C, D>
where
    I2C: I2c + Send,
    D: DelayNs + Send,
{
    fn sample(&mut self, axis: Axis) -> Result<u16> {
        let input = self.inputs[axis.index()]
            .ok_or_else(|| ArcadeError::Bus(format!("{} is not routed to the ADS1015", axis)))?;
        let address = self.address;

        let config = (ADS1015_CONFIG | ADS1015_MUX[usize::from(input)]).to_be_bytes();
        self.i2c
            .write(address, &[ADS1015_REG_CONFIG, config[0], config[1]])
            .map_err(|e| bus_error(axis, address, e))?;

        self.delay.delay_us(ADS1015_CONVERSION_US);

        let mut word = [0u8; 2];
        self.i2c
            .write_read(address, &[ADS1015_REG_CONVERSION], &mut word)
            .map_err(|e| bus_error(axis, address, e))?;

        let raw = i16::from_be_bytes(word);
        if raw < 0 {
            return Err(ArcadeError::Bus(format!(
                "{} conversion returned negative value {}",
                axis, raw
            )));
        }
        Ok((raw >> 4) as u16)
    }
}
