//! # Analog Module
//!
//! Up to four stick axes sampled through an external converter.
//!
//! This module handles:
//! - The calibration curve ([`calibration`])
//! - MCP3021 and ADS1015 converter drivers ([`adc`])
//! - Per-axis session state: bring-up offset and observed travel

pub mod adc;
pub mod calibration;

use std::fmt;

use tracing::info;

use crate::bus::{AbsAxis, AdcBank};
use crate::error::{ArcadeError, Result};

pub use adc::{Ads1015Bank, Mcp3021Bank};
pub use calibration::calibrate;

/// An analog stick axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X1,
    Y1,
    X2,
    Y2,
}

impl Axis {
    pub const ALL: [Axis; 4] = [Axis::X1, Axis::Y1, Axis::X2, Axis::Y2];

    /// Position in [`Axis::ALL`].
    #[must_use]
    pub fn index(&self) -> usize {
        match self {
            Axis::X1 => 0,
            Axis::Y1 => 1,
            Axis::X2 => 2,
            Axis::Y2 => 3,
        }
    }

    /// Host axis the calibrated value is reported on.
    #[must_use]
    pub fn report_axis(&self) -> AbsAxis {
        match self {
            Axis::X1 => AbsAxis::X,
            Axis::Y1 => AbsAxis::Y,
            Axis::X2 => AbsAxis::RX,
            Axis::Y2 => AbsAxis::RY,
        }
    }

    /// Factory calibration for this axis.
    #[must_use]
    pub fn default_params(&self) -> AnalogParams {
        match self {
            Axis::X1 | Axis::X2 => AnalogParams::X_DEFAULT,
            Axis::Y1 | Axis::Y2 => AnalogParams::Y_DEFAULT,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Axis::X1 => "X1",
            Axis::Y1 => "Y1",
            Axis::X2 => "X2",
            Axis::Y2 => "Y2",
        };
        f.write_str(name)
    }
}

/// Calibration range of one axis, in native converter units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalogParams {
    pub min: u16,
    pub max: u16,
    /// Host-side noise filter, passed through to the device registration.
    pub fuzz: u16,
    /// Deadzone half-width.
    pub flat: u16,
}

impl AnalogParams {
    pub const X_DEFAULT: AnalogParams = AnalogParams {
        min: 374,
        max: 3418,
        fuzz: 16,
        flat: 384,
    };

    pub const Y_DEFAULT: AnalogParams = AnalogParams {
        min: 517,
        max: 3378,
        fuzz: 16,
        flat: 384,
    };
}

/// One enabled axis for the lifetime of the engine.
#[derive(Debug, Clone)]
pub struct AnalogChannel {
    axis: Axis,
    reverse: bool,
    params: AnalogParams,
    center_offset: i32,
    /// Widest oriented samples seen so far, diagnostics only.
    observed: Option<(i32, i32)>,
}

impl AnalogChannel {
    /// Probes the axis once and derives its center offset.
    ///
    /// With `auto_center` the offset is latched from this first sample,
    /// otherwise it is computed from `params`.
    ///
    /// # Errors
    ///
    /// Returns [`ArcadeError::AnalogProbe`] if the converter does not answer.
    pub fn bring_up(
        axis: Axis,
        params: AnalogParams,
        reverse: bool,
        auto_center: bool,
        adc: &mut dyn AdcBank,
    ) -> Result<Self> {
        let first = adc.sample(axis).map_err(|e| ArcadeError::AnalogProbe {
            axis,
            reason: e.to_string(),
        })?;
        let first = calibration::orient(first, reverse);

        let center_offset = if auto_center {
            calibration::auto_center_offset(first)
        } else {
            calibration::static_offset(params.min, params.max)
        };

        info!(
            "{} initial value {} (0x{:04X}), offset {}{}",
            axis,
            first,
            first,
            center_offset,
            if reverse { ", reversed" } else { "" }
        );

        Ok(Self {
            axis,
            reverse,
            params,
            center_offset,
            observed: None,
        })
    }

    #[must_use]
    pub fn axis(&self) -> Axis {
        self.axis
    }

    #[must_use]
    pub fn params(&self) -> AnalogParams {
        self.params
    }

    #[must_use]
    pub fn center_offset(&self) -> i32 {
        self.center_offset
    }

    /// Smallest and largest oriented samples processed so far.
    #[must_use]
    pub fn observed(&self) -> Option<(i32, i32)> {
        self.observed
    }

    /// Calibrates one raw sample and widens the observed travel.
    pub fn process(&mut self, raw: u16) -> i32 {
        let sample = calibration::orient(raw, self.reverse);
        self.observed = Some(match self.observed {
            Some((min, max)) => (min.min(sample), max.max(sample)),
            None => (sample, sample),
        });

        calibrate(
            raw,
            self.center_offset,
            self.params.min,
            self.params.max,
            self.params.flat,
            self.reverse,
        )
    }

    /// Observed travel as a parameter suggestion, `None` before any sample.
    #[must_use]
    pub fn report(&self) -> Option<CalibrationReport> {
        self.observed.map(|(min, max)| CalibrationReport {
            axis: self.axis,
            observed_min: min,
            observed_max: max,
            fuzz: self.params.fuzz,
            flat: self.params.flat,
        })
    }
}

/// Measured travel of an axis, printed at shutdown so it can be pasted into
/// the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationReport {
    pub axis: Axis,
    pub observed_min: i32,
    pub observed_max: i32,
    pub fuzz: u16,
    pub flat: u16,
}

impl fmt::Display for CalibrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} limits: min {} (0x{:04X}), max {} (0x{:04X}): {}params={},{},{},{}",
            self.axis,
            self.observed_min,
            self.observed_min,
            self.observed_max,
            self.observed_max,
            self.axis.to_string().to_lowercase(),
            self.observed_min,
            self.observed_max,
            self.fuzz,
            self.flat
        )
    }
}
