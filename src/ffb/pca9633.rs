//! PCA9633 four-channel PWM driver.
//!
//! Only the registers the rumble motors need are touched: the per-output
//! duty registers and LEDOUT, which switches an output into PWM mode. The
//! LEDOUT value found at bring-up is restored on [`PwmBus::release`].

use embedded_hal::i2c::I2c;
use tracing::{info, warn};

use super::OutputId;
use crate::bus::PwmBus;
use crate::error::{ArcadeError, Result};

/// Duty register of output 0. Output `n` uses `PWM0 + n`.
pub const PWM0: u8 = 0x02;

/// Output driver state register.
pub const LEDOUT: u8 = 0x08;

/// Number of outputs on the chip.
pub const OUTPUT_COUNT: u32 = 4;

/// LEDOUT bits selecting individual PWM control for one output.
const LEDOUT_PWM: u8 = 0x02;

/// A probed PCA9633 with the rumble outputs switched to PWM mode.
pub struct Pca9633<I2C> {
    i2c: I2C,
    address: u8,
    outputs: Vec<OutputId>,
    ledout_backup: u8,
    released: bool,
}

impl<I2C: I2c> Pca9633<I2C> {
    /// Probes the chip and enables PWM on `outputs`.
    ///
    /// Each output's duty register is set to its rest level before LEDOUT
    /// switches it to PWM mode.
    ///
    /// # Errors
    ///
    /// Returns [`ArcadeError::PwmProbe`] when the chip does not answer or an
    /// output index is out of range.
    pub fn bring_up(mut i2c: I2C, address: u8, outputs: &[OutputId]) -> Result<Self> {
        if let Some(output) = outputs.iter().find(|o| o.id >= OUTPUT_COUNT) {
            return Err(ArcadeError::PwmProbe(format!(
                "output {} does not exist on the PCA9633",
                output.id
            )));
        }

        let mut probe = [0u8; 2];
        i2c.write_read(address, &[0x00], &mut probe)
            .map_err(|e| probe_error(address, e))?;

        let mut ledout = [0u8; 1];
        i2c.write_read(address, &[LEDOUT], &mut ledout)
            .map_err(|e| probe_error(address, e))?;
        let ledout_backup = ledout[0];

        let mut enabled = ledout_backup;
        for output in outputs {
            enabled |= LEDOUT_PWM << (output.id * 2);
            i2c.write(address, &[super::duty_register(output.id), output.off_duty()])
                .map_err(|e| probe_error(address, e))?;
        }
        i2c.write(address, &[LEDOUT, enabled])
            .map_err(|e| probe_error(address, e))?;

        info!(
            "PCA9633 at 0x{:02X}, LEDOUT 0x{:02X} (initial), 0x{:02X} (new)",
            address, ledout_backup, enabled
        );

        Ok(Self {
            i2c,
            address,
            outputs: outputs.to_vec(),
            ledout_backup,
            released: false,
        })
    }

    #[must_use]
    pub fn ledout_backup(&self) -> u8 {
        self.ledout_backup
    }
}

fn probe_error<E: std::fmt::Debug>(address: u8, err: E) -> ArcadeError {
    ArcadeError::PwmProbe(format!("no answer at 0x{:02X}: {:?}", address, err))
}

impl<I2C> PwmBus for Pca9633<I2C>
where
    I2C: I2c + Send,
{
    fn write_register(&mut self, register: u8, value: u8) -> Result<()> {
        self.i2c
            .write(self.address, &[register, value])
            .map_err(|e| ArcadeError::Bus(format!("PCA9633 write 0x{:02X} failed: {:?}", register, e)))
    }

    fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        // Attempt every write, report the first failure
        let mut first_error = None;
        for output in self.outputs.clone() {
            if let Err(e) = self.write_register(super::duty_register(output.id), output.off_duty()) {
                warn!("{}", e);
                first_error.get_or_insert(e);
            }
        }
        if let Err(e) = self.write_register(LEDOUT, self.ledout_backup) {
            first_error.get_or_insert(e);
        } else {
            info!("PCA9633 LEDOUT restored to 0x{:02X}", self.ledout_backup);
        }

        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::mocks::FakeI2c;

    const ADDRESS: u8 = 0x62;

    fn chip_with_ledout(ledout: u8) -> FakeI2c {
        let bus = FakeI2c::new();
        bus.set_register(ADDRESS, 0x00, &[0x11, 0x00]);
        bus.set_register(ADDRESS, LEDOUT, &[ledout]);
        bus
    }

    fn writes_of_len(bus: &FakeI2c, len: usize) -> Vec<Vec<u8>> {
        bus.get_writes()
            .into_iter()
            .map(|(_, bytes)| bytes)
            .filter(|bytes| bytes.len() == len)
            .collect()
    }

    #[test]
    fn test_bring_up_enables_pwm_outputs() {
        let bus = chip_with_ledout(0x00);
        let outputs = [OutputId::from_signed(0), OutputId::from_signed(-2)];

        let chip = Pca9633::bring_up(bus.clone(), ADDRESS, &outputs).unwrap();
        assert_eq!(chip.ledout_backup(), 0x00);

        assert_eq!(
            writes_of_len(&bus, 2),
            vec![vec![0x02, 0x00], vec![0x04, 0xFF], vec![LEDOUT, 0x22]]
        );
    }

    #[test]
    fn test_bring_up_keeps_existing_ledout_bits() {
        let bus = chip_with_ledout(0x40);
        Pca9633::bring_up(bus.clone(), ADDRESS, &[OutputId::from_signed(1)]).unwrap();

        let writes = writes_of_len(&bus, 2);
        assert_eq!(writes.last().unwrap(), &vec![LEDOUT, 0x48]);
    }

    #[test]
    fn test_missing_chip_is_probe_error() {
        let result = Pca9633::bring_up(FakeI2c::new(), ADDRESS, &[OutputId::from_signed(0)]);
        assert!(matches!(result, Err(ArcadeError::PwmProbe(_))));
    }

    #[test]
    fn test_output_out_of_range() {
        let bus = chip_with_ledout(0x00);
        let result = Pca9633::bring_up(bus, ADDRESS, &[OutputId::from_signed(4)]);
        assert!(matches!(result, Err(ArcadeError::PwmProbe(_))));
    }

    #[test]
    fn test_write_register() {
        let bus = chip_with_ledout(0x00);
        let mut chip = Pca9633::bring_up(bus.clone(), ADDRESS, &[OutputId::from_signed(3)]).unwrap();

        chip.write_register(0x05, 200).unwrap();
        assert_eq!(bus.get_writes().last().unwrap(), &(ADDRESS, vec![0x05, 200]));
    }

    #[test]
    fn test_release_restores_ledout_once() {
        let bus = chip_with_ledout(0x40);
        let mut chip = Pca9633::bring_up(bus.clone(), ADDRESS, &[OutputId::from_signed(-1)]).unwrap();
        let before = bus.get_writes().len();

        chip.release().unwrap();
        let released: Vec<Vec<u8>> = bus.get_writes()[before..]
            .iter()
            .map(|(_, bytes)| bytes.clone())
            .collect();
        assert_eq!(released, vec![vec![0x03, 0xFF], vec![LEDOUT, 0x40]]);

        chip.release().unwrap();
        assert_eq!(bus.get_writes().len(), before + 2);
    }
}
