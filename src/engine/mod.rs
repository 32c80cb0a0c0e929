//! # Engine Module
//!
//! Owns the periodic sampling task and its reference-counted lifecycle.
//!
//! The first [`Engine::start`] spawns the task, later starts only count users.
//! The last [`Engine::stop`] aborts the task, waits for it, then drives every
//! force feedback output to rest. Effects reach the actuator through an
//! [`EffectHandle`] and never wait on the sampling task.

pub mod sampler;

use std::sync::Arc;
use std::time::Duration;

use serde::de::Error;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::analog::{AnalogChannel, CalibrationReport};
use crate::bus::{AdcBank, GpioBus, InputSink, OutputPins, PwmBus};
use crate::config::Config;
use crate::error::{ArcadeError, Result};
use crate::ffb::{EffectHandle, ForceFeedback};

pub use sampler::Sampler;

/// Opened hardware handed to [`Engine::build`].
pub struct Hardware {
    pub gpio: Box<dyn GpioBus>,
    pub outputs: Box<dyn OutputPins>,
    pub adc: Option<Box<dyn AdcBank>>,
    pub pwm: Option<Box<dyn PwmBus>>,
    /// One sink per configured pad, in pad order
    pub sinks: Vec<Box<dyn InputSink>>,
}

#[derive(Default)]
struct Lifecycle {
    users: usize,
    task: Option<JoinHandle<()>>,
}

/// The sampling cycle orchestrator.
pub struct Engine {
    sampler: Arc<Mutex<Sampler>>,
    ffb: Arc<ForceFeedback>,
    period: Duration,
    lifecycle: Mutex<Lifecycle>,
}

impl Engine {
    /// Wraps an assembled sampler.
    #[must_use]
    pub fn new(sampler: Sampler, period: Duration) -> Self {
        let ffb = sampler.force_feedback();
        Self {
            sampler: Arc::new(Mutex::new(sampler)),
            ffb,
            period,
            lifecycle: Mutex::new(Lifecycle::default()),
        }
    }

    /// Assembles the engine described by `config` on top of `hardware`.
    ///
    /// Every configured analog axis is probed once here.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The sink count does not match the pad count
    /// - Analog axes or PWM outputs are configured without their chip
    /// - An analog axis fails its probe
    pub fn build(config: &Config, hardware: Hardware) -> Result<Self> {
        let Hardware {
            gpio,
            outputs,
            adc,
            pwm,
            sinks,
        } = hardware;

        let pads = config.build_pads()?;
        if sinks.len() != pads.len() {
            return Err(ArcadeError::Config(toml::de::Error::custom(format!(
                "{} pads configured but {} input devices supplied",
                pads.len(),
                sinks.len()
            ))));
        }

        let wiring = config.ffb_wiring();
        if !wiring.pwm_outputs().is_empty() && pwm.is_none() {
            return Err(ArcadeError::Config(toml::de::Error::custom(
                "PWM force feedback outputs configured without a PWM chip",
            )));
        }

        let ffb = Arc::new(ForceFeedback::new(wiring, outputs));
        let mut sampler = Sampler::new(gpio, ffb);
        for (pad, sink) in pads.into_iter().zip(sinks) {
            info!("Pad {} using {:?} layout ({:?} hotkey)", pad.index(), pad.layout(), pad.hotkey_mode());
            sampler.add_pad(pad, sink);
        }

        let axes = config.analog.as_ref().map(|a| a.axes()).unwrap_or_default();
        match adc {
            Some(mut adc) if !axes.is_empty() => {
                let auto_center = config.analog.as_ref().is_some_and(|a| a.auto_center);
                let channels = axes
                    .into_iter()
                    .map(|(axis, axis_config)| {
                        AnalogChannel::bring_up(
                            axis,
                            axis_config.params(axis),
                            axis_config.reverse,
                            auto_center,
                            adc.as_mut(),
                        )
                    })
                    .collect::<Result<Vec<_>>>()?;
                sampler.set_analog(adc, channels);
            }
            Some(_) => debug!("Analog converter supplied but no axis enabled"),
            None if !axes.is_empty() => {
                return Err(ArcadeError::Config(toml::de::Error::custom(
                    "analog axes configured without a converter",
                )));
            }
            None => {}
        }

        if let Some(pwm) = pwm {
            sampler.set_pwm(pwm);
        }

        Ok(Self::new(sampler, config.refresh_period()))
    }

    /// Registers one user, spawning the sampling task for the first.
    ///
    /// Returns the user count after the call.
    pub async fn start(&self) -> usize {
        let mut lifecycle = self.lifecycle.lock().await;
        lifecycle.users += 1;

        if lifecycle.users == 1 {
            self.sampler.lock().await.reset_sessions();
            let sampler = Arc::clone(&self.sampler);
            let period = self.period;
            lifecycle.task = Some(tokio::spawn(async move {
                let mut ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    let mut sampler = sampler.lock().await;
                    run_blocking(|| sampler.tick());
                }
            }));
            info!("Sampling started every {:?}", self.period);
        } else {
            debug!("Engine start, {} users", lifecycle.users);
        }

        lifecycle.users
    }

    /// Drops one user. The last one stops the task and deactivates outputs.
    ///
    /// Stopping an engine with no users does nothing. Returns the user count
    /// after the call.
    pub async fn stop(&self) -> usize {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.users == 0 {
            return 0;
        }

        lifecycle.users -= 1;
        if lifecycle.users == 0 {
            self.halt(&mut lifecycle).await;
        } else {
            debug!("Engine stop, {} users left", lifecycle.users);
        }

        lifecycle.users
    }

    async fn halt(&self, lifecycle: &mut Lifecycle) {
        if let Some(task) = lifecycle.task.take() {
            task.abort();
            match task.await {
                Err(e) if e.is_panic() => warn!("Sampling task panicked: {}", e),
                // Cancelled is the expected outcome
                _ => {}
            }
        }
        self.sampler.lock().await.deactivate();
        info!("Sampling stopped, force feedback deactivated");
    }

    pub async fn is_running(&self) -> bool {
        self.lifecycle.lock().await.task.is_some()
    }

    pub async fn users(&self) -> usize {
        self.lifecycle.lock().await.users
    }

    /// Entry point for force feedback effect commands.
    #[must_use]
    pub fn effects(&self) -> EffectHandle {
        EffectHandle::new(Arc::clone(&self.ffb))
    }

    /// Final teardown regardless of the user count.
    ///
    /// Stops the task, deactivates every output, releases the PWM chip and
    /// logs the observed travel of each analog axis.
    pub async fn shutdown(self) -> Vec<CalibrationReport> {
        let mut lifecycle = self.lifecycle.lock().await;
        lifecycle.users = 0;
        self.halt(&mut lifecycle).await;

        let mut sampler = self.sampler.lock().await;
        sampler.release_pwm();

        let reports = sampler.calibration_reports();
        for report in &reports {
            info!("{}", report);
        }
        reports
    }
}

/// Runs a tick body that blocks on bus I/O.
///
/// On a multi-thread runtime the worker hands its queued tasks to another
/// thread first. A current-thread runtime has nowhere to hand them, so the
/// body just runs inline.
fn run_blocking<R>(body: impl FnOnce() -> R) -> R {
    match Handle::current().runtime_flavor() {
        RuntimeFlavor::MultiThread => tokio::task::block_in_place(body),
        _ => body(),
    }
}
