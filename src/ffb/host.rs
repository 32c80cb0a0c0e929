//! Effects the host uploads to a pad's input device.
//!
//! The host uploads effects into numbered slots, then starts and stops them
//! by slot id. Every start, stop, erase or expiry folds the playing rumble
//! effects into one command for the actuator: magnitudes add up and saturate,
//! and the direction follows the most recently started effect.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

use super::{Effect, EffectKind};

#[derive(Debug, Clone, Copy)]
struct Upload {
    effect: Effect,
    /// Zero plays until stopped.
    length: Duration,
}

#[derive(Debug, Clone, Copy)]
struct Playing {
    started: Instant,
    ends: Option<Instant>,
}

/// Uploaded effect slots of one input device.
#[derive(Debug, Default)]
pub struct HostEffects {
    uploads: HashMap<i16, Upload>,
    playing: HashMap<i16, Playing>,
}

impl HostEffects {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `effect` in slot `id`, replacing what was there.
    ///
    /// Returns the new combined command when the slot is playing.
    pub fn upload(&mut self, id: i16, effect: Effect, length: Duration) -> Option<Effect> {
        debug!("Effect {} uploaded: {:?} for {:?}", id, effect, length);
        self.uploads.insert(id, Upload { effect, length });
        self.playing.contains_key(&id).then(|| self.combined())
    }

    /// Frees slot `id`, stopping it first if it plays.
    pub fn erase(&mut self, id: i16) -> Option<Effect> {
        self.uploads.remove(&id);
        self.playing.remove(&id).map(|_| self.combined())
    }

    /// Starts slot `id` for `count` repetitions, or stops it when `count`
    /// is zero.
    ///
    /// Returns `None` for unknown slots and for effects the actuator cannot
    /// render.
    pub fn play(&mut self, id: i16, count: i32, now: Instant) -> Option<Effect> {
        let Some(upload) = self.uploads.get(&id) else {
            debug!("Play request for empty effect slot {}", id);
            return None;
        };
        if upload.effect.kind != EffectKind::Rumble {
            debug!("Ignoring {:?} effect in slot {}", upload.effect.kind, id);
            return None;
        }

        if count <= 0 {
            return self.playing.remove(&id).map(|_| self.combined());
        }

        let ends = (!upload.length.is_zero())
            .then(|| now + upload.length.saturating_mul(count.unsigned_abs()));
        self.playing.insert(id, Playing { started: now, ends });
        Some(self.combined())
    }

    /// Stops every effect whose replay length has run out by `now`.
    pub fn expire(&mut self, now: Instant) -> Option<Effect> {
        let before = self.playing.len();
        self.playing
            .retain(|_, playing| playing.ends.map_or(true, |ends| ends > now));
        (self.playing.len() != before).then(|| self.combined())
    }

    #[must_use]
    pub fn is_playing(&self, id: i16) -> bool {
        self.playing.contains_key(&id)
    }

    fn combined(&self) -> Effect {
        let mut strong: u16 = 0;
        let mut weak: u16 = 0;
        let mut latest: Option<(Instant, u16)> = None;

        for (id, playing) in &self.playing {
            let Some(upload) = self.uploads.get(id) else {
                continue;
            };
            strong = strong.saturating_add(upload.effect.strong_magnitude);
            weak = weak.saturating_add(upload.effect.weak_magnitude);
            if latest.map_or(true, |(started, _)| playing.started > started) {
                latest = Some((playing.started, upload.effect.direction));
            }
        }

        Effect::rumble(strong, weak, latest.map_or(0, |(_, direction)| direction))
    }
}
