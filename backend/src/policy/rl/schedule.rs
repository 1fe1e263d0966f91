//! Exploration schedule

use crate::orchestrator::{EpsilonDecay, RlConfig};

/// Epsilon as a function of the episode index
///
/// Moves from `start` to `end` over `decay_episodes` episodes, then stays
/// at `end`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpsilonSchedule {
    start: f64,
    end: f64,
    decay_episodes: usize,
    shape: EpsilonDecay,
}

impl EpsilonSchedule {
    pub fn new(start: f64, end: f64, decay_episodes: usize, shape: EpsilonDecay) -> Self {
        Self {
            start,
            end,
            decay_episodes,
            shape,
        }
    }

    pub fn from_config(config: &RlConfig) -> Self {
        Self::new(
            config.epsilon_start,
            config.epsilon_end,
            config.epsilon_decay_episodes,
            config.epsilon_schedule,
        )
    }

    pub fn epsilon_at(&self, episode: usize) -> f64 {
        if self.decay_episodes == 0 {
            return self.end;
        }
        let progress = (episode as f64 / self.decay_episodes as f64).min(1.0);
        match self.shape {
            EpsilonDecay::Linear => self.start + (self.end - self.start) * progress,
            // validated: start and end are positive
            EpsilonDecay::Exponential => self.start * (self.end / self.start).powf(progress),
        }
    }
}
