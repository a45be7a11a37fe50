//! Tunable game parameters.

use shared::{Phase, BASE_NORMALIZED_SPEED, TAP_SPEED_GAIN, TRACK_LENGTH};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseDefinition {
    pub name: Phase,
    pub duration_ms: u64,
}

impl PhaseDefinition {
    pub const fn new(name: Phase, duration_ms: u64) -> Self {
        Self { name, duration_ms }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("phase timeline is empty")]
    EmptyTimeline,
    #[error("phase timeline has no {0} phase")]
    MissingPhase(Phase),
    #[error("tick interval must be greater than zero")]
    ZeroTickInterval,
    #[error("boost ceiling must be greater than zero")]
    ZeroBoostCeiling,
    #[error("prize distribution sums to {0}%, more than 100%")]
    PrizeDistributionOverflow(u32),
    #[error("platform fee of {0}% exceeds 100%")]
    FeeOverflow(u32),
    #[error("burn ({burn}%) and owner club ({owner}%) exceed the {fee}% platform fee")]
    FeeSplitMismatch { burn: u32, owner: u32, fee: u32 },
    #[error("bot range {min}..={max} is inverted")]
    InvertedBotRange { min: u32, max: u32 },
    #[error("track length must be positive")]
    NonPositiveTrack,
    #[error("bot bias spread {0} must lie in 0.0..1.0")]
    BotBiasSpreadOutOfRange(f64),
}

#[derive(Debug, Clone)]
pub struct GameConfig {
    pub phase_timeline: Vec<PhaseDefinition>,
    /// Race tick interval; also the minimum integration step.
    pub tick_interval_ms: u64,
    pub track_length: f32,
    /// Normalized speed of a racer that received no taps.
    pub base_normalized_speed: f32,
    /// Additional normalized speed for the most-tapped racer.
    pub tap_speed_gain: f32,
    pub boost_limit_per_window: u32,
    pub boost_window_ms: u64,
    pub slow_mo_threshold_ms: u64,
    /// Percentage of the player prize per finishing rank, rank 1 first.
    pub prize_distribution: Vec<u32>,
    pub platform_fee_percent: u32,
    pub burn_percent: u32,
    pub owner_club_percent: u32,
    pub daily_free_tickets: u64,
    pub referral_bonus: u64,
    pub ticket_cost: u64,
    pub bot_tick_ms: u64,
    pub bots_per_human_min: u32,
    pub bots_per_human_max: u32,
    pub baseline_bots_min: u32,
    pub baseline_bots_max: u32,
    /// Maximum deviation of a bot's speed bias from 1.0.
    pub bot_bias_spread: f64,
    /// Time zone used for daily ticket claims, in minutes east of UTC.
    pub utc_offset_minutes: i32,
    pub rng_seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            phase_timeline: vec![
                PhaseDefinition::new(Phase::Lobby, 120_000),
                PhaseDefinition::new(Phase::ClickWindow, 5_000),
                PhaseDefinition::new(Phase::Racing, 10_000),
                PhaseDefinition::new(Phase::Results, 5_000),
            ],
            tick_interval_ms: 200,
            track_length: TRACK_LENGTH,
            base_normalized_speed: BASE_NORMALIZED_SPEED,
            tap_speed_gain: TAP_SPEED_GAIN,
            boost_limit_per_window: 50,
            boost_window_ms: 1_000,
            slow_mo_threshold_ms: 2_000,
            prize_distribution: vec![75, 15, 10, 5, 0],
            platform_fee_percent: 10,
            burn_percent: 5,
            owner_club_percent: 5,
            daily_free_tickets: 5,
            referral_bonus: 10,
            ticket_cost: 10,
            bot_tick_ms: 80,
            bots_per_human_min: 6,
            bots_per_human_max: 12,
            baseline_bots_min: 6,
            baseline_bots_max: 12,
            bot_bias_spread: 0.15,
            utc_offset_minutes: 9 * 60,
            rng_seed: None,
        }
    }
}

impl GameConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.phase_timeline.is_empty() {
            return Err(ConfigError::EmptyTimeline);
        }
        for phase in [Phase::Lobby, Phase::ClickWindow, Phase::Racing, Phase::Results] {
            if !self.phase_timeline.iter().any(|def| def.name == phase) {
                return Err(ConfigError::MissingPhase(phase));
            }
        }
        if self.tick_interval_ms == 0 || self.bot_tick_ms == 0 {
            return Err(ConfigError::ZeroTickInterval);
        }
        if self.boost_limit_per_window == 0 {
            return Err(ConfigError::ZeroBoostCeiling);
        }
        if self.track_length <= 0.0 {
            return Err(ConfigError::NonPositiveTrack);
        }

        let prize_total: u32 = self.prize_distribution.iter().sum();
        if prize_total > 100 {
            return Err(ConfigError::PrizeDistributionOverflow(prize_total));
        }
        if self.platform_fee_percent > 100 {
            return Err(ConfigError::FeeOverflow(self.platform_fee_percent));
        }
        if self.burn_percent + self.owner_club_percent > self.platform_fee_percent {
            return Err(ConfigError::FeeSplitMismatch {
                burn: self.burn_percent,
                owner: self.owner_club_percent,
                fee: self.platform_fee_percent,
            });
        }

        if self.bots_per_human_min > self.bots_per_human_max {
            return Err(ConfigError::InvertedBotRange {
                min: self.bots_per_human_min,
                max: self.bots_per_human_max,
            });
        }
        if self.baseline_bots_min > self.baseline_bots_max {
            return Err(ConfigError::InvertedBotRange {
                min: self.baseline_bots_min,
                max: self.baseline_bots_max,
            });
        }
        if !(0.0..1.0).contains(&self.bot_bias_spread) {
            return Err(ConfigError::BotBiasSpreadOutOfRange(self.bot_bias_spread));
        }

        Ok(())
    }

    pub fn phase_duration(&self, phase: Phase) -> Option<u64> {
        self.phase_timeline
            .iter()
            .find(|def| def.name == phase)
            .map(|def| def.duration_ms)
    }

    /// Replaces the duration of `phase` in the timeline, if present.
    pub fn set_phase_duration(&mut self, phase: Phase, duration_ms: u64) {
        for def in self.phase_timeline.iter_mut().filter(|def| def.name == phase) {
            def.duration_ms = duration_ms;
        }
    }
}
