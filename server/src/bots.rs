//! Synthetic participants that keep every race populated.
//!
//! Bots are ordinary player records flagged `is_bot`. They never get a
//! privileged boost path: the controller only decides *when* a bot taps and
//! hands the boost to the engine, which runs the same admission checks it
//! runs for humans.

use crate::lobby::Lobby;
use log::debug;
use rand::Rng;
use uuid::Uuid;

const FIRST_ACTION_DELAY_MS: (f64, f64) = (200.0, 600.0);
const ACTION_DELAY_MS: (f64, f64) = (200.0, 650.0);
const SPAWN_DELAY_MS: (f64, f64) = (350.0, 1_600.0);

#[derive(Debug, Clone, PartialEq)]
pub struct BotHandle {
    pub id: String,
    pub racer_id: String,
    pub next_action_at: u64,
    /// Multiplier on every action delay, fixed for the bot's lifetime.
    pub bias: f64,
}

#[derive(Debug)]
pub struct BotController {
    bots: Vec<BotHandle>,
    active: bool,
    bias_spread: f64,
}

fn random_delay<R: Rng + ?Sized>(rng: &mut R, (min, max): (f64, f64)) -> f64 {
    rng.gen_range(min..max)
}

impl BotController {
    pub fn new(bias_spread: f64) -> Self {
        Self {
            bots: Vec::new(),
            active: false,
            bias_spread,
        }
    }

    /// Grows or shrinks the population to exactly `target` bots.
    ///
    /// New bots back a random racer from `racer_ids`; retired bots are
    /// removed from the lobby.
    pub fn rebalance<R: Rng + ?Sized>(
        &mut self,
        target: usize,
        racer_ids: &[String],
        lobby: &mut Lobby,
        now: u64,
        rng: &mut R,
    ) {
        let before = self.bots.len();

        while self.bots.len() > target {
            if let Some(bot) = self.bots.pop() {
                lobby.remove_player(&bot.id);
            }
        }

        if racer_ids.is_empty() {
            return;
        }

        while self.bots.len() < target {
            let id = format!("bot-{}", Uuid::new_v4());
            let nickname = format!("Bot {}", rng.gen_range(100..1000));
            let racer_id = racer_ids[rng.gen_range(0..racer_ids.len())].clone();
            lobby.add_bot(&id, nickname, &racer_id, now);

            let bias = if self.bias_spread > 0.0 {
                1.0 + rng.gen_range(-self.bias_spread..self.bias_spread)
            } else {
                1.0
            };
            let next_action_at = now + (random_delay(rng, SPAWN_DELAY_MS) * bias) as u64;
            self.bots.push(BotHandle {
                id,
                racer_id,
                next_action_at,
                bias,
            });
        }

        debug!("Bot population {} -> {}", before, self.bots.len());
    }

    /// Turns bot tapping on and staggers the first taps of the window.
    pub fn activate<R: Rng + ?Sized>(&mut self, now: u64, rng: &mut R) {
        for bot in &mut self.bots {
            bot.next_action_at = now + (random_delay(rng, FIRST_ACTION_DELAY_MS) * bot.bias) as u64;
        }
        self.active = true;
    }

    /// Turns bot tapping on without touching pending schedules.
    pub fn resume(&mut self) {
        self.active = true;
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Collects `(bot id, racer id)` for every bot whose action is due and
    /// schedules its next one. Empty while inactive.
    pub fn take_due<R: Rng + ?Sized>(&mut self, now: u64, rng: &mut R) -> Vec<(String, String)> {
        if !self.active {
            return Vec::new();
        }

        let mut due = Vec::new();
        for bot in &mut self.bots {
            if bot.next_action_at <= now {
                due.push((bot.id.clone(), bot.racer_id.clone()));
                bot.next_action_at = now + (random_delay(rng, ACTION_DELAY_MS) * bot.bias) as u64;
            }
        }
        due
    }

    pub fn bots(&self) -> &[BotHandle] {
        &self.bots
    }

    pub fn len(&self) -> usize {
        self.bots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bots.is_empty()
    }
}
