//! Racer roster and the per-round tap ledger.

use shared::{RacerSeed, RacerState};
use std::collections::HashMap;

/// Taps collected during the current round, keyed by racer and by player.
#[derive(Debug, Default, Clone)]
pub struct TapLedger {
    by_racer: HashMap<String, u32>,
    by_player: HashMap<String, u32>,
}

impl TapLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, player_id: &str, racer_id: &str) -> u32 {
        *self.by_player.entry(player_id.to_string()).or_insert(0) += 1;
        let count = self.by_racer.entry(racer_id.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn racer_taps(&self, racer_id: &str) -> u32 {
        self.by_racer.get(racer_id).copied().unwrap_or(0)
    }

    pub fn player_taps(&self, player_id: &str) -> u32 {
        self.by_player.get(player_id).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.by_racer.values().map(|&taps| u64::from(taps)).sum()
    }

    pub fn totals(&self) -> &HashMap<String, u32> {
        &self.by_racer
    }

    pub fn clear(&mut self) {
        self.by_racer.clear();
        self.by_player.clear();
    }
}

/// The fixed set of selectable racers and their mutable race state.
#[derive(Debug, Clone)]
pub struct RacerRegistry {
    racers: Vec<RacerState>,
}

impl RacerRegistry {
    pub fn new(seeds: Vec<RacerSeed>) -> Self {
        Self {
            racers: seeds.into_iter().map(RacerState::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.racers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.racers.is_empty()
    }

    pub fn contains(&self, racer_id: &str) -> bool {
        self.racers.iter().any(|racer| racer.id == racer_id)
    }

    pub fn get(&self, racer_id: &str) -> Option<&RacerState> {
        self.racers.iter().find(|racer| racer.id == racer_id)
    }

    pub fn get_mut(&mut self, racer_id: &str) -> Option<&mut RacerState> {
        self.racers.iter_mut().find(|racer| racer.id == racer_id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.racers.iter().map(|racer| racer.id.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RacerState> {
        self.racers.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut RacerState> {
        self.racers.iter_mut()
    }

    /// Clears per-race state ahead of a new race. Wins are kept.
    pub fn reset_for_race(&mut self) {
        for racer in &mut self.racers {
            racer.progress = 0.0;
            racer.finish_time = None;
            racer.rank = None;
        }
    }

    pub fn sync_taps(&mut self, ledger: &TapLedger) {
        for racer in &mut self.racers {
            racer.total_taps = ledger.racer_taps(&racer.id);
        }
    }

    pub fn progress(&self) -> Vec<f32> {
        self.racers.iter().map(|racer| racer.progress).collect()
    }

    pub fn all_finished(&self) -> bool {
        self.racers.iter().all(|racer| racer.finish_time.is_some())
    }

    /// Assigns 1-based ranks in the given order and credits the winner.
    pub fn apply_ranking(&mut self, ordered_ids: &[String]) {
        for (index, racer_id) in ordered_ids.iter().enumerate() {
            if let Some(racer) = self.get_mut(racer_id) {
                racer.rank = Some(index as u32 + 1);
                if index == 0 {
                    racer.wins += 1;
                }
            }
        }
    }

    pub fn snapshot(&self) -> Vec<RacerState> {
        self.racers.clone()
    }
}
