//! Race simulation
//!
//! Lanes move at constant speed for the whole race. The speed of each lane is
//! fixed at race start from the share of taps its racer collected during the
//! click window, so the most-tapped racer runs at full speed and a racer with
//! no taps still crawls along at the baseline.

use crate::config::GameConfig;
use crate::racers::{RacerRegistry, TapLedger};
use log::debug;
use shared::RacerState;
use std::cmp::Ordering;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LanePlan {
    /// Track units per second
    pub speed: f32,
    pub total_taps: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    pub finished: usize,
    pub all_finished: bool,
}

/// Lane speed for a racer with `taps` when the best racer had `max_taps`.
pub fn lane_speed(taps: u32, max_taps: u32, config: &GameConfig) -> f32 {
    let ratio = if max_taps > 0 {
        taps as f32 / max_taps as f32
    } else {
        0.0
    };
    let normalized = config.base_normalized_speed + config.tap_speed_gain * ratio;
    normalized * config.track_length
}

#[derive(Debug, Default)]
pub struct RaceSimulator {
    plans: HashMap<String, LanePlan>,
    positions: HashMap<String, f32>,
    started_at: u64,
    last_tick: u64,
    slow_mo: bool,
    running: bool,
}

impl RaceSimulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops speed and position caches from the previous race.
    pub fn clear(&mut self) {
        self.plans.clear();
        self.positions.clear();
        self.slow_mo = false;
        self.running = false;
    }

    /// Resets the racers and seeds every lane's speed from the tap ledger.
    pub fn start(
        &mut self,
        racers: &mut RacerRegistry,
        ledger: &TapLedger,
        now: u64,
        config: &GameConfig,
    ) {
        racers.reset_for_race();
        self.clear();

        let max_taps = racers
            .iter()
            .map(|racer| ledger.racer_taps(&racer.id))
            .max()
            .unwrap_or(0);

        for racer in racers.iter() {
            let total_taps = ledger.racer_taps(&racer.id);
            let speed = lane_speed(total_taps, max_taps, config);
            self.plans
                .insert(racer.id.clone(), LanePlan { speed, total_taps });
            self.positions.insert(racer.id.clone(), 0.0);
        }

        self.started_at = now;
        self.last_tick = now;
        self.running = true;
        debug!("Race started with max {} taps", max_taps);
    }

    /// Advances every lane by the time elapsed since the previous tick.
    ///
    /// The step is never shorter than one tick interval, so a late timer
    /// cannot slow the race down.
    pub fn tick(&mut self, racers: &mut RacerRegistry, now: u64, config: &GameConfig) -> TickOutcome {
        let elapsed_ms = now.saturating_sub(self.last_tick).max(config.tick_interval_ms);
        let dt = elapsed_ms as f32 / 1000.0;
        self.last_tick = now;

        let track = config.track_length;
        let baseline = config.base_normalized_speed * track;
        let mut finished = 0;
        let mut min_time_to_finish = f32::INFINITY;

        for racer in racers.iter_mut() {
            let speed = self
                .plans
                .get(&racer.id)
                .map_or(baseline, |plan| plan.speed);
            let current = self.positions.get(&racer.id).copied().unwrap_or(0.0);
            let next = (current + speed * dt).clamp(0.0, track);
            self.positions.insert(racer.id.clone(), next);

            let progress = (next / track).clamp(0.0, 1.0);
            racer.progress = racer.progress.max(progress);

            if next >= track {
                if racer.finish_time.is_none() {
                    racer.finish_time = Some(now.saturating_sub(self.started_at));
                }
                finished += 1;
            } else if speed > 0.0 {
                min_time_to_finish = min_time_to_finish.min((track - next) / speed);
            }
        }

        if !min_time_to_finish.is_finite() {
            min_time_to_finish = 0.0;
        }
        let slow_mo = min_time_to_finish * 1000.0 <= config.slow_mo_threshold_ms as f32;
        if slow_mo != self.slow_mo {
            debug!("Slow-mo {}", if slow_mo { "on" } else { "off" });
        }
        self.slow_mo = slow_mo;

        TickOutcome {
            finished,
            all_finished: finished == racers.len(),
        }
    }

    /// Stops the race and ranks the racers by finish time.
    ///
    /// Racers without a finish time are placed after every finisher, the
    /// furthest along first. Returns the racers in finishing order.
    pub fn conclude(&mut self, racers: &mut RacerRegistry) -> Vec<RacerState> {
        self.running = false;
        self.slow_mo = false;

        let mut ordered: Vec<RacerState> = racers.snapshot();
        ordered.sort_by(|a, b| {
            let a_time = a.finish_time.unwrap_or(u64::MAX);
            let b_time = b.finish_time.unwrap_or(u64::MAX);
            a_time.cmp(&b_time).then_with(|| {
                b.progress
                    .partial_cmp(&a.progress)
                    .unwrap_or(Ordering::Equal)
            })
        });

        let ids: Vec<String> = ordered.iter().map(|racer| racer.id.clone()).collect();
        racers.apply_ranking(&ids);

        ids.iter()
            .filter_map(|id| racers.get(id).cloned())
            .collect()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_slow_mo(&self) -> bool {
        self.slow_mo
    }

    pub fn started_at(&self) -> u64 {
        self.started_at
    }

    pub fn plan(&self, racer_id: &str) -> Option<LanePlan> {
        self.plans.get(racer_id).copied()
    }

    pub fn position(&self, racer_id: &str) -> Option<f32> {
        self.positions.get(racer_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::gecko_seeds;

    fn ledger_with(taps: &[u32]) -> TapLedger {
        let mut ledger = TapLedger::new();
        for (index, &count) in taps.iter().enumerate() {
            let racer_id = format!("gecko-{}", index + 1);
            for _ in 0..count {
                ledger.record("p1", &racer_id);
            }
        }
        ledger
    }

    fn started(taps: &[u32]) -> (RaceSimulator, RacerRegistry, GameConfig) {
        let config = GameConfig::default();
        let mut racers = RacerRegistry::new(gecko_seeds());
        let mut sim = RaceSimulator::new();
        sim.start(&mut racers, &ledger_with(taps), 0, &config);
        (sim, racers, config)
    }

    #[test]
    fn test_lane_speed_curve() {
        let config = GameConfig::default();
        assert_approx_eq!(lane_speed(50, 50, &config), 100.0, 1e-4);
        assert_approx_eq!(lane_speed(10, 50, &config), 36.0, 1e-4);
        assert_approx_eq!(lane_speed(0, 50, &config), 20.0, 1e-4);
        assert_approx_eq!(lane_speed(0, 0, &config), 20.0, 1e-4);
    }

    #[test]
    fn test_start_seeds_plans() {
        let (sim, racers, _) = started(&[50, 10, 0, 0, 0]);

        assert!(sim.is_running());
        assert_approx_eq!(sim.plan("gecko-1").unwrap().speed, 100.0, 1e-4);
        assert_eq!(sim.plan("gecko-2").unwrap().total_taps, 10);
        assert_approx_eq!(sim.plan("gecko-5").unwrap().speed, 20.0, 1e-4);
        assert!(racers.iter().all(|r| r.progress == 0.0 && r.finish_time.is_none()));
    }

    #[test]
    fn test_tick_advances_by_elapsed_time() {
        let (mut sim, mut racers, config) = started(&[50, 10, 0, 0, 0]);

        sim.tick(&mut racers, 200, &config);
        assert_approx_eq!(racers.get("gecko-1").unwrap().progress, 0.2, 1e-4);
        assert_approx_eq!(racers.get("gecko-3").unwrap().progress, 0.04, 1e-4);

        // A late tick integrates the full gap.
        sim.tick(&mut racers, 600, &config);
        assert_approx_eq!(racers.get("gecko-1").unwrap().progress, 0.6, 1e-4);
    }

    #[test]
    fn test_tick_step_floored_to_interval() {
        let (mut sim, mut racers, config) = started(&[0, 0, 0, 0, 0]);

        // An early tick still integrates one whole interval.
        sim.tick(&mut racers, 50, &config);
        assert_approx_eq!(sim.position("gecko-1").unwrap(), 4.0, 1e-4);
    }

    #[test]
    fn test_progress_monotonic_and_bounded() {
        let (mut sim, mut racers, config) = started(&[50, 10, 0, 0, 0]);
        let mut previous = racers.progress();

        for step in 1..=40 {
            sim.tick(&mut racers, step * 200, &config);
            let current = racers.progress();
            for (before, after) in previous.iter().zip(current.iter()) {
                assert!(after >= before);
                assert!((0.0..=1.0).contains(after));
            }
            previous = current;
        }
    }

    #[test]
    fn test_finish_time_stamped_once() {
        let (mut sim, mut racers, config) = started(&[50, 0, 0, 0, 0]);

        for step in 1..=5 {
            sim.tick(&mut racers, step * 200, &config);
        }
        assert_eq!(racers.get("gecko-1").unwrap().finish_time, Some(1_000));

        sim.tick(&mut racers, 1_200, &config);
        assert_eq!(racers.get("gecko-1").unwrap().finish_time, Some(1_000));
        assert_eq!(racers.get("gecko-1").unwrap().progress, 1.0);
    }

    #[test]
    fn test_all_finished_only_when_every_racer_done() {
        let (mut sim, mut racers, config) = started(&[50, 10, 0, 0, 0]);

        let mut now = 0;
        loop {
            now += 200;
            let outcome = sim.tick(&mut racers, now, &config);
            assert_eq!(outcome.all_finished, racers.all_finished());
            if outcome.all_finished {
                break;
            }
            assert!(now < 10_000, "race never finished");
        }
        // Baseline lanes need five seconds to cover the track.
        assert_eq!(now, 5_000);
    }

    #[test]
    fn test_slow_mo_near_finish() {
        let (mut sim, mut racers, config) = started(&[0, 0, 0, 0, 0]);

        sim.tick(&mut racers, 200, &config);
        assert!(!sim.is_slow_mo());

        // At 3.2s every lane is 1.8s from the line.
        let mut now = 200;
        while now < 3_200 {
            now += 200;
            sim.tick(&mut racers, now, &config);
        }
        assert!(sim.is_slow_mo());
    }

    #[test]
    fn test_conclude_ranks_by_finish_time() {
        let (mut sim, mut racers, config) = started(&[50, 10, 0, 0, 0]);
        let mut now = 0;
        while !racers.all_finished() {
            now += 200;
            sim.tick(&mut racers, now, &config);
        }

        let ranked = sim.conclude(&mut racers);
        assert!(!sim.is_running());
        assert!(!sim.is_slow_mo());
        assert_eq!(ranked[0].id, "gecko-1");
        assert_eq!(ranked[1].id, "gecko-2");
        assert_eq!(ranked[0].rank, Some(1));
        assert_eq!(racers.get("gecko-1").unwrap().wins, 1);
        assert!(racers.iter().filter(|r| r.id != "gecko-1").all(|r| r.wins == 0));
    }

    #[test]
    fn test_conclude_orders_unfinished_by_progress() {
        let (mut sim, mut racers, config) = started(&[50, 10, 20, 0, 0]);
        sim.tick(&mut racers, 1_000, &config);

        let ranked = sim.conclude(&mut racers);
        let order: Vec<&str> = ranked.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(order, vec!["gecko-1", "gecko-3", "gecko-2", "gecko-4", "gecko-5"]);
    }
}
