//! Round state machine
//!
//! [`GameLoop`] owns game time and every registry. It cycles through
//! `LOBBY → CLICK_WINDOW → RACING → RESULTS` on a fixed timeline, runs the race
//! simulation while racing, and pays out prizes when the race concludes.
//!
//! The loop is a plain synchronous state machine. It never sleeps: whoever
//! drives it calls [`GameLoop::run_due`] once the deadline reported by
//! [`GameLoop::next_deadline`] has passed. Every state change is pushed to the
//! event channel as a full snapshot followed by a progress tick.

use crate::bots::{BotController, BotHandle};
use crate::clock::Clock;
use crate::config::GameConfig;
use crate::lobby::Lobby;
use crate::prize::{build_race_results, calculate_prize_pool, distribute_prizes, player_result};
use crate::race::RaceSimulator;
use crate::racers::{RacerRegistry, TapLedger};
use crate::rate_limiter::BoostRateLimiter;
use crate::scheduler::{Scheduler, TimerSlot};
use crate::utils::calendar_date;
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{
    gecko_seeds, BoostRejection, BoostResult, GameStateMessage, Phase, PhaseTiming, PlayerInfo,
    PlayerRaceResult, PrizePool, RaceProgress, RaceResult, RaceSnapshot,
};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Outbound events for the transport layer
#[derive(Debug, Clone)]
pub enum GameEvent {
    State(Box<GameStateMessage>),
    Progress(RaceProgress),
    PlayerResult {
        player_id: String,
        result: PlayerRaceResult,
    },
}

pub struct GameLoop {
    config: GameConfig,
    clock: Arc<dyn Clock>,
    events: mpsc::UnboundedSender<GameEvent>,
    rng: StdRng,

    lobby: Lobby,
    racers: RacerRegistry,
    ledger: TapLedger,
    limiter: BoostRateLimiter,
    bots: BotController,
    race: RaceSimulator,
    scheduler: Scheduler,

    timing: PhaseTiming,
    phase_index: usize,
    round: u32,
    prize_pool: PrizePool,
    last_results: Vec<RaceResult>,
    race_concluded: bool,
}

impl GameLoop {
    pub fn new(
        config: GameConfig,
        clock: Arc<dyn Clock>,
        events: mpsc::UnboundedSender<GameEvent>,
    ) -> Self {
        let rng = config
            .rng_seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        let now = clock.now_ms();
        let first = config.phase_timeline.first().copied();
        let timing = PhaseTiming {
            phase: first.map_or(Phase::Lobby, |def| def.name),
            started_at: now,
            ends_at: now + first.map_or(0, |def| def.duration_ms),
        };

        Self {
            limiter: BoostRateLimiter::new(config.boost_limit_per_window, config.boost_window_ms),
            bots: BotController::new(config.bot_bias_spread),
            config,
            clock,
            events,
            rng,
            lobby: Lobby::new(),
            racers: RacerRegistry::new(gecko_seeds()),
            ledger: TapLedger::new(),
            race: RaceSimulator::new(),
            scheduler: Scheduler::new(),
            timing,
            phase_index: 0,
            round: 0,
            prize_pool: PrizePool::default(),
            last_results: Vec::new(),
            race_concluded: false,
        }
    }

    /// Enters the first phase of the timeline.
    pub fn start(&mut self) {
        self.phase_index = 0;
        self.schedule_phase();
    }

    /// Fires every timer that is due at the current clock time.
    ///
    /// Returns how many timer callbacks ran.
    pub fn run_due(&mut self) -> usize {
        let mut fired = 0;
        loop {
            let now = self.clock.now_ms();
            let Some(slot) = self.scheduler.pop_due(now) else {
                break;
            };
            fired += 1;
            match slot {
                TimerSlot::Phase => self.advance_phase(),
                TimerSlot::RaceTick => self.race_tick(now),
                TimerSlot::BotTick => self.bot_tick(now),
            }
        }
        fired
    }

    /// Earliest instant at which [`GameLoop::run_due`] has work to do.
    pub fn next_deadline(&self) -> Option<u64> {
        self.scheduler.next_due()
    }

    pub fn state(&self) -> GameStateMessage {
        let now = self.clock.now_ms();
        let phase = self.timing.phase;
        GameStateMessage {
            snapshot: RaceSnapshot {
                racers: self.racers.snapshot(),
                round: self.round,
                phase,
                phase_started_at: self.timing.started_at,
                phase_ends_at: self.timing.ends_at,
                click_window_countdown: (phase == Phase::ClickWindow)
                    .then(|| self.timing.ends_at.saturating_sub(now)),
                racing_elapsed: (phase == Phase::Racing)
                    .then(|| now.saturating_sub(self.timing.started_at)),
                is_slow_mo: self.race.is_slow_mo(),
                click_totals: self.ledger.totals().clone(),
                prize_pool: calculate_prize_pool(self.ledger.total(), &self.config),
                race_results: (phase == Phase::Results).then(|| self.last_results.clone()),
            },
            lobby: self.lobby.state(),
        }
    }

    pub fn add_player(&mut self, id: &str, nickname: Option<&str>) -> PlayerInfo {
        let now = self.clock.now_ms();
        let player = self.lobby.add_player(id, nickname, now, &mut self.rng);
        if !player.is_bot && self.timing.phase == Phase::Lobby {
            self.rebalance_bots(now);
        }
        self.emit_state();
        player
    }

    pub fn mark_disconnected(&mut self, id: &str) {
        if self.lobby.mark_disconnected(id) {
            self.emit_state();
        }
    }

    pub fn update_nickname(&mut self, id: &str, nickname: &str) -> bool {
        let updated = self.lobby.update_nickname(id, nickname);
        if updated {
            self.emit_state();
        }
        updated
    }

    /// Backs `racer_id` for the coming race. Only possible during LOBBY.
    pub fn choose_lizard(&mut self, player_id: &str, racer_id: &str) -> bool {
        if !self.racers.contains(racer_id) {
            return false;
        }
        let chosen = self.lobby.choose_racer(player_id, racer_id);
        if chosen {
            self.emit_state();
        }
        chosen
    }

    /// Single admission path for taps, shared by humans and bots.
    ///
    /// Phase and racer are validated before any rate-limit budget is spent.
    pub fn apply_boost(&mut self, player_id: &str, racer_id: &str) -> BoostResult {
        if self.timing.phase != Phase::ClickWindow {
            return BoostResult::rejected(BoostRejection::InvalidPhase);
        }
        if !self.racers.contains(racer_id) {
            return BoostResult::rejected(BoostRejection::InvalidLizard);
        }

        let now = self.clock.now_ms();
        if !self.limiter.try_acquire(player_id, now) {
            debug!("Boost from {} rate limited", player_id);
            return BoostResult::rejected(BoostRejection::RateLimited);
        }

        self.lobby.record_boost(player_id, now);
        self.ledger.record(player_id, racer_id);
        self.racers.sync_taps(&self.ledger);
        self.emit_state();
        BoostResult::applied()
    }

    /// Grants the daily free tickets once per calendar date.
    pub fn claim_daily_ticket(&mut self, player_id: &str) -> bool {
        let today = calendar_date(self.clock.now_ms(), self.config.utc_offset_minutes);
        let claimed =
            self.lobby
                .claim_daily_ticket(player_id, &today, self.config.daily_free_tickets);
        if claimed {
            self.emit_state();
        }
        claimed
    }

    pub fn buy_tickets(&mut self, player_id: &str, count: u64) -> bool {
        let bought = self
            .lobby
            .buy_tickets(player_id, count, self.config.ticket_cost);
        if bought {
            self.emit_state();
        }
        bought
    }

    pub fn apply_referral(&mut self, player_id: &str, code: &str) -> bool {
        let applied = self
            .lobby
            .apply_referral(player_id, code, self.config.referral_bonus);
        if applied {
            self.emit_state();
        }
        applied
    }

    /// Personal outcome of the last race, available until the next LOBBY.
    pub fn get_player_result(&self, player_id: &str) -> Option<PlayerRaceResult> {
        if !self.race_concluded {
            return None;
        }
        let player = self.lobby.get(player_id)?;
        let racer = self.racers.get(player.selection_id.as_deref()?)?;
        player_result(player_id, racer, &self.prize_pool, &self.ledger, &self.lobby)
    }

    pub fn get_player(&self, player_id: &str) -> Option<&PlayerInfo> {
        self.lobby.get(player_id)
    }

    pub fn phase(&self) -> Phase {
        self.timing.phase
    }

    pub fn timing(&self) -> PhaseTiming {
        self.timing
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn racers(&self) -> &RacerRegistry {
        &self.racers
    }

    pub fn racer_taps(&self, racer_id: &str) -> u32 {
        self.ledger.racer_taps(racer_id)
    }

    pub fn is_slow_mo(&self) -> bool {
        self.race.is_slow_mo()
    }

    pub fn bot_count(&self) -> usize {
        self.bots.len()
    }

    pub fn bots(&self) -> &[BotHandle] {
        self.bots.bots()
    }

    pub fn bots_active(&self) -> bool {
        self.bots.is_active()
    }

    pub fn is_racing(&self) -> bool {
        self.race.is_running()
    }

    pub fn prize_pool(&self) -> &PrizePool {
        &self.prize_pool
    }

    pub fn last_results(&self) -> &[RaceResult] {
        &self.last_results
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    fn schedule_phase(&mut self) {
        let Some(def) = self.config.phase_timeline.get(self.phase_index).copied() else {
            error!("Phase index {} outside the timeline", self.phase_index);
            return;
        };

        let now = self.clock.now_ms();
        self.timing = PhaseTiming {
            phase: def.name,
            started_at: now,
            ends_at: now + def.duration_ms,
        };

        self.scheduler.cancel(TimerSlot::Phase);
        self.handle_phase_start(def.name, now);
        self.scheduler.arm_once(TimerSlot::Phase, now, def.duration_ms);

        info!("Round {}: entered {}", self.round, def.name);
        self.emit_state();
    }

    fn advance_phase(&mut self) {
        let len = self.config.phase_timeline.len().max(1);
        self.phase_index = (self.phase_index + 1) % len;
        self.schedule_phase();
    }

    fn handle_phase_start(&mut self, phase: Phase, now: u64) {
        match phase {
            Phase::Lobby => {
                self.lobby.set_selection_lock(false);
                self.ledger.clear();
                self.racers.sync_taps(&self.ledger);
                self.limiter.clear();
                self.scheduler.cancel(TimerSlot::RaceTick);
                self.race.clear();
                self.race_concluded = false;
                self.stop_bots();
                let today = calendar_date(now, self.config.utc_offset_minutes);
                self.lobby.refresh_daily_claims(&today);
                self.rebalance_bots(now);
            }
            Phase::ClickWindow => {
                self.lobby.set_selection_lock(true);
                self.bots.activate(now, &mut self.rng);
                self.scheduler
                    .arm_interval(TimerSlot::BotTick, now, self.config.bot_tick_ms);
            }
            Phase::Racing => {
                self.start_race(now);
                self.bots.resume();
                if !self.scheduler.is_armed(TimerSlot::BotTick) {
                    self.scheduler
                        .arm_interval(TimerSlot::BotTick, now, self.config.bot_tick_ms);
                }
            }
            Phase::Results => {
                self.stop_bots();
                if self.race.is_running() && !self.race_concluded {
                    warn!(
                        "Round {} race still running at RESULTS, concluding early",
                        self.round
                    );
                    self.conclude_race();
                }
                self.scheduler.cancel(TimerSlot::RaceTick);
            }
        }
    }

    fn stop_bots(&mut self) {
        self.bots.deactivate();
        self.scheduler.cancel(TimerSlot::BotTick);
    }

    fn rebalance_bots(&mut self, now: u64) {
        let humans = self.lobby.human_count();
        let target = if humans > 0 {
            let per_human = self
                .rng
                .gen_range(self.config.bots_per_human_min..=self.config.bots_per_human_max);
            humans * per_human as usize
        } else {
            self.rng
                .gen_range(self.config.baseline_bots_min..=self.config.baseline_bots_max)
                as usize
        };

        let racer_ids = self.racers.ids();
        self.bots
            .rebalance(target, &racer_ids, &mut self.lobby, now, &mut self.rng);
    }

    fn start_race(&mut self, now: u64) {
        self.round += 1;
        self.race_concluded = false;
        self.race
            .start(&mut self.racers, &self.ledger, now, &self.config);
        self.scheduler
            .arm_interval(TimerSlot::RaceTick, now, self.config.tick_interval_ms);
        info!(
            "Round {} race started with {} taps",
            self.round,
            self.ledger.total()
        );
    }

    fn race_tick(&mut self, now: u64) {
        if !self.race.is_running() {
            self.scheduler.cancel(TimerSlot::RaceTick);
            return;
        }

        let outcome = self.race.tick(&mut self.racers, now, &self.config);
        self.emit_state();

        if outcome.all_finished {
            self.conclude_race();
        }
    }

    fn conclude_race(&mut self) {
        self.scheduler.cancel(TimerSlot::RaceTick);
        let ranked = self.race.conclude(&mut self.racers);
        self.race_concluded = true;

        self.prize_pool = calculate_prize_pool(self.ledger.total(), &self.config);
        self.last_results = build_race_results(&ranked, &self.prize_pool, &self.ledger, &self.lobby);

        if let Some(winner) = ranked.first() {
            info!(
                "Round {} won by {} ({} taps)",
                self.round,
                winner.name,
                self.ledger.racer_taps(&winner.id)
            );
        }

        let deliveries =
            distribute_prizes(&ranked, &self.prize_pool, &self.ledger, &mut self.lobby);
        for (player_id, result) in deliveries {
            self.send(GameEvent::PlayerResult { player_id, result });
        }

        self.emit_state();
    }

    fn bot_tick(&mut self, now: u64) {
        let due = self.bots.take_due(now, &mut self.rng);
        for (bot_id, racer_id) in due {
            self.apply_boost(&bot_id, &racer_id);
        }
    }

    fn emit_state(&mut self) {
        let state = self.state();
        self.send(GameEvent::State(Box::new(state)));
        self.send(GameEvent::Progress(RaceProgress {
            progress: self.racers.progress(),
            is_slow_mo: self.race.is_slow_mo(),
        }));
    }

    fn send(&self, event: GameEvent) {
        if let Err(e) = self.events.send(event) {
            debug!("Dropping game event, no listener: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::PhaseDefinition;

    fn test_config() -> GameConfig {
        GameConfig {
            phase_timeline: vec![
                PhaseDefinition::new(Phase::Lobby, 70),
                PhaseDefinition::new(Phase::ClickWindow, 40),
                PhaseDefinition::new(Phase::Racing, 60),
                PhaseDefinition::new(Phase::Results, 30),
            ],
            tick_interval_ms: 5,
            rng_seed: Some(7),
            ..GameConfig::default()
        }
    }

    fn setup(
        config: GameConfig,
    ) -> (
        GameLoop,
        ManualClock,
        mpsc::UnboundedReceiver<GameEvent>,
    ) {
        let clock = ManualClock::new(0);
        let (tx, rx) = mpsc::unbounded_channel();
        let game = GameLoop::new(config, Arc::new(clock.clone()), tx);
        (game, clock, rx)
    }

    /// Steps the clock from deadline to deadline up to `target`.
    fn advance(game: &mut GameLoop, clock: &ManualClock, delta: u64) {
        let target = clock.now_ms() + delta;
        while let Some(due) = game.next_deadline() {
            if due > target {
                break;
            }
            clock.set(due.max(clock.now_ms()));
            game.run_due();
        }
        clock.set(target);
        game.run_due();
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<GameEvent>) -> Vec<GameEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_start_enters_lobby_with_bots() {
        let (mut game, _clock, mut rx) = setup(test_config());
        game.start();

        assert_eq!(game.phase(), Phase::Lobby);
        assert_eq!(game.timing().ends_at, 70);
        assert!((6..=12).contains(&game.bot_count()));
        assert!(!drain(&mut rx).is_empty());
    }

    #[test]
    fn test_phase_cycle() {
        let (mut game, clock, _rx) = setup(test_config());
        game.start();

        advance(&mut game, &clock, 70);
        assert_eq!(game.phase(), Phase::ClickWindow);
        assert_eq!(game.timing().started_at, 70);
        assert_eq!(game.timing().ends_at, 110);

        advance(&mut game, &clock, 40);
        assert_eq!(game.phase(), Phase::Racing);
        assert_eq!(game.round(), 1);

        advance(&mut game, &clock, 60);
        assert_eq!(game.phase(), Phase::Results);

        advance(&mut game, &clock, 30);
        assert_eq!(game.phase(), Phase::Lobby);
        assert_eq!(game.timing().started_at, 200);
    }

    #[test]
    fn test_boost_outside_click_window() {
        let (mut game, _clock, _rx) = setup(test_config());
        game.start();
        game.add_player("p1", None);

        let result = game.apply_boost("p1", "gecko-1");
        assert_eq!(result, BoostResult::rejected(BoostRejection::InvalidPhase));
        assert_eq!(game.racer_taps("gecko-1"), 0);
        assert_eq!(game.get_player("p1").unwrap().total_boosts, 0);
    }

    #[test]
    fn test_boost_unknown_racer() {
        let (mut game, clock, _rx) = setup(test_config());
        game.start();
        game.add_player("p1", None);
        advance(&mut game, &clock, 70);

        let result = game.apply_boost("p1", "lizard-9");
        assert_eq!(result, BoostResult::rejected(BoostRejection::InvalidLizard));
    }

    #[test]
    fn test_selection_locked_after_lobby() {
        let (mut game, clock, _rx) = setup(test_config());
        game.start();
        game.add_player("p1", None);

        assert!(game.choose_lizard("p1", "gecko-2"));
        assert!(!game.choose_lizard("p1", "gecko-99"));

        advance(&mut game, &clock, 70);
        assert!(!game.choose_lizard("p1", "gecko-3"));
        assert_eq!(
            game.get_player("p1").unwrap().selection_id.as_deref(),
            Some("gecko-2")
        );
    }

    #[test]
    fn test_snapshot_fields_follow_phase() {
        let (mut game, clock, _rx) = setup(test_config());
        game.start();

        let lobby = game.state().snapshot;
        assert!(lobby.click_window_countdown.is_none());
        assert!(lobby.racing_elapsed.is_none());
        assert!(lobby.race_results.is_none());

        advance(&mut game, &clock, 80);
        let click = game.state().snapshot;
        assert_eq!(click.phase, Phase::ClickWindow);
        assert_eq!(click.click_window_countdown, Some(30));

        advance(&mut game, &clock, 40);
        let racing = game.state().snapshot;
        assert_eq!(racing.phase, Phase::Racing);
        assert_eq!(racing.racing_elapsed, Some(10));

        advance(&mut game, &clock, 60);
        let results = game.state().snapshot;
        assert_eq!(results.phase, Phase::Results);
        assert_eq!(results.race_results.map(|r| r.len()), Some(5));
    }

    #[test]
    fn test_every_emission_pairs_state_with_progress() {
        let (mut game, _clock, mut rx) = setup(test_config());
        game.start();
        game.add_player("p1", None);

        let events = drain(&mut rx);
        assert_eq!(events.len() % 2, 0);
        for pair in events.chunks(2) {
            assert!(matches!(pair[0], GameEvent::State(_)));
            assert!(matches!(pair[1], GameEvent::Progress(_)));
        }
    }

    #[test]
    fn test_results_entry_concludes_unfinished_race() {
        let mut config = test_config();
        // Baseline lanes need 5s; RACING ends long before that.
        config.tick_interval_ms = 10;
        let (mut game, clock, _rx) = setup(config);
        game.start();

        advance(&mut game, &clock, 110);
        assert!(game.is_racing());

        advance(&mut game, &clock, 60);
        assert_eq!(game.phase(), Phase::Results);
        assert!(!game.is_racing());
        assert!(game.racers().iter().all(|r| r.rank.is_some()));
        assert_eq!(game.racers().iter().map(|r| r.wins).sum::<u32>(), 1);
    }

    #[test]
    fn test_bots_only_tap_while_active() {
        let (mut game, clock, _rx) = setup(test_config());
        game.start();
        assert!(!game.bots_active());

        advance(&mut game, &clock, 70);
        assert!(game.bots_active());

        advance(&mut game, &clock, 40);
        assert!(game.bots_active());

        advance(&mut game, &clock, 60);
        assert!(!game.bots_active());
    }

    #[test]
    fn test_wallet_actions_emit_snapshots() {
        let (mut game, _clock, mut rx) = setup(test_config());
        game.start();
        game.add_player("p1", None);
        drain(&mut rx);

        assert!(game.claim_daily_ticket("p1"));
        assert_eq!(drain(&mut rx).len(), 2);

        assert!(!game.claim_daily_ticket("p1"));
        assert!(drain(&mut rx).is_empty());
        assert_eq!(game.get_player("p1").unwrap().wallet.tickets, 5);

        assert!(!game.buy_tickets("p1", 1));
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_player_result_unavailable_before_conclusion() {
        let (mut game, _clock, _rx) = setup(test_config());
        game.start();
        game.add_player("p1", None);
        game.choose_lizard("p1", "gecko-1");

        assert!(game.get_player_result("p1").is_none());
        assert!(game.get_player_result("nobody").is_none());
    }

    #[test]
    fn test_full_lobby_snapshot_fits_one_datagram() {
        use shared::{Packet, MAX_CLIENTS, MAX_DATAGRAM_SIZE, MAX_NICKNAME_CHARS, MAX_PLAYER_ID_LEN};

        let config = GameConfig {
            rng_seed: Some(1),
            ..GameConfig::default()
        };
        let (mut game, _clock, mut rx) = setup(config);
        game.start();

        let nickname = "🦎".repeat(MAX_NICKNAME_CHARS * 2);
        let ids: Vec<String> = (0..MAX_CLIENTS)
            .map(|i| format!("{:0>width$}", i, width = MAX_PLAYER_ID_LEN))
            .collect();
        for (index, id) in ids.iter().enumerate() {
            game.add_player(id, Some(&nickname));
            game.choose_lizard(id, "gecko-1");
            game.claim_daily_ticket(id);
            if index > 0 {
                let code = game.get_player(&ids[index - 1]).unwrap().referral_code.clone();
                game.apply_referral(id, &code.unwrap());
            }
            drain(&mut rx);
        }

        assert!(game.bot_count() >= MAX_CLIENTS * 6);
        let state = game.state();
        assert_eq!(state.lobby.players.len(), MAX_CLIENTS);
        assert_eq!(state.lobby.bot_count as usize, game.bot_count());
        assert_eq!(
            state.lobby.selections.values().sum::<u32>() as usize,
            MAX_CLIENTS + game.bot_count()
        );

        let bytes = bincode::serialize(&Packet::State(Box::new(state))).unwrap();
        // Leave room for tap totals and the results table later in the round.
        assert!(bytes.len() + 4_096 < MAX_DATAGRAM_SIZE, "{} bytes", bytes.len());
    }
}
