//! Player registry and in-game economy
//!
//! This module owns every player record the engine knows about, human or bot:
//! - Join/leave lifecycle and nickname management
//! - Racer selection, gated by the phase-controlled selection lock
//! - Wallet operations (coins, tickets, daily free tickets, ticket purchases)
//! - Referral codes and one-time referral bonuses
//!
//! Player records outlive connections: a disconnected player keeps their
//! wallet and referral state and is marked connected again on rejoin.

use crate::utils::{make_nickname, make_referral_code};
use log::{debug, info, warn};
use rand::Rng;
use shared::{LobbyState, PlayerInfo, Wallet, MAX_NICKNAME_CHARS};
use std::collections::HashMap;

/// Registry of all players and their economic state
///
/// Selection changes are only accepted while the lock is open, which the
/// phase scheduler toggles at LOBBY and CLICK_WINDOW entry.
#[derive(Debug, Default)]
pub struct Lobby {
    /// Player records indexed by player ID
    players: HashMap<String, PlayerInfo>,
    /// Referral code to owning player ID
    referral_codes: HashMap<String, String>,
    /// When true, racer selections are frozen
    selection_locked: bool,
}

impl Lobby {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a human player or reconnects an existing one
    ///
    /// A known ID is marked connected again and keeps its wallet; a supplied
    /// nickname replaces the stored one. New players get a generated
    /// nickname when none is given and a fresh referral code.
    pub fn add_player<R: Rng + ?Sized>(
        &mut self,
        id: &str,
        nickname: Option<&str>,
        now: u64,
        rng: &mut R,
    ) -> PlayerInfo {
        if let Some(existing) = self.players.get_mut(id) {
            existing.connected = true;
            if let Some(nickname) = nickname {
                existing.nickname = clamp_nickname(nickname);
            }
            info!("Player {} reconnected", id);
            return existing.clone();
        }

        let code = make_referral_code(rng);
        if let Some(previous) = self.referral_codes.insert(code.clone(), id.to_string()) {
            warn!(
                "Referral code {} reassigned from {} to {}",
                code, previous, id
            );
        }

        let player = PlayerInfo {
            id: id.to_string(),
            nickname: nickname
                .map(clamp_nickname)
                .unwrap_or_else(|| make_nickname(rng)),
            joined_at: now,
            selection_id: None,
            total_boosts: 0,
            last_boost_at: 0,
            is_bot: false,
            connected: true,
            wallet: Wallet::default(),
            daily_ticket_claimed: false,
            last_daily_claim_date: None,
            referral_code: Some(code),
            referred_by: None,
            referral_count: 0,
        };

        info!("Player {} joined as {}", id, player.nickname);
        self.players.insert(id.to_string(), player.clone());
        player
    }

    /// Adds a bot record already backing `racer_id`
    ///
    /// Bots bypass the selection lock because they are only created while
    /// the population is resized at LOBBY entry.
    pub fn add_bot(&mut self, id: &str, nickname: String, racer_id: &str, now: u64) {
        let bot = PlayerInfo {
            id: id.to_string(),
            nickname,
            joined_at: now,
            selection_id: Some(racer_id.to_string()),
            total_boosts: 0,
            last_boost_at: 0,
            is_bot: true,
            connected: true,
            wallet: Wallet::default(),
            daily_ticket_claimed: false,
            last_daily_claim_date: None,
            referral_code: None,
            referred_by: None,
            referral_count: 0,
        };
        self.players.insert(id.to_string(), bot);
    }

    /// Deletes a player record entirely, including their referral code
    pub fn remove_player(&mut self, id: &str) -> bool {
        match self.players.remove(id) {
            Some(player) => {
                if let Some(code) = player.referral_code {
                    if self.referral_codes.get(&code).map(String::as_str) == Some(id) {
                        self.referral_codes.remove(&code);
                    }
                }
                true
            }
            None => false,
        }
    }

    pub fn mark_disconnected(&mut self, id: &str) -> bool {
        match self.players.get_mut(id) {
            Some(player) => {
                player.connected = false;
                info!("Player {} disconnected", id);
                true
            }
            None => false,
        }
    }

    pub fn set_selection_lock(&mut self, locked: bool) {
        self.selection_locked = locked;
    }

    pub fn update_nickname(&mut self, id: &str, nickname: &str) -> bool {
        match self.players.get_mut(id) {
            Some(player) => {
                player.nickname = clamp_nickname(nickname);
                true
            }
            None => false,
        }
    }

    /// Sets the racer a player backs. Fails for unknown players or while locked.
    pub fn choose_racer(&mut self, id: &str, racer_id: &str) -> bool {
        if self.selection_locked {
            return false;
        }
        match self.players.get_mut(id) {
            Some(player) => {
                player.selection_id = Some(racer_id.to_string());
                true
            }
            None => false,
        }
    }

    pub fn record_boost(&mut self, id: &str, now: u64) {
        if let Some(player) = self.players.get_mut(id) {
            player.total_boosts += 1;
            player.last_boost_at = now;
        }
    }

    /// Grants the daily free tickets once per calendar date
    ///
    /// `today` is the current date in the scheduler's time zone. A second
    /// claim on the same date is refused without touching the wallet.
    pub fn claim_daily_ticket(&mut self, id: &str, today: &str, tickets: u64) -> bool {
        let Some(player) = self.players.get_mut(id) else {
            return false;
        };
        if player.last_daily_claim_date.as_deref() == Some(today) {
            return false;
        }

        player.wallet.tickets += tickets;
        player.daily_ticket_claimed = true;
        player.last_daily_claim_date = Some(today.to_string());
        debug!("Player {} claimed {} daily tickets on {}", id, tickets, today);
        true
    }

    /// Clears stale `daily_ticket_claimed` flags left over from earlier dates
    pub fn refresh_daily_claims(&mut self, today: &str) {
        for player in self.players.values_mut() {
            if player.last_daily_claim_date.as_deref() != Some(today) {
                player.daily_ticket_claimed = false;
            }
        }
    }

    /// Buys `count` tickets at `cost` coins each
    ///
    /// Refused for a zero count or when the wallet cannot cover the price.
    pub fn buy_tickets(&mut self, id: &str, count: u64, cost: u64) -> bool {
        let Some(player) = self.players.get_mut(id) else {
            return false;
        };
        if count == 0 {
            return false;
        }
        let Some(price) = count.checked_mul(cost) else {
            return false;
        };
        if player.wallet.coins < price {
            return false;
        }

        player.wallet.coins -= price;
        player.wallet.total_spent += price;
        player.wallet.tickets += count;
        debug!("Player {} bought {} tickets for {} coins", id, count, price);
        true
    }

    /// Links a player to the owner of `code` and pays both the bonus
    ///
    /// Refused for unknown players or codes, self-referral, and players
    /// who were already referred.
    pub fn apply_referral(&mut self, id: &str, code: &str, bonus: u64) -> bool {
        let Some(referrer_id) = self.referral_codes.get(code).cloned() else {
            return false;
        };
        if referrer_id == id {
            return false;
        }
        match self.players.get(id) {
            Some(player) if player.referred_by.is_none() => {}
            _ => return false,
        }
        if !self.players.contains_key(&referrer_id) {
            return false;
        }

        if let Some(player) = self.players.get_mut(id) {
            player.referred_by = Some(referrer_id.clone());
            player.wallet.coins += bonus;
            player.wallet.total_earned += bonus;
        }
        if let Some(referrer) = self.players.get_mut(&referrer_id) {
            referrer.referral_count += 1;
            referrer.wallet.coins += bonus;
            referrer.wallet.total_earned += bonus;
        }

        debug!("Player {} referred by {}", id, referrer_id);
        true
    }

    pub fn add_coins(&mut self, id: &str, amount: u64) -> bool {
        match self.players.get_mut(id) {
            Some(player) => {
                player.wallet.coins += amount;
                player.wallet.total_earned += amount;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<&PlayerInfo> {
        self.players.get(id)
    }

    /// IDs of human players backing `racer_id`, sorted for stable payouts
    pub fn human_selectors(&self, racer_id: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .players
            .values()
            .filter(|player| !player.is_bot && player.selection_id.as_deref() == Some(racer_id))
            .map(|player| player.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Number of connected human players
    pub fn human_count(&self) -> usize {
        self.players
            .values()
            .filter(|player| !player.is_bot && player.connected)
            .count()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Human player list, per-racer selection counts and the bot total
    pub fn state(&self) -> LobbyState {
        let mut players = Vec::new();
        let mut selections = HashMap::new();
        let mut bot_count = 0;
        for player in self.players.values() {
            if let Some(selection) = &player.selection_id {
                *selections.entry(selection.clone()).or_insert(0) += 1;
            }
            if player.is_bot {
                bot_count += 1;
            } else {
                players.push(player.clone());
            }
        }
        players.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then_with(|| a.id.cmp(&b.id)));

        LobbyState {
            players,
            selections,
            bot_count,
        }
    }
}

fn clamp_nickname(nickname: &str) -> String {
    nickname.chars().take(MAX_NICKNAME_CHARS).collect()
}
