use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

pub const TRACK_LENGTH: f32 = 100.0;
pub const BASE_NORMALIZED_SPEED: f32 = 0.2;
pub const TAP_SPEED_GAIN: f32 = 0.8;
pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_DATAGRAM_SIZE: usize = 65_507;
/// Most concurrent clients a server accepts; keeps a full state snapshot
/// inside one datagram.
pub const MAX_CLIENTS: usize = 128;
pub const MAX_PLAYER_ID_LEN: usize = 64;
pub const MAX_NICKNAME_CHARS: usize = 24;

/// One state of the round state machine.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Lobby,
    ClickWindow,
    Racing,
    Results,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Lobby => "LOBBY",
            Phase::ClickWindow => "CLICK_WINDOW",
            Phase::Racing => "RACING",
            Phase::Results => "RESULTS",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static identity of a selectable racer.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RacerSeed {
    pub id: String,
    pub name: String,
    pub color: String,
    pub image: String,
}

pub fn gecko_seeds() -> Vec<RacerSeed> {
    [
        ("gecko-1", "Kira", "#7CFC00"),
        ("gecko-2", "Opal", "#00CED1"),
        ("gecko-3", "Miko", "#FFD700"),
        ("gecko-4", "Chip", "#FF6B6B"),
        ("gecko-5", "Flash", "#9370DB"),
    ]
    .iter()
    .enumerate()
    .map(|(index, (id, name, color))| RacerSeed {
        id: id.to_string(),
        name: name.to_string(),
        color: color.to_string(),
        image: format!("/assets/geckos/gecko_{}.png", index + 1),
    })
    .collect()
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RacerState {
    pub id: String,
    pub name: String,
    pub color: String,
    pub image: String,
    pub progress: f32,
    pub wins: u32,
    /// Milliseconds since race start at which the racer crossed the line.
    pub finish_time: Option<u64>,
    pub total_taps: u32,
    pub rank: Option<u32>,
}

impl RacerState {
    pub fn new(seed: RacerSeed) -> Self {
        Self {
            id: seed.id,
            name: seed.name,
            color: seed.color,
            image: seed.image,
            progress: 0.0,
            wins: 0,
            finish_time: None,
            total_taps: 0,
            rank: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct Wallet {
    pub coins: u64,
    pub tickets: u64,
    pub total_earned: u64,
    pub total_spent: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlayerInfo {
    pub id: String,
    pub nickname: String,
    pub joined_at: u64,
    pub selection_id: Option<String>,
    pub total_boosts: u64,
    pub last_boost_at: u64,
    pub is_bot: bool,
    pub connected: bool,
    pub wallet: Wallet,
    pub daily_ticket_claimed: bool,
    /// Calendar date (`YYYY-MM-DD`) of the last daily ticket claim.
    pub last_daily_claim_date: Option<String>,
    pub referral_code: Option<String>,
    pub referred_by: Option<String>,
    pub referral_count: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTiming {
    pub phase: Phase,
    pub started_at: u64,
    pub ends_at: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct PrizeShare {
    pub rank: u32,
    pub percentage: u32,
    pub amount: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct PrizePool {
    pub total_taps: u64,
    pub total_prize: u64,
    pub platform_fee: u64,
    pub burn_amount: u64,
    pub owner_club_amount: u64,
    pub player_prize: u64,
    pub distribution: Vec<PrizeShare>,
}

impl PrizePool {
    pub fn share_for_rank(&self, rank: u32) -> Option<&PrizeShare> {
        self.distribution.iter().find(|share| share.rank == rank)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RaceResult {
    pub rank: u32,
    pub racer_id: String,
    pub racer_name: String,
    pub total_taps: u32,
    pub participants: u32,
    pub prize_amount: u64,
    pub prize_percentage: u32,
}

/// Personal outcome of a race, delivered only to the player it belongs to.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PlayerRaceResult {
    pub rank: u32,
    pub racer_id: String,
    pub racer_name: String,
    pub my_taps: u32,
    pub total_taps: u32,
    pub participants: u32,
    pub prize_earned: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RaceSnapshot {
    pub racers: Vec<RacerState>,
    pub round: u32,
    pub phase: Phase,
    pub phase_started_at: u64,
    pub phase_ends_at: u64,
    pub click_window_countdown: Option<u64>,
    pub racing_elapsed: Option<u64>,
    pub is_slow_mo: bool,
    pub click_totals: HashMap<String, u32>,
    pub prize_pool: PrizePool,
    pub race_results: Option<Vec<RaceResult>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LobbyState {
    /// Human players only; bots are summarised by `bot_count` and `selections`.
    pub players: Vec<PlayerInfo>,
    /// Number of players backing each racer, bots included.
    pub selections: HashMap<String, u32>,
    pub bot_count: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GameStateMessage {
    pub snapshot: RaceSnapshot,
    pub lobby: LobbyState,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RaceProgress {
    pub progress: Vec<f32>,
    pub is_slow_mo: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum BoostRejection {
    InvalidPhase,
    InvalidLizard,
    RateLimited,
}

impl BoostRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoostRejection::InvalidPhase => "invalid_phase",
            BoostRejection::InvalidLizard => "invalid_lizard",
            BoostRejection::RateLimited => "rate_limited",
        }
    }
}

impl fmt::Display for BoostRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct BoostResult {
    pub applied: bool,
    pub reason: Option<BoostRejection>,
}

impl BoostResult {
    pub fn applied() -> Self {
        Self {
            applied: true,
            reason: None,
        }
    }

    pub fn rejected(reason: BoostRejection) -> Self {
        Self {
            applied: false,
            reason: Some(reason),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    SelectRacer,
    ClaimDailyTicket,
    BuyTickets,
    ApplyReferral,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Join {
        client_version: u32,
        player_id: Option<String>,
        nickname: Option<String>,
    },
    UpdateNickname {
        nickname: String,
    },
    SelectRacer {
        racer_id: String,
    },
    Boost {
        racer_id: String,
    },
    ClaimDailyTicket,
    BuyTickets {
        count: u32,
    },
    ApplyReferral {
        code: String,
    },
    RequestResult,
    Heartbeat,
    Leave,

    Welcome {
        player_id: String,
        nickname: String,
        selection_id: Option<String>,
        referral_code: Option<String>,
    },
    State(Box<GameStateMessage>),
    RaceProgress(RaceProgress),
    BoostResult(BoostResult),
    ActionResult {
        action: ActionKind,
        success: bool,
    },
    PlayerResult(Option<PlayerRaceResult>),
    Rejected {
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_gecko_seeds() {
        let seeds = gecko_seeds();
        assert_eq!(seeds.len(), 5);
        assert_eq!(seeds[0].id, "gecko-1");
        assert_eq!(seeds[0].name, "Kira");
        assert_eq!(seeds[4].image, "/assets/geckos/gecko_5.png");
    }

    #[test]
    fn test_racer_state_creation() {
        let racer = RacerState::new(gecko_seeds().remove(1));
        assert_eq!(racer.id, "gecko-2");
        assert_approx_eq!(racer.progress, 0.0, f32::EPSILON);
        assert_eq!(racer.wins, 0);
        assert!(racer.finish_time.is_none());
        assert!(racer.rank.is_none());
    }

    #[test]
    fn test_phase_names() {
        assert_eq!(Phase::Lobby.to_string(), "LOBBY");
        assert_eq!(Phase::ClickWindow.to_string(), "CLICK_WINDOW");
        assert_eq!(Phase::Racing.as_str(), "RACING");
        assert_eq!(Phase::Results.as_str(), "RESULTS");
    }

    #[test]
    fn test_boost_result_constructors() {
        let ok = BoostResult::applied();
        assert!(ok.applied);
        assert!(ok.reason.is_none());

        let rejected = BoostResult::rejected(BoostRejection::RateLimited);
        assert!(!rejected.applied);
        assert_eq!(rejected.reason, Some(BoostRejection::RateLimited));
        assert_eq!(BoostRejection::InvalidLizard.to_string(), "invalid_lizard");
    }

    #[test]
    fn test_prize_pool_share_lookup() {
        let pool = PrizePool {
            distribution: vec![
                PrizeShare {
                    rank: 1,
                    percentage: 75,
                    amount: 67,
                },
                PrizeShare {
                    rank: 2,
                    percentage: 15,
                    amount: 13,
                },
            ],
            ..PrizePool::default()
        };

        assert_eq!(pool.share_for_rank(2).map(|s| s.amount), Some(13));
        assert!(pool.share_for_rank(3).is_none());
    }

    #[test]
    fn test_packet_serialization_boost() {
        let packet = Packet::Boost {
            racer_id: "gecko-3".to_string(),
        };
        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::Boost { racer_id } => assert_eq!(racer_id, "gecko-3"),
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_state() {
        let racers: Vec<RacerState> = gecko_seeds().into_iter().map(RacerState::new).collect();
        let mut click_totals = HashMap::new();
        click_totals.insert("gecko-1".to_string(), 50);

        let packet = Packet::State(Box::new(GameStateMessage {
            snapshot: RaceSnapshot {
                racers,
                round: 3,
                phase: Phase::ClickWindow,
                phase_started_at: 1_000,
                phase_ends_at: 6_000,
                click_window_countdown: Some(5_000),
                racing_elapsed: None,
                is_slow_mo: false,
                click_totals,
                prize_pool: PrizePool::default(),
                race_results: None,
            },
            lobby: LobbyState {
                players: vec![],
                selections: HashMap::new(),
                bot_count: 0,
            },
        }));

        let serialized = bincode::serialize(&packet).unwrap();
        assert!(serialized.len() < MAX_DATAGRAM_SIZE);
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::State(state) => {
                assert_eq!(state.snapshot.round, 3);
                assert_eq!(state.snapshot.phase, Phase::ClickWindow);
                assert_eq!(state.snapshot.racers.len(), 5);
                assert_eq!(state.snapshot.click_totals.get("gecko-1"), Some(&50));
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_player_result() {
        let packet = Packet::PlayerResult(Some(PlayerRaceResult {
            rank: 1,
            racer_id: "gecko-1".to_string(),
            racer_name: "Kira".to_string(),
            my_taps: 12,
            total_taps: 40,
            participants: 2,
            prize_earned: 33,
        }));

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::PlayerResult(Some(result)) => {
                assert_eq!(result.rank, 1);
                assert_eq!(result.prize_earned, 33);
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }
}
