//! Prize pool computation and payout to human participants.
//!
//! One currency unit is minted per tap. The platform keeps a fee, split
//! between burn and the owner club, and the rest is shared by finishing
//! rank. All amounts are floored; remainders are left undistributed.

use crate::config::GameConfig;
use crate::lobby::Lobby;
use crate::racers::TapLedger;
use log::info;
use shared::{PlayerRaceResult, PrizePool, PrizeShare, RaceResult, RacerState};

pub fn calculate_prize_pool(total_taps: u64, config: &GameConfig) -> PrizePool {
    let total_prize = total_taps;
    let platform_fee = total_prize * u64::from(config.platform_fee_percent) / 100;

    let split_total = u64::from(config.burn_percent + config.owner_club_percent);
    let burn_amount = if split_total == 0 {
        platform_fee
    } else {
        platform_fee * u64::from(config.burn_percent) / split_total
    };
    let owner_club_amount = platform_fee - burn_amount;

    let player_prize = total_prize - platform_fee;
    let distribution = config
        .prize_distribution
        .iter()
        .enumerate()
        .map(|(index, &percentage)| PrizeShare {
            rank: index as u32 + 1,
            percentage,
            amount: player_prize * u64::from(percentage) / 100,
        })
        .collect();

    PrizePool {
        total_taps,
        total_prize,
        platform_fee,
        burn_amount,
        owner_club_amount,
        player_prize,
        distribution,
    }
}

/// Integer share of `amount` for each of `recipients`.
pub fn split_evenly(amount: u64, recipients: usize) -> u64 {
    if recipients == 0 {
        0
    } else {
        amount / recipients as u64
    }
}

/// Public results table, one row per racer in finishing order.
pub fn build_race_results(
    ranked: &[RacerState],
    pool: &PrizePool,
    ledger: &TapLedger,
    lobby: &Lobby,
) -> Vec<RaceResult> {
    ranked
        .iter()
        .enumerate()
        .map(|(index, racer)| {
            let rank = index as u32 + 1;
            let share = pool.share_for_rank(rank);
            RaceResult {
                rank,
                racer_id: racer.id.clone(),
                racer_name: racer.name.clone(),
                total_taps: ledger.racer_taps(&racer.id),
                participants: lobby.human_selectors(&racer.id).len() as u32,
                prize_amount: share.map_or(0, |s| s.amount),
                prize_percentage: share.map_or(0, |s| s.percentage),
            }
        })
        .collect()
}

/// Personal result for one player backing `racer`, if it has been ranked.
pub fn player_result(
    player_id: &str,
    racer: &RacerState,
    pool: &PrizePool,
    ledger: &TapLedger,
    lobby: &Lobby,
) -> Option<PlayerRaceResult> {
    let rank = racer.rank?;
    let participants = lobby.human_selectors(&racer.id).len();
    let prize_earned = pool
        .share_for_rank(rank)
        .map_or(0, |share| split_evenly(share.amount, participants));

    Some(PlayerRaceResult {
        rank,
        racer_id: racer.id.clone(),
        racer_name: racer.name.clone(),
        my_taps: ledger.player_taps(player_id),
        total_taps: ledger.racer_taps(&racer.id),
        participants: participants as u32,
        prize_earned,
    })
}

/// Credits every human backer of a prize-winning racer.
///
/// Returns the per-player results to deliver, in rank order. Bots and
/// backers of ranks without a positive prize receive nothing.
pub fn distribute_prizes(
    ranked: &[RacerState],
    pool: &PrizePool,
    ledger: &TapLedger,
    lobby: &mut Lobby,
) -> Vec<(String, PlayerRaceResult)> {
    let mut delivered = Vec::new();
    let mut paid_total = 0;

    for racer in ranked {
        let Some(rank) = racer.rank else {
            continue;
        };
        let Some(share) = pool.share_for_rank(rank) else {
            continue;
        };
        if share.amount == 0 {
            continue;
        }

        let recipients = lobby.human_selectors(&racer.id);
        let individual = split_evenly(share.amount, recipients.len());
        if individual == 0 {
            continue;
        }

        for player_id in recipients {
            lobby.add_coins(&player_id, individual);
            paid_total += individual;
            if let Some(result) = player_result(&player_id, racer, pool, ledger, lobby) {
                delivered.push((player_id, result));
            }
        }
    }

    info!(
        "Distributed {} of {} player prize to {} players",
        paid_total,
        pool.player_prize,
        delivered.len()
    );
    delivered
}
