use chrono::{DateTime, FixedOffset, Utc};
use rand::Rng;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const REFERRAL_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const REFERRAL_CODE_LEN: usize = 6;

// Get current timestamp in milliseconds
pub fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

/// Calendar date (`YYYY-MM-DD`) of a millisecond timestamp in a fixed time zone.
///
/// Falls back to UTC when the offset is out of range.
pub fn calendar_date(timestamp_ms: u64, utc_offset_minutes: i32) -> String {
    let instant = DateTime::<Utc>::from_timestamp_millis(timestamp_ms as i64).unwrap_or_default();
    let date = match FixedOffset::east_opt(utc_offset_minutes.saturating_mul(60)) {
        Some(offset) => instant.with_timezone(&offset).date_naive(),
        None => instant.date_naive(),
    };
    date.format("%Y-%m-%d").to_string()
}

pub fn make_nickname<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("Racer-{:04X}", rng.gen_range(0..=0xFFFFu32))
}

pub fn make_referral_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..REFERRAL_CODE_LEN)
        .map(|_| REFERRAL_ALPHABET[rng.gen_range(0..REFERRAL_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_calendar_date_utc() {
        // 2024-03-01T23:30:00Z
        assert_eq!(calendar_date(1_709_335_800_000, 0), "2024-03-01");
    }

    #[test]
    fn test_calendar_date_crosses_midnight_with_offset() {
        // 23:30 UTC is 08:30 the next day at UTC+9
        assert_eq!(calendar_date(1_709_335_800_000, 540), "2024-03-02");
        assert_eq!(calendar_date(1_709_335_800_000, -60), "2024-03-01");
    }

    #[test]
    fn test_calendar_date_invalid_offset_falls_back_to_utc() {
        assert_eq!(calendar_date(1_709_335_800_000, 100_000), "2024-03-01");
    }

    #[test]
    fn test_referral_code_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        let code = make_referral_code(&mut rng);
        assert_eq!(code.len(), REFERRAL_CODE_LEN);
        assert!(code.bytes().all(|b| REFERRAL_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_nickname_prefix() {
        let mut rng = StdRng::seed_from_u64(1);
        let nickname = make_nickname(&mut rng);
        assert!(nickname.starts_with("Racer-"));
        assert_eq!(nickname.len(), "Racer-".len() + 4);
    }

    #[test]
    fn test_timestamp_is_monotonic_enough() {
        let first = get_timestamp();
        std::thread::sleep(Duration::from_millis(2));
        assert!(get_timestamp() > first);
    }
}
