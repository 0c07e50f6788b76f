//! Rarity price model and bargain scoring.

/// Expected prices never use a floor below this (ETH)
pub const MIN_FLOOR_PRICE: f64 = 0.01;

const BASE_MULTIPLIER: f64 = 1.5;
const RANK_DECAY: f64 = 0.99;

/// Fair value for a token of `rank` given the live floor.
///
/// Tends to `1.5 * floor` as rank worsens and reaches `~3 * floor` at rank 1.
/// `volume` is accepted but does not influence the curve.
pub fn expected_price(rank: u32, floor_price: f64, _volume: f64) -> f64 {
    let rank = rank.max(1) as i32;
    floor_price * BASE_MULTIPLIER * (1.0 + RANK_DECAY.powi(rank))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BargainQuote {
    pub expected_price: f64,
    pub price_diff: f64,
    pub discount_pct: f64,
    pub rank_bonus: f64,
    pub bargain_score: f64,
}

/// Price a listing against its rarity-adjusted fair value.
pub fn quote_bargain(
    rank: u32,
    current_price: f64,
    floor_price: f64,
    volume: f64,
    rank_threshold: u32,
) -> BargainQuote {
    let expected = expected_price(rank, floor_price.max(MIN_FLOOR_PRICE), volume);
    let price_diff = current_price - expected;
    let discount_pct = (expected - current_price) / expected * 100.0;
    let rank_bonus = (rank_threshold as f64 - rank as f64) / 10.0;

    BargainQuote {
        expected_price: expected,
        price_diff,
        discount_pct,
        rank_bonus,
        bargain_score: bargain_score(discount_pct, rank_bonus),
    }
}

fn bargain_score(discount_pct: f64, rank_bonus: f64) -> f64 {
    let raw = discount_pct + rank_bonus;
    if raw.is_nan() {
        return 0.0;
    }
    raw.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_price_decreases_with_rank_and_stays_bounded() {
        let floor = 0.8;
        let mut previous = f64::INFINITY;
        for rank in 1..=1000 {
            let price = expected_price(rank, floor, 0.0);
            assert!(price < previous, "not decreasing at rank {rank}");
            assert!(price > 1.5 * floor && price <= 3.0 * floor);
            previous = price;
        }
    }

    #[test]
    fn worked_example_rank_500() {
        let q = quote_bargain(500, 1.0, 1.0, 0.0, 1000);
        assert!((q.expected_price - 1.5099).abs() < 1e-3);
        assert!((q.price_diff + 0.5099).abs() < 1e-3);
        assert!((q.bargain_score - 83.78).abs() < 0.05);
    }

    #[test]
    fn zero_floor_uses_minimum() {
        let q = quote_bargain(1000, 0.02, 0.0, 0.0, 1000);
        assert!((q.expected_price - expected_price(1000, MIN_FLOOR_PRICE, 0.0)).abs() < 1e-12);
    }

    #[test]
    fn score_is_clamped() {
        // Top rank and nearly free: raw score far above 100
        assert_eq!(quote_bargain(1, 0.0001, 1.0, 0.0, 1000).bargain_score, 100.0);
        // Heavily overpriced low rank: raw score below 0
        assert_eq!(quote_bargain(1000, 50.0, 1.0, 0.0, 1000).bargain_score, 0.0);
    }
}
