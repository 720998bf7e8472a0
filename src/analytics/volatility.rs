//! Annualised volatility, mean daily return and return z-scores

use super::stats::{mean, pct_change, sample_std};
use crate::error::AnalyticsError;

pub const TRADING_DAYS_PER_YEAR: usize = 252;

/// One-year statistics from daily closes, both in percent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolStats {
    /// Annualised volatility (VOLATILITY_360D)
    pub vol_pct: f64,
    /// Mean daily return (MU_1D)
    pub mu_pct: f64,
}

/// Statistics over the last 252 closes; fewer closes is an error
pub fn vol_and_mu(closes: &[f64]) -> Result<VolStats, AnalyticsError> {
    if closes.len() < TRADING_DAYS_PER_YEAR {
        return Err(AnalyticsError::InsufficientData {
            needed: TRADING_DAYS_PER_YEAR,
            have: closes.len(),
        });
    }
    let window = &closes[closes.len() - TRADING_DAYS_PER_YEAR..];
    let returns: Vec<f64> = pct_change(window).into_iter().filter(|r| r.is_finite()).collect();
    let std = sample_std(&returns).ok_or(AnalyticsError::Empty("returns"))?;
    let mu = mean(&returns).ok_or(AnalyticsError::Empty("returns"))?;
    Ok(VolStats {
        vol_pct: std * (TRADING_DAYS_PER_YEAR as f64).sqrt() * 100.0,
        mu_pct: mu * 100.0,
    })
}

/// Today's move in units of daily volatility: `pct_today * 16 / vol_pct`
pub fn zs_live(pct_today: f64, vol_pct: f64) -> Option<f64> {
    if !(vol_pct > 0.0) || !pct_today.is_finite() {
        return None;
    }
    let z = pct_today * 16.0 / vol_pct;
    z.is_finite().then_some(z)
}

/// Five-day z-score with drift correction.
///
/// `recent_pct` holds the daily returns in percent, newest first; the first
/// five cells are used and missing cells are skipped when compounding. With
/// `sigma_1d = vol_pct / 1600` and `mu = mu_pct / 100`:
/// `(prod(1 + r) - 1 - 5 * mu) / (sigma_1d * sqrt(5))`.
pub fn zs_5d(recent_pct: &[Option<f64>], vol_pct: f64, mu_pct: f64) -> Option<f64> {
    if recent_pct.len() < 5 || !(vol_pct > 0.0) || !mu_pct.is_finite() {
        return None;
    }
    let available: Vec<f64> = recent_pct[..5].iter().flatten().copied().collect();
    if available.is_empty() {
        return None;
    }
    let growth: f64 = available.iter().map(|p| 1.0 + p / 100.0).product();
    let r5 = growth - 1.0;
    let sigma_1d = vol_pct / 1600.0;
    let mu = mu_pct / 100.0;
    let z = (r5 - 5.0 * mu) / (sigma_1d * 5f64.sqrt());
    z.is_finite().then_some(z)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vol_and_mu_requires_a_year() {
        let closes = vec![100.0; 251];
        assert_eq!(
            vol_and_mu(&closes),
            Err(AnalyticsError::InsufficientData { needed: 252, have: 251 })
        );
    }

    #[test]
    fn test_vol_and_mu_alternating_returns() {
        // Older noise is ignored: only the last 252 closes count
        let mut closes = vec![1.0, 500.0, 3.0];
        let mut p = 100.0;
        for i in 0..252 {
            closes.push(p);
            p *= if i % 2 == 0 { 1.01 } else { 1.0 / 1.01 };
        }
        let stats = vol_and_mu(&closes).unwrap();
        // Returns alternate +1% / -0.990099%
        let up = 0.01;
        let down = 1.0 / 1.01 - 1.0;
        let returns: Vec<f64> = (0..251).map(|i| if i % 2 == 0 { up } else { down }).collect();
        let expected_vol = sample_std(&returns).unwrap() * 252f64.sqrt() * 100.0;
        assert!((stats.vol_pct - expected_vol).abs() < 1e-9);
        assert!(stats.mu_pct > 0.0 && stats.mu_pct < 0.01);
    }

    #[test]
    fn test_zs_live() {
        assert_eq!(zs_live(1.0, 16.0), Some(1.0));
        assert_eq!(zs_live(-2.0, 32.0), Some(-1.0));
        assert_eq!(zs_live(1.0, 0.0), None);
        assert_eq!(zs_live(f64::NAN, 20.0), None);
    }

    #[test]
    fn test_zs_5d() {
        let flat = [Some(0.0); 5];
        assert_eq!(zs_5d(&flat, 16.0, 0.0), Some(0.0));
        // One 1% day, vol 16% -> sigma_1d = 1%, z = 0.01 / (0.01 * sqrt 5)
        let z = zs_5d(&[Some(1.0), Some(0.0), Some(0.0), Some(0.0), Some(0.0)], 16.0, 0.0).unwrap();
        assert!((z - 1.0 / 5f64.sqrt()).abs() < 1e-12);
        // Drift of 0.2%/day cancels exactly 5 * 0.2% cumulative (to first order)
        let z = zs_5d(&[Some(0.2); 5], 16.0, 0.2).unwrap();
        assert!(z.abs() < 0.01);
        assert_eq!(zs_5d(&[Some(1.0); 4], 16.0, 0.0), None);
    }

    #[test]
    fn test_zs_5d_skips_missing_days() {
        let gappy = [Some(1.0), None, Some(0.0), None, None];
        let z = zs_5d(&gappy, 16.0, 0.0).unwrap();
        assert!((z - 1.0 / 5f64.sqrt()).abs() < 1e-12);
        // Only the newest five cells count
        let z = zs_5d(&[None, None, None, None, Some(1.0), Some(50.0)], 16.0, 0.0).unwrap();
        assert!((z - 1.0 / 5f64.sqrt()).abs() < 1e-12);
        assert_eq!(zs_5d(&[None; 5], 16.0, 0.0), None);
    }
}
