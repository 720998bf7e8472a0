//! Peak detection on a volume histogram
//!
//! Candidates are local maxima, thinned by a minimum index distance and a
//! strength floor, then balanced so neither side of spot dominates. When a
//! side has nothing within reach of spot the larger side is re-ranked by a
//! distance-weighted score before balancing again.

use serde::Serialize;
use std::cmp::Ordering;
use tracing::debug;

use super::histogram::Histogram;

pub const PEAK_COLOR: &str = "#CC0000";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Peak {
    pub idx: usize,
    pub price: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakParams {
    /// Peaks closer than this many bins compete
    pub dedup_window: usize,
    /// Fraction of the strongest peak a peak must reach
    pub strength_ratio: f64,
    /// Allowed count difference between the two sides
    pub max_side_diff: usize,
    /// Bins from spot that count as "near"
    pub near_bins: usize,
    /// Extra peaks the larger side may keep when re-ranked
    pub rescore_extra: usize,
    /// Decay applied to normalized squared distance
    pub decay: f64,
}

impl Default for PeakParams {
    fn default() -> Self {
        Self {
            dedup_window: 6,
            strength_ratio: 0.4,
            max_side_diff: 10,
            near_bins: 40,
            rescore_extra: 10,
            decay: 3.0_f64.ln(),
        }
    }
}

/// Peaks after the full pipeline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeakSelection {
    /// Sorted by price, highest first
    pub peaks: Vec<Peak>,
    pub rescore_triggered: bool,
    pub up_initial: usize,
    pub dn_initial: usize,
}

fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

fn cmp_keys(a: &[f64; 3], b: &[f64; 3]) -> Ordering {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| cmp_f64(*x, *y))
        .find(|o| *o != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

/// Interior bins at least as large as both neighbours
pub fn local_maxima(hist: &Histogram) -> Vec<Peak> {
    let v = &hist.volumes;
    if v.len() < 3 {
        return Vec::new();
    }
    (1..v.len() - 1)
        .filter(|&i| v[i] >= v[i - 1] && v[i] >= v[i + 1])
        .map(|i| Peak {
            idx: i,
            price: hist.prices[i],
            volume: v[i],
        })
        .collect()
}

/// Within `window` bins keep one peak: larger volume, then closer to spot, then higher price
pub fn dedup_within_window(candidates: &[Peak], spot: f64, window: usize) -> Vec<Peak> {
    let mut sorted = candidates.to_vec();
    sorted.sort_by_key(|p| p.idx);

    let key = |p: &Peak| [p.volume, -(p.price - spot).abs(), p.price];
    let mut kept: Vec<Peak> = Vec::new();
    for cand in sorted {
        let (conflicts, rest): (Vec<Peak>, Vec<Peak>) = kept
            .into_iter()
            .partition(|k| k.idx.abs_diff(cand.idx) < window);
        kept = rest;
        if conflicts.is_empty() {
            kept.push(cand);
            continue;
        }
        let mut best = cand;
        for c in conflicts {
            if cmp_keys(&key(&c), &key(&best)) == Ordering::Greater {
                best = c;
            }
        }
        kept.push(best);
    }
    kept.sort_by_key(|p| p.idx);
    kept
}

/// Drop peaks below `ratio` of the strongest one
pub fn apply_strength_threshold(peaks: &[Peak], ratio: f64) -> Vec<Peak> {
    let vmax = peaks.iter().map(|p| p.volume).fold(f64::NEG_INFINITY, f64::max);
    let floor = ratio * vmax;
    peaks.iter().copied().filter(|p| p.volume >= floor).collect()
}

fn split_sides(peaks: &[Peak], spot: f64) -> (Vec<Peak>, Vec<Peak>) {
    let up = peaks.iter().copied().filter(|p| p.price > spot).collect();
    let dn = peaks.iter().copied().filter(|p| p.price < spot).collect();
    (up, dn)
}

/// Remove the weakest peak. Ties go to the one closer to spot, then the one
/// further from the far end of the book (lowest above, highest below).
fn remove_weakest(side: &mut Vec<Peak>, spot: f64, above: bool) {
    let key = |p: &Peak| {
        let tie = if above { p.price } else { -p.price };
        [p.volume, (p.price - spot).abs(), tie]
    };
    let mut victim = None;
    for (i, p) in side.iter().enumerate() {
        match victim {
            None => victim = Some(i),
            Some(v) if cmp_keys(&key(p), &key(&side[v])) == Ordering::Less => victim = Some(i),
            _ => {}
        }
    }
    if let Some(i) = victim {
        side.remove(i);
    }
}

/// Split around spot (peaks at spot are discarded), trim to the optional
/// per-side targets, then trim the larger side until the counts differ by at
/// most `max_diff`.
pub fn balance_up_down(
    peaks: &[Peak],
    spot: f64,
    max_diff: usize,
    up_target: Option<usize>,
    dn_target: Option<usize>,
) -> (Vec<Peak>, Vec<Peak>) {
    let (mut up, mut dn) = split_sides(peaks, spot);
    if let Some(target) = up_target {
        while up.len() > target {
            remove_weakest(&mut up, spot, true);
        }
    }
    if let Some(target) = dn_target {
        while dn.len() > target {
            remove_weakest(&mut dn, spot, false);
        }
    }
    while up.len().abs_diff(dn.len()) > max_diff {
        if up.len() > dn.len() {
            remove_weakest(&mut up, spot, true);
        } else {
            remove_weakest(&mut dn, spot, false);
        }
    }
    (up, dn)
}

/// Whether any peak lies within `near_bins` of spot on the given side
pub fn has_near_peak(side: &[Peak], above: bool, spot_idx: usize, near_bins: usize) -> bool {
    side.iter().any(|p| {
        let dist = if above {
            p.idx as i64 - spot_idx as i64
        } else {
            spot_idx as i64 - p.idx as i64
        };
        dist > 0 && dist <= near_bins as i64
    })
}

/// Keep the `top_k` best peaks by `(v / vmax) * exp(-decay * (d / near_bins)^2)`,
/// best first. A side with no positive volume is returned unchanged.
pub fn top_k_by_score(side: &[Peak], spot_idx: usize, near_bins: usize, decay: f64, top_k: usize) -> Vec<Peak> {
    let vmax = side.iter().map(|p| p.volume).fold(f64::NEG_INFINITY, f64::max);
    if side.is_empty() || vmax <= 0.0 {
        return side.to_vec();
    }
    let scale = near_bins.max(1) as f64;
    let mut scored: Vec<(f64, Peak)> = side
        .iter()
        .map(|p| {
            let d_norm = p.idx.abs_diff(spot_idx) as f64 / scale;
            (p.volume / vmax * (-decay * d_norm * d_norm).exp(), *p)
        })
        .collect();
    scored.sort_by(|a, b| cmp_f64(b.0, a.0));
    scored.into_iter().take(top_k).map(|(_, p)| p).collect()
}

/// Run the whole selection against a histogram and spot price
pub fn detect_peaks(hist: &Histogram, spot: f64, params: &PeakParams) -> PeakSelection {
    let candidates = local_maxima(hist);
    let deduped = dedup_within_window(&candidates, spot, params.dedup_window);
    let mut filtered = apply_strength_threshold(&deduped, params.strength_ratio);
    if filtered.is_empty() {
        filtered = deduped.clone();
    }
    if filtered.is_empty() && hist.len() >= 3 {
        let idx = hist.nearest_idx(spot);
        filtered.push(Peak {
            idx,
            price: hist.prices[idx],
            volume: hist.volumes[idx],
        });
    }

    let (up_initial, dn_initial) = balance_up_down(&filtered, spot, params.max_side_diff, None, None);
    let spot_idx = hist.nearest_idx(spot);
    let near_up = has_near_peak(&up_initial, true, spot_idx, params.near_bins);
    let near_dn = has_near_peak(&dn_initial, false, spot_idx, params.near_bins);
    let rescore_triggered = !near_up || !near_dn;

    let (up_count, dn_count) = (up_initial.len(), dn_initial.len());
    let (up, dn) = if !rescore_triggered {
        (up_initial, dn_initial)
    } else {
        let (raw_up, raw_dn) = split_sides(&filtered, spot);
        let target = raw_up.len().min(raw_dn.len()) + params.rescore_extra;
        let (up, dn) = if raw_up.len() >= raw_dn.len() && !raw_up.is_empty() {
            let k = target.min(raw_up.len());
            (top_k_by_score(&raw_up, spot_idx, params.near_bins, params.decay, k), raw_dn)
        } else if raw_dn.len() > raw_up.len() {
            let k = target.min(raw_dn.len());
            (raw_up, top_k_by_score(&raw_dn, spot_idx, params.near_bins, params.decay, k))
        } else {
            (raw_up, raw_dn)
        };
        let merged: Vec<Peak> = up.into_iter().chain(dn).collect();
        balance_up_down(&merged, spot, params.max_side_diff, None, None)
    };

    let mut peaks: Vec<Peak> = up.into_iter().chain(dn).collect();
    peaks.sort_by(|a, b| cmp_f64(b.price, a.price));
    debug!(
        candidates = candidates.len(),
        kept = peaks.len(),
        rescore_triggered,
        "peak selection"
    );
    PeakSelection {
        peaks,
        rescore_triggered,
        up_initial: up_count,
        dn_initial: dn_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hist(volumes: &[f64]) -> Histogram {
        Histogram {
            bin_size: 1.0,
            prices: (0..volumes.len()).map(|i| i as f64 + 0.5).collect(),
            volumes: volumes.to_vec(),
        }
    }

    fn peak(idx: usize, volume: f64) -> Peak {
        Peak {
            idx,
            price: idx as f64 + 0.5,
            volume,
        }
    }

    #[test]
    fn test_local_maxima_includes_plateaus() {
        let h = hist(&[1.0, 3.0, 3.0, 1.0, 5.0, 2.0]);
        let idx: Vec<usize> = local_maxima(&h).iter().map(|p| p.idx).collect();
        assert_eq!(idx, vec![1, 2, 4]);
        assert!(local_maxima(&hist(&[1.0, 2.0])).is_empty());
    }

    #[test]
    fn test_dedup_prefers_volume_then_proximity() {
        let peaks = vec![peak(10, 5.0), peak(13, 8.0), peak(30, 4.0)];
        let kept = dedup_within_window(&peaks, 0.0, 6);
        assert_eq!(kept, vec![peak(13, 8.0), peak(30, 4.0)]);

        // Equal volume: closer to spot (20.5) wins
        let peaks = vec![peak(10, 5.0), peak(14, 5.0)];
        let kept = dedup_within_window(&peaks, 20.5, 6);
        assert_eq!(kept, vec![peak(14, 5.0)]);
    }

    #[test]
    fn test_dedup_chain_replaces_conflicts() {
        // 5 beats 0, then 9 conflicts only with 5 and loses
        let peaks = vec![peak(0, 1.0), peak(5, 3.0), peak(9, 2.0)];
        let kept = dedup_within_window(&peaks, 0.0, 6);
        assert_eq!(kept, vec![peak(5, 3.0)]);
    }

    #[test]
    fn test_strength_threshold() {
        let peaks = vec![peak(1, 10.0), peak(5, 4.5), peak(9, 3.9)];
        let kept = apply_strength_threshold(&peaks, 0.4);
        assert_eq!(kept, vec![peak(1, 10.0), peak(5, 4.5)]);
    }

    #[test]
    fn test_balance_trims_weakest_on_larger_side() {
        let spot = 2.0;
        let mut peaks: Vec<Peak> = (0..13).map(|i| peak(10 + i * 2, 10.0 + i as f64)).collect();
        peaks.push(peak(1, 50.0));
        let (up, dn) = balance_up_down(&peaks, spot, 10, None, None);
        assert_eq!(dn.len(), 1);
        assert_eq!(up.len(), 11);
        // The two lowest-volume peaks above were dropped
        assert!(up.iter().all(|p| p.volume >= 12.0));
    }

    #[test]
    fn test_balance_targets_and_spot_exclusion() {
        let peaks = vec![peak(1, 3.0), peak(2, 9.0), peak(4, 1.0), peak(6, 2.0), peak(8, 9.0)];
        let (up, dn) = balance_up_down(&peaks, 2.5, 10, Some(1), None);
        // Peak at exactly spot is on neither side
        assert_eq!(dn, vec![peak(1, 3.0)]);
        assert_eq!(up, vec![peak(8, 9.0)]);
    }

    #[test]
    fn test_volume_tie_removes_closest_to_spot() {
        let mut up = vec![peak(10, 5.0), peak(12, 5.0)];
        remove_weakest(&mut up, 0.0, true);
        assert_eq!(up, vec![peak(12, 5.0)]);
    }

    #[test]
    fn test_near_peak_window() {
        let side = vec![peak(60, 1.0)];
        assert!(has_near_peak(&side, true, 20, 40));
        assert!(!has_near_peak(&side, true, 19, 40));
        assert!(!has_near_peak(&side, false, 20, 40));
        assert!(has_near_peak(&[peak(5, 1.0)], false, 45, 40));
    }

    #[test]
    fn test_score_penalizes_distance() {
        // Same volume: the nearer peak scores higher
        let side = vec![peak(90, 10.0), peak(55, 10.0), peak(70, 10.0)];
        let top = top_k_by_score(&side, 50, 40, 3.0_f64.ln(), 2);
        assert_eq!(top, vec![peak(55, 10.0), peak(70, 10.0)]);

        // At one normalized unit the weight is exactly 1/3
        let side = vec![peak(90, 10.0), peak(51, 4.0)];
        let top = top_k_by_score(&side, 50, 40, 3.0_f64.ln(), 1);
        assert_eq!(top, vec![peak(51, 4.0)]);

        let zero = vec![peak(1, 0.0)];
        assert_eq!(top_k_by_score(&zero, 0, 40, 1.0, 0), zero);
    }

    #[test]
    fn test_detect_peaks_without_rescore() {
        let mut v = vec![1.0; 60];
        v[20] = 10.0;
        v[40] = 12.0;
        let h = hist(&v);
        let sel = detect_peaks(&h, 30.5, &PeakParams::default());
        assert!(!sel.rescore_triggered);
        assert_eq!((sel.up_initial, sel.dn_initial), (1, 1));
        let prices: Vec<f64> = sel.peaks.iter().map(|p| p.price).collect();
        assert_eq!(prices, vec![40.5, 20.5]);
    }

    #[test]
    fn test_detect_peaks_rescore_when_side_missing() {
        let mut v = vec![1.0; 80];
        v[70] = 10.0;
        v[60] = 8.0;
        let h = hist(&v);
        // Spot near the bottom: nothing below, rescore kicks in
        let sel = detect_peaks(&h, 2.5, &PeakParams::default());
        assert!(sel.rescore_triggered);
        assert_eq!(sel.dn_initial, 0);
        assert_eq!(sel.peaks.len(), 2);
        assert_eq!(sel.peaks[0].idx, 70);
    }

    #[test]
    fn test_detect_peaks_flat_falls_back() {
        // Flat histogram: every interior bin is a plateau max, dedup keeps a spread
        let h = hist(&[2.0; 5]);
        let sel = detect_peaks(&h, 0.0, &PeakParams::default());
        assert!(!sel.peaks.is_empty());
        assert!(sel.peaks.iter().all(|p| p.price > 0.0));
    }
}
