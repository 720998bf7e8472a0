//! Implied volatility gauges and their readings

use serde::Serialize;

const RED: &str = "#ef5350";
const ORANGE: &str = "#ffca28";
const GREEN: &str = "#66bb6a";
const BLUE: &str = "#42a5f5";
const NEUTRAL: &str = "#b2b5be";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Gauge {
    Vix,
    /// Skew index as a one-year percentile rank
    SkewRank,
    Vvix,
    /// VIX minus VIX3M
    TermStructure,
}

impl Gauge {
    pub const ALL: [Gauge; 4] = [Gauge::Vix, Gauge::SkewRank, Gauge::Vvix, Gauge::TermStructure];

    pub fn label(&self) -> &'static str {
        match self {
            Gauge::Vix => "VIX",
            Gauge::SkewRank => "Skew",
            Gauge::Vvix => "VVIX",
            Gauge::TermStructure => "VIX-VIX3M",
        }
    }

    /// Bar scale (min, max)
    pub fn scale(&self) -> (f64, f64) {
        match self {
            Gauge::Vix => (10.0, 35.0),
            Gauge::SkewRank => (0.0, 100.0),
            Gauge::Vvix => (70.0, 120.0),
            Gauge::TermStructure => (-5.0, 5.0),
        }
    }

    pub fn definition(&self) -> &'static str {
        match self {
            Gauge::Vix => "Expected S&P 500 volatility over the next 30 days. Higher values price bigger moves either way.",
            Gauge::SkewRank => "Demand for crash protection (OTM puts), ranked against the past year. Higher means tail hedges are expensive.",
            Gauge::Vvix => "Volatility of VIX itself. Flags when VIX is likely to jump.",
            Gauge::TermStructure => "Short-dated versus 3-month implied volatility. Normally negative; inversion signals present stress.",
        }
    }

    /// Marker position on the bar, 0-100
    pub fn bar_pct(&self, value: f64) -> f64 {
        let (min, max) = self.scale();
        if value <= min {
            0.0
        } else if value >= max {
            100.0
        } else {
            (value - min) / (max - min) * 100.0
        }
    }

    /// Reading for a value
    pub fn insight(&self, value: f64) -> Insight {
        let (title, desc, color) = match self {
            Gauge::Vix => {
                if value < 15.78 {
                    ("Complacency", "Little risk is priced in and sentiment is one-sided. Watch for a sudden reversal.", BLUE)
                } else if value < 20.0 {
                    ("Normal", "Volatility is in a healthy range with no excess fear or greed.", GREEN)
                } else if value < 24.0 {
                    ("Elevated Fear", "Hedging demand is rising. Expect wider daily swings.", ORANGE)
                } else {
                    ("Panic Mode", "Forced selling and protection buying at any price, typical of sharp drawdowns.", RED)
                }
            }
            Gauge::SkewRank => {
                if value < 20.0 {
                    ("Bullish", "Hardly anyone is buying crash protection. Beware of a reversal from euphoria.", BLUE)
                } else if value < 80.0 {
                    ("Normal", "Institutions hedge at a normal pace with no panic buying of puts.", NEUTRAL)
                } else {
                    ("High Tail Risk", "Crash protection is being bid aggressively. Large players fear a sudden drop.", RED)
                }
            }
            Gauge::Vvix => {
                if value < 85.0 {
                    ("Stable", "VIX itself is calm and risk is predictable.", GREEN)
                } else if value < 110.0 {
                    ("Shifting", "VIX is becoming unstable; the trend may be about to change.", ORANGE)
                } else {
                    ("Volatile", "VIX can spike at any moment. Consider reducing leverage.", RED)
                }
            }
            Gauge::TermStructure => {
                if value < -1.0 {
                    ("Contango", "Near-term risk is below longer-term risk, the normal bull-market shape.", GREEN)
                } else if value <= 0.0 {
                    ("Flattening", "Near-term fear is rising. Watch for inversion.", ORANGE)
                } else {
                    ("Inverted / Danger", "Near-term fear exceeds longer-term fear, usually alongside a sharp sell-off.", RED)
                }
            }
        };
        Insight { title, description: desc, color }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Insight {
    pub title: &'static str,
    pub description: &'static str,
    pub color: &'static str,
}

/// Round to two decimals, the display precision of every gauge
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vix_bands() {
        assert_eq!(Gauge::Vix.insight(12.0).title, "Complacency");
        assert_eq!(Gauge::Vix.insight(15.78).title, "Normal");
        assert_eq!(Gauge::Vix.insight(22.0).title, "Elevated Fear");
        assert_eq!(Gauge::Vix.insight(24.0).title, "Panic Mode");
    }

    #[test]
    fn test_term_structure_boundary() {
        assert_eq!(Gauge::TermStructure.insight(-1.5).title, "Contango");
        assert_eq!(Gauge::TermStructure.insight(0.0).title, "Flattening");
        assert_eq!(Gauge::TermStructure.insight(0.01).color, RED);
    }

    #[test]
    fn test_bar_pct_clamps() {
        assert_eq!(Gauge::Vix.bar_pct(5.0), 0.0);
        assert_eq!(Gauge::Vix.bar_pct(40.0), 100.0);
        assert!((Gauge::Vix.bar_pct(22.5) - 50.0).abs() < 1e-12);
        assert!((Gauge::TermStructure.bar_pct(-2.5) - 25.0).abs() < 1e-12);
    }

    #[test]
    fn test_skew_and_vvix() {
        assert_eq!(Gauge::SkewRank.insight(85.0).title, "High Tail Risk");
        assert_eq!(Gauge::Vvix.insight(100.0).title, "Shifting");
        assert_eq!(round2(1.23456), 1.23);
    }
}
