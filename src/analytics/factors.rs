//! Fama-French five-factor plus momentum exposures.
//!
//! Excess stock returns are regressed on `[1, Mkt-RF, SMB, HML, Mom, RMW]` by
//! ordinary least squares. Betas map to 0-10 scores and basket tags, and a
//! rolling market beta gives a monthly trend line.

use chrono::{Datelike, NaiveDate};
use ndarray::{Array1, Array2};
use smartcore::linalg::basic::arrays::Array;
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::linear::linear_regression::{
    LinearRegression, LinearRegressionParameters, LinearRegressionSolverName,
};
use serde::Serialize;

use crate::error::AnalyticsError;
use crate::sources::FactorFrame;
use crate::types::DailySeries;

pub const REGRESSORS: [&str; 5] = ["Mkt-RF", "SMB", "HML", "Mom", "RMW"];
const RISK_FREE: &str = "RF";

/// Regression coefficients
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RawBetas {
    pub alpha: f64,
    pub mkt: f64,
    pub smb: f64,
    pub hml: f64,
    pub mom: f64,
    pub rmw: f64,
}

/// 0-10 scores
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FactorScores {
    pub beta: f64,
    pub size: f64,
    pub value: f64,
    pub momentum: f64,
    pub quality: f64,
}

impl FactorScores {
    pub fn from_betas(b: &RawBetas) -> Self {
        let clip = |v: f64| v.clamp(0.0, 10.0);
        Self {
            beta: clip(5.0 + (b.mkt - 1.0) * 5.0),
            size: clip(5.0 + b.smb * 4.0),
            value: clip(5.0 + b.hml * 4.0),
            momentum: clip(5.0 + b.mom * 4.0),
            quality: clip(5.0 + b.rmw * 4.0),
        }
    }

    /// Basket tags joined with "; "
    pub fn baskets(&self) -> String {
        let mut tags = Vec::new();
        if self.beta >= 7.5 {
            tags.push("Aggressive (High Beta)");
        } else if self.beta <= 3.0 {
            tags.push("Defensive (Low Vol)");
        }
        if self.size >= 7.0 {
            tags.push("Small Cap");
        } else if self.size <= 3.0 {
            tags.push("Large Cap");
        }
        if self.value >= 7.0 {
            tags.push("Deep Value");
        } else if self.value <= 3.0 {
            tags.push("High Growth");
        }
        if self.momentum >= 7.5 {
            tags.push("High Momentum");
        } else if self.momentum <= 2.5 {
            tags.push("Falling Knife");
        }
        if self.quality >= 7.0 {
            tags.push("High Quality");
        } else if self.quality <= 3.0 {
            tags.push("Speculative/Junk");
        }
        tags.join("; ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactorFit {
    pub last_date: NaiveDate,
    pub observations: usize,
    pub betas: RawBetas,
    pub scores: FactorScores,
    pub baskets: String,
    /// Month-end rolling market betas, oldest first
    pub beta_trend: Vec<f64>,
}

impl FactorFit {
    pub fn beta_trend_string(&self) -> String {
        self.beta_trend
            .iter()
            .map(|b| format!("{:.2}", b))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Regression settings
#[derive(Debug, Clone, Copy)]
pub struct FitParams {
    pub min_days: usize,
    pub max_days: usize,
    pub rolling_window: usize,
    pub trend_months: usize,
}

impl Default for FitParams {
    fn default() -> Self {
        Self {
            min_days: 126,
            max_days: 756,
            rolling_window: 252,
            trend_months: 24,
        }
    }
}

/// OLS with intercept, solved by QR decomposition of the design matrix.
/// `x` excludes the constant column. Returns `[const, b1, ...]`.
pub fn ols(x: &Array2<f64>, y: &Array1<f64>) -> Result<Array1<f64>, AnalyticsError> {
    let n = x.nrows();
    if n != y.len() {
        return Err(AnalyticsError::InsufficientData {
            needed: n,
            have: y.len(),
        });
    }
    if n <= x.ncols() + 1 {
        return Err(AnalyticsError::InsufficientData {
            needed: x.ncols() + 2,
            have: n,
        });
    }

    let rows: Vec<Vec<f64>> = x.outer_iter().map(|r| r.to_vec()).collect();
    let design = DenseMatrix::from_2d_array(&rows.iter().map(|v| v.as_slice()).collect::<Vec<_>>())
        .map_err(|_| AnalyticsError::Singular)?;
    let target: Vec<f64> = y.to_vec();

    let params = LinearRegressionParameters::default().with_solver(LinearRegressionSolverName::QR);
    let model: LinearRegression<f64, f64, DenseMatrix<f64>, Vec<f64>> =
        LinearRegression::fit(&design, &target, params).map_err(|_| AnalyticsError::Singular)?;

    let mut coef = vec![*model.intercept()];
    coef.extend(model.coefficients().iterator(0).copied());
    if coef.len() != x.ncols() + 1 || coef.iter().any(|c| !c.is_finite()) {
        return Err(AnalyticsError::Singular);
    }
    Ok(Array1::from_vec(coef))
}

/// Slope of `y` on `x` with intercept
fn capm_beta(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len() as f64;
    if x.len() < 2 {
        return None;
    }
    let mx = x.iter().sum::<f64>() / n;
    let my = y.iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var = 0.0;
    for (a, b) in x.iter().zip(y) {
        cov += (a - mx) * (b - my);
        var += (a - mx).powi(2);
    }
    (var > 0.0).then(|| cov / var)
}

/// Rolling market beta, sampled at the last trading day of each month
fn monthly_rolling_beta(dates: &[NaiveDate], mkt: &[f64], excess: &[f64], window: usize, months: usize) -> Vec<f64> {
    let mut monthly: Vec<((i32, u32), f64)> = Vec::new();
    for end in window..=dates.len() {
        let start = end - window;
        let Some(beta) = capm_beta(&mkt[start..end], &excess[start..end]) else {
            continue;
        };
        let date = dates[end - 1];
        let key = (date.year(), date.month());
        match monthly.last_mut() {
            Some((k, v)) if *k == key => *v = beta,
            _ => monthly.push((key, beta)),
        }
    }
    let start = monthly.len().saturating_sub(months);
    monthly[start..].iter().map(|(_, b)| *b).collect()
}

/// Fit factor exposures for one stock from its daily closes
pub fn fit_factors(closes: &DailySeries, factors: &FactorFrame, params: &FitParams) -> Result<FactorFit, AnalyticsError> {
    if closes.len() < params.min_days {
        return Err(AnalyticsError::InsufficientData {
            needed: params.min_days,
            have: closes.len(),
        });
    }

    let columns: Vec<usize> = REGRESSORS
        .iter()
        .map(|c| factors.column_index(c))
        .collect::<Option<Vec<_>>>()
        .ok_or(AnalyticsError::Empty("factor columns"))?;
    let rf_col = factors
        .column_index(RISK_FREE)
        .ok_or(AnalyticsError::Empty("risk-free column"))?;

    let returns = closes.pct_change();
    let mut dates = Vec::new();
    let mut excess = Vec::new();
    let mut rows: Vec<Vec<f64>> = Vec::new();
    for (date, r) in returns.dates.iter().zip(&returns.values) {
        if let Some(row) = factors.row(*date) {
            dates.push(*date);
            excess.push(r - row[rf_col]);
            rows.push(columns.iter().map(|&c| row[c]).collect());
        }
    }

    if dates.len() < params.min_days {
        return Err(AnalyticsError::InsufficientData {
            needed: params.min_days,
            have: dates.len(),
        });
    }

    let window = dates.len().min(params.max_days);
    let start = dates.len() - window;
    let flat: Vec<f64> = rows[start..].iter().flatten().copied().collect();
    let x = Array2::from_shape_vec((window, REGRESSORS.len()), flat).map_err(|_| AnalyticsError::Singular)?;
    let y = Array1::from_vec(excess[start..].to_vec());
    let coef = ols(&x, &y)?;

    let betas = RawBetas {
        alpha: coef[0],
        mkt: coef[1],
        smb: coef[2],
        hml: coef[3],
        mom: coef[4],
        rmw: coef[5],
    };
    let scores = FactorScores::from_betas(&betas);

    let beta_trend = if dates.len() > params.rolling_window {
        let mkt: Vec<f64> = rows.iter().map(|r| r[0]).collect();
        monthly_rolling_beta(&dates, &mkt, &excess, params.rolling_window, params.trend_months)
    } else {
        vec![betas.mkt]
    };

    Ok(FactorFit {
        last_date: dates[dates.len() - 1],
        observations: window,
        baskets: scores.baskets(),
        betas,
        scores,
        beta_trend,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ols_recovers_exact_coefficients() {
        let n = 50;
        let mut x = Array2::<f64>::zeros((n, 2));
        let mut y = Array1::<f64>::zeros(n);
        for i in 0..n {
            let a = (i as f64 * 0.7).sin();
            let b = (i as f64 * 1.3).cos();
            x[[i, 0]] = a;
            x[[i, 1]] = b;
            y[i] = 0.5 + 2.0 * a - 1.5 * b;
        }
        let coef = ols(&x, &y).unwrap();
        assert!((coef[0] - 0.5).abs() < 1e-9);
        assert!((coef[1] - 2.0).abs() < 1e-9);
        assert!((coef[2] + 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_ols_nearly_collinear_columns() {
        let n = 60;
        let mut x = Array2::<f64>::zeros((n, 2));
        let mut y = Array1::<f64>::zeros(n);
        for i in 0..n {
            let a = (i as f64 * 0.7).sin();
            let b = a + 1e-6 * (i as f64 * 1.3).cos();
            x[[i, 0]] = a;
            x[[i, 1]] = b;
            y[i] = 0.5 + 2.0 * a - 1.5 * b;
        }
        let coef = ols(&x, &y).unwrap();
        assert!((coef[0] - 0.5).abs() < 1e-5);
        assert!((coef[1] - 2.0).abs() < 1e-5);
        assert!((coef[2] + 1.5).abs() < 1e-5);
    }

    #[test]
    fn test_ols_singular_design() {
        let x = Array2::<f64>::zeros((10, 2));
        let y = Array1::<f64>::zeros(10);
        assert_eq!(ols(&x, &y), Err(AnalyticsError::Singular));
    }

    #[test]
    fn test_scores_and_baskets() {
        let betas = RawBetas {
            alpha: 0.0,
            mkt: 1.6,
            smb: -0.6,
            hml: 0.6,
            mom: 0.0,
            rmw: -1.0,
        };
        let scores = FactorScores::from_betas(&betas);
        assert!((scores.beta - 8.0).abs() < 1e-12);
        assert!((scores.size - 2.6).abs() < 1e-12);
        assert!((scores.value - 7.4).abs() < 1e-12);
        assert_eq!(scores.momentum, 5.0);
        assert_eq!(scores.quality, 1.0);
        assert_eq!(
            scores.baskets(),
            "Aggressive (High Beta); Large Cap; Deep Value; Speculative/Junk"
        );

        let extreme = FactorScores::from_betas(&RawBetas {
            alpha: 0.0,
            mkt: 5.0,
            smb: -5.0,
            hml: 0.0,
            mom: -2.0,
            rmw: 0.0,
        });
        assert_eq!(extreme.beta, 10.0);
        assert_eq!(extreme.size, 0.0);
        assert!(extreme.baskets().contains("Falling Knife"));
    }

    #[test]
    fn test_monthly_rolling_beta_samples_month_end() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let dates: Vec<NaiveDate> = (0..90).map(|i| start + chrono::Duration::days(i)).collect();
        let mkt: Vec<f64> = (0..90).map(|i| ((i as f64) * 0.37).sin() * 0.01).collect();
        let excess: Vec<f64> = mkt.iter().map(|m| 1.5 * m).collect();
        let trend = monthly_rolling_beta(&dates, &mkt, &excess, 20, 24);
        // Jan 20 .. Mar 30 spans three months
        assert_eq!(trend.len(), 3);
        assert!(trend.iter().all(|b| (b - 1.5).abs() < 1e-9));
        assert_eq!(monthly_rolling_beta(&dates, &mkt, &excess, 20, 2).len(), 2);
    }
}
