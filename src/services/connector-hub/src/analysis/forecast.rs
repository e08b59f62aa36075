//! Compounding Financial Forecasts
//!
//! Projects monthly revenue and expenses over a horizon of up to five years.
//! Revenue compounds at the given annual growth rate with a fixed seasonal
//! curve (Q4 peak, Q1 dip) and a little noise; expenses grow at 80% of the
//! revenue rate without seasonality. On top of the series the forecast
//! carries growth opportunities and risk flags with a risk-adjusted view of
//! the first year.

use super::round_currency;
use crate::error::{ConnectorError, ConnectorResult};
use omniflow_shared::RiskLevel;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Monthly seasonal multipliers, January through December.
pub const SEASONAL_FACTORS: [f64; 12] = [
    0.85, 0.90, 0.95, 1.00, 1.02, 1.05, 1.03, 1.01, 1.08, 1.12, 1.15, 1.20,
];

pub const MAX_HORIZON_MONTHS: u32 = 60;

/// Expenses are assumed to grow slower than revenue.
const EXPENSE_GROWTH_DAMPING: f64 = 0.8;
/// Baseline expense level relative to revenue.
const EXPENSE_REVENUE_RATIO: f64 = 0.7;
/// Haircut applied to first-year revenue for the risk-adjusted view.
const RISK_ADJUSTMENT: f64 = 0.85;

const REVENUE_NOISE: (f64, f64) = (0.95, 1.05);
const EXPENSE_NOISE: (f64, f64) = (0.92, 1.08);

// ============================================================================
// Types
// ============================================================================

/// Inputs for a forecast, typically assembled from accounting data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastInput {
    /// Current monthly revenue.
    pub current_revenue: f64,
    /// Annual growth rate, e.g. 0.05 for 5%.
    #[serde(default = "default_growth_rate")]
    pub growth_rate: f64,
    /// Trailing monthly revenue figures, newest last. Optional context.
    #[serde(default)]
    pub historical_revenue: Vec<f64>,
}

fn default_growth_rate() -> f64 {
    0.05
}

/// A strategic opportunity surfaced alongside the projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrowthOpportunity {
    pub name: String,
    pub description: String,
    /// Expected revenue upside as a fraction, e.g. 0.25 for +25%.
    pub revenue_upside: f64,
    pub implementation_months: u32,
    pub investment: f64,
    pub confidence: f64,
    pub risk: RiskLevel,
}

/// A risk that could undercut the projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFlag {
    pub factor: String,
    pub probability: f64,
    pub impact: RiskLevel,
    pub mitigation: String,
}

/// Complete financial forecast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialForecast {
    pub horizon_months: u32,
    pub revenue: Vec<f64>,
    pub expenses: Vec<f64>,
    pub profit: Vec<f64>,
    pub projected_growth_rate: f64,
    pub confidence: f64,
    pub opportunities: Vec<GrowthOpportunity>,
    pub risk_flags: Vec<RiskFlag>,
    pub overall_risk_score: f64,
    /// First-year revenue with the risk haircut applied.
    pub risk_adjusted_revenue: Vec<f64>,
}

// ============================================================================
// Projection
// ============================================================================

/// Project revenue, expenses and profit over `horizon_months`.
pub fn project(input: &ForecastInput, horizon_months: u32) -> ConnectorResult<FinancialForecast> {
    if input.current_revenue <= 0.0 {
        return Err(ConnectorError::validation(
            "current_revenue",
            "current revenue must be positive",
        ));
    }
    if horizon_months == 0 || horizon_months > MAX_HORIZON_MONTHS {
        return Err(ConnectorError::validation(
            "horizon_months",
            format!("horizon must be between 1 and {MAX_HORIZON_MONTHS} months"),
        ));
    }

    let growth = input.growth_rate;
    let revenue = revenue_series(input.current_revenue, growth, horizon_months);
    let expenses = expense_series(
        input.current_revenue * EXPENSE_REVENUE_RATIO,
        growth * EXPENSE_GROWTH_DAMPING,
        horizon_months,
    );
    let profit: Vec<f64> = revenue
        .iter()
        .zip(&expenses)
        .map(|(r, e)| round_currency(r - e))
        .collect();
    let risk_adjusted_revenue: Vec<f64> = revenue
        .iter()
        .take(12)
        .map(|r| round_currency(r * RISK_ADJUSTMENT))
        .collect();

    Ok(FinancialForecast {
        horizon_months,
        revenue,
        expenses,
        profit,
        // The projection assumes momentum compounds slightly.
        projected_growth_rate: growth * 1.1,
        confidence: 0.87,
        opportunities: growth_opportunities(),
        risk_flags: risk_flags(),
        overall_risk_score: 0.28,
        risk_adjusted_revenue,
    })
}

/// Compounding revenue with seasonality and noise.
fn revenue_series(base: f64, growth_rate: f64, months: u32) -> Vec<f64> {
    let mut rng = rand::thread_rng();
    (0..months)
        .map(|month| {
            let trend = base * (1.0 + growth_rate).powf(f64::from(month) / 12.0);
            let seasonal = SEASONAL_FACTORS[(month % 12) as usize];
            let noise = rng.gen_range(REVENUE_NOISE.0..=REVENUE_NOISE.1);
            round_currency(trend * seasonal * noise)
        })
        .collect()
}

/// Compounding expenses with month-to-month variation, no seasonality.
fn expense_series(base: f64, growth_rate: f64, months: u32) -> Vec<f64> {
    let mut rng = rand::thread_rng();
    (0..months)
        .map(|month| {
            let trend = base * (1.0 + growth_rate).powf(f64::from(month) / 12.0);
            let variation = rng.gen_range(EXPENSE_NOISE.0..=EXPENSE_NOISE.1);
            round_currency(trend * variation)
        })
        .collect()
}

fn growth_opportunities() -> Vec<GrowthOpportunity> {
    vec![
        GrowthOpportunity {
            name: "Market Expansion".to_string(),
            description: "Enter two to three adjacent geographic markets".to_string(),
            revenue_upside: 0.25,
            implementation_months: 8,
            investment: 150_000.0,
            confidence: 0.78,
            risk: RiskLevel::Medium,
        },
        GrowthOpportunity {
            name: "Product Line Extension".to_string(),
            description: "Develop complementary products for existing customers".to_string(),
            revenue_upside: 0.35,
            implementation_months: 12,
            investment: 200_000.0,
            confidence: 0.85,
            risk: RiskLevel::Low,
        },
        GrowthOpportunity {
            name: "Digital Transformation".to_string(),
            description: "Automate customer experience and operations".to_string(),
            revenue_upside: 0.18,
            implementation_months: 6,
            investment: 75_000.0,
            confidence: 0.92,
            risk: RiskLevel::Low,
        },
    ]
}

fn risk_flags() -> Vec<RiskFlag> {
    vec![
        RiskFlag {
            factor: "Market competition".to_string(),
            probability: 0.35,
            impact: RiskLevel::High,
            mitigation: "Strengthen value proposition and customer loyalty".to_string(),
        },
        RiskFlag {
            factor: "Economic downturn".to_string(),
            probability: 0.25,
            impact: RiskLevel::High,
            mitigation: "Diversify customer base and build cash reserves".to_string(),
        },
        RiskFlag {
            factor: "Supply chain disruption".to_string(),
            probability: 0.20,
            impact: RiskLevel::Medium,
            mitigation: "Develop alternative suppliers and buffer inventory".to_string(),
        },
    ]
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_input() -> ForecastInput {
        ForecastInput {
            current_revenue: 1_000_000.0,
            growth_rate: 0.08,
            historical_revenue: vec![900_000.0, 940_000.0, 970_000.0],
        }
    }

    #[test]
    fn test_non_positive_revenue_is_rejected() {
        let mut input = create_test_input();
        input.current_revenue = 0.0;
        assert!(project(&input, 12).is_err());
    }

    #[test]
    fn test_horizon_bounds() {
        let input = create_test_input();
        assert!(project(&input, 0).is_err());
        assert!(project(&input, 61).is_err());
        assert!(project(&input, 60).is_ok());
    }

    #[test]
    fn test_series_lengths_match_horizon() {
        let forecast = project(&create_test_input(), 18).unwrap();
        assert_eq!(forecast.revenue.len(), 18);
        assert_eq!(forecast.expenses.len(), 18);
        assert_eq!(forecast.profit.len(), 18);
        assert_eq!(forecast.risk_adjusted_revenue.len(), 12);
    }

    #[test]
    fn test_short_horizon_risk_adjustment_is_truncated() {
        let forecast = project(&create_test_input(), 6).unwrap();
        assert_eq!(forecast.risk_adjusted_revenue.len(), 6);
    }

    #[test]
    fn test_first_month_stays_within_noise_bounds() {
        let input = create_test_input();
        let forecast = project(&input, 12).unwrap();
        // Month 0: no compounding yet, January seasonal factor 0.85.
        let baseline = input.current_revenue * SEASONAL_FACTORS[0];
        assert!(forecast.revenue[0] >= baseline * REVENUE_NOISE.0 - 0.01);
        assert!(forecast.revenue[0] <= baseline * REVENUE_NOISE.1 + 0.01);
    }

    #[test]
    fn test_december_carries_peak_seasonality() {
        let input = create_test_input();
        let forecast = project(&input, 12).unwrap();
        let trend = input.current_revenue * (1.0 + input.growth_rate).powf(11.0 / 12.0);
        let baseline = trend * SEASONAL_FACTORS[11];
        assert!(forecast.revenue[11] >= baseline * REVENUE_NOISE.0 - 0.01);
        assert!(forecast.revenue[11] <= baseline * REVENUE_NOISE.1 + 0.01);
    }

    #[test]
    fn test_profit_is_revenue_minus_expenses() {
        let forecast = project(&create_test_input(), 12).unwrap();
        for ((revenue, expense), profit) in forecast
            .revenue
            .iter()
            .zip(&forecast.expenses)
            .zip(&forecast.profit)
        {
            assert_eq!(*profit, round_currency(revenue - expense));
        }
    }

    #[test]
    fn test_risk_adjustment_applies_haircut() {
        let forecast = project(&create_test_input(), 12).unwrap();
        for (adjusted, revenue) in forecast.risk_adjusted_revenue.iter().zip(&forecast.revenue) {
            assert_eq!(*adjusted, round_currency(revenue * RISK_ADJUSTMENT));
        }
    }

    #[test]
    fn test_projected_growth_is_adjusted_upward() {
        let forecast = project(&create_test_input(), 12).unwrap();
        assert!((forecast.projected_growth_rate - 0.088).abs() < 1e-9);
    }

    #[test]
    fn test_forecast_carries_opportunities_and_risks() {
        let forecast = project(&create_test_input(), 12).unwrap();
        assert_eq!(forecast.opportunities.len(), 3);
        assert_eq!(forecast.risk_flags.len(), 3);
        assert!(forecast
            .risk_flags
            .iter()
            .any(|r| r.impact == RiskLevel::High));
        assert!(forecast.overall_risk_score > 0.0 && forecast.overall_risk_score < 1.0);
    }
}
