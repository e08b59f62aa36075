//! Local Domain Analysis
//!
//! Pure, synchronous computations the connectors run on data they fetched
//! from the backing systems:
//! - Keyword-lexicon sentiment scoring for CRM notes
//! - Bill-of-materials cost review with optimization suggestions
//! - Multi-country payroll runs with progressive tax tables
//! - Compounding financial forecasts with seasonality
//!
//! No I/O happens here and nothing is async; every function is plain input
//! to output so the connectors can call them from request handlers and
//! background loops alike.

pub mod bom;
pub mod forecast;
pub mod payroll;
pub mod sentiment;

pub use bom::{BomAnalysis, BomComponent, BomSuggestion, SuggestionKind, SuggestionPriority};
pub use forecast::{FinancialForecast, ForecastInput, GrowthOpportunity, RiskFlag};
pub use payroll::{Country, EmployeePay, PayrollEmployee, PayrollInput, PayrollRun};
pub use sentiment::{Mention, SentimentContext, SentimentLabel, SentimentReport};

/// Round a monetary amount to two decimal places, half away from zero.
pub(crate) fn round_currency(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
