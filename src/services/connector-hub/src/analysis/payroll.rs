//! Multi-Country Payroll Runs
//!
//! Computes a full payroll run for a monthly pay period: per-employee
//! earnings (overtime, commissions, allowances), country-specific statutory
//! deductions driven by progressive tax bracket tables (US, IN, UK),
//! employer-funded benefits and the employer's own liabilities.
//!
//! All amounts are monthly and rounded to two decimals; annualized figures
//! (tax brackets, contribution caps) are derived by multiplying by twelve.

use super::round_currency;
use crate::error::{ConnectorError, ConnectorResult};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Country tax tables
// ============================================================================

/// Progressive brackets as `(lower threshold, marginal rate)` on annual income.
const US_BRACKETS: &[(f64, f64)] = &[(0.0, 0.10), (9_950.0, 0.12), (40_525.0, 0.22), (86_375.0, 0.24)];
const IN_BRACKETS: &[(f64, f64)] = &[(0.0, 0.0), (250_000.0, 0.05), (500_000.0, 0.20), (1_000_000.0, 0.30)];
const UK_BRACKETS: &[(f64, f64)] = &[(0.0, 0.0), (12_570.0, 0.20), (50_270.0, 0.40), (150_000.0, 0.45)];

const US_SOCIAL_SECURITY_RATE: f64 = 0.062;
const US_SOCIAL_SECURITY_WAGE_BASE: f64 = 160_200.0;
const US_MEDICARE_RATE: f64 = 0.0145;
const US_STATE_TAX_RATE: f64 = 0.05;
const US_UNEMPLOYMENT_RATE: f64 = 0.006;

const IN_PF_RATE: f64 = 0.12;
const IN_PF_MONTHLY_CAP: f64 = 1_800.0;
const IN_ESI_EMPLOYEE_RATE: f64 = 0.0075;
const IN_ESI_EMPLOYER_RATE: f64 = 0.0325;
const IN_ESI_ANNUAL_LIMIT: f64 = 250_000.0;
const IN_PROFESSIONAL_TAX: f64 = 200.0;

const UK_NI_EMPLOYEE_RATE: f64 = 0.12;
const UK_NI_EMPLOYER_RATE: f64 = 0.138;
const UK_PENSION_RATE: f64 = 0.05;
const UK_PENSION_ANNUAL_THRESHOLD: f64 = 10_000.0;
const UK_APPRENTICESHIP_LEVY_RATE: f64 = 0.005;
const UK_APPRENTICESHIP_LEVY_ANNUAL_THRESHOLD: f64 = 3_000_000.0;

const OVERTIME_MULTIPLIER: f64 = 1.5;
const MONTHLY_BASE_HOURS: f64 = 160.0;
const MANAGEMENT_ALLOWANCE_RATE: f64 = 0.1;
const TRANSPORT_ALLOWANCE: f64 = 500.0;
const MEAL_ALLOWANCE: f64 = 300.0;

const EMPLOYER_HEALTH_CONTRIBUTION: f64 = 400.0;
const LIFE_INSURANCE_PREMIUM: f64 = 50.0;
const RETIREMENT_MATCH_SALARY_CAP: f64 = 0.06;

// ============================================================================
// Types
// ============================================================================

/// Countries with a statutory deduction table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Country {
    #[serde(rename = "US")]
    UnitedStates,
    #[serde(rename = "IN")]
    India,
    #[serde(rename = "UK")]
    UnitedKingdom,
}

impl Country {
    pub fn as_str(&self) -> &'static str {
        match self {
            Country::UnitedStates => "US",
            Country::India => "IN",
            Country::UnitedKingdom => "UK",
        }
    }
}

impl fmt::Display for Country {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Country {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "US" => Ok(Country::UnitedStates),
            "IN" => Ok(Country::India),
            "UK" => Ok(Country::UnitedKingdom),
            other => Err(ConnectorError::validation(
                "country",
                format!("unsupported payroll country '{other}'"),
            )),
        }
    }
}

/// One employee's inputs for a pay period. Amounts are monthly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayrollEmployee {
    pub employee_id: String,
    #[serde(default)]
    pub name: String,
    pub base_salary: f64,
    /// Seniority grade; "manager" and "senior" earn a management allowance.
    #[serde(default)]
    pub grade: Option<String>,
    #[serde(default)]
    pub overtime_hours: f64,
    #[serde(default)]
    pub commission: f64,
    #[serde(default)]
    pub bonus: f64,
    #[serde(default)]
    pub transport_allowance: bool,
    #[serde(default)]
    pub meal_allowance: bool,
    #[serde(default)]
    pub health_insurance_deduction: f64,
    #[serde(default)]
    pub loan_emi: f64,
    #[serde(default)]
    pub voluntary_deductions: BTreeMap<String, f64>,
    #[serde(default)]
    pub health_insurance_plan: bool,
    #[serde(default)]
    pub life_insurance_coverage: bool,
    #[serde(default)]
    pub retirement_contribution: f64,
    #[serde(default = "default_match_rate")]
    pub retirement_match_rate: f64,
}

fn default_match_rate() -> f64 {
    0.5
}

fn default_currency() -> String {
    "USD".to_string()
}

/// A payroll run request for one period and country.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayrollInput {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub country: Country,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub employees: Vec<PayrollEmployee>,
}

/// One employee's computed payslip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmployeePay {
    pub employee_id: String,
    pub employee_name: String,
    pub earnings: BTreeMap<String, f64>,
    pub deductions: BTreeMap<String, f64>,
    pub benefits: BTreeMap<String, f64>,
    pub gross_pay: f64,
    pub total_deductions: f64,
    pub net_pay: f64,
}

/// What the run costs the employer on top of gross pay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmployerLiabilities {
    pub total_gross_payroll: f64,
    pub employer_taxes: f64,
    pub benefits_cost: f64,
    pub total_employer_cost: f64,
}

/// Completed payroll run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayrollRun {
    pub run_id: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub country: Country,
    pub currency: String,
    pub employee_count: usize,
    pub total_gross_pay: f64,
    pub total_deductions: f64,
    pub total_net_pay: f64,
    pub payslips: Vec<EmployeePay>,
    pub employer: EmployerLiabilities,
}

// ============================================================================
// Payroll computation
// ============================================================================

/// Compute a full payroll run.
pub fn run(input: &PayrollInput) -> ConnectorResult<PayrollRun> {
    validate(input)?;

    let mut payslips = Vec::with_capacity(input.employees.len());
    let mut total_gross = 0.0;
    let mut total_deducted = 0.0;
    let mut total_net = 0.0;
    let mut employer_taxes = 0.0;
    let mut benefits_cost = 0.0;

    for employee in &input.employees {
        let earnings = compute_earnings(employee);
        let gross: f64 = earnings.values().sum();

        let deductions = compute_deductions(employee, gross, input.country);
        let deducted: f64 = deductions.values().sum();

        let benefits = compute_benefits(employee, gross);
        let net = gross - deducted;

        total_gross += gross;
        total_deducted += deducted;
        total_net += net;
        employer_taxes += employer_taxes_for(gross, input.country);
        benefits_cost += benefits.values().sum::<f64>();

        payslips.push(EmployeePay {
            employee_id: employee.employee_id.clone(),
            employee_name: employee.name.clone(),
            earnings,
            deductions,
            benefits,
            gross_pay: round_currency(gross),
            total_deductions: round_currency(deducted),
            net_pay: round_currency(net),
        });
    }

    // The apprenticeship levy applies to the whole payroll once its
    // annualized total crosses the threshold.
    if input.country == Country::UnitedKingdom
        && total_gross * 12.0 > UK_APPRENTICESHIP_LEVY_ANNUAL_THRESHOLD
    {
        employer_taxes += total_gross * UK_APPRENTICESHIP_LEVY_RATE;
    }

    Ok(PayrollRun {
        run_id: format!("PR-{}", Utc::now().format("%Y%m%d%H%M%S")),
        period_start: input.period_start,
        period_end: input.period_end,
        country: input.country,
        currency: input.currency.clone(),
        employee_count: payslips.len(),
        total_gross_pay: round_currency(total_gross),
        total_deductions: round_currency(total_deducted),
        total_net_pay: round_currency(total_net),
        payslips,
        employer: EmployerLiabilities {
            total_gross_payroll: round_currency(total_gross),
            employer_taxes: round_currency(employer_taxes),
            benefits_cost: round_currency(benefits_cost),
            total_employer_cost: round_currency(total_gross + employer_taxes + benefits_cost),
        },
    })
}

fn validate(input: &PayrollInput) -> ConnectorResult<()> {
    if input.employees.is_empty() {
        return Err(ConnectorError::validation(
            "employees",
            "no employees provided for the payroll run",
        ));
    }
    if input.period_start > input.period_end {
        return Err(ConnectorError::validation(
            "period",
            "period start must not be after period end",
        ));
    }
    for (index, employee) in input.employees.iter().enumerate() {
        if employee.employee_id.trim().is_empty() {
            return Err(ConnectorError::validation(
                "employee_id",
                format!("employee {} is missing an id", index + 1),
            ));
        }
        if employee.base_salary <= 0.0 {
            return Err(ConnectorError::validation(
                "base_salary",
                format!("employee '{}' needs a positive base salary", employee.employee_id),
            ));
        }
    }
    Ok(())
}

/// Walk progressive brackets: each band of annual income is taxed at its
/// own marginal rate. Brackets are `(lower threshold, rate)` ascending.
pub fn progressive_tax(annual_income: f64, brackets: &[(f64, f64)]) -> f64 {
    let mut tax = 0.0;
    for (index, &(threshold, rate)) in brackets.iter().enumerate() {
        if annual_income <= threshold {
            break;
        }
        let upper = brackets
            .get(index + 1)
            .map(|&(next, _)| next)
            .unwrap_or(f64::INFINITY);
        tax += (annual_income.min(upper) - threshold) * rate;
    }
    tax
}

/// Brackets for a country's annual income tax.
pub fn brackets_for(country: Country) -> &'static [(f64, f64)] {
    match country {
        Country::UnitedStates => US_BRACKETS,
        Country::India => IN_BRACKETS,
        Country::UnitedKingdom => UK_BRACKETS,
    }
}

fn compute_earnings(employee: &PayrollEmployee) -> BTreeMap<String, f64> {
    let mut earnings = BTreeMap::new();
    let base = employee.base_salary;

    insert_if_positive(&mut earnings, "basic_salary", base);
    insert_if_positive(
        &mut earnings,
        "overtime_pay",
        employee.overtime_hours * (base / MONTHLY_BASE_HOURS) * OVERTIME_MULTIPLIER,
    );
    insert_if_positive(&mut earnings, "commission", employee.commission);
    insert_if_positive(&mut earnings, "bonus", employee.bonus);

    let is_management = employee
        .grade
        .as_deref()
        .map_or(false, |g| matches!(g.to_lowercase().as_str(), "manager" | "senior"));
    if is_management {
        insert_if_positive(&mut earnings, "management_allowance", base * MANAGEMENT_ALLOWANCE_RATE);
    }
    if employee.transport_allowance {
        insert_if_positive(&mut earnings, "transport_allowance", TRANSPORT_ALLOWANCE);
    }
    if employee.meal_allowance {
        insert_if_positive(&mut earnings, "meal_allowance", MEAL_ALLOWANCE);
    }

    earnings
}

fn compute_deductions(
    employee: &PayrollEmployee,
    gross: f64,
    country: Country,
) -> BTreeMap<String, f64> {
    let mut deductions = BTreeMap::new();
    let annual = gross * 12.0;

    match country {
        Country::UnitedStates => {
            insert_if_positive(
                &mut deductions,
                "federal_income_tax",
                progressive_tax(annual, US_BRACKETS) / 12.0,
            );
            let ss_taxable = annual.min(US_SOCIAL_SECURITY_WAGE_BASE);
            insert_if_positive(
                &mut deductions,
                "social_security",
                ss_taxable * US_SOCIAL_SECURITY_RATE / 12.0,
            );
            insert_if_positive(&mut deductions, "medicare", gross * US_MEDICARE_RATE);
            insert_if_positive(&mut deductions, "state_income_tax", gross * US_STATE_TAX_RATE);
        }
        Country::India => {
            insert_if_positive(
                &mut deductions,
                "income_tax",
                progressive_tax(annual, IN_BRACKETS) / 12.0,
            );
            insert_if_positive(
                &mut deductions,
                "provident_fund",
                (gross * IN_PF_RATE).min(IN_PF_MONTHLY_CAP),
            );
            if annual <= IN_ESI_ANNUAL_LIMIT {
                insert_if_positive(&mut deductions, "esi", gross * IN_ESI_EMPLOYEE_RATE);
            }
            insert_if_positive(&mut deductions, "professional_tax", IN_PROFESSIONAL_TAX);
        }
        Country::UnitedKingdom => {
            insert_if_positive(
                &mut deductions,
                "income_tax",
                progressive_tax(annual, UK_BRACKETS) / 12.0,
            );
            insert_if_positive(&mut deductions, "national_insurance", gross * UK_NI_EMPLOYEE_RATE);
            if annual > UK_PENSION_ANNUAL_THRESHOLD {
                insert_if_positive(&mut deductions, "pension_contribution", gross * UK_PENSION_RATE);
            }
        }
    }

    insert_if_positive(&mut deductions, "health_insurance", employee.health_insurance_deduction);
    insert_if_positive(&mut deductions, "loan_emi", employee.loan_emi);
    for (name, amount) in &employee.voluntary_deductions {
        insert_if_positive(&mut deductions, &format!("voluntary_{name}"), *amount);
    }

    deductions
}

fn compute_benefits(employee: &PayrollEmployee, gross: f64) -> BTreeMap<String, f64> {
    let mut benefits = BTreeMap::new();

    if employee.health_insurance_plan {
        insert_if_positive(&mut benefits, "health_insurance_employer", EMPLOYER_HEALTH_CONTRIBUTION);
    }
    if employee.retirement_contribution > 0.0 {
        let matched = employee.retirement_contribution * employee.retirement_match_rate;
        let cap = gross * RETIREMENT_MATCH_SALARY_CAP;
        insert_if_positive(&mut benefits, "retirement_matching", matched.min(cap));
    }
    if employee.life_insurance_coverage {
        insert_if_positive(&mut benefits, "life_insurance_premium", LIFE_INSURANCE_PREMIUM);
    }

    benefits
}

/// Employer-side statutory contributions for one employee's gross pay.
fn employer_taxes_for(gross: f64, country: Country) -> f64 {
    match country {
        Country::UnitedStates => {
            gross * (US_SOCIAL_SECURITY_RATE + US_MEDICARE_RATE + US_UNEMPLOYMENT_RATE)
        }
        Country::India => {
            let mut taxes = (gross * IN_PF_RATE).min(IN_PF_MONTHLY_CAP);
            if gross * 12.0 <= IN_ESI_ANNUAL_LIMIT {
                taxes += gross * IN_ESI_EMPLOYER_RATE;
            }
            taxes
        }
        Country::UnitedKingdom => gross * UK_NI_EMPLOYER_RATE,
    }
}

fn insert_if_positive(map: &mut BTreeMap<String, f64>, key: &str, value: f64) {
    if value > 0.0 {
        map.insert(key.to_string(), round_currency(value));
    }
}

// ============================================================================
// Tests
// ============================================================================
