//! Bill-of-Materials Cost Review
//!
//! Breaks a product's component list down into cost shares and derives
//! optimization suggestions from three heuristics:
//! - a component above 15% of unit cost is a supplier-negotiation candidate
//!   (assumed 12% saving, high priority)
//! - a lead time above 30 days calls for a qualified backup supplier
//! - a multi-use component above 5% of unit cost is a design-consolidation
//!   candidate (roughly 10% quantity reduction)
//!
//! Unit savings are projected to annual savings with the product's volume.

use super::round_currency;
use crate::error::{ConnectorError, ConnectorResult};
use serde::{Deserialize, Serialize};

/// Annual production volume assumed when the caller does not supply one.
pub const DEFAULT_ANNUAL_VOLUME: f64 = 1000.0;

const NEGOTIATION_COST_SHARE_PCT: f64 = 15.0;
const NEGOTIATION_SAVING_RATE: f64 = 0.12;
const BACKUP_SUPPLIER_LEAD_TIME_DAYS: u32 = 30;
const CONSOLIDATION_COST_SHARE_PCT: f64 = 5.0;
const CONSOLIDATION_QUANTITY_RATE: f64 = 0.1;

// ============================================================================
// Types
// ============================================================================

/// One line of a bill of materials as fetched from the backing system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BomComponent {
    pub part_number: String,
    #[serde(default)]
    pub description: String,
    pub quantity: f64,
    pub unit_cost: f64,
    #[serde(default)]
    pub supplier: Option<String>,
    #[serde(default)]
    pub lead_time_days: u32,
}

/// Per-component cost position within the product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCost {
    pub part_number: String,
    pub quantity: f64,
    pub unit_cost: f64,
    pub total_cost: f64,
    /// Share of the product's total unit cost, in percent.
    pub cost_share_pct: f64,
    pub lead_time_days: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionPriority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    SupplierNegotiation,
    BackupSupplier,
    DesignConsolidation,
}

/// A single optimization suggestion for one component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BomSuggestion {
    pub kind: SuggestionKind,
    pub priority: SuggestionPriority,
    pub part_number: String,
    pub detail: String,
    /// Saving per produced unit; zero for pure risk-reduction suggestions.
    pub estimated_unit_saving: f64,
}

/// Complete cost analysis for one product's bill of materials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BomAnalysis {
    pub product_id: String,
    pub component_count: usize,
    pub total_unit_cost: f64,
    pub component_costs: Vec<ComponentCost>,
    pub suggestions: Vec<BomSuggestion>,
    pub annual_volume: f64,
    pub estimated_unit_saving: f64,
    pub estimated_annual_saving: f64,
}

// ============================================================================
// Analysis
// ============================================================================

/// Analyze a bill of materials and derive optimization suggestions.
pub fn analyze(
    product_id: &str,
    components: &[BomComponent],
    annual_volume: f64,
) -> ConnectorResult<BomAnalysis> {
    validate(components, annual_volume)?;

    let total_unit_cost: f64 = components.iter().map(|c| c.unit_cost * c.quantity).sum();

    let component_costs: Vec<ComponentCost> = components
        .iter()
        .map(|c| {
            let total_cost = c.unit_cost * c.quantity;
            let cost_share_pct = if total_unit_cost > 0.0 {
                total_cost / total_unit_cost * 100.0
            } else {
                0.0
            };
            ComponentCost {
                part_number: c.part_number.clone(),
                quantity: c.quantity,
                unit_cost: c.unit_cost,
                total_cost: round_currency(total_cost),
                cost_share_pct,
                lead_time_days: c.lead_time_days,
            }
        })
        .collect();

    let mut suggestions = Vec::new();
    for cost in &component_costs {
        if cost.cost_share_pct > NEGOTIATION_COST_SHARE_PCT {
            suggestions.push(BomSuggestion {
                kind: SuggestionKind::SupplierNegotiation,
                priority: SuggestionPriority::High,
                part_number: cost.part_number.clone(),
                detail: format!(
                    "{} carries {:.1}% of unit cost; negotiate alternative supplier pricing",
                    cost.part_number, cost.cost_share_pct
                ),
                estimated_unit_saving: round_currency(cost.total_cost * NEGOTIATION_SAVING_RATE),
            });
        }

        if cost.lead_time_days > BACKUP_SUPPLIER_LEAD_TIME_DAYS {
            suggestions.push(BomSuggestion {
                kind: SuggestionKind::BackupSupplier,
                priority: SuggestionPriority::Medium,
                part_number: cost.part_number.clone(),
                detail: format!(
                    "{} has a {} day lead time; qualify a backup supplier",
                    cost.part_number, cost.lead_time_days
                ),
                estimated_unit_saving: 0.0,
            });
        }

        if cost.quantity > 1.0 && cost.cost_share_pct > CONSOLIDATION_COST_SHARE_PCT {
            let reduction = (cost.quantity * CONSOLIDATION_QUANTITY_RATE).floor().max(1.0);
            suggestions.push(BomSuggestion {
                kind: SuggestionKind::DesignConsolidation,
                priority: SuggestionPriority::Low,
                part_number: cost.part_number.clone(),
                detail: format!(
                    "{} is used {}x; a design review could drop {} unit(s)",
                    cost.part_number, cost.quantity, reduction
                ),
                estimated_unit_saving: round_currency(cost.unit_cost * reduction),
            });
        }
    }
    suggestions.sort_by(|a, b| b.priority.cmp(&a.priority));

    let estimated_unit_saving: f64 = suggestions.iter().map(|s| s.estimated_unit_saving).sum();
    let estimated_annual_saving = round_currency(estimated_unit_saving * annual_volume);

    Ok(BomAnalysis {
        product_id: product_id.to_string(),
        component_count: components.len(),
        total_unit_cost: round_currency(total_unit_cost),
        component_costs,
        suggestions,
        annual_volume,
        estimated_unit_saving: round_currency(estimated_unit_saving),
        estimated_annual_saving,
    })
}

fn validate(components: &[BomComponent], annual_volume: f64) -> ConnectorResult<()> {
    if components.is_empty() {
        return Err(ConnectorError::validation(
            "components",
            "at least one component is required",
        ));
    }
    if annual_volume <= 0.0 {
        return Err(ConnectorError::validation(
            "annual_volume",
            "annual volume must be positive",
        ));
    }
    for (index, component) in components.iter().enumerate() {
        if component.part_number.trim().is_empty() {
            return Err(ConnectorError::validation(
                "part_number",
                format!("component {} is missing a part number", index + 1),
            ));
        }
        if component.quantity <= 0.0 {
            return Err(ConnectorError::validation(
                "quantity",
                format!("component '{}' needs a positive quantity", component.part_number),
            ));
        }
        if component.unit_cost < 0.0 {
            return Err(ConnectorError::validation(
                "unit_cost",
                format!("component '{}' has a negative unit cost", component.part_number),
            ));
        }
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_components() -> Vec<BomComponent> {
        vec![
            BomComponent {
                part_number: "COMP-001".to_string(),
                description: "Main Housing".to_string(),
                quantity: 1.0,
                unit_cost: 45.50,
                supplier: Some("MetalWorks Inc".to_string()),
                lead_time_days: 45,
            },
            BomComponent {
                part_number: "COMP-002".to_string(),
                description: "Control Circuit Board".to_string(),
                quantity: 1.0,
                unit_cost: 67.80,
                supplier: Some("ElectroTech Ltd".to_string()),
                lead_time_days: 21,
            },
            BomComponent {
                part_number: "COMP-003".to_string(),
                description: "Mounting Screws".to_string(),
                quantity: 8.0,
                unit_cost: 0.12,
                supplier: Some("FastenerCorp".to_string()),
                lead_time_days: 7,
            },
        ]
    }

    #[test]
    fn test_empty_bom_is_rejected() {
        let err = analyze("PROD-1", &[], DEFAULT_ANNUAL_VOLUME).unwrap_err();
        assert!(err.to_string().contains("at least one component"));
    }

    #[test]
    fn test_zero_quantity_is_rejected() {
        let mut components = create_test_components();
        components[0].quantity = 0.0;
        assert!(analyze("PROD-1", &components, DEFAULT_ANNUAL_VOLUME).is_err());
    }

    #[test]
    fn test_cost_shares_sum_to_one_hundred() {
        let analysis = analyze("PROD-1", &create_test_components(), 5000.0).unwrap();
        assert_eq!(analysis.total_unit_cost, 114.26);
        let share_sum: f64 = analysis.component_costs.iter().map(|c| c.cost_share_pct).sum();
        assert!((share_sum - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_high_cost_share_flags_supplier_negotiation() {
        let analysis = analyze("PROD-1", &create_test_components(), 5000.0).unwrap();
        let negotiations: Vec<_> = analysis
            .suggestions
            .iter()
            .filter(|s| s.kind == SuggestionKind::SupplierNegotiation)
            .collect();
        // Housing (39.8%) and circuit board (59.3%) both exceed the 15% bar.
        assert_eq!(negotiations.len(), 2);
        assert!(negotiations.iter().all(|s| s.priority == SuggestionPriority::High));
        assert!(negotiations.iter().any(|s| s.part_number == "COMP-001"));
        assert!(negotiations.iter().any(|s| s.part_number == "COMP-002"));
    }

    #[test]
    fn test_long_lead_time_flags_backup_supplier() {
        let analysis = analyze("PROD-1", &create_test_components(), 5000.0).unwrap();
        let backups: Vec<_> = analysis
            .suggestions
            .iter()
            .filter(|s| s.kind == SuggestionKind::BackupSupplier)
            .collect();
        assert_eq!(backups.len(), 1);
        assert_eq!(backups[0].part_number, "COMP-001");
        assert_eq!(backups[0].priority, SuggestionPriority::Medium);
        assert_eq!(backups[0].estimated_unit_saving, 0.0);
    }

    #[test]
    fn test_cheap_multi_use_component_is_not_flagged() {
        let analysis = analyze("PROD-1", &create_test_components(), 5000.0).unwrap();
        // The screws are below the 5% cost share bar despite quantity 8.
        assert!(!analysis
            .suggestions
            .iter()
            .any(|s| s.kind == SuggestionKind::DesignConsolidation));
    }

    #[test]
    fn test_design_consolidation_reduces_at_least_one_unit() {
        let components = vec![
            BomComponent {
                part_number: "BRACKET".to_string(),
                description: String::new(),
                quantity: 4.0,
                unit_cost: 10.0,
                supplier: None,
                lead_time_days: 5,
            },
            BomComponent {
                part_number: "FRAME".to_string(),
                description: String::new(),
                quantity: 1.0,
                unit_cost: 60.0,
                supplier: None,
                lead_time_days: 5,
            },
        ];
        let analysis = analyze("PROD-2", &components, 1000.0).unwrap();
        let consolidation = analysis
            .suggestions
            .iter()
            .find(|s| s.kind == SuggestionKind::DesignConsolidation)
            .unwrap();
        // 10% of quantity 4 rounds down to 0, floored up to a single unit.
        assert_eq!(consolidation.part_number, "BRACKET");
        assert_eq!(consolidation.estimated_unit_saving, 10.0);
    }

    #[test]
    fn test_annual_saving_scales_with_volume() {
        let analysis = analyze("PROD-1", &create_test_components(), 5000.0).unwrap();
        // 12% of 45.50 plus 12% of 67.80, rounded per suggestion.
        assert_eq!(analysis.estimated_unit_saving, 13.60);
        assert_eq!(analysis.estimated_annual_saving, 68_000.0);
    }

    #[test]
    fn test_suggestions_are_ordered_by_priority() {
        let analysis = analyze("PROD-1", &create_test_components(), 5000.0).unwrap();
        let priorities: Vec<SuggestionPriority> =
            analysis.suggestions.iter().map(|s| s.priority).collect();
        let mut sorted = priorities.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(priorities, sorted);
    }
}
