//! Connector implementations for the four business modules
//!
//! One file per backing system: Twenty (CRM), Plane (project management),
//! Carbon (manufacturing) and ERPNext (accounting). Each connector
//! implements the [`Connector`](crate::lifecycle::Connector) lifecycle
//! trait, owns its module's mapping catalog and registers its cross-module
//! event handlers during initialize.

pub mod crm;
pub mod erp;
pub mod manufacturing;
pub mod projects;

pub use crm::{ChurnPrediction, LeadScore, TwentyCrmConnector, CHURN_RISK_THRESHOLD};
pub use erp::ErpNextConnector;
pub use manufacturing::{
    CarbonManufacturingConnector, MaintenancePrediction, PlanAssignment, ProductionPlan,
    MAINTENANCE_ALERT_THRESHOLD,
};
pub use projects::{CompletionForecast, PlaneProjectsConnector, WorkflowSuggestion};

use serde_json::Value;

use omniflow_shared::{EntityKind, SyncDirection};

use crate::error::ConnectorResult;
use crate::mapping::{validate_entity, DataMappingConfig};

/// Version stamped on every connector descriptor
pub const CONNECTOR_VERSION: &str = "1.0.0";

/// Validate a canonical record and translate it to the external shape
pub(crate) fn prepare_outbound(
    catalog: &DataMappingConfig,
    kind: EntityKind,
    record: &Value,
) -> ConnectorResult<Value> {
    validate_entity(kind, record)?;
    Ok(catalog.transform(kind, SyncDirection::Outbound, record))
}

/// Translate an external record to canonical shape and validate it
pub(crate) fn accept_inbound(
    catalog: &DataMappingConfig,
    kind: EntityKind,
    record: &Value,
) -> ConnectorResult<Value> {
    let canonical = catalog.transform(kind, SyncDirection::Inbound, record);
    validate_entity(kind, &canonical)?;
    Ok(canonical)
}

/// Collect a JSON array of strings, ignoring non-string entries
pub(crate) fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use omniflow_shared::ModuleKind;
    use serde_json::json;

    #[test]
    fn test_prepare_outbound_validates_before_translating() {
        let catalog = crate::mapping::catalog_for(ModuleKind::Crm);
        let err = prepare_outbound(&catalog, EntityKind::Company, &json!({"domain": "acme.io"}))
            .unwrap_err();
        assert!(err.to_string().contains("name"));

        let out = prepare_outbound(
            &catalog,
            EntityKind::Company,
            &json!({"name": "Acme", "domain": "acme.io"}),
        )
        .unwrap();
        assert_eq!(out["domainName"], "acme.io");
    }

    #[test]
    fn test_accept_inbound_validates_the_canonical_shape() {
        let catalog = crate::mapping::catalog_for(ModuleKind::Crm);
        // External record missing the name still fails after translation
        assert!(
            accept_inbound(&catalog, EntityKind::Company, &json!({"domainName": "acme.io"}))
                .is_err()
        );

        let canonical = accept_inbound(
            &catalog,
            EntityKind::Company,
            &json!({"id": "c1", "name": "Acme", "annualRecurringRevenue": 1200000.0}),
        )
        .unwrap();
        assert_eq!(canonical["annual_revenue"], 1200000.0);
        assert_eq!(canonical["id"], "c1");
    }

    #[test]
    fn test_string_list_ignores_non_strings() {
        assert_eq!(
            string_list(&json!(["a", 1, "b", null])),
            vec!["a".to_string(), "b".to_string()]
        );
        assert!(string_list(&json!({"not": "an array"})).is_empty());
        assert!(string_list(&Value::Null).is_empty());
    }
}
