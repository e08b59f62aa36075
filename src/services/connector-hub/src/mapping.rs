//! Declarative field mapping between canonical entities and backing systems
//!
//! Each module has exactly one mapping catalog, declared as static tables and
//! consumed by a single generic transform. Connectors never hand-write
//! per-entity converters; they ask the catalog for their module and run
//! entities through [`DataMappingConfig::transform`]. A kind with no entry in
//! the catalog passes through unchanged.

use serde_json::{Map, Value};
use tracing::debug;

use omniflow_shared::{EntityKind, ModuleKind, SyncDirection};

use crate::error::{ConnectorError, ConnectorResult};

// ============================================================================
// MAPPING TYPES
// ============================================================================

/// Pure value-level transform applied alongside a field rename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldTransform {
    /// Bidirectional value translation table. Values missing from the table
    /// pass through unchanged.
    EnumMap(&'static [(&'static str, &'static str)]),
    /// Truncate an RFC 3339 timestamp to its date part on the way out.
    /// Inbound values pass through unchanged.
    DateOnly,
}

impl FieldTransform {
    fn apply(&self, direction: SyncDirection, value: &Value) -> Value {
        match (self, value.as_str()) {
            (FieldTransform::EnumMap(pairs), Some(s)) => {
                for (internal, external) in *pairs {
                    match direction {
                        SyncDirection::Outbound if *internal == s => {
                            return Value::String((*external).to_string());
                        }
                        SyncDirection::Inbound if *external == s => {
                            return Value::String((*internal).to_string());
                        }
                        _ => {}
                    }
                }
                value.clone()
            }
            (FieldTransform::DateOnly, Some(s)) => match direction {
                SyncDirection::Outbound => {
                    Value::String(s.split('T').next().unwrap_or(s).to_string())
                }
                SyncDirection::Inbound => value.clone(),
            },
            _ => value.clone(),
        }
    }
}

/// One field correspondence: canonical name, external name, optional transform.
#[derive(Debug, Clone, Copy)]
pub struct FieldMapping {
    pub source: &'static str,
    pub target: &'static str,
    pub transform: Option<FieldTransform>,
}

impl FieldMapping {
    pub const fn renamed(source: &'static str, target: &'static str) -> Self {
        Self {
            source,
            target,
            transform: None,
        }
    }

    pub const fn transformed(
        source: &'static str,
        target: &'static str,
        transform: FieldTransform,
    ) -> Self {
        Self {
            source,
            target,
            transform: Some(transform),
        }
    }
}

/// Mapping for one entity kind against one backing system.
#[derive(Debug, Clone, Copy)]
pub struct EntityMapping {
    pub kind: EntityKind,
    /// Object or doctype name on the external side
    pub external_type: &'static str,
    pub fields: &'static [FieldMapping],
}

/// Cardinality of a declared relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

/// Foreign-key relationship between two mapped entity kinds.
#[derive(Debug, Clone, Copy)]
pub struct RelationshipMapping {
    pub source: EntityKind,
    pub target: EntityKind,
    pub cardinality: Cardinality,
    pub foreign_key: &'static str,
}

/// The full mapping catalog for one module: ordered entity mappings plus
/// relationships. This is the only source of field correspondences in the
/// hub.
#[derive(Debug, Clone)]
pub struct DataMappingConfig {
    pub module: ModuleKind,
    pub entities: Vec<EntityMapping>,
    pub relationships: Vec<RelationshipMapping>,
}

impl DataMappingConfig {
    /// Look up the mapping entry for a kind, if this module declares one
    pub fn entity(&self, kind: EntityKind) -> Option<&EntityMapping> {
        self.entities.iter().find(|m| m.kind == kind)
    }

    pub fn external_type(&self, kind: EntityKind) -> Option<&'static str> {
        self.entity(kind).map(|m| m.external_type)
    }

    /// Translate an entity between its canonical and external shapes.
    ///
    /// `Outbound` renames canonical fields to external names, `Inbound` the
    /// reverse. Fields without a rule are dropped; external systems reject
    /// unknown columns and the canonical model ignores vendor extras. A kind
    /// with no catalog entry, or a non-object value, is returned unchanged.
    pub fn transform(&self, kind: EntityKind, direction: SyncDirection, data: &Value) -> Value {
        let Some(mapping) = self.entity(kind) else {
            debug!(module = %self.module, kind = %kind, "No mapping entry, passing through");
            return data.clone();
        };
        let Some(object) = data.as_object() else {
            return data.clone();
        };

        let mut out = Map::with_capacity(mapping.fields.len());
        for field in mapping.fields {
            let (from, to) = match direction {
                SyncDirection::Outbound => (field.source, field.target),
                SyncDirection::Inbound => (field.target, field.source),
            };
            if let Some(value) = object.get(from) {
                let value = match &field.transform {
                    Some(transform) => transform.apply(direction, value),
                    None => value.clone(),
                };
                out.insert(to.to_string(), value);
            }
        }
        Value::Object(out)
    }

    /// Check the catalog invariants: no empty field names on either side and
    /// no duplicate entity entries.
    pub fn validate(&self) -> ConnectorResult<()> {
        for (i, mapping) in self.entities.iter().enumerate() {
            for field in mapping.fields {
                if field.source.is_empty() || field.target.is_empty() {
                    return Err(ConnectorError::mapping(
                        mapping.kind.as_str(),
                        "Field mapping has an empty source or target name",
                    ));
                }
            }
            if self.entities[..i].iter().any(|m| m.kind == mapping.kind) {
                return Err(ConnectorError::mapping(
                    mapping.kind.as_str(),
                    "Duplicate entity mapping",
                ));
            }
        }
        Ok(())
    }
}

/// Check an entity's required fields before it crosses a system boundary.
///
/// A required field must be present, non-null and, for strings, non-empty.
pub fn validate_entity(kind: EntityKind, data: &Value) -> ConnectorResult<()> {
    let object = data
        .as_object()
        .ok_or_else(|| ConnectorError::validation("entity", "Entity must be a JSON object"))?;

    for field in kind.required_fields() {
        let missing = match object.get(*field) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        };
        if missing {
            return Err(ConnectorError::validation(
                *field,
                format!("{} requires field '{}'", kind, field),
            ));
        }
    }
    Ok(())
}

// ============================================================================
// STATIC CATALOGS
// ============================================================================

const STAGE_MAP: &[(&str, &str)] = &[
    ("new", "NEW"),
    ("screening", "SCREENING"),
    ("meeting", "MEETING"),
    ("proposal", "PROPOSAL"),
    ("customer", "CUSTOMER"),
];

const ISSUE_STATE_MAP: &[(&str, &str)] = &[
    ("backlog", "Backlog"),
    ("todo", "Todo"),
    ("in_progress", "In Progress"),
    ("done", "Done"),
    ("cancelled", "Cancelled"),
];

const WORK_ORDER_STATUS_MAP: &[(&str, &str)] = &[
    ("draft", "Draft"),
    ("planned", "Planned"),
    ("in_progress", "In Progress"),
    ("completed", "Completed"),
    ("cancelled", "Cancelled"),
];

const CRM_ENTITIES: &[EntityMapping] = &[
    EntityMapping {
        kind: EntityKind::Company,
        external_type: "company",
        fields: &[
            FieldMapping::renamed("id", "id"),
            FieldMapping::renamed("name", "name"),
            FieldMapping::renamed("domain", "domainName"),
            FieldMapping::renamed("employees", "employees"),
            FieldMapping::renamed("industry", "industry"),
            FieldMapping::renamed("annual_revenue", "annualRecurringRevenue"),
            FieldMapping::renamed("address", "address"),
            FieldMapping::renamed("ai_score", "aiScore"),
        ],
    },
    EntityMapping {
        kind: EntityKind::Person,
        external_type: "person",
        fields: &[
            FieldMapping::renamed("id", "id"),
            FieldMapping::renamed("first_name", "firstName"),
            FieldMapping::renamed("last_name", "lastName"),
            FieldMapping::renamed("email", "email"),
            FieldMapping::renamed("phone", "phone"),
            FieldMapping::renamed("job_title", "jobTitle"),
            FieldMapping::renamed("company_id", "companyId"),
        ],
    },
    EntityMapping {
        kind: EntityKind::Opportunity,
        external_type: "opportunity",
        fields: &[
            FieldMapping::renamed("id", "id"),
            FieldMapping::renamed("name", "name"),
            FieldMapping::transformed("stage", "stage", FieldTransform::EnumMap(STAGE_MAP)),
            FieldMapping::renamed("amount", "amount"),
            FieldMapping::transformed("close_date", "closeDate", FieldTransform::DateOnly),
            FieldMapping::renamed("company_id", "companyId"),
            FieldMapping::renamed("ai_score", "aiScore"),
        ],
    },
];

const CRM_RELATIONSHIPS: &[RelationshipMapping] = &[
    RelationshipMapping {
        source: EntityKind::Person,
        target: EntityKind::Company,
        cardinality: Cardinality::ManyToOne,
        foreign_key: "company_id",
    },
    RelationshipMapping {
        source: EntityKind::Opportunity,
        target: EntityKind::Company,
        cardinality: Cardinality::ManyToOne,
        foreign_key: "company_id",
    },
];

const PROJECT_ENTITIES: &[EntityMapping] = &[
    EntityMapping {
        kind: EntityKind::Project,
        external_type: "projects",
        fields: &[
            FieldMapping::renamed("id", "id"),
            FieldMapping::renamed("name", "name"),
            FieldMapping::renamed("description", "description"),
            FieldMapping::renamed("identifier", "identifier"),
            FieldMapping::renamed("lead_id", "project_lead"),
        ],
    },
    EntityMapping {
        kind: EntityKind::Issue,
        external_type: "issues",
        fields: &[
            FieldMapping::renamed("id", "id"),
            FieldMapping::renamed("title", "name"),
            FieldMapping::renamed("description", "description_html"),
            FieldMapping::renamed("priority", "priority"),
            FieldMapping::transformed("state", "state", FieldTransform::EnumMap(ISSUE_STATE_MAP)),
            FieldMapping::renamed("assignee_id", "assignee"),
            FieldMapping::transformed("due_date", "target_date", FieldTransform::DateOnly),
        ],
    },
    EntityMapping {
        kind: EntityKind::Cycle,
        external_type: "cycles",
        fields: &[
            FieldMapping::renamed("id", "id"),
            FieldMapping::renamed("name", "name"),
            FieldMapping::transformed("start_date", "start_date", FieldTransform::DateOnly),
            FieldMapping::transformed("end_date", "end_date", FieldTransform::DateOnly),
            FieldMapping::renamed("project_id", "project"),
        ],
    },
    EntityMapping {
        kind: EntityKind::ProjectModule,
        external_type: "modules",
        fields: &[
            FieldMapping::renamed("id", "id"),
            FieldMapping::renamed("name", "name"),
            FieldMapping::renamed("description", "description"),
            FieldMapping::renamed("status", "status"),
            FieldMapping::renamed("project_id", "project"),
        ],
    },
];

const PROJECT_RELATIONSHIPS: &[RelationshipMapping] = &[
    RelationshipMapping {
        source: EntityKind::Issue,
        target: EntityKind::Project,
        cardinality: Cardinality::ManyToOne,
        foreign_key: "project_id",
    },
    RelationshipMapping {
        source: EntityKind::Cycle,
        target: EntityKind::Project,
        cardinality: Cardinality::ManyToOne,
        foreign_key: "project_id",
    },
    RelationshipMapping {
        source: EntityKind::ProjectModule,
        target: EntityKind::Project,
        cardinality: Cardinality::ManyToOne,
        foreign_key: "project_id",
    },
];

const MANUFACTURING_ENTITIES: &[EntityMapping] = &[
    EntityMapping {
        kind: EntityKind::WorkOrder,
        external_type: "jobs",
        fields: &[
            FieldMapping::renamed("id", "id"),
            FieldMapping::renamed("product_id", "itemId"),
            FieldMapping::renamed("quantity", "quantity"),
            FieldMapping::transformed(
                "status",
                "status",
                FieldTransform::EnumMap(WORK_ORDER_STATUS_MAP),
            ),
            FieldMapping::transformed("due_date", "dueDate", FieldTransform::DateOnly),
            FieldMapping::renamed("priority", "priority"),
        ],
    },
    EntityMapping {
        kind: EntityKind::Product,
        external_type: "items",
        fields: &[
            FieldMapping::renamed("id", "id"),
            FieldMapping::renamed("sku", "readableId"),
            FieldMapping::renamed("name", "name"),
            FieldMapping::renamed("description", "description"),
            FieldMapping::renamed("unit_cost", "unitCost"),
        ],
    },
    EntityMapping {
        kind: EntityKind::Equipment,
        external_type: "workCenters",
        fields: &[
            FieldMapping::renamed("id", "id"),
            FieldMapping::renamed("name", "name"),
            FieldMapping::renamed("location", "locationId"),
            FieldMapping::renamed("status", "status"),
        ],
    },
    EntityMapping {
        kind: EntityKind::QualityCheck,
        external_type: "qualityInspections",
        fields: &[
            FieldMapping::renamed("id", "id"),
            FieldMapping::renamed("work_order_id", "jobId"),
            FieldMapping::renamed("result", "result"),
            FieldMapping::renamed("inspector", "inspectedBy"),
            FieldMapping::renamed("notes", "notes"),
        ],
    },
    EntityMapping {
        kind: EntityKind::BillOfMaterials,
        external_type: "billOfMaterials",
        fields: &[
            FieldMapping::renamed("id", "id"),
            FieldMapping::renamed("product_id", "itemId"),
            FieldMapping::renamed("quantity", "quantity"),
            FieldMapping::renamed("components", "materials"),
        ],
    },
];

const MANUFACTURING_RELATIONSHIPS: &[RelationshipMapping] = &[
    RelationshipMapping {
        source: EntityKind::WorkOrder,
        target: EntityKind::Product,
        cardinality: Cardinality::ManyToOne,
        foreign_key: "product_id",
    },
    RelationshipMapping {
        source: EntityKind::QualityCheck,
        target: EntityKind::WorkOrder,
        cardinality: Cardinality::ManyToOne,
        foreign_key: "work_order_id",
    },
    RelationshipMapping {
        source: EntityKind::BillOfMaterials,
        target: EntityKind::Product,
        cardinality: Cardinality::OneToOne,
        foreign_key: "product_id",
    },
];

const ACCOUNTING_ENTITIES: &[EntityMapping] = &[
    EntityMapping {
        kind: EntityKind::Invoice,
        external_type: "Sales Invoice",
        fields: &[
            FieldMapping::renamed("number", "name"),
            FieldMapping::renamed("customer", "customer"),
            FieldMapping::renamed("amount", "grand_total"),
            FieldMapping::renamed("outstanding", "outstanding_amount"),
            FieldMapping::renamed("status", "status"),
            FieldMapping::transformed("due_date", "due_date", FieldTransform::DateOnly),
            FieldMapping::transformed("posting_date", "posting_date", FieldTransform::DateOnly),
        ],
    },
    EntityMapping {
        kind: EntityKind::Employee,
        external_type: "Employee",
        fields: &[
            FieldMapping::renamed("employee_id", "employee_number"),
            FieldMapping::renamed("first_name", "first_name"),
            FieldMapping::renamed("last_name", "last_name"),
            FieldMapping::renamed("department", "department"),
            FieldMapping::transformed("joined_on", "date_of_joining", FieldTransform::DateOnly),
        ],
    },
    EntityMapping {
        kind: EntityKind::Company,
        external_type: "Customer",
        fields: &[
            FieldMapping::renamed("name", "customer_name"),
            FieldMapping::renamed("industry", "industry"),
            FieldMapping::renamed("type", "customer_type"),
        ],
    },
];

const ACCOUNTING_RELATIONSHIPS: &[RelationshipMapping] = &[RelationshipMapping {
    source: EntityKind::Invoice,
    target: EntityKind::Company,
    cardinality: Cardinality::ManyToOne,
    foreign_key: "customer",
}];

/// Build the mapping catalog for a module. Order of the entity list is the
/// declaration order above.
pub fn catalog_for(module: ModuleKind) -> DataMappingConfig {
    let (entities, relationships) = match module {
        ModuleKind::Crm => (CRM_ENTITIES, CRM_RELATIONSHIPS),
        ModuleKind::ProjectManagement => (PROJECT_ENTITIES, PROJECT_RELATIONSHIPS),
        ModuleKind::Manufacturing => (MANUFACTURING_ENTITIES, MANUFACTURING_RELATIONSHIPS),
        ModuleKind::Accounting => (ACCOUNTING_ENTITIES, ACCOUNTING_RELATIONSHIPS),
    };
    DataMappingConfig {
        module,
        entities: entities.to_vec(),
        relationships: relationships.to_vec(),
    }
}
