//! GraphQL client for the Twenty CRM
//!
//! Twenty exposes a relay-style GraphQL API: collections come back as
//! `edges[].node` and mutations return the mutated object under the
//! mutation's field name. All values here are in Twenty's own shape
//! (camelCase field names); the CRM mapping catalog owns the translation.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::config::TwentyConfig;
use crate::error::{ConnectorError, ConnectorResult};

use super::{build_http_client, check_response};

const SYSTEM: &str = "twenty";
const SYSTEM_LABEL: &str = "Twenty CRM";

const FIND_COMPANIES: &str = r#"
query Companies($limit: Int) {
  companies(first: $limit) {
    edges { node { id name domainName employees industry annualRecurringRevenue } }
  }
}"#;

const GET_COMPANY: &str = r#"
query Company($id: ID!) {
  company(id: $id) {
    id name domainName employees industry annualRecurringRevenue
    notes { edges { node { id body } } }
  }
}"#;

const CREATE_COMPANY: &str = r#"
mutation CreateCompany($data: CompanyCreateInput!) {
  createCompany(data: $data) { id name domainName employees industry }
}"#;

const UPDATE_COMPANY: &str = r#"
mutation UpdateCompany($id: ID!, $data: CompanyUpdateInput!) {
  updateCompany(id: $id, data: $data) { id name domainName employees industry }
}"#;

const FIND_PEOPLE: &str = r#"
query People($limit: Int) {
  people(first: $limit) {
    edges { node { id firstName lastName email phone jobTitle companyId } }
  }
}"#;

const CREATE_PERSON: &str = r#"
mutation CreatePerson($data: PersonCreateInput!) {
  createPerson(data: $data) { id firstName lastName email companyId }
}"#;

const FIND_OPPORTUNITIES: &str = r#"
query Opportunities($limit: Int) {
  opportunities(first: $limit) {
    edges { node { id name stage amount closeDate companyId } }
  }
}"#;

const CREATE_OPPORTUNITY: &str = r#"
mutation CreateOpportunity($data: OpportunityCreateInput!) {
  createOpportunity(data: $data) { id name stage amount companyId }
}"#;

const UPDATE_OPPORTUNITY: &str = r#"
mutation UpdateOpportunity($id: ID!, $data: OpportunityUpdateInput!) {
  updateOpportunity(id: $id, data: $data) { id name stage amount companyId }
}"#;

const CREATE_TASK: &str = r#"
mutation CreateTask($data: TaskCreateInput!) {
  createTask(data: $data) { id title status dueAt companyId }
}"#;

const CONNECTION_PROBE: &str = "query { __typename }";

#[derive(Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
    variables: Value,
}

#[derive(Deserialize)]
struct GraphQlResponse {
    data: Option<Value>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

/// Client for Twenty's GraphQL endpoint
pub struct TwentyClient {
    http: reqwest::Client,
    graphql_url: String,
    api_token: String,
}

impl TwentyClient {
    pub fn new(config: &TwentyConfig) -> ConnectorResult<Self> {
        let api_token = config
            .api_token
            .clone()
            .ok_or_else(|| ConnectorError::configuration("Twenty API token is required"))?;
        Ok(Self {
            http: build_http_client(30)?,
            graphql_url: config.graphql_url.clone(),
            api_token,
        })
    }

    /// Run one GraphQL operation and return the `data` object
    async fn execute(&self, query: &str, variables: Value) -> ConnectorResult<Value> {
        let response = self
            .http
            .post(&self.graphql_url)
            .bearer_auth(&self.api_token)
            .json(&GraphQlRequest { query, variables })
            .send()
            .await?;

        let status = response.status().as_u16();
        let response = check_response(SYSTEM, response).await?;
        let body: GraphQlResponse = response.json().await?;

        if let Some(errors) = body.errors {
            if !errors.is_empty() {
                let message = errors
                    .into_iter()
                    .map(|e| e.message)
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(ConnectorError::external_api(SYSTEM, status, message));
            }
        }
        body.data
            .ok_or_else(|| ConnectorError::external_api(SYSTEM, status, "Empty GraphQL response"))
    }

    /// Unwrap a relay connection (`root.edges[].node`) into plain nodes
    fn collect_nodes(data: &Value, root: &str) -> Vec<Value> {
        data[root]["edges"]
            .as_array()
            .map(|edges| edges.iter().map(|e| e["node"].clone()).collect())
            .unwrap_or_default()
    }

    /// Probe the GraphQL endpoint. Failures surface as connection errors
    /// naming the system.
    pub async fn test_connection(&self) -> ConnectorResult<()> {
        let response = self
            .http
            .post(&self.graphql_url)
            .bearer_auth(&self.api_token)
            .json(&GraphQlRequest {
                query: CONNECTION_PROBE,
                variables: Value::Null,
            })
            .send()
            .await
            .map_err(|e| ConnectorError::connection_failed(SYSTEM_LABEL, e.to_string()))?;

        if !response.status().is_success() {
            return Err(ConnectorError::connection_failed(
                SYSTEM_LABEL,
                format!("status {}", response.status().as_u16()),
            ));
        }
        debug!("Twenty GraphQL endpoint reachable");
        Ok(())
    }

    pub async fn find_companies(&self, limit: u32) -> ConnectorResult<Vec<Value>> {
        let data = self
            .execute(FIND_COMPANIES, json!({"limit": limit}))
            .await?;
        Ok(Self::collect_nodes(&data, "companies"))
    }

    /// Fetch one company together with its attached notes
    pub async fn get_company(&self, id: &str) -> ConnectorResult<Value> {
        let data = self.execute(GET_COMPANY, json!({"id": id})).await?;
        let company = data["company"].clone();
        if company.is_null() {
            return Err(ConnectorError::not_found(format!("Company {}", id)));
        }
        Ok(company)
    }

    pub async fn create_company(&self, company: Value) -> ConnectorResult<Value> {
        let data = self.execute(CREATE_COMPANY, json!({"data": company})).await?;
        Ok(data["createCompany"].clone())
    }

    pub async fn update_company(&self, id: &str, patch: Value) -> ConnectorResult<Value> {
        let data = self
            .execute(UPDATE_COMPANY, json!({"id": id, "data": patch}))
            .await?;
        Ok(data["updateCompany"].clone())
    }

    pub async fn find_people(&self, limit: u32) -> ConnectorResult<Vec<Value>> {
        let data = self.execute(FIND_PEOPLE, json!({"limit": limit})).await?;
        Ok(Self::collect_nodes(&data, "people"))
    }

    pub async fn create_person(&self, person: Value) -> ConnectorResult<Value> {
        let data = self.execute(CREATE_PERSON, json!({"data": person})).await?;
        Ok(data["createPerson"].clone())
    }

    pub async fn find_opportunities(&self, limit: u32) -> ConnectorResult<Vec<Value>> {
        let data = self
            .execute(FIND_OPPORTUNITIES, json!({"limit": limit}))
            .await?;
        Ok(Self::collect_nodes(&data, "opportunities"))
    }

    pub async fn create_opportunity(&self, opportunity: Value) -> ConnectorResult<Value> {
        let data = self
            .execute(CREATE_OPPORTUNITY, json!({"data": opportunity}))
            .await?;
        Ok(data["createOpportunity"].clone())
    }

    pub async fn update_opportunity(&self, id: &str, patch: Value) -> ConnectorResult<Value> {
        let data = self
            .execute(UPDATE_OPPORTUNITY, json!({"id": id, "data": patch}))
            .await?;
        Ok(data["updateOpportunity"].clone())
    }

    /// Create a workspace task, used for follow-up workflows
    pub async fn create_task(&self, task: Value) -> ConnectorResult<Value> {
        let data = self.execute(CREATE_TASK, json!({"data": task})).await?;
        Ok(data["createTask"].clone())
    }
}
