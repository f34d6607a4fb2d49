// Request and response shapes of the result store contract. Shape only;
// transport lives behind the `ResultStore` implementation.

use serde::{Deserialize, Serialize};

use crate::workflow::types::{Conclusion, TestStatus};

/// Component definition as the store returns it for a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentRecord {
    pub component_id: u64,
    pub component_name: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub normal_range: String,
    #[serde(default)]
    pub status: Option<TestStatus>,
}

/// A persisted result row for one component of a test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub component_id: u64,
    #[serde(default)]
    pub result_value: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub normal_range: String,
    #[serde(default)]
    pub conclusion: Option<Conclusion>,
}

/// One component's entry in a result batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEntry {
    pub component_id: u64,
    pub result_value: String,
    pub unit: String,
    pub normal_range: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conclusion: Option<Conclusion>,
}

/// Batch of component results submitted in one save call. A `service_id`
/// tag scopes the save to that service within a package; without it the
/// store treats the batch as covering every service of the test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultBatch {
    pub status: TestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_id: Option<u64>,
    pub results: Vec<ResultEntry>,
}

/// Store-level verdict on a save or completion call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StoreOutcome {
    Success,
    /// Partial success: some components saved, some failed.
    Warning,
    Error,
}

/// Response to a `save_results` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveResponse {
    pub outcome: StoreOutcome,
    #[serde(default)]
    pub saved_component_ids: Vec<u64>,
    #[serde(default)]
    pub failed_component_ids: Vec<u64>,
    #[serde(default)]
    pub message: Option<String>,
}

impl SaveResponse {
    pub fn success() -> Self {
        Self {
            outcome: StoreOutcome::Success,
            saved_component_ids: Vec::new(),
            failed_component_ids: Vec::new(),
            message: None,
        }
    }
}

/// Response to a `complete_test` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteResponse {
    pub outcome: StoreOutcome,
    #[serde(default)]
    pub message: Option<String>,
}

impl CompleteResponse {
    pub fn success() -> Self {
        Self {
            outcome: StoreOutcome::Success,
            message: None,
        }
    }
}
