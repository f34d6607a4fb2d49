// Core types for the test package result workflow

use serde::{Deserialize, Serialize};

/// Lifecycle states shared by a test order and its components.
///
/// A test only moves forward through the ordering below, or jumps to
/// `Canceled` from any non-terminal state. `Completed` and `Canceled` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestStatus {
    Pending,
    Confirmed,
    Sampled,
    Resulted,
    Completed,
    Canceled,
}

impl TestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TestStatus::Completed | TestStatus::Canceled)
    }

    /// Position on the forward ladder. `Canceled` sits outside it.
    fn ladder_rank(&self) -> Option<u8> {
        match self {
            TestStatus::Pending => Some(0),
            TestStatus::Confirmed => Some(1),
            TestStatus::Sampled => Some(2),
            TestStatus::Resulted => Some(3),
            TestStatus::Completed => Some(4),
            TestStatus::Canceled => None,
        }
    }

    /// Whether `self -> next` is a legal lifecycle move. Staying in place is
    /// allowed so repeated saves stay idempotent.
    pub fn can_advance_to(&self, next: TestStatus) -> bool {
        if *self == next {
            return true;
        }
        if next == TestStatus::Canceled {
            return !self.is_terminal();
        }
        match (self.ladder_rank(), next.ladder_rank()) {
            (Some(from), Some(to)) => to > from,
            _ => false,
        }
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TestStatus::Pending => "PENDING",
            TestStatus::Confirmed => "CONFIRMED",
            TestStatus::Sampled => "SAMPLED",
            TestStatus::Resulted => "RESULTED",
            TestStatus::Completed => "COMPLETED",
            TestStatus::Canceled => "CANCELED",
        };
        f.write_str(label)
    }
}

/// Interpretation of a binary-style result, attached by the operator when
/// the panel calls for one. Optional everywhere; quantitative components
/// simply leave it empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Conclusion {
    Infected,
    NotInfected,
    Abnormal,
}

impl Conclusion {
    pub fn parse(value: &str) -> Option<Conclusion> {
        match value.trim().to_uppercase().as_str() {
            "INFECTED" => Some(Conclusion::Infected),
            "NOT_INFECTED" => Some(Conclusion::NotInfected),
            "ABNORMAL" => Some(Conclusion::Abnormal),
            _ => None,
        }
    }
}

/// One measured analyte within a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub component_id: u64,
    pub component_name: String,
    pub result_value: String,
    pub unit: String,
    pub normal_range: String,
    pub conclusion: Option<Conclusion>,
    /// Display-only status, kept consistent with the parent test once a
    /// save or completion lands.
    pub status: TestStatus,
}

impl Component {
    /// A component is filled when both result value and unit are non-empty.
    /// This is the backend's acceptance rule for a result batch.
    pub fn is_filled(&self) -> bool {
        !self.result_value.trim().is_empty() && !self.unit.trim().is_empty()
    }

    pub fn has_result(&self) -> bool {
        !self.result_value.trim().is_empty()
    }
}

/// One lab panel within a package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub service_id: u64,
    pub service_name: String,
    pub components: Vec<Component>,
}

/// One ordered lab test, single service or bundled package. Ownership is
/// strictly hierarchical: components live in their service (or directly in
/// the test for single-service orders) and nowhere else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Test {
    pub test_id: u64,
    pub status: TestStatus,
    /// Present iff the order bundles multiple services.
    pub package_id: Option<u64>,
    pub services: Vec<Service>,
    /// Used only by single-service orders; empty for packages.
    pub components: Vec<Component>,
}

impl Test {
    pub fn is_package(&self) -> bool {
        self.package_id.is_some()
    }

    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.services
            .iter()
            .flat_map(|service| service.components.iter())
            .chain(self.components.iter())
    }

    pub fn components_mut(&mut self) -> impl Iterator<Item = &mut Component> {
        self.services
            .iter_mut()
            .flat_map(|service| service.components.iter_mut())
            .chain(self.components.iter_mut())
    }

    pub fn component_count(&self) -> usize {
        self.components().count()
    }
}

/// Fields of a component the operator can edit locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultField {
    ResultValue,
    Unit,
    NormalRange,
    Conclusion,
}

/// Which components a save targets. A scoped save submits only that
/// service's components and tags the request so the backend leaves other
/// services' persisted results alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveScope {
    All,
    Service(u64),
}

/// Transient presentation bookkeeping, kept outside the entity so UI state
/// never leaks into persisted truth. Keyed by component id in the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComponentFlags {
    /// Operator confirmed this entry as final. Advisory only.
    pub ready: bool,
    /// The last batch save failed for this component.
    pub save_error: bool,
    /// Edited since the last successful save.
    pub unsaved: bool,
}

/// Roster entry the presentation layer already holds for a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRef {
    pub service_id: u64,
    pub service_name: String,
}

/// What the presentation layer knows about a test before the workflow
/// loads it: identity, authoritative status, and the service roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestDescriptor {
    pub test_id: u64,
    pub status: TestStatus,
    pub package_id: Option<u64>,
    pub services: Vec<ServiceRef>,
}
