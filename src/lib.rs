// Labflow - lab test package result workflow
// Exposes the workflow engine and the result store contract for embedding
// behind any presentation layer.

pub mod config;
pub mod store;
pub mod telemetry;
pub mod workflow;

// Re-export key types for easy access
pub use config::{config, init_config, LabflowConfig};
pub use store::{
    ComponentRecord, CompleteResponse, ResultBatch, ResultEntry, ResultRecord, ResultStore,
    RetryConfig, RetryingStore, SaveResponse, StoreError, StoreOutcome,
};
pub use telemetry::{create_workflow_span, generate_correlation_id, init_telemetry};
pub use workflow::{
    classify_result, CompleteError, Component, ComponentFlags, Conclusion, LoadError,
    NameMarkerClassifier, ResultClassifier, ResultField, ResultKind, SaveError, SaveOutcome,
    SaveScope, Service, ServiceRef, Test, TestDescriptor, TestPackageWorkflow, TestStatus,
    TransitionError, ValidationError,
};
