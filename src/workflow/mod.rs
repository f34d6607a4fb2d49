// Test package workflow - the engine behind the result entry screens.
//
// Separation of concerns: `types` holds the aggregate and lifecycle,
// `classify` the presentation-only result classification, `errors` the
// typed failure taxonomy, `engine` the operations against the store.

pub mod classify;
pub mod engine;
pub mod errors;
pub mod types;

pub use classify::{classify_result, NameMarkerClassifier, ResultClassifier, ResultKind};
pub use engine::TestPackageWorkflow;
pub use errors::{
    CompleteError, LoadError, SaveError, SaveOutcome, TransitionError, ValidationError,
};
pub use types::{
    Component, ComponentFlags, Conclusion, ResultField, SaveScope, Service, ServiceRef, Test,
    TestDescriptor, TestStatus,
};
