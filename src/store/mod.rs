// Result store collaborator boundary.
//
// The workflow consumes the backend exclusively through this trait so tests
// can substitute scripted implementations and the transport (HTTP client,
// auth refresh) stays out of the engine.

pub mod errors;
pub mod retry;
pub mod types;

use async_trait::async_trait;
use std::sync::Arc;

pub use errors::StoreError;
pub use retry::{RetryConfig, RetryingStore};
pub use types::{
    ComponentRecord, CompleteResponse, ResultBatch, ResultEntry, ResultRecord, SaveResponse,
    StoreOutcome,
};

/// Operations the result store exposes to the workflow.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Component roster for one service.
    async fn fetch_service_components(
        &self,
        service_id: u64,
    ) -> Result<Vec<ComponentRecord>, StoreError>;

    /// Already-persisted results for a test, across all its services.
    async fn fetch_test_results(&self, test_id: u64) -> Result<Vec<ResultRecord>, StoreError>;

    /// Persist a batch of component results. Upserts by component id, so
    /// resubmitting an identical batch is safe.
    async fn save_results(
        &self,
        test_id: u64,
        batch: ResultBatch,
    ) -> Result<SaveResponse, StoreError>;

    /// Transition the test to COMPLETED.
    async fn complete_test(&self, test_id: u64) -> Result<CompleteResponse, StoreError>;

    /// Transition the test from PENDING to CONFIRMED.
    async fn confirm_test(&self, test_id: u64) -> Result<(), StoreError>;

    /// Transition the test from CONFIRMED to SAMPLED.
    async fn sample_test(&self, test_id: u64) -> Result<(), StoreError>;

    /// Cancel the test.
    async fn cancel_test(&self, test_id: u64) -> Result<(), StoreError>;

    /// Pre-flight credential check. The default assumes the ambient client
    /// keeps the session fresh.
    async fn is_session_valid(&self) -> bool {
        true
    }
}

#[async_trait]
impl<S: ResultStore + ?Sized> ResultStore for Arc<S> {
    async fn fetch_service_components(
        &self,
        service_id: u64,
    ) -> Result<Vec<ComponentRecord>, StoreError> {
        (**self).fetch_service_components(service_id).await
    }

    async fn fetch_test_results(&self, test_id: u64) -> Result<Vec<ResultRecord>, StoreError> {
        (**self).fetch_test_results(test_id).await
    }

    async fn save_results(
        &self,
        test_id: u64,
        batch: ResultBatch,
    ) -> Result<SaveResponse, StoreError> {
        (**self).save_results(test_id, batch).await
    }

    async fn complete_test(&self, test_id: u64) -> Result<CompleteResponse, StoreError> {
        (**self).complete_test(test_id).await
    }

    async fn confirm_test(&self, test_id: u64) -> Result<(), StoreError> {
        (**self).confirm_test(test_id).await
    }

    async fn sample_test(&self, test_id: u64) -> Result<(), StoreError> {
        (**self).sample_test(test_id).await
    }

    async fn cancel_test(&self, test_id: u64) -> Result<(), StoreError> {
        (**self).cancel_test(test_id).await
    }

    async fn is_session_valid(&self) -> bool {
        (**self).is_session_valid().await
    }
}
