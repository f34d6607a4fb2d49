// Retry decorator for result store implementations.
//
// The original client refreshes credentials in the background; a call that
// lands mid-refresh fails once with an auth error and succeeds when retried
// after a short wait. That behavior belongs to the collaborator, not the
// workflow, so it lives here as a wrapper any store can opt into.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::store::errors::StoreError;
use crate::store::types::{
    ComponentRecord, CompleteResponse, ResultBatch, ResultRecord, SaveResponse,
};
use crate::store::ResultStore;
use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts per call, including the first.
    pub max_attempts: u32,
    /// Fixed wait between attempts, matching the ambient token-refresh
    /// window.
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            delay: Duration::from_millis(1500),
        }
    }
}

/// Wraps a `ResultStore`, retrying auth-expiry and transient network
/// failures once after a fixed delay. Backend rejections pass through
/// untouched.
#[derive(Debug)]
pub struct RetryingStore<S> {
    inner: S,
    config: RetryConfig,
}

impl<S: ResultStore> RetryingStore<S> {
    pub fn new(inner: S, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    pub fn with_defaults(inner: S) -> Self {
        Self::new(inner, RetryConfig::default())
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        if !self.inner.is_session_valid().await {
            warn!(operation, "session pre-flight failed, waiting for refresh");
            tokio::time::sleep(self.config.delay).await;
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match call().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "store call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err)
                    if attempt < self.config.max_attempts
                        && (err.is_auth() || err.is_transient()) =>
                {
                    warn!(
                        operation,
                        attempt,
                        error = %err,
                        "retryable store failure, backing off"
                    );
                    tokio::time::sleep(self.config.delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[async_trait]
impl<S: ResultStore> ResultStore for RetryingStore<S> {
    async fn fetch_service_components(
        &self,
        service_id: u64,
    ) -> Result<Vec<ComponentRecord>, StoreError> {
        self.run("fetch_service_components", || {
            self.inner.fetch_service_components(service_id)
        })
        .await
    }

    async fn fetch_test_results(&self, test_id: u64) -> Result<Vec<ResultRecord>, StoreError> {
        self.run("fetch_test_results", || {
            self.inner.fetch_test_results(test_id)
        })
        .await
    }

    async fn save_results(
        &self,
        test_id: u64,
        batch: ResultBatch,
    ) -> Result<SaveResponse, StoreError> {
        self.run("save_results", || {
            self.inner.save_results(test_id, batch.clone())
        })
        .await
    }

    async fn complete_test(&self, test_id: u64) -> Result<CompleteResponse, StoreError> {
        self.run("complete_test", || self.inner.complete_test(test_id))
            .await
    }

    async fn confirm_test(&self, test_id: u64) -> Result<(), StoreError> {
        self.run("confirm_test", || self.inner.confirm_test(test_id))
            .await
    }

    async fn sample_test(&self, test_id: u64) -> Result<(), StoreError> {
        self.run("sample_test", || self.inner.sample_test(test_id))
            .await
    }

    async fn cancel_test(&self, test_id: u64) -> Result<(), StoreError> {
        self.run("cancel_test", || self.inner.cancel_test(test_id))
            .await
    }

    async fn is_session_valid(&self) -> bool {
        self.inner.is_session_valid().await
    }
}
