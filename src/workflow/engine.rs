// Test package workflow engine.
//
// Owns the in-memory snapshot of one lab test order, its services, and
// their components, and drives the save-results / complete-test
// transitions against the result store. One engine instance per loaded
// test; the aggregate is discarded when the view closes.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn, Instrument};

use crate::config;
use crate::telemetry;
use crate::store::{ResultBatch, ResultEntry, ResultStore, StoreOutcome};
use crate::workflow::errors::{
    disguised_success, parse_missing_component_ids, CompleteError, LoadError, SaveError,
    SaveOutcome, TransitionError, ValidationError,
};
use crate::workflow::types::{
    Component, ComponentFlags, ResultField, SaveScope, Service, Test, TestDescriptor, TestStatus,
};

pub struct TestPackageWorkflow<S> {
    store: S,
    test: Option<Test>,
    /// Transient presentation flags, keyed by component id. Kept apart
    /// from the entities so UI bookkeeping never mixes with persisted
    /// truth.
    flags: HashMap<u64, ComponentFlags>,
    /// Advisory: a suspending operation is in flight. Not a lock; the
    /// presentation layer uses it to disable conflicting actions.
    busy: bool,
    complete_retry_delay: Duration,
    loaded_at: Option<DateTime<Utc>>,
    last_saved_at: Option<DateTime<Utc>>,
}

impl<S: ResultStore> TestPackageWorkflow<S> {
    pub fn new(store: S) -> Self {
        let complete_retry_delay = config::config()
            .map(|cfg| Duration::from_millis(cfg.workflow.complete_retry_delay_ms))
            .unwrap_or_else(|_| Duration::from_millis(1500));
        Self {
            store,
            test: None,
            flags: HashMap::new(),
            busy: false,
            complete_retry_delay,
            loaded_at: None,
            last_saved_at: None,
        }
    }

    /// Override the fixed backoff used by the single completion retry.
    pub fn with_complete_retry_delay(mut self, delay: Duration) -> Self {
        self.complete_retry_delay = delay;
        self
    }

    pub fn test(&self) -> Option<&Test> {
        self.test.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.loaded_at
    }

    pub fn last_saved_at(&self) -> Option<DateTime<Utc>> {
        self.last_saved_at
    }

    /// Transient flags for a component; defaults when none were recorded.
    pub fn component_flags(&self, component_id: u64) -> ComponentFlags {
        self.flags.get(&component_id).copied().unwrap_or_default()
    }

    /// Fetch the test's components and merge in any persisted results.
    /// A results-fetch failure is tolerated (components stay unfilled); a
    /// component-fetch failure aborts the load and can be retried.
    pub async fn load(&mut self, descriptor: TestDescriptor) -> Result<(), LoadError> {
        self.busy = true;
        let span = self.operation_span("load", Some(descriptor.test_id));
        let result = self.load_inner(descriptor).instrument(span).await;
        self.busy = false;
        result
    }

    async fn load_inner(&mut self, descriptor: TestDescriptor) -> Result<(), LoadError> {
        if descriptor.services.is_empty() {
            return Err(LoadError::EmptyDescriptor);
        }

        let mut test = Test {
            test_id: descriptor.test_id,
            status: descriptor.status,
            package_id: descriptor.package_id,
            services: Vec::new(),
            components: Vec::new(),
        };

        if descriptor.package_id.is_some() {
            for service_ref in &descriptor.services {
                let components = self
                    .fetch_components(service_ref.service_id, descriptor.status)
                    .await?;
                test.services.push(Service {
                    service_id: service_ref.service_id,
                    service_name: service_ref.service_name.clone(),
                    components,
                });
            }
        } else {
            let service_ref = &descriptor.services[0];
            test.components = self
                .fetch_components(service_ref.service_id, descriptor.status)
                .await?;
        }

        match self.store.fetch_test_results(descriptor.test_id).await {
            Ok(results) => {
                let merged = merge_results(&mut test, &results);
                debug!(
                    test_id = descriptor.test_id,
                    fetched = results.len(),
                    merged,
                    "merged persisted results into components"
                );
            }
            Err(err) => {
                // Tolerated: the operator sees unfilled components instead
                // of a blocked load.
                warn!(
                    test_id = descriptor.test_id,
                    error = %err,
                    "could not fetch persisted results, continuing unmerged"
                );
            }
        }

        info!(
            test_id = descriptor.test_id,
            status = %test.status,
            services = test.services.len(),
            components = test.component_count(),
            "test loaded"
        );
        self.flags.clear();
        self.loaded_at = Some(Utc::now());
        self.last_saved_at = None;
        self.test = Some(test);
        Ok(())
    }

    async fn fetch_components(
        &self,
        service_id: u64,
        inherited: TestStatus,
    ) -> Result<Vec<Component>, LoadError> {
        let records = self
            .store
            .fetch_service_components(service_id)
            .await
            .map_err(|source| LoadError::ComponentFetch { service_id, source })?;
        Ok(records
            .into_iter()
            .map(|record| Component {
                component_id: record.component_id,
                component_name: record.component_name,
                result_value: String::new(),
                unit: record.unit,
                normal_range: record.normal_range,
                conclusion: None,
                status: record.status.unwrap_or(inherited),
            })
            .collect())
    }

    /// Local edit of one component field. No backend call. Clears any
    /// previous save error on the component; an edit to an unknown
    /// component still clears that id's transient flags and nothing else.
    pub fn edit_component(
        &mut self,
        service_id: u64,
        component_id: u64,
        field: ResultField,
        value: &str,
    ) {
        if let Some(flags) = self.flags.get_mut(&component_id) {
            flags.save_error = false;
        }

        let Some(component) = self.component_mut(service_id, component_id) else {
            debug!(
                service_id,
                component_id, "edit ignored, no such component held"
            );
            return;
        };
        match field {
            ResultField::ResultValue => component.result_value = value.to_string(),
            ResultField::Unit => component.unit = value.to_string(),
            ResultField::NormalRange => component.normal_range = value.to_string(),
            ResultField::Conclusion => {
                component.conclusion = crate::workflow::types::Conclusion::parse(value)
            }
        }
        self.flags.entry(component_id).or_default().unsaved = true;
    }

    /// Operator confirmation that a component's entry is final. Requires
    /// the component to be filled; advisory bookkeeping otherwise.
    pub fn mark_ready(&mut self, service_id: u64, component_id: u64) -> Result<(), ValidationError> {
        let Some(component) = self.component(service_id, component_id) else {
            return Err(ValidationError::UnknownComponent {
                service_id,
                component_id,
            });
        };
        if !component.is_filled() {
            return Err(ValidationError::MissingFields { component_id });
        }
        self.flags.entry(component_id).or_default().ready = true;
        Ok(())
    }

    /// The single blocking precondition for saving the whole test: every
    /// component must carry a result value and a unit.
    pub fn validate_all_filled(&self) -> Result<(), ValidationError> {
        let test = self.test.as_ref().ok_or(ValidationError::NotLoaded)?;
        let count = test.components().filter(|c| !c.is_filled()).count();
        if count > 0 {
            Err(ValidationError::Unfilled { count })
        } else {
            Ok(())
        }
    }

    /// Share of components carrying a result value, 0..=100.
    pub fn completion_percentage(&self) -> f64 {
        let Some(test) = self.test.as_ref() else {
            return 0.0;
        };
        let total = test.component_count();
        if total == 0 {
            return 0.0;
        }
        let filled = test.components().filter(|c| c.has_result()).count();
        100.0 * filled as f64 / total as f64
    }

    /// Displayable status for a component: optimistically `RESULTED` once a
    /// value is entered, pending save. Cosmetic only; the authoritative
    /// field changes when a save lands.
    pub fn display_status(&self, component_id: u64) -> Option<TestStatus> {
        let component = self
            .test
            .as_ref()?
            .components()
            .find(|c| c.component_id == component_id)?;
        if component.has_result() && component.status.can_advance_to(TestStatus::Resulted) {
            Some(TestStatus::Resulted)
        } else {
            Some(component.status)
        }
    }

    /// Components not yet confirmed ready by the operator.
    pub fn unready_components(&self) -> Vec<u64> {
        let Some(test) = self.test.as_ref() else {
            return Vec::new();
        };
        test.components()
            .map(|c| c.component_id)
            .filter(|id| !self.component_flags(*id).ready)
            .collect()
    }

    /// Components flagged by the last partial save failure.
    pub fn components_with_errors(&self) -> Vec<u64> {
        let Some(test) = self.test.as_ref() else {
            return Vec::new();
        };
        test.components()
            .map(|c| c.component_id)
            .filter(|id| self.component_flags(*id).save_error)
            .collect()
    }

    /// Submit one batch of component results. Scoped saves submit only the
    /// target service's components and tag the request, leaving other
    /// services' persisted results untouched server-side.
    pub async fn save_all_results(&mut self, scope: SaveScope) -> Result<SaveOutcome, SaveError> {
        self.busy = true;
        let span = self.operation_span("save_all_results", self.test.as_ref().map(|t| t.test_id));
        let result = self.save_all_results_inner(scope).instrument(span).await;
        self.busy = false;
        result
    }

    async fn save_all_results_inner(&mut self, scope: SaveScope) -> Result<SaveOutcome, SaveError> {
        let test = self.test.as_ref().ok_or(ValidationError::NotLoaded)?;
        if test.status.is_terminal() {
            return Err(SaveError::Terminal {
                status: test.status,
            });
        }
        let test_id = test.test_id;

        let scoped = self.scoped_components(scope);
        let unfilled = scoped.iter().filter(|c| !c.is_filled()).count();
        if unfilled > 0 {
            return Err(ValidationError::Unfilled { count: unfilled }.into());
        }
        if scoped.is_empty() {
            return Err(SaveError::EmptyBatch);
        }

        let unready = scoped
            .iter()
            .filter(|c| !self.component_flags(c.component_id).ready)
            .count();
        if unready > 0 {
            // Advisory only; the operator may save without per-component
            // confirmation.
            warn!(
                test_id,
                unready, "saving with components not confirmed ready"
            );
        }

        let entries = dedup_by_component(
            scoped
                .iter()
                .map(|c| ResultEntry {
                    component_id: c.component_id,
                    result_value: c.result_value.clone(),
                    unit: c.unit.clone(),
                    normal_range: c.normal_range.clone(),
                    conclusion: c.conclusion,
                })
                .collect(),
        );
        let targeted: Vec<u64> = entries.iter().map(|e| e.component_id).collect();
        let batch = ResultBatch {
            status: TestStatus::Resulted,
            service_id: match (scope, self.test.as_ref().map(|t| t.is_package())) {
                (SaveScope::Service(id), Some(true)) => Some(id),
                _ => None,
            },
            results: entries,
        };

        if let Ok(payload) = serde_json::to_string(&batch) {
            debug!(test_id, payload = %payload, "submitting result batch");
        }
        info!(test_id, components = targeted.len(), scoped = batch.service_id.is_some(), "saving results");

        match self.store.save_results(test_id, batch).await {
            Ok(response) => match response.outcome {
                StoreOutcome::Success => {
                    self.apply_save_success(&targeted, TestStatus::Resulted);
                    Ok(SaveOutcome::Full)
                }
                StoreOutcome::Warning => {
                    let saved = response.saved_component_ids;
                    let failed = response.failed_component_ids;
                    self.apply_partial_save(&saved, &failed);
                    warn!(
                        test_id,
                        saved = saved.len(),
                        failed = failed.len(),
                        "result store reported a partial save"
                    );
                    Ok(SaveOutcome::Partial {
                        saved: saved.len(),
                        failed: failed.len(),
                    })
                }
                StoreOutcome::Error => {
                    let message = response
                        .message
                        .unwrap_or_else(|| "unspecified result store error".to_string());
                    if let Some(status) = disguised_success(&message) {
                        warn!(test_id, message = %message, "store error message names a completed transition, treating as success");
                        self.apply_save_success(&targeted, status);
                        return Ok(SaveOutcome::Full);
                    }
                    Err(SaveError::Rejected {
                        missing_component_ids: parse_missing_component_ids(&message),
                        message,
                    })
                }
            },
            Err(err) => {
                if let Some(status) = err.backend_message().and_then(disguised_success) {
                    warn!(test_id, error = %err, "store failure names a completed transition, treating as success");
                    self.apply_save_success(&targeted, status);
                    return Ok(SaveOutcome::Full);
                }
                Err(SaveError::Store(err))
            }
        }
    }

    /// Drive the test to COMPLETED: defensively re-save the latest results
    /// (failure tolerated), then invoke the completion transition with one
    /// fixed-delay retry on transient failure.
    pub async fn complete_test(&mut self) -> Result<(), CompleteError> {
        self.busy = true;
        let span = self.operation_span("complete_test", self.test.as_ref().map(|t| t.test_id));
        let result = self.complete_test_inner().instrument(span).await;
        self.busy = false;
        result
    }

    async fn complete_test_inner(&mut self) -> Result<(), CompleteError> {
        let test = self.test.as_ref().ok_or(ValidationError::NotLoaded)?;
        let test_id = test.test_id;
        match test.status {
            TestStatus::Completed => {
                debug!(test_id, "already completed, nothing to do");
                return Ok(());
            }
            TestStatus::Canceled => {
                return Err(CompleteError::InvalidStatus {
                    status: TestStatus::Canceled,
                });
            }
            _ => {}
        }
        self.validate_all_filled()?;

        // Defensive re-sync of the latest results before the transition.
        match self.save_all_results_inner(SaveScope::All).await {
            Ok(outcome) => debug!(test_id, ?outcome, "pre-completion result sync saved"),
            Err(err) => warn!(
                test_id,
                error = %err,
                "pre-completion result sync failed, continuing to completion"
            ),
        }

        let mut attempt = 0;
        let response = loop {
            attempt += 1;
            match self.store.complete_test(test_id).await {
                Ok(response) => break Ok(response),
                Err(err) if attempt == 1 && err.is_transient() => {
                    warn!(
                        test_id,
                        error = %err,
                        "completion attempt failed, retrying once after backoff"
                    );
                    tokio::time::sleep(self.complete_retry_delay).await;
                }
                Err(err) => break Err(err),
            }
        };

        match response {
            Ok(response) if response.outcome == StoreOutcome::Success => {
                self.apply_completion();
                info!(test_id, "test completed");
                Ok(())
            }
            Ok(response) => {
                let message = response
                    .message
                    .unwrap_or_else(|| "unspecified result store error".to_string());
                match disguised_success(&message) {
                    Some(TestStatus::Completed) => {
                        warn!(test_id, message = %message, "completion error message names the transition, treating as success");
                        self.apply_completion();
                        Ok(())
                    }
                    Some(status) => {
                        warn!(test_id, message = %message, %status, "completion error message names a save transition, treating as success");
                        self.advance_statuses(status);
                        Ok(())
                    }
                    None => Err(CompleteError::Rejected { message }),
                }
            }
            Err(err) => {
                if let Some(status) = err.backend_message().and_then(disguised_success) {
                    warn!(test_id, error = %err, %status, "completion failure names the transition, treating as success");
                    self.advance_statuses(status);
                    return Ok(());
                }
                Err(CompleteError::Store { source: err })
            }
        }
    }

    /// PENDING -> CONFIRMED.
    pub async fn confirm(&mut self) -> Result<(), TransitionError> {
        self.transition(TestStatus::Confirmed).await
    }

    /// CONFIRMED -> SAMPLED.
    pub async fn mark_sampled(&mut self) -> Result<(), TransitionError> {
        self.transition(TestStatus::Sampled).await
    }

    /// Any non-terminal state -> CANCELED. Cancels every component with it.
    pub async fn cancel(&mut self) -> Result<(), TransitionError> {
        self.transition(TestStatus::Canceled).await
    }

    async fn transition(&mut self, target: TestStatus) -> Result<(), TransitionError> {
        self.busy = true;
        let result = self.transition_inner(target).await;
        self.busy = false;
        result
    }

    async fn transition_inner(&mut self, target: TestStatus) -> Result<(), TransitionError> {
        let test = self.test.as_ref().ok_or(ValidationError::NotLoaded)?;
        let test_id = test.test_id;
        let from = test.status;
        if from == target {
            debug!(test_id, status = %from, "transition is a no-op");
            return Ok(());
        }
        if !from.can_advance_to(target) {
            return Err(TransitionError::Illegal { from, to: target });
        }

        match target {
            TestStatus::Confirmed => self.store.confirm_test(test_id).await?,
            TestStatus::Sampled => self.store.sample_test(test_id).await?,
            TestStatus::Canceled => self.store.cancel_test(test_id).await?,
            _ => return Err(TransitionError::Illegal { from, to: target }),
        }

        if let Some(test) = self.test.as_mut() {
            test.status = target;
            if target == TestStatus::Canceled {
                for component in test.components_mut() {
                    component.status = TestStatus::Canceled;
                }
            }
        }
        info!(test_id, from = %from, to = %target, "test transitioned");
        Ok(())
    }

    fn operation_span(&self, operation: &str, test_id: Option<u64>) -> tracing::Span {
        let correlation_id = telemetry::generate_correlation_id();
        telemetry::create_workflow_span(operation, test_id, Some(correlation_id.as_str()))
    }

    fn scoped_components(&self, scope: SaveScope) -> Vec<&Component> {
        let Some(test) = self.test.as_ref() else {
            return Vec::new();
        };
        match scope {
            SaveScope::Service(service_id) if test.is_package() => test
                .services
                .iter()
                .filter(|s| s.service_id == service_id)
                .flat_map(|s| s.components.iter())
                .collect(),
            _ => test.components().collect(),
        }
    }

    fn component(&self, service_id: u64, component_id: u64) -> Option<&Component> {
        let test = self.test.as_ref()?;
        if test.is_package() {
            test.services
                .iter()
                .find(|s| s.service_id == service_id)?
                .components
                .iter()
                .find(|c| c.component_id == component_id)
        } else {
            test.components
                .iter()
                .find(|c| c.component_id == component_id)
        }
    }

    fn component_mut(&mut self, service_id: u64, component_id: u64) -> Option<&mut Component> {
        let test = self.test.as_mut()?;
        if test.is_package() {
            test.services
                .iter_mut()
                .find(|s| s.service_id == service_id)?
                .components
                .iter_mut()
                .find(|c| c.component_id == component_id)
        } else {
            test.components
                .iter_mut()
                .find(|c| c.component_id == component_id)
        }
    }

    fn apply_save_success(&mut self, component_ids: &[u64], status: TestStatus) {
        if let Some(test) = self.test.as_mut() {
            for component in test.components_mut() {
                if component_ids.contains(&component.component_id)
                    && component.status.can_advance_to(status)
                {
                    component.status = status;
                }
            }
            if test.status.can_advance_to(status) {
                test.status = status;
            }
        }
        for id in component_ids {
            let flags = self.flags.entry(*id).or_default();
            flags.ready = true;
            flags.save_error = false;
            flags.unsaved = false;
        }
        self.last_saved_at = Some(Utc::now());
    }

    fn apply_partial_save(&mut self, saved: &[u64], failed: &[u64]) {
        if let Some(test) = self.test.as_mut() {
            for component in test.components_mut() {
                if saved.contains(&component.component_id)
                    && component.status.can_advance_to(TestStatus::Resulted)
                {
                    component.status = TestStatus::Resulted;
                }
            }
        }
        for id in saved {
            let flags = self.flags.entry(*id).or_default();
            flags.save_error = false;
            flags.unsaved = false;
        }
        for id in failed {
            self.flags.entry(*id).or_default().save_error = true;
        }
        self.last_saved_at = Some(Utc::now());
    }

    fn apply_completion(&mut self) {
        self.advance_statuses(TestStatus::Completed);
        for flags in self.flags.values_mut() {
            flags.unsaved = false;
        }
    }

    fn advance_statuses(&mut self, status: TestStatus) {
        if let Some(test) = self.test.as_mut() {
            if test.status.can_advance_to(status) {
                test.status = status;
            }
            for component in test.components_mut() {
                if component.status.can_advance_to(status) {
                    component.status = status;
                }
            }
        }
    }
}

/// Merge persisted result rows into the loaded components, matched by
/// component id. A component with a persisted value becomes `RESULTED`;
/// everything else keeps the status it inherited from the test. Returns
/// how many components were merged.
fn merge_results(test: &mut Test, results: &[crate::store::ResultRecord]) -> usize {
    let mut merged = 0;
    for component in test.components_mut() {
        let Some(record) = results
            .iter()
            .find(|r| r.component_id == component.component_id)
        else {
            continue;
        };
        if !record.result_value.trim().is_empty() {
            component.result_value = record.result_value.clone();
            if component.status.can_advance_to(TestStatus::Resulted) {
                component.status = TestStatus::Resulted;
            }
        }
        if !record.unit.trim().is_empty() {
            component.unit = record.unit.clone();
        }
        if !record.normal_range.trim().is_empty() {
            component.normal_range = record.normal_range.clone();
        }
        if record.conclusion.is_some() {
            component.conclusion = record.conclusion;
        }
        merged += 1;
    }
    merged
}

/// Safeguard against duplicate component ids in one batch: last write wins,
/// first position kept.
fn dedup_by_component(entries: Vec<ResultEntry>) -> Vec<ResultEntry> {
    let mut order = Vec::new();
    let mut by_id: HashMap<u64, ResultEntry> = HashMap::new();
    for entry in entries {
        if !by_id.contains_key(&entry.component_id) {
            order.push(entry.component_id);
        }
        by_id.insert(entry.component_id, entry);
    }
    order
        .into_iter()
        .filter_map(|id| by_id.remove(&id))
        .collect()
}
