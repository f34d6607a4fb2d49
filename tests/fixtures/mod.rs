// Shared test fixtures: a scripted in-memory result store.
//
// Default behavior models the real backend: saves upsert by component id
// and succeed, completion succeeds. Tests push scripted responses to force
// partial saves, quirky error messages, or transport failures, and inspect
// the recorded calls afterwards.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use labflow::{
    ComponentRecord, CompleteResponse, ResultBatch, ResultRecord, ResultStore, SaveResponse,
    StoreError, StoreOutcome,
};

#[derive(Default)]
pub struct ScriptedStore {
    components_by_service: Mutex<HashMap<u64, Vec<ComponentRecord>>>,
    persisted_results: Mutex<HashMap<u64, Vec<ResultRecord>>>,
    results_fetch_error: Mutex<Option<StoreError>>,
    save_script: Mutex<VecDeque<Result<SaveResponse, StoreError>>>,
    complete_script: Mutex<VecDeque<Result<CompleteResponse, StoreError>>>,
    transition_script: Mutex<VecDeque<Result<(), StoreError>>>,

    pub saved_batches: Mutex<Vec<(u64, ResultBatch)>>,
    pub completed_tests: Mutex<Vec<u64>>,
    pub confirmed_tests: Mutex<Vec<u64>>,
    pub sampled_tests: Mutex<Vec<u64>>,
    pub canceled_tests: Mutex<Vec<u64>>,

    pub save_calls: AtomicUsize,
    pub complete_calls: AtomicUsize,
    pub fetch_component_calls: AtomicUsize,
    pub fetch_result_calls: AtomicUsize,

    session_invalid: AtomicBool,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service(self, service_id: u64, components: Vec<ComponentRecord>) -> Self {
        self.components_by_service
            .lock()
            .unwrap()
            .insert(service_id, components);
        self
    }

    pub fn with_persisted(self, test_id: u64, results: Vec<ResultRecord>) -> Self {
        self.persisted_results
            .lock()
            .unwrap()
            .insert(test_id, results);
        self
    }

    pub fn fail_results_fetch(&self, error: StoreError) {
        *self.results_fetch_error.lock().unwrap() = Some(error);
    }

    pub fn push_save_response(&self, response: SaveResponse) {
        self.save_script.lock().unwrap().push_back(Ok(response));
    }

    pub fn push_save_error(&self, error: StoreError) {
        self.save_script.lock().unwrap().push_back(Err(error));
    }

    pub fn push_complete_response(&self, response: CompleteResponse) {
        self.complete_script.lock().unwrap().push_back(Ok(response));
    }

    pub fn push_complete_error(&self, error: StoreError) {
        self.complete_script.lock().unwrap().push_back(Err(error));
    }

    pub fn push_transition_error(&self, error: StoreError) {
        self.transition_script.lock().unwrap().push_back(Err(error));
    }

    pub fn set_session_valid(&self, valid: bool) {
        self.session_invalid.store(!valid, Ordering::SeqCst);
    }

    pub fn persisted_for(&self, test_id: u64) -> Vec<ResultRecord> {
        self.persisted_results
            .lock()
            .unwrap()
            .get(&test_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn last_batch(&self) -> Option<(u64, ResultBatch)> {
        self.saved_batches.lock().unwrap().last().cloned()
    }

    fn upsert(&self, test_id: u64, batch: &ResultBatch) {
        let mut persisted = self.persisted_results.lock().unwrap();
        let rows = persisted.entry(test_id).or_default();
        for entry in &batch.results {
            let record = ResultRecord {
                component_id: entry.component_id,
                result_value: entry.result_value.clone(),
                unit: entry.unit.clone(),
                normal_range: entry.normal_range.clone(),
                conclusion: entry.conclusion,
            };
            match rows
                .iter_mut()
                .find(|r| r.component_id == entry.component_id)
            {
                Some(existing) => *existing = record,
                None => rows.push(record),
            }
        }
    }
}

#[async_trait]
impl ResultStore for ScriptedStore {
    async fn fetch_service_components(
        &self,
        service_id: u64,
    ) -> Result<Vec<ComponentRecord>, StoreError> {
        self.fetch_component_calls.fetch_add(1, Ordering::SeqCst);
        self.components_by_service
            .lock()
            .unwrap()
            .get(&service_id)
            .cloned()
            .ok_or_else(|| StoreError::Network {
                operation: "fetch_service_components".to_string(),
                message: format!("no route to service {service_id}"),
            })
    }

    async fn fetch_test_results(&self, test_id: u64) -> Result<Vec<ResultRecord>, StoreError> {
        self.fetch_result_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.results_fetch_error.lock().unwrap().take() {
            return Err(error);
        }
        Ok(self.persisted_for(test_id))
    }

    async fn save_results(
        &self,
        test_id: u64,
        batch: ResultBatch,
    ) -> Result<SaveResponse, StoreError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        self.saved_batches
            .lock()
            .unwrap()
            .push((test_id, batch.clone()));

        if let Some(scripted) = self.save_script.lock().unwrap().pop_front() {
            return scripted;
        }

        // Default backend behavior: upsert every entry, full success.
        self.upsert(test_id, &batch);
        Ok(SaveResponse {
            outcome: StoreOutcome::Success,
            saved_component_ids: batch.results.iter().map(|e| e.component_id).collect(),
            failed_component_ids: Vec::new(),
            message: None,
        })
    }

    async fn complete_test(&self, test_id: u64) -> Result<CompleteResponse, StoreError> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(scripted) = self.complete_script.lock().unwrap().pop_front() {
            return scripted;
        }
        self.completed_tests.lock().unwrap().push(test_id);
        Ok(CompleteResponse::success())
    }

    async fn confirm_test(&self, test_id: u64) -> Result<(), StoreError> {
        if let Some(scripted) = self.transition_script.lock().unwrap().pop_front() {
            return scripted;
        }
        self.confirmed_tests.lock().unwrap().push(test_id);
        Ok(())
    }

    async fn sample_test(&self, test_id: u64) -> Result<(), StoreError> {
        if let Some(scripted) = self.transition_script.lock().unwrap().pop_front() {
            return scripted;
        }
        self.sampled_tests.lock().unwrap().push(test_id);
        Ok(())
    }

    async fn cancel_test(&self, test_id: u64) -> Result<(), StoreError> {
        if let Some(scripted) = self.transition_script.lock().unwrap().pop_front() {
            return scripted;
        }
        self.canceled_tests.lock().unwrap().push(test_id);
        Ok(())
    }

    async fn is_session_valid(&self) -> bool {
        !self.session_invalid.load(Ordering::SeqCst)
    }
}

pub fn component_record(component_id: u64, name: &str) -> ComponentRecord {
    ComponentRecord {
        component_id,
        component_name: name.to_string(),
        unit: String::new(),
        normal_range: String::new(),
        status: None,
    }
}

pub fn result_record(component_id: u64, value: &str, unit: &str) -> ResultRecord {
    ResultRecord {
        component_id,
        result_value: value.to_string(),
        unit: unit.to_string(),
        normal_range: String::new(),
        conclusion: None,
    }
}
