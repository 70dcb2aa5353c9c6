//! In-memory build store for tests and local runs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::types::{
    Build, BuildState, CheckMapping, CheckRunId, CheckSuiteId, PullNumber, TaskGroupId, TaskId,
};

use super::{BuildStore, Result, StoreError};

/// [`BuildStore`] backed by hash maps.
#[derive(Debug, Default)]
pub struct InMemoryBuildStore {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    builds: HashMap<TaskGroupId, Build>,
    mappings: HashMap<(TaskGroupId, TaskId), CheckMapping>,
}

impl InMemoryBuildStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of build rows, for test assertions.
    pub fn build_count(&self) -> usize {
        self.lock().builds.len()
    }
}

#[async_trait]
impl BuildStore for InMemoryBuildStore {
    async fn create_build_if_absent(&self, build: &Build) -> Result<(Build, bool)> {
        let mut state = self.lock();
        match state.builds.get(&build.task_group_id) {
            Some(existing) => Ok((existing.clone(), false)),
            None => {
                state
                    .builds
                    .insert(build.task_group_id.clone(), build.clone());
                Ok((build.clone(), true))
            }
        }
    }

    async fn get_build(&self, task_group_id: &TaskGroupId) -> Result<Option<Build>> {
        Ok(self.lock().builds.get(task_group_id).cloned())
    }

    async fn set_build_state(
        &self,
        task_group_id: &TaskGroupId,
        state: BuildState,
    ) -> Result<Build> {
        let mut map = self.lock();
        let build = map
            .builds
            .get_mut(task_group_id)
            .ok_or_else(|| StoreError::BuildNotFound(task_group_id.clone()))?;
        if build.state != BuildState::Cancelled {
            build.state = state;
            build.updated_at = Utc::now();
        }
        Ok(build.clone())
    }

    async fn delete_build(&self, task_group_id: &TaskGroupId) -> Result<()> {
        self.lock().builds.remove(task_group_id);
        Ok(())
    }

    async fn builds_for_pull_request(
        &self,
        organization: &str,
        repository: &str,
        pull_number: PullNumber,
    ) -> Result<Vec<Build>> {
        Ok(self
            .lock()
            .builds
            .values()
            .filter(|b| {
                b.organization == organization
                    && b.repository == repository
                    && b.pull_number == Some(pull_number)
            })
            .cloned()
            .collect())
    }

    async fn upsert_check_mapping(&self, mapping: &CheckMapping) -> Result<()> {
        self.lock().mappings.insert(
            (mapping.task_group_id.clone(), mapping.task_id.clone()),
            mapping.clone(),
        );
        Ok(())
    }

    async fn check_mapping_by_task_id(&self, task_id: &TaskId) -> Result<Option<CheckMapping>> {
        Ok(self
            .lock()
            .mappings
            .values()
            .find(|m| &m.task_id == task_id)
            .cloned())
    }

    async fn check_mapping_by_run_ids(
        &self,
        check_suite_id: CheckSuiteId,
        check_run_id: CheckRunId,
    ) -> Result<Option<CheckMapping>> {
        Ok(self
            .lock()
            .mappings
            .values()
            .find(|m| m.check_suite_id == check_suite_id && m.check_run_id == check_run_id)
            .cloned())
    }

    async fn check_mapping_by_task_group_and_task(
        &self,
        task_group_id: &TaskGroupId,
        task_id: &TaskId,
    ) -> Result<Option<CheckMapping>> {
        Ok(self
            .lock()
            .mappings
            .get(&(task_group_id.clone(), task_id.clone()))
            .cloned())
    }
}
