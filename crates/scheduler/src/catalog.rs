use std::collections::BTreeMap;
use std::sync::Arc;

use action_flow::{Flow, FlowDocument};
use parking_lot::RwLock;
use tracing::info;

use skuflow_core_types::FlowId;

use crate::error::SchedulerError;
use crate::runtime::SchedulerRuntime;

/// Authored flows, addressable by id or name.
///
/// Updates are full-document replacements. A flow referenced by a job that
/// has not finished can be neither replaced nor deleted.
pub struct FlowCatalog {
    flows: RwLock<BTreeMap<FlowId, Flow>>,
    runtime: Arc<SchedulerRuntime>,
}

impl FlowCatalog {
    pub fn new(runtime: Arc<SchedulerRuntime>) -> Self {
        Self {
            flows: RwLock::new(BTreeMap::new()),
            runtime,
        }
    }

    pub fn create(&self, document: FlowDocument) -> Result<Flow, SchedulerError> {
        let mut flow = Flow::from_document(document)?;
        if flow.id().is_empty() {
            flow = flow.with_id(FlowId::new());
        }

        let mut flows = self.flows.write();
        if flows.contains_key(flow.id()) {
            return Err(SchedulerError::DuplicateFlow(flow.id().to_string()));
        }
        if flows.values().any(|existing| existing.name() == flow.name()) {
            return Err(SchedulerError::DuplicateFlow(flow.name().to_string()));
        }
        flows.insert(flow.id().clone(), flow.clone());
        info!(flow_id = %flow.id(), name = %flow.name(), "flow created");
        Ok(flow)
    }

    pub fn get(&self, id: &FlowId) -> Result<Flow, SchedulerError> {
        self.flows
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| SchedulerError::FlowNotFound(id.to_string()))
    }

    pub fn get_by_name(&self, name: &str) -> Result<Flow, SchedulerError> {
        self.flows
            .read()
            .values()
            .find(|flow| flow.name() == name)
            .cloned()
            .ok_or_else(|| SchedulerError::FlowNotFound(name.to_string()))
    }

    /// All flows ordered by name.
    pub fn list(&self) -> Vec<Flow> {
        let mut flows: Vec<Flow> = self.flows.read().values().cloned().collect();
        flows.sort_by(|a, b| a.name().cmp(b.name()));
        flows
    }

    /// Replace the whole definition of `id`; the document's own id is ignored.
    pub fn replace(&self, id: &FlowId, document: FlowDocument) -> Result<Flow, SchedulerError> {
        let flow = Flow::from_document(document)?.with_id(id.clone());

        let mut flows = self.flows.write();
        if !flows.contains_key(id) {
            return Err(SchedulerError::FlowNotFound(id.to_string()));
        }
        if self.runtime.references_active(id) {
            return Err(SchedulerError::FlowInUse(id.clone()));
        }
        if flows
            .values()
            .any(|existing| existing.id() != id && existing.name() == flow.name())
        {
            return Err(SchedulerError::DuplicateFlow(flow.name().to_string()));
        }
        flows.insert(id.clone(), flow.clone());
        info!(flow_id = %id, name = %flow.name(), "flow replaced");
        Ok(flow)
    }

    pub fn delete(&self, id: &FlowId) -> Result<Flow, SchedulerError> {
        let mut flows = self.flows.write();
        if !flows.contains_key(id) {
            return Err(SchedulerError::FlowNotFound(id.to_string()));
        }
        if self.runtime.references_active(id) {
            return Err(SchedulerError::FlowInUse(id.clone()));
        }
        let removed = flows
            .remove(id)
            .ok_or_else(|| SchedulerError::FlowNotFound(id.to_string()))?;
        info!(flow_id = %id, "flow deleted");
        Ok(removed)
    }
}
