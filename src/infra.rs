use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use dubss::workflows::tramites::{
    InMemoryCaseStore, InMemoryDocumentStorage, InMemoryNotificationPublisher,
    TramiteWorkflowService,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type InMemoryWorkflowService = TramiteWorkflowService<
    InMemoryCaseStore,
    InMemoryNotificationPublisher,
    InMemoryDocumentStorage,
>;

/// Wire the workflow service against the in-memory collaborators. Returns the
/// store and notifier handles too so callers can seed and inspect them.
pub(crate) fn build_workflow_service() -> (
    Arc<InMemoryWorkflowService>,
    Arc<InMemoryCaseStore>,
    Arc<InMemoryNotificationPublisher>,
) {
    let store = Arc::new(InMemoryCaseStore::default());
    let notifier = Arc::new(InMemoryNotificationPublisher::default());
    let storage = Arc::new(InMemoryDocumentStorage::default());
    let service = Arc::new(TramiteWorkflowService::new(
        store.clone(),
        notifier.clone(),
        storage,
    ));
    (service, store, notifier)
}
