//! Collaborators shared by every sync component

use crate::adapters::database::SyncStore;
use crate::adapters::notify::{publish_best_effort, NotificationSink};
use crate::adapters::registry::{RegistryClient, RegistryResponse};
use crate::core::directory::HospitalDirectory;
use crate::core::pipeline::guard::SubmissionGuard;
use crate::core::pipeline::payload::with_resource_id;
use crate::domain::errors::BridgeError;
use crate::domain::events::Notification;
use crate::domain::ids::HospitalId;
use crate::domain::Result;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Handles to the store, the registry and the notification sink
#[derive(Clone)]
pub struct SyncContext {
    pub store: Arc<dyn SyncStore>,
    pub registry: Arc<dyn RegistryClient>,
    pub sink: Arc<dyn NotificationSink>,
    pub directory: Arc<HospitalDirectory>,
    pub guard: SubmissionGuard,
    /// Upper bound of a single registry write, retries included
    pub item_timeout: Duration,
}

impl SyncContext {
    pub fn new(
        store: Arc<dyn SyncStore>,
        registry: Arc<dyn RegistryClient>,
        sink: Arc<dyn NotificationSink>,
        directory: Arc<HospitalDirectory>,
        item_timeout: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            sink,
            directory,
            guard: SubmissionGuard::new(),
            item_timeout,
        }
    }

    /// Creates the resource, or overwrites it when `external_id` is known
    pub async fn write_resource(
        &self,
        hospital: &HospitalId,
        resource_type: &str,
        external_id: Option<&str>,
        payload: &Value,
    ) -> Result<RegistryResponse> {
        let call = async {
            match external_id {
                Some(id) => {
                    let payload = with_resource_id(payload.clone(), id);
                    self.registry
                        .update(hospital, resource_type, id, &payload)
                        .await
                }
                None => self.registry.create(hospital, resource_type, payload).await,
            }
        };

        tokio::time::timeout(self.item_timeout, call)
            .await
            .map_err(|_| {
                BridgeError::Timeout(format!(
                    "{resource_type} submission exceeded {}s",
                    self.item_timeout.as_secs()
                ))
            })?
    }

    pub async fn notify(&self, notification: Notification) {
        publish_best_effort(self.sink.as_ref(), notification).await;
    }
}
