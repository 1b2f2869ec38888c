//! Control plane facade
//!
//! Wires the pipeline, the dispatcher and the request tracker together.
//! Every mutating operation runs inside [`RequestTracker::track`] and returns
//! its request id next to the result.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::config::Config;
use crate::control::{ControlOutcome, Dispatcher};
use crate::driver::DriverClient;
use crate::error::Result;
use crate::resource::custom_image::CustomImageDetails;
use crate::resource::mcis::{McisInfo, McisRegisterReq, VmRecord};
use crate::resource::{Pipeline, Provision, ProvisionMode, ResourceKind, ResourceRecord};
use crate::store::{FileStore, KeyValueStore};
use crate::tracker::{RequestRecord, RequestTracker, Tracked};

#[derive(Clone)]
pub struct ControlPlane {
    pipeline: Pipeline,
    dispatcher: Dispatcher,
    tracker: RequestTracker,
}

impl ControlPlane {
    pub fn new(store: Arc<dyn KeyValueStore>, driver: DriverClient) -> Self {
        let pipeline = Pipeline::new(store, driver);
        Self {
            dispatcher: Dispatcher::new(pipeline.clone()),
            pipeline,
            tracker: RequestTracker::new(),
        }
    }

    /// File-backed store and the configured driver transport
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = FileStore::open(&config.store_path)?;
        let driver = DriverClient::from_config(config)?;
        Ok(Self::new(Arc::new(store), driver))
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn tracker(&self) -> &RequestTracker {
        &self.tracker
    }

    /// Create or register one resource of any kind.
    pub async fn provision<R: Provision>(
        &self,
        ns: &str,
        req: R,
        mode: ProvisionMode,
    ) -> Tracked<ResourceRecord<R::Details>> {
        let request = json!({
            "operation": "provision",
            "namespace": ns,
            "kind": R::KIND,
            "id": req.id(),
            "mode": mode,
        });
        self.tracker
            .track(request, self.pipeline.provision(ns, req, mode))
            .await
    }

    pub async fn register_mcis(&self, ns: &str, req: McisRegisterReq) -> Tracked<McisInfo> {
        let request = json!({
            "operation": "registerMcis",
            "namespace": ns,
            "id": req.name,
            "vms": req.vms.iter().map(|v| v.name.as_str()).collect::<Vec<_>>(),
        });
        self.tracker
            .track(request, self.pipeline.register_mcis(ns, req))
            .await
    }

    pub async fn snapshot(
        &self,
        ns: &str,
        mcis_id: &str,
        vm_id: &str,
        name: &str,
        description: &str,
    ) -> Tracked<ResourceRecord<CustomImageDetails>> {
        let request = json!({
            "operation": "snapshot",
            "namespace": ns,
            "mcisId": mcis_id,
            "vmId": vm_id,
            "name": name,
        });
        self.tracker
            .track(
                request,
                self.pipeline.snapshot_vm(ns, mcis_id, vm_id, name, description),
            )
            .await
    }

    /// Lifecycle control on one VM or on a whole MCIS
    pub async fn control(
        &self,
        ns: &str,
        mcis_id: &str,
        vm_id: Option<&str>,
        action: &str,
        force: bool,
    ) -> Tracked<ControlOutcome> {
        let request = json!({
            "operation": "control",
            "namespace": ns,
            "mcisId": mcis_id,
            "vmId": vm_id,
            "action": action,
            "force": force,
        });
        self.tracker
            .track(
                request,
                self.dispatcher.dispatch(ns, mcis_id, vm_id, action, force),
            )
            .await
    }

    pub fn get_resource(&self, ns: &str, kind: ResourceKind, id: &str) -> Result<Value> {
        self.pipeline.get_raw(ns, kind, id)
    }

    pub fn list_resources(&self, ns: &str, kind: ResourceKind) -> Result<Vec<ResourceRecord<Value>>> {
        self.pipeline.list(ns, kind)
    }

    pub fn get_mcis(&self, ns: &str, mcis_id: &str) -> Result<McisInfo> {
        self.pipeline.get_mcis(ns, mcis_id)
    }

    pub fn get_vm(&self, ns: &str, mcis_id: &str, vm_id: &str) -> Result<VmRecord> {
        self.pipeline.get_vm(ns, mcis_id, vm_id)
    }

    pub fn get_request(&self, id: &str) -> Option<RequestRecord> {
        self.tracker.get(id)
    }

    pub fn list_requests(&self) -> Vec<RequestRecord> {
        self.tracker.list()
    }
}
