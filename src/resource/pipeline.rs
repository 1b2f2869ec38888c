//! Generic create/register flow shared by every resource kind.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{
    check_namespace, Provision, ProvisionMode, ResourceKind, ResourceRecord,
    LABEL_REGISTERED_BY_ID, LABEL_REGISTERED_BY_NAME,
};
use crate::driver::DriverClient;
use crate::error::{Error, Result};
use crate::store::{self, keys, KeyLocks, KeyValueStore};

/// Provisioning pipeline
#[derive(Clone)]
pub struct Pipeline {
    store: Arc<dyn KeyValueStore>,
    driver: DriverClient,
    locks: KeyLocks,
}

impl Pipeline {
    pub fn new(store: Arc<dyn KeyValueStore>, driver: DriverClient) -> Self {
        Self {
            store,
            driver,
            locks: KeyLocks::new(),
        }
    }

    pub fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    pub fn driver(&self) -> &DriverClient {
        &self.driver
    }

    pub fn locks(&self) -> &KeyLocks {
        &self.locks
    }

    /// Create or register one resource and persist its record.
    ///
    /// Nothing is written unless the driver call succeeds. The per-key lock
    /// is held from the uniqueness check until the record is stored, so two
    /// identical concurrent requests cannot both reach the driver.
    pub async fn provision<R: Provision>(
        &self,
        ns: &str,
        mut req: R,
        mode: ProvisionMode,
    ) -> Result<ResourceRecord<R::Details>> {
        check_namespace(ns)?;
        req.validate(mode)?;

        let kind = R::KIND;
        let id = req.id().to_string();
        let key = keys::resource_key(ns, kind, &id);

        let _guard = self.locks.acquire(&key).await;

        if self.store.get(&key)?.is_some() {
            return Err(Error::Conflict {
                namespace: ns.to_string(),
                kind: kind.to_string(),
                id,
            });
        }

        req.resolve(ns, mode, self.store.as_ref())?;

        tracing::debug!("provision {} {}/{} ({:?})", kind, ns, id, mode);
        let outcome = req.invoke(ns, mode, &self.driver).await?;

        let system_label = match mode {
            ProvisionMode::Create => String::new(),
            ProvisionMode::Register if req.csp_resource_id().is_empty() => {
                LABEL_REGISTERED_BY_NAME.to_string()
            }
            ProvisionMode::Register => LABEL_REGISTERED_BY_ID.to_string(),
        };

        let record = ResourceRecord {
            id: id.clone(),
            name: id.clone(),
            connection_name: req.connection_name().to_string(),
            csp_resource_id: outcome.iid.system_id,
            csp_resource_name: outcome.iid.name_id,
            description: req.description().to_string(),
            details: outcome.details,
            key_value_list: outcome.key_value_list,
            associated_object_list: Vec::new(),
            is_auto_generated: false,
            system_label,
        };

        if let Err(e) = self.persist(&key, &record) {
            // The remote resource exists but has no record. Not compensated.
            tracing::error!(
                "{} {}/{} was {} remotely (csp id '{}') but could not be stored: {}",
                kind,
                ns,
                id,
                if mode == ProvisionMode::Create { "created" } else { "registered" },
                record.csp_resource_id,
                e
            );
            return Err(e);
        }

        tracing::info!("{} {}/{} stored", kind, ns, id);
        Ok(record)
    }

    /// Write a record and read it back.
    ///
    /// A failed or mismatching read-back is logged only; the write stands.
    pub fn persist<T: Serialize>(&self, key: &str, record: &T) -> Result<()> {
        let written = store::put_json(self.store.as_ref(), key, record)?;

        match self.store.get(key) {
            Ok(Some(read)) if read == written => {}
            Ok(Some(_)) => tracing::warn!("read-back of {} differs from written value", key),
            Ok(None) => tracing::warn!("read-back of {} found nothing", key),
            Err(e) => tracing::warn!("read-back of {} failed: {}", key, e),
        }
        Ok(())
    }

    pub fn get<D: DeserializeOwned>(
        &self,
        ns: &str,
        kind: ResourceKind,
        id: &str,
    ) -> Result<ResourceRecord<D>> {
        check_namespace(ns)?;
        store::get_json(self.store.as_ref(), &keys::resource_key(ns, kind, id))?
            .ok_or_else(|| Error::NotFound(format!("{} '{}' in namespace '{}'", kind, id, ns)))
    }

    pub fn list<D: DeserializeOwned>(&self, ns: &str, kind: ResourceKind) -> Result<Vec<ResourceRecord<D>>> {
        check_namespace(ns)?;
        store::list_json(self.store.as_ref(), &keys::resource_prefix(ns, kind))
    }

    /// Raw JSON of one record, whatever its kind
    pub fn get_raw(&self, ns: &str, kind: ResourceKind, id: &str) -> Result<serde_json::Value> {
        self.get::<serde_json::Value>(ns, kind, id)
            .and_then(|record| serde_json::to_value(record).map_err(Error::persistence))
    }

    /// Append `object` to a record's `associatedObjectList` (no duplicates).
    pub async fn add_associated_object(
        &self,
        ns: &str,
        kind: ResourceKind,
        id: &str,
        object: &str,
    ) -> Result<()> {
        let key = keys::resource_key(ns, kind, id);
        let _guard = self.locks.acquire(&key).await;

        let mut record: ResourceRecord<serde_json::Value> = store::get_json(self.store.as_ref(), &key)?
            .ok_or_else(|| Error::DependencyNotFound {
                namespace: ns.to_string(),
                kind: kind.to_string(),
                id: id.to_string(),
            })?;

        if !record.associated_object_list.iter().any(|o| o == object) {
            record.associated_object_list.push(object.to_string());
            self.persist(&key, &record)?;
        }
        Ok(())
    }
}

/// Load a dependency record or fail with `DependencyNotFound`
pub(crate) fn load_dependency<D: DeserializeOwned>(
    store: &dyn KeyValueStore,
    ns: &str,
    kind: ResourceKind,
    id: &str,
) -> Result<ResourceRecord<D>> {
    store::get_json(store, &keys::resource_key(ns, kind, id))?.ok_or_else(|| {
        Error::DependencyNotFound {
            namespace: ns.to_string(),
            kind: kind.to_string(),
            id: id.to_string(),
        }
    })
}
