//! # Credential Store
//!
//! In-memory device registry standing in for the platform's credential
//! service: access tokens, certificate fingerprints and gateway children.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use shared_types::{DeviceInfo, DeviceKind};
use tracing::info;
use uuid::Uuid;

/// One row of the static credential table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCredentialEntry {
    /// Device name, unique inside its tenant.
    pub name: String,
    /// Device type.
    #[serde(default = "default_device_type")]
    pub device_type: String,
    /// Owning tenant.
    pub tenant_id: Uuid,
    /// Assigned customer.
    #[serde(default)]
    pub customer_id: Option<Uuid>,
    /// Fixed id. Generated when absent.
    #[serde(default)]
    pub device_id: Option<Uuid>,
    /// MQTT username credential.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Hex SHA3-256 of the client certificate.
    #[serde(default)]
    pub certificate_fingerprint: Option<String>,
    /// Whether the device is a gateway.
    #[serde(default)]
    pub gateway: bool,
}

fn default_device_type() -> String {
    "default".to_string()
}

impl DeviceCredentialEntry {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            tenant_id: self.tenant_id,
            customer_id: self.customer_id,
            device_id: self.device_id.unwrap_or_else(Uuid::new_v4),
            device_name: self.name.clone(),
            device_type: self.device_type.clone(),
            kind: if self.gateway {
                DeviceKind::Gateway
            } else {
                DeviceKind::Standard
            },
        }
    }
}

/// Devices indexed by credential and by name.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    devices: DashMap<Uuid, DeviceInfo>,
    by_token: DashMap<String, Uuid>,
    by_fingerprint: DashMap<String, Uuid>,
    by_name: DashMap<(Uuid, String), DeviceInfo>,
}

impl InMemoryCredentialStore {
    /// Store loaded with `entries`.
    pub fn from_entries(entries: &[DeviceCredentialEntry]) -> Self {
        let store = Self::default();
        for entry in entries {
            store.insert(entry);
        }
        info!("[credentials] Loaded {} device credentials", store.devices.len());
        store
    }

    /// Adds one device and returns its identity.
    pub fn insert(&self, entry: &DeviceCredentialEntry) -> DeviceInfo {
        let device = entry.device_info();
        let id = device.device_id;
        if let Some(token) = &entry.access_token {
            self.by_token.insert(token.clone(), id);
        }
        if let Some(fingerprint) = &entry.certificate_fingerprint {
            self.by_fingerprint
                .insert(fingerprint.to_ascii_lowercase(), id);
        }
        self.by_name
            .insert((device.tenant_id, device.device_name.clone()), device.clone());
        self.devices.insert(id, device.clone());
        device
    }

    /// Device owning `token`.
    pub fn find_by_token(&self, token: &str) -> Option<DeviceInfo> {
        let id = *self.by_token.get(token)?;
        self.find_by_id(id)
    }

    /// Device owning the certificate with hex `fingerprint`.
    pub fn find_by_fingerprint(&self, fingerprint: &str) -> Option<DeviceInfo> {
        let id = *self.by_fingerprint.get(&fingerprint.to_ascii_lowercase())?;
        self.find_by_id(id)
    }

    /// Device with id `id`.
    pub fn find_by_id(&self, id: Uuid) -> Option<DeviceInfo> {
        self.devices.get(&id).map(|d| d.clone())
    }

    /// Child device `name` of `gateway`, created on first sight.
    ///
    /// Children inherit tenant and customer from the gateway. Two racing
    /// first lookups of the same name share one device.
    pub fn get_or_create_child(
        &self,
        gateway: &DeviceInfo,
        name: &str,
        device_type: &str,
    ) -> DeviceInfo {
        self.by_name
            .entry((gateway.tenant_id, name.to_string()))
            .or_insert_with(|| {
                let device = DeviceInfo {
                    tenant_id: gateway.tenant_id,
                    customer_id: gateway.customer_id,
                    device_id: Uuid::new_v4(),
                    device_name: name.to_string(),
                    device_type: device_type.to_string(),
                    kind: DeviceKind::Standard,
                };
                info!(
                    gateway = %gateway.device_name,
                    device = %name,
                    "[credentials] Created device behind gateway"
                );
                self.devices.insert(device.device_id, device.clone());
                device
            })
            .clone()
    }

    /// Moves a device to `customer_id`. Returns the updated device.
    pub fn assign_customer(&self, device_id: Uuid, customer_id: Option<Uuid>) -> Option<DeviceInfo> {
        let mut device = self.devices.get_mut(&device_id)?;
        device.customer_id = customer_id;
        let updated = device.clone();
        drop(device);
        self.by_name
            .insert((updated.tenant_id, updated.device_name.clone()), updated.clone());
        Some(updated)
    }

    /// Number of known devices.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// True when no device is known.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn entry(name: &str, token: &str) -> DeviceCredentialEntry {
        DeviceCredentialEntry {
            name: name.into(),
            device_type: "default".into(),
            tenant_id: Uuid::from_u128(1),
            customer_id: None,
            device_id: None,
            access_token: Some(token.into()),
            certificate_fingerprint: None,
            gateway: false,
        }
    }

    #[test]
    fn test_lookup_by_token_and_fingerprint() {
        let mut cert = entry("cam", "T2");
        cert.certificate_fingerprint = Some("ABCDEF".into());
        let store = InMemoryCredentialStore::from_entries(&[entry("thermo", "T1"), cert]);

        assert_eq!(store.find_by_token("T1").unwrap().device_name, "thermo");
        assert_eq!(store.find_by_fingerprint("abcdef").unwrap().device_name, "cam");
        assert!(store.find_by_token("nope").is_none());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_gateway_flag() {
        let mut gw = entry("gw", "G");
        gw.gateway = true;
        let store = InMemoryCredentialStore::from_entries(&[gw]);
        assert_eq!(store.find_by_token("G").unwrap().kind, DeviceKind::Gateway);
    }

    #[test]
    fn test_children_are_created_once() {
        let mut gw = entry("gw", "G");
        gw.gateway = true;
        gw.customer_id = Some(Uuid::from_u128(9));
        let store = Arc::new(InMemoryCredentialStore::from_entries(&[gw]));
        let gateway = store.find_by_token("G").unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let gateway = gateway.clone();
                std::thread::spawn(move || store.get_or_create_child(&gateway, "child-1", "sensor"))
            })
            .collect();
        let ids: Vec<Uuid> = handles
            .into_iter()
            .map(|h| h.join().unwrap().device_id)
            .collect();

        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        let child = store.find_by_id(ids[0]).unwrap();
        assert_eq!(child.customer_id, Some(Uuid::from_u128(9)));
        assert_eq!(child.device_type, "sensor");
        assert_eq!(child.kind, DeviceKind::Standard);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_assign_customer() {
        let store = InMemoryCredentialStore::from_entries(&[entry("thermo", "T1")]);
        let id = store.find_by_token("T1").unwrap().device_id;
        let customer = Uuid::from_u128(42);

        let updated = store.assign_customer(id, Some(customer)).unwrap();
        assert_eq!(updated.customer_id, Some(customer));
        assert_eq!(store.find_by_token("T1").unwrap().customer_id, Some(customer));
        assert!(store.assign_customer(Uuid::from_u128(99), None).is_none());
    }
}
