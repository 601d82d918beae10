//! BlueZ D-Bus client
//!
//! Implements the collaborator traits over the system bus and exports the
//! `org.bluez.Agent1` and `org.bluez.Profile1` objects the daemon calls
//! back into.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use zbus::fdo::PropertiesProxy;
use zbus::names::InterfaceName;
use zbus::zvariant::{ObjectPath, OwnedFd, OwnedObjectPath, OwnedValue, Value};
use zbus::Connection;

use super::agent::{AgentError, PairingAgent};
use super::{AdapterControl, BluetoothDaemon, DeviceTrust, ProfileRegistration};
use crate::error::{AppError, Result};

const BLUEZ_SERVICE: &str = "org.bluez";
const BLUEZ_ROOT: &str = "/org/bluez";
const ADAPTER_INTERFACE: &str = "org.bluez.Adapter1";
const DEVICE_INTERFACE: &str = "org.bluez.Device1";
const PROFILE_MANAGER_INTERFACE: &str = "org.bluez.ProfileManager1";
const AGENT_MANAGER_INTERFACE: &str = "org.bluez.AgentManager1";

/// System bus connection scoped to one adapter
#[derive(Clone)]
pub struct Bluez {
    connection: Connection,
    adapter: String,
}

impl Bluez {
    /// Connect to the system bus
    pub async fn system(adapter: &str) -> Result<Self> {
        let connection = Connection::system().await?;
        Ok(Self {
            connection,
            adapter: adapter.to_string(),
        })
    }

    pub fn adapter(&self) -> &str {
        &self.adapter
    }

    /// e.g. `/org/bluez/hci0`
    pub fn adapter_path(&self) -> String {
        format!("{}/{}", BLUEZ_ROOT, self.adapter)
    }

    async fn set_property(
        &self,
        path: String,
        interface: &'static str,
        name: &str,
        value: Value<'_>,
    ) -> Result<()> {
        let proxy = PropertiesProxy::builder(&self.connection)
            .destination(BLUEZ_SERVICE)?
            .path(path)?
            .build()
            .await?;

        proxy
            .set(InterfaceName::from_static_str_unchecked(interface), name, &value)
            .await
            .map_err(|e| AppError::bluetooth(format!("set {}", name), e))
    }

    async fn set_adapter_property(&self, name: &str, value: Value<'_>) -> Result<()> {
        self.set_property(self.adapter_path(), ADAPTER_INTERFACE, name, value)
            .await
    }

    async fn manager(&self, interface: &'static str) -> Result<zbus::Proxy<'static>> {
        Ok(zbus::Proxy::new(&self.connection, BLUEZ_SERVICE, BLUEZ_ROOT, interface).await?)
    }
}

fn object_path(path: &str) -> Result<ObjectPath<'_>> {
    ObjectPath::try_from(path).map_err(|e| AppError::DBus(e.into()))
}

#[async_trait]
impl AdapterControl for Bluez {
    async fn bring_up(&self, name: &str, class: u32) -> Result<()> {
        info!("Configuring adapter {} as '{}' (class 0x{:06x})", self.adapter, name, class);

        self.set_adapter_property("Powered", Value::from(true)).await?;
        self.set_adapter_property("Alias", Value::from(name)).await?;

        // Class of Device is not writable over D-Bus
        let output = tokio::process::Command::new("hciconfig")
            .arg(&self.adapter)
            .arg("class")
            .arg(format!("0x{:06x}", class))
            .output()
            .await
            .map_err(|e| AppError::bluetooth("hciconfig class", e))?;
        if !output.status.success() {
            return Err(AppError::bluetooth(
                "hciconfig class",
                String::from_utf8_lossy(&output.stderr).trim(),
            ));
        }

        // Windows are controlled by PairingControls, not by BlueZ timeouts
        self.set_adapter_property("DiscoverableTimeout", Value::from(0u32))
            .await?;
        self.set_adapter_property("PairableTimeout", Value::from(0u32))
            .await?;
        Ok(())
    }

    async fn set_discoverable(&self, discoverable: bool) -> Result<()> {
        self.set_adapter_property("Discoverable", Value::from(discoverable))
            .await
    }

    async fn set_pairable(&self, pairable: bool) -> Result<()> {
        self.set_adapter_property("Pairable", Value::from(pairable))
            .await
    }
}

#[async_trait]
impl BluetoothDaemon for Bluez {
    async fn register_profile(&self, profile: &ProfileRegistration) -> Result<()> {
        self.connection
            .object_server()
            .at(profile.path.as_str(), ProfileObject)
            .await?;

        let mut options: HashMap<&str, Value<'_>> = HashMap::new();
        options.insert("ServiceRecord", Value::from(profile.service_record.as_str()));
        options.insert("Role", Value::from(profile.role.as_str()));
        options.insert(
            "RequireAuthentication",
            Value::from(profile.require_authentication),
        );
        options.insert(
            "RequireAuthorization",
            Value::from(profile.require_authorization),
        );

        let path = object_path(&profile.path)?;
        let manager = self.manager(PROFILE_MANAGER_INTERFACE).await?;
        let reply: zbus::Result<()> = manager
            .call("RegisterProfile", &(path, profile.uuid.as_str(), options))
            .await;
        reply.map_err(|e| AppError::bluetooth("RegisterProfile", e))?;

        info!("Registered profile {} at {}", profile.uuid, profile.path);
        Ok(())
    }

    async fn unregister_profile(&self, path: &str) -> Result<()> {
        let manager = self.manager(PROFILE_MANAGER_INTERFACE).await?;
        let result: zbus::Result<()> = manager
            .call("UnregisterProfile", &(object_path(path)?,))
            .await;
        self.connection
            .object_server()
            .remove::<ProfileObject, _>(path)
            .await?;
        result.map_err(|e| AppError::bluetooth("UnregisterProfile", e))
    }

    async fn register_agent(
        &self,
        path: &str,
        capability: &str,
        agent: Arc<PairingAgent>,
    ) -> Result<()> {
        self.connection
            .object_server()
            .at(path, AgentObject { agent })
            .await?;

        let agent_path = object_path(path)?;
        let manager = self.manager(AGENT_MANAGER_INTERFACE).await?;
        let reply: zbus::Result<()> = manager
            .call("RegisterAgent", &(agent_path.clone(), capability))
            .await;
        reply.map_err(|e| AppError::bluetooth("RegisterAgent", e))?;
        let reply: zbus::Result<()> = manager
            .call("RequestDefaultAgent", &(agent_path,))
            .await;
        reply.map_err(|e| AppError::bluetooth("RequestDefaultAgent", e))?;

        info!("Registered {} agent at {}", capability, path);
        Ok(())
    }

    async fn unregister_agent(&self, path: &str) -> Result<()> {
        let manager = self.manager(AGENT_MANAGER_INTERFACE).await?;
        let result: zbus::Result<()> = manager
            .call("UnregisterAgent", &(object_path(path)?,))
            .await;
        self.connection
            .object_server()
            .remove::<AgentObject, _>(path)
            .await?;
        result.map_err(|e| AppError::bluetooth("UnregisterAgent", e))
    }
}

#[async_trait]
impl DeviceTrust for Bluez {
    async fn set_trusted(&self, device: &str, trusted: bool) -> Result<()> {
        self.set_property(
            device.to_string(),
            DEVICE_INTERFACE,
            "Trusted",
            Value::from(trusted),
        )
        .await
    }
}

/// `org.bluez.Agent1` object forwarding to a [`PairingAgent`]
struct AgentObject {
    agent: Arc<PairingAgent>,
}

#[zbus::interface(name = "org.bluez.Agent1")]
impl AgentObject {
    fn release(&self) {
        self.agent.release();
    }

    fn request_pin_code(&self, device: OwnedObjectPath) -> std::result::Result<String, AgentError> {
        self.agent.request_pin_code(device.as_str())
    }

    fn display_pin_code(&self, device: OwnedObjectPath, pincode: String) {
        self.agent.display_pin_code(device.as_str(), &pincode);
    }

    fn request_passkey(&self, device: OwnedObjectPath) -> std::result::Result<u32, AgentError> {
        self.agent.request_passkey(device.as_str())
    }

    fn display_passkey(&self, device: OwnedObjectPath, passkey: u32, entered: u16) {
        self.agent.display_passkey(device.as_str(), passkey, entered);
    }

    async fn request_confirmation(
        &self,
        device: OwnedObjectPath,
        passkey: u32,
    ) -> std::result::Result<(), AgentError> {
        self.agent.request_confirmation(device.as_str(), passkey).await
    }

    fn request_authorization(&self, device: OwnedObjectPath) -> std::result::Result<(), AgentError> {
        self.agent.request_authorization(device.as_str())
    }

    fn authorize_service(
        &self,
        device: OwnedObjectPath,
        uuid: String,
    ) -> std::result::Result<(), AgentError> {
        self.agent.authorize_service(device.as_str(), &uuid)
    }

    fn cancel(&self) {
        self.agent.cancel();
    }
}

/// `org.bluez.Profile1` object
///
/// The session binds its own PSM sockets, so connections BlueZ hands over
/// here are closed right away.
struct ProfileObject;

#[zbus::interface(name = "org.bluez.Profile1")]
impl ProfileObject {
    fn release(&self) {
        info!("Profile released by the daemon");
    }

    fn new_connection(
        &self,
        device: OwnedObjectPath,
        fd: OwnedFd,
        properties: HashMap<String, OwnedValue>,
    ) {
        debug!(
            "Profile NewConnection from {} ({} properties), closing",
            device.as_str(),
            properties.len()
        );
        drop(fd);
    }

    fn request_disconnection(&self, device: OwnedObjectPath) {
        warn!("Profile RequestDisconnection for {}", device.as_str());
    }
}
