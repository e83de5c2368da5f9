use actix::{Actor, Addr};
use std::{future::Future, net::SocketAddr, sync::Arc};
use uuid::Uuid;

use sense_broker::{Channel, RegistrationChannel, Subscription};
use sensedb::Store;

use crate::{
    registry::{AddDevice, DeviceRegistry},
    server::CoapServer,
    GatewayError,
};

/// The device-facing process: registry, registration listener and CoAP
/// server, wired together in startup order.
pub struct Gateway {
    registry: Addr<DeviceRegistry>,
    subscription: Subscription,
    server: CoapServer,
}

impl Gateway {
    /// Start the registry, subscribe to registration notifications, load
    /// every known device from storage and bind the CoAP socket, in that
    /// order. Subscribing before the bulk load means a device created in
    /// between is seen by at least one of the two paths.
    pub async fn start(
        addr: SocketAddr,
        store: Store,
        channel: Arc<dyn RegistrationChannel>,
    ) -> Result<Self, GatewayError> {
        let registry = DeviceRegistry::new().start();

        let listener = registry.clone();
        let subscription =
            Subscription::spawn(channel, Channel::DeviceRegistration, move |message| {
                on_registration(&listener, &message)
            })
            .await?;

        let loaded = load_devices(&store, &registry).await?;
        log::info!("Loaded {loaded} devices from storage");

        let server = CoapServer::bind(addr, registry.clone(), store).await?;

        Ok(Self {
            registry,
            subscription,
            server,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, GatewayError> {
        self.server.local_addr()
    }

    pub fn registry(&self) -> Addr<DeviceRegistry> {
        self.registry.clone()
    }

    /// Serve devices until `shutdown` resolves, then cancel the
    /// registration listener and wait for it to finish
    pub async fn serve_until<F>(self, shutdown: F) -> Result<(), GatewayError>
    where
        F: Future<Output = ()>,
    {
        let res = self.server.run(shutdown).await;
        self.subscription.cancel().await;
        res
    }
}

fn on_registration(registry: &Addr<DeviceRegistry>, message: &str) {
    match Uuid::parse_str(message.trim()) {
        Ok(uuid) => {
            log::debug!("Registration notification for {uuid}");
            registry.do_send(AddDevice(uuid));
        }
        Err(e) => {
            log::warn!("Ignoring registration notification {message:?}: {e}");
        }
    }
}

/// Register every device in storage. Returns how many were newly added.
pub async fn load_devices(
    store: &Store,
    registry: &Addr<DeviceRegistry>,
) -> Result<usize, GatewayError> {
    let mut added = 0;
    for device in store.list_devices().await? {
        if registry.send(AddDevice(device.uuid)).await? {
            added += 1;
        }
    }
    Ok(added)
}
