use actix::prelude::*;
use std::collections::HashMap;
use uuid::Uuid;

/// The three protocol endpoints every registered device gets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// `/{id}`, echoes the device id
    Identity,
    /// `/{id}/commands`, command read and acknowledge
    Commands,
    /// `/{id}/data`, telemetry ingestion
    Data,
}

/// Where a request path leads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    WellKnownCore,
    Device(Uuid, Endpoint),
}

const WELL_KNOWN_CORE: [&str; 2] = [".well-known", "core"];

/// Content format codes advertised in the link-format listing
const CT_TEXT: u16 = 0;
const CT_LINK_FORMAT: u16 = 40;
const CT_CBOR: u16 = 60;

/// Endpoint set of one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceResources {
    uuid: Uuid,
}

impl DeviceResources {
    pub fn new(uuid: Uuid) -> Self {
        Self { uuid }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Map the path segments following the device id onto an endpoint
    pub fn endpoint(&self, rest: &[&str]) -> Option<Endpoint> {
        match rest {
            [] => Some(Endpoint::Identity),
            ["commands"] => Some(Endpoint::Commands),
            ["data"] => Some(Endpoint::Data),
            _ => None,
        }
    }

    /// RFC 6690 link entries for this device
    pub fn links(&self) -> [String; 3] {
        let id = self.uuid;
        [
            format!("</{id}>;ct={CT_TEXT}"),
            format!("</{id}/commands>;ct={CT_CBOR}"),
            format!("</{id}/data>"),
        ]
    }
}

/// [`DeviceRegistry`] is the device-facing process's in-memory view of
/// which devices have live endpoints. Entries are only ever added, either
/// by the startup bulk load or by registration notifications; adding an
/// id twice is a no-op.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: HashMap<Uuid, DeviceResources>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&mut self, uuid: Uuid) -> bool {
        if self.devices.contains_key(&uuid) {
            log::trace!("Device {uuid} already registered");
            return false;
        }
        self.devices.insert(uuid, DeviceResources::new(uuid));
        log::info!("Registered endpoints for device {uuid}");
        true
    }

    fn resolve(&self, path: &str) -> Option<Route> {
        let segments = path
            .split('/')
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        if segments == WELL_KNOWN_CORE {
            return Some(Route::WellKnownCore);
        }

        let (id, rest) = segments.split_first()?;
        // only the lowercase hyphenated form that discovery advertises
        let uuid = Uuid::parse_str(id)
            .ok()
            .filter(|uuid| uuid.hyphenated().to_string() == *id)?;
        let resources = self.devices.get(&uuid)?;
        resources
            .endpoint(rest)
            .map(|endpoint| Route::Device(uuid, endpoint))
    }

    fn core_links(&self) -> String {
        let mut devices = self.devices.values().collect::<Vec<_>>();
        devices.sort_by_key(|d| d.uuid());

        std::iter::once(format!("</.well-known/core>;ct={CT_LINK_FORMAT}"))
            .chain(devices.iter().flat_map(|d| d.links()))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl Actor for DeviceRegistry {
    type Context = Context<Self>;
}

/// Add endpoints for a device. Resolves to `true` when the device was not
/// registered before.
#[derive(Message)]
#[rtype(result = "bool")]
pub struct AddDevice(pub Uuid);

impl Handler<AddDevice> for DeviceRegistry {
    type Result = bool;

    fn handle(&mut self, msg: AddDevice, _ctx: &mut Self::Context) -> Self::Result {
        self.add(msg.0)
    }
}

/// Look up the route for a request path such as `"{id}/commands"`
#[derive(Message)]
#[rtype(result = "ResolveRouteResponse")]
pub struct ResolveRoute(pub String);
type ResolveRouteResponse = Option<Route>;

impl Handler<ResolveRoute> for DeviceRegistry {
    type Result = ResolveRouteResponse;

    fn handle(&mut self, msg: ResolveRoute, _ctx: &mut Self::Context) -> Self::Result {
        self.resolve(&msg.0)
    }
}

/// Link-format listing served on `/.well-known/core`
#[derive(Message)]
#[rtype(result = "String")]
pub struct CoreLinks;

impl Handler<CoreLinks> for DeviceRegistry {
    type Result = String;

    fn handle(&mut self, _msg: CoreLinks, _ctx: &mut Self::Context) -> Self::Result {
        self.core_links()
    }
}

/// Ids of every registered device
#[derive(Message)]
#[rtype(result = "RegisteredDevicesResponse")]
pub struct RegisteredDevices;
type RegisteredDevicesResponse = Vec<Uuid>;

impl Handler<RegisteredDevices> for DeviceRegistry {
    type Result = RegisteredDevicesResponse;

    fn handle(&mut self, _msg: RegisteredDevices, _ctx: &mut Self::Context) -> Self::Result {
        let mut ids = self.devices.keys().copied().collect::<Vec<_>>();
        ids.sort();
        ids
    }
}
