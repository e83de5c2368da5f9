use actix::Addr;
use coap_lite::{ContentFormat, RequestType, ResponseType};
use uuid::Uuid;

use sense_proto::Command;
use sensedb::{CommandQueue, DatabaseError, Store};

use crate::{
    ingest::{self, ACCEPTED},
    registry::{CoreLinks, DeviceRegistry, Endpoint, ResolveRoute, Route},
};

/// Outcome of one device request, before it is framed into a CoAP message
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: ResponseType,
    pub payload: Vec<u8>,
    pub content_format: Option<ContentFormat>,
}

impl Reply {
    pub fn empty(status: ResponseType) -> Self {
        Self {
            status,
            payload: Vec::new(),
            content_format: None,
        }
    }

    pub fn text(status: ResponseType, text: &str) -> Self {
        Self {
            status,
            payload: text.as_bytes().to_vec(),
            content_format: Some(ContentFormat::TextPlain),
        }
    }

    fn cbor(payload: Vec<u8>) -> Self {
        Self {
            status: ResponseType::Content,
            payload,
            content_format: Some(ContentFormat::ApplicationCBOR),
        }
    }

    fn backend(e: &DatabaseError) -> Self {
        log::error!("Storage failure: {e}");
        if e.is_unavailable() {
            Self::empty(ResponseType::ServiceUnavailable)
        } else {
            Self::empty(ResponseType::InternalServerError)
        }
    }
}

/// Route a request and run the matching resource handler
pub async fn dispatch(
    registry: &Addr<DeviceRegistry>,
    store: &Store,
    method: RequestType,
    path: &str,
    payload: &[u8],
) -> Reply {
    let route = match registry.send(ResolveRoute(path.to_string())).await {
        Ok(route) => route,
        Err(e) => {
            log::error!("Registry unreachable: {e}");
            return Reply::empty(ResponseType::ServiceUnavailable);
        }
    };

    match (route, method) {
        (None, _) => Reply::empty(ResponseType::NotFound),
        (Some(Route::WellKnownCore), RequestType::Get) => well_known_core(registry).await,
        (Some(Route::Device(id, Endpoint::Identity)), RequestType::Get) => identity(id),
        (Some(Route::Device(id, Endpoint::Commands)), RequestType::Get) => {
            read_command(store, id).await
        }
        (Some(Route::Device(id, Endpoint::Commands)), RequestType::Delete) => {
            acknowledge_command(store, id).await
        }
        (Some(Route::Device(id, Endpoint::Data)), RequestType::Post) => {
            ingest_report(store, id, payload).await
        }
        (Some(_), _) => Reply::empty(ResponseType::MethodNotAllowed),
    }
}

async fn well_known_core(registry: &Addr<DeviceRegistry>) -> Reply {
    match registry.send(CoreLinks).await {
        Ok(links) => Reply {
            status: ResponseType::Content,
            payload: links.into_bytes(),
            content_format: Some(ContentFormat::ApplicationLinkFormat),
        },
        Err(e) => {
            log::error!("Registry unreachable: {e}");
            Reply::empty(ResponseType::ServiceUnavailable)
        }
    }
}

fn identity(device: Uuid) -> Reply {
    Reply::text(ResponseType::Content, &device.to_string())
}

/// Head of the device's queue, or the "none available" sentinel. The
/// queue is left untouched.
pub async fn read_command(queue: &dyn CommandQueue, device: Uuid) -> Reply {
    let head = match queue.peek(device).await {
        Ok(pending) => pending.into_iter().next(),
        Err(e) => return Reply::backend(&e),
    };

    let command = head.unwrap_or_else(Command::none_available);
    log::debug!("Device {device} reads command {command}");
    match command.to_cbor() {
        Ok(bytes) => Reply::cbor(bytes),
        Err(e) => {
            log::error!("Unable to encode command for {device}: {e}");
            Reply::empty(ResponseType::InternalServerError)
        }
    }
}

/// Pop the head of the device's queue. Succeeds on an empty queue.
pub async fn acknowledge_command(queue: &dyn CommandQueue, device: Uuid) -> Reply {
    match queue.dequeue(device).await {
        Ok(Some(command)) => {
            log::info!("Device {device} acknowledged {command}");
            Reply::empty(ResponseType::Deleted)
        }
        Ok(None) => {
            log::debug!("Device {device} acknowledged with an empty queue");
            Reply::empty(ResponseType::Deleted)
        }
        Err(e) => Reply::backend(&e),
    }
}

async fn ingest_report(store: &Store, device: Uuid, payload: &[u8]) -> Reply {
    match ingest::ingest(store, device, payload).await {
        Ok(point) => {
            log::info!(
                "Accepted data point {} from {device} ({})",
                point.uuid,
                point.sensor
            );
            Reply::text(ResponseType::Created, ACCEPTED)
        }
        Err(e) => {
            log::info!("Rejected report from {device}: {e}");
            Reply::text(e.response_type(), &e.to_string())
        }
    }
}
