//! The `sensed` crate is the device-facing half of the SENSE gateway. It
//! serves constrained devices over CoAP/UDP and never talks to HTTP
//! clients; everything it knows about devices comes from the shared store
//! and from registration notifications.
//!
//! The crate defines a top-level [`Gateway`] which owns:
//! 1. The [`DeviceRegistry`], an [`actix::Actor`] mapping each device id to
//!    its three endpoints: `/{id}` (identity echo), `/{id}/commands`
//!    (command read with GET, acknowledge with DELETE) and `/{id}/data`
//!    (telemetry POST). The registry is filled once from storage at start
//!    and then kept current by a [`sense_broker::Subscription`] on the
//!    registration channel.
//! 2. The [`CoapServer`], which parses datagrams with `coap-lite`, routes
//!    them through the registry and answers with piggybacked responses.
//! 3. The ingestion pipeline in [`ingest`], which validates CBOR telemetry
//!    (auth tail, timestamp, sensor, value) before persisting it.

pub mod config;
mod exchange;
pub mod gateway;
pub mod ingest;
pub mod registry;
pub mod resource;
pub mod server;

pub use gateway::Gateway;
pub use registry::{DeviceRegistry, DeviceResources, Endpoint, Route};
pub use server::CoapServer;

use actix::MailboxError;
use thiserror::Error;

use sense_broker::ChannelError;
use sensedb::DatabaseError;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("I/O Error")]
    Io(#[from] std::io::Error),
    #[error("Database Error")]
    Database(#[from] DatabaseError),
    #[error("Channel Error")]
    Channel(#[from] ChannelError),
    #[error("Actix mailbox Error")]
    MailError(#[from] MailboxError),
    #[error("CoAP Msg Error")]
    CoAPMsgError(#[from] coap_lite::error::MessageError),
}
