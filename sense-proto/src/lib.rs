//! Wire-level types shared by both halves of the SENSE gateway.
//!
//! Two payload families cross the device boundary:
//!
//! 1. [`Command`] objects, queued by the HTTP management process and
//!    delivered to devices over CoAP as CBOR maps with the short keys
//!    `ty`, `ta`, `i` and `b`. When nothing is pending a device receives
//!    the [`Command::none_available`] sentinel `{ty: 0, ta: 0}` instead
//!    of an empty body, so "nothing queued" can be told apart from a
//!    transport failure.
//! 2. Telemetry [`Report`]s posted by devices, CBOR maps keyed by single
//!    characters (see [`report::keys`]). This crate only decodes them;
//!    validation and persistence happen in the gateway's ingestion
//!    pipeline.
//!
//! The integer codes carried by commands map onto closed sets of
//! meanings ([`CommandType`], [`CommandSensor`], [`CommandRail`]) and each
//! of those has a human readable label table used by logs and the HTTP
//! API.

pub mod command;
pub mod report;

pub use command::{Command, CommandRail, CommandSensor, CommandType};
pub use report::Report;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtoError {
    #[error("Unknown command type {0}")]
    UnknownCommandType(u8),
    #[error("CBOR decode error: {0}")]
    Decode(String),
    #[error("CBOR encode error: {0}")]
    Encode(String),
    #[error("Payload is not a CBOR map")]
    NotAMap,
}
