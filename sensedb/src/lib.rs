//! The `sensedb` crate is the backing store shared by the two SENSE
//! gateway processes. Both open the same SQLite file; it is the only state
//! they have in common besides the registration channel.
//!
//! All access goes through [`db::DatabaseHandler`], an [`actix::Actor`]
//! running on a sync arbiter thread, wrapped by the cloneable [`Store`]
//! handle. The store is responsible for:
//!    1. Device records: create (rejecting duplicate IMEIs), fetch by uuid
//!       or IMEI, and list. The device-facing process lists all devices at
//!       start to rebuild its endpoint registry.
//!    2. Telemetry data points: create, list per device (newest first) and
//!       delete.
//!    3. The per-device command queue, exposed through the [`CommandQueue`]
//!       trait: append at the tail, peek the whole queue, and atomically pop
//!       the head.

mod db;
mod models;
mod schema;
mod store;

pub use db::{
    CreateDataPoint, DatabaseError, DatabaseHandler, DeleteDataPoint, DequeueCommand,
    EnqueueCommand, GetDevice, GetDeviceByImei, ListDataPoints, ListDevices, PeekCommands,
    RegisterDevice, MIGRATIONS,
};
pub use models::{DataPoint, Device, NewDataPoint};
pub use store::Store;

use sense_proto::Command;
use uuid::Uuid;

/// Per-device FIFO of pending commands. No authentication happens here;
/// callers have already checked who they are acting for.
#[async_trait::async_trait]
pub trait CommandQueue: Send + Sync {
    /// Append `command` to the tail of the device's queue
    async fn enqueue(&self, device: Uuid, command: Command) -> Result<(), DatabaseError>;

    /// Every pending command, oldest first, without removing any
    async fn peek(&self, device: Uuid) -> Result<Vec<Command>, DatabaseError>;

    /// Remove and return the head of the queue, `None` when it is empty
    async fn dequeue(&self, device: Uuid) -> Result<Option<Command>, DatabaseError>;
}
