use actix::{prelude::*, MailboxError};
use diesel::{
    connection::SimpleConnection,
    prelude::*,
    result::{ConnectionError, DatabaseErrorKind, Error as DieselError},
    sqlite::SqliteConnection,
};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

use sense_proto::Command;

use crate::{
    models::{
        CommandRecord, DataPoint, DataPointRecord, Device, DeviceRecord, NewCommandRecord,
        NewDataPoint, NewDataPointRecord, NewDeviceRecord,
    },
    schema::{commands, data_points, devices},
};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

// Both gateway processes open the same file, so writers wait on each
// other's locks instead of failing immediately
const CONNECTION_PRAGMAS: &str = "PRAGMA journal_mode = WAL; \
    PRAGMA busy_timeout = 5000; \
    PRAGMA foreign_keys = ON;";

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection Error")]
    Connection(#[from] ConnectionError),
    #[error("Query Error")]
    Query(#[from] DieselError),
    #[error("Migration Error {0}")]
    Migration(String),
    #[error("Actix mailbox Error")]
    MailError(#[from] MailboxError),
    #[error("Device with IMEI {0} already exists")]
    DeviceAlreadyExists(String),
    #[error("Invalid data point: {0}")]
    InvalidDataPoint(String),
    #[error("Corrupt record {0}")]
    Corrupt(String),
    #[error("Database is not initialised")]
    NotInitialised,
}

impl DatabaseError {
    /// True when the error means the store could not be reached at all,
    /// as opposed to a request it refused
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            DatabaseError::Connection(_)
                | DatabaseError::MailError(_)
                | DatabaseError::NotInitialised
        )
    }
}

pub(crate) fn establish(url: &str) -> Result<SqliteConnection, DatabaseError> {
    let mut conn = SqliteConnection::establish(url)?;
    conn.batch_execute(CONNECTION_PRAGMAS)?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| DatabaseError::Migration(e.to_string()))?;
    Ok(conn)
}

/// [`DatabaseHandler`] owns the diesel connection and runs on a
/// [`actix::SyncArbiter`] thread, so blocking SQLite calls never stall the
/// event loop of the process that owns the handle. Every operation in the
/// crate is a message to this actor.
pub struct DatabaseHandler {
    url: String,
    conn: Option<SqliteConnection>,
}

impl DatabaseHandler {
    pub(crate) fn new(url: String, slot: Arc<Mutex<Option<SqliteConnection>>>) -> Self {
        let conn = slot.lock().ok().and_then(|mut c| c.take());
        Self { url, conn }
    }

    // The first connection is opened by `Store::open` so that errors surface
    // to the caller; a restarted worker reconnects here instead
    fn conn(&mut self) -> Result<&mut SqliteConnection, DatabaseError> {
        if self.conn.is_none() {
            log::warn!("Database worker reconnecting to {}", self.url);
            self.conn = Some(establish(&self.url)?);
        }
        self.conn.as_mut().ok_or(DatabaseError::NotInitialised)
    }
}

impl Actor for DatabaseHandler {
    type Context = SyncContext<Self>;
}

/// Create a device with a freshly generated uuid. Fails with
/// [`DatabaseError::DeviceAlreadyExists`] if the IMEI is taken.
#[derive(Message)]
#[rtype(result = "RegisterDeviceResponse")]
pub struct RegisterDevice {
    pub imei: String,
    pub name: String,
}
type RegisterDeviceResponse = Result<Device, DatabaseError>;

impl Handler<RegisterDevice> for DatabaseHandler {
    type Result = RegisterDeviceResponse;

    fn handle(&mut self, msg: RegisterDevice, _ctx: &mut Self::Context) -> Self::Result {
        let conn = self.conn()?;
        let uuid = Uuid::new_v4();

        let res = conn.immediate_transaction::<_, DatabaseError, _>(|conn| {
            let existing = devices::table
                .filter(devices::imei.eq(&msg.imei))
                .count()
                .get_result::<i64>(conn)?;
            if existing > 0 {
                return Err(DatabaseError::DeviceAlreadyExists(msg.imei.clone()));
            }

            diesel::insert_into(devices::table)
                .values(NewDeviceRecord {
                    uuid: uuid.to_string(),
                    imei: &msg.imei,
                    name: &msg.name,
                })
                .execute(conn)?;
            Ok(())
        });

        match res {
            Ok(()) => {}
            Err(DatabaseError::Query(DieselError::DatabaseError(
                DatabaseErrorKind::UniqueViolation,
                _,
            ))) => return Err(DatabaseError::DeviceAlreadyExists(msg.imei)),
            Err(e) => return Err(e),
        }

        log::debug!("Registered device {uuid} for IMEI {}", msg.imei);
        Ok(Device {
            uuid,
            imei: msg.imei,
            name: msg.name,
        })
    }
}

#[derive(Message)]
#[rtype(result = "GetDeviceResponse")]
pub struct GetDevice(pub Uuid);
type GetDeviceResponse = Result<Option<Device>, DatabaseError>;

impl Handler<GetDevice> for DatabaseHandler {
    type Result = GetDeviceResponse;

    fn handle(&mut self, msg: GetDevice, _ctx: &mut Self::Context) -> Self::Result {
        devices::table
            .filter(devices::uuid.eq(msg.0.to_string()))
            .select(DeviceRecord::as_select())
            .first::<DeviceRecord>(self.conn()?)
            .optional()?
            .map(Device::try_from)
            .transpose()
    }
}

#[derive(Message)]
#[rtype(result = "GetDeviceResponse")]
pub struct GetDeviceByImei(pub String);

impl Handler<GetDeviceByImei> for DatabaseHandler {
    type Result = GetDeviceResponse;

    fn handle(&mut self, msg: GetDeviceByImei, _ctx: &mut Self::Context) -> Self::Result {
        devices::table
            .filter(devices::imei.eq(&msg.0))
            .select(DeviceRecord::as_select())
            .first::<DeviceRecord>(self.conn()?)
            .optional()?
            .map(Device::try_from)
            .transpose()
    }
}

#[derive(Message)]
#[rtype(result = "ListDevicesResponse")]
pub struct ListDevices;
type ListDevicesResponse = Result<Vec<Device>, DatabaseError>;

impl Handler<ListDevices> for DatabaseHandler {
    type Result = ListDevicesResponse;

    fn handle(&mut self, _msg: ListDevices, _ctx: &mut Self::Context) -> Self::Result {
        devices::table
            .order(devices::id.asc())
            .select(DeviceRecord::as_select())
            .load::<DeviceRecord>(self.conn()?)?
            .into_iter()
            .map(Device::try_from)
            .collect()
    }
}

#[derive(Message)]
#[rtype(result = "CreateDataPointResponse")]
pub struct CreateDataPoint(pub NewDataPoint);
type CreateDataPointResponse = Result<DataPoint, DatabaseError>;

impl Handler<CreateDataPoint> for DatabaseHandler {
    type Result = CreateDataPointResponse;

    fn handle(&mut self, msg: CreateDataPoint, _ctx: &mut Self::Context) -> Self::Result {
        if !msg.0.has_value() {
            return Err(DatabaseError::InvalidDataPoint(
                "no value slot is set".to_string(),
            ));
        }

        let record = NewDataPointRecord::new(Uuid::new_v4(), msg.0);
        diesel::insert_into(data_points::table)
            .values(&record)
            .returning(DataPointRecord::as_returning())
            .get_result::<DataPointRecord>(self.conn()?)?
            .try_into()
    }
}

/// All data points of one device, newest first
#[derive(Message)]
#[rtype(result = "ListDataPointsResponse")]
pub struct ListDataPoints(pub Uuid);
type ListDataPointsResponse = Result<Vec<DataPoint>, DatabaseError>;

impl Handler<ListDataPoints> for DatabaseHandler {
    type Result = ListDataPointsResponse;

    fn handle(&mut self, msg: ListDataPoints, _ctx: &mut Self::Context) -> Self::Result {
        let mut points = data_points::table
            .filter(data_points::device_uuid.eq(msg.0.to_string()))
            .select(DataPointRecord::as_select())
            .load::<DataPointRecord>(self.conn()?)?
            .into_iter()
            .map(DataPoint::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        // stored as text, so order on the parsed instant
        points.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(points)
    }
}

/// Delete one data point of a device. Resolves to `false` when no such
/// point exists for that device.
#[derive(Message)]
#[rtype(result = "DeleteDataPointResponse")]
pub struct DeleteDataPoint {
    pub device: Uuid,
    pub data_point: Uuid,
}
type DeleteDataPointResponse = Result<bool, DatabaseError>;

impl Handler<DeleteDataPoint> for DatabaseHandler {
    type Result = DeleteDataPointResponse;

    fn handle(&mut self, msg: DeleteDataPoint, _ctx: &mut Self::Context) -> Self::Result {
        let deleted = diesel::delete(
            data_points::table
                .filter(data_points::uuid.eq(msg.data_point.to_string()))
                .filter(data_points::device_uuid.eq(msg.device.to_string())),
        )
        .execute(self.conn()?)?;
        Ok(deleted > 0)
    }
}

/// Append a command to the tail of a device queue
#[derive(Message)]
#[rtype(result = "EnqueueCommandResponse")]
pub struct EnqueueCommand {
    pub device: Uuid,
    pub command: Command,
}
type EnqueueCommandResponse = Result<(), DatabaseError>;

impl Handler<EnqueueCommand> for DatabaseHandler {
    type Result = EnqueueCommandResponse;

    fn handle(&mut self, msg: EnqueueCommand, _ctx: &mut Self::Context) -> Self::Result {
        let payload = serde_json::to_string(&msg.command)
            .map_err(|e| DatabaseError::Corrupt(format!("command encode: {e}")))?;
        diesel::insert_into(commands::table)
            .values(NewCommandRecord {
                device_uuid: msg.device.to_string(),
                payload,
            })
            .execute(self.conn()?)?;
        Ok(())
    }
}

/// Pending commands of a device, oldest first. Does not modify the queue.
#[derive(Message)]
#[rtype(result = "PeekCommandsResponse")]
pub struct PeekCommands(pub Uuid);
type PeekCommandsResponse = Result<Vec<Command>, DatabaseError>;

impl Handler<PeekCommands> for DatabaseHandler {
    type Result = PeekCommandsResponse;

    fn handle(&mut self, msg: PeekCommands, _ctx: &mut Self::Context) -> Self::Result {
        commands::table
            .filter(commands::device_uuid.eq(msg.0.to_string()))
            .order(commands::id.asc())
            .select(CommandRecord::as_select())
            .load::<CommandRecord>(self.conn()?)?
            .into_iter()
            .map(Command::try_from)
            .collect()
    }
}

/// Remove and return the head of a device queue, `None` if it is empty
#[derive(Message)]
#[rtype(result = "DequeueCommandResponse")]
pub struct DequeueCommand(pub Uuid);
type DequeueCommandResponse = Result<Option<Command>, DatabaseError>;

impl Handler<DequeueCommand> for DatabaseHandler {
    type Result = DequeueCommandResponse;

    fn handle(&mut self, msg: DequeueCommand, _ctx: &mut Self::Context) -> Self::Result {
        let device = msg.0.to_string();
        // IMMEDIATE takes the write lock up front, so the other process
        // can not pop the same row between the select and the delete
        let head = self
            .conn()?
            .immediate_transaction::<_, DatabaseError, _>(|conn| {
                let head = commands::table
                    .filter(commands::device_uuid.eq(&device))
                    .order(commands::id.asc())
                    .select(CommandRecord::as_select())
                    .first::<CommandRecord>(conn)
                    .optional()?;

                if let Some(record) = &head {
                    diesel::delete(commands::table.find(record.id)).execute(conn)?;
                }
                Ok(head)
            })?;

        head.map(Command::try_from).transpose()
    }
}
