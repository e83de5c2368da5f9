use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use sense_proto::Command;

use crate::DatabaseError;

/// A registered device. Devices are created once and never change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    pub uuid: Uuid,
    /// Hardware identifier; its last six characters double as the
    /// device's shared secret
    pub imei: String,
    pub name: String,
}

/// A single persisted sensor reading or message reported by a device
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataPoint {
    pub uuid: Uuid,
    pub device_uuid: Uuid,
    pub timestamp: DateTime<Utc>,
    pub sensor: String,
    pub val_int: Option<i64>,
    pub val_float: Option<f64>,
    pub val_str: Option<String>,
    pub val_units: Option<String>,
}

/// Input for [`crate::CreateDataPoint`]. The store assigns the uuid.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDataPoint {
    pub device_uuid: Uuid,
    pub timestamp: DateTime<Utc>,
    pub sensor: String,
    pub val_int: Option<i64>,
    pub val_float: Option<f64>,
    pub val_str: Option<String>,
    pub val_units: Option<String>,
}

impl NewDataPoint {
    /// Non-finite floats bind as NULL, so they do not count
    pub fn has_value(&self) -> bool {
        self.val_int.is_some()
            || self.val_float.is_some_and(f64::is_finite)
            || self.val_str.is_some()
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(raw).map_err(|_| DatabaseError::Corrupt(format!("uuid {raw}")))
}

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = crate::schema::devices)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub(crate) struct DeviceRecord {
    #[allow(unused)]
    pub(crate) id: i32,
    pub(crate) uuid: String,
    pub(crate) imei: String,
    pub(crate) name: String,
}

impl TryFrom<DeviceRecord> for Device {
    type Error = DatabaseError;

    fn try_from(record: DeviceRecord) -> Result<Self, Self::Error> {
        Ok(Device {
            uuid: parse_uuid(&record.uuid)?,
            imei: record.imei,
            name: record.name,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::devices)]
pub(crate) struct NewDeviceRecord<'a> {
    pub(crate) uuid: String,
    pub(crate) imei: &'a str,
    pub(crate) name: &'a str,
}

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = crate::schema::data_points)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub(crate) struct DataPointRecord {
    #[allow(unused)]
    pub(crate) id: i32,
    pub(crate) uuid: String,
    pub(crate) device_uuid: String,
    pub(crate) timestamp: DateTime<Utc>,
    pub(crate) sensor: String,
    pub(crate) val_int: Option<i64>,
    pub(crate) val_float: Option<f64>,
    pub(crate) val_str: Option<String>,
    pub(crate) val_units: Option<String>,
}

impl TryFrom<DataPointRecord> for DataPoint {
    type Error = DatabaseError;

    fn try_from(record: DataPointRecord) -> Result<Self, Self::Error> {
        Ok(DataPoint {
            uuid: parse_uuid(&record.uuid)?,
            device_uuid: parse_uuid(&record.device_uuid)?,
            timestamp: record.timestamp,
            sensor: record.sensor,
            val_int: record.val_int,
            val_float: record.val_float,
            val_str: record.val_str,
            val_units: record.val_units,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::data_points)]
pub(crate) struct NewDataPointRecord {
    pub(crate) uuid: String,
    pub(crate) device_uuid: String,
    pub(crate) timestamp: DateTime<Utc>,
    pub(crate) sensor: String,
    pub(crate) val_int: Option<i64>,
    pub(crate) val_float: Option<f64>,
    pub(crate) val_str: Option<String>,
    pub(crate) val_units: Option<String>,
}

impl NewDataPointRecord {
    pub(crate) fn new(uuid: Uuid, dp: NewDataPoint) -> Self {
        Self {
            uuid: uuid.to_string(),
            device_uuid: dp.device_uuid.to_string(),
            timestamp: dp.timestamp,
            sensor: dp.sensor,
            val_int: dp.val_int,
            val_float: dp.val_float,
            val_str: dp.val_str,
            val_units: dp.val_units,
        }
    }
}

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = crate::schema::commands)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub(crate) struct CommandRecord {
    pub(crate) id: i32,
    #[allow(unused)]
    pub(crate) device_uuid: String,
    pub(crate) payload: String,
}

impl TryFrom<CommandRecord> for Command {
    type Error = DatabaseError;

    fn try_from(record: CommandRecord) -> Result<Self, Self::Error> {
        serde_json::from_str(&record.payload)
            .map_err(|e| DatabaseError::Corrupt(format!("command {}: {e}", record.id)))
    }
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::commands)]
pub(crate) struct NewCommandRecord {
    pub(crate) device_uuid: String,
    pub(crate) payload: String,
}
