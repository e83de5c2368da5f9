use actix::{Addr, SyncArbiter};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use sense_proto::Command;

use crate::{
    db::{
        establish, CreateDataPoint, DatabaseError, DatabaseHandler, DeleteDataPoint,
        DequeueCommand, EnqueueCommand, GetDevice, GetDeviceByImei, ListDataPoints, ListDevices,
        PeekCommands, RegisterDevice,
    },
    CommandQueue, DataPoint, Device, NewDataPoint,
};

/// Cloneable handle to the [`DatabaseHandler`] actor. Built once at
/// process start and handed to every component that needs storage.
#[derive(Clone)]
pub struct Store {
    db: Addr<DatabaseHandler>,
}

impl Store {
    /// Open (creating if needed) the SQLite database at `url`, run pending
    /// migrations and start the worker. Must be called from inside a running
    /// actix system.
    pub fn open(url: &str) -> Result<Self, DatabaseError> {
        let conn = establish(url)?;
        log::info!("Opened database {url}");

        let slot = Arc::new(Mutex::new(Some(conn)));
        let url = url.to_string();
        let db = SyncArbiter::start(1, move || DatabaseHandler::new(url.clone(), slot.clone()));

        Ok(Self { db })
    }

    pub fn handle(&self) -> Addr<DatabaseHandler> {
        self.db.clone()
    }

    pub async fn register_device(&self, imei: &str, name: &str) -> Result<Device, DatabaseError> {
        self.db
            .send(RegisterDevice {
                imei: imei.to_string(),
                name: name.to_string(),
            })
            .await?
    }

    pub async fn get_device(&self, uuid: Uuid) -> Result<Option<Device>, DatabaseError> {
        self.db.send(GetDevice(uuid)).await?
    }

    pub async fn get_device_by_imei(&self, imei: &str) -> Result<Option<Device>, DatabaseError> {
        self.db.send(GetDeviceByImei(imei.to_string())).await?
    }

    pub async fn list_devices(&self) -> Result<Vec<Device>, DatabaseError> {
        self.db.send(ListDevices).await?
    }

    pub async fn create_data_point(&self, dp: NewDataPoint) -> Result<DataPoint, DatabaseError> {
        self.db.send(CreateDataPoint(dp)).await?
    }

    pub async fn list_data_points(&self, device: Uuid) -> Result<Vec<DataPoint>, DatabaseError> {
        self.db.send(ListDataPoints(device)).await?
    }

    pub async fn delete_data_point(
        &self,
        device: Uuid,
        data_point: Uuid,
    ) -> Result<bool, DatabaseError> {
        self.db
            .send(DeleteDataPoint { device, data_point })
            .await?
    }
}

#[async_trait::async_trait]
impl CommandQueue for Store {
    async fn enqueue(&self, device: Uuid, command: Command) -> Result<(), DatabaseError> {
        self.db.send(EnqueueCommand { device, command }).await?
    }

    async fn peek(&self, device: Uuid) -> Result<Vec<Command>, DatabaseError> {
        self.db.send(PeekCommands(device)).await?
    }

    async fn dequeue(&self, device: Uuid) -> Result<Option<Command>, DatabaseError> {
        self.db.send(DequeueCommand(device)).await?
    }
}
