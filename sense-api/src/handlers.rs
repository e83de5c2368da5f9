use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sense_broker::Channel;
use sense_proto::Command;
use sensedb::{CommandQueue, DataPoint, Device};

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Serialize)]
pub struct StatusMessage {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct Detail {
    pub detail: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct DeviceRegistration {
    pub imei: String,
    pub name: String,
}

/// GET / - liveness
pub async fn root() -> Json<StatusMessage> {
    Json(StatusMessage {
        message: "Sense Web is running",
    })
}

/// POST /devices
pub async fn register_device(
    State(state): State<AppState>,
    body: Result<Json<DeviceRegistration>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Device>)> {
    let Json(request) = body?;
    let device = state
        .store
        .register_device(&request.imei, &request.name)
        .await?;
    log::info!("Registered device {} ({})", device.uuid, device.name);

    // the gateway also bulk loads on start, so a lost notification is
    // recovered by a restart
    if let Err(e) = state
        .channel
        .publish(Channel::DeviceRegistration, &device.uuid.to_string())
        .await
    {
        log::error!("Unable to publish registration of {}: {e}", device.uuid);
    }

    Ok((StatusCode::CREATED, Json(device)))
}

/// GET /devices
pub async fn list_devices(State(state): State<AppState>) -> ApiResult<Json<Vec<Device>>> {
    Ok(Json(state.store.list_devices().await?))
}

/// GET /devices/{uuid}
pub async fn get_device(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Device>> {
    existing_device(&state, &id).await.map(Json)
}

/// GET /devices/imei/{imei}
pub async fn get_device_by_imei(
    State(state): State<AppState>,
    Path(imei): Path<String>,
) -> ApiResult<Json<Device>> {
    state
        .store
        .get_device_by_imei(&imei)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("Device"))
}

/// POST /devices/{uuid}/commands
pub async fn enqueue_command(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<Command>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let device = existing_device(&state, &id).await?;
    let Json(command) = body?;

    log::info!("Queueing {command} for {}", device.uuid);
    state.store.enqueue(device.uuid, command).await?;
    Ok(StatusCode::ACCEPTED)
}

/// GET /devices/{uuid}/commands
pub async fn list_commands(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Command>>> {
    let device = existing_device(&state, &id).await?;
    Ok(Json(state.store.peek(device.uuid).await?))
}

/// GET /devices/{uuid}/data
pub async fn list_data_points(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<DataPoint>>> {
    let device = existing_device(&state, &id).await?;
    Ok(Json(state.store.list_data_points(device.uuid).await?))
}

/// DELETE /devices/{uuid}/data/{dp_uuid}
pub async fn delete_data_point(
    State(state): State<AppState>,
    Path((id, dp_id)): Path<(String, String)>,
) -> ApiResult<Json<Detail>> {
    let device = existing_device(&state, &id).await?;
    let dp_id = Uuid::parse_str(&dp_id).map_err(|_| ApiError::NotFound("Datapoint"))?;

    if !state.store.delete_data_point(device.uuid, dp_id).await? {
        return Err(ApiError::NotFound("Datapoint"));
    }
    Ok(Json(Detail {
        detail: "Datapoint deleted",
    }))
}

// An id that is not a uuid can not name a device, so it is a 404 too
async fn existing_device(state: &AppState, id: &str) -> ApiResult<Device> {
    let uuid = Uuid::parse_str(id).map_err(|_| ApiError::NotFound("Device"))?;
    state
        .store
        .get_device(uuid)
        .await?
        .ok_or(ApiError::NotFound("Device"))
}
