use chrono::{DateTime, Utc};
use coap_lite::ResponseType;
use thiserror::Error;
use uuid::Uuid;

use sense_proto::{report::keys, Report};
use sensedb::{DataPoint, DatabaseError, Device, NewDataPoint, Store};

/// Number of trailing IMEI characters a device proves knowledge of
pub const AUTH_TAIL_LEN: usize = 6;

/// Reason text of a successful ingestion
pub const ACCEPTED: &str = "DataPoint accepted";

/// Rejections of the ingestion pipeline. The display string of every
/// variant is the reason text sent back to the device.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Invalid payload")]
    InvalidPayload,
    #[error("Invalid device")]
    InvalidDevice,
    #[error("Missing or invalid auth tail")]
    MissingAuthTail,
    #[error("Unauthorised")]
    Unauthorised,
    #[error("Invalid timestamp")]
    InvalidTimestamp,
    #[error("Missing sensor")]
    MissingSensor,
    #[error("Missing value")]
    MissingValue,
    #[error("Storage Error")]
    Store(#[from] DatabaseError),
}

impl IngestError {
    pub fn response_type(&self) -> ResponseType {
        match self {
            IngestError::MissingAuthTail | IngestError::Unauthorised => ResponseType::Unauthorized,
            IngestError::Store(e) if e.is_unavailable() => ResponseType::ServiceUnavailable,
            IngestError::Store(_) => ResponseType::InternalServerError,
            _ => ResponseType::BadRequest,
        }
    }
}

/// Run a telemetry payload posted to `/{device}/data` through the pipeline
/// and persist it. Every check runs before anything is written, and the
/// first failing check decides the outcome.
pub async fn ingest(store: &Store, device: Uuid, payload: &[u8]) -> Result<DataPoint, IngestError> {
    let report = Report::decode(payload).map_err(|e| {
        log::debug!("Undecodable report for {device}: {e}");
        IngestError::InvalidPayload
    })?;

    let device = store
        .get_device(device)
        .await?
        .ok_or(IngestError::InvalidDevice)?;

    let point = validate(&report, &device)?;
    Ok(store.create_data_point(point).await?)
}

/// Checks that only need the decoded report and the device record
pub fn validate(report: &Report, device: &Device) -> Result<NewDataPoint, IngestError> {
    let tail = report
        .token(keys::AUTH_TAIL)
        .filter(|t| t.chars().count() == AUTH_TAIL_LEN)
        .ok_or(IngestError::MissingAuthTail)?;

    if tail != imei_tail(&device.imei) {
        log::warn!("Auth tail mismatch for device {}", device.uuid);
        return Err(IngestError::Unauthorised);
    }

    let timestamp = timestamp(report).ok_or(IngestError::InvalidTimestamp)?;

    let sensor = report
        .text(keys::SENSOR)
        .ok_or(IngestError::MissingSensor)?
        .to_string();

    let val_int = report.integer(keys::VAL_INT);
    // NaN and infinities are stored as NULL, so they count as absent
    let val_float = report.number(keys::VAL_FLOAT).filter(|f| f.is_finite());
    let val_str = report.text(keys::VAL_STR).map(str::to_string);
    if val_int.is_none() && val_float.is_none() && val_str.is_none() {
        return Err(IngestError::MissingValue);
    }

    Ok(NewDataPoint {
        device_uuid: device.uuid,
        timestamp,
        sensor,
        val_int,
        val_float,
        val_str,
        val_units: report.text(keys::VAL_UNITS).map(str::to_string),
    })
}

fn imei_tail(imei: &str) -> String {
    let skip = imei.chars().count().saturating_sub(AUTH_TAIL_LEN);
    imei.chars().skip(skip).collect()
}

/// Epoch seconds, integer or fractional, as a UTC instant
fn timestamp(report: &Report) -> Option<DateTime<Utc>> {
    if let Some(secs) = report.integer(keys::TIMESTAMP) {
        return DateTime::from_timestamp(secs, 0);
    }

    let secs = report.number(keys::TIMESTAMP).filter(|s| s.is_finite())?;
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
    // `as` saturates, out of range values are then refused by chrono
    DateTime::from_timestamp(whole as i64, nanos)
}
