use axum::{
    routing::{delete, get},
    Router,
};

use crate::{handlers::*, state::AppState};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/devices", get(list_devices).post(register_device))
        .route("/devices/imei/{imei}", get(get_device_by_imei))
        .route("/devices/{uuid}", get(get_device))
        .route(
            "/devices/{uuid}/commands",
            get(list_commands).post(enqueue_command),
        )
        .route("/devices/{uuid}/data", get(list_data_points))
        .route("/devices/{uuid}/data/{dp_uuid}", delete(delete_data_point))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use futures::StreamExt;
    use http_body_util::BodyExt;
    use sense_broker::{Channel, LocalChannel, RegistrationChannel};
    use sensedb::{NewDataPoint, Store};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;
    use uuid::Uuid;

    struct TestApp {
        _dir: TempDir,
        store: Store,
        channel: Arc<LocalChannel>,
        router: Router,
    }

    async fn test_app() -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("sense.db").to_str().unwrap()).unwrap();
        let channel = Arc::new(LocalChannel::new());
        channel.connect().await.unwrap();
        let router = create_router(AppState::new(store.clone(), channel.clone()));
        TestApp {
            _dir: dir,
            store,
            channel,
            router,
        }
    }

    async fn send(
        app: &TestApp,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn register(app: &TestApp, imei: &str) -> String {
        let (status, json) = send(
            app,
            "POST",
            "/devices",
            Some(serde_json::json!({"imei": imei, "name": "field-node"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        json["uuid"].as_str().unwrap().to_string()
    }

    #[actix::test]
    async fn root_reports_liveness() {
        let app = test_app().await;
        let (status, json) = send(&app, "GET", "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], "Sense Web is running");
    }

    #[actix::test]
    async fn registration_publishes_and_rejects_duplicates() {
        let app = test_app().await;
        let mut notifications = app
            .channel
            .subscribe(Channel::DeviceRegistration)
            .await
            .unwrap();

        let (status, json) = send(
            &app,
            "POST",
            "/devices",
            Some(serde_json::json!({"imei": "123456789", "name": "field-node"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["imei"], "123456789");
        assert_eq!(json["name"], "field-node");
        let id = json["uuid"].as_str().unwrap().to_string();
        assert_eq!(notifications.next().await, Some(id.clone()));

        let (status, json) = send(
            &app,
            "POST",
            "/devices",
            Some(serde_json::json!({"imei": "123456789", "name": "again"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(json["detail"].as_str().unwrap().contains("123456789"));

        let (status, json) = send(&app, "GET", "/devices", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json.as_array().unwrap().len(), 1);
    }

    #[actix::test]
    async fn registration_survives_a_closed_channel() {
        let app = test_app().await;
        app.channel.close().await.unwrap();

        let id = register(&app, "555555555").await;
        let (status, json) = send(&app, "GET", &format!("/devices/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["imei"], "555555555");
    }

    #[actix::test]
    async fn device_lookups() {
        let app = test_app().await;
        let id = register(&app, "987654321").await;

        let (status, json) = send(&app, "GET", "/devices/imei/987654321", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["uuid"], id.as_str());

        let (status, json) = send(&app, "GET", "/devices/imei/000", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["detail"], "Device not found");

        let (status, _) = send(&app, "GET", &format!("/devices/{}", Uuid::new_v4()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, "GET", "/devices/not-a-uuid", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[actix::test]
    async fn commands_are_queued_in_order() {
        let app = test_app().await;
        let id = register(&app, "123123123").await;
        let uri = format!("/devices/{id}/commands");

        let (status, json) = send(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!([]));

        let (status, _) = send(
            &app,
            "POST",
            &uri,
            Some(serde_json::json!({"ty": 1, "ta": 2, "i": 500})),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let (status, _) = send(
            &app,
            "POST",
            &uri,
            Some(serde_json::json!({"ty": 2, "ta": 0, "b": true})),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let (_, json) = send(&app, "GET", &uri, None).await;
        assert_eq!(
            json,
            serde_json::json!([{"ty": 1, "ta": 2, "i": 500}, {"ty": 2, "ta": 0, "b": true}])
        );
    }

    #[actix::test]
    async fn command_validation() {
        let app = test_app().await;
        let id = register(&app, "321321321").await;

        let (status, json) = send(
            &app,
            "POST",
            &format!("/devices/{id}/commands"),
            Some(serde_json::json!({"ty": 7, "ta": 0})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(json["detail"].is_string());

        // unknown device wins over a bad body
        let (status, json) = send(
            &app,
            "POST",
            &format!("/devices/{}/commands", Uuid::new_v4()),
            Some(serde_json::json!({"ty": 7, "ta": 0})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["detail"], "Device not found");

        let (status, _) = send(&app, "GET", &format!("/devices/{}/commands", Uuid::new_v4()), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[actix::test]
    async fn data_points_listing_and_deletion() {
        let app = test_app().await;
        let id = register(&app, "444555666").await;
        let device = Uuid::parse_str(&id).unwrap();

        let point = |secs: i64| NewDataPoint {
            device_uuid: device,
            timestamp: chrono::DateTime::from_timestamp(secs, 0).unwrap(),
            sensor: "temp".to_string(),
            val_int: Some(secs),
            val_float: None,
            val_str: None,
            val_units: None,
        };
        let old = app.store.create_data_point(point(100)).await.unwrap();
        let new = app.store.create_data_point(point(200)).await.unwrap();

        let (status, json) = send(&app, "GET", &format!("/devices/{id}/data"), None).await;
        assert_eq!(status, StatusCode::OK);
        let listed = json.as_array().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0]["uuid"], new.uuid.to_string());
        assert_eq!(listed[1]["uuid"], old.uuid.to_string());

        // a data point of another device is not found under this one
        let other = register(&app, "777888999").await;
        let (status, json) = send(
            &app,
            "DELETE",
            &format!("/devices/{other}/data/{}", old.uuid),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["detail"], "Datapoint not found");

        let (status, json) =
            send(&app, "DELETE", &format!("/devices/{id}/data/{}", old.uuid), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["detail"], "Datapoint deleted");

        let (status, _) =
            send(&app, "DELETE", &format!("/devices/{id}/data/{}", old.uuid), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &app,
            "GET",
            &format!("/devices/{}/data", Uuid::new_v4()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
