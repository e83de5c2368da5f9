use axum::http::StatusCode;
use ciborium::Value;
use coap_lite::{CoapResponse, ContentFormat, MessageType, RequestType, ResponseType};
use uuid::Uuid;

use sense_proto::{Command, CommandType};
use sense_tests::{encode_request, telemetry, wait_until_reachable, CoapClient, Harness};

fn reading(tail: &str) -> Vec<u8> {
    telemetry(vec![
        ("i", Value::Text(tail.to_string())),
        ("t", Value::Integer(1_700_000_000.into())),
        ("s", Value::Text("voltage_sensor".to_string())),
        ("f", Value::Float(3.3)),
        ("u", Value::Text("V".to_string())),
    ])
}

#[actix::test]
async fn command_round_trip_for_a_new_device() {
    let harness = Harness::new().await;
    let gateway = harness.start_gateway().await;
    let client = CoapClient::connect(gateway.addr).await.unwrap();

    let device = harness.register("123456789", "field-node").await;
    assert!(wait_until_reachable(&client, device).await);

    let identity = client.get(&device.to_string()).await;
    assert_eq!(identity.payload, device.to_string().into_bytes());

    let (status, _) = harness
        .http(
            "POST",
            &format!("/devices/{device}/commands"),
            Some(serde_json::json!({"ty": 1, "ta": 2, "i": 500})),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let commands = format!("{device}/commands");
    let read = client.get(&commands).await;
    assert_eq!(read.status, ResponseType::Content);
    assert_eq!(
        read.packet.get_content_format(),
        Some(ContentFormat::ApplicationCBOR)
    );
    assert_eq!(
        Command::from_cbor(&read.payload).unwrap(),
        Command {
            ty: CommandType::SetPollRate,
            ta: 2,
            i: Some(500),
            b: None,
        }
    );

    assert_eq!(client.delete(&commands).await.status, ResponseType::Deleted);

    let read = client.get(&commands).await;
    assert_eq!(Command::from_cbor(&read.payload).unwrap(), Command::none_available());

    // acknowledging an empty queue is still a success
    assert_eq!(client.delete(&commands).await.status, ResponseType::Deleted);

    let (_, queue) = harness
        .http("GET", &format!("/devices/{device}/commands"), None)
        .await;
    assert_eq!(queue, serde_json::json!([]));

    gateway.stop().await;
}

#[actix::test]
async fn telemetry_is_stored_only_when_authorised() {
    let harness = Harness::new().await;
    let gateway = harness.start_gateway().await;
    let client = CoapClient::connect(gateway.addr).await.unwrap();

    let device = harness.register("123456789", "field-node").await;
    assert!(wait_until_reachable(&client, device).await);
    let data = format!("{device}/data");

    let accepted = client.post(&data, reading("456789")).await;
    assert_eq!(accepted.status, ResponseType::Created);
    assert_eq!(accepted.payload, b"DataPoint accepted".to_vec());

    let refused = client.post(&data, reading("000000")).await;
    assert_eq!(refused.status, ResponseType::Unauthorized);
    assert_eq!(refused.payload, b"Unauthorised".to_vec());

    let no_value = telemetry(vec![
        ("i", Value::Text("456789".to_string())),
        ("t", Value::Integer(1_700_000_100.into())),
        ("s", Value::Text("voltage_sensor".to_string())),
    ]);
    let refused = client.post(&data, no_value).await;
    assert_eq!(refused.status, ResponseType::BadRequest);
    assert_eq!(refused.payload, b"Missing value".to_vec());

    let (status, points) = harness
        .http("GET", &format!("/devices/{device}/data"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let points = points.as_array().unwrap();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0]["sensor"], "voltage_sensor");
    assert_eq!(points[0]["val_float"], 3.3);
    assert_eq!(points[0]["val_units"], "V");

    gateway.stop().await;
}

#[actix::test]
async fn missed_registration_is_picked_up_on_restart() {
    let harness = Harness::new().await;

    // registered while no gateway is listening, so the notification is lost
    let device = harness.register("111111111111111", "offline").await;

    let gateway = harness.start_gateway().await;
    let client = CoapClient::connect(gateway.addr).await.unwrap();

    let identity = client.get(&device.to_string()).await;
    assert_eq!(identity.status, ResponseType::Content);
    assert_eq!(identity.payload, device.to_string().into_bytes());

    gateway.stop().await;
}

#[actix::test]
async fn registration_reaches_a_gateway_after_its_listener_drops() {
    let harness = Harness::new().await;
    let gateway = harness.start_gateway().await;
    let client = CoapClient::connect(gateway.addr).await.unwrap();

    harness.channel.sever().await.unwrap();
    // give the listener time to resubscribe
    tokio::time::sleep(std::time::Duration::from_secs(1)).await;

    let device = harness.register("222222222222222", "late").await;
    assert!(wait_until_reachable(&client, device).await);

    gateway.stop().await;
}

#[actix::test]
async fn unknown_routes_and_discovery() {
    let harness = Harness::new().await;
    let gateway = harness.start_gateway().await;
    let client = CoapClient::connect(gateway.addr).await.unwrap();

    let device = harness.register("333333333", "field-node").await;
    assert!(wait_until_reachable(&client, device).await);

    assert_eq!(
        client.get(&format!("{}/commands", Uuid::new_v4())).await.status,
        ResponseType::NotFound
    );
    assert_eq!(
        client.post(&format!("{device}/commands"), Vec::new()).await.status,
        ResponseType::MethodNotAllowed
    );

    let core = client.get(".well-known/core").await;
    assert_eq!(core.status, ResponseType::Content);
    let links = String::from_utf8(core.payload).unwrap();
    for endpoint in ["", "/commands", "/data"] {
        assert!(links.contains(&format!("</{device}{endpoint}>")), "{links}");
    }

    // garbage is dropped without an answer and the server keeps going
    client.send_raw(&[0xff, 0x00, 0x01]).await;
    assert!(client.receive().await.is_none());
    assert_eq!(
        client.get(&device.to_string()).await.status,
        ResponseType::Content
    );

    gateway.stop().await;
}

#[actix::test]
async fn retransmitted_requests_are_handled_once() {
    let harness = Harness::new().await;
    let gateway = harness.start_gateway().await;
    let client = CoapClient::connect(gateway.addr).await.unwrap();

    let device = harness.register("444444444", "field-node").await;
    assert!(wait_until_reachable(&client, device).await);

    for i in [1, 2] {
        let (status, _) = harness
            .http(
                "POST",
                &format!("/devices/{device}/commands"),
                Some(serde_json::json!({"ty": 1, "ta": 2, "i": i})),
            )
            .await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }

    // the same acknowledge twice, as a device does when our ACK is lost
    let acknowledge = encode_request(
        MessageType::Confirmable,
        4242,
        RequestType::Delete,
        &format!("{device}/commands"),
        Vec::new(),
    );
    client.send_raw(&acknowledge).await;
    let first = client.receive().await.unwrap();
    client.send_raw(&acknowledge).await;
    let second = client.receive().await.unwrap();

    assert_eq!(first.header.message_id, 4242);
    assert_eq!(first.to_bytes().unwrap(), second.to_bytes().unwrap());
    assert_eq!(
        *CoapResponse { message: second }.get_status(),
        ResponseType::Deleted
    );

    let (_, queue) = harness
        .http("GET", &format!("/devices/{device}/commands"), None)
        .await;
    assert_eq!(queue, serde_json::json!([{"ty": 1, "ta": 2, "i": 2}]));

    // a repeated telemetry post is stored once
    let post = encode_request(
        MessageType::Confirmable,
        4243,
        RequestType::Post,
        &format!("{device}/data"),
        reading("444444"),
    );
    for _ in 0..2 {
        client.send_raw(&post).await;
        let reply = client.receive().await.unwrap();
        assert_eq!(*CoapResponse { message: reply }.get_status(), ResponseType::Created);
    }
    let (_, points) = harness
        .http("GET", &format!("/devices/{device}/data"), None)
        .await;
    assert_eq!(points.as_array().unwrap().len(), 1);

    gateway.stop().await;
}

#[actix::test]
async fn non_confirmable_requests_get_non_confirmable_replies() {
    let harness = Harness::new().await;
    let gateway = harness.start_gateway().await;
    let client = CoapClient::connect(gateway.addr).await.unwrap();

    let device = harness.register("555555555", "field-node").await;
    assert!(wait_until_reachable(&client, device).await);

    let identity = client
        .request_as(
            MessageType::NonConfirmable,
            RequestType::Get,
            &device.to_string(),
            Vec::new(),
        )
        .await;
    assert_eq!(identity.status, ResponseType::Content);
    assert_eq!(identity.payload, device.to_string().into_bytes());
    assert_eq!(
        identity.packet.header.get_type(),
        MessageType::NonConfirmable
    );

    gateway.stop().await;
}
