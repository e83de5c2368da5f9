//! Shared harness for the cross-process tests under `tests/`. Both halves
//! of the gateway run inside one test binary but share nothing except the
//! SQLite file and a [`LocalChannel`], the same things the real processes
//! share.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use coap_lite::{CoapRequest, CoapResponse, MessageType, Packet, RequestType, ResponseType};
use http_body_util::BodyExt;
use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicU16, Ordering},
        Arc,
    },
};
use tempfile::TempDir;
use tokio::{
    net::UdpSocket,
    sync::oneshot,
    task::JoinHandle,
    time::{sleep, timeout, Duration},
};
use tower::ServiceExt;
use uuid::Uuid;

use sense_api::{create_router, AppState};
use sense_broker::LocalChannel;
use sensed::{Gateway, GatewayError};
use sensedb::Store;

const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

/// Minimal confirmable-request CoAP client
pub struct CoapClient {
    socket: UdpSocket,
    server: SocketAddr,
    message_id: AtomicU16,
}

/// Status and body of a CoAP response
#[derive(Debug)]
pub struct CoapReply {
    pub status: ResponseType,
    pub payload: Vec<u8>,
    pub packet: Packet,
}

impl CoapClient {
    pub async fn connect(server: SocketAddr) -> std::io::Result<Self> {
        let socket = UdpSocket::bind("127.0.0.1:0").await?;
        Ok(Self {
            socket,
            server,
            message_id: AtomicU16::new(1),
        })
    }

    pub async fn get(&self, path: &str) -> CoapReply {
        self.request(RequestType::Get, path, Vec::new()).await
    }

    pub async fn delete(&self, path: &str) -> CoapReply {
        self.request(RequestType::Delete, path, Vec::new()).await
    }

    pub async fn post(&self, path: &str, payload: Vec<u8>) -> CoapReply {
        self.request(RequestType::Post, path, payload).await
    }

    pub async fn request(&self, method: RequestType, path: &str, payload: Vec<u8>) -> CoapReply {
        self.request_as(MessageType::Confirmable, method, path, payload)
            .await
    }

    /// Send a request with the given message type and wait for its reply.
    /// Confirmable requests expect a piggybacked ACK, non-confirmable ones a
    /// NON response carrying the same token.
    pub async fn request_as(
        &self,
        ty: MessageType,
        method: RequestType,
        path: &str,
        payload: Vec<u8>,
    ) -> CoapReply {
        let message_id = self.message_id.fetch_add(1, Ordering::Relaxed);
        let bytes = encode_request(ty, message_id, method, path, payload);
        self.socket.send_to(&bytes, self.server).await.unwrap();

        let packet = self.receive().await.expect("no reply from the gateway");
        assert_eq!(packet.get_token(), &message_id.to_be_bytes()[..]);
        match ty {
            MessageType::Confirmable => {
                assert_eq!(packet.header.message_id, message_id);
                assert_eq!(packet.header.get_type(), MessageType::Acknowledgement);
            }
            _ => assert_eq!(packet.header.get_type(), MessageType::NonConfirmable),
        }

        let response = CoapResponse { message: packet };
        CoapReply {
            status: *response.get_status(),
            payload: response.message.payload.clone(),
            packet: response.message,
        }
    }

    /// Send raw bytes, for datagrams that are not valid CoAP
    pub async fn send_raw(&self, bytes: &[u8]) {
        self.socket.send_to(bytes, self.server).await.unwrap();
    }

    /// Next datagram from the server, `None` if nothing arrives in time
    pub async fn receive(&self) -> Option<Packet> {
        let mut buffer = [0u8; 1500];
        let (len, _) = timeout(REPLY_TIMEOUT, self.socket.recv_from(&mut buffer))
            .await
            .ok()?
            .ok()?;
        Packet::from_bytes(&buffer[..len]).ok()
    }
}

/// Encoded CoAP request, using the message id as token too
pub fn encode_request(
    ty: MessageType,
    message_id: u16,
    method: RequestType,
    path: &str,
    payload: Vec<u8>,
) -> Vec<u8> {
    let mut request: CoapRequest<SocketAddr> = CoapRequest::new();
    request.set_method(method);
    request.set_path(path);
    request.message.header.set_type(ty);
    request.message.header.message_id = message_id;
    request.message.set_token(message_id.to_be_bytes().to_vec());
    request.message.payload = payload;
    request.message.to_bytes().unwrap()
}

/// The device-facing process running on a loopback socket
pub struct RunningGateway {
    pub addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<Result<(), GatewayError>>,
}

impl RunningGateway {
    pub async fn stop(self) {
        self.shutdown.send(()).ok();
        self.task.await.unwrap().unwrap();
    }
}

/// Both halves of the system over one temporary database
pub struct Harness {
    _dir: TempDir,
    db_url: String,
    pub channel: Arc<LocalChannel>,
    pub api: Router,
}

impl Harness {
    pub async fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let dir = tempfile::tempdir().unwrap();
        let db_url = dir.path().join("sense.db").to_str().unwrap().to_string();

        let channel = Arc::new(LocalChannel::new());
        channel.connect().await.unwrap();

        let api_store = Store::open(&db_url).unwrap();
        let api = create_router(AppState::new(api_store, channel.clone()));

        Self {
            _dir: dir,
            db_url,
            channel,
            api,
        }
    }

    /// Start a fresh device-facing process with its own store handle
    pub async fn start_gateway(&self) -> RunningGateway {
        let store = Store::open(&self.db_url).unwrap();
        let gateway = Gateway::start("127.0.0.1:0".parse().unwrap(), store, self.channel.clone())
            .await
            .unwrap();
        let addr = gateway.local_addr().unwrap();

        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(gateway.serve_until(async move {
            shutdown_rx.await.ok();
        }));

        RunningGateway {
            addr,
            shutdown,
            task,
        }
    }

    /// Send a JSON request to the management API
    pub async fn http(
        &self,
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

        let response = self.api.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    /// Register a device over HTTP, returning its id
    pub async fn register(&self, imei: &str, name: &str) -> Uuid {
        let (status, json) = self
            .http(
                "POST",
                "/devices",
                Some(serde_json::json!({"imei": imei, "name": name})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{json}");
        Uuid::parse_str(json["uuid"].as_str().unwrap()).unwrap()
    }
}

/// Poll the identity endpoint until the gateway serves it
pub async fn wait_until_reachable(client: &CoapClient, device: Uuid) -> bool {
    timeout(Duration::from_secs(3), async {
        loop {
            if client.get(&device.to_string()).await.status == ResponseType::Content {
                return;
            }
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .is_ok()
}

/// CBOR telemetry map with single character keys
pub fn telemetry(fields: Vec<(&str, ciborium::Value)>) -> Vec<u8> {
    let map = ciborium::Value::Map(
        fields
            .into_iter()
            .map(|(k, v)| (ciborium::Value::Text(k.to_string()), v))
            .collect(),
    );
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(&map, &mut bytes).unwrap();
    bytes
}
