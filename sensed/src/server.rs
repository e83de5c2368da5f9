use actix::Addr;
use coap_lite::{CoapRequest, Packet};
use std::{future::Future, net::SocketAddr, sync::Arc};
use tokio::net::UdpSocket;

use sensedb::Store;

use crate::{
    exchange::{ExchangeCache, Seen},
    registry::DeviceRegistry,
    resource, GatewayError,
};

/// Largest datagram the server reads. Anything bigger is truncated and
/// fails to parse.
pub const MAX_DATAGRAM_SIZE: usize = 1500;

/// UDP CoAP server. One task is spawned per inbound datagram.
pub struct CoapServer {
    socket: Arc<UdpSocket>,
    registry: Addr<DeviceRegistry>,
    store: Store,
    exchanges: Arc<ExchangeCache>,
}

impl CoapServer {
    pub async fn bind(
        addr: SocketAddr,
        registry: Addr<DeviceRegistry>,
        store: Store,
    ) -> Result<Self, GatewayError> {
        let socket = UdpSocket::bind(addr).await.map_err(|e| {
            log::error!("Unable to bind to socket {addr}: {e}");
            GatewayError::Io(e)
        })?;

        Ok(Self {
            socket: Arc::new(socket),
            registry,
            store,
            exchanges: Arc::new(ExchangeCache::default()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, GatewayError> {
        Ok(self.socket.local_addr()?)
    }

    /// Serve until `shutdown` resolves. Receive errors are logged and the
    /// loop carries on.
    pub async fn run<F>(self, shutdown: F) -> Result<(), GatewayError>
    where
        F: Future<Output = ()>,
    {
        let mut buffer = [0u8; MAX_DATAGRAM_SIZE];
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    log::info!("CoAP server stopping");
                    break;
                }
                res = self.socket.recv_from(&mut buffer) => {
                    match res {
                        Ok((len, from)) => {
                            let datagram = buffer[..len].to_vec();
                            let socket = self.socket.clone();
                            let registry = self.registry.clone();
                            let store = self.store.clone();
                            let exchanges = self.exchanges.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_datagram(
                                    &socket, &registry, &store, &exchanges, datagram, from,
                                )
                                .await
                                {
                                    log::error!("Failed to answer {from}: {e}");
                                }
                            });
                        }
                        Err(e) => {
                            log::error!("Socket error {e}");
                        }
                    }
                }
            };
        }

        Ok(())
    }
}

async fn handle_datagram(
    socket: &UdpSocket,
    registry: &Addr<DeviceRegistry>,
    store: &Store,
    exchanges: &ExchangeCache,
    datagram: Vec<u8>,
    from: SocketAddr,
) -> Result<(), GatewayError> {
    let packet = match Packet::from_bytes(&datagram) {
        Ok(packet) => packet,
        Err(e) => {
            log::warn!("Dropping malformed datagram from {from}: {e}");
            return Ok(());
        }
    };

    let message_id = packet.header.message_id;
    let mut request = CoapRequest::from_packet(packet, from);
    // acks and resets carry no request to answer
    let Some(mut response) = request.response.take() else {
        log::trace!("{from} - ignoring {:?} {message_id}", request.message.header.get_type());
        return Ok(());
    };

    let key = (from, message_id);
    match exchanges.check(key).await {
        Seen::New => {}
        Seen::InFlight => {
            log::debug!("{from} - retransmitted {message_id} still in flight, dropped");
            return Ok(());
        }
        Seen::Answered(bytes) => {
            log::debug!("{from} - retransmitted {message_id}, replaying response");
            socket.send_to(&bytes, from).await?;
            return Ok(());
        }
    }

    let method = *request.get_method();
    let path = request.get_path();
    log::info!("{from} - {method:?} /{path}");

    let reply = resource::dispatch(registry, store, method, &path, &request.message.payload).await;
    log::debug!("{from} - {method:?} /{path} -> {:?}", reply.status);

    response.set_status(reply.status);
    response.message.payload = reply.payload;
    if let Some(format) = reply.content_format {
        response.message.set_content_format(format);
    }

    let bytes = match response.message.to_bytes() {
        Ok(bytes) => bytes,
        Err(e) => {
            exchanges.forget(&key).await;
            return Err(e.into());
        }
    };
    exchanges.complete(key, bytes.clone()).await;
    socket.send_to(&bytes, from).await?;
    Ok(())
}
