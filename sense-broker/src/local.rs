use futures::{stream::BoxStream, StreamExt};
use tokio::sync::{broadcast, Mutex};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};

use crate::{Channel, ChannelError, RegistrationChannel};

const LOCAL_CHANNEL_CAPACITY: usize = 64;

/// In-process [`RegistrationChannel`] backed by a tokio broadcast channel.
/// Every clone of a process-wide `Arc<LocalChannel>` sees the same traffic.
#[derive(Default)]
pub struct LocalChannel {
    sender: Mutex<Option<broadcast::Sender<(Channel, String)>>>,
}

impl LocalChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn connect(&self) -> Result<(), ChannelError> {
        let mut sender = self.sender.lock().await;
        if sender.is_none() {
            let (tx, _) = broadcast::channel(LOCAL_CHANNEL_CAPACITY);
            *sender = Some(tx);
        }
        Ok(())
    }

    pub async fn close(&self) -> Result<(), ChannelError> {
        self.sender.lock().await.take();
        Ok(())
    }

    /// Ends every open subscription stream while staying connected, the
    /// same thing a subscriber sees when its broker connection drops
    pub async fn sever(&self) -> Result<(), ChannelError> {
        let mut sender = self.sender.lock().await;
        if sender.is_none() {
            return Err(ChannelError::NotInitialised);
        }
        let (tx, _) = broadcast::channel(LOCAL_CHANNEL_CAPACITY);
        *sender = Some(tx);
        Ok(())
    }

    async fn sender(&self) -> Result<broadcast::Sender<(Channel, String)>, ChannelError> {
        self.sender
            .lock()
            .await
            .clone()
            .ok_or(ChannelError::NotInitialised)
    }
}

#[async_trait::async_trait]
impl RegistrationChannel for LocalChannel {
    async fn publish(&self, channel: Channel, message: &str) -> Result<(), ChannelError> {
        let sender = self.sender().await?;
        if sender.send((channel, message.to_string())).is_err() {
            log::debug!("No subscribers on {channel}, dropping message");
        }
        Ok(())
    }

    async fn subscribe(&self, channel: Channel) -> Result<BoxStream<'static, String>, ChannelError> {
        let receiver = self.sender().await?.subscribe();

        Ok(BroadcastStream::new(receiver)
            .filter_map(move |item| async move {
                match item {
                    Ok((topic, message)) if topic == channel => Some(message),
                    Ok(_) => None,
                    Err(BroadcastStreamRecvError::Lagged(n)) => {
                        log::warn!("Subscriber on {channel} lagged, {n} messages lost");
                        None
                    }
                }
            })
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn publish_reaches_every_subscriber() {
        let local = LocalChannel::new();
        local.connect().await.unwrap();

        let mut first = local.subscribe(Channel::DeviceRegistration).await.unwrap();
        let mut second = local.subscribe(Channel::DeviceRegistration).await.unwrap();

        local
            .publish(Channel::DeviceRegistration, "device-a")
            .await
            .unwrap();

        assert_eq!(first.next().await.as_deref(), Some("device-a"));
        assert_eq!(second.next().await.as_deref(), Some("device-a"));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_ok() {
        let local = LocalChannel::new();
        local.connect().await.unwrap();
        assert!(local
            .publish(Channel::DeviceRegistration, "nobody")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn handle_is_not_initialised_before_connect_and_after_close() {
        let local = LocalChannel::new();
        assert!(matches!(
            local.publish(Channel::DeviceRegistration, "x").await,
            Err(ChannelError::NotInitialised)
        ));

        local.connect().await.unwrap();
        local.close().await.unwrap();
        assert!(matches!(
            local.subscribe(Channel::DeviceRegistration).await,
            Err(ChannelError::NotInitialised)
        ));
    }

    #[tokio::test]
    async fn sever_ends_open_streams() {
        let local = LocalChannel::new();
        local.connect().await.unwrap();
        let mut stream = local.subscribe(Channel::DeviceRegistration).await.unwrap();

        local.sever().await.unwrap();

        let end = timeout(Duration::from_secs(1), stream.next()).await.unwrap();
        assert_eq!(end, None);
    }
}
