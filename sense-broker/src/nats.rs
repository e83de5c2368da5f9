use futures::{stream::BoxStream, StreamExt};
use tokio::{sync::Mutex, time::Duration};

use crate::{Channel, ChannelError, RegistrationChannel};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// [`RegistrationChannel`] over core NATS publish/subscribe. The subject
/// is the channel name.
pub struct NatsChannel {
    url: String,
    client: Mutex<Option<async_nats::Client>>,
}

impl NatsChannel {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            client: Mutex::new(None),
        }
    }

    pub async fn connect(&self) -> Result<(), ChannelError> {
        log::info!("Connecting to NATS at {}", self.url);
        let client = async_nats::ConnectOptions::new()
            .connection_timeout(CONNECT_TIMEOUT)
            .connect(self.url.as_str())
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;

        *self.client.lock().await = Some(client);
        Ok(())
    }

    /// Flush anything still buffered and drop the connection. Further use
    /// of the handle fails with [`ChannelError::NotInitialised`].
    pub async fn close(&self) -> Result<(), ChannelError> {
        let Some(client) = self.client.lock().await.take() else {
            return Ok(());
        };
        log::info!("Closing NATS connection");
        client
            .flush()
            .await
            .map_err(|e| ChannelError::Flush(e.to_string()))
    }

    async fn client(&self) -> Result<async_nats::Client, ChannelError> {
        self.client
            .lock()
            .await
            .clone()
            .ok_or(ChannelError::NotInitialised)
    }
}

#[async_trait::async_trait]
impl RegistrationChannel for NatsChannel {
    async fn publish(&self, channel: Channel, message: &str) -> Result<(), ChannelError> {
        self.client()
            .await?
            .publish(channel.name().to_string(), message.to_string().into())
            .await
            .map_err(|e| ChannelError::Publish(e.to_string()))
    }

    async fn subscribe(&self, channel: Channel) -> Result<BoxStream<'static, String>, ChannelError> {
        let subscriber = self
            .client()
            .await?
            .subscribe(channel.name().to_string())
            .await
            .map_err(|e| ChannelError::Subscribe(e.to_string()))?;

        Ok(subscriber
            .map(|msg| String::from_utf8_lossy(&msg.payload).into_owned())
            .boxed())
    }
}
