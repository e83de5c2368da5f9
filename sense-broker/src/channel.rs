use futures::stream::BoxStream;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Channel is not initialised")]
    NotInitialised,
    #[error("NATS connect Error {0}")]
    Connect(String),
    #[error("NATS publish Error {0}")]
    Publish(String),
    #[error("NATS subscribe Error {0}")]
    Subscribe(String),
    #[error("NATS flush Error {0}")]
    Flush(String),
}

/// Logical channel names. Only device registration exists today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    DeviceRegistration,
}

impl Channel {
    pub fn name(&self) -> &'static str {
        match self {
            Channel::DeviceRegistration => "reg",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Publish/subscribe over named [`Channel`]s. Messages are plain text.
#[async_trait::async_trait]
pub trait RegistrationChannel: Send + Sync {
    /// Broadcast `message` to everyone currently subscribed to `channel`.
    /// Having no subscribers is not an error.
    async fn publish(&self, channel: Channel, message: &str) -> Result<(), ChannelError>;

    /// Stream of every message published on `channel` from now on. The
    /// stream ends when the underlying connection is lost.
    async fn subscribe(&self, channel: Channel) -> Result<BoxStream<'static, String>, ChannelError>;
}
