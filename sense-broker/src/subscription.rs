use futures::{stream::BoxStream, StreamExt};
use std::sync::Arc;
use tokio::{sync::oneshot, task::JoinHandle, time::Duration};

use crate::{Channel, ChannelError, RegistrationChannel};

/// Initial delay before resubscribing after the stream ends; doubles on
/// every failed attempt up to [`MAX_BACKOFF`]
pub const RESUBSCRIBE_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Background listener on one [`Channel`]. Runs the callback for every
/// message until [`Subscription::cancel`] is called.
pub struct Subscription {
    channel: Channel,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Subscribe to `topic` and start the listener task. The first
    /// subscription happens before returning, so a message published after
    /// this resolves is guaranteed a listener.
    pub async fn spawn<F>(
        channel: Arc<dyn RegistrationChannel>,
        topic: Channel,
        on_message: F,
    ) -> Result<Self, ChannelError>
    where
        F: FnMut(String) + Send + 'static,
    {
        Self::spawn_with_backoff(channel, topic, RESUBSCRIBE_BACKOFF, on_message).await
    }

    pub async fn spawn_with_backoff<F>(
        channel: Arc<dyn RegistrationChannel>,
        topic: Channel,
        backoff: Duration,
        mut on_message: F,
    ) -> Result<Self, ChannelError>
    where
        F: FnMut(String) + Send + 'static,
    {
        let first = channel.subscribe(topic).await?;
        log::info!("Subscribed to channel {topic}");

        let (shutdown, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut stream: Option<BoxStream<'static, String>> = Some(first);
            let mut delay = backoff;

            loop {
                let mut messages = match stream.take() {
                    Some(s) => s,
                    None => match channel.subscribe(topic).await {
                        Ok(s) => {
                            log::info!("Resubscribed to channel {topic}");
                            delay = backoff;
                            s
                        }
                        Err(e) => {
                            log::warn!("Resubscribe to {topic} failed: {e}, retrying in {delay:?}");
                            tokio::select! {
                                _ = &mut shutdown_rx => return,
                                _ = tokio::time::sleep(delay) => {}
                            }
                            delay = (delay * 2).min(MAX_BACKOFF);
                            continue;
                        }
                    },
                };

                loop {
                    tokio::select! {
                        _ = &mut shutdown_rx => {
                            log::debug!("Listener on {topic} cancelled");
                            return;
                        }
                        next = messages.next() => match next {
                            Some(message) => on_message(message),
                            None => break,
                        }
                    }
                }

                log::warn!("Subscription to {topic} dropped, resubscribing in {delay:?}");
                tokio::select! {
                    _ = &mut shutdown_rx => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        });

        Ok(Self {
            channel: topic,
            shutdown: Some(shutdown),
            task,
        })
    }

    /// Stop listening and wait for the listener task to finish
    pub async fn cancel(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            shutdown.send(()).ok();
        }
        if let Err(e) = (&mut self.task).await {
            log::error!("Listener on {} ended abnormally: {e}", self.channel);
        }
        log::info!("Unsubscribed from channel {}", self.channel);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
