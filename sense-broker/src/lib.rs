//! The `sense-broker` crate carries device registration notifications from
//! the HTTP-facing process to the device-facing process. The two processes
//! share no memory, so whenever a device is created the management side
//! publishes its uuid and every subscriber learns about it immediately.
//!
//! Delivery is at-most-once and best-effort: a subscriber that is not
//! listening at publish time never sees the message, which is why the
//! device-facing process also bulk loads every device from storage at start.
//!
//! The crate provides:
//! 1. The [`RegistrationChannel`] trait, the publish/subscribe seam.
//! 2. [`NatsChannel`], the production implementation over core NATS
//!    subjects (one subject per [`Channel`]).
//! 3. [`LocalChannel`], an in-process implementation over a tokio
//!    broadcast channel, used by tests and single host setups.
//! 4. [`Subscription`], the long-lived listener task which resubscribes
//!    with back-off whenever the underlying stream ends, until cancelled.
//!
//! # Examples
//! ```no_run
//! use std::sync::Arc;
//! use sense_broker::{Channel, NatsChannel, RegistrationChannel, Subscription};
//!
//! # async fn run() -> Result<(), sense_broker::ChannelError> {
//! let nats = Arc::new(NatsChannel::new("nats://localhost:4222"));
//! nats.connect().await?;
//!
//! let sub = Subscription::spawn(nats.clone(), Channel::DeviceRegistration, |uuid| {
//!     log::info!("New device {uuid}");
//! })
//! .await?;
//!
//! nats.publish(Channel::DeviceRegistration, "0b5c4d3e-...").await?;
//! sub.cancel().await;
//! nats.close().await
//! # }
//! ```

mod channel;
mod local;
mod nats;
mod subscription;

pub use channel::{Channel, ChannelError, RegistrationChannel};
pub use local::LocalChannel;
pub use nats::NatsChannel;
pub use subscription::{Subscription, RESUBSCRIBE_BACKOFF};
