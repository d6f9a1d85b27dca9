//! mqisdp-client - MQTT v3.1 (MQIsdp) client.
//!
//! [`Connection`] is the sans-I/O protocol engine: connection state, message
//! ids, acknowledgement tracking and keep-alive. [`AsyncClient`] and
//! [`EventLoop`] drive it over a tokio TCP stream.
//!
//! # Example
//!
//! ```ignore
//! use mqisdp_client::{AsyncClient, ClientConfig, ConnectOptions, Event, PublishOptions, QoS};
//!
//! let config = ClientConfig::new("localhost", 1883)
//!     .options(ConnectOptions::new().client_id("sensor-1").keep_alive(30));
//! let (client, mut eventloop) = AsyncClient::new(config, 10)?;
//!
//! tokio::spawn(async move {
//!     let options = PublishOptions::new().qos(QoS::ExactlyOnce);
//!     client.publish("sensors/temp", "21.5", options, None).await
//! });
//!
//! while let Ok(event) = eventloop.poll().await {
//!     println!("{:?}", event);
//! }
//! ```

mod async_client;
mod config;
mod connection;
mod error;
mod events;
mod inflight;
mod packet_id;

pub use async_client::{AsyncClient, EventLoop};
pub use config::{ClientConfig, ConfigError, ConnectOptions, PublishOptions, Will};
pub use connection::Connection;
pub use error::{ClientError, Result};
pub use events::{Callback, Completion, ConnectionState, Event, Notify};

// Re-export useful types from core
pub use mqisdp_core::{ConnackCode, QoS};
