//! Async client built on tokio.
//!
//! Split architecture: `AsyncClient` (cloneable) + `EventLoop` (owns the
//! socket and the [`Connection`] engine).
//!
//! ```ignore
//! let (client, mut eventloop) = AsyncClient::new(config, 10)?;
//!
//! tokio::spawn(async move {
//!     client.subscribe("sensors/#", QoS::AtLeastOnce, None).await?;
//!     client.publish("sensors/temp", "21.5", PublishOptions::new(), None).await
//! });
//!
//! while let Ok(event) = eventloop.poll().await {
//!     if let Event::Publish { topic, payload, .. } = event {
//!         println!("{:?}: {:?}", topic, payload);
//!     }
//! }
//! ```

use std::time::Instant;

use bytes::Bytes;
use mqisdp_core::QoS;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};

use crate::config::{ClientConfig, PublishOptions};
use crate::connection::Connection;
use crate::error::{ClientError, Result};
use crate::events::{Callback, ConnectionState, Event, Notify};

const READ_BUFFER_SIZE: usize = 4096;

/// Commands sent from AsyncClient to EventLoop.
enum Command {
    Publish {
        topic: Bytes,
        payload: Bytes,
        options: PublishOptions,
        callback: Option<Callback>,
        resp: oneshot::Sender<Result<Option<u16>>>,
    },
    Subscribe {
        topic: Bytes,
        qos: QoS,
        callback: Option<Callback>,
        resp: oneshot::Sender<Result<u16>>,
    },
    Unsubscribe {
        topic: Bytes,
        callback: Option<Callback>,
        resp: oneshot::Sender<Result<u16>>,
    },
    Ping {
        on_pong: Option<Notify>,
        resp: oneshot::Sender<Result<()>>,
    },
    Disconnect {
        on_closed: Option<Notify>,
        resp: oneshot::Sender<Result<()>>,
    },
}

/// Async client handle.
///
/// `Clone` and shareable across tasks. Every call is answered by the
/// `EventLoop`, so one task must keep polling it.
#[derive(Clone)]
pub struct AsyncClient {
    tx: mpsc::Sender<Command>,
}

impl AsyncClient {
    /// Create a new client and eventloop pair.
    ///
    /// `cap` is the command channel capacity (10 is usually fine).
    pub fn new(config: ClientConfig, cap: usize) -> Result<(Self, EventLoop)> {
        let connection = Connection::new(config.options.clone())?;
        let (tx, rx) = mpsc::channel(cap);
        let eventloop = EventLoop {
            config,
            rx,
            rx_closed: false,
            stream: None,
            connection,
            on_connected: None,
        };
        Ok((Self { tx }, eventloop))
    }

    /// Publish a message.
    ///
    /// Returns the message id for QoS 1 and 2. `callback` runs once the
    /// broker completes the exchange.
    pub async fn publish(
        &self,
        topic: impl Into<Bytes>,
        payload: impl Into<Bytes>,
        options: PublishOptions,
        callback: Option<Callback>,
    ) -> Result<Option<u16>> {
        let topic = topic.into();
        let payload = payload.into();
        self.request(|resp| Command::Publish {
            topic,
            payload,
            options,
            callback,
            resp,
        })
        .await
    }

    /// Subscribe to one topic filter.
    pub async fn subscribe(
        &self,
        topic: impl Into<Bytes>,
        qos: QoS,
        callback: Option<Callback>,
    ) -> Result<u16> {
        let topic = topic.into();
        self.request(|resp| Command::Subscribe {
            topic,
            qos,
            callback,
            resp,
        })
        .await
    }

    /// Unsubscribe from one topic filter.
    pub async fn unsubscribe(&self, topic: impl Into<Bytes>, callback: Option<Callback>) -> Result<u16> {
        let topic = topic.into();
        self.request(|resp| Command::Unsubscribe {
            topic,
            callback,
            resp,
        })
        .await
    }

    /// Send PINGREQ now instead of waiting for the keep-alive timer.
    pub async fn ping(&self, on_pong: Option<Notify>) -> Result<()> {
        self.request(|resp| Command::Ping { on_pong, resp }).await
    }

    /// Send DISCONNECT and close the socket.
    pub async fn disconnect(&self, on_closed: Option<Notify>) -> Result<()> {
        self.request(|resp| Command::Disconnect { on_closed, resp })
            .await
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<T>>) -> Command,
    ) -> Result<T> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.tx
            .send(command(resp_tx))
            .await
            .map_err(|_| ClientError::ConnectionClosed)?;

        resp_rx.await.map_err(|_| ClientError::ConnectionClosed)?
    }
}

/// The event loop that drives socket I/O and timers.
///
/// You must call `poll()` repeatedly.
pub struct EventLoop {
    config: ClientConfig,
    rx: mpsc::Receiver<Command>,
    /// Every `AsyncClient` was dropped.
    rx_closed: bool,
    stream: Option<TcpStream>,
    connection: Connection,
    /// Handed to the engine with CONNECT.
    on_connected: Option<Notify>,
}

impl EventLoop {
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Run `callback` once CONNACK accepts the session, just before
    /// [`Event::Connected`] is returned. Set it before the first `poll()`.
    pub fn on_connected(mut self, callback: Notify) -> Self {
        self.on_connected = Some(callback);
        self
    }

    /// Poll for the next event.
    ///
    /// Connects on first use. Once the connection has closed and every
    /// event has been returned, yields `Err(ClientError::ConnectionClosed)`.
    pub async fn poll(&mut self) -> Result<Event> {
        let mut buf = [0u8; READ_BUFFER_SIZE];

        loop {
            if let Some(event) = self.connection.next_event() {
                return Ok(event);
            }
            if self.connection.state() == ConnectionState::Closed {
                return Err(ClientError::ConnectionClosed);
            }
            if self.stream.is_none() {
                self.connect().await?;
            }

            self.flush().await;
            if self.connection.state() == ConnectionState::Closed {
                continue;
            }

            enum Action {
                Read(std::io::Result<usize>),
                Command(Option<Command>),
                Timeout,
            }

            let deadline = self.connection.next_timeout();
            let action = {
                let Some(stream) = self.stream.as_mut() else {
                    continue;
                };
                tokio::select! {
                    result = stream.read(&mut buf) => Action::Read(result),
                    cmd = self.rx.recv(), if !self.rx_closed => Action::Command(cmd),
                    _ = sleep_until(deadline) => Action::Timeout,
                }
            };

            let now = Instant::now();
            match action {
                Action::Read(Ok(0)) => {
                    log::info!("server closed the connection");
                    self.stream = None;
                    self.connection.handle_close();
                }
                Action::Read(Ok(n)) => self.connection.handle_incoming(&buf[..n], now),
                Action::Read(Err(e)) => {
                    self.stream = None;
                    self.connection.handle_transport_error(e);
                }
                Action::Command(Some(cmd)) => self.handle_command(cmd, now).await,
                Action::Command(None) => {
                    // Client handles dropped - clean disconnect
                    self.rx_closed = true;
                    self.connection.disconnect(None);
                    self.shutdown().await;
                }
                Action::Timeout => self.connection.handle_timeout(now),
            }
        }
    }

    async fn connect(&mut self) -> Result<()> {
        let address = (self.config.host.as_str(), self.config.port);
        let stream = tokio::time::timeout(self.config.connect_timeout(), TcpStream::connect(address))
            .await
            .map_err(|_| ClientError::ConnectionTimeout)??;
        stream.set_nodelay(true)?;

        log::info!(
            "connected to {}:{}",
            self.config.host,
            self.config.port
        );
        self.stream = Some(stream);
        self.connection.connect(self.on_connected.take())
    }

    async fn handle_command(&mut self, cmd: Command, now: Instant) {
        match cmd {
            Command::Publish {
                topic,
                payload,
                options,
                callback,
                resp,
            } => {
                let result = self.connection.publish(topic, payload, options, callback);
                let _ = resp.send(result);
            }
            Command::Subscribe {
                topic,
                qos,
                callback,
                resp,
            } => {
                let result = self.connection.subscribe(topic, qos, callback);
                let _ = resp.send(result);
            }
            Command::Unsubscribe {
                topic,
                callback,
                resp,
            } => {
                let result = self.connection.unsubscribe(topic, callback);
                let _ = resp.send(result);
            }
            Command::Ping { on_pong, resp } => {
                let result = self.connection.ping(now, on_pong);
                let _ = resp.send(result);
            }
            Command::Disconnect { on_closed, resp } => {
                self.connection.disconnect(on_closed);
                let _ = resp.send(Ok(()));
                self.shutdown().await;
            }
        }
    }

    /// Write whatever the engine queued. A failed write ends the connection.
    async fn flush(&mut self) {
        if !self.connection.has_outgoing() {
            return;
        }
        let Some(stream) = self.stream.as_mut() else {
            return;
        };
        let bytes = self.connection.take_outgoing();
        if let Err(e) = stream.write_all(&bytes).await {
            self.stream = None;
            self.connection.handle_transport_error(e);
        }
    }

    /// Flush, close the socket and finish the connection.
    async fn shutdown(&mut self) {
        self.flush().await;
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                log::debug!("socket shutdown failed: {}", e);
            }
        }
        self.connection.handle_close();
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => {
            tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await
        }
        None => std::future::pending().await,
    }
}
