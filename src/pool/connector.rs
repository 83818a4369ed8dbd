//! Backend connection establishment.
//!
//! # Responsibilities
//! - Open one TCP connection to the key-value backend within the connect timeout
//! - Run the credential handshake (`AUTH`, then `SELECT` for a non-zero database)
//! - Check liveness with `PING`
//!
//! # Design Decisions
//! - The pool only sees the [`Connector`] trait; tests plug in in-memory connectors
//! - Commands use the inline form (`CMD arg\r\n`) and only status/error
//!   replies are understood; data commands are left to callers
//! - Any I/O failure, timeout or cancelled command marks the connection
//!   broken so the pool destroys it on release

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time;

use crate::config::PoolConfig;
use crate::pool::error::BackendError;

/// Creates, checks and vets connections for a pool.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Connection: Send + 'static;

    /// Open and authenticate a new connection.
    async fn connect(&self) -> Result<Self::Connection, BackendError>;

    /// Liveness check run before reuse and during maintenance.
    async fn is_valid(&self, conn: &mut Self::Connection) -> bool;

    /// Cheap synchronous check run on release.
    fn has_broken(&self, conn: &mut Self::Connection) -> bool;

    /// Human-readable target for logs.
    fn endpoint(&self) -> String;
}

/// Where and how to connect.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub database: u32,
    pub timeout: Duration,
}

impl Endpoint {
    pub fn from_config(config: &PoolConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            password: config.password.clone(),
            database: config.database,
            timeout: config.connect_timeout(),
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Connector for a TCP key-value backend.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    endpoint: Endpoint,
}

impl TcpConnector {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }

    pub fn from_config(config: &PoolConfig) -> Self {
        Self::new(Endpoint::from_config(config))
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Connection = KvConnection;

    async fn connect(&self) -> Result<KvConnection, BackendError> {
        let addr = self.endpoint.address();
        let stream = time::timeout(self.endpoint.timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| BackendError::Timeout(self.endpoint.timeout))?
            .map_err(|source| BackendError::Connect {
                addr: addr.clone(),
                source,
            })?;
        stream.set_nodelay(true)?;

        let mut conn = KvConnection::new(stream, self.endpoint.timeout)?;

        if let Some(password) = &self.endpoint.password {
            conn.expect_ok(&format!("AUTH {password}")).await?;
        }
        if self.endpoint.database != 0 {
            conn.expect_ok(&format!("SELECT {}", self.endpoint.database))
                .await?;
        }

        tracing::debug!(addr = %addr, local = %conn.local_addr, "Backend connection established");
        Ok(conn)
    }

    async fn is_valid(&self, conn: &mut KvConnection) -> bool {
        match conn.ping().await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(addr = %conn.peer_addr, error = %e, "Liveness check failed");
                false
            }
        }
    }

    fn has_broken(&self, conn: &mut KvConnection) -> bool {
        conn.is_broken()
    }

    fn endpoint(&self) -> String {
        self.endpoint.address()
    }
}

/// One live connection to the backend.
#[derive(Debug)]
pub struct KvConnection {
    stream: BufReader<TcpStream>,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
    io_timeout: Duration,
    broken: bool,
}

impl KvConnection {
    fn new(stream: TcpStream, io_timeout: Duration) -> Result<Self, BackendError> {
        Ok(Self {
            peer_addr: stream.peer_addr()?,
            local_addr: stream.local_addr()?,
            stream: BufReader::new(stream),
            io_timeout,
            broken: false,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Set after any I/O failure; a broken connection is never reused.
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Send one inline command and return its status reply without the `+`.
    ///
    /// The connection counts as broken while the command is in flight, so a
    /// caller cancelled mid-command never hands a desynchronized stream back
    /// to the pool.
    pub async fn command(&mut self, line: &str) -> Result<String, BackendError> {
        self.broken = true;
        let result = match time::timeout(self.io_timeout, self.round_trip(line)).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout(self.io_timeout)),
        };
        self.broken = !matches!(&result, Ok(_) | Err(BackendError::Rejected(_)));
        result
    }

    pub async fn ping(&mut self) -> Result<(), BackendError> {
        match self.command("PING").await?.as_str() {
            "PONG" => Ok(()),
            other => Err(BackendError::UnexpectedReply(other.to_string())),
        }
    }

    async fn expect_ok(&mut self, line: &str) -> Result<(), BackendError> {
        match self.command(line).await?.as_str() {
            "OK" => Ok(()),
            other => Err(BackendError::UnexpectedReply(other.to_string())),
        }
    }

    async fn round_trip(&mut self, line: &str) -> Result<String, BackendError> {
        let stream = self.stream.get_mut();
        stream.write_all(line.as_bytes()).await?;
        stream.write_all(b"\r\n").await?;
        stream.flush().await?;

        let mut reply = String::new();
        if self.stream.read_line(&mut reply).await? == 0 {
            return Err(BackendError::Disconnected);
        }
        let reply = reply.trim_end_matches(['\r', '\n']);

        if let Some(status) = reply.strip_prefix('+') {
            Ok(status.to_string())
        } else if let Some(err) = reply.strip_prefix('-') {
            Err(BackendError::Rejected(err.to_string()))
        } else {
            Err(BackendError::UnexpectedReply(reply.to_string()))
        }
    }
}
