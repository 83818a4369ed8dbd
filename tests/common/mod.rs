//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use kv_gateway::config::{AuthorizationMode, GatewayConfig};
use kv_gateway::{ConnectionPool, HttpServer, Shutdown, TcpConnector};

/// A mock key-value backend speaking the inline text protocol.
pub struct MockKvBackend {
    pub addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
}

impl MockKvBackend {
    /// Connections accepted so far.
    #[allow(dead_code)]
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

/// Start a mock backend on an ephemeral port.
///
/// Understands `AUTH`, `SELECT`, `PING` and `QUIT`. When `password` is set,
/// `PING` is refused until the client has authenticated.
pub async fn start_mock_kv_backend(password: Option<&'static str>) -> MockKvBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));

    let counter = accepted.clone();
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(serve_connection(socket, password));
                }
                Err(_) => break,
            }
        }
    });

    MockKvBackend { addr, accepted }
}

/// Start a backend that accepts connections and never answers.
#[allow(dead_code)]
pub async fn start_silent_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    addr
}

async fn serve_connection(socket: tokio::net::TcpStream, password: Option<&'static str>) {
    let (read, mut write) = socket.into_split();
    let mut lines = BufReader::new(read).lines();
    let mut authenticated = password.is_none();

    while let Ok(Some(line)) = lines.next_line().await {
        let mut parts = line.split_whitespace();
        let reply = match (parts.next().map(str::to_ascii_uppercase).as_deref(), parts.next()) {
            (Some("AUTH"), Some(given)) if Some(given) == password => {
                authenticated = true;
                "+OK"
            }
            (Some("AUTH"), _) => "-WRONGPASS invalid password",
            (Some(_), _) if !authenticated => "-NOAUTH Authentication required",
            (Some("SELECT"), Some(_)) => "+OK",
            (Some("PING"), _) => "+PONG",
            (Some("QUIT"), _) => {
                let _ = write.write_all(b"+OK\r\n").await;
                return;
            }
            _ => "-ERR unknown command",
        };
        if write.write_all(format!("{reply}\r\n").as_bytes()).await.is_err() {
            return;
        }
    }
}

/// Gateway configuration pointing at `backend`, with fast pool timeouts.
#[allow(dead_code)]
pub fn gateway_config(backend: SocketAddr, mode: AuthorizationMode) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.authorization.mode = mode;
    config.pool.host = backend.ip().to_string();
    config.pool.port = backend.port();
    config.pool.max_total = 2;
    config.pool.max_idle = 1;
    config.pool.max_wait_ms = 50;
    config.pool.maintenance_interval_ms = 0;
    config
}

/// A gateway running on an ephemeral port.
#[allow(dead_code)]
pub struct RunningGateway {
    pub addr: SocketAddr,
    pub pool: ConnectionPool<TcpConnector>,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<()>,
}

#[allow(dead_code)]
impl RunningGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Start the full HTTP gateway for `config`.
#[allow(dead_code)]
pub async fn start_gateway(config: GatewayConfig) -> RunningGateway {
    let pool = ConnectionPool::new(config.pool.clone(), TcpConnector::from_config(&config.pool));
    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();

    let server = HttpServer::new(config, pool.clone());
    let signal = shutdown.clone();
    let handle = tokio::spawn(async move {
        server.run(listener, signal).await.unwrap();
    });

    RunningGateway {
        addr,
        pool,
        shutdown,
        handle,
    }
}
