//! TCP RPC server for the hardware control service.
//!
//! # Architecture
//!
//! ```text
//! Touch UI ─────┐
//!               │
//! Scheduler ────┼──> RpcServer ──> one task per connection ──> HardwareControlService
//!               │        │
//! Calibration ──┘        └──> ServerCodec (length-delimited JSON)
//! ```
//!
//! Every connection is served by its own task, so calls from different
//! clients run concurrently; calls on one connection are answered in
//! order. The service is shared behind an `Arc` and does its own locking.
//!
//! # Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use tidepool_core::config::HardwareConfig;
//! use tidepool_hardware::HardwareControlService;
//! use tidepool_network::{RpcServer, RpcServerConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = Arc::new(HardwareControlService::from_config(&HardwareConfig::default()).await?);
//! let server = RpcServer::bind(RpcServerConfig::default(), service).await?;
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tidepool_core::{
    Error, LightColor, LightId, RelayChannel, Result, StepperCommand,
    config::ServerConfig,
    constants::DEFAULT_MAX_CONNECTIONS,
};
use tidepool_hardware::HardwareControlService;
use tidepool_protocol::{LightState, RelayState, Reply, Request, Response, ServerCodec};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tracing::{debug, error, info, trace, warn};

/// Configuration for the RPC server
///
/// # Example
///
/// ```
/// use tidepool_network::RpcServerConfig;
///
/// let config = RpcServerConfig {
///     bind_addr: "0.0.0.0:50051".parse().unwrap(),
///     max_connections: 4,
/// };
/// ```
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    /// Address to bind the server to
    pub bind_addr: SocketAddr,

    /// Maximum number of simultaneous connections
    pub max_connections: usize,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 50051)),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl TryFrom<&ServerConfig> for RpcServerConfig {
    type Error = RpcServerError;

    fn try_from(config: &ServerConfig) -> std::result::Result<Self, Self::Error> {
        let bind_addr = config
            .bind_addr
            .parse()
            .map_err(|_| RpcServerError::InvalidAddress(config.bind_addr.clone()))?;
        Ok(Self {
            bind_addr,
            max_connections: config.max_connections,
        })
    }
}

/// Errors that can occur while running the RPC server
#[derive(Debug, Error)]
pub enum RpcServerError {
    /// Failed to bind to address
    #[error("Failed to bind to {0}")]
    BindFailed(SocketAddr),

    /// Bind address could not be parsed
    #[error("Invalid bind address: {0}")]
    InvalidAddress(String),

    /// Low-level I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Accepts connections and serves RPC calls against one service instance.
pub struct RpcServer {
    listener: TcpListener,
    service: Arc<HardwareControlService>,
    config: RpcServerConfig,
    active: Arc<AtomicUsize>,
}

impl RpcServer {
    /// Bind the server to the configured address.
    ///
    /// # Errors
    ///
    /// Returns [`RpcServerError::BindFailed`] if the address is in use or
    /// not permitted.
    pub async fn bind(
        config: RpcServerConfig,
        service: Arc<HardwareControlService>,
    ) -> std::result::Result<Self, RpcServerError> {
        info!("Binding RPC server to {}", config.bind_addr);

        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|_| RpcServerError::BindFailed(config.bind_addr))?;

        info!(
            "RPC server listening on {} (max {} connections)",
            listener.local_addr()?,
            config.max_connections
        );

        Ok(Self {
            listener,
            service,
            config,
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Address actually bound, useful when binding port 0.
    pub fn local_addr(&self) -> std::result::Result<SocketAddr, RpcServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Number of connections currently being served.
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Accept connections until the listener fails.
    ///
    /// Connections beyond `max_connections` are closed immediately.
    pub async fn run(self) -> std::result::Result<(), RpcServerError> {
        loop {
            let (stream, addr) = self.listener.accept().await?;
            debug!("Accepted new connection from {}", addr);

            let current = self.active.load(Ordering::SeqCst);
            if current >= self.config.max_connections {
                error!(
                    addr = %addr,
                    max_connections = self.config.max_connections,
                    current_connections = current,
                    "Connection rejected: maximum connections reached"
                );
                drop(stream);
                continue;
            }

            if let Err(e) = stream.set_nodelay(true) {
                warn!("Failed to set TCP_NODELAY for {}: {}", addr, e);
            }

            let guard = ConnectionGuard::new(Arc::clone(&self.active));
            let service = Arc::clone(&self.service);
            tokio::spawn(async move {
                info!(%addr, connections = guard.count(), "Client connected");
                serve_connection(stream, addr, &service).await;
                drop(guard);
                info!(%addr, "Client disconnected");
            });
        }
    }
}

/// Counts a live connection until dropped.
struct ConnectionGuard {
    active: Arc<AtomicUsize>,
}

impl ConnectionGuard {
    fn new(active: Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        Self { active }
    }

    fn count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn serve_connection(stream: TcpStream, addr: SocketAddr, service: &HardwareControlService) {
    let mut framed = Framed::new(stream, ServerCodec::new());

    while let Some(frame) = framed.next().await {
        let reply = match frame {
            Ok(request) => handle_request(service, request).await,
            Err(e) => {
                // The decoder cannot resynchronize after a bad frame.
                warn!(%addr, error = %e, "Undecodable request, closing connection");
                let _ = framed.send(Reply::error(&e)).await;
                return;
            }
        };

        if let Err(e) = framed.send(reply).await {
            error!(%addr, error = %e, "Failed to send reply (connection closed)");
            return;
        }
    }
}

/// Execute one request against the service and build its reply.
pub async fn handle_request(service: &HardwareControlService, request: Request) -> Reply {
    let method = request.method();
    trace!(method, ?request, "Handling request");

    let result = dispatch(service, request).await;
    match &result {
        Ok(_) => debug!(method, "Request served"),
        Err(e) => info!(method, code = %e.status_code(), error = %e, "Request failed"),
    }
    Reply::from(result)
}

async fn dispatch(service: &HardwareControlService, request: Request) -> Result<Response> {
    match request {
        Request::Echo { payload } => Ok(Response::Echo { payback: payload }),
        Request::SetRelayState { channel, engaged } => {
            service.set_relay(RelayChannel::new(channel)?, engaged)?;
            Ok(Response::Empty)
        }
        Request::GetRelayStates => {
            let states = service
                .relay_states()
                .into_iter()
                .map(|(channel, engaged)| RelayState {
                    channel: channel.as_u8(),
                    engaged,
                })
                .collect();
            Ok(Response::RelayStates { states })
        }
        Request::SetLightColor {
            light_id,
            color,
            scope,
        } => {
            let id = LightId::new(light_id)?;
            let color = LightColor::try_from(color)?;
            service.set_light_color(id, color, &scope)?;
            Ok(Response::Empty)
        }
        Request::GetLightColors => {
            let states = service
                .light_colors()
                .into_iter()
                .enumerate()
                .map(|(i, color)| LightState {
                    light_id: LightId::from_index(i).as_u8(),
                    color,
                })
                .collect();
            Ok(Response::LightColors { states })
        }
        Request::GetTemperature => Ok(Response::Temperature {
            reading: service.temperature(),
        }),
        Request::GetPh => Ok(Response::Ph {
            reading: service.ph(),
        }),
        Request::MoveStepper {
            steps,
            reverse,
            mode,
        } => {
            let command = StepperCommand::new(steps, reverse)?.with_mode(mode);
            service.move_stepper(command)?;
            Ok(Response::Empty)
        }
        Request::StopStepper => {
            service.stop_stepper();
            Ok(Response::Empty)
        }
        Request::IsStepperActive => Ok(Response::StepperState {
            active: service.is_stepper_active(),
        }),
        Request::SetScope { scope } => {
            service.set_scope(scope)?;
            Ok(Response::Empty)
        }
        Request::SetPhSampleTime { ms } => {
            service.set_ph_sample_time(ms);
            Ok(Response::Empty)
        }
        Request::GetPhSampleTime => Ok(Response::PhSampleTime {
            ms: u64::try_from(service.ph_sample_time().as_millis())
                .map_err(|_| Error::Hardware("pH sample time out of range".into()))?,
        }),
        Request::SendPhCommand { command } => Ok(Response::PhCommand {
            response: service.send_ph_command(&command).await?,
        }),
    }
}
