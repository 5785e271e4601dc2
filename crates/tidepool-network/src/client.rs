//! TCP client for the hardware control service.
//!
//! [`HardwareControlClient`] wraps one connection and exposes every RPC as
//! a typed method. It also implements [`HardwareControl`], so the scheduler
//! can run in a separate process and drive the service over TCP.
//!
//! # Example Usage
//!
//! ```no_run
//! use tidepool_core::{LightColor, LightId, Scope};
//! use tidepool_network::{HardwareControlClient, RpcClientConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HardwareControlClient::new(RpcClientConfig::default());
//! client.connect().await?;
//!
//! client.set_light_color(LightId::new(1)?, LightColor::Blue, &Scope::NONE).await?;
//! let temperature = client.temperature_fahrenheit().await?;
//! println!("Tank is at {:.1} °F", temperature.value);
//! # Ok(())
//! # }
//! ```
//!
//! # Timeout Handling
//!
//! Connect, send and receive each have the configured timeout (default
//! 3000 ms). A call that times out waiting for its reply drops the
//! connection, since a late reply would otherwise be taken as the answer to
//! the next call.

use std::{
    net::{Ipv4Addr, SocketAddr},
    time::Duration,
};

use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tidepool_core::{
    HardwareControl, LightColor, LightId, RelayChannel, Scope, SensorReading, StepperCommand,
    constants::DEFAULT_RPC_TIMEOUT,
};
use tidepool_protocol::{ClientCodec, Request, Response};
use tokio::{net::TcpStream, sync::Mutex};
use tokio_util::codec::Framed;
use tracing::{debug, error, info, trace, warn};

/// Configuration for the RPC client
///
/// # Example
///
/// ```
/// use tidepool_network::RpcClientConfig;
/// use std::time::Duration;
///
/// let config = RpcClientConfig {
///     server_addr: "127.0.0.1:50051".parse().unwrap(),
///     timeout: Duration::from_millis(5000),
/// };
/// ```
#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    /// Server address to connect to
    pub server_addr: SocketAddr,

    /// Timeout for all I/O operations (connect, send, recv)
    pub timeout: Duration,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 50051)),
            timeout: DEFAULT_RPC_TIMEOUT,
        }
    }
}

/// Errors that can occur during RPC client operations
#[derive(Debug, Error)]
pub enum RpcClientError {
    /// Client is not connected to server
    #[error("Not connected to server")]
    NotConnected,

    /// Connection attempt timed out
    #[error("Connection timeout after {0}ms")]
    ConnectionTimeout(u64),

    /// Read operation timed out
    #[error("Read timeout after {0}ms")]
    ReadTimeout(u64),

    /// Write operation timed out
    #[error("Write timeout after {0}ms")]
    WriteTimeout(u64),

    /// Connection was lost during operation
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// The server answered with a body that does not match the call
    #[error("Unexpected response to {method}: {body}")]
    UnexpectedResponse { method: &'static str, body: String },

    /// The server reported an error status
    #[error(transparent)]
    Rpc(#[from] tidepool_core::Error),

    /// Low-level I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<RpcClientError> for tidepool_core::Error {
    fn from(error: RpcClientError) -> Self {
        match error {
            RpcClientError::Rpc(e) => e,
            RpcClientError::Io(e) => tidepool_core::Error::Io(e),
            other => tidepool_core::Error::Transport(other.to_string()),
        }
    }
}

type ClientResult<T> = std::result::Result<T, RpcClientError>;

fn unexpected(method: &'static str, body: Response) -> RpcClientError {
    RpcClientError::UnexpectedResponse {
        method,
        body: format!("{body:?}"),
    }
}

/// Typed client for one hardware control service.
///
/// Calls may be issued from several tasks through `&self`; they are
/// serialized on the single connection.
pub struct HardwareControlClient {
    server_addr: SocketAddr,
    framed: Mutex<Option<Framed<TcpStream, ClientCodec>>>,
    timeout: Duration,
}

impl HardwareControlClient {
    /// Create a client. It is not connected until [`connect`](Self::connect).
    pub fn new(config: RpcClientConfig) -> Self {
        debug!("Creating RPC client for server {}", config.server_addr);

        Self {
            server_addr: config.server_addr,
            framed: Mutex::new(None),
            timeout: config.timeout,
        }
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }

    /// Connect to the service, replacing any previous connection.
    pub async fn connect(&self) -> ClientResult<()> {
        info!("Connecting to server at {}", self.server_addr);

        let stream =
            match tokio::time::timeout(self.timeout, TcpStream::connect(self.server_addr)).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    error!("Connection failed: {}", e);
                    return Err(e.into());
                }
                Err(_) => {
                    warn!("Connection timeout after {}ms", self.timeout_ms());
                    return Err(RpcClientError::ConnectionTimeout(self.timeout_ms()));
                }
            };

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }

        *self.framed.lock().await = Some(Framed::new(stream, ClientCodec::new()));
        info!("Connected to {}", self.server_addr);
        Ok(())
    }

    pub async fn is_connected(&self) -> bool {
        self.framed.lock().await.is_some()
    }

    /// Close the connection. Closing a closed client is a no-op.
    pub async fn close(&self) -> ClientResult<()> {
        if let Some(mut framed) = self.framed.lock().await.take() {
            framed.close().await.map_err(|e| RpcClientError::ConnectionLost(e.to_string()))?;
            info!("Disconnected from {}", self.server_addr);
        }
        Ok(())
    }

    /// Send one request and wait for its reply.
    ///
    /// An error status from the service comes back as
    /// [`RpcClientError::Rpc`] carrying the original error kind.
    pub async fn call(&self, request: Request) -> ClientResult<Response> {
        let method = request.method();
        let mut guard = self.framed.lock().await;
        let framed = guard.as_mut().ok_or(RpcClientError::NotConnected)?;
        trace!(method, "Sending request");

        let sent = match tokio::time::timeout(self.timeout, framed.send(request)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(RpcClientError::ConnectionLost(e.to_string())),
            Err(_) => Err(RpcClientError::WriteTimeout(self.timeout_ms())),
        };
        let received = match sent {
            Ok(()) => match tokio::time::timeout(self.timeout, framed.next()).await {
                Ok(Some(Ok(reply))) => Ok(reply),
                Ok(Some(Err(e))) => Err(RpcClientError::ConnectionLost(e.to_string())),
                Ok(None) => Err(RpcClientError::ConnectionLost("Server closed connection".into())),
                Err(_) => Err(RpcClientError::ReadTimeout(self.timeout_ms())),
            },
            Err(e) => Err(e),
        };

        match received {
            Ok(reply) => {
                trace!(method, status = %reply.status.code, "Received reply");
                Ok(reply.into_result()?)
            }
            Err(e) => {
                warn!(method, error = %e, "Call failed, dropping connection");
                *guard = None;
                Err(e)
            }
        }
    }

    pub async fn echo(&self, payload: impl Into<String>) -> ClientResult<String> {
        match self.call(Request::Echo { payload: payload.into() }).await? {
            Response::Echo { payback } => Ok(payback),
            other => Err(unexpected("Echo", other)),
        }
    }

    pub async fn set_relay_state(&self, channel: RelayChannel, engaged: bool) -> ClientResult<()> {
        let request = Request::SetRelayState {
            channel: channel.as_u8(),
            engaged,
        };
        self.call(request).await.map(drop)
    }

    pub async fn relay_states(&self) -> ClientResult<Vec<(RelayChannel, bool)>> {
        match self.call(Request::GetRelayStates).await? {
            Response::RelayStates { states } => states
                .into_iter()
                .map(|s| Ok((RelayChannel::new(s.channel)?, s.engaged)))
                .collect(),
            other => Err(unexpected("GetRelayStates", other)),
        }
    }

    pub async fn set_light_color(
        &self,
        id: LightId,
        color: LightColor,
        scope: &Scope,
    ) -> ClientResult<()> {
        let request = Request::SetLightColor {
            light_id: id.as_u8(),
            color: color.into(),
            scope: scope.clone(),
        };
        self.call(request).await.map(drop)
    }

    /// Applied colors, indexed by `LightId::index`.
    pub async fn light_colors(&self) -> ClientResult<Vec<LightColor>> {
        match self.call(Request::GetLightColors).await? {
            Response::LightColors { mut states } => {
                states.sort_by_key(|s| s.light_id);
                Ok(states.into_iter().map(|s| s.color).collect())
            }
            other => Err(unexpected("GetLightColors", other)),
        }
    }

    /// Latest temperature reading in degrees Celsius.
    pub async fn temperature(&self) -> ClientResult<SensorReading> {
        match self.call(Request::GetTemperature).await? {
            Response::Temperature { reading } => Ok(reading),
            other => Err(unexpected("GetTemperature", other)),
        }
    }

    pub async fn temperature_celsius(&self) -> ClientResult<SensorReading> {
        self.temperature().await
    }

    pub async fn temperature_fahrenheit(&self) -> ClientResult<SensorReading> {
        let reading = self.temperature().await?;
        Ok(SensorReading::new(reading.timestamp, reading.value * 9.0 / 5.0 + 32.0))
    }

    pub async fn ph(&self) -> ClientResult<SensorReading> {
        match self.call(Request::GetPh).await? {
            Response::Ph { reading } => Ok(reading),
            other => Err(unexpected("GetPh", other)),
        }
    }

    pub async fn move_stepper(&self, command: StepperCommand) -> ClientResult<()> {
        let request = Request::MoveStepper {
            steps: i64::from(command.steps),
            reverse: command.reverse,
            mode: command.mode,
        };
        self.call(request).await.map(drop)
    }

    pub async fn stop_stepper(&self) -> ClientResult<()> {
        self.call(Request::StopStepper).await.map(drop)
    }

    pub async fn is_stepper_active(&self) -> ClientResult<bool> {
        match self.call(Request::IsStepperActive).await? {
            Response::StepperState { active } => Ok(active),
            other => Err(unexpected("IsStepperActive", other)),
        }
    }

    pub async fn set_scope(&self, scope: &Scope) -> ClientResult<()> {
        self.call(Request::SetScope { scope: scope.clone() }).await.map(drop)
    }

    /// `0` restores the configured default.
    pub async fn set_ph_sample_time(&self, ms: u64) -> ClientResult<()> {
        self.call(Request::SetPhSampleTime { ms }).await.map(drop)
    }

    pub async fn ph_sample_time(&self) -> ClientResult<Duration> {
        match self.call(Request::GetPhSampleTime).await? {
            Response::PhSampleTime { ms } => Ok(Duration::from_millis(ms)),
            other => Err(unexpected("GetPhSampleTime", other)),
        }
    }

    /// Raw command to the pH probe, e.g. `"Cal,mid,7.00"`.
    pub async fn send_ph_command(&self, command: impl Into<String>) -> ClientResult<String> {
        match self.call(Request::SendPhCommand { command: command.into() }).await? {
            Response::PhCommand { response } => Ok(response),
            other => Err(unexpected("SendPhCommand", other)),
        }
    }
}

impl HardwareControl for HardwareControlClient {
    async fn set_relay(&self, channel: RelayChannel, engaged: bool) -> tidepool_core::Result<()> {
        Ok(self.set_relay_state(channel, engaged).await?)
    }

    async fn relay_states(&self) -> tidepool_core::Result<Vec<(RelayChannel, bool)>> {
        Ok(HardwareControlClient::relay_states(self).await?)
    }

    async fn set_light_color(
        &self,
        id: LightId,
        color: LightColor,
        scope: &Scope,
    ) -> tidepool_core::Result<()> {
        Ok(HardwareControlClient::set_light_color(self, id, color, scope).await?)
    }

    async fn light_colors(&self) -> tidepool_core::Result<Vec<LightColor>> {
        Ok(HardwareControlClient::light_colors(self).await?)
    }

    async fn move_stepper(&self, command: StepperCommand) -> tidepool_core::Result<()> {
        Ok(HardwareControlClient::move_stepper(self, command).await?)
    }

    async fn stop_stepper(&self) -> tidepool_core::Result<()> {
        Ok(HardwareControlClient::stop_stepper(self).await?)
    }

    async fn is_stepper_active(&self) -> tidepool_core::Result<bool> {
        Ok(HardwareControlClient::is_stepper_active(self).await?)
    }
}
