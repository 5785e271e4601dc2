//! Network layer for tidepool
//!
//! This crate carries the hardware control RPC surface over TCP.
//!
//! # Components
//!
//! - **RpcServer**: accepts connections and dispatches each request into a
//!   shared [`HardwareControlService`](tidepool_hardware::HardwareControlService)
//! - **HardwareControlClient**: typed client that also implements
//!   [`HardwareControl`](tidepool_core::HardwareControl), so timers can run
//!   in another process
//!
//! Both ends frame messages with the codecs from `tidepool-protocol`.

mod client;
mod server;

pub use client::{HardwareControlClient, RpcClientConfig, RpcClientError};
pub use server::{RpcServer, RpcServerConfig, RpcServerError, handle_request};
