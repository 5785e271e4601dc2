//! RPC surface of the hardware control service.
//!
//! Every call is a single [`Request`] frame answered by a single [`Reply`]
//! frame. Frames are length-delimited JSON documents, see [`RpcCodec`].

pub mod codec;
pub mod message;

pub use codec::{ClientCodec, RpcCodec, ServerCodec};
pub use message::{LightState, RelayState, Reply, Request, Response, Status};
