//! Tokio codec for RPC frames.
//!
//! Each frame is a 4-byte big-endian length followed by a JSON document.
//! The codec is generic over the decoded and encoded types so the same
//! implementation serves both ends of a connection:
//!
//! ```text
//! client: Request -> Encoder -> TCP -> Decoder -> Request  :server
//! client: Reply   <- Decoder <- TCP <- Encoder <- Reply    :server
//! ```
//!
//! # Usage with Tokio Framed
//!
//! ```rust,no_run
//! use futures::{SinkExt, StreamExt};
//! use tokio::net::TcpStream;
//! use tokio_util::codec::Framed;
//! use tidepool_protocol::{ClientCodec, Request};
//!
//! # async fn example() -> tidepool_core::Result<()> {
//! let stream = TcpStream::connect("127.0.0.1:50051").await?;
//! let mut framed = Framed::new(stream, ClientCodec::new());
//!
//! framed.send(Request::IsStepperActive).await?;
//! if let Some(Ok(reply)) = framed.next().await {
//!     println!("Received: {:?}", reply);
//! }
//! # Ok(())
//! # }
//! ```

use std::marker::PhantomData;

use bytes::{Bytes, BytesMut};
use serde::{Serialize, de::DeserializeOwned};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use crate::{Reply, Request};
use tidepool_core::{Error, Result, constants::MAX_FRAME_SIZE};

/// Length-delimited JSON codec decoding `D` and encoding `E`.
#[derive(Debug)]
pub struct RpcCodec<D, E> {
    inner: LengthDelimitedCodec,
    max_frame_size: usize,
    _types: PhantomData<fn(E) -> D>,
}

/// Codec used by the service: reads requests, writes replies.
pub type ServerCodec = RpcCodec<Request, Reply>;

/// Codec used by clients: writes requests, reads replies.
pub type ClientCodec = RpcCodec<Reply, Request>;

impl<D, E> RpcCodec<D, E> {
    /// Create a codec with the default maximum frame size (64 KB).
    pub fn new() -> Self {
        Self::with_max_frame_size(MAX_FRAME_SIZE)
    }

    /// Create a codec with a custom maximum frame size.
    ///
    /// Frames larger than this are rejected in both directions.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            inner: LengthDelimitedCodec::builder()
                .max_frame_length(max_frame_size)
                .new_codec(),
            max_frame_size,
            _types: PhantomData,
        }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl<D, E> Default for RpcCodec<D, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: DeserializeOwned, E> Decoder for RpcCodec<D, E> {
    type Item = D;
    type Error = Error;

    /// Decode one frame.
    ///
    /// Returns `Ok(None)` until a complete frame is buffered. An oversized
    /// length prefix surfaces as `Error::Io`, a frame that is not valid
    /// JSON for `D` as `Error::Transport`.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<D>> {
        let Some(frame) = self.inner.decode(src)? else {
            return Ok(None);
        };

        serde_json::from_slice(&frame)
            .map(Some)
            .map_err(|e| Error::Transport(format!("Malformed frame: {e}")))
    }
}

impl<D, E: Serialize> Encoder<E> for RpcCodec<D, E> {
    type Error = Error;

    fn encode(&mut self, item: E, dst: &mut BytesMut) -> Result<()> {
        let payload = serde_json::to_vec(&item)
            .map_err(|e| Error::Transport(format!("Cannot serialize frame: {e}")))?;

        if payload.len() > self.max_frame_size {
            return Err(Error::Transport(format!(
                "Frame too large: {} bytes (max {})",
                payload.len(),
                self.max_frame_size
            )));
        }

        self.inner.encode(Bytes::from(payload), dst)?;
        Ok(())
    }
}
