//! Client-side view of the hardware control service.
//!
//! The scheduler and the dispense routine only ever talk to hardware
//! through this trait. It is implemented in-process by the service itself
//! and remotely by the RPC client, so timers can run in either place.

use std::future::Future;

use crate::{LightColor, LightId, RelayChannel, Result, Scope, StepperCommand};

/// Operations the scheduling side needs from the hardware control service.
///
/// Futures are `Send` so callers can drive them from spawned tasks.
pub trait HardwareControl: Send + Sync {
    /// Energize or release a relay.
    fn set_relay(
        &self,
        channel: RelayChannel,
        engaged: bool,
    ) -> impl Future<Output = Result<()>> + Send;

    /// `(channel, engaged)` for every relay, in channel order.
    fn relay_states(&self) -> impl Future<Output = Result<Vec<(RelayChannel, bool)>>> + Send;

    /// Request a light color under `scope` (use [`Scope::NONE`] for an
    /// unprivileged request, which may be buffered).
    fn set_light_color(
        &self,
        id: LightId,
        color: LightColor,
        scope: &Scope,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Applied (not pending) colors, indexed by `LightId::index`.
    fn light_colors(&self) -> impl Future<Output = Result<Vec<LightColor>>> + Send;

    /// Enqueue a stepper move. Does not wait for completion.
    fn move_stepper(&self, command: StepperCommand) -> impl Future<Output = Result<()>> + Send;

    /// Ask the stepper executor to abandon the move in progress.
    fn stop_stepper(&self) -> impl Future<Output = Result<()>> + Send;

    fn is_stepper_active(&self) -> impl Future<Output = Result<bool>> + Send;
}
