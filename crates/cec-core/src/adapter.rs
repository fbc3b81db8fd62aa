//! Physical bus adapter seam

use std::future::Future;
use std::sync::Arc;

use cec_protocol::CecCommand;

/// Sends a frame on the bus
///
/// Implementations return `true` once the frame was acknowledged by the
/// adapter. Waiting for a correlated reply is the transmit engine's job.
pub trait BusAdapter: Send + Sync {
    fn transmit(&self, command: &CecCommand, is_reply: bool) -> impl Future<Output = bool> + Send;
}

impl<T: BusAdapter> BusAdapter for Arc<T> {
    fn transmit(&self, command: &CecCommand, is_reply: bool) -> impl Future<Output = bool> + Send {
        (**self).transmit(command, is_reply)
    }
}
