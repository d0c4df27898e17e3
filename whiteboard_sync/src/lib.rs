//! Client side of the shared whiteboard.
//!
//! [`protocol`] is the wire format shared with the relay. [`engine`] turns
//! pointer events into segments and draws what other participants send
//! without disturbing the local artist's style. [`connection`] (feature
//! `client`) hooks an engine up to a relay over WebSocket.

#[cfg(feature = "client")]
pub mod connection;
pub mod engine;
pub mod protocol;
pub mod raster;
pub mod style;
pub mod surface;

#[cfg(test)]
mod testing;

pub use engine::{Applied, InvalidWidth, PaintState, ResetOutcome, SyncEngine, Transport};
pub use protocol::{Message, ProtocolError, Segment, Tool, decode, message_type};
pub use raster::{Raster, Rgba};
pub use style::{CompositeMode, DrawingContext, StyleGuard, ToolSelection};
pub use surface::{Point, Surface, SurfaceError};
