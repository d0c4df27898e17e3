use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::surface::Point;

/// Drawing tool a segment was produced with.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    #[default]
    Pencil,
    Eraser,
}

// One straight piece of a stroke. Color and width are already resolved by the
// sender, so receivers draw it as-is.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    pub color: String,
    pub line_width: f64,
    pub tool: Tool,
}

impl Segment {
    pub fn start(&self) -> Point {
        Point::new(self.x0, self.y0)
    }

    pub fn end(&self) -> Point {
        Point::new(self.x1, self.y1)
    }

    /// Rejects segments no surface could draw.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        let coords = [self.x0, self.y0, self.x1, self.y1];
        if coords.iter().any(|c| !c.is_finite()) {
            return Err(ProtocolError::InvalidSegment("coordinates must be finite"));
        }
        if !self.line_width.is_finite() || self.line_width <= 0.0 {
            return Err(ProtocolError::InvalidSegment("lineWidth must be positive"));
        }
        if self.color.trim().is_empty() {
            return Err(ProtocolError::InvalidSegment("color must not be empty"));
        }
        Ok(())
    }
}

// Message format for WebSocket communication.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Message {
    DrawSegment(Segment),
    Reset,
}

impl Message {
    pub const DRAW_SEGMENT: &'static str = "draw_segment";
    pub const RESET: &'static str = "reset";

    pub fn kind(&self) -> &'static str {
        match self {
            Message::DrawSegment(_) => Self::DRAW_SEGMENT,
            Message::Reset => Self::RESET,
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message has no \"type\" tag")]
    MissingType,

    #[error("unknown message type {0:?}")]
    UnknownType(String),

    #[error("invalid segment: {0}")]
    InvalidSegment(&'static str),
}

/// Reads only the `type` tag of a frame, leaving the payload unchecked.
///
/// This is all the relay needs to decide whether a frame is worth fanning out.
pub fn message_type(text: &str) -> Result<&'static str, ProtocolError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    tag_of(&value)
}

fn tag_of(value: &serde_json::Value) -> Result<&'static str, ProtocolError> {
    match value.get("type").and_then(serde_json::Value::as_str) {
        Some(Message::DRAW_SEGMENT) => Ok(Message::DRAW_SEGMENT),
        Some(Message::RESET) => Ok(Message::RESET),
        Some(other) => Err(ProtocolError::UnknownType(other.to_owned())),
        None => Err(ProtocolError::MissingType),
    }
}

/// Parses one wire frame.
///
/// The tag is checked before the payload so an unrecognized type is reported
/// as such instead of as a generic shape error. Anything riding along with a
/// `reset` is ignored.
pub fn decode(text: &str) -> Result<Message, ProtocolError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    if tag_of(&value)? == Message::RESET {
        return Ok(Message::Reset);
    }

    let message: Message = serde_json::from_value(value)?;
    if let Message::DrawSegment(segment) = &message {
        segment.validate()?;
    }
    Ok(message)
}
