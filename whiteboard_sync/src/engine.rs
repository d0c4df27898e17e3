//! The per-client paint state machine.
//!
//! Local pointer events become segments that are drawn at once and handed to
//! the transport. Messages from other participants are drawn through a
//! [`StyleGuard`](crate::style::StyleGuard) so the local artist's style is
//! back in place before anything else touches the surface.

use thiserror::Error;
use tracing::{debug, warn};

use crate::protocol::{self, Message, ProtocolError, Segment, Tool};
use crate::style::{DrawingContext, ERASER_WIDTH_MULT, ToolSelection, with_style};
use crate::surface::{Point, Surface, SurfaceError};

/// Outgoing half of the connection to the relay.
pub trait Transport {
    fn is_open(&self) -> bool;

    /// Queues a message without waiting for it to hit the wire.
    fn send(&self, message: &Message) -> Result<(), SendError>;
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("channel is not open")]
    Closed,

    #[error(transparent)]
    Encode(#[from] ProtocolError),
}

#[derive(Debug, Error)]
pub enum ReceiveError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Surface(#[from] SurfaceError),
}

/// A width no segment may carry. The selection keeps its previous width.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
#[error("line width must be a positive number, got {0}")]
pub struct InvalidWidth(pub f64);

#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub enum PaintState {
    #[default]
    Idle,
    Painting { last: Point },
}

/// What an incoming message did to the surface.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Applied {
    Segment,
    Reset,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ResetOutcome {
    /// The confirmation was declined; nothing happened.
    Cancelled,
    /// Cleared locally and sent to the relay.
    Broadcast,
    /// Cleared locally only, the channel was not open.
    LocalOnly,
}

pub struct SyncEngine<S, T> {
    surface: S,
    transport: T,
    selection: ToolSelection,
    state: PaintState,
}

impl<S: Surface, T: Transport> SyncEngine<S, T> {
    pub fn new(mut surface: S, transport: T) -> Self {
        let selection = ToolSelection::default();
        surface.set_style(selection.resolve());
        Self {
            surface,
            transport,
            selection,
            state: PaintState::Idle,
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn selection(&self) -> &ToolSelection {
        &self.selection
    }

    pub fn state(&self) -> PaintState {
        self.state
    }

    pub fn into_surface(self) -> S {
        self.surface
    }

    pub fn select_tool(&mut self, tool: Tool) {
        self.selection.tool = tool;
        self.apply_selection();
    }

    /// Ignored by the eraser until the pencil is picked again.
    pub fn select_color(&mut self, color: impl Into<String>) {
        self.selection.color = color.into();
        self.apply_selection();
    }

    pub fn select_width(&mut self, width: f64) -> Result<(), InvalidWidth> {
        // Also covers NaN and an eraser width that would overflow.
        if !(width > 0.0 && (width * ERASER_WIDTH_MULT).is_finite()) {
            warn!(width, "Refusing line width");
            return Err(InvalidWidth(width));
        }
        self.selection.width = width;
        self.apply_selection();
        Ok(())
    }

    fn apply_selection(&mut self) {
        self.surface.set_style(self.selection.resolve());
    }

    pub fn pointer_down(&mut self, at: Point) {
        if matches!(self.state, PaintState::Painting { .. }) {
            self.surface.close_path();
        }
        self.apply_selection();
        self.surface.begin_path(at);
        self.state = PaintState::Painting { last: at };
    }

    /// Extends the current stroke to `to`. Returns the segment that was drawn,
    /// or `None` while idle.
    pub fn pointer_move(&mut self, to: Point) -> Option<Segment> {
        let PaintState::Painting { last } = self.state else {
            return None;
        };
        self.state = PaintState::Painting { last: to };

        let segment = self.selection.segment(last, to);
        if let Err(e) = self.surface.draw_line(last, to) {
            warn!(error = %e, "Failed to draw local segment");
        }
        self.transmit(Message::DrawSegment(segment.clone()));
        Some(segment)
    }

    /// Ends the stroke. Returns `false` if there was none.
    pub fn pointer_up(&mut self) -> bool {
        self.finish_stroke()
    }

    pub fn pointer_leave(&mut self) -> bool {
        self.finish_stroke()
    }

    fn finish_stroke(&mut self) -> bool {
        if self.state == PaintState::Idle {
            return false;
        }
        self.state = PaintState::Idle;
        self.surface.close_path();
        true
    }

    /// Draws a message that came from another participant.
    pub fn apply(&mut self, message: &Message) -> Result<Applied, SurfaceError> {
        match message {
            Message::DrawSegment(segment) => {
                let style = DrawingContext::for_segment(segment);
                with_style(&mut self.surface, style, |surface| {
                    surface.draw_line(segment.start(), segment.end())
                })?;
                Ok(Applied::Segment)
            }
            Message::Reset => {
                self.surface.clear();
                Ok(Applied::Reset)
            }
        }
    }

    /// Decodes and applies one incoming text frame.
    pub fn receive_text(&mut self, text: &str) -> Result<Applied, ReceiveError> {
        let message = protocol::decode(text).inspect_err(|e| {
            warn!(error = %e, payload = text, "Failed processing incoming message");
        })?;
        Ok(self.apply(&message)?)
    }

    /// Clears the canvas for everyone, but only if `confirm` says so.
    pub fn request_reset(&mut self, confirm: impl FnOnce() -> bool) -> ResetOutcome {
        if !confirm() {
            return ResetOutcome::Cancelled;
        }
        self.surface.clear();
        if self.transmit(Message::Reset) {
            ResetOutcome::Broadcast
        } else {
            ResetOutcome::LocalOnly
        }
    }

    // Best effort: nothing is queued or retried for a channel that is not open.
    fn transmit(&self, message: Message) -> bool {
        if !self.transport.is_open() {
            debug!(kind = message.kind(), "Channel not open, dropping message");
            return false;
        }
        match self.transport.send(&message) {
            Ok(()) => true,
            Err(e) => {
                debug!(kind = message.kind(), error = %e, "Could not send message");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::{CompositeMode, ERASE_COLOR};
    use crate::testing::{Event, Journal, MemoryTransport, Op, RecordingSurface};

    type Engine = SyncEngine<RecordingSurface, MemoryTransport>;

    fn engine() -> Engine {
        SyncEngine::new(RecordingSurface::default(), MemoryTransport::default())
    }

    fn remote(x0: f64, color: &str, width: f64, tool: Tool) -> Message {
        Message::DrawSegment(Segment {
            x0,
            y0: 0.0,
            x1: x0 + 5.0,
            y1: 5.0,
            color: color.to_string(),
            line_width: width,
            tool,
        })
    }

    #[test]
    fn painting_draws_locally_and_sends_segment() {
        let mut engine = engine();
        engine.select_color("#ff0000");

        engine.pointer_down(Point::new(0.0, 0.0));
        let segment = engine.pointer_move(Point::new(10.0, 10.0)).unwrap();

        let expected = Segment {
            x0: 0.0,
            y0: 0.0,
            x1: 10.0,
            y1: 10.0,
            color: "#ff0000".to_string(),
            line_width: 3.0,
            tool: Tool::Pencil,
        };
        assert_eq!(segment, expected);
        assert_eq!(
            *engine.transport().sent.borrow(),
            vec![Message::DrawSegment(expected)]
        );

        let lines = engine.surface().lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].0.color, "#ff0000");
    }

    #[test]
    fn consecutive_moves_chain_from_last_point() {
        let mut engine = engine();
        engine.pointer_down(Point::new(1.0, 1.0));
        engine.pointer_move(Point::new(2.0, 2.0));
        let second = engine.pointer_move(Point::new(3.0, 5.0)).unwrap();

        assert_eq!(second.start(), Point::new(2.0, 2.0));
        assert_eq!(second.end(), Point::new(3.0, 5.0));
        assert_eq!(engine.transport().sent.borrow().len(), 2);
    }

    #[test]
    fn moves_while_idle_do_nothing() {
        let mut engine = engine();
        assert!(engine.pointer_move(Point::new(5.0, 5.0)).is_none());
        assert!(engine.transport().sent.borrow().is_empty());
        assert!(engine.surface().lines().is_empty());
    }

    #[test]
    fn pointer_up_and_leave_end_the_stroke_once() {
        let mut engine = engine();
        assert!(!engine.pointer_up());

        engine.pointer_down(Point::new(0.0, 0.0));
        assert!(matches!(engine.state(), PaintState::Painting { .. }));
        assert!(engine.pointer_leave());
        assert_eq!(engine.state(), PaintState::Idle);
        assert!(!engine.pointer_up());

        let closes = engine
            .surface()
            .ops
            .iter()
            .filter(|op| **op == Op::ClosePath)
            .count();
        assert_eq!(closes, 1);
        assert!(engine.pointer_move(Point::new(1.0, 1.0)).is_none());
    }

    #[test]
    fn closed_channel_still_draws_locally() {
        let mut engine = engine();
        engine.transport().close();

        engine.pointer_down(Point::new(0.0, 0.0));
        let segment = engine.pointer_move(Point::new(4.0, 4.0));

        assert!(segment.is_some());
        assert_eq!(engine.surface().lines().len(), 1);
        assert!(engine.transport().sent.borrow().is_empty());
    }

    #[test]
    fn eraser_segments_carry_resolved_style() {
        let mut engine = engine();
        engine.select_color("#abcdef");
        engine.select_width(10.0).unwrap();
        engine.select_tool(Tool::Eraser);

        engine.pointer_down(Point::new(0.0, 0.0));
        let segment = engine.pointer_move(Point::new(1.0, 0.0)).unwrap();

        assert_eq!(segment.color, ERASE_COLOR);
        assert_eq!(segment.line_width, 10.0 * ERASER_WIDTH_MULT);
        assert_eq!(segment.tool, Tool::Eraser);
        assert_eq!(engine.surface().style().composite, CompositeMode::DestinationOut);
    }

    #[test]
    fn unusable_widths_are_refused_and_never_sent() {
        let mut engine = engine();
        engine.select_width(6.0).unwrap();
        let style = engine.surface().style().clone();

        for width in [0.0, -4.0, f64::NAN, f64::INFINITY, f64::MAX] {
            assert!(engine.select_width(width).is_err());
            assert_eq!(engine.selection().width, 6.0);
            assert_eq!(engine.surface().style(), &style);
        }

        engine.pointer_down(Point::new(0.0, 0.0));
        let segment = engine.pointer_move(Point::new(3.0, 3.0)).unwrap();
        assert_eq!(segment.line_width, 6.0);

        // Whatever went out must survive a peer's decode.
        let sent = engine.transport().sent.borrow()[0].encode().unwrap();
        assert_eq!(protocol::decode(&sent).unwrap(), Message::DrawSegment(segment));
    }

    #[test]
    fn remote_segment_uses_its_own_style_then_restores() {
        let mut engine = engine();
        engine.select_color("#0000ff");
        let local = engine.surface().style().clone();
        engine.surface_ops_reset();

        engine.apply(&remote(0.0, "#00ff00", 7.0, Tool::Pencil)).unwrap();

        let ops = &engine.surface().ops;
        assert_eq!(ops.len(), 3);
        match &ops[1] {
            Op::Line(style, _, _) => {
                assert_eq!(style.color, "#00ff00");
                assert_eq!(style.line_width, 7.0);
                assert_eq!(style.composite, CompositeMode::SourceOver);
            }
            other => panic!("expected a line, got {:?}", other),
        }
        assert_eq!(ops[2], Op::SetStyle(local.clone()));
        assert_eq!(engine.surface().style(), &local);
    }

    #[test]
    fn remote_eraser_is_not_widened_again() {
        let mut engine = engine();
        engine.apply(&remote(0.0, ERASE_COLOR, 9.0, Tool::Eraser)).unwrap();

        let (style, _, _) = engine.surface().lines().pop().unwrap();
        assert_eq!(style.line_width, 9.0);
        assert_eq!(style.composite, CompositeMode::DestinationOut);
    }

    #[test]
    fn interleaved_remote_segments_never_leak_into_local_stroke() {
        let mut engine = engine();
        engine.select_color("#111111");
        engine.select_width(4.0).unwrap();
        let local = engine.surface().style().clone();

        engine.pointer_down(Point::new(0.0, 0.0));
        for i in 0..20 {
            let f = i as f64;
            let tool = if i % 3 == 0 { Tool::Eraser } else { Tool::Pencil };
            engine.apply(&remote(f, "#ff00ff", 1.0 + f, tool)).unwrap();
            engine.apply(&remote(f, "#00ffff", 2.0 + f, Tool::Pencil)).unwrap();
            engine.pointer_move(Point::new(f + 1.0, f + 1.0));
            assert_eq!(engine.surface().style(), &local);
        }
        engine.pointer_up();

        // Every locally drawn line went out with the local style.
        for segment in engine.transport().sent.borrow().iter() {
            let Message::DrawSegment(segment) = segment else {
                panic!("only segments were sent");
            };
            assert_eq!(DrawingContext::for_segment(segment), local);
        }
        assert_eq!(engine.surface().style(), &local);
        assert_eq!(engine.selection().width, 4.0);
    }

    #[test]
    fn failed_remote_draw_still_restores_style() {
        let mut engine = SyncEngine::new(RecordingSurface::failing(), MemoryTransport::default());
        let local = engine.surface().style().clone();

        let result = engine.apply(&remote(0.0, "#ff0000", 2.0, Tool::Pencil));

        assert_eq!(result, Err(SurfaceError::Unavailable));
        assert_eq!(engine.surface().style(), &local);
    }

    #[test]
    fn remote_reset_clears_but_keeps_selection() {
        let mut engine = engine();
        engine.select_tool(Tool::Eraser);
        engine.select_width(20.0).unwrap();
        let style = engine.surface().style().clone();

        assert_eq!(engine.apply(&Message::Reset).unwrap(), Applied::Reset);

        assert_eq!(engine.surface().ops.last(), Some(&Op::Clear));
        assert_eq!(engine.surface().style(), &style);
        assert_eq!(engine.selection().tool, Tool::Eraser);
        assert_eq!(engine.selection().width, 20.0);
    }

    #[test]
    fn reset_requires_confirmation() {
        let mut engine = engine();
        assert_eq!(engine.request_reset(|| false), ResetOutcome::Cancelled);
        assert!(!engine.surface().ops.contains(&Op::Clear));
        assert!(engine.transport().sent.borrow().is_empty());

        assert_eq!(engine.request_reset(|| true), ResetOutcome::Broadcast);
        assert!(engine.surface().ops.contains(&Op::Clear));
        assert_eq!(*engine.transport().sent.borrow(), vec![Message::Reset]);
    }

    #[test]
    fn local_reset_clears_before_sending() {
        let journal = Journal::default();
        let mut engine = SyncEngine::new(
            RecordingSurface::with_journal(&journal),
            MemoryTransport::with_journal(&journal),
        );
        journal.borrow_mut().clear();

        assert_eq!(engine.request_reset(|| true), ResetOutcome::Broadcast);
        assert_eq!(
            *journal.borrow(),
            vec![Event::Surface(Op::Clear), Event::Sent(Message::Reset)]
        );
    }

    #[test]
    fn reset_on_closed_channel_is_local_only() {
        let mut engine = engine();
        engine.transport().close();
        assert_eq!(engine.request_reset(|| true), ResetOutcome::LocalOnly);
        assert!(engine.surface().ops.contains(&Op::Clear));
    }

    #[test]
    fn malformed_text_is_reported_and_leaves_surface_alone() {
        let mut engine = engine();
        engine.surface_ops_reset();

        let result = engine.receive_text(r#"{"type": "draw_segmentt"}"#);
        assert!(matches!(
            result,
            Err(ReceiveError::Protocol(ProtocolError::UnknownType(_)))
        ));
        assert!(engine.surface().ops.is_empty());

        let applied = engine.receive_text(r#"{"type":"reset"}"#).unwrap();
        assert_eq!(applied, Applied::Reset);
    }

    impl Engine {
        fn surface_ops_reset(&mut self) {
            self.surface.ops.clear();
        }
    }
}
