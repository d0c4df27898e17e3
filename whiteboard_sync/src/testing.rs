// Test doubles shared by the unit tests in this crate.

use std::cell::RefCell;
use std::rc::Rc;

use crate::engine::{SendError, Transport};
use crate::protocol::Message;
use crate::style::DrawingContext;
use crate::surface::{Point, Surface, SurfaceError};

/// Surface calls and transport sends interleaved in the order they happened.
pub type Journal = Rc<RefCell<Vec<Event>>>;

#[derive(Clone, PartialEq, Debug)]
pub enum Event {
    Surface(Op),
    Sent(Message),
}

#[derive(Clone, PartialEq, Debug)]
pub enum Op {
    SetStyle(DrawingContext),
    Line(DrawingContext, Point, Point),
    BeginPath(Point),
    ClosePath,
    Clear,
}

/// Records every call so tests can assert on the exact order of operations.
#[derive(Default)]
pub struct RecordingSurface {
    style: DrawingContext,
    fail_draws: bool,
    journal: Journal,
    pub ops: Vec<Op>,
}

impl RecordingSurface {
    pub fn failing() -> Self {
        Self {
            fail_draws: true,
            ..Self::default()
        }
    }

    pub fn with_journal(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
            ..Self::default()
        }
    }

    fn record(&mut self, op: Op) {
        self.journal.borrow_mut().push(Event::Surface(op.clone()));
        self.ops.push(op);
    }

    pub fn lines(&self) -> Vec<(DrawingContext, Point, Point)> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Line(style, from, to) => Some((style.clone(), *from, *to)),
                _ => None,
            })
            .collect()
    }
}

impl Surface for RecordingSurface {
    fn style(&self) -> &DrawingContext {
        &self.style
    }

    fn set_style(&mut self, style: DrawingContext) {
        self.record(Op::SetStyle(style.clone()));
        self.style = style;
    }

    fn draw_line(&mut self, from: Point, to: Point) -> Result<(), SurfaceError> {
        if self.fail_draws {
            return Err(SurfaceError::Unavailable);
        }
        self.record(Op::Line(self.style.clone(), from, to));
        Ok(())
    }

    fn clear(&mut self) {
        self.record(Op::Clear);
    }

    fn begin_path(&mut self, at: Point) {
        self.record(Op::BeginPath(at));
    }

    fn close_path(&mut self) {
        self.record(Op::ClosePath);
    }
}

/// In-memory transport whose open flag tests can flip.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    closed: Rc<RefCell<bool>>,
    journal: Journal,
    pub sent: Rc<RefCell<Vec<Message>>>,
}

impl MemoryTransport {
    pub fn with_journal(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
            ..Self::default()
        }
    }

    pub fn close(&self) {
        *self.closed.borrow_mut() = true;
    }
}

impl Transport for MemoryTransport {
    fn is_open(&self) -> bool {
        !*self.closed.borrow()
    }

    fn send(&self, message: &Message) -> Result<(), SendError> {
        if !self.is_open() {
            return Err(SendError::Closed);
        }
        self.journal.borrow_mut().push(Event::Sent(message.clone()));
        self.sent.borrow_mut().push(message.clone());
        Ok(())
    }
}
