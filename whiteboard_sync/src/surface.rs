//! The rendering seam between the engine and whatever actually paints pixels.

use thiserror::Error;

use crate::style::DrawingContext;

#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SurfaceError {
    #[error("unsupported color {0:?}")]
    UnsupportedColor(String),

    #[error("surface is unavailable")]
    Unavailable,
}

/// A drawing surface with one active stroke style, like a 2D canvas context.
///
/// Every draw uses whatever style is current. Callers that need a temporary
/// style go through [`StyleGuard`](crate::style::StyleGuard).
pub trait Surface {
    fn style(&self) -> &DrawingContext;

    fn set_style(&mut self, style: DrawingContext);

    /// Strokes a straight line with the current style.
    fn draw_line(&mut self, from: Point, to: Point) -> Result<(), SurfaceError>;

    /// Erases everything. Leaves the style alone.
    fn clear(&mut self);

    fn begin_path(&mut self, _at: Point) {}

    fn close_path(&mut self) {}
}
