use std::ops::{Deref, DerefMut};

use crate::protocol::{Segment, Tool};
use crate::surface::{Point, Surface};

pub const INITIAL_COLOR: &str = "#000000";
pub const INITIAL_WIDTH: f64 = 3.0;

/// Color every eraser segment carries. Only its alpha matters when erasing.
pub const ERASE_COLOR: &str = "#000000";
pub const ERASER_WIDTH_MULT: f64 = 1.8;

/// How a stroke combines with what is already on the surface.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum CompositeMode {
    /// Paint over existing pixels.
    #[default]
    SourceOver,
    /// Punch out existing pixels.
    DestinationOut,
}

impl From<Tool> for CompositeMode {
    fn from(tool: Tool) -> Self {
        match tool {
            Tool::Pencil => CompositeMode::SourceOver,
            Tool::Eraser => CompositeMode::DestinationOut,
        }
    }
}

/// The stroke style currently applied to a surface.
#[derive(Clone, PartialEq, Debug)]
pub struct DrawingContext {
    pub composite: CompositeMode,
    pub color: String,
    pub line_width: f64,
}

impl DrawingContext {
    /// Style a received segment is drawn with. Width and color are taken
    /// verbatim; the tool only picks the composite mode.
    pub fn for_segment(segment: &Segment) -> Self {
        Self {
            composite: segment.tool.into(),
            color: segment.color.clone(),
            line_width: segment.line_width,
        }
    }
}

impl Default for DrawingContext {
    fn default() -> Self {
        ToolSelection::default().resolve()
    }
}

/// What the local artist has picked in the toolbar.
#[derive(Clone, PartialEq, Debug)]
pub struct ToolSelection {
    pub tool: Tool,
    pub color: String,
    pub width: f64,
}

impl Default for ToolSelection {
    fn default() -> Self {
        Self {
            tool: Tool::Pencil,
            color: INITIAL_COLOR.to_string(),
            width: INITIAL_WIDTH,
        }
    }
}

impl ToolSelection {
    /// The eraser ignores the picked color and widens the stroke.
    pub fn resolve(&self) -> DrawingContext {
        match self.tool {
            Tool::Pencil => DrawingContext {
                composite: CompositeMode::SourceOver,
                color: self.color.clone(),
                line_width: self.width,
            },
            Tool::Eraser => DrawingContext {
                composite: CompositeMode::DestinationOut,
                color: ERASE_COLOR.to_string(),
                line_width: self.width * ERASER_WIDTH_MULT,
            },
        }
    }

    pub fn segment(&self, from: Point, to: Point) -> Segment {
        let style = self.resolve();
        Segment {
            x0: from.x,
            y0: from.y,
            x1: to.x,
            y1: to.y,
            color: style.color,
            line_width: style.line_width,
            tool: self.tool,
        }
    }
}

/// Applies a temporary style to a surface and puts the previous one back when
/// dropped, on every exit path.
pub struct StyleGuard<'a, S: Surface + ?Sized> {
    surface: &'a mut S,
    saved: Option<DrawingContext>,
}

impl<'a, S: Surface + ?Sized> StyleGuard<'a, S> {
    pub fn apply(surface: &'a mut S, style: DrawingContext) -> Self {
        let saved = surface.style().clone();
        surface.set_style(style);
        Self {
            surface,
            saved: Some(saved),
        }
    }
}

impl<S: Surface + ?Sized> Deref for StyleGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        &*self.surface
    }
}

impl<S: Surface + ?Sized> DerefMut for StyleGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut *self.surface
    }
}

impl<S: Surface + ?Sized> Drop for StyleGuard<'_, S> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            self.surface.set_style(saved);
        }
    }
}

/// Runs `draw` with `style` applied, then restores the surface's own style.
pub fn with_style<S, R>(surface: &mut S, style: DrawingContext, draw: impl FnOnce(&mut S) -> R) -> R
where
    S: Surface + ?Sized,
{
    let mut guard = StyleGuard::apply(surface, style);
    draw(&mut *guard)
}
