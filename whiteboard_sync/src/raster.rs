//! In-memory RGBA canvas for headless clients.

use crate::style::{CompositeMode, DrawingContext};
use crate::surface::{Point, Surface, SurfaceError};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Rgba(pub [u8; 4]);

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba([0, 0, 0, 0]);

    /// Parses `#rgb` or `#rrggbb`.
    pub fn parse(color: &str) -> Result<Self, SurfaceError> {
        let unsupported = || SurfaceError::UnsupportedColor(color.to_string());
        let hex = color.trim().strip_prefix('#').ok_or_else(unsupported)?;
        if !hex.is_ascii() {
            return Err(unsupported());
        }

        let channel = |s: &str| u8::from_str_radix(s, 16).map_err(|_| unsupported());
        match hex.len() {
            3 => {
                let mut rgb = [0u8; 3];
                for (i, c) in hex.chars().enumerate() {
                    let v = channel(&c.to_string())?;
                    rgb[i] = v * 17;
                }
                Ok(Rgba([rgb[0], rgb[1], rgb[2], 255]))
            }
            6 => Ok(Rgba([
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
                255,
            ])),
            _ => Err(unsupported()),
        }
    }

    pub fn is_transparent(&self) -> bool {
        self.0[3] == 0
    }
}

pub struct Raster {
    width: u32,
    height: u32,
    pixels: Vec<Rgba>,
    style: DrawingContext,
}

impl Raster {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![Rgba::TRANSPARENT; width as usize * height as usize],
            style: DrawingContext::default(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.pixels[self.index(x, y)])
    }

    pub fn painted_pixels(&self) -> usize {
        self.pixels.iter().filter(|p| !p.is_transparent()).count()
    }

    pub fn is_blank(&self) -> bool {
        self.painted_pixels() == 0
    }

    pub fn pixels(&self) -> &[Rgba] {
        &self.pixels
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }
}

// Squared distance from `p` to the segment `a`-`b`.
fn distance_sq(p: Point, a: Point, b: Point) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq == 0.0 {
        0.0
    } else {
        (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0)
    };
    let (cx, cy) = (a.x + t * dx - p.x, a.y + t * dy - p.y);
    cx * cx + cy * cy
}

impl Surface for Raster {
    fn style(&self) -> &DrawingContext {
        &self.style
    }

    fn set_style(&mut self, style: DrawingContext) {
        self.style = style;
    }

    // Round caps: a pixel is covered when its centre lies within half the
    // line width of the segment.
    fn draw_line(&mut self, from: Point, to: Point) -> Result<(), SurfaceError> {
        let paint = match self.style.composite {
            CompositeMode::SourceOver => Rgba::parse(&self.style.color)?,
            CompositeMode::DestinationOut => Rgba::TRANSPARENT,
        };
        let (width, height) = (self.width, self.height);
        if width == 0 || height == 0 {
            return Ok(());
        }

        let radius = self.style.line_width / 2.0;
        let radius_sq = radius * radius;
        let clamp_x = |v: f64| v.floor().clamp(0.0, (width - 1) as f64) as u32;
        let clamp_y = |v: f64| v.floor().clamp(0.0, (height - 1) as f64) as u32;

        let (min_x, max_x) = (from.x.min(to.x) - radius, from.x.max(to.x) + radius);
        let (min_y, max_y) = (from.y.min(to.y) - radius, from.y.max(to.y) + radius);
        if max_x < 0.0 || max_y < 0.0 || min_x >= width as f64 || min_y >= height as f64 {
            return Ok(());
        }

        for y in clamp_y(min_y)..=clamp_y(max_y) {
            for x in clamp_x(min_x)..=clamp_x(max_x) {
                let centre = Point::new(x as f64 + 0.5, y as f64 + 0.5);
                if distance_sq(centre, from, to) <= radius_sq {
                    let i = self.index(x, y);
                    self.pixels[i] = paint;
                }
            }
        }
        Ok(())
    }

    fn clear(&mut self) {
        self.pixels.fill(Rgba::TRANSPARENT);
    }
}
