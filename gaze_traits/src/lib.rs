pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

/// Normalized gaze position within the eye box, both axes nominally in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GazeFeature {
    pub nx: f64,
    pub ny: f64,
}

impl GazeFeature {
    #[inline]
    pub const fn new(nx: f64, ny: f64) -> Self {
        Self { nx, ny }
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.nx.is_finite() && self.ny.is_finite()
    }
}

/// Integer pixel coordinate on the target display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ScreenPoint {
    pub x: i32,
    pub y: i32,
}

impl ScreenPoint {
    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance in pixels.
    pub fn distance(&self, other: Self) -> f64 {
        let dx = f64::from(self.x) - f64::from(other.x);
        let dy = f64::from(self.y) - f64::from(other.y);
        dx.hypot(dy)
    }
}

/// Display dimensions in pixels. Both sides are at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

impl Default for ScreenSize {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

impl ScreenSize {
    #[inline]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }

    pub fn diagonal(&self) -> f64 {
        f64::from(self.width).hypot(f64::from(self.height))
    }

    /// Round a real-valued position to the nearest pixel and clamp it into
    /// `[0, width) x [0, height)`. Non-finite coordinates collapse to 0.
    pub fn clamp_f64(&self, x: f64, y: f64) -> ScreenPoint {
        let cx = clamp_axis(x, self.width);
        let cy = clamp_axis(y, self.height);
        ScreenPoint::new(cx, cy)
    }

    pub fn clamp(&self, p: ScreenPoint) -> ScreenPoint {
        self.clamp_f64(f64::from(p.x), f64::from(p.y))
    }

    pub fn contains(&self, p: ScreenPoint) -> bool {
        p.x >= 0
            && p.y >= 0
            && i64::from(p.x) < i64::from(self.width)
            && i64::from(p.y) < i64::from(self.height)
    }
}

#[inline]
fn clamp_axis(v: f64, extent: u32) -> i32 {
    if !v.is_finite() {
        return 0;
    }
    let max = f64::from(extent.max(1) - 1).min(f64::from(i32::MAX));
    // Bounded to [0, i32::MAX] above, so the cast is lossless.
    v.round().clamp(0.0, max) as i32
}

/// Per-frame gaze feature producer (camera + landmark tracker, replay file, ...).
///
/// `Ok(None)` means no face or eye this frame; `Err` is a source fault.
pub trait FeatureSource {
    fn read(&mut self) -> Result<Option<GazeFeature>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Moves the real pointer.
pub trait CursorActuator {
    fn move_to(&mut self, p: ScreenPoint) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

impl<T: FeatureSource + ?Sized> FeatureSource for Box<T> {
    fn read(&mut self) -> Result<Option<GazeFeature>, Box<dyn std::error::Error + Send + Sync>> {
        (**self).read()
    }
}

impl<T: CursorActuator + ?Sized> CursorActuator for Box<T> {
    fn move_to(
        &mut self,
        p: ScreenPoint,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).move_to(p)
    }
}
