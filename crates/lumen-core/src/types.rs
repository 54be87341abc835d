//! Common types for lumen
//!
//! Time, identity and geometry types shared by the pool, the scheduler and
//! the presenter. Presentation time is expressed in 100-nanosecond ticks,
//! the unit media clocks traditionally report.

use std::fmt;
use std::ops::{Add, Sub};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Number of 100-ns ticks in one millisecond
pub const TICKS_PER_MILLI: i64 = 10_000;

/// Number of 100-ns ticks in one second
pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// A point (or span) on the presentation timeline, in 100-ns ticks
///
/// Signed so that lead/lag arithmetic against the clock never wraps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MediaTime(i64);

impl MediaTime {
    pub const ZERO: MediaTime = MediaTime(0);

    #[inline]
    pub const fn from_ticks(ticks: i64) -> Self {
        Self(ticks)
    }

    #[inline]
    pub const fn ticks(self) -> i64 {
        self.0
    }

    pub const fn from_millis(ms: i64) -> Self {
        Self(ms * TICKS_PER_MILLI)
    }

    pub fn from_duration(d: Duration) -> Self {
        Self((d.as_nanos() / 100).min(i64::MAX as u128) as i64)
    }

    /// Magnitude of this time as a wall-clock duration
    pub fn abs_duration(self) -> Duration {
        Duration::from_nanos(self.0.unsigned_abs().saturating_mul(100))
    }

    /// Scale a timeline span by a playback rate (span / |rate|)
    ///
    /// A span of media time at rate 2.0 elapses in half the wall-clock time.
    /// Returns `None` for rate 0, where no amount of waiting advances the clock.
    pub fn scaled_wall_duration(self, rate: f32) -> Option<Duration> {
        let rate = rate.abs() as f64;
        if rate == 0.0 {
            return None;
        }
        let nanos = self.0.unsigned_abs() as f64 * 100.0 / rate;
        Some(Duration::from_nanos(nanos.min(u64::MAX as f64) as u64))
    }

    pub fn saturating_sub(self, other: MediaTime) -> MediaTime {
        MediaTime(self.0.saturating_sub(other.0))
    }
}

impl Add for MediaTime {
    type Output = MediaTime;

    fn add(self, rhs: MediaTime) -> MediaTime {
        MediaTime(self.0.saturating_add(rhs.0))
    }
}

impl Sub for MediaTime {
    type Output = MediaTime;

    fn sub(self, rhs: MediaTime) -> MediaTime {
        MediaTime(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for MediaTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}ms", self.0 as f64 / TICKS_PER_MILLI as f64)
    }
}

/// Identity of one checkout of a pooled sample
///
/// Issued fresh on every `acquire`, so a token names exactly one
/// checkout and can be returned at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SampleToken(pub u64);

impl fmt::Display for SampleToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque handle to a presentation surface owned by the display backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(pub u64);

/// A rational number (frame rates, pixel aspect ratios)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ratio {
    pub num: u32,
    pub den: u32,
}

impl Ratio {
    pub const ONE: Ratio = Ratio { num: 1, den: 1 };

    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    pub fn is_valid(&self) -> bool {
        self.num > 0 && self.den > 0
    }
}

impl Default for Ratio {
    fn default() -> Self {
        Self::ONE
    }
}

/// Width and height in pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Pixel rectangle (destination rectangle on the display surface)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    /// A rectangle with a negative extent is malformed; an empty one is allowed
    pub fn is_well_formed(&self) -> bool {
        self.right >= self.left && self.bottom >= self.top
    }
}

/// Source rectangle in normalized video coordinates (0.0 ..= 1.0)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedRect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl NormalizedRect {
    /// The whole video frame
    pub const FULL: NormalizedRect = NormalizedRect {
        left: 0.0,
        top: 0.0,
        right: 1.0,
        bottom: 1.0,
    };

    pub fn is_valid(&self) -> bool {
        let in_range = |v: f32| (0.0..=1.0).contains(&v);
        in_range(self.left)
            && in_range(self.top)
            && in_range(self.right)
            && in_range(self.bottom)
            && self.left < self.right
            && self.top < self.bottom
    }

    /// Pixel area this rectangle selects out of a frame of `size`
    pub fn to_pixels(&self, size: Size) -> Rect {
        let w = size.width as f32;
        let h = size.height as f32;
        Rect {
            left: (self.left * w).round() as i32,
            top: (self.top * h).round() as i32,
            right: (self.right * w).round() as i32,
            bottom: (self.bottom * h).round() as i32,
        }
    }
}

impl Default for NormalizedRect {
    fn default() -> Self {
        Self::FULL
    }
}

/// Negotiated video format of the mixer output
///
/// Pixel layout is carried as an opaque FourCC: the presenter never converts
/// colour, it only needs to agree with the mixer and the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaType {
    /// Frame dimensions in pixels
    pub size: Size,
    /// Pixel aspect ratio
    pub pixel_aspect: Ratio,
    /// Nominal frame rate
    pub frame_rate: Ratio,
    /// Pixel format FourCC
    pub fourcc: u32,
}

impl MediaType {
    pub fn new(size: Size, frame_rate: Ratio, fourcc: u32) -> Self {
        Self {
            size,
            pixel_aspect: Ratio::ONE,
            frame_rate,
            fourcc,
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.size.is_empty() && self.pixel_aspect.is_valid() && self.frame_rate.is_valid()
    }

    /// Duration of one frame at the nominal frame rate
    pub fn frame_duration(&self) -> Option<MediaTime> {
        if !self.frame_rate.is_valid() {
            return None;
        }
        Some(MediaTime::from_ticks(
            TICKS_PER_SECOND * self.frame_rate.den as i64 / self.frame_rate.num as i64,
        ))
    }

    /// Picture aspect ratio reduced to lowest terms (e.g. 16x9)
    pub fn picture_aspect(&self) -> Size {
        let w = self.size.width as u64 * self.pixel_aspect.num as u64;
        let h = self.size.height as u64 * self.pixel_aspect.den as u64;
        let g = gcd(w, h).max(1);
        Size::new((w / g) as u32, (h / g) as u32)
    }

    /// Copy of this type cropped to the pixels `source` selects
    pub fn cropped(&self, source: &NormalizedRect) -> MediaType {
        let rect = source.to_pixels(self.size);
        MediaType {
            size: Size::new(rect.width().max(0) as u32, rect.height().max(0) as u32),
            ..*self
        }
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Build a FourCC code from its four ASCII characters
pub const fn fourcc(code: &[u8; 4]) -> u32 {
    (code[0] as u32) | ((code[1] as u32) << 8) | ((code[2] as u32) << 16) | ((code[3] as u32) << 24)
}
