use rand::Rng;
use serde::{Deserialize, Serialize};

/// Paths shorter than this are a single hop.
const MIN_PATH_DISTANCE: f64 = 2.0;
const MIN_STEPS: usize = 10;
const MAX_STEPS: usize = 50;
/// Roughly one step per 20 px travelled.
const PIXELS_PER_STEP: f64 = 20.0;
/// Control points drift sideways by up to this fraction of the distance.
const CURVE_SPREAD: f64 = 0.25;
const JITTER_PX: f64 = 3.0;
const CLICK_JITTER_PX: f64 = 5.0;
const WANDER_MARGIN_PX: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: Point) -> f64 {
        ((other.x - self.x).powi(2) + (other.y - self.y).powi(2)).sqrt()
    }

    fn lerp(&self, other: Point, t: f64) -> Point {
        Point::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
        )
    }
}

/// An element's bounding box in viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.x + self.width && p.y >= self.y && p.y <= self.y + self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920.0,
            height: 1080.0,
        }
    }
}

impl Viewport {
    pub fn center(&self) -> Point {
        Point::new(self.width / 2.0, self.height / 2.0)
    }
}

/// Timing curve cubic-bezier(0.25, 0.1, 0.25, 1.0), evaluated on its y axis.
fn ease(t: f64) -> f64 {
    let u = 1.0 - t;
    3.0 * u * u * t * 0.1 + 3.0 * u * t * t + t * t * t
}

fn cubic_bezier(p0: Point, p1: Point, p2: Point, p3: Point, t: f64) -> Point {
    let u = 1.0 - t;
    let (a, b, c, d) = (u * u * u, 3.0 * u * u * t, 3.0 * u * t * t, t * t * t);
    Point::new(
        a * p0.x + b * p1.x + c * p2.x + d * p3.x,
        a * p0.y + b * p1.y + c * p2.y + d * p3.y,
    )
}

/// Curved, eased, jittered pointer trajectory. First point is exactly
/// `start`, last is exactly `end`.
pub fn pointer_path<R: Rng + ?Sized>(rng: &mut R, start: Point, end: Point) -> Vec<Point> {
    let distance = start.distance_to(end);
    if distance <= MIN_PATH_DISTANCE {
        return vec![start, end];
    }

    let steps = ((distance / PIXELS_PER_STEP).round() as usize).clamp(MIN_STEPS, MAX_STEPS);

    // Unit normal to the straight line.
    let nx = -(end.y - start.y) / distance;
    let ny = (end.x - start.x) / distance;
    let spread = distance * CURVE_SPREAD;

    let mut control = |t: f64| {
        let base = start.lerp(end, t);
        let offset = rng.gen_range(-spread..=spread);
        Point::new(base.x + nx * offset, base.y + ny * offset)
    };
    let c1 = control(1.0 / 3.0);
    let c2 = control(2.0 / 3.0);

    let mut points = Vec::with_capacity(steps + 1);
    points.push(start);
    for i in 1..steps {
        let t = ease(i as f64 / steps as f64);
        let p = cubic_bezier(start, c1, c2, end, t);
        points.push(Point::new(
            p.x + rng.gen_range(-JITTER_PX..=JITTER_PX),
            p.y + rng.gen_range(-JITTER_PX..=JITTER_PX),
        ));
    }
    points.push(end);
    points
}

/// A point near the centre of `bounds`, never outside it.
pub fn click_point<R: Rng + ?Sized>(rng: &mut R, bounds: Bounds) -> Point {
    let center = bounds.center();
    let x = center.x + rng.gen_range(-CLICK_JITTER_PX..=CLICK_JITTER_PX);
    let y = center.y + rng.gen_range(-CLICK_JITTER_PX..=CLICK_JITTER_PX);
    Point::new(
        x.clamp(bounds.x, bounds.x + bounds.width.max(0.0)),
        y.clamp(bounds.y, bounds.y + bounds.height.max(0.0)),
    )
}

/// Idle pointer destination away from the viewport edges.
pub fn wander_target<R: Rng + ?Sized>(rng: &mut R, viewport: Viewport) -> Point {
    let axis = |rng: &mut R, len: f64| {
        if len > WANDER_MARGIN_PX * 2.0 {
            rng.gen_range(WANDER_MARGIN_PX..=len - WANDER_MARGIN_PX)
        } else {
            len / 2.0
        }
    };
    let x = axis(rng, viewport.width);
    let y = axis(rng, viewport.height);
    Point::new(x, y)
}
