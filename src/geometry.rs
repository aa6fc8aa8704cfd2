// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Wirenet Simulation Core - Path Geometry

//! Wire path geometry.
//!
//! Turns an ordered anchor list `[source, bend₁ … bendₙ, destination]` into a
//! sampled polyline and answers arc-length queries against it. Smooth paths
//! pass exactly through every anchor: anchors are emitted verbatim and only
//! the samples between them are interpolated.

use serde::{Deserialize, Serialize};

use crate::types::{Point2D, Vec2D};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Lower bound of interior samples generated per curved segment.
pub const MIN_SAMPLES_PER_SEGMENT: usize = 12;

/// Upper bound of interior samples generated per curved segment.
pub const MAX_SAMPLES_PER_SEGMENT: usize = 256;

/// Target spacing between consecutive samples, in pixels.
pub const SAMPLE_SPACING: f64 = 4.0;

/// Perpendicular offset of the quadratic control point, as a fraction of the
/// segment length.
pub const BEZIER_BOW_RATIO: f64 = 0.3;

/// Centripetal parameterization exponent.
const CATMULL_ROM_ALPHA: f64 = 0.5;

const KNOT_EPSILON: f64 = 1e-6;
const LENGTH_EPSILON: f64 = 1e-9;

/// Coarse steps used to estimate a curve's length before sampling it.
const ESTIMATE_STEPS: usize = 8;

// ─── Path construction ───────────────────────────────────────────────────────

/// Build the polyline for an anchor list.
///
/// Rigid mode returns the anchors unchanged. Smooth mode returns a bowed
/// quadratic Bézier for a bend-free wire and a centripetal Catmull-Rom chain
/// when at least one bend is present.
pub fn build_path(anchors: &[Point2D], smooth: bool) -> Vec<Point2D> {
    if !smooth || anchors.len() < 2 {
        return anchors.to_vec();
    }
    let mut out = Vec::with_capacity(anchors.len() * (MIN_SAMPLES_PER_SEGMENT + 1));
    out.push(anchors[0]);
    if anchors.len() == 2 {
        bowed_bezier(anchors[0], anchors[1], &mut out);
    } else {
        catmull_rom_chain(anchors, &mut out);
    }
    out
}

/// Quadratic Bézier from `a` to `b` whose control point sits on the
/// perpendicular bisector, 30% of the chord length away from it.
fn bowed_bezier(a: Point2D, b: Point2D, out: &mut Vec<Point2D>) {
    let chord = b - a;
    let len = chord.magnitude();
    if len <= LENGTH_EPSILON {
        out.push(b);
        return;
    }
    let control = a.lerp(&b, 0.5) + chord.perpendicular().normalized().scale(BEZIER_BOW_RATIO * len);
    let estimate = estimate_length(|t| quadratic_bezier(a, control, b, t));
    let n = sample_count(estimate);
    for i in 1..n {
        out.push(quadratic_bezier(a, control, b, i as f64 / n as f64));
    }
    out.push(b);
}

fn catmull_rom_chain(anchors: &[Point2D], out: &mut Vec<Point2D>) {
    let last = anchors.len() - 1;
    // Virtual endpoints mirror the first/last anchor for natural end tangents.
    let before = anchors[0] + (anchors[0] - anchors[1]);
    let after = anchors[last] + (anchors[last] - anchors[last - 1]);

    for k in 0..last {
        let p0 = if k == 0 { before } else { anchors[k - 1] };
        let p1 = anchors[k];
        let p2 = anchors[k + 1];
        let p3 = if k + 1 == last { after } else { anchors[k + 2] };

        if p1.distance(&p2) > LENGTH_EPSILON {
            let estimate = estimate_length(|t| centripetal_point(p0, p1, p2, p3, t));
            let n = sample_count(estimate);
            for i in 1..n {
                out.push(centripetal_point(p0, p1, p2, p3, i as f64 / n as f64));
            }
        }
        out.push(p2);
    }
}

fn quadratic_bezier(p0: Point2D, c: Point2D, p2: Point2D, t: f64) -> Point2D {
    let u = 1.0 - t;
    Point2D::new(
        u * u * p0.x + 2.0 * u * t * c.x + t * t * p2.x,
        u * u * p0.y + 2.0 * u * t * c.y + t * t * p2.y,
    )
}

/// Barry-Goldman evaluation of the centripetal Catmull-Rom segment between
/// `p1` and `p2`; `t ∈ [0,1]`.
fn centripetal_point(p0: Point2D, p1: Point2D, p2: Point2D, p3: Point2D, t: f64) -> Point2D {
    let knot = |a: Point2D, b: Point2D| a.distance(&b).powf(CATMULL_ROM_ALPHA).max(KNOT_EPSILON);
    let t0 = 0.0;
    let t1 = t0 + knot(p0, p1);
    let t2 = t1 + knot(p1, p2);
    let t3 = t2 + knot(p2, p3);
    let u = t1 + (t2 - t1) * t;

    let blend = |a: Point2D, b: Point2D, ta: f64, tb: f64| a.lerp(&b, (u - ta) / (tb - ta));

    let a1 = blend(p0, p1, t0, t1);
    let a2 = blend(p1, p2, t1, t2);
    let a3 = blend(p2, p3, t2, t3);
    let b1 = blend(a1, a2, t0, t2);
    let b2 = blend(a2, a3, t1, t3);
    blend(b1, b2, t1, t2)
}

fn estimate_length(curve: impl Fn(f64) -> Point2D) -> f64 {
    let mut prev = curve(0.0);
    let mut len = 0.0;
    for i in 1..=ESTIMATE_STEPS {
        let p = curve(i as f64 / ESTIMATE_STEPS as f64);
        len += prev.distance(&p);
        prev = p;
    }
    len
}

fn sample_count(estimated_length: f64) -> usize {
    let wanted = (estimated_length / SAMPLE_SPACING).ceil() as usize;
    wanted.clamp(MIN_SAMPLES_PER_SEGMENT, MAX_SAMPLES_PER_SEGMENT)
}

// ─── Queries ─────────────────────────────────────────────────────────────────

/// Sum of the polyline's segment lengths.
pub fn total_length(points: &[Point2D]) -> f64 {
    points.windows(2).map(|w| w[0].distance(&w[1])).sum()
}

/// Point at `progress` (clamped to [0,1]) of the arc length.
/// `None` for an empty path.
pub fn position_at_progress(points: &[Point2D], progress: f64) -> Option<Point2D> {
    let cumulative = cumulative_lengths(points);
    position_on(points, &cumulative, progress)
}

/// Unit tangent at `progress`; zero for degenerate paths.
pub fn tangent_at_progress(points: &[Point2D], progress: f64) -> Vec2D {
    let cumulative = cumulative_lengths(points);
    tangent_on(points, &cumulative, progress)
}

/// Projection of a point onto a path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathProjection {
    pub point: Point2D,
    pub distance: f64,
    /// Arc-length fraction of the projected point.
    pub progress: f64,
}

/// Nearest point of the path to `point`. `None` for an empty path.
pub fn closest_point_on_path(point: Point2D, points: &[Point2D]) -> Option<PathProjection> {
    let cumulative = cumulative_lengths(points);
    closest_on(points, &cumulative, point)
}

fn cumulative_lengths(points: &[Point2D]) -> Vec<f64> {
    let mut acc = 0.0;
    let mut cumulative = Vec::with_capacity(points.len());
    for (i, p) in points.iter().enumerate() {
        if i > 0 {
            acc += points[i - 1].distance(p);
        }
        cumulative.push(acc);
    }
    cumulative
}

/// Index of the segment containing arc length `target`.
fn segment_index(cumulative: &[f64], target: f64) -> usize {
    let idx = cumulative.partition_point(|&c| c < target);
    idx.saturating_sub(1).min(cumulative.len().saturating_sub(2))
}

fn position_on(points: &[Point2D], cumulative: &[f64], progress: f64) -> Option<Point2D> {
    let first = *points.first()?;
    let total = cumulative.last().copied().unwrap_or(0.0);
    if points.len() == 1 || total <= LENGTH_EPSILON {
        return Some(first);
    }
    let target = progress.clamp(0.0, 1.0) * total;
    let i = segment_index(cumulative, target);
    let seg_len = cumulative[i + 1] - cumulative[i];
    if seg_len <= LENGTH_EPSILON {
        return Some(points[i]);
    }
    let local = ((target - cumulative[i]) / seg_len).clamp(0.0, 1.0);
    Some(points[i].lerp(&points[i + 1], local))
}

fn tangent_on(points: &[Point2D], cumulative: &[f64], progress: f64) -> Vec2D {
    if points.len() < 2 {
        return Vec2D::ZERO;
    }
    let total = cumulative.last().copied().unwrap_or(0.0);
    let i = segment_index(cumulative, progress.clamp(0.0, 1.0) * total);
    // Zero-length segments carry no direction; look outward for one that does.
    let forward = (i..points.len() - 1).chain((0..i).rev());
    for k in forward {
        let d = points[k + 1] - points[k];
        if d.magnitude() > LENGTH_EPSILON {
            return d.normalized();
        }
    }
    Vec2D::ZERO
}

fn closest_on(points: &[Point2D], cumulative: &[f64], point: Point2D) -> Option<PathProjection> {
    let first = *points.first()?;
    let total = cumulative.last().copied().unwrap_or(0.0);
    let mut best = PathProjection {
        point: first,
        distance: first.distance(&point),
        progress: 0.0,
    };
    for i in 0..points.len().saturating_sub(1) {
        let a = points[i];
        let b = points[i + 1];
        let d = b - a;
        let len2 = d.dot(&d);
        let t = if len2 <= LENGTH_EPSILON {
            0.0
        } else {
            ((point - a).dot(&d) / len2).clamp(0.0, 1.0)
        };
        let q = a.lerp(&b, t);
        let dist = q.distance(&point);
        if dist < best.distance {
            let along = cumulative[i] + t * (cumulative[i + 1] - cumulative[i]);
            best = PathProjection {
                point: q,
                distance: dist,
                progress: if total > LENGTH_EPSILON { along / total } else { 0.0 },
            };
        }
    }
    Some(best)
}

// ─── WirePath (cached polyline) ──────────────────────────────────────────────

/// Sampled polyline with cached cumulative lengths, rebuilt whenever the
/// owning wire's anchors or smoothing mode change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WirePath {
    points: Vec<Point2D>,
    cumulative: Vec<f64>,
}

impl WirePath {
    pub fn build(anchors: &[Point2D], smooth: bool) -> Self {
        let points = build_path(anchors, smooth);
        let cumulative = cumulative_lengths(&points);
        Self { points, cumulative }
    }

    pub fn points(&self) -> &[Point2D] {
        &self.points
    }

    pub fn length(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    pub fn start(&self) -> Option<Point2D> {
        self.points.first().copied()
    }

    pub fn end(&self) -> Option<Point2D> {
        self.points.last().copied()
    }

    pub fn position_at(&self, progress: f64) -> Option<Point2D> {
        position_on(&self.points, &self.cumulative, progress)
    }

    pub fn tangent_at(&self, progress: f64) -> Vec2D {
        tangent_on(&self.points, &self.cumulative, progress)
    }

    pub fn closest_point(&self, point: Point2D) -> Option<PathProjection> {
        closest_on(&self.points, &self.cumulative, point)
    }

    /// Exact membership of a sampled point (no tolerance).
    pub fn passes_through(&self, point: &Point2D) -> bool {
        self.points.iter().any(|p| p == point)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
