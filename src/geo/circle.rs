use super::{GeoPoint, math};
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;

const GREAT_CIRCLE_TOLERANCE: f64 = 1e-9;

/// A circle on the unit sphere, the common carrier for both straight
/// great-circle paths and turning small-circle paths.
///
/// `center` is the circle pole and `radius` the angular distance from the
/// pole to the path. The path direction at any point `p` on the circle is
/// `center x p`, which puts the pole on the left of the path: a small circle
/// with `radius < PI/2` is a left turn, and the same turn flown the other
/// way round is encoded as the antipodal pole with radius `PI - r`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCircle {
    center: [f64; 3],
    radius: f64,
}

impl GeoCircle {
    /// Builds the great circle through `point` with the given initial course.
    ///
    /// # Arguments
    /// * `point` - A point on the path.
    /// * `bearing` - Course at `point` in degrees true.
    pub fn great_circle(point: &GeoPoint, bearing: f64) -> Self {
        let p = point.to_unit();
        let east = math::normalize(math::cross([0.0, 0.0, 1.0], p));
        let north = math::cross(p, east);
        let brg = bearing.to_radians();
        let dir = math::add(math::scale(north, brg.cos()), math::scale(east, brg.sin()));
        Self {
            center: math::normalize(math::cross(p, dir)),
            radius: FRAC_PI_2,
        }
    }

    /// Builds the great circle from `from` towards `to`.
    pub fn great_circle_through(from: &GeoPoint, to: &GeoPoint) -> Self {
        Self {
            center: math::normalize(math::cross(from.to_unit(), to.to_unit())),
            radius: FRAC_PI_2,
        }
    }

    /// Builds a small circle around `center` with the given angular radius.
    /// A radius beyond `PI/2` flips the handedness of the path.
    pub fn small_circle(center: &GeoPoint, radius: f64) -> Self {
        Self { center: center.to_unit(), radius }
    }

    pub const fn radius(&self) -> f64 { self.radius }

    pub fn is_great_circle(&self) -> bool {
        (self.radius - FRAC_PI_2).abs() < GREAT_CIRCLE_TOLERANCE
    }

    /// Computes the signed cross-track distance of `pos` from the path in
    /// great-arc radians, positive right of track.
    pub fn cross_track(&self, pos: &GeoPoint) -> f64 {
        math::dot(self.center, pos.to_unit()).clamp(-1.0, 1.0).acos() - self.radius
    }

    /// The point on the path nearest to `pos`.
    pub fn closest(&self, pos: &GeoPoint) -> GeoPoint {
        let q = pos.to_unit();
        let radial =
            math::normalize(math::sub(q, math::scale(self.center, math::dot(self.center, q))));
        let on = math::add(
            math::scale(self.center, self.radius.cos()),
            math::scale(radial, self.radius.sin()),
        );
        GeoPoint::from_unit(math::normalize(on))
    }

    /// Computes the course of the path at the point nearest to `pos`.
    ///
    /// # Returns
    /// The course in degrees true, normalized to `[0, 360)`.
    pub fn bearing_at(&self, pos: &GeoPoint) -> f64 {
        let c = self.closest(pos).to_unit();
        let tangent = math::normalize(math::cross(self.center, c));
        let east = math::normalize(math::cross([0.0, 0.0, 1.0], c));
        let north = math::cross(c, east);
        let brg = math::dot(tangent, east).atan2(math::dot(tangent, north));
        math::normalize_heading(brg.to_degrees())
    }

    /// Advances the projection of `from` along the path.
    ///
    /// # Arguments
    /// * `from` - Reference point, projected onto the path first.
    /// * `distance` - Arc length in great-arc radians, negative moving against
    ///   the path direction.
    pub fn offset_along(&self, from: &GeoPoint, distance: f64) -> GeoPoint {
        let start = self.closest(from).to_unit();
        let angle = distance / self.radius.sin().max(1e-9);
        GeoPoint::from_unit(math::rotate(start, self.center, angle))
    }

    /// Arc length along the path from the projection of `from` to the
    /// projection of `to`, measured in the path direction.
    ///
    /// # Returns
    /// The length in great-arc radians within `[0, 2*PI*sin(radius))`.
    pub fn arc_length_between(&self, from: &GeoPoint, to: &GeoPoint) -> f64 {
        let project = |p: &GeoPoint| {
            let q = p.to_unit();
            math::normalize(math::sub(q, math::scale(self.center, math::dot(self.center, q))))
        };
        let a = project(from);
        let b = project(to);
        let angle = math::dot(math::cross(a, b), self.center).atan2(math::dot(a, b));
        let wrapped = if angle < 0.0 { angle + std::f64::consts::TAU } else { angle };
        wrapped * self.radius.sin()
    }
}
