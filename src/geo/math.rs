use num::traits::{NumCast, real::Real};

/// Normalizes a heading or course to `[0, 360)` degrees.
///
/// # Arguments
/// * `value` - The angle to normalize, in degrees of any real type.
///
/// # Returns
/// The equivalent angle in `[0, 360)`.
pub fn normalize_heading<T: Real + NumCast>(value: T) -> T {
    let full = T::from(360.0).unwrap();
    let rem = value % full;
    if rem < T::zero() { rem + full } else { rem }
}

/// Computes the signed shortest rotation from one course to another.
///
/// # Arguments
/// * `from` - Start angle in degrees.
/// * `to` - End angle in degrees.
///
/// # Returns
/// The difference in degrees within `(-180, 180]`, positive clockwise.
pub fn angle_diff<T: Real + NumCast>(from: T, to: T) -> T {
    let full = T::from(360.0).unwrap();
    let half = T::from(180.0).unwrap();
    let mut diff = (to - from) % full;
    if diff > half {
        diff = diff - full;
    } else if diff <= -half {
        diff = diff + full;
    }
    diff
}

/// Converts a true course to magnetic by applying the local variation.
/// Variation is positive east.
pub fn true_to_magnetic(course: f64, magvar: f64) -> f64 {
    normalize_heading(course - magvar)
}

/// Converts a magnetic course to true by removing the local variation.
pub fn magnetic_to_true(course: f64, magvar: f64) -> f64 {
    normalize_heading(course + magvar)
}

/// Wraps a longitude to `[-180, 180)` degrees.
pub fn normalize_lon(lon: f64) -> f64 {
    let wrapped = normalize_heading(lon);
    if wrapped >= 180.0 { wrapped - 360.0 } else { wrapped }
}

pub(crate) fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

pub(crate) fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

pub(crate) fn add(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

pub(crate) fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

pub(crate) fn scale(v: [f64; 3], s: f64) -> [f64; 3] {
    [v[0] * s, v[1] * s, v[2] * s]
}

/// Normalizes a 3-vector, returning the input unmodified when its magnitude
/// is too small to divide by.
pub(crate) fn normalize(v: [f64; 3]) -> [f64; 3] {
    let mag = dot(v, v).sqrt();
    if mag < 1e-12 { v } else { scale(v, 1.0 / mag) }
}

/// Rotates `v` about the unit `axis` by `angle` radians using the Rodrigues
/// formula, positive angles following the right-hand rule.
pub(crate) fn rotate(v: [f64; 3], axis: [f64; 3], angle: f64) -> [f64; 3] {
    let (sin, cos) = angle.sin_cos();
    let term1 = scale(v, cos);
    let term2 = scale(cross(axis, v), sin);
    let term3 = scale(axis, dot(axis, v) * (1.0 - cos));
    add(add(term1, term2), term3)
}
