//! Sine and cosine of angles in degrees, evaluated from a quarter-wave table.

#[allow(unused_imports)]
use num_traits::Float;

/// `sin(x)` for `x` = 0, 1, .., 90 degrees
const SIN_TABLE: [f32; 91] = [
    0.0000000, 0.0174524, 0.0348995, 0.0523359, 0.0697564, 0.0871557,
    0.1045284, 0.1218693, 0.1391731, 0.1564344, 0.1736481, 0.1908090,
    0.2079116, 0.2249510, 0.2419219, 0.2588190, 0.2756373, 0.2923717,
    0.3090169, 0.3255681, 0.3420201, 0.3583679, 0.3746065, 0.3907311,
    0.4067366, 0.4226182, 0.4383711, 0.4539905, 0.4694715, 0.4848096,
    0.5000000, 0.5150380, 0.5299192, 0.5446390, 0.5591929, 0.5735764,
    0.5877852, 0.6018150, 0.6156614, 0.6293203, 0.6427876, 0.6560590,
    0.6691306, 0.6819983, 0.6946583, 0.7071067, 0.7193398, 0.7313537,
    0.7431448, 0.7547095, 0.7660444, 0.7771459, 0.7880107, 0.7986355,
    0.8090169, 0.8191520, 0.8290375, 0.8386705, 0.8480481, 0.8571673,
    0.8660254, 0.8746197, 0.8829475, 0.8910065, 0.8987940, 0.9063077,
    0.9135454, 0.9205048, 0.9271838, 0.9335804, 0.9396926, 0.9455185,
    0.9510565, 0.9563047, 0.9612617, 0.9659258, 0.9702957, 0.9743700,
    0.9781476, 0.9816271, 0.9848077, 0.9876883, 0.9902680, 0.9925461,
    0.9945219, 0.9961947, 0.9975640, 0.9986295, 0.9993908, 0.9998477,
    1.0000000,
];

/// Sine of the quarter-wave angle `deg` in `[0, 90]`, linearly interpolated.
fn quarter_sin(deg: f32) -> f32 {
    let lower = (deg.floor() as usize).min(89);
    let frac = deg - lower as f32;
    SIN_TABLE[lower] + (SIN_TABLE[lower + 1] - SIN_TABLE[lower]) * frac
}

/// Sine of an angle given in degrees.
pub fn sin_deg(angle: f32) -> f32 {
    if !angle.is_finite() {
        return 0.0;
    }

    let mut angle = angle % 360.0;
    if angle < 0.0 {
        angle += 360.0;
    }

    match angle {
        a if a <= 90.0 => quarter_sin(a),
        a if a <= 180.0 => quarter_sin(180.0 - a),
        a if a <= 270.0 => -quarter_sin(a - 180.0),
        a => -quarter_sin((360.0 - a).max(0.0)),
    }
}

/// Cosine of an angle given in degrees.
pub fn cos_deg(angle: f32) -> f32 {
    sin_deg(angle + 90.0)
}
