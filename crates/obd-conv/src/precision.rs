//! Floating point precision handling
//!
//! Keeps decoded values like `0.1 * 3` from surfacing as `0.30000000000000004`.

/// Decimal places needed to represent multiples of `scale`
///
/// - scale 1.0 → 0
/// - scale 0.1 → 1
/// - scale 0.25 → 2
/// - scale 0.001 → 3
pub fn precision_from_scale(scale: f64) -> u8 {
    let abs_scale = scale.abs();
    if abs_scale == 0.0 {
        return 0;
    }
    if abs_scale >= 1.0 && (abs_scale - abs_scale.round()).abs() < 1e-9 {
        return 0;
    }

    let mut temp = abs_scale;
    let mut precision = 0u8;

    while precision < 6 {
        if (temp - temp.round()).abs() < 1e-9 {
            break;
        }
        temp *= 10.0;
        precision += 1;
    }

    precision
}

/// Round a value to the specified number of decimal places
pub fn round_to_precision(value: f64, precision: u8) -> f64 {
    if precision == 0 {
        value.round()
    } else {
        let factor = 10_f64.powi(precision as i32);
        (value * factor).round() / factor
    }
}
