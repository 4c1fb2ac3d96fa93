use std::fmt;

use thiserror::Error;

/// Integer width and height of a display surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Raised when a header declares an aspect ratio that is not `"A/B"` with
/// positive integers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid aspect ratio {value:?}: {reason}")]
pub struct AspectRatioError {
    pub value: String,
    pub reason: &'static str,
}

impl AspectRatioError {
    fn new(value: &str, reason: &'static str) -> Self {
        Self {
            value: value.to_string(),
            reason,
        }
    }
}

/// Parses `"A/B"` into its two positive components.
pub fn parse_aspect_ratio(value: &str) -> Result<(u32, u32), AspectRatioError> {
    let (a, b) = value
        .split_once('/')
        .ok_or_else(|| AspectRatioError::new(value, "expected the form A/B"))?;
    let a = parse_component(value, a)?;
    let b = parse_component(value, b)?;
    Ok((a, b))
}

fn parse_component(value: &str, component: &str) -> Result<u32, AspectRatioError> {
    let parsed = component
        .trim()
        .parse::<u32>()
        .map_err(|_| AspectRatioError::new(value, "components must be integers"))?;
    if parsed == 0 {
        return Err(AspectRatioError::new(value, "components must be positive"));
    }
    Ok(parsed)
}

/// Computes the virtual resolution for an optional `"A/B"` aspect ratio.
///
/// Landscape and square ratios keep the base width and derive the height;
/// portrait ratios keep the base height and derive the width. The derived
/// side is rounded to the nearest integer and never drops below one pixel.
pub fn resolve_virtual_resolution(
    aspect_ratio: Option<&str>,
    base: Resolution,
) -> Result<Resolution, AspectRatioError> {
    let Some(aspect_ratio) = aspect_ratio else {
        return Ok(base);
    };
    let (a, b) = parse_aspect_ratio(aspect_ratio)?;
    let (a, b) = (f64::from(a), f64::from(b));
    let resolution = if a >= b {
        let height = (f64::from(base.width) * b / a).round();
        Resolution::new(base.width, clamp_dimension(height))
    } else {
        let width = (f64::from(base.height) * a / b).round();
        Resolution::new(clamp_dimension(width), base.height)
    };
    Ok(resolution)
}

fn clamp_dimension(value: f64) -> u32 {
    value.max(1.0).min(f64::from(u32::MAX)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Resolution = Resolution::new(128, 128);

    #[test]
    fn no_ratio_returns_base() {
        assert_eq!(resolve_virtual_resolution(None, BASE).unwrap(), BASE);
        let odd = Resolution::new(320, 200);
        assert_eq!(resolve_virtual_resolution(None, odd).unwrap(), odd);
    }

    #[test]
    fn widescreen_keeps_width() {
        let resolved = resolve_virtual_resolution(Some("16/9"), BASE).unwrap();
        assert_eq!(resolved, Resolution::new(128, 72));
    }

    #[test]
    fn portrait_keeps_height() {
        let resolved = resolve_virtual_resolution(Some("9/16"), BASE).unwrap();
        assert_eq!(resolved, Resolution::new(72, 128));
    }

    #[test]
    fn extreme_ratio_is_at_least_one_pixel() {
        let resolved = resolve_virtual_resolution(Some("1000/1"), BASE).unwrap();
        assert_eq!(resolved, Resolution::new(128, 1));
    }

    #[test]
    fn ratio_is_honoured_within_rounding() {
        for a in 1..=24u32 {
            for b in 1..=24u32 {
                let value = format!("{a}/{b}");
                let resolved = resolve_virtual_resolution(Some(&value), BASE).unwrap();
                assert!(resolved.width >= 1 && resolved.height >= 1);
                if a >= b {
                    let ideal = f64::from(resolved.width) * f64::from(b) / f64::from(a);
                    assert!((f64::from(resolved.height) - ideal.max(1.0)).abs() <= 1.0, "{value}");
                } else {
                    let ideal = f64::from(resolved.height) * f64::from(a) / f64::from(b);
                    assert!((f64::from(resolved.width) - ideal.max(1.0)).abs() <= 1.0, "{value}");
                }
            }
        }
    }

    #[test]
    fn malformed_ratios_are_rejected() {
        for value in ["0/3", "3/0", "abc", "16:9", "16/", "/9", "-4/3", "4/3/2"] {
            assert!(
                resolve_virtual_resolution(Some(value), BASE).is_err(),
                "{value} should be rejected"
            );
        }
    }

    #[test]
    fn whitespace_around_components_is_tolerated() {
        assert_eq!(parse_aspect_ratio(" 4 / 3 ").unwrap(), (4, 3));
    }
}
