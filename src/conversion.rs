use crate::constants::{Degree, Hour};

/// Parse a sexagesimal right ascension to hours.
///
/// Arguments
/// ---------
/// * `ra`: a string representing the right ascension as `HH:MM:SS.SS` (colons or whitespace)
///
/// Returns
/// -------
/// * `Option<Hour>`: the right ascension in hours, or `None` if the input format is invalid.
pub fn parse_ra_hms(ra: &str) -> Option<Hour> {
    let parts = split_sexagesimal(ra)?;
    let h: f64 = parts[0].parse().ok()?;
    let m: f64 = parts[1].parse().ok()?;
    let s: f64 = parts[2].parse().ok()?;
    if !(0.0..60.0).contains(&m) || !(0.0..60.0).contains(&s) {
        return None;
    }
    Some(h + m / 60.0 + s / 3600.0)
}

/// Parse a sexagesimal declination to degrees.
///
/// Arguments
/// ---------
/// * `dec`: a string representing the declination as `±DD:MM:SS.SS` (colons or whitespace)
///
/// Returns
/// -------
/// * `Option<Degree>`: the declination in degrees, or `None` if the input format is invalid.
///
/// The sign is read from the degree field as text so that `-00:30:00` is negative.
pub fn parse_dec_dms(dec: &str) -> Option<Degree> {
    let parts = split_sexagesimal(dec)?;
    let sign = if parts[0].trim_start().starts_with('-') {
        -1.0
    } else {
        1.0
    };
    let d: f64 = parts[0]
        .trim()
        .trim_start_matches(&['-', '+'][..])
        .parse()
        .ok()?;
    let m: f64 = parts[1].parse().ok()?;
    let s: f64 = parts[2].parse().ok()?;
    if !(0.0..60.0).contains(&m) || !(0.0..60.0).contains(&s) {
        return None;
    }
    Some(sign * (d + m / 60.0 + s / 3600.0))
}

fn split_sexagesimal(text: &str) -> Option<[&str; 3]> {
    let parts: Vec<&str> = text
        .split(|c: char| c == ':' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .collect();
    match parts.as_slice() {
        [a, b, c] => Some([a, b, c]),
        _ => None,
    }
}

/// Format hours as `HHhMMmSS.Ss`.
pub fn format_hms(hours: Hour) -> String {
    let total = (hours.rem_euclid(24.0) * 36_000.0).round() as i64;
    let (h, rest) = (total / 36_000, total % 36_000);
    let (m, tenths) = (rest / 600, rest % 600);
    format!("{:02}h{:02}m{:02}.{}s", h, m, tenths / 10, tenths % 10)
}

/// Format degrees as `±DDdMMmSSs`.
pub fn format_dms(degrees: Degree) -> String {
    let sign = if degrees < 0.0 { '-' } else { '+' };
    let total = (degrees.abs() * 3_600.0).round() as i64;
    let (d, rest) = (total / 3_600, total % 3_600);
    format!("{}{:02}d{:02}m{:02}s", sign, d, rest / 60, rest % 60)
}

#[cfg(test)]
mod conversion_test {
    use super::*;

    #[test]
    fn test_parse_ra_hms() {
        assert_eq!(parse_ra_hms("22:52:23.37"), Some(22.873158333333333));
        assert_eq!(parse_ra_hms("06 00 00"), Some(6.0));
        assert_eq!(parse_ra_hms("1:2"), None);
        assert_eq!(parse_ra_hms("1:61:00"), None);
        assert_eq!(parse_ra_hms("1:2:3.4.5"), None);
    }

    #[test]
    fn test_parse_dec_dms() {
        assert_eq!(parse_dec_dms("-00:30:00"), Some(-0.5));
        assert_eq!(parse_dec_dms("+13:55:42.7"), Some(13.928527777777777));
        assert_eq!(parse_dec_dms("89 15 50.2"), Some(89.26394444444445));
        assert_eq!(parse_dec_dms("89:15"), None);
    }

    #[test]
    fn test_format() {
        assert_eq!(format_hms(5.5), "05h30m00.0s");
        assert_eq!(format_dms(-23.5), "-23d30m00s");
        assert_eq!(format_dms(34.0), "+34d00m00s");
    }
}
