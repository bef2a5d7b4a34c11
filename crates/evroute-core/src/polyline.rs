//! Encoded polyline codec (precision 5), as returned by the Directions API.

use crate::models::LatLng;
use thiserror::Error;

const PRECISION: f64 = 1e5;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolylineError {
    #[error("invalid polyline character {ch:?} at byte {index}")]
    InvalidCharacter { ch: char, index: usize },
    #[error("polyline ended in the middle of a value")]
    Truncated,
    #[error("polyline value overflows at byte {0}")]
    Overflow(usize),
}

pub fn decode(encoded: &str) -> Result<Vec<LatLng>, PolylineError> {
    let bytes = encoded.as_bytes();
    let mut index = 0usize;
    let mut lat = 0i64;
    let mut lng = 0i64;
    let mut points = Vec::new();

    while index < bytes.len() {
        let start = index;
        lat = lat
            .checked_add(next_value(bytes, &mut index)?)
            .ok_or(PolylineError::Overflow(start))?;
        let start = index;
        lng = lng
            .checked_add(next_value(bytes, &mut index)?)
            .ok_or(PolylineError::Overflow(start))?;
        points.push(LatLng::new(lat as f64 / PRECISION, lng as f64 / PRECISION));
    }

    Ok(points)
}

fn next_value(bytes: &[u8], index: &mut usize) -> Result<i64, PolylineError> {
    let mut result = 0i64;
    let mut shift = 0u32;
    loop {
        let Some(&byte) = bytes.get(*index) else {
            return Err(PolylineError::Truncated);
        };
        if !(63..=126).contains(&byte) {
            return Err(PolylineError::InvalidCharacter {
                ch: byte as char,
                index: *index,
            });
        }
        if shift > 60 {
            return Err(PolylineError::Overflow(*index));
        }
        *index += 1;
        let chunk = (byte - 63) as i64;
        result |= (chunk & 0x1f) << shift;
        shift += 5;
        if chunk < 0x20 {
            break;
        }
    }
    Ok(if result & 1 == 1 { !(result >> 1) } else { result >> 1 })
}

pub fn encode(points: &[LatLng]) -> String {
    let mut out = String::new();
    let mut prev_lat = 0i64;
    let mut prev_lng = 0i64;
    for point in points {
        let lat = (point.lat * PRECISION).round() as i64;
        let lng = (point.lng * PRECISION).round() as i64;
        push_value(&mut out, lat - prev_lat);
        push_value(&mut out, lng - prev_lng);
        prev_lat = lat;
        prev_lng = lng;
    }
    out
}

fn push_value(out: &mut String, value: i64) {
    let mut v = if value < 0 { !(value << 1) } else { value << 1 };
    while v >= 0x20 {
        out.push((((v & 0x1f) | 0x20) as u8 + 63) as char);
        v >>= 5;
    }
    out.push((v as u8 + 63) as char);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_reference_polyline() {
        // Reference example from the polyline algorithm documentation.
        let points = decode("_p~iF~ps|U_ulLnnqC_mqNvxq`@").unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[0], LatLng::new(38.5, -120.2));
        assert_eq!(points[1], LatLng::new(40.7, -120.95));
        assert_eq!(points[2], LatLng::new(43.252, -126.453));
    }

    #[test]
    fn encodes_reference_polyline() {
        let points = [
            LatLng::new(38.5, -120.2),
            LatLng::new(40.7, -120.95),
            LatLng::new(43.252, -126.453),
        ];
        assert_eq!(encode(&points), "_p~iF~ps|U_ulLnnqC_mqNvxq`@");
    }

    #[test]
    fn empty_input_is_empty_path() {
        assert!(decode("").unwrap().is_empty());
        assert_eq!(encode(&[]), "");
    }

    #[test]
    fn rejects_truncated_and_invalid_input() {
        assert_eq!(decode("_p~iF~ps|"), Err(PolylineError::Truncated));
        assert!(matches!(
            decode("_p~iF ps|U"),
            Err(PolylineError::InvalidCharacter { ch: ' ', index: 5 })
        ));
    }

    #[test]
    fn running_sum_overflow_is_an_error() {
        // Each latitude delta is 13 chars, each zero longitude delta is 1.
        let mut encoded = String::new();
        for _ in 0..3 {
            push_value(&mut encoded, (1i64 << 62) - 1);
            push_value(&mut encoded, 0);
        }
        assert_eq!(encoded.len(), 42);
        assert_eq!(decode(&encoded), Err(PolylineError::Overflow(28)));
    }
}
