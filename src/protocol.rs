//! Text frame grammar spoken by the sensor device.
//!
//! ```text
//! Acc: [ax, ay, az], Gyro: [gx, gy, gz]
//! Acc: [ax, ay, az], Gyro: [gx, gy, gz], Mag: [mx, my, mz]
//! ```
//!
//! Literals must match exactly, including the single space after each comma.
//! Trailing whitespace (a line ending from the sender) is tolerated; anything
//! else after the last bracket rejects the frame.

use serde::Serialize;

use crate::error::FrameError;
use crate::types::Sample3;

const ACC_FIELDS: [&str; 3] = ["Acc x", "Acc y", "Acc z"];
const GYRO_FIELDS: [&str; 3] = ["Gyro x", "Gyro y", "Gyro z"];
const MAG_FIELDS: [&str; 3] = ["Mag x", "Mag y", "Mag z"];

/// One synchronized sample set from the device.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SensorFrame {
    pub accel: Sample3,
    pub gyro: Sample3,
    pub mag: Option<Sample3>,
}

impl SensorFrame {
    pub fn new(accel: Sample3, gyro: Sample3) -> Self {
        SensorFrame { accel, gyro, mag: None }
    }

    pub fn with_mag(mut self, mag: Sample3) -> Self {
        self.mag = Some(mag);
        self
    }

    /// Render the frame in wire format.
    pub fn to_wire(&self) -> String {
        let a = self.accel;
        let g = self.gyro;
        let mut out = format!(
            "Acc: [{}, {}, {}], Gyro: [{}, {}, {}]",
            a.x, a.y, a.z, g.x, g.y, g.z
        );
        if let Some(m) = self.mag {
            out.push_str(&format!(", Mag: [{}, {}, {}]", m.x, m.y, m.z));
        }
        out
    }
}

pub fn parse_frame(input: &str) -> Result<SensorFrame, FrameError> {
    let mut cursor = Cursor { input, pos: 0 };

    let accel = cursor.triple("Acc: [", ACC_FIELDS)?;
    cursor.expect("], ")?;
    let gyro = cursor.triple("Gyro: [", GYRO_FIELDS)?;
    cursor.expect("]")?;

    let mut frame = SensorFrame::new(accel, gyro);
    if !cursor.at_end() {
        cursor.expect(", ")?;
        frame.mag = Some(cursor.triple("Mag: [", MAG_FIELDS)?);
        cursor.expect("]")?;
    }

    if !cursor.at_end() {
        return Err(FrameError::TrailingInput { offset: cursor.pos });
    }
    Ok(frame)
}

struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.rest().trim_end().is_empty()
    }

    fn expect(&mut self, literal: &'static str) -> Result<(), FrameError> {
        if self.rest().starts_with(literal) {
            self.pos += literal.len();
            Ok(())
        } else {
            Err(FrameError::MissingLiteral {
                expected: literal,
                offset: self.pos,
            })
        }
    }

    fn number(&mut self, field: &'static str) -> Result<f32, FrameError> {
        let rest = self.rest();
        let end = rest.find(|c: char| c == ',' || c == ']').unwrap_or(rest.len());
        let token = &rest[..end];

        let value: f32 = token.parse().map_err(|_| FrameError::InvalidNumber {
            field,
            token: token.to_string(),
        })?;
        if !value.is_finite() {
            return Err(FrameError::NonFinite { field, value });
        }

        self.pos += end;
        Ok(value)
    }

    /// `<label>x, y, z` without the closing bracket.
    fn triple(&mut self, label: &'static str, fields: [&'static str; 3]) -> Result<Sample3, FrameError> {
        self.expect(label)?;
        let x = self.number(fields[0])?;
        self.expect(", ")?;
        let y = self.number(fields[1])?;
        self.expect(", ")?;
        let z = self.number(fields[2])?;
        Ok(Sample3::new(x, y, z))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_three_axis_frame() {
        let frame = parse_frame("Acc: [1.0, 2.0, 3.0], Gyro: [0.1, 0.2, 0.3]").unwrap();
        assert_eq!(frame.accel, Sample3::new(1.0, 2.0, 3.0));
        assert_eq!(frame.gyro, Sample3::new(0.1, 0.2, 0.3));
        assert_eq!(frame.mag, None);
    }

    #[test]
    fn test_parse_magnetometer_frame() {
        let frame = parse_frame(
            "Acc: [-0.02, 0.15, -9.81], Gyro: [1.5e-2, 0, -3], Mag: [22.5, -4.25, 41]",
        )
        .unwrap();
        assert_eq!(frame.accel, Sample3::new(-0.02, 0.15, -9.81));
        assert_eq!(frame.gyro, Sample3::new(0.015, 0.0, -3.0));
        assert_eq!(frame.mag, Some(Sample3::new(22.5, -4.25, 41.0)));
    }

    #[test]
    fn test_trailing_newline_tolerated() {
        assert!(parse_frame("Acc: [1, 2, 3], Gyro: [4, 5, 6]\r\n").is_ok());
    }

    #[test]
    fn test_truncated_frame_rejected() {
        let err = parse_frame("Acc: [1,2]").unwrap_err();
        assert_eq!(err, FrameError::MissingLiteral { expected: ", ", offset: 7 });
    }

    #[test]
    fn test_non_numeric_token_rejected() {
        let err = parse_frame("Acc: [1.0, abc, 3.0], Gyro: [0.1, 0.2, 0.3]").unwrap_err();
        assert_eq!(
            err,
            FrameError::InvalidNumber { field: "Acc y", token: "abc".to_string() }
        );
    }

    #[test]
    fn test_non_finite_rejected() {
        let err = parse_frame("Acc: [1.0, 2.0, 3.0], Gyro: [nan, 0.2, 0.3]").unwrap_err();
        assert!(matches!(err, FrameError::NonFinite { field: "Gyro x", .. }));
        assert!(parse_frame("Acc: [inf, 2.0, 3.0], Gyro: [0.1, 0.2, 0.3]").is_err());
    }

    #[test]
    fn test_malformed_structure_rejected() {
        let cases = [
            "",
            "Acc: [1.0, 2.0, 3.0]",
            "Acc: [1.0, 2.0, 3.0], Gyro: [0.1, 0.2, 0.3",
            "Acc: [1.0, 2.0, 3.0, 4.0], Gyro: [0.1, 0.2, 0.3]",
            "Acc: [1.0,2.0,3.0], Gyro: [0.1,0.2,0.3]",
            "acc: [1.0, 2.0, 3.0], Gyro: [0.1, 0.2, 0.3]",
            "Acc: [1.0, 2.0, 3.0], Gyro: [0.1, 0.2, 0.3], Mag: [1.0, 2.0]",
            "Acc: [1.0, 2.0, 3.0], Gyro: [0.1, 0.2, 0.3]; extra",
            "Acc: [ 1.0, 2.0, 3.0], Gyro: [0.1, 0.2, 0.3]",
        ];
        for case in cases {
            assert!(parse_frame(case).is_err(), "accepted malformed frame {:?}", case);
        }
    }

    #[test]
    fn test_wire_format_parses_back() {
        let frame = SensorFrame::new(Sample3::new(0.5, -1.25, 9.75), Sample3::new(0.0, 10.0, -0.125))
            .with_mag(Sample3::new(1.0, 2.0, 3.0));
        let wire = frame.to_wire();
        assert_eq!(
            wire,
            "Acc: [0.5, -1.25, 9.75], Gyro: [0, 10, -0.125], Mag: [1, 2, 3]"
        );
        assert_eq!(parse_frame(&wire).unwrap(), frame);
    }
}
