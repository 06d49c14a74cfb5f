//! APRS position report encoding.
//!
//! ```text
//! N0CALL-10>TRCCAR,TCPIP*:/090507h4330.00N/01115.00W[092/013/A=000405 comment !w!!!
//!           ^ path        ^ time ^ lat   ^ ^ lon    ^ ^ crs/spd  ^ alt (ft)   ^ datum
//! ```
//!
//! Coordinates carry two decimal places of minutes. The next two digits are
//! scaled to base-91 and sent in the `!wXY!` datum extension.

use super::AprsIdentity;
use crate::event::PositionRecord;

/// Destination and path of every packet
pub const TOCALL: &str = "TRCCAR,TCPIP*";

const METRES_PER_FOOT: f64 = 0.3048;

/// Encodes a timestamped position report with altitude, course/speed and
/// the WGS84 precision datum.
pub fn encode_position(identity: &AprsIdentity, record: &PositionRecord) -> String {
    let lat = Coordinate::new(record.latitude);
    let lon = Coordinate::new(record.longitude);

    format!(
        "{from}>{TOCALL}:/{time}h{lat}{table}{lon}{symbol}{course_speed}/A={alt} {comment} !w{lat_prec}{lon_prec}!",
        from = identity.fromcall,
        time = record.fix_time.format("%H%M%S"),
        lat = lat.latitude(),
        table = identity.symbol_table,
        lon = lon.longitude(),
        symbol = identity.symbol,
        course_speed = course_speed(record.course, record.speed),
        alt = altitude_feet(record.altitude),
        comment = identity.comment,
        lat_prec = lat.precision(),
        lon_prec = lon.precision(),
    )
}

struct Coordinate {
    value: f64,
    degrees: u32,
    /// Minutes with four decimals, zero padded to seven characters
    minutes: String,
}

impl Coordinate {
    fn new(value: f64) -> Self {
        let minutes = (value - value.trunc()).abs() * 60.0;
        Coordinate {
            value,
            degrees: value.trunc().abs() as u32,
            minutes: format!("{minutes:07.4}"),
        }
    }

    /// `MM.MM`
    fn minute_field(&self) -> &str {
        &self.minutes[..5]
    }

    /// `DDMM.MMN` or `DDMM.MMS`
    fn latitude(&self) -> String {
        let hemisphere = if self.value > 0.0 { 'N' } else { 'S' };
        format!("{:02}{}{}", self.degrees, self.minute_field(), hemisphere)
    }

    /// `DDDMM.MME` or `DDDMM.MMW`
    fn longitude(&self) -> String {
        let hemisphere = if self.value < 0.0 { 'W' } else { 'E' };
        format!("{:03}{}{}", self.degrees, self.minute_field(), hemisphere)
    }

    /// Thousandths and ten-thousandths of a minute, 00-99 scaled to 0-90 and
    /// offset into printable base-91.
    fn precision(&self) -> char {
        let digits = &self.minutes[self.minutes.len() - 2..];
        let hundredths: f64 = digits.parse().unwrap_or(0.0);
        let scaled = (hundredths / 1.10).round_ties_even() as u8;
        char::from(scaled + 33)
    }
}

/// Feet, six digits. Missing altitude encodes as zero.
fn altitude_feet(altitude: Option<f64>) -> String {
    let feet = altitude.map_or(0, |metres| (metres / METRES_PER_FOOT).round_ties_even() as i64);
    format!("{feet:06}")
}

/// `CCC/SSS` with speed in knots, or `000/000` unless both are known
fn course_speed(course: Option<f64>, speed: Option<f64>) -> String {
    match (course, speed) {
        (Some(course), Some(speed)) => format!(
            "{:03}/{:03}",
            course.trunc() as i64,
            speed.round_ties_even() as i64
        ),
        _ => "000/000".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::InboundEvent;
    use crate::testutils::sample_event;
    use chrono::DateTime;

    fn identity() -> AprsIdentity {
        AprsIdentity::parse("N0CALL 12345 N0CALL-10 /[ Traccar position").unwrap()
    }

    fn record() -> PositionRecord {
        InboundEvent::from_value(sample_event())
            .unwrap()
            .position_record()
            .unwrap()
    }

    #[test]
    fn test_encode_fixture() {
        assert_eq!(
            encode_position(&identity(), &record()),
            "N0CALL-10>TRCCAR,TCPIP*:/090507h4330.00N/01115.00W[092/013/A=000405 Traccar position !w!!!"
        );
    }

    #[test]
    fn test_encode_with_precision_digits() {
        let mut record = record();
        record.latitude = 48.1173;
        record.longitude = 11.5167;
        record.altitude = None;
        record.course = Some(359.9);
        record.speed = Some(2.5);
        record.fix_time = DateTime::parse_from_rfc3339("2024-03-01T23:59:01+02:00").unwrap();

        let identity = AprsIdentity::parse("N0CALL 12345 N0CALL-9 \\> ").unwrap();
        assert_eq!(
            encode_position(&identity, &record),
            "N0CALL-9>TRCCAR,TCPIP*:/235901h4807.03N\\01131.00E>359/002/A=000000  !wj3!"
        );
    }

    #[test]
    fn test_coordinate_fields() {
        let lat = Coordinate::new(43.5);
        assert_eq!(lat.latitude(), "4330.00N");
        let lon = Coordinate::new(-11.25);
        assert_eq!(lon.longitude(), "01115.00W");

        assert_eq!(Coordinate::new(-33.8688).latitude(), "3352.12S");
        assert_eq!(Coordinate::new(151.2093).longitude(), "15112.55E");
        assert_eq!(Coordinate::new(5.5).latitude(), "0530.00N");
        assert_eq!(Coordinate::new(0.0).latitude(), "0000.00S");
        assert_eq!(Coordinate::new(0.0).longitude(), "00000.00E");
        assert_eq!(Coordinate::new(-0.5).longitude(), "00030.00W");
    }

    #[test]
    fn test_precision_char() {
        // 52.1280 minutes: digits 80 -> 73 -> 'j'
        assert_eq!(Coordinate::new(-33.8688).precision(), 'j');
        assert_eq!(Coordinate::new(43.5).precision(), '!');
    }

    #[test]
    fn test_altitude() {
        assert_eq!(altitude_feet(Some(123.4)), "000405");
        assert_eq!(altitude_feet(Some(0.0)), "000000");
        assert_eq!(altitude_feet(Some(3048.0)), "010000");
        assert_eq!(altitude_feet(None), "000000");
    }

    #[test]
    fn test_course_speed() {
        assert_eq!(course_speed(Some(92.0), Some(12.6)), "092/013");
        assert_eq!(course_speed(Some(7.9), Some(0.4)), "007/000");
        assert_eq!(course_speed(None, Some(12.6)), "000/000");
        assert_eq!(course_speed(Some(92.0), None), "000/000");
        assert_eq!(course_speed(None, None), "000/000");
    }

    #[test]
    fn test_missing_course_in_packet() {
        let mut record = record();
        record.course = None;
        let packet = encode_position(&identity(), &record);
        assert!(packet.contains("W[000/000/A=000405 "), "{packet}");
    }

    #[test]
    fn test_fixed_width_fields() {
        let mut lat = -89.99;
        while lat < 90.0 {
            let field = Coordinate::new(lat).latitude();
            assert_eq!(field.len(), 8, "{lat} -> {field}");
            assert!(field[..4].bytes().all(|b| b.is_ascii_digit()), "{field}");
            assert_eq!(&field[4..5], ".");
            assert!(field[5..7].bytes().all(|b| b.is_ascii_digit()), "{field}");
            assert_eq!(field.ends_with('N'), lat > 0.0, "{lat} -> {field}");
            lat += 0.377;
        }

        let mut lon = -179.99;
        while lon < 180.0 {
            let coordinate = Coordinate::new(lon);
            let field = coordinate.longitude();
            assert_eq!(field.len(), 9, "{lon} -> {field}");
            assert!(field[..5].bytes().all(|b| b.is_ascii_digit()), "{field}");
            assert_eq!(&field[5..6], ".");
            assert_eq!(field.ends_with('W'), lon < 0.0, "{lon} -> {field}");
            assert!(('!'..='{').contains(&coordinate.precision()));
            lon += 0.713;
        }
    }

    #[test]
    fn test_standard_parser_recovers_position() {
        use aprs_parser::{AprsData, AprsPacket};

        let fixtures = [
            (43.5, -11.25, Some(123.4)),
            (48.1173, 11.5167, Some(519.0)),
            (-33.8688, 151.2093, None),
            (64.1466, -21.9426, Some(8848.86)),
            (0.0, 0.0, Some(0.0)),
            (-0.5, -0.5, Some(12.0)),
            (89.9999, 179.9999, Some(1.0)),
        ];

        for (latitude, longitude, altitude) in fixtures {
            let mut record = record();
            record.latitude = latitude;
            record.longitude = longitude;
            record.altitude = altitude;

            let packet = encode_position(&identity(), &record);
            let decoded = AprsPacket::decode_textual(packet.as_bytes())
                .unwrap_or_else(|e| panic!("{packet}: {e}"));
            let AprsData::Position(position) = decoded.data else {
                panic!("{packet} did not decode as a position");
            };

            let tolerance = 0.01 / 60.0;
            let lat = position.latitude.value();
            let lon = position.longitude.value();
            assert!((lat - latitude).abs() < tolerance, "{lat} vs {latitude}");
            assert!((lon - longitude).abs() < tolerance, "{lon} vs {longitude}");
            assert_eq!(position.symbol_table, '/');
            assert_eq!(position.symbol_code, '[');

            let comment = String::from_utf8(position.comment).unwrap();
            let feet = altitude.map_or(0, |m| (m / METRES_PER_FOOT).round_ties_even() as i64);
            assert!(comment.contains(&format!("/A={feet:06}")), "{comment}");
            let lat_field = Coordinate::new(latitude);
            let lon_field = Coordinate::new(longitude);
            assert!(
                comment.ends_with(&format!(
                    "!w{}{}!",
                    lat_field.precision(),
                    lon_field.precision()
                )),
                "{comment}"
            );
        }
    }
}
