use serde::{Deserialize, Serialize};

const IMU_FIELDS: usize = 7;
const DISTANCE_FIELDS: usize = 2;

/// Leading tokens identifying the two sensor nodes sharing the link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTags {
    /// Tag sent by the IMU node.
    pub imu: Box<str>,
    /// Tag sent by the distance node.
    pub distance: Box<str>,
}

impl NodeTags {
    pub fn new(imu: impl Into<Box<str>>, distance: impl Into<Box<str>>) -> Self {
        Self {
            imu: imu.into(),
            distance: distance.into(),
        }
    }
}

impl Default for NodeTags {
    fn default() -> Self {
        Self::new("PICO", "ESP")
    }
}

/// Accelerometer (m/s²) and gyroscope (°/s) axes from the IMU node.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ImuReading {
    pub ax: f64,
    pub ay: f64,
    pub az: f64,
    pub gx: f64,
    pub gy: f64,
    pub gz: f64,
}

/// One node's reading, as carried by a single payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SensorRecord {
    Imu(ImuReading),
    /// Range from the distance node.
    Distance { value: f64 },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("malformed payload {payload:?}: {reason}")]
    MalformedPayload {
        payload: Box<str>,
        reason: &'static str,
    },
    #[error("unknown node tag {tag:?}")]
    UnknownTag { tag: Box<str> },
}

impl SensorRecord {
    /// Parse a comma-delimited payload. A record is accepted only when every
    /// numeric field parses.
    pub fn parse(payload: &str, tags: &NodeTags) -> Result<Self, ParseError> {
        let payload = payload.trim();
        let fields: Vec<&str> = payload.split(',').collect();

        let malformed = |reason| ParseError::MalformedPayload {
            payload: payload.into(),
            reason,
        };

        if fields.len() < 2 {
            return Err(malformed("expected a tag and at least one value"));
        }

        let tag = fields[0].trim();

        if tag == &*tags.imu {
            if fields.len() != IMU_FIELDS {
                return Err(malformed("IMU record needs six values"));
            }
            let mut values = [0f64; IMU_FIELDS - 1];
            for (slot, field) in values.iter_mut().zip(&fields[1..]) {
                *slot = parse_value(field).ok_or_else(|| malformed("invalid IMU value"))?;
            }
            let [ax, ay, az, gx, gy, gz] = values;
            return Ok(SensorRecord::Imu(ImuReading {
                ax,
                ay,
                az,
                gx,
                gy,
                gz,
            }));
        }

        if tag == &*tags.distance {
            if fields.len() != DISTANCE_FIELDS {
                return Err(malformed("distance record needs one value"));
            }
            let value = parse_value(fields[1]).ok_or_else(|| malformed("invalid distance value"))?;
            return Ok(SensorRecord::Distance { value });
        }

        Err(ParseError::UnknownTag { tag: tag.into() })
    }

    /// Render the payload a node would transmit, two decimal places per value.
    pub fn to_payload(&self, tags: &NodeTags) -> String {
        match self {
            SensorRecord::Imu(r) => format!(
                "{},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2}",
                tags.imu, r.ax, r.ay, r.az, r.gx, r.gy, r.gz
            ),
            SensorRecord::Distance { value } => format!("{},{value:.2}", tags.distance),
        }
    }
}

fn parse_value(field: &str) -> Option<f64> {
    field
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags() -> NodeTags {
        NodeTags::new("IMU", "DIST")
    }

    #[test]
    fn parses_imu_record() {
        let record = SensorRecord::parse("IMU,1.0,2.0,3.0,4.0,5.0,6.0", &tags()).unwrap();
        assert_eq!(
            record,
            SensorRecord::Imu(ImuReading {
                ax: 1.0,
                ay: 2.0,
                az: 3.0,
                gx: 4.0,
                gy: 5.0,
                gz: 6.0,
            })
        );
    }

    #[test]
    fn imu_record_with_five_values_is_malformed() {
        let err = SensorRecord::parse("IMU,1.0,2.0,3.0,4.0,5.0", &tags()).unwrap_err();
        assert!(matches!(err, ParseError::MalformedPayload { .. }));
    }

    #[test]
    fn one_bad_value_rejects_whole_record() {
        let err = SensorRecord::parse("IMU,1.0,2.0,x,4.0,5.0,6.0", &tags()).unwrap_err();
        assert!(matches!(err, ParseError::MalformedPayload { .. }));

        let err = SensorRecord::parse("IMU,1.0,2.0,3.0,4.0,5.0,", &tags()).unwrap_err();
        assert!(matches!(err, ParseError::MalformedPayload { .. }));
    }

    #[test]
    fn parses_distance_record() {
        assert_eq!(
            SensorRecord::parse("DIST,42.0", &tags()),
            Ok(SensorRecord::Distance { value: 42.0 })
        );
        assert!(matches!(
            SensorRecord::parse("DIST,42.0,1", &tags()),
            Err(ParseError::MalformedPayload { .. })
        ));
        assert!(matches!(
            SensorRecord::parse("DIST,far", &tags()),
            Err(ParseError::MalformedPayload { .. })
        ));
    }

    #[test]
    fn single_field_is_malformed() {
        assert!(matches!(
            SensorRecord::parse("DIST", &tags()),
            Err(ParseError::MalformedPayload { .. })
        ));
        assert!(matches!(
            SensorRecord::parse("", &tags()),
            Err(ParseError::MalformedPayload { .. })
        ));
    }

    #[test]
    fn unknown_tag() {
        assert_eq!(
            SensorRecord::parse("GPS,1.0,2.0", &tags()),
            Err(ParseError::UnknownTag { tag: "GPS".into() })
        );
    }

    #[test]
    fn non_finite_values_are_rejected() {
        for payload in ["DIST,NaN", "DIST,inf", "DIST,-infinity"] {
            assert!(
                matches!(
                    SensorRecord::parse(payload, &tags()),
                    Err(ParseError::MalformedPayload { .. })
                ),
                "{payload}"
            );
        }
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        assert_eq!(
            SensorRecord::parse("  DIST, 12.5 \r\n", &tags()),
            Ok(SensorRecord::Distance { value: 12.5 })
        );
    }

    #[test]
    fn precision_is_not_assumed() {
        let record = SensorRecord::parse("IMU,0.1,-0.123456,9.8,1,2e1,-3", &tags()).unwrap();
        let SensorRecord::Imu(r) = record else {
            panic!("expected IMU record");
        };
        assert_eq!(r.ay, -0.123456);
        assert_eq!(r.gy, 20.0);
    }

    #[test]
    fn default_tags_follow_deployment() {
        let tags = NodeTags::default();
        assert!(SensorRecord::parse("PICO,0.10,0.20,9.81,1.0,2.0,3.0", &tags).is_ok());
        assert!(SensorRecord::parse("ESP,42.0", &tags).is_ok());
    }

    #[test]
    fn payload_formatting_matches_sender() {
        let record = SensorRecord::Imu(ImuReading {
            ax: 0.1,
            ay: -0.204,
            az: 9.806,
            gx: 1.0,
            gy: 2.0,
            gz: 3.0,
        });
        let payload = record.to_payload(&tags());
        assert_eq!(payload, "IMU,0.10,-0.20,9.81,1.00,2.00,3.00");

        let distance = SensorRecord::Distance { value: 42.0 };
        assert_eq!(distance.to_payload(&tags()), "DIST,42.00");
        assert_eq!(
            SensorRecord::parse(&distance.to_payload(&tags()), &tags()),
            Ok(distance)
        );
    }
}
