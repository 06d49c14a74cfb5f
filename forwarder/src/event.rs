//! Inbound Traccar event and the flat position record derived from it.
//!
//! Traccar's JSON forwarder posts one object per position:
//!
//! ```json
//! {
//!   "device": {"name": "car", "uniqueId": "123", "status": "online",
//!              "attributes": {"webdav": "https://cloud.example.com/s/abc"}},
//!   "position": {"deviceId": 1, "protocol": "osmand", "valid": true,
//!                "latitude": 43.5, "longitude": 11.25, "altitude": 120.0,
//!                "speed": 10.0, "course": 90.0, "accuracy": 5.0,
//!                "deviceTime": "2024-03-01T10:00:00.000+00:00",
//!                "fixTime": "2024-03-01T10:00:00.000+00:00",
//!                "attributes": {"ignition": true, "motion": true}}
//! }
//! ```
//!
//! Only the fields above are read; everything else is carried untouched in
//! the raw value, which WebDAV and the JSON webhook forward verbatim.

use crate::errors::EventError;
use crate::template::{TemplateValue, TemplateValues};
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

/// A parsed inbound event: the original JSON plus the device attribute map.
#[derive(Clone, Debug)]
pub struct InboundEvent {
    raw: Value,
    attributes: IndexMap<String, Value>,
}

impl InboundEvent {
    pub fn parse(data: &str) -> Result<Self, EventError> {
        let raw: Value = serde_json::from_str(data)?;
        Self::from_value(raw)
    }

    pub fn from_value(raw: Value) -> Result<Self, EventError> {
        if !raw.is_object() {
            return Err(EventError::InvalidField("event is not a JSON object".into()));
        }

        let attributes = match raw.get("device").and_then(|d| d.get("attributes")) {
            None | Some(Value::Null) => IndexMap::new(),
            Some(attributes) => IndexMap::<String, Value>::deserialize(attributes)
                .map_err(|e| EventError::InvalidField(format!("device.attributes: {e}")))?,
        };

        Ok(Self { raw, attributes })
    }

    /// The event exactly as received
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Device attributes in the order they appear in the event
    pub fn attributes(&self) -> &IndexMap<String, Value> {
        &self.attributes
    }

    pub fn position_record(&self) -> Result<PositionRecord, EventError> {
        PositionRecord::from_event(&self.raw)
    }
}

/// Flat view of the fields every destination encoder reads
#[derive(Clone, Debug, PartialEq)]
pub struct PositionRecord {
    pub name: String,
    pub unique_id: String,
    pub status: String,
    pub device_id: i64,
    pub protocol: String,
    pub valid: bool,
    /// Degrees, positive north
    pub latitude: f64,
    /// Degrees, positive east
    pub longitude: f64,
    /// Metres
    pub altitude: Option<f64>,
    /// Knots
    pub speed: Option<f64>,
    /// Degrees
    pub course: Option<f64>,
    pub accuracy: Option<f64>,
    pub device_time: DateTime<FixedOffset>,
    pub fix_time: DateTime<FixedOffset>,
    pub ignition: Option<bool>,
    pub motion: Option<bool>,
}

#[derive(Deserialize)]
struct RawEvent {
    device: RawDevice,
    position: RawPosition,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDevice {
    name: String,
    unique_id: String,
    status: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPosition {
    device_id: i64,
    protocol: String,
    valid: bool,
    latitude: f64,
    longitude: f64,
    altitude: Option<f64>,
    speed: Option<f64>,
    course: Option<f64>,
    accuracy: Option<f64>,
    device_time: String,
    fix_time: String,
    #[serde(default)]
    attributes: RawPositionAttributes,
}

#[derive(Deserialize, Default)]
struct RawPositionAttributes {
    ignition: Option<bool>,
    motion: Option<bool>,
}

impl PositionRecord {
    pub fn from_event(event: &Value) -> Result<Self, EventError> {
        let raw =
            RawEvent::deserialize(event).map_err(|e| EventError::InvalidField(e.to_string()))?;

        let device_time = parse_timestamp(&raw.position.device_time).ok_or_else(|| {
            EventError::InvalidTimestamp {
                field: "deviceTime",
                value: raw.position.device_time.clone(),
            }
        })?;
        let fix_time =
            parse_timestamp(&raw.position.fix_time).ok_or_else(|| EventError::InvalidTimestamp {
                field: "fixTime",
                value: raw.position.fix_time.clone(),
            })?;

        Ok(PositionRecord {
            name: raw.device.name,
            unique_id: raw.device.unique_id,
            status: raw.device.status,
            device_id: raw.position.device_id,
            protocol: raw.position.protocol,
            valid: raw.position.valid,
            latitude: raw.position.latitude,
            longitude: raw.position.longitude,
            altitude: raw.position.altitude,
            speed: raw.position.speed,
            course: raw.position.course,
            accuracy: raw.position.accuracy,
            device_time,
            fix_time,
            ignition: raw.position.attributes.ignition,
            motion: raw.position.attributes.motion,
        })
    }

    /// Every record field by its JSON name, ready for URL templates.
    /// Timestamps become Unix epoch seconds.
    pub fn template_values(&self) -> TemplateValues {
        let optional_float = |v: Option<f64>| v.map_or(TemplateValue::Absent, TemplateValue::Float);
        let optional_bool = |v: Option<bool>| v.map_or(TemplateValue::Absent, TemplateValue::Bool);

        TemplateValues::from([
            ("name", TemplateValue::Str(self.name.clone())),
            ("uniqueId", TemplateValue::Str(self.unique_id.clone())),
            ("status", TemplateValue::Str(self.status.clone())),
            ("deviceId", TemplateValue::Int(self.device_id)),
            ("protocol", TemplateValue::Str(self.protocol.clone())),
            ("valid", TemplateValue::Bool(self.valid)),
            ("latitude", TemplateValue::Float(self.latitude)),
            ("longitude", TemplateValue::Float(self.longitude)),
            ("altitude", optional_float(self.altitude)),
            ("speed", optional_float(self.speed)),
            ("course", optional_float(self.course)),
            ("accuracy", optional_float(self.accuracy)),
            ("deviceTime", TemplateValue::Int(self.device_time.timestamp())),
            ("fixTime", TemplateValue::Int(self.fix_time.timestamp())),
            ("ignition", optional_bool(self.ignition)),
            ("motion", optional_bool(self.motion)),
        ])
    }
}

/// Parses ISO-8601 text into an absolute instant. Text without an offset is taken as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts);
    }

    // Offsets without a colon, e.g. "+0000"
    for format in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"] {
        if let Ok(ts) = DateTime::parse_from_str(value, format) {
            return Some(ts);
        }
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .into_iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc().fixed_offset())
}
