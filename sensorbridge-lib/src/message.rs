use serde::Serialize;
use serde_json::Value;

use crate::stats::{PacketStats, RssiSample};

/// One message decoded from the serial link, classified once at the parser
/// boundary so downstream code never re-checks field presence.
///
/// Sensor firmware sends sparse JSON: every field is optional, and an absent
/// field means "not measured", never zero.
#[derive(Clone, Debug, PartialEq)]
pub enum ProtocolMessage {
    /// Periodic message carrying RSSI and environmental readings.
    /// `*_centi` fields are the raw wire values, actual value ×100.
    Keepalive {
        seq: Option<i64>,
        rssi: Option<i64>,
        battery_mv: Option<i64>,
        temp_centi: Option<i64>,
        humidity_centi: Option<i64>,
        light_centi: Option<i64>,
    },
    Button {
        seq: Option<i64>,
        button_id: Option<i64>,
    },
    Ack {
        seq: Option<i64>,
        rssi: Option<i64>,
    },
    /// A non-JSON serial line surfaced verbatim (fallback policy permitting).
    Log { message: String },
    /// JSON with an unrecognized or missing `t` tag; kept as-is.
    Unknown { raw: Value },
}

impl ProtocolMessage {
    /// Classify a decoded JSON object by its `t` type tag.
    pub fn from_value(value: Value) -> Self {
        let tag = value.get("t").and_then(Value::as_str).map(String::from);
        match tag.as_deref() {
            Some("k") => ProtocolMessage::Keepalive {
                seq: int_field(&value, "s"),
                rssi: int_field(&value, "r"),
                battery_mv: int_field(&value, "bat"),
                temp_centi: int_field(&value, "tmp"),
                humidity_centi: int_field(&value, "hum"),
                light_centi: int_field(&value, "lgt"),
            },
            Some("b") => ProtocolMessage::Button {
                seq: int_field(&value, "s"),
                button_id: int_field(&value, "b"),
            },
            Some("a") => ProtocolMessage::Ack {
                seq: int_field(&value, "s"),
                rssi: int_field(&value, "r"),
            },
            _ => ProtocolMessage::Unknown { raw: value },
        }
    }
}

fn int_field(value: &Value, key: &str) -> Option<i64> {
    value.get(key).and_then(Value::as_i64)
}

/// One JSON object per subscriber frame; the `type` tag is the frame
/// discriminator on the wire.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Record {
    /// Point-in-time snapshot sent once to each newly connected subscriber.
    Init {
        latest: Value,
        stats: PacketStats,
        rssi_history: Vec<RssiSample>,
    },
    Keepalive {
        seq: Option<i64>,
        rssi: Option<i64>,
        battery_mv: Option<i64>,
        temp_c: Option<f64>,
        humidity_pct: Option<f64>,
        light_lux: Option<f64>,
        stats: Option<PacketStats>,
    },
    Button {
        seq: Option<i64>,
        button_id: Option<i64>,
        stats: PacketStats,
    },
    Ack {
        seq: Option<i64>,
        rssi: Option<i64>,
        stats: Option<PacketStats>,
    },
    Log { message: String },
    Unknown { raw: Value },
    Error { message: String },
    Pong,
}
