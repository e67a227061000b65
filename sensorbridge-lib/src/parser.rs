use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::message::ProtocolMessage;

/// Matches the log-embedded form, e.g.
/// `[INFO: App       ] Rx '{"t":"a","s":0,"r":-28}' rssi=-26 from fd00::1`.
/// The group runs to the first closing quote, so the JSON must not itself
/// contain a single quote.
static RX_EMBEDDED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Rx '(\{[^']+\})'").expect("embedded-JSON pattern compiles"));

/// Policy for lines that are neither bare JSON nor log-embedded JSON.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fallback {
    /// Surface the trimmed text as a `log` message.
    LogRecord,
    /// Treat the line as unparseable.
    Drop,
}

/// Extract a protocol message from one raw serial line.
///
/// Returns `None` for undecodable bytes, blank lines, and malformed JSON;
/// the `fallback` policy decides what happens to plain-text lines.
pub fn parse_line(data: &[u8], fallback: Fallback) -> Option<ProtocolMessage> {
    let text = std::str::from_utf8(data).ok()?.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(caps) = RX_EMBEDDED.captures(text) {
        let value: Value = serde_json::from_str(&caps[1]).ok()?;
        return Some(ProtocolMessage::from_value(value));
    }

    if text.starts_with('{') {
        let value: Value = serde_json::from_str(text).ok()?;
        return Some(ProtocolMessage::from_value(value));
    }

    match fallback {
        Fallback::LogRecord => Some(ProtocolMessage::Log {
            message: text.to_owned(),
        }),
        Fallback::Drop => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_ack() {
        let data =
            b"[INFO: App       ] Rx '{\"t\":\"a\",\"s\":0,\"r\":-28}' rssi=-26 from fd00::212:4b00:1cab:6bc0\n";
        assert_eq!(
            parse_line(data, Fallback::Drop),
            Some(ProtocolMessage::Ack {
                seq: Some(0),
                rssi: Some(-28),
            })
        );
    }

    #[test]
    fn log_format_keepalive() {
        let data =
            b"[INFO: App       ] Rx '{\"t\":\"k\",\"s\":5,\"r\":-70,\"bat\":3300}' rssi=-65 from fd00::1\n";
        assert_eq!(
            parse_line(data, Fallback::Drop),
            Some(ProtocolMessage::Keepalive {
                seq: Some(5),
                rssi: Some(-70),
                battery_mv: Some(3300),
                temp_centi: None,
                humidity_centi: None,
                light_centi: None,
            })
        );
    }

    #[test]
    fn log_format_button() {
        let data = b"[INFO: App       ] Rx '{\"t\":\"b\",\"s\":3,\"b\":0}' rssi=-50 from fd00::1\n";
        assert_eq!(
            parse_line(data, Fallback::Drop),
            Some(ProtocolMessage::Button {
                seq: Some(3),
                button_id: Some(0),
            })
        );
    }

    #[test]
    fn raw_json() {
        let data = b"{\"t\":\"a\",\"s\":1,\"r\":-30}\n";
        assert_eq!(
            parse_line(data, Fallback::Drop),
            Some(ProtocolMessage::Ack {
                seq: Some(1),
                rssi: Some(-30),
            })
        );
    }

    #[test]
    fn empty_lines() {
        assert_eq!(parse_line(b"", Fallback::LogRecord), None);
        assert_eq!(parse_line(b"\n", Fallback::LogRecord), None);
        assert_eq!(parse_line(b"   \n", Fallback::LogRecord), None);
    }

    #[test]
    fn plain_text_dropped() {
        let data = b"[INFO: App       ] Stats: Tx=0 Rx=0\n";
        assert_eq!(parse_line(data, Fallback::Drop), None);
    }

    #[test]
    fn plain_text_wrapped_as_log() {
        let data = b"[INFO: App       ] Stats: Tx=0 Rx=0\n";
        assert_eq!(
            parse_line(data, Fallback::LogRecord),
            Some(ProtocolMessage::Log {
                message: "[INFO: App       ] Stats: Tx=0 Rx=0".to_owned(),
            })
        );
    }

    #[test]
    fn tx_line_has_no_embedded_json() {
        let data = b"[INFO: App       ] Tx keepalive seq=0 rssi=0 tmp=0.-1 hum=0.-1 bat=3015mV\n";
        assert_eq!(parse_line(data, Fallback::Drop), None);
    }

    #[test]
    fn invalid_embedded_json() {
        let data = b"[INFO: App       ] Rx '{invalid}' rssi=-26\n";
        assert_eq!(parse_line(data, Fallback::Drop), None);
        // The embedded form fails hard; it never falls through to the
        // log-record fallback.
        assert_eq!(parse_line(data, Fallback::LogRecord), None);
    }

    #[test]
    fn invalid_bare_json() {
        assert_eq!(parse_line(b"{not json}\n", Fallback::LogRecord), None);
    }

    #[test]
    fn invalid_utf8() {
        assert_eq!(parse_line(b"\xff\xfe invalid bytes", Fallback::LogRecord), None);
    }
}
