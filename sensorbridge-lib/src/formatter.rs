use crate::context::Context;
use crate::message::{ProtocolMessage, Record};

/// Turn one parsed message into the record broadcast to subscribers,
/// folding its side effects (stats update, RSSI history, latest-state
/// cache) into the shared context.
///
/// Only keepalives and acks feed the sequence statistics; button events
/// bypass them and bump `button_count` instead.
pub fn format_record(ctx: &Context, msg: ProtocolMessage) -> Record {
    match msg {
        ProtocolMessage::Keepalive {
            seq,
            rssi,
            battery_mv,
            temp_centi,
            humidity_centi,
            light_centi,
        } => {
            let stats = ctx.with_tracker(|tracker| {
                let stats = seq.map(|s| tracker.update(s));
                if let (Some(s), Some(r)) = (seq, rssi) {
                    tracker.push_rssi(s, r);
                }
                stats
            });
            let record = Record::Keepalive {
                seq,
                rssi,
                battery_mv,
                temp_c: centi(temp_centi),
                humidity_pct: centi(humidity_centi),
                light_lux: centi(light_centi),
                stats,
            };
            ctx.merge_latest(&record);
            record
        }
        ProtocolMessage::Button { seq, button_id } => {
            let stats = ctx.with_tracker(|tracker| tracker.bump_button());
            Record::Button {
                seq,
                button_id,
                stats,
            }
        }
        ProtocolMessage::Ack { seq, rssi } => {
            let stats = seq.map(|s| ctx.with_tracker(|tracker| tracker.update(s)));
            Record::Ack { seq, rssi, stats }
        }
        ProtocolMessage::Log { message } => Record::Log { message },
        ProtocolMessage::Unknown { raw } => Record::Unknown { raw },
    }
}

/// Centi-unit wire values become decimals; absent stays absent, never zero.
fn centi(value: Option<i64>) -> Option<f64> {
    value.map(|v| v as f64 / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn keepalive(seq: i64, rssi: i64) -> ProtocolMessage {
        ProtocolMessage::Keepalive {
            seq: Some(seq),
            rssi: Some(rssi),
            battery_mv: None,
            temp_centi: None,
            humidity_centi: None,
            light_centi: None,
        }
    }

    #[test]
    fn keepalive_converts_centi_units() {
        let ctx = Context::new();
        let record = format_record(
            &ctx,
            ProtocolMessage::Keepalive {
                seq: Some(5),
                rssi: None,
                battery_mv: None,
                temp_centi: Some(2500),
                humidity_centi: Some(6550),
                light_centi: None,
            },
        );
        let Record::Keepalive {
            temp_c,
            humidity_pct,
            light_lux,
            stats,
            ..
        } = record
        else {
            panic!("expected keepalive record");
        };
        assert_eq!(temp_c, Some(25.0));
        assert_eq!(humidity_pct, Some(65.5));
        assert_eq!(light_lux, None);
        assert_eq!(stats.map(|s| s.received), Some(1));
    }

    #[test]
    fn keepalive_updates_latest_and_rssi_history() {
        let ctx = Context::new();
        format_record(&ctx, keepalive(0, -70));
        format_record(&ctx, keepalive(1, -72));

        assert_eq!(ctx.latest()["rssi"], -72);
        let history = ctx.with_tracker(|t| t.rssi_history());
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].rssi, -72);
    }

    #[test]
    fn keepalive_without_seq_skips_stats() {
        let ctx = Context::new();
        let record = format_record(
            &ctx,
            ProtocolMessage::Keepalive {
                seq: None,
                rssi: Some(-60),
                battery_mv: None,
                temp_centi: None,
                humidity_centi: None,
                light_centi: None,
            },
        );
        let Record::Keepalive { stats, .. } = record else {
            panic!("expected keepalive record");
        };
        assert!(stats.is_none());
        // No seq means no RSSI sample either.
        assert!(ctx.with_tracker(|t| t.rssi_history()).is_empty());
    }

    #[test]
    fn button_bumps_count_but_not_sequence_stats() {
        let ctx = Context::new();
        format_record(&ctx, keepalive(0, -70));
        let record = format_record(
            &ctx,
            ProtocolMessage::Button {
                seq: Some(99),
                button_id: Some(0),
            },
        );
        let Record::Button { stats, .. } = record else {
            panic!("expected button record");
        };
        assert_eq!(stats.button_count, 1);
        assert_eq!(stats.received, 1);
        assert_eq!(stats.last_seq, Some(0));
    }

    #[test]
    fn ack_carries_stats_snapshot() {
        let ctx = Context::new();
        format_record(&ctx, keepalive(0, -70));
        let record = format_record(
            &ctx,
            ProtocolMessage::Ack {
                seq: Some(2),
                rssi: Some(-30),
            },
        );
        let Record::Ack { stats, .. } = record else {
            panic!("expected ack record");
        };
        let stats = stats.unwrap();
        assert_eq!(stats.received, 2);
        assert_eq!(stats.expected, 3);
        assert_eq!(stats.prr, 66.7);
    }

    #[test]
    fn log_and_unknown_pass_through() {
        let ctx = Context::new();
        assert_eq!(
            format_record(
                &ctx,
                ProtocolMessage::Log {
                    message: "boot".into()
                }
            ),
            Record::Log {
                message: "boot".into()
            }
        );
        let raw = json!({"t": "x", "z": 1});
        assert_eq!(
            format_record(&ctx, ProtocolMessage::Unknown { raw: raw.clone() }),
            Record::Unknown { raw }
        );
    }
}
