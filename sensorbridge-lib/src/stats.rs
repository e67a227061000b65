use std::collections::VecDeque;

use serde::Serialize;

/// Samples retained in the RSSI history ring.
pub const RSSI_HISTORY_LEN: usize = 60;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct RssiSample {
    pub seq: i64,
    pub rssi: i64,
}

/// Running packet-reception statistics. Never reset during process life;
/// `expected` is the observed sequence-number span, `prr` the reception
/// ratio over it as a percentage with one decimal.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PacketStats {
    pub first_seq: Option<i64>,
    pub last_seq: Option<i64>,
    pub received: u64,
    pub expected: i64,
    pub prr: f64,
    pub button_count: u64,
}

impl Default for PacketStats {
    fn default() -> Self {
        Self {
            first_seq: None,
            last_seq: None,
            received: 0,
            expected: 0,
            prr: 100.0,
            button_count: 0,
        }
    }
}

/// Owns the reception statistics and the RSSI history ring.
#[derive(Debug, Default)]
pub struct StatsTracker {
    stats: PacketStats,
    rssi_history: VecDeque<RssiSample>,
}

impl StatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one observed sequence number into the statistics and return a
    /// copy of the state after the update.
    ///
    /// `last_seq` never moves backward; out-of-order and duplicate lower
    /// sequence numbers still count as received. A wrapped or regressing
    /// counter can therefore push `received` past `expected`, and the
    /// resulting `prr > 100` is deliberate, observable output.
    pub fn update(&mut self, seq: i64) -> PacketStats {
        match self.stats.first_seq {
            None => {
                self.stats.first_seq = Some(seq);
                self.stats.last_seq = Some(seq);
                self.stats.received = 1;
                self.stats.expected = 1;
            }
            Some(first) => {
                self.stats.received += 1;
                let last = self.stats.last_seq.unwrap_or(first).max(seq);
                self.stats.last_seq = Some(last);
                self.stats.expected = last - first + 1;
            }
        }
        if self.stats.expected > 0 {
            self.stats.prr =
                round1(100.0 * self.stats.received as f64 / self.stats.expected as f64);
        }
        self.stats
    }

    /// Count a button event. Buttons bypass sequence tracking entirely.
    pub fn bump_button(&mut self) -> PacketStats {
        self.stats.button_count += 1;
        self.stats
    }

    pub fn stats(&self) -> PacketStats {
        self.stats
    }

    /// Append a keepalive RSSI reading, evicting the oldest past capacity.
    pub fn push_rssi(&mut self, seq: i64, rssi: i64) {
        self.rssi_history.push_back(RssiSample { seq, rssi });
        if self.rssi_history.len() > RSSI_HISTORY_LEN {
            self.rssi_history.pop_front();
        }
    }

    pub fn rssi_history(&self) -> Vec<RssiSample> {
        self.rssi_history.iter().copied().collect()
    }
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}
