use std::io::Write;
use std::sync::{Arc, Mutex};

use log::{info, warn};
use serde_json::{Map, Value};
use serialport::SerialPort;

use crate::broadcaster::Broadcaster;
use crate::message::Record;
use crate::stats::StatsTracker;

/// Connection lifecycle of the serial link.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Streaming,
    Closing,
    Faulted,
}

/// Shared pipeline state handed to every component. Cloning is cheap; all
/// clones observe the same stats, latest-state cache, subscriber set, and
/// serial writer.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

struct Inner {
    tracker: Mutex<StatsTracker>,
    latest: Mutex<Map<String, Value>>,
    broadcaster: Broadcaster,
    writer: Mutex<Option<Box<dyn SerialPort>>>,
    link_state: Mutex<LinkState>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                tracker: Mutex::new(StatsTracker::new()),
                latest: Mutex::new(Map::new()),
                broadcaster: Broadcaster::new(),
                writer: Mutex::new(None),
                link_state: Mutex::new(LinkState::Disconnected),
            }),
        }
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.inner.broadcaster
    }

    /// Run `f` under the stats lock. Keeps one message's stats mutations
    /// (sequence update plus RSSI append) atomic for concurrent readers.
    pub fn with_tracker<R>(&self, f: impl FnOnce(&mut StatsTracker) -> R) -> R {
        f(&mut self.inner.tracker.lock().expect("stats lock poisoned"))
    }

    /// Merge every non-null field of a serialized record into the
    /// latest-state cache. Only keepalive records go through here; the
    /// cache is never cleared.
    pub fn merge_latest(&self, record: &Record) {
        if let Ok(Value::Object(fields)) = serde_json::to_value(record) {
            let mut latest = self.inner.latest.lock().expect("latest lock poisoned");
            for (key, value) in fields {
                if !value.is_null() {
                    latest.insert(key, value);
                }
            }
        }
    }

    pub fn latest(&self) -> Value {
        Value::Object(self.inner.latest.lock().expect("latest lock poisoned").clone())
    }

    /// Point-in-time snapshot for a newly connected subscriber. Not a
    /// replay: only last-known state, current stats, and the RSSI ring.
    pub fn init_record(&self) -> Record {
        let (stats, rssi_history) = {
            let tracker = self.inner.tracker.lock().expect("stats lock poisoned");
            (tracker.stats(), tracker.rssi_history())
        };
        Record::Init {
            latest: self.latest(),
            stats,
            rssi_history,
        }
    }

    pub fn link_state(&self) -> LinkState {
        *self.inner.link_state.lock().expect("link state lock poisoned")
    }

    pub fn set_link_state(&self, state: LinkState) {
        *self.inner.link_state.lock().expect("link state lock poisoned") = state;
    }

    /// Install the serial writer half used by subscriber `send` commands.
    pub fn attach_writer(&self, port: Box<dyn SerialPort>) {
        *self.inner.writer.lock().expect("writer lock poisoned") = Some(port);
    }

    /// Drop the serial writer; subsequent `write_serial` calls are ignored.
    pub fn detach_writer(&self) {
        *self.inner.writer.lock().expect("writer lock poisoned") = None;
    }

    pub fn serial_connected(&self) -> bool {
        self.inner
            .writer
            .lock()
            .expect("writer lock poisoned")
            .is_some()
    }

    /// Write one line (`text` + `\n`) to the serial port. Ignored when the
    /// port is closed or the text is empty.
    pub fn write_serial(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        let mut guard = self.inner.writer.lock().expect("writer lock poisoned");
        if let Some(port) = guard.as_mut() {
            match port.write_all(format!("{text}\n").as_bytes()) {
                Ok(()) => info!("[SEND] {}", text),
                Err(e) => warn!("serial write failed: {}", e),
            }
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
