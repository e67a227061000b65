//! sensorbridge-lib: serial telemetry parsing, packet statistics, and
//! subscriber fan-out

pub mod broadcaster;
pub mod context;
pub mod formatter;
pub mod message;
pub mod parser;
pub mod serial_stream;
pub mod stats;

// re-exports for ergonomic imports:
pub use broadcaster::{Broadcaster, SendOutcome, SubscriberId};
pub use context::{Context, LinkState};
pub use formatter::format_record;
pub use message::{ProtocolMessage, Record};
pub use parser::{Fallback, parse_line};
pub use serial_stream::{LinkError, SerialSettings, run_serial_and_stream};
pub use stats::{PacketStats, RssiSample, StatsTracker};
