//! A trading call: a token flagged at a point in time.

use serde::{Deserialize, Serialize};

/// One call to backtest. `ts` is the reference time in epoch seconds; the
/// engine snaps it forward to the first candle at or after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    pub id: String,
    pub token_address: String,
    pub chain: String,
    pub ts: i64,
    /// Where the call came from (channel, model, feed). Provenance only;
    /// the engine never reads it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}
