//! Structured error types for the engine.
//!
//! Three error kinds, all raised synchronously before or during a run with
//! the offending field or candle index attached. Terminal outcomes such as
//! `no_entry` and `data_exhausted` are *not* errors — they are valid
//! `SimulationResult`s.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimulationError {
    /// Malformed definition: bad shape, unknown rule discriminator, or a
    /// field that failed to parse. Raised before any simulation starts.
    #[error("schema error in '{field}': {message}")]
    Schema { field: String, message: String },

    /// Internally contradictory definition, e.g. ladder fractions summing
    /// above 1.0 or a profit target at or below 1x. Raised before any
    /// simulation starts.
    #[error("inconsistent strategy in '{field}': {message}")]
    Consistency { field: String, message: String },

    /// Candle series violates ordering or OHLC invariants. Never repaired:
    /// silent resorting could mask upstream data-quality bugs.
    #[error("bad candle data at index {index}: {message}")]
    InputData { index: usize, message: String },
}

impl SimulationError {
    pub fn schema(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Schema {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn consistency(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Consistency {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn input_data(index: usize, message: impl Into<String>) -> Self {
        Self::InputData {
            index,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_location() {
        let err = SimulationError::consistency("exit[0].multiple", "must be > 1");
        assert!(err.to_string().contains("exit[0].multiple"));

        let err = SimulationError::input_data(7, "duplicate timestamp");
        assert!(err.to_string().contains("index 7"));
    }
}
