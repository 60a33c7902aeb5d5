//! Versioned context snapshots
//!
//! Snapshots are stored on decision audits and are the input to replay, so
//! they carry a `format` tag. Decoding accepts the current format and the
//! untagged layout written before tags were introduced; unknown fields are
//! ignored and missing fields fall back to the `ClaimContext` defaults.

use serde::{Deserialize, Serialize};

use crate::context::ClaimContext;
use crate::error::ClaimError;

/// Format tag written by this build
pub const CONTEXT_SNAPSHOT_FORMAT: &str = "claim_context/v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub format: String,
    pub context: ClaimContext,
}

impl ContextSnapshot {
    pub fn capture(context: &ClaimContext) -> Self {
        Self {
            format: CONTEXT_SNAPSHOT_FORMAT.to_string(),
            context: context.clone(),
        }
    }

    pub fn encode(&self) -> Result<String, ClaimError> {
        serde_json::to_string(self).map_err(|e| ClaimError::Snapshot(e.to_string()))
    }

    pub fn to_value(&self) -> Result<serde_json::Value, ClaimError> {
        serde_json::to_value(self).map_err(|e| ClaimError::Snapshot(e.to_string()))
    }

    /// Decodes a stored snapshot from its JSON text
    pub fn decode(raw: &str) -> Result<Self, ClaimError> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| ClaimError::Snapshot(e.to_string()))?;
        Self::from_value(value)
    }

    /// Decodes a stored snapshot.
    ///
    /// # Errors
    ///
    /// `UnsupportedSnapshotFormat` for a tag from another schema family or a
    /// newer version, `Snapshot` for anything that is not a context object.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ClaimError> {
        let format = value.get("format").and_then(|f| f.as_str()).map(str::to_owned);
        match format.as_deref() {
            Some(CONTEXT_SNAPSHOT_FORMAT) => {
                serde_json::from_value(value).map_err(|e| ClaimError::Snapshot(e.to_string()))
            }
            Some(other) => Err(ClaimError::UnsupportedSnapshotFormat(other.to_string())),
            None => {
                let context: ClaimContext = serde_json::from_value(value)
                    .map_err(|e| ClaimError::Snapshot(e.to_string()))?;
                Ok(Self::capture(&context))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::Amount;

    #[test]
    fn test_encode_then_decode_preserves_context() {
        let mut ctx = ClaimContext::default();
        ctx.requested_amount = Amount::new(1_000_000);
        ctx.notes.push("emergency".into());

        let raw = ContextSnapshot::capture(&ctx).encode().unwrap();
        assert!(raw.contains(CONTEXT_SNAPSHOT_FORMAT));
        assert_eq!(ContextSnapshot::decode(&raw).unwrap().context, ctx);
    }

    #[test]
    fn test_untagged_legacy_snapshot_is_accepted() {
        let snapshot = ContextSnapshot::decode(r#"{"requested_amount": 42}"#).unwrap();
        assert_eq!(snapshot.format, CONTEXT_SNAPSHOT_FORMAT);
        assert_eq!(snapshot.context.requested_amount, Amount::new(42));
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        let err = ContextSnapshot::decode(r#"{"format": "claim_context/v9", "context": {}}"#)
            .unwrap_err();
        assert!(matches!(err, ClaimError::UnsupportedSnapshotFormat(f) if f == "claim_context/v9"));
    }
}
