//! Whole-store import and export.
//!
//! The payload is a JSON object mapping every persisted key to its value,
//! pretty-printed with two-space indentation.

use serde_json::Value;
use tabdivider_shared::{DividerError, Result};
use tabdivider_storage::StoreKey;
use tracing::{info, instrument, warn};

use crate::divider::Dividers;

impl Dividers {
    /// Serialize every persisted key.
    #[instrument(skip_all)]
    pub async fn export_config(&self) -> Result<String> {
        let snapshot = self.store().snapshot().await?;
        info!(keys = snapshot.len(), "exporting store");
        serde_json::to_string_pretty(&snapshot)
            .map_err(|e| DividerError::Storage(format!("encode export: {e}")))
    }

    /// Write every member of `json` to its key, in key order.
    ///
    /// Keys not present in the payload are kept. Values are written as
    /// given and only checked when read back. Returns the number of keys
    /// written.
    #[instrument(skip_all, fields(bytes = json.len()))]
    pub async fn import_config(&self, json: &str) -> Result<usize> {
        let payload: Value =
            serde_json::from_str(json).map_err(|e| DividerError::parse(e.to_string()))?;
        let Value::Object(entries) = payload else {
            return Err(DividerError::parse("import payload must be a JSON object"));
        };

        let raw = self.store().raw();
        let mut written = 0;
        for (key, value) in entries {
            if StoreKey::parse(&key).is_none() {
                warn!(%key, "importing key outside the divider layout");
            }
            raw.set(&key, value).await?;
            written += 1;
        }
        info!(written, "import complete");
        Ok(written)
    }
}
