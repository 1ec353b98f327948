use crate::engine::{StartReason, TimerEngine};
use tracing::{info, warn};

/// Fixed app_meta key of the persisted anchor
pub const ANCHOR_KEY: &str = "startTime";

/// Decimal Unix-ms timestamp. Anything else is treated as absent.
pub fn parse_anchor(raw: &str) -> Option<i64> {
    raw.trim().parse::<i64>().ok()
}

impl TimerEngine {
    /// Сохранить якорь в БД (перезаписывает безусловно)
    pub fn persist_anchor(&self, anchor_ms: i64) -> Result<(), String> {
        let db = match &self.db {
            Some(db) => db,
            None => return Ok(()), // Нет БД - пропускаем
        };

        db.set_app_meta(ANCHOR_KEY, &anchor_ms.to_string())
            .map_err(|e| format!("Failed to save anchor to DB: {}", e))
    }

    /// Read the persisted anchor. Missing, malformed or unreadable values all come back as None.
    /// GUARD: НИКОГДА не крашиться на ошибке восстановления
    pub fn load_persisted_anchor(&self) -> Option<i64> {
        let db = self.db.as_ref()?;

        match db.get_app_meta(ANCHOR_KEY) {
            Ok(Some(raw)) => {
                let parsed = parse_anchor(&raw);
                if parsed.is_none() {
                    warn!(
                        "[RECOVERY] Ignoring malformed persisted anchor {:?}, not resuming",
                        raw
                    );
                }
                parsed
            }
            Ok(None) => None,
            Err(e) => {
                warn!("[RECOVERY] Failed to read persisted anchor: {}", e);
                None
            }
        }
    }

    /// Resume the previous run from storage, anchored at the stored instant (not at now).
    /// Returns the anchor when a run was resumed.
    pub fn resume_from_persisted(&self) -> Option<i64> {
        let anchor_ms = match self.load_persisted_anchor() {
            Some(anchor_ms) => anchor_ms,
            None => {
                info!("[RECOVERY] No persisted anchor, waiting for start or server");
                return None;
            }
        };

        match self.start_with_reason(anchor_ms, StartReason::Resume) {
            Ok(true) => {
                info!("[RECOVERY] Resumed run from persisted anchor {}", anchor_ms);
                Some(anchor_ms)
            }
            Ok(false) => None,
            Err(e) => {
                warn!("[RECOVERY] Failed to resume run: {}", e);
                None
            }
        }
    }
}
