use serde::{Deserialize, Deserializer, Serialize};

/// Ответ `GET /status`. Эфемерный — не сохраняется.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerStatus {
    #[serde(default, deserialize_with = "null_as_false")]
    pub started: bool,
    /// Seconds measured by the server since its day start; absent or null means 0
    #[serde(default)]
    pub elapsed: Option<f64>,
    #[serde(default, deserialize_with = "null_as_false")]
    pub golden: bool,
}

/// `null` reads as false, same as an absent field
fn null_as_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

impl ServerStatus {
    /// Server-reported elapsed time in milliseconds. Negative or non-finite values count as 0.
    pub fn elapsed_ms(&self) -> i64 {
        match self.elapsed {
            Some(secs) if secs.is_finite() && secs > 0.0 => (secs * 1000.0).round() as i64,
            _ => 0,
        }
    }
}

/// What the rendering layer sees after every surface update
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SurfaceSnapshot {
    pub timer_text: String,
    pub running: bool,
    pub golden: bool,
    pub golden_text: String,
}

/// Desktop notification request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationRequest {
    pub title: String,
    pub body: String,
}
