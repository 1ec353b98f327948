use crate::models::ServerStatus;
use reqwest::Client;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Ошибки обмена с сервером (для разбора и логирования)
#[derive(Debug)]
pub enum StatusError {
    Network(String),
    Http { status: u16 },
    Parse(String),
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusError::Network(s) => write!(f, "Network: {}", s),
            StatusError::Http { status } => write!(f, "HTTP {}", status),
            StatusError::Parse(s) => write!(f, "Parse status: {}", s),
        }
    }
}

/// Client for the `/start` and `/status` endpoints
#[derive(Clone)]
pub struct StatusClient {
    client: Client,
    base_url: String,
}

impl StatusClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// `GET /status`. Any non-success status is an error; the body is not inspected.
    pub async fn fetch_status(&self) -> Result<ServerStatus, StatusError> {
        let url = format!("{}/status", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| StatusError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(StatusError::Http {
                status: response.status().as_u16(),
            });
        }

        response
            .json::<ServerStatus>()
            .await
            .map_err(|e| StatusError::Parse(e.to_string()))
    }

    /// `POST /start`. Response body is ignored.
    pub async fn notify_start(&self) -> Result<(), StatusError> {
        let url = format!("{}/start", self.base_url);
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| StatusError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(StatusError::Http {
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }

    /// Fire-and-forget start notice: never awaited, never retried.
    /// If it is lost the server does not learn about the run until the next explicit start.
    pub fn notify_start_detached(&self) {
        let client = self.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = client.notify_start().await {
                        debug!("[SYNC] POST /start failed (ignored): {}", e);
                    }
                });
            }
            Err(_) => debug!("[SYNC] No runtime, POST /start skipped"),
        }
    }
}
