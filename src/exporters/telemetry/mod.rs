// SPDX-License-Identifier: Apache-2.0

//! HTTP exporter for log events and metric samples.
//!
//! Events and metric samples are POSTed as JSON to `<endpoint>/v1/events`
//! and `<endpoint>/v1/metrics`. Delivery is at-least-once: a failing batch
//! is retried with exponential backoff and dropped once retries are
//! exhausted, with the failure logged by the caller.

pub mod payload;

use std::time::Duration;

use reqwest::{Client, Url};
use serde::Serialize;
use tower::BoxError;
use tracing::debug;

use crate::tailer::event::LogEvent;
use payload::MetricSample;

const API_KEY_HEADER: &str = "x-api-key";

pub struct TelemetryExporter {
    client: Client,
    events_url: Url,
    metrics_url: Url,
    api_key: Option<String>,
    max_retries: u32,
}

impl TelemetryExporter {
    pub fn new(
        endpoint: &str,
        api_key: Option<String>,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self, BoxError> {
        let base = endpoint.trim_end_matches('/');
        let events_url: Url = format!("{}/v1/events", base).parse()?;
        let metrics_url: Url = format!("{}/v1/metrics", base).parse()?;

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            events_url,
            metrics_url,
            api_key,
            max_retries: max_retries.max(1),
        })
    }

    pub async fn emit_events(&self, events: &[LogEvent]) -> Result<(), BoxError> {
        self.post_json(self.events_url.clone(), &events).await
    }

    pub async fn emit_metrics(&self, samples: &[MetricSample]) -> Result<(), BoxError> {
        self.post_json(self.metrics_url.clone(), &samples).await
    }

    async fn post_json<T: Serialize + ?Sized>(&self, url: Url, body: &T) -> Result<(), BoxError> {
        let mut last_err: Option<BoxError> = None;

        for attempt in 1..=self.max_retries {
            let mut req = self.client.post(url.clone()).json(body);
            if let Some(key) = &self.api_key {
                req = req.header(API_KEY_HEADER, key);
            }

            match req.send().await {
                Ok(resp) if resp.status().is_success() => {
                    debug!(url = %url, attempt, "Telemetry batch accepted.");
                    return Ok(());
                }
                // 4xx means the payload or credentials are wrong and a
                // retry would fail the same way.
                Ok(resp) if resp.status().is_client_error() => {
                    return Err(format!("backend rejected request: {}", resp.status()).into());
                }
                Ok(resp) => {
                    last_err = Some(format!("backend returned {}", resp.status()).into());
                }
                Err(e) => {
                    last_err = Some(e.into());
                }
            }

            if attempt < self.max_retries {
                let backoff = Duration::from_millis(100 * 2u64.pow(attempt - 1));
                debug!(url = %url, attempt, backoff_ms = backoff.as_millis() as u64,
                    "Telemetry request failed, backing off before retry.");
                tokio::time::sleep(backoff).await;
            }
        }

        Err(last_err.unwrap_or_else(|| "telemetry request failed".into()))
    }
}
