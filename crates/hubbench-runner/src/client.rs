use std::time::{Duration, Instant};

use hubbench_hub::PAGINATION_MEDIA_TYPE;
use serde_json::Value;
use tracing::debug;

use crate::error::ApiError;

/// Authenticated client for the hub's tenant-listing endpoint. One
/// warm-up probe, then fixed measured rounds, each following the
/// pagination cursor to exhaustion.
pub struct ApiClient {
    http: reqwest::Client,
    base: String,
    token: String,
}

impl ApiClient {
    pub fn new(http: reqwest::Client, base: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http,
            base: base.into(),
            token: token.into(),
        }
    }

    pub async fn warm_up(&self) -> Result<(), ApiError> {
        let url = format!("{}/hub/api", self.base);
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ApiError::Status {
                url,
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }

    pub async fn measure(&self, rounds: usize) -> Result<Vec<Duration>, ApiError> {
        self.warm_up().await?;
        let mut samples = Vec::with_capacity(rounds);
        for _ in 0..rounds {
            samples.push(self.measure_round().await?);
        }
        Ok(samples)
    }

    /// One measured round: the first listing request plus every
    /// follow-up page until a response reports a null next cursor. The
    /// cursor must advance strictly, so a round always terminates.
    pub async fn measure_round(&self) -> Result<Duration, ApiError> {
        let started = Instant::now();
        let mut offset: Option<u64> = None;
        let mut pages = 0u64;
        loop {
            let page = self.fetch_users_page(offset).await?;
            pages += 1;
            match next_offset(&page)? {
                None => break,
                Some(next) => {
                    if next <= offset.unwrap_or(0) {
                        return Err(ApiError::CursorStalled { offset: next });
                    }
                    offset = Some(next);
                }
            }
        }
        let elapsed = started.elapsed();
        debug!(pages, elapsed_secs = elapsed.as_secs_f64(), "api round complete");
        Ok(elapsed)
    }

    async fn fetch_users_page(&self, offset: Option<u64>) -> Result<Value, ApiError> {
        let url = format!("{}/hub/api/users", self.base);
        let mut request = self
            .http
            .get(&url)
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", PAGINATION_MEDIA_TYPE);
        if let Some(offset) = offset {
            request = request.query(&[("offset", offset)]);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(ApiError::Status {
                url,
                status: response.status().as_u16(),
            });
        }
        Ok(response.json().await?)
    }
}

/// A response without a `_pagination.next` member is malformed; a null
/// next is the final page.
pub fn next_offset(page: &Value) -> Result<Option<u64>, ApiError> {
    let next = page
        .pointer("/_pagination/next")
        .ok_or(ApiError::MalformedPagination)?;
    match next {
        Value::Null => Ok(None),
        other => other
            .get("offset")
            .and_then(Value::as_u64)
            .map(Some)
            .ok_or(ApiError::MalformedPagination),
    }
}
