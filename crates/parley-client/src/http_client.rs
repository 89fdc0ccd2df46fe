use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use parley_core::{ChatMessage, RateGovernor, RelayConfig, RelayError, StreamChunk};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

use crate::sse::FrameDecoder;

/// Lazy, finite sequence produced by [`RelayClient::stream`].
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, RelayError>> + Send>>;

#[derive(Serialize)]
struct CompletionPayload<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
    stream: bool,
    max_tokens: u32,
}

impl<'a> CompletionPayload<'a> {
    fn new(config: &'a RelayConfig, messages: &'a [ChatMessage], stream: bool) -> Self {
        Self {
            model: &config.model,
            messages,
            temperature: config.temperature,
            stream,
            max_tokens: config.max_tokens,
        }
    }
}

/// Outbound client for the upstream completion service.
///
/// Cloning is cheap; clones share the connection pool, the rate governor and
/// the concurrency limit.
#[derive(Clone)]
pub struct RelayClient {
    client: Client,
    config: Arc<RelayConfig>,
    governor: Arc<RateGovernor>,
    permits: Arc<Semaphore>,
}

impl RelayClient {
    pub fn new(config: RelayConfig) -> Result<Self, reqwest::Error> {
        let governor = Arc::new(RateGovernor::new(config.governor));
        Self::with_governor(config, governor)
    }

    /// Builds a client that gates through an existing governor.
    pub fn with_governor(
        config: RelayConfig,
        governor: Arc<RateGovernor>,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(config.request_timeout)
            .read_timeout(config.request_timeout)
            .build()?;

        info!(
            "Relay configured: endpoint={}, model={}, key_id={}",
            config.completions_url(),
            config.model,
            key_id(&config.api_key)
        );

        let permits = Arc::new(Semaphore::new(config.max_concurrent_requests.max(1)));
        Ok(Self {
            client,
            config: Arc::new(config),
            governor,
            permits,
        })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn governor(&self) -> &Arc<RateGovernor> {
        &self.governor
    }

    /// Sends the conversation and waits for the full assistant reply.
    ///
    /// 429s, timeouts and connection failures are retried with exponential
    /// backoff; any other failure is returned as soon as it is seen.
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String, RelayError> {
        let payload = CompletionPayload::new(&self.config, messages, false);
        let mut plan = self.config.completion_retry;
        let mut last_error: Option<RelayError> = None;

        while !plan.exhausted() {
            if let Some(delay) = plan.delay_before(plan.attempt) {
                warn!(
                    "Retrying upstream call (attempt {}/{}) after {:.2}s",
                    plan.attempt + 1,
                    plan.max_attempts,
                    delay.as_secs_f64()
                );
                self.governor.clock().sleep(delay).await;
            }
            plan.record_attempt();

            let permit = self.permit().await?;
            self.governor.acquire().await;
            let outcome = self.send_once(&payload).await;
            self.governor.record_completion();
            drop(permit);

            match outcome {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() => {
                    warn!("Upstream call failed with a retryable error: {}", e);
                    last_error = Some(e);
                }
                Err(e) => {
                    error!("Upstream call failed: {}", e);
                    return Err(e);
                }
            }
        }

        let err = last_error.unwrap_or(RelayError::RateLimited);
        error!(
            "Giving up after {} attempts: {}",
            plan.max_attempts, err
        );
        Err(err)
    }

    /// Opens a streaming completion.
    ///
    /// Yields text deltas as they arrive. A 429 before the body starts is
    /// announced with a [`StreamChunk::Status`] and retried on a fresh
    /// connection. The sequence ends after the first `Err`.
    pub fn stream(&self, messages: Vec<ChatMessage>) -> ChunkStream {
        let this = self.clone();
        Box::pin(async_stream::stream! {
            let payload = CompletionPayload::new(&this.config, &messages, true);
            let mut plan = this.config.stream_retry;

            loop {
                let permit = match this.permit().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };
                this.governor.acquire().await;

                let response = match this.request(&payload).send().await {
                    Ok(response) => response,
                    Err(e) => {
                        this.governor.record_completion();
                        let err = transport_error(&e);
                        error!("Failed to open upstream stream: {}", err);
                        yield Err(err);
                        return;
                    }
                };

                let status = response.status();
                if status != StatusCode::OK {
                    let body = match response.bytes().await {
                        Ok(body) => body,
                        Err(e) => {
                            warn!("Failed to read upstream error body ({}): {}", status, e);
                            Default::default()
                        }
                    };
                    this.governor.record_completion();
                    drop(permit);

                    if status != StatusCode::TOO_MANY_REQUESTS {
                        let err = upstream_error(status.as_u16(), &body);
                        error!("Upstream rejected stream: {}", err);
                        yield Err(err);
                        return;
                    }
                    if plan.exhausted() {
                        error!("Stream rate limited after {} retries", plan.max_attempts);
                        yield Err(RelayError::RateLimited);
                        return;
                    }

                    let retry = plan.record_attempt();
                    let wait = suggested_wait(&error_message(&body))
                        .unwrap_or_else(|| plan.backoff(retry - 1));
                    warn!(
                        "Stream rate limited, retry {}/{} in {:.2}s",
                        retry,
                        plan.max_attempts,
                        wait.as_secs_f64()
                    );
                    yield Ok(StreamChunk::Status(status_notice(wait)));
                    this.governor.clock().sleep(wait).await;
                    continue;
                }

                let mut decoder = FrameDecoder::new();
                let mut body = response.bytes_stream();
                while let Some(read) = body.next().await {
                    match read {
                        Ok(bytes) => {
                            decoder.push(&bytes);
                            for delta in decoder.by_ref() {
                                yield Ok(StreamChunk::Delta(delta));
                            }
                        }
                        Err(e) => {
                            this.governor.record_completion();
                            error!("Upstream stream broke off: {}", e);
                            yield Err(RelayError::Stream(e.to_string()));
                            return;
                        }
                    }
                }
                this.governor.record_completion();
                debug!(
                    "Stream finished: {} content frames, {} malformed",
                    decoder.content_frames(),
                    decoder.malformed_frames()
                );
                decoder.finish();
                return;
            }
        })
    }

    async fn permit(&self) -> Result<OwnedSemaphorePermit, RelayError> {
        self.permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| RelayError::Network("relay client is shutting down".to_string()))
    }

    fn request(&self, payload: &CompletionPayload<'_>) -> RequestBuilder {
        self.client
            .post(self.config.completions_url())
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(payload)
    }

    async fn send_once(&self, payload: &CompletionPayload<'_>) -> Result<String, RelayError> {
        let response = self
            .request(payload)
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| transport_error(&e))?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(RelayError::RateLimited);
        }
        if status != StatusCode::OK {
            return Err(upstream_error(status.as_u16(), &body));
        }
        extract_completion(&body)
    }
}

/// Last 8 hex characters of the key's SHA-256, safe to log.
pub fn key_id(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let hex_hash = hex::encode(hasher.finalize());
    format!("...{}", &hex_hash[hex_hash.len() - 8..])
}

fn transport_error(e: &reqwest::Error) -> RelayError {
    if e.is_timeout() {
        RelayError::Timeout
    } else {
        RelayError::Network(e.to_string())
    }
}

/// `error.message` from an upstream error body, if it has one.
fn error_message(body: &[u8]) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| "unknown error".to_string())
}

fn upstream_error(status: u16, body: &[u8]) -> RelayError {
    RelayError::Upstream {
        status,
        message: error_message(body),
    }
}

fn extract_completion(body: &[u8]) -> Result<String, RelayError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| RelayError::MalformedResponse(format!("body is not JSON: {}", e)))?;
    let object = value
        .as_object()
        .ok_or_else(|| RelayError::MalformedResponse("body is not a JSON object".into()))?;
    let first = object
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .ok_or_else(|| RelayError::MalformedResponse("no choices in response".into()))?;
    first
        .get("message")
        .filter(|message| message.is_object())
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .filter(|content| !content.is_empty())
        .map(str::to_string)
        .ok_or_else(|| RelayError::MalformedResponse("first choice has no message content".into()))
}

/// Parses the wait out of messages like `"... please try again after 2 seconds"`.
fn suggested_wait(message: &str) -> Option<Duration> {
    let (_, rest) = message.split_once("after ")?;
    let (number, _) = rest.split_once(" seconds")?;
    let secs: f64 = number.trim().parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

fn status_notice(wait: Duration) -> String {
    format!(
        "\n[Upstream rate limit reached, retrying in {} seconds...]\n",
        wait.as_secs_f64()
    )
}
