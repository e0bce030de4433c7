//! Polling `GET /history/{prompt_id}` until a prompt produces output.
//!
//! The engine exposes no explicit failure state: a prompt is *pending*
//! until its history lists at least one output image, at which point it
//! is *complete*. [`wait_for_outputs`] drives that two-state machine with
//! a fixed pause between polls and gives up once the elapsed time passes
//! the configured ceiling. The deadline is checked after each poll, so a
//! poll that returns output always wins even if it finished late.
//!
//! Time is read and slept through a [`Clock`] so tests can run the loop
//! against virtual time.

use std::time::Duration;

use async_trait::async_trait;

use crate::api::{ComfyUIApi, ComfyUIApiError, HistoryPoll};
use crate::responses::{extract_output_images, OutputImage};

/// Tunable parameters for the polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Pause between consecutive polls.
    pub interval: Duration,
    /// Give up once this much time has elapsed since the first poll.
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(800),
            timeout: Duration::from_secs(300),
        }
    }
}

/// Source of monotonic time and sleeping.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Time since an arbitrary fixed origin.
    fn now(&self) -> Duration;

    async fn sleep(&self, duration: Duration);
}

/// [`Clock`] backed by the tokio timer.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: tokio::time::Instant,
}

impl Default for TokioClock {
    fn default() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Anything that can answer a history query for a prompt.
#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn history(&self, prompt_id: &str) -> Result<HistoryPoll, ComfyUIApiError>;
}

#[async_trait]
impl HistorySource for ComfyUIApi {
    async fn history(&self, prompt_id: &str) -> Result<HistoryPoll, ComfyUIApiError> {
        self.get_history(prompt_id).await
    }
}

/// State of a prompt as seen by one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    Pending,
    Complete(Vec<OutputImage>),
}

/// Interpret one history poll.
pub fn poll_state(poll: &HistoryPoll, prompt_id: &str) -> Result<PollState, ComfyUIApiError> {
    match poll {
        HistoryPoll::NotFound => Ok(PollState::Pending),
        HistoryPoll::Found(body) => {
            let images = extract_output_images(body, prompt_id)?;
            if images.is_empty() {
                Ok(PollState::Pending)
            } else {
                Ok(PollState::Complete(images))
            }
        }
    }
}

/// Errors that end a polling loop without output.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    /// A history request failed or returned an unusable body.
    #[error(transparent)]
    Api(#[from] ComfyUIApiError),

    /// No output appeared before the deadline.
    #[error("ComfyUI did not produce output within {}s ({attempts} polls)", .timeout.as_secs_f64())]
    Timeout {
        /// The ceiling that was exceeded.
        timeout: Duration,
        /// Number of history requests made.
        attempts: u32,
    },
}

/// Poll until `prompt_id` lists output images, then return all of them.
pub async fn wait_for_outputs(
    source: &dyn HistorySource,
    clock: &dyn Clock,
    prompt_id: &str,
    config: &PollConfig,
) -> Result<Vec<OutputImage>, PollError> {
    let started = clock.now();
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let poll = source.history(prompt_id).await?;
        match poll_state(&poll, prompt_id)? {
            PollState::Complete(images) => {
                tracing::info!(
                    prompt_id,
                    attempts,
                    image_count = images.len(),
                    elapsed_ms = clock.now().saturating_sub(started).as_millis() as u64,
                    "ComfyUI prompt completed",
                );
                return Ok(images);
            }
            PollState::Pending => {
                tracing::trace!(prompt_id, attempts, "ComfyUI prompt still pending");
                clock.sleep(config.interval).await;
            }
        }

        let elapsed = clock.now().saturating_sub(started);
        if elapsed > config.timeout {
            tracing::warn!(
                prompt_id,
                attempts,
                elapsed_ms = elapsed.as_millis() as u64,
                "Gave up waiting for ComfyUI output",
            );
            return Err(PollError::Timeout {
                timeout: config.timeout,
                attempts,
            });
        }
    }
}
