//! Completion gateway: one prompt in, raw completion text out.
//!
//! Wraps a [`CompletionService`] with the request parameters and a bounded
//! wait-and-retry loop for rate-limit signals. Every other service failure is
//! returned to the caller untouched.

use std::thread;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::error::{CompilerError, ServiceError};
use crate::io::completion::{CompletionRequest, CompletionService};

/// Request parameters sent with every prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    pub best_of: u32,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            model: "text-davinci-003".to_string(),
            temperature: 0.0,
            max_tokens: 1024,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            best_of: 3,
        }
    }
}

/// How long to wait after a rate-limit signal, and how often to try.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub initial: Duration,
    /// Growth factor per retry; `1` keeps the delay fixed.
    pub multiplier: u32,
    /// Total calls per prompt, including the first.
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(10),
            multiplier: 1,
            max_attempts: 5,
        }
    }
}

impl BackoffPolicy {
    /// Delay after the `attempt`-th call (1-based) was rate limited.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self.multiplier.saturating_pow(exponent);
        self.initial.saturating_mul(factor)
    }
}

/// Blocking wait used between rate-limited attempts.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Sends prompts through a [`CompletionService`] with fixed request settings,
/// backing off and retrying on rate limits.
pub struct CompletionGateway<S, Z = ThreadSleeper> {
    service: S,
    settings: CompletionSettings,
    policy: BackoffPolicy,
    sleeper: Z,
}

impl<S: CompletionService> CompletionGateway<S, ThreadSleeper> {
    pub fn new(service: S, settings: CompletionSettings, policy: BackoffPolicy) -> Self {
        Self::with_sleeper(service, settings, policy, ThreadSleeper)
    }
}

impl<S: CompletionService, Z: Sleeper> CompletionGateway<S, Z> {
    pub fn with_sleeper(
        service: S,
        settings: CompletionSettings,
        policy: BackoffPolicy,
        sleeper: Z,
    ) -> Self {
        Self {
            service,
            settings,
            policy,
            sleeper,
        }
    }

    pub fn settings(&self) -> &CompletionSettings {
        &self.settings
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn sleeper(&self) -> &Z {
        &self.sleeper
    }

    /// Complete `prompt` with the configured temperature and model.
    pub fn complete(&self, prompt: &str) -> Result<String, CompilerError> {
        self.complete_with(prompt, self.settings.temperature, &self.settings.model)
    }

    /// Complete `prompt`, overriding temperature and model for this call.
    ///
    /// Returns the first choice's text unmodified.
    #[instrument(skip_all, fields(model = %model, temperature = f64::from(temperature), prompt_bytes = prompt.len()))]
    pub fn complete_with(
        &self,
        prompt: &str,
        temperature: f32,
        model: &str,
    ) -> Result<String, CompilerError> {
        let request = CompletionRequest {
            model: model.to_string(),
            prompt: prompt.to_string(),
            max_tokens: self.settings.max_tokens,
            temperature,
            top_p: self.settings.top_p,
            frequency_penalty: self.settings.frequency_penalty,
            presence_penalty: self.settings.presence_penalty,
            best_of: self.settings.best_of,
        };

        let mut attempt = 1u32;
        loop {
            match self.service.create(&request) {
                Ok(response) => {
                    debug!(attempt, "completion received");
                    return response.into_first_text().map_err(CompilerError::from);
                }
                Err(ServiceError::RateLimited(message)) => {
                    if attempt >= self.policy.max_attempts {
                        warn!(attempt, "rate limit retries exhausted");
                        return Err(CompilerError::RetryExhausted {
                            attempts: attempt,
                            last_message: message,
                        });
                    }
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        attempt,
                        delay_secs = delay.as_secs_f64(),
                        "rate limited by completion service, backing off"
                    );
                    self.sleeper.sleep(delay);
                    attempt += 1;
                }
                Err(err) => {
                    warn!(attempt, err = %err, "completion request failed");
                    return Err(err.into());
                }
            }
        }
    }
}
