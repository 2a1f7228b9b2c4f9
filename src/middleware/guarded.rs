use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::core::config::Config;
use crate::core::errors::{DetectionError, DetectionResult, TranslationError, TranslationResult};
use crate::core::types::{OcrConfig, PageImage, TextRegion, TranslatedRegion};
use crate::services::gateway::{RegionDetector, RegionTranslator};

/// Why the guard refused or abandoned a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardRejection {
    /// Circuit open; value is the time until a trial call is allowed
    CircuitOpen(Duration),
    TimedOut(Duration),
}

/// Timeout plus circuit breaker around calls to one gateway
#[derive(Clone)]
pub struct GatewayGuard {
    breaker: CircuitBreaker,
    timeout: Duration,
}

impl GatewayGuard {
    pub fn new(name: &'static str, breaker: CircuitBreakerConfig, timeout: Duration) -> Self {
        Self {
            breaker: CircuitBreaker::new(name, breaker),
            timeout,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Run `call` under the guard. Gateway errors pass through untouched in the inner result.
    pub async fn call<T, E, Fut>(&self, call: Fut) -> Result<Result<T, E>, GuardRejection>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.breaker.allow_request() {
            return Err(GuardRejection::CircuitOpen(self.breaker.retry_after()));
        }

        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => {
                self.breaker.record_success();
                Ok(Ok(value))
            }
            Ok(Err(e)) => {
                self.breaker.record_failure();
                Ok(Err(e))
            }
            Err(_) => {
                warn!("{} call timed out after {:?}", self.breaker.name(), self.timeout);
                self.breaker.record_failure();
                Err(GuardRejection::TimedOut(self.timeout))
            }
        }
    }
}

/// Region detector wrapped in a `GatewayGuard`
pub struct GuardedDetector<D> {
    inner: D,
    guard: GatewayGuard,
}

impl<D: RegionDetector> GuardedDetector<D> {
    pub fn new(inner: D, guard: GatewayGuard) -> Self {
        Self { inner, guard }
    }

    pub fn from_config(inner: D, config: &Config) -> Self {
        Self::new(
            inner,
            GatewayGuard::new("detector", config.circuit_breaker(), config.gateway_timeout()),
        )
    }

    pub fn guard(&self) -> &GatewayGuard {
        &self.guard
    }
}

#[async_trait]
impl<D: RegionDetector> RegionDetector for GuardedDetector<D> {
    async fn detect_regions(
        &self,
        image: &PageImage,
        config: &OcrConfig,
    ) -> DetectionResult<Vec<TextRegion>> {
        match self.guard.call(self.inner.detect_regions(image, config)).await {
            Ok(result) => result,
            Err(GuardRejection::CircuitOpen(retry)) => Err(DetectionError::BackendUnavailable(
                format!("circuit open, retry in {}s", retry.as_secs()),
            )),
            Err(GuardRejection::TimedOut(after)) => Err(DetectionError::Timeout(after.as_secs())),
        }
    }
}

/// Region translator wrapped in a `GatewayGuard`
pub struct GuardedTranslator<T> {
    inner: T,
    guard: GatewayGuard,
}

impl<T: RegionTranslator> GuardedTranslator<T> {
    pub fn new(inner: T, guard: GatewayGuard) -> Self {
        Self { inner, guard }
    }

    pub fn from_config(inner: T, config: &Config) -> Self {
        Self::new(
            inner,
            GatewayGuard::new("translator", config.circuit_breaker(), config.gateway_timeout()),
        )
    }

    pub fn guard(&self) -> &GatewayGuard {
        &self.guard
    }
}

#[async_trait]
impl<T: RegionTranslator> RegionTranslator for GuardedTranslator<T> {
    async fn translate_regions(
        &self,
        regions: &[TextRegion],
    ) -> TranslationResult<Vec<TranslatedRegion>> {
        match self.guard.call(self.inner.translate_regions(regions)).await {
            Ok(result) => result,
            Err(GuardRejection::CircuitOpen(retry)) => Err(TranslationError::BackendUnavailable(
                format!("circuit open, retry in {}s", retry.as_secs()),
            )),
            Err(GuardRejection::TimedOut(after)) => {
                Err(TranslationError::Timeout(after.as_secs()))
            }
        }
    }
}
