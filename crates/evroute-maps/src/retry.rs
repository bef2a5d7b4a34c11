//! Bounded retries for idempotent provider calls.

use crate::backoff::Backoff;
use async_trait::async_trait;
use evroute_core::{
    ChargingStation, Directions, DirectionsProvider, GenerationMix, GridMixProvider, LatLng,
    PlacesProvider, ProviderError,
};
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut backoff = Backoff::new(self.base_delay, self.max_delay);
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && backoff.failures() + 1 < self.max_attempts => {
                    let delay = backoff.fail();
                    tracing::warn!(
                        operation,
                        attempt = backoff.failures(),
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "provider call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Wraps any provider and retries transient failures.
pub struct Retrying<P> {
    inner: P,
    policy: RetryPolicy,
}

impl<P> Retrying<P> {
    pub fn new(inner: P, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<P: DirectionsProvider> DirectionsProvider for Retrying<P> {
    async fn directions(
        &self,
        origin: LatLng,
        destination: LatLng,
    ) -> Result<Directions, ProviderError> {
        self.policy
            .run("directions", move || self.inner.directions(origin, destination))
            .await
    }
}

#[async_trait]
impl<P: PlacesProvider> PlacesProvider for Retrying<P> {
    async fn charging_stations(
        &self,
        location: LatLng,
        radius_m: f64,
    ) -> Result<Vec<ChargingStation>, ProviderError> {
        self.policy
            .run("places", move || self.inner.charging_stations(location, radius_m))
            .await
    }
}

#[async_trait]
impl<P: GridMixProvider> GridMixProvider for Retrying<P> {
    async fn generation_mix(
        &self,
        location: LatLng,
        radius_m: f64,
    ) -> Result<GenerationMix, ProviderError> {
        self.policy
            .run("grid_mix", move || self.inner.generation_mix(location, radius_m))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails with `error` for the first `failures` calls.
    struct Flaky {
        failures: u32,
        error: ProviderError,
        calls: AtomicU32,
    }

    #[async_trait]
    impl PlacesProvider for Flaky {
        async fn charging_stations(
            &self,
            _location: LatLng,
            _radius_m: f64,
        ) -> Result<Vec<ChargingStation>, ProviderError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(self.error.clone())
            } else {
                Ok(Vec::new())
            }
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    fn flaky(failures: u32, error: ProviderError) -> Retrying<Flaky> {
        Retrying::new(
            Flaky {
                failures,
                error,
                calls: AtomicU32::new(0),
            },
            fast_policy(3),
        )
    }

    #[tokio::test]
    async fn retries_transient_errors() {
        let provider = flaky(2, ProviderError::Transport("reset".into()));
        let result = provider.charging_stations(LatLng::new(0.0, 0.0), 10.0).await;
        assert!(result.is_ok());
        assert_eq!(provider.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let provider = flaky(
            5,
            ProviderError::Status {
                status: 503,
                message: "unavailable".into(),
            },
        );
        let result = provider.charging_stations(LatLng::new(0.0, 0.0), 10.0).await;
        assert!(matches!(result, Err(ProviderError::Status { status: 503, .. })));
        assert_eq!(provider.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn no_route_is_not_retried() {
        let provider = flaky(5, ProviderError::NoRoute);
        let result = provider.charging_stations(LatLng::new(0.0, 0.0), 10.0).await;
        assert_eq!(result, Err(ProviderError::NoRoute));
        assert_eq!(provider.inner.calls.load(Ordering::SeqCst), 1);
    }
}
