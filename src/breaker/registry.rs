use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::{BreakerSettings, BreakerStatus, CircuitBreaker, CircuitError};

/// Named breakers, one per protected dependency.
#[derive(Default, Clone)]
pub struct BreakerRegistry {
    breakers: BTreeMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    pub fn new(settings: BTreeMap<String, BreakerSettings>) -> Self {
        let breakers = settings
            .into_iter()
            .map(|(name, s)| {
                let breaker = Arc::new(CircuitBreaker::new(name.clone(), s));
                (name, breaker)
            })
            .collect();
        Self { breakers }
    }

    /// Registry holding only the built-in `ai`, `tts` and `network` presets.
    pub fn with_presets() -> Self {
        Self::new(
            BreakerSettings::presets()
                .into_iter()
                .map(|(name, s)| (name.to_string(), s))
                .collect(),
        )
    }

    /// Add or replace a breaker.
    pub fn register(&mut self, name: &str, settings: BreakerSettings) -> Arc<CircuitBreaker> {
        let breaker = Arc::new(CircuitBreaker::new(name, settings));
        self.breakers.insert(name.to_string(), breaker.clone());
        breaker
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.breakers.keys().map(String::as_str)
    }

    /// Run `op` through the named breaker. `timeout` overrides the breaker's
    /// configured deadline for this call only.
    pub async fn call_through<F, Fut, T, E>(
        &self,
        name: &str,
        op: F,
        timeout: Option<Duration>,
    ) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let breaker = self
            .breakers
            .get(name)
            .ok_or_else(|| CircuitError::Unknown(name.to_string()))?;
        breaker.call_with_timeout(op, timeout).await
    }

    pub fn call_through_blocking<F, T, E>(
        &self,
        name: &str,
        op: F,
        timeout: Option<Duration>,
    ) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let breaker = self
            .breakers
            .get(name)
            .ok_or_else(|| CircuitError::Unknown(name.to_string()))?;
        breaker.call_blocking_with_timeout(op, timeout)
    }

    pub fn status(&self) -> Vec<BreakerStatus> {
        self.breakers.values().map(|b| b.status()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::CircuitState;

    #[tokio::test]
    async fn presets_are_registered() {
        let registry = BreakerRegistry::with_presets();
        let names: Vec<&str> = registry.names().collect();
        assert_eq!(names, vec!["ai", "network", "tts"]);

        let v = registry
            .call_through("ai", || async { Ok::<_, String>("reply") }, None)
            .await
            .unwrap();
        assert_eq!(v, "reply");
    }

    #[tokio::test]
    async fn unknown_breaker_is_an_error() {
        let registry = BreakerRegistry::with_presets();
        let r = registry
            .call_through("nope", || async { Ok::<_, String>(()) }, None)
            .await;
        assert!(matches!(r, Err(CircuitError::Unknown(ref n)) if n == "nope"));
    }

    #[tokio::test]
    async fn per_call_timeout_is_passed_to_breaker() {
        let registry = BreakerRegistry::with_presets();
        let short = Duration::from_millis(10);
        let r = registry
            .call_through(
                "network",
                || async {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok::<_, String>(())
                },
                Some(short),
            )
            .await;
        assert!(matches!(r, Err(CircuitError::Timeout(d)) if d == short));
        assert_eq!(registry.get("network").unwrap().metrics().timeouts, 1);
    }

    #[test]
    fn breakers_are_independent() {
        let mut registry = BreakerRegistry::default();
        let settings = BreakerSettings {
            failure_threshold: 1,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 1,
            timeout: Duration::from_secs(1),
        };
        registry.register("a", settings.clone());
        registry.register("b", settings);

        registry
            .call_through_blocking("a", || Err::<(), _>("fail"), None)
            .ok();
        assert_eq!(registry.get("a").unwrap().state(), CircuitState::Open);
        assert_eq!(registry.get("b").unwrap().state(), CircuitState::Closed);
        assert_eq!(registry.status().len(), 2);
    }
}
