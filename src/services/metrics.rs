use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Client-side counters. Each `AppState` owns its own registry so several
/// sessions (and tests) never share counts.
pub struct Metrics {
    registry: Registry,
    api_requests: IntCounterVec,
    session_invalidations: IntCounter,
    push_registrations: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let api_requests = IntCounterVec::new(
            Opts::new("famsync_api_requests_total", "API calls by outcome"),
            &["outcome"],
        )?;
        let session_invalidations = IntCounter::new(
            "famsync_session_invalidations_total",
            "Sessions torn down after the server rejected the token",
        )?;
        let push_registrations = IntCounterVec::new(
            Opts::new(
                "famsync_push_registration_attempts_total",
                "Push token registration attempts by result",
            ),
            &["result"],
        )?;

        registry.register(Box::new(api_requests.clone()))?;
        registry.register(Box::new(session_invalidations.clone()))?;
        registry.register(Box::new(push_registrations.clone()))?;

        Ok(Self {
            registry,
            api_requests,
            session_invalidations,
            push_registrations,
        })
    }

    pub fn api_request(&self, outcome: &str) {
        self.api_requests.with_label_values(&[outcome]).inc();
    }

    pub fn session_invalidated(&self) {
        self.session_invalidations.inc();
    }

    pub fn push_registration(&self, result: &str) {
        self.push_registrations.with_label_values(&[result]).inc();
    }

    pub fn api_requests_total(&self, outcome: &str) -> u64 {
        self.api_requests.with_label_values(&[outcome]).get()
    }

    pub fn session_invalidations_total(&self) -> u64 {
        self.session_invalidations.get()
    }

    pub fn push_registrations_total(&self, result: &str) -> u64 {
        self.push_registrations.with_label_values(&[result]).get()
    }

    /// Prometheus text exposition of every counter.
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!("Metrics: encoding failed: {}", e);
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registries_are_independent() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.api_request("ok");
        a.api_request("ok");
        a.session_invalidated();
        assert_eq!(a.api_requests_total("ok"), 2);
        assert_eq!(b.api_requests_total("ok"), 0);
        assert_eq!(b.session_invalidations_total(), 0);
        assert!(a.render().contains("famsync_session_invalidations_total 1"));
    }
}
