use async_trait::async_trait;
use busline_booking::EventPublisher;
use busline_shared::BusEvent;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CircuitState {
    Closed,   // Normal operation
    Open,     // Failure detected, failing fast
    HalfOpen, // Probing whether the broker is back
}

pub struct CircuitBreaker {
    pub name: String,
    pub state: RwLock<CircuitState>,
    pub failure_count: AtomicUsize,
    pub failure_threshold: usize,
    pub reset_timeout: Duration,
    pub last_failure: RwLock<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(name: &str, threshold: usize, timeout: Duration) -> Self {
        Self {
            name: name.to_string(),
            state: RwLock::new(CircuitState::Closed),
            failure_count: AtomicUsize::new(0),
            failure_threshold: threshold,
            reset_timeout: timeout,
            last_failure: RwLock::new(None),
        }
    }

    pub async fn check(&self) -> bool {
        let state = *self.state.read().await;
        if state != CircuitState::Open {
            return true;
        }

        let last_fail = *self.last_failure.read().await;
        if matches!(last_fail, Some(instant) if instant.elapsed() > self.reset_timeout) {
            *self.state.write().await = CircuitState::HalfOpen;
            tracing::info!("Circuit Breaker [{}] moving to Half-Open", self.name);
            return true;
        }
        false
    }

    pub async fn record_success(&self) {
        let mut state = self.state.write().await;
        if *state == CircuitState::HalfOpen {
            tracing::info!("Circuit Breaker [{}] recovered to Closed", self.name);
        }
        *state = CircuitState::Closed;
        self.failure_count.store(0, Ordering::SeqCst);
    }

    pub async fn record_failure(&self) {
        let count = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.write().await;

        if count >= self.failure_threshold || *state == CircuitState::HalfOpen {
            *state = CircuitState::Open;
            *self.last_failure.write().await = Some(Instant::now());
            tracing::error!("Circuit Breaker [{}] TRIPPED to Open. Failures: {}", self.name, count);
        }
    }
}

/// Fails fast while the broker is down instead of stacking up send timeouts.
pub struct GuardedPublisher {
    inner: Arc<dyn EventPublisher>,
    breaker: CircuitBreaker,
}

impl GuardedPublisher {
    pub fn new(inner: Arc<dyn EventPublisher>, breaker: CircuitBreaker) -> Self {
        Self { inner, breaker }
    }
}

#[async_trait]
impl EventPublisher for GuardedPublisher {
    async fn publish(&self, event: &BusEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if !self.breaker.check().await {
            return Err(format!("Circuit Breaker [{}] is OPEN", self.breaker.name).into());
        }

        match self.inner.publish(event).await {
            Ok(()) => {
                self.breaker.record_success().await;
                Ok(())
            }
            Err(e) => {
                self.breaker.record_failure().await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use busline_shared::SeatMapChangedEvent;
    use uuid::Uuid;

    struct Failing;

    #[async_trait]
    impl EventPublisher for Failing {
        async fn publish(&self, _event: &BusEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            Err("broker down".into())
        }
    }

    fn event() -> BusEvent {
        BusEvent::SeatMapChanged(SeatMapChangedEvent {
            departure_id: Uuid::new_v4(),
            seat_numbers: vec!["1".to_string()],
            booked: true,
            timestamp: 0,
        })
    }

    #[tokio::test]
    async fn test_breaker_opens_after_threshold() {
        let guarded = GuardedPublisher::new(
            Arc::new(Failing),
            CircuitBreaker::new("kafka", 2, Duration::from_secs(60)),
        );

        for _ in 0..2 {
            let err = guarded.publish(&event()).await.unwrap_err();
            assert_eq!(err.to_string(), "broker down");
        }
        let err = guarded.publish(&event()).await.unwrap_err();
        assert!(err.to_string().contains("OPEN"));
        assert_eq!(*guarded.breaker.state.read().await, CircuitState::Open);
    }

    #[tokio::test]
    async fn test_half_open_trial_call_recovers() {
        let breaker = CircuitBreaker::new("kafka", 1, Duration::from_millis(0));
        breaker.record_failure().await;
        assert_eq!(*breaker.state.read().await, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(breaker.check().await);
        assert_eq!(*breaker.state.read().await, CircuitState::HalfOpen);

        breaker.record_success().await;
        assert_eq!(*breaker.state.read().await, CircuitState::Closed);
    }
}
