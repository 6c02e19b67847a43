use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Ping the event store and report the degraded flag with the session counters.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.require_event_store().await {
        Ok(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "event store health check failed");
            }
        }
        Err(_) => warn!("event store unavailable (degraded mode)"),
    }

    HealthResponse::new(
        state.is_degraded().await,
        state.drafts().len(),
        state.invitees().len(),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::future::BoxFuture;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::event_store::MemoryEventStore,
        services::payment::{PaymentError, PaymentGateway},
        state::AppState,
    };

    struct NoPayments;

    impl PaymentGateway for NoPayments {
        fn make_payment(
            &self,
            _phone: String,
            _amount: u64,
        ) -> BoxFuture<'static, Result<(), PaymentError>> {
            Box::pin(async { Err(PaymentError::MissingCredentials) })
        }
    }

    #[tokio::test]
    async fn reports_degraded_until_a_store_is_installed() {
        let state = AppState::new(AppConfig::default(), Arc::new(NoPayments));
        assert!(health_status(&state).await.is_degraded());

        state
            .set_event_store(Arc::new(MemoryEventStore::new()))
            .await;
        state.drafts().begin(7);
        let health = health_status(&state).await;
        assert_eq!(health, HealthResponse::new(false, 1, 0));
    }
}
