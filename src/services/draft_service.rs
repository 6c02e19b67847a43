//! Event creation dialog: one draft per user, advanced one value at a time.

use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::{
    dto::interaction::{OutboundPrompt, Sender},
    error::ServiceError,
    services::{catalog_service, prompts},
    state::{
        SharedState,
        draft::{Decision, Step, StepContext, compute_transition, parse_step},
    },
};

/// Start a new draft for the sender, replacing any unfinished one.
pub fn begin(state: &SharedState, sender: &Sender) -> OutboundPrompt {
    let draft = state.drafts().begin(sender.chat_id);
    debug!(user = sender.chat_id, "draft started");
    prompts::draft_prompt(state.config(), sender.chat_id, &draft)
}

/// Whether the sender has a live draft.
pub fn has_draft(state: &SharedState, sender: &Sender) -> bool {
    state.drafts().snapshot(sender.chat_id).is_ok()
}

/// Apply one raw value to the sender's draft.
///
/// A value the current step cannot accept is answered with the refusal followed by the
/// step's prompt again, so the options stay available.
pub async fn handle_step(
    state: &SharedState,
    sender: &Sender,
    raw: &str,
) -> Result<Vec<OutboundPrompt>, ServiceError> {
    let user = sender.chat_id;
    match apply_step(state, sender, raw).await {
        Err(err @ ServiceError::InvalidInput(_)) => {
            let Ok(draft) = state.drafts().snapshot(user) else {
                return Err(err);
            };
            debug!(user, status = %draft.status(), error = %err, "step value refused");
            Ok(vec![
                prompts::error_prompt(user, &err),
                prompts::draft_prompt(state.config(), user, &draft),
            ])
        }
        outcome => outcome,
    }
}

async fn apply_step(
    state: &SharedState,
    sender: &Sender,
    raw: &str,
) -> Result<Vec<OutboundPrompt>, ServiceError> {
    let user = sender.chat_id;
    let config = state.config();
    let status = state.drafts().status(user)?;

    match parse_step(status, raw, config)? {
        Step::Field(input) => {
            let context = StepContext::from_config(config, OffsetDateTime::now_utc());
            let draft = state
                .drafts()
                .advance(user, |draft| compute_transition(draft, input, &context))?;
            debug!(user, status = %draft.status(), "draft advanced");
            Ok(vec![prompts::draft_prompt(config, user, &draft)])
        }
        Step::Decision(Decision::Cancel) => {
            cancel(state, sender);
            Ok(vec![OutboundPrompt::text(user, "Match creation cancelled.")])
        }
        Step::Decision(Decision::Confirm) => commit(state, sender).await,
    }
}

/// Commit the sender's completed draft. The draft leaves the session store first so
/// two confirmations cannot both create an event.
async fn commit(state: &SharedState, sender: &Sender) -> Result<Vec<OutboundPrompt>, ServiceError> {
    let user = sender.chat_id;
    let draft = state.drafts().take_complete(user)?;

    let created = async {
        let organizer = catalog_service::create_user(state, sender).await?;
        let assigned = draft.clone().assign_organizer(organizer.clone())?;
        let event = catalog_service::create_event(state, assigned).await?;
        Ok::<_, ServiceError>((event, organizer))
    }
    .await;

    match created {
        Ok((event, organizer)) => {
            info!(user, event_id = %event.id, "draft committed");
            Ok(vec![
                OutboundPrompt::text(user, "Match created."),
                prompts::event_card(state.config(), user, &event, Some(&organizer)),
            ])
        }
        Err(err) => {
            if !state.drafts().restore(user, draft) {
                warn!(user, "draft not restored; a newer draft already exists");
            }
            Err(err)
        }
    }
}

/// Drop the sender's draft, if any.
pub fn cancel(state: &SharedState, sender: &Sender) {
    state.drafts().discard(sender.chat_id);
    debug!(user = sender.chat_id, "draft discarded");
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
        state::{AppState, DraftStatus},
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

    fn sender() -> Sender {
        Sender {
            chat_id: 11,
            username: "@coach".into(),
            first_name: "Coach".into(),
            phone: None,
        }
    }

    async fn state() -> SharedState {
        let state = AppState::new(AppConfig::default(), Arc::new(NoPayments));
        state
            .set_event_store(Arc::new(MemoryEventStore::new()))
            .await;
        state
    }

    async fn fill(state: &SharedState, sender: &Sender) {
        begin(state, sender);
        for value in ["football", "Arena 5", "tomorrow", "18", "90", "5", "2", "0", "open"] {
            handle_step(state, sender, value).await.unwrap();
        }
    }

    #[tokio::test]
    async fn complete_dialog_creates_one_event() {
        let state = state().await;
        let sender = sender();
        fill(&state, &sender).await;
        assert_eq!(
            state.drafts().status(sender.chat_id).unwrap(),
            DraftStatus::VisibilitySet
        );

        let prompts = handle_step(&state, &sender, "confirm").await.unwrap();
        assert_eq!(prompts.len(), 2);
        assert!(!has_draft(&state, &sender));

        let organizer = catalog_service::resolve_user(&state, "coach").await.unwrap();
        let events = catalog_service::list_events_by_organizer(&state, organizer.id)
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].capacity(), 10);

        let err = handle_step(&state, &sender, "confirm").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn wrong_value_keeps_the_draft_where_it_was() {
        let state = state().await;
        let sender = sender();
        begin(&state, &sender);

        let prompts = handle_step(&state, &sender, "chess").await.unwrap();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].text.starts_with("That did not work"));
        assert_eq!(prompts[1].text, "Which sport?");
        assert_eq!(state.drafts().status(sender.chat_id).unwrap(), DraftStatus::New);
    }

    #[tokio::test]
    async fn refused_hour_asks_for_the_hour_again() {
        let state = state().await;
        let sender = sender();
        begin(&state, &sender);
        for value in ["football", "Arena 5", "today"] {
            handle_step(&state, &sender, value).await.unwrap();
        }

        let prompts = handle_step(&state, &sender, "six").await.unwrap();

        assert_eq!(
            prompts[0].text,
            "That did not work: hour must be a whole number, got `six`."
        );
        assert_eq!(prompts[1].text, "Start time?");
        let hours: Vec<_> = prompts[1].options.concat().into_iter().map(|o| o.data).collect();
        assert_eq!(hours.first().map(String::as_str), Some("create:10"));
        assert_eq!(state.drafts().status(sender.chat_id).unwrap(), DraftStatus::DaySet);
    }

    #[tokio::test]
    async fn failed_commit_leaves_the_draft_confirmable() {
        let state = state().await;
        let sender = sender();
        fill(&state, &sender).await;
        state.update_degraded(true).await;

        let err = handle_step(&state, &sender, "confirm").await.unwrap_err();
        assert!(matches!(err, ServiceError::Degraded));
        assert_eq!(
            state.drafts().status(sender.chat_id).unwrap(),
            DraftStatus::VisibilitySet
        );
    }

    #[tokio::test]
    async fn cancel_decision_discards_the_draft() {
        let state = state().await;
        let sender = sender();
        fill(&state, &sender).await;

        handle_step(&state, &sender, "cancel").await.unwrap();
        assert!(!has_draft(&state, &sender));
    }
}
