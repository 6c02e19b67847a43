//! Routes one inbound interaction to the dialog or the catalog and turns whatever
//! happens into prompts for the sender.

use tracing::{debug, error, warn};

use crate::{
    dao::models::{EventEntity, UserEntity},
    dto::interaction::{
        InboundInteraction, InteractionKind, InteractionResponse, OutboundPrompt, Sender,
    },
    error::ServiceError,
    services::{
        catalog_service, draft_service, prompts,
        selection::{Command, Selection},
        sse_events,
    },
    state::SharedState,
};

/// Handle one interaction in its own task.
///
/// Errors and panics stay inside the interaction: they are logged and answered with a
/// single refusal prompt.
pub async fn handle(state: SharedState, interaction: InboundInteraction) -> InteractionResponse {
    let recipient = interaction.sender.chat_id;
    let kind = interaction.kind;

    let outcome = match tokio::spawn(dispatch(state, interaction)).await {
        Ok(outcome) => outcome,
        Err(join_err) => {
            error!(user = recipient, ?kind, error = %join_err, "interaction handler aborted");
            Err(ServiceError::Internal("interaction handler aborted".into()))
        }
    };

    match outcome {
        Ok(prompts) => prompts.into(),
        Err(err) => {
            if err.is_catalog_unavailable() || matches!(err, ServiceError::Internal(_)) {
                error!(user = recipient, ?kind, error = %err, "interaction failed");
            } else {
                warn!(user = recipient, ?kind, error = %err, "interaction refused");
            }
            vec![prompts::error_prompt(recipient, &err)].into()
        }
    }
}

async fn dispatch(
    state: SharedState,
    interaction: InboundInteraction,
) -> Result<Vec<OutboundPrompt>, ServiceError> {
    let InboundInteraction {
        sender,
        kind,
        payload,
    } = interaction;
    debug!(user = sender.chat_id, ?kind, "interaction received");

    match kind {
        InteractionKind::Command => on_command(&state, &sender, payload.parse()?).await,
        InteractionKind::FreeText => on_free_text(&state, &sender, &payload).await,
        InteractionKind::Selection => on_selection(&state, &sender, payload.parse()?).await,
    }
}

async fn on_command(
    state: &SharedState,
    sender: &Sender,
    command: Command,
) -> Result<Vec<OutboundPrompt>, ServiceError> {
    let config = state.config();
    let recipient = sender.chat_id;
    let prompt = match command {
        Command::Start => {
            catalog_service::create_user(state, sender).await?;
            prompts::help(recipient)
        }
        Command::CreateMatch => {
            state.invitees().take(recipient);
            draft_service::begin(state, sender)
        }
        Command::GetMatches => prompts::categories(config, recipient),
        Command::MyMatches => {
            let user = catalog_service::create_user(state, sender).await?;
            let events = catalog_service::list_events_for_user(state, user.id).await?;
            prompts::event_list(config, recipient, "Your matches", &events)
        }
        Command::OrganizedMatches => {
            let user = catalog_service::create_user(state, sender).await?;
            let events = catalog_service::list_events_by_organizer(state, user.id).await?;
            prompts::event_list(config, recipient, "Matches you organize", &events)
        }
        Command::Cancel => {
            draft_service::cancel(state, sender);
            state.invitees().take(recipient);
            OutboundPrompt::text(recipient, "Cancelled.")
        }
    };
    Ok(vec![prompt])
}

/// An open invite flow takes precedence over the draft dialog.
async fn on_free_text(
    state: &SharedState,
    sender: &Sender,
    text: &str,
) -> Result<Vec<OutboundPrompt>, ServiceError> {
    let Some(session) = state.invitees().take(sender.chat_id) else {
        return draft_service::handle_step(state, sender, text).await;
    };

    let requester = catalog_service::create_user(state, sender).await?;
    let usernames: Vec<String> = text
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|word| !word.is_empty())
        .map(str::to_owned)
        .collect();
    let (event, added) =
        catalog_service::add_team_members(state, requester.id, session.team_id, &usernames)
            .await?;
    sse_events::notify_invited(state, &event, &added);
    Ok(vec![prompts::members_added(sender.chat_id, &added)])
}

async fn on_selection(
    state: &SharedState,
    sender: &Sender,
    selection: Selection,
) -> Result<Vec<OutboundPrompt>, ServiceError> {
    let config = state.config();
    let recipient = sender.chat_id;

    match selection {
        Selection::Create(value) => draft_service::handle_step(state, sender, &value).await,
        Selection::MatchesBy(category) => {
            let events = catalog_service::list_open_events_by_category(state, &category).await?;
            let title = format!("Open {category} matches");
            Ok(vec![prompts::event_list(config, recipient, &title, &events)])
        }
        Selection::Event(event_id) => {
            let user = catalog_service::create_user(state, sender).await?;
            let event = catalog_service::get_event(state, event_id).await?;
            Ok(vec![prompts::event_card(config, recipient, &event, Some(&user))])
        }
        Selection::SignUp(event_id) => {
            let user = catalog_service::create_user(state, sender).await?;
            let (event, team) = catalog_service::sign_up(state, event_id, &user).await?;
            sse_events::notify_sign_up(state, &event, &user, team);
            let marker = event
                .teams
                .get(team)
                .map(|team| config.marker_for(&team.label))
                .unwrap_or_default();
            Ok(vec![
                OutboundPrompt::text(recipient, format!("You are in team {marker}.")),
                prompts::event_card(config, recipient, &event, Some(&user)),
            ])
        }
        Selection::SignOut(event_id) => {
            let user = catalog_service::create_user(state, sender).await?;
            let event = catalog_service::sign_out(state, event_id, user.id).await?;
            sse_events::notify_sign_out(state, &event, &user);
            Ok(vec![OutboundPrompt::text(
                recipient,
                format!("You left the match at {}.", event.location),
            )])
        }
        Selection::Confirm(event_id) => {
            let user = catalog_service::create_user(state, sender).await?;
            let event = catalog_service::confirm_attendance(state, event_id, user.id).await?;
            Ok(vec![prompts::event_card(config, recipient, &event, Some(&user))])
        }
        Selection::Pay(event_id) => {
            let user = catalog_service::create_user(state, sender).await?;
            let event = catalog_service::pay_fee(state, event_id, &user).await?;
            Ok(vec![
                OutboundPrompt::text(recipient, "Payment received."),
                prompts::event_card(config, recipient, &event, Some(&user)),
            ])
        }
        Selection::CancelEvent(event_id) => {
            let user = catalog_service::create_user(state, sender).await?;
            let event = catalog_service::cancel_event(state, user.id, event_id).await?;
            sse_events::notify_cancellation(state, &event);
            Ok(vec![OutboundPrompt::text(
                recipient,
                format!("The match at {} is cancelled.", event.location),
            )])
        }
        Selection::AddMembers(event_id) => {
            let user = catalog_service::create_user(state, sender).await?;
            let event = catalog_service::get_event(state, event_id).await?;
            ensure_can_invite(&event, &user)?;
            Ok(vec![prompts::team_picker(config, recipient, &event, &user)])
        }
        Selection::InviteTeam(team_id) => {
            let user = catalog_service::create_user(state, sender).await?;
            let (event, team) = catalog_service::event_for_team(state, team_id).await?;
            let own_team = event.active_membership(user.id).map(|(index, _)| index);
            if user.id != event.organizer_id && own_team != Some(team) {
                return Err(ServiceError::Unauthorized(
                    "only the organizer or a team member can invite players".into(),
                ));
            }
            state.invitees().open(recipient, event.id, team_id);
            Ok(vec![prompts::ask_usernames(recipient)])
        }
    }
}

fn ensure_can_invite(event: &EventEntity, user: &UserEntity) -> Result<(), ServiceError> {
    if event.cancelled {
        return Err(ServiceError::NotFound(format!("event {}", event.id)));
    }
    if user.id == event.organizer_id || event.active_membership(user.id).is_some() {
        Ok(())
    } else {
        Err(ServiceError::NotMember)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::future::BoxFuture;
    use uuid::Uuid;

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

    async fn state() -> SharedState {
        let state = AppState::new(AppConfig::default(), Arc::new(NoPayments));
        state
            .set_event_store(Arc::new(MemoryEventStore::new()))
            .await;
        state
    }

    fn interaction(chat_id: i64, kind: InteractionKind, payload: &str) -> InboundInteraction {
        InboundInteraction {
            sender: Sender {
                chat_id,
                username: format!("user{chat_id}"),
                first_name: "Player".into(),
                phone: None,
            },
            kind,
            payload: payload.into(),
        }
    }

    #[tokio::test]
    async fn free_text_without_draft_is_answered_not_failed() {
        let state = state().await;
        let response = handle(state, interaction(3, InteractionKind::FreeText, "hello")).await;

        assert_eq!(response.prompts.len(), 1);
        assert_eq!(response.prompts[0].recipient, 3);
        assert!(response.prompts[0].text.contains("/create_match"));
    }

    #[tokio::test]
    async fn degraded_catalog_becomes_one_refusal() {
        let state = state().await;
        state.update_degraded(true).await;

        let response = handle(state, interaction(3, InteractionKind::Command, "/my_matches")).await;
        assert_eq!(response.prompts.len(), 1);
        assert!(response.prompts[0].text.contains("went wrong"));
    }

    #[tokio::test]
    async fn create_match_opens_the_category_step() {
        let state = state().await;
        let response = handle(
            state.clone(),
            interaction(3, InteractionKind::Command, "/create_match"),
        )
        .await;

        assert_eq!(response.prompts[0].text, "Which sport?");
        assert!(state.drafts().snapshot(3).is_ok());
    }

    #[tokio::test]
    async fn unknown_selection_is_invalid_input() {
        let state = state().await;
        let response = handle(state, interaction(3, InteractionKind::Selection, "dance:1")).await;
        assert!(response.prompts[0].text.starts_with("That did not work"));
    }

    #[tokio::test]
    async fn failed_invite_still_closes_the_invite_flow() {
        let state = state().await;
        state.invitees().open(3, Uuid::new_v4(), Uuid::new_v4());

        let response = handle(
            state.clone(),
            interaction(3, InteractionKind::FreeText, "@bob"),
        )
        .await;
        assert_eq!(response.prompts.len(), 1);
        assert!(response.prompts[0].text.contains("Nothing to continue here"));
        assert!(state.invitees().take(3).is_none());

        let response = handle(state, interaction(3, InteractionKind::FreeText, "@bob")).await;
        assert!(response.prompts[0].text.contains("/create_match"));
    }
}
