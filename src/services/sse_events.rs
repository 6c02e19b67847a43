use serde::Serialize;
use tracing::warn;

use crate::{
    config::AppConfig,
    dao::models::{EventEntity, UserEntity},
    dto::{
        interaction::OutboundPrompt,
        sse::{ServerEvent, SystemStatus},
    },
    services::prompts,
    state::SharedState,
};

const EVENT_PROMPT: &str = "prompt";
const EVENT_SYSTEM_STATUS: &str = "system.status";

/// Queue a prompt for a user other than the current sender.
pub fn send_prompt(state: &SharedState, prompt: &OutboundPrompt) {
    send_outbox_event(state, EVENT_PROMPT, prompt);
}

/// Broadcast the degraded flag so adapters can pause delivery.
pub fn broadcast_system_status(state: &SharedState, degraded: bool) {
    send_outbox_event(state, EVENT_SYSTEM_STATUS, &SystemStatus { degraded });
}

/// Tell the organizer someone joined.
pub fn notify_sign_up(state: &SharedState, event: &EventEntity, user: &UserEntity, team: usize) {
    let organizer = event.organizer_chat_id;
    if organizer == user.chat_id {
        return;
    }
    let config = state.config();
    let label = event
        .teams
        .get(team)
        .map(|team| config.marker_for(&team.label))
        .unwrap_or_default();
    let text = format!(
        "@{} joined {} {} at {}",
        user.username,
        label,
        event.category,
        prompts::format_local(event.starts_at, config.utc_offset())
    );
    send_prompt(state, &OutboundPrompt::text(organizer, text));
}

/// Tell the organizer someone left.
pub fn notify_sign_out(state: &SharedState, event: &EventEntity, user: &UserEntity) {
    let organizer = event.organizer_chat_id;
    if organizer == user.chat_id {
        return;
    }
    let text = format!(
        "@{} left {} at {}",
        user.username, event.category, event.location
    );
    send_prompt(state, &OutboundPrompt::text(organizer, text));
}

/// Tell every active member, the organizer excepted, that the event is off.
pub fn notify_cancellation(state: &SharedState, event: &EventEntity) {
    let config = state.config();
    let text = format!(
        "{} at {} on {} was cancelled by the organizer.",
        event.category,
        event.location,
        prompts::format_local(event.starts_at, config.utc_offset())
    );
    for member in event.teams.iter().flat_map(|team| team.active_members()) {
        if member.user_id == event.organizer_id {
            continue;
        }
        send_prompt(state, &OutboundPrompt::text(member.chat_id, text.clone()));
    }
}

/// Send each invited user the event card so they can confirm.
pub fn notify_invited(state: &SharedState, event: &EventEntity, invited: &[UserEntity]) {
    let config: &AppConfig = state.config();
    for user in invited {
        let mut card = prompts::event_card(config, user.chat_id, event, Some(user));
        card.text = format!("You were added to a match.\n{}", card.text);
        send_prompt(state, &card);
    }
}

fn send_outbox_event(state: &SharedState, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => {
            state.outbox().publish(event);
        }
        Err(err) => warn!(event, error = %err, "failed to serialize outbox payload"),
    }
}
