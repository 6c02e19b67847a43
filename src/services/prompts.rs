//! Prompt texts and option sets shown to chat users.

use std::fmt::Write as _;

use time::{OffsetDateTime, UtcOffset, macros::format_description};

use crate::{
    config::AppConfig,
    dao::models::{EventEntity, UserEntity, Visibility},
    dto::interaction::{OutboundPrompt, PromptOption},
    error::ServiceError,
    services::{allocation, selection::Selection},
    state::{Draft, DraftStatus, draft::CompleteDraft},
};

const OPTIONS_PER_ROW: usize = 3;

fn rows(options: Vec<PromptOption>) -> Vec<Vec<PromptOption>> {
    options
        .chunks(OPTIONS_PER_ROW)
        .map(|row| row.to_vec())
        .collect()
}

fn step_option(label: impl Into<String>, value: impl ToString) -> PromptOption {
    PromptOption::new(label, Selection::Create(value.to_string()).to_string())
}

/// `dd.mm HH:MM` in the organizers' local time.
pub fn format_local(instant: OffsetDateTime, offset: UtcOffset) -> String {
    let format = format_description!("[day].[month] [hour]:[minute]");
    instant
        .to_offset(offset)
        .format(format)
        .unwrap_or_else(|_| instant.to_string())
}

fn format_duration(minutes: i64) -> String {
    match (minutes / 60, minutes % 60) {
        (0, m) => format!("{m}m"),
        (h, 0) => format!("{h}h"),
        (h, m) => format!("{h}h{m:02}"),
    }
}

fn visibility_label(visibility: Visibility) -> &'static str {
    match visibility {
        Visibility::Public => "open",
        Visibility::Private => "closed",
    }
}

/// Command overview.
pub fn help(recipient: i64) -> OutboundPrompt {
    OutboundPrompt::text(
        recipient,
        "Commands:\n\
         /create_match - organize a new match\n\
         /get_matches - browse open matches\n\
         /my_matches - matches you joined\n\
         /organized_matches - matches you organize\n\
         /cancel - drop the match you are creating",
    )
}

/// Prompt for the step that follows `draft`.
pub fn draft_prompt(config: &AppConfig, recipient: i64, draft: &Draft) -> OutboundPrompt {
    let options = config.options();
    let (text, choices) = match draft.status() {
        DraftStatus::New => (
            "Which sport?".to_owned(),
            options
                .categories
                .iter()
                .map(|category| step_option(category, category))
                .collect(),
        ),
        DraftStatus::CategorySet => ("Send the location as a message.".to_owned(), Vec::new()),
        DraftStatus::LocationSet => (
            "Which day?".to_owned(),
            vec![step_option("Today", "today"), step_option("Tomorrow", "tomorrow")],
        ),
        DraftStatus::DaySet => (
            "Start time?".to_owned(),
            options
                .hours
                .iter()
                .map(|hour| step_option(format!("{hour:02}:00"), hour))
                .collect(),
        ),
        DraftStatus::StartSet => (
            "How long?".to_owned(),
            options
                .durations_minutes
                .iter()
                .map(|minutes| step_option(format_duration(i64::from(*minutes)), minutes))
                .collect(),
        ),
        DraftStatus::DurationSet => (
            "Players per team?".to_owned(),
            options
                .team_sizes
                .iter()
                .map(|size| step_option(size.to_string(), size))
                .collect(),
        ),
        DraftStatus::TeamSizeSet => (
            "How many teams?".to_owned(),
            options
                .team_counts
                .iter()
                .map(|count| step_option(count.to_string(), count))
                .collect(),
        ),
        DraftStatus::TeamCountSet => (
            "Send the fee per participant as a number (0 for free).".to_owned(),
            Vec::new(),
        ),
        DraftStatus::FeeSet => (
            "Who can see the match?".to_owned(),
            vec![step_option("Open", "open"), step_option("Closed", "closed")],
        ),
        DraftStatus::VisibilitySet | DraftStatus::OrganizerAssigned => {
            let summary = match draft {
                Draft::VisibilitySet(complete) | Draft::OrganizerAssigned { draft: complete, .. } => {
                    draft_summary(config, complete)
                }
                _ => String::new(),
            };
            (
                summary,
                vec![step_option("Confirm", "confirm"), step_option("Cancel", "cancel")],
            )
        }
    };
    OutboundPrompt::text(recipient, text).with_options(rows(choices))
}

fn draft_summary(config: &AppConfig, draft: &CompleteDraft) -> String {
    let slot = &draft.slot;
    format!(
        "{} at {}\n{} for {}\n{} teams of {}\nfee {}, {}\nConfirm?",
        slot.venue.category,
        slot.venue.location,
        format_local(slot.starts_at, config.utc_offset()),
        format_duration((slot.ends_at - slot.starts_at).whole_minutes()),
        draft.lineup.team_count,
        draft.lineup.team_size,
        draft.fee,
        visibility_label(draft.visibility),
    )
}

/// Category picker for browsing open matches.
pub fn categories(config: &AppConfig, recipient: i64) -> OutboundPrompt {
    let choices = config
        .options()
        .categories
        .iter()
        .map(|category| {
            PromptOption::new(category, Selection::MatchesBy(category.clone()).to_string())
        })
        .collect();
    OutboundPrompt::text(recipient, "Which sport?").with_options(rows(choices))
}

/// One option per event, `event:<id>`.
pub fn event_list(
    config: &AppConfig,
    recipient: i64,
    title: &str,
    events: &[EventEntity],
) -> OutboundPrompt {
    if events.is_empty() {
        return OutboundPrompt::text(recipient, format!("{title}: nothing upcoming."));
    }
    let choices = events
        .iter()
        .map(|event| {
            vec![PromptOption::new(
                format!(
                    "{} {} ({} left)",
                    format_local(event.starts_at, config.utc_offset()),
                    event.location,
                    allocation::capacity_remaining(event)
                ),
                Selection::Event(event.id).to_string(),
            )]
        })
        .collect();
    OutboundPrompt::text(recipient, title).with_options(choices)
}

/// Event details with the actions available to `viewer`.
pub fn event_card(
    config: &AppConfig,
    recipient: i64,
    event: &EventEntity,
    viewer: Option<&UserEntity>,
) -> OutboundPrompt {
    let mut text = format!(
        "{} at {}\n{} for {}\norganizer @{}\nfee {}\n{} of {} seats left",
        event.category,
        event.location,
        format_local(event.starts_at, config.utc_offset()),
        format_duration(event.duration_minutes()),
        event.organizer_username,
        event.fee,
        allocation::capacity_remaining(event),
        event.capacity(),
    );
    if event.cancelled {
        text.push_str("\nCANCELLED");
    }
    for team in &event.teams {
        let _ = write!(
            text,
            "\n{} {}/{}:",
            config.marker_for(&team.label),
            team.occupancy(),
            team.size
        );
        for member in team.active_members() {
            let mark = if member.paid {
                " (paid)"
            } else if member.confirmed {
                " (confirmed)"
            } else {
                ""
            };
            let _ = write!(text, " @{}{}", member.username, mark);
        }
    }

    let mut actions = Vec::new();
    if !event.cancelled {
        let membership = viewer.and_then(|user| event.membership_of(user.id));
        match membership {
            None => actions.push(PromptOption::new(
                "Sign up",
                Selection::SignUp(event.id).to_string(),
            )),
            Some(membership) => {
                if !membership.confirmed {
                    actions.push(PromptOption::new(
                        "Confirm",
                        Selection::Confirm(event.id).to_string(),
                    ));
                } else if !membership.paid && event.fee > 0 {
                    actions.push(PromptOption::new("Pay", Selection::Pay(event.id).to_string()));
                }
                actions.push(PromptOption::new(
                    "Sign out",
                    Selection::SignOut(event.id).to_string(),
                ));
                actions.push(PromptOption::new(
                    "Invite players",
                    Selection::AddMembers(event.id).to_string(),
                ));
            }
        }
        if viewer.is_some_and(|user| user.id == event.organizer_id) {
            if membership.is_none() {
                actions.push(PromptOption::new(
                    "Invite players",
                    Selection::AddMembers(event.id).to_string(),
                ));
            }
            actions.push(PromptOption::new(
                "Cancel match",
                Selection::CancelEvent(event.id).to_string(),
            ));
        }
    }

    OutboundPrompt::text(recipient, text).with_options(rows(actions))
}

/// Team choice for the invite flow. Members are offered their own team only.
pub fn team_picker(
    config: &AppConfig,
    recipient: i64,
    event: &EventEntity,
    viewer: &UserEntity,
) -> OutboundPrompt {
    let own_team = event.active_membership(viewer.id).map(|(team, _)| team);
    let choices = event
        .teams
        .iter()
        .enumerate()
        .filter(|(index, _)| viewer.id == event.organizer_id || own_team == Some(*index))
        .map(|(_, team)| {
            PromptOption::new(
                format!(
                    "{} {}/{}",
                    config.marker_for(&team.label),
                    team.occupancy(),
                    team.size
                ),
                Selection::InviteTeam(team.id).to_string(),
            )
        })
        .collect();
    OutboundPrompt::text(recipient, "Which team?").with_options(rows(choices))
}

/// Start of the invite flow.
pub fn ask_usernames(recipient: i64) -> OutboundPrompt {
    OutboundPrompt::text(
        recipient,
        "Send the usernames to add, separated by spaces (e.g. @ann @bob).",
    )
}

/// Outcome of an invite, listing who was added.
pub fn members_added(recipient: i64, added: &[UserEntity]) -> OutboundPrompt {
    if added.is_empty() {
        return OutboundPrompt::text(recipient, "Nobody was added: no known usernames.");
    }
    let names: Vec<String> = added.iter().map(|user| format!("@{}", user.username)).collect();
    OutboundPrompt::text(recipient, format!("Added {}.", names.join(" ")))
}

/// User-facing refusal for an error that reached the interaction boundary.
pub fn error_prompt(recipient: i64, err: &ServiceError) -> OutboundPrompt {
    let text = match err {
        ServiceError::NotFound(_) => {
            "Nothing to continue here. Start over with /create_match or /get_matches.".to_owned()
        }
        ServiceError::InvalidInput(message) => format!("That did not work: {message}."),
        ServiceError::EventFull => "Sorry, this match is full.".to_owned(),
        ServiceError::TeamFull => "Sorry, this team is full.".to_owned(),
        ServiceError::AlreadyMember => "You are already signed up for this match.".to_owned(),
        ServiceError::NotMember => "You are not signed up for this match.".to_owned(),
        ServiceError::Unauthorized(message) => format!("Not allowed: {message}."),
        ServiceError::Payment(_) => "The payment did not go through. Try again later.".to_owned(),
        ServiceError::Unavailable(_)
        | ServiceError::Degraded
        | ServiceError::Timeout
        | ServiceError::Contention(_)
        | ServiceError::Internal(_) => {
            "Something went wrong on our side. Please try again.".to_owned()
        }
    };
    OutboundPrompt::text(recipient, text)
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn first_step_offers_every_configured_category() {
        let config = AppConfig::default();
        let prompt = draft_prompt(&config, 5, &Draft::New);

        let data: Vec<_> = prompt.options.concat().into_iter().map(|o| o.data).collect();
        assert_eq!(
            data,
            ["create:football", "create:volleyball", "create:basketball"]
        );
        assert_eq!(prompt.recipient, 5);
    }

    #[test]
    fn free_text_steps_come_without_options() {
        let config = AppConfig::default();
        let prompt = draft_prompt(
            &config,
            5,
            &Draft::CategorySet {
                category: "football".into(),
            },
        );
        assert!(prompt.options.is_empty());
    }

    #[test]
    fn local_time_uses_the_configured_offset() {
        let formatted = format_local(
            datetime!(2026-06-01 13:00 UTC),
            UtcOffset::from_hms(5, 0, 0).unwrap(),
        );
        assert_eq!(formatted, "01.06 18:00");
        assert_eq!(format_duration(90), "1h30");
        assert_eq!(format_duration(120), "2h");
    }
}
