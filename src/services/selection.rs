//! Text protocol carried by commands and by the `data` of prompt options.

use std::{fmt, str::FromStr};

use uuid::Uuid;

use crate::error::ServiceError;

/// Slash commands understood by the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `/start` or `/help`.
    Start,
    /// `/create_match`.
    CreateMatch,
    /// `/get_matches`.
    GetMatches,
    /// `/my_matches`.
    MyMatches,
    /// `/organized_matches`.
    OrganizedMatches,
    /// `/cancel`.
    Cancel,
}

impl FromStr for Command {
    type Err = ServiceError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        // `/cmd@botname args` -> `cmd`
        let word = raw.split_whitespace().next().unwrap_or_default();
        let name = word
            .trim_start_matches('/')
            .split('@')
            .next()
            .unwrap_or_default();
        match name {
            "start" | "help" => Ok(Command::Start),
            "create_match" => Ok(Command::CreateMatch),
            "get_matches" => Ok(Command::GetMatches),
            "my_matches" => Ok(Command::MyMatches),
            "organized_matches" => Ok(Command::OrganizedMatches),
            "cancel" => Ok(Command::Cancel),
            _ => Err(ServiceError::InvalidInput(format!("unknown command `{word}`"))),
        }
    }
}

/// Option data sent back when a user picks an option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Value for the current draft step.
    Create(String),
    /// List open matches of a category.
    MatchesBy(String),
    /// Show one event.
    Event(Uuid),
    /// Join the event.
    SignUp(Uuid),
    /// Leave the event.
    SignOut(Uuid),
    /// Confirm attendance.
    Confirm(Uuid),
    /// Pay the fee.
    Pay(Uuid),
    /// Cancel the event as its organizer.
    CancelEvent(Uuid),
    /// Pick which team of the event to invite players into.
    AddMembers(Uuid),
    /// Start the invite flow for a team.
    InviteTeam(Uuid),
}

fn parse_id(kind: &str, raw: &str) -> Result<Uuid, ServiceError> {
    Uuid::parse_str(raw).map_err(|_| ServiceError::InvalidInput(format!("bad {kind} id `{raw}`")))
}

impl FromStr for Selection {
    type Err = ServiceError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (kind, value) = raw
            .trim()
            .split_once(':')
            .ok_or_else(|| ServiceError::InvalidInput(format!("malformed selection `{raw}`")))?;
        let selection = match kind {
            "create" => Selection::Create(value.to_owned()),
            "matches_by" => Selection::MatchesBy(value.to_owned()),
            "event" => Selection::Event(parse_id("event", value)?),
            "signup" => Selection::SignUp(parse_id("event", value)?),
            "signout" => Selection::SignOut(parse_id("event", value)?),
            "confirm" => Selection::Confirm(parse_id("event", value)?),
            "pay" => Selection::Pay(parse_id("event", value)?),
            "cancel_event" => Selection::CancelEvent(parse_id("event", value)?),
            "add_members" => Selection::AddMembers(parse_id("event", value)?),
            "invite_team" => Selection::InviteTeam(parse_id("team", value)?),
            _ => {
                return Err(ServiceError::InvalidInput(format!(
                    "unknown selection `{kind}`"
                )));
            }
        };
        Ok(selection)
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::Create(value) => write!(f, "create:{value}"),
            Selection::MatchesBy(category) => write!(f, "matches_by:{category}"),
            Selection::Event(id) => write!(f, "event:{id}"),
            Selection::SignUp(id) => write!(f, "signup:{id}"),
            Selection::SignOut(id) => write!(f, "signout:{id}"),
            Selection::Confirm(id) => write!(f, "confirm:{id}"),
            Selection::Pay(id) => write!(f, "pay:{id}"),
            Selection::CancelEvent(id) => write!(f, "cancel_event:{id}"),
            Selection::AddMembers(id) => write!(f, "add_members:{id}"),
            Selection::InviteTeam(id) => write!(f, "invite_team:{id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_ignores_bot_suffix_and_arguments() {
        assert_eq!(
            "/create_match@matchday_bot now".parse::<Command>().unwrap(),
            Command::CreateMatch
        );
        assert!("/dance".parse::<Command>().is_err());
    }

    #[test]
    fn step_values_may_contain_colons() {
        assert_eq!(
            "create:Arena 5: north".parse::<Selection>().unwrap(),
            Selection::Create("Arena 5: north".into())
        );
    }

    #[test]
    fn malformed_identifiers_are_invalid_input() {
        let err = "signup:42".parse::<Selection>().unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
        assert!("nothing".parse::<Selection>().is_err());
    }

    #[test]
    fn encoded_selection_parses_back() {
        let id = Uuid::new_v4();
        let encoded = Selection::InviteTeam(id).to_string();
        assert_eq!(encoded.parse::<Selection>().unwrap(), Selection::InviteTeam(id));
    }
}
