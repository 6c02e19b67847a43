//! Typed event draft and the step machine that drives it.
//!
//! Each variant of [`Draft`] carries exactly the fields collected so far, so a draft can
//! only be committed once every step has been answered.

use std::fmt;

use thiserror::Error;
use time::{Duration, OffsetDateTime, UtcOffset};

use crate::{
    config::AppConfig,
    dao::models::{UserEntity, Visibility},
};

/// Longest accepted free-text location.
pub const MAX_LOCATION_CHARS: usize = 128;
/// Longest accepted slot.
pub const MAX_DURATION_MINUTES: u32 = 24 * 60;

/// Dialog step marker. Variants are declared in dialog order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DraftStatus {
    /// Nothing collected; waiting for the category.
    New,
    /// Waiting for the location.
    CategorySet,
    /// Waiting for the day.
    LocationSet,
    /// Waiting for the start hour.
    DaySet,
    /// Waiting for the duration.
    StartSet,
    /// Waiting for the team size.
    DurationSet,
    /// Waiting for the team count.
    TeamSizeSet,
    /// Waiting for the fee.
    TeamCountSet,
    /// Waiting for the visibility.
    FeeSet,
    /// Complete; waiting for confirm or cancel.
    VisibilitySet,
    /// Confirmed and bound to its organizer.
    OrganizerAssigned,
}

impl fmt::Display for DraftStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Venue {
    /// Sport, one of the configured categories.
    pub category: String,
    /// Free-text place.
    pub location: String,
}

/// Venue plus a fully known time slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    /// Category and location.
    pub venue: Venue,
    /// Start in UTC.
    pub starts_at: OffsetDateTime,
    /// End in UTC, after `starts_at`.
    pub ends_at: OffsetDateTime,
}

/// Team shape of the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lineup {
    /// Players per team.
    pub team_size: u32,
    /// Number of teams, at most the palette size.
    pub team_count: u32,
}

/// Every field an event needs, ready to be committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteDraft {
    /// Where and when.
    pub slot: Slot,
    /// Team shape.
    pub lineup: Lineup,
    /// Per-participant fee, 0 for free.
    pub fee: u64,
    /// Whether the event is listed.
    pub visibility: Visibility,
}

/// Event draft, one variant per dialog step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Draft {
    /// Nothing collected yet.
    New,
    /// Category chosen.
    CategorySet {
        /// Chosen category.
        category: String,
    },
    /// Category and location known.
    LocationSet(Venue),
    /// `midnight` is the provisional start until the hour is known.
    DaySet {
        /// Category and location.
        venue: Venue,
        /// Local midnight of the chosen day.
        midnight: OffsetDateTime,
    },
    /// Start instant known.
    StartSet {
        /// Category and location.
        venue: Venue,
        /// Start in UTC.
        starts_at: OffsetDateTime,
    },
    /// Full slot known.
    DurationSet(Slot),
    /// Team size chosen.
    TeamSizeSet {
        /// Where and when.
        slot: Slot,
        /// Players per team.
        team_size: u32,
    },
    /// Team shape complete.
    TeamCountSet {
        /// Where and when.
        slot: Slot,
        /// Team shape.
        lineup: Lineup,
    },
    /// Fee chosen.
    FeeSet {
        /// Where and when.
        slot: Slot,
        /// Team shape.
        lineup: Lineup,
        /// Per-participant fee.
        fee: u64,
    },
    /// Every field collected.
    VisibilitySet(CompleteDraft),
    /// Produced at confirmation; never stored in a session.
    OrganizerAssigned {
        /// The complete draft.
        draft: CompleteDraft,
        /// User who confirmed it.
        organizer: UserEntity,
    },
}

impl Draft {
    /// Step marker of this variant.
    pub fn status(&self) -> DraftStatus {
        match self {
            Draft::New => DraftStatus::New,
            Draft::CategorySet { .. } => DraftStatus::CategorySet,
            Draft::LocationSet(_) => DraftStatus::LocationSet,
            Draft::DaySet { .. } => DraftStatus::DaySet,
            Draft::StartSet { .. } => DraftStatus::StartSet,
            Draft::DurationSet(_) => DraftStatus::DurationSet,
            Draft::TeamSizeSet { .. } => DraftStatus::TeamSizeSet,
            Draft::TeamCountSet { .. } => DraftStatus::TeamCountSet,
            Draft::FeeSet { .. } => DraftStatus::FeeSet,
            Draft::VisibilitySet(_) => DraftStatus::VisibilitySet,
            Draft::OrganizerAssigned { .. } => DraftStatus::OrganizerAssigned,
        }
    }

    /// Attach the organizer to a complete draft.
    pub fn assign_organizer(self, organizer: UserEntity) -> Result<Draft, DraftError> {
        match self {
            Draft::VisibilitySet(draft) => Ok(Draft::OrganizerAssigned { draft, organizer }),
            other => Err(DraftError::UnexpectedStep {
                status: other.status(),
                step: "organizer",
            }),
        }
    }
}

/// Calendar day selector relative to the organizer's today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Day {
    /// The organizer's current day.
    Today,
    /// The day after.
    Tomorrow,
}

/// Final answer on a complete draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Commit the draft as an event.
    Confirm,
    /// Drop the draft.
    Cancel,
}

/// A parsed step value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepInput {
    /// Lowercased configured category.
    Category(String),
    /// Trimmed location.
    Location(String),
    /// Day of the match.
    Day(Day),
    /// Local start hour, 0 to 23.
    Hour(u8),
    /// Slot length.
    DurationMinutes(u32),
    /// Players per team.
    TeamSize(u32),
    /// Number of teams.
    TeamCount(u32),
    /// Per-participant fee.
    Fee(u64),
    /// Listed or invite-only.
    Visibility(Visibility),
}

impl StepInput {
    fn name(&self) -> &'static str {
        match self {
            StepInput::Category(_) => "category",
            StepInput::Location(_) => "location",
            StepInput::Day(_) => "day",
            StepInput::Hour(_) => "hour",
            StepInput::DurationMinutes(_) => "duration",
            StepInput::TeamSize(_) => "team size",
            StepInput::TeamCount(_) => "team count",
            StepInput::Fee(_) => "fee",
            StepInput::Visibility(_) => "visibility",
        }
    }
}

/// What a raw step value means for the current status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// A value for the current field.
    Field(StepInput),
    /// Confirm or cancel on a complete draft.
    Decision(Decision),
}

/// Why a step value was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DraftError {
    /// The value could not be parsed or validated for the current step.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The value belongs to another step than the one the draft is on.
    #[error("{step} cannot be applied while the draft is at {status}")]
    UnexpectedStep {
        /// Where the draft is.
        status: DraftStatus,
        /// What was attempted.
        step: &'static str,
    },
}

/// Everything a transition needs besides the draft and the value.
#[derive(Debug, Clone, Copy)]
pub struct StepContext {
    /// Current instant.
    pub now: OffsetDateTime,
    /// Organizers' local offset.
    pub utc_offset: UtcOffset,
    /// Upper bound for the team count.
    pub palette_size: usize,
}

impl StepContext {
    /// Context for a step applied at `now`.
    pub fn from_config(config: &AppConfig, now: OffsetDateTime) -> Self {
        Self {
            now,
            utc_offset: config.utc_offset(),
            palette_size: config.palette().len(),
        }
    }
}

fn invalid(message: impl Into<String>) -> DraftError {
    DraftError::InvalidInput(message.into())
}

fn parse_number<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T, DraftError> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| invalid(format!("{what} must be a whole number, got `{}`", raw.trim())))
}

/// Interpret `raw` as the value expected while the draft is at `status`.
pub fn parse_step(status: DraftStatus, raw: &str, config: &AppConfig) -> Result<Step, DraftError> {
    let value = raw.trim();
    let input = match status {
        DraftStatus::New => {
            let category = value.to_lowercase();
            if !config.options().categories.contains(&category) {
                return Err(invalid(format!("unknown category `{value}`")));
            }
            StepInput::Category(category)
        }
        DraftStatus::CategorySet => {
            if value.is_empty() {
                return Err(invalid("location must not be empty"));
            }
            if value.chars().count() > MAX_LOCATION_CHARS {
                return Err(invalid(format!(
                    "location is longer than {MAX_LOCATION_CHARS} characters"
                )));
            }
            StepInput::Location(value.to_owned())
        }
        DraftStatus::LocationSet => match value.to_lowercase().as_str() {
            "today" => StepInput::Day(Day::Today),
            "tomorrow" => StepInput::Day(Day::Tomorrow),
            _ => return Err(invalid(format!("day must be today or tomorrow, got `{value}`"))),
        },
        DraftStatus::DaySet => {
            let hour: u8 = parse_number(value, "hour")?;
            if hour > 23 {
                return Err(invalid(format!("hour {hour} is not an hour of the day")));
            }
            StepInput::Hour(hour)
        }
        DraftStatus::StartSet => {
            let minutes: u32 = parse_number(value, "duration")?;
            if minutes == 0 || minutes > MAX_DURATION_MINUTES {
                return Err(invalid(format!(
                    "duration must be between 1 and {MAX_DURATION_MINUTES} minutes"
                )));
            }
            StepInput::DurationMinutes(minutes)
        }
        DraftStatus::DurationSet => {
            let size: u32 = parse_number(value, "team size")?;
            if size == 0 {
                return Err(invalid("team size must be positive"));
            }
            StepInput::TeamSize(size)
        }
        DraftStatus::TeamSizeSet => {
            let count: u32 = parse_number(value, "team count")?;
            let palette = config.palette().len();
            if count == 0 || count as usize > palette {
                return Err(invalid(format!("team count must be between 1 and {palette}")));
            }
            StepInput::TeamCount(count)
        }
        DraftStatus::TeamCountSet => StepInput::Fee(parse_number(value, "fee")?),
        DraftStatus::FeeSet => match value.to_lowercase().as_str() {
            "open" | "public" => StepInput::Visibility(Visibility::Public),
            "closed" | "private" => StepInput::Visibility(Visibility::Private),
            _ => return Err(invalid(format!("visibility must be open or closed, got `{value}`"))),
        },
        DraftStatus::VisibilitySet => {
            return match value.to_lowercase().as_str() {
                "confirm" => Ok(Step::Decision(Decision::Confirm)),
                "cancel" => Ok(Step::Decision(Decision::Cancel)),
                _ => Err(invalid(format!("expected confirm or cancel, got `{value}`"))),
            };
        }
        DraftStatus::OrganizerAssigned => {
            return Err(DraftError::UnexpectedStep {
                status,
                step: "step value",
            });
        }
    };
    Ok(Step::Field(input))
}

/// Midnight of the selected day in the organizer's local time.
fn midnight_of(day: Day, ctx: &StepContext) -> Result<OffsetDateTime, DraftError> {
    let today = ctx.now.to_offset(ctx.utc_offset).date();
    let date = match day {
        Day::Today => today,
        Day::Tomorrow => today
            .next_day()
            .ok_or_else(|| invalid("tomorrow is out of the calendar range"))?,
    };
    Ok(date.midnight().assume_offset(ctx.utc_offset))
}

/// Compute the draft that follows `draft` once `input` is applied.
pub fn compute_transition(
    draft: &Draft,
    input: StepInput,
    ctx: &StepContext,
) -> Result<Draft, DraftError> {
    let next = match (draft, input) {
        (Draft::New, StepInput::Category(category)) => Draft::CategorySet { category },
        (Draft::CategorySet { category }, StepInput::Location(location)) => {
            Draft::LocationSet(Venue {
                category: category.clone(),
                location,
            })
        }
        (Draft::LocationSet(venue), StepInput::Day(day)) => Draft::DaySet {
            venue: venue.clone(),
            midnight: midnight_of(day, ctx)?,
        },
        (Draft::DaySet { venue, midnight }, StepInput::Hour(hour)) => Draft::StartSet {
            venue: venue.clone(),
            starts_at: *midnight + Duration::hours(i64::from(hour)),
        },
        (Draft::StartSet { venue, starts_at }, StepInput::DurationMinutes(minutes)) => {
            Draft::DurationSet(Slot {
                venue: venue.clone(),
                starts_at: *starts_at,
                ends_at: *starts_at + Duration::minutes(i64::from(minutes)),
            })
        }
        (Draft::DurationSet(slot), StepInput::TeamSize(team_size)) => Draft::TeamSizeSet {
            slot: slot.clone(),
            team_size,
        },
        (Draft::TeamSizeSet { slot, team_size }, StepInput::TeamCount(team_count)) => {
            if team_count == 0 || team_count as usize > ctx.palette_size {
                return Err(invalid(format!(
                    "team count must be between 1 and {}",
                    ctx.palette_size
                )));
            }
            Draft::TeamCountSet {
                slot: slot.clone(),
                lineup: Lineup {
                    team_size: *team_size,
                    team_count,
                },
            }
        }
        (Draft::TeamCountSet { slot, lineup }, StepInput::Fee(fee)) => Draft::FeeSet {
            slot: slot.clone(),
            lineup: *lineup,
            fee,
        },
        (Draft::FeeSet { slot, lineup, fee }, StepInput::Visibility(visibility)) => {
            Draft::VisibilitySet(CompleteDraft {
                slot: slot.clone(),
                lineup: *lineup,
                fee: *fee,
                visibility,
            })
        }
        (current, input) => {
            return Err(DraftError::UnexpectedStep {
                status: current.status(),
                step: input.name(),
            });
        }
    };
    Ok(next)
}

#[cfg(test)]
mod tests {
    use time::macros::{datetime, offset};
    use uuid::Uuid;

    use super::*;

    fn ctx(now: OffsetDateTime) -> StepContext {
        StepContext {
            now,
            utc_offset: offset!(+5),
            palette_size: 7,
        }
    }

    fn run(config: &AppConfig, ctx: &StepContext, values: &[&str]) -> Draft {
        values.iter().fold(Draft::New, |draft, raw| {
            match parse_step(draft.status(), raw, config).unwrap() {
                Step::Field(input) => compute_transition(&draft, input, ctx).unwrap(),
                Step::Decision(_) => draft,
            }
        })
    }

    #[test]
    fn football_scenario_collects_every_field() {
        let config = AppConfig::default();
        // 08:30 local time on June 1st.
        let ctx = ctx(datetime!(2026-06-01 03:30 UTC));

        let draft = run(
            &config,
            &ctx,
            &["football", "Arena 5", "today", "18", "90", "5", "2", "5000", "open"],
        );

        let Draft::VisibilitySet(complete) = draft else {
            panic!("draft should be complete, got {draft:?}");
        };
        assert_eq!(complete.slot.venue.category, "football");
        assert_eq!(complete.slot.venue.location, "Arena 5");
        assert_eq!(complete.slot.starts_at, datetime!(2026-06-01 18:00 +5));
        assert_eq!(complete.slot.ends_at, datetime!(2026-06-01 19:30 +5));
        assert_eq!(
            complete.lineup,
            Lineup {
                team_size: 5,
                team_count: 2
            }
        );
        assert_eq!(complete.fee, 5000);
        assert_eq!(complete.visibility, Visibility::Public);
    }

    #[test]
    fn tomorrow_uses_the_local_calendar_day() {
        // 23:30 local on June 1st is already June 1st 18:30 UTC; tomorrow is June 2nd locally.
        let ctx = ctx(datetime!(2026-06-01 18:30 UTC));
        let venue = Venue {
            category: "football".into(),
            location: "Arena 5".into(),
        };

        let next = compute_transition(
            &Draft::LocationSet(venue.clone()),
            StepInput::Day(Day::Tomorrow),
            &ctx,
        )
        .unwrap();

        assert_eq!(
            next,
            Draft::DaySet {
                venue,
                midnight: datetime!(2026-06-02 00:00 +5),
            }
        );
    }

    #[test]
    fn non_numeric_hour_is_rejected() {
        let config = AppConfig::default();
        let err = parse_step(DraftStatus::DaySet, "six", &config).unwrap_err();
        assert!(matches!(err, DraftError::InvalidInput(_)));
        assert!(parse_step(DraftStatus::DaySet, "24", &config).is_err());
    }

    #[test]
    fn team_count_is_bounded_by_the_palette() {
        let config = AppConfig::default();
        assert!(parse_step(DraftStatus::TeamSizeSet, "7", &config).is_ok());
        assert!(parse_step(DraftStatus::TeamSizeSet, "8", &config).is_err());
        assert!(parse_step(DraftStatus::TeamSizeSet, "0", &config).is_err());
    }

    #[test]
    fn location_is_trimmed_and_bounded() {
        let config = AppConfig::default();
        assert_eq!(
            parse_step(DraftStatus::CategorySet, "  Arena 5 ", &config),
            Ok(Step::Field(StepInput::Location("Arena 5".into())))
        );
        assert!(parse_step(DraftStatus::CategorySet, "   ", &config).is_err());
        let long = "x".repeat(MAX_LOCATION_CHARS + 1);
        assert!(parse_step(DraftStatus::CategorySet, &long, &config).is_err());
    }

    #[test]
    fn value_for_another_step_does_not_advance() {
        let ctx = ctx(OffsetDateTime::now_utc());
        let err = compute_transition(&Draft::New, StepInput::Hour(18), &ctx).unwrap_err();
        assert_eq!(
            err,
            DraftError::UnexpectedStep {
                status: DraftStatus::New,
                step: "hour"
            }
        );
    }

    #[test]
    fn only_a_complete_draft_accepts_an_organizer() {
        let organizer = UserEntity {
            id: Uuid::new_v4(),
            name: "Coach".into(),
            username: "coach".into(),
            chat_id: 1,
            phone: None,
        };
        let err = Draft::New.assign_organizer(organizer).unwrap_err();
        assert!(matches!(err, DraftError::UnexpectedStep { .. }));
    }
}
