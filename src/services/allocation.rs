//! Team partitioning and seat assignment. Everything in here is pure.

use thiserror::Error;
use tracing::error;
use uuid::Uuid;

use crate::{
    config::PaletteEntry,
    dao::models::{EventEntity, TeamEntity},
};

/// Why teams could not be built or a seat could not be found.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    /// Requested team count is zero or larger than the palette.
    #[error("team count {requested} is outside 1..={max}")]
    InvalidCount {
        /// Count asked for.
        requested: u32,
        /// Palette size.
        max: usize,
    },
    /// Every team is at its target size.
    #[error("every team is full")]
    Full,
}

/// Build `team_count` empty teams of `team_size`, labelled in palette order.
pub fn partition(
    team_count: u32,
    team_size: u32,
    palette: &[PaletteEntry],
) -> Result<Vec<TeamEntity>, AllocationError> {
    if team_count == 0 || team_count as usize > palette.len() {
        return Err(AllocationError::InvalidCount {
            requested: team_count,
            max: palette.len(),
        });
    }

    Ok(palette
        .iter()
        .take(team_count as usize)
        .map(|entry| TeamEntity {
            id: Uuid::new_v4(),
            label: entry.name.clone(),
            size: team_size,
            members: Vec::new(),
        })
        .collect())
}

/// Index of the least occupied team with room left; ties go to the earliest team.
pub fn select_team(teams: &[TeamEntity]) -> Result<usize, AllocationError> {
    teams
        .iter()
        .enumerate()
        .filter(|(_, team)| team.has_room())
        // min_by_key keeps the first of equal minima.
        .min_by_key(|(_, team)| team.occupancy())
        .map(|(index, _)| index)
        .ok_or(AllocationError::Full)
}

/// Seats left across the whole event.
pub fn capacity_remaining(event: &EventEntity) -> u64 {
    let capacity = event.capacity();
    let occupancy = event.occupancy();
    if occupancy > capacity {
        error!(
            event_id = %event.id,
            capacity,
            occupancy,
            "event holds more active members than seats"
        );
        return 0;
    }
    capacity - occupancy
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use time::{Duration, OffsetDateTime};

    use super::*;
    use crate::{
        config::AppConfig,
        dao::models::{MembershipEntity, Visibility},
    };

    fn member(cancelled: bool) -> MembershipEntity {
        MembershipEntity {
            user_id: Uuid::new_v4(),
            username: "player".into(),
            chat_id: 1,
            confirmed: false,
            paid: false,
            payment_pending: false,
            cancelled,
        }
    }

    fn team_with(size: u32, active: usize) -> TeamEntity {
        TeamEntity {
            id: Uuid::new_v4(),
            label: "red".into(),
            size,
            members: (0..active).map(|_| member(false)).collect(),
        }
    }

    #[test]
    fn partition_yields_distinct_labels_for_every_valid_count() {
        let config = AppConfig::default();
        for count in 1..=7 {
            let teams = partition(count, 5, config.palette()).unwrap();
            assert_eq!(teams.len(), count as usize);
            let labels: HashSet<_> = teams.iter().map(|t| t.label.as_str()).collect();
            assert_eq!(labels.len(), count as usize);
            assert!(teams.iter().all(|t| t.size == 5 && t.members.is_empty()));
        }
    }

    #[test]
    fn partition_rejects_zero_and_more_than_the_palette() {
        let config = AppConfig::default();
        assert_eq!(
            partition(0, 5, config.palette()),
            Err(AllocationError::InvalidCount {
                requested: 0,
                max: 7
            })
        );
        assert!(matches!(
            partition(8, 5, config.palette()),
            Err(AllocationError::InvalidCount { requested: 8, .. })
        ));
    }

    #[test]
    fn partition_follows_palette_order() {
        let config = AppConfig::default();
        let labels: Vec<_> = partition(3, 4, config.palette())
            .unwrap()
            .into_iter()
            .map(|t| t.label)
            .collect();
        assert_eq!(labels, ["red", "blue", "green"]);
    }

    #[test]
    fn select_team_prefers_the_least_loaded_then_the_earliest() {
        let teams = vec![team_with(3, 2), team_with(3, 1), team_with(3, 1)];
        assert_eq!(select_team(&teams), Ok(1));
    }

    #[test]
    fn select_team_skips_full_teams_even_when_smaller() {
        let teams = vec![team_with(1, 1), team_with(5, 3)];
        assert_eq!(select_team(&teams), Ok(1));
    }

    #[test]
    fn select_team_reports_full_when_no_seat_is_left() {
        let teams = vec![team_with(2, 2), team_with(2, 2)];
        assert_eq!(select_team(&teams), Err(AllocationError::Full));
    }

    #[test]
    fn cancelled_memberships_free_their_seat() {
        let mut team = team_with(1, 0);
        team.members.push(member(true));
        assert_eq!(select_team(&[team]), Ok(0));
    }

    #[test]
    fn capacity_remaining_counts_active_members_only() {
        let now = OffsetDateTime::now_utc();
        let mut teams = vec![team_with(5, 2), team_with(5, 1)];
        teams[1].members.push(member(true));
        let event = EventEntity {
            id: Uuid::new_v4(),
            category: "football".into(),
            organizer_id: Uuid::new_v4(),
            organizer_username: "coach".into(),
            organizer_chat_id: 1,
            location: "Arena 5".into(),
            fee: 0,
            starts_at: now,
            ends_at: now + Duration::minutes(90),
            team_size: 5,
            team_count: 2,
            visibility: Visibility::Public,
            cancelled: false,
            teams,
            version: 0,
            created_at: now,
        };
        assert_eq!(capacity_remaining(&event), 7);
    }
}
