use tokio::time::{MissedTickBehavior, interval};
use tracing::debug;

use crate::state::SharedState;

/// Periodically drop idle draft and invitee sessions.
///
/// Expired entries are also ignored on read, so the sweep only bounds memory.
pub async fn run(state: SharedState) {
    let period = state.config().sessions().sweep_interval;
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // first tick fires immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let drafts = state.drafts().sweep();
        let invitees = state.invitees().sweep();
        if drafts > 0 || invitees > 0 {
            debug!(drafts, invitees, "swept idle sessions");
        }
    }
}
