//! Client construction and the initial reachability check.

use std::{iter, time::Duration};

use mongodb::{Client, Database, bson::doc};
use tokio::time::sleep;
use tracing::{debug, info};

use super::{
    config::MongoConfig,
    error::{MongoDaoError, MongoResult},
};

const FIRST_WAIT: Duration = Duration::from_millis(250);
const LONGEST_WAIT: Duration = Duration::from_secs(5);

/// How often, and how patiently, a fresh client pings the server before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
}

impl RetryPolicy {
    /// At least one ping is always sent.
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
        }
    }

    /// Pings sent before the attempt fails.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Waits between consecutive pings: doubling from 250ms, capped at 5s.
    fn waits(self) -> impl Iterator<Item = Duration> {
        iter::successors(Some(FIRST_WAIT), |wait| Some((*wait * 2).min(LONGEST_WAIT)))
            .take(self.attempts as usize - 1)
    }
}

/// Build a client from `config` and return it once the server answers a ping.
pub async fn connect(config: &MongoConfig) -> MongoResult<(Client, Database)> {
    let client = Client::with_options(config.client_options().clone())
        .map_err(|source| MongoDaoError::ClientConstruction { source })?;
    let database = client.database(config.database_name());

    let policy = config.retry();
    let mut waits = policy.waits();
    let mut attempt = 0;
    loop {
        attempt += 1;
        match database.run_command(doc! { "ping": 1 }).await {
            Ok(_) => {
                info!(attempt, database = config.database_name(), "MongoDB reachable");
                return Ok((client, database));
            }
            Err(source) => match waits.next() {
                Some(wait) => {
                    debug!(
                        attempt,
                        of = policy.attempts(),
                        ?wait,
                        error = %source,
                        "MongoDB not reachable yet"
                    );
                    sleep(wait).await;
                }
                None => {
                    return Err(MongoDaoError::InitialPing {
                        attempts: attempt,
                        source,
                    });
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waits_double_up_to_the_cap() {
        let waits: Vec<_> = RetryPolicy::new(8).waits().map(|w| w.as_millis()).collect();
        assert_eq!(waits, [250, 500, 1000, 2000, 4000, 5000, 5000]);
    }

    #[test]
    fn single_attempt_never_waits() {
        assert_eq!(RetryPolicy::new(1).waits().count(), 0);
        assert_eq!(RetryPolicy::new(0).attempts(), 1);
    }
}
