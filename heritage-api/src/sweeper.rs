/// Background expiry of stale invitations
///
/// Redemption already refuses and marks expired codes on its own; the
/// sweeper keeps invitation listings honest by flipping every pending
/// invitation past `expires_at` to `expired` on a fixed interval.
///
/// # Example
///
/// ```no_run
/// use heritage_api::sweeper::InvitationSweeper;
/// use std::time::Duration;
///
/// # async fn example(pool: sqlx::PgPool) -> anyhow::Result<()> {
/// let sweeper = InvitationSweeper::new(pool, Duration::from_secs(300));
/// let shutdown = sweeper.shutdown_token();
///
/// let handle = tokio::spawn(async move { sweeper.run().await });
///
/// // ... later, on shutdown
/// shutdown.cancel();
/// handle.await??;
/// # Ok(())
/// # }
/// ```

use heritage_shared::models::invitation::Invitation;
use sqlx::PgPool;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub struct InvitationSweeper {
    db: PgPool,
    every: Duration,
    shutdown_token: CancellationToken,
}

impl InvitationSweeper {
    pub fn new(db: PgPool, every: Duration) -> Self {
        Self {
            db,
            every,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Cancelling this token stops [`run`](Self::run) after the current pass
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// One pass; returns how many invitations expired
    pub async fn sweep_once(&self) -> Result<u64, sqlx::Error> {
        let expired = Invitation::expire_stale(&self.db).await?;
        if expired > 0 {
            tracing::info!(expired, "Expired stale invitations");
        }
        Ok(expired)
    }

    /// Sweeps until shutdown; failed passes are logged and retried next tick
    pub async fn run(&self) -> anyhow::Result<()> {
        tracing::info!(interval_secs = self.every.as_secs(), "Invitation sweeper starting");

        let mut ticker = interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_token.cancelled() => break,

                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        tracing::error!(error = %e, "Invitation sweep failed");
                    }
                }
            }
        }

        tracing::info!("Invitation sweeper shut down");
        Ok(())
    }
}
