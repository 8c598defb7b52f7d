//! Push profile changes made elsewhere to local subscribers
//!
//! A trigger on `profiles` runs `pg_notify('profile_changed', user_id)`.
//! One dedicated connection LISTENs on that channel and refreshes the
//! affected user's subscription. Notifications for unwatched users are
//! ignored.

use futures::{stream, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_postgres::{AsyncMessage, NoTls};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::profiles::PgProfileStore;
use crate::store::StoreResult;

pub const PROFILE_CHANNEL: &str = "profile_changed";

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Listen until `shutdown` fires, reconnecting after failures
pub fn spawn_profile_listener(
    database_url: String,
    store: PgProfileStore,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                result = listen(&database_url, &store) => match result {
                    Ok(()) => warn!("Profile listener connection closed"),
                    Err(err) => error!(error = %err, "Profile listener failed"),
                },
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(RECONNECT_DELAY) => {}
            }
        }
        info!("Profile listener stopped");
    })
}

async fn listen(database_url: &str, store: &PgProfileStore) -> StoreResult<()> {
    let (client, mut connection) = tokio_postgres::connect(database_url, NoTls).await?;
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    // The connection has to be driven for LISTEN itself to complete
    let driver = tokio::spawn(async move {
        let mut messages = stream::poll_fn(move |cx| connection.poll_message(cx));
        while let Some(message) = messages.next().await {
            match message {
                Ok(AsyncMessage::Notification(note)) => {
                    if tx.send(note.payload().to_string()).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(error = %err, "Profile listener connection error");
                    break;
                }
            }
        }
    });

    client.batch_execute(&format!("LISTEN {}", PROFILE_CHANNEL)).await?;
    info!(channel = PROFILE_CHANNEL, "Listening for profile changes");

    while let Some(user_id) = rx.recv().await {
        debug!(user_id = %user_id, "Profile change notification");
        if let Err(err) = store.refresh(&user_id).await {
            warn!(user_id = %user_id, error = %err, "Failed to refresh profile");
        }
    }

    driver.abort();
    Ok(())
}
