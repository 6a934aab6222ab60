//! Server bootstrap: startup recovery, background duties, accept loop.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use kiln_persistence::{aof, rdb, FsyncPolicy};
use tokio::net::TcpListener;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::connection;
use crate::state::ServerState;

/// A bound kiln server, ready to accept connections.
///
/// Binding runs recovery (snapshot load, log replay) and spawns the
/// periodic duties first, so by the time a client can connect the
/// keyspace already reflects the durable state.
pub struct Server {
    listener: TcpListener,
    state: Arc<ServerState>,
}

impl Server {
    /// Recovers state, spawns background duties, and binds `addr`.
    pub async fn bind(config: Config, addr: SocketAddr) -> io::Result<Server> {
        let state = Arc::new(ServerState::new(config));
        recover(&state);
        spawn_duties(&state);

        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "listening");

        Ok(Server { listener, state })
    }

    /// The actually bound address (useful with port 0).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The shared server state.
    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }

    /// Runs the accept loop forever, one task per connection.
    pub async fn run(self) -> io::Result<()> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            self.state.connections_total.fetch_add(1, Ordering::Relaxed);

            let state = self.state.clone();
            tokio::spawn(async move {
                if let Err(e) = connection::handle(stream, state).await {
                    error!(%peer, error = %e, "connection error");
                }
            });
        }
    }
}

/// Loads the snapshot, then replays the append-only log on top of it.
///
/// Replay applies records straight to the keyspace; the log handle is
/// never touched, so replay cannot append to the file it is reading.
/// Both steps are best-effort: failures are logged and startup proceeds.
fn recover(state: &Arc<ServerState>) {
    match rdb::load(&state.config.rdb_path()) {
        Ok(Some(entries)) => {
            info!(keys = entries.len(), "loaded snapshot");
            state.keyspace.load_snapshot(entries);
        }
        Ok(None) => {}
        Err(e) => warn!(error = %e, "cannot load snapshot, starting empty"),
    }

    if state.config.aof_enabled {
        let result = aof::replay(&state.config.aof_path(), |key, value| {
            if let Err(e) = state.keyspace.set(key.to_owned(), value) {
                warn!(key, error = %e, "replay: set rejected");
            }
        });
        match result {
            Ok(applied) if applied > 0 => info!(records = applied, "replayed append-only log"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "log replay failed, continuing"),
        }
    }
}

/// Spawns the periodic duties: the everysec log flusher and one ticker
/// per snapshot rule.
fn spawn_duties(state: &Arc<ServerState>) {
    let needs_flusher = state
        .aof
        .as_ref()
        .map(|log| log.fsync_policy() == FsyncPolicy::EverySec)
        .unwrap_or(false);

    if needs_flusher {
        let state = state.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Some(log) = &state.aof {
                    if let Err(e) = log.flush() {
                        warn!(error = %e, "log flush failed");
                    }
                }
            }
        });
    }

    for (idx, rule) in state.config.save_rules.iter().enumerate() {
        let state = state.clone();
        let threshold = rule.keys_changed;
        let period = Duration::from_secs(rule.secs.max(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick of an interval completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                // the counter resets every tick, save or not
                let changed = state.take_dirty(idx);
                if changed >= threshold {
                    let task_state = state.clone();
                    match tokio::task::spawn_blocking(move || task_state.run_save()).await {
                        Ok(Ok(())) => info!(rule = idx, changed, "scheduled snapshot saved"),
                        Ok(Err(e)) => warn!(rule = idx, error = %e, "scheduled snapshot failed"),
                        Err(e) => warn!(rule = idx, error = %e, "snapshot task panicked"),
                    }
                }
            }
        });
    }
}
