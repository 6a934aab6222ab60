//! Per-command handlers.
//!
//! Each handler turns a parsed command into a reply frame. Mutating
//! handlers drive the durability pipeline: the AOF append and the
//! snapshot dirty counters both happen before the reply is produced.
//! Durability failures are logged, never surfaced to the client.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use bytes::Bytes;
use kiln_core::{StoreError, TtlResult};
use kiln_protocol::{Command, Frame};
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use crate::dispatch::Session;
use crate::state::ServerState;

/// Executes a command that needs no session state.
pub(crate) async fn execute(cmd: Command, state: &Arc<ServerState>) -> Frame {
    match cmd {
        Command::Command => Frame::Simple("OK".into()),

        Command::Get { key } => match state.keyspace.get(&key) {
            Some(value) => Frame::Bulk(value),
            None => Frame::Null,
        },

        Command::Set { key, value } => set(key, value, state),

        Command::Del { keys } => {
            let mut deleted = 0i64;
            for key in &keys {
                if state.keyspace.delete(key) {
                    deleted += 1;
                }
            }
            if deleted > 0 {
                state.mark_dirty();
            }
            Frame::Integer(deleted)
        }

        Command::Exists { keys } => {
            let found = keys.iter().filter(|k| state.keyspace.exists(k)).count();
            Frame::Integer(found as i64)
        }

        Command::Keys { pattern } => {
            let matches = state
                .keyspace
                .keys(&pattern)
                .into_iter()
                .map(|key| Frame::Bulk(Bytes::from(key.into_bytes())))
                .collect();
            Frame::Array(matches)
        }

        Command::Expire { key, seconds } => {
            if state.keyspace.expire(&key, seconds) {
                state.mark_dirty();
                Frame::Integer(1)
            } else {
                Frame::Integer(0)
            }
        }

        Command::Ttl { key } => match state.keyspace.ttl(&key) {
            TtlResult::Seconds(s) => Frame::Integer(s as i64),
            TtlResult::NoExpiry => Frame::Integer(-1),
            TtlResult::Missing => Frame::Integer(-2),
        },

        Command::FlushDb => {
            state.keyspace.clear();
            state.mark_dirty();
            Frame::Simple("OK".into())
        }

        Command::DbSize => Frame::Integer(state.keyspace.len() as i64),

        Command::Save => save(state).await,
        Command::BgSave => bgsave(state),
        Command::BgRewriteAof => bgrewriteaof(state),

        // routed by the dispatcher before reaching here
        Command::Auth { .. }
        | Command::Multi
        | Command::Exec
        | Command::Discard
        | Command::Unknown(_) => Frame::Error("ERR Invalid command".into()),
    }
}

/// AUTH: constant-time comparison against the configured password.
pub(crate) fn auth(session: &mut Session, password: &str, state: &Arc<ServerState>) -> Frame {
    match &state.config.requirepass {
        None => Frame::Error("ERR Client sent AUTH, but no password is set".into()),
        Some(expected) => {
            if bool::from(password.as_bytes().ct_eq(expected.as_bytes())) {
                session.authenticated = true;
                Frame::Simple("OK".into())
            } else {
                Frame::Error("ERR Invalid password".into())
            }
        }
    }
}

/// SET: keyspace insert (with eviction), then AOF append and dirty
/// counters; both happen-before the reply.
fn set(key: String, value: Bytes, state: &Arc<ServerState>) -> Frame {
    match state.keyspace.set(key.clone(), value.clone()) {
        Ok(()) => {
            if let Some(aof) = &state.aof {
                if let Err(e) = aof.append_set(key.as_bytes(), &value) {
                    warn!(error = %e, "aof append failed, record lost");
                }
            }
            state.mark_dirty();
            Frame::Simple("OK".into())
        }
        Err(StoreError::MaxMemoryReached) => Frame::Error("ERR maximum memory reached".into()),
    }
}

/// SAVE: blocking snapshot. Failures are logged only; durability never
/// fails the command.
async fn save(state: &Arc<ServerState>) -> Frame {
    let task_state = state.clone();
    match tokio::task::spawn_blocking(move || task_state.run_save()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "SAVE failed"),
        Err(e) => warn!(error = %e, "SAVE task panicked"),
    }
    Frame::Simple("OK".into())
}

/// BGSAVE: copy the keyspace, then snapshot the copy from a background
/// task while the live store keeps serving writes.
fn bgsave(state: &Arc<ServerState>) -> Frame {
    if state
        .bg_save_running
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Frame::Error("ERR Background saving already happening".into());
    }

    state.stash_db_copy(state.keyspace.snapshot());

    let bg_state = state.clone();
    tokio::spawn(async move {
        let task_state = bg_state.clone();
        match tokio::task::spawn_blocking(move || task_state.run_save()).await {
            Ok(Ok(())) => info!("background save complete"),
            Ok(Err(e)) => warn!(error = %e, "background save failed"),
            Err(e) => warn!(error = %e, "background save task panicked"),
        }
        // clear on every exit path, success or not
        bg_state.release_db_copy();
        bg_state.bg_save_running.store(false, Ordering::SeqCst);
    });

    Frame::Simple("OK".into())
}

/// BGREWRITEAOF: snapshot the keyspace and compact the log from a
/// background task. Appends made meanwhile are parked by the log itself.
fn bgrewriteaof(state: &Arc<ServerState>) -> Frame {
    if state.aof.is_none() {
        return Frame::Error("ERR Append-only log is not enabled".into());
    }

    if state
        .aof_rewrite_running
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Frame::Error("ERR Background AOF rewrite already in progress".into());
    }

    let snapshot = state.keyspace.snapshot();
    let bg_state = state.clone();
    tokio::spawn(async move {
        let task_state = bg_state.clone();
        let result = tokio::task::spawn_blocking(move || match &task_state.aof {
            Some(aof) => aof.rewrite(&snapshot),
            None => Ok(()),
        })
        .await;
        match result {
            Ok(Ok(())) => info!("aof rewrite complete"),
            Ok(Err(e)) => warn!(error = %e, "aof rewrite failed"),
            Err(e) => warn!(error = %e, "aof rewrite task panicked"),
        }
        bg_state.aof_rewrite_running.store(false, Ordering::SeqCst);
    });

    Frame::Simple("Background AOF rewriting started".into())
}
