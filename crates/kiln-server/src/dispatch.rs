//! Command dispatch: routing, the auth gate, and transaction buffering.
//!
//! Every frame a connection parses comes through [`dispatch`]. Order of
//! gates matters: unknown commands are rejected first, then the auth
//! gate, then the transaction gate (which queues instead of executing),
//! and only then does a command actually run.

use std::sync::Arc;

use kiln_protocol::{Command, Frame};

use crate::handlers;
use crate::state::ServerState;

/// Per-connection session: auth status and the optional transaction
/// buffer. Touched only by the owning connection's task.
#[derive(Debug, Default)]
pub struct Session {
    /// Whether AUTH succeeded on this connection.
    pub authenticated: bool,
    /// Commands queued by MULTI, awaiting EXEC.
    pub transaction: Option<Vec<Command>>,
}

/// Routes one parsed frame to its handler and produces the reply frame.
pub async fn dispatch(frame: Frame, session: &mut Session, state: &Arc<ServerState>) -> Frame {
    let cmd = match Command::from_frame(frame) {
        Ok(cmd) => cmd,
        Err(e) => return Frame::Error(format!("ERR {e}")),
    };

    if matches!(cmd, Command::Unknown(_)) {
        return Frame::Error("ERR Invalid command".into());
    }

    if state.config.requirepass.is_some()
        && !session.authenticated
        && !cmd.allowed_before_auth()
    {
        return Frame::Error("NOAUTH Authentication required".into());
    }

    // inside MULTI everything except EXEC/DISCARD is queued, not run
    if session.transaction.is_some() && !matches!(cmd, Command::Exec | Command::Discard) {
        if matches!(cmd, Command::Multi) {
            return Frame::Error("ERR MULTI calls can't be nested".into());
        }
        if let Some(queue) = session.transaction.as_mut() {
            queue.push(cmd);
        }
        return Frame::Simple("QUEUED".into());
    }

    match cmd {
        Command::Multi => {
            session.transaction = Some(Vec::new());
            Frame::Simple("OK".into())
        }
        Command::Exec => match session.transaction.take() {
            Some(queued) => {
                let mut replies = Vec::with_capacity(queued.len());
                for cmd in queued {
                    replies.push(run_one(cmd, session, state).await);
                }
                Frame::Array(replies)
            }
            None => Frame::Error("ERR EXEC without active MULTI".into()),
        },
        Command::Discard => match session.transaction.take() {
            Some(_) => Frame::Simple("OK".into()),
            None => Frame::Error("ERR DISCARD without MULTI".into()),
        },
        cmd => run_one(cmd, session, state).await,
    }
}

/// Executes a single non-transactional command. AUTH is the one command
/// that needs the session; everything else only touches server state.
async fn run_one(cmd: Command, session: &mut Session, state: &Arc<ServerState>) -> Frame {
    match cmd {
        Command::Auth { password } => handlers::auth(session, &password, state),
        cmd => handlers::execute(cmd, state).await,
    }
}
