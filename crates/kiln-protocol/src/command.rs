//! Command parsing from RESP frames.
//!
//! Converts a parsed [`Frame`] (expected to be an array of bulk strings)
//! into a typed [`Command`]. This keeps protocol-level concerns separate
//! from the dispatcher that actually executes commands, and gives
//! transactions a concrete value to queue.

use bytes::Bytes;

use crate::error::ProtocolError;
use crate::types::Frame;

/// A parsed client command, ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// COMMAND. Introspection stub, always answered with OK.
    Command,

    /// AUTH <password>.
    Auth { password: String },

    /// GET <key>. Returns the value or the null bulk.
    Get { key: String },

    /// SET <key> <value>.
    Set { key: String, value: Bytes },

    /// DEL <key> [key ...]. Returns the number of keys removed.
    Del { keys: Vec<String> },

    /// EXISTS <key> [key ...]. Returns the number of keys that exist.
    Exists { keys: Vec<String> },

    /// KEYS <pattern>. Returns all keys matching a glob pattern.
    Keys { pattern: String },

    /// EXPIRE <key> <seconds>. Sets a TTL on an existing key.
    Expire { key: String, seconds: u64 },

    /// TTL <key>. Returns remaining time-to-live in seconds.
    Ttl { key: String },

    /// FLUSHDB. Drops every key.
    FlushDb,

    /// DBSIZE. Returns the number of keys in the database.
    DbSize,

    /// SAVE. Blocking snapshot to disk.
    Save,

    /// BGSAVE. Snapshot to disk from a background task.
    BgSave,

    /// BGREWRITEAOF. Compacts the append-only file.
    BgRewriteAof,

    /// MULTI. Opens a transaction buffer on this connection.
    Multi,

    /// EXEC. Runs the queued transaction.
    Exec,

    /// DISCARD. Drops the queued transaction.
    Discard,

    /// A command we don't recognize.
    Unknown(String),
}

impl Command {
    /// Parses a [`Frame`] into a [`Command`].
    ///
    /// Expects an array frame where the first element is the command name
    /// and the rest are arguments. Routing matches on the uppercased name.
    pub fn from_frame(frame: Frame) -> Result<Command, ProtocolError> {
        let frames = match frame {
            Frame::Array(frames) => frames,
            _ => {
                return Err(ProtocolError::InvalidFrame(
                    "expected array of bulk strings".into(),
                ));
            }
        };

        if frames.is_empty() {
            return Err(ProtocolError::InvalidFrame("empty command array".into()));
        }

        let name = extract_string(&frames[0])?;
        let name_upper = name.to_ascii_uppercase();
        let args = &frames[1..];

        match name_upper.as_str() {
            "COMMAND" => Ok(Command::Command),
            "AUTH" => parse_auth(args),
            "GET" => parse_get(args),
            "SET" => parse_set(args),
            "DEL" => parse_keys_list(args, "DEL").map(|keys| Command::Del { keys }),
            "EXISTS" => parse_keys_list(args, "EXISTS").map(|keys| Command::Exists { keys }),
            "KEYS" => parse_keys_pattern(args),
            "EXPIRE" => parse_expire(args),
            "TTL" => parse_ttl(args),
            "FLUSHDB" => parse_no_args(args, "FLUSHDB", Command::FlushDb),
            "DBSIZE" => parse_no_args(args, "DBSIZE", Command::DbSize),
            "SAVE" => parse_no_args(args, "SAVE", Command::Save),
            "BGSAVE" => parse_no_args(args, "BGSAVE", Command::BgSave),
            "BGREWRITEAOF" => parse_no_args(args, "BGREWRITEAOF", Command::BgRewriteAof),
            "MULTI" => parse_no_args(args, "MULTI", Command::Multi),
            "EXEC" => parse_no_args(args, "EXEC", Command::Exec),
            "DISCARD" => parse_no_args(args, "DISCARD", Command::Discard),
            _ => Ok(Command::Unknown(name)),
        }
    }

    /// Returns `true` if this command may run on an unauthenticated
    /// connection when a password is configured.
    pub fn allowed_before_auth(&self) -> bool {
        matches!(self, Command::Command | Command::Auth { .. })
    }
}

/// Extracts a UTF-8 string from a Bulk or Simple frame.
fn extract_string(frame: &Frame) -> Result<String, ProtocolError> {
    match frame {
        Frame::Bulk(data) => String::from_utf8(data.to_vec())
            .map_err(|_| ProtocolError::InvalidFrame("argument is not valid utf-8".into())),
        Frame::Simple(s) => Ok(s.clone()),
        _ => Err(ProtocolError::InvalidFrame(
            "expected bulk string argument".into(),
        )),
    }
}

/// Extracts raw bytes from a Bulk or Simple frame.
fn extract_bytes(frame: &Frame) -> Result<Bytes, ProtocolError> {
    match frame {
        Frame::Bulk(data) => Ok(data.clone()),
        Frame::Simple(s) => Ok(Bytes::from(s.clone().into_bytes())),
        _ => Err(ProtocolError::InvalidFrame(
            "expected bulk string argument".into(),
        )),
    }
}

fn parse_auth(args: &[Frame]) -> Result<Command, ProtocolError> {
    if args.len() != 1 {
        return Err(ProtocolError::WrongArity("AUTH".into()));
    }
    let password = extract_string(&args[0])?;
    Ok(Command::Auth { password })
}

fn parse_get(args: &[Frame]) -> Result<Command, ProtocolError> {
    if args.len() != 1 {
        return Err(ProtocolError::WrongArity("GET".into()));
    }
    let key = extract_string(&args[0])?;
    Ok(Command::Get { key })
}

fn parse_set(args: &[Frame]) -> Result<Command, ProtocolError> {
    if args.len() != 2 {
        return Err(ProtocolError::WrongArity("SET".into()));
    }
    let key = extract_string(&args[0])?;
    let value = extract_bytes(&args[1])?;
    Ok(Command::Set { key, value })
}

fn parse_keys_list(args: &[Frame], cmd: &str) -> Result<Vec<String>, ProtocolError> {
    if args.is_empty() {
        return Err(ProtocolError::WrongArity(cmd.into()));
    }
    args.iter().map(extract_string).collect()
}

fn parse_keys_pattern(args: &[Frame]) -> Result<Command, ProtocolError> {
    if args.len() != 1 {
        return Err(ProtocolError::WrongArity("KEYS".into()));
    }
    let pattern = extract_string(&args[0])?;
    Ok(Command::Keys { pattern })
}

fn parse_expire(args: &[Frame]) -> Result<Command, ProtocolError> {
    if args.len() != 2 {
        return Err(ProtocolError::WrongArity("EXPIRE".into()));
    }
    let key = extract_string(&args[0])?;
    let seconds = extract_string(&args[1])?
        .parse::<u64>()
        .map_err(|_| ProtocolError::InvalidFrame("value is not an integer or out of range".into()))?;
    Ok(Command::Expire { key, seconds })
}

fn parse_ttl(args: &[Frame]) -> Result<Command, ProtocolError> {
    if args.len() != 1 {
        return Err(ProtocolError::WrongArity("TTL".into()));
    }
    let key = extract_string(&args[0])?;
    Ok(Command::Ttl { key })
}

fn parse_no_args(args: &[Frame], cmd: &str, parsed: Command) -> Result<Command, ProtocolError> {
    if !args.is_empty() {
        return Err(ProtocolError::WrongArity(cmd.into()));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd_frame(parts: &[&str]) -> Frame {
        Frame::Array(
            parts
                .iter()
                .map(|p| Frame::Bulk(Bytes::copy_from_slice(p.as_bytes())))
                .collect(),
        )
    }

    #[test]
    fn parses_get() {
        let cmd = Command::from_frame(cmd_frame(&["GET", "foo"])).unwrap();
        assert_eq!(cmd, Command::Get { key: "foo".into() });
    }

    #[test]
    fn command_name_is_case_insensitive() {
        let cmd = Command::from_frame(cmd_frame(&["get", "foo"])).unwrap();
        assert_eq!(cmd, Command::Get { key: "foo".into() });
    }

    #[test]
    fn parses_set() {
        let cmd = Command::from_frame(cmd_frame(&["SET", "foo", "bar"])).unwrap();
        assert_eq!(
            cmd,
            Command::Set {
                key: "foo".into(),
                value: Bytes::from_static(b"bar"),
            }
        );
    }

    #[test]
    fn set_wrong_arity() {
        let err = Command::from_frame(cmd_frame(&["SET", "foo"])).unwrap_err();
        assert_eq!(err, ProtocolError::WrongArity("SET".into()));
        assert_eq!(
            err.to_string(),
            "invalid number of arguments for the 'SET' command"
        );
    }

    #[test]
    fn del_takes_multiple_keys() {
        let cmd = Command::from_frame(cmd_frame(&["DEL", "a", "b", "c"])).unwrap();
        assert_eq!(
            cmd,
            Command::Del {
                keys: vec!["a".into(), "b".into(), "c".into()],
            }
        );
    }

    #[test]
    fn del_needs_at_least_one_key() {
        let err = Command::from_frame(cmd_frame(&["DEL"])).unwrap_err();
        assert_eq!(err, ProtocolError::WrongArity("DEL".into()));
    }

    #[test]
    fn parses_expire() {
        let cmd = Command::from_frame(cmd_frame(&["EXPIRE", "k", "60"])).unwrap();
        assert_eq!(
            cmd,
            Command::Expire {
                key: "k".into(),
                seconds: 60,
            }
        );
    }

    #[test]
    fn expire_rejects_non_numeric_seconds() {
        assert!(Command::from_frame(cmd_frame(&["EXPIRE", "k", "soon"])).is_err());
    }

    #[test]
    fn bare_commands_reject_arguments() {
        assert!(Command::from_frame(cmd_frame(&["MULTI", "x"])).is_err());
        assert!(Command::from_frame(cmd_frame(&["DBSIZE", "x"])).is_err());
        assert_eq!(
            Command::from_frame(cmd_frame(&["FLUSHDB"])).unwrap(),
            Command::FlushDb
        );
    }

    #[test]
    fn unknown_command_keeps_original_name() {
        let cmd = Command::from_frame(cmd_frame(&["Frobnicate"])).unwrap();
        assert_eq!(cmd, Command::Unknown("Frobnicate".into()));
    }

    #[test]
    fn non_array_frame_is_rejected() {
        let err = Command::from_frame(Frame::Simple("GET".into())).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidFrame(_)));
    }

    #[test]
    fn empty_array_is_rejected() {
        let err = Command::from_frame(Frame::Array(vec![])).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidFrame(_)));
    }

    #[test]
    fn auth_and_command_run_before_auth() {
        assert!(Command::Command.allowed_before_auth());
        assert!(Command::Auth {
            password: "pw".into()
        }
        .allowed_before_auth());
        assert!(!Command::Get { key: "k".into() }.allowed_before_auth());
        assert!(!Command::Multi.allowed_before_auth());
    }
}
