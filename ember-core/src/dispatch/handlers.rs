use std::str;
use std::time::Duration;

use crate::command::{CommandFrame, CommandReply};
use crate::keyspace::Keyspace;

pub(super) fn handle_ping(_frame: &CommandFrame, _keyspace: &mut Keyspace) -> CommandReply {
    CommandReply::SimpleString("PONG".to_owned())
}

pub(super) fn handle_echo(frame: &CommandFrame, _keyspace: &mut Keyspace) -> CommandReply {
    CommandReply::OutputList(frame.args.clone())
}

pub(super) fn handle_set(frame: &CommandFrame, keyspace: &mut Keyspace) -> CommandReply {
    let key = frame.args[0].clone();
    let value = frame.args[1].clone();
    let ttl = match parse_set_ttl(&frame.args[2..]) {
        Ok(ttl) => ttl,
        Err(error) => return CommandReply::Error(error),
    };

    keyspace.upsert(key, value, ttl);
    CommandReply::SimpleString("OK".to_owned())
}

pub(super) fn handle_get(frame: &CommandFrame, keyspace: &mut Keyspace) -> CommandReply {
    keyspace
        .fetch(&frame.args[0])
        .map_or(CommandReply::Null, CommandReply::BulkString)
}

/// Parses the trailing `SET` options, currently only `PX <milliseconds>`.
fn parse_set_ttl(options: &[Vec<u8>]) -> Result<Option<Duration>, String> {
    match options {
        [] => Ok(None),
        [keyword, raw_millis] if keyword.eq_ignore_ascii_case(b"PX") => {
            let Ok(millis) = parse_decimal_i64(raw_millis) else {
                return Err("value is not an integer or out of range".to_owned());
            };
            let Ok(positive_millis) = u64::try_from(millis) else {
                return Err("invalid expire time in 'SET' command".to_owned());
            };
            if positive_millis == 0 {
                return Err("invalid expire time in 'SET' command".to_owned());
            }
            Ok(Some(Duration::from_millis(positive_millis)))
        }
        _ => Err("syntax error".to_owned()),
    }
}

fn parse_decimal_i64(payload: &[u8]) -> Result<i64, ()> {
    let Ok(text) = str::from_utf8(payload) else {
        return Err(());
    };
    text.parse::<i64>().map_err(|_| ())
}
