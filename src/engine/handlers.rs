use super::dispatch::Invocation;
use super::help::help as help_text;
use super::info;
use crate::constants::DEFAULT_DB_INDEX;
use crate::constants::KEY_TYPE_STRING;
use crate::constants::NO_EXPIRY_TTL;
use crate::constants::SCAN_DEFAULT_COUNT;
use crate::constants::SCAN_DEFAULT_MATCH;
use crate::protocol::Reply;
use crate::protocol::Segment;
use crate::utils::format::human_bytes;
use crate::utils::net::split_host_port;
use crate::utils::time::unix_time;
use crate::CommandError;

type HandlerResult = Result<Reply, CommandError>;

const SCAN_MAX_ARGS: usize = 7;

fn parse_i64(arg: &[u8]) -> Result<i64, CommandError> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(CommandError::NotAnInteger)
}

// -
// Keyspace

pub(crate) fn set(inv: &Invocation<'_>) -> HandlerResult {
    if inv.args.len() < 2 {
        return Err(CommandError::TooFewArguments);
    }
    inv.engine.keyspace().set(inv.arg(0), inv.arg(1));
    Ok(Reply::ok())
}

pub(crate) fn get(inv: &Invocation<'_>) -> HandlerResult {
    Ok(match inv.engine.keyspace().get(inv.arg(0)) {
        Some(value) => Reply::bulk(value),
        None => Reply::null(),
    })
}

pub(crate) fn del(inv: &Invocation<'_>) -> HandlerResult {
    let removed = inv.engine.keyspace().delete(inv.args);
    Ok(Reply::integer(removed as i64))
}

fn incr_by(
    inv: &Invocation<'_>,
    delta: i64,
) -> HandlerResult {
    if inv.args.len() != 1 {
        return Err(CommandError::TooManyArguments);
    }
    let value = inv.engine.keyspace().incr_by(inv.arg(0), delta)?;
    Ok(Reply::integer(value))
}

pub(crate) fn incr(inv: &Invocation<'_>) -> HandlerResult {
    incr_by(inv, 1)
}

pub(crate) fn decr(inv: &Invocation<'_>) -> HandlerResult {
    incr_by(inv, -1)
}

pub(crate) fn keys(inv: &Invocation<'_>) -> HandlerResult {
    if inv.args.len() != 1 {
        return Err(CommandError::TooManyArguments);
    }
    Ok(Reply::bulk_array(inv.engine.keyspace().keys(inv.arg(0))))
}

/// `scan <cursor> [match <pattern>] [count <n>] [type <type>]`, options in
/// any order.
pub(crate) fn scan(inv: &Invocation<'_>) -> HandlerResult {
    let args = inv.args;
    if args.len() > SCAN_MAX_ARGS {
        return Err(CommandError::TooManyArguments);
    }
    if args.len() % 2 != 1 {
        return Err(CommandError::TooFewArguments);
    }
    let cursor = usize::try_from(parse_i64(&args[0])?).map_err(|_| CommandError::NotAnInteger)?;

    let mut pattern = SCAN_DEFAULT_MATCH.as_bytes().to_vec();
    let mut count = SCAN_DEFAULT_COUNT;
    let mut key_type = KEY_TYPE_STRING.to_string();
    for option in args[1..].chunks(2) {
        let value = &option[1];
        match option[0].to_ascii_lowercase().as_slice() {
            b"match" => pattern = value.clone(),
            b"count" => {
                count = usize::try_from(parse_i64(value)?).map_err(|_| CommandError::NotAnInteger)?;
                if count == 0 {
                    return Err(CommandError::Syntax);
                }
            }
            b"type" => key_type = String::from_utf8_lossy(value).to_ascii_lowercase(),
            _ => return Err(CommandError::Syntax),
        }
    }

    // Every value is a string, so any other type filter matches nothing.
    let (next, keys) = if key_type == KEY_TYPE_STRING {
        inv.engine.keyspace().scan(cursor, &pattern, count)
    } else {
        (0, vec![])
    };
    Ok(Reply::array(vec![
        Segment::Data(next.to_string().into_bytes()),
        Segment::Encoded(Reply::bulk_array(keys).encode()),
    ]))
}

pub(crate) fn key_type(inv: &Invocation<'_>) -> HandlerResult {
    if inv.args.len() != 1 {
        return Err(CommandError::TooManyArguments);
    }
    Ok(Reply::simple(KEY_TYPE_STRING))
}

pub(crate) fn ttl(inv: &Invocation<'_>) -> HandlerResult {
    if inv.args.len() != 1 {
        return Err(CommandError::TooManyArguments);
    }
    Ok(Reply::integer(NO_EXPIRY_TTL))
}

pub(crate) fn select(inv: &Invocation<'_>) -> HandlerResult {
    if inv.args.len() != 1 {
        return Err(CommandError::TooManyArguments);
    }
    if inv.arg(0) != DEFAULT_DB_INDEX.as_bytes() {
        return Err(CommandError::InvalidDbIndex);
    }
    Ok(Reply::ok())
}

pub(crate) fn flushdb(inv: &Invocation<'_>) -> HandlerResult {
    inv.engine.keyspace().flush();
    Ok(Reply::ok())
}

// -
// Connection

pub(crate) fn ping(_inv: &Invocation<'_>) -> HandlerResult {
    Ok(Reply::simple("PONG"))
}

pub(crate) fn ping_echo(inv: &Invocation<'_>) -> HandlerResult {
    if inv.args.len() > 1 {
        return Err(CommandError::TooManyArguments);
    }
    Ok(Reply::bulk(inv.arg(0)))
}

pub(crate) fn time(_inv: &Invocation<'_>) -> HandlerResult {
    let (secs, micros) = unix_time();
    Ok(Reply::bulk_array(vec![secs.to_string(), micros.to_string()]))
}

pub(crate) fn quit(_inv: &Invocation<'_>) -> HandlerResult {
    Ok(Reply::ok().with_disconnect())
}

/// Help is reported as an error whose message is the help text.
pub(crate) fn help(inv: &Invocation<'_>) -> HandlerResult {
    Err(CommandError::Help(help_text(&inv.arg_str(0))))
}

// -
// Peers

pub(crate) fn peer_list(inv: &Invocation<'_>) -> HandlerResult {
    let lines: Vec<String> = inv
        .engine
        .replicator()
        .peers()
        .iter()
        .map(|peer| {
            format!(
                "*{}\t{}\tConnection:{}\tBytesIn:{}\tBytesOut:{}\tFailures:{}\n",
                peer.id.as_deref().unwrap_or_default(),
                peer.key,
                peer.state.as_str(),
                human_bytes(peer.bytes_in),
                human_bytes(peer.bytes_out),
                peer.failures,
            )
        })
        .collect();
    Ok(Reply::bulk(lines.concat()))
}

pub(crate) fn peer_connect(inv: &Invocation<'_>) -> HandlerResult {
    if inv.args.len() < 2 {
        return Err(CommandError::Help(help_text("peer")));
    }
    let addr = inv.arg_str(1);
    if split_host_port(&addr).is_none() {
        return Err(CommandError::Syntax);
    }
    inv.engine.replicator().connect(&addr);
    Ok(Reply::ok())
}

pub(crate) fn peer_remove(inv: &Invocation<'_>) -> HandlerResult {
    if inv.args.len() < 2 {
        return Err(CommandError::Help(help_text("peer")));
    }
    let key = inv.arg_str(1);
    if inv.engine.replicator().remove(&key) {
        Ok(Reply::ok())
    } else {
        Err(CommandError::PeerNotFound(key))
    }
}

pub(crate) fn peer_id(inv: &Invocation<'_>) -> HandlerResult {
    Ok(Reply::bulk(inv.engine.server().id.as_str()))
}

// -
// Clients

pub(crate) fn client_list(inv: &Invocation<'_>) -> HandlerResult {
    let lines: Vec<String> = inv
        .engine
        .clients()
        .list()
        .iter()
        .map(|c| format!("id={} addr={} name={}", c.id, c.addr, c.name.as_deref().unwrap_or_default()))
        .collect();
    Ok(Reply::bulk(format!("{}\r\n", lines.join("\r\n"))))
}

pub(crate) fn client_setname(inv: &Invocation<'_>) -> HandlerResult {
    if inv.args.len() > 2 {
        return Err(CommandError::TooManyArguments);
    }
    if inv.args.len() < 2 {
        return Err(CommandError::TooFewArguments);
    }
    let id = inv.session.client_id().ok_or(CommandError::NoSuchClient)?;
    if !inv.engine.clients().set_name(id, &inv.arg_str(1)) {
        return Err(CommandError::NoSuchClient);
    }
    Ok(Reply::ok())
}

pub(crate) fn client_getname(inv: &Invocation<'_>) -> HandlerResult {
    if inv.args.len() > 1 {
        return Err(CommandError::TooManyArguments);
    }
    let name = inv.session.client_id().and_then(|id| inv.engine.clients().name(id));
    Ok(match name {
        Some(name) => Reply::bulk(name),
        None => Reply::null(),
    })
}

/// Disconnects the *calling* connection when `addr` names a connected
/// client. The target connection itself is left open.
pub(crate) fn client_kill(inv: &Invocation<'_>) -> HandlerResult {
    if inv.args.len() > 2 {
        return Err(CommandError::TooManyArguments);
    }
    if inv.args.len() == 1 || inv.arg(1).is_empty() {
        return Err(CommandError::Syntax);
    }
    match inv.engine.clients().find_by_addr(&inv.arg_str(1)) {
        Some(_) => Ok(Reply::ok().with_disconnect()),
        None => Err(CommandError::NoSuchClient),
    }
}

// -
// Info

pub(crate) fn info_all(inv: &Invocation<'_>) -> HandlerResult {
    let engine = inv.engine;
    let mut lines = info::server(engine);
    lines.extend(info::keyspace(engine));
    lines.extend(info::clients(engine));
    lines.extend(info::wal(engine));
    lines.extend(info::replication(engine));
    Ok(info::render(lines))
}

pub(crate) fn info_server(inv: &Invocation<'_>) -> HandlerResult {
    Ok(info::render(info::server(inv.engine)))
}

pub(crate) fn info_keyspace(inv: &Invocation<'_>) -> HandlerResult {
    Ok(info::render(info::keyspace(inv.engine)))
}

pub(crate) fn info_clients(inv: &Invocation<'_>) -> HandlerResult {
    Ok(info::render(info::clients(inv.engine)))
}

pub(crate) fn info_wal(inv: &Invocation<'_>) -> HandlerResult {
    Ok(info::render(info::wal(inv.engine)))
}

pub(crate) fn info_replication(inv: &Invocation<'_>) -> HandlerResult {
    Ok(info::render(info::replication(inv.engine)))
}
