//! Turns one wire line into a reply, by walking the grammar token stream
//! from `scpi-proto` against the command tree.

use scpi_proto::{Trailing, CHNUMSIZE};

use crate::lock::{ClientId, Locker};
use crate::tree::{Component, Node, SpecialCommand, Tree};

/// The result of dispatching a single statement.
pub enum Outcome {
    /// A query answer, or the echoed value of a successful write.
    Reply(String),
    /// A query against an unknown keyword, or any other recoverable
    /// failure: reported to the client as the literal text `nan`.
    Nan,
    /// A write that produced no reply text (the common case).
    NoReply,
}

/// Dispatches a full wire line (already stripped of its terminator by the
/// caller, or not — [`scpi_proto::split_statements`] strips it either way)
/// and returns the formatted reply, joining each statement's answer with
/// `;` and terminating the whole response with `\r\n`. A line with no
/// replies at all yields an empty string, matching the original's
/// "nothing to send back" behavior for an all-write line.
pub fn dispatch_line(
    tree: &Tree,
    read_lock: &Locker,
    write_lock: Option<&Locker>,
    client: &ClientId,
    line: &str,
) -> String {
    let statements = scpi_proto::split_statements(line);
    let expanded = scpi_proto::expand_prefixes(&statements);

    let mut answers = Vec::new();
    for expansion in expanded {
        let outcome = match expansion {
            Ok(statement) => dispatch_statement(tree, read_lock, write_lock, client, &statement),
            Err(_) => Outcome::Nan,
        };
        match outcome {
            Outcome::Reply(text) => answers.push(text),
            Outcome::Nan => answers.push("nan".to_string()),
            Outcome::NoReply => {}
        }
    }

    if answers.is_empty() {
        String::new()
    } else {
        format!("{}\r\n", answers.join(";"))
    }
}

fn dispatch_statement(
    tree: &Tree,
    read_lock: &Locker,
    write_lock: Option<&Locker>,
    client: &ClientId,
    statement: &str,
) -> Outcome {
    if let Some(body) = statement.strip_prefix('*') {
        return dispatch_special(tree, read_lock, write_lock, client, body);
    }
    dispatch_normal(tree, read_lock, write_lock, client, statement)
}

fn dispatch_special(
    tree: &Tree,
    read_lock: &Locker,
    write_lock: Option<&Locker>,
    client: &ClientId,
    body: &str,
) -> Outcome {
    let head = match scpi_proto::parse_special_head(body) {
        Ok(head) => head,
        Err(_) => return Outcome::Nan,
    };
    let key = head.name.to_uppercase();

    tree.with_read(|_root, specials| {
        let special = match specials.get(&key) {
            Some(s) => s,
            None => return Outcome::Nan,
        };
        run_leaf_special(special, read_lock, write_lock, client, &head.trailing)
    })
}

fn run_leaf_special(
    special: &SpecialCommand,
    read_lock: &Locker,
    write_lock: Option<&Locker>,
    client: &ClientId,
    trailing: &Trailing,
) -> Outcome {
    match trailing {
        Trailing::Query => {
            if !read_lock.access(client) {
                return Outcome::Nan;
            }
            match special.read_cb.read(&[], None) {
                Ok(text) => Outcome::Reply(text),
                Err(_) => Outcome::Nan,
            }
        }
        Trailing::Write(value) => run_write(
            write_lock.unwrap_or(read_lock),
            client,
            special.write_cb.as_deref(),
            &[],
            value,
        ),
        Trailing::None => run_write(
            write_lock.unwrap_or(read_lock),
            client,
            special.write_cb.as_deref(),
            &[],
            "",
        ),
    }
}

fn run_write(
    lock: &Locker,
    client: &ClientId,
    write_cb: Option<&dyn crate::tree::WriteCallback>,
    channels: &[u32],
    value: &str,
) -> Outcome {
    if !lock.access(client) {
        return Outcome::Nan;
    }
    match write_cb {
        None => Outcome::Nan,
        Some(cb) => match cb.write(channels, value) {
            Ok(()) => Outcome::NoReply,
            Err(_) => Outcome::Nan,
        },
    }
}

fn dispatch_normal(
    tree: &Tree,
    read_lock: &Locker,
    write_lock: Option<&Locker>,
    client: &ClientId,
    statement: &str,
) -> Outcome {
    let keywords = scpi_proto::split_keywords(statement);
    if keywords.is_empty() {
        return Outcome::Nan;
    }

    // `:SYSTem:LOCK:{owner,request,release}` and the `WLOCK` counterpart
    // are handled structurally rather than as tree attributes: booking a
    // lock needs the calling client's identity, which the generic
    // `ReadCallback`/`WriteCallback` traits don't carry.
    if keywords.len() == 2 || keywords.len() == 3 {
        let root_kw = keywords[0].to_uppercase();
        if root_kw == "SYST" || root_kw == "SYSTEM" {
            let lock_segment = scpi_proto::parse_keyword_segment(keywords[1], CHNUMSIZE);
            let locker = match lock_segment.keyword.to_uppercase().as_str() {
                "LOCK" => Some(read_lock),
                "WLOCK" => write_lock,
                _ => None,
            };
            if let Some(locker) = locker {
                return if keywords.len() == 2 {
                    // bare `:SYSTem:LOCK`, addressed as a leaf: falls
                    // through to the `owner` default child.
                    dispatch_lock_leaf(locker, client, "OWNER", &lock_segment.trailing)
                } else {
                    let leaf_segment = scpi_proto::parse_keyword_segment(keywords[2], CHNUMSIZE);
                    if leaf_segment.channel.is_some() {
                        Outcome::Nan
                    } else {
                        dispatch_lock_leaf(
                            locker,
                            client,
                            &leaf_segment.keyword.to_uppercase(),
                            &leaf_segment.trailing,
                        )
                    }
                };
            }
        }
    }

    tree.with_read(|root, _specials| {
        let mut component = root;
        let mut channels = Vec::new();

        for (i, raw) in keywords.iter().enumerate() {
            let last = i == keywords.len() - 1;
            let segment = scpi_proto::parse_keyword_segment(raw, CHNUMSIZE);
            let key = segment.keyword.to_uppercase();

            let node = match resolve_segment(component, &key, segment.channel, &mut channels) {
                Some(node) => node,
                None => return Outcome::Nan,
            };

            if last {
                return match node {
                    Node::Attribute(attr) => match &segment.trailing {
                        Trailing::Query => {
                            if !read_lock.access(client) {
                                return Outcome::Nan;
                            }
                            match attr.read_cb.read(&channels, None) {
                                Ok(text) => Outcome::Reply(text),
                                Err(_) => Outcome::Nan,
                            }
                        }
                        Trailing::Write(value) => {
                            if let Some(allowed) = &attr.allowed_argins {
                                if !allowed.iter().any(|a| a == value) {
                                    return Outcome::Nan;
                                }
                            }
                            run_write(
                                write_lock.unwrap_or(read_lock),
                                client,
                                attr.write_cb.as_deref(),
                                &channels,
                                value,
                            )
                        }
                        Trailing::None => run_write(
                            write_lock.unwrap_or(read_lock),
                            client,
                            attr.write_cb.as_deref(),
                            &channels,
                            "",
                        ),
                    },
                    Node::Component(comp) => match &comp.default_child {
                        Some(default) => {
                            let child = match comp.children.get(default) {
                                Some(n) => n,
                                None => return Outcome::Nan,
                            };
                            dispatch_leaf_on_default(
                                child,
                                &segment.trailing,
                                read_lock,
                                write_lock,
                                client,
                                &channels,
                            )
                        }
                        None => Outcome::Nan,
                    },
                };
            }

            match node {
                Node::Component(comp) => component = comp,
                Node::Attribute(_) => return Outcome::Nan,
            }
        }
        Outcome::Nan
    })
}

fn dispatch_leaf_on_default(
    node: &Node,
    trailing: &Trailing,
    read_lock: &Locker,
    write_lock: Option<&Locker>,
    client: &ClientId,
    channels: &[u32],
) -> Outcome {
    let attr = match node.as_attribute() {
        Some(a) => a,
        None => return Outcome::Nan,
    };
    match trailing {
        Trailing::Query => {
            if !read_lock.access(client) {
                return Outcome::Nan;
            }
            match attr.read_cb.read(channels, None) {
                Ok(text) => Outcome::Reply(text),
                Err(_) => Outcome::Nan,
            }
        }
        Trailing::Write(value) => {
            if let Some(allowed) = &attr.allowed_argins {
                if !allowed.iter().any(|a| a == value) {
                    return Outcome::Nan;
                }
            }
            run_write(
                write_lock.unwrap_or(read_lock),
                client,
                attr.write_cb.as_deref(),
                channels,
                value,
            )
        }
        Trailing::None => run_write(
            write_lock.unwrap_or(read_lock),
            client,
            attr.write_cb.as_deref(),
            channels,
            "",
        ),
    }
}

/// The `:SYSTem:LOCK:{owner,request,release}` wire surface (and its
/// `WLOCK` counterpart): `owner` is read-only and reports the current
/// owner (`unlocked` if unbooked) — it is the `default_child`, reached
/// when `:SYSTem:LOCK` is addressed directly with no third keyword.
/// `request`/`release` (also abbreviated `req`/`rel`) act the same
/// whether queried or written: both perform the action and reply
/// `True`/`False`.
fn dispatch_lock_leaf(locker: &Locker, client: &ClientId, leaf: &str, trailing: &Trailing) -> Outcome {
    match leaf {
        "OWNER" => match trailing {
            Trailing::Write(_) => Outcome::Nan,
            Trailing::Query | Trailing::None => {
                let owner = locker
                    .owner()
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "unlocked".to_string());
                Outcome::Reply(owner)
            }
        },
        "REQUEST" | "REQ" => Outcome::Reply(bool_text(locker.request(client))),
        "RELEASE" | "REL" => Outcome::Reply(bool_text(locker.release(client))),
        _ => Outcome::Nan,
    }
}

fn bool_text(value: bool) -> String {
    if value {
        "True".to_string()
    } else {
        "False".to_string()
    }
}

/// Resolves one keyword segment against `component`'s children, folding
/// in a channel suffix when the matched child is channel-addressed.
fn resolve_segment<'a>(
    component: &'a Component,
    key: &str,
    channel: Option<u32>,
    channels: &mut Vec<u32>,
) -> Option<&'a Node> {
    let node = component.children.get(key)?;
    if let Node::Component(comp) = node {
        if let Some(spec) = comp.channel {
            let index = channel?;
            if index < spec.first || index >= spec.first + spec.count {
                return None;
            }
            channels.push(index);
        }
    }
    Some(node)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tree::ReadCb;
    use std::sync::Arc;
    use std::time::Duration;

    fn read_const(text: &'static str) -> ReadCb {
        Arc::new(move |_: &[u32], _: Option<&str>| Ok(text.to_string()))
    }

    fn client() -> ClientId {
        ClientId::new("127.0.0.1".parse().unwrap(), 5000)
    }

    #[test]
    fn idn_query() {
        let tree = Tree::new();
        tree.add_special_command("IDN", read_const("ACME,X1,0,1"), None).unwrap();
        let read_lock = Locker::new(Duration::from_secs(60));
        let reply = dispatch_line(&tree, &read_lock, None, &client(), "*IDN?\r\n");
        assert_eq!(reply, "ACME,X1,0,1\r\n");
    }

    #[test]
    fn unknown_query_is_nan() {
        let tree = Tree::new();
        tree.add_command("SOUR:VOLT", read_const("1.0"), None, false, None)
            .unwrap();
        let read_lock = Locker::new(Duration::from_secs(60));
        let reply = dispatch_line(&tree, &read_lock, None, &client(), "SOUR:VOLT?;:CURR?\r\n");
        assert_eq!(reply, "1.0;nan\r\n");
    }

    #[test]
    fn channel_query_threads_index() {
        let tree = Tree::new();
        tree.add_channel("CHAN", 4, "", 1).unwrap();
        tree.add_attribute(
            "CURR",
            "CHAN",
            Arc::new(|channels: &[u32], _: Option<&str>| Ok(channels[0].to_string())),
            None,
            false,
            None,
        )
        .unwrap();
        let read_lock = Locker::new(Duration::from_secs(60));
        let reply = dispatch_line(&tree, &read_lock, None, &client(), "CHAN03:CURR?\r\n");
        assert_eq!(reply, "3\r\n");
    }

    #[test]
    fn leading_colon_on_first_statement_is_nan() {
        let tree = Tree::new();
        let read_lock = Locker::new(Duration::from_secs(60));
        let reply = dispatch_line(&tree, &read_lock, None, &client(), ":FOO?\r\n");
        assert_eq!(reply, "nan\r\n");
    }

    #[test]
    fn lock_request_blocks_other_clients() {
        let tree = Tree::new();
        let read_lock = Locker::new(Duration::from_secs(60));
        let alice = ClientId::new("127.0.0.1".parse().unwrap(), 1000);
        let bob = ClientId::new("127.0.0.1".parse().unwrap(), 2000);

        let reply = dispatch_line(&tree, &read_lock, None, &alice, ":SYST:LOCK:REQ?\r\n");
        assert_eq!(reply, "True\r\n");

        tree.add_command("SOUR:VOLT", read_const("1.0"), None, false, None)
            .unwrap();
        let reply = dispatch_line(&tree, &read_lock, None, &bob, "SOUR:VOLT?\r\n");
        assert_eq!(reply, "nan\r\n");

        let reply = dispatch_line(&tree, &read_lock, None, &alice, "SOUR:VOLT?\r\n");
        assert_eq!(reply, "1.0\r\n");

        let reply = dispatch_line(&tree, &read_lock, None, &alice, "SYST:LOCK?\r\n");
        assert_eq!(reply, format!("{}\r\n", alice));

        let reply = dispatch_line(&tree, &read_lock, None, &alice, "SYST:LOCK:OWNER?\r\n");
        assert_eq!(reply, format!("{}\r\n", alice));
    }

    #[test]
    fn lock_release_reports_success_and_owner_defaults_to_unlocked() {
        let tree = Tree::new();
        let read_lock = Locker::new(Duration::from_secs(60));
        let alice = ClientId::new("127.0.0.1".parse().unwrap(), 1000);
        let bob = ClientId::new("127.0.0.1".parse().unwrap(), 2000);

        assert_eq!(
            dispatch_line(&tree, &read_lock, None, &alice, "SYST:LOCK:OWNER?\r\n"),
            "unlocked\r\n"
        );

        dispatch_line(&tree, &read_lock, None, &alice, "SYST:LOCK:REQUEST?\r\n");

        // only the owner can release
        assert_eq!(
            dispatch_line(&tree, &read_lock, None, &bob, "SYST:LOCK:RELEASE?\r\n"),
            "False\r\n"
        );
        assert_eq!(
            dispatch_line(&tree, &read_lock, None, &alice, "SYST:LOCK:REL?\r\n"),
            "True\r\n"
        );
        assert_eq!(
            dispatch_line(&tree, &read_lock, None, &alice, "SYST:LOCK:OWNER?\r\n"),
            "unlocked\r\n"
        );
    }

    #[test]
    fn wlock_is_nan_when_write_locking_is_disabled() {
        let tree = Tree::new();
        let read_lock = Locker::new(Duration::from_secs(60));
        let alice = ClientId::new("127.0.0.1".parse().unwrap(), 1000);
        let reply = dispatch_line(&tree, &read_lock, None, &alice, "SYST:WLOCK:REQ?\r\n");
        assert_eq!(reply, "nan\r\n");
    }

    #[test]
    fn write_then_read_round_trips_through_shared_state() {
        use std::sync::Mutex;
        let stored = Arc::new(Mutex::new("1.0".to_string()));
        let tree = Tree::new();
        let read_cb = {
            let stored = stored.clone();
            Arc::new(move |_: &[u32], _: Option<&str>| Ok(stored.lock().unwrap().clone()))
        };
        let write_cb = {
            let stored = stored.clone();
            Arc::new(move |_: &[u32], value: &str| {
                *stored.lock().unwrap() = value.to_string();
                Ok(())
            })
        };
        tree.add_command("SOUR:VOLT", read_cb, Some(write_cb), false, None)
            .unwrap();
        let read_lock = Locker::new(Duration::from_secs(60));
        let reply = dispatch_line(
            &tree,
            &read_lock,
            None,
            &client(),
            "SOUR:VOLT 2.5;:VOLT?\r\n",
        );
        assert_eq!(reply, "2.5\r\n");
    }
}
