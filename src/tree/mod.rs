//! The command tree: a single readers-writer-locked namespace of
//! [`Component`]s, [`Attribute`]s, and flat special commands.
//!
//! The tree is guarded by one [`parking_lot::RwLock`], taken exclusively
//! only while registering a node and shared for the whole of a
//! statement's dispatch (lookup *and* the callback invocation it ends
//! in) — contention is negligible since registration happens at startup
//! and dispatch never blocks on I/O.

pub mod callback;
pub mod node;

use std::collections::HashMap;

use parking_lot::RwLock;

pub use callback::{ReadCallback, ReadCb, WriteCallback, WriteCb};
pub use node::{Attribute, ChannelSpec, Component, Node, SpecialCommand};

use crate::error::{Error, Result};

struct Inner {
    root: Component,
    specials: HashMap<String, SpecialCommand>,
}

/// The command tree, safe to share across connection workers behind an `Arc`.
pub struct Tree {
    inner: RwLock<Inner>,
}

impl Tree {
    pub fn new() -> Tree {
        Tree {
            inner: RwLock::new(Inner {
                root: Component::root(),
                specials: HashMap::new(),
            }),
        }
    }

    /// Registers a grouping component under `parent` (a `:`-separated
    /// path, or `""` for the root). Re-registering the same plain
    /// component under the same parent is idempotent.
    pub fn add_component(&self, name: &str, parent: &str) -> Result<()> {
        let key = canonicalize(name)?;
        let mut inner = self.inner.write();
        let target = resolve_mut(&mut inner.root, parent)?;
        insert_component(target, &key, None)
    }

    /// Registers a channel-addressed component: `count` children are
    /// implicitly addressable as `NAME<first>`..`NAME<first + count - 1>`.
    pub fn add_channel(&self, name: &str, count: u32, parent: &str, first: u32) -> Result<()> {
        if count == 0 {
            return Err(Error::Config(format!("{}: channel count must be nonzero", name)));
        }
        let key = canonicalize(name)?;
        let mut inner = self.inner.write();
        let target = resolve_mut(&mut inner.root, parent)?;
        insert_component(target, &key, Some(ChannelSpec { count, first }))
    }

    /// Registers a leaf attribute under `parent`.
    #[allow(clippy::too_many_arguments)]
    pub fn add_attribute(
        &self,
        name: &str,
        parent: &str,
        read_cb: ReadCb,
        write_cb: Option<WriteCb>,
        default: bool,
        allowed_argins: Option<Vec<String>>,
    ) -> Result<()> {
        let key = canonicalize(name)?;
        let mut inner = self.inner.write();
        let target = resolve_mut(&mut inner.root, parent)?;
        insert_attribute(target, &key, read_cb, write_cb, default, allowed_argins)
    }

    /// Registers an attribute at a full `:`-separated path, creating any
    /// missing intermediate components. A leading `*` is forwarded whole
    /// to [`Tree::add_special_command`], with `default` and
    /// `allowed_argins` ignored.
    pub fn add_command(
        &self,
        full_name: &str,
        read_cb: ReadCb,
        write_cb: Option<WriteCb>,
        default: bool,
        allowed_argins: Option<Vec<String>>,
    ) -> Result<()> {
        if let Some(special) = full_name.strip_prefix('*') {
            let _ = special;
            return self.add_special_command(full_name, read_cb, write_cb);
        }

        let parts: Vec<&str> = full_name.split(':').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(Error::Config(format!("{}: empty keyword segment", full_name)));
        }
        let (leaf, path) = parts.split_last().expect("split(':') never returns empty");

        let mut inner = self.inner.write();
        let mut cursor = &mut inner.root;
        for segment in path {
            let key = canonicalize(segment)?;
            insert_component(cursor, &key, None)?;
            cursor = cursor
                .children
                .get_mut(&key)
                .and_then(Node::as_component_mut)
                .expect("just inserted");
        }
        let key = canonicalize(leaf)?;
        insert_attribute(cursor, &key, read_cb, write_cb, default, allowed_argins)
    }

    /// Registers a `*`-prefixed special command. A trailing `?` in `name`
    /// marks it read-only and forbids a `write_cb`.
    pub fn add_special_command(
        &self,
        name: &str,
        read_cb: ReadCb,
        write_cb: Option<WriteCb>,
    ) -> Result<()> {
        let stripped = name.strip_prefix('*').unwrap_or(name);
        let (bare, read_only) = match stripped.strip_suffix('?') {
            Some(bare) => (bare, true),
            None => (stripped, false),
        };
        if bare.is_empty() || !bare.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(Error::Config(format!("{}: special command names must be alphabetic", name)));
        }
        if read_only && write_cb.is_some() {
            return Err(Error::Config(format!(
                "{}: a trailing '?' forbids a write callback",
                name
            )));
        }
        let key = bare.to_uppercase();

        let mut inner = self.inner.write();
        if let Some(existing) = inner.specials.get(&key) {
            if !ptr_eq_special(existing, &read_cb, &write_cb) {
                return Err(Error::Config(format!("{}: conflicting re-registration", name)));
            }
            return Ok(());
        }
        inner.specials.insert(key, SpecialCommand { read_cb, write_cb });
        Ok(())
    }

    /// Runs `f` with a shared lock on the tree, for the duration of one
    /// statement's dispatch.
    pub fn with_read<T>(&self, f: impl FnOnce(&Component, &HashMap<String, SpecialCommand>) -> T) -> T {
        let inner = self.inner.read();
        f(&inner.root, &inner.specials)
    }
}

impl Default for Tree {
    fn default() -> Self {
        Tree::new()
    }
}

fn canonicalize(name: &str) -> Result<String> {
    if name.is_empty() {
        return Err(Error::Config("empty keyword name".to_string()));
    }
    Ok(name.to_uppercase())
}

fn resolve_mut<'a>(root: &'a mut Component, parent: &str) -> Result<&'a mut Component> {
    if parent.is_empty() {
        return Ok(root);
    }
    let mut cursor = root;
    for segment in parent.split(':') {
        let key = canonicalize(segment)?;
        cursor = cursor
            .children
            .get_mut(&key)
            .ok_or_else(|| Error::Config(format!("{}: no such parent", parent)))?
            .as_component_mut()
            .ok_or_else(|| Error::Config(format!("{}: parent is not a component", parent)))?;
    }
    Ok(cursor)
}

fn insert_component(parent: &mut Component, key: &str, channel: Option<ChannelSpec>) -> Result<()> {
    match parent.children.get(key) {
        None => {
            parent.children.insert(
                key.to_string(),
                Node::Component(Component {
                    children: HashMap::new(),
                    default_child: None,
                    channel,
                }),
            );
            Ok(())
        }
        Some(Node::Component(existing)) if existing.channel == channel => Ok(()),
        _ => Err(Error::Config(format!(
            "{}: already registered with different parameters",
            key
        ))),
    }
}

#[allow(clippy::too_many_arguments)]
fn insert_attribute(
    parent: &mut Component,
    key: &str,
    read_cb: ReadCb,
    write_cb: Option<WriteCb>,
    default: bool,
    allowed_argins: Option<Vec<String>>,
) -> Result<()> {
    if default {
        if let Some(existing) = &parent.default_child {
            if existing != key {
                return Err(Error::Config(format!(
                    "{}: {} is already the default child",
                    key, existing
                )));
            }
        }
    }

    match parent.children.get(key) {
        None => {
            parent.children.insert(
                key.to_string(),
                Node::Attribute(Attribute {
                    read_cb,
                    write_cb,
                    allowed_argins,
                }),
            );
        }
        Some(Node::Attribute(existing)) => {
            if !ptr_eq_attribute(existing, &read_cb, &write_cb, &allowed_argins) {
                return Err(Error::Config(format!(
                    "{}: already registered with different parameters",
                    key
                )));
            }
        }
        Some(Node::Component(_)) => {
            return Err(Error::Config(format!("{}: already registered as a component", key)));
        }
    }

    if default {
        parent.default_child = Some(key.to_string());
    }
    Ok(())
}

/// Full closure equality is not checkable in Rust; re-registration is
/// treated as idempotent when the same `Arc` callbacks and the same
/// `allowed_argins` are passed again.
fn ptr_eq_attribute(
    existing: &Attribute,
    read_cb: &ReadCb,
    write_cb: &Option<WriteCb>,
    allowed_argins: &Option<Vec<String>>,
) -> bool {
    use std::sync::Arc;
    Arc::ptr_eq(&existing.read_cb, read_cb)
        && match (&existing.write_cb, write_cb) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
        && existing.allowed_argins == *allowed_argins
}

fn ptr_eq_special(existing: &SpecialCommand, read_cb: &ReadCb, write_cb: &Option<WriteCb>) -> bool {
    use std::sync::Arc;
    Arc::ptr_eq(&existing.read_cb, read_cb)
        && match (&existing.write_cb, write_cb) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::Error;

    fn ok_read() -> ReadCb {
        std::sync::Arc::new(|_: &[u32], _: Option<&str>| Ok("1".to_string()))
    }

    #[test]
    fn registers_nested_command() {
        let tree = Tree::new();
        tree.add_command("SOUR:VOLT", ok_read(), None, false, None).unwrap();
        tree.with_read(|root, _| {
            let sour = root.children.get("SOUR").unwrap().as_component().unwrap();
            assert!(sour.children.contains_key("VOLT"));
        });
    }

    #[test]
    fn rejects_empty_keyword_segment() {
        let tree = Tree::new();
        let err = tree.add_command("SOUR::VOLT", ok_read(), None, false, None).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn duplicate_default_child_is_rejected() {
        let tree = Tree::new();
        tree.add_command("SOUR:VOLT", ok_read(), None, true, None).unwrap();
        let err = tree
            .add_command("SOUR:CURR", ok_read(), None, true, None)
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn idempotent_component_reregistration() {
        let tree = Tree::new();
        tree.add_component("SOUR", "").unwrap();
        tree.add_component("SOUR", "").unwrap();
    }

    #[test]
    fn special_command_trailing_query_forbids_write() {
        let tree = Tree::new();
        let err = tree
            .add_special_command("IDN?", ok_read(), Some(std::sync::Arc::new(|_: &[u32], _: &str| Ok(()))))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
