//! # Cross-Context Value Copier
//!
//! Moves values between independent execution contexts without letting the
//! two sides share mutable state.
//!
//! - Primitives are copied by value.
//! - Tables are rebuilt entry by entry; keys and values are transferred
//!   recursively.
//! - Host handles are moved: the destination receives the handle with the
//!   source's ownership, and the source copy is tagged
//!   [`Ownership::Moved`](taskbag_api::Ownership::Moved) so anyone
//!   forwarding it later knows it only holds a reference.
//!
//! Transfers out of a context write the tagged value back into the source
//! global, but only when the value actually contained a handle; globals made
//! of plain data are never rewritten.

use taskbag_api::{ExecutionContext, Table, Value, ValueKind};

/// Transfers `value` into a new value for another context.
///
/// Handles inside `value` are marked as moved.
pub fn transfer(value: &mut Value) -> Value {
    match (value.kind(), value) {
        (ValueKind::Structured, Value::Table(table)) => Value::Table(transfer_table(table)),
        (ValueKind::HostHandle, Value::Handle(handle)) => Value::Handle(handle.take()),
        (_, primitive) => primitive.clone(),
    }
}

fn transfer_table(table: &mut Table) -> Table {
    let mut copy = Table::new();
    for (key, value) in table.iter_mut() {
        copy.push_unchecked(transfer(key), transfer(value));
    }
    copy
}

/// Whether any handle is reachable from `value`
pub fn contains_handles(value: &Value) -> bool {
    match value.kind() {
        ValueKind::HostHandle => true,
        ValueKind::Structured => value
            .as_table()
            .is_some_and(|table| table.iter().any(|(k, v)| contains_handles(k) || contains_handles(v))),
        ValueKind::Primitive => false,
    }
}

/// Takes the global `name` out of `source` for use elsewhere.
///
/// Missing globals transfer as `Nil`.
pub fn transfer_out(source: &dyn ExecutionContext, name: &str) -> Value {
    let Some(mut value) = source.global(name) else {
        return Value::Nil;
    };
    let copy = transfer(&mut value);
    if contains_handles(&value) {
        source.set_global(name, value);
    }
    copy
}

/// Copies the global `name` of `source` into `destination` under `as_name`.
pub fn transfer_global(
    source: &dyn ExecutionContext,
    name: &str,
    destination: &dyn ExecutionContext,
    as_name: &str,
) {
    let value = transfer_out(source, name);
    destination.set_global(as_name, value);
}

/// Stores an owned value (for instance a snapshot entry) into `destination`.
pub fn transfer_in(destination: &dyn ExecutionContext, name: &str, mut value: Value) {
    let copy = transfer(&mut value);
    destination.set_global(name, copy);
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskbag_api::{HostHandle, HostObject, Ownership};

    #[derive(Debug)]
    struct Agent;

    impl HostObject for Agent {}

    #[test]
    fn test_primitives_are_copied() {
        for mut value in [
            Value::Nil,
            Value::Boolean(true),
            Value::Number(4.25),
            Value::from("text"),
            Value::LightRef(0xdead),
        ] {
            let original = value.clone();
            assert_eq!(transfer(&mut value), original);
            assert_eq!(value, original);
        }
    }

    #[test]
    fn test_kind_decides_copy_or_move() {
        let mut handle = Value::from(HostHandle::new(Agent));
        assert_eq!(handle.kind(), ValueKind::HostHandle);
        assert!(contains_handles(&handle));
        let moved = transfer(&mut handle);
        assert_eq!(handle.as_handle().map(|h| h.ownership()), Some(Ownership::Moved));
        assert_eq!(moved.as_handle().map(|h| h.ownership()), Some(Ownership::Owned));

        let mut plain = Value::Table(Table::from_sequence([1, 2]));
        assert_eq!(plain.kind(), ValueKind::Structured);
        assert!(!contains_handles(&plain));
        assert_eq!(transfer(&mut plain), Value::Table(Table::from_sequence([1, 2])));
    }

    #[test]
    fn test_tables_are_rebuilt_recursively() {
        let mut inner = Table::new();
        inner.set("depth", 2);
        let mut outer = Table::new();
        outer.set("name", "grid");
        outer.set("inner", inner);

        let mut value = Value::Table(outer);
        let copy = transfer(&mut value);
        assert_eq!(copy, value);
        assert!(!contains_handles(&copy));
    }

    #[test]
    fn test_handles_are_moved_and_source_tagged() {
        let mut table = Table::new();
        table.set("agent", HostHandle::new(Agent));
        let mut value = Value::Table(table);

        let copy = transfer(&mut value);

        let source_handle = value.as_table().and_then(|t| t.field("agent")).and_then(Value::as_handle);
        let moved_handle = copy.as_table().and_then(|t| t.field("agent")).and_then(Value::as_handle);
        assert_eq!(source_handle.map(|h| h.ownership()), Some(Ownership::Moved));
        assert_eq!(moved_handle.map(|h| h.ownership()), Some(Ownership::Owned));
        assert_eq!(source_handle.map(|h| h.id()), moved_handle.map(|h| h.id()));
    }
}
