//! # Host Handles
//!
//! A host handle references a unique resource that lives outside the
//! scripting engine (a simulation cell, a database connection, ...). The
//! class-registration layer hands these to scripts; the parallel runtime only
//! needs to know that they must be *moved* between execution contexts,
//! never duplicated.
//!
//! Every handle carries an [`Ownership`] tag. Moving a handle out of a source
//! context flips the source copy to [`Ownership::Moved`] and produces an
//! [`Ownership::Owned`] handle for the destination, so whoever forwards the
//! source copy later knows it only holds a reference.

use std::fmt;
use std::sync::Arc;

use downcast_rs::{impl_downcast, DowncastSync};
use uuid::Uuid;

/// Resource exposed to scripts through a [`HostHandle`].
///
/// Implementors are usually registered by the host application; the runtime
/// never inspects them beyond downcasting.
pub trait HostObject: DowncastSync + fmt::Debug {
    /// Name of the host class, used in logs and `Display`
    fn class_name(&self) -> &str {
        "HostObject"
    }
}
impl_downcast!(sync HostObject);

/// Ownership tag of a handle as seen from the context holding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// This context owns the resource
    Owned,
    /// The resource was moved to another context; this is a reference only
    Moved,
}

/// Tagged reference to a host object.
#[derive(Clone)]
pub struct HostHandle {
    id: Uuid,
    object: Arc<dyn HostObject>,
    ownership: Ownership,
}

impl HostHandle {
    /// Wraps a new host object in an owned handle
    pub fn new<T: HostObject>(object: T) -> Self {
        Self::from_arc(Arc::new(object))
    }

    pub fn from_arc(object: Arc<dyn HostObject>) -> Self {
        Self {
            id: Uuid::new_v4(),
            object,
            ownership: Ownership::Owned,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    pub fn is_moved(&self) -> bool {
        self.ownership == Ownership::Moved
    }

    pub fn object(&self) -> &Arc<dyn HostObject> {
        &self.object
    }

    pub fn downcast_ref<T: HostObject>(&self) -> Option<&T> {
        self.object.downcast_ref::<T>()
    }

    pub fn downcast_arc<T: HostObject>(&self) -> Option<Arc<T>> {
        self.object.clone().downcast_arc::<T>().ok()
    }

    /// Moves the resource out of this handle.
    ///
    /// The returned handle keeps the same identity and carries this handle's
    /// previous ownership; this handle becomes [`Ownership::Moved`]. Taking
    /// from an already moved handle forwards a reference, not ownership.
    pub fn take(&mut self) -> HostHandle {
        let moved = HostHandle {
            id: self.id,
            object: Arc::clone(&self.object),
            ownership: self.ownership,
        };
        self.ownership = Ownership::Moved;
        moved
    }
}

impl PartialEq for HostHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Debug for HostHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostHandle")
            .field("id", &self.id)
            .field("class", &self.object.class_name())
            .field("ownership", &self.ownership)
            .finish()
    }
}

impl fmt::Display for HostHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.object.class_name(), self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Cell {
        x: i32,
    }

    impl HostObject for Cell {
        fn class_name(&self) -> &str {
            "Cell"
        }
    }

    #[test]
    fn test_take_marks_source_moved() {
        let mut source = HostHandle::new(Cell { x: 4 });
        let moved = source.take();

        assert!(source.is_moved());
        assert_eq!(moved.ownership(), Ownership::Owned);
        assert_eq!(moved.id(), source.id());
        assert_eq!(moved.downcast_ref::<Cell>().map(|c| c.x), Some(4));
    }

    #[test]
    fn test_take_from_moved_forwards_reference() {
        let mut source = HostHandle::new(Cell { x: 1 });
        let _owner = source.take();
        let forwarded = source.take();
        assert!(forwarded.is_moved());
    }
}
