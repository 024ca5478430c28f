//! Post-load fixups applied to every successfully loaded object
//!
//! Hosts use these to patch objects that come out of a bundle in a state the
//! running environment cannot use directly (for example re-binding shaders to
//! the ones compiled for the current platform). A fixup may return a
//! replacement object.

use crate::bundle::key::IdentityKey;
use crate::bundle::source::ObjectHandle;

/// Hook run on each loaded object before it is cached
pub trait ObjectFixup {
    fn apply(&self, bundle: &str, key: &IdentityKey, object: ObjectHandle) -> ObjectHandle;
}

impl<F> ObjectFixup for F
where
    F: Fn(&str, &IdentityKey, ObjectHandle) -> ObjectHandle,
{
    fn apply(&self, bundle: &str, key: &IdentityKey, object: ObjectHandle) -> ObjectHandle {
        self(bundle, key, object)
    }
}

/// Ordered list of fixups
#[derive(Default)]
pub struct FixupPass {
    fixups: Vec<Box<dyn ObjectFixup>>,
}

impl FixupPass {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, fixup: impl ObjectFixup + 'static) {
        self.fixups.push(Box::new(fixup));
    }

    /// Run every fixup in registration order
    pub fn run(&self, bundle: &str, key: &IdentityKey, object: ObjectHandle) -> ObjectHandle {
        self.fixups
            .iter()
            .fold(object, |object, fixup| fixup.apply(bundle, key, object))
    }

    pub fn len(&self) -> usize {
        self.fixups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixups.is_empty()
    }
}
