use crate::debugger::identifier::Identifier;
use crate::debugger::utils::lock;
use crate::debugger::variable::Object;
use crate::debugger::Error;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

/// Owner of the values handed out to the client as variable references.
///
/// Every turn gets its own arena that dies with the turn, console output uses a shared
/// bounded one.
#[derive(Default)]
pub struct Arena {
    values: Mutex<Identifier<dyn Object>>,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bounded(capacity: NonZeroUsize) -> Self {
        Self {
            values: Mutex::new(Identifier::with_capacity(capacity)),
        }
    }

    pub fn add(&self, object: Arc<dyn Object>) -> u64 {
        lock(&self.values).add(object)
    }

    pub fn get(&self, code: u64) -> Result<Arc<dyn Object>, Error> {
        lock(&self.values)
            .get(code)
            .ok_or(Error::ValueNotFound(code))
    }

    pub fn clear(&self) {
        lock(&self.values).clear()
    }

    pub fn len(&self) -> usize {
        lock(&self.values).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
