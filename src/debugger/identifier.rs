//! Small integer codes for shared objects and their packing into protocol references.

use crate::debugger::Error;
use itertools::Itertools;
use lru::LruCache;
use std::collections::{BTreeSet, HashMap};
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Largest integer a JSON client can represent exactly.
pub const MAX_REFERENCE: u64 = (1 << 53) - 1;

/// Bidirectional map between `Arc` values (by pointer identity) and codes.
///
/// Codes start at 1, zero is reserved as "no reference". A removed value releases its code
/// and the lowest released code is handed out first. With a capacity the least recently used
/// value is evicted once the table is full, codes of evicted values are retired.
pub struct Identifier<T: ?Sized> {
    values: LruCache<u64, Arc<T>>,
    codes: HashMap<usize, u64>,
    released: BTreeSet<u64>,
    next: u64,
}

fn address<T: ?Sized>(value: &Arc<T>) -> usize {
    Arc::as_ptr(value) as *const () as usize
}

impl<T: ?Sized> Default for Identifier<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> Identifier<T> {
    pub fn new() -> Self {
        Self {
            values: LruCache::unbounded(),
            codes: HashMap::new(),
            released: BTreeSet::new(),
            next: 1,
        }
    }

    /// Create table holding at most `capacity` values.
    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            values: LruCache::new(capacity),
            ..Self::new()
        }
    }

    /// Return code of `value`, registering it if needed.
    pub fn add(&mut self, value: Arc<T>) -> u64 {
        let addr = address(&value);
        if let Some(&code) = self.codes.get(&addr) {
            self.values.promote(&code);
            return code;
        }

        let code = match self.released.pop_first() {
            Some(code) => code,
            None => {
                let code = self.next;
                self.next += 1;
                code
            }
        };

        self.codes.insert(addr, code);
        if let Some((evicted_code, evicted)) = self.values.push(code, value) {
            if evicted_code != code {
                self.codes.remove(&address(&evicted));
            }
        }
        code
    }

    /// Unregister `value`, its code becomes available again.
    pub fn remove(&mut self, value: &Arc<T>) -> Option<u64> {
        let code = self.codes.remove(&address(value))?;
        self.values.pop(&code);
        self.released.insert(code);
        Some(code)
    }

    pub fn get(&mut self, code: u64) -> Option<Arc<T>> {
        self.values.get(&code).cloned()
    }

    pub fn code_of(&mut self, value: &Arc<T>) -> Option<u64> {
        let code = *self.codes.get(&address(value))?;
        self.values.promote(&code);
        Some(code)
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.codes.clear();
        self.released.clear();
        self.next = 1;
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over registered values in code order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &Arc<T>)> {
        self.values
            .iter()
            .map(|(code, value)| (*code, value))
            .sorted_by_key(|(code, _)| *code)
    }
}

/// Pack two codes into one protocol reference.
///
/// Each code is written as 7-bit groups, least significant first, a set high bit marks
/// that the group continues. Groups of `a` are followed by groups of `b`.
pub fn encode(a: u64, b: u64) -> Result<u64, Error> {
    let mut reference = 0u64;
    let mut shift = 0u32;
    for mut code in [a, b] {
        loop {
            if shift >= u64::BITS {
                return Err(Error::CodeOverflow(a, b));
            }
            let mut group = code & 0x7F;
            code >>= 7;
            if code != 0 {
                group |= 0x80;
            }
            reference |= group << shift;
            shift += 8;
            if code == 0 {
                break;
            }
        }
    }

    if reference > MAX_REFERENCE {
        return Err(Error::CodeOverflow(a, b));
    }
    Ok(reference)
}

/// Inverse of [`encode`].
pub fn decode(reference: u64) -> Result<(u64, u64), Error> {
    let mut rest = reference;
    let a = take_code(&mut rest).ok_or(Error::InvalidReference(reference))?;
    let b = take_code(&mut rest).ok_or(Error::InvalidReference(reference))?;
    if rest != 0 {
        return Err(Error::InvalidReference(reference));
    }
    Ok((a, b))
}

fn take_code(rest: &mut u64) -> Option<u64> {
    let mut code = 0u64;
    let mut shift = 0u32;
    loop {
        if shift >= u64::BITS {
            return None;
        }
        let group = *rest & 0xFF;
        *rest >>= 8;
        code |= (group & 0x7F) << shift;
        shift += 7;
        if group & 0x80 == 0 {
            return Some(code);
        }
    }
}
