//! Item to source range registry and the breakpoint table bound against it.

use crate::dap::protocol::{Breakpoint, FunctionBreakpoint, Source, SourceBreakpoint};
use crate::debugger::breakpoint::{best_function_match, best_source_match, Request, Row, SourceRange};
use crate::debugger::code::{item_key, CodeModel, ItemRef};
use crate::debugger::utils::lock;
use indexmap::IndexMap;
use std::sync::{Arc, Mutex};

/// Registry of item declarations, filled by the engine while it loads its resources.
pub trait SourceMap: Send + Sync {
    fn add(&self, item: ItemRef, range: SourceRange);

    fn remove(&self, item: &ItemRef);

    fn try_get(&self, item: &ItemRef) -> Option<SourceRange>;
}

/// Breakpoint table as seen by the protocol dispatcher and the step hook.
pub trait Breakpoints: Send + Sync {
    fn is_breakpoint(&self, item: &ItemRef) -> bool;

    fn item_for(&self, breakpoint: &Breakpoint) -> Option<ItemRef>;

    fn set_breakpoints(&self, source: &Source, requested: &[SourceBreakpoint]) -> Vec<Breakpoint>;

    fn set_function_breakpoints(&self, requested: &[FunctionBreakpoint]) -> Vec<Breakpoint>;

    /// Rebind if the mapping changed, return breakpoints whose binding changed.
    fn apply_updates(&self) -> Vec<Breakpoint>;

    fn clear(&self);
}

#[derive(Default)]
struct State {
    items: IndexMap<usize, (ItemRef, SourceRange)>,
    rows: IndexMap<u64, Row>,
    next_id: u64,
    dirty: bool,
    pending: Vec<Breakpoint>,
}

/// Default [`SourceMap`] and [`Breakpoints`] implementation.
pub struct DebuggerSourceMap {
    code_model: Arc<dyn CodeModel>,
    state: Mutex<State>,
}

impl DebuggerSourceMap {
    pub fn new(code_model: Arc<dyn CodeModel>) -> Self {
        Self {
            code_model,
            state: Mutex::new(State {
                next_id: 1,
                ..Default::default()
            }),
        }
    }

    fn add_rows(&self, state: &mut State, requests: impl IntoIterator<Item = Request>) -> Vec<u64> {
        let mut ids = vec![];
        for request in requests {
            let id = state.next_id;
            state.next_id += 1;
            state.rows.insert(id, Row::new(id, request));
            ids.push(id);
        }
        state.dirty = true;
        ids
    }

    fn update(&self, state: &mut State) -> Vec<Breakpoint> {
        if !state.dirty {
            return vec![];
        }

        let State { items, rows, .. } = &mut *state;
        let mut changed = vec![];
        for row in rows.values_mut() {
            let binding = match &row.request {
                Request::Source { source, breakpoint } => source.path.as_deref().and_then(|path| {
                    best_source_match(items.values().map(|(i, r)| (i, r)), path, breakpoint.line)
                }),
                Request::Function(function) => best_function_match(
                    items
                        .values()
                        .map(|(i, r)| (i, r, self.code_model.name_for(i))),
                    &function.name,
                ),
            };

            if row.rebind(binding.map(|(item, range)| (item.clone(), range))) {
                changed.push(row.breakpoint.clone());
            }
        }

        state.dirty = false;
        changed
    }

    /// Rebind and answer with the breakpoints of `ids`, other changes are kept for the next
    /// [`Breakpoints::apply_updates`].
    fn settle(&self, state: &mut State, ids: &[u64]) -> Vec<Breakpoint> {
        let changed = self.update(state);
        state
            .pending
            .extend(changed.into_iter().filter(|bp| !ids.contains(&bp.id)));
        ids.iter()
            .filter_map(|id| state.rows.get(id))
            .map(|row| row.breakpoint.clone())
            .collect()
    }

    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        lock(&self.state)
            .rows
            .values()
            .map(|row| row.breakpoint.clone())
            .collect()
    }
}

impl SourceMap for DebuggerSourceMap {
    fn add(&self, item: ItemRef, range: SourceRange) {
        let mut state = lock(&self.state);
        state.items.insert(item_key(&item), (item, range));
        state.dirty = true;
    }

    fn remove(&self, item: &ItemRef) {
        let mut state = lock(&self.state);
        if state.items.shift_remove(&item_key(item)).is_some() {
            state.dirty = true;
        }
    }

    fn try_get(&self, item: &ItemRef) -> Option<SourceRange> {
        lock(&self.state)
            .items
            .get(&item_key(item))
            .map(|(_, range)| range.clone())
    }
}

impl Breakpoints for DebuggerSourceMap {
    fn is_breakpoint(&self, item: &ItemRef) -> bool {
        let key = item_key(item);
        lock(&self.state).rows.values().any(|row| {
            row.breakpoint.verified && row.item.as_ref().map(item_key) == Some(key)
        })
    }

    fn item_for(&self, breakpoint: &Breakpoint) -> Option<ItemRef> {
        lock(&self.state)
            .rows
            .get(&breakpoint.id)
            .and_then(|row| row.item.clone())
    }

    fn set_breakpoints(&self, source: &Source, requested: &[SourceBreakpoint]) -> Vec<Breakpoint> {
        let mut state = lock(&self.state);
        state
            .rows
            .retain(|_, row| row.is_function() || row.path() != source.path.as_deref());

        let requests = requested.iter().map(|breakpoint| Request::Source {
            source: source.clone(),
            breakpoint: breakpoint.clone(),
        });
        let ids = self.add_rows(&mut state, requests);
        self.settle(&mut state, &ids)
    }

    fn set_function_breakpoints(&self, requested: &[FunctionBreakpoint]) -> Vec<Breakpoint> {
        let mut state = lock(&self.state);
        state.rows.retain(|_, row| !row.is_function());

        let requests = requested.iter().cloned().map(Request::Function);
        let ids = self.add_rows(&mut state, requests);
        self.settle(&mut state, &ids)
    }

    fn apply_updates(&self) -> Vec<Breakpoint> {
        let mut state = lock(&self.state);
        let mut changed = std::mem::take(&mut state.pending);
        changed.extend(self.update(&mut state));
        changed
    }

    fn clear(&self) {
        let mut state = lock(&self.state);
        state.rows.clear();
        state.pending.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::debugger::breakpoint::SourcePoint;
    use crate::debugger::code::{DefaultCodeModel, Item};

    struct Named(&'static str);

    impl Item for Named {
        fn name(&self) -> String {
            self.0.to_string()
        }
    }

    fn range(path: &str, start: u32, end: u32) -> SourceRange {
        SourceRange::new(path, SourcePoint::new(start, 1), SourcePoint::new(end, 30))
    }

    fn at(line: u32) -> SourceBreakpoint {
        SourceBreakpoint { line, column: None }
    }

    #[test]
    fn test_bind_and_unbind() {
        let map = DebuggerSourceMap::new(Arc::new(DefaultCodeModel));
        let item: ItemRef = Arc::new(Named("SendActivity"));
        map.add(item.clone(), range("/bot/main.dialog", 8, 12));

        let source = Source::from_path("/bot/main.dialog");
        let set = map.set_breakpoints(&source, &[at(10)]);
        assert_eq!(set.len(), 1);
        assert!(set[0].verified);
        assert_eq!(set[0].line, Some(8));
        assert_eq!(set[0].end_line, Some(12));
        assert!(map.is_breakpoint(&item));
        assert_eq!(item_key(&map.item_for(&set[0]).unwrap()), item_key(&item));
        assert!(map.apply_updates().is_empty());

        map.remove(&item);
        let changed = map.apply_updates();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].id, set[0].id);
        assert!(!changed[0].verified);
        assert!(!map.is_breakpoint(&item));
        assert!(map.try_get(&item).is_none());
        // nothing dirty anymore
        assert!(map.apply_updates().is_empty());
    }

    #[test]
    fn test_set_replaces_same_path_only() {
        let map = DebuggerSourceMap::new(Arc::new(DefaultCodeModel));
        let a = Source::from_path("/bot/a.dialog");
        let b = Source::from_path("/bot/b.dialog");

        let first = map.set_breakpoints(&a, &[at(1), at(2)]);
        map.set_breakpoints(&b, &[at(3)]);
        let second = map.set_breakpoints(&a, &[at(5)]);

        let all = map.breakpoints();
        assert_eq!(all.len(), 2);
        let lines: Vec<_> = all.iter().map(|bp| bp.line).collect();
        assert_eq!(lines, vec![Some(3), Some(5)]);

        // ids are never reused
        assert_eq!(first.iter().map(|bp| bp.id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(second[0].id, 4);
        assert!(!second[0].verified);
    }

    #[test]
    fn test_late_mapping_verifies_breakpoint() {
        let map = DebuggerSourceMap::new(Arc::new(DefaultCodeModel));
        let set = map.set_breakpoints(&Source::from_path("/bot/main.dialog"), &[at(10)]);
        assert!(!set[0].verified);

        let item: ItemRef = Arc::new(Named("SendActivity"));
        map.add(item.clone(), range("/bot/main.dialog", 9, 9));
        let changed = map.apply_updates();
        assert_eq!(changed.len(), 1);
        assert!(changed[0].verified);
        assert_eq!(changed[0].line, Some(9));
        assert!(map.is_breakpoint(&item));
    }

    #[test]
    fn test_function_breakpoints() {
        let map = DebuggerSourceMap::new(Arc::new(DefaultCodeModel));
        let root: ItemRef = Arc::new(Named("RootDialog"));
        let book: ItemRef = Arc::new(Named("BookFlightDialog"));
        map.add(root.clone(), range("/bot/root.dialog", 1, 20));
        map.add(book.clone(), range("/bot/book.dialog", 1, 40));

        let set = map.set_function_breakpoints(&[
            FunctionBreakpoint {
                name: "dialog".to_string(),
            },
            FunctionBreakpoint {
                name: "missing".to_string(),
            },
        ]);
        assert!(set[0].verified);
        assert!(!set[1].verified);
        assert!(map.is_breakpoint(&root));
        assert!(!map.is_breakpoint(&book));

        // source breakpoints survive a function breakpoint reset
        map.set_breakpoints(&Source::from_path("/bot/book.dialog"), &[at(2)]);
        map.set_function_breakpoints(&[]);
        assert!(!map.is_breakpoint(&root));
        assert!(map.is_breakpoint(&book));

        map.clear();
        assert!(map.breakpoints().is_empty());
        assert!(map.try_get(&book).is_some());
    }

    #[test]
    fn test_other_changes_are_kept_for_updates() {
        let map = DebuggerSourceMap::new(Arc::new(DefaultCodeModel));
        let item: ItemRef = Arc::new(Named("SendActivity"));
        let a = map.set_breakpoints(&Source::from_path("/bot/a.dialog"), &[at(3)]);

        map.add(item, range("/bot/a.dialog", 3, 3));
        map.set_breakpoints(&Source::from_path("/bot/b.dialog"), &[at(1)]);

        let changed = map.apply_updates();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].id, a[0].id);
        assert!(changed[0].verified);
    }
}
