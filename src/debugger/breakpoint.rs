//! Breakpoint requests and their binding rules.

use crate::dap::protocol::{Breakpoint, FunctionBreakpoint, Source, SourceBreakpoint};
use crate::debugger::code::{item_key, ItemRef};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourcePoint {
    pub line: u32,
    pub column: u32,
}

impl SourcePoint {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// Where an item is declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRange {
    pub path: String,
    pub start: SourcePoint,
    pub end: SourcePoint,
    /// Designer id of the declaration, when the source was produced by a designer tool.
    pub designer: Option<String>,
}

impl SourceRange {
    pub fn new(path: &str, start: SourcePoint, end: SourcePoint) -> Self {
        Self {
            path: path.to_string(),
            start,
            end,
            designer: None,
        }
    }

    pub fn with_designer(mut self, designer: &str) -> Self {
        self.designer = Some(designer.to_string());
        self
    }

    pub fn source(&self) -> Source {
        Source::from_path(&self.path)
    }
}

#[derive(Debug, Clone)]
pub enum Request {
    Source {
        source: Source,
        breakpoint: SourceBreakpoint,
    },
    Function(FunctionBreakpoint),
}

/// A registered breakpoint and the item it is currently bound to.
pub struct Row {
    pub request: Request,
    pub breakpoint: Breakpoint,
    pub item: Option<ItemRef>,
}

impl Row {
    pub fn new(id: u64, request: Request) -> Self {
        let mut breakpoint = Breakpoint {
            id,
            ..Default::default()
        };
        if let Request::Source { source, breakpoint: requested } = &request {
            breakpoint.source = Some(source.clone());
            breakpoint.line = Some(requested.line);
            breakpoint.column = requested.column;
        }
        Self {
            request,
            breakpoint,
            item: None,
        }
    }

    pub fn path(&self) -> Option<&str> {
        match &self.request {
            Request::Source { source, .. } => source.path.as_deref(),
            Request::Function(_) => None,
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self.request, Request::Function(_))
    }

    /// Bind the row to `binding`, return `true` if item, verification or line changed.
    pub fn rebind(&mut self, binding: Option<(ItemRef, &SourceRange)>) -> bool {
        let before = (
            self.item.as_ref().map(item_key),
            self.breakpoint.verified,
            self.breakpoint.line,
        );

        match binding {
            Some((item, range)) => {
                self.item = Some(item);
                self.breakpoint.verified = true;
                self.breakpoint.message = None;
                self.breakpoint.source = Some(range.source());
                self.breakpoint.line = Some(range.start.line);
                self.breakpoint.column = Some(range.start.column);
                self.breakpoint.end_line = Some(range.end.line);
                self.breakpoint.end_column = Some(range.end.column);
            }
            None => {
                self.item = None;
                self.breakpoint.verified = false;
                self.breakpoint.message = Some("no matching item".to_string());
                self.breakpoint.end_line = None;
                self.breakpoint.end_column = None;
                match &self.request {
                    Request::Source { source, breakpoint } => {
                        self.breakpoint.source = Some(source.clone());
                        self.breakpoint.line = Some(breakpoint.line);
                        self.breakpoint.column = breakpoint.column;
                    }
                    Request::Function(_) => {
                        self.breakpoint.source = None;
                        self.breakpoint.line = None;
                        self.breakpoint.column = None;
                    }
                }
            }
        }

        let after = (
            self.item.as_ref().map(item_key),
            self.breakpoint.verified,
            self.breakpoint.line,
        );
        before != after
    }
}

const RESOURCE_EXTENSIONS: [&str; 4] = ["dialog", "lg", "lu", "qna"];

fn is_resource(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            RESOURCE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn same(lhs: &str, rhs: &str) -> bool {
    if cfg!(any(windows, target_os = "macos")) {
        lhs.eq_ignore_ascii_case(rhs) || lhs.to_lowercase() == rhs.to_lowercase()
    } else {
        lhs == rhs
    }
}

/// Whether a requested breakpoint path designates the recorded source path.
///
/// Declarative resources are matched by file name only, they are often loaded from a
/// different location than the one the client edits.
pub fn path_matches(requested: &str, recorded: &str) -> bool {
    if is_resource(requested) || is_resource(recorded) {
        same(file_name(requested), file_name(recorded))
    } else {
        same(requested, recorded)
    }
}

/// Item whose range starts closest to `line` among those declared in `path`,
/// the first recorded item wins a tie.
pub fn best_source_match<'a>(
    candidates: impl IntoIterator<Item = (&'a ItemRef, &'a SourceRange)>,
    path: &str,
    line: u32,
) -> Option<(&'a ItemRef, &'a SourceRange)> {
    let mut best: Option<(u32, (&ItemRef, &SourceRange))> = None;
    for (item, range) in candidates {
        if !path_matches(path, &range.path) {
            continue;
        }
        let distance = line.abs_diff(range.start.line);
        match best {
            Some((best_distance, _)) if best_distance <= distance => {}
            _ => best = Some((distance, (item, range))),
        }
    }
    best.map(|(_, found)| found)
}

/// Item with the shortest display name containing `name`, ignoring case.
pub fn best_function_match<'a>(
    candidates: impl IntoIterator<Item = (&'a ItemRef, &'a SourceRange, String)>,
    name: &str,
) -> Option<(&'a ItemRef, &'a SourceRange)> {
    let needle = name.to_lowercase();
    let mut best: Option<(usize, (&ItemRef, &SourceRange))> = None;
    for (item, range, item_name) in candidates {
        if !item_name.to_lowercase().contains(&needle) {
            continue;
        }
        let len = item_name.chars().count();
        match best {
            Some((best_len, _)) if best_len <= len => {}
            _ => best = Some((len, (item, range))),
        }
    }
    best.map(|(_, found)| found)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::debugger::code::Item;
    use std::sync::Arc;

    struct Named(&'static str);

    impl Item for Named {
        fn name(&self) -> String {
            self.0.to_string()
        }
    }

    fn range(path: &str, start: u32, end: u32) -> SourceRange {
        SourceRange::new(path, SourcePoint::new(start, 1), SourcePoint::new(end, 1))
    }

    #[test]
    fn test_path_matches() {
        struct TestCase {
            requested: &'static str,
            recorded: &'static str,
            expected: bool,
        }

        let cases = [
            TestCase {
                requested: "/bot/main.dialog",
                recorded: "/bot/main.dialog",
                expected: true,
            },
            TestCase {
                requested: "/home/me/bot/main.dialog",
                recorded: "/srv/bot/main.dialog",
                expected: true,
            },
            TestCase {
                requested: "C:\\bot\\en-us\\main.lg",
                recorded: "/srv/en-us/main.lg",
                expected: true,
            },
            TestCase {
                requested: "/bot/main.dialog",
                recorded: "/bot/other.dialog",
                expected: false,
            },
            TestCase {
                requested: "/home/me/bot/main.rs",
                recorded: "/srv/bot/main.rs",
                expected: false,
            },
        ];

        for tc in cases {
            assert_eq!(
                path_matches(tc.requested, tc.recorded),
                tc.expected,
                "{} vs {}",
                tc.requested,
                tc.recorded
            );
        }
    }

    #[test]
    fn test_closest_line_first_recorded_wins_tie() {
        let first: ItemRef = Arc::new(Named("first"));
        let second: ItemRef = Arc::new(Named("second"));
        let far: ItemRef = Arc::new(Named("far"));
        let other: ItemRef = Arc::new(Named("other"));
        let items = [
            (first.clone(), range("main.dialog", 8, 12)),
            (second.clone(), range("main.dialog", 12, 14)),
            (far.clone(), range("main.dialog", 40, 50)),
            (other.clone(), range("other.dialog", 10, 10)),
        ];

        let found = best_source_match(items.iter().map(|(i, r)| (i, r)), "main.dialog", 10);
        assert_eq!(item_key(found.unwrap().0), item_key(&first));

        let found = best_source_match(items.iter().map(|(i, r)| (i, r)), "main.dialog", 13);
        assert_eq!(item_key(found.unwrap().0), item_key(&second));

        assert!(best_source_match(items.iter().map(|(i, r)| (i, r)), "none.dialog", 1).is_none());
    }

    #[test]
    fn test_shortest_function_name_wins() {
        let long: ItemRef = Arc::new(Named("BookFlightDialog.Confirm"));
        let short: ItemRef = Arc::new(Named("BookFlightDialog"));
        let items = [
            (long.clone(), range("a.dialog", 1, 1)),
            (short.clone(), range("a.dialog", 5, 5)),
        ];

        let found = best_function_match(
            items.iter().map(|(i, r)| (i, r, i.name())),
            "bookflight",
        );
        assert_eq!(item_key(found.unwrap().0), item_key(&short));

        let found = best_function_match(items.iter().map(|(i, r)| (i, r, i.name())), "confirm");
        assert_eq!(item_key(found.unwrap().0), item_key(&long));

        assert!(best_function_match(items.iter().map(|(i, r)| (i, r, i.name())), "cancel").is_none());
    }

    #[test]
    fn test_rebind_reports_changes() {
        let item: ItemRef = Arc::new(Named("first"));
        let declared = range("main.dialog", 8, 12);
        let mut row = Row::new(
            1,
            Request::Source {
                source: Source::from_path("main.dialog"),
                breakpoint: SourceBreakpoint {
                    line: 10,
                    column: None,
                },
            },
        );
        assert!(!row.breakpoint.verified);
        assert_eq!(row.breakpoint.line, Some(10));

        assert!(row.rebind(Some((item.clone(), &declared))));
        assert!(row.breakpoint.verified);
        assert_eq!(row.breakpoint.line, Some(8));
        assert!(!row.rebind(Some((item, &declared))));

        assert!(row.rebind(None));
        assert!(!row.breakpoint.verified);
        assert_eq!(row.breakpoint.line, Some(10));
    }
}
