//! Named engine events usable as implicit breakpoints (the client's "exception" filters).

use crate::dap::protocol::ExceptionBreakpointsFilter;
use crate::debugger::utils::lock;
use std::collections::HashSet;
use std::sync::Mutex;
use strum::{EnumMessage, IntoEnumIterator};
use strum_macros::{Display, EnumIter, EnumMessage, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, EnumMessage)]
#[strum(serialize_all = "camelCase")]
pub enum DialogEvent {
    #[strum(message = "Begin dialog")]
    BeginDialog,
    #[strum(message = "Reprompt dialog")]
    RepromptDialog,
    #[strum(message = "Cancel dialog")]
    CancelDialog,
    #[strum(message = "Activity received")]
    ActivityReceived,
    #[strum(message = "Error")]
    Error,
    #[strum(message = "Recognize utterance")]
    RecognizeUtterance,
    #[strum(message = "Recognized intent")]
    RecognizedIntent,
    #[strum(message = "Unknown intent")]
    UnknownIntent,
    #[strum(message = "End of actions")]
    EndOfActions,
    #[strum(message = "Version changed")]
    VersionChanged,
}

impl DialogEvent {
    pub fn label(self) -> &'static str {
        self.get_message().unwrap_or_default()
    }
}

/// Which engine events stop a turn when reported as a step tag.
pub struct EventFilters {
    defaults: HashSet<String>,
    enabled: Mutex<HashSet<String>>,
}

impl EventFilters {
    /// Filters with `defaults` enabled, unknown names are ignored.
    pub fn new<S: AsRef<str>>(defaults: &[S]) -> Self {
        let defaults: HashSet<String> = defaults
            .iter()
            .filter_map(|name| name.as_ref().parse::<DialogEvent>().ok())
            .map(|event| event.to_string())
            .collect();
        Self {
            enabled: Mutex::new(defaults.clone()),
            defaults,
        }
    }

    /// Filter table announced in the `initialize` capabilities.
    pub fn filters(&self) -> Vec<ExceptionBreakpointsFilter> {
        DialogEvent::iter()
            .map(|event| {
                let filter = event.to_string();
                ExceptionBreakpointsFilter {
                    default: self.defaults.contains(&filter),
                    label: event.label().to_string(),
                    filter,
                }
            })
            .collect()
    }

    /// Enable exactly `filters`.
    pub fn reset<S: AsRef<str>>(&self, filters: &[S]) {
        let mut enabled = lock(&self.enabled);
        enabled.clear();
        enabled.extend(filters.iter().map(|name| name.as_ref().to_string()));
    }

    pub fn restore_defaults(&self) {
        *lock(&self.enabled) = self.defaults.clone();
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        lock(&self.enabled).contains(name)
    }
}

impl Default for EventFilters {
    fn default() -> Self {
        Self::new(&[DialogEvent::Error.to_string()])
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_filter_table() {
        let events = EventFilters::default();
        let filters = events.filters();
        assert_eq!(filters.len(), 10);
        assert_eq!(filters[0].filter, "beginDialog");
        assert_eq!(filters[0].label, "Begin dialog");

        let enabled: Vec<_> = filters
            .iter()
            .filter(|f| f.default)
            .map(|f| f.filter.as_str())
            .collect();
        assert_eq!(enabled, vec!["error"]);
    }

    #[test]
    fn test_reset_and_restore() {
        let events = EventFilters::new(&["error", "noSuchEvent"]);
        assert!(events.is_enabled("error"));

        events.reset(&["beginDialog", "endOfActions"]);
        assert!(!events.is_enabled("error"));
        assert!(events.is_enabled("beginDialog"));
        assert!(events.is_enabled("endOfActions"));

        events.restore_defaults();
        assert!(events.is_enabled("error"));
        assert!(!events.is_enabled("beginDialog"));
        assert!(!events.is_enabled("noSuchEvent"));
    }
}
