use serde_json::Value;

/// Prefix translation between paths known to the engine and paths seen by the client.
///
/// Built from the `sourceMap` launch argument, where every key is an engine side prefix
/// and its value is the matching client side prefix. The longest matching prefix wins.
#[derive(Debug, Default, Clone)]
pub struct PathMap {
    to_client: Vec<(String, String)>,
    to_engine: Vec<(String, String)>,
}

impl PathMap {
    pub fn from_launch(source_map: Option<&Value>) -> Self {
        let mut map = PathMap::default();
        let Some(Value::Object(pairs)) = source_map else {
            return map;
        };

        for (engine_prefix, client_prefix) in pairs {
            let Some(client_prefix) = client_prefix.as_str() else {
                continue;
            };
            map.to_client
                .push((dir_prefix(engine_prefix), client_prefix.to_string()));
            map.to_engine
                .push((dir_prefix(client_prefix), engine_prefix.to_string()));
        }

        map.to_client.sort_by_key(|(from, _)| std::cmp::Reverse(from.len()));
        map.to_engine.sort_by_key(|(from, _)| std::cmp::Reverse(from.len()));
        map
    }

    pub fn is_empty(&self) -> bool {
        self.to_client.is_empty()
    }

    pub fn to_client(&self, engine_path: &str) -> String {
        translate(engine_path, &self.to_client)
    }

    pub fn to_engine(&self, client_path: &str) -> String {
        translate(client_path, &self.to_engine)
    }
}

fn translate(path: &str, rules: &[(String, String)]) -> String {
    let slashed = path.replace('\\', "/");
    for (from, to) in rules {
        if let Some(rest) = slashed.strip_prefix(from.as_str()) {
            return join(to, rest);
        }
    }
    path.to_string()
}

fn join(prefix: &str, rest: &str) -> String {
    if rest.is_empty() {
        return prefix.to_string();
    }

    let backslashed = prefix.contains('\\');
    let mut out = prefix.to_string();
    if !out.ends_with(['/', '\\']) {
        out.push(if backslashed { '\\' } else { '/' });
    }
    if backslashed {
        out.push_str(&rest.replace('/', "\\"));
    } else {
        out.push_str(rest);
    }
    out
}

fn dir_prefix(prefix: &str) -> String {
    let mut out = prefix.replace('\\', "/");
    if !out.ends_with('/') {
        out.push('/');
    }
    out
}

#[cfg(test)]
mod test {
    use super::PathMap;
    use serde_json::json;

    #[test]
    fn test_longest_prefix_wins() {
        let launch = json!({
            "/srv/bot": "/home/me/bot",
            "/srv/bot/dialogs": "/home/me/dialogs",
        });
        let map = PathMap::from_launch(Some(&launch));

        assert_eq!(map.to_client("/srv/bot/main.dialog"), "/home/me/bot/main.dialog");
        assert_eq!(
            map.to_client("/srv/bot/dialogs/book.dialog"),
            "/home/me/dialogs/book.dialog"
        );
        assert_eq!(map.to_engine("/home/me/bot/main.dialog"), "/srv/bot/main.dialog");
        assert_eq!(map.to_engine("/elsewhere/x.lg"), "/elsewhere/x.lg");
    }

    #[test]
    fn test_windows_prefix() {
        let launch = json!({ "/srv/bot": "C:\\work\\bot" });
        let map = PathMap::from_launch(Some(&launch));

        assert_eq!(
            map.to_client("/srv/bot/dialogs/main.dialog"),
            "C:\\work\\bot\\dialogs\\main.dialog"
        );
        assert_eq!(
            map.to_engine("C:\\work\\bot\\dialogs\\main.dialog"),
            "/srv/bot/dialogs/main.dialog"
        );
    }

    #[test]
    fn test_missing_map() {
        let map = PathMap::from_launch(None);
        assert!(map.is_empty());
        assert_eq!(map.to_engine("a/b.dialog"), "a/b.dialog");
    }
}
