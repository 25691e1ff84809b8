//! History watcher driving client-side runs.

use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::handlers::State;
use crate::navigation::history::{Action, History, ListenerId, Location};
use crate::navigation::{LifecycleEvent, LifecyclePhase};
use crate::routing::dispatch::RunOptions;
use crate::routing::request::Request;
use crate::routing::response::Response;
use crate::routing::router::Router;

type StateCallback = Box<dyn FnMut(State, Action) + Send>;

/// Live navigation state returned by [`Router::watch`].
///
/// Transitions are queued by the history listener and handled when the owner
/// calls [`Navigation::process_pending`] or [`Navigation::next_transition`].
/// Dropping the value stops listening.
pub struct Navigation {
    router: Arc<Router>,
    history: Arc<dyn History>,
    transitions: mpsc::UnboundedReceiver<(Location, Action)>,
    listener: ListenerId,
    previous: Location,
    on_state_change: StateCallback,
}

impl Router {
    /// Watch `history`, running the router on every transition.
    ///
    /// The before and after lifecycle events fire once for the current
    /// location with `initial_load` set; no handlers run for it.
    pub fn watch<F>(self: &Arc<Self>, history: Arc<dyn History>, on_state_change: F) -> Navigation
    where
        F: FnMut(State, Action) + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let listener = history.listen(Arc::new(move |location: &Location, action: Action| {
            if tx.send((location.clone(), action)).is_err() {
                tracing::debug!(path = %location.path(), "Navigation dropped, transition discarded");
            }
        }));

        let previous = history.location();
        for phase in [LifecyclePhase::Before, LifecyclePhase::After] {
            self.emit(&LifecycleEvent {
                phase,
                location: previous.clone(),
                action: None,
                initial_load: true,
            });
        }

        Navigation {
            router: self.clone(),
            history,
            transitions: rx,
            listener,
            previous,
            on_state_change: Box::new(on_state_change),
        }
    }
}

impl Navigation {
    pub fn history(&self) -> &Arc<dyn History> {
        &self.history
    }

    pub fn previous_location(&self) -> &Location {
        &self.previous
    }

    /// Handle every queued transition. Returns how many were handled.
    pub async fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok((location, action)) = self.transitions.try_recv() {
            self.handle(location, action).await;
            handled += 1;
        }
        handled
    }

    /// Wait for the next transition and handle it.
    pub async fn next_transition(&mut self) -> Option<Action> {
        let (location, action) = self.transitions.recv().await?;
        self.handle(location, action).await;
        Some(action)
    }

    /// Merge `params` into the current query string and push the result.
    /// A key replaces every existing `key` or `key[]` pair at the position of
    /// the first one; new keys are appended. `SearchValue::Many` is written
    /// as repeated `key[]` pairs.
    pub fn apply_search<I, K, V>(&self, params: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<SearchValue>,
    {
        let current = self.history.location();
        let raw = current.search.strip_prefix('?').unwrap_or(&current.search);
        let mut pairs: Vec<(String, String)> = url::form_urlencoded::parse(raw.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        for (key, value) in params {
            let key = key.into();
            let list_key = format!("{}[]", key);
            let entries: Vec<(String, String)> = match value.into() {
                SearchValue::One(value) => vec![(key.clone(), value)],
                SearchValue::Many(values) => values.into_iter().map(|v| (list_key.clone(), v)).collect(),
            };

            let matches = |k: &str| k == key || k == list_key;
            let at = pairs.iter().position(|(k, _)| matches(k));
            pairs.retain(|(k, _)| !matches(k));
            match at {
                Some(at) => {
                    pairs.splice(at..at, entries);
                }
                None => pairs.extend(entries),
            }
        }

        let query = encode_query(&pairs);
        let path = if query.is_empty() {
            current.pathname.clone()
        } else {
            format!("{}?{}", current.pathname, query)
        };
        self.history.push(&path, None);
    }

    async fn handle(&mut self, location: Location, action: Action) {
        if action == Action::Pop {
            if let Some(Value::Object(state)) = &location.state {
                tracing::debug!(path = %location.path(), "Restoring state from history");
                self.lifecycle(LifecyclePhase::Before, &location, action);
                (self.on_state_change)(state.clone(), action);
                self.previous = location.clone();
                self.lifecycle(LifecyclePhase::After, &location, action);
                return;
            }
        }

        if location.same_place(&self.previous) {
            tracing::debug!(path = %location.path(), "Same location, skipping run");
            self.previous = location;
            return;
        }

        self.lifecycle(LifecyclePhase::Before, &location, action);

        let response = Response::new();
        let mut options = RunOptions::default();
        options.history_state = location.state.clone();

        let mut last = None;
        {
            let mut states = self
                .router
                .run(Request::from_location(&location), response.clone(), options);
            while let Some(state) = states.next().await {
                (self.on_state_change)(state.clone(), action);
                last = Some(state);
            }
        }

        if let Some(state) = last {
            if self.history.location().key == location.key {
                self.history.set_state(Value::Object(state));
            }
        }

        self.previous = location.clone();
        self.lifecycle(LifecyclePhase::After, &location, action);

        if let Some(target) = response.redirect_location() {
            tracing::debug!(from = %location.path(), to = %target, "Applying redirect");
            self.history.replace(&target, None);
        }
    }

    fn lifecycle(&self, phase: LifecyclePhase, location: &Location, action: Action) {
        self.router.emit(&LifecycleEvent {
            phase,
            location: location.clone(),
            action: Some(action),
            initial_load: false,
        });
    }
}

impl Drop for Navigation {
    fn drop(&mut self) {
        self.history.unlisten(self.listener);
    }
}

/// A query value for `Navigation::apply_search`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchValue {
    One(String),
    Many(Vec<String>),
}

impl From<&str> for SearchValue {
    fn from(value: &str) -> Self {
        Self::One(value.to_string())
    }
}

impl From<String> for SearchValue {
    fn from(value: String) -> Self {
        Self::One(value)
    }
}

impl From<Vec<&str>> for SearchValue {
    fn from(values: Vec<&str>) -> Self {
        Self::Many(values.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<String>> for SearchValue {
    fn from(values: Vec<String>) -> Self {
        Self::Many(values)
    }
}

/// Form-encode `pairs`, keeping the `[]` of list keys literal.
fn encode_query(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(key, value)| {
            let (stem, list) = match key.strip_suffix("[]") {
                Some(stem) => (stem, "[]"),
                None => (key.as_str(), ""),
            };
            let stem: String = url::form_urlencoded::byte_serialize(stem.as_bytes()).collect();
            let value: String = url::form_urlencoded::byte_serialize(value.as_bytes()).collect();
            format!("{}{}={}", stem, list, value)
        })
        .collect::<Vec<_>>()
        .join("&")
}
