//! History provider interface and an in-memory implementation.

use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;

/// A history entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub pathname: String,
    /// Query string including the leading `?`, or empty.
    pub search: String,
    /// App state stored with the entry.
    pub state: Option<Value>,
    /// Unique per entry within one provider.
    pub key: u64,
}

impl Location {
    pub fn new(path: &str) -> Self {
        let (pathname, search) = match path.split_once('?') {
            Some((p, q)) if !q.is_empty() => (p, format!("?{}", q)),
            Some((p, _)) => (p, String::new()),
            None => (path, String::new()),
        };
        Self {
            pathname: if pathname.is_empty() { "/".to_string() } else { pathname.to_string() },
            search,
            state: None,
            key: 0,
        }
    }

    /// Pathname and search.
    pub fn path(&self) -> String {
        format!("{}{}", self.pathname, self.search)
    }

    /// Same pathname and search, ignoring state and key.
    pub fn same_place(&self, other: &Location) -> bool {
        self.pathname == other.pathname && self.search == other.search
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Push,
    Pop,
    Replace,
}

pub type HistoryListener = Arc<dyn Fn(&Location, Action) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Navigation provider. Listeners are notified synchronously on every transition.
pub trait History: Send + Sync {
    fn location(&self) -> Location;

    fn push(&self, path: &str, state: Option<Value>);

    fn replace(&self, path: &str, state: Option<Value>);

    fn go_back(&self);

    fn go_forward(&self);

    /// Store app state on the current entry without notifying listeners.
    fn set_state(&self, state: Value);

    fn listen(&self, listener: HistoryListener) -> ListenerId;

    fn unlisten(&self, id: ListenerId);
}

struct HistoryInner {
    entries: Vec<Location>,
    index: usize,
    next_key: u64,
    listeners: Vec<(ListenerId, HistoryListener)>,
    next_listener: u64,
}

impl HistoryInner {
    fn entry(&mut self, path: &str, state: Option<Value>) -> Location {
        let mut location = Location::new(path);
        location.state = state;
        location.key = self.next_key;
        self.next_key += 1;
        location
    }
}

/// In-memory history stack.
pub struct MemoryHistory {
    inner: Mutex<HistoryInner>,
}

impl MemoryHistory {
    pub fn new(initial: &str) -> Self {
        let mut inner = HistoryInner {
            entries: Vec::new(),
            index: 0,
            next_key: 0,
            listeners: Vec::new(),
            next_listener: 0,
        };
        let first = inner.entry(initial, None);
        inner.entries.push(first);
        Self {
            inner: Mutex::new(inner),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HistoryInner> {
        self.inner.lock().expect("history mutex poisoned")
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn index(&self) -> usize {
        self.lock().index
    }

    /// Listeners run outside the lock so they may call back into the provider.
    fn notify(&self, location: Location, action: Action) {
        let listeners: Vec<HistoryListener> =
            self.lock().listeners.iter().map(|(_, l)| l.clone()).collect();
        for listener in listeners {
            listener(&location, action);
        }
    }

    fn go(&self, delta: isize) {
        let location = {
            let mut inner = self.lock();
            let target = inner.index as isize + delta;
            if target < 0 || target as usize >= inner.entries.len() {
                return;
            }
            inner.index = target as usize;
            inner.entries[inner.index].clone()
        };
        self.notify(location, Action::Pop);
    }
}

impl History for MemoryHistory {
    fn location(&self) -> Location {
        let inner = self.lock();
        inner.entries[inner.index].clone()
    }

    fn push(&self, path: &str, state: Option<Value>) {
        let location = {
            let mut inner = self.lock();
            let location = inner.entry(path, state);
            let keep = inner.index + 1;
            inner.entries.truncate(keep);
            inner.entries.push(location.clone());
            inner.index = keep;
            location
        };
        self.notify(location, Action::Push);
    }

    fn replace(&self, path: &str, state: Option<Value>) {
        let location = {
            let mut inner = self.lock();
            let location = inner.entry(path, state);
            let index = inner.index;
            inner.entries[index] = location.clone();
            location
        };
        self.notify(location, Action::Replace);
    }

    fn go_back(&self) {
        self.go(-1);
    }

    fn go_forward(&self) {
        self.go(1);
    }

    fn set_state(&self, state: Value) {
        let mut inner = self.lock();
        let index = inner.index;
        inner.entries[index].state = Some(state);
    }

    fn listen(&self, listener: HistoryListener) -> ListenerId {
        let mut inner = self.lock();
        let id = ListenerId(inner.next_listener);
        inner.next_listener += 1;
        inner.listeners.push((id, listener));
        id
    }

    fn unlisten(&self, id: ListenerId) {
        self.lock().listeners.retain(|(other, _)| *other != id);
    }
}
