//! Client-side navigation.
//!
//! # Data Flow
//! ```text
//! History provider (push / replace / back / forward)
//!     → listener → unbounded channel
//!     → Navigation::process_pending / next_transition
//!         POP with stored state → on_state_change(state, Pop)
//!         same location         → skipped
//!         otherwise             → Router::run → on_state_change per yielded state
//!                                 → final state stored on the history entry
//! ```
//!
//! # Design Decisions
//! - The history provider is a trait; `MemoryHistory` backs tests and headless use
//! - Transitions are queued and handled cooperatively, in order, by the owner of `Navigation`
//! - Lifecycle listeners are registered on the router and fire around every transition

pub mod history;
pub mod watcher;

pub use history::{Action, History, HistoryListener, ListenerId, Location, MemoryHistory};
pub use watcher::{Navigation, SearchValue};

/// When a lifecycle listener fires relative to a navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecyclePhase {
    Before,
    After,
}

/// Payload handed to lifecycle listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleEvent {
    pub phase: LifecyclePhase,
    pub location: Location,
    /// `None` on the initial load.
    pub action: Option<Action>,
    pub initial_load: bool,
}
