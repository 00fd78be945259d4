//! Readiness and generation bookkeeping shared by the supervisor and the
//! gateway.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::watch;

/// Whether the current engine generation may accept commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    /// No generation has been spawned yet.
    Starting,
    Ready,
    /// The last generation exited or could not be spawned.
    Down,
}

impl Readiness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Down => "down",
        }
    }
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Written only by the supervisor. Readers take a snapshot per request.
#[derive(Debug)]
pub struct EngineState {
    readiness: watch::Sender<Readiness>,
    generation: AtomicU64,
}

impl Default for EngineState {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineState {
    pub fn new() -> Self {
        let (readiness, _) = watch::channel(Readiness::Starting);
        Self {
            readiness,
            generation: AtomicU64::new(0),
        }
    }

    pub fn readiness(&self) -> Readiness {
        *self.readiness.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.readiness() == Readiness::Ready
    }

    pub fn set_readiness(&self, readiness: Readiness) {
        self.readiness.send_replace(readiness);
    }

    /// Watch readiness transitions.
    pub fn subscribe(&self) -> watch::Receiver<Readiness> {
        self.readiness.subscribe()
    }

    /// Generation of the most recent spawn attempt. Zero before the first.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Allocate the next generation number. Generations start at 1.
    pub fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_not_ready() {
        let state = EngineState::new();
        assert_eq!(state.readiness(), Readiness::Starting);
        assert!(!state.is_ready());
        assert_eq!(state.generation(), 0);
    }

    #[test]
    fn generations_are_monotonic() {
        let state = EngineState::new();
        assert_eq!(state.next_generation(), 1);
        assert_eq!(state.next_generation(), 2);
        assert_eq!(state.generation(), 2);
    }

    #[tokio::test]
    async fn subscribers_see_transitions() {
        let state = EngineState::new();
        let mut rx = state.subscribe();

        state.set_readiness(Readiness::Ready);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), Readiness::Ready);

        state.set_readiness(Readiness::Down);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), Readiness::Down);
    }

    #[test]
    fn readiness_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Readiness::Ready).unwrap(), "\"ready\"");
        assert_eq!(Readiness::Down.to_string(), "down");
    }
}
