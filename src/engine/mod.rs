pub mod pipe;
pub mod protocol;
pub mod state;
pub mod supervisor;

use std::time::Duration;

use pipe::PipeClient;
use state::EngineState;

/// Shared by the supervisor (writer) and the gateway (reader). Built once in
/// `main` and handed to both as an `Arc`.
pub struct EngineContext {
    pub state: EngineState,
    pub pipe: PipeClient,
}

impl EngineContext {
    pub fn new(query_timeout: Duration) -> Self {
        Self {
            state: EngineState::new(),
            pipe: PipeClient::new(query_timeout),
        }
    }
}
