//! In-memory device session for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use super::{ApiClient, ApiError, Reply};

/// Canned-reply session. Replies are keyed by the full request line
/// (`command arg1 arg2`), falling back to the bare command.
#[derive(Default)]
pub struct FakeClient {
    replies: HashMap<String, Reply>,
    failures: HashMap<String, fn() -> ApiError>,
    calls: Mutex<Vec<String>>,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `request` (command, optionally followed by args) with `reply`.
    pub fn reply(mut self, request: &str, reply: Reply) -> Self {
        self.replies.insert(request.to_string(), reply);
        self
    }

    /// Fail `request` with the error produced by `make`.
    pub fn fail(mut self, request: &str, make: fn() -> ApiError) -> Self {
        self.failures.insert(request.to_string(), make);
        self
    }

    /// Request lines seen so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ApiClient for FakeClient {
    async fn run(&self, command: &str, args: &[&str]) -> Result<Reply, ApiError> {
        let line = std::iter::once(command)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        self.calls.lock().unwrap().push(line.clone());

        for key in [line.as_str(), command] {
            if let Some(make) = self.failures.get(key) {
                return Err(make());
            }
            if let Some(reply) = self.replies.get(key) {
                return Ok(reply.clone());
            }
        }
        Err(ApiError::Trap(format!("no such command: {line}")))
    }
}
