//! The conversation turn loop.
//!
//! Each `converse` call appends the user's message and then alternates
//! between asking the model and executing the tools it requests:
//!
//! ```text
//! AwaitingModel --stop_reason=tool_use--> ExecutingTools --results appended--> AwaitingModel
//!       |
//!       +--any other stop reason--> Done (joined text of the final turn)
//! ```
//!
//! Tool failures are fed back to the model as ordinary results. Model
//! service failures end the call with an error, leaving the history as it
//! was before the failing request.
//!
//! Every tool-use request left in the history is answered by the following
//! turn, and roles alternate, whichever way the call ends. A final turn that
//! still carries requests has them removed; hitting the round limit appends
//! error results plus a closing assistant turn.

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::conversation::ConversationState;
use crate::model::{
    Backend, ContentBlock, ModelRequest, StopReason, ToolResult, ToolUseRequest, Turn,
};
use crate::tools::{TOOL_ERROR_PREFIX, ToolCatalog, ToolInvoker, ToolServer};
use crate::{Error, Result};

/// Default bound on tool rounds within one `converse` call.
pub const DEFAULT_MAX_ROUNDS: usize = 25;

/// How the tool calls of one round are dispatched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Dispatch {
    /// One call at a time, in request order.
    #[default]
    Sequential,
    /// Every call of the round in flight at once. Results still appear in
    /// request order.
    Concurrent,
}

type ToolCallHook<'a> = Box<dyn Fn(&ToolUseRequest) + Send + Sync + 'a>;

enum State {
    AwaitingModel,
    ExecutingTools(Vec<ToolUseRequest>),
    Done(String),
}

/// Drives the ask / execute-tools cycle for one conversation at a time.
///
/// The orchestrator holds no conversation state of its own; the history is
/// passed into each call, so one session can serve independent
/// conversations.
pub struct TurnOrchestrator<'a, B, S> {
    backend: &'a B,
    catalog: &'a ToolCatalog,
    invoker: ToolInvoker<'a, S>,
    max_rounds: Option<usize>,
    dispatch: Dispatch,
    on_tool_call: Option<ToolCallHook<'a>>,
}

impl<'a, B: Backend, S: ToolServer> TurnOrchestrator<'a, B, S> {
    pub fn new(backend: &'a B, catalog: &'a ToolCatalog, server: &'a S) -> Self {
        Self {
            backend,
            catalog,
            invoker: ToolInvoker::new(server).restrict_to(catalog),
            max_rounds: Some(DEFAULT_MAX_ROUNDS),
            dispatch: Dispatch::default(),
            on_tool_call: None,
        }
    }

    /// Bound the number of tool rounds per call. `None` removes the bound.
    pub fn max_rounds(mut self, max_rounds: Option<usize>) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Called once per tool call, just before it runs.
    pub fn on_tool_call(mut self, hook: impl Fn(&ToolUseRequest) + Send + Sync + 'a) -> Self {
        self.on_tool_call = Some(Box::new(hook));
        self
    }

    /// Send a user message and run tool rounds until the model answers.
    ///
    /// Returns the concatenated text of the final assistant turn, which may
    /// be empty.
    pub async fn converse(
        &self,
        conversation: &mut ConversationState,
        user_message: &str,
    ) -> Result<String> {
        conversation.append(Turn::user(user_message));
        let tool_config = self.catalog.to_service_schema();
        let mut rounds = 0;
        let mut state = State::AwaitingModel;

        loop {
            state = match state {
                State::AwaitingModel => {
                    let request = ModelRequest {
                        messages: conversation.snapshot(),
                        tool_config: tool_config.as_ref(),
                    };
                    let response = self.backend.call(request).await?;
                    debug!(
                        stop_reason = ?response.stop_reason,
                        input_tokens = response.usage.input_tokens,
                        output_tokens = response.usage.output_tokens,
                        "model responded"
                    );

                    // Appended even when absent so roles keep alternating.
                    let mut turn = response
                        .message
                        .unwrap_or_else(|| Turn::assistant(Vec::new()));
                    let requests = turn.tool_requests();

                    let next = if response.stop_reason == StopReason::ToolUse && !requests.is_empty()
                    {
                        State::ExecutingTools(requests)
                    } else {
                        if !requests.is_empty() {
                            // Nothing will answer these; keeping them breaks the next request.
                            warn!(
                                stop_reason = ?response.stop_reason,
                                dropped = requests.len(),
                                "dropping tool requests from final turn"
                            );
                            turn.content
                                .retain(|block| !matches!(block, ContentBlock::ToolUse(_)));
                        }
                        State::Done(turn.text())
                    };
                    conversation.append(turn);
                    next
                }

                State::ExecutingTools(requests) => {
                    if let Some(limit) = self.max_rounds.filter(|&limit| rounds >= limit) {
                        // Every request still gets a result so the history stays valid.
                        let error = Error::RoundLimit { limit };
                        let results = requests
                            .iter()
                            .map(|request| {
                                ToolResult::new(&request.id, format!("{TOOL_ERROR_PREFIX}{error}"))
                            })
                            .collect();
                        conversation.append(Turn::tool_results(results));
                        conversation.append(Turn::assistant(vec![ContentBlock::text(format!(
                            "Stopped after {limit} tool rounds."
                        ))]));
                        return Err(error);
                    }

                    rounds += 1;
                    info!(round = rounds, calls = requests.len(), "executing tool round");
                    let results = self.execute(&requests).await;
                    conversation.append(Turn::tool_results(results));
                    State::AwaitingModel
                }

                State::Done(answer) => return Ok(answer),
            };
        }
    }

    async fn execute(&self, requests: &[ToolUseRequest]) -> Vec<ToolResult> {
        match self.dispatch {
            Dispatch::Sequential => {
                let mut results = Vec::with_capacity(requests.len());
                for request in requests {
                    results.push(self.execute_one(request).await);
                }
                results
            }
            Dispatch::Concurrent => join_all(requests.iter().map(|r| self.execute_one(r))).await,
        }
    }

    async fn execute_one(&self, request: &ToolUseRequest) -> ToolResult {
        info!(tool = %request.tool_name, id = %request.id, "executing tool");
        if let Some(hook) = &self.on_tool_call {
            hook(request);
        }
        let text = self
            .invoker
            .invoke(&request.tool_name, &request.arguments)
            .await;
        ToolResult::new(&request.id, text)
    }
}
