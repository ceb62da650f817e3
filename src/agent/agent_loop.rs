use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::llm::{LLMClient, LLMError, LLMInput, LLMOutput, Usage};
use crate::session::{Conversation, Message, MessageContent};
use crate::tool::{ErrorKind, ToolCall, ToolRegistry, parse_arguments};

/// Answer returned when the model produced no text at all.
pub const EMPTY_ANSWER: &str = "Sorry, I could not process that request.";

/// Options for a single user turn.
#[derive(Debug, Clone)]
pub struct TurnOptions {
    /// The model to use
    pub model: String,
    /// Optional temperature
    pub temperature: Option<f32>,
    /// Rounds of tool use before the model is forced to answer
    pub max_rounds: usize,
    /// Maximum tokens to generate per model call
    pub max_tokens: u32,
    /// The system prompt
    pub system_prompt: String,
    /// Aborts the turn between rounds when triggered
    pub cancel: Option<CancellationToken>,
}

impl Default for TurnOptions {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: None,
            max_rounds: 5,
            max_tokens: 4096,
            system_prompt: String::new(),
            cancel: None,
        }
    }
}

/// One tool execution performed during a turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionReportEntry {
    pub tool_name: String,
    /// Parsed arguments, or the raw payload when it was not valid JSON
    pub arguments: Value,
    pub success: bool,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

/// Result of a completed turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// The final answer shown to the user
    pub answer: String,
    /// Token usage summed across every model call
    pub usage: Option<Usage>,
    pub execution_report: Vec<ExecutionReportEntry>,
    /// Rounds in which tools were executed
    pub rounds: usize,
    pub model_calls: usize,
    /// The answer came from the tool-less call made after the round limit
    pub forced_final: bool,
    /// The answer came from the simplified fallback after a model failure
    pub degraded: bool,
    /// The conversation extended with this turn's messages
    pub conversation: Conversation,
}

/// Errors that end a turn without an answer.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    /// The model failed and the degraded fallback failed too
    #[error("LLM error: {0}")]
    Llm(#[from] LLMError),
    /// The turn was cancelled by the caller
    #[error("turn cancelled")]
    Cancelled,
}

/// Drives the model through rounds of tool use until it answers.
#[derive(Clone)]
pub struct Orchestrator {
    llm: Arc<dyn LLMClient>,
    registry: Arc<ToolRegistry>,
}

impl Orchestrator {
    pub fn new(llm: Arc<dyn LLMClient>, registry: Arc<ToolRegistry>) -> Self {
        Self { llm, registry }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Runs one user turn to completion.
    ///
    /// Tools are offered for at most `max_rounds` rounds. After that one more
    /// call is made with no tools, so the turn always terminates. Tool calls
    /// within a round run sequentially in the order the model issued them.
    pub async fn run_turn(
        &self,
        mut conversation: Conversation,
        options: TurnOptions,
    ) -> Result<TurnOutcome, TurnError> {
        let mut rounds = 0;
        let mut model_calls = 0;
        let mut usage = None;
        let mut execution_report = Vec::new();

        loop {
            if options.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
                info!(rounds, "Turn cancelled");
                return Err(TurnError::Cancelled);
            }

            let forced_final = rounds >= options.max_rounds;
            let tools = if forced_final {
                Vec::new()
            } else {
                self.registry.enabled_tool_definitions().await
            };
            debug!(round = rounds, tools = tools.len(), forced_final, "Calling LLM");

            let input = self.input(&conversation, &options, tools);
            model_calls += 1;
            let response = match self.llm.complete(input).await {
                Ok(response) => response,
                Err(error) => {
                    warn!(error = %error, round = rounds, "LLM call failed, retrying with simplified prompt");
                    let fallback = self.input(&conversation.simplified(), &options, Vec::new());
                    model_calls += 1;
                    let response = self.llm.complete(fallback).await.map_err(|fallback_error| {
                        warn!(error = %fallback_error, "Degraded LLM call failed");
                        error
                    })?;
                    usage = Usage::accumulate(usage, response.usage);
                    let answer = finish(&mut conversation, &response);
                    return Ok(TurnOutcome {
                        answer,
                        usage,
                        execution_report,
                        rounds,
                        model_calls,
                        forced_final: false,
                        degraded: true,
                        conversation,
                    });
                }
            };
            usage = Usage::accumulate(usage, response.usage);

            let calls = response.tool_calls();
            if calls.is_empty() || forced_final {
                if forced_final && !calls.is_empty() {
                    debug!(count = calls.len(), "Ignoring tool calls on the final round");
                }
                let answer = finish(&mut conversation, &response);
                info!(rounds, model_calls, tools_run = execution_report.len(), "Turn complete");
                return Ok(TurnOutcome {
                    answer,
                    usage,
                    execution_report,
                    rounds,
                    model_calls,
                    forced_final,
                    degraded: false,
                    conversation,
                });
            }

            conversation.push(Message::new_assistant(response.content.clone()));
            debug!(count = calls.len(), round = rounds, "Executing tool calls");
            for call in &calls {
                let entry = self.dispatch(call, &mut conversation).await;
                execution_report.push(entry);
            }
            rounds += 1;
        }
    }

    fn input(&self, conversation: &Conversation, options: &TurnOptions, tools: Vec<crate::tool::ToolDefinition>) -> LLMInput {
        LLMInput {
            model: options.model.clone(),
            messages: conversation.messages.clone(),
            system_prompt: options.system_prompt.clone(),
            tools,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        }
    }

    /// Executes one call and appends its result to the conversation.
    async fn dispatch(&self, call: &ToolCall, conversation: &mut Conversation) -> ExecutionReportEntry {
        let result = self.registry.execute_tool_call(call).await;

        if !result.success {
            debug!(tool = %call.name, error = ?result.error, "Tool failed, reporting to model");
        }
        conversation.push(Message::new_tool_result(vec![MessageContent::tool_result(
            call.id.clone(),
            &result,
        )]));

        ExecutionReportEntry {
            tool_name: call.name.clone(),
            arguments: parse_arguments(&call.arguments)
                .map(Value::Object)
                .unwrap_or_else(|_| Value::String(call.arguments.clone())),
            success: result.success,
            duration_ms: result.execution_time_ms,
            error: result.error,
            error_kind: result.error_kind,
        }
    }
}

/// Records the final answer, keeping only the text of the response.
fn finish(conversation: &mut Conversation, response: &LLMOutput) -> String {
    let text = response.text();
    let answer = if text.trim().is_empty() {
        EMPTY_ANSWER.to_string()
    } else {
        text
    };
    conversation.push(Message::new_assistant(vec![MessageContent::text(answer.clone())]));
    answer
}
