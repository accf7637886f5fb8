//! Conversation orchestrator
//!
//! Drives one run: completion → tool calls → continuation, repeated until a
//! response asks for no tools or the round limit is reached. Tool calls in a
//! response are dispatched strictly in the order the model emitted them.

use std::sync::Arc;

use sid_core::{
    config::DEFAULT_MAX_TOOL_ROUNDS, ContentBlock, Conversation, Error, OrchestrationResult,
    Result, ServiceConfig, ToolCall, ToolDescriptor, ToolFailurePolicy, ToolResult, Turn,
};
use sid_llm::{CompletionRequest, CompletionResponse, CompletionService};
use sid_mcp::ToolRegistry;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::action;

/// Configuration for an orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Tool rounds allowed per run; 1 reproduces a single continuation.
    pub max_rounds: usize,
    pub tool_failure: ToolFailurePolicy,
    /// Send the tool catalog with continuation calls as well as the first.
    pub include_catalog_on_continuation: bool,
    pub system_prompt: Option<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            tool_failure: ToolFailurePolicy::Degrade,
            include_catalog_on_continuation: true,
            system_prompt: None,
        }
    }
}

impl OrchestratorConfig {
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn with_tool_failure(mut self, policy: ToolFailurePolicy) -> Self {
        self.tool_failure = policy;
        self
    }

    pub fn with_catalog_on_continuation(mut self, include: bool) -> Self {
        self.include_catalog_on_continuation = include;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

impl From<&ServiceConfig> for OrchestratorConfig {
    fn from(config: &ServiceConfig) -> Self {
        Self::default()
            .with_max_rounds(config.max_tool_rounds)
            .with_tool_failure(config.tool_failure)
    }
}

/// Runs conversations against a completion service and a tool registry
pub struct Orchestrator {
    completion: Arc<dyn CompletionService>,
    registry: Arc<dyn ToolRegistry>,
    config: OrchestratorConfig,
}

/// Text and tool activity accumulated over one run
#[derive(Default)]
struct RunState {
    segments: Vec<String>,
    /// Index of the first segment authored by the last response.
    final_from: usize,
    tool_calls: Vec<ToolCall>,
    rounds: usize,
}

impl RunState {
    fn push_text(&mut self, text: &str) {
        self.segments.push(text.to_string());
    }

    /// Fold the text of the response that ends the run.
    fn fold_text(&mut self, response: &CompletionResponse) {
        self.final_from = self.segments.len();
        for text in response.text_blocks() {
            self.push_text(text);
        }
    }

    fn finish(self) -> OrchestrationResult {
        let final_text = self.segments.join("\n");
        let side_effect = action::decode_final(&final_text, &self.segments[self.final_from..]);
        if let Some(signal) = &side_effect {
            info!(signal = ?signal, "Decoded action signal");
        }

        OrchestrationResult {
            final_text,
            side_effect,
            tool_calls: self.tool_calls,
            rounds: self.rounds,
        }
    }
}

impl Orchestrator {
    pub fn new(
        completion: Arc<dyn CompletionService>,
        registry: Arc<dyn ToolRegistry>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            completion,
            registry,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<dyn ToolRegistry> {
        &self.registry
    }

    /// Run the conversation to completion.
    ///
    /// The conversation must already end with the new user turn.
    pub async fn run(&self, conversation: Conversation) -> Result<OrchestrationResult> {
        let run_id = Uuid::new_v4();
        let span = info_span!("orchestrate", %run_id, turns = conversation.len());
        self.run_inner(conversation).instrument(span).await
    }

    async fn run_inner(&self, mut conversation: Conversation) -> Result<OrchestrationResult> {
        if conversation.is_empty() {
            return Err(Error::invalid_argument("conversation is empty"));
        }
        conversation.validate()?;

        let catalog = self.registry.tools();
        let mut state = RunState::default();

        loop {
            let continuation = state.rounds > 0;
            let request = self.build_request(&conversation, &catalog, continuation);
            debug!(
                round = state.rounds,
                turns = conversation.len(),
                with_tools = request.tools.is_some(),
                "Requesting completion"
            );
            let response = self.completion.complete(request).await?;

            if !response.has_tool_use() {
                state.fold_text(&response);
                break;
            }

            if state.rounds >= self.config.max_rounds {
                state.fold_text(&response);
                warn!(
                    max_rounds = self.config.max_rounds,
                    pending = ?response.tool_calls().iter().map(|c| c.name.clone()).collect::<Vec<_>>(),
                    "Tool round limit reached; not dispatching"
                );
                break;
            }

            state.rounds += 1;
            let results = self.dispatch_round(&response, &mut state).await?;

            conversation.push(Turn::assistant_blocks(response.content))?;
            conversation.append_tool_results(results)?;
        }

        let result = state.finish();
        info!(
            rounds = result.rounds,
            tool_calls = result.tool_calls.len(),
            side_effect = result.side_effect.is_some(),
            "Orchestration complete"
        );
        Ok(result)
    }

    fn build_request(
        &self,
        conversation: &Conversation,
        catalog: &[ToolDescriptor],
        continuation: bool,
    ) -> CompletionRequest {
        let mut request = CompletionRequest::new(conversation.turns().to_vec());

        let send_catalog = !continuation || self.config.include_catalog_on_continuation;
        if send_catalog && !catalog.is_empty() {
            request = request.with_tools(catalog.to_vec());
        }
        if let Some(system) = &self.config.system_prompt {
            request = request.with_system(system.clone());
        }
        request
    }

    /// Walk the response blocks in order, calling each requested tool.
    async fn dispatch_round(
        &self,
        response: &CompletionResponse,
        state: &mut RunState,
    ) -> Result<Vec<ContentBlock>> {
        let mut results = Vec::new();

        for block in &response.content {
            match block {
                ContentBlock::Text { text } => state.push_text(text),
                ContentBlock::ToolUse { id, name, input } => {
                    state
                        .segments
                        .push(format!("[Calling tool {} with args {}]", name, input));
                    info!(tool = %name, call_id = %id, round = state.rounds, "Calling tool");

                    let result = self.call_tool(name, input, state).await?;
                    state.tool_calls.push(ToolCall {
                        id: id.clone(),
                        name: name.clone(),
                        arguments: input.clone(),
                    });
                    results.push(ContentBlock::tool_result(
                        id.clone(),
                        result.content,
                        result.is_error,
                    ));
                }
                ContentBlock::ToolResult { tool_use_id, .. } => {
                    debug!(call_id = %tool_use_id, "Ignoring tool result emitted by the model");
                }
            }
        }

        Ok(results)
    }

    async fn call_tool(
        &self,
        name: &str,
        input: &serde_json::Value,
        state: &mut RunState,
    ) -> Result<ToolResult> {
        match self.registry.call_tool(name, input.clone()).await {
            Ok(result) => Ok(result),
            Err(e) if e.is_tool_failure() && self.config.tool_failure == ToolFailurePolicy::Degrade => {
                let reason = failure_reason(&e);
                warn!(tool = %name, error = %reason, "Tool failed; reporting to the model");
                state
                    .segments
                    .push(format!("[Tool {} failed: {}]", name, reason));
                Ok(ToolResult::error(reason))
            }
            Err(e) => {
                warn!(tool = %name, error = %e, fatal = e.is_fatal_to_run(), "Tool failed; aborting run");
                Err(e)
            }
        }
    }
}

fn failure_reason(error: &Error) -> String {
    match error {
        Error::ToolInvocation { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use sid_core::{ActionSignal, ChatMessage, TurnContent};
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    /// Returns queued responses and keeps every request it saw.
    struct ScriptedCompletion {
        responses: Mutex<VecDeque<Result<CompletionResponse>>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedCompletion {
        fn new(responses: Vec<Vec<ContentBlock>>) -> Arc<Self> {
            Self::with_results(responses.into_iter().map(|c| Ok(CompletionResponse::new(c))).collect())
        }

        fn with_results(results: Vec<Result<CompletionResponse>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(results.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionService for ScriptedCompletion {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(Error::internal("no scripted response left")))
        }
    }

    /// In-memory registry; unknown names never reach `dispatched`.
    struct FakeRegistry {
        catalog: Vec<ToolDescriptor>,
        outcomes: Mutex<HashMap<String, Result<ToolResult>>>,
        dispatched: Mutex<Vec<(String, Value)>>,
    }

    impl FakeRegistry {
        fn new() -> Self {
            Self {
                catalog: vec![
                    ToolDescriptor::new("getDatabases", "List databases", json!({"type": "object"})),
                    ToolDescriptor::new(
                        "setSelectedDatabase",
                        "Select a database",
                        json!({"type": "object", "properties": {"database": {"type": "string"}}}),
                    ),
                ],
                outcomes: Mutex::new(HashMap::new()),
                dispatched: Mutex::new(Vec::new()),
            }
        }

        fn returning(self, name: &str, outcome: Result<ToolResult>) -> Arc<Self> {
            self.outcomes.lock().unwrap().insert(name.to_string(), outcome);
            Arc::new(self)
        }

        fn dispatched(&self) -> Vec<(String, Value)> {
            self.dispatched.lock().unwrap().clone()
        }
    }

    fn clone_outcome(outcome: &Result<ToolResult>) -> Result<ToolResult> {
        match outcome {
            Ok(result) => Ok(result.clone()),
            Err(Error::Transport(msg)) => Err(Error::transport(msg.clone())),
            Err(Error::ToolInvocation { tool, message }) => {
                Err(Error::tool_invocation(tool.clone(), message.clone()))
            }
            Err(other) => Err(Error::internal(other.to_string())),
        }
    }

    #[async_trait]
    impl ToolRegistry for FakeRegistry {
        fn tools(&self) -> Vec<ToolDescriptor> {
            self.catalog.clone()
        }

        async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolResult> {
            if !self.catalog.iter().any(|t| t.name == name) {
                return Err(Error::unknown_tool(name));
            }
            self.dispatched
                .lock()
                .unwrap()
                .push((name.to_string(), arguments));
            match self.outcomes.lock().unwrap().get(name) {
                Some(outcome) => clone_outcome(outcome),
                None => Ok(ToolResult::success(json!({"ok": true}))),
            }
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    fn conversation(text: &str) -> Conversation {
        Conversation::from_messages(&[ChatMessage {
            text: text.to_string(),
            is_user: true,
        }])
    }

    fn orchestrator(
        completion: Arc<ScriptedCompletion>,
        registry: Arc<FakeRegistry>,
        config: OrchestratorConfig,
    ) -> Orchestrator {
        Orchestrator::new(completion, registry, config)
    }

    fn last_turn_blocks(request: &CompletionRequest) -> Vec<ContentBlock> {
        request.turns.last().unwrap().content.blocks()
    }

    #[tokio::test]
    async fn test_text_only_response() {
        let completion = ScriptedCompletion::new(vec![vec![
            ContentBlock::text("Hello"),
            ContentBlock::text("there"),
        ]]);
        let registry = Arc::new(FakeRegistry::new());
        let orch = orchestrator(completion.clone(), registry.clone(), OrchestratorConfig::default());

        let result = orch.run(conversation("hi")).await.unwrap();

        assert_eq!(result.final_text, "Hello\nthere");
        assert_eq!(result.side_effect, None);
        assert_eq!(result.rounds, 0);
        assert!(registry.dispatched().is_empty());

        let requests = completion.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].tools.as_ref().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn test_single_tool_call_round_trip() {
        let args = json!({"database": "sales", "limit": 3});
        let completion = ScriptedCompletion::new(vec![
            vec![ContentBlock::tool_use("toolu_1", "setSelectedDatabase", args.clone())],
            vec![ContentBlock::text("Done")],
        ]);
        let registry = FakeRegistry::new()
            .returning("setSelectedDatabase", Ok(ToolResult::success(json!([{"type": "text", "text": "ok"}]))));
        let orch = orchestrator(completion.clone(), registry.clone(), OrchestratorConfig::default());

        let result = orch.run(conversation("use sales")).await.unwrap();

        assert_eq!(registry.dispatched(), vec![("setSelectedDatabase".to_string(), args.clone())]);
        assert_eq!(result.tool_calls.len(), 1);
        assert_eq!(result.rounds, 1);

        let requests = completion.requests();
        assert_eq!(requests.len(), 2);
        let continuation = &requests[1];
        assert_eq!(continuation.turns.len(), 3);
        assert_eq!(
            last_turn_blocks(continuation),
            vec![ContentBlock::tool_result(
                "toolu_1",
                json!([{"type": "text", "text": "ok"}]),
                false
            )]
        );
    }

    #[tokio::test]
    async fn test_list_databases_scenario() {
        let completion = ScriptedCompletion::new(vec![
            vec![
                ContentBlock::text("Sure"),
                ContentBlock::tool_use("toolu_1", "getDatabases", json!({})),
            ],
            vec![ContentBlock::text("Found 2 databases")],
        ]);
        let registry = FakeRegistry::new()
            .returning("getDatabases", Ok(ToolResult::success(json!({"databases": ["a", "b"]}))));
        let orch = orchestrator(completion, registry, OrchestratorConfig::default());

        let result = orch.run(conversation("list dbs")).await.unwrap();

        assert_eq!(
            result.final_text,
            "Sure\n[Calling tool getDatabases with args {}]\nFound 2 databases"
        );
        assert_eq!(result.side_effect, None);
        assert_eq!(result.display_text(), result.final_text);
    }

    #[tokio::test]
    async fn test_change_database_scenario() {
        let completion = ScriptedCompletion::new(vec![
            vec![
                ContentBlock::text("Switching"),
                ContentBlock::tool_use("toolu_1", "setSelectedDatabase", json!({"database": "analytics"})),
            ],
            vec![ContentBlock::text(
                r#"{"action":"CHANGE_DATABASE","database":"analytics","message":"Switched"}"#,
            )],
        ]);
        let registry = Arc::new(FakeRegistry::new());
        let orch = orchestrator(completion, registry, OrchestratorConfig::default());

        let result = orch.run(conversation("use analytics")).await.unwrap();

        assert_eq!(
            result.side_effect,
            Some(ActionSignal::ChangeDatabase {
                database: "analytics".into(),
                message: "Switched".into()
            })
        );
        assert_eq!(result.display_text(), "Switched");

        let wire = serde_json::to_value(result.to_wire()).unwrap();
        assert_eq!(
            wire,
            json!({
                "finalText": "Switched",
                "flags": {"databaseChanged": {"value": true, "database": "analytics"}}
            })
        );
    }

    #[tokio::test]
    async fn test_earlier_directive_does_not_override_final_answer() {
        let completion = ScriptedCompletion::new(vec![
            vec![
                ContentBlock::text(
                    r#"{"action":"CHANGE_DATABASE","database":"sales","message":"Switched"}"#,
                ),
                ContentBlock::tool_use("toolu_1", "setSelectedDatabase", json!({"database": "sales"})),
            ],
            vec![ContentBlock::text("Sorry, the sales database does not exist.")],
        ]);
        let registry = FakeRegistry::new().returning(
            "setSelectedDatabase",
            Err(Error::tool_invocation("setSelectedDatabase", "No such database")),
        );
        let orch = orchestrator(completion, registry, OrchestratorConfig::default());

        let result = orch.run(conversation("use sales")).await.unwrap();

        assert_eq!(result.side_effect, None);
        assert_eq!(result.display_text(), result.final_text);
        assert!(result
            .final_text
            .ends_with("Sorry, the sales database does not exist."));
    }

    #[tokio::test]
    async fn test_blank_text_blocks_are_kept() {
        let completion = ScriptedCompletion::new(vec![vec![
            ContentBlock::text("Hello"),
            ContentBlock::text(" "),
            ContentBlock::text("there"),
        ]]);
        let orch = orchestrator(completion, Arc::new(FakeRegistry::new()), OrchestratorConfig::default());

        let result = orch.run(conversation("hi")).await.unwrap();
        assert_eq!(result.final_text, "Hello\n \nthere");
    }

    #[tokio::test]
    async fn test_unknown_tool_degrades() {
        let completion = ScriptedCompletion::new(vec![
            vec![ContentBlock::tool_use("toolu_1", "dropTables", json!({}))],
            vec![ContentBlock::text("I cannot do that")],
        ]);
        let registry = Arc::new(FakeRegistry::new());
        let orch = orchestrator(completion.clone(), registry.clone(), OrchestratorConfig::default());

        let result = orch.run(conversation("drop everything")).await.unwrap();

        assert!(registry.dispatched().is_empty());
        assert!(result
            .final_text
            .contains("[Tool dropTables failed: Unknown tool: dropTables]"));
        assert!(result.final_text.ends_with("I cannot do that"));

        let requests = completion.requests();
        match &last_turn_blocks(&requests[1])[0] {
            ContentBlock::ToolResult { tool_use_id, content, is_error } => {
                assert_eq!(tool_use_id, "toolu_1");
                assert!(*is_error);
                assert_eq!(content["error"], "Unknown tool: dropTables");
            }
            other => panic!("unexpected block: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_tool_aborts_under_abort_policy() {
        let completion = ScriptedCompletion::new(vec![vec![ContentBlock::tool_use(
            "toolu_1",
            "dropTables",
            json!({}),
        )]]);
        let registry = Arc::new(FakeRegistry::new());
        let config = OrchestratorConfig::default().with_tool_failure(ToolFailurePolicy::Abort);
        let orch = orchestrator(completion.clone(), registry.clone(), config);

        let err = orch.run(conversation("drop")).await.unwrap_err();

        assert!(matches!(err, Error::UnknownTool(name) if name == "dropTables"));
        assert!(registry.dispatched().is_empty());
        assert_eq!(completion.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_tool_invocation_error_is_reported_to_model() {
        let completion = ScriptedCompletion::new(vec![
            vec![ContentBlock::tool_use("toolu_1", "setSelectedDatabase", json!({"database": "x"}))],
            vec![ContentBlock::text("That database does not exist")],
        ]);
        let registry = FakeRegistry::new().returning(
            "setSelectedDatabase",
            Err(Error::tool_invocation("setSelectedDatabase", "No such database")),
        );
        let orch = orchestrator(completion.clone(), registry, OrchestratorConfig::default());

        let result = orch.run(conversation("use x")).await.unwrap();

        assert!(result
            .final_text
            .contains("[Tool setSelectedDatabase failed: No such database]"));
        let requests = completion.requests();
        assert_eq!(
            last_turn_blocks(&requests[1]),
            vec![ContentBlock::tool_result(
                "toolu_1",
                json!({"error": "No such database"}),
                true
            )]
        );
    }

    #[tokio::test]
    async fn test_transport_failure_always_aborts() {
        let completion = ScriptedCompletion::new(vec![vec![ContentBlock::tool_use(
            "toolu_1",
            "getDatabases",
            json!({}),
        )]]);
        let registry = FakeRegistry::new()
            .returning("getDatabases", Err(Error::transport("tool host exited")));
        let orch = orchestrator(completion.clone(), registry, OrchestratorConfig::default());

        let err = orch.run(conversation("list dbs")).await.unwrap_err();

        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(completion.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_round_limit_stops_dispatch() {
        let call = |id: &str| vec![ContentBlock::tool_use(id, "getDatabases", json!({}))];
        let completion = ScriptedCompletion::new(vec![
            call("toolu_1"),
            call("toolu_2"),
            vec![ContentBlock::text("still thinking"), ContentBlock::tool_use("toolu_3", "getDatabases", json!({}))],
        ]);
        let registry = Arc::new(FakeRegistry::new());
        let config = OrchestratorConfig::default().with_max_rounds(2);
        let orch = orchestrator(completion.clone(), registry.clone(), config);

        let result = orch.run(conversation("loop")).await.unwrap();

        assert_eq!(completion.requests().len(), 3);
        assert_eq!(registry.dispatched().len(), 2);
        assert_eq!(result.rounds, 2);
        assert!(result.final_text.ends_with("still thinking"));
    }

    #[tokio::test]
    async fn test_single_round_mode_without_continuation_catalog() {
        let completion = ScriptedCompletion::new(vec![
            vec![ContentBlock::tool_use("toolu_1", "getDatabases", json!({}))],
            vec![
                ContentBlock::text("Found them"),
                ContentBlock::tool_use("toolu_2", "getDatabases", json!({})),
            ],
        ]);
        let registry = Arc::new(FakeRegistry::new());
        let config = OrchestratorConfig::default()
            .with_max_rounds(1)
            .with_catalog_on_continuation(false);
        let orch = orchestrator(completion.clone(), registry.clone(), config);

        let result = orch.run(conversation("list dbs")).await.unwrap();

        assert_eq!(registry.dispatched().len(), 1);
        assert!(result.final_text.ends_with("Found them"));
        let requests = completion.requests();
        assert!(requests[0].tools.is_some());
        assert!(requests[1].tools.is_none());
    }

    #[tokio::test]
    async fn test_tool_calls_run_in_emitted_order() {
        let completion = ScriptedCompletion::new(vec![
            vec![
                ContentBlock::tool_use("toolu_a", "setSelectedDatabase", json!({"database": "a"})),
                ContentBlock::tool_use("toolu_b", "getDatabases", json!({})),
            ],
            vec![ContentBlock::text("ok")],
        ]);
        let registry = Arc::new(FakeRegistry::new());
        let orch = orchestrator(completion.clone(), registry.clone(), OrchestratorConfig::default());

        orch.run(conversation("go")).await.unwrap();

        let names: Vec<String> = registry.dispatched().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["setSelectedDatabase", "getDatabases"]);

        // One assistant turn, then one user turn with both results.
        let continuation = &completion.requests()[1];
        let results = last_turn_blocks(continuation);
        assert_eq!(results.len(), 2);
        assert!(matches!(&results[0], ContentBlock::ToolResult { tool_use_id, .. } if tool_use_id == "toolu_a"));
        assert!(matches!(&results[1], ContentBlock::ToolResult { tool_use_id, .. } if tool_use_id == "toolu_b"));
        assert!(matches!(
            continuation.turns[1].content,
            TurnContent::Blocks(ref blocks) if blocks.len() == 2
        ));
    }

    #[tokio::test]
    async fn test_completion_errors_propagate() {
        let completion = ScriptedCompletion::with_results(vec![Err(Error::rate_limited("slow down", None))]);
        let orch = orchestrator(completion, Arc::new(FakeRegistry::new()), OrchestratorConfig::default());

        let err = orch.run(conversation("hi")).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_empty_conversation_is_rejected() {
        let completion = ScriptedCompletion::new(vec![]);
        let orch = orchestrator(completion.clone(), Arc::new(FakeRegistry::new()), OrchestratorConfig::default());

        let err = orch.run(Conversation::new()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(completion.requests().is_empty());
    }

    #[tokio::test]
    async fn test_system_prompt_is_forwarded() {
        let completion = ScriptedCompletion::new(vec![vec![ContentBlock::text("hi")]]);
        let config = OrchestratorConfig::default().with_system_prompt("You manage databases.");
        let orch = orchestrator(completion.clone(), Arc::new(FakeRegistry::new()), config);

        orch.run(conversation("hello")).await.unwrap();
        assert_eq!(
            completion.requests()[0].system.as_deref(),
            Some("You manage databases.")
        );
    }
}
