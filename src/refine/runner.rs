//! Refine loop runner - drives LoopState through generate, evaluate, rewrite.
//!
//! Each iteration:
//! 1. Sends the current prompt to the task model
//! 2. Scores the response with the evaluator
//! 3. On success or budget exhaustion: stops
//! 4. Otherwise asks the meta model for a new prompt and repeats

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{RefinrError, Result};
use crate::llm::{CallSettings, InferenceCaller, LlmClient, RetryPolicy};
use crate::rewrite::PromptRewriter;
use crate::rubric::{Evaluator, Rubric};

use super::state::{Event, LoopOutcome, LoopState, Phase};

/// Default iteration budget
pub const DEFAULT_MAX_ITERATIONS: u32 = 4;

/// Longest response excerpt written to the log
const LOG_EXCERPT_CHARS: usize = 3000;

/// Everything the loop needs besides the client
#[derive(Debug, Clone)]
pub struct RefineSettings {
    pub task: CallSettings,
    pub meta: CallSettings,
    pub max_iterations: u32,
    pub retry: RetryPolicy,
    pub rubric: Rubric,
}

impl Default for RefineSettings {
    fn default() -> Self {
        Self {
            task: CallSettings {
                model: "llama3.3-70b-instruct".to_string(),
                system: "You are a helpful market-research assistant.".to_string(),
                temperature: 0.2,
                max_tokens: 700,
            },
            meta: CallSettings {
                model: "llama3.3-70b-instruct".to_string(),
                system: "You rewrite prompts to improve LLM output quality.".to_string(),
                temperature: 0.0,
                max_tokens: 300,
            },
            max_iterations: DEFAULT_MAX_ITERATIONS,
            retry: RetryPolicy::default(),
            rubric: Rubric::market_research(),
        }
    }
}

/// Generate-check-refine loop over an explicit client
pub struct RefineLoop {
    caller: InferenceCaller,
    task: CallSettings,
    evaluator: Arc<dyn Evaluator>,
    rewriter: PromptRewriter,
    max_iterations: u32,
}

impl RefineLoop {
    /// Build a loop; task and meta calls share `client`
    pub fn new(client: Arc<dyn LlmClient>, settings: RefineSettings) -> Self {
        let caller = InferenceCaller::new(client, settings.retry);
        let evaluator: Arc<dyn Evaluator> = Arc::new(settings.rubric.clone());
        let rewriter = PromptRewriter::new(caller.clone(), settings.meta, settings.rubric);

        Self {
            caller,
            task: settings.task,
            evaluator,
            rewriter,
            max_iterations: settings.max_iterations,
        }
    }

    /// Replace the evaluator (the rubric still supplies rewrite hints)
    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Run to completion
    pub async fn run(&self, initial_prompt: &str, max_iterations: Option<u32>) -> Result<LoopOutcome> {
        self.run_with_cancel(initial_prompt, max_iterations, &CancellationToken::new())
            .await
    }

    /// Run until success, budget exhaustion, or cancellation
    pub async fn run_with_cancel(
        &self,
        initial_prompt: &str,
        max_iterations: Option<u32>,
        cancel: &CancellationToken,
    ) -> Result<LoopOutcome> {
        if initial_prompt.trim().is_empty() {
            return Err(RefinrError::EmptyPrompt);
        }

        let budget = max_iterations.unwrap_or(self.max_iterations);
        if budget == 0 {
            return Err(RefinrError::InvalidConfig("max_iterations must be at least 1".to_string()));
        }

        let mut state = LoopState::new(initial_prompt, budget);

        loop {
            if cancel.is_cancelled() {
                log::info!("Refine loop cancelled at iteration {} ({})", state.iteration(), state.phase());
                return Err(RefinrError::Cancelled);
            }

            let event = match state.phase() {
                Phase::Generating => {
                    log::info!("Iteration {}: sending prompt to {}", state.iteration() + 1, self.task.model);
                    log::debug!("Prompt:\n{}", state.prompt());
                    let completion = self.caller.call(&self.task, state.prompt(), cancel).await?;
                    if completion.is_degraded() {
                        log::warn!(
                            "Iteration {} response is not model text ({:?})",
                            state.iteration() + 1,
                            completion.source
                        );
                    }
                    log::debug!("Response:\n{}", excerpt(&completion.text));
                    Event::Generated(completion)
                }
                Phase::Evaluating => {
                    let checks = self.evaluator.evaluate(state.response());
                    log::info!("Iteration {} checks: {}", state.iteration(), checks);
                    Event::Evaluated(checks)
                }
                Phase::Rewriting => {
                    let completion = self
                        .rewriter
                        .rewrite(state.prompt(), state.response(), state.checks(), cancel)
                        .await?;
                    log::debug!("Rewritten prompt:\n{}", completion.text);
                    Event::Rewritten(completion)
                }
                Phase::Succeeded => {
                    log::info!("Response accepted after {} iteration(s)", state.iteration());
                    return state.into_outcome();
                }
                Phase::Exhausted => {
                    log::info!(
                        "Max iterations ({}) reached; returning last response (may be incomplete)",
                        state.max_iterations()
                    );
                    return state.into_outcome();
                }
            };

            state.apply(event)?;
        }
    }
}

fn excerpt(text: &str) -> &str {
    match text.char_indices().nth(LOG_EXCERPT_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{CompletionRequest, CompletionResponse, LlmError, MockLlmClient};
    use crate::refine::OutcomeStatus;
    use async_trait::async_trait;
    use std::time::Duration;
    use crate::rubric::EvaluationResult;
    use std::sync::atomic::{AtomicU32, Ordering};

    const FULL: &str =
        "Top 3 trends: A, B, C. Competitor analysis: X. Actionable insight: do Y. Sources: reports.";

    /// Evaluator that passes on a chosen call number (0 = never)
    struct PassOnNth {
        calls: AtomicU32,
        pass_on: u32,
    }

    impl PassOnNth {
        fn new(pass_on: u32) -> Self {
            Self {
                calls: AtomicU32::new(0),
                pass_on,
            }
        }
    }

    impl Evaluator for PassOnNth {
        fn evaluate(&self, _response: &str) -> EvaluationResult {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            EvaluationResult::from_pairs([("Sources", n == self.pass_on)])
        }
    }

    fn fast_settings() -> RefineSettings {
        RefineSettings {
            retry: RetryPolicy::none(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_settings() {
        let settings = RefineSettings::default();
        assert_eq!(settings.max_iterations, 4);
        assert_eq!(settings.task.temperature, 0.2);
        assert_eq!(settings.task.max_tokens, 700);
        assert_eq!(settings.meta.temperature, 0.0);
        assert_eq!(settings.meta.max_tokens, 300);
        assert_eq!(settings.rubric.items().len(), 4);
    }

    #[tokio::test]
    async fn test_first_try_success_makes_no_rewrite() {
        let mock = Arc::new(MockLlmClient::with_texts([FULL]));
        let refine = RefineLoop::new(mock.clone(), fast_settings());

        let outcome = refine.run("Write a brief", None).await.unwrap();

        assert_eq!(outcome.status, OutcomeStatus::Succeeded);
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.response, FULL);
        assert!(outcome.checks.passed());
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_success_on_kth_iteration() {
        // gen, rewrite, gen, rewrite, gen
        let mock = Arc::new(MockLlmClient::with_texts(["r1", "p2", "r2", "p3", "r3"]));
        let refine = RefineLoop::new(mock.clone(), fast_settings()).with_evaluator(Arc::new(PassOnNth::new(3)));

        let outcome = refine.run("start", None).await.unwrap();

        assert!(outcome.succeeded());
        assert_eq!(outcome.iterations, 3);
        assert_eq!(outcome.response, "r3");
        assert_eq!(mock.call_count(), 5);
        assert_eq!(mock.remaining(), 0);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_final_generation() {
        let mock = Arc::new(MockLlmClient::with_texts(["r1", "p2", "r2", "p3", "r3", "p4", "r4", "spare"]));
        let refine = RefineLoop::new(mock.clone(), fast_settings()).with_evaluator(Arc::new(PassOnNth::new(0)));

        let outcome = refine.run("start", None).await.unwrap();

        assert_eq!(outcome.status, OutcomeStatus::Exhausted);
        assert_eq!(outcome.iterations, 4);
        assert_eq!(outcome.response, "r4");
        assert!(!outcome.checks.passed());
        // 2 * MAX_ITERS - 1 calls, no rewrite after the last generation
        assert_eq!(mock.call_count(), 7);
        assert_eq!(mock.remaining(), 1);
    }

    #[tokio::test]
    async fn test_iteration_override() {
        let mock = Arc::new(MockLlmClient::with_texts(["r1", "p2", "r2"]));
        let refine = RefineLoop::new(mock.clone(), fast_settings()).with_evaluator(Arc::new(PassOnNth::new(0)));

        let outcome = refine.run("start", Some(2)).await.unwrap();

        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.response, "r2");
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_rewritten_prompt_is_sent_next() {
        let mock = Arc::new(MockLlmClient::with_texts(["nothing useful", "  improved prompt  ", FULL]));
        let refine = RefineLoop::new(mock.clone(), fast_settings());

        let outcome = refine.run("start", None).await.unwrap();
        assert_eq!(outcome.iterations, 2);

        let requests = mock.requests();
        assert_eq!(requests[0].user_prompt(), Some("start"));
        assert_eq!(requests[0].model, "llama3.3-70b-instruct");
        assert_eq!(requests[1].temperature, 0.0);
        assert_eq!(requests[2].user_prompt(), Some("improved prompt"));
        assert_eq!(outcome.history[1].prompt, "improved prompt");
    }

    #[tokio::test]
    async fn test_empty_prompt_rejected() {
        let mock = Arc::new(MockLlmClient::new());
        let refine = RefineLoop::new(mock.clone(), fast_settings());

        let result = refine.run("   ", None).await;

        assert!(matches!(result, Err(RefinrError::EmptyPrompt)));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_zero_budget_rejected() {
        let mock = Arc::new(MockLlmClient::new());
        let refine = RefineLoop::new(mock.clone(), fast_settings());

        let result = refine.run("start", Some(0)).await;

        assert!(matches!(result, Err(RefinrError::InvalidConfig(_))));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_before_any_call() {
        let mock = Arc::new(MockLlmClient::with_texts([FULL]));
        let refine = RefineLoop::new(mock.clone(), fast_settings());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = refine.run_with_cancel("start", None, &cancel).await;

        assert!(matches!(result, Err(RefinrError::Cancelled)));
        assert_eq!(mock.call_count(), 0);
    }

    /// Answers the first request, then never completes another
    struct StallAfterFirst {
        inner: MockLlmClient,
    }

    #[async_trait]
    impl LlmClient for StallAfterFirst {
        async fn complete(&self, request: CompletionRequest) -> std::result::Result<CompletionResponse, LlmError> {
            if self.inner.call_count() == 0 {
                return self.inner.complete(request).await;
            }
            std::future::pending().await
        }

        fn name(&self) -> &str {
            "stall"
        }
    }

    #[tokio::test]
    async fn test_cancel_during_rewrite_call() {
        let client = Arc::new(StallAfterFirst {
            inner: MockLlmClient::with_texts(["bare answer"]),
        });
        let refine = RefineLoop::new(client.clone(), fast_settings());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(Duration::from_secs(2), refine.run_with_cancel("start", None, &cancel))
            .await
            .expect("cancellation should end the loop");

        assert!(matches!(result, Err(RefinrError::Cancelled)));
        assert_eq!(client.inner.call_count(), 1);
    }

    #[test]
    fn test_excerpt_bounds() {
        assert_eq!(excerpt("short"), "short");
        let long = "é".repeat(LOG_EXCERPT_CHARS + 10);
        assert_eq!(excerpt(&long).chars().count(), LOG_EXCERPT_CHARS);
    }
}
