//! Prompt rewriter - asks the meta model for a better prompt.

use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::llm::{CallSettings, Completion, InferenceCaller};
use crate::rubric::{EvaluationResult, Rubric};

/// Requested upper bound on the rewritten prompt; not enforced locally
pub const MAX_PROMPT_WORDS: usize = 120;

/// Build the instruction sent to the meta model
///
/// Only failed items are listed, each with its rubric hint when one exists.
pub fn build_instruction(original_prompt: &str, response: &str, checks: &EvaluationResult, rubric: &Rubric) -> String {
    let failed = checks.failed();
    let missing = if failed.is_empty() {
        "none".to_string()
    } else {
        failed.join(", ")
    };

    let mut instruction = format!(
        "You are a prompt-writing assistant. The ORIGINAL_PROMPT and RESPONSE are below.\n\n\
         Produce ONLY an improved prompt (<= {} words) that will make the task model include the \
         missing sections. Keep it concise and preserve the user's original intent.\n\n\
         ORIGINAL_PROMPT:\n{}\n\n\
         RESPONSE:\n{}\n\n\
         MISSING_OR_INCOMPLETE_SECTIONS:\n{}\n\n",
        MAX_PROMPT_WORDS, original_prompt, response, missing
    );

    let guidance: Vec<String> = failed
        .iter()
        .filter_map(|name| rubric.hint(name).map(|hint| format!("- If {} missing, ask: '{}'", name, hint)))
        .collect();
    if !guidance.is_empty() {
        instruction.push_str("Guidance:\n");
        instruction.push_str(&guidance.join("\n"));
        instruction.push('\n');
    }

    instruction.push_str("Return ONLY the improved prompt text (no commentary).");
    instruction
}

/// Rewrites prompts through the meta model
pub struct PromptRewriter {
    caller: InferenceCaller,
    settings: CallSettings,
    rubric: Rubric,
}

impl PromptRewriter {
    pub fn new(caller: InferenceCaller, settings: CallSettings, rubric: Rubric) -> Self {
        Self {
            caller,
            settings,
            rubric,
        }
    }

    /// Produce the next prompt; the returned text is trimmed
    pub async fn rewrite(
        &self,
        original_prompt: &str,
        response: &str,
        checks: &EvaluationResult,
        cancel: &CancellationToken,
    ) -> Result<Completion> {
        let instruction = build_instruction(original_prompt, response, checks, &self.rubric);
        log::info!(
            "Rewriting prompt with {} for missing: {}",
            self.settings.model,
            checks.failed().join(", ")
        );

        let mut completion = self.caller.call(&self.settings, &instruction, cancel).await?;
        completion.text = completion.text.trim().to_string();
        Ok(completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockLlmClient, RetryPolicy, TextSource};
    use crate::rubric::Evaluator;
    use serde_json::json;
    use std::sync::Arc;

    fn meta_settings() -> CallSettings {
        CallSettings {
            model: "meta-model".to_string(),
            system: "You rewrite prompts to improve LLM output quality.".to_string(),
            temperature: 0.0,
            max_tokens: 300,
        }
    }

    #[test]
    fn test_instruction_lists_only_failed_items() {
        let rubric = Rubric::market_research();
        let checks = rubric.evaluate("Top 3 trends: a, b, c. Sources: reports.");
        let instruction = build_instruction("Write a brief", "Top 3 trends...", &checks, &rubric);

        assert!(instruction.contains("ORIGINAL_PROMPT:\nWrite a brief"));
        assert!(instruction.contains("RESPONSE:\nTop 3 trends..."));
        assert!(instruction.contains("MISSING_OR_INCOMPLETE_SECTIONS:\nCompetitor analysis, Actionable insight"));
        assert!(instruction.contains(
            "- If Competitor analysis missing, ask: 'Include competitor analysis (3 competitors, 1-line each).'"
        ));
        assert!(instruction.contains("- If Actionable insight missing, ask:"));
        assert!(!instruction.contains("- If Top 3 trends missing"));
        assert!(!instruction.contains("- If Sources missing"));
        assert!(instruction.ends_with("Return ONLY the improved prompt text (no commentary)."));
    }

    #[test]
    fn test_instruction_with_nothing_missing() {
        let rubric = Rubric::market_research();
        let checks = EvaluationResult::from_pairs([("Top 3 trends", true)]);
        let instruction = build_instruction("p", "r", &checks, &rubric);

        assert!(instruction.contains("MISSING_OR_INCOMPLETE_SECTIONS:\nnone"));
        assert!(!instruction.contains("Guidance:"));
    }

    #[test]
    fn test_instruction_requests_word_limit() {
        let rubric = Rubric::market_research();
        let checks = rubric.evaluate("");
        let instruction = build_instruction("p", "r", &checks, &rubric);
        assert!(instruction.contains("(<= 120 words)"));
    }

    #[tokio::test]
    async fn test_rewrite_trims_and_uses_meta_settings() {
        let mock = Arc::new(MockLlmClient::with_texts(["  \n Better prompt: include sources.\n "]));
        let caller = InferenceCaller::new(mock.clone(), RetryPolicy::none());
        let rewriter = PromptRewriter::new(caller, meta_settings(), Rubric::market_research());
        let checks = Rubric::market_research().evaluate("nothing");

        let completion = rewriter
            .rewrite("Write a brief", "nothing", &checks, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(completion.text, "Better prompt: include sources.");

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "meta-model");
        assert_eq!(requests[0].temperature, 0.0);
        assert_eq!(requests[0].max_tokens, 300);
        assert!(requests[0].user_prompt().unwrap().contains("Write a brief"));
    }

    #[tokio::test]
    async fn test_rewrite_malformed_reply_becomes_prompt() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_body(json!({ "detail": "gateway confused" }));
        let caller = InferenceCaller::new(mock, RetryPolicy::none());
        let rewriter = PromptRewriter::new(caller, meta_settings(), Rubric::market_research());
        let checks = Rubric::market_research().evaluate("nothing");

        let completion = rewriter
            .rewrite("p", "nothing", &checks, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(completion.source, TextSource::Stringified);
        assert_eq!(completion.text, r#"{"detail":"gateway confused"}"#);
    }
}
