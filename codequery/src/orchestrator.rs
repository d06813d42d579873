//! One request/response cycle: classify, analyze, format, remember.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;
use uuid::Uuid;

use crate::analysis::AnalysisInvoker;
use crate::formatter::ResponseFormatter;
use crate::memory::{SessionId, SessionStore};
use crate::models::{QueryResult, Role};

/// Runs queries end to end. This is what chat handlers and the HTTP API call.
pub struct QueryOrchestrator {
    invoker: Arc<AnalysisInvoker>,
    formatter: Arc<ResponseFormatter>,
    memory: Arc<SessionStore>,
}

impl QueryOrchestrator {
    pub const fn new(
        invoker: Arc<AnalysisInvoker>,
        formatter: Arc<ResponseFormatter>,
        memory: Arc<SessionStore>,
    ) -> Self {
        Self {
            invoker,
            formatter,
            memory,
        }
    }

    pub fn memory(&self) -> &SessionStore {
        &self.memory
    }

    /// Answer `query` about `repository_path`.
    ///
    /// With a session, the history read before this query is passed to both
    /// the analysis tool and the formatter, the user turn is recorded, and the
    /// assistant turn is recorded only on success. No retries.
    pub async fn run(
        &self,
        query: &str,
        repository_path: &Path,
        timeout: Duration,
        session: Option<&SessionId>,
    ) -> QueryResult {
        let request_id = Uuid::now_v7();
        let span = tracing::info_span!(
            "query",
            %request_id,
            session = session.map_or("-", SessionId::as_str)
        );
        self.run_inner(query, repository_path, timeout, session)
            .instrument(span)
            .await
    }

    async fn run_inner(
        &self,
        query: &str,
        repository_path: &Path,
        timeout: Duration,
        session: Option<&SessionId>,
    ) -> QueryResult {
        let context = session
            .map(|id| self.memory.get_formatted_context(id))
            .filter(|c| !c.is_empty());

        if let Some(id) = session {
            self.memory.add_message(id, Role::User, query);
        }

        let analysis = match self
            .invoker
            .invoke(query, repository_path, timeout, context.as_deref())
            .await
        {
            Ok(analysis) => analysis,
            Err(e) => {
                if e.is_timeout() {
                    tracing::warn!(elapsed_ms = e.elapsed_ms(), "Query timed out");
                } else {
                    tracing::error!("Query failed: {e}");
                }
                return QueryResult::failed(e.to_string(), e.elapsed_ms());
            }
        };

        let response = self
            .formatter
            .format(&analysis.raw_text, query, context.as_deref(), analysis.mode)
            .await;

        if let Some(id) = session {
            self.memory.add_message(id, Role::Assistant, &response);
        }

        tracing::info!(
            mode = %analysis.mode,
            execution_time_ms = analysis.execution_time_ms,
            "Query answered"
        );
        QueryResult::ok(response, analysis.execution_time_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysisConfig;
    use crate::formatter::FORMATTING_UNAVAILABLE_NOTE;
    use crate::models::Mode;
    use crate::testing::{fake_tool, CountingProtector, FakeCompletion, FakeTool};

    fn orchestrator(tool: &FakeTool, completion: Arc<FakeCompletion>) -> (QueryOrchestrator, Arc<CountingProtector>) {
        let protector = Arc::new(CountingProtector::default());
        let invoker = AnalysisInvoker::new(AnalysisConfig {
            tool: tool.path.to_string_lossy().into_owned(),
            model: "test-model".into(),
            enforce_read_only: true,
        })
        .with_protector(protector.clone());
        let formatter = ResponseFormatter::new(completion, "test-completion");
        let orchestrator = QueryOrchestrator::new(
            Arc::new(invoker),
            Arc::new(formatter),
            Arc::new(SessionStore::new(10)),
        );
        (orchestrator, protector)
    }

    /// Writes a fix guide the way the model would, quoting the analysis.
    fn fix_guide_writer(prompt: &str) -> String {
        let analysis = prompt
            .split("The codebase query tool returned the following response:\n\n")
            .nth(1)
            .and_then(|rest| rest.split("\n\n").next())
            .unwrap_or_default();
        format!(
            "Fix Steps:\n1. Guard against the null value.\n\n\
             Files and Functions:\n{analysis} - where the crash starts\n\n\
             Checklist:\n- Re-run checkout tests"
        )
    }

    #[tokio::test]
    async fn oncall_query_end_to_end() {
        let repo = tempfile::tempdir().unwrap();
        let tool = fake_tool("echo 'NullPointer in checkout.process()'");
        let completion = Arc::new(FakeCompletion::new(|prompt| Ok(Some(fix_guide_writer(prompt)))));
        let (orchestrator, protector) = orchestrator(&tool, completion.clone());

        let result = orchestrator
            .run("fix the checkout crash", repo.path(), Duration::from_secs(10), None)
            .await;

        assert!(result.success, "{result:?}");
        let response = result.response.unwrap();
        assert!(response.contains("Fix Steps:"));
        assert!(response.contains("Files and Functions:"));
        assert!(response.contains("Checklist:"));
        assert!(response.contains("checkout.process()"));

        // The on-call framing reached both the tool and the formatter
        let args = tool.recorded_args();
        assert!(args.last().unwrap().starts_with("You are helping an on-call developer"));
        let prompt = &completion.prompts()[0];
        assert!(prompt.contains("Fix Steps:"));
        assert!(prompt.contains("NullPointer in checkout.process()"));
        assert_eq!(crate::intent::classify("fix the checkout crash"), Mode::Oncall);

        assert_eq!(protector.restores(), 1);
    }

    #[tokio::test]
    async fn formatting_failure_still_succeeds() {
        let repo = tempfile::tempdir().unwrap();
        let tool = fake_tool(r#"echo '{"response":"Billing charges cards."}'"#);
        let (orchestrator, _) = orchestrator(&tool, Arc::new(FakeCompletion::failing()));
        let session = SessionId::new("C1", Some("1.0"), None);

        let result = orchestrator
            .run("what does billing do", repo.path(), Duration::from_secs(10), Some(&session))
            .await;

        assert!(result.success);
        assert_eq!(
            result.response.as_deref(),
            Some(format!("Billing charges cards.{FORMATTING_UNAVAILABLE_NOTE}").as_str())
        );
        assert_eq!(orchestrator.memory().turn_count(&session), 2);
    }

    #[tokio::test]
    async fn second_query_sees_first_exchange() {
        let repo = tempfile::tempdir().unwrap();
        let tool = fake_tool("echo 'raw answer'");
        let completion = Arc::new(FakeCompletion::replying("formatted answer"));
        let (orchestrator, _) = orchestrator(&tool, completion.clone());
        let session = SessionId::new("C1", Some("1.0"), None);

        orchestrator
            .run("what does billing do", repo.path(), Duration::from_secs(10), Some(&session))
            .await;
        let first_args = tool.recorded_args();
        assert!(!first_args.last().unwrap().contains("Conversation history"));

        orchestrator
            .run("and refunds?", repo.path(), Duration::from_secs(10), Some(&session))
            .await;

        let expected = "User: what does billing do\nAssistant: formatted answer";
        let enhanced = tool.recorded_args().last().unwrap().clone();
        assert!(enhanced.contains(expected));
        assert_eq!(enhanced.matches("User:").count(), 1);
        assert_eq!(enhanced.matches("Assistant:").count(), 1);

        let second_prompt = &completion.prompts()[1];
        assert!(second_prompt.contains(expected));
        assert_eq!(second_prompt.matches("User:").count(), 1);
        assert_eq!(second_prompt.matches("Assistant:").count(), 1);

        assert_eq!(orchestrator.memory().turn_count(&session), 4);
    }

    #[tokio::test]
    async fn analysis_failure_records_only_user_turn() {
        let repo = tempfile::tempdir().unwrap();
        let tool = fake_tool("echo 'rate limited' >&2; exit 1");
        let completion = Arc::new(FakeCompletion::replying("unused"));
        let (orchestrator, protector) = orchestrator(&tool, completion.clone());
        let session = SessionId::new("C1", None, None);

        let result = orchestrator
            .run("what is this", repo.path(), Duration::from_secs(10), Some(&session))
            .await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("rate limited"));
        assert!(result.response.is_none());
        assert!(completion.prompts().is_empty());

        let turns = orchestrator.memory().get_context(&session);
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(protector.restores(), 1);
    }

    #[tokio::test]
    async fn timeout_surfaces_as_error_with_limit() {
        let repo = tempfile::tempdir().unwrap();
        let tool = fake_tool("exec sleep 30");
        let (orchestrator, protector) = orchestrator(&tool, Arc::new(FakeCompletion::replying("unused")));

        let result = orchestrator
            .run("what is this", repo.path(), Duration::from_millis(200), None)
            .await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Query timeout after 200ms"));
        assert!(result.execution_time_ms >= 200);
        assert_eq!(protector.restores(), 1);
    }
}
