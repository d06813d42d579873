//! Analysis CLI process spawning.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::error::AnalysisError;
use super::guard::{ChmodProtector, PathLocks, WriteGuard, WriteProtector};
use super::output::extract_response;
use crate::intent::classify;
use crate::models::Mode;
use crate::process::{spawn_process, ProcessOptions};

/// Analysis CLI used when none is configured.
pub const DEFAULT_TOOL: &str = "cursor-agent";

/// Model id passed to the analysis CLI when none is configured.
pub const DEFAULT_ANALYSIS_MODEL: &str = "auto";

/// How to run the analysis tool.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Program name or path of the analysis CLI.
    pub tool: String,
    /// Model identifier forwarded via `--model`.
    pub model: String,
    /// Strip write permission from the repository while the tool runs.
    pub enforce_read_only: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            tool: DEFAULT_TOOL.to_string(),
            model: DEFAULT_ANALYSIS_MODEL.to_string(),
            enforce_read_only: true,
        }
    }
}

/// Raw, not yet audience-formatted, answer from the analysis tool.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub raw_text: String,
    /// Mode the query was classified as; reused by the formatter.
    pub mode: Mode,
    pub execution_time_ms: u64,
}

/// Runs the analysis CLI against a repository.
pub struct AnalysisInvoker {
    config: AnalysisConfig,
    protector: Arc<dyn WriteProtector>,
    locks: PathLocks,
}

impl AnalysisInvoker {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            protector: Arc::new(ChmodProtector),
            locks: PathLocks::default(),
        }
    }

    /// Replace the filesystem protector.
    #[cfg(test)]
    #[must_use]
    pub fn with_protector(mut self, protector: Arc<dyn WriteProtector>) -> Self {
        self.protector = protector;
        self
    }

    /// Build the process invocation.
    ///
    /// This runs the analysis CLI with the following arguments:
    /// `<tool> --print --output-format json --model <model> --workspace <repo> <query>`
    ///
    /// The query always travels as a single argv element.
    pub fn command(&self, repository_path: &Path, enhanced_query: &str) -> ProcessOptions {
        ProcessOptions::new(&self.config.tool)
            .arg("--print")
            .args(["--output-format", "json"])
            .arg("--model")
            .arg(&self.config.model)
            .arg("--workspace")
            .arg(repository_path.to_string_lossy())
            .arg(enhanced_query)
            .working_dir(repository_path)
    }

    /// Ask the analysis tool a question about `repository_path`.
    ///
    /// Invocations on the same path are serialized. Write permission, if
    /// enforcement is on, is restored before this returns on every path.
    pub async fn invoke(
        &self,
        query: &str,
        repository_path: &Path,
        timeout: Duration,
        conversation_context: Option<&str>,
    ) -> Result<Analysis, AnalysisError> {
        let started = Instant::now();

        // Held until after the restore below, so another query can't start
        // on this path while it is still read-only from ours.
        let _path_lock = self.locks.lock(repository_path).await;
        let protection = if self.config.enforce_read_only {
            Some(WriteGuard::acquire(self.protector.clone(), repository_path).await)
        } else {
            None
        };

        let outcome = self
            .run_tool(query, repository_path, timeout, conversation_context, started)
            .await;

        if let Some(guard) = protection {
            guard.release().await;
        }
        outcome
    }

    async fn run_tool(
        &self,
        query: &str,
        repository_path: &Path,
        timeout: Duration,
        conversation_context: Option<&str>,
        started: Instant,
    ) -> Result<Analysis, AnalysisError> {
        let mode = classify(query);
        let enhanced_query = enhance_query(query, mode, conversation_context);
        let timeout_ms = millis(timeout);

        tracing::info!(
            tool = %self.config.tool,
            %mode,
            timeout_ms,
            repository = %repository_path.display(),
            "Running analysis"
        );

        let options = self
            .command(repository_path, &enhanced_query)
            .timeout(timeout);
        let result = match spawn_process(options).await {
            Ok(result) => result,
            Err(e) => {
                return Err(AnalysisError::Unexpected {
                    tool: self.config.tool.clone(),
                    message: format!("{e:#}"),
                    elapsed_ms: millis(started.elapsed()),
                });
            }
        };
        let elapsed_ms = millis(started.elapsed());

        if result.timed_out {
            tracing::warn!(timeout_ms, elapsed_ms, "Analysis timed out, process killed");
            return Err(AnalysisError::Timeout {
                timeout_ms,
                elapsed_ms,
            });
        }

        if !result.success() {
            let code = result.code();
            let stderr = result.stderr.trim();
            let message = if !stderr.is_empty() {
                stderr.to_string()
            } else if let Some(code) = code {
                format!("Process exited with code {code}")
            } else {
                "Process terminated by signal".to_string()
            };
            tracing::warn!(?code, elapsed_ms, "Analysis failed: {message}");
            return Err(AnalysisError::Process {
                code,
                message,
                elapsed_ms,
            });
        }

        let raw_text = extract_response(&result.stdout, &result.stderr);
        tracing::info!(
            elapsed_ms,
            tool_ms = result.elapsed_ms(),
            chars = raw_text.len(),
            "Analysis finished"
        );

        Ok(Analysis {
            raw_text,
            mode,
            execution_time_ms: elapsed_ms,
        })
    }
}

/// Audience framing handed to the analysis tool ahead of the question.
const fn audience_preamble(mode: Mode) -> &'static str {
    match mode {
        Mode::Default => {
            "You are answering a question about this codebase for a non-technical stakeholder. \
             Explain what the code does in terms of behavior and business impact, and avoid \
             implementation detail unless it is needed to answer. Do not modify any files."
        }
        Mode::Oncall => {
            "You are helping an on-call developer diagnose and fix a problem in this codebase. \
             Identify the likely root cause, name the exact files and functions involved, and \
             describe the concrete changes needed. Do not modify any files."
        }
    }
}

/// Build the text sent to the analysis tool.
pub(crate) fn enhance_query(query: &str, mode: Mode, conversation_context: Option<&str>) -> String {
    let mut text = String::from(audience_preamble(mode));
    text.push_str("\n\n");

    if let Some(context) = conversation_context.filter(|c| !c.trim().is_empty()) {
        text.push_str("Conversation history (use it to resolve follow-up questions):\n");
        text.push_str(context);
        text.push_str("\n\n");
    }

    text.push_str("Question: ");
    text.push_str(query);
    text
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fake_tool, CountingProtector};

    fn invoker(tool: &Path, protector: &Arc<CountingProtector>) -> AnalysisInvoker {
        AnalysisInvoker::new(AnalysisConfig {
            tool: tool.to_string_lossy().into_owned(),
            model: "test-model".into(),
            enforce_read_only: true,
        })
        .with_protector(protector.clone())
    }

    #[test]
    fn enhanced_query_includes_preamble_history_and_question() {
        let text = enhance_query("why is it broken", Mode::Oncall, Some("User: hi\nAssistant: hello"));
        assert!(text.starts_with("You are helping an on-call developer"));
        assert!(text.contains("Conversation history"));
        assert!(text.contains("User: hi\nAssistant: hello"));
        assert!(text.ends_with("Question: why is it broken"));

        let plain = enhance_query("what is this", Mode::Default, Some("  "));
        assert!(!plain.contains("Conversation history"));
        assert!(plain.contains("non-technical stakeholder"));
    }

    #[test]
    fn command_is_an_argument_vector() {
        let invoker = AnalysisInvoker::new(AnalysisConfig::default());
        let opts = invoker.command(Path::new("/srv/repo"), "say \"hi\"; rm -rf $HOME");
        assert_eq!(opts.program, "cursor-agent");
        assert_eq!(
            opts.args,
            vec![
                "--print",
                "--output-format",
                "json",
                "--model",
                "auto",
                "--workspace",
                "/srv/repo",
                "say \"hi\"; rm -rf $HOME",
            ]
        );
        assert_eq!(opts.working_dir.as_deref(), Some(Path::new("/srv/repo")));
    }

    #[tokio::test]
    async fn success_parses_json_and_restores_once() {
        let repo = tempfile::tempdir().unwrap();
        let tool = fake_tool(r#"echo '{"type":"result","result":"Billing charges cards."}'"#);
        let protector = Arc::new(CountingProtector::default());

        let analysis = invoker(&tool.path, &protector)
            .invoke("what does billing do", repo.path(), Duration::from_secs(10), None)
            .await
            .unwrap();

        assert_eq!(analysis.raw_text, "Billing charges cards.");
        assert_eq!(analysis.mode, Mode::Default);
        assert_eq!(protector.protects(), 1);
        assert_eq!(protector.restores(), 1);

        let args = tool.recorded_args();
        let workspace = repo.path().to_string_lossy().into_owned();
        assert_eq!(args.len(), 8);
        assert_eq!(
            args[..7],
            ["--print", "--output-format", "json", "--model", "test-model", "--workspace", workspace.as_str()]
        );
        assert!(args[7].ends_with("Question: what does billing do"));
    }

    #[tokio::test]
    async fn process_error_carries_stderr_and_restores_once() {
        let repo = tempfile::tempdir().unwrap();
        let tool = fake_tool("echo 'not logged in' >&2; exit 3");
        let protector = Arc::new(CountingProtector::default());

        let err = invoker(&tool.path, &protector)
            .invoke("fix the bug", repo.path(), Duration::from_secs(10), None)
            .await
            .unwrap_err();

        match err {
            AnalysisError::Process { code, ref message, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(message, "not logged in");
            }
            other => panic!("expected process error, got {other:?}"),
        }
        assert_eq!(protector.restores(), 1);
    }

    #[tokio::test]
    async fn silent_failure_names_exit_code() {
        let repo = tempfile::tempdir().unwrap();
        let tool = fake_tool("exit 7");
        let protector = Arc::new(CountingProtector::default());

        let err = invoker(&tool.path, &protector)
            .invoke("q", repo.path(), Duration::from_secs(10), None)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Process exited with code 7");
        assert_eq!(protector.restores(), 1);
    }

    #[tokio::test]
    async fn timeout_kills_process_and_restores_once() {
        let repo = tempfile::tempdir().unwrap();
        let pid_dir = tempfile::tempdir().unwrap();
        let pid_file = pid_dir.path().join("pid");
        let tool = fake_tool(&format!("echo $$ > '{}'\nexec sleep 30", pid_file.display()));
        let protector = Arc::new(CountingProtector::default());

        let err = invoker(&tool.path, &protector)
            .invoke("q", repo.path(), Duration::from_millis(300), None)
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(err.to_string().contains("timeout"));
        assert!(err.to_string().contains("300ms"));
        assert!(err.elapsed_ms() >= 300);
        assert_eq!(protector.restores(), 1);

        let pid = std::fs::read_to_string(&pid_file).unwrap();
        let alive = std::process::Command::new("kill")
            .args(["-0", pid.trim()])
            .status()
            .unwrap()
            .success();
        assert!(!alive, "timed-out process {pid} is still running");
    }

    #[tokio::test]
    async fn missing_tool_is_unexpected_error_and_restores_once() {
        let repo = tempfile::tempdir().unwrap();
        let protector = Arc::new(CountingProtector::default());

        let err = invoker(Path::new("/nonexistent/analysis-tool"), &protector)
            .invoke("q", repo.path(), Duration::from_secs(1), None)
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::Unexpected { .. }));
        assert!(err.to_string().starts_with("Failed to execute /nonexistent/analysis-tool"));
        assert_eq!(protector.restores(), 1);
    }

    #[tokio::test]
    async fn enforcement_disabled_never_touches_permissions() {
        let repo = tempfile::tempdir().unwrap();
        let tool = fake_tool("echo plain answer");
        let protector = Arc::new(CountingProtector::default());

        let invoker = AnalysisInvoker::new(AnalysisConfig {
            tool: tool.path.to_string_lossy().into_owned(),
            model: "m".into(),
            enforce_read_only: false,
        })
        .with_protector(protector.clone());

        let analysis = invoker
            .invoke("q", repo.path(), Duration::from_secs(10), None)
            .await
            .unwrap();
        assert_eq!(analysis.raw_text, "plain answer");
        assert_eq!(protector.protects(), 0);
        assert_eq!(protector.restores(), 0);
    }

    #[tokio::test]
    async fn repository_is_read_only_while_tool_runs() {
        let repo = tempfile::tempdir().unwrap();
        std::fs::write(repo.path().join("lib.rs"), "pub fn f() {}").unwrap();
        // Report the file's mode as the tool sees it
        let tool = fake_tool("stat -c '%a' lib.rs 2>/dev/null || stat -f '%Lp' lib.rs");

        let invoker = AnalysisInvoker::new(AnalysisConfig {
            tool: tool.path.to_string_lossy().into_owned(),
            model: "m".into(),
            enforce_read_only: true,
        });

        let analysis = invoker
            .invoke("q", repo.path(), Duration::from_secs(10), None)
            .await
            .unwrap();
        let mode_during = u32::from_str_radix(analysis.raw_text.trim(), 8).unwrap();
        assert_eq!(mode_during & 0o222, 0);

        use std::os::unix::fs::PermissionsExt;
        let mode_after = std::fs::metadata(repo.path().join("lib.rs")).unwrap().permissions().mode();
        assert_eq!(mode_after & 0o200, 0o200);
    }

    #[tokio::test]
    async fn timeout_holds_when_tool_leaves_output_open() {
        let repo = tempfile::tempdir().unwrap();
        let tool = fake_tool("sleep 6 &\necho answer");
        let protector = Arc::new(CountingProtector::default());

        let started = Instant::now();
        let err = invoker(&tool.path, &protector)
            .invoke("q", repo.path(), Duration::from_millis(500), None)
            .await
            .unwrap_err();

        assert!(err.is_timeout(), "{err:?}");
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(protector.restores(), 1);
    }

    #[tokio::test]
    async fn failed_protect_still_restores_once() {
        let repo = tempfile::tempdir().unwrap();
        let tool = fake_tool("echo answer");
        let protector = Arc::new(CountingProtector::failing_protect());

        let analysis = invoker(&tool.path, &protector)
            .invoke("q", repo.path(), Duration::from_secs(10), None)
            .await
            .unwrap();

        assert_eq!(analysis.raw_text, "answer");
        assert_eq!(protector.protects(), 1);
        assert_eq!(protector.restores(), 1);
    }
}
