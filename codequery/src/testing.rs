//! Fakes shared by unit tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;

use crate::analysis::WriteProtector;
use crate::formatter::{ChatRequest, ChatResponse, Choice, CompletionClient, CompletionError};

/// An executable shell script standing in for the analysis CLI.
///
/// Every invocation records its argv (NUL-separated) before running `body`.
pub struct FakeTool {
    _dir: TempDir,
    pub path: PathBuf,
    args_file: PathBuf,
}

impl FakeTool {
    /// Arguments of the most recent invocation.
    pub fn recorded_args(&self) -> Vec<String> {
        let raw = std::fs::read_to_string(&self.args_file).unwrap_or_default();
        raw.split('\0')
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }
}

pub fn fake_tool(body: &str) -> FakeTool {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("analysis-tool");
    let args_file = dir.path().join("args");

    let script = format!(
        "#!/bin/sh\nprintf '%s\\000' \"$@\" > '{}'\n{body}\n",
        args_file.display()
    );
    std::fs::write(&path, script).expect("write fake tool");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod");

    FakeTool {
        _dir: dir,
        path,
        args_file,
    }
}

/// Protector that only counts calls.
#[derive(Default)]
pub struct CountingProtector {
    protects: AtomicUsize,
    restores: AtomicUsize,
    fail_protect: bool,
}

impl CountingProtector {
    /// Counts like the default, but every protect reports failure.
    pub fn failing_protect() -> Self {
        Self {
            fail_protect: true,
            ..Self::default()
        }
    }

    pub fn protects(&self) -> usize {
        self.protects.load(Ordering::SeqCst)
    }

    pub fn restores(&self) -> usize {
        self.restores.load(Ordering::SeqCst)
    }
}

impl WriteProtector for CountingProtector {
    fn protect(&self, _path: &Path) -> Result<()> {
        self.protects.fetch_add(1, Ordering::SeqCst);
        if self.fail_protect {
            anyhow::bail!("Operation not permitted");
        }
        Ok(())
    }

    fn restore(&self, _path: &Path) -> Result<()> {
        self.restores.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

type Responder = Box<dyn Fn(&str) -> Result<Option<String>, CompletionError> + Send + Sync>;

/// Completion client driven by a closure over the prompt.
///
/// `Ok(None)` from the closure yields a response with no choices.
pub struct FakeCompletion {
    respond: Responder,
    prompts: Mutex<Vec<String>>,
}

impl FakeCompletion {
    pub fn new(
        respond: impl Fn(&str) -> Result<Option<String>, CompletionError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            respond: Box::new(respond),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Always answers with `text`.
    pub fn replying(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_| Ok(Some(text.clone())))
    }

    /// Always fails like an unreachable API.
    pub fn failing() -> Self {
        Self::new(|_| Err(CompletionError::Status {
            status: 503,
            body: "unavailable".into(),
        }))
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl CompletionClient for FakeCompletion {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, CompletionError> {
        let prompt = request
            .messages
            .first()
            .and_then(|m| m.content.clone())
            .unwrap_or_default();
        self.prompts.lock().push(prompt.clone());

        let choices = (self.respond)(&prompt)?
            .map(|text| vec![Choice::assistant(text)])
            .unwrap_or_default();
        Ok(ChatResponse { choices })
    }
}
