//! Classifier backed by an external model runner process.
//!
//! Runs `<program> run <model>`, writes the prompt to stdin, closes it and
//! reads all of stdout. The child is killed if it outlives the timeout.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::classifier::{Classifier, Verdict, build_prompt, parse_verdict};
use crate::config::ClassifierConfig;
use crate::error::ClassificationError;

/// Maximum stderr kept in an error message.
const MAX_STDERR_CHARS: usize = 500;

/// Classifier that shells out to a local model runner.
#[derive(Debug, Clone)]
pub struct ProcessClassifier {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl ProcessClassifier {
    /// `<program> run <model>`, e.g. `ollama run llama3`.
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: vec!["run".to_string(), config.model.clone()],
            timeout: config.timeout,
        }
    }

    /// Run an arbitrary command instead of a model runner.
    pub fn with_command(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: ClassifierConfig::default().timeout,
        }
    }

    /// Set the process timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send a prompt to the process and return its stdout.
    async fn run(&self, prompt: &str) -> Result<String, ClassificationError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ClassificationError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let exchange = async move {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(prompt.as_bytes()).await?;
                stdin.shutdown().await?;
            }
            child.wait_with_output().await
        };

        let output = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| ClassificationError::Timeout(self.timeout))??;

        if !output.status.success() {
            let stderr: String = String::from_utf8_lossy(&output.stderr)
                .trim()
                .chars()
                .take(MAX_STDERR_CHARS)
                .collect();
            return Err(ClassificationError::ExitStatus {
                status: output.status.to_string(),
                stderr,
            });
        }

        String::from_utf8(output.stdout).map_err(|_| ClassificationError::InvalidOutput)
    }
}

#[async_trait]
impl Classifier for ProcessClassifier {
    fn name(&self) -> &str {
        &self.program
    }

    async fn classify(&self, subject: &str, body: &str) -> Result<Verdict, ClassificationError> {
        let prompt = build_prompt(subject, body);
        let output = self.run(&prompt).await?;
        let verdict = parse_verdict(&output);
        debug!(
            program = %self.program,
            is_match = verdict.is_match,
            "Classifier responded"
        );
        Ok(verdict)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> ProcessClassifier {
        ProcessClassifier::with_command("sh", vec!["-c".to_string(), script.to_string()])
    }

    #[tokio::test]
    async fn positive_answer_from_process() {
        let classifier = sh("cat > /dev/null; echo 'YES - genuine praise'");
        let verdict = classifier.classify("Thanks", "Great job").await.unwrap();
        assert!(verdict.is_match);
        assert_eq!(verdict.rationale, "YES - genuine praise");
    }

    #[tokio::test]
    async fn negative_answer_from_process() {
        let classifier = sh("cat > /dev/null; echo 'NO, this looks automated'");
        let verdict = classifier.classify("Sale", "50% off").await.unwrap();
        assert!(!verdict.is_match);
    }

    #[tokio::test]
    async fn prompt_arrives_on_stdin_truncated() {
        // Count the body characters that reached stdin. `Q` never appears in the template.
        let classifier = sh("tr -cd Q | wc -c");
        let body = "Q".repeat(5000);
        let verdict = classifier.classify("Hi", &body).await.unwrap();
        let sent: usize = verdict.rationale.trim().parse().unwrap();
        assert_eq!(sent, crate::classifier::MAX_BODY_CHARS);
    }

    #[tokio::test]
    async fn empty_output_is_negative() {
        let classifier = sh("cat > /dev/null");
        let verdict = classifier.classify("Hi", "there").await.unwrap();
        assert!(!verdict.is_match);
    }

    #[tokio::test]
    async fn non_zero_exit_is_an_error() {
        let classifier = sh("cat > /dev/null; echo 'model not found' >&2; echo YES; exit 3");
        let err = classifier.classify("Hi", "there").await.unwrap_err();
        match err {
            ClassificationError::ExitStatus { stderr, .. } => {
                assert!(stderr.contains("model not found"));
            }
            other => panic!("Expected ExitStatus, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let classifier =
            ProcessClassifier::with_command("definitely-not-a-real-binary-4821", Vec::new());
        let err = classifier.classify("Hi", "there").await.unwrap_err();
        assert!(matches!(err, ClassificationError::Spawn { .. }));
    }

    #[tokio::test]
    async fn slow_process_times_out() {
        let classifier = sh("sleep 5").with_timeout(Duration::from_millis(100));
        let err = classifier.classify("Hi", "there").await.unwrap_err();
        assert!(matches!(err, ClassificationError::Timeout(_)));
    }

    #[test]
    fn built_from_config() {
        let classifier = ProcessClassifier::new(&ClassifierConfig::default());
        assert_eq!(classifier.name(), "ollama");
        assert_eq!(classifier.args, vec!["run", "llama3"]);
    }
}
