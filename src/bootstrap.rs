use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::DEFAULT_INIT_SCRIPT;
use crate::error::BootstrapError;

/// Prepares the engine's backing store before the engine is used.
///
/// Called once per activation. Failures are reported but the scheduler
/// activates anyway, since the store may already be in place.
#[async_trait]
pub trait SchemaBootstrap: Send + Sync {
    async fn ensure_schema(&self, init_script: Option<&Path>) -> Result<(), BootstrapError>;
}

/// Executes the statements of an init script against the store.
#[async_trait]
pub trait StatementSink: Send + Sync {
    async fn execute(&self, statements: &[String]) -> Result<(), BootstrapError>;
}

/// Loads an init script from disk.
///
/// A custom path must be readable. Without one, the default script is
/// looked up in `resource_dir` and silently skipped when absent.
pub struct ScriptBootstrap {
    resource_dir: PathBuf,
    sink: Option<Arc<dyn StatementSink>>,
}

impl ScriptBootstrap {
    pub fn new(resource_dir: impl Into<PathBuf>) -> Self {
        Self {
            resource_dir: resource_dir.into(),
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn StatementSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn default_script_path(&self) -> PathBuf {
        self.resource_dir.join(DEFAULT_INIT_SCRIPT)
    }

    async fn read(path: &Path) -> Result<String, BootstrapError> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|source| BootstrapError::Io {
                path: path.display().to_string(),
                source,
            })
    }
}

#[async_trait]
impl SchemaBootstrap for ScriptBootstrap {
    async fn ensure_schema(&self, init_script: Option<&Path>) -> Result<(), BootstrapError> {
        let script = match init_script {
            Some(path) => Self::read(path).await?,
            None => {
                let path = self.default_script_path();
                if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                    tracing::warn!(path = %path.display(), "Init script not found, skipping store bootstrap");
                    return Ok(());
                }
                Self::read(&path).await?
            }
        };

        let statements = split_statements(&script);
        tracing::info!(
            chars = script.len(),
            statements = statements.len(),
            "Init script loaded"
        );

        match &self.sink {
            Some(sink) => sink.execute(&statements).await,
            None => Ok(()),
        }
    }
}

/// Split a SQL script into `;`-terminated statements, dropping `--` comment
/// lines and blanks.
pub fn split_statements(script: &str) -> Vec<String> {
    let without_comments: String = script
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");

    without_comments
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    #[async_trait]
    impl StatementSink for Recorder {
        async fn execute(&self, statements: &[String]) -> Result<(), BootstrapError> {
            self.0.lock().unwrap().extend(statements.iter().cloned());
            Ok(())
        }
    }

    #[test]
    fn split_drops_comments_and_blanks() {
        let script = "-- header\nCREATE TABLE A(ID INT);\n\n  -- note\nCREATE TABLE B(ID INT);\n;";
        assert_eq!(
            split_statements(script),
            vec!["CREATE TABLE A(ID INT)", "CREATE TABLE B(ID INT)"]
        );
    }

    #[tokio::test]
    async fn missing_default_script_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let bootstrap = ScriptBootstrap::new(dir.path());
        bootstrap.ensure_schema(None).await.unwrap();
    }

    #[tokio::test]
    async fn default_script_is_read_from_resource_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(DEFAULT_INIT_SCRIPT),
            "CREATE TABLE IF NOT EXISTS QRTZ_LOCKS(ID INT);",
        )
        .unwrap();
        let sink = Arc::new(Recorder::default());
        let bootstrap = ScriptBootstrap::new(dir.path()).with_sink(sink.clone());

        bootstrap.ensure_schema(None).await.unwrap();

        assert_eq!(
            *sink.0.lock().unwrap(),
            vec!["CREATE TABLE IF NOT EXISTS QRTZ_LOCKS(ID INT)"]
        );
    }

    #[tokio::test]
    async fn custom_script_is_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "CREATE TABLE IF NOT EXISTS QRTZ_TEST(ID INT);").unwrap();
        let sink = Arc::new(Recorder::default());
        let bootstrap = ScriptBootstrap::new("/nonexistent").with_sink(sink.clone());

        bootstrap.ensure_schema(Some(file.path())).await.unwrap();

        assert_eq!(sink.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unreadable_custom_script_is_an_error() {
        let bootstrap = ScriptBootstrap::new("/nonexistent");
        let err = bootstrap
            .ensure_schema(Some(Path::new("/tmp/not-existing-init-script.sql")))
            .await
            .unwrap_err();
        assert!(matches!(err, BootstrapError::Io { .. }));
    }
}
