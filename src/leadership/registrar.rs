use std::sync::{Arc, OnceLock};

use crate::error::CoordinationError;
use crate::leadership::{leadership_path, CoordinationService};

/// Registers this node as a scheduler leadership candidate.
pub struct LeadershipRegistrar {
    coordination: Arc<dyn CoordinationService>,
    path: OnceLock<String>,
}

impl LeadershipRegistrar {
    pub fn new(coordination: Arc<dyn CoordinationService>) -> Self {
        Self {
            coordination,
            path: OnceLock::new(),
        }
    }

    /// Compute the leadership path for `layer` and register it.
    ///
    /// The path is fixed by the first successful registration; later calls
    /// return it without registering again.
    pub async fn register(&self, layer: &str) -> Result<String, CoordinationError> {
        if let Some(path) = self.path.get() {
            return Ok(path.clone());
        }

        let path = leadership_path(layer);
        tracing::info!(path = %path, "Registering scheduler leadership path");
        self.coordination.register_leadership_component(&path).await?;
        Ok(self.path.get_or_init(|| path).clone())
    }

    pub fn leadership_path(&self) -> Option<&str> {
        self.path.get().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leadership::LocalElection;

    #[tokio::test]
    async fn register_builds_path_and_registers_it() {
        let election = LocalElection::new(false);
        let registrar = LeadershipRegistrar::new(Arc::new(election.node(1)));

        let path = registrar.register("test-layer").await.unwrap();

        assert_eq!(path, "/test-layer/jobs/quartz/executor");
        assert_eq!(registrar.leadership_path(), Some(path.as_str()));
        assert_eq!(election.candidates(&path), vec![1]);
    }

    #[tokio::test]
    async fn second_register_keeps_first_path() {
        let election = LocalElection::new(false);
        let registrar = LeadershipRegistrar::new(Arc::new(election.node(1)));

        registrar.register("a").await.unwrap();
        let path = registrar.register("b").await.unwrap();

        assert_eq!(path, "/a/jobs/quartz/executor");
        assert_eq!(election.candidates("/a/jobs/quartz/executor"), vec![1]);
        assert!(election.candidates("/b/jobs/quartz/executor").is_empty());
    }

    #[test]
    fn path_is_unset_before_registration() {
        let election = LocalElection::new(true);
        let registrar = LeadershipRegistrar::new(Arc::new(election.node(1)));
        assert!(registrar.leadership_path().is_none());
    }
}
