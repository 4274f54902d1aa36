use std::collections::BTreeMap;

pub const DEFAULT_GROUP: &str = "DEFAULT";

/// Identity of a job inside the engine registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobKey {
    pub name: String,
    pub group: String,
}

impl JobKey {
    pub fn new(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
        }
    }

    pub fn in_default_group(name: impl Into<String>) -> Self {
        Self::new(name, DEFAULT_GROUP)
    }

    /// The trigger of a job always shares its (name, group) pair.
    pub fn trigger_key(&self) -> TriggerKey {
        TriggerKey::new(self.name.clone(), self.group.clone())
    }
}

impl std::fmt::Display for JobKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TriggerKey {
    pub name: String,
    pub group: String,
}

impl TriggerKey {
    pub fn new(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
        }
    }
}

impl std::fmt::Display for TriggerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}

impl From<&JobKey> for TriggerKey {
    fn from(key: &JobKey) -> Self {
        key.trigger_key()
    }
}

/// Descriptor the engine uses to instantiate and run a job.
///
/// `job_type` names the work to execute; `data` is handed to each execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDetail {
    pub key: JobKey,
    pub job_type: String,
    pub description: Option<String>,
    pub data: BTreeMap<String, String>,
}

impl JobDetail {
    pub fn new(key: JobKey, job_type: impl Into<String>) -> Self {
        Self {
            key,
            job_type: job_type.into(),
            description: None,
            data: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

/// A job as handed to the scheduler by upstream code.
///
/// Implementations are transient: the scheduler reads them during a single
/// call and never keeps them.
pub trait ScheduledJob {
    fn job_key(&self) -> Option<&JobKey>;
    fn job_detail(&self) -> Option<&JobDetail>;
    fn cron_expression(&self) -> &str;
    fn is_active(&self) -> bool;
}

/// Plain-data [`ScheduledJob`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDefinition {
    pub key: Option<JobKey>,
    pub detail: Option<JobDetail>,
    pub cron_expression: String,
    pub active: bool,
}

impl JobDefinition {
    /// An active job whose key is taken from `detail`.
    pub fn new(detail: JobDetail, cron_expression: impl Into<String>) -> Self {
        Self {
            key: Some(detail.key.clone()),
            detail: Some(detail),
            cron_expression: cron_expression.into(),
            active: true,
        }
    }

    /// A reference to a job by key only, enough for deletion.
    pub fn key_only(key: JobKey) -> Self {
        Self {
            key: Some(key),
            detail: None,
            cron_expression: String::new(),
            active: false,
        }
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }
}

impl ScheduledJob for JobDefinition {
    fn job_key(&self) -> Option<&JobKey> {
        self.key.as_ref()
    }

    fn job_detail(&self) -> Option<&JobDetail> {
        self.detail.as_ref()
    }

    fn cron_expression(&self) -> &str {
        &self.cron_expression
    }

    fn is_active(&self) -> bool {
        self.active
    }
}
