use std::collections::BTreeMap;
use std::path::PathBuf;

/// Configuration namespace of the job scheduler.
pub const CONFIG_PID: &str = "it.water.connectors.jobscheduler";

/// Property key for the cluster layer this node belongs to.
pub const LAYER_PROPERTY: &str = "it.water.connectors.jobscheduler.layer";

/// Property key for a custom store init script.
pub const INIT_SCRIPT_PROPERTY: &str = "it.water.connectors.jobscheduler.init.script";

/// Properties with this prefix are handed to the engine factory untouched.
pub const ENGINE_PROPERTY_PREFIX: &str = "org.quartz";

/// Script loaded by the store bootstrap when no custom path is configured.
pub const DEFAULT_INIT_SCRIPT: &str = "quartz_creation_postgres.sql";

pub const INSTANCE_NAME_PROPERTY: &str = "org.quartz.scheduler.instanceName";
pub const INSTANCE_ID_PROPERTY: &str = "org.quartz.scheduler.instanceId";

/// Passthrough engine tuning properties, ordered by key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineProperties(BTreeMap<String, String>);

impl EngineProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Logical cluster layer; part of the leadership path.
    pub layer: String,
    /// Custom init script. `None` falls back to [`DEFAULT_INIT_SCRIPT`].
    pub init_script: Option<PathBuf>,
    pub engine_properties: EngineProperties,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            layer: "default".to_string(),
            init_script: None,
            engine_properties: EngineProperties::new(),
        }
    }
}

impl SchedulerConfig {
    pub fn new(layer: impl Into<String>) -> Self {
        Self {
            layer: layer.into(),
            ..Default::default()
        }
    }

    pub fn with_init_script(mut self, path: impl Into<PathBuf>) -> Self {
        self.init_script = Some(path.into());
        self
    }

    pub fn with_engine_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.engine_properties.insert(key, value);
        self
    }

    /// Build a config from flat key/value properties.
    ///
    /// Unknown keys are ignored; engine keys keep their full name. Blank
    /// values for the layer or init script leave the defaults in place.
    pub fn from_properties<I, K, V>(properties: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        for (key, value) in properties {
            let (key, value) = (key.as_ref(), value.as_ref().trim());
            match key {
                LAYER_PROPERTY if !value.is_empty() => config.layer = value.to_string(),
                INIT_SCRIPT_PROPERTY if !value.is_empty() => {
                    config.init_script = Some(PathBuf::from(value))
                }
                k if k.starts_with(ENGINE_PROPERTY_PREFIX) => {
                    config.engine_properties.insert(k, value)
                }
                _ => {}
            }
        }
        config
    }
}
