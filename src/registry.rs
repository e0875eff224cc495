//! Lookup of task types by family.
//!
//! Tasks cross process boundaries as a family name plus string parameters.
//! The receiving side keeps a [`TaskRegistry`] of every type it knows and
//! rebuilds the task from that flat form with [`TaskRegistry::load_task`].

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::ParamConfig;
use crate::core::ArcStr;
use crate::error::{ParameterError, RegistryError, TsumikiError};
use crate::param::ParamValue;
use crate::task::{Externalize, InstanceCache, RunFn, Task, TaskSpec, TaskType};

/// Known task types together with the cache and configuration used to
/// build their instances.
pub struct TaskRegistry {
    types: BTreeMap<ArcStr, Arc<TaskType>>,
    cache: InstanceCache,
    config: ParamConfig,
}

impl TaskRegistry {
    /// A registry holding only the builtin types: `Task`, which runs and
    /// does nothing, and `ExternalTask`, which can't run at all.
    pub fn new() -> Self {
        let mut registry = Self {
            types: BTreeMap::new(),
            cache: InstanceCache::new(),
            config: ParamConfig::default(),
        };

        let noop: RunFn = Arc::new(|_: &Task| -> anyhow::Result<()> { Ok(()) });

        for ty in [TaskType::bare("Task", Some(noop)), TaskType::bare("ExternalTask", None)] {
            registry.types.insert(ty.family().into(), ty);
        }

        registry
    }

    pub fn with_config(mut self, config: ParamConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ParamConfig {
        &self.config
    }

    pub fn cache(&self) -> &InstanceCache {
        &self.cache
    }

    /// Makes `ty` resolvable by its family.
    ///
    /// Registering the same type twice is harmless. A different type with the
    /// same family would make lookups ambiguous and is rejected. Externalized
    /// types stand in for their original and are never registered.
    pub fn register(&mut self, ty: &Arc<TaskType>) -> Result<(), RegistryError> {
        if ty.is_externalized() {
            return Err(RegistryError::External(ty.family().to_string()));
        }

        if let Some(existing) = self.types.get(ty.family()) {
            return match existing.key() == ty.key() {
                true => Ok(()),
                false => Err(RegistryError::Ambiguous(ty.family().to_string())),
            };
        }

        tracing::debug!("registered task type {}", ty.family());
        self.types.insert(ty.family().into(), ty.clone());

        Ok(())
    }

    pub fn get(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<&Arc<TaskType>, RegistryError> {
        let family = match namespace {
            Some(ns) if !ns.is_empty() => format!("{ns}.{name}"),
            _ => name.to_string(),
        };

        self.types
            .get(family.as_str())
            .ok_or(RegistryError::NotFound(family))
    }

    /// Every registered family, sorted.
    pub fn families(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(|family| &**family)
    }

    /// Builds a task through this registry's cache and configuration.
    pub fn instantiate<I, K, V>(
        &self,
        ty: &Arc<TaskType>,
        args: I,
    ) -> Result<Arc<Task>, ParameterError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<ParamValue>,
    {
        ty.instantiate_with(&self.cache, &self.config, args)
    }

    /// Builds a task from string renderings of its parameter values.
    pub fn from_str_params<I, K, V>(
        &self,
        ty: &Arc<TaskType>,
        params: I,
    ) -> Result<Arc<Task>, ParameterError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.instantiate(ty, crate::task::str_values(params))
    }

    /// Resolves a family and rebuilds a task of it from string parameters.
    ///
    /// ```rust
    /// use std::collections::BTreeMap;
    /// use tsumiki::{ParamKind, Parameter, TaskRegistry, TaskType};
    ///
    /// let mut registry = TaskRegistry::new();
    /// registry.register(
    ///     &TaskType::builder("Export")
    ///         .namespace("db")
    ///         .param(Parameter::new("table", ParamKind::Str))
    ///         .build()?,
    /// )?;
    ///
    /// let params = BTreeMap::from([("table".to_string(), "users".to_string())]);
    /// let task = registry.load_task(Some("db"), "Export", &params)?;
    /// assert_eq!(task.task_id(), "db.Export(users)");
    /// # Ok::<(), tsumiki::TsumikiError>(())
    /// ```
    pub fn load_task(
        &self,
        namespace: Option<&str>,
        name: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<Arc<Task>, TsumikiError> {
        let ty = self.get(namespace, name)?;
        Ok(self.from_str_params(ty, params)?)
    }

    /// Like [`load_task`](Self::load_task), externalizing the result when
    /// the description asks for it.
    pub fn load_spec(&self, spec: &TaskSpec) -> Result<Arc<Task>, TsumikiError> {
        let ty = self.get(spec.namespace.as_deref(), &spec.name)?;

        let ty = match spec.external {
            true => ty.externalize(),
            false => ty.clone(),
        };

        Ok(self.from_str_params(&ty, &spec.params)?)
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("types", &self.types.keys().collect::<Vec<_>>())
            .field("cache", &self.cache)
            .finish()
    }
}
