//! Task types and task instances.
//!
//! A [`TaskType`] is the declared shape of a unit of work: a name, an
//! optional namespace, an ordered [`ParamRegistry`] and optionally the
//! capability to run. A [`Task`] binds a concrete value to every parameter
//! of its type and carries the canonical `task_id` derived from them.
//!
//! ## Identity
//!
//! The `task_id` is built from the task family and the string rendering of
//! every *significant* parameter, in registry order:
//!
//! ```text
//! reports.DailyReport(2014-09-13, true)
//! ```
//!
//! Insignificant parameters (labels, hints for the worker) are left out, so
//! two instances which only differ in those share a `task_id` while still
//! being different values.
//!
//! ## Construction
//!
//! Every construction goes through an [`InstanceCache`]; constructing the
//! same type with the same values twice yields the same `Arc<Task>`.

mod cache;
mod external;
mod transient;
mod wire;

use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::ParamConfig;
use crate::core::{ArcStr, Hash32};
use crate::error::{ParameterError, TsumikiError};
use crate::flatten::{Structure, flatten};
use crate::param::{ParamRegistry, ParamValue, Parameter};
use crate::registry::TaskRegistry;

pub use cache::InstanceCache;
pub use external::{Externalize, externalize};
pub use transient::{TransientGuard, TransientHooks};
pub use wire::TaskSpec;
pub(crate) use wire::str_values;

use cache::CacheSlot;
use transient::HookState;

/// Run capability of a task type.
pub type RunFn = Arc<dyn Fn(&Task) -> anyhow::Result<()> + Send + Sync>;

/// Declares the requirements of a task as a nested structure of tasks.
pub type RequiresFn =
    Arc<dyn Fn(&Task, &TaskRegistry) -> anyhow::Result<Structure<Arc<Task>>> + Send + Sync>;

static NEXT_TYPE: AtomicU64 = AtomicU64::new(1);

/// Identifies a task type for equality and caching.
///
/// Every declared type gets a fresh `origin`. The externalized variant of a
/// type keeps the origin and sets `external`, so all externalized variants
/// of one type are interchangeable while staying distinct from the type
/// itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TypeKey {
    origin: u64,
    external: bool,
}

impl TypeKey {
    fn fresh() -> Self {
        Self {
            origin: NEXT_TYPE.fetch_add(1, Ordering::Relaxed),
            external: false,
        }
    }
}

/// The declared shape of a unit of work.
pub struct TaskType {
    key: TypeKey,
    name: ArcStr,
    namespace: Option<ArcStr>,
    family: ArcStr,
    params: Arc<ParamRegistry>,
    run: Option<RunFn>,
    requires: Option<RequiresFn>,
    parent: Option<Arc<TaskType>>,
}

impl TaskType {
    pub fn builder(name: impl Into<ArcStr>) -> TaskTypeBuilder {
        TaskTypeBuilder {
            name: name.into(),
            namespace: None,
            params: Vec::new(),
            parent: None,
            inherits: Vec::new(),
            run: RunSlot::Inherit,
            requires: None,
        }
    }

    /// A parameterless type, used for the builtin types.
    pub(crate) fn bare(name: &str, run: Option<RunFn>) -> Arc<Self> {
        Arc::new(Self {
            key: TypeKey::fresh(),
            name: name.into(),
            namespace: None,
            family: name.into(),
            params: Arc::default(),
            run,
            requires: None,
            parent: None,
        })
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// The namespaced name, `namespace.name` or just `name`.
    pub fn family(&self) -> &str {
        &self.family
    }

    /// Name used in diagnostics; tells externalized variants apart from
    /// the type they were derived from.
    pub fn display_name(&self) -> String {
        match self.key.external {
            true => format!("External({})", self.family),
            false => self.family.to_string(),
        }
    }

    pub fn params(&self) -> &ParamRegistry {
        &self.params
    }

    /// The run capability, absent for external types.
    pub fn run_fn(&self) -> Option<&RunFn> {
        self.run.as_ref()
    }

    pub fn is_executable(&self) -> bool {
        self.run.is_some()
    }

    /// Whether the type was produced by [`externalize`].
    pub fn is_externalized(&self) -> bool {
        self.key.external
    }

    pub fn parent(&self) -> Option<&Arc<TaskType>> {
        self.parent.as_ref()
    }

    /// Whether `self` is `other` or derives from it.
    pub fn is_subtype_of(&self, other: &TaskType) -> bool {
        let mut current = Some(self);

        while let Some(ty) = current {
            if ty.key == other.key {
                return true;
            }
            current = ty.parent.as_deref();
        }

        false
    }

    /// Builds a task from explicit values, falling back to declared defaults.
    ///
    /// ```rust
    /// use tsumiki::{InstanceCache, ParamKind, ParamValue, Parameter, TaskType};
    ///
    /// let ty = TaskType::builder("Resize")
    ///     .namespace("images")
    ///     .param(Parameter::new("width", ParamKind::Int))
    ///     .param(Parameter::new("format", ParamKind::Str).default("webp"))
    ///     .build()?;
    ///
    /// let cache = InstanceCache::new();
    /// let task = ty.instantiate(&cache, [("width", ParamValue::from("640"))])?;
    ///
    /// assert_eq!(task.task_id(), "images.Resize(640, webp)");
    /// # Ok::<(), tsumiki::ParameterError>(())
    /// ```
    pub fn instantiate<I, K, V>(
        self: &Arc<Self>,
        cache: &InstanceCache,
        args: I,
    ) -> Result<Arc<Task>, ParameterError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<ParamValue>,
    {
        self.instantiate_with(cache, &ParamConfig::default(), args)
    }

    pub(crate) fn instantiate_with<I, K, V>(
        self: &Arc<Self>,
        cache: &InstanceCache,
        config: &ParamConfig,
        args: I,
    ) -> Result<Arc<Task>, ParameterError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<ParamValue>,
    {
        let values = self.bind(config, args)?;
        let rendered = self.render(&values);
        let key = (self.key, rendered.clone());

        Ok(cache.get_or_insert_with(key, |slot| {
            Task::new(self.clone(), values, rendered, Some(slot))
        }))
    }

    /// Resolves a value for every parameter: explicit argument, then the
    /// configured value, then the declared default.
    fn bind<I, K, V>(
        &self,
        config: &ParamConfig,
        args: I,
    ) -> Result<Vec<ParamValue>, ParameterError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<ParamValue>,
    {
        let mut given: HashMap<String, ParamValue> = HashMap::new();

        for (name, value) in args {
            let name = name.as_ref();
            if !self.params.contains(name) {
                return Err(ParameterError::Unknown {
                    task: self.family.clone(),
                    param: name.into(),
                });
            }
            given.insert(name.to_string(), value.into());
        }

        self.params
            .iter()
            .map(|param| match given.remove(param.name()) {
                Some(value) => param.normalize(value),
                None => self.fallback(config, param),
            })
            .collect()
    }

    fn fallback(
        &self,
        config: &ParamConfig,
        param: &Parameter,
    ) -> Result<ParamValue, ParameterError> {
        if let Some(text) = config.get(&self.family, param.name()) {
            return param.parse(text);
        }

        match param.default_value() {
            Some(value) => Ok(value.clone()),
            None => Err(ParameterError::Missing {
                task: self.family.clone(),
                param: param.name_arc().clone(),
            }),
        }
    }

    fn render(&self, values: &[ParamValue]) -> Vec<String> {
        self.params
            .iter()
            .zip(values)
            .map(|(param, value)| param.serialize(value))
            .collect()
    }

    /// `<namespace.>name(v1, v2, ...)` over the significant parameters.
    fn task_id(&self, rendered: &[String]) -> String {
        let significant: Vec<&str> = self
            .params
            .iter()
            .zip(rendered)
            .filter(|(param, _)| param.is_significant())
            .map(|(_, text)| text.as_str())
            .collect();

        format!("{}({})", self.family, significant.join(", "))
    }
}

impl PartialEq for TaskType {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for TaskType {}

impl std::fmt::Debug for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskType")
            .field("name", &self.display_name())
            .field("params", &self.params.names().collect::<Vec<_>>())
            .field("executable", &self.is_executable())
            .finish()
    }
}

enum RunSlot {
    Inherit,
    Set(RunFn),
    Absent,
}

/// Declares a [`TaskType`].
pub struct TaskTypeBuilder {
    name: ArcStr,
    namespace: Option<ArcStr>,
    params: Vec<Parameter>,
    parent: Option<Arc<TaskType>>,
    inherits: Vec<Arc<TaskType>>,
    run: RunSlot,
    requires: Option<RequiresFn>,
}

impl TaskTypeBuilder {
    pub fn namespace(mut self, namespace: impl Into<ArcStr>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn param(mut self, param: Parameter) -> Self {
        self.params.push(param);
        self
    }

    pub fn params(mut self, params: impl IntoIterator<Item = Parameter>) -> Self {
        self.params.extend(params);
        self
    }

    /// Derives from `parent`: its parameters come first, its namespace, run
    /// capability and requirements apply unless declared here.
    pub fn derive_from(mut self, parent: &Arc<TaskType>) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    /// Copies the parameters of an unrelated type, after the parent's and
    /// before the ones declared here.
    pub fn inherits(mut self, other: &Arc<TaskType>) -> Self {
        self.inherits.push(other.clone());
        self
    }

    pub fn run<F>(mut self, run: F) -> Self
    where
        F: Fn(&Task) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.run = RunSlot::Set(Arc::new(run));
        self
    }

    /// Declares a type whose work is produced outside the pipeline.
    pub fn external(mut self) -> Self {
        self.run = RunSlot::Absent;
        self
    }

    pub fn requires<F>(mut self, requires: F) -> Self
    where
        F: Fn(&Task, &TaskRegistry) -> anyhow::Result<Structure<Arc<Task>>>
            + Send
            + Sync
            + 'static,
    {
        self.requires = Some(Arc::new(requires));
        self
    }

    pub fn build(self) -> Result<Arc<TaskType>, ParameterError> {
        let parent = self.parent.as_deref();

        let namespace = self
            .namespace
            .or_else(|| parent.and_then(|p| p.namespace.clone()));

        let family: ArcStr = match &namespace {
            Some(ns) => format!("{ns}.{}", self.name).into(),
            None => self.name.clone(),
        };

        let layers = parent
            .map(|p| &*p.params)
            .into_iter()
            .chain(self.inherits.iter().map(|ty| &*ty.params));
        let params = ParamRegistry::layered(&family, layers, self.params)?;

        let run = match self.run {
            RunSlot::Set(run) => Some(run),
            RunSlot::Absent => None,
            RunSlot::Inherit => match parent {
                Some(parent) => parent.run.clone(),
                None => Some(Arc::new(|_: &Task| -> anyhow::Result<()> { Ok(()) }) as RunFn),
            },
        };

        let requires = self
            .requires
            .or_else(|| parent.and_then(|p| p.requires.clone()));

        tracing::debug!("declared task type {family}");

        Ok(Arc::new(TaskType {
            key: TypeKey::fresh(),
            name: self.name,
            namespace,
            family,
            params: Arc::new(params),
            run,
            requires,
            parent: self.parent,
        }))
    }
}

/// A task type bound to a value for every parameter.
pub struct Task {
    ty: Arc<TaskType>,
    values: Vec<ParamValue>,
    pub(crate) rendered: Vec<String>,
    task_id: String,
    hooks: Mutex<HookState>,
    _slot: Option<CacheSlot>,
}

impl Task {
    fn new(
        ty: Arc<TaskType>,
        values: Vec<ParamValue>,
        rendered: Vec<String>,
        slot: Option<CacheSlot>,
    ) -> Self {
        let task_id = ty.task_id(&rendered);

        Self {
            ty,
            values,
            rendered,
            task_id,
            hooks: Mutex::default(),
            _slot: slot,
        }
    }

    pub fn task_type(&self) -> &Arc<TaskType> {
        &self.ty
    }

    pub fn family(&self) -> &str {
        self.ty.family()
    }

    /// The canonical identity of this unit of work.
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// BLAKE3 hash of the `task_id`.
    pub fn fingerprint(&self) -> Hash32 {
        Hash32::hash(&self.task_id)
    }

    /// `name_<10 hex chars>`, a short form of the `task_id` fit for file
    /// names.
    pub fn short_id(&self) -> String {
        let hex = self.fingerprint().to_hex();
        format!("{}_{}", self.ty.name(), &hex[..10])
    }

    pub fn run_fn(&self) -> Option<&RunFn> {
        self.ty.run_fn()
    }

    pub fn is_executable(&self) -> bool {
        self.ty.is_executable()
    }

    pub fn is_externalized(&self) -> bool {
        self.ty.is_externalized()
    }

    pub fn value(&self, name: &str) -> Option<&ParamValue> {
        self.ty.params.position(name).map(|index| &self.values[index])
    }

    /// Parameters paired with their values, in registry order.
    pub fn iter(&self) -> impl Iterator<Item = (&Parameter, &ParamValue)> {
        self.ty.params.iter().zip(&self.values)
    }

    pub fn param_values(&self) -> BTreeMap<String, ParamValue> {
        self.iter()
            .map(|(param, value)| (param.name().to_string(), value.clone()))
            .collect()
    }

    /// Builds an instance of `ty` carrying over every value whose name `ty`
    /// also declares, then applying `overrides`.
    pub fn clone_as<I, K, V>(
        &self,
        ty: &Arc<TaskType>,
        cache: &InstanceCache,
        overrides: I,
    ) -> Result<Arc<Task>, ParameterError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<ParamValue>,
    {
        let carried = self
            .iter()
            .filter(|(param, _)| ty.params.contains(param.name()))
            .map(|(param, value)| (param.name().to_string(), value.clone()));

        let overrides = overrides
            .into_iter()
            .map(|(name, value)| (name.as_ref().to_string(), value.into()));

        ty.instantiate(cache, carried.chain(overrides).collect::<Vec<_>>())
    }

    /// Evaluates the declared requirements.
    pub fn requires(&self, registry: &TaskRegistry) -> Result<Structure<Arc<Task>>, TsumikiError> {
        match &self.ty.requires {
            Some(requires) => requires(self, registry)
                .map_err(|e| TsumikiError::Task(self.task_id.clone(), e)),
            None => Ok(Structure::Absent),
        }
    }

    /// The declared requirements as a flat list.
    pub fn deps(&self, registry: &TaskRegistry) -> Result<Vec<Arc<Task>>, TsumikiError> {
        Ok(flatten(self.requires(registry)?)?)
    }
}

/// Two tasks are equal when their types match and every parameter,
/// significant or not, has the same canonical rendering.
impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.ty.key == other.ty.key && self.rendered == other.rendered
    }
}

impl Eq for Task {}

impl Hash for Task {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.ty.key.hash(state);
        self.rendered.hash(state);
    }
}

/// `family(name=value, ...)` over the significant parameters.
impl Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(", self.ty.family)?;

        let significant = self
            .ty
            .params
            .iter()
            .zip(&self.rendered)
            .filter(|(param, _)| param.is_significant());

        for (i, (param, text)) in significant.enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", param.name(), text)?;
        }

        f.write_str(")")
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("type", &self.ty.display_name())
            .field("task_id", &self.task_id)
            .field("params", &self.rendered)
            .finish()
    }
}
