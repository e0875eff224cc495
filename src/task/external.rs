//! Placeholders for work that is assumed to be done already.
//!
//! Externalizing a task type produces a variant which shares the parameters,
//! the family and hence the `task_id` of the original, but has no run
//! capability at all. A scheduler can tell such a task apart from one that
//! ran and did nothing, and will only ever check whether its output exists.

use std::sync::Arc;

use crate::task::{Task, TaskType, TypeKey};

/// Produces the non-executable variant of a task type or a task.
pub trait Externalize {
    type Output;

    fn externalize(&self) -> Self::Output;
}

impl Externalize for Arc<TaskType> {
    type Output = Arc<TaskType>;

    /// The original type is left untouched. Externalizing an externalized
    /// type returns it as is.
    fn externalize(&self) -> Arc<TaskType> {
        if self.key.external {
            return self.clone();
        }

        tracing::debug!("externalizing task type {}", self.family);

        Arc::new(TaskType {
            key: TypeKey {
                origin: self.key.origin,
                external: true,
            },
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            family: self.family.clone(),
            params: self.params.clone(),
            run: None,
            requires: self.requires.clone(),
            parent: Some(self.clone()),
        })
    }
}

impl Externalize for Arc<Task> {
    type Output = Arc<Task>;

    /// A detached copy of the task bound to the externalized type. The copy
    /// does not go through an instance cache and carries no transient hooks.
    fn externalize(&self) -> Arc<Task> {
        if self.is_externalized() {
            return self.clone();
        }

        let ty = self.ty.externalize();
        Arc::new(Task::new(ty, self.values.clone(), self.rendered.clone(), None))
    }
}

/// Shorthand for [`Externalize::externalize`].
///
/// ```rust
/// use tsumiki::{InstanceCache, TaskType, externalize};
///
/// let ty = TaskType::builder("Ingest").namespace("raw").build()?;
/// let cache = InstanceCache::new();
///
/// let task = ty.instantiate(&cache, Vec::<(&str, &str)>::new())?;
/// let placeholder = externalize(&ty).instantiate(&cache, Vec::<(&str, &str)>::new())?;
///
/// assert_eq!(task.task_id(), placeholder.task_id());
/// assert!(task.run_fn().is_some());
/// assert!(placeholder.run_fn().is_none());
/// # Ok::<(), tsumiki::ParameterError>(())
/// ```
pub fn externalize<T: Externalize>(target: &T) -> T::Output {
    target.externalize()
}
