use std::ops::Deref;
use std::sync::{Arc, MutexGuard, PoisonError};

use crate::task::Task;

type TextHook = Arc<dyn Fn(&str) + Send + Sync>;
type ProgressHook = Arc<dyn Fn(u8) + Send + Sync>;

/// Live callbacks a scheduler attaches to a task after construction.
///
/// None of them survive a process boundary, so a task holding any of them
/// refuses to serialize until they are detached with
/// [`Task::no_transient`].
#[derive(Clone, Default)]
pub struct TransientHooks {
    pub tracking_url: Option<TextHook>,
    pub status_message: Option<TextHook>,
    pub progress: Option<ProgressHook>,
}

impl TransientHooks {
    pub fn is_empty(&self) -> bool {
        self.tracking_url.is_none() && self.status_message.is_none() && self.progress.is_none()
    }
}

/// Hooks of one task together with the number of open guards.
///
/// While any guard is open the live set stays empty. Hooks attached in that
/// time go to the detached set, replacing older ones, and become live when
/// the last guard closes.
#[derive(Default)]
pub(crate) struct HookState {
    live: TransientHooks,
    detached: TransientHooks,
    guards: usize,
}

impl HookState {
    fn target(&mut self) -> &mut TransientHooks {
        match self.guards {
            0 => &mut self.live,
            _ => &mut self.detached,
        }
    }
}

impl std::fmt::Debug for TransientHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransientHooks")
            .field("tracking_url", &self.tracking_url.is_some())
            .field("status_message", &self.status_message.is_some())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl Task {
    fn hooks(&self) -> MutexGuard<'_, HookState> {
        self.hooks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attaches a tracking URL hook. Inside a guarded scope the hook is
    /// held back until the last guard closes.
    pub fn set_tracking_url_hook<F>(&self, hook: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.hooks().target().tracking_url = Some(Arc::new(hook));
    }

    pub fn set_status_message_hook<F>(&self, hook: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.hooks().target().status_message = Some(Arc::new(hook));
    }

    pub fn set_progress_hook<F>(&self, hook: F)
    where
        F: Fn(u8) + Send + Sync + 'static,
    {
        self.hooks().target().progress = Some(Arc::new(hook));
    }

    /// Drops every hook, including those held back by open guards.
    pub fn clear_hooks(&self) {
        let mut state = self.hooks();
        state.live = TransientHooks::default();
        state.detached = TransientHooks::default();
    }

    /// Whether any live callback is attached.
    pub fn has_transient(&self) -> bool {
        !self.hooks().live.is_empty()
    }

    /// Reports a tracking URL through the attached hook. Returns whether a
    /// hook was there to receive it.
    pub fn set_tracking_url(&self, url: &str) -> bool {
        let hook = self.hooks().live.tracking_url.clone();
        hook.map(|hook| hook(url)).is_some()
    }

    pub fn set_status_message(&self, message: &str) -> bool {
        let hook = self.hooks().live.status_message.clone();
        hook.map(|hook| hook(message)).is_some()
    }

    /// Reports progress, clamped to `0..=100`.
    pub fn set_progress_percentage(&self, percentage: u8) -> bool {
        let hook = self.hooks().live.progress.clone();
        hook.map(|hook| hook(percentage.min(100))).is_some()
    }

    /// Detaches every transient hook until the returned guard is dropped.
    ///
    /// Guards nest and may overlap across threads sharing one task. The
    /// hooks stay detached until the last open guard is dropped, whatever
    /// the order, and are put back however that scope is left, including
    /// early returns and unwinding.
    ///
    /// ```rust
    /// use tsumiki::{InstanceCache, TaskType};
    ///
    /// let ty = TaskType::builder("Report").build()?;
    /// let task = ty.instantiate(&InstanceCache::new(), Vec::<(&str, &str)>::new())?;
    /// task.set_status_message_hook(|message| println!("{message}"));
    ///
    /// assert!(serde_json::to_string(&*task).is_err());
    ///
    /// let json = {
    ///     let task = task.no_transient();
    ///     serde_json::to_string(&*task)?
    /// };
    ///
    /// assert!(json.contains("Report"));
    /// assert!(task.set_status_message("still attached"));
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn no_transient(&self) -> TransientGuard<'_> {
        let mut state = self.hooks();

        if state.guards == 0 {
            state.detached = std::mem::take(&mut state.live);
        }
        state.guards += 1;

        TransientGuard { task: self }
    }

    /// Closure form of [`no_transient`](Self::no_transient).
    pub fn with_no_transient<R>(&self, f: impl FnOnce(&Task) -> R) -> R {
        let guard = self.no_transient();
        f(&guard)
    }
}

/// Keeps the transient hooks of a task detached while alive.
pub struct TransientGuard<'a> {
    task: &'a Task,
}

impl Deref for TransientGuard<'_> {
    type Target = Task;

    fn deref(&self) -> &Task {
        self.task
    }
}

impl Drop for TransientGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.task.hooks();
        state.guards = state.guards.saturating_sub(1);

        if state.guards == 0 {
            state.live = std::mem::take(&mut state.detached);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Barrier, Mutex};
    use std::thread;

    use super::*;
    use crate::{InstanceCache, TaskType};

    fn task() -> Arc<Task> {
        TaskType::builder("Task")
            .build()
            .unwrap()
            .instantiate(&InstanceCache::new(), Vec::<(&str, &str)>::new())
            .unwrap()
    }

    #[test]
    fn test_serialize_inside_guard() {
        let task = task();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        task.set_tracking_url_hook(move |url| sink.lock().unwrap().push(url.to_string()));
        let sink = seen.clone();
        task.set_status_message_hook(move |msg| sink.lock().unwrap().push(msg.to_string()));

        assert!(serde_json::to_vec(&*task).is_err());

        {
            let guard = task.no_transient();
            assert!(!guard.has_transient());
            serde_json::to_vec(&*guard).unwrap();
        }

        assert!(task.set_tracking_url("http://test.example.com/"));
        assert!(task.set_status_message("message"));
        assert_eq!(
            *seen.lock().unwrap(),
            ["http://test.example.com/", "message"]
        );
    }

    #[test]
    fn test_hooks_restored_after_panic() {
        let task = task();
        task.set_progress_hook(|_| {});

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            task.with_no_transient(|_| panic!("boom"))
        }));

        assert!(result.is_err());
        assert!(task.has_transient());
    }

    #[test]
    fn test_hooks_restored_after_error() {
        let task = task();
        task.set_status_message_hook(|_| {});

        let result: Result<(), &str> = task.with_no_transient(|t| {
            assert!(!t.has_transient());
            Err("failed")
        });

        assert!(result.is_err());
        assert!(task.has_transient());
    }

    #[test]
    fn test_nested_guards() {
        let task = task();
        task.set_status_message_hook(|_| {});

        {
            let outer = task.no_transient();
            {
                let inner = outer.no_transient();
                assert!(!inner.has_transient());
            }
            assert!(!outer.has_transient());
        }

        assert!(task.has_transient());
    }

    #[test]
    fn test_guards_dropped_out_of_order() {
        let task = task();
        task.set_status_message_hook(|_| {});

        let first = task.no_transient();
        let second = task.no_transient();
        drop(first);

        assert!(!task.has_transient());
        assert!(!task.set_status_message("held back"));
        serde_json::to_vec(&*second).unwrap();

        drop(second);
        assert!(task.has_transient());
        assert!(task.set_status_message("attached again"));
    }

    #[test]
    fn test_guards_overlap_across_threads() {
        let cache = InstanceCache::new();
        let ty = TaskType::builder("Shared").build().unwrap();
        let task = ty.instantiate(&cache, Vec::<(&str, &str)>::new()).unwrap();
        let same = ty.instantiate(&cache, Vec::<(&str, &str)>::new()).unwrap();
        assert!(Arc::ptr_eq(&task, &same));

        task.set_tracking_url_hook(|_| {});
        let barrier = Barrier::new(2);

        thread::scope(|scope| {
            for shared in [&task, &same] {
                let barrier = &barrier;
                scope.spawn(move || {
                    let guard = shared.no_transient();
                    barrier.wait();
                    serde_json::to_vec(&*guard).unwrap();
                    barrier.wait();
                });
            }
        });

        assert!(task.has_transient());
        assert!(task.set_tracking_url("http://test.example.com/"));
    }

    #[test]
    fn test_hook_attached_inside_guard_wins() {
        let task = task();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        task.set_status_message_hook(move |_| sink.lock().unwrap().push("old"));

        {
            let guard = task.no_transient();
            let sink = seen.clone();
            guard.set_status_message_hook(move |_| sink.lock().unwrap().push("new"));

            assert!(!guard.has_transient());
            serde_json::to_vec(&*guard).unwrap();
        }

        assert!(task.set_status_message("message"));
        assert_eq!(*seen.lock().unwrap(), ["new"]);
    }

    #[test]
    fn test_clear_inside_guard_drops_detached() {
        let task = task();
        task.set_progress_hook(|_| {});

        task.with_no_transient(|t| t.clear_hooks());
        assert!(!task.has_transient());
    }

    #[test]
    fn test_progress_is_clamped() {
        let task = task();
        let last = Arc::new(Mutex::new(0));
        let sink = last.clone();
        task.set_progress_hook(move |p| *sink.lock().unwrap() = p);

        assert!(task.set_progress_percentage(250));
        assert_eq!(*last.lock().unwrap(), 100);

        task.clear_hooks();
        assert!(!task.set_progress_percentage(10));
    }
}
