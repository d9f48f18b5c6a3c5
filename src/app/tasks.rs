use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tracing::{info, warn};

use crate::app::error::AppError;
use crate::app::models::TaskInfo;

struct TaskHandle {
    label: String,
    cancel_flag: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

/// Named worker threads that can be listed, cancelled and joined at exit.
pub struct BackgroundTasks {
    tasks: Mutex<HashMap<String, TaskHandle>>,
    shutting_down: Arc<AtomicBool>,
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        Self::new()
    }
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            shutting_down: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set once shutdown starts. Workers must stop prompting the user after
    /// that, since the event loop that shows dialogs is waiting on them.
    pub fn shutdown_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutting_down)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    pub fn spawn<F>(&self, id: &str, label: &str, work: F, trace_id: &str) -> Result<(), AppError>
    where
        F: FnOnce(Arc<AtomicBool>) + Send + 'static,
    {
        if self.is_shutting_down() {
            return Err(AppError::validation("Application is shutting down", trace_id));
        }
        let mut guard = self
            .tasks
            .lock()
            .map_err(|_| AppError::system("Task registry locked", trace_id))?;
        prune_finished(&mut guard);
        if guard.contains_key(id) {
            return Err(AppError::validation(
                format!("Task {id} is already running"),
                trace_id,
            ));
        }

        let cancel_flag = Arc::new(AtomicBool::new(false));
        let worker_flag = Arc::clone(&cancel_flag);
        let join = std::thread::Builder::new()
            .name(format!("ezflash-{label}"))
            .spawn(move || work(worker_flag))
            .map_err(|err| AppError::system(format!("Failed to start worker: {err}"), trace_id))?;

        guard.insert(
            id.to_string(),
            TaskHandle {
                label: label.to_string(),
                cancel_flag,
                join,
            },
        );
        Ok(())
    }

    pub fn running(&self) -> Vec<TaskInfo> {
        let Ok(mut guard) = self.tasks.lock() else {
            return Vec::new();
        };
        prune_finished(&mut guard);
        let mut tasks = guard
            .iter()
            .map(|(id, handle)| TaskInfo {
                id: id.clone(),
                label: handle.label.clone(),
            })
            .collect::<Vec<_>>();
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        tasks
    }

    /// Returns false when no running task has this id.
    pub fn cancel(&self, id: &str) -> bool {
        let Ok(guard) = self.tasks.lock() else {
            return false;
        };
        match guard.get(id) {
            Some(handle) if !handle.join.is_finished() => {
                handle.cancel_flag.store(true, Ordering::Relaxed);
                true
            }
            _ => false,
        }
    }

    /// Raises the shutdown signal without blocking, cancelling workers when
    /// asked. Returns how many workers are still running.
    pub fn begin_shutdown(&self, cancel: bool) -> usize {
        self.shutting_down.store(true, Ordering::SeqCst);
        let Ok(mut guard) = self.tasks.lock() else {
            return 0;
        };
        prune_finished(&mut guard);
        if cancel {
            for handle in guard.values() {
                handle.cancel_flag.store(true, Ordering::Relaxed);
            }
        }
        guard.len()
    }

    /// Joins every outstanding worker, cancelling them first when asked.
    /// Returns how many workers were still registered.
    pub fn shutdown(&self, cancel: bool) -> usize {
        self.shutting_down.store(true, Ordering::SeqCst);
        let drained = match self.tasks.lock() {
            Ok(mut guard) => guard.drain().collect::<Vec<_>>(),
            Err(_) => {
                warn!("task registry poisoned during shutdown");
                return 0;
            }
        };
        let count = drained.len();
        if cancel {
            for (_, handle) in &drained {
                handle.cancel_flag.store(true, Ordering::Relaxed);
            }
        }
        for (id, handle) in drained {
            if handle.join.join().is_err() {
                warn!(task_id = %id, "background task panicked");
            }
        }
        if count > 0 {
            info!(count, cancel, "background tasks joined");
        }
        count
    }
}

fn prune_finished(tasks: &mut HashMap<String, TaskHandle>) {
    let finished = tasks
        .iter()
        .filter(|(_, handle)| handle.join.is_finished())
        .map(|(id, _)| id.clone())
        .collect::<Vec<_>>();
    for id in finished {
        if let Some(handle) = tasks.remove(&id) {
            let _ = handle.join.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::dialogs::{Dialogs, FilePicker, NoticeKind, ShutdownAwareDialogs};
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let started = Instant::now();
        while started.elapsed() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        condition()
    }

    /// Blocks in `notify` until released, like a modal that needs the event
    /// loop to be dismissed.
    struct BlockingDialogs {
        release: mpsc::Receiver<()>,
        shown: Arc<AtomicUsize>,
    }

    impl Dialogs for BlockingDialogs {
        fn pick_file(&self, _picker: &FilePicker) -> Option<PathBuf> {
            None
        }

        fn notify(&self, _kind: NoticeKind, _title: &str, _message: &str) {
            self.shown.fetch_add(1, Ordering::SeqCst);
            let _ = self.release.recv_timeout(Duration::from_secs(30));
        }
    }

    #[test]
    fn rejects_duplicate_running_id() {
        let tasks = BackgroundTasks::new();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let worker = move |_: Arc<AtomicBool>| {
            let _ = release_rx.recv();
        };
        tasks.spawn("abc", "custom", worker, "trace-1").expect("spawn");

        let err = tasks
            .spawn("abc", "custom", |_| {}, "trace-2")
            .expect_err("duplicate");
        assert_eq!(err.code, "ERR_VALIDATION");
        assert!(err.error.contains("already running"));

        release_tx.send(()).expect("release");
        assert_eq!(tasks.shutdown(false), 1);
    }

    #[test]
    fn finished_tasks_are_pruned_and_id_can_be_reused() {
        let tasks = BackgroundTasks::new();
        tasks.spawn("abc", "custom", |_| {}, "trace").expect("spawn");
        assert!(wait_until(Duration::from_secs(5), || tasks.running().is_empty()));
        tasks.spawn("abc", "custom", |_| {}, "trace").expect("respawn");
        tasks.shutdown(false);
    }

    #[test]
    fn cancel_sets_the_workers_flag() {
        let tasks = BackgroundTasks::new();
        let observed = Arc::new(AtomicUsize::new(0));
        let observed_worker = Arc::clone(&observed);
        let worker = move |flag: Arc<AtomicBool>| {
            while !flag.load(Ordering::Relaxed) {
                std::thread::sleep(Duration::from_millis(5));
            }
            observed_worker.store(1, Ordering::SeqCst);
        };
        tasks.spawn("job", "custom", worker, "trace").expect("spawn");

        assert_eq!(tasks.running().len(), 1);
        assert!(tasks.cancel("job"));
        assert!(!tasks.cancel("missing"));
        assert!(wait_until(Duration::from_secs(5), || {
            observed.load(Ordering::SeqCst) == 1
        }));
        tasks.shutdown(false);
    }

    #[test]
    fn shutdown_cancels_and_joins_outstanding_workers() {
        let tasks = BackgroundTasks::new();
        let finished = Arc::new(AtomicUsize::new(0));
        for id in ["a", "b"] {
            let finished = Arc::clone(&finished);
            let worker = move |flag: Arc<AtomicBool>| {
                while !flag.load(Ordering::Relaxed) {
                    std::thread::sleep(Duration::from_millis(5));
                }
                finished.fetch_add(1, Ordering::SeqCst);
            };
            tasks.spawn(id, "custom", worker, "trace").expect("spawn");
        }

        assert_eq!(tasks.shutdown(true), 2);
        assert_eq!(finished.load(Ordering::SeqCst), 2);
        assert!(tasks.running().is_empty());
    }

    #[test]
    fn shutdown_without_cancel_waits_for_completion() {
        let tasks = BackgroundTasks::new();
        let finished = Arc::new(AtomicUsize::new(0));
        let finished_worker = Arc::clone(&finished);
        let worker = move |_: Arc<AtomicBool>| {
            std::thread::sleep(Duration::from_millis(100));
            finished_worker.store(1, Ordering::SeqCst);
        };
        tasks.spawn("slow", "custom", worker, "trace").expect("spawn");

        tasks.shutdown(false);
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn worker_reporting_during_shutdown_skips_its_dialog() {
        let tasks = BackgroundTasks::new();
        let signal = tasks.shutdown_signal();
        let shown = Arc::new(AtomicUsize::new(0));
        let (_release_tx, release_rx) = mpsc::channel();
        let dialogs = ShutdownAwareDialogs::new(
            BlockingDialogs {
                release: release_rx,
                shown: Arc::clone(&shown),
            },
            Arc::clone(&signal),
        );
        let worker = move |_: Arc<AtomicBool>| {
            while !signal.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(5));
            }
            dialogs.notify(NoticeKind::Info, "Success", "Command executed successfully!");
        };
        tasks.spawn("late", "custom", worker, "trace").expect("spawn");

        let started = Instant::now();
        assert_eq!(tasks.shutdown(false), 1);
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(shown.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn begin_shutdown_cancels_without_joining_and_blocks_new_work() {
        let tasks = BackgroundTasks::new();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let saw_cancel = Arc::new(AtomicUsize::new(0));
        let saw_cancel_worker = Arc::clone(&saw_cancel);
        let worker = move |flag: Arc<AtomicBool>| {
            let _ = release_rx.recv();
            if flag.load(Ordering::Relaxed) {
                saw_cancel_worker.store(1, Ordering::SeqCst);
            }
        };
        tasks.spawn("held", "custom", worker, "trace").expect("spawn");

        assert_eq!(tasks.begin_shutdown(true), 1);
        assert!(tasks.is_shutting_down());
        let err = tasks
            .spawn("fresh", "custom", |_| {}, "trace")
            .expect_err("spawn after shutdown");
        assert_eq!(err.code, "ERR_VALIDATION");

        release_tx.send(()).expect("release");
        assert_eq!(tasks.shutdown(false), 1);
        assert_eq!(saw_cancel.load(Ordering::SeqCst), 1);
    }
}
