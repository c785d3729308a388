use tokio::task::JoinHandle;

/// A spawned periodic job. Stopping or dropping the handle aborts the task.
pub struct BackgroundTask {
    name: &'static str,
    task: JoinHandle<()>,
}

impl BackgroundTask {
    pub(crate) fn new(name: &'static str, task: JoinHandle<()>) -> Self {
        Self { name, task }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        self.task.abort();
    }
}
