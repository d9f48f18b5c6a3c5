use crate::app::tasks::BackgroundTasks;

pub struct AppState {
    pub tasks: BackgroundTasks,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            tasks: BackgroundTasks::new(),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
