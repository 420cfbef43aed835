use crate::error::OrchestratorError;
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Screen {
    #[default]
    Upload,
    Loading,
    Results,
    Guide,
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Screen::Upload => write!(f, "upload"),
            Screen::Loading => write!(f, "loading"),
            Screen::Results => write!(f, "results"),
            Screen::Guide => write!(f, "guide"),
        }
    }
}

/// Tracks the active view. Every mutator either moves to the requested
/// screen or returns `IllegalTransition` and leaves the current one alone.
#[derive(Debug, Clone, Default)]
pub struct ScreenMachine {
    current: Screen,
}

impl ScreenMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Screen {
        self.current
    }

    /// Upload -> Loading. The caller has already checked the queue is non-empty.
    pub fn begin_batch(&mut self) -> Result<Screen, OrchestratorError> {
        self.transition(Screen::Upload, Screen::Loading)
    }

    /// Loading -> Results when anything succeeded, otherwise back to Upload.
    pub fn finish_batch(&mut self, successes: usize) -> Result<Screen, OrchestratorError> {
        let to = if successes > 0 {
            Screen::Results
        } else {
            Screen::Upload
        };
        self.transition(Screen::Loading, to)
    }

    pub fn open_guide(&mut self) -> Result<Screen, OrchestratorError> {
        self.transition(Screen::Results, Screen::Guide)
    }

    pub fn back_to_results(&mut self) -> Result<Screen, OrchestratorError> {
        self.transition(Screen::Guide, Screen::Results)
    }

    /// Picking a past result. Only the upload view jumps; results and guide
    /// keep showing whatever view the user is on.
    pub fn show_history_pick(&mut self) -> Screen {
        if self.current == Screen::Upload {
            self.current = Screen::Results;
        }
        self.current
    }

    pub fn reset(&mut self) -> Screen {
        self.current = Screen::Upload;
        self.current
    }

    fn transition(&mut self, from: Screen, to: Screen) -> Result<Screen, OrchestratorError> {
        if self.current != from {
            return Err(OrchestratorError::IllegalTransition {
                from: self.current,
                to,
            });
        }
        self.current = to;
        Ok(to)
    }
}
