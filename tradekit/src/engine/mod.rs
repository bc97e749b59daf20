use thiserror::Error;
use tracing::warn;

pub use data::{DataCommand, DataEngine, DataEngineConfig};
pub use execution::{ExecutionEngine, ExecutionEngineConfig};

/// The data engine: subscription routing, caching and request correlation.
pub mod data;
/// The execution engine: command routing, order and position state.
pub mod execution;

/// Illegal engine state transitions.
#[derive(Error, Debug, PartialEq)]
pub enum LifecycleError {
    #[error("{component} has been disposed and cannot be restarted")]
    Disposed { component: &'static str },
}

/// Engine component state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComponentState {
    Ready,
    Running,
    Stopped,
    Disposed,
}

/// The shared start/stop/reset/dispose state machine for engines.
///
/// Contracts: `reset` and `dispose` are no-ops while running; `start` after
/// `dispose` fails.
#[derive(Debug)]
pub struct Lifecycle {
    component: &'static str,
    state: ComponentState,
}

impl Lifecycle {
    pub fn new(component: &'static str) -> Self {
        Self {
            component,
            state: ComponentState::Ready,
        }
    }

    pub fn state(&self) -> ComponentState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ComponentState::Running
    }

    pub fn start(&mut self) -> Result<(), LifecycleError> {
        match self.state {
            ComponentState::Disposed => Err(LifecycleError::Disposed {
                component: self.component,
            }),
            ComponentState::Running => {
                warn!(component = self.component, "already running");
                Ok(())
            }
            _ => {
                self.state = ComponentState::Running;
                Ok(())
            }
        }
    }

    pub fn stop(&mut self) {
        match self.state {
            ComponentState::Running => self.state = ComponentState::Stopped,
            _ => warn!(component = self.component, state = ?self.state, "stop ignored"),
        }
    }

    /// Returns whether the caller should actually clear its state: only when
    /// stopped (or never started).
    pub fn reset(&mut self) -> Result<bool, LifecycleError> {
        match self.state {
            ComponentState::Running => {
                warn!(component = self.component, "reset ignored while running");
                Ok(false)
            }
            ComponentState::Disposed => Err(LifecycleError::Disposed {
                component: self.component,
            }),
            _ => {
                self.state = ComponentState::Ready;
                Ok(true)
            }
        }
    }

    /// Returns whether disposal actually happened; a no-op while running.
    pub fn dispose(&mut self) -> bool {
        match self.state {
            ComponentState::Running => {
                warn!(component = self.component, "dispose ignored while running");
                false
            }
            _ => {
                self.state = ComponentState::Disposed;
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_stop_reset_reaches_fresh_state() {
        let mut lifecycle = Lifecycle::new("TestEngine");
        lifecycle.start().unwrap();
        lifecycle.stop();
        assert!(lifecycle.reset().unwrap());
        assert_eq!(lifecycle.state(), ComponentState::Ready);
    }

    #[test]
    fn reset_while_running_is_a_noop() {
        let mut lifecycle = Lifecycle::new("TestEngine");
        lifecycle.start().unwrap();
        assert!(!lifecycle.reset().unwrap());
        assert_eq!(lifecycle.state(), ComponentState::Running);
    }

    #[test]
    fn dispose_while_running_is_a_noop() {
        let mut lifecycle = Lifecycle::new("TestEngine");
        lifecycle.start().unwrap();
        assert!(!lifecycle.dispose());
        assert_eq!(lifecycle.state(), ComponentState::Running);
    }

    #[test]
    fn dispose_while_stopped_is_terminal() {
        let mut lifecycle = Lifecycle::new("TestEngine");
        lifecycle.start().unwrap();
        lifecycle.stop();
        assert!(lifecycle.dispose());
        assert_eq!(lifecycle.state(), ComponentState::Disposed);
    }

    #[test]
    fn start_after_dispose_fails() {
        let mut lifecycle = Lifecycle::new("TestEngine");
        lifecycle.dispose();
        assert_eq!(
            lifecycle.start(),
            Err(LifecycleError::Disposed {
                component: "TestEngine"
            })
        );
    }
}
