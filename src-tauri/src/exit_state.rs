#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownPhase {
    #[default]
    Running,
    CleanupInProgress,
    ReadyToExit,
    Exiting,
}

#[derive(Debug, Default)]
pub struct ExitStateMachine {
    phase: ShutdownPhase,
    /// Cleanup started by the last window closing, with the app staying alive.
    background_cleanup: bool,
}

impl ExitStateMachine {
    #[cfg(test)]
    pub fn phase(&self) -> ShutdownPhase {
        self.phase
    }

    pub fn is_exiting(&self) -> bool {
        matches!(
            self.phase,
            ShutdownPhase::ReadyToExit | ShutdownPhase::Exiting
        ) || (self.phase == ShutdownPhase::CleanupInProgress && !self.background_cleanup)
    }

    /// Starts the cleanup that precedes a real exit.
    ///
    /// A real exit takes over a background cleanup that is still running.
    pub fn try_begin_cleanup(&mut self) -> bool {
        match self.phase {
            ShutdownPhase::Running => {
                self.phase = ShutdownPhase::CleanupInProgress;
                self.background_cleanup = false;
                true
            }
            ShutdownPhase::CleanupInProgress if self.background_cleanup => {
                self.background_cleanup = false;
                true
            }
            _ => false,
        }
    }

    pub fn try_begin_background_cleanup(&mut self) -> bool {
        if self.phase != ShutdownPhase::Running {
            return false;
        }
        self.phase = ShutdownPhase::CleanupInProgress;
        self.background_cleanup = true;
        true
    }

    /// Backend stopped while the app keeps running without windows.
    pub fn finish_background_cleanup(&mut self) {
        if self.phase == ShutdownPhase::CleanupInProgress && self.background_cleanup {
            self.phase = ShutdownPhase::Running;
            self.background_cleanup = false;
        }
    }

    pub fn allow_next_exit_request(&mut self) {
        self.phase = ShutdownPhase::ReadyToExit;
        self.background_cleanup = false;
    }

    pub fn take_exit_request_allowance(&mut self) -> bool {
        if self.phase == ShutdownPhase::ReadyToExit {
            self.phase = ShutdownPhase::Exiting;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleanup_then_exit_allowance_is_consumed_once() {
        let mut machine = ExitStateMachine::default();
        assert!(!machine.is_exiting());
        assert!(!machine.take_exit_request_allowance());

        assert!(machine.try_begin_cleanup());
        assert!(machine.is_exiting());
        assert!(!machine.try_begin_cleanup());

        machine.allow_next_exit_request();
        assert!(machine.take_exit_request_allowance());
        assert_eq!(machine.phase(), ShutdownPhase::Exiting);
        assert!(!machine.take_exit_request_allowance());
    }

    #[test]
    fn background_cleanup_returns_to_running() {
        let mut machine = ExitStateMachine::default();
        assert!(machine.try_begin_background_cleanup());
        assert!(!machine.is_exiting());
        assert!(!machine.try_begin_background_cleanup());

        machine.finish_background_cleanup();
        assert_eq!(machine.phase(), ShutdownPhase::Running);
        assert!(machine.try_begin_cleanup());
    }

    #[test]
    fn real_exit_takes_over_background_cleanup() {
        let mut machine = ExitStateMachine::default();
        assert!(machine.try_begin_background_cleanup());
        assert!(machine.try_begin_cleanup());
        assert!(machine.is_exiting());
        assert!(!machine.try_begin_cleanup());

        machine.finish_background_cleanup();
        assert_eq!(machine.phase(), ShutdownPhase::CleanupInProgress);
    }

    #[test]
    fn finishing_background_cleanup_does_not_cancel_a_real_exit() {
        let mut machine = ExitStateMachine::default();
        assert!(machine.try_begin_cleanup());
        machine.finish_background_cleanup();
        assert_eq!(machine.phase(), ShutdownPhase::CleanupInProgress);
        assert!(machine.is_exiting());
    }
}
