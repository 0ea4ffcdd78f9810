#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowPhase {
    #[default]
    NoWindows,
    SplashShown,
    MainShown,
    Closed,
}

/// Why the main window is being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowMainTrigger {
    ReadinessConfirmed,
    ReadinessUnconfirmed,
    GracePeriodElapsed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowMainDecision {
    Create { close_splash: bool },
    FocusExisting,
    Ignore,
}

/// Splash/main handshake for one application run.
///
/// Every splash showing opens a new session; show-main requests carry the
/// session they were issued for, so a grace timer left over from an earlier
/// splash cannot act on a later one.
#[derive(Debug, Default)]
pub struct WindowStateMachine {
    phase: WindowPhase,
    session: u64,
    start_signal_taken: bool,
    shown_via: Option<ShowMainTrigger>,
}

impl WindowStateMachine {
    pub fn phase(&self) -> WindowPhase {
        self.phase
    }

    pub fn shown_via(&self) -> Option<ShowMainTrigger> {
        self.shown_via
    }

    /// Returns the new session when a splash should be created.
    pub fn begin_splash(&mut self) -> Option<u64> {
        match self.phase {
            WindowPhase::NoWindows | WindowPhase::Closed => {
                self.phase = WindowPhase::SplashShown;
                self.session += 1;
                self.start_signal_taken = false;
                self.shown_via = None;
                Some(self.session)
            }
            WindowPhase::SplashShown | WindowPhase::MainShown => None,
        }
    }

    /// One-shot: only the first start signal of a splash session is honored.
    pub fn take_start_signal(&mut self) -> Option<u64> {
        if self.phase != WindowPhase::SplashShown || self.start_signal_taken {
            return None;
        }
        self.start_signal_taken = true;
        Some(self.session)
    }

    pub fn request_show_main(&mut self, session: u64, trigger: ShowMainTrigger) -> ShowMainDecision {
        if session != self.session {
            return ShowMainDecision::Ignore;
        }
        match self.phase {
            WindowPhase::NoWindows | WindowPhase::SplashShown => {
                let close_splash = self.phase == WindowPhase::SplashShown;
                self.phase = WindowPhase::MainShown;
                self.shown_via = Some(trigger);
                ShowMainDecision::Create { close_splash }
            }
            WindowPhase::MainShown if trigger == ShowMainTrigger::GracePeriodElapsed => {
                ShowMainDecision::Ignore
            }
            WindowPhase::MainShown => ShowMainDecision::FocusExisting,
            WindowPhase::Closed => ShowMainDecision::Ignore,
        }
    }

    /// Main window creation failed; fall back to whatever is still open.
    pub fn main_creation_failed(&mut self, splash_still_open: bool) {
        if self.phase == WindowPhase::MainShown {
            self.phase = if splash_still_open {
                WindowPhase::SplashShown
            } else {
                WindowPhase::Closed
            };
            self.shown_via = None;
        }
    }

    pub fn mark_all_closed(&mut self) {
        self.phase = WindowPhase::Closed;
    }
}
