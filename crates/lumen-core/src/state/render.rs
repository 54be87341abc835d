//! Render lifecycle state machine

use std::fmt;

use crate::error::{PresenterError, PresenterResult};

/// Presenter lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderState {
    /// No services attached, or services released (terminal)
    #[default]
    Shutdown,
    Stopped,
    Started,
    Paused,
}

impl RenderState {
    /// Started or Paused
    pub fn is_active(self) -> bool {
        matches!(self, RenderState::Started | RenderState::Paused)
    }

    pub(crate) fn as_u8(self) -> u8 {
        match self {
            RenderState::Shutdown => 0,
            RenderState::Stopped => 1,
            RenderState::Started => 2,
            RenderState::Paused => 3,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => RenderState::Stopped,
            2 => RenderState::Started,
            3 => RenderState::Paused,
            _ => RenderState::Shutdown,
        }
    }
}

impl fmt::Display for RenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderState::Shutdown => write!(f, "shutdown"),
            RenderState::Stopped => write!(f, "stopped"),
            RenderState::Started => write!(f, "started"),
            RenderState::Paused => write!(f, "paused"),
        }
    }
}

/// Gatekeeper for presenter operations
///
/// ```text
///   Shutdown ──attach──► Stopped ◄──stop── Started / Paused
///                          │  ▲                │      ▲
///                    start │  └─────stop───────┘      │ pause (Started only)
///                          ▼                          │
///                       Started ◄──── restart ─── Paused
///
///   any state ──release──► Shutdown (terminal)
/// ```
///
/// The initial Shutdown only differs from the terminal one in that services
/// have never been attached; once released, nothing leaves Shutdown again.
#[derive(Debug, Default)]
pub struct RenderStateMachine {
    state: RenderState,
    released: bool,
}

impl RenderStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Whether services have been released (terminal shutdown)
    pub fn is_released(&self) -> bool {
        self.released
    }

    fn transition(&mut self, to: RenderState) {
        if self.state != to {
            log::info!("[PRESENTER] Render state {} -> {}", self.state, to);
            self.state = to;
        }
    }

    fn invalid(&self, operation: &'static str) -> PresenterError {
        PresenterError::InvalidState {
            operation,
            state: self.state,
        }
    }

    /// Fail if services were released
    pub fn check_shutdown(&self, operation: &'static str) -> PresenterResult<()> {
        if self.released {
            return Err(self.invalid(operation));
        }
        Ok(())
    }

    /// Services attached: Shutdown -> Stopped (initial shutdown only)
    pub fn attach_services(&mut self) -> PresenterResult<()> {
        self.check_shutdown("attach services")?;
        if self.state != RenderState::Shutdown {
            return Err(self.invalid("attach services"));
        }
        self.transition(RenderState::Stopped);
        Ok(())
    }

    fn check_attached(&self, operation: &'static str) -> PresenterResult<()> {
        self.check_shutdown(operation)?;
        if self.state == RenderState::Shutdown {
            return Err(self.invalid(operation));
        }
        Ok(())
    }

    pub fn clock_start(&mut self) -> PresenterResult<()> {
        self.check_attached("start")?;
        self.transition(RenderState::Started);
        Ok(())
    }

    pub fn clock_restart(&mut self) -> PresenterResult<()> {
        self.check_attached("restart")?;
        self.transition(RenderState::Started);
        Ok(())
    }

    /// Started -> Paused; pausing from any other state is rejected
    pub fn clock_pause(&mut self) -> PresenterResult<()> {
        self.check_attached("pause")?;
        if self.state != RenderState::Started {
            return Err(self.invalid("pause"));
        }
        self.transition(RenderState::Paused);
        Ok(())
    }

    pub fn clock_stop(&mut self) -> PresenterResult<()> {
        self.check_attached("stop")?;
        self.transition(RenderState::Stopped);
        Ok(())
    }

    /// Release services: any state -> Shutdown, irreversibly
    ///
    /// Returns `false` if already released.
    pub fn shutdown(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;
        self.transition(RenderState::Shutdown);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attached() -> RenderStateMachine {
        let mut machine = RenderStateMachine::new();
        machine.attach_services().unwrap();
        machine
    }

    #[test]
    fn test_lifecycle() {
        let mut machine = RenderStateMachine::new();
        assert_eq!(machine.state(), RenderState::Shutdown);
        assert!(machine.clock_start().is_err());

        machine.attach_services().unwrap();
        assert_eq!(machine.state(), RenderState::Stopped);
        assert!(!machine.is_active());

        machine.clock_start().unwrap();
        assert!(machine.is_active());
        machine.clock_pause().unwrap();
        assert_eq!(machine.state(), RenderState::Paused);
        machine.clock_restart().unwrap();
        assert_eq!(machine.state(), RenderState::Started);
        machine.clock_stop().unwrap();
        assert_eq!(machine.state(), RenderState::Stopped);
    }

    #[test]
    fn test_pause_only_from_started() {
        let mut machine = attached();
        assert_eq!(
            machine.clock_pause(),
            Err(PresenterError::InvalidState {
                operation: "pause",
                state: RenderState::Stopped
            })
        );
        assert_eq!(machine.state(), RenderState::Stopped);
    }

    #[test]
    fn test_shutdown_reachable_from_every_state_and_terminal() {
        let setups: [fn(&mut RenderStateMachine); 4] = [
            |_| {},
            |m| m.attach_services().unwrap(),
            |m| {
                m.attach_services().unwrap();
                m.clock_start().unwrap();
            },
            |m| {
                m.attach_services().unwrap();
                m.clock_start().unwrap();
                m.clock_pause().unwrap();
            },
        ];

        for setup in setups {
            let mut machine = RenderStateMachine::new();
            setup(&mut machine);
            assert!(machine.shutdown());
            assert_eq!(machine.state(), RenderState::Shutdown);

            assert!(machine.attach_services().is_err());
            assert!(machine.clock_start().is_err());
            assert!(machine.clock_restart().is_err());
            assert!(machine.clock_stop().is_err());
            assert!(machine.check_shutdown("flush").is_err());
            assert!(!machine.shutdown());
            assert_eq!(machine.state(), RenderState::Shutdown);
        }
    }

    #[test]
    fn test_attach_twice_rejected() {
        let mut machine = attached();
        assert!(machine.attach_services().is_err());
    }
}
