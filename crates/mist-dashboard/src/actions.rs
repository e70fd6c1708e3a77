use mist_api::MachineState;
use serde::Serialize;

use crate::ProviderKind;

/// Which lifecycle actions a machine currently supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MachineActions {
    pub can_start: bool,
    pub can_stop: bool,
    pub can_destroy: bool,
    pub can_reboot: bool,
}

impl MachineActions {
    /// Every provider can destroy and reboot a running machine; only EC2
    /// supports stop/start. EC2 reports stopped instances as `unknown`.
    pub fn for_state(state: MachineState, provider: ProviderKind) -> Self {
        let ec2 = provider == ProviderKind::Ec2;
        let mut actions = Self {
            can_start: false,
            can_stop: ec2,
            can_destroy: true,
            can_reboot: true,
        };

        match state {
            MachineState::Running => {}
            MachineState::Rebooting => {
                actions.can_stop = false;
                actions.can_reboot = false;
            }
            MachineState::Terminated => {
                actions.can_stop = false;
                actions.can_reboot = false;
            }
            MachineState::Stopped => {
                actions.can_start = true;
                actions.can_stop = false;
                actions.can_reboot = false;
            }
            MachineState::Unknown if ec2 => {
                actions.can_start = true;
                actions.can_stop = false;
                actions.can_reboot = false;
            }
            MachineState::Pending | MachineState::Unknown => {
                actions = Self {
                    can_start: false,
                    can_stop: false,
                    can_destroy: false,
                    can_reboot: false,
                };
            }
        }

        actions
    }
}
