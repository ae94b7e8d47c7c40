//! Structural changes to the navigation world.
//!
//! Anything that would add, remove or re-link arena entries while a tick is
//! reading them is queued as a [`NavCommand`] and applied in one batch at the
//! end of the tick, in submission order.

use super::fixed_math::FixedVec2;
use super::preference::RequesterRole;
use super::steering::NavAgent;
use super::types::{AgentId, GroupId, LayerId, RequestId, Requester};

// ============================================================================
// Agents & groups
// ============================================================================

#[derive(Debug, Clone)]
pub enum NavCommand {
    /// Add an agent, or replace the one with the same id.
    SpawnAgent(NavAgent),
    DespawnAgent(AgentId),
    CreateGroup(GroupId),
    /// Remove a group, release its members and retire its request.
    DisbandGroup(GroupId),
    /// Move an agent into a group, leaving its previous one.
    JoinGroup { agent: AgentId, group: GroupId },
    LeaveGroup(AgentId),

    // ========================================================================
    // Flow fields
    // ========================================================================
    AddLayer { layer: LayerId, refresh_interval: Option<u64> },
    RemoveLayer(LayerId),
    AddFlowGoal { layer: LayerId, position: FixedVec2 },
    RemoveFlowGoal { layer: LayerId, position: FixedVec2 },
    /// Block or clear the flow-field cell under `position`.
    SetObstacle { position: FixedVec2, blocked: bool },

    // ========================================================================
    // Requests
    // ========================================================================
    AssignRole { requester: Requester, role: RequesterRole },
    CancelRequest(RequestId),
    RetireRequest(RequestId),
}

/// End-of-tick command buffer.
#[derive(Debug, Clone, Default)]
pub struct CommandQueue {
    pending: Vec<NavCommand>,
}

impl CommandQueue {
    pub fn push(&mut self, command: NavCommand) {
        self.pending.push(command);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Take every queued command, oldest first.
    pub fn drain(&mut self) -> Vec<NavCommand> {
        std::mem::take(&mut self.pending)
    }
}
