//! Entity identity, state vocabulary and the lifecycle state machine.
//!
//! Entities never mutate their state directly: they request a transition,
//! the request is validated and deduplicated, and an instant event applies
//! it at [`crate::event::TRANSITION_PRIORITY`]. The split between request
//! validation ([`EntityCore::check_request`]) and fire-time gating
//! ([`EntityCore::should_fire`]) mirrors that two-phase shape.

use crate::time::SimTime;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable integer identity of a simulated entity. Identities index the
/// arena registries owned by the simulation context; entities reference
/// each other by id, never by pointer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct EntityId(u64);

impl EntityId {
    /// Construct from a raw counter value.
    pub const fn from_raw(raw: u64) -> Self {
        EntityId(raw)
    }

    /// The raw counter value.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

bitflags! {
    /// Multi-valued state tag set over the closed lifecycle vocabulary.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StateSet: u16 {
        const CREATED         = 1 << 0;
        const INITIATED       = 1 << 1;
        const SUCCESS         = 1 << 2;
        const FAIL            = 1 << 3;
        const TERMINATED      = 1 << 4;
        const DESTROYED       = 1 << 5;
        const POWER_ON        = 1 << 6;
        const POWER_OFF       = 1 << 7;
        const SCHEDULED       = 1 << 8;
        const ALLOCATED       = 1 << 9;
        const READY           = 1 << 10;
        const DECODED         = 1 << 11;
        const IN_TRANSMISSION = 1 << 12;
    }
}

/// Lifecycle transitions, requested via the engine and applied by instant
/// events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    Create,
    Initiate,
    Success,
    Fail,
    Terminate,
    Destroy,
    PowerOn,
    PowerOff,
}

impl Transition {
    /// Owner-scoped event tag used for deduplication and cancellation.
    pub const fn tag(self) -> u32 {
        match self {
            Transition::Create => 0,
            Transition::Initiate => 1,
            Transition::Success => 2,
            Transition::Fail => 3,
            Transition::Terminate => 4,
            Transition::Destroy => 5,
            Transition::PowerOn => 6,
            Transition::PowerOff => 7,
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Transition::Create => "create",
            Transition::Initiate => "initiate",
            Transition::Success => "success",
            Transition::Fail => "fail",
            Transition::Terminate => "terminate",
            Transition::Destroy => "destroy",
            Transition::PowerOn => "power on",
            Transition::PowerOff => "power off",
        };
        f.write_str(name)
    }
}

/// Outcome of validating a transition request against the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestCheck {
    /// The transition may be scheduled.
    Proceed,
    /// The request is impossible in the current state; warn and drop it.
    Reject(&'static str),
    /// The request is redundant; drop it without a warning.
    Redundant,
}

/// Named slot of a resource inside its owning entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceSlot {
    /// Working memory of a hardware node.
    Ram,
    /// Persistent storage of a hardware node.
    Rom,
    /// Admission-control reservoir over RAM.
    RamReservoir,
    /// Admission-control reservoir over ROM.
    RomReservoir,
    /// Admission-control reservoir over milli-CPU shares.
    CpuReservoir,
    /// Computational power of a CPU core.
    Compute,
    /// Bandwidth of a port.
    Bandwidth,
    /// Backing store of a volume.
    Store,
}

/// Address of a resource: the entity that owns it plus the slot within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    pub owner: EntityId,
    pub slot: ResourceSlot,
}

/// An amount of a resource held on behalf of an entity, returned to the
/// resource when the entity terminates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Claim {
    pub resource: ResourceRef,
    pub amount: f64,
}

/// Shared lifecycle kernel embedded in every simulated entity.
#[derive(Debug, Clone)]
pub struct EntityCore {
    id: EntityId,
    label: String,
    states: StateSet,
    created_at: Option<SimTime>,
    terminated_at: Option<SimTime>,
    precursors: Vec<EntityId>,
    claims: Vec<Claim>,
}

impl EntityCore {
    /// Fresh entity with no state tags set.
    pub fn new(id: EntityId, label: impl Into<String>) -> Self {
        EntityCore {
            id,
            label: label.into(),
            states: StateSet::empty(),
            created_at: None,
            terminated_at: None,
            precursors: Vec::new(),
            claims: Vec::new(),
        }
    }

    /// Attach the precursor set gating this entity's creation.
    pub fn with_precursors(mut self, precursors: Vec<EntityId>) -> Self {
        self.precursors = precursors;
        self
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn states(&self) -> StateSet {
        self.states
    }

    pub fn precursors(&self) -> &[EntityId] {
        &self.precursors
    }

    pub fn created_at(&self) -> Option<SimTime> {
        self.created_at
    }

    pub fn terminated_at(&self) -> Option<SimTime> {
        self.terminated_at
    }

    pub fn created(&self) -> bool {
        self.states.contains(StateSet::CREATED)
    }

    /// Initiated, and still alive: a failed or terminated entity no longer
    /// counts as an active member of any pool.
    pub fn initiated(&self) -> bool {
        self.states.contains(StateSet::INITIATED) && !self.failed() && !self.terminated()
    }

    pub fn succeeded(&self) -> bool {
        self.states.contains(StateSet::SUCCESS)
    }

    pub fn failed(&self) -> bool {
        self.states.contains(StateSet::FAIL)
    }

    pub fn terminated(&self) -> bool {
        self.states.contains(StateSet::TERMINATED)
    }

    pub fn destroyed(&self) -> bool {
        self.states.contains(StateSet::DESTROYED)
    }

    pub fn powered_on(&self) -> bool {
        self.states.contains(StateSet::POWER_ON)
    }

    pub fn powered_off(&self) -> bool {
        self.states.contains(StateSet::POWER_OFF) || !self.states.contains(StateSet::POWER_ON)
    }

    pub fn scheduled(&self) -> bool {
        self.states.contains(StateSet::SCHEDULED)
    }

    pub fn ready(&self) -> bool {
        self.states.contains(StateSet::READY)
    }

    pub fn decoded(&self) -> bool {
        self.states.contains(StateSet::DECODED)
    }

    pub fn in_transmission(&self) -> bool {
        self.states.contains(StateSet::IN_TRANSMISSION)
    }

    /// Insert an auxiliary state tag (SCHEDULED, READY, DECODED, ...).
    pub fn set_state(&mut self, state: StateSet) {
        self.states.insert(state);
    }

    /// Remove an auxiliary state tag.
    pub fn clear_state(&mut self, state: StateSet) {
        self.states.remove(state);
    }

    /// Validate a transition request against the current state.
    pub fn check_request(&self, transition: Transition) -> RequestCheck {
        use RequestCheck::*;
        match transition {
            Transition::Create => {
                if self.created() {
                    Reject("already created")
                } else {
                    Proceed
                }
            }
            Transition::Initiate => {
                if self.states.contains(StateSet::INITIATED) {
                    Reject("already initiated")
                } else if self.terminated() {
                    Reject("already terminated")
                } else {
                    Proceed
                }
            }
            Transition::Success => {
                if self.failed() {
                    Reject("already terminated unsuccessfully")
                } else if self.terminated() {
                    Reject("already terminated")
                } else {
                    Proceed
                }
            }
            Transition::Fail => {
                if self.succeeded() {
                    Reject("already terminated successfully")
                } else if self.terminated() {
                    Reject("already terminated")
                } else if self.failed() {
                    Redundant
                } else {
                    Proceed
                }
            }
            Transition::Terminate => {
                if self.terminated() {
                    Redundant
                } else {
                    Proceed
                }
            }
            Transition::Destroy => {
                if self.destroyed() {
                    Redundant
                } else {
                    Proceed
                }
            }
            Transition::PowerOn => {
                if self.powered_on() {
                    Reject("already powered on")
                } else if self.failed() {
                    Reject("has failed")
                } else if self.terminated() {
                    Reject("already terminated")
                } else {
                    Proceed
                }
            }
            Transition::PowerOff => {
                if self.powered_off() {
                    Reject("already powered off")
                } else if self.failed() {
                    Reject("has failed")
                } else if self.terminated() {
                    Reject("already terminated")
                } else {
                    Proceed
                }
            }
        }
    }

    /// Re-check gating at fire time; requests raced by other transitions in
    /// the same tick fizzle here.
    pub fn should_fire(&self, transition: Transition) -> bool {
        match transition {
            Transition::Create => !self.created(),
            Transition::Initiate => !self.states.contains(StateSet::INITIATED) && !self.terminated(),
            Transition::Success => !self.succeeded() && !self.failed() && !self.terminated(),
            Transition::Fail => !self.failed() && !self.terminated(),
            Transition::Terminate => !self.terminated(),
            Transition::Destroy => !self.destroyed(),
            Transition::PowerOn => !self.powered_on() && !self.failed() && !self.terminated(),
            Transition::PowerOff => !self.powered_off() && !self.terminated(),
        }
    }

    /// Apply a fired transition to the state set.
    pub fn apply(&mut self, transition: Transition, now: SimTime) {
        match transition {
            Transition::Create => {
                self.states.insert(StateSet::CREATED);
                self.created_at = Some(now);
            }
            Transition::Initiate => self.states.insert(StateSet::INITIATED),
            Transition::Success => self.states.insert(StateSet::SUCCESS),
            Transition::Fail => self.states.insert(StateSet::FAIL),
            Transition::Terminate => {
                self.states.insert(StateSet::TERMINATED);
                self.terminated_at = Some(now);
            }
            Transition::Destroy => self.states.insert(StateSet::DESTROYED),
            Transition::PowerOn => {
                self.states.insert(StateSet::POWER_ON);
                self.states.remove(StateSet::POWER_OFF);
            }
            Transition::PowerOff => {
                self.states.insert(StateSet::POWER_OFF);
                self.states.remove(StateSet::POWER_ON);
            }
        }
    }

    /// Record a successful resource claim held by this entity.
    pub fn push_claim(&mut self, resource: ResourceRef, amount: f64) {
        self.claims.push(Claim { resource, amount });
    }

    /// Reduce claims on `resource` by `amount` (used when a held amount is
    /// explicitly returned before termination).
    pub fn release_claim(&mut self, resource: ResourceRef, mut amount: f64) {
        for claim in self.claims.iter_mut() {
            if claim.resource == resource {
                let released = claim.amount.min(amount);
                claim.amount -= released;
                amount -= released;
                if amount <= 0.0 {
                    break;
                }
            }
        }
        self.claims.retain(|c| c.amount > 0.0);
    }

    /// Drain every outstanding claim; invoked once when the entity
    /// terminates.
    pub fn take_claims(&mut self) -> Vec<Claim> {
        std::mem::take(&mut self.claims)
    }

    /// Outstanding claims (test and telemetry access).
    pub fn claims(&self) -> &[Claim] {
        &self.claims
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core() -> EntityCore {
        EntityCore::new(EntityId::from_raw(1), "test")
    }

    #[test]
    fn test_success_and_fail_are_exclusive() {
        let mut c = core();
        c.apply(Transition::Create, SimTime::ZERO);
        c.apply(Transition::Success, SimTime::ZERO);
        assert!(matches!(
            c.check_request(Transition::Fail),
            RequestCheck::Reject(_)
        ));

        let mut c = core();
        c.apply(Transition::Fail, SimTime::ZERO);
        assert!(matches!(
            c.check_request(Transition::Success),
            RequestCheck::Reject(_)
        ));
    }

    #[test]
    fn test_terminated_blocks_further_transitions() {
        let mut c = core();
        c.apply(Transition::Terminate, SimTime::from_ticks(7));
        assert_eq!(c.terminated_at(), Some(SimTime::from_ticks(7)));
        assert!(!c.should_fire(Transition::Initiate));
        assert!(!c.should_fire(Transition::Success));
        assert!(!c.should_fire(Transition::Fail));
    }

    #[test]
    fn test_power_toggling() {
        let mut c = core();
        assert!(c.powered_off());
        c.apply(Transition::PowerOn, SimTime::ZERO);
        assert!(c.powered_on());
        assert!(!c.powered_off());
        assert!(matches!(
            c.check_request(Transition::PowerOn),
            RequestCheck::Reject(_)
        ));
        c.apply(Transition::PowerOff, SimTime::ZERO);
        assert!(c.powered_off());
    }

    #[test]
    fn test_initiated_requires_liveness() {
        let mut c = core();
        c.apply(Transition::Create, SimTime::ZERO);
        c.apply(Transition::Initiate, SimTime::ZERO);
        assert!(c.initiated());
        c.apply(Transition::Fail, SimTime::ZERO);
        assert!(!c.initiated());
    }

    #[test]
    fn test_claim_ledger() {
        let mut c = core();
        let r = ResourceRef {
            owner: EntityId::from_raw(9),
            slot: ResourceSlot::Ram,
        };
        c.push_claim(r, 100.0);
        c.push_claim(r, 50.0);
        c.release_claim(r, 120.0);
        let held: f64 = c.claims().iter().map(|cl| cl.amount).sum();
        assert!((held - 30.0).abs() < 1e-9);
        let drained = c.take_claims();
        assert_eq!(drained.len(), 1);
        assert!(c.claims().is_empty());
    }
}
