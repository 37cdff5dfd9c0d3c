//! An `ActivityTracker` keeps a weighted population split into inactive and active agents and
//! draws active agents with probability proportional to their weight.
//!
//! Every unit of weight is a slot in one flat sequence. Slots below the divider belong to
//! inactive agents and slots from the divider on belong to active agents, so a weighted draw is
//! a single uniform index into the active region. Changing an agent's activity swaps its slots
//! across the divider, which costs time proportional to the agent's weight only.
//!
//! A tracker is either live, where activity changes apply immediately, or queued. Queued mode
//! models a channel that only takes attendance on its own schedule: changes are buffered and
//! replayed in agent order by [`ActivityTracker::activate`].

use std::collections::BTreeMap;

use log::trace;
use rand::Rng;

use crate::{AgentId, HashMap};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Activity {
    Inactive,
    Active,
}

#[derive(Debug, Clone)]
enum Mode {
    Live,
    Queued {
        saved_divider: usize,
        touch_policy: Activity,
        pending: BTreeMap<AgentId, Activity>,
    },
}

#[derive(Debug, Clone)]
pub struct ActivityTracker {
    slots: Vec<AgentId>,
    positions: HashMap<AgentId, Vec<usize>>,
    /// Index of the first active slot.
    divider: usize,
    mode: Mode,
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityTracker {
    #[must_use]
    pub fn new() -> Self {
        ActivityTracker {
            slots: Vec::new(),
            positions: HashMap::default(),
            divider: 0,
            mode: Mode::Live,
        }
    }

    /// Gives `agent` `multiplicity` more slots. A new agent starts active; an agent that is
    /// already tracked keeps its current activity.
    pub fn add(&mut self, agent: AgentId, multiplicity: usize) {
        let inactive = self.get_state(agent) == Some(Activity::Inactive);
        for _ in 0..multiplicity {
            let slot = self.slots.len();
            self.slots.push(agent);
            self.positions.entry(agent).or_default().push(slot);
            if inactive {
                self.swap_slots(slot, self.divider);
                self.divider += 1;
            }
        }
    }

    pub fn add_all(&mut self, agents: &[AgentId], multiplicity: usize) {
        for agent in agents {
            self.add(*agent, multiplicity);
        }
    }

    #[must_use]
    pub fn contains(&self, agent: AgentId) -> bool {
        self.positions.contains_key(&agent)
    }

    /// Returns the activity of `agent`, or `None` if it is not tracked.
    #[must_use]
    pub fn get_state(&self, agent: AgentId) -> Option<Activity> {
        let slot = *self.positions.get(&agent)?.first()?;
        Some(if slot >= self.divider {
            Activity::Active
        } else {
            Activity::Inactive
        })
    }

    /// Requests a change of activity. In queued mode the request is buffered until
    /// [`activate`](Self::activate); a later request for the same agent replaces an earlier one.
    /// Returns `false` if the agent is not tracked.
    pub fn set_state(&mut self, agent: AgentId, state: Activity) -> bool {
        if !self.contains(agent) {
            return false;
        }
        match &mut self.mode {
            Mode::Queued { pending, .. } => {
                pending.insert(agent, state);
            }
            Mode::Live => self.apply(agent, state),
        }
        true
    }

    /// The number of slots `agent` occupies, zero if it is not tracked.
    #[must_use]
    pub fn weight(&self, agent: AgentId) -> usize {
        self.positions.get(&agent).map_or(0, Vec::len)
    }

    #[must_use]
    pub fn total_len(&self) -> usize {
        self.slots.len()
    }

    /// Total weight of the active agents.
    #[must_use]
    pub fn active_len(&self) -> usize {
        self.slots.len() - self.divider
    }

    pub fn agents(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.positions.keys().copied()
    }

    /// Draws an active agent with probability proportional to its weight.
    pub fn random<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<AgentId> {
        if self.divider == self.slots.len() {
            return None;
        }
        Some(self.slots[rng.random_range(self.divider..self.slots.len())])
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(self.mode, Mode::Live)
    }

    /// Switches to queued mode, remembering the current divider. While queued,
    /// [`touch`](Self::touch) moves agents to `touch_policy`. Does nothing if already queued.
    pub fn deactivate(&mut self, touch_policy: Activity) {
        if self.is_live() {
            self.mode = Mode::Queued {
                saved_divider: self.divider,
                touch_policy,
                pending: BTreeMap::new(),
            };
        }
    }

    /// Returns to live mode: restores the divider remembered by
    /// [`deactivate`](Self::deactivate), which reverts every touch since then, and then applies
    /// the buffered requests in agent order.
    pub fn activate(&mut self) {
        let Mode::Queued {
            saved_divider,
            pending,
            ..
        } = std::mem::replace(&mut self.mode, Mode::Live)
        else {
            return;
        };
        self.divider = saved_divider;
        if !pending.is_empty() {
            trace!("applying {} queued activity changes", pending.len());
        }
        for (agent, state) in pending {
            self.apply(agent, state);
        }
    }

    /// In queued mode, moves `agent` to the touch policy right away. Does nothing when live.
    pub fn touch(&mut self, agent: AgentId) {
        if let Mode::Queued { touch_policy, .. } = self.mode {
            if self.contains(agent) {
                self.apply(agent, touch_policy);
            }
        }
    }

    fn apply(&mut self, agent: AgentId, state: Activity) {
        if self.get_state(agent) == Some(state) {
            return;
        }
        let weight = self.weight(agent);
        match state {
            Activity::Inactive => {
                self.move_to(agent, self.divider);
                self.divider += weight;
            }
            Activity::Active => {
                let divider = self.divider - weight;
                self.move_to(agent, divider);
                self.divider = divider;
            }
        }
    }

    /// Moves all slots of `agent` into the contiguous range starting at `begin`, swapping out
    /// the current occupants of that range.
    fn move_to(&mut self, agent: AgentId, begin: usize) {
        let Some(seats) = self.positions.remove(&agent) else {
            return;
        };
        let end = begin + seats.len();
        let mut moved = Vec::with_capacity(seats.len());
        let mut target = begin;
        for seat in seats {
            if (begin..end).contains(&seat) {
                moved.push(seat);
                continue;
            }
            while self.slots[target] == agent {
                target += 1;
            }
            let occupant = self.slots[target];
            if let Some(occupant_seats) = self.positions.get_mut(&occupant) {
                if let Some(entry) = occupant_seats.iter_mut().find(|s| **s == target) {
                    *entry = seat;
                }
            }
            self.slots[seat] = occupant;
            self.slots[target] = agent;
            moved.push(target);
        }
        self.positions.insert(agent, moved);
    }

    fn swap_slots(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        let (agent_a, agent_b) = (self.slots[a], self.slots[b]);
        for (agent, from, to) in [(agent_a, a, b), (agent_b, b, a)] {
            if let Some(seats) = self.positions.get_mut(&agent) {
                if let Some(entry) = seats.iter_mut().find(|s| **s == from) {
                    *entry = to;
                }
            }
        }
        self.slots.swap(a, b);
    }
}
