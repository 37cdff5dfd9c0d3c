//! Channels over small, explicitly listed groups (friend clusters, households) where every
//! possible pair can be enumerated up front.
//!
//! A stochastic channel draws, per group and day, a Poisson number of pairs with replacement
//! from the group's pair list. A permanent channel fires every pair a fixed number of times per
//! day. Either way, a pair only counts when both agents attend on that day.

use std::sync::Arc;

use log::trace;
use rand::Rng;

use super::roster::AbsenteeRoster;
use crate::error::ContactError;
use crate::poisson::PoissonSampler;
use crate::window::StateWindow;
use crate::{AgentId, HashMap, PartnerCounts};

/// How the pairs of a sparse channel fire.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Firing {
    Stochastic,
    /// Every pair fires `rate` times each day.
    Permanent { rate: u32 },
}

#[derive(Debug, Clone)]
struct PairGroup {
    /// Ordered (transmitter, receiver) pairs.
    pairs: Vec<(AgentId, AgentId)>,
    /// Pair intensity for each day of the week.
    day_weights: [f64; 7],
}

#[derive(Debug, Clone)]
pub struct SparseContact {
    label: String,
    firing: Firing,
    groups: Vec<PairGroup>,
    groups_of: HashMap<AgentId, Vec<usize>>,
    roster: AbsenteeRoster,
    /// Pairs drawn for each group, per day.
    draws: StateWindow<HashMap<usize, Vec<(AgentId, AgentId)>>>,
    poisson: Arc<PoissonSampler>,
}

impl SparseContact {
    #[must_use]
    pub fn new(label: impl Into<String>, poisson: Arc<PoissonSampler>, history_days: usize) -> Self {
        SparseContact {
            label: label.into(),
            firing: Firing::Stochastic,
            groups: Vec::new(),
            groups_of: HashMap::default(),
            roster: AbsenteeRoster::new(history_days),
            draws: StateWindow::new(history_days),
            poisson,
        }
    }

    /// A channel whose pairs fire `rate` times every day.
    #[must_use]
    pub fn permanent(
        label: impl Into<String>,
        rate: u32,
        poisson: Arc<PoissonSampler>,
        history_days: usize,
    ) -> Self {
        SparseContact {
            firing: Firing::Permanent { rate },
            ..Self::new(label, poisson, history_days)
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn firing(&self) -> Firing {
        self.firing
    }

    #[must_use]
    pub fn is_permanent(&self) -> bool {
        matches!(self.firing, Firing::Permanent { .. })
    }

    /// Adds a group containing every pair `(a, b)` with `a` in `transmit`, `b` in `receive` and
    /// `a != b`. Stochastic channels need the pair intensity of each weekday; permanent channels
    /// ignore it. Returns the index of the new group.
    pub fn add_product_set(
        &mut self,
        transmit: &[AgentId],
        receive: &[AgentId],
        day_weights: Option<[f64; 7]>,
    ) -> Result<usize, ContactError> {
        let day_weights = match (self.firing, day_weights) {
            (Firing::Permanent { .. }, _) => [0.0; 7],
            (Firing::Stochastic, Some(weights)) => {
                if let Some(bad) = weights.iter().find(|w| !(w.is_finite() && **w >= 0.0)) {
                    return Err(ContactError::InvalidParameter(format!(
                        "day weights of '{}' must be finite and non-negative, got {bad}",
                        self.label
                    )));
                }
                weights
            }
            (Firing::Stochastic, None) => {
                return Err(ContactError::InvalidParameter(format!(
                    "sparse channel '{}' needs day weights for every group",
                    self.label
                )));
            }
        };

        let group = self.groups.len();
        for agent in transmit.iter().chain(receive) {
            let groups = self.groups_of.entry(*agent).or_default();
            if groups.last() != Some(&group) {
                groups.push(group);
            }
        }
        let pairs: Vec<(AgentId, AgentId)> = transmit
            .iter()
            .flat_map(|a| receive.iter().map(move |b| (*a, *b)))
            .filter(|(a, b)| a != b)
            .collect();
        trace!(
            "'{}' adds group {group} with {} pairs",
            self.label,
            pairs.len()
        );
        self.groups.push(PairGroup { pairs, day_weights });
        Ok(group)
    }

    pub fn agents(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.groups_of.keys().copied()
    }

    #[must_use]
    pub fn contains(&self, agent: AgentId) -> bool {
        self.groups_of.contains_key(&agent)
    }

    #[must_use]
    pub fn total_pairs(&self) -> usize {
        self.groups.iter().map(|group| group.pairs.len()).sum()
    }

    /// The expected number of pair firings on `day`.
    #[must_use]
    pub fn expectation_at(&self, day: usize) -> f64 {
        match self.firing {
            Firing::Permanent { rate } => {
                #[allow(clippy::cast_precision_loss)]
                let pairs = self.total_pairs() as f64;
                f64::from(rate) * pairs
            }
            Firing::Stochastic => self
                .groups
                .iter()
                .map(|group| {
                    #[allow(clippy::cast_precision_loss)]
                    let pairs = group.pairs.len() as f64;
                    group.day_weights[day % 7] * pairs
                })
                .sum(),
        }
    }

    /// The current day of the channel's attendance roster.
    #[must_use]
    pub fn day(&self) -> usize {
        self.roster.day()
    }

    /// Marks `agent` present from `day` on. Returns whether the agent belongs to the channel.
    pub fn present(&mut self, agent: AgentId, day: usize) -> bool {
        self.roster.present(agent, day);
        self.contains(agent)
    }

    /// Marks `agent` absent from `day` on; earlier days keep the contacts they had.
    pub fn absent(&mut self, agent: AgentId, day: usize) -> bool {
        self.roster.absent(agent, day);
        self.contains(agent)
    }

    fn catch_up(&mut self, day: usize) {
        while self.roster.day() < day {
            self.roster.advance();
        }
    }

    /// Counts the partners of `agent` on `day` among the pairs it starts (`transmit`) or ends.
    fn query_side<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        agent: AgentId,
        day: usize,
        transmit: bool,
    ) -> Result<PartnerCounts, ContactError> {
        self.catch_up(day);
        let mut partners = PartnerCounts::default();
        if self.roster.is_absent(agent, day) {
            return Ok(partners);
        }
        let Some(groups) = self.groups_of.get(&agent) else {
            return Ok(partners);
        };

        let mut tally = |pair: &(AgentId, AgentId), count: u32| {
            let (own, partner) = if transmit { *pair } else { (pair.1, pair.0) };
            if own == agent && !self.roster.is_absent(partner, day) {
                *partners.entry(partner).or_insert(0) += count;
            }
        };
        match self.firing {
            Firing::Permanent { rate } => {
                for group in groups {
                    for pair in &self.groups[*group].pairs {
                        tally(pair, rate);
                    }
                }
            }
            Firing::Stochastic => {
                let drawn = self.draws.frame_mut(day, HashMap::default)?;
                for group in groups {
                    let pairs = drawn.entry(*group).or_insert_with(|| {
                        draw_pairs(&self.groups[*group], day, &self.poisson, rng)
                    });
                    for pair in pairs.iter() {
                        tally(pair, 1);
                    }
                }
            }
        }
        Ok(partners)
    }

    /// Partners `agent` may have infected on `day`.
    pub fn query_transmit<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        agent: AgentId,
        day: usize,
    ) -> Result<PartnerCounts, ContactError> {
        self.query_side(rng, agent, day, true)
    }

    pub fn query_receive<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        agent: AgentId,
        day: usize,
    ) -> Result<PartnerCounts, ContactError> {
        self.query_side(rng, agent, day, false)
    }

    pub fn query_contacts<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        agent: AgentId,
        day: usize,
    ) -> Result<PartnerCounts, ContactError> {
        let mut contacts = self.query_transmit(rng, agent, day)?;
        crate::merge_counts(&mut contacts, &self.query_receive(rng, agent, day)?);
        Ok(contacts)
    }
}

/// Draws the pairs of `group` that fire on `day`, with replacement.
fn draw_pairs<R: Rng + ?Sized>(
    group: &PairGroup,
    day: usize,
    poisson: &PoissonSampler,
    rng: &mut R,
) -> Vec<(AgentId, AgentId)> {
    if group.pairs.is_empty() {
        return Vec::new();
    }
    #[allow(clippy::cast_precision_loss)]
    let intensity = group.day_weights[day % 7] * group.pairs.len() as f64;
    (0..poisson.draw(rng, intensity))
        .map(|_| group.pairs[rng.random_range(0..group.pairs.len())])
        .collect()
}
