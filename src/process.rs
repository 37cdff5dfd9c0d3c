//! Contact processes generate the edges of a virtual complete graph lazily.
//!
//! A [`SymmetricProcess`] joins every pair of distinct members of one population; an
//! [`AsymmetricProcess`] joins every member of one population with every member of another.
//! Within a state (a time bucket such as a simulation day) each edge fires as an independent
//! Poisson process with the state's intensity density. The full graph is never drawn: when an
//! agent is queried, the process draws only the edges between that agent and the agents not
//! queried yet in that state. Edges to already-queried agents were settled by their queries and
//! are in the memo, so every query is idempotent and both ends of an edge agree on it.
//!
//! Once the expected number of new edges per query drops below one, the process settles every
//! remaining pair of the state in a single draw instead of continuing agent by agent.

use std::sync::Arc;

use log::trace;
use rand::Rng;

use crate::error::ContactError;
use crate::partition_tree::PartitionTree;
use crate::poisson::PoissonSampler;
use crate::window::StateWindow;
use crate::{AgentId, HashMap, PartnerCounts};

/// The intensity density of a process in each state.
#[derive(Debug, Clone, PartialEq)]
pub enum Intensity {
    Constant(f64),
    /// One density per state, indexed by `state % len`.
    PerState(Vec<f64>),
}

impl Intensity {
    /// The density of `state`, before any intensity factor.
    #[must_use]
    pub fn at(&self, state: usize) -> f64 {
        match self {
            Intensity::Constant(value) => *value,
            Intensity::PerState(values) if values.is_empty() => 0.0,
            Intensity::PerState(values) => values[state % values.len()],
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ContactError> {
        let values = match self {
            Intensity::Constant(value) => std::slice::from_ref(value),
            Intensity::PerState(values) if values.is_empty() => {
                return Err(ContactError::InvalidParameter(
                    "a per-state intensity needs at least one value".to_string(),
                ));
            }
            Intensity::PerState(values) => values.as_slice(),
        };
        match values.iter().find(|value| !(value.is_finite() && **value >= 0.0)) {
            Some(bad) => Err(ContactError::InvalidParameter(format!(
                "intensity densities must be finite and non-negative, got {bad}"
            ))),
            None => Ok(()),
        }
    }
}

/// Everything a process knows about one state.
#[derive(Debug, Clone)]
struct Frame {
    /// One tree per side marking the members already queried (`true`).
    queried: Vec<PartitionTree>,
    memo: HashMap<AgentId, PartnerCounts>,
}

impl Frame {
    fn new(sizes: &[usize]) -> Self {
        Frame {
            queried: sizes
                .iter()
                .map(|size| PartitionTree::new(*size, false))
                .collect(),
            memo: HashMap::default(),
        }
    }

    fn record(&mut self, a: AgentId, b: AgentId) {
        *self.memo.entry(a).or_default().entry(b).or_insert(0) += 1;
        *self.memo.entry(b).or_default().entry(a).or_insert(0) += 1;
    }

    fn memo_of(&self, agent: AgentId) -> PartnerCounts {
        self.memo.get(&agent).cloned().unwrap_or_default()
    }
}

/// State shared by both kinds of process. A symmetric process has one side, an asymmetric
/// process two.
#[derive(Debug, Clone)]
struct ProcessCore {
    label: String,
    sides: Vec<Vec<AgentId>>,
    /// Side and position within that side of every member.
    index: HashMap<AgentId, (usize, usize)>,
    intensity: Intensity,
    intensity_factor: f64,
    current_intensity: f64,
    state: usize,
    window: StateWindow<Frame>,
    poisson: Arc<PoissonSampler>,
}

#[allow(clippy::cast_precision_loss)]
fn as_f64(count: usize) -> f64 {
    count as f64
}

impl ProcessCore {
    fn new(
        label: String,
        sides: Vec<Vec<AgentId>>,
        intensity: Intensity,
        poisson: Arc<PoissonSampler>,
        keep_states: usize,
    ) -> Result<Self, ContactError> {
        intensity.validate()?;
        let mut index = HashMap::default();
        for (side, members) in sides.iter().enumerate() {
            for (position, agent) in members.iter().enumerate() {
                if index.insert(*agent, (side, position)).is_some() {
                    return Err(ContactError::InvalidParameter(format!(
                        "{agent:?} appears more than once in contact process '{label}'"
                    )));
                }
            }
        }
        let current_intensity = intensity.at(0);
        Ok(ProcessCore {
            label,
            sides,
            index,
            intensity,
            intensity_factor: 1.0,
            current_intensity,
            state: 0,
            window: StateWindow::new(keep_states),
            poisson,
        })
    }

    fn is_symmetric(&self) -> bool {
        self.sides.len() == 1
    }

    fn sizes(&self) -> Vec<usize> {
        self.sides.iter().map(Vec::len).collect()
    }

    fn pair_count(&self) -> f64 {
        if self.is_symmetric() {
            let n = as_f64(self.sides[0].len());
            n * (n - 1.0) / 2.0
        } else {
            as_f64(self.sides[0].len()) * as_f64(self.sides[1].len())
        }
    }

    fn intensity_at(&self, state: usize) -> f64 {
        self.intensity.at(state) * self.intensity_factor
    }

    fn set_state(&mut self, state: usize) -> Result<(), ContactError> {
        let sizes = self.sizes();
        self.window.frame_mut(state, || Frame::new(&sizes))?;
        self.state = state;
        self.current_intensity = self.intensity_at(state);
        Ok(())
    }

    fn set_intensity_factor(&mut self, factor: f64) -> Result<(), ContactError> {
        if !(factor.is_finite() && factor >= 0.0) {
            return Err(ContactError::InvalidParameter(format!(
                "intensity factors must be finite and non-negative, got {factor}"
            )));
        }
        self.intensity_factor = factor;
        self.current_intensity = self.intensity_at(self.state);
        Ok(())
    }

    fn reset(&mut self) {
        self.window.clear();
        self.state = 0;
        self.current_intensity = self.intensity_at(0);
    }

    fn query<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        agent: AgentId,
        state: usize,
    ) -> Result<PartnerCounts, ContactError> {
        let &(side, position) = self
            .index
            .get(&agent)
            .ok_or(ContactError::UnknownAgent(agent))?;
        if state != self.state || self.window.latest().is_none() {
            self.set_state(state)?;
        }

        let symmetric = self.is_symmetric();
        let other = if symmetric { side } else { 1 - side };
        let sizes = self.sizes();
        let frame = self.window.frame_mut(state, || Frame::new(&sizes))?;
        if frame.queried[side].get_state(position) == Some(true) {
            return Ok(frame.memo_of(agent));
        }

        let mut available = frame.queried[other].count_in_state(false);
        if symmetric {
            // The agent itself is still unqueried.
            available -= 1;
        }
        let expected = self.current_intensity * as_f64(available);
        if expected < 1.0 {
            trace!(
                "{}: settling state {state} with {available} partners left for {agent:?}",
                self.label
            );
            exhaust(frame, &self.sides, self.current_intensity, &self.poisson, rng);
            return Ok(frame.memo_of(agent));
        }

        frame.queried[side].set_state(position, true);
        let draws = self.poisson.draw(rng, expected);
        for _ in 0..draws {
            let order = rng.random_range(0..available);
            if let Some(partner) = frame.queried[other].nth_in_state(order, false) {
                frame.record(agent, self.sides[other][partner]);
            }
        }
        Ok(frame.memo_of(agent))
    }
}

/// Settles every pair of unqueried agents of the state at once and marks everyone queried.
fn exhaust<R: Rng + ?Sized>(
    frame: &mut Frame,
    sides: &[Vec<AgentId>],
    intensity: f64,
    poisson: &PoissonSampler,
    rng: &mut R,
) {
    if let [members] = sides {
        let remaining = frame.queried[0].count_in_state(false);
        if remaining >= 2 {
            let pairs = as_f64(remaining) * as_f64(remaining - 1) / 2.0;
            for _ in 0..poisson.draw(rng, intensity * pairs) {
                let first = rng.random_range(0..remaining);
                let mut second = rng.random_range(0..remaining - 1);
                if second >= first {
                    second += 1;
                }
                let tree = &frame.queried[0];
                if let (Some(a), Some(b)) = (
                    tree.nth_in_state(first, false),
                    tree.nth_in_state(second, false),
                ) {
                    frame.record(members[a], members[b]);
                }
            }
        }
    } else {
        let remaining = [
            frame.queried[0].count_in_state(false),
            frame.queried[1].count_in_state(false),
        ];
        if remaining[0] > 0 && remaining[1] > 0 {
            let pairs = as_f64(remaining[0]) * as_f64(remaining[1]);
            for _ in 0..poisson.draw(rng, intensity * pairs) {
                let first = rng.random_range(0..remaining[0]);
                let second = rng.random_range(0..remaining[1]);
                if let (Some(a), Some(b)) = (
                    frame.queried[0].nth_in_state(first, false),
                    frame.queried[1].nth_in_state(second, false),
                ) {
                    frame.record(sides[0][a], sides[1][b]);
                }
            }
        }
    }
    for tree in &mut frame.queried {
        tree.fill(true);
    }
}

/// Contacts among the members of one population, no agent being its own partner.
#[derive(Debug, Clone)]
pub struct SymmetricProcess {
    core: ProcessCore,
}

impl SymmetricProcess {
    /// Creates a process over `members` that retains the last `keep_states` states. Fails if a
    /// member is listed twice or the intensity is invalid.
    pub fn new(
        label: impl Into<String>,
        members: &[AgentId],
        intensity: Intensity,
        poisson: Arc<PoissonSampler>,
        keep_states: usize,
    ) -> Result<Self, ContactError> {
        Ok(SymmetricProcess {
            core: ProcessCore::new(
                label.into(),
                vec![members.to_vec()],
                intensity,
                poisson,
                keep_states,
            )?,
        })
    }

    #[must_use]
    pub fn members(&self) -> &[AgentId] {
        &self.core.sides[0]
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.core.sides[0].len()
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.core.label
    }

    #[must_use]
    pub fn state(&self) -> usize {
        self.core.state
    }

    #[must_use]
    pub fn current_intensity(&self) -> f64 {
        self.core.current_intensity
    }

    /// Makes `state` the current state, opening it if needed. Fails if `state` was evicted.
    pub fn set_state(&mut self, state: usize) -> Result<(), ContactError> {
        self.core.set_state(state)
    }

    /// Scales the intensity of every state.
    pub fn set_intensity_factor(&mut self, factor: f64) -> Result<(), ContactError> {
        self.core.set_intensity_factor(factor)
    }

    /// Returns the partners of `agent` in `state`, drawing them on the first query.
    pub fn query<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        agent: AgentId,
        state: usize,
    ) -> Result<PartnerCounts, ContactError> {
        self.core.query(rng, agent, state)
    }

    /// The expected number of edges in the current state, keyed by label.
    #[must_use]
    pub fn expectation(&self) -> (String, f64) {
        (
            self.core.label.clone(),
            self.core.current_intensity * self.core.pair_count(),
        )
    }

    #[must_use]
    pub fn expectation_at(&self, state: usize) -> f64 {
        self.core.intensity_at(state) * self.core.pair_count()
    }

    /// Forgets every state, including evicted ones.
    pub fn reset(&mut self) {
        self.core.reset();
    }
}

/// Contacts between two disjoint populations.
#[derive(Debug, Clone)]
pub struct AsymmetricProcess {
    core: ProcessCore,
}

impl AsymmetricProcess {
    /// Fails if an agent appears twice, on either side or on both, or the intensity is invalid.
    pub fn new(
        label: impl Into<String>,
        side_a: &[AgentId],
        side_b: &[AgentId],
        intensity: Intensity,
        poisson: Arc<PoissonSampler>,
        keep_states: usize,
    ) -> Result<Self, ContactError> {
        Ok(AsymmetricProcess {
            core: ProcessCore::new(
                label.into(),
                vec![side_a.to_vec(), side_b.to_vec()],
                intensity,
                poisson,
                keep_states,
            )?,
        })
    }

    #[must_use]
    pub fn side_a(&self) -> &[AgentId] {
        &self.core.sides[0]
    }

    #[must_use]
    pub fn side_b(&self) -> &[AgentId] {
        &self.core.sides[1]
    }

    /// Every member, side A first.
    pub fn members(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.core.sides.iter().flatten().copied()
    }

    #[must_use]
    pub fn size(&self) -> (usize, usize) {
        (self.core.sides[0].len(), self.core.sides[1].len())
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.core.label
    }

    #[must_use]
    pub fn state(&self) -> usize {
        self.core.state
    }

    #[must_use]
    pub fn current_intensity(&self) -> f64 {
        self.core.current_intensity
    }

    pub fn set_state(&mut self, state: usize) -> Result<(), ContactError> {
        self.core.set_state(state)
    }

    pub fn set_intensity_factor(&mut self, factor: f64) -> Result<(), ContactError> {
        self.core.set_intensity_factor(factor)
    }

    /// Returns the partners of `agent`, all from the other side, in `state`.
    pub fn query<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        agent: AgentId,
        state: usize,
    ) -> Result<PartnerCounts, ContactError> {
        self.core.query(rng, agent, state)
    }

    #[must_use]
    pub fn expectation(&self) -> (String, f64) {
        (
            self.core.label.clone(),
            self.core.current_intensity * self.core.pair_count(),
        )
    }

    #[must_use]
    pub fn expectation_at(&self, state: usize) -> f64 {
        self.core.intensity_at(state) * self.core.pair_count()
    }

    pub fn reset(&mut self) {
        self.core.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_almost_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn agents(range: std::ops::Range<usize>) -> Vec<AgentId> {
        range.map(AgentId).collect()
    }

    fn symmetric(n: usize, density: f64, keep_states: usize) -> SymmetricProcess {
        SymmetricProcess::new(
            "test",
            &agents(0..n),
            Intensity::Constant(density),
            Arc::new(PoissonSampler::default()),
            keep_states,
        )
        .unwrap()
    }

    /// Queries every member of `members` once and returns the number of edges found.
    fn count_edges(
        query: &mut impl FnMut(AgentId) -> PartnerCounts,
        members: &[AgentId],
    ) -> u32 {
        let mut endpoints = 0;
        for agent in members {
            let partners = query(*agent);
            assert!(!partners.contains_key(agent));
            endpoints += partners.values().sum::<u32>();
        }
        endpoints / 2
    }

    #[test]
    fn symmetric_edge_count_matches_expectation() {
        let members = agents(0..50);
        for density in [0.02, 0.1] {
            let mut process = symmetric(50, density, 7);
            let mut rng = StdRng::seed_from_u64(42);
            let trials = 400;
            let mut total = 0;
            for state in 0..trials {
                total += count_edges(
                    &mut |agent| process.query(&mut rng, agent, state).unwrap(),
                    &members,
                );
            }
            let expected = density * 50.0 * 49.0 / 2.0;
            #[allow(clippy::cast_precision_loss)]
            let mean = f64::from(total) / trials as f64;
            let tolerance = 4.0 * (expected / 400.0).sqrt();
            assert!(
                (mean - expected).abs() < tolerance,
                "density {density}: mean {mean}, expected {expected}"
            );
            assert_almost_eq!(process.expectation().1, expected, 1e-9);
        }
    }

    #[test]
    fn four_agents_average_six_edges() {
        let members = agents(0..4);
        let mut process = symmetric(4, 1.0, 7);
        let mut rng = StdRng::seed_from_u64(7);
        let trials = 10_000;
        let mut total = 0;
        for _ in 0..trials {
            process.reset();
            total += count_edges(
                &mut |agent| process.query(&mut rng, agent, 0).unwrap(),
                &members,
            );
        }
        let mean = f64::from(total) / f64::from(trials);
        assert!((5.7..=6.3).contains(&mean), "mean {mean}");
    }

    #[test]
    fn queries_are_memoized_and_mutual() {
        let mut process = symmetric(30, 0.2, 7);
        let mut rng = StdRng::seed_from_u64(1);
        let first = process.query(&mut rng, AgentId(3), 0).unwrap();
        let again = process.query(&mut rng, AgentId(3), 0).unwrap();
        assert_eq!(first, again);
        for (partner, count) in &first {
            let theirs = process.query(&mut rng, *partner, 0).unwrap();
            assert_eq!(theirs.get(&AgentId(3)), Some(count));
        }
    }

    #[test]
    fn evicted_states_are_errors() {
        let mut process = symmetric(10, 0.5, 3);
        let mut rng = StdRng::seed_from_u64(0);
        process.query(&mut rng, AgentId(0), 0).unwrap();
        process.query(&mut rng, AgentId(0), 2).unwrap();
        // State 0 is still inside the window.
        process.query(&mut rng, AgentId(0), 0).unwrap();
        process.query(&mut rng, AgentId(0), 3).unwrap();
        assert!(matches!(
            process.query(&mut rng, AgentId(0), 0),
            Err(ContactError::EvictedState { state: 0, .. })
        ));
        assert!(process.set_state(0).is_err());

        process.reset();
        assert!(process.query(&mut rng, AgentId(0), 0).is_ok());
    }

    #[test]
    fn unknown_agents_are_errors() {
        let mut process = symmetric(5, 0.5, 7);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            process.query(&mut rng, AgentId(5), 0),
            Err(ContactError::UnknownAgent(AgentId(5)))
        ));
    }

    #[test]
    fn asymmetric_edges_cross_sides() {
        let side_a = agents(0..20);
        let side_b = agents(20..50);
        let mut process = AsymmetricProcess::new(
            "cross",
            &side_a,
            &side_b,
            Intensity::Constant(0.05),
            Arc::new(PoissonSampler::default()),
            7,
        )
        .unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let everyone: Vec<AgentId> = process.members().collect();
        let trials = 400;
        let mut total = 0;
        for state in 0..trials {
            total += count_edges(
                &mut |agent| {
                    let partners = process.query(&mut rng, agent, state).unwrap();
                    let own_side = agent.0 < 20;
                    assert!(partners.keys().all(|p| (p.0 < 20) != own_side));
                    partners
                },
                &everyone,
            );
        }
        #[allow(clippy::cast_precision_loss)]
        let mean = f64::from(total) / trials as f64;
        assert!((mean - 30.0).abs() < 4.0 * (30.0f64 / 400.0).sqrt(), "mean {mean}");
        assert_eq!(process.size(), (20, 30));
    }

    #[test]
    fn per_state_intensity_and_factor() {
        let mut process = SymmetricProcess::new(
            "weekly",
            &agents(0..10),
            Intensity::PerState(vec![0.0, 0.5]),
            Arc::new(PoissonSampler::default()),
            7,
        )
        .unwrap();
        assert_almost_eq!(process.expectation_at(0), 0.0, 1e-12);
        assert_almost_eq!(process.expectation_at(3), 22.5, 1e-12);

        process.set_state(1).unwrap();
        assert_almost_eq!(process.current_intensity(), 0.5, 1e-12);
        process.set_intensity_factor(2.0).unwrap();
        assert_almost_eq!(process.current_intensity(), 1.0, 1e-12);
        assert_almost_eq!(process.expectation_at(2), 0.0, 1e-12);
        assert!(process.set_intensity_factor(f64::NAN).is_err());

        let mut rng = StdRng::seed_from_u64(3);
        process.set_state(2).unwrap();
        for agent in agents(0..10) {
            assert!(process.query(&mut rng, agent, 2).unwrap().is_empty());
        }
    }

    #[test]
    fn rejects_bad_populations() {
        let poisson = Arc::new(PoissonSampler::default());
        let repeated = [AgentId(1), AgentId(2), AgentId(1)];
        assert!(SymmetricProcess::new(
            "dup",
            &repeated,
            Intensity::Constant(0.1),
            Arc::clone(&poisson),
            7
        )
        .is_err());
        assert!(AsymmetricProcess::new(
            "overlap",
            &agents(0..3),
            &agents(2..5),
            Intensity::Constant(0.1),
            Arc::clone(&poisson),
            7
        )
        .is_err());
        assert!(SymmetricProcess::new(
            "negative",
            &agents(0..3),
            Intensity::Constant(-0.1),
            Arc::clone(&poisson),
            7
        )
        .is_err());
        assert!(SymmetricProcess::new(
            "empty",
            &agents(0..3),
            Intensity::PerState(Vec::new()),
            poisson,
            7
        )
        .is_err());
    }
}
