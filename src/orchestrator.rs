//! The `ContactOrchestrator` is the engine's front door for a disease model. It owns every
//! channel, knows which channels each agent belongs to and on which weekdays they meet, and
//! keeps the simulation day shared by all of them.
//!
//! Setup registers channels and their members. During the simulation the model calls
//! [`ContactOrchestrator::advance_day`] once per day and then asks, per agent, whom it met:
//!
//! ```rust
//! use ixa_contacts::{AgentId, ContactConfig, ContactOrchestrator, Intensity};
//!
//! let mut contacts = ContactOrchestrator::new(ContactConfig::default()).unwrap();
//! let class: Vec<AgentId> = (0..30).map(AgentId).collect();
//!
//! // A class section meeting on Tuesdays.
//! let section = contacts.new_context(2, "section").unwrap();
//! contacts.add_transmitters(section, &class, 1).unwrap();
//! contacts.add_receivers(section, &class, 1).unwrap();
//! contacts.context_mut(section).unwrap().set_rate(0.02).unwrap();
//!
//! // Incidental contact among everyone registered so far.
//! contacts
//!     .register_symmetric(None, Intensity::Constant(0.001), "incidental")
//!     .unwrap();
//!
//! contacts.advance_day();
//! contacts.advance_day();
//! let met = contacts.query_contacts(AgentId(5), 0).unwrap();
//! assert!(!met.contains_key(&AgentId(5)));
//! ```

use std::fmt::{self, Debug, Display};
use std::sync::Arc;

use log::{debug, info, trace, warn};
use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::channel::{Channel, ChannelKind, SimpleContact, SparseContact};
use crate::config::ContactConfig;
use crate::error::ContactError;
use crate::poisson::PoissonSampler;
use crate::process::{AsymmetricProcess, Intensity, SymmetricProcess};
use crate::{merge_counts, AgentId, HashMap, PartnerCounts};

const ALL_WEEKDAYS: [usize; 7] = [0, 1, 2, 3, 4, 5, 6];

/// Calibration key under which permanent channels are reported.
pub const PERMANENT_CONTACTS: &str = "permanent contacts";

/// Identifies a channel within its orchestrator.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(pub usize);

impl Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Debug for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Channel {}", self.0)
    }
}

#[derive(Copy, Clone)]
enum Direction {
    Transmit,
    Receive,
    Contacts,
}

pub struct ContactOrchestrator {
    config: ContactConfig,
    channels: Vec<Channel>,
    memberships: HashMap<AgentId, Vec<ChannelId>>,
    /// The channels of each agent that meet on each weekday.
    schedule: HashMap<AgentId, [Vec<ChannelId>; 7]>,
    day: usize,
    rng: SmallRng,
    poisson: Arc<PoissonSampler>,
    target: f64,
}

impl ContactOrchestrator {
    /// Creates an orchestrator with its own Poisson sampler.
    pub fn new(config: ContactConfig) -> Result<Self, ContactError> {
        config.validate()?;
        let poisson = Arc::new(PoissonSampler::new(
            config.poisson_base_checkpoint,
            config.poisson_initial_ceiling,
        ));
        Self::with_poisson(config, poisson)
    }

    /// Creates an orchestrator that shares `poisson` with other holders.
    pub fn with_poisson(
        config: ContactConfig,
        poisson: Arc<PoissonSampler>,
    ) -> Result<Self, ContactError> {
        config.validate()?;
        Ok(ContactOrchestrator {
            rng: SmallRng::seed_from_u64(config.seed),
            config,
            channels: Vec::new(),
            memberships: HashMap::default(),
            schedule: HashMap::default(),
            day: 0,
            poisson,
            target: 0.0,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ContactConfig {
        &self.config
    }

    #[must_use]
    pub fn poisson(&self) -> &Arc<PoissonSampler> {
        &self.poisson
    }

    fn push_channel(&mut self, channel: Channel) -> ChannelId {
        let id = ChannelId(self.channels.len());
        trace!(
            "registering {} channel {id} '{}'",
            channel.kind(),
            channel.label()
        );
        self.channels.push(channel);
        id
    }

    fn register<'a>(
        &mut self,
        agents: impl IntoIterator<Item = &'a AgentId>,
        id: ChannelId,
        weekdays: &[usize],
    ) {
        for agent in agents {
            let channels = self.memberships.entry(*agent).or_default();
            if !channels.contains(&id) {
                channels.push(id);
            }
            let schedule = self.schedule.entry(*agent).or_default();
            for weekday in weekdays {
                if !schedule[*weekday].contains(&id) {
                    schedule[*weekday].push(id);
                }
            }
        }
    }

    fn channel_mut(&mut self, id: ChannelId) -> Result<&mut Channel, ContactError> {
        self.channels
            .get_mut(id.0)
            .ok_or(ContactError::UnknownChannel(id))
    }

    #[must_use]
    pub fn channel(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.get(id.0)
    }

    /// Creates an empty context meeting on `weekday` (0 to 6).
    pub fn new_context(
        &mut self,
        weekday: usize,
        label: impl Into<String>,
    ) -> Result<ChannelId, ContactError> {
        if weekday >= 7 {
            return Err(ContactError::InvalidParameter(format!(
                "weekday must be below 7, got {weekday}"
            )));
        }
        let context = SimpleContact::new(
            weekday,
            label,
            Arc::clone(&self.poisson),
            self.config.history_days,
        );
        Ok(self.push_channel(Channel::Simple(context)))
    }

    /// Creates an empty stochastic sparse channel meeting every day.
    pub fn new_sparse(&mut self, label: impl Into<String>) -> ChannelId {
        let channel = SparseContact::new(
            label,
            Arc::clone(&self.poisson),
            self.config.history_days,
        );
        self.push_channel(Channel::Sparse(channel))
    }

    /// Creates an empty permanent channel whose pairs fire `permanent_rate` times a day.
    pub fn new_permanent(&mut self, label: impl Into<String>) -> ChannelId {
        let channel = SparseContact::permanent(
            label,
            self.config.permanent_rate,
            Arc::clone(&self.poisson),
            self.config.history_days,
        );
        self.push_channel(Channel::Sparse(channel))
    }

    /// Registers a symmetric process over `members`, or over every agent registered so far when
    /// `members` is `None`. Its state is the simulation day.
    pub fn register_symmetric(
        &mut self,
        members: Option<&[AgentId]>,
        intensity: Intensity,
        label: impl Into<String>,
    ) -> Result<ChannelId, ContactError> {
        let members = match members {
            Some(members) => members.to_vec(),
            None => {
                let mut everyone: Vec<AgentId> = self.memberships.keys().copied().collect();
                everyone.sort_unstable();
                everyone
            }
        };
        let process = SymmetricProcess::new(
            label,
            &members,
            intensity,
            Arc::clone(&self.poisson),
            self.config.keep_states,
        )?;
        let id = self.push_channel(Channel::Symmetric(process));
        self.register(&members, id, &ALL_WEEKDAYS);
        Ok(id)
    }

    pub fn register_asymmetric(
        &mut self,
        side_a: &[AgentId],
        side_b: &[AgentId],
        intensity: Intensity,
        label: impl Into<String>,
    ) -> Result<ChannelId, ContactError> {
        let process = AsymmetricProcess::new(
            label,
            side_a,
            side_b,
            intensity,
            Arc::clone(&self.poisson),
            self.config.keep_states,
        )?;
        let id = self.push_channel(Channel::Asymmetric(process));
        self.register(side_a.iter().chain(side_b), id, &ALL_WEEKDAYS);
        Ok(id)
    }

    fn context_and_weekday(
        &mut self,
        id: ChannelId,
    ) -> Result<(&mut SimpleContact, usize), ContactError> {
        match self.channel_mut(id)? {
            Channel::Simple(context) => {
                let weekday = context.weekday();
                Ok((context, weekday))
            }
            _ => Err(ContactError::WrongChannelKind {
                channel: id,
                expected: "simple",
            }),
        }
    }

    pub fn add_transmitters(
        &mut self,
        id: ChannelId,
        agents: &[AgentId],
        multiplicity: usize,
    ) -> Result<(), ContactError> {
        let (context, weekday) = self.context_and_weekday(id)?;
        context.add_transmitters(agents, multiplicity);
        self.register(agents, id, &[weekday]);
        Ok(())
    }

    pub fn add_receivers(
        &mut self,
        id: ChannelId,
        agents: &[AgentId],
        multiplicity: usize,
    ) -> Result<(), ContactError> {
        let (context, weekday) = self.context_and_weekday(id)?;
        context.add_receivers(agents, multiplicity);
        self.register(agents, id, &[weekday]);
        Ok(())
    }

    /// Adds the pairs `transmit × receive` to a sparse or permanent channel.
    pub fn add_product_set(
        &mut self,
        id: ChannelId,
        transmit: &[AgentId],
        receive: &[AgentId],
        day_weights: Option<[f64; 7]>,
    ) -> Result<(), ContactError> {
        match self.channel_mut(id)? {
            Channel::Sparse(channel) => {
                channel.add_product_set(transmit, receive, day_weights)?;
            }
            _ => {
                return Err(ContactError::WrongChannelKind {
                    channel: id,
                    expected: "sparse",
                })
            }
        }
        self.register(transmit.iter().chain(receive), id, &ALL_WEEKDAYS);
        Ok(())
    }

    /// Gives access to a context's rate, social distancing and traceability settings.
    pub fn context_mut(&mut self, id: ChannelId) -> Result<&mut SimpleContact, ContactError> {
        self.context_and_weekday(id).map(|(context, _)| context)
    }

    /// Scales the intensity of a contact process.
    pub fn process_intensity_factor(
        &mut self,
        id: ChannelId,
        factor: f64,
    ) -> Result<(), ContactError> {
        match self.channel_mut(id)? {
            Channel::Symmetric(process) => process.set_intensity_factor(factor),
            Channel::Asymmetric(process) => process.set_intensity_factor(factor),
            _ => Err(ContactError::WrongChannelKind {
                channel: id,
                expected: "contact process",
            }),
        }
    }

    pub fn advance_day(&mut self) {
        self.day += 1;
        debug!("advancing to day {}", self.day);
    }

    #[must_use]
    pub fn day(&self) -> usize {
        self.day
    }

    fn gather(
        &mut self,
        agent: AgentId,
        offset: isize,
        direction: Direction,
    ) -> Result<PartnerCounts, ContactError> {
        let day = self
            .day
            .checked_add_signed(offset)
            .ok_or(ContactError::DayOutOfRange {
                day: self.day,
                offset,
            })?;
        let schedule = self
            .schedule
            .get(&agent)
            .ok_or(ContactError::UnknownAgent(agent))?;
        let mut result = PartnerCounts::default();
        for id in &schedule[day % 7] {
            let channel = &mut self.channels[id.0];
            let partners = match direction {
                Direction::Transmit => channel.query_transmit(&mut self.rng, agent, day),
                Direction::Receive => channel.query_receive(&mut self.rng, agent, day),
                Direction::Contacts => channel.query_contacts(&mut self.rng, agent, day),
            }?;
            merge_counts(&mut result, &partners);
        }
        Ok(result)
    }

    /// Contacts in which `agent` could have infected its partners, `offset` days from today,
    /// summed over every channel meeting that day.
    pub fn query_transmit(
        &mut self,
        agent: AgentId,
        offset: isize,
    ) -> Result<PartnerCounts, ContactError> {
        self.gather(agent, offset, Direction::Transmit)
    }

    /// Contacts in which `agent` could have been infected.
    pub fn query_receive(
        &mut self,
        agent: AgentId,
        offset: isize,
    ) -> Result<PartnerCounts, ContactError> {
        self.gather(agent, offset, Direction::Receive)
    }

    /// Contacts in both directions, for contact tracing.
    pub fn query_contacts(
        &mut self,
        agent: AgentId,
        offset: isize,
    ) -> Result<PartnerCounts, ContactError> {
        self.gather(agent, offset, Direction::Contacts)
    }

    fn broadcast(&mut self, agent: AgentId, present: bool) -> bool {
        let Some(ids) = self.memberships.get(&agent) else {
            return false;
        };
        for id in ids {
            let channel = &mut self.channels[id.0];
            if present {
                channel.present(agent, self.day);
            } else {
                channel.absent(agent, self.day);
            }
        }
        true
    }

    /// Returns `agent` to every channel it belongs to. Returns `false` for unregistered agents.
    pub fn present(&mut self, agent: AgentId) -> bool {
        self.broadcast(agent, true)
    }

    /// Withdraws `agent` from every channel it belongs to from today on, as when it enters
    /// quarantine. Contacts of earlier days stay traceable.
    pub fn absent(&mut self, agent: AgentId) -> bool {
        self.broadcast(agent, false)
    }

    /// Records the expected number of contacts per agent per day the model is calibrated for.
    pub fn add_target(&mut self, target: f64) {
        self.target += target;
    }

    #[must_use]
    pub fn target(&self) -> f64 {
        self.target
    }

    /// The expected number of contacts over `days`, keyed by channel label. Permanent channels
    /// are reported together under [`PERMANENT_CONTACTS`].
    #[must_use]
    pub fn expectation(&self, days: &[usize]) -> HashMap<String, f64> {
        let mut totals = HashMap::default();
        totals.insert(PERMANENT_CONTACTS.to_string(), 0.0);
        for day in days {
            for channel in &self.channels {
                let key = match channel.kind() {
                    ChannelKind::Permanent => PERMANENT_CONTACTS,
                    _ => channel.label(),
                };
                *totals.entry(key.to_string()).or_insert(0.0) += channel.expectation_at(*day);
            }
        }
        totals
    }

    /// Runs the engine for `days` days, querying every registered agent as a transmitter each
    /// day, and returns the average number of contacts per agent per day.
    pub fn average_daily_contacts(&mut self, days: usize) -> Result<f64, ContactError> {
        let mut agents: Vec<AgentId> = self.memberships.keys().copied().collect();
        if agents.is_empty() || days == 0 {
            warn!("no agents or days to average contacts over");
            return Ok(0.0);
        }
        agents.sort_unstable();
        info!("contact target: {}", self.target);

        let mut total = 0u64;
        let mut average = 0.0;
        for elapsed in 1..=days {
            self.advance_day();
            for agent in &agents {
                let partners = self.query_transmit(*agent, 0)?;
                total += partners.values().map(|count| u64::from(*count)).sum::<u64>();
            }
            #[allow(clippy::cast_precision_loss)]
            let per_agent_day = total as f64 / (elapsed * agents.len()) as f64;
            average = per_agent_day;
            info!("day {:3} average: {average:8.5}", self.day);
        }
        Ok(average)
    }

    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of agents registered with at least one channel.
    #[must_use]
    pub fn agent_count(&self) -> usize {
        self.memberships.len()
    }

    #[must_use]
    pub fn channels_for(&self, agent: AgentId) -> &[ChannelId] {
        self.memberships.get(&agent).map_or(&[], Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_almost_eq;

    fn people(range: std::ops::Range<usize>) -> Vec<AgentId> {
        range.map(AgentId).collect()
    }

    fn orchestrator() -> ContactOrchestrator {
        ContactOrchestrator::new(ContactConfig::default()).unwrap()
    }

    #[test]
    fn contexts_meet_on_their_weekday() {
        let mut contacts = orchestrator();
        let class = people(0..20);
        let monday = contacts.new_context(1, "monday").unwrap();
        contacts.add_transmitters(monday, &class, 1).unwrap();
        contacts.add_receivers(monday, &class, 1).unwrap();
        contacts.context_mut(monday).unwrap().set_rate(1.0).unwrap();

        assert!(contacts.query_transmit(AgentId(0), 0).unwrap().is_empty());
        contacts.advance_day();
        assert!(!contacts.query_transmit(AgentId(0), 0).unwrap().is_empty());
        assert!(contacts.query_transmit(AgentId(0), 1).unwrap().is_empty());
        assert_eq!(contacts.channels_for(AgentId(3)), &[monday]);
        assert_eq!(contacts.agent_count(), 20);
    }

    #[test]
    fn registering_everyone_registered_so_far() {
        let mut contacts = orchestrator();
        let household = contacts.new_permanent("household");
        contacts
            .add_product_set(household, &people(0..3), &people(0..3), None)
            .unwrap();
        let broad = contacts
            .register_symmetric(None, Intensity::Constant(0.1), "broad")
            .unwrap();
        assert_eq!(contacts.channels_for(AgentId(2)), &[household, broad]);
        assert_eq!(contacts.channel_count(), 2);
        assert!(contacts.channels_for(AgentId(3)).is_empty());
    }

    #[test]
    fn queries_sum_over_channels() {
        let mut contacts = orchestrator();
        let family = people(0..3);
        let first = contacts.new_permanent("home");
        let second = contacts.new_permanent("weekend home");
        contacts.add_product_set(first, &family, &family, None).unwrap();
        contacts.add_product_set(second, &family, &family, None).unwrap();
        let sent = contacts.query_transmit(AgentId(0), 0).unwrap();
        assert_eq!(sent.get(&AgentId(1)), Some(&2));
        let traced = contacts.query_contacts(AgentId(0), 0).unwrap();
        assert_eq!(traced.get(&AgentId(2)), Some(&4));
    }

    #[test]
    fn attendance_is_broadcast() {
        let mut contacts = orchestrator();
        let family = people(0..3);
        let home = contacts.new_permanent("home");
        contacts.add_product_set(home, &family, &family, None).unwrap();
        assert!(contacts.absent(AgentId(1)));
        assert!(!contacts.absent(AgentId(10)));
        let sent = contacts.query_transmit(AgentId(0), 0).unwrap();
        assert!(!sent.contains_key(&AgentId(1)));
        contacts.present(AgentId(1));
        contacts.advance_day();
        assert!(contacts
            .query_transmit(AgentId(0), 0)
            .unwrap()
            .contains_key(&AgentId(1)));
    }

    #[test]
    fn bad_requests_are_errors() {
        let mut contacts = orchestrator();
        let home = contacts.new_permanent("home");
        contacts
            .add_product_set(home, &people(0..2), &people(0..2), None)
            .unwrap();

        assert!(matches!(
            contacts.query_transmit(AgentId(9), 0),
            Err(ContactError::UnknownAgent(AgentId(9)))
        ));
        assert!(matches!(
            contacts.query_transmit(AgentId(0), -1),
            Err(ContactError::DayOutOfRange { day: 0, offset: -1 })
        ));
        assert!(matches!(
            contacts.add_transmitters(home, &people(0..2), 1),
            Err(ContactError::WrongChannelKind { .. })
        ));
        assert!(matches!(
            contacts.context_mut(ChannelId(7)),
            Err(ContactError::UnknownChannel(ChannelId(7)))
        ));
        assert!(contacts.new_context(7, "nope").is_err());
        assert!(contacts.process_intensity_factor(home, 2.0).is_err());

        let config = ContactConfig {
            keep_states: 0,
            ..ContactConfig::default()
        };
        assert!(ContactOrchestrator::new(config).is_err());
    }

    #[test]
    fn expectation_groups_by_label() {
        let mut contacts = orchestrator();
        let group = people(0..10);
        contacts
            .register_symmetric(Some(&group), Intensity::PerState(vec![0.1, 0.2]), "broad")
            .unwrap();
        let home = contacts.new_permanent("home");
        contacts
            .add_product_set(home, &group[..2], &group[..2], None)
            .unwrap();

        let expected = contacts.expectation(&[0, 1]);
        assert_almost_eq!(expected["broad"], 0.1 * 45.0 + 0.2 * 45.0, 1e-9);
        assert_almost_eq!(expected[PERMANENT_CONTACTS], 4.0, 1e-9);
        assert!(!expected.contains_key("home"));
    }

    #[test]
    fn average_daily_contacts_of_a_permanent_pair() {
        let mut contacts = orchestrator();
        let home = contacts.new_permanent("home");
        contacts
            .add_product_set(home, &people(0..2), &people(0..2), None)
            .unwrap();
        contacts.add_target(1.0);
        let average = contacts.average_daily_contacts(5).unwrap();
        assert_almost_eq!(average, 1.0, 1e-12);
        assert_eq!(contacts.day(), 5);
        assert_almost_eq!(contacts.target(), 1.0, 1e-12);
    }
}
