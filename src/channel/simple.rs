//! A context that meets on one weekday, such as a class section or a department: transmitters
//! and receivers mix at random with a rate proportional to their weights.

use std::sync::Arc;

use log::{trace, warn};
use rand::Rng;

use crate::error::ContactError;
use crate::poisson::PoissonSampler;
use crate::tracker::{Activity, ActivityTracker};
use crate::window::StateWindow;
use crate::{merge_counts, AgentId, HashMap, PartnerCounts};

/// Everything drawn in a context on one day.
#[derive(Debug, Clone, Default)]
struct DayMemo {
    transmit: HashMap<AgentId, PartnerCounts>,
    receive: HashMap<AgentId, PartnerCounts>,
    contacts: HashMap<AgentId, PartnerCounts>,
}

impl DayMemo {
    fn ledger(&self, ledger: Ledger) -> &HashMap<AgentId, PartnerCounts> {
        match ledger {
            Ledger::Transmit => &self.transmit,
            Ledger::Receive => &self.receive,
            Ledger::Contacts => &self.contacts,
        }
    }
}

#[derive(Copy, Clone)]
enum Ledger {
    Transmit,
    Receive,
    Contacts,
}

#[derive(Debug, Clone)]
pub struct SimpleContact {
    label: String,
    weekday: usize,
    transmitters: ActivityTracker,
    receivers: ActivityTracker,
    rate_factor: f64,
    social_distancing: bool,
    effective_factor: f64,
    traceable: bool,
    touch_policy: Activity,
    days: StateWindow<DayMemo>,
    poisson: Arc<PoissonSampler>,
}

impl SimpleContact {
    #[must_use]
    pub fn new(
        weekday: usize,
        label: impl Into<String>,
        poisson: Arc<PoissonSampler>,
        history_days: usize,
    ) -> Self {
        SimpleContact {
            label: label.into(),
            weekday,
            transmitters: ActivityTracker::new(),
            receivers: ActivityTracker::new(),
            rate_factor: 1.0,
            social_distancing: false,
            effective_factor: 1.0,
            traceable: true,
            touch_policy: Activity::Inactive,
            days: StateWindow::new(history_days),
            poisson,
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn weekday(&self) -> usize {
        self.weekday
    }

    #[must_use]
    pub fn rate(&self) -> f64 {
        self.rate_factor
    }

    /// Sets the nominal contact rate per unit of transmitter weight and unit of receiver weight.
    pub fn set_rate(&mut self, rate: f64) -> Result<(), ContactError> {
        if !(rate.is_finite() && rate >= 0.0) {
            return Err(ContactError::InvalidParameter(format!(
                "context '{}' needs a finite non-negative rate, got {rate}",
                self.label
            )));
        }
        self.rate_factor = rate;
        self.compute_factor();
        Ok(())
    }

    /// When enabled, the rate is scaled by the share of weight in attendance.
    pub fn set_social_distancing(&mut self, enabled: bool) {
        self.social_distancing = enabled;
        self.compute_factor();
    }

    /// Untraceable contexts report no contacts to [`query_contacts`](Self::query_contacts).
    pub fn set_traceable(&mut self, traceable: bool) {
        self.traceable = traceable;
    }

    #[must_use]
    pub fn is_traceable(&self) -> bool {
        self.traceable
    }

    /// The activity an agent is moved to after its query each day. The default, inactive,
    /// makes every agent draw at most once per day.
    pub fn set_touch_policy(&mut self, policy: Activity) {
        self.touch_policy = policy;
    }

    #[must_use]
    pub fn effective_factor(&self) -> f64 {
        self.effective_factor
    }

    #[must_use]
    pub fn transmitters(&self) -> &ActivityTracker {
        &self.transmitters
    }

    #[must_use]
    pub fn receivers(&self) -> &ActivityTracker {
        &self.receivers
    }

    pub fn add_transmitters(&mut self, agents: &[AgentId], multiplicity: usize) {
        self.transmitters.add_all(agents, multiplicity);
    }

    pub fn add_receivers(&mut self, agents: &[AgentId], multiplicity: usize) {
        self.receivers.add_all(agents, multiplicity);
    }

    /// Every agent of the context, transmitters first; an agent with both roles appears twice.
    pub fn agents(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.transmitters.agents().chain(self.receivers.agents())
    }

    #[must_use]
    pub fn contains(&self, agent: AgentId) -> bool {
        self.transmitters.contains(agent) || self.receivers.contains(agent)
    }

    pub fn compute_factor(&mut self) {
        self.effective_factor = self.rate_factor;
        if self.social_distancing {
            let total = self.transmitters.total_len() + self.receivers.total_len();
            if total == 0 {
                return;
            }
            let active = self.transmitters.active_len() + self.receivers.active_len();
            #[allow(clippy::cast_precision_loss)]
            let share = active as f64 / total as f64;
            self.effective_factor *= share;
        }
    }

    /// Returns `true` if the agent belongs to the context. The change takes effect from the
    /// next day the context meets.
    pub fn present(&mut self, agent: AgentId) -> bool {
        let transmits = self.transmitters.set_state(agent, Activity::Active);
        let receives = self.receivers.set_state(agent, Activity::Active);
        transmits || receives
    }

    pub fn absent(&mut self, agent: AgentId) -> bool {
        let transmits = self.transmitters.set_state(agent, Activity::Inactive);
        let receives = self.receivers.set_state(agent, Activity::Inactive);
        transmits || receives
    }

    /// The expected number of contacts drawn by transmitters on `day`.
    #[must_use]
    pub fn expectation_at(&self, day: usize) -> f64 {
        if day % 7 != self.weekday {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let pairs = self.transmitters.total_len() as f64 * self.receivers.total_len() as f64;
        self.rate_factor * pairs
    }

    /// Opens `day` if it is newer than every day seen so far: replays the attendance changes
    /// queued since the last meeting and freezes attendance again until the next one.
    fn start_day(&mut self, day: usize) -> Result<(), ContactError> {
        if self.days.latest().is_some_and(|latest| day <= latest) {
            return Ok(());
        }
        for tracker in [&mut self.transmitters, &mut self.receivers] {
            tracker.activate();
            tracker.deactivate(self.touch_policy);
        }
        self.compute_factor();
        if self.effective_factor == 0.0 && self.transmitters.active_len() > 0 {
            warn!("context '{}' meets on day {day} with a zero rate", self.label);
        }
        trace!(
            "context '{}' opens day {day} with {} active transmitters",
            self.label,
            self.transmitters.active_len()
        );
        self.days.frame_mut(day, DayMemo::default)?;
        Ok(())
    }

    fn is_past(&self, day: usize) -> bool {
        self.days.latest().is_some_and(|latest| day < latest)
    }

    fn recorded(
        &self,
        day: usize,
        agent: AgentId,
        ledger: Ledger,
    ) -> Result<PartnerCounts, ContactError> {
        Ok(self
            .days
            .frame(day)?
            .and_then(|memo| memo.ledger(ledger).get(&agent).cloned())
            .unwrap_or_default())
    }

    fn query<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        agent: AgentId,
        day: usize,
        ledger: Ledger,
    ) -> Result<PartnerCounts, ContactError> {
        if self.is_past(day) {
            return self.recorded(day, agent, ledger);
        }
        self.start_day(day)?;

        let (own, others) = match ledger {
            Ledger::Receive => (&mut self.receivers, &self.transmitters),
            _ => (&mut self.transmitters, &self.receivers),
        };
        if own.get_state(agent) != Some(Activity::Active) {
            return self.recorded(day, agent, ledger);
        }
        let weight = own.weight(agent);
        own.touch(agent);

        #[allow(clippy::cast_precision_loss)]
        let intensity = self.effective_factor * weight as f64 * others.active_len() as f64;
        let mut drawn = PartnerCounts::default();
        for _ in 0..self.poisson.draw(rng, intensity) {
            match others.random(rng) {
                Some(partner) if partner != agent => *drawn.entry(partner).or_insert(0) += 1,
                _ => {}
            }
        }

        let memo = self.days.frame_mut(day, DayMemo::default)?;
        let (mine, theirs) = match ledger {
            Ledger::Receive => (&mut memo.receive, &mut memo.transmit),
            _ => (&mut memo.transmit, &mut memo.receive),
        };
        for (partner, count) in &drawn {
            *theirs
                .entry(*partner)
                .or_default()
                .entry(agent)
                .or_insert(0) += count;
        }
        let mine = mine.entry(agent).or_default();
        merge_counts(mine, &drawn);
        Ok(mine.clone())
    }

    /// Whom `agent` may have infected on `day`. Draws on the agent's first query of a day and
    /// returns the memo afterwards; absent agents only see contacts recorded by others.
    pub fn query_transmit<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        agent: AgentId,
        day: usize,
    ) -> Result<PartnerCounts, ContactError> {
        self.query(rng, agent, day, Ledger::Transmit)
    }

    pub fn query_receive<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        agent: AgentId,
        day: usize,
    ) -> Result<PartnerCounts, ContactError> {
        self.query(rng, agent, day, Ledger::Receive)
    }

    /// Both directions summed, fixed at the first call of the day. Empty for untraceable
    /// contexts.
    pub fn query_contacts<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        agent: AgentId,
        day: usize,
    ) -> Result<PartnerCounts, ContactError> {
        if !self.traceable {
            return Ok(PartnerCounts::default());
        }
        if self.is_past(day) {
            let recorded = self.recorded(day, agent, Ledger::Contacts)?;
            if !recorded.is_empty() {
                return Ok(recorded);
            }
            let mut contacts = self.recorded(day, agent, Ledger::Transmit)?;
            merge_counts(&mut contacts, &self.recorded(day, agent, Ledger::Receive)?);
            return Ok(contacts);
        }
        self.start_day(day)?;
        if let Some(contacts) = self
            .days
            .frame(day)?
            .and_then(|memo| memo.contacts.get(&agent))
        {
            return Ok(contacts.clone());
        }
        let mut contacts = self.query_transmit(rng, agent, day)?;
        merge_counts(&mut contacts, &self.query_receive(rng, agent, day)?);
        let memo = self.days.frame_mut(day, DayMemo::default)?;
        memo.contacts.insert(agent, contacts.clone());
        Ok(contacts)
    }
}
