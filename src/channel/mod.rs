//! The channels an orchestrator dispatches queries to.
//!
//! [`Channel`] is a closed set of variants with one shared capability set: directed and
//! undirected contact queries for an agent on a day, attendance changes, and the expected
//! number of contacts used for calibration. Contact processes treat a day as their state and
//! ignore attendance.

mod roster;
mod simple;
mod sparse;

use std::fmt::{self, Display};

use rand::Rng;

pub use roster::AbsenteeRoster;
pub use simple::SimpleContact;
pub use sparse::{Firing, SparseContact};

use crate::error::ContactError;
use crate::process::{AsymmetricProcess, SymmetricProcess};
use crate::{AgentId, PartnerCounts};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Simple,
    Sparse,
    Permanent,
    Symmetric,
    Asymmetric,
}

impl Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ChannelKind::Simple => "simple",
            ChannelKind::Sparse => "sparse",
            ChannelKind::Permanent => "permanent",
            ChannelKind::Symmetric => "symmetric",
            ChannelKind::Asymmetric => "asymmetric",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone)]
pub enum Channel {
    Simple(SimpleContact),
    /// Both stochastic sparse channels and permanent ones.
    Sparse(SparseContact),
    Symmetric(SymmetricProcess),
    Asymmetric(AsymmetricProcess),
}

impl Channel {
    #[must_use]
    pub fn kind(&self) -> ChannelKind {
        match self {
            Channel::Simple(_) => ChannelKind::Simple,
            Channel::Sparse(channel) if channel.is_permanent() => ChannelKind::Permanent,
            Channel::Sparse(_) => ChannelKind::Sparse,
            Channel::Symmetric(_) => ChannelKind::Symmetric,
            Channel::Asymmetric(_) => ChannelKind::Asymmetric,
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Channel::Simple(channel) => channel.label(),
            Channel::Sparse(channel) => channel.label(),
            Channel::Symmetric(process) => process.label(),
            Channel::Asymmetric(process) => process.label(),
        }
    }

    pub fn query_transmit<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        agent: AgentId,
        day: usize,
    ) -> Result<PartnerCounts, ContactError> {
        match self {
            Channel::Simple(channel) => channel.query_transmit(rng, agent, day),
            Channel::Sparse(channel) => channel.query_transmit(rng, agent, day),
            Channel::Symmetric(process) => process.query(rng, agent, day),
            Channel::Asymmetric(process) => process.query(rng, agent, day),
        }
    }

    pub fn query_receive<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        agent: AgentId,
        day: usize,
    ) -> Result<PartnerCounts, ContactError> {
        match self {
            Channel::Simple(channel) => channel.query_receive(rng, agent, day),
            Channel::Sparse(channel) => channel.query_receive(rng, agent, day),
            Channel::Symmetric(process) => process.query(rng, agent, day),
            Channel::Asymmetric(process) => process.query(rng, agent, day),
        }
    }

    pub fn query_contacts<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        agent: AgentId,
        day: usize,
    ) -> Result<PartnerCounts, ContactError> {
        match self {
            Channel::Simple(channel) => channel.query_contacts(rng, agent, day),
            Channel::Sparse(channel) => channel.query_contacts(rng, agent, day),
            Channel::Symmetric(process) => process.query(rng, agent, day),
            Channel::Asymmetric(process) => process.query(rng, agent, day),
        }
    }

    /// Marks `agent` present from `day` on. Contexts apply the change at their next meeting
    /// and processes ignore it. Returns whether the channel reacted to the change.
    pub fn present(&mut self, agent: AgentId, day: usize) -> bool {
        match self {
            Channel::Simple(channel) => channel.present(agent),
            Channel::Sparse(channel) => channel.present(agent, day),
            Channel::Symmetric(_) | Channel::Asymmetric(_) => false,
        }
    }

    pub fn absent(&mut self, agent: AgentId, day: usize) -> bool {
        match self {
            Channel::Simple(channel) => channel.absent(agent),
            Channel::Sparse(channel) => channel.absent(agent, day),
            Channel::Symmetric(_) | Channel::Asymmetric(_) => false,
        }
    }

    /// The expected number of contacts the channel produces on `day`.
    #[must_use]
    pub fn expectation_at(&self, day: usize) -> f64 {
        match self {
            Channel::Simple(channel) => channel.expectation_at(day),
            Channel::Sparse(channel) => channel.expectation_at(day),
            Channel::Symmetric(process) => process.expectation_at(day),
            Channel::Asymmetric(process) => process.expectation_at(day),
        }
    }
}
