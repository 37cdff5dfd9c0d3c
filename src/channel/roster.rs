//! Day-stamped attendance for sparse channels. Absences carry over from one day to the next
//! until the agent is marked present again, and the last `history_days` days stay queryable.

use std::collections::VecDeque;

use crate::{AgentId, HashSet};

#[derive(Debug, Clone)]
pub struct AbsenteeRoster {
    day: usize,
    today: HashSet<AgentId>,
    /// Absentees of earlier days, most recent first.
    history: VecDeque<HashSet<AgentId>>,
    history_days: usize,
}

impl AbsenteeRoster {
    #[must_use]
    pub fn new(history_days: usize) -> Self {
        AbsenteeRoster {
            day: 0,
            today: HashSet::default(),
            history: VecDeque::new(),
            history_days: history_days.max(1),
        }
    }

    #[must_use]
    pub fn day(&self) -> usize {
        self.day
    }

    /// Moves to the next day, carrying today's absentees forward.
    pub fn advance(&mut self) {
        self.history.push_front(self.today.clone());
        self.history.truncate(self.history_days - 1);
        self.day += 1;
    }

    /// Marks `agent` absent from `day` on. Days before `day` keep their record.
    pub fn absent(&mut self, agent: AgentId, day: usize) {
        self.mark(agent, day, true);
    }

    /// Marks `agent` present from `day` on.
    pub fn present(&mut self, agent: AgentId, day: usize) {
        self.mark(agent, day, false);
    }

    fn mark(&mut self, agent: AgentId, day: usize, absent: bool) {
        while self.day < day {
            self.advance();
        }
        let apply = |absentees: &mut HashSet<AgentId>| {
            if absent {
                absentees.insert(agent);
            } else {
                absentees.remove(&agent);
            }
        };
        apply(&mut self.today);
        // The roster may already stand past `day`; those later days change too.
        for absentees in self.history.iter_mut().take(self.day - day) {
            apply(absentees);
        }
    }

    /// Whether `agent` was absent on `day`. Days in the future or no longer retained count as
    /// attended.
    #[must_use]
    pub fn is_absent(&self, agent: AgentId, day: usize) -> bool {
        if day == self.day {
            return self.today.contains(&agent);
        }
        day < self.day
            && self
                .history
                .get(self.day - day - 1)
                .is_some_and(|absentees| absentees.contains(&agent))
    }
}
