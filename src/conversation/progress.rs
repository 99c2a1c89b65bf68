//! Cross-session learner progress
//!
//! Survives "new session"; only the persistence layer ever replaces it.

use super::lexicon::Topic;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Mistakes on one topic that trigger a refresher offer
pub const REFRESHER_THRESHOLD: u32 = 2;

/// Consecutive-day activity streak
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Streak {
    pub count: u32,
    pub last_active: Option<NaiveDate>,
}

impl Streak {
    /// Record activity on `today`. Returns true if anything changed.
    pub fn record_activity(&mut self, today: NaiveDate) -> bool {
        match self.last_active {
            Some(last) if last == today => return false,
            Some(last) if last.succ_opt() == Some(today) => self.count += 1,
            _ => self.count = 1,
        }
        self.last_active = Some(today);
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnerProgress {
    /// Topics seen at least once; never un-marked
    pub covered: BTreeSet<Topic>,
    pub streak: Streak,
    pub mistakes: BTreeMap<Topic, u32>,
}

impl LearnerProgress {
    /// Mark topics covered, returning the ones that were new
    pub fn mark_covered(&mut self, topics: impl IntoIterator<Item = Topic>) -> Vec<Topic> {
        topics
            .into_iter()
            .filter(|t| self.covered.insert(*t))
            .collect()
    }

    pub fn is_covered(&self, topic: Topic) -> bool {
        self.covered.contains(&topic)
    }

    /// Count a mistake; returns the new count for the topic
    pub fn record_mistake(&mut self, topic: Topic) -> u32 {
        let count = self.mistakes.entry(topic).or_insert(0);
        *count += 1;
        *count
    }

    pub fn mistakes_for(&self, topic: Topic) -> u32 {
        self.mistakes.get(&topic).copied().unwrap_or(0)
    }
}
