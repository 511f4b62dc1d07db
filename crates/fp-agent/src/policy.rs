//! Epsilon-greedy exploration policy.
//!
//! A single-step bandit over a small named action catalog. The learned
//! value table is seeded with designer priors (dialog handling beats
//! blind clicking), updated additively from the per-tick reward, and
//! read through an *effective* value that subtracts a fatigue penalty
//! so the policy cannot collapse onto one repeatedly-rewarded action.
//!
//! Reward shaping keeps the ordering novelty >> artifact >> fatigue:
//! reaching a never-seen UI state pays far more than another score
//! increment, which in turn beats doing nothing.

use rand::prelude::IndexedRandom;
use rand::Rng;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, trace};

/// Tuning constants for the policy. Serde-loadable so experiments can
/// reshape rewards without a rebuild; defaults are the tuned values.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicyTuning {
    /// Exploration rate at t=0.
    pub epsilon_initial: f64,
    /// Exploration rate floor reached at the session deadline.
    pub epsilon_floor: f64,
    /// Additive update step.
    pub learning_rate: f64,
    /// Paid the first time a UI-state hash is seen.
    pub novelty_reward: f64,
    /// Per-revisit penalty scale: `-(visits - 1) * scale`.
    pub revisit_penalty_scale: f64,
    /// Score delta multiplier when the feedback channel reports growth.
    pub artifact_reward_scale: f64,
    /// Flat cost of a tick with no score growth.
    pub idle_cost: f64,
    /// Fatigue penalty per prior execution of an action.
    pub fatigue_scale: f64,
    /// Fatigue multiplier when the action repeats last tick's choice.
    pub repeat_penalty_multiplier: f64,
    /// Extra penalty when the chosen action could not be carried out.
    pub failure_penalty: f64,
}

impl Default for PolicyTuning {
    fn default() -> Self {
        PolicyTuning {
            epsilon_initial: 0.5,
            epsilon_floor: 0.05,
            learning_rate: 0.4,
            novelty_reward: 50.0,
            revisit_penalty_scale: 1.0,
            artifact_reward_scale: 10.0,
            idle_cost: -2.0,
            fatigue_scale: 0.5,
            repeat_penalty_multiplier: 2.0,
            failure_penalty: -5.0,
        }
    }
}

/// Designer priors for the fixed action catalog.
///
/// Actions not listed (per-target hotkeys) seed at [`HOTKEY_PRIOR`].
pub const ACTION_PRIORS: &[(&str, f64)] = &[
    ("dialog_handler", 15.0),
    ("menu_exploration", 12.0),
    ("ui_crawl", 10.0),
    ("ui_input", 8.0),
    ("nav_tab", 5.0),
    ("nav_escape", 5.0),
    ("random_click", 3.0),
];

pub const HOTKEY_PRIOR: f64 = 5.0;

/// Mutable state of the exploration policy for one session.
#[derive(Debug)]
pub struct ExplorationState {
    values: HashMap<String, f64>,
    counts: HashMap<String, u32>,
    last_action: Option<String>,
    consecutive_repeats: u32,
    visit_counts: HashMap<String, u32>,
    interacted: HashSet<String>,
    last_score: i64,
    tuning: PolicyTuning,
}

impl ExplorationState {
    /// Seed the value table: known catalog names get their prior,
    /// everything else (hotkeys) the hotkey prior.
    pub fn new(actions: &[String], tuning: PolicyTuning) -> Self {
        let mut values = HashMap::new();
        for name in actions {
            let prior = ACTION_PRIORS
                .iter()
                .find(|(known, _)| known == name)
                .map(|(_, prior)| *prior)
                .unwrap_or(HOTKEY_PRIOR);
            values.insert(name.clone(), prior);
        }
        ExplorationState {
            values,
            counts: HashMap::new(),
            last_action: None,
            consecutive_repeats: 0,
            visit_counts: HashMap::new(),
            interacted: HashSet::new(),
            last_score: 0,
            tuning,
        }
    }

    pub fn tuning(&self) -> &PolicyTuning {
        &self.tuning
    }

    /// Linear epsilon decay: `max(floor, e0 - (e0 - floor) * t/d)`.
    pub fn epsilon(&self, elapsed: Duration, duration: Duration) -> f64 {
        let e0 = self.tuning.epsilon_initial;
        let floor = self.tuning.epsilon_floor;
        if duration.is_zero() {
            return floor;
        }
        let progress = elapsed.as_secs_f64() / duration.as_secs_f64();
        (e0 - (e0 - floor) * progress).max(floor)
    }

    /// Learned value minus fatigue; repeating last tick's action
    /// inflates the fatigue term.
    fn effective_value(&self, action: &str) -> f64 {
        let value = self.values.get(action).copied().unwrap_or(0.0);
        let count = self.counts.get(action).copied().unwrap_or(0);
        let mut fatigue = self.tuning.fatigue_scale * f64::from(count);
        if self.last_action.as_deref() == Some(action) {
            fatigue *= self.tuning.repeat_penalty_multiplier;
        }
        value - fatigue
    }

    /// Epsilon-greedy selection over the whole catalog.
    pub fn choose_action<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        elapsed: Duration,
        duration: Duration,
    ) -> String {
        let epsilon = self.epsilon(elapsed, duration);
        // Sorted for deterministic tie-breaks
        let mut names: Vec<&String> = self.values.keys().collect();
        names.sort();

        let choice = if rng.random::<f64>() < epsilon {
            (*names.choose(rng).expect("catalog is never empty")).clone()
        } else {
            names
                .iter()
                .map(|name| (*name, self.effective_value(name)))
                .max_by(|(_, a), (_, b)| a.partial_cmp(b).expect("values are finite"))
                .map(|(name, _)| name.clone())
                .expect("catalog is never empty")
        };
        trace!(action = %choice, epsilon, "action selected");
        choice
    }

    /// Book-keeping after an action is carried out (success or not).
    pub fn record_execution(&mut self, action: &str) {
        *self.counts.entry(action.to_string()).or_insert(0) += 1;
        if self.last_action.as_deref() == Some(action) {
            self.consecutive_repeats += 1;
        } else {
            self.consecutive_repeats = 0;
        }
        self.last_action = Some(action.to_string());
    }

    /// Additive bandit update against the last executed action.
    pub fn update(&mut self, reward: f64) {
        let Some(action) = self.last_action.clone() else {
            return;
        };
        let value = self.values.entry(action.clone()).or_insert(0.0);
        *value += self.tuning.learning_rate * reward;
        debug!(action = %action, reward, value = *value, "value updated");
    }

    /// Novelty shaping: first sight of a state pays the bonus, each
    /// revisit costs more than the last.
    pub fn observe_state(&mut self, state_hash: &str) -> f64 {
        let visits = self.visit_counts.entry(state_hash.to_string()).or_insert(0);
        *visits += 1;
        if *visits == 1 {
            self.tuning.novelty_reward
        } else {
            -f64::from(*visits - 1) * self.tuning.revisit_penalty_scale
        }
    }

    /// Artifact shaping from the controller's published score.
    pub fn score_reward(&mut self, score: i64) -> f64 {
        let delta = score - self.last_score;
        self.last_score = score;
        if delta > 0 {
            delta as f64 * self.tuning.artifact_reward_scale
        } else {
            self.tuning.idle_cost
        }
    }

    pub fn failure_penalty(&self) -> f64 {
        self.tuning.failure_penalty
    }

    pub fn consecutive_repeats(&self) -> u32 {
        self.consecutive_repeats
    }

    pub fn value_of(&self, action: &str) -> Option<f64> {
        self.values.get(action).copied()
    }

    pub fn execution_count(&self, action: &str) -> u32 {
        self.counts.get(action).copied().unwrap_or(0)
    }

    /// Elements already interacted with this session, by identity key.
    pub fn mark_interacted(&mut self, identity: &str) -> bool {
        self.interacted.insert(identity.to_string())
    }

    pub fn already_interacted(&self, identity: &str) -> bool {
        self.interacted.contains(identity)
    }
}
