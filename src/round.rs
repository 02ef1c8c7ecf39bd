// ====================================================================================
// src/round.rs - 回合状态机
// ====================================================================================
//! Per-room round state and its phase transitions.
//!
//! Everything here is plain data plus synchronous transitions. Callers hold the
//! room's lock while invoking these methods and use the returned [`Deadline`]
//! to arm the scheduler.

use crate::{
    config::RoundTimings,
    error::GameError,
    models::{Phase, RoundStateSnapshot},
    words::assemble,
};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

/// The deadline a timer was armed for: the phase plus the stored timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    pub phase: Phase,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RoundState {
    pub phase: Phase,
    pub available_words: Vec<String>,
    pub round_start_time: Option<DateTime<Utc>>,
    pub submission_end_time: Option<DateTime<Utc>>,
    pub voting_end_time: Option<DateTime<Utc>>,
    pub results_end_time: Option<DateTime<Utc>>,
    pub draft_sentences: HashMap<String, Vec<String>>,
    pub submitted_players: BTreeSet<String>,
    pub submitted_sentences: BTreeMap<String, String>,
    pub votes: BTreeMap<String, u32>,
    pub voted_players: BTreeSet<String>,
    pub winners: BTreeSet<String>,
    pub ready_players: BTreeSet<String>,
}

fn after(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    now + TimeDelta::from_std(delay).unwrap_or_else(|_| TimeDelta::zero())
}

// 非空且全部包含
fn covers(set: &BTreeSet<String>, players: &[String]) -> bool {
    !players.is_empty() && players.iter().all(|p| set.contains(p))
}

impl RoundState {
    pub fn new(available_words: Vec<String>) -> Self {
        Self {
            phase: Phase::Pending,
            available_words,
            round_start_time: None,
            submission_end_time: None,
            voting_end_time: None,
            results_end_time: None,
            draft_sentences: HashMap::new(),
            submitted_players: BTreeSet::new(),
            submitted_sentences: BTreeMap::new(),
            votes: BTreeMap::new(),
            voted_players: BTreeSet::new(),
            winners: BTreeSet::new(),
            ready_players: BTreeSet::new(),
        }
    }

    /// The deadline stored for the current phase, if any.
    pub fn current_deadline(&self) -> Option<Deadline> {
        let at = match self.phase {
            Phase::Pending => self.round_start_time,
            Phase::Submitting => self.submission_end_time,
            Phase::Voting => self.voting_end_time,
            Phase::Results => self.results_end_time,
        }?;
        Some(Deadline { phase: self.phase, at })
    }

    fn clear_deadlines(&mut self) {
        self.round_start_time = None;
        self.submission_end_time = None;
        self.voting_end_time = None;
        self.results_end_time = None;
    }

    // ---------------------------------------------------------------- PENDING

    /// Starts the pre-game countdown once enough players are present.
    /// Returns `None` if it is already running or the room is not pending.
    pub fn start_countdown(&mut self, player_count: usize, now: DateTime<Utc>) -> Option<Deadline> {
        if self.phase != Phase::Pending || player_count < 2 || self.round_start_time.is_some() {
            return None;
        }
        self.round_start_time = Some(now);
        self.current_deadline()
    }

    /// Clears the countdown if the room dropped below two players.
    pub fn abort_countdown(&mut self, player_count: usize) -> bool {
        if self.phase == Phase::Pending && player_count < 2 && self.round_start_time.is_some() {
            self.round_start_time = None;
            return true;
        }
        false
    }

    // ------------------------------------------------------------- SUBMITTING

    pub fn start_submitting(
        &mut self,
        words: Vec<String>,
        now: DateTime<Utc>,
        timings: &RoundTimings,
    ) -> Deadline {
        self.phase = Phase::Submitting;
        self.clear_deadlines();
        self.submitted_players.clear();
        self.submitted_sentences.clear();
        self.draft_sentences.clear();
        self.votes.clear();
        self.voted_players.clear();
        self.winners.clear();
        self.ready_players.clear();
        self.available_words = words;
        let at = after(now, timings.submission);
        self.submission_end_time = Some(at);
        Deadline { phase: Phase::Submitting, at }
    }

    /// Stores a player's in-progress chips. Ignored outside SUBMITTING.
    pub fn update_draft(&mut self, player: &str, chips: Vec<String>) -> bool {
        if self.phase != Phase::Submitting {
            return false;
        }
        self.draft_sentences.insert(player.to_string(), chips);
        true
    }

    pub fn submit(&mut self, player: &str, sentence: String) -> Result<(), GameError> {
        if self.phase != Phase::Submitting {
            return Err(GameError::WrongPhase(self.phase.as_str()));
        }
        self.submitted_players.insert(player.to_string());
        self.submitted_sentences.insert(player.to_string(), sentence);
        self.draft_sentences.remove(player);
        Ok(())
    }

    /// Fills in a sentence from the draft of every player who has not submitted.
    pub fn auto_submit(&mut self, players: &[String]) {
        for player in players {
            if !self.submitted_players.contains(player) {
                let draft = self.draft_sentences.remove(player).unwrap_or_default();
                let sentence = assemble(&draft);
                tracing::debug!(player = %player, sentence = %sentence, "auto-submitting draft");
                self.submitted_players.insert(player.clone());
                self.submitted_sentences.insert(player.clone(), sentence);
            }
        }
        self.draft_sentences.clear();
    }

    pub fn all_submitted(&self, players: &[String]) -> bool {
        self.phase == Phase::Submitting && covers(&self.submitted_players, players)
    }

    // ----------------------------------------------------------------- VOTING

    pub fn start_voting(&mut self, now: DateTime<Utc>, timings: &RoundTimings) -> Deadline {
        self.phase = Phase::Voting;
        self.clear_deadlines();
        self.draft_sentences.clear();
        let at = after(now, timings.voting);
        self.voting_end_time = Some(at);
        Deadline { phase: Phase::Voting, at }
    }

    pub fn cast_vote(&mut self, voter: &str, target: &str) -> Result<(), GameError> {
        if voter == target {
            return Err(GameError::SelfVote);
        }
        if self.phase != Phase::Voting {
            return Err(GameError::WrongPhase(self.phase.as_str()));
        }
        if self.voted_players.contains(voter) {
            return Err(GameError::AlreadyVoted);
        }
        if !self.submitted_sentences.contains_key(target) {
            return Err(GameError::InvalidTarget(target.to_string()));
        }
        *self.votes.entry(target.to_string()).or_insert(0) += 1;
        self.voted_players.insert(voter.to_string());
        Ok(())
    }

    pub fn all_voted(&self, players: &[String]) -> bool {
        self.phase == Phase::Voting && covers(&self.voted_players, players)
    }

    // ---------------------------------------------------------------- RESULTS

    pub fn start_results(&mut self, now: DateTime<Utc>, timings: &RoundTimings) -> Deadline {
        self.phase = Phase::Results;
        self.clear_deadlines();
        self.winners = self.compute_winners();
        let at = after(now, timings.results);
        self.results_end_time = Some(at);
        Deadline { phase: Phase::Results, at }
    }

    // 票数最高者（含并列），没有投票则为空
    fn compute_winners(&self) -> BTreeSet<String> {
        let Some(max) = self.votes.values().copied().max() else {
            return BTreeSet::new();
        };
        self.votes
            .iter()
            .filter(|(_, count)| **count == max)
            .map(|(player, _)| player.clone())
            .collect()
    }

    /// Marks a player ready. Returns whether anything changed.
    pub fn ready(&mut self, player: &str) -> Result<bool, GameError> {
        if self.phase != Phase::Results {
            return Err(GameError::WrongPhase(self.phase.as_str()));
        }
        Ok(self.ready_players.insert(player.to_string()))
    }

    pub fn all_ready(&self, players: &[String]) -> bool {
        self.phase == Phase::Results && covers(&self.ready_players, players)
    }

    // ------------------------------------------------------------------ LEAVE

    /// Drops a departed player from every per-phase set and their draft.
    /// Sentences and votes already recorded stay visible for the round.
    pub fn prune_player(&mut self, player: &str) -> bool {
        let mut changed = self.draft_sentences.remove(player).is_some();
        changed |= self.submitted_players.remove(player);
        changed |= self.voted_players.remove(player);
        changed |= self.ready_players.remove(player);
        changed
    }

    pub fn snapshot(&self, timings: &RoundTimings) -> RoundStateSnapshot {
        RoundStateSnapshot {
            current_phase: self.phase,
            available_words: self.available_words.clone(),
            round_start_time: self.round_start_time,
            pending_end_time: self.round_start_time.map(|start| after(start, timings.pending)),
            submission_end_time: self.submission_end_time,
            voting_end_time: self.voting_end_time,
            results_end_time: self.results_end_time,
            submitted_players: self.submitted_players.clone(),
            submitted_sentences: self.submitted_sentences.clone(),
            votes: self.votes.clone(),
            voted_players: self.voted_players.clone(),
            winners: self.winners.clone(),
            ready_players: self.ready_players.clone(),
        }
    }
}
