//! Authoritative game state and the merge rule for judgments reported by
//! both players.

use crate::error::{ServerError, ServerResult};
use log::{debug, info};
use shared::{Chart, Judgment, Note, SessionStats};
use tokio::sync::Mutex;

/// What the reconciler did with an incoming judgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// First informative judgment for the note; it is now canonical.
    Scored,
    /// Both players missed the note; combo was reset.
    ConfirmedMiss,
    /// The note already carries a hit from the other player.
    Discarded,
}

impl Outcome {
    pub fn should_broadcast(self) -> bool {
        !matches!(self, Outcome::Discarded)
    }
}

#[derive(Debug, Clone)]
pub struct GameState {
    pub notes: Vec<Note>,
    pub score: u64,
    pub combo: u32,
    pub max_combo: u32,
    pub recent: Option<(usize, Judgment)>,
}

impl GameState {
    /// Starts a session from `chart` with every judgment unset.
    pub fn new(chart: &Chart) -> Self {
        let notes = chart
            .notes
            .iter()
            .cloned()
            .map(|mut note| {
                note.judgment = None;
                note
            })
            .collect();

        Self {
            notes,
            score: 0,
            combo: 0,
            max_combo: 0,
            recent: None,
        }
    }

    /// Merges one player's judgment for `note_id`.
    ///
    /// A miss only resets the combo once both players have missed. Among hits
    /// the first to arrive wins; a later hit for the same note is discarded
    /// even when it is better.
    pub fn apply(&mut self, note_id: usize, judgment: Judgment) -> ServerResult<Outcome> {
        let note = self
            .notes
            .get_mut(note_id)
            .ok_or(ServerError::UnknownNote(note_id))?;

        let outcome = match note.judgment {
            Some(Judgment::NoCredit) if judgment.is_miss() => {
                self.combo = 0;
                Outcome::ConfirmedMiss
            }
            None | Some(Judgment::NoCredit) => {
                note.judgment = Some(judgment);
                self.score += u64::from(judgment.score());
                if !judgment.is_miss() {
                    self.combo += 1;
                    self.max_combo = self.max_combo.max(self.combo);
                }
                Outcome::Scored
            }
            Some(_) => Outcome::Discarded,
        };

        if outcome.should_broadcast() {
            self.recent = Some((note_id, judgment));
        }

        debug!(
            "Note {} <- {}: {:?} (score {}, combo {})",
            note_id, judgment, outcome, self.score, self.combo
        );
        Ok(outcome)
    }

    /// Final statistics; max combo comes from the arrival-order tracking.
    pub fn stats(&self) -> SessionStats {
        let mut stats = SessionStats::tally(&self.notes);
        stats.score = self.score;
        stats.max_combo = self.max_combo;
        stats
    }
}

/// Single owner of the authoritative [`GameState`]; every mutation goes
/// through one lock.
pub struct Reconciler {
    state: Mutex<GameState>,
}

impl Reconciler {
    pub fn new(chart: &Chart) -> Self {
        info!("Reconciler ready for {} notes", chart.len());
        Self {
            state: Mutex::new(GameState::new(chart)),
        }
    }

    pub async fn reconcile(&self, note_id: usize, judgment: Judgment) -> ServerResult<Outcome> {
        let mut state = self.state.lock().await;
        state.apply(note_id, judgment)
    }

    pub async fn stats(&self) -> SessionStats {
        self.state.lock().await.stats()
    }

    pub async fn snapshot(&self) -> GameState {
        self.state.lock().await.clone()
    }
}
