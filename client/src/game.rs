//! Client-side note judgment engine.
//!
//! The engine owns the local copy of the chart and is driven by the render
//! loop: one [`JudgmentEngine::tick`] per frame plus key events, each stamped
//! with the elapsed session time in milliseconds. Every judgment decided
//! locally is returned to the caller so it can be forwarded to the server;
//! judgments decided by the other player arrive through
//! [`JudgmentEngine::apply_remote`].

use log::{debug, warn};
use shared::{Chart, Judgment, Note, SessionStats, LANE_COUNT};
use std::collections::{BTreeSet, HashSet};

/// Vertical position of the judge line. Notes fall one pixel per
/// millisecond, so a note reaches the line `JUDGE_LINE` ms after its onset.
pub const JUDGE_LINE: f64 = 615.0;
/// Open interval of positions in which a note can be hit.
pub const HIT_WINDOW: (f64, f64) = (400.0, 800.0);
/// A tap note that falls past this position is missed.
pub const MISS_LINE: f64 = 700.0;
pub const RELEASE_TOLERANCE_MS: f64 = 150.0;
pub const VISIBLE_WINDOW_MS: f64 = 2000.0;
/// Only this many of the highest-indexed pressed lanes can hit notes.
pub const MAX_ACTIVE_LANES: usize = 2;

/// Local lifecycle of a note. Never sent over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteState {
    /// Outside the hit window and not yet judged.
    Pending,
    Hittable,
    /// Hold note whose head was hit; the key-up decides the judgment.
    Holding,
    Judged(Judgment),
}

impl NoteState {
    /// Finished notes are no longer drawn.
    pub fn is_finished(self) -> bool {
        matches!(self, NoteState::Judged(_))
    }
}

/// A judgment decided by this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JudgmentEvent {
    pub note_id: usize,
    pub judgment: Judgment,
}

#[derive(Debug, Clone)]
pub struct LiveNote {
    pub note: Note,
    pub state: NoteState,
}

impl LiveNote {
    /// Position of the note head at `elapsed`.
    pub fn position(&self, elapsed: f64) -> f64 {
        elapsed - self.note.time as f64
    }

    /// Position of a hold note's tail at `elapsed`.
    pub fn tail_position(&self, elapsed: f64) -> f64 {
        elapsed - self.note.end_time() as f64
    }

    fn in_hit_window(&self, elapsed: f64) -> bool {
        let position = self.position(elapsed);
        position > HIT_WINDOW.0 && position < HIT_WINDOW.1
    }

    fn tail_deadline(&self) -> f64 {
        self.note.end_time() as f64 + JUDGE_LINE
    }

    fn is_open(&self) -> bool {
        matches!(self.state, NoteState::Pending | NoteState::Hittable)
    }
}

/// Accuracy of a key press against `note`, 1.0 being exactly on the judge line.
pub fn accuracy(note: &Note, lane: u8, elapsed: f64) -> f64 {
    if note.lane != lane || elapsed < note.time as f64 {
        return 0.0;
    }
    1.0 - (elapsed - (note.time as f64 + JUDGE_LINE)) / 1000.0
}

fn lane_slot(lane: u8) -> Option<usize> {
    let slot = usize::from(lane).checked_sub(1)?;
    (slot < LANE_COUNT).then_some(slot)
}

pub struct JudgmentEngine {
    notes: Vec<LiveNote>,
    end: f64,
    /// First note that may still be visible; never moves backwards.
    cursor: usize,
    pressed: BTreeSet<u8>,
    holds: [Option<usize>; LANE_COUNT],
    announced: HashSet<usize>,
    banner: Option<JudgmentEvent>,
}

impl JudgmentEngine {
    pub fn new(chart: &Chart) -> Self {
        let notes = chart
            .notes
            .iter()
            .cloned()
            .map(|mut note| {
                note.judgment = None;
                LiveNote {
                    note,
                    state: NoteState::Pending,
                }
            })
            .collect();

        Self {
            notes,
            end: chart.end as f64,
            cursor: 0,
            pressed: BTreeSet::new(),
            holds: [None; LANE_COUNT],
            announced: HashSet::new(),
            banner: None,
        }
    }

    pub fn notes(&self) -> &[LiveNote] {
        &self.notes
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Most recent announced judgment.
    pub fn banner(&self) -> Option<JudgmentEvent> {
        self.banner
    }

    pub fn is_over(&self, elapsed: f64) -> bool {
        elapsed >= self.end
    }

    pub fn is_pressed(&self, lane: u8) -> bool {
        self.pressed.contains(&lane)
    }

    /// Whether a pressed lane is among the ones allowed to hit notes.
    pub fn is_lane_active(&self, lane: u8) -> bool {
        self.pressed
            .iter()
            .rev()
            .take(MAX_ACTIVE_LANES)
            .any(|active| *active == lane)
    }

    /// Unfinished notes inside the visible window.
    pub fn visible_notes(&self, elapsed: f64) -> impl Iterator<Item = &LiveNote> {
        let horizon = elapsed + VISIBLE_WINDOW_MS;
        self.notes[self.cursor..]
            .iter()
            .take_while(move |live| live.note.time as f64 <= horizon)
            .filter(|live| !live.state.is_finished())
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats::tally(self.notes.iter().map(|live| &live.note))
    }

    /// Advances note states to `elapsed` and returns the misses it decided.
    pub fn tick(&mut self, elapsed: f64) -> Vec<JudgmentEvent> {
        let horizon = elapsed + VISIBLE_WINDOW_MS;
        let mut emitted = Vec::new();

        for index in self.cursor..self.notes.len() {
            let live = &mut self.notes[index];
            if live.note.time as f64 > horizon {
                break;
            }

            match live.state {
                NoteState::Judged(_) => continue,
                NoteState::Holding => {}
                NoteState::Pending | NoteState::Hittable => {
                    live.state = if live.in_hit_window(elapsed) {
                        NoteState::Hittable
                    } else {
                        NoteState::Pending
                    };
                }
            }

            let missed = if live.note.is_hold() {
                elapsed > live.tail_deadline()
            } else {
                live.position(elapsed) > MISS_LINE
            };
            if missed {
                emitted.push(self.judge(index, Judgment::NoCredit));
            }
        }

        while let Some(live) = self.notes.get(self.cursor) {
            let scrolled_out = (live.note.end_time() as f64) < elapsed - VISIBLE_WINDOW_MS;
            if !(live.state.is_finished() && scrolled_out) {
                break;
            }
            self.cursor += 1;
        }

        emitted
    }

    /// Handles a lane key press. Taps are judged at once; a hold head only
    /// starts holding.
    pub fn key_down(&mut self, lane: u8, elapsed: f64) -> Option<JudgmentEvent> {
        let slot = lane_slot(lane)?;
        self.pressed.insert(lane);

        if !self.is_lane_active(lane) {
            debug!("Lane {} pressed but limited", lane);
            return None;
        }
        if self.holds[slot].is_some() {
            return None;
        }

        let horizon = elapsed + VISIBLE_WINDOW_MS;
        let offset = self.notes[self.cursor..]
            .iter()
            .take_while(|live| live.note.time as f64 <= horizon)
            .position(|live| {
                live.note.lane == lane && live.is_open() && live.in_hit_window(elapsed)
            })?;
        let index = self.cursor + offset;

        let live = &mut self.notes[index];
        let accuracy = accuracy(&live.note, lane, elapsed);
        if live.note.is_hold() {
            if accuracy > 0.0 {
                live.state = NoteState::Holding;
                self.holds[slot] = Some(index);
                debug!("Holding note {} in lane {}", index, lane);
            }
            None
        } else {
            Some(self.judge(index, Judgment::from_accuracy(accuracy)))
        }
    }

    /// Handles a lane key release, judging the hold it was keeping alive.
    pub fn key_up(&mut self, lane: u8, elapsed: f64) -> Option<JudgmentEvent> {
        let slot = lane_slot(lane)?;
        self.pressed.remove(&lane);

        let index = self.holds[slot].take()?;
        let live = &self.notes[index];
        if live.state != NoteState::Holding {
            return None;
        }

        let lateness = elapsed - live.note.end_time() as f64;
        let judgment = if lateness <= RELEASE_TOLERANCE_MS {
            Judgment::from_accuracy(1.0 - lateness / 1000.0)
        } else {
            Judgment::NoCredit
        };
        Some(self.judge(index, judgment))
    }

    /// Applies a judgment echoed by the server.
    ///
    /// A remote miss on a note this client is holding leaves the hold running,
    /// so the release is still judged locally.
    pub fn apply_remote(&mut self, note_id: usize, judgment: Judgment) -> bool {
        let Some(live) = self.notes.get_mut(note_id) else {
            warn!("Server judged note {} which is not in the chart", note_id);
            return false;
        };

        live.note.judgment = Some(judgment);
        if judgment.is_miss() && live.state == NoteState::Holding {
            debug!("Note {} missed remotely while held", note_id);
            self.announce(JudgmentEvent { note_id, judgment });
            return true;
        }

        live.state = NoteState::Judged(judgment);
        let lane = live.note.lane;
        self.release_hold(lane, note_id);
        self.announce(JudgmentEvent { note_id, judgment });
        true
    }

    fn judge(&mut self, index: usize, judgment: Judgment) -> JudgmentEvent {
        let live = &mut self.notes[index];
        live.state = NoteState::Judged(judgment);
        live.note.judgment = Some(judgment);
        let event = JudgmentEvent {
            note_id: live.note.id,
            judgment,
        };
        let lane = live.note.lane;

        self.release_hold(lane, index);
        self.announce(event);
        debug!("Note {} judged {}", event.note_id, judgment);
        event
    }

    fn release_hold(&mut self, lane: u8, index: usize) {
        if let Some(hold) = lane_slot(lane).and_then(|slot| self.holds.get_mut(slot)) {
            if *hold == Some(index) {
                *hold = None;
            }
        }
    }

    /// Shows `event` on the banner the first time its note is announced.
    fn announce(&mut self, event: JudgmentEvent) {
        if self.announced.insert(event.note_id) {
            self.banner = Some(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn chart(notes: Vec<Note>) -> Chart {
        Chart {
            end: notes.last().map_or(0, |note| note.end_time()) + 3000,
            notes,
            audio: "song.mp3".to_string(),
            offset: 0,
        }
    }

    fn hold_chart() -> JudgmentEngine {
        JudgmentEngine::new(&chart(vec![Note::new(0, 1, 1000, 2000)]))
    }

    #[test]
    fn test_accuracy() {
        let note = Note::new(0, 3, 1000, 0);
        assert_approx_eq!(accuracy(&note, 3, 1615.0), 1.0, 1e-9);
        assert_approx_eq!(accuracy(&note, 3, 1715.0), 0.9, 1e-9);
        assert_approx_eq!(accuracy(&note, 3, 1515.0), 1.1, 1e-9);
        assert_eq!(accuracy(&note, 4, 1615.0), 0.0);
        assert_eq!(accuracy(&note, 3, 900.0), 0.0);
    }

    #[test]
    fn test_new_engine_starts_clean() {
        let mut source = chart(vec![Note::new(0, 1, 0, 0)]);
        source.notes[0].judgment = Some(Judgment::Good);
        let engine = JudgmentEngine::new(&source);

        assert_eq!(engine.notes()[0].state, NoteState::Pending);
        assert_eq!(engine.notes()[0].note.judgment, None);
        assert_eq!(engine.banner(), None);
        assert_eq!(engine.cursor(), 0);
    }

    #[test]
    fn test_tap_on_judge_line_is_excellent() {
        let mut engine = JudgmentEngine::new(&chart(vec![Note::new(0, 3, 1000, 0)]));
        engine.tick(1600.0);
        assert_eq!(engine.notes()[0].state, NoteState::Hittable);

        let event = engine.key_down(3, 1615.0).unwrap();
        assert_eq!(event, JudgmentEvent { note_id: 0, judgment: Judgment::Excellent });
        assert_eq!(engine.notes()[0].state, NoteState::Judged(Judgment::Excellent));
        assert_eq!(engine.banner(), Some(event));
        assert_eq!(engine.stats().score, 500);
    }

    #[test]
    fn test_tap_late_hit_grades_down() {
        let mut engine = JudgmentEngine::new(&chart(vec![Note::new(0, 2, 0, 0)]));
        let event = engine.key_down(2, 700.0).unwrap();
        assert_eq!(event.judgment, Judgment::VeryGood);
    }

    #[test]
    fn test_tap_outside_window_is_ignored() {
        let mut engine = JudgmentEngine::new(&chart(vec![Note::new(0, 2, 1000, 0)]));
        assert_eq!(engine.key_down(2, 1300.0), None);
        engine.key_up(2, 1310.0);
        assert_eq!(engine.notes()[0].state, NoteState::Pending);
    }

    #[test]
    fn test_wrong_lane_does_not_hit() {
        let mut engine = JudgmentEngine::new(&chart(vec![Note::new(0, 2, 1000, 0)]));
        assert_eq!(engine.key_down(5, 1615.0), None);
        assert!(!engine.notes()[0].state.is_finished());
    }

    #[test]
    fn test_earliest_note_in_lane_is_hit_first() {
        let mut engine = JudgmentEngine::new(&chart(vec![
            Note::new(0, 4, 1000, 0),
            Note::new(1, 4, 1100, 0),
        ]));
        let event = engine.key_down(4, 1650.0).unwrap();
        assert_eq!(event.note_id, 0);
        engine.key_up(4, 1660.0);

        let event = engine.key_down(4, 1700.0).unwrap();
        assert_eq!(event.note_id, 1);
    }

    #[test]
    fn test_tap_missed_past_miss_line() {
        let mut engine = JudgmentEngine::new(&chart(vec![Note::new(0, 1, 1000, 0)]));
        assert!(engine.tick(1700.0).is_empty());

        let missed = engine.tick(1701.0);
        assert_eq!(missed, vec![JudgmentEvent { note_id: 0, judgment: Judgment::NoCredit }]);
        assert_eq!(engine.notes()[0].state, NoteState::Judged(Judgment::NoCredit));
        assert!(engine.tick(1800.0).is_empty());
    }

    #[test]
    fn test_hold_release_on_time_is_excellent() {
        let mut engine = hold_chart();
        assert_eq!(engine.key_down(1, 1615.0), None);
        assert_eq!(engine.notes()[0].state, NoteState::Holding);
        assert!(engine.tick(3000.0).is_empty());

        let event = engine.key_up(1, 3050.0).unwrap();
        assert_eq!(event.judgment, Judgment::Excellent);
        assert_eq!(engine.notes()[0].note.judgment, Some(Judgment::Excellent));
    }

    #[test]
    fn test_hold_release_too_late_is_no_credit() {
        let mut engine = hold_chart();
        engine.key_down(1, 1615.0);
        let event = engine.key_up(1, 3200.0).unwrap();
        assert_eq!(event.judgment, Judgment::NoCredit);
    }

    #[test]
    fn test_hold_released_early_is_no_credit() {
        let mut engine = hold_chart();
        engine.key_down(1, 1615.0);
        let event = engine.key_up(1, 2000.0).unwrap();
        assert_eq!(event.judgment, Judgment::NoCredit);
    }

    #[test]
    fn test_hold_missed_at_tail_deadline() {
        let mut engine = hold_chart();
        engine.key_down(1, 1615.0);
        assert!(engine.tick(3615.0).is_empty());

        let missed = engine.tick(3616.0);
        assert_eq!(missed, vec![JudgmentEvent { note_id: 0, judgment: Judgment::NoCredit }]);
        assert_eq!(engine.key_up(1, 3700.0), None);
    }

    #[test]
    fn test_unpressed_hold_missed_at_tail_deadline() {
        let mut engine = hold_chart();
        assert!(engine.tick(2000.0).is_empty());
        assert_eq!(engine.tick(3700.0).len(), 1);
    }

    #[test]
    fn test_only_two_highest_lanes_are_active() {
        let mut engine = JudgmentEngine::new(&chart(vec![Note::new(0, 1, 1000, 0)]));
        engine.key_down(2, 1500.0);
        engine.key_down(3, 1500.0);

        assert!(!engine.is_pressed(1));
        assert_eq!(engine.key_down(1, 1615.0), None);
        assert!(engine.is_pressed(1));
        assert!(!engine.is_lane_active(1));
        assert!(engine.is_lane_active(2));
        assert!(engine.is_lane_active(3));

        engine.key_up(3, 1620.0);
        engine.key_up(1, 1620.0);
        let event = engine.key_down(1, 1630.0).unwrap();
        assert_eq!(event.judgment, Judgment::Excellent);
    }

    #[test]
    fn test_unmapped_lane_is_ignored() {
        let mut engine = JudgmentEngine::new(&chart(vec![Note::new(0, 1, 1000, 0)]));
        assert_eq!(engine.key_down(0, 1615.0), None);
        assert_eq!(engine.key_down(9, 1615.0), None);
        assert!(!engine.is_pressed(0));
        assert!(!engine.is_pressed(9));
    }

    #[test]
    fn test_remote_judgment_drives_banner_once() {
        let mut engine = JudgmentEngine::new(&chart(vec![
            Note::new(0, 1, 1000, 0),
            Note::new(1, 2, 1000, 0),
        ]));

        assert!(engine.apply_remote(0, Judgment::Good));
        assert_eq!(engine.notes()[0].state, NoteState::Judged(Judgment::Good));
        assert_eq!(engine.banner(), Some(JudgmentEvent { note_id: 0, judgment: Judgment::Good }));

        let local = engine.key_down(2, 1615.0).unwrap();
        assert_eq!(engine.banner(), Some(local));

        assert!(engine.apply_remote(0, Judgment::Excellent));
        assert_eq!(engine.notes()[0].state, NoteState::Judged(Judgment::Excellent));
        assert_eq!(engine.banner(), Some(local));
    }

    #[test]
    fn test_local_announcement_is_not_repeated_by_echo() {
        let mut engine = JudgmentEngine::new(&chart(vec![Note::new(0, 1, 1000, 0)]));
        let local = engine.key_down(1, 1615.0).unwrap();
        engine.apply_remote(0, local.judgment);
        assert_eq!(engine.banner(), Some(local));
        assert_eq!(engine.stats().count(Judgment::Excellent), 1);
    }

    #[test]
    fn test_remote_miss_closes_open_note() {
        let mut engine = hold_chart();
        engine.tick(1500.0);
        assert_eq!(engine.notes()[0].state, NoteState::Hittable);

        assert!(engine.apply_remote(0, Judgment::NoCredit));
        assert_eq!(engine.notes()[0].state, NoteState::Judged(Judgment::NoCredit));
        assert_eq!(
            engine.banner(),
            Some(JudgmentEvent { note_id: 0, judgment: Judgment::NoCredit })
        );

        // The note can no longer be hit, and time does not miss it twice
        assert_eq!(engine.key_down(1, 1615.0), None);
        assert_eq!(engine.notes()[0].state, NoteState::Judged(Judgment::NoCredit));
        assert!(engine.tick(3700.0).is_empty());
    }

    #[test]
    fn test_remote_miss_closes_pending_tap() {
        let mut engine = JudgmentEngine::new(&chart(vec![Note::new(0, 1, 1000, 0)]));
        assert!(engine.apply_remote(0, Judgment::NoCredit));
        assert_eq!(engine.key_down(1, 1615.0), None);
        assert_eq!(engine.stats().count(Judgment::NoCredit), 1);
    }

    #[test]
    fn test_remote_miss_keeps_hold_alive() {
        let mut engine = hold_chart();
        engine.key_down(1, 1615.0);
        assert!(engine.apply_remote(0, Judgment::NoCredit));
        assert_eq!(engine.notes()[0].state, NoteState::Holding);
        assert_eq!(
            engine.banner(),
            Some(JudgmentEvent { note_id: 0, judgment: Judgment::NoCredit })
        );

        assert_eq!(engine.key_up(1, 3000.0).unwrap().judgment, Judgment::Excellent);
        assert_eq!(engine.notes()[0].state, NoteState::Judged(Judgment::Excellent));
        assert_eq!(engine.stats().count(Judgment::Excellent), 1);
    }

    #[test]
    fn test_remote_hit_ends_hold() {
        let mut engine = hold_chart();
        engine.key_down(1, 1615.0);
        assert!(engine.apply_remote(0, Judgment::VeryGood));
        assert_eq!(engine.key_up(1, 3000.0), None);
        assert_eq!(engine.notes()[0].state, NoteState::Judged(Judgment::VeryGood));
    }

    #[test]
    fn test_remote_unknown_note() {
        let mut engine = hold_chart();
        assert!(!engine.apply_remote(7, Judgment::Good));
    }

    #[test]
    fn test_cursor_moves_past_finished_notes() {
        let mut engine = JudgmentEngine::new(&chart(vec![
            Note::new(0, 1, 0, 0),
            Note::new(1, 2, 5000, 0),
            Note::new(2, 3, 9000, 0),
        ]));

        assert_eq!(engine.tick(701.0).len(), 1);
        assert_eq!(engine.cursor(), 0);
        assert_eq!(engine.visible_notes(701.0).count(), 0);

        engine.tick(2500.0);
        assert_eq!(engine.cursor(), 1);
        assert_eq!(engine.visible_notes(3000.0).count(), 1);
        assert_eq!(engine.visible_notes(2500.0).count(), 0);
    }

    #[test]
    fn test_cursor_waits_for_unfinished_hold() {
        let mut engine = hold_chart();
        engine.key_down(1, 1615.0);
        engine.tick(3500.0);
        assert_eq!(engine.cursor(), 0);
        assert_eq!(engine.visible_notes(3500.0).count(), 1);
    }

    #[test]
    fn test_session_end() {
        let engine = JudgmentEngine::new(&chart(vec![Note::new(0, 1, 1000, 0)]));
        assert!(!engine.is_over(3999.0));
        assert!(engine.is_over(4000.0));
    }
}
