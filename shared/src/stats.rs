//! End-of-session statistics printed by both binaries.

use crate::chart::Note;
use crate::judgment::Judgment;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub score: u64,
    pub max_combo: u32,
    pub counts: BTreeMap<Judgment, u32>,
    /// Notes that never received a judgment.
    pub unjudged: u32,
}

impl SessionStats {
    /// Tallies the judgments recorded on `notes`. Max combo is the longest run
    /// of consecutive non-miss judgments in chart order.
    pub fn tally<'a>(notes: impl IntoIterator<Item = &'a Note>) -> Self {
        let mut stats = SessionStats::default();
        let mut run = 0u32;

        for note in notes {
            match note.judgment {
                Some(judgment) => {
                    stats.score += u64::from(judgment.score());
                    *stats.counts.entry(judgment).or_insert(0) += 1;
                    if judgment.is_miss() {
                        run = 0;
                    } else {
                        run += 1;
                        stats.max_combo = stats.max_combo.max(run);
                    }
                }
                None => stats.unjudged += 1,
            }
        }

        stats
    }

    pub fn count(&self, judgment: Judgment) -> u32 {
        self.counts.get(&judgment).copied().unwrap_or(0)
    }
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Final score: {}", self.score)?;
        writeln!(f, "Max combo:   {}", self.max_combo)?;
        writeln!(f, "+-----------+-------+")?;
        writeln!(f, "| Judgment  | Count |")?;
        writeln!(f, "+-----------+-------+")?;
        for judgment in Judgment::ALL {
            writeln!(f, "| {:<9} | {:>5} |", judgment.label(), self.count(judgment))?;
        }
        writeln!(f, "| {:<9} | {:>5} |", "Unjudged", self.unjudged)?;
        write!(f, "+-----------+-------+")
    }
}
