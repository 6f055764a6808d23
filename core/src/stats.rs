use crate::repository::Participation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Running totals for one entity.
///
/// `streak` is positive for consecutive wins and negative for consecutive losses. Matches where the
/// entity only served as a benchmark count towards `matches` but leave the win/loss record alone.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct EntityStats {
    pub matches: u32,
    pub wins: u32,
    pub losses: u32,
    pub streak: i32,
    pub best_streak: i32,
    pub worst_streak: i32,
    pub last_match: Option<DateTime<Utc>>,
}

impl EntityStats {
    pub fn record(&mut self, outcome: Participation, timestamp: DateTime<Utc>) {
        self.matches += 1;
        self.last_match = Some(timestamp);
        match outcome {
            Participation::Win => {
                self.wins += 1;
                self.streak = self.streak.max(0) + 1;
                self.best_streak = self.best_streak.max(self.streak);
            }
            Participation::Loss => {
                self.losses += 1;
                self.streak = self.streak.min(0) - 1;
                self.worst_streak = self.worst_streak.min(self.streak);
            }
            Participation::ParticipationOnly => {}
        }
    }

    /// Fraction of decided matches won, if any were decided.
    pub fn win_rate(&self) -> Option<f64> {
        let decided = self.wins + self.losses;
        (decided > 0).then(|| self.wins as f64 / decided as f64)
    }
}
