use crate::matchmaker::{Mode, Role};
use serde::{Deserialize, Serialize};

pub const MIN_RATING: i32 = 1;
pub const MAX_RATING: i32 = 100;

/// The rating assumed for entities the library has never rated.
pub const DEFAULT_RATING: i32 = 50;

/// Parameters of the logistic Elo curve.
///
/// Ratings live on a 1-100 scale, so the curve is much steeper than chess Elo: a 40 point gap
/// corresponds to 10:1 odds, and a single decisive result moves a rating by at most `k_factor`.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
pub struct Elo {
    pub k_factor: f64,
    pub scale: f64,
}

impl Default for Elo {
    fn default() -> Self {
        Self {
            k_factor: 8.0,
            scale: 40.0,
        }
    }
}

/// The rating change applied to one side of a match.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RatingChange {
    pub old: i32,
    pub new: i32,
    /// The adjustment the engine applied before clamping.
    pub delta: i32,
}

impl RatingChange {
    fn apply(old: i32, delta: i32) -> Self {
        Self {
            old,
            new: clamp(old + delta),
            delta,
        }
    }

    pub fn changed(&self) -> bool {
        self.new != self.old
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Outcome {
    pub winner: RatingChange,
    pub loser: RatingChange,
}

impl Elo {
    /// Probability that a player rated `rating` beats one rated `opponent`.
    pub fn expected_score(&self, rating: i32, opponent: i32) -> f64 {
        1.0 / (1.0 + 10.0_f64.powf((opponent - rating) as f64 / self.scale))
    }

    /// Compute both sides' new ratings after `winner` beats `loser`.
    ///
    /// In Swiss mode both sides always move. In run modes only the active participant (champion or
    /// falling entity) moves; defenders are benchmarks and keep their rating, except that a defender
    /// knocked off the #1 spot pays a flat single point.
    pub fn outcome(
        &self,
        mode: Mode,
        winner: i32,
        loser: i32,
        winner_role: Role,
        loser_role: Role,
        loser_rank: Option<usize>,
    ) -> Outcome {
        let winner = clamp(winner);
        let loser = clamp(loser);
        let expected = self.expected_score(winner, loser);
        let gain = ((self.k_factor * (1.0 - expected)).round() as i32).max(1);
        let loss = ((self.k_factor * expected).round() as i32).max(1);

        let (winner_delta, loser_delta) = match mode {
            Mode::Swiss => (gain, -loss),
            Mode::Gauntlet | Mode::Champion => {
                let winner_delta = match winner_role {
                    Role::Active => gain,
                    Role::Defender => 0,
                };
                let loser_delta = match (loser_role, loser_rank) {
                    (Role::Active, _) => -loss,
                    (Role::Defender, Some(1)) => -1,
                    (Role::Defender, _) => 0,
                };
                (winner_delta, loser_delta)
            }
        };

        Outcome {
            winner: RatingChange::apply(winner, winner_delta),
            loser: RatingChange::apply(loser, loser_delta),
        }
    }
}

pub fn clamp(rating: i32) -> i32 {
    rating.clamp(MIN_RATING, MAX_RATING)
}

/// Rating for a dethroned champion: one point below whoever beat it.
pub fn below(conqueror: i32) -> i32 {
    (conqueror - 1).max(MIN_RATING)
}

/// Rating for a falling entity that found its floor: one point above the entity it just beat.
pub fn above(opponent: i32) -> i32 {
    (opponent + 1).min(MAX_RATING)
}
