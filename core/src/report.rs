use crate::{
    entity::{Entity, EntityId},
    matchmaker::{Mode, Role},
    rating::{Elo, Outcome, RatingChange},
    repository::{EntityRepository, Participation, StatsCollector},
};
use chrono::Utc;
use tracing::instrument;

/// A decided match, as the session hands it to the [`Reporter`].
#[derive(Clone, Debug)]
pub struct MatchResult<'a> {
    pub mode: Mode,
    pub winner: &'a Entity,
    pub loser: &'a Entity,
    pub winner_role: Role,
    pub loser_role: Role,
    pub loser_rank: Option<usize>,
}

/// Turns match results into rating writes and participation records.
///
/// Writes are best-effort: a failure is logged and the session carries on, so a flaky backend
/// never stops the user from moving to the next pair.
#[derive(Debug)]
pub struct Reporter<'a, R, S> {
    repo: &'a R,
    stats: &'a S,
    elo: Elo,
}

impl<'a, R: EntityRepository, S: StatsCollector> Reporter<'a, R, S> {
    pub fn new(repo: &'a R, stats: &'a S, elo: Elo) -> Self {
        Self { repo, stats, elo }
    }

    #[instrument(skip_all, fields(winner = %result.winner.id, loser = %result.loser.id))]
    pub async fn report(&self, result: &MatchResult<'_>) -> Outcome {
        let outcome = self.elo.outcome(
            result.mode,
            result.winner.rating(),
            result.loser.rating(),
            result.winner_role,
            result.loser_role,
            result.loser_rank,
        );
        tracing::debug!(?outcome, "match decided");

        self.persist(result.winner, outcome.winner).await;
        self.persist(result.loser, outcome.loser).await;

        let now = Utc::now();
        for (entity, role, decided) in [
            (result.winner, result.winner_role, Participation::Win),
            (result.loser, result.loser_role, Participation::Loss),
        ] {
            let participation = match role {
                Role::Active => decided,
                Role::Defender => Participation::ParticipationOnly,
            };
            if let Err(err) = self
                .stats
                .record_participation(&entity.id, participation, now)
                .await
            {
                tracing::warn!(id = %entity.id, ?participation, "error recording stats: {err:#}");
            }
        }

        outcome
    }

    /// Write a rating that is not the result of an Elo update (a placement), best-effort.
    pub async fn place(&self, id: &EntityId, rating: i32) {
        if let Err(err) = self.repo.update_rating(id, rating).await {
            tracing::warn!(%id, rating, "error saving placement: {err:#}");
        }
    }

    async fn persist(&self, entity: &Entity, change: RatingChange) {
        if !change.changed() {
            return;
        }
        if let Err(err) = self.repo.update_rating(&entity.id, change.new).await {
            tracing::warn!(id = %entity.id, rating = change.new, "error saving rating: {err:#}");
        }
    }
}
