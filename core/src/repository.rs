use crate::{
    entity::{Entity, EntityId},
    filter::Filter,
};
use chrono::{DateTime, Utc};
use futures::future::{self, Future};
use serde::{Deserialize, Serialize};

/// Access to the library being ranked.
pub trait EntityRepository {
    /// The number of entities matching `filter`.
    fn count(&self, filter: &Filter) -> impl Future<Output = anyhow::Result<usize>> + Send;

    /// Entities matching `filter`, highest rated first, at most `limit` of them.
    fn list_sorted(
        &self,
        filter: &Filter,
        limit: Option<usize>,
    ) -> impl Future<Output = anyhow::Result<Vec<Entity>>> + Send;

    /// Up to `limit` entities matching `filter`, in no particular order.
    fn list_random_sample(
        &self,
        filter: &Filter,
        limit: usize,
    ) -> impl Future<Output = anyhow::Result<Vec<Entity>>> + Send;

    /// Overwrite the rating of a single entity. `rating` is always within 1-100.
    fn update_rating(
        &self,
        id: &EntityId,
        rating: i32,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// How an entity took part in a match, from the point of view of its statistics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Participation {
    Win,
    Loss,
    /// The entity was a benchmark. It counts as a match played but not as a win or a loss.
    ParticipationOnly,
}

/// Receives a record of every entity that takes part in a match.
pub trait StatsCollector {
    fn record_participation(
        &self,
        id: &EntityId,
        outcome: Participation,
        timestamp: DateTime<Utc>,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// A stats collector that keeps nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoStats;

impl StatsCollector for NoStats {
    fn record_participation(
        &self,
        _id: &EntityId,
        _outcome: Participation,
        _timestamp: DateTime<Utc>,
    ) -> impl Future<Output = anyhow::Result<()>> + Send {
        future::ready(Ok(()))
    }
}

impl<T: EntityRepository + ?Sized> EntityRepository for &T {
    fn count(&self, filter: &Filter) -> impl Future<Output = anyhow::Result<usize>> + Send {
        (**self).count(filter)
    }

    fn list_sorted(
        &self,
        filter: &Filter,
        limit: Option<usize>,
    ) -> impl Future<Output = anyhow::Result<Vec<Entity>>> + Send {
        (**self).list_sorted(filter, limit)
    }

    fn list_random_sample(
        &self,
        filter: &Filter,
        limit: usize,
    ) -> impl Future<Output = anyhow::Result<Vec<Entity>>> + Send {
        (**self).list_random_sample(filter, limit)
    }

    fn update_rating(
        &self,
        id: &EntityId,
        rating: i32,
    ) -> impl Future<Output = anyhow::Result<()>> + Send {
        (**self).update_rating(id, rating)
    }
}

impl<T: StatsCollector + ?Sized> StatsCollector for &T {
    fn record_participation(
        &self,
        id: &EntityId,
        outcome: Participation,
        timestamp: DateTime<Utc>,
    ) -> impl Future<Output = anyhow::Result<()>> + Send {
        (**self).record_participation(id, outcome, timestamp)
    }
}
