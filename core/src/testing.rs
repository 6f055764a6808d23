use crate::{
    entity::{Entity, EntityId},
    filter::Filter,
    matchmaker::{rank, ComparisonPair, RunStatus, TerminalEvent},
    repository::{EntityRepository, Participation, StatsCollector},
    session::Frontend,
};
use anyhow::{ensure, Context};
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
};
use tokio::task::yield_now;

/// A library held in memory. Every call yields to the executor once, so that concurrent session
/// operations interleave the way they would against a real backend.
#[derive(Debug, Default)]
pub struct MemoryLibrary {
    entities: Mutex<BTreeMap<EntityId, Entity>>,
    writes: Mutex<Vec<(EntityId, i32)>>,
    participation: Mutex<Vec<(EntityId, Participation)>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryLibrary {
    pub fn new(ratings: &[(&str, i32)]) -> Self {
        let library = Self::default();
        {
            let mut entities = library.entities.lock().unwrap();
            for (id, rating) in ratings {
                let entity = Entity::new(*id, id.to_uppercase(), Some(*rating));
                entities.insert(entity.id.clone(), entity);
            }
        }
        library
    }

    pub fn rating(&self, id: &str) -> i32 {
        self.entities.lock().unwrap()[&EntityId::from(id)].rating()
    }

    pub fn writes(&self) -> Vec<(EntityId, i32)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn participation(&self) -> Vec<(EntityId, Participation)> {
        self.participation.lock().unwrap().clone()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn matching(&self, filter: &Filter) -> anyhow::Result<Vec<Entity>> {
        ensure!(!self.fail_reads.load(Ordering::SeqCst), "library unavailable");
        let today = Utc::now().date_naive();
        Ok(self
            .entities
            .lock()
            .unwrap()
            .values()
            .filter(|entity| filter.matches(entity, today))
            .cloned()
            .collect())
    }
}

impl EntityRepository for MemoryLibrary {
    async fn count(&self, filter: &Filter) -> anyhow::Result<usize> {
        yield_now().await;
        Ok(self.matching(filter)?.len())
    }

    async fn list_sorted(&self, filter: &Filter, limit: Option<usize>) -> anyhow::Result<Vec<Entity>> {
        yield_now().await;
        let mut entities = rank(self.matching(filter)?);
        if let Some(limit) = limit {
            entities.truncate(limit);
        }
        Ok(entities)
    }

    async fn list_random_sample(&self, filter: &Filter, limit: usize) -> anyhow::Result<Vec<Entity>> {
        yield_now().await;
        let mut entities = self.matching(filter)?;
        entities.shuffle(&mut rand::rng());
        entities.truncate(limit);
        Ok(entities)
    }

    async fn update_rating(&self, id: &EntityId, rating: i32) -> anyhow::Result<()> {
        yield_now().await;
        ensure!(!self.fail_writes.load(Ordering::SeqCst), "library is read-only");
        self.entities
            .lock()
            .unwrap()
            .get_mut(id)
            .context(format!("unknown entity {id}"))?
            .rating100 = Some(rating);
        self.writes.lock().unwrap().push((id.clone(), rating));
        Ok(())
    }
}

impl StatsCollector for MemoryLibrary {
    async fn record_participation(
        &self,
        id: &EntityId,
        outcome: Participation,
        _timestamp: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        yield_now().await;
        ensure!(!self.fail_writes.load(Ordering::SeqCst), "library is read-only");
        self.participation.lock().unwrap().push((id.clone(), outcome));
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Pair(ComparisonPair, Option<RunStatus>),
    Terminal(TerminalEvent),
    PoolTooSmall(String),
    RepositoryError(String),
}

/// A front-end that remembers everything it was asked to show.
#[derive(Debug, Default)]
pub struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn pairs(&self) -> Vec<(ComparisonPair, Option<RunStatus>)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Pair(pair, status) => Some((pair, status)),
                _ => None,
            })
            .collect()
    }

    pub fn last(&self) -> Option<Event> {
        self.events.lock().unwrap().last().cloned()
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

impl Frontend for Recorder {
    fn on_pair_ready(&self, pair: &ComparisonPair, status: Option<&RunStatus>) {
        self.push(Event::Pair(pair.clone(), status.cloned()));
    }

    fn on_terminal_event(&self, event: &TerminalEvent) {
        self.push(Event::Terminal(event.clone()));
    }

    fn on_pool_too_small_error(&self, message: &str) {
        self.push(Event::PoolTooSmall(message.into()));
    }

    fn on_repository_error(&self, message: &str) {
        self.push(Event::RepositoryError(message.into()));
    }
}
