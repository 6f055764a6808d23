use crate::{
    entity::{Entity, EntityId, EntityKind},
    filter::Filter,
    matchmaker::rank,
    repository::{EntityRepository, Participation, StatsCollector},
    stats::EntityStats,
};
use anyhow::{ensure, Context};
use chrono::{DateTime, NaiveDate, Utc};
use rand::seq::SliceRandom;
use sqlx::{
    migrate, query, query_as,
    sqlite::{Sqlite, SqliteConnectOptions, SqliteConnection},
    ConnectOptions, Connection, Transaction,
};
use std::{path::Path, sync::Arc};
use tokio::sync::Mutex;
use tracing::instrument;

type EntityRow = (
    String,
    String,
    Option<i32>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
);

type StatsRow = (i32, i32, i32, i32, i32, i32, Option<i64>);

/// A local library of entities, plus per-entity match statistics.
///
/// Cloning is cheap; all clones share one connection.
#[derive(Clone, Debug)]
pub struct Db {
    conn: Arc<Mutex<SqliteConnection>>,
}

impl Db {
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        Self::new(
            SqliteConnectOptions::default()
                .filename(path)
                .create_if_missing(true),
        )
        .await
    }

    pub async fn memory() -> anyhow::Result<Self> {
        Self::new(Default::default()).await
    }

    async fn new(opt: SqliteConnectOptions) -> anyhow::Result<Self> {
        let mut conn = opt.connect().await?;
        migrate!("db/migrations").run(&mut conn).await?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// The entities of one kind, as a repository a session can rank.
    pub fn library(&self, kind: EntityKind) -> Library {
        Library {
            db: self.clone(),
            kind,
        }
    }

    /// Insert or replace entities of `kind`. Returns the number written.
    #[instrument(skip(self, entities))]
    pub async fn import(&self, kind: EntityKind, entities: &[Entity]) -> anyhow::Result<usize> {
        let mut conn = self.conn.lock().await;
        let mut tx = conn.begin().await?;
        for entity in entities {
            query(
                "INSERT OR REPLACE INTO entity
                    (kind, id, name, rating100, gender, ethnicity, country, birthdate, image_path)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(kind.to_string())
            .bind(entity.id.as_str())
            .bind(&entity.name)
            .bind(entity.rating100)
            .bind(entity.gender.map(|gender| gender.to_string()))
            .bind(&entity.ethnicity)
            .bind(&entity.country)
            .bind(entity.birthdate.map(|date| date.to_string()))
            .bind(&entity.image_path)
            .execute(tx.as_mut())
            .await?;
        }
        tx.commit().await?;

        tracing::info!(count = entities.len(), "imported entities");
        Ok(entities.len())
    }

    pub async fn entities(&self, kind: EntityKind) -> anyhow::Result<Vec<Entity>> {
        let mut conn = self.conn.lock().await;
        let rows: Vec<EntityRow> = query_as(
            "SELECT id, name, rating100, gender, ethnicity, country, birthdate, image_path
            FROM entity WHERE kind = $1",
        )
        .bind(kind.to_string())
        .fetch_all(&mut *conn)
        .await?;
        rows.into_iter().map(entity_from_row).collect()
    }

    pub async fn stats(&self, kind: EntityKind, id: &EntityId) -> anyhow::Result<Option<EntityStats>> {
        let mut conn = self.conn.lock().await;
        let mut tx = conn.begin().await?;
        let stats = get_stats(&mut tx, kind, id).await?;
        tx.commit().await?;
        Ok(stats)
    }

    #[instrument(skip(self))]
    async fn record(
        &self,
        kind: EntityKind,
        id: &EntityId,
        outcome: Participation,
        timestamp: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut conn = self.conn.lock().await;
        let mut tx = conn.begin().await?;

        let mut stats = get_stats(&mut tx, kind, id).await?.unwrap_or_default();
        stats.record(outcome, timestamp);
        set_stats(&mut tx, kind, id, &stats).await?;

        tx.commit().await?;
        tracing::debug!(matches = stats.matches, streak = stats.streak, "recorded participation");
        Ok(())
    }
}

/// The entities of one kind in a [`Db`].
#[derive(Clone, Debug)]
pub struct Library {
    db: Db,
    kind: EntityKind,
}

impl Library {
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub async fn stats(&self, id: &EntityId) -> anyhow::Result<Option<EntityStats>> {
        self.db.stats(self.kind, id).await
    }

    async fn matching(&self, filter: &Filter) -> anyhow::Result<Vec<Entity>> {
        let today = Utc::now().date_naive();
        let mut entities = self.db.entities(self.kind).await?;
        entities.retain(|entity| match self.kind {
            EntityKind::Performer => filter.matches(entity, today),
            EntityKind::Scene | EntityKind::Image => filter.matches_media(entity),
        });
        Ok(entities)
    }
}

impl EntityRepository for Library {
    async fn count(&self, filter: &Filter) -> anyhow::Result<usize> {
        Ok(self.matching(filter).await?.len())
    }

    async fn list_sorted(&self, filter: &Filter, limit: Option<usize>) -> anyhow::Result<Vec<Entity>> {
        let mut entities = rank(self.matching(filter).await?);
        if let Some(limit) = limit {
            entities.truncate(limit);
        }
        Ok(entities)
    }

    async fn list_random_sample(&self, filter: &Filter, limit: usize) -> anyhow::Result<Vec<Entity>> {
        let mut entities = self.matching(filter).await?;
        entities.shuffle(&mut rand::rng());
        entities.truncate(limit);
        Ok(entities)
    }

    async fn update_rating(&self, id: &EntityId, rating: i32) -> anyhow::Result<()> {
        let mut conn = self.db.conn.lock().await;
        let res = query("UPDATE entity SET rating100 = $1 WHERE kind = $2 AND id = $3")
            .bind(rating)
            .bind(self.kind.to_string())
            .bind(id.as_str())
            .execute(&mut *conn)
            .await?;
        ensure!(res.rows_affected() > 0, "unknown {} {id}", self.kind);
        tracing::debug!(%id, rating, "rating saved");
        Ok(())
    }
}

impl StatsCollector for Library {
    async fn record_participation(
        &self,
        id: &EntityId,
        outcome: Participation,
        timestamp: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        self.db.record(self.kind, id, outcome, timestamp).await
    }
}

fn entity_from_row(row: EntityRow) -> anyhow::Result<Entity> {
    let (id, name, rating100, gender, ethnicity, country, birthdate, image_path) = row;
    Ok(Entity {
        gender: gender
            .map(|gender| gender.parse())
            .transpose()
            .context(format!("entity {id}"))?,
        birthdate: birthdate
            .map(|date| date.parse::<NaiveDate>())
            .transpose()
            .context(format!("entity {id}"))?,
        id: id.into(),
        name,
        rating100,
        ethnicity,
        country,
        image_path,
    })
}

async fn get_stats<'c>(
    tx: &mut Transaction<'c, Sqlite>,
    kind: EntityKind,
    id: &EntityId,
) -> anyhow::Result<Option<EntityStats>> {
    let row: Option<StatsRow> = query_as(
        "SELECT matches, wins, losses, streak, best_streak, worst_streak, last_match
        FROM stats WHERE kind = $1 AND id = $2 LIMIT 1",
    )
    .bind(kind.to_string())
    .bind(id.as_str())
    .fetch_optional(tx.as_mut())
    .await?;
    let Some((matches, wins, losses, streak, best_streak, worst_streak, last_match)) = row else {
        return Ok(None);
    };
    Ok(Some(EntityStats {
        matches: matches as u32,
        wins: wins as u32,
        losses: losses as u32,
        streak,
        best_streak,
        worst_streak,
        last_match: last_match.and_then(DateTime::from_timestamp_millis),
    }))
}

async fn set_stats<'c>(
    tx: &mut Transaction<'c, Sqlite>,
    kind: EntityKind,
    id: &EntityId,
    stats: &EntityStats,
) -> anyhow::Result<()> {
    query(
        "INSERT OR REPLACE INTO stats
            (kind, id, matches, wins, losses, streak, best_streak, worst_streak, last_match)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(kind.to_string())
    .bind(id.as_str())
    .bind(stats.matches as i32)
    .bind(stats.wins as i32)
    .bind(stats.losses as i32)
    .bind(stats.streak)
    .bind(stats.best_streak)
    .bind(stats.worst_streak)
    .bind(stats.last_match.map(|ts| ts.timestamp_millis()))
    .execute(tx.as_mut())
    .await?;
    Ok(())
}
