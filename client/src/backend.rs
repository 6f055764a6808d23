use hotornot_core::{Entity, EntityId, EntityRepository, Filter, Library};
use hotornot_stash::StashClient;

/// Wherever the library being ranked lives.
#[derive(Clone, Debug)]
pub enum Backend {
    Local(Library),
    Stash(StashClient),
}

impl EntityRepository for Backend {
    async fn count(&self, filter: &Filter) -> anyhow::Result<usize> {
        match self {
            Self::Local(library) => library.count(filter).await,
            Self::Stash(stash) => stash.count(filter).await,
        }
    }

    async fn list_sorted(&self, filter: &Filter, limit: Option<usize>) -> anyhow::Result<Vec<Entity>> {
        match self {
            Self::Local(library) => library.list_sorted(filter, limit).await,
            Self::Stash(stash) => stash.list_sorted(filter, limit).await,
        }
    }

    async fn list_random_sample(&self, filter: &Filter, limit: usize) -> anyhow::Result<Vec<Entity>> {
        match self {
            Self::Local(library) => library.list_random_sample(filter, limit).await,
            Self::Stash(stash) => stash.list_random_sample(filter, limit).await,
        }
    }

    async fn update_rating(&self, id: &EntityId, rating: i32) -> anyhow::Result<()> {
        match self {
            Self::Local(library) => library.update_rating(id, rating).await,
            Self::Stash(stash) => stash.update_rating(id, rating).await,
        }
    }
}
