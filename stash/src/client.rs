use crate::query::{self, Collection, Page};
use anyhow::{ensure, Context};
use hotornot_core::{Entity, EntityId, EntityKind, EntityRepository, Filter};
use hyper::{client::connect::HttpConnector, header::CONTENT_TYPE, Body, Client, Method, Request};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tokio::time::timeout;
use tracing::instrument;
use url::Url;

/// How long a single GraphQL exchange may take before it is abandoned.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// An [`EntityRepository`] backed by one collection of a Stash server.
#[derive(Clone, Debug)]
pub struct StashClient {
    client: Client<HttpConnector>,
    endpoint: Url,
    api_key: Option<String>,
    kind: EntityKind,
    timeout: Duration,
}

impl StashClient {
    /// Talk to the Stash server at `url` (its root, not the GraphQL endpoint).
    pub fn new(url: &Url, kind: EntityKind) -> anyhow::Result<Self> {
        let endpoint = url
            .join("graphql")
            .context(format!("invalid Stash URL {url}"))?;
        ensure!(
            endpoint.scheme() == "http",
            "{endpoint}: only plain HTTP Stash servers are supported"
        );
        Ok(Self {
            client: Client::new(),
            endpoint,
            api_key: None,
            kind,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    fn collection(&self) -> Collection {
        Collection::of(self.kind)
    }

    async fn graphql(&self, document: &str, variables: Value) -> anyhow::Result<Map<String, Value>> {
        let body = serde_json::to_vec(&json!({ "query": document, "variables": variables }))?;
        let mut request = Request::builder()
            .method(Method::POST)
            .uri(self.endpoint.as_str())
            .header(CONTENT_TYPE, "application/json");
        if let Some(api_key) = &self.api_key {
            request = request.header("ApiKey", api_key);
        }
        let request = request.body(Body::from(body))?;

        let exchange = async {
            let response = self.client.request(request).await?;
            ensure!(
                response.status().is_success(),
                "{}: graphql error: {}",
                self.endpoint,
                response.status()
            );
            Ok::<_, anyhow::Error>(hyper::body::to_bytes(response).await?)
        };
        let body = timeout(self.timeout, exchange)
            .await
            .context(format!("{}: timed out after {:?}", self.endpoint, self.timeout))??;
        query::response_data(&body)
    }

    async fn find(&self, filter: &Filter, page: Page) -> anyhow::Result<(usize, Vec<Entity>)> {
        let collection = self.collection();
        let variables = json!({
            "filter": page.variables(),
            "entity_filter": query::entity_filter(self.kind, filter),
        });
        let data = self
            .graphql(&collection.find_query(page != Page::Count), variables)
            .await?;
        query::find_result(collection, data)
    }
}

impl EntityRepository for StashClient {
    #[instrument(skip(self))]
    async fn count(&self, filter: &Filter) -> anyhow::Result<usize> {
        let (count, _) = self.find(filter, Page::Count).await?;
        tracing::debug!(count, "counted");
        Ok(count)
    }

    #[instrument(skip(self))]
    async fn list_sorted(&self, filter: &Filter, limit: Option<usize>) -> anyhow::Result<Vec<Entity>> {
        let (count, items) = self.find(filter, Page::Sorted(limit)).await?;
        tracing::debug!(count, fetched = items.len(), "listed");
        Ok(query::sorted(items))
    }

    #[instrument(skip(self))]
    async fn list_random_sample(&self, filter: &Filter, limit: usize) -> anyhow::Result<Vec<Entity>> {
        let (_, items) = self.find(filter, Page::Random(limit)).await?;
        Ok(items)
    }

    #[instrument(skip(self))]
    async fn update_rating(&self, id: &EntityId, rating: i32) -> anyhow::Result<()> {
        let collection = self.collection();
        let variables = json!({ "input": { "id": id, "rating100": rating } });
        let data = self.graphql(&collection.update_mutation(), variables).await?;
        let updated = query::updated_id(collection, &data)?;
        ensure!(&updated == id, "updated {updated} instead of {id}");
        Ok(())
    }
}
