use crate::Catalog;
use crate::data::{CategoryTag, DetailRecord, EntityDetail, EntitySummary, NamedResourceList};
use serde::de::DeserializeOwned;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

pub const DEFAULT_API_BASE: &str = "https://pokeapi.co/api/v2";
pub const DEFAULT_LISTING_LIMIT: usize = 100;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub listing_limit: usize,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
            listing_limit: DEFAULT_LISTING_LIMIT,
            timeout: Duration::from_secs(30),
            user_agent: format!("pokedex-rs/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Failure of a single upstream request.
#[derive(Debug)]
pub enum SourceError {
    Http(reqwest::Error),
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Http(err) => write!(f, "http error: {err}"),
            SourceError::Status { url, status } => write!(f, "{url} returned {status}"),
        }
    }
}

impl std::error::Error for SourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SourceError::Http(err) => Some(err),
            SourceError::Status { .. } => None,
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(value: reqwest::Error) -> Self {
        SourceError::Http(value)
    }
}

/// Why the entity listing could not be produced.
#[derive(Debug)]
pub enum ListingFailure {
    Collection(SourceError),
    Detail { name: String, source: SourceError },
    Aborted(JoinError),
}

#[derive(Debug)]
pub enum FetchError {
    /// The collection listing or the detail batch failed.
    Listing(ListingFailure),
    /// The tag vocabulary could not be fetched.
    Tags(SourceError),
}

impl FetchError {
    /// Message shown to the user in place of (or next to) the catalog.
    pub fn user_message(&self) -> &'static str {
        match self {
            FetchError::Listing(_) => "Failed to fetch Pokémon data",
            FetchError::Tags(_) => "Failed to fetch Pokémon types",
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Listing(ListingFailure::Collection(err)) => {
                write!(f, "listing request failed: {err}")
            }
            FetchError::Listing(ListingFailure::Detail { name, source }) => {
                write!(f, "detail request for {name:?} failed: {source}")
            }
            FetchError::Listing(ListingFailure::Aborted(err)) => {
                write!(f, "detail task aborted: {err}")
            }
            FetchError::Tags(err) => write!(f, "tag request failed: {err}"),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Listing(ListingFailure::Collection(err))
            | FetchError::Listing(ListingFailure::Detail { source: err, .. })
            | FetchError::Tags(err) => Some(err),
            FetchError::Listing(ListingFailure::Aborted(err)) => Some(err),
        }
    }
}

/// Upstream endpoints the catalog is assembled from.
pub trait CatalogSource: Send + Sync + 'static {
    fn listing(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<EntitySummary>, SourceError>> + Send;

    fn detail(
        &self,
        summary: &EntitySummary,
    ) -> impl Future<Output = Result<EntityDetail, SourceError>> + Send;

    fn tags(&self) -> impl Future<Output = Result<Vec<CategoryTag>, SourceError>> + Send;
}

/// PokeAPI over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSource {
    http: reqwest::Client,
    base_url: String,
}

impl HttpSource {
    pub fn new(config: &ClientConfig) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, SourceError> {
        debug!(url, "GET");
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                url: url.to_string(),
                status,
            });
        }
        Ok(response.json::<T>().await?)
    }
}

impl CatalogSource for HttpSource {
    async fn listing(&self, limit: usize) -> Result<Vec<EntitySummary>, SourceError> {
        let url = format!("{}/pokemon?limit={limit}", self.base_url);
        let list: NamedResourceList = self.get_json(&url).await?;
        Ok(list.results)
    }

    async fn detail(&self, summary: &EntitySummary) -> Result<EntityDetail, SourceError> {
        let record: DetailRecord = self.get_json(&summary.url).await?;
        Ok(record.into())
    }

    async fn tags(&self) -> Result<Vec<CategoryTag>, SourceError> {
        let url = format!("{}/type", self.base_url);
        let list: NamedResourceList = self.get_json(&url).await?;
        Ok(list.names())
    }
}

#[derive(Debug)]
pub enum BatchError<E> {
    Task { index: usize, error: E },
    Join(JoinError),
}

/// Runs every task concurrently and returns their outputs in input order.
///
/// The first failure aborts the tasks still in flight and is returned alone;
/// there is no partial result.
pub async fn join_all_or_fail<T, E, F, I>(tasks: I) -> Result<Vec<T>, BatchError<E>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let mut set = JoinSet::new();
    let mut count = 0usize;
    for (index, task) in tasks.into_iter().enumerate() {
        set.spawn(async move { (index, task.await) });
        count += 1;
    }

    let mut slots: Vec<Option<T>> = std::iter::repeat_with(|| None).take(count).collect();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, Ok(value))) => slots[index] = Some(value),
            Ok((index, Err(error))) => {
                set.abort_all();
                return Err(BatchError::Task { index, error });
            }
            Err(err) => {
                set.abort_all();
                return Err(BatchError::Join(err));
            }
        }
    }
    Ok(slots.into_iter().flatten().collect())
}

/// Loads entities and tags from a [`CatalogSource`].
pub struct CatalogClient<S = HttpSource> {
    source: Arc<S>,
    listing_limit: usize,
}

impl CatalogClient<HttpSource> {
    pub fn from_config(config: &ClientConfig) -> Result<Self, SourceError> {
        Ok(Self::new(HttpSource::new(config)?, config.listing_limit))
    }
}

impl<S: CatalogSource> CatalogClient<S> {
    pub fn new(source: S, listing_limit: usize) -> Self {
        Self {
            source: Arc::new(source),
            listing_limit,
        }
    }

    /// Listing first, then every detail request in flight at once.
    pub async fn load_entities(&self) -> Result<Vec<EntityDetail>, FetchError> {
        let started = Instant::now();
        let summaries = self
            .source
            .listing(self.listing_limit)
            .await
            .map_err(|err| FetchError::Listing(ListingFailure::Collection(err)))?;
        debug!(count = summaries.len(), "listing received; fetching details");

        let tasks = summaries.iter().cloned().map(|summary| {
            let source = Arc::clone(&self.source);
            async move { source.detail(&summary).await }
        });
        let entities = join_all_or_fail(tasks).await.map_err(|err| match err {
            BatchError::Task { index, error } => FetchError::Listing(ListingFailure::Detail {
                name: summaries[index].name.clone(),
                source: error,
            }),
            BatchError::Join(err) => FetchError::Listing(ListingFailure::Aborted(err)),
        })?;
        info!(
            count = entities.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "entities loaded"
        );
        Ok(entities)
    }

    pub async fn load_tags(&self) -> Result<Vec<CategoryTag>, FetchError> {
        let tags = self.source.tags().await.map_err(FetchError::Tags)?;
        info!(count = tags.len(), "tag vocabulary loaded");
        Ok(tags)
    }

    /// Runs both loads concurrently. Only an entity failure is fatal.
    pub async fn load_catalog(&self) -> Result<Catalog, FetchError> {
        let (entities, tags) = tokio::join!(self.load_entities(), self.load_tags());
        let entities = entities.inspect_err(|err| warn!(error = %err, "entity load failed"))?;
        let tags = tags.inspect_err(|err| warn!(error = %err, "tag load failed; filter disabled"));
        Ok(Catalog::new(entities, tags))
    }
}
