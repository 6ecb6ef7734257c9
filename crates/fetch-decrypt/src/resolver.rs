use crate::{observer::cache_topic_names, FilterContext, TopicNameCache};
use kafka_protocol::messages::{
    metadata_request::MetadataRequestTopic, MetadataRequest, MetadataResponse,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::task::AbortOnDropHandle;
use uuid::Uuid;

/// Lowest Metadata API version which can look up topics by id.
/// A client which addresses topics by id implies a broker which supports it,
/// so lookups are pinned to this version rather than negotiated.
pub const METADATA_VERSION_SUPPORTING_TOPIC_IDS: i16 = 12;

// A finished round trip of a lookup for `ids`.
struct Lookup {
    ids: Vec<Uuid>,
    result: anyhow::Result<MetadataResponse>,
}

/// Resolver looks up the names of topic ids in the background by sending
/// Metadata requests to the upstream broker. Replies are handed to a
/// dedicated resolver task, which is the one to populate the cache.
///
/// Clones share a resolver task, which is aborted when the last clone drops.
#[derive(Clone)]
pub struct Resolver {
    inner: Arc<Inner>,
}

struct Inner {
    cache: TopicNameCache,
    api_version: i16,
    lookup_timeout: Duration,
    completed_tx: mpsc::UnboundedSender<Lookup>,
    _resolver_task: AbortOnDropHandle<()>,
}

impl Resolver {
    /// Start a Resolver which populates `cache`. Must be called within a Tokio runtime.
    pub fn new(cache: TopicNameCache, api_version: i16, lookup_timeout: Duration) -> Self {
        let (completed_tx, completed_rx) = mpsc::unbounded_channel();

        let resolver_task = AbortOnDropHandle::new(tokio::spawn(run_resolver(
            cache.clone(),
            completed_rx,
            api_version,
        )));

        Self {
            inner: Arc::new(Inner {
                cache,
                api_version,
                lookup_timeout,
                completed_tx,
                _resolver_task: resolver_task,
            }),
        }
    }

    /// Begin a background lookup of those `ids` which aren't already resolved
    /// or being looked up. Returns immediately with the number of ids for which
    /// a lookup was sent, which is zero if no request was needed.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn resolve<'i, C: FilterContext>(
        &self,
        ctx: &C,
        ids: impl IntoIterator<Item = &'i Uuid>,
    ) -> usize {
        let Inner {
            cache,
            api_version,
            lookup_timeout,
            completed_tx,
            ..
        } = &*self.inner;

        let ids = cache.begin_lookup(ids);
        if ids.is_empty() {
            return 0;
        }
        tracing::debug!(?ids, "sending metadata request to look up topic ids");

        let reply = ctx.send_request(*api_version, lookup_request(&ids));
        let (cache, lookup_timeout, completed_tx) =
            (cache.clone(), *lookup_timeout, completed_tx.clone());
        let count = ids.len();

        tokio::spawn(async move {
            let result = match tokio::time::timeout(lookup_timeout, reply).await {
                Ok(result) => result,
                Err(_elapsed) => Err(anyhow::anyhow!(
                    "metadata lookup timed out after {lookup_timeout:?}"
                )),
            };

            // If the resolver task is gone, nobody will release these ids but us.
            if let Err(mpsc::error::SendError(lookup)) = completed_tx.send(Lookup { ids, result })
            {
                cache.release_pending(&lookup.ids);
            }
        });

        metrics::counter!("topic_id_lookups_sent").increment(1);
        count
    }
}

/// Build a Metadata request which looks up each of `ids`.
pub fn lookup_request(ids: &[Uuid]) -> MetadataRequest {
    MetadataRequest::default()
        .with_topics(Some(
            ids.iter()
                .map(|id| {
                    MetadataRequestTopic::default()
                        .with_topic_id(*id)
                        .with_name(None)
                })
                .collect(),
        ))
        .with_allow_auto_topic_creation(false)
}

// Cache the names of each completed lookup. Ids the lookup didn't resolve are
// released rather than cached as missing, and the next fetch of such a topic
// will begin a new lookup.
async fn run_resolver(
    cache: TopicNameCache,
    mut completed_rx: mpsc::UnboundedReceiver<Lookup>,
    api_version: i16,
) {
    while let Some(Lookup { ids, result }) = completed_rx.recv().await {
        match result {
            Ok(response) => {
                let cached = cache_topic_names(&cache, &response, api_version);
                tracing::debug!(lookup = ids.len(), cached, "finished topic id lookup");
            }
            Err(err) => {
                tracing::warn!(?ids, error = ?err, "topic id lookup failed");
                metrics::counter!("topic_id_lookups_failed").increment(1);
            }
        }
        cache.release_pending(&ids);
    }
}
