use crate::{FilterContext, TopicNameCache};
use kafka_protocol::{
    messages::{MetadataResponse, ResponseHeader, ResponseKind},
    ResponseError,
};

/// MetadataObserver watches every Metadata response passing through the
/// proxy, whether requested by a client or by our own background lookups,
/// and caches the topic names it learns.
#[derive(Clone)]
pub struct MetadataObserver {
    cache: TopicNameCache,
}

impl MetadataObserver {
    pub fn new(cache: TopicNameCache) -> Self {
        Self { cache }
    }

    /// Cache the topic names of `response` and forward it unchanged.
    #[tracing::instrument(level = "debug", skip_all, fields(v = api_version))]
    pub fn on_response<C: FilterContext>(
        &self,
        header: ResponseHeader,
        response: MetadataResponse,
        api_version: i16,
        ctx: &mut C,
    ) {
        cache_topic_names(&self.cache, &response, api_version);
        ctx.forward_response(header, ResponseKind::Metadata(response));
    }
}

/// Cache each successfully described topic of a Metadata response which
/// carries both its id and name, returning the number of names cached.
/// Topics with errors are not cached: a transient broker error must not be
/// remembered as though the topic doesn't exist.
pub fn cache_topic_names(
    cache: &TopicNameCache,
    response: &MetadataResponse,
    api_version: i16,
) -> usize {
    tracing::trace!(api_version, ?response, "received metadata response");

    let mut cached = 0;

    for topic in response.topics.iter() {
        let name = topic.name.as_ref().filter(|n| !n.as_str().is_empty());

        match (topic.error_code, name) {
            (0, Some(name)) if !topic.topic_id.is_nil() => {
                cache.put(topic.topic_id, name.clone());
                cached += 1;
            }
            (0, name) => {
                tracing::info!(
                    topic_id = %topic.topic_id,
                    topic_name = ?name.map(|n| n.as_str()),
                    "not caching topic name because its id or name is missing",
                );
            }
            (code, name) => {
                tracing::warn!(
                    error = ?ResponseError::try_from_code(code),
                    code,
                    topic_id = %topic.topic_id,
                    topic_name = ?name.map(|n| n.as_str()),
                    "metadata response has an error for topic",
                );
            }
        }
    }

    metrics::counter!("topic_names_cached").increment(cached as u64);
    cached
}
