use anyhow::Context;
use kafka_protocol::messages::{RequestHeader, RequestKind, ResponseHeader, ResponseKind};
use std::sync::Arc;

mod cache;
pub use cache::TopicNameCache;

mod config;
pub use config::FilterConfig;

mod context;
pub use context::FilterContext;

mod decrypt;
pub use decrypt::{DecryptError, Decryptor};

mod fetch;
pub use fetch::FetchInterceptor;

pub mod logging;

mod observer;
pub use observer::{cache_topic_names, MetadataObserver};

mod resolver;
pub use resolver::{lookup_request, Resolver, METADATA_VERSION_SUPPORTING_TOPIC_IDS};

/// Filter decrypts the Fetch responses of a Kafka proxy, resolving the
/// names of topics which clients address by id.
///
/// A Filter is cheap to clone. Clones share their cache of topic names and
/// their resolver task, and a proxy should hand a clone to each connection.
#[derive(Clone)]
pub struct Filter {
    cache: TopicNameCache,
    fetch: FetchInterceptor,
    metadata: MetadataObserver,
}

impl Filter {
    /// Build a Filter which decrypts fetched records using `decryptor`.
    /// Must be called within a Tokio runtime.
    pub fn new(config: &FilterConfig, decryptor: Arc<dyn Decryptor>) -> anyhow::Result<Self> {
        config
            .validate()
            .context("invalid fetch decryption filter configuration")?;

        let cache = TopicNameCache::new();
        let resolver = Resolver::new(
            cache.clone(),
            config.metadata_version,
            config.lookup_timeout,
        );

        Ok(Self {
            fetch: FetchInterceptor::new(
                cache.clone(),
                resolver,
                decryptor,
                config.cache_wait_timeout,
            ),
            metadata: MetadataObserver::new(cache.clone()),
            cache,
        })
    }

    pub fn cache(&self) -> &TopicNameCache {
        &self.cache
    }

    /// Handle a request on its way from the client to the broker.
    /// Must be called within a Tokio runtime, as it may begin a background lookup.
    #[tracing::instrument(level = "trace", skip_all, fields(client_id = ?header.client_id, api_key = header.request_api_key, v = header.request_api_version))]
    pub fn on_request<C: FilterContext>(
        &self,
        header: RequestHeader,
        request: RequestKind,
        ctx: &mut C,
    ) {
        match request {
            RequestKind::Fetch(request) => self.fetch.on_request(header, request, ctx),
            request => ctx.forward_request(header, request),
        }
    }

    /// Handle a response on its way from the broker to the client.
    /// `api_version` is the version of the request this responds to.
    /// An error is unrecoverable for the connection, and is logged here.
    /// Must be called within a Tokio runtime.
    #[tracing::instrument(level = "trace", err(level = "warn"), skip_all, fields(correlation_id = header.correlation_id, v = api_version))]
    pub async fn on_response<C: FilterContext>(
        &self,
        header: ResponseHeader,
        response: ResponseKind,
        api_version: i16,
        ctx: &mut C,
    ) -> anyhow::Result<()> {
        match response {
            ResponseKind::Fetch(response) => self.fetch.on_response(header, response, ctx).await,
            ResponseKind::Metadata(response) => {
                self.metadata
                    .on_response(header, response, api_version, ctx);
                Ok(())
            }
            response => {
                ctx.forward_response(header, response);
                Ok(())
            }
        }
    }
}
