use crate::decrypt::{DecryptError, Decryptor, NamedTopic};
use crate::{FilterContext, Resolver, TopicNameCache};
use kafka_protocol::{
    messages::{
        FetchRequest, FetchResponse, RequestHeader, RequestKind, ResponseHeader, ResponseKind,
        TopicName,
    },
    ResponseError,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// FetchInterceptor decrypts the records of Fetch responses, using the topic
/// names of clients which address topics by id only.
///
/// Names are looked up in the background when a Fetch request is seen, so that
/// they're usually known by the time its response arrives. A response may not be
/// held while a lookup finishes, because the connection must keep its responses
/// flowing and in order. If names are still unknown when the response arrives,
/// the client is sent an error instead and will retry its fetch.
#[derive(Clone)]
pub struct FetchInterceptor {
    cache: TopicNameCache,
    resolver: Resolver,
    decryptor: Arc<dyn Decryptor>,
    cache_wait_timeout: Duration,
}

impl FetchInterceptor {
    pub fn new(
        cache: TopicNameCache,
        resolver: Resolver,
        decryptor: Arc<dyn Decryptor>,
        cache_wait_timeout: Duration,
    ) -> Self {
        Self {
            cache,
            resolver,
            decryptor,
            cache_wait_timeout,
        }
    }

    /// Begin lookups of any topic ids in `request` which we can't name,
    /// and forward the request unchanged without waiting for them.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn on_request<C: FilterContext>(
        &self,
        header: RequestHeader,
        request: FetchRequest,
        ctx: &mut C,
    ) {
        let unresolved = self.unresolved(
            request
                .topics
                .iter()
                .map(|topic| (&topic.topic, &topic.topic_id)),
        );

        if !unresolved.is_empty() {
            // Prepare for the response, which we'll need to decrypt.
            self.resolver.resolve(ctx, &unresolved);
        }
        ctx.forward_request(header, RequestKind::Fetch(request));
    }

    /// Decrypt and forward `response` if all of its topics can be named,
    /// or otherwise forward an error response in its place.
    /// Returns a [`DecryptError`] if any topic fails to decrypt, in which case
    /// nothing is forwarded.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn on_response<C: FilterContext>(
        &self,
        header: ResponseHeader,
        mut response: FetchResponse,
        ctx: &mut C,
    ) -> anyhow::Result<()> {
        let unresolved = self.unresolved(
            response
                .responses
                .iter()
                .map(|topic| (&topic.topic, &topic.topic_id)),
        );
        if !unresolved.is_empty() {
            self.reject(header, unresolved, ctx);
            return Ok(());
        }

        // Every topic is named or resolved, so these waits should not block.
        let mut names: Vec<Option<TopicName>> = Vec::with_capacity(response.responses.len());
        let mut timed_out = BTreeSet::new();

        for topic in response.responses.iter() {
            if !topic.topic.as_str().is_empty() {
                names.push(None);
                continue;
            }
            match self
                .cache
                .await_ready(&topic.topic_id, self.cache_wait_timeout)
                .await
            {
                Some(name) => names.push(Some(name)),
                None => {
                    timed_out.insert(topic.topic_id);
                }
            }
        }
        if !timed_out.is_empty() {
            self.reject(header, timed_out, ctx);
            return Ok(());
        }

        for (topic, name) in response.responses.iter_mut().zip(names) {
            let mut topic = NamedTopic::new(topic, name);

            if let Err(source) = self.decryptor.decrypt(&mut topic) {
                return Err(DecryptError {
                    topic: topic.topic.as_str().to_string(),
                    source,
                }
                .into());
            }
        }

        metrics::counter!("fetch_responses_decrypted").increment(1);
        ctx.forward_response(header, ResponseKind::Fetch(response));
        Ok(())
    }

    // Collect the ids of topics which have no name, and whose name isn't cached.
    fn unresolved<'t>(
        &self,
        topics: impl Iterator<Item = (&'t TopicName, &'t Uuid)>,
    ) -> BTreeSet<Uuid> {
        topics
            .filter(|(name, id)| name.as_str().is_empty() && self.cache.peek_ready(id).is_none())
            .map(|(_, id)| *id)
            .collect()
    }

    // We should usually know all topic names by the time a response arrives,
    // because its request began a lookup of any unknown ones. Should that lookup
    // have failed, begin another for the client's retry of this fetch.
    fn reject<C: FilterContext>(
        &self,
        header: ResponseHeader,
        unresolved: BTreeSet<Uuid>,
        ctx: &mut C,
    ) {
        tracing::warn!(
            count = unresolved.len(),
            "fetch response has unknown topic ids; looking them up and returning an error response"
        );
        tracing::debug!(?unresolved, "unknown topic ids of fetch response");

        self.resolver.resolve(ctx, &unresolved);

        metrics::counter!("fetch_responses_rejected").increment(1);
        ctx.forward_response(
            header,
            ResponseKind::Fetch(
                FetchResponse::default().with_error_code(ResponseError::UnknownServerError.code()),
            ),
        );
    }
}
