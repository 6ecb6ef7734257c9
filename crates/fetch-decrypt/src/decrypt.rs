use kafka_protocol::messages::{fetch_response::FetchableTopicResponse, TopicName};
use uuid::Uuid;

/// Decryptor rewrites the fetched records of one topic in place.
///
/// It's called with the topic's resolved name present in `topic.topic`,
/// which keys the encryption policy to apply. Topics without a policy
/// should be left untouched.
pub trait Decryptor: Send + Sync {
    fn decrypt(&self, topic: &mut FetchableTopicResponse) -> anyhow::Result<()>;
}

impl<F> Decryptor for F
where
    F: Fn(&mut FetchableTopicResponse) -> anyhow::Result<()> + Send + Sync,
{
    fn decrypt(&self, topic: &mut FetchableTopicResponse) -> anyhow::Result<()> {
        self(topic)
    }
}

/// A fetch response could not be decrypted. This is fatal for the whole
/// response: none of it may be forwarded to the client.
#[derive(Debug, thiserror::Error)]
#[error("failed to decrypt fetched records of topic '{topic}'")]
pub struct DecryptError {
    pub topic: String,
    #[source]
    pub source: anyhow::Error,
}

/// NamedTopic presents a FetchableTopicResponse addressed by its resolved `name`,
/// with its topic id cleared. The original name and id are put back when the
/// NamedTopic is dropped, on every exit path.
pub(crate) struct NamedTopic<'t> {
    inner: &'t mut FetchableTopicResponse,
    original: Option<(TopicName, Uuid)>,
}

impl<'t> NamedTopic<'t> {
    pub fn new(topic: &'t mut FetchableTopicResponse, name: Option<TopicName>) -> Self {
        let original = name.map(|name| {
            let original_name = std::mem::replace(&mut topic.topic, name);
            let original_id = std::mem::replace(&mut topic.topic_id, Uuid::nil());
            (original_name, original_id)
        });
        Self {
            inner: topic,
            original,
        }
    }
}

impl std::ops::Deref for NamedTopic<'_> {
    type Target = FetchableTopicResponse;

    fn deref(&self) -> &Self::Target {
        self.inner
    }
}

impl std::ops::DerefMut for NamedTopic<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.inner
    }
}

impl Drop for NamedTopic<'_> {
    fn drop(&mut self) {
        if let Some((name, id)) = self.original.take() {
            self.inner.topic = name;
            self.inner.topic_id = id;
        }
    }
}
