//! Test doubles for driving a Filter the way a proxy pipeline would.

#![allow(dead_code)]

use bytes::Bytes;
use fetch_decrypt::{Decryptor, Filter, FilterConfig, FilterContext};
use futures::future::BoxFuture;
use kafka_protocol::{
    messages::{
        fetch_request::FetchTopic,
        fetch_response::{FetchableTopicResponse, PartitionData},
        metadata_response::MetadataResponseTopic,
        FetchRequest, FetchResponse, MetadataRequest, MetadataResponse, RequestHeader,
        RequestKind, ResponseHeader, ResponseKind, TopicName,
    },
    protocol::StrBytes,
    ResponseError,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

pub fn topic_name(s: &str) -> TopicName {
    TopicName(StrBytes::from_string(s.to_string()))
}

/// How the fake upstream broker answers topic id lookups.
#[derive(Clone)]
pub enum Upstream {
    /// Answer with the names of known ids, and UNKNOWN_TOPIC_ID for others.
    Names(HashMap<Uuid, &'static str>),
    /// Fail the round trip.
    Fail,
    /// Never answer.
    Hang,
}

/// RecordingContext captures everything the filter forwards or sends.
pub struct RecordingContext {
    pub requests: Vec<(RequestHeader, RequestKind)>,
    pub responses: Vec<(ResponseHeader, ResponseKind)>,
    pub lookups: Mutex<Vec<(i16, MetadataRequest)>>,
    pub upstream: Upstream,
}

impl RecordingContext {
    pub fn new(upstream: Upstream) -> Self {
        Self {
            requests: Vec::new(),
            responses: Vec::new(),
            lookups: Mutex::new(Vec::new()),
            upstream,
        }
    }

    /// The topic ids of each lookup sent so far.
    pub fn lookup_ids(&self) -> Vec<Vec<Uuid>> {
        self.lookups
            .lock()
            .unwrap()
            .iter()
            .map(|(_, request)| {
                request
                    .topics
                    .iter()
                    .flatten()
                    .map(|topic| topic.topic_id)
                    .collect()
            })
            .collect()
    }

    pub fn fetch_response(&self, index: usize) -> &FetchResponse {
        match &self.responses[index].1 {
            ResponseKind::Fetch(response) => response,
            other => panic!("expected a fetch response, got {other:?}"),
        }
    }
}

impl FilterContext for RecordingContext {
    fn forward_request(&mut self, header: RequestHeader, request: RequestKind) {
        self.requests.push((header, request));
    }

    fn forward_response(&mut self, header: ResponseHeader, response: ResponseKind) {
        self.responses.push((header, response));
    }

    fn send_request(
        &self,
        api_version: i16,
        request: MetadataRequest,
    ) -> BoxFuture<'static, anyhow::Result<MetadataResponse>> {
        let requested: Vec<Uuid> = request
            .topics
            .iter()
            .flatten()
            .map(|topic| topic.topic_id)
            .collect();
        self.lookups.lock().unwrap().push((api_version, request));

        match self.upstream.clone() {
            Upstream::Names(names) => Box::pin(async move {
                anyhow::Ok(metadata_response(
                    requested
                        .into_iter()
                        .map(|id| match names.get(&id) {
                            Some(name) => (id, *name, 0),
                            None => (id, "", ResponseError::UnknownTopicId.code()),
                        })
                        .collect(),
                ))
            }),
            Upstream::Fail => Box::pin(futures::future::ready(Err::<MetadataResponse, _>(
                anyhow::anyhow!("connection reset by broker"),
            ))),
            Upstream::Hang => Box::pin(futures::future::pending::<anyhow::Result<MetadataResponse>>()),
        }
    }
}

pub fn metadata_response(topics: Vec<(Uuid, &str, i16)>) -> MetadataResponse {
    MetadataResponse::default().with_topics(
        topics
            .into_iter()
            .map(|(id, name, error_code)| {
                MetadataResponseTopic::default()
                    .with_topic_id(id)
                    .with_name((!name.is_empty()).then(|| topic_name(name)))
                    .with_error_code(error_code)
            })
            .collect(),
    )
}

/// A fetch request of each (name, id) topic.
pub fn fetch_request(topics: &[(&str, Uuid)]) -> FetchRequest {
    FetchRequest::default().with_topics(
        topics
            .iter()
            .map(|(name, id)| {
                FetchTopic::default()
                    .with_topic(topic_name(name))
                    .with_topic_id(*id)
            })
            .collect(),
    )
}

/// A fetch response of each (name, id) topic, holding one partition
/// whose records are the topic's "ciphertext".
pub fn fetch_response(topics: &[(&str, Uuid)]) -> FetchResponse {
    FetchResponse::default().with_responses(
        topics
            .iter()
            .map(|(name, id)| {
                FetchableTopicResponse::default()
                    .with_topic(topic_name(name))
                    .with_topic_id(*id)
                    .with_partitions(vec![PartitionData::default()
                        .with_partition_index(0)
                        .with_records(Some(Bytes::from_static(b"txetrehpic")))])
            })
            .collect(),
    )
}

/// ReversingDecryptor "decrypts" records by reversing their bytes,
/// and records the name and id of each topic it's called with.
#[derive(Default)]
pub struct ReversingDecryptor {
    pub calls: Mutex<Vec<(String, Uuid)>>,
    pub fail_topic: Option<&'static str>,
}

impl Decryptor for ReversingDecryptor {
    fn decrypt(&self, topic: &mut FetchableTopicResponse) -> anyhow::Result<()> {
        let name = topic.topic.as_str().to_string();
        self.calls.lock().unwrap().push((name.clone(), topic.topic_id));

        if self.fail_topic == Some(name.as_str()) {
            anyhow::bail!("no encryption key for topic {name}");
        }
        for partition in topic.partitions.iter_mut() {
            partition.records = partition
                .records
                .take()
                .map(|records| Bytes::from(records.iter().rev().copied().collect::<Vec<u8>>()));
        }
        Ok(())
    }
}

pub fn test_config() -> FilterConfig {
    FilterConfig {
        cache_wait_timeout: Duration::from_millis(200),
        lookup_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

pub fn filter(decryptor: Arc<ReversingDecryptor>) -> Filter {
    Filter::new(&test_config(), decryptor).expect("test config is valid")
}

pub fn fetch_request_header() -> RequestHeader {
    RequestHeader::default()
        .with_request_api_key(kafka_protocol::messages::ApiKey::Fetch as i16)
        .with_request_api_version(13)
        .with_correlation_id(7)
}

pub fn response_header() -> ResponseHeader {
    ResponseHeader::default().with_correlation_id(7)
}
