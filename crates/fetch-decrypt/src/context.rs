use futures::future::BoxFuture;
use kafka_protocol::messages::{
    MetadataRequest, MetadataResponse, RequestHeader, RequestKind, ResponseHeader, ResponseKind,
};

/// FilterContext is the proxy pipeline of a single client connection,
/// as seen by the filter.
///
/// The pipeline processes one message at a time and in order: a message
/// forwarded through the context is delivered before the next one is
/// handed to the filter.
pub trait FilterContext {
    /// Pass a request on towards the upstream broker.
    fn forward_request(&mut self, header: RequestHeader, request: RequestKind);

    /// Pass a response on towards the client.
    fn forward_response(&mut self, header: ResponseHeader, response: ResponseKind);

    /// Send a Metadata request of the filter's own to the upstream broker,
    /// out of band of the client's requests. The returned future resolves
    /// with the broker's reply and is polled on a background task.
    fn send_request(
        &self,
        api_version: i16,
        request: MetadataRequest,
    ) -> BoxFuture<'static, anyhow::Result<MetadataResponse>>;
}
