use http::{HeaderMap, Request};
use opentelemetry::propagation::Extractor;
use tower_http::trace::MakeSpan;
use tracing::{Span, debug, info_span};
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// gRPC 请求 span 构造器
///
/// span 名为 `grpc.request`，父上下文取自请求头中的 `traceparent` / `baggage`。
#[derive(Debug, Clone, Copy, Default)]
pub struct GrpcMakeSpan;

impl<B> MakeSpan<B> for GrpcMakeSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let span = info_span!(
            "grpc.request",
            otel.kind = "server",
            rpc.system = "grpc",
            rpc.method = %request.uri().path(),
        );
        let parent = opentelemetry::global::get_text_map_propagator(|propagator| {
            propagator.extract(&HeaderExtractor(request.headers()))
        });
        if let Err(e) = span.set_parent(parent) {
            debug!(error = ?e, "Failed to attach parent trace context");
        }
        span
    }
}

struct HeaderExtractor<'a>(&'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|k| k.as_str()).collect()
    }
}
