use std::time::Instant;

use telemetry::KeyValue;

const DISPATCH_DURATION: &str = "gen_ai.gateway.upstream.dispatch.duration";

/// Records a `gen_ai.gateway.upstream.dispatch.duration` histogram sample
/// tagged with `(provider_id, stream, status)`, under a fastrace span, for
/// one dispatch attempt. Mirrors the registry's `record_conversion` shape.
pub async fn record_dispatch<T, E, F, Fut>(provider_id: &str, is_stream: bool, f: F) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let span = telemetry::tracing::create_child_span_if_sampled("upstream:dispatch");
    let _guard = span.set_local_parent();

    let start = Instant::now();
    let result = f().await;
    let status = if result.is_ok() { "success" } else { "error" };

    let attributes = [
        KeyValue::new("provider_id", provider_id.to_string()),
        KeyValue::new("stream", is_stream),
        KeyValue::new("status", status),
    ];

    telemetry::metrics::meter()
        .f64_histogram(DISPATCH_DURATION)
        .with_unit("s")
        .build()
        .record(start.elapsed().as_secs_f64(), &attributes);

    fastrace::prelude::LocalSpan::add_property(|| ("status", status));

    result
}
