use std::time::Instant;

use telemetry::KeyValue;

const CONVERSION_DURATION: &str = "gen_ai.gateway.conversion.duration";

/// Direction label values, closed set per the Conversion Registry's metric
/// contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Request,
    Response,
    Error,
    Stream,
    VideoRequest,
    VideoTask,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Direction::Request => "request",
            Direction::Response => "response",
            Direction::Error => "error",
            Direction::Stream => "stream",
            Direction::VideoRequest => "video_request",
            Direction::VideoTask => "video_task",
        }
    }
}

/// Runs `f`, recording a `gen_ai.gateway.conversion.duration` histogram
/// sample tagged with `(direction, source_format, target_format, status)`
/// and a matching fastrace span, per the Conversion Registry's metric
/// contract.
pub fn record_conversion<T, E>(
    direction: Direction,
    source_format: &'static str,
    target_format: &'static str,
    f: impl FnOnce() -> Result<T, E>,
) -> Result<T, E> {
    let span_name = format!("registry:convert_{}", direction.as_str());
    let span = telemetry::tracing::create_child_span_if_sampled(span_name);
    let _guard = span.set_local_parent();

    let start = Instant::now();
    let result = f();
    let status = if result.is_ok() { "success" } else { "error" };

    let attributes = [
        KeyValue::new("direction", direction.as_str()),
        KeyValue::new("source_format", source_format),
        KeyValue::new("target_format", target_format),
        KeyValue::new("status", status),
    ];

    telemetry::metrics::meter()
        .f64_histogram(CONVERSION_DURATION)
        .with_unit("s")
        .build()
        .record(start.elapsed().as_secs_f64(), &attributes);

    fastrace::prelude::LocalSpan::add_property(|| ("status", status));

    result
}
