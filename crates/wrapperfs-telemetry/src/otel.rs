//! OTel internals: tracing layer and sampling.

use opentelemetry::trace::{
    Link, SamplingDecision, SamplingResult, SpanKind, TraceContextExt, TraceId, TraceState,
    TracerProvider as _,
};
use opentelemetry::{global, Context, KeyValue};
use opentelemetry_otlp::SpanExporter;
use opentelemetry_sdk::trace::{SdkTracer, SdkTracerProvider, Sampler, ShouldSample, SpanLimits};
use opentelemetry_sdk::Resource;
use tracing_opentelemetry::OpenTelemetryLayer;

use crate::sampling_rate;

/// Error building the OTLP exporter.
pub type OtelError = opentelemetry_otlp::ExporterBuildError;

/// Guard that shuts down the OTel tracer provider on drop, flushing pending spans.
pub struct OtelGuard {
    provider: SdkTracerProvider,
}

impl Drop for OtelGuard {
    fn drop(&mut self) {
        if let Err(e) = self.provider.shutdown() {
            eprintln!("OTel shutdown error: {e}");
        }
    }
}

/// Build an OpenTelemetry tracing layer and guard.
///
/// Must be called from within a Tokio runtime; the gRPC exporter spawns onto
/// it. The guard must be held for the life of the mount so spans are flushed.
pub fn otel_layer<S>(
    service_name: &str,
) -> Result<(OpenTelemetryLayer<S, SdkTracer>, OtelGuard), OtelError>
where
    S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
{
    let exporter = SpanExporter::builder().with_tonic().build()?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_sampler(FsSampler)
        .with_resource(resource)
        .with_span_limits(SpanLimits::default())
        .build();

    global::set_tracer_provider(provider.clone());

    let tracer = provider.tracer("wrapperfs");
    let layer = tracing_opentelemetry::layer().with_tracer(tracer);

    Ok((layer, OtelGuard { provider }))
}

/// Sampler with per-verb rates; see [`sampling_rate`].
///
/// Sampled parents keep their children. The decision is made when a span
/// starts, so only an error status already present among the start
/// attributes forces sampling. Errors that `#[instrument(err)]` records
/// later arrive as events on a span whose fate is already decided.
#[derive(Debug, Clone)]
struct FsSampler;

impl ShouldSample for FsSampler {
    fn should_sample(
        &self,
        parent_context: Option<&Context>,
        trace_id: TraceId,
        name: &str,
        span_kind: &SpanKind,
        attributes: &[KeyValue],
        links: &[Link],
    ) -> SamplingResult {
        if let Some(cx) = parent_context {
            let parent_span = cx.span();
            let parent_ctx = parent_span.span_context();
            if parent_ctx.is_sampled() {
                return SamplingResult {
                    decision: SamplingDecision::RecordAndSample,
                    attributes: vec![],
                    trace_state: parent_ctx.trace_state().clone(),
                };
            }
        }

        let is_error = attributes.iter().any(|kv| {
            (kv.key.as_str() == "otel.status_code" && kv.value.as_str() == "ERROR")
                || (kv.key.as_str() == "error" && kv.value.as_str() == "true")
        });
        if is_error {
            return SamplingResult {
                decision: SamplingDecision::RecordAndSample,
                attributes: vec![],
                trace_state: TraceState::default(),
            };
        }

        // Ratio sampling keyed on trace id keeps the decision deterministic.
        Sampler::TraceIdRatioBased(sampling_rate(name)).should_sample(
            parent_context,
            trace_id,
            name,
            span_kind,
            attributes,
            links,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decide(name: &str, attributes: &[KeyValue]) -> SamplingDecision {
        FsSampler
            .should_sample(
                None,
                TraceId::from_bytes([0xff; 16]),
                name,
                &SpanKind::Internal,
                attributes,
                &[],
            )
            .decision
    }

    #[test]
    fn test_mutating_verbs_always_sampled() {
        assert_eq!(decide("fs.unlink", &[]), SamplingDecision::RecordAndSample);
        assert_eq!(decide("fs.mkdir", &[]), SamplingDecision::RecordAndSample);
    }

    #[test]
    fn test_data_path_follows_ratio() {
        // The all-ones trace id sits above every ratio below 1.0.
        assert_eq!(decide("fs.read", &[]), SamplingDecision::Drop);
        assert_eq!(decide("fs.getattr", &[]), SamplingDecision::Drop);
    }

    #[test]
    fn test_error_status_at_start_sampled() {
        let attrs = [KeyValue::new("otel.status_code", "ERROR")];
        assert_eq!(decide("fs.read", &attrs), SamplingDecision::RecordAndSample);
    }
}
