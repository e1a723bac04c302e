//! OpenTelemetry integration for wrapperfs.
//!
//! Provides the OTel tracing layer and a sampler that keeps every
//! namespace-changing filesystem call while thinning out the high-volume
//! lookup and data-path spans.
//!
//! # Activation
//!
//! OTel export activates when standard OTel environment variables are set:
//!
//! ```bash
//! OTEL_EXPORTER_OTLP_ENDPOINT=http://localhost:4317 wrapperfs -b /srv/data /mnt/data
//! ```
//!
//! Set `OTEL_SDK_DISABLED=true` to explicitly disable even when the endpoint is set.

#[cfg(feature = "telemetry")]
mod otel;

#[cfg(feature = "telemetry")]
pub use otel::{otel_layer, OtelError, OtelGuard};

/// Check whether OTel export should be enabled.
///
/// Returns `true` when standard OTel env vars indicate export is desired:
/// - `OTEL_SDK_DISABLED` is NOT set to `"true"`
/// - AND at least one of:
///   - `OTEL_EXPORTER_OTLP_ENDPOINT` is set
///   - `OTEL_TRACES_EXPORTER` is set (and not `"none"`)
pub fn otel_enabled() -> bool {
    enabled_by(|key| std::env::var(key).ok())
}

fn enabled_by(var: impl Fn(&str) -> Option<String>) -> bool {
    if var("OTEL_SDK_DISABLED").is_some_and(|v| v.eq_ignore_ascii_case("true")) {
        return false;
    }

    if var("OTEL_EXPORTER_OTLP_ENDPOINT").is_some() {
        return true;
    }

    var("OTEL_TRACES_EXPORTER").is_some_and(|exporter| !exporter.eq_ignore_ascii_case("none"))
}

/// Fraction of root spans named `name` to keep.
///
/// | Span                                              | Rate |
/// |---------------------------------------------------|------|
/// | namespace and metadata changes (`fs.mkdir`, ...)  | 100% |
/// | data path (`fs.read`, `fs.write`)                 |   1% |
/// | everything else (`fs.getattr`, `fs.readdir`, ...) |  10% |
pub fn sampling_rate(name: &str) -> f64 {
    match name.strip_prefix("fs.") {
        Some(
            "create" | "mkdir" | "unlink" | "rmdir" | "rename" | "link" | "symlink" | "chmod"
            | "chown" | "utimens" | "truncate",
        ) => 1.0,
        Some("read" | "write") => 0.01,
        _ => 0.1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_disabled_without_env() {
        assert!(!enabled_by(env(&[])));
    }

    #[test]
    fn test_endpoint_enables() {
        assert!(enabled_by(env(&[(
            "OTEL_EXPORTER_OTLP_ENDPOINT",
            "http://localhost:4317"
        )])));
    }

    #[test]
    fn test_sdk_disabled_wins() {
        assert!(!enabled_by(env(&[
            ("OTEL_EXPORTER_OTLP_ENDPOINT", "http://localhost:4317"),
            ("OTEL_SDK_DISABLED", "TRUE"),
        ])));
    }

    #[test]
    fn test_traces_exporter_none() {
        assert!(!enabled_by(env(&[("OTEL_TRACES_EXPORTER", "none")])));
        assert!(enabled_by(env(&[("OTEL_TRACES_EXPORTER", "otlp")])));
    }

    #[test]
    fn test_sampling_rates() {
        assert_eq!(sampling_rate("fs.rename"), 1.0);
        assert_eq!(sampling_rate("fs.create"), 1.0);
        assert_eq!(sampling_rate("fs.write"), 0.01);
        assert_eq!(sampling_rate("fs.getattr"), 0.1);
        assert_eq!(sampling_rate("fs.readdir"), 0.1);
        assert_eq!(sampling_rate("something.else"), 0.1);
    }
}
