//! KI-005: Log subscriber setup.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global tracing subscriber. `RUST_LOG` overrides `log_level`.
///
/// Logs go to stderr so command output on stdout stays clean.
pub fn init(log_format: &str, log_level: &str) -> Result<(), String> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let result = match log_format.to_lowercase().as_str() {
        "json" => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        "text" => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        other => return Err(format!("unknown log format '{}' (expected text or json)", other)),
    };
    result.map_err(|e| format!("cannot install log subscriber: {}", e))
}

#[cfg(test)]
pub(crate) use capture::capture;


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ki005_unknown_format_rejected() {
        let err = init("xml", "info").unwrap_err();
        assert!(err.contains("xml"));
    }

    #[test]
    fn test_ki005_capture_records_events() {
        let (dispatch, buf) = capture();
        tracing::dispatcher::with_default(&dispatch, || {
            tracing::info!(host = "m1", "hello");
        });
        let out = String::from_utf8(buf.lock().unwrap().clone()).unwrap();
        assert!(out.contains("hello"));
        assert!(out.contains("host=\"m1\"") || out.contains("host=m1"));
    }
}
