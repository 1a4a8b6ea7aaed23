//! Metrics instrumentation for the pipeline and session loop.
//!
//! Counters go through the `metrics` facade; the process installs a
//! recorder (the CLI uses a Prometheus exporter) and its scrape path reads
//! through that registry. This is the only state shared with a concurrent
//! thread.

/// Metric names used throughout the engine.
pub mod names {
    /// Total calls pushed toward the transport, labeled by call type.
    pub const CALLS_PUSHED_TOTAL: &str = "flotilla_calls_pushed_total";
    /// Total events pulled from the transport, labeled by event type.
    pub const EVENTS_PULLED_TOTAL: &str = "flotilla_events_pulled_total";
    /// Total flow operation errors, labeled by direction.
    pub const FLOW_ERRORS_TOTAL: &str = "flotilla_flow_errors_total";
    /// Total heartbeat deadline expirations.
    pub const HEARTBEAT_TIMEOUTS_TOTAL: &str = "flotilla_heartbeat_timeouts_total";
    /// Total connection attempts made by the session loop.
    pub const CONNECT_ATTEMPTS_TOTAL: &str = "flotilla_connect_attempts_total";
    /// Total successful subscriptions.
    pub const SUBSCRIPTIONS_TOTAL: &str = "flotilla_subscriptions_total";
    /// Total session failures (one per teardown-and-backoff cycle).
    pub const SESSION_FAILURES_TOTAL: &str = "flotilla_session_failures_total";
}

/// Convenience functions for recording metrics.
pub mod record {
    use metrics::counter;

    use super::names;

    /// Record a call pushed toward the transport.
    #[inline]
    pub fn call_pushed(call_type: &'static str) {
        counter!(names::CALLS_PUSHED_TOTAL, "type" => call_type).increment(1);
    }

    /// Record an event pulled from the transport.
    #[inline]
    pub fn event_pulled(event_type: &'static str) {
        counter!(names::EVENTS_PULLED_TOTAL, "type" => event_type).increment(1);
    }

    /// Record a failed flow operation.
    #[inline]
    pub fn flow_error(direction: &'static str) {
        counter!(names::FLOW_ERRORS_TOTAL, "direction" => direction).increment(1);
    }

    /// Record an expired heartbeat deadline.
    #[inline]
    pub fn heartbeat_timeout() {
        counter!(names::HEARTBEAT_TIMEOUTS_TOTAL).increment(1);
    }

    /// Record a connection attempt.
    #[inline]
    pub fn connect_attempt() {
        counter!(names::CONNECT_ATTEMPTS_TOTAL).increment(1);
    }

    /// Record a successful subscription.
    #[inline]
    pub fn subscribed() {
        counter!(names::SUBSCRIPTIONS_TOTAL).increment(1);
    }

    /// Record a session failure.
    #[inline]
    pub fn session_failure() {
        counter!(names::SESSION_FAILURES_TOTAL).increment(1);
    }
}
