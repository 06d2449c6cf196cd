use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("lavo.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("lavo.client.request_errors");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("lavo.client.request_duration_seconds");

pub(crate) static STREAM_CHUNKS: Counter = Counter::new("lavo.stream.chunks");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("lavo.stream.errors");
pub(crate) static STREAM_BYTES: Counter = Counter::new("lavo.stream.bytes");

pub(crate) static SESSION_SUBMISSIONS: Counter = Counter::new("lavo.session.submissions");
pub(crate) static SESSION_EMPTY_INPUTS: Counter = Counter::new("lavo.session.empty_inputs");
pub(crate) static SESSION_CONFIG_ERRORS: Counter = Counter::new("lavo.session.config_errors");
pub(crate) static SESSION_STREAM_ERRORS: Counter = Counter::new("lavo.session.stream_errors");
pub(crate) static SESSION_ABANDONED_TURNS: Counter =
    Counter::new("lavo.session.abandoned_turns");
pub(crate) static SESSION_DELTAS: Counter = Counter::new("lavo.session.deltas");
pub(crate) static SESSION_TURN_DURATION: Moments =
    Moments::new("lavo.session.turn_duration_seconds");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_moments(&CLIENT_REQUEST_DURATION);

    collector.register_counter(&STREAM_CHUNKS);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_BYTES);

    collector.register_counter(&SESSION_SUBMISSIONS);
    collector.register_counter(&SESSION_EMPTY_INPUTS);
    collector.register_counter(&SESSION_CONFIG_ERRORS);
    collector.register_counter(&SESSION_STREAM_ERRORS);
    collector.register_counter(&SESSION_ABANDONED_TURNS);
    collector.register_counter(&SESSION_DELTAS);
    collector.register_moments(&SESSION_TURN_DURATION);
}
