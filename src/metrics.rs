use std::sync::LazyLock;

use prometheus::*;

static METRIC_REQUEST_COUNT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "face_request_count",
        "count of the pipeline runs",
        &["endpoint", "outcome"]
    )
    .unwrap()
});

static METRIC_REQUEST_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "face_request_duration",
        "duration of the per-request pipeline in seconds",
        &["endpoint"]
    )
    .unwrap()
});

static METRIC_EXTRACT_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "face_extract_duration",
        "duration of face detection or embedding in seconds",
        &["operation", "backend"]
    )
    .unwrap()
});

static METRIC_LIVE_ARTIFACTS: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge!("face_live_artifacts", "count of uploaded images not yet deleted").unwrap()
});

static METRIC_SEARCH_MAX_SCORE: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram!(
        "face_search_max_score",
        "similarity of the best match per recognize request",
        (-10..=10).map(|x| x as f64 / 10.).collect()
    )
    .unwrap()
});

/// 记录一次请求的结果与耗时
pub fn inc_request(endpoint: &str, outcome: &str, duration: f32) {
    METRIC_REQUEST_COUNT.with_label_values(&[endpoint, outcome]).inc();
    METRIC_REQUEST_DURATION.with_label_values(&[endpoint]).observe(duration as f64);
}

pub fn inc_extract_duration(operation: &str, backend: &str, duration: f32) {
    METRIC_EXTRACT_DURATION.with_label_values(&[operation, backend]).observe(duration as f64);
}

pub fn inc_search_max_score(score: f32) {
    METRIC_SEARCH_MAX_SCORE.observe(score as f64);
}

pub fn inc_live_artifacts() {
    METRIC_LIVE_ARTIFACTS.inc();
}

pub fn dec_live_artifacts() {
    METRIC_LIVE_ARTIFACTS.dec();
}
