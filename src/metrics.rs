use std::sync::LazyLock;

use prometheus::*;

use crate::descriptor::BackendKind;

static METRIC_SCAN_COUNT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "scanmatch_scan_count",
        "count of catalog scans",
        &["backend", "workflow"]
    )
    .unwrap()
});

static METRIC_SCAN_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "scanmatch_scan_duration",
        "duration of the per-image catalog scan in seconds",
        &["backend", "workflow"]
    )
    .unwrap()
});

static METRIC_BEST_SIMILARITY: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "scanmatch_best_similarity",
        "similarity of the best candidate of each scan",
        &["backend", "workflow"],
        (1..=20).map(|x| x as f64 * 0.05).collect()
    )
    .unwrap()
});

static METRIC_CANDIDATE_FAILURES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "scanmatch_candidate_failures",
        "count of candidates skipped because their comparison failed",
        &["backend"]
    )
    .unwrap()
});

static METRIC_PROBE_COUNT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "scanmatch_probe_count",
        "count of backend health probes",
        &["backend", "available"]
    )
    .unwrap()
});

/// 记录一次目录扫描
pub fn inc_scan(backend: BackendKind, workflow: &str, duration: f32, failed: usize) {
    METRIC_SCAN_COUNT.with_label_values(&[backend.as_str(), workflow]).inc();
    METRIC_SCAN_DURATION
        .with_label_values(&[backend.as_str(), workflow])
        .observe(duration as f64);
    if failed > 0 {
        METRIC_CANDIDATE_FAILURES.with_label_values(&[backend.as_str()]).inc_by(failed as u64);
    }
}

pub fn observe_best_similarity(backend: BackendKind, workflow: &str, similarity: f32) {
    METRIC_BEST_SIMILARITY
        .with_label_values(&[backend.as_str(), workflow])
        .observe(similarity as f64);
}

pub fn inc_probe(backend: BackendKind, available: bool) {
    METRIC_PROBE_COUNT
        .with_label_values(&[backend.as_str(), if available { "true" } else { "false" }])
        .inc();
}

/// 以 Prometheus 文本格式导出默认注册表中的所有指标
pub fn gather_text() -> String {
    let mut buffer = String::new();
    if let Err(e) = TextEncoder::new().encode_utf8(&gather(), &mut buffer) {
        log::warn!("导出指标失败: {}", e);
    }
    buffer
}
