//! Prometheus metrics for the relay
//!
//! Everything is registered in [`REGISTRY`] and exposed by the API crate at
//! `/metrics`.

use prometheus::{
    register_int_counter_vec_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Encoder, IntCounter, IntCounterVec, IntGauge, Registry,
    TextEncoder,
};

/// Global metrics registry
pub static REGISTRY: std::sync::LazyLock<Registry> = std::sync::LazyLock::new(Registry::new);

/// Viewers currently registered with the stream supervisor
pub static ACTIVE_VIEWERS: std::sync::LazyLock<IntGauge> = std::sync::LazyLock::new(|| {
    register_int_gauge_with_registry!(
        "camrelay_active_viewers",
        "Current number of registered stream viewers",
        REGISTRY.clone()
    )
    .expect("Failed to register ACTIVE_VIEWERS")
});

/// Transcoder spawn attempts, labeled `started` or `failed`
pub static TRANSCODER_SPAWNS: std::sync::LazyLock<IntCounterVec> =
    std::sync::LazyLock::new(|| {
        register_int_counter_vec_with_registry!(
            "camrelay_transcoder_spawns_total",
            "Total number of transcoder spawn attempts",
            &["outcome"],
            REGISTRY.clone()
        )
        .expect("Failed to register TRANSCODER_SPAWNS")
    });

/// Transcoder terminations, labeled `exited`, `failed` or `stopped`
pub static TRANSCODER_EXITS: std::sync::LazyLock<IntCounterVec> =
    std::sync::LazyLock::new(|| {
        register_int_counter_vec_with_registry!(
            "camrelay_transcoder_exits_total",
            "Total number of transcoder terminations",
            &["reason"],
            REGISTRY.clone()
        )
        .expect("Failed to register TRANSCODER_EXITS")
    });

pub static BROADCAST_CHUNKS: std::sync::LazyLock<IntCounter> = std::sync::LazyLock::new(|| {
    register_int_counter_with_registry!(
        "camrelay_broadcast_chunks_total",
        "Total number of transcoder chunks fanned out",
        REGISTRY.clone()
    )
    .expect("Failed to register BROADCAST_CHUNKS")
});

pub static BROADCAST_BYTES: std::sync::LazyLock<IntCounter> = std::sync::LazyLock::new(|| {
    register_int_counter_with_registry!(
        "camrelay_broadcast_bytes_total",
        "Total number of transcoder bytes fanned out",
        REGISTRY.clone()
    )
    .expect("Failed to register BROADCAST_BYTES")
});

/// Viewers dropped because their queue was full
pub static VIEWER_EVICTIONS: std::sync::LazyLock<IntCounter> = std::sync::LazyLock::new(|| {
    register_int_counter_with_registry!(
        "camrelay_viewer_evictions_total",
        "Total number of viewers evicted for falling behind",
        REGISTRY.clone()
    )
    .expect("Failed to register VIEWER_EVICTIONS")
});

/// PTZ commands sent to the camera, labeled by command kind
pub static PTZ_COMMANDS: std::sync::LazyLock<IntCounterVec> = std::sync::LazyLock::new(|| {
    register_int_counter_vec_with_registry!(
        "camrelay_ptz_commands_total",
        "Total number of PTZ commands sent to the camera",
        &["kind"],
        REGISTRY.clone()
    )
    .expect("Failed to register PTZ_COMMANDS")
});

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
