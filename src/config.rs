//! Configuration record consumed by [`crate::run`].
//!
//! Loading (file format, CLI) is the caller's concern; the core takes the
//! parsed record and validates it. Validation errors name the offending key.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::net::RoutingMode;
use crate::scenario::{AllocationMode, StagePlacementMode};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

fn invalid(key: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        message: message.into(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    pub run: RunSection,
    pub topology: TopologySection,
    pub scenario: ScenarioSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSection {
    #[serde(default)]
    pub file_debug: bool,
    #[serde(default)]
    pub message_verbose: bool,
    #[serde(default)]
    pub verbose_route: bool,
    /// Accepted for compatibility; topology visualization is an external
    /// collaborator and the core ignores it.
    #[serde(default)]
    pub visualize: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologySection {
    #[serde(rename = "type")]
    pub kind: String,
    pub ai_factory_su: SuSection,
    pub routing: RoutingSection,
    pub links: LinksSection,
    pub max_path: u32,
    pub mtu: u32,
    pub ttl: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuSection {
    pub leaves: usize,
    pub spines: usize,
    pub servers_per_leaf: usize,
    pub server_parallel_links: usize,
    pub leaf_to_spine_parallel_links: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingSection {
    pub mode: RoutingMode,
    /// Flowlet packet-count threshold; 0 disables that trigger.
    pub ecmp_flowlet_n_packets: u32,
    /// Flowlet idle-gap threshold in microseconds; 0 disables that trigger.
    #[serde(default)]
    pub flowlet_idle_gap_us: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinksSection {
    /// Percentage (0-100) of links marked failed at build time.
    pub failure_percent: f64,
    #[serde(default = "default_failure_seed")]
    pub failure_seed: u64,
    pub bandwidth_bps: BandwidthSection,
}

fn default_failure_seed() -> u64 {
    0xFA17
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandwidthSection {
    pub server_to_leaf: u64,
    pub leaf_to_spine: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "name", content = "params")]
pub enum ScenarioSection {
    #[serde(rename = "ai-factory-su-workload1-dp-heavy")]
    DpHeavy(DpHeavyParams),
    #[serde(rename = "ai-factory-su-mixed")]
    Mixed(MixedParams),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DpHeavyParams {
    pub steps: u32,
    pub seed: u64,
    pub num_buckets: u32,
    pub bucket_bytes_per_participant: u64,
    pub gap_us: f64,
    pub t_fwd_bwd_ms: f64,
    pub optimizer_ms: f64,
    #[serde(default)]
    pub mice: Option<MiceParams>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixedParams {
    pub steps: u32,
    /// Per-job overrides; fall back to `steps`.
    #[serde(default)]
    pub tp_heavy_steps: Option<u32>,
    #[serde(default)]
    pub pp_dp_steps: Option<u32>,
    pub seed: u64,
    #[serde(default = "default_traffic_scale")]
    pub traffic_scale: f64,
    pub allocation_mode: AllocationMode,
    pub stage_placement_mode: StagePlacementMode,

    pub tp_heavy_fwd_compute_ms: f64,
    pub tp_heavy_micro_collectives: u32,
    pub tp_heavy_micro_collective_bytes_per_participant: u64,
    pub tp_heavy_micro_compute_gap_ms: f64,
    pub tp_heavy_final_sync_bytes_per_participant: u64,
    pub tp_heavy_tail_compute_ms: f64,
    pub tp_heavy_gap_us: f64,

    pub pp_dp_microbatch_count: u32,
    pub pp_dp_microbatch_gap_us: f64,
    pub pp_dp_activation_bytes_per_microbatch: u64,
    pub pp_dp_grad_bytes_per_microbatch: u64,
    pub pp_dp_dp_sync_bytes_per_participant: u64,
    pub pp_dp_tail_compute_ms: f64,

    #[serde(default)]
    pub mice: Option<MiceParams>,
}

fn default_traffic_scale() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiceParams {
    pub enabled: bool,
    pub seed: u64,
    pub start_delay_s: f64,
    pub end_time_s: f64,
    pub interarrival_s: f64,
    pub min_packets: u32,
    pub max_packets: u32,
    pub force_cross_rack: bool,
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.topology.kind != "ai-factory-su" {
            return Err(invalid(
                "topology.type",
                format!("unsupported topology {:?}", self.topology.kind),
            ));
        }
        let su = &self.topology.ai_factory_su;
        if su.leaves == 0 || su.spines == 0 {
            return Err(invalid(
                "topology.ai_factory_su.leaves",
                "leaves and spines must be > 0",
            ));
        }
        if su.servers_per_leaf == 0 {
            return Err(invalid(
                "topology.ai_factory_su.servers_per_leaf",
                "must be > 0",
            ));
        }
        if su.server_parallel_links == 0 || su.leaf_to_spine_parallel_links == 0 {
            return Err(invalid(
                "topology.ai_factory_su.server_parallel_links",
                "parallel link counts must be > 0",
            ));
        }
        if !(0.0..=100.0).contains(&self.topology.links.failure_percent) {
            return Err(invalid(
                "topology.links.failure_percent",
                "must be within 0-100",
            ));
        }
        if self.topology.links.bandwidth_bps.server_to_leaf == 0
            || self.topology.links.bandwidth_bps.leaf_to_spine == 0
        {
            return Err(invalid(
                "topology.links.bandwidth_bps",
                "bandwidth must be > 0",
            ));
        }
        if self.topology.mtu == 0 {
            return Err(invalid("topology.mtu", "must be > 0"));
        }
        if self.topology.ttl == 0 {
            return Err(invalid("topology.ttl", "must be > 0"));
        }
        if self.topology.max_path == 0 {
            return Err(invalid("topology.max_path", "must be > 0"));
        }
        if !self.topology.routing.flowlet_idle_gap_us.is_finite()
            || self.topology.routing.flowlet_idle_gap_us < 0.0
        {
            return Err(invalid(
                "topology.routing.flowlet_idle_gap_us",
                "must be a finite value >= 0",
            ));
        }

        match &self.scenario {
            ScenarioSection::DpHeavy(p) => {
                if p.steps == 0 {
                    return Err(invalid("scenario.params.steps", "must be > 0"));
                }
                if p.num_buckets == 0 {
                    return Err(invalid("scenario.params.num_buckets", "must be > 0"));
                }
                require_duration_ms("scenario.params.t_fwd_bwd_ms", p.t_fwd_bwd_ms)?;
                require_duration_ms("scenario.params.optimizer_ms", p.optimizer_ms)?;
                require_duration_ms("scenario.params.gap_us", p.gap_us)?;
                if let Some(mice) = &p.mice {
                    validate_mice(mice)?;
                }
            }
            ScenarioSection::Mixed(p) => {
                if p.steps == 0 && p.tp_heavy_steps.is_none() && p.pp_dp_steps.is_none() {
                    return Err(invalid("scenario.params.steps", "must be > 0"));
                }
                if !(p.traffic_scale.is_finite() && p.traffic_scale > 0.0) {
                    return Err(invalid(
                        "scenario.params.traffic_scale",
                        "must be finite and > 0",
                    ));
                }
                if p.pp_dp_microbatch_count == 0 {
                    return Err(invalid(
                        "scenario.params.pp_dp_microbatch_count",
                        "must be > 0",
                    ));
                }
                if let Some(mice) = &p.mice {
                    validate_mice(mice)?;
                }
            }
        }
        Ok(())
    }
}

fn require_duration_ms(key: &'static str, v: f64) -> Result<(), ConfigError> {
    if v.is_finite() && v >= 0.0 {
        Ok(())
    } else {
        Err(invalid(key, "must be a finite value >= 0"))
    }
}

fn validate_mice(m: &MiceParams) -> Result<(), ConfigError> {
    if !m.enabled {
        return Ok(());
    }
    if !(m.interarrival_s.is_finite() && m.interarrival_s > 0.0) {
        return Err(invalid("scenario.params.mice.interarrival_s", "must be > 0"));
    }
    if !(m.end_time_s.is_finite() && m.start_delay_s.is_finite())
        || m.end_time_s <= m.start_delay_s
    {
        return Err(invalid(
            "scenario.params.mice.end_time_s",
            "must be > mice.start_delay_s",
        ));
    }
    if m.min_packets == 0 || m.min_packets > m.max_packets {
        return Err(invalid(
            "scenario.params.mice.min_packets",
            "must satisfy 1 <= min_packets <= max_packets",
        ));
    }
    Ok(())
}
