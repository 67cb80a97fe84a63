//! # Resolver
//!
//! Chooses exactly one [`ExecutionPlan`] for a tool.
//!
//! The decision itself ([`resolve_plan`]) is a pure function of the tool spec, the
//! candidate order and a snapshot of probe results, so the same inputs always give the
//! same plan. [`resolve`] feeds it lazily: modes are probed in preference order and
//! probing stops at the first available one, which yields the same plan an eager probe
//! of every mode would.

use serde::Serialize;

use crate::config::BindMount;
use crate::error::{ModeAttempt, ResolveError};
use crate::mode::ExecutionMode;
use crate::registry::{ModePolicy, ModeRegistry, ToolSpec};
use crate::tool_availability::{
    AvailabilityCache, BackendAvailability, BackendProbe, BackendResource, probe_cached,
};

/// Container modes tried when `force_container` leaves nothing else to try.
const CONTAINER_FALLBACK: [ExecutionMode; 2] = [ExecutionMode::Singularity, ExecutionMode::Docker];

/// The fully decided way of running one tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionPlan {
    pub tool: String,
    pub mode: ExecutionMode,
    pub resource: BackendResource,
    pub bind_mounts: Vec<BindMount>,
    /// Extra runtime flags (Docker only).
    pub extra_flags: Vec<String>,
}

/// Modes to walk, in order, and whether the single mode was forced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateOrder {
    pub modes: Vec<ExecutionMode>,
    pub forced: Option<ExecutionMode>,
}

/// Compute the candidate order for `spec` under `policy`.
///
/// A forced mode (per tool first, then global) is the whole order. Otherwise the
/// per-tool preference list wins over the global one, and `force_container` keeps only
/// the container modes of that list.
pub fn candidate_order(spec: &ToolSpec, policy: &ModePolicy) -> CandidateOrder {
    if let Some(forced) = spec.forced_mode.or(policy.forced_mode) {
        return CandidateOrder {
            modes: vec![forced],
            forced: Some(forced),
        };
    }

    let preferred = spec
        .preferred_modes
        .as_deref()
        .unwrap_or(&policy.preferred_modes);

    let modes = if policy.force_container {
        let containers: Vec<_> = preferred
            .iter()
            .copied()
            .filter(|mode| mode.is_container())
            .collect();
        if containers.is_empty() {
            CONTAINER_FALLBACK.to_vec()
        } else {
            containers
        }
    } else {
        preferred.to_vec()
    };

    CandidateOrder {
        modes,
        forced: None,
    }
}

/// Pick the first available mode of `order` according to `snapshot`.
///
/// Modes absent from the snapshot count as unavailable ("not probed").
pub fn resolve_plan(
    spec: &ToolSpec,
    order: &CandidateOrder,
    snapshot: &[BackendAvailability],
    policy: &ModePolicy,
) -> Result<ExecutionPlan, ResolveError> {
    let mut attempts = Vec::new();

    for mode in &order.modes {
        let Some(availability) = snapshot.iter().find(|a| a.mode == *mode) else {
            attempts.push(ModeAttempt {
                mode: *mode,
                detail: "not probed".to_string(),
            });
            continue;
        };

        match (&availability.resource, availability.available) {
            (Some(resource), true) => {
                return Ok(ExecutionPlan {
                    tool: spec.name.clone(),
                    mode: *mode,
                    resource: resource.clone(),
                    bind_mounts: spec.bind_mounts.clone(),
                    extra_flags: if *mode == ExecutionMode::Docker {
                        policy.docker_extra_flags.clone()
                    } else {
                        Vec::new()
                    },
                });
            }
            (None, true) => attempts.push(ModeAttempt {
                mode: *mode,
                detail: "probe reported availability without a resource".to_string(),
            }),
            (_, false) => attempts.push(ModeAttempt {
                mode: *mode,
                detail: availability.diagnostic(),
            }),
        }
    }

    Err(ResolveError::BackendUnavailable {
        tool: spec.name.clone(),
        forced: order.forced,
        attempts,
    })
}

/// Resolve `tool_name`, probing modes lazily through `cache`.
pub async fn resolve(
    registry: &ModeRegistry,
    probe: &dyn BackendProbe,
    cache: &AvailabilityCache,
    tool_name: &str,
) -> Result<ExecutionPlan, ResolveError> {
    let spec = registry.get(tool_name);
    let order = candidate_order(&spec, registry.policy());
    tracing::debug!(
        "Resolving '{tool_name}' over {:?}{}",
        order.modes,
        if order.forced.is_some() { " (forced)" } else { "" }
    );

    let mut snapshot = Vec::with_capacity(order.modes.len());
    for mode in &order.modes {
        let availability = probe_cached(probe, cache, *mode, &spec).await;
        let done = availability.available;
        snapshot.push(availability);
        if done {
            break;
        }
    }

    let result = resolve_plan(&spec, &order, &snapshot, registry.policy());
    match &result {
        Ok(plan) => tracing::info!("Resolved '{tool_name}' to {} mode", plan.mode),
        Err(err) => tracing::warn!("{err}"),
    }
    result
}
