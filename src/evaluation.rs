//! Scoring whole candidate packings.
//!
//! An evolutionary controller hands over a sequence of placement proposals; each
//! sequence is replayed into a fresh `Container` and scored by its bounding
//! volume estimate. Rejected proposals are recorded but never abort the run.

use std::ops::ControlFlow;

use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::container::{BoundingExtent, Container, ContainerConfig, validate_height_bias};
use crate::model::{PackageRequest, Placement, PlacementError, ValidationError};
use crate::types::Dims;

/// Outcome of a single proposal within an evaluation.
#[derive(Clone, Debug)]
pub struct PlacementOutcome {
    /// Position of the proposal in the submitted sequence.
    pub index: usize,
    pub request: PackageRequest,
    pub result: Result<Placement, PlacementError>,
}

impl PlacementOutcome {
    pub fn is_accepted(&self) -> bool {
        self.result.is_ok()
    }
}

/// Result of replaying one candidate packing, including the final container.
#[derive(Clone, Debug)]
pub struct EvaluationResult {
    pub outcomes: Vec<PlacementOutcome>,
    pub extent: BoundingExtent,
    pub height_bias: f64,
    pub bounding_volume: f64,
    pub container: Container,
}

impl EvaluationResult {
    pub fn accepted_count(&self) -> usize {
        accepted(&self.outcomes)
    }

    pub fn rejected_count(&self) -> usize {
        self.outcomes.len() - self.accepted_count()
    }

    /// Accepted placements that landed on an uneven surface.
    pub fn penalised_count(&self) -> usize {
        penalised(&self.outcomes)
    }

    /// Gives `true` if every proposal was accepted.
    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(PlacementOutcome::is_accepted)
    }

    /// Drops the container and keeps only what selection needs.
    pub fn into_score(self) -> CandidateScore {
        CandidateScore {
            outcomes: self.outcomes,
            extent: self.extent,
            height_bias: self.height_bias,
            bounding_volume: self.bounding_volume,
        }
    }
}

/// Score of one candidate within a population, without its height field.
#[derive(Clone, Debug)]
pub struct CandidateScore {
    pub outcomes: Vec<PlacementOutcome>,
    pub extent: BoundingExtent,
    pub height_bias: f64,
    pub bounding_volume: f64,
}

impl CandidateScore {
    pub fn accepted_count(&self) -> usize {
        accepted(&self.outcomes)
    }

    pub fn rejected_count(&self) -> usize {
        self.outcomes.len() - self.accepted_count()
    }

    pub fn penalised_count(&self) -> usize {
        penalised(&self.outcomes)
    }
}

fn accepted(outcomes: &[PlacementOutcome]) -> usize {
    outcomes.iter().filter(|o| o.is_accepted()).count()
}

fn penalised(outcomes: &[PlacementOutcome]) -> usize {
    outcomes
        .iter()
        .filter(|o| matches!(&o.result, Ok(p) if !p.supported))
        .count()
}

/// Events emitted while a candidate is replayed, suitable for streaming.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type")]
pub enum EvaluationEvent {
    /// A fresh container was created.
    EpisodeStarted {
        width: usize,
        height: usize,
        penalty_multiplier: f64,
        packages: usize,
    },
    /// A proposal was accepted.
    PackagePlaced {
        index: usize,
        x_center: f64,
        y_center: f64,
        dims: Dims,
        supported: bool,
        increment: f64,
        top_height: f64,
    },
    /// A proposal was refused; the container is unchanged.
    PackageRejected {
        index: usize,
        dims: Dims,
        reason_code: String,
        reason_text: String,
    },
    /// Replay finished.
    Finished {
        accepted: usize,
        rejected: usize,
        bounding_volume: f64,
    },
}

/// Replays `packages` into a new container and scores the result.
///
/// # Parameters
/// * `packages` - Placement proposals, applied in order
/// * `config` - Container configuration for the episode
/// * `height_bias` - Height multiplier for the bounding volume estimate
///
/// # Errors
/// Only invalid configuration or height bias fail; rejected proposals are part
/// of the result.
pub fn evaluate_packing(
    packages: &[PackageRequest],
    config: ContainerConfig,
    height_bias: f64,
) -> Result<EvaluationResult, ValidationError> {
    evaluate_packing_with_progress(packages, config, height_bias, |_| ControlFlow::Continue(()))
}

/// Like `evaluate_packing`, calling `on_event` for every step.
///
/// Returning `ControlFlow::Break` from `on_event` stops the replay; the result
/// then holds only the proposals handled so far and no `Finished` event is sent.
pub fn evaluate_packing_with_progress(
    packages: &[PackageRequest],
    config: ContainerConfig,
    height_bias: f64,
    mut on_event: impl FnMut(&EvaluationEvent) -> ControlFlow<()>,
) -> Result<EvaluationResult, ValidationError> {
    validate_height_bias(height_bias)?;
    let mut container = Container::new(config)?;

    let mut flow = on_event(&EvaluationEvent::EpisodeStarted {
        width: container.width(),
        height: container.height(),
        penalty_multiplier: config.penalty_multiplier,
        packages: packages.len(),
    });

    let mut outcomes = Vec::with_capacity(packages.len());
    for (index, &request) in packages.iter().enumerate() {
        if flow.is_break() {
            break;
        }
        let result = container.add_package(request);
        flow = match &result {
            Ok(placement) => on_event(&EvaluationEvent::PackagePlaced {
                index,
                x_center: placement.x_center,
                y_center: placement.y_center,
                dims: placement.dims,
                supported: placement.supported,
                increment: placement.increment,
                top_height: placement.top_height,
            }),
            Err(err) => on_event(&EvaluationEvent::PackageRejected {
                index,
                dims: request.dims,
                reason_code: err.code().to_string(),
                reason_text: err.to_string(),
            }),
        };
        outcomes.push(PlacementOutcome {
            index,
            request,
            result,
        });
    }

    let extent = container.bounding_extent();
    let bounding_volume = extent.volume(height_bias);
    let result = EvaluationResult {
        outcomes,
        extent,
        height_bias,
        bounding_volume,
        container,
    };

    if flow.is_break() {
        debug!(
            handled = result.outcomes.len(),
            total = packages.len(),
            "evaluation stopped early"
        );
        return Ok(result);
    }

    let _ = on_event(&EvaluationEvent::Finished {
        accepted: result.accepted_count(),
        rejected: result.rejected_count(),
        bounding_volume,
    });
    debug!(
        accepted = result.accepted_count(),
        rejected = result.rejected_count(),
        bounding_volume,
        "candidate evaluated"
    );

    Ok(result)
}

/// Scores many candidates in parallel, each in its own container.
///
/// Results keep the order of `candidates`. Containers are never shared between
/// candidates, so no locking is involved, and each one is dropped as soon as
/// its candidate is scored.
pub fn evaluate_population(
    candidates: &[Vec<PackageRequest>],
    config: ContainerConfig,
    height_bias: f64,
) -> Result<Vec<CandidateScore>, ValidationError> {
    config.validate()?;
    validate_height_bias(height_bias)?;
    candidates
        .par_iter()
        .map(|packages| {
            evaluate_packing(packages, config, height_bias).map(EvaluationResult::into_score)
        })
        .collect()
}
