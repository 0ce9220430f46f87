//! Capability router
//!
//! Greedy single-pass scorer over the registration table. Candidates must be
//! `active`, at or below the load threshold, and declare every required tool.
//! Each candidate scores:
//!
//! | term                 | weight                                          |
//! |----------------------|-------------------------------------------------|
//! | success rate         | `success_rate / 100 * 40`                       |
//! | spare capacity       | `(100 - load) / 100 * 20`                       |
//! | tool coverage        | `matched / required * 20` (only with tools)     |
//! | specialization match | `min(20, 4 * keyword hits in the task text)`    |
//!
//! The strictly highest score wins; ties go to the earliest registration.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::executor::{ExecutorId, ExecutorStatus};
use crate::registry::{ExecutorRegistry, Registration};

const SUCCESS_WEIGHT: f64 = 40.0;
const LOAD_WEIGHT: f64 = 20.0;
const TOOL_WEIGHT: f64 = 20.0;
const SPECIALIZATION_POINTS: f64 = 4.0;
const SPECIALIZATION_CAP: f64 = 20.0;

/// Score breakdown for one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub executor_id: ExecutorId,
    pub success_term: f64,
    pub load_term: f64,
    pub tool_term: f64,
    pub specialization_term: f64,
}

impl CandidateScore {
    pub fn total(&self) -> f64 {
        self.success_term + self.load_term + self.tool_term + self.specialization_term
    }
}

/// Selects the best executor for a task
#[derive(Clone)]
pub struct CapabilityRouter {
    registry: Arc<ExecutorRegistry>,
}

impl CapabilityRouter {
    pub fn new(registry: Arc<ExecutorRegistry>) -> Self {
        Self { registry }
    }

    /// Best eligible executor for `task`, or `None` when nothing qualifies
    pub async fn find_best_executor(&self, task: &str, required_tools: &[String]) -> Option<Registration> {
        self.find_best_executor_where(task, required_tools, |_| true).await
    }

    /// Like [`find_best_executor`](Self::find_best_executor) with an extra candidate predicate
    pub async fn find_best_executor_where<P>(
        &self,
        task: &str,
        required_tools: &[String],
        predicate: P,
    ) -> Option<Registration>
    where
        P: Fn(&Registration) -> bool,
    {
        let candidates = self.candidates(required_tools).await;
        let mut best: Option<(f64, Registration)> = None;

        // candidates are in registration order, so `>` keeps the first on ties
        for candidate in candidates.into_iter().filter(|c| predicate(c)) {
            let score = score_candidate(&candidate, task, required_tools).total();
            let better = match &best {
                Some((best_score, _)) => score > *best_score,
                None => true,
            };
            if better {
                best = Some((score, candidate));
            }
        }

        match &best {
            Some((score, registration)) => {
                debug!("Routed task to {} (score {:.2})", registration.id(), score)
            }
            None => debug!("No executor available for task"),
        }

        best.map(|(_, registration)| registration)
    }

    /// Scores for every eligible candidate, highest first
    pub async fn rank(&self, task: &str, required_tools: &[String]) -> Vec<CandidateScore> {
        let mut scores: Vec<(u64, CandidateScore)> = self
            .candidates(required_tools)
            .await
            .iter()
            .map(|c| (c.registration_order(), score_candidate(c, task, required_tools)))
            .collect();

        scores.sort_by(|(order_a, a), (order_b, b)| {
            b.total()
                .total_cmp(&a.total())
                .then(order_a.cmp(order_b))
        });
        scores.into_iter().map(|(_, score)| score).collect()
    }

    async fn candidates(&self, required_tools: &[String]) -> Vec<Registration> {
        let threshold = self.registry.config().max_load_threshold;

        self.registry
            .snapshot()
            .await
            .into_iter()
            .filter(|r| {
                r.status == ExecutorStatus::Active
                    && r.current_load <= threshold
                    && required_tools.iter().all(|tool| r.capabilities.has_tool(tool))
            })
            .collect()
    }
}

/// Score one registration for `task`
pub fn score_candidate(registration: &Registration, task: &str, required_tools: &[String]) -> CandidateScore {
    let success_term = registration.success_rate / 100.0 * SUCCESS_WEIGHT;
    let load_term = (100.0 - registration.current_load) / 100.0 * LOAD_WEIGHT;

    let tool_term = if required_tools.is_empty() {
        0.0
    } else {
        let matched = required_tools
            .iter()
            .filter(|tool| registration.capabilities.has_tool(tool))
            .count();
        matched as f64 / required_tools.len() as f64 * TOOL_WEIGHT
    };

    let hits = registration.capabilities.specialization_hits(task);
    let specialization_term = (SPECIALIZATION_POINTS * hits as f64).min(SPECIALIZATION_CAP);

    CandidateScore {
        executor_id: registration.id().clone(),
        success_term,
        load_term,
        tool_term,
        specialization_term,
    }
}
