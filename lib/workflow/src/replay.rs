//! Replay of an engine execution report.
//!
//! The engine runs a whole workflow in one request. Its per-node results
//! are then replayed onto the canvas one node at a time so the user can
//! follow the run. [`ReplayCursor`] is the step function; the caller owns
//! the loop and decides how long to wait between steps through a
//! [`Pacer`].

use crate::engine::{ExecutionReport, NodeResult};
use crate::node::NodeId;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

/// Waits between the running and final state of a replayed node.
#[async_trait]
pub trait Pacer: Send + Sync {
    async fn pause(&self);
}

/// Sleeps for a fixed duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDelay(pub Duration);

impl FixedDelay {
    #[must_use]
    pub const fn from_millis(ms: u64) -> Self {
        Self(Duration::from_millis(ms))
    }
}

#[async_trait]
impl Pacer for FixedDelay {
    async fn pause(&self) {
        if !self.0.is_zero() {
            tokio::time::sleep(self.0).await;
        }
    }
}

/// Never waits. For headless runs and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoDelay;

#[async_trait]
impl Pacer for NoDelay {
    async fn pause(&self) {}
}

/// One transition of a replay.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayStep {
    /// The node should be shown as running.
    Started { node_id: NodeId },
    /// The node should be shown with its final result.
    Finished { node_id: NodeId, result: NodeResult },
}

/// Walks a report, yielding a `Started` then a `Finished` step per node.
#[derive(Debug, Clone)]
pub struct ReplayCursor {
    plan: Vec<(NodeId, NodeResult)>,
    position: usize,
    started: bool,
}

impl ReplayCursor {
    /// Plans a replay of `report`.
    ///
    /// Nodes are taken in the engine's `execution_order`, or in sorted id
    /// order when the engine reported none. Only nodes that appear in both
    /// `known` and the report's results are replayed, each at most once.
    #[must_use]
    pub fn new(report: ExecutionReport, known: &HashSet<NodeId>) -> Self {
        let ExecutionReport {
            mut node_states,
            execution_order,
        } = report;
        let order = execution_order.unwrap_or_else(|| node_states.keys().cloned().collect());

        let mut plan = Vec::with_capacity(order.len());
        for node_id in order {
            if !known.contains(&node_id) {
                tracing::debug!(node_id = %node_id, "Skipping result for unknown node");
                continue;
            }
            // Removing also skips repeats in the order.
            if let Some(result) = node_states.remove(&node_id) {
                plan.push((node_id, result));
            }
        }

        Self {
            plan,
            position: 0,
            started: false,
        }
    }

    /// Node ids in replay order.
    pub fn order(&self) -> impl Iterator<Item = &NodeId> {
        self.plan.iter().map(|(id, _)| id)
    }

    /// Number of nodes not yet finished.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.plan.len() - self.position
    }

    /// True between a node's `Started` and `Finished` steps.
    #[must_use]
    pub fn in_node(&self) -> bool {
        self.started
    }

    /// Advances the replay by one step.
    pub fn next_step(&mut self) -> Option<ReplayStep> {
        let (node_id, result) = self.plan.get(self.position)?;
        if self.started {
            self.started = false;
            self.position += 1;
            Some(ReplayStep::Finished {
                node_id: node_id.clone(),
                result: result.clone(),
            })
        } else {
            self.started = true;
            Some(ReplayStep::Started {
                node_id: node_id.clone(),
            })
        }
    }
}

/// Turns a node output into the text shown to the user.
///
/// Strings are returned as-is. Objects are searched for `response`,
/// `text`, `main.text` and `main.response` in that order. Anything else
/// is pretty-printed.
#[must_use]
pub fn extract_reply(output: &JsonValue) -> String {
    if let JsonValue::String(s) = output {
        return s.clone();
    }

    let candidates = [
        output.get("response"),
        output.get("text"),
        output.get("main").and_then(|m| m.get("text")),
        output.get("main").and_then(|m| m.get("response")),
    ];
    if let Some(found) = candidates.into_iter().flatten().find(|v| !v.is_null()) {
        return match found {
            JsonValue::String(s) => s.clone(),
            other => other.to_string(),
        };
    }

    serde_json::to_string_pretty(output).unwrap_or_else(|_| output.to_string())
}

/// Result lookup by node id, for reply extraction after a replay.
pub(crate) fn output_of<'a>(
    results: &'a BTreeMap<NodeId, NodeResult>,
    node_id: &NodeId,
) -> Option<&'a JsonValue> {
    results
        .get(node_id)
        .and_then(|r| r.output.as_ref())
        .filter(|v| !v.is_null())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeStatus;
    use serde_json::json;

    fn result(status: NodeStatus) -> NodeResult {
        NodeResult {
            status,
            ..NodeResult::default()
        }
    }

    fn report(ids: &[&str], order: Option<&[&str]>) -> ExecutionReport {
        ExecutionReport {
            node_states: ids
                .iter()
                .map(|id| (NodeId::from(*id), result(NodeStatus::Completed)))
                .collect(),
            execution_order: order.map(|o| o.iter().map(|id| NodeId::from(*id)).collect()),
        }
    }

    fn known(ids: &[&str]) -> HashSet<NodeId> {
        ids.iter().map(|id| NodeId::from(*id)).collect()
    }

    fn drain(mut cursor: ReplayCursor) -> Vec<ReplayStep> {
        std::iter::from_fn(|| cursor.next_step()).collect()
    }

    #[test]
    fn follows_execution_order() {
        let cursor = ReplayCursor::new(
            report(&["a", "b", "c"], Some(&["c", "a", "b"])),
            &known(&["a", "b", "c"]),
        );
        let order: Vec<_> = cursor.order().map(NodeId::as_str).collect();
        assert_eq!(order, vec!["c", "a", "b"]);
    }

    #[test]
    fn falls_back_to_sorted_ids() {
        let cursor = ReplayCursor::new(report(&["n2", "n1"], None), &known(&["n1", "n2"]));
        let order: Vec<_> = cursor.order().map(NodeId::as_str).collect();
        assert_eq!(order, vec!["n1", "n2"]);
    }

    #[test]
    fn skips_unknown_and_missing_results() {
        let cursor = ReplayCursor::new(
            report(&["a", "ghost"], Some(&["ghost", "a", "b", "a"])),
            &known(&["a", "b"]),
        );
        let order: Vec<_> = cursor.order().map(NodeId::as_str).collect();
        assert_eq!(order, vec!["a"]);
    }

    #[test]
    fn steps_alternate_started_and_finished() {
        let cursor = ReplayCursor::new(report(&["a", "b"], None), &known(&["a", "b"]));
        let steps = drain(cursor);
        assert_eq!(steps.len(), 4);
        let ids: Vec<(&str, bool)> = steps
            .iter()
            .map(|step| match step {
                ReplayStep::Started { node_id } => (node_id.as_str(), false),
                ReplayStep::Finished { node_id, .. } => (node_id.as_str(), true),
            })
            .collect();
        assert_eq!(ids, vec![("a", false), ("a", true), ("b", false), ("b", true)]);
    }

    #[test]
    fn remaining_counts_unfinished_nodes() {
        let mut cursor = ReplayCursor::new(report(&["a", "b"], None), &known(&["a", "b"]));
        assert_eq!(cursor.remaining(), 2);
        cursor.next_step();
        assert!(cursor.in_node());
        assert_eq!(cursor.remaining(), 2);
        cursor.next_step();
        assert_eq!(cursor.remaining(), 1);
    }

    #[test]
    fn reply_chain() {
        assert_eq!(extract_reply(&json!("plain")), "plain");
        assert_eq!(extract_reply(&json!({"response": "r", "text": "t"})), "r");
        assert_eq!(extract_reply(&json!({"text": "t"})), "t");
        assert_eq!(extract_reply(&json!({"main": {"text": "mt", "response": "mr"}})), "mt");
        assert_eq!(extract_reply(&json!({"main": {"response": "mr"}})), "mr");
        assert_eq!(extract_reply(&json!({"other": 1})), "{\n  \"other\": 1\n}");
    }

    #[tokio::test]
    async fn no_delay_returns_immediately() {
        NoDelay.pause().await;
        FixedDelay::from_millis(0).pause().await;
    }
}
