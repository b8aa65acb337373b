//! Executive leaderboard
//!
//! Aggregates a period's allocated cases per executive, keeps only users
//! with the executive role, and produces a total order with dense ranks.
//! The comparator is an explicit composition of ordered tie-break keys so
//! it can be tested independently of the aggregation fold.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::Serialize;

use crate::models::{Case, PerformanceStatus, User, UserRole};

fn rate(part: f64, total: f64) -> f64 {
    if total > 0.0 {
        (part / total) * 100.0
    } else {
        0.0
    }
}

/// One ranked leaderboard entry
#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardRow {
    pub executive_id: i64,
    pub name: String,
    pub emp_id: Option<String>,
    pub total_cases: i64,
    pub total_pos: f64,
    pub count_not_flow: i64,
    pub count_not_flow_rate: f64,
    pub pos_not_flow: f64,
    pub pos_not_flow_rate: f64,
    pub rb_count: i64,
    pub norm_count: i64,
    pub pos_rb: f64,
    pub pos_rb_rate: f64,
    pub pos_norm: f64,
    pub pos_norm_rate: f64,
    pub recovered_amount: f64,
    pub paid_recovered_amount: f64,
    /// Dense rank 1..N, no gaps or shared values
    pub rank: usize,
}

#[derive(Debug, Default)]
struct ExecTotals {
    total_cases: i64,
    total_pos: f64,
    count_not_flow: i64,
    pos_not_flow: f64,
    rb_count: i64,
    norm_count: i64,
    pos_rb: f64,
    pos_norm: f64,
    recovered_amount: f64,
    paid_recovered_amount: f64,
}

/// Ranking order: posNotFlowRate desc, then (posRBRate + posNormRate) desc,
/// then totalPOS desc. Equal keys compare Equal so a stable sort preserves
/// input order across full ties.
pub fn rank_order(a: &LeaderboardRow, b: &LeaderboardRow) -> Ordering {
    b.pos_not_flow_rate
        .total_cmp(&a.pos_not_flow_rate)
        .then_with(|| {
            let a_tie = a.pos_rb_rate + a.pos_norm_rate;
            let b_tie = b.pos_rb_rate + b.pos_norm_rate;
            b_tie.total_cmp(&a_tie)
        })
        .then_with(|| b.total_pos.total_cmp(&a.total_pos))
}

/// Build the ranked leaderboard for a case set already restricted to one
/// period and to cases with a non-null executive.
///
/// Users without the executive role (supervisors/managers who happen to own
/// cases) are excluded from ranking. Pure function, no writes.
pub fn build_leaderboard(cases: &[Case], users: &HashMap<i64, User>) -> Vec<LeaderboardRow> {
    // First-seen order is the stable input order for tie-breaking
    let mut order: Vec<i64> = Vec::new();
    let mut totals: HashMap<i64, ExecTotals> = HashMap::new();

    for case in cases {
        let Some(exec_id) = case.executive_id else {
            continue;
        };

        let entry = totals.entry(exec_id).or_insert_with(|| {
            order.push(exec_id);
            ExecTotals::default()
        });

        let status = PerformanceStatus::parse(case.performance.as_deref());
        let pos = case.pos_amount;
        let collected = case.collection_amount;

        entry.total_cases += 1;
        entry.total_pos += pos;
        entry.recovered_amount += collected;

        if status != Some(PerformanceStatus::Flow) {
            entry.count_not_flow += 1;
            entry.pos_not_flow += pos;
            entry.paid_recovered_amount += collected;
        }
        if status == Some(PerformanceStatus::Rb) {
            entry.rb_count += 1;
            entry.pos_rb += pos;
        }
        if status == Some(PerformanceStatus::Norm) {
            entry.norm_count += 1;
            entry.pos_norm += pos;
        }
    }

    let mut rows: Vec<LeaderboardRow> = order
        .into_iter()
        .filter_map(|exec_id| {
            let user = users.get(&exec_id)?;
            if user.role != UserRole::Executive {
                return None;
            }
            let t = &totals[&exec_id];
            Some(LeaderboardRow {
                executive_id: exec_id,
                name: user.full_name(),
                emp_id: user.emp_id.clone(),
                total_cases: t.total_cases,
                total_pos: t.total_pos,
                count_not_flow: t.count_not_flow,
                count_not_flow_rate: rate(t.count_not_flow as f64, t.total_cases as f64),
                pos_not_flow: t.pos_not_flow,
                pos_not_flow_rate: rate(t.pos_not_flow, t.total_pos),
                rb_count: t.rb_count,
                norm_count: t.norm_count,
                pos_rb: t.pos_rb,
                pos_rb_rate: rate(t.pos_rb, t.total_pos),
                pos_norm: t.pos_norm,
                pos_norm_rate: rate(t.pos_norm, t.total_pos),
                recovered_amount: t.recovered_amount,
                paid_recovered_amount: t.paid_recovered_amount,
                rank: 0,
            })
        })
        .collect();

    rows.sort_by(rank_order);

    for (idx, row) in rows.iter_mut().enumerate() {
        row.rank = idx + 1;
    }

    rows
}
