//! Performance aggregation over case sets
//!
//! Pure fold over an already-filtered case set (with feedback history) into
//! a top-level summary plus a bank -> product -> bucket breakdown tree. The
//! tree is a strict partition: every case lands under exactly one bank node,
//! one product node beneath it, and one bucket node beneath that, with
//! missing labels grouped under "UNKNOWN".
//!
//! All ratios guard their denominator: anything computed over an empty set
//! or zero amount is 0, never NaN.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::models::{Case, CaseWithFeedbacks, PerformanceStatus};

/// Label used when a case carries no bank/product/bucket value
const UNKNOWN_LABEL: &str = "UNKNOWN";

/// Percentage with a zero-denominator guard
fn rate(part: f64, total: f64) -> f64 {
    if total > 0.0 {
        (part / total) * 100.0
    } else {
        0.0
    }
}

/// Performance-status case counts for pie charts
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct StatusPie {
    pub flow: i64,
    pub rb: i64,
    pub norm: i64,
    pub stab: i64,
}

/// Fixed-shape accumulator shared by every level of the breakdown tree.
///
/// Built by folding cases in; converted to `LevelMetrics` once the fold is
/// complete.
#[derive(Debug, Clone, Default)]
struct LevelTotals {
    total_cases: i64,
    total_pos: f64,
    pos_not_flow: f64,
    pos_rb: f64,
    pos_norm: f64,
    flow_count: i64,
    rb_count: i64,
    norm_count: i64,
    stab_count: i64,
    resolved_count: i64,
    recovered_amount: f64,
    paid_recovered_amount: f64,
}

impl LevelTotals {
    fn record(&mut self, case: &Case, status: Option<PerformanceStatus>) {
        let pos = case.pos_amount;
        let collected = case.collection_amount;

        self.total_cases += 1;
        self.total_pos += pos;
        self.recovered_amount += collected;

        if status != Some(PerformanceStatus::Flow) {
            self.pos_not_flow += pos;
            self.paid_recovered_amount += collected;
        }

        match status {
            Some(PerformanceStatus::Flow) => self.flow_count += 1,
            Some(PerformanceStatus::Rb) => {
                self.rb_count += 1;
                self.pos_rb += pos;
            }
            Some(PerformanceStatus::Norm) => {
                self.norm_count += 1;
                self.pos_norm += pos;
            }
            Some(PerformanceStatus::Stab) => self.stab_count += 1,
            None => {}
        }

        if case.status.is_resolved() {
            self.resolved_count += 1;
        }
    }

    fn metrics(&self) -> LevelMetrics {
        let count_not_flow = self.rb_count + self.norm_count + self.stab_count;
        LevelMetrics {
            total_cases: self.total_cases,
            total_pos: self.total_pos,
            resolved_count: self.resolved_count,
            flow_count: self.flow_count,
            rb_count: self.rb_count,
            norm_count: self.norm_count,
            stab_count: self.stab_count,
            count_not_flow,
            count_not_flow_rate: rate(count_not_flow as f64, self.total_cases as f64),
            rb_count_rate: rate(self.rb_count as f64, self.total_cases as f64),
            norm_count_rate: rate(self.norm_count as f64, self.total_cases as f64),
            pos_not_flow: self.pos_not_flow,
            pos_not_flow_rate: rate(self.pos_not_flow, self.total_pos),
            pos_rb: self.pos_rb,
            pos_rb_rate: rate(self.pos_rb, self.total_pos),
            pos_norm: self.pos_norm,
            pos_norm_rate: rate(self.pos_norm, self.total_pos),
            recovered_amount: self.recovered_amount,
            paid_recovered_amount: self.paid_recovered_amount,
        }
    }
}

/// Metric set carried by every node of the breakdown tree
#[derive(Debug, Clone, Serialize)]
pub struct LevelMetrics {
    pub total_cases: i64,
    pub total_pos: f64,
    pub resolved_count: i64,
    pub flow_count: i64,
    pub rb_count: i64,
    pub norm_count: i64,
    pub stab_count: i64,
    pub count_not_flow: i64,
    pub count_not_flow_rate: f64,
    pub rb_count_rate: f64,
    pub norm_count_rate: f64,
    pub pos_not_flow: f64,
    pub pos_not_flow_rate: f64,
    pub pos_rb: f64,
    pub pos_rb_rate: f64,
    pub pos_norm: f64,
    pub pos_norm_rate: f64,
    pub recovered_amount: f64,
    pub paid_recovered_amount: f64,
}

/// Bucket-level node of the breakdown tree
#[derive(Debug, Clone, Serialize)]
pub struct BucketBreakdown {
    pub bkt: String,
    #[serde(flatten)]
    pub metrics: LevelMetrics,
}

/// Product-level node of the breakdown tree
#[derive(Debug, Clone, Serialize)]
pub struct ProductBreakdown {
    pub product_name: String,
    #[serde(flatten)]
    pub metrics: LevelMetrics,
    pub bkts: Vec<BucketBreakdown>,
}

/// Bank-level node of the breakdown tree
#[derive(Debug, Clone, Serialize)]
pub struct BankBreakdown {
    pub bank_name: String,
    #[serde(flatten)]
    pub metrics: LevelMetrics,
    pub products: Vec<ProductBreakdown>,
}

/// Full performance report for a filtered case set
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceSummary {
    pub total_cases: i64,
    pub total_pos: f64,
    pub total_banks: i64,
    pub total_products: i64,
    /// Cases with at least one feedback
    pub total_visited_cases: i64,
    /// Feedback count across all cases (multiple visits per case included)
    pub total_visits: i64,
    pub total_recovered_amount: f64,
    /// Recovered amount over non-FLOW cases
    pub paid_recovered_amount: f64,
    pub flow_count: i64,
    pub rb_count: i64,
    pub norm_count: i64,
    pub stab_count: i64,
    /// Status counts as proportions of total case count
    pub flow_count_rate: f64,
    pub rb_count_rate: f64,
    pub norm_count_rate: f64,
    pub stab_count_rate: f64,
    pub total_paid_cases: i64,
    pub visit_rate: f64,
    /// POS over resolved (PAID/CLOSED) cases
    pub recovered_pos: f64,
    pub recovery_rate: f64,
    pub pos_not_flow: f64,
    pub pos_rb: f64,
    pub pos_norm: f64,
    pub pos_not_flow_rate: f64,
    pub pos_rb_rate: f64,
    pub pos_norm_rate: f64,
    pub pie: StatusPie,
    pub bank_breakdown: Vec<BankBreakdown>,
}

#[derive(Debug, Default)]
struct ProductAcc {
    totals: LevelTotals,
    bkts: BTreeMap<String, LevelTotals>,
}

#[derive(Debug, Default)]
struct BankAcc {
    totals: LevelTotals,
    products: BTreeMap<String, ProductAcc>,
}

/// Aggregate a filtered case set into the full performance report.
///
/// Pure function: issues no reads or writes beyond its input.
pub fn aggregate_performance(cases: &[CaseWithFeedbacks]) -> PerformanceSummary {
    let mut top = LevelTotals::default();
    let mut banks: BTreeMap<String, BankAcc> = BTreeMap::new();
    let mut bank_set: BTreeSet<&str> = BTreeSet::new();
    let mut product_set: BTreeSet<&str> = BTreeSet::new();

    let mut visited_cases = 0i64;
    let mut total_visits = 0i64;
    let mut recovered_pos = 0.0f64;

    for entry in cases {
        let case = &entry.case;
        let status = PerformanceStatus::parse(case.performance.as_deref());

        top.record(case, status);

        if !entry.feedbacks.is_empty() {
            visited_cases += 1;
        }
        total_visits += entry.feedbacks.len() as i64;

        if case.status.is_resolved() {
            recovered_pos += case.pos_amount;
        }

        if !case.bank_name.is_empty() {
            bank_set.insert(case.bank_name.as_str());
        }
        if !case.product_type.is_empty() {
            product_set.insert(case.product_type.as_str());
        }

        // Strict partition: exactly one bank / product / bucket node each
        let bank_key = non_empty_or_unknown(&case.bank_name);
        let product_key = non_empty_or_unknown(&case.product_type);
        let bkt_key = non_empty_or_unknown(case.bkt.as_deref().unwrap_or(""));

        let bank = banks.entry(bank_key).or_default();
        bank.totals.record(case, status);

        let product = bank.products.entry(product_key).or_default();
        product.totals.record(case, status);

        product
            .bkts
            .entry(bkt_key)
            .or_default()
            .record(case, status);
    }

    let bank_breakdown = banks
        .into_iter()
        .map(|(bank_name, bank)| BankBreakdown {
            bank_name,
            metrics: bank.totals.metrics(),
            products: bank
                .products
                .into_iter()
                .map(|(product_name, product)| ProductBreakdown {
                    product_name,
                    metrics: product.totals.metrics(),
                    bkts: product
                        .bkts
                        .into_iter()
                        .map(|(bkt, totals)| BucketBreakdown {
                            bkt,
                            metrics: totals.metrics(),
                        })
                        .collect(),
                })
                .collect(),
        })
        .collect();

    PerformanceSummary {
        total_cases: top.total_cases,
        total_pos: top.total_pos,
        total_banks: bank_set.len() as i64,
        total_products: product_set.len() as i64,
        total_visited_cases: visited_cases,
        total_visits,
        total_recovered_amount: top.recovered_amount,
        paid_recovered_amount: top.paid_recovered_amount,
        flow_count: top.flow_count,
        rb_count: top.rb_count,
        norm_count: top.norm_count,
        stab_count: top.stab_count,
        flow_count_rate: rate(top.flow_count as f64, top.total_cases as f64),
        rb_count_rate: rate(top.rb_count as f64, top.total_cases as f64),
        norm_count_rate: rate(top.norm_count as f64, top.total_cases as f64),
        stab_count_rate: rate(top.stab_count as f64, top.total_cases as f64),
        total_paid_cases: top.flow_count + top.rb_count + top.norm_count,
        visit_rate: rate(visited_cases as f64, top.total_cases as f64),
        recovered_pos,
        recovery_rate: rate(recovered_pos, top.total_pos),
        pos_not_flow: top.pos_not_flow,
        pos_rb: top.pos_rb,
        pos_norm: top.pos_norm,
        pos_not_flow_rate: rate(top.pos_not_flow, top.total_pos),
        pos_rb_rate: rate(top.pos_rb, top.total_pos),
        pos_norm_rate: rate(top.pos_norm, top.total_pos),
        pie: StatusPie {
            flow: top.flow_count,
            rb: top.rb_count,
            norm: top.norm_count,
            stab: top.stab_count,
        },
        bank_breakdown,
    }
}

fn non_empty_or_unknown(s: &str) -> String {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        UNKNOWN_LABEL.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Case, CaseStatus, Feedback, FeedbackStatus, UploadMode};
    use chrono::Utc;

    fn case(acc: &str, bank: &str, product: &str, bkt: &str, perf: &str, pos: f64) -> Case {
        Case {
            id: 0,
            acc_id: acc.to_string(),
            cust_id: None,
            customer_name: String::new(),
            phone_number: None,
            address: String::new(),
            pincode: None,
            lat: None,
            lng: None,
            pos_amount: pos,
            overdue_amount: 0.0,
            collection_amount: 0.0,
            toss_amount: 0.0,
            emi_amount: 0.0,
            interest: 0.0,
            dpd: 0,
            bkt: if bkt.is_empty() {
                None
            } else {
                Some(bkt.to_string())
            },
            product_type: product.to_string(),
            sub_product_name: None,
            bank_name: bank.to_string(),
            npa_status: None,
            priority: String::new(),
            performance: if perf.is_empty() {
                None
            } else {
                Some(perf.to_string())
            },
            status: CaseStatus::Open,
            emp_id: None,
            executive_id: None,
            month: 1,
            year: 2025,
            upload_mode: UploadMode::Original,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn with_visits(case: Case, visits: usize) -> CaseWithFeedbacks {
        let feedbacks = (0..visits)
            .map(|i| Feedback {
                id: i as i64,
                case_id: case.id,
                executive_id: None,
                visit_code: "VISITED".to_string(),
                who_met: None,
                relation: None,
                met_name: None,
                meeting_place: None,
                remarks: None,
                photo_url: None,
                lat: None,
                lng: None,
                device_info: None,
                distance_from_address: None,
                ptp_date: None,
                ptp_broken: false,
                is_fake_visit: false,
                fake_visit_reason: None,
                status: FeedbackStatus::Visited,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .collect();
        CaseWithFeedbacks { case, feedbacks }
    }

    #[test]
    fn test_empty_case_set_all_zero() {
        let summary = aggregate_performance(&[]);
        assert_eq!(summary.total_cases, 0);
        assert_eq!(summary.total_pos, 0.0);
        assert_eq!(summary.pos_not_flow_rate, 0.0);
        assert_eq!(summary.visit_rate, 0.0);
        assert_eq!(summary.recovery_rate, 0.0);
        assert!(summary.bank_breakdown.is_empty());
    }

    #[test]
    fn test_pos_rates_scenario() {
        // One FLOW case at 1000, one RB case at 500:
        // posNotFlow = 500, posNotFlowRate = 33.33%, posRB = 500
        let cases = vec![
            with_visits(case("A1", "HDFC", "PL", "X1", "FLOW", 1000.0), 0),
            with_visits(case("A2", "HDFC", "PL", "X1", "RB", 500.0), 0),
        ];
        let summary = aggregate_performance(&cases);

        assert_eq!(summary.total_pos, 1500.0);
        assert_eq!(summary.pos_not_flow, 500.0);
        assert!((summary.pos_not_flow_rate - 33.333333333333336).abs() < 1e-9);
        assert_eq!(summary.pos_rb, 500.0);
        assert!((summary.pos_rb_rate - 33.333333333333336).abs() < 1e-9);
        assert_eq!(summary.flow_count, 1);
        assert_eq!(summary.rb_count, 1);
    }

    #[test]
    fn test_status_counts_bounded_by_total() {
        let cases = vec![
            with_visits(case("A1", "B", "P", "K", "FLOW", 1.0), 0),
            with_visits(case("A2", "B", "P", "K", "RB", 1.0), 0),
            with_visits(case("A3", "B", "P", "K", "NORM", 1.0), 0),
            with_visits(case("A4", "B", "P", "K", "STAB", 1.0), 0),
            with_visits(case("A5", "B", "P", "K", "WEIRD", 1.0), 0),
            with_visits(case("A6", "B", "P", "K", "", 1.0), 0),
        ];
        let summary = aggregate_performance(&cases);

        let counted =
            summary.flow_count + summary.rb_count + summary.norm_count + summary.stab_count;
        assert_eq!(counted, 4);
        assert!(counted <= summary.total_cases);
        assert_eq!(summary.total_cases, 6);
        // Count proportions are taken over the whole case set
        assert!((summary.flow_count_rate - 100.0 / 6.0).abs() < 1e-9);
        assert!((summary.stab_count_rate - 100.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_status_counts_exhaustive_when_all_recognized() {
        let cases = vec![
            with_visits(case("A1", "B", "P", "K", "FLOW", 1.0), 0),
            with_visits(case("A2", "B", "P", "K", " rb ", 1.0), 0),
            with_visits(case("A3", "B", "P", "K", "stab", 1.0), 0),
        ];
        let summary = aggregate_performance(&cases);
        let counted =
            summary.flow_count + summary.rb_count + summary.norm_count + summary.stab_count;
        assert_eq!(counted, summary.total_cases);
    }

    #[test]
    fn test_strict_partition_invariant() {
        let cases = vec![
            with_visits(case("A1", "HDFC", "PL", "X1", "FLOW", 100.0), 0),
            with_visits(case("A2", "HDFC", "PL", "X2", "RB", 200.0), 0),
            with_visits(case("A3", "HDFC", "GL", "X1", "NORM", 300.0), 0),
            with_visits(case("A4", "ICICI", "PL", "X1", "STAB", 400.0), 0),
            with_visits(case("A5", "", "", "", "", 500.0), 0),
        ];
        let summary = aggregate_performance(&cases);

        // Bank level partitions the case set
        let bank_total: i64 = summary
            .bank_breakdown
            .iter()
            .map(|b| b.metrics.total_cases)
            .sum();
        assert_eq!(bank_total, summary.total_cases);

        let bank_pos: f64 = summary
            .bank_breakdown
            .iter()
            .map(|b| b.metrics.total_pos)
            .sum();
        assert_eq!(bank_pos, summary.total_pos);

        // Product level partitions each bank; bucket level each product
        for bank in &summary.bank_breakdown {
            let product_total: i64 = bank.products.iter().map(|p| p.metrics.total_cases).sum();
            assert_eq!(product_total, bank.metrics.total_cases);

            for product in &bank.products {
                let bkt_total: i64 = product.bkts.iter().map(|b| b.metrics.total_cases).sum();
                assert_eq!(bkt_total, product.metrics.total_cases);
            }
        }

        // Missing labels land under UNKNOWN at every level
        let unknown_bank = summary
            .bank_breakdown
            .iter()
            .find(|b| b.bank_name == "UNKNOWN")
            .expect("unknown bank node");
        assert_eq!(unknown_bank.metrics.total_cases, 1);
        assert_eq!(unknown_bank.products[0].product_name, "UNKNOWN");
        assert_eq!(unknown_bank.products[0].bkts[0].bkt, "UNKNOWN");
    }

    #[test]
    fn test_visit_metrics() {
        let cases = vec![
            with_visits(case("A1", "B", "P", "K", "FLOW", 100.0), 2),
            with_visits(case("A2", "B", "P", "K", "RB", 100.0), 1),
            with_visits(case("A3", "B", "P", "K", "RB", 100.0), 0),
        ];
        let summary = aggregate_performance(&cases);

        assert_eq!(summary.total_visited_cases, 2);
        assert_eq!(summary.total_visits, 3);
        assert!((summary.visit_rate - 66.66666666666667).abs() < 1e-9);
    }

    #[test]
    fn test_recovered_amounts() {
        let mut resolved = case("A1", "B", "P", "K", "RB", 1000.0);
        resolved.status = CaseStatus::Paid;
        resolved.collection_amount = 400.0;

        let mut flow = case("A2", "B", "P", "K", "FLOW", 500.0);
        flow.collection_amount = 100.0;

        let cases = vec![with_visits(resolved, 0), with_visits(flow, 0)];
        let summary = aggregate_performance(&cases);

        assert_eq!(summary.total_recovered_amount, 500.0);
        // Non-FLOW recovered amount excludes the FLOW case
        assert_eq!(summary.paid_recovered_amount, 400.0);
        assert_eq!(summary.recovered_pos, 1000.0);
        assert!((summary.recovery_rate - 66.66666666666667).abs() < 1e-9);

        let bank = &summary.bank_breakdown[0];
        assert_eq!(bank.metrics.recovered_amount, 500.0);
        assert_eq!(bank.metrics.paid_recovered_amount, 400.0);
        assert_eq!(bank.metrics.resolved_count, 1);
    }

    #[test]
    fn test_distinct_bank_product_counts() {
        let cases = vec![
            with_visits(case("A1", "HDFC", "PL", "K", "", 1.0), 0),
            with_visits(case("A2", "HDFC", "GL", "K", "", 1.0), 0),
            with_visits(case("A3", "ICICI", "PL", "K", "", 1.0), 0),
            with_visits(case("A4", "", "", "K", "", 1.0), 0),
        ];
        let summary = aggregate_performance(&cases);
        assert_eq!(summary.total_banks, 2);
        assert_eq!(summary.total_products, 2);
    }

    #[test]
    fn test_zero_pos_rates_are_zero() {
        let cases = vec![
            with_visits(case("A1", "B", "P", "K", "RB", 0.0), 0),
            with_visits(case("A2", "B", "P", "K", "NORM", 0.0), 0),
        ];
        let summary = aggregate_performance(&cases);
        assert_eq!(summary.pos_not_flow_rate, 0.0);
        assert_eq!(summary.pos_rb_rate, 0.0);
        assert_eq!(summary.pos_norm_rate, 0.0);
        assert_eq!(summary.bank_breakdown[0].metrics.pos_not_flow_rate, 0.0);
    }
}
