//! Debt bookkeeping for a single enrollment.
//!
//! Every attended session carries a charge. A session is settled once the
//! enrollment's credit covers its whole charge; whatever cannot cover the next
//! unpaid session stays on the enrollment as credit. Debt is the sum of
//! unpaid charges minus that credit, and is never negative.

use crate::models::{Attendance, AttendanceStatus, BillingMode, BillingTerms};
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CycleProgress {
    pub index: i64,
    pub attended_in_cycle: i64,
    pub sessions_per_cycle: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerSummary {
    pub attended: i64,
    pub unpaid_sessions: i64,
    pub debt_cents: i64,
    pub credit_cents: i64,
    pub total_charged_cents: i64,
    pub settled_cents: i64,
    pub cycle: Option<CycleProgress>,
}

/// Charge for the `position`-th attended session (0-based, date order).
///
/// Monthly fees are split across the cycle with the remainder spread one cent
/// at a time over the first sessions, so a full cycle sums to the fee exactly.
pub fn session_charge(terms: &BillingTerms, position: i64) -> i64 {
    match terms.billing_mode {
        BillingMode::PerSession => terms.session_price_cents.max(0),
        BillingMode::Monthly => {
            let per_cycle = terms.sessions_per_cycle.max(1);
            let fee = terms.monthly_fee_cents.max(0);
            let slot = position.rem_euclid(per_cycle);
            fee / per_cycle + i64::from(slot < fee % per_cycle)
        }
    }
}

/// Recomputes unpaid charges and allocates `credit` oldest-first.
///
/// Paid rows keep their charge and their slot. Unpaid present rows take the
/// lowest free slots in date order, so each slot is billed exactly once and
/// a full cycle always sums to the fee, even when sessions are backdated.
/// Returns the credit left over after allocation.
pub fn reconcile(rows: &mut [Attendance], terms: &BillingTerms, credit: i64) -> i64 {
    rows.sort_by(|a, b| a.session_date.cmp(&b.session_date));

    let settled: BTreeSet<i64> = rows
        .iter()
        .filter(|r| r.paid && r.status == AttendanceStatus::Present)
        .filter_map(|r| r.cycle_slot)
        .collect();

    let mut next_slot = 0i64;
    for row in rows.iter_mut().filter(|r| !r.paid) {
        if row.status != AttendanceStatus::Present {
            row.charge_cents = 0;
            row.cycle_slot = None;
            continue;
        }
        while settled.contains(&next_slot) {
            next_slot += 1;
        }
        row.cycle_slot = Some(next_slot);
        row.charge_cents = session_charge(terms, next_slot);
        next_slot += 1;
    }

    let mut credit = credit.max(0);
    for row in rows
        .iter_mut()
        .filter(|r| r.status == AttendanceStatus::Present && !r.paid)
    {
        if row.charge_cents > credit {
            break;
        }
        credit -= row.charge_cents;
        row.paid = true;
    }

    // Free sessions never wait behind an unpaid one.
    for row in rows
        .iter_mut()
        .filter(|r| r.status == AttendanceStatus::Present && r.charge_cents == 0)
    {
        row.paid = true;
    }
    credit
}

pub fn summarize(rows: &[Attendance], terms: &BillingTerms, credit: i64) -> LedgerSummary {
    let present = rows.iter().filter(|r| r.status == AttendanceStatus::Present);

    let mut summary = LedgerSummary {
        attended: 0,
        unpaid_sessions: 0,
        debt_cents: 0,
        credit_cents: credit.max(0),
        total_charged_cents: 0,
        settled_cents: 0,
        cycle: None,
    };

    let mut unpaid_cents = 0i64;
    for row in present {
        summary.attended += 1;
        summary.total_charged_cents += row.charge_cents;
        if row.paid {
            summary.settled_cents += row.charge_cents;
        } else {
            summary.unpaid_sessions += 1;
            unpaid_cents += row.charge_cents;
        }
    }
    summary.debt_cents = (unpaid_cents - summary.credit_cents).max(0);

    if terms.billing_mode == BillingMode::Monthly {
        let per_cycle = terms.sessions_per_cycle.max(1);
        summary.cycle = Some(if summary.attended == 0 {
            CycleProgress {
                index: 0,
                attended_in_cycle: 0,
                sessions_per_cycle: per_cycle,
            }
        } else {
            CycleProgress {
                index: (summary.attended - 1) / per_cycle,
                attended_in_cycle: (summary.attended - 1) % per_cycle + 1,
                sessions_per_cycle: per_cycle,
            }
        });
    }

    summary
}
