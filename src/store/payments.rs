use crate::db::new_id;
use crate::errors::{AppError, AppResult};
use crate::ledger::LedgerSummary;
use crate::models::{Payment, RecordPaymentRequest};
use crate::store::attendance::{reconcile_enrollment, summary_for};
use crate::store::scheduling::{enrollments_of_student, find_class, find_enrollment};
use crate::store::users::find_student;
use rusqlite::{params, Connection, Row};
use serde::Serialize;
use tracing::info;

const PAYMENT_COLUMNS: &str = "id, enrollment_id, amount_cents, method, note, recorded_by, paid_at";

fn payment_from_row(row: &Row) -> rusqlite::Result<Payment> {
    Ok(Payment {
        id: row.get(0)?,
        enrollment_id: row.get(1)?,
        amount_cents: row.get(2)?,
        method: row.get(3)?,
        note: row.get(4)?,
        recorded_by: row.get(5)?,
        paid_at: row.get(6)?,
    })
}

#[derive(Debug, Serialize)]
pub struct PaymentReceipt {
    pub payment: Payment,
    pub summary: LedgerSummary,
}

pub fn record_payment(
    conn: &mut Connection,
    req: &RecordPaymentRequest,
    recorded_by: &str,
    now: i64,
) -> AppResult<PaymentReceipt> {
    if req.amount_cents <= 0 {
        return Err(AppError::bad_request("amount_cents must be positive"));
    }

    let tx = conn.transaction()?;
    find_enrollment(&tx, &req.enrollment_id)?;

    let payment = Payment {
        id: new_id(),
        enrollment_id: req.enrollment_id.clone(),
        amount_cents: req.amount_cents,
        method: req.method,
        note: req.note.clone().filter(|n| !n.trim().is_empty()),
        recorded_by: recorded_by.to_string(),
        paid_at: now,
    };
    tx.execute(
        &format!("INSERT INTO payments({PAYMENT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?)"),
        params![
            payment.id,
            payment.enrollment_id,
            payment.amount_cents,
            payment.method,
            payment.note,
            payment.recorded_by,
            payment.paid_at
        ],
    )?;
    let summary = reconcile_enrollment(&tx, &req.enrollment_id, req.amount_cents)?;
    tx.commit()?;

    info!(
        enrollment_id = %payment.enrollment_id,
        amount_cents = payment.amount_cents,
        method = payment.method.as_str(),
        debt_cents = summary.debt_cents,
        "recorded payment"
    );
    Ok(PaymentReceipt { payment, summary })
}

pub fn list_for_enrollment(conn: &Connection, enrollment_id: &str) -> AppResult<Vec<Payment>> {
    find_enrollment(conn, enrollment_id)?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE enrollment_id = ? ORDER BY paid_at DESC, id"
    ))?;
    let rows = stmt.query_map([enrollment_id], payment_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn list_for_student(conn: &Connection, student_id: &str) -> AppResult<Vec<Payment>> {
    let mut stmt = conn.prepare(
        "SELECT p.id, p.enrollment_id, p.amount_cents, p.method, p.note, p.recorded_by, p.paid_at
         FROM payments p JOIN enrollments e ON e.id = p.enrollment_id
         WHERE e.student_id = ?
         ORDER BY p.paid_at DESC, p.id",
    )?;
    let rows = stmt.query_map([student_id], payment_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

#[derive(Debug, Serialize)]
pub struct EnrollmentBalance {
    pub enrollment_id: String,
    pub class_id: String,
    pub class_name: String,
    pub active: bool,
    pub summary: LedgerSummary,
}

#[derive(Debug, Serialize)]
pub struct StudentBalance {
    pub student_id: String,
    pub full_name: String,
    pub enrollments: Vec<EnrollmentBalance>,
    pub total_debt_cents: i64,
    pub total_credit_cents: i64,
}

pub fn student_balance(conn: &Connection, student_id: &str) -> AppResult<StudentBalance> {
    let student = find_student(conn, student_id)?;
    let mut balance = StudentBalance {
        student_id: student.id,
        full_name: student.full_name,
        enrollments: Vec::new(),
        total_debt_cents: 0,
        total_credit_cents: 0,
    };

    for enrollment in enrollments_of_student(conn, student_id)? {
        let class = find_class(conn, &enrollment.class_id)?;
        let summary = summary_for(conn, &enrollment)?;
        balance.total_debt_cents = balance.total_debt_cents.saturating_add(summary.debt_cents);
        balance.total_credit_cents = balance.total_credit_cents.saturating_add(summary.credit_cents);
        balance.enrollments.push(EnrollmentBalance {
            enrollment_id: enrollment.id,
            class_id: class.id,
            class_name: class.name,
            active: enrollment.active,
            summary,
        });
    }
    Ok(balance)
}

#[derive(Debug, Serialize)]
pub struct Debtor {
    pub student_id: String,
    pub full_name: String,
    pub parent_id: String,
    pub debt_cents: i64,
}

/// Students owing money, largest debt first.
pub fn debtors(conn: &Connection) -> AppResult<Vec<Debtor>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT s.id, s.parent_id
         FROM students s
         JOIN enrollments e ON e.student_id = s.id
         JOIN attendance a ON a.enrollment_id = e.id
         WHERE a.paid = 0 AND a.charge_cents > 0",
    )?;
    let candidates = stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut debtors = Vec::new();
    for (student_id, parent_id) in candidates {
        let balance = student_balance(conn, &student_id)?;
        if balance.total_debt_cents > 0 {
            debtors.push(Debtor {
                student_id,
                full_name: balance.full_name,
                parent_id,
                debt_cents: balance.total_debt_cents,
            });
        }
    }
    debtors.sort_by(|a, b| {
        b.debt_cents
            .cmp(&a.debt_cents)
            .then_with(|| a.full_name.cmp(&b.full_name))
    });
    Ok(debtors)
}
