use crate::errors::AppResult;
use crate::ledger::LedgerSummary;
use crate::models::{Attendance, Payment, Student, User};
use crate::store::{attendance, messages, payments, scheduling, users};
use rusqlite::Connection;
use serde::Serialize;

const RECENT_ATTENDANCE: usize = 10;

#[derive(Debug, Serialize)]
pub struct EnrollmentCard {
    pub enrollment_id: String,
    pub class_id: String,
    pub class_name: String,
    pub course_name: String,
    pub teacher_name: String,
    pub weekday: u8,
    pub start_time: String,
    pub duration_minutes: i64,
    pub room: Option<String>,
    pub ledger: LedgerSummary,
    pub recent_attendance: Vec<Attendance>,
}

#[derive(Debug, Serialize)]
pub struct StudentCard {
    pub student: Student,
    pub enrollments: Vec<EnrollmentCard>,
    pub total_debt_cents: i64,
    pub total_credit_cents: i64,
}

#[derive(Debug, Serialize)]
pub struct Dashboard {
    pub user: User,
    pub students: Vec<StudentCard>,
    pub total_debt_cents: i64,
    pub unread_notifications: i64,
}

fn student_card(conn: &Connection, student: Student) -> AppResult<StudentCard> {
    let mut card = StudentCard {
        student,
        enrollments: Vec::new(),
        total_debt_cents: 0,
        total_credit_cents: 0,
    };

    for enrollment in scheduling::enrollments_of_student(conn, &card.student.id)? {
        if !enrollment.active {
            continue;
        }
        let class = scheduling::find_class(conn, &enrollment.class_id)?;
        let ledger = attendance::summary_for(conn, &enrollment)?;
        card.total_debt_cents += ledger.debt_cents;
        card.total_credit_cents += ledger.credit_cents;
        card.enrollments.push(EnrollmentCard {
            recent_attendance: attendance::recent_for_enrollment(conn, &enrollment.id, RECENT_ATTENDANCE)?,
            enrollment_id: enrollment.id,
            class_id: class.id,
            class_name: class.name,
            course_name: class.course_name,
            teacher_name: class.teacher_name,
            weekday: class.weekday,
            start_time: class.start_time,
            duration_minutes: class.duration_minutes,
            room: class.room,
            ledger,
        });
    }
    Ok(card)
}

/// Parents get a card per child, students get their own card.
pub fn build_dashboard(conn: &Connection, user: &User) -> AppResult<Dashboard> {
    let mut students = Vec::new();
    for student in users::students_for_account(conn, user)? {
        students.push(student_card(conn, student)?);
    }

    Ok(Dashboard {
        total_debt_cents: students.iter().map(|c| c.total_debt_cents).sum(),
        unread_notifications: messages::unread_count(conn, &user.id)?,
        user: user.clone(),
        students,
    })
}

#[derive(Debug, Serialize)]
pub struct PaymentEntry {
    pub student_id: String,
    pub student_name: String,
    #[serde(flatten)]
    pub payment: Payment,
}

/// Payment history across every student the caller may act for, newest first.
pub fn payment_history(conn: &Connection, user: &User) -> AppResult<Vec<PaymentEntry>> {
    let mut entries = Vec::new();
    for student in users::students_for_account(conn, user)? {
        for payment in payments::list_for_student(conn, &student.id)? {
            entries.push(PaymentEntry {
                student_id: student.id.clone(),
                student_name: student.full_name.clone(),
                payment,
            });
        }
    }
    entries.sort_by(|a, b| {
        b.payment
            .paid_at
            .cmp(&a.payment.paid_at)
            .then_with(|| a.payment.id.cmp(&b.payment.id))
    });
    Ok(entries)
}
