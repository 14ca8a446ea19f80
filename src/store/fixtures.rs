//! Shared setup for store tests: one admin, one teacher, a per-session course
//! with a class, and a parent with one child.

use crate::db::open_in_memory;
use crate::models::{
    BillingMode, BillingTerms, CreateClassRequest, CreateCourseRequest, NewStudent,
    RegisterParentRequest, Role,
};
use crate::store::{scheduling, users};
use chrono::NaiveDate;
use rusqlite::Connection;

pub struct Academy {
    pub conn: Connection,
    pub admin_id: String,
    pub teacher_id: String,
    pub course_id: String,
    pub class_id: String,
    pub parent_id: String,
    pub parent_user_id: String,
    pub student_id: String,
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

impl Academy {
    pub fn new() -> Self {
        let mut conn = open_in_memory().unwrap();
        let admin = users::insert_user(&conn, "admin@academy.test", "admin-pass", "Ada Admin", None, Role::Admin, 0)
            .unwrap();
        let teacher = users::insert_user(
            &conn,
            "teacher@academy.test",
            "teacher-pass",
            "Tom Teacher",
            None,
            Role::Teacher,
            0,
        )
        .unwrap();
        let course = scheduling::create_course(
            &conn,
            &CreateCourseRequest {
                name: "Algebra".to_string(),
                description: None,
                terms: BillingTerms {
                    billing_mode: BillingMode::PerSession,
                    session_price_cents: 2500,
                    monthly_fee_cents: 0,
                    sessions_per_cycle: 1,
                },
            },
        )
        .unwrap();
        let class = scheduling::create_class(
            &conn,
            &CreateClassRequest {
                course_id: course.id.clone(),
                teacher_id: teacher.id.clone(),
                name: "Algebra A".to_string(),
                weekday: 0,
                start_time: "17:00".to_string(),
                duration_minutes: 90,
                room: Some("Room 2".to_string()),
            },
        )
        .unwrap();
        let family = users::register_parent(
            &mut conn,
            &RegisterParentRequest {
                email: "parent@academy.test".to_string(),
                password: "parent-pass".to_string(),
                full_name: "Pia Parent".to_string(),
                phone: Some("+15550199".to_string()),
                address: None,
                students: vec![NewStudent {
                    full_name: "Kit Kid".to_string(),
                    birth_date: None,
                    email: None,
                    password: None,
                }],
            },
            0,
        )
        .unwrap();

        Self {
            admin_id: admin.id,
            teacher_id: teacher.id,
            course_id: course.id,
            class_id: class.id,
            parent_id: family.parent.id,
            parent_user_id: family.parent.user_id,
            student_id: family.students[0].id.clone(),
            conn,
        }
    }

    pub fn enroll(&self) -> String {
        scheduling::enroll(&self.conn, &self.student_id, &self.class_id, 0)
            .unwrap()
            .id
    }

    /// Enrolls the student in a fresh course and class billed with `terms`.
    pub fn enroll_with_terms(&self, course_name: &str, terms: BillingTerms) -> String {
        let course = scheduling::create_course(
            &self.conn,
            &CreateCourseRequest {
                name: course_name.to_string(),
                description: None,
                terms,
            },
        )
        .unwrap();
        let class = scheduling::create_class(
            &self.conn,
            &CreateClassRequest {
                course_id: course.id,
                teacher_id: self.teacher_id.clone(),
                name: format!("{course_name} A"),
                weekday: 3,
                start_time: "16:00".to_string(),
                duration_minutes: 60,
                room: None,
            },
        )
        .unwrap();
        scheduling::enroll(&self.conn, &self.student_id, &class.id, 0)
            .unwrap()
            .id
    }
}
