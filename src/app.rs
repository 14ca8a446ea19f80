use crate::handlers::{
    self, attendance, auth, classes, contact, mobile, notifications, payments, people,
};
use crate::state::AppState;
use axum::{
    routing::{delete, get, patch, post},
    Router,
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        // sign-in
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/password", post(auth::change_password))
        .route("/api/mobile/login", post(auth::mobile_login))
        // people
        .route("/api/register/parent", post(people::register_parent))
        .route("/api/users", get(people::list_users).post(people::create_user))
        .route("/api/users/:id/active", patch(people::set_user_active))
        .route("/api/parents", get(people::list_parents))
        .route("/api/parents/:id", get(people::get_parent))
        .route("/api/parents/:id/students", post(people::add_student))
        .route("/api/students", get(people::list_students))
        .route("/api/students/:id", get(people::get_student))
        .route("/api/students/:id/qr", get(people::student_qr))
        .route("/api/students/:id/balance", get(payments::student_balance))
        // scheduling
        .route("/api/courses", get(classes::list_courses).post(classes::create_course))
        .route("/api/classes", get(classes::list_classes).post(classes::create_class))
        .route("/api/classes/:id/roster", get(classes::roster))
        .route("/api/schedule", get(classes::schedule))
        .route("/api/enrollments", post(classes::enroll))
        .route("/api/enrollments/:id", delete(classes::unenroll))
        .route("/api/enrollments/:id/attendance", get(attendance::list_for_enrollment))
        .route("/api/enrollments/:id/payments", get(payments::list_for_enrollment))
        // attendance and money
        .route("/api/attendance", post(attendance::record))
        .route("/api/attendance/scan", post(attendance::scan))
        .route("/api/attendance/:id", patch(attendance::update))
        .route("/api/payments", post(payments::record))
        .route("/api/debts", get(payments::debts))
        // messages
        .route("/api/contact", get(contact::list).post(contact::submit))
        .route("/api/contact/:id/handle", post(contact::handle))
        .route(
            "/api/notifications",
            get(notifications::list).post(notifications::send),
        )
        .route("/api/notifications/:id/read", post(notifications::mark_read))
        .route("/api/devices", post(notifications::register_device))
        // mobile app
        .route("/api/mobile/dashboard", get(mobile::dashboard))
        .route("/api/mobile/payments", get(mobile::payments))
        .with_state(state)
}
