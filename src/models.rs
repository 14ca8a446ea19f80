use serde::{Deserialize, Serialize};

macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }

            pub fn parse(value: &str) -> Option<Self> {
                match value {
                    $($text => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl rusqlite::types::ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                Ok(self.as_str().into())
            }
        }

        impl rusqlite::types::FromSql for $name {
            fn column_result(value: rusqlite::types::ValueRef<'_>) -> rusqlite::types::FromSqlResult<Self> {
                let text = value.as_str()?;
                Self::parse(text).ok_or_else(|| {
                    rusqlite::types::FromSqlError::Other(
                        format!("unexpected {} value: {text}", stringify!($name)).into(),
                    )
                })
            }
        }
    };
}

text_enum!(Role {
    Admin => "admin",
    Teacher => "teacher",
    Parent => "parent",
    Student => "student",
});

impl Role {
    pub fn is_staff(self) -> bool {
        matches!(self, Role::Admin | Role::Teacher)
    }
}

text_enum!(Client {
    Web => "web",
    Mobile => "mobile",
});

text_enum!(BillingMode {
    PerSession => "per_session",
    Monthly => "monthly",
});

text_enum!(AttendanceStatus {
    Present => "present",
    Absent => "absent",
    Excused => "excused",
});

text_enum!(AttendanceSource {
    Manual => "manual",
    Qr => "qr",
});

text_enum!(PaymentMethod {
    Cash => "cash",
    Card => "card",
    Transfer => "transfer",
});

text_enum!(MessageStatus {
    New => "new",
    Handled => "handled",
});

text_enum!(NotificationKind {
    General => "general",
    Payment => "payment",
    Attendance => "attendance",
});

text_enum!(Platform {
    Android => "android",
    Ios => "ios",
    Web => "web",
});

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub active: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Parent {
    pub id: String,
    pub user_id: String,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Student {
    pub id: String,
    pub parent_id: String,
    pub user_id: Option<String>,
    pub full_name: String,
    pub birth_date: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Serialize)]
pub struct ParentDetail {
    #[serde(flatten)]
    pub parent: Parent,
    pub students: Vec<Student>,
}

/// Billing terms, copied onto each enrollment so later course edits do not
/// reprice sessions already taught.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingTerms {
    pub billing_mode: BillingMode,
    #[serde(default)]
    pub session_price_cents: i64,
    #[serde(default)]
    pub monthly_fee_cents: i64,
    #[serde(default = "default_sessions_per_cycle")]
    pub sessions_per_cycle: i64,
}

fn default_sessions_per_cycle() -> i64 {
    1
}

#[derive(Debug, Clone, Serialize)]
pub struct Course {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(flatten)]
    pub terms: BillingTerms,
}

#[derive(Debug, Clone, Serialize)]
pub struct Class {
    pub id: String,
    pub course_id: String,
    pub course_name: String,
    pub teacher_id: String,
    pub teacher_name: String,
    pub name: String,
    pub weekday: u8,
    pub start_time: String,
    pub duration_minutes: i64,
    pub room: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Enrollment {
    pub id: String,
    pub student_id: String,
    pub class_id: String,
    #[serde(flatten)]
    pub terms: BillingTerms,
    pub credit_cents: i64,
    pub active: bool,
    pub enrolled_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Attendance {
    pub id: String,
    pub enrollment_id: String,
    pub session_date: String,
    pub status: AttendanceStatus,
    pub charge_cents: i64,
    pub paid: bool,
    pub source: AttendanceSource,
    pub recorded_by: String,
    pub recorded_at: i64,
    /// Billing slot of a present session; fixed once the session is paid.
    pub cycle_slot: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Payment {
    pub id: String,
    pub enrollment_id: String,
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub note: Option<String>,
    pub recorded_by: String,
    pub paid_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContactMessage {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub subject: String,
    pub body: String,
    pub status: MessageStatus,
    pub created_at: i64,
    pub handled_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub body: String,
    pub kind: NotificationKind,
    pub read: bool,
    pub created_at: i64,
}

// Requests

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct MobileLoginRequest {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct NewStudent {
    pub full_name: String,
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterParentRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub students: Vec<NewStudent>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub active: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateCourseRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(flatten)]
    pub terms: BillingTerms,
}

#[derive(Debug, Deserialize)]
pub struct CreateClassRequest {
    pub course_id: String,
    pub teacher_id: String,
    pub name: String,
    pub weekday: u8,
    pub start_time: String,
    pub duration_minutes: i64,
    #[serde(default)]
    pub room: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EnrollRequest {
    pub student_id: String,
    pub class_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RecordAttendanceRequest {
    pub enrollment_id: String,
    #[serde(default)]
    pub session_date: Option<String>,
    pub status: AttendanceStatus,
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub payload: String,
    pub class_id: String,
    #[serde(default)]
    pub session_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAttendanceRequest {
    pub status: AttendanceStatus,
}

#[derive(Debug, Deserialize)]
pub struct RecordPaymentRequest {
    pub enrollment_id: String,
    pub amount_cents: i64,
    pub method: PaymentMethod,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ContactRequest {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct SendNotificationRequest {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterDeviceRequest {
    pub token: String,
    pub platform: Platform,
}

// Responses

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: i64,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct QrResponse {
    pub student_id: String,
    pub payload: String,
}
