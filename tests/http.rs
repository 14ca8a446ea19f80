use once_cell::sync::Lazy;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::TcpListener;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;

const ADMIN_EMAIL: &str = "root@academy.test";
const ADMIN_PASSWORD: &str = "root-password";
const QR_SECRET: &str = "http-test-secret";

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
    user: LoginUser,
}

#[derive(Debug, Deserialize)]
struct LoginUser {
    id: String,
    role: String,
}

struct TestServer {
    base_url: String,
    child: Child,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

static SERVER: Lazy<Mutex<Option<Arc<TestServer>>>> = Lazy::new(|| Mutex::new(None));

#[cfg(unix)]
mod cleanup {
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Once;

    static REGISTER: Once = Once::new();
    static PID: AtomicI32 = AtomicI32::new(0);

    pub fn register(pid: u32) {
        REGISTER.call_once(|| {
            PID.store(pid as i32, Ordering::SeqCst);
            unsafe {
                libc::atexit(on_exit);
            }
        });
    }

    extern "C" fn on_exit() {
        let pid = PID.load(Ordering::SeqCst);
        if pid > 0 {
            unsafe {
                libc::kill(pid, libc::SIGTERM);
            }
        }
    }
}

fn pick_free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind random port");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

fn unique_suffix() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{}_{}", std::process::id(), nanos)
}

fn unique_db_path() -> String {
    let mut path = std::env::temp_dir();
    path.push(format!("academy_api_http_{}.sqlite3", unique_suffix()));
    path.to_string_lossy().to_string()
}

async fn wait_until_ready(base_url: &str) {
    let client = Client::new();
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if let Ok(resp) = client.get(format!("{base_url}/api/health")).send().await {
            if resp.status().is_success() {
                return;
            }
        }
        if Instant::now() > deadline {
            panic!("server did not become ready");
        }
        sleep(Duration::from_millis(100)).await;
    }
}

async fn spawn_server() -> TestServer {
    let port = pick_free_port();
    let child = Command::new(env!("CARGO_BIN_EXE_academy_api"))
        .env("PORT", port.to_string())
        .env("APP_DB_PATH", unique_db_path())
        .env("APP_ADMIN_EMAIL", ADMIN_EMAIL)
        .env("APP_ADMIN_PASSWORD", ADMIN_PASSWORD)
        .env("APP_QR_SECRET", QR_SECRET)
        .env("RUST_LOG", "info")
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .expect("failed to spawn server");

    #[cfg(unix)]
    cleanup::register(child.id());

    let base_url = format!("http://127.0.0.1:{port}");
    wait_until_ready(&base_url).await;

    TestServer { base_url, child }
}

async fn shared_server() -> Arc<TestServer> {
    let mut guard = SERVER.lock().await;
    if let Some(server) = guard.as_ref() {
        return Arc::clone(server);
    }
    let server = Arc::new(spawn_server().await);
    *guard = Some(Arc::clone(&server));
    server
}

struct Api {
    client: Client,
    base_url: String,
}

impl Api {
    async fn new() -> Self {
        let server = shared_server().await;
        Self {
            client: Client::new(),
            base_url: server.base_url.clone(),
        }
    }

    async fn get(&self, path: &str, token: Option<&str>) -> Response {
        let mut req = self.client.get(format!("{}{path}", self.base_url));
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        req.send().await.unwrap()
    }

    async fn post(&self, path: &str, token: Option<&str>, body: Value) -> Response {
        let mut req = self.client.post(format!("{}{path}", self.base_url)).json(&body);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        req.send().await.unwrap()
    }

    async fn patch(&self, path: &str, token: Option<&str>, body: Value) -> Response {
        let mut req = self.client.patch(format!("{}{path}", self.base_url)).json(&body);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        req.send().await.unwrap()
    }

    async fn create_teacher(&self, admin: &str, email: &str) -> Value {
        let resp = self
            .post(
                "/api/users",
                Some(admin),
                json!({
                    "email": email,
                    "password": "teacher-password",
                    "full_name": "Tai Teacher",
                    "role": "teacher"
                }),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        resp.json().await.unwrap()
    }

    async fn web_login(&self, email: &str, password: &str) -> LoginResponse {
        let resp = self
            .post("/api/auth/login", None, json!({ "email": email, "password": password }))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        resp.json().await.unwrap()
    }

    async fn mobile_login(&self, login: &str, password: &str) -> LoginResponse {
        let resp = self
            .post("/api/mobile/login", None, json!({ "login": login, "password": password }))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        resp.json().await.unwrap()
    }

    async fn admin_token(&self) -> String {
        self.web_login(ADMIN_EMAIL, ADMIN_PASSWORD).await.token
    }

    async fn register_family(&self, suffix: &str) -> Value {
        let resp = self
            .post(
                "/api/register/parent",
                None,
                json!({
                    "email": format!("parent_{suffix}@academy.test"),
                    "password": "family-password",
                    "full_name": "Rae Parent",
                    "phone": format!("+1555{suffix}"),
                    "students": [{ "full_name": "Lee Kid", "birth_date": "2015-09-01" }]
                }),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        resp.json().await.unwrap()
    }
}

#[tokio::test]
async fn http_parent_registration_and_client_rules() {
    let api = Api::new().await;
    let suffix = unique_suffix();
    let family = api.register_family(&suffix).await;
    assert_eq!(family["students"].as_array().unwrap().len(), 1);

    let email = format!("parent_{suffix}@academy.test");
    let session = api.mobile_login(&email, "family-password").await;
    assert_eq!(session.user.role, "parent");

    let web = api
        .post("/api/auth/login", None, json!({ "email": email, "password": "family-password" }))
        .await;
    assert_eq!(web.status(), StatusCode::FORBIDDEN);

    let wrong = api
        .post("/api/mobile/login", None, json!({ "login": email, "password": "nope-nope" }))
        .await;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let duplicate = api
        .post(
            "/api/register/parent",
            None,
            json!({ "email": email, "password": "family-password", "full_name": "Again" }),
        )
        .await;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let me: Value = api
        .get("/api/auth/me", Some(&session.token))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(me["id"], session.user.id.as_str());

    let forbidden = api.get("/api/debts", Some(&session.token)).await;
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    let logout = api.post("/api/auth/logout", Some(&session.token), json!({})).await;
    assert_eq!(logout.status(), StatusCode::NO_CONTENT);
    let after = api.get("/api/auth/me", Some(&session.token)).await;
    assert_eq!(after.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn http_attendance_scan_and_payment_settle_debt() {
    let api = Api::new().await;
    let suffix = unique_suffix();
    let admin = api.admin_token().await;

    let teacher_email = format!("teacher_{suffix}@academy.test");
    let teacher = api.create_teacher(&admin, &teacher_email).await;

    let course: Value = api
        .post(
            "/api/courses",
            Some(&admin),
            json!({
                "name": format!("Physics {suffix}"),
                "billing_mode": "monthly",
                "monthly_fee_cents": 12000,
                "sessions_per_cycle": 4
            }),
        )
        .await
        .json()
        .await
        .unwrap();

    let class_resp = api
        .post(
            "/api/classes",
            Some(&admin),
            json!({
                "course_id": course["id"],
                "teacher_id": teacher["id"],
                "name": format!("Physics A {suffix}"),
                "weekday": 2,
                "start_time": "17:30",
                "duration_minutes": 90
            }),
        )
        .await;
    assert_eq!(class_resp.status(), StatusCode::CREATED);
    let class: Value = class_resp.json().await.unwrap();

    let family = api.register_family(&suffix).await;
    let student_id = family["students"][0]["id"].as_str().unwrap().to_string();

    let enrollment: Value = api
        .post(
            "/api/enrollments",
            Some(&admin),
            json!({ "student_id": student_id, "class_id": class["id"] }),
        )
        .await
        .json()
        .await
        .unwrap();
    let enrollment_id = enrollment["id"].as_str().unwrap().to_string();

    let qr: Value = api
        .get(&format!("/api/students/{student_id}/qr"), Some(&admin))
        .await
        .json()
        .await
        .unwrap();
    let payload = qr["payload"].as_str().unwrap().to_string();

    let teacher_token = api.web_login(&teacher_email, "teacher-password").await.token;
    let scan = api
        .post(
            "/api/attendance/scan",
            Some(&teacher_token),
            json!({ "payload": payload, "class_id": class["id"], "session_date": "2026-09-02" }),
        )
        .await;
    assert_eq!(scan.status(), StatusCode::CREATED);
    let scanned: Value = scan.json().await.unwrap();
    assert_eq!(scanned["attendance"]["charge_cents"], 3000);
    assert_eq!(scanned["ledger"]["debt_cents"], 3000);
    assert_eq!(scanned["ledger"]["cycle"]["attended_in_cycle"], 1);

    let again = api
        .post(
            "/api/attendance/scan",
            Some(&teacher_token),
            json!({ "payload": payload, "class_id": class["id"], "session_date": "2026-09-02" }),
        )
        .await;
    assert_eq!(again.status(), StatusCode::CONFLICT);

    let forged = api
        .post(
            "/api/attendance/scan",
            Some(&teacher_token),
            json!({ "payload": format!("ACAD1.{student_id}.0000000000000000"), "class_id": class["id"] }),
        )
        .await;
    assert_eq!(forged.status(), StatusCode::BAD_REQUEST);

    let parent = api
        .mobile_login(&format!("parent_{suffix}@academy.test"), "family-password")
        .await;
    let dashboard: Value = api
        .get("/api/mobile/dashboard", Some(&parent.token))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(dashboard["total_debt_cents"], 3000);
    assert_eq!(dashboard["unread_notifications"], 1);

    let payment = api
        .post(
            "/api/payments",
            Some(&admin),
            json!({ "enrollment_id": enrollment_id, "amount_cents": 5000, "method": "cash" }),
        )
        .await;
    assert_eq!(payment.status(), StatusCode::CREATED);
    let receipt: Value = payment.json().await.unwrap();
    assert_eq!(receipt["summary"]["debt_cents"], 0);
    assert_eq!(receipt["summary"]["credit_cents"], 2000);

    let balance: Value = api
        .get(&format!("/api/students/{student_id}/balance"), Some(&parent.token))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(balance["total_debt_cents"], 0);
    assert_eq!(balance["total_credit_cents"], 2000);

    let history: Value = api
        .get("/api/mobile/payments", Some(&parent.token))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(history[0]["amount_cents"], 5000);

    let inbox: Value = api
        .get("/api/notifications?unread=true", Some(&parent.token))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(inbox.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn http_contact_messages_need_admin_to_read() {
    let api = Api::new().await;
    let suffix = unique_suffix();

    let submitted = api
        .post(
            "/api/contact",
            None,
            json!({
                "name": "Curious Visitor",
                "email": "visitor@example.test",
                "subject": format!("Question {suffix}"),
                "body": "Do you offer weekend classes?"
            }),
        )
        .await;
    assert_eq!(submitted.status(), StatusCode::CREATED);
    let message: Value = submitted.json().await.unwrap();

    let anonymous = api.get("/api/contact", None).await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let admin = api.admin_token().await;
    let handled = api
        .post(&format!("/api/contact/{}/handle", message["id"].as_str().unwrap()), Some(&admin), json!({}))
        .await;
    assert_eq!(handled.status(), StatusCode::OK);
    let handled: Value = handled.json().await.unwrap();
    assert_eq!(handled["status"], "handled");

    let open: Value = api
        .get("/api/contact?status=new", Some(&admin))
        .await
        .json()
        .await
        .unwrap();
    assert!(open
        .as_array()
        .unwrap()
        .iter()
        .all(|m| m["id"] != message["id"]));
}

#[tokio::test]
async fn http_rejects_bad_input() {
    let api = Api::new().await;

    let missing_token = api.get("/api/students", None).await;
    assert_eq!(missing_token.status(), StatusCode::UNAUTHORIZED);

    let bad_token = api.get("/api/students", Some("not-a-real-token")).await;
    assert_eq!(bad_token.status(), StatusCode::UNAUTHORIZED);

    let short_password = api
        .post(
            "/api/register/parent",
            None,
            json!({ "email": "short@academy.test", "password": "short", "full_name": "S" }),
        )
        .await;
    assert_eq!(short_password.status(), StatusCode::BAD_REQUEST);
    let body: Value = short_password.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("password"));
}

#[tokio::test]
async fn http_password_change_revokes_other_sessions() {
    let api = Api::new().await;
    let suffix = unique_suffix();
    let admin = api.admin_token().await;
    let email = format!("pw_{suffix}@academy.test");
    api.create_teacher(&admin, &email).await;

    let current = api.web_login(&email, "teacher-password").await.token;
    let other = api.web_login(&email, "teacher-password").await.token;

    let wrong = api
        .post(
            "/api/auth/password",
            Some(&current),
            json!({ "current_password": "not-my-password", "new_password": "brand-new-password" }),
        )
        .await;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let short = api
        .post(
            "/api/auth/password",
            Some(&current),
            json!({ "current_password": "teacher-password", "new_password": "short" }),
        )
        .await;
    assert_eq!(short.status(), StatusCode::BAD_REQUEST);
    assert_eq!(api.get("/api/auth/me", Some(&other)).await.status(), StatusCode::OK);

    let changed = api
        .post(
            "/api/auth/password",
            Some(&current),
            json!({ "current_password": "teacher-password", "new_password": "brand-new-password" }),
        )
        .await;
    assert_eq!(changed.status(), StatusCode::NO_CONTENT);

    assert_eq!(api.get("/api/auth/me", Some(&current)).await.status(), StatusCode::OK);
    assert_eq!(api.get("/api/auth/me", Some(&other)).await.status(), StatusCode::UNAUTHORIZED);

    let old = api
        .post("/api/auth/login", None, json!({ "email": email, "password": "teacher-password" }))
        .await;
    assert_eq!(old.status(), StatusCode::UNAUTHORIZED);
    api.web_login(&email, "brand-new-password").await;
}

#[tokio::test]
async fn http_admin_sends_notifications_to_a_user_or_a_role() {
    let api = Api::new().await;
    let suffix = unique_suffix();
    let admin = api.admin_token().await;
    api.register_family(&suffix).await;
    let parent = api
        .mobile_login(&format!("parent_{suffix}@academy.test"), "family-password")
        .await;

    let direct = api
        .post(
            "/api/notifications",
            Some(&admin),
            json!({ "title": "Hello", "body": "Welcome aboard", "user_id": parent.user.id }),
        )
        .await;
    assert_eq!(direct.status(), StatusCode::CREATED);
    let direct: Value = direct.json().await.unwrap();
    assert_eq!(direct["sent"], 1);

    let inbox: Value = api
        .get("/api/notifications", Some(&parent.token))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(inbox.as_array().unwrap().len(), 1);
    assert_eq!(inbox[0]["title"], "Hello");
    assert_eq!(inbox[0]["kind"], "general");

    let teacher_email = format!("staffroom_{suffix}@academy.test");
    api.create_teacher(&admin, &teacher_email).await;
    let broadcast = api
        .post(
            "/api/notifications",
            Some(&admin),
            json!({ "title": "Closed Monday", "body": "No classes on Monday", "role": "teacher" }),
        )
        .await;
    assert_eq!(broadcast.status(), StatusCode::CREATED);
    let broadcast: Value = broadcast.json().await.unwrap();
    assert!(broadcast["sent"].as_u64().unwrap() >= 1);

    let teacher = api.web_login(&teacher_email, "teacher-password").await.token;
    let staff_inbox: Value = api
        .get("/api/notifications", Some(&teacher))
        .await
        .json()
        .await
        .unwrap();
    assert!(staff_inbox
        .as_array()
        .unwrap()
        .iter()
        .any(|n| n["title"] == "Closed Monday"));

    let both = api
        .post(
            "/api/notifications",
            Some(&admin),
            json!({ "title": "x", "body": "y", "user_id": parent.user.id, "role": "teacher" }),
        )
        .await;
    assert_eq!(both.status(), StatusCode::BAD_REQUEST);

    let neither = api
        .post("/api/notifications", Some(&admin), json!({ "title": "x", "body": "y" }))
        .await;
    assert_eq!(neither.status(), StatusCode::BAD_REQUEST);

    let not_admin = api
        .post(
            "/api/notifications",
            Some(&parent.token),
            json!({ "title": "x", "body": "y", "role": "teacher" }),
        )
        .await;
    assert_eq!(not_admin.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn http_deactivated_user_loses_live_sessions() {
    let api = Api::new().await;
    let suffix = unique_suffix();
    let admin = api.admin_token().await;
    let email = format!("leaver_{suffix}@academy.test");
    let teacher = api.create_teacher(&admin, &email).await;
    let token = api.web_login(&email, "teacher-password").await.token;
    assert_eq!(api.get("/api/auth/me", Some(&token)).await.status(), StatusCode::OK);

    let path = format!("/api/users/{}/active", teacher["id"].as_str().unwrap());
    let off = api.patch(&path, Some(&admin), json!({ "active": false })).await;
    assert_eq!(off.status(), StatusCode::OK);
    let off: Value = off.json().await.unwrap();
    assert_eq!(off["active"], false);
    assert_eq!(api.get("/api/auth/me", Some(&token)).await.status(), StatusCode::UNAUTHORIZED);

    let on = api.patch(&path, Some(&admin), json!({ "active": true })).await;
    assert_eq!(on.status(), StatusCode::OK);
    assert_eq!(api.get("/api/auth/me", Some(&token)).await.status(), StatusCode::UNAUTHORIZED);
    api.web_login(&email, "teacher-password").await;
}

#[tokio::test]
async fn http_teacher_cannot_mark_another_teachers_class() {
    let api = Api::new().await;
    let suffix = unique_suffix();
    let admin = api.admin_token().await;
    let owner_email = format!("owner_{suffix}@academy.test");
    let other_email = format!("other_{suffix}@academy.test");
    let owner = api.create_teacher(&admin, &owner_email).await;
    api.create_teacher(&admin, &other_email).await;

    let course: Value = api
        .post(
            "/api/courses",
            Some(&admin),
            json!({ "name": format!("Art {suffix}"), "billing_mode": "per_session", "session_price_cents": 1500 }),
        )
        .await
        .json()
        .await
        .unwrap();
    let class: Value = api
        .post(
            "/api/classes",
            Some(&admin),
            json!({
                "course_id": course["id"],
                "teacher_id": owner["id"],
                "name": format!("Art A {suffix}"),
                "weekday": 4,
                "start_time": "15:00",
                "duration_minutes": 60
            }),
        )
        .await
        .json()
        .await
        .unwrap();
    let family = api.register_family(&suffix).await;
    let enrollment: Value = api
        .post(
            "/api/enrollments",
            Some(&admin),
            json!({ "student_id": family["students"][0]["id"], "class_id": class["id"] }),
        )
        .await
        .json()
        .await
        .unwrap();

    let other = api.web_login(&other_email, "teacher-password").await.token;
    let attempt = api
        .post(
            "/api/attendance",
            Some(&other),
            json!({ "enrollment_id": enrollment["id"], "status": "present", "session_date": "2026-09-03" }),
        )
        .await;
    assert_eq!(attempt.status(), StatusCode::FORBIDDEN);

    let owner_token = api.web_login(&owner_email, "teacher-password").await.token;
    let recorded = api
        .post(
            "/api/attendance",
            Some(&owner_token),
            json!({ "enrollment_id": enrollment["id"], "status": "present", "session_date": "2026-09-03" }),
        )
        .await;
    assert_eq!(recorded.status(), StatusCode::CREATED);
    let recorded: Value = recorded.json().await.unwrap();
    assert_eq!(recorded["ledger"]["debt_cents"], 1500);
}

