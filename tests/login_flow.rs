//! Sign-in flow behavior against a scripted fake browser session.

use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;
use url::Url;

use aws_sso_pilot::{
    Config, Locator, LoginError, LoginFlow, SessionError, Stage, UiSession, WaitOpts,
};

const CONFIRM_CODE: &str = "#cli_verification_btn";
const EMAIL: &str = "input[type=\"email\"]";
const PASSWORD: &str = "input[type=\"password\"]";
const SUBMIT: &str = "input[type=\"submit\"]";
const SIGN_IN_ANOTHER_WAY: &str = "#signInAnotherWay";
const METHOD_LIST: &str = "#idDiv_SAOTCS_Title";
const APP_CODE: &str = "#idRichContext_DisplaySign";
const STAY_SIGNED_IN: &str = "#KmsiDescription";
const COOKIE_ACCEPT: &str = "button[aria-label=\"Accept all cookies\"]";
const PHONE_CALL: &str = "div containing 'Call +XX XXXXXXX1234'";
const ALLOW_ACCESS: &str = "span containing 'Allow access'";
const REQUEST_APPROVED: &str = "div containing 'Request approved'";

/// A page whose elements are scripted: clicks can make further elements
/// appear, and every interaction is recorded for assertions.
struct FakeSession {
    state: Mutex<FakeState>,
}

struct FakeState {
    present: HashSet<String>,
    texts: HashMap<String, String>,
    appear_on_click: HashMap<String, Vec<String>>,
    appear_after_waits: HashMap<String, usize>,
    actions: Vec<String>,
}

impl FakeSession {
    fn new(present: &[&str]) -> Self {
        Self {
            state: Mutex::new(FakeState {
                present: present.iter().map(ToString::to_string).collect(),
                texts: HashMap::new(),
                appear_on_click: HashMap::new(),
                appear_after_waits: HashMap::new(),
                actions: Vec::new(),
            }),
        }
    }

    fn with_text(self, locator: &str, text: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .texts
            .insert(locator.to_string(), text.to_string());
        self
    }

    fn appearing_on_click(self, clicked: &str, appears: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .appear_on_click
            .entry(clicked.to_string())
            .or_default()
            .push(appears.to_string());
        self
    }

    fn appearing_after_waits(self, locator: &str, waits: usize) -> Self {
        self.state
            .lock()
            .unwrap()
            .appear_after_waits
            .insert(locator.to_string(), waits);
        self
    }

    fn actions(&self) -> Vec<String> {
        self.state.lock().unwrap().actions.clone()
    }

    fn clicks_of(&self, locator: &str) -> usize {
        let action = format!("click {locator}");
        self.actions()
            .iter()
            .filter(|recorded| **recorded == action)
            .count()
    }
}

#[async_trait]
impl UiSession for FakeSession {
    async fn navigate(&self, url: &Url) -> Result<(), SessionError> {
        self.state
            .lock()
            .unwrap()
            .actions
            .push(format!("navigate {url}"));
        Ok(())
    }

    // Absent elements fail immediately, even for unbounded waits, so a
    // mis-scripted test fails instead of hanging. An element scripted to
    // appear after N waits ticks down one failed wait at a time.
    async fn wait_for(&self, locator: &Locator, _opts: WaitOpts) -> Result<(), SessionError> {
        let key = locator.to_string();
        let mut state = self.state.lock().unwrap();
        if state.present.contains(&key) {
            return Ok(());
        }
        if let Some(remaining) = state.appear_after_waits.get_mut(&key) {
            *remaining -= 1;
            if *remaining == 0 {
                state.appear_after_waits.remove(&key);
                state.present.insert(key.clone());
            }
        }
        Err(SessionError::ElementNotFound(key))
    }

    async fn probe(&self, locator: &Locator, _timeout: Duration) -> bool {
        self.state
            .lock()
            .unwrap()
            .present
            .contains(&locator.to_string())
    }

    async fn type_text(&self, locator: &Locator, text: &str) -> Result<(), SessionError> {
        let key = locator.to_string();
        let mut state = self.state.lock().unwrap();
        if !state.present.contains(&key) {
            return Err(SessionError::ElementNotFound(key));
        }
        state.actions.push(format!("type {key}={text}"));
        Ok(())
    }

    async fn click(&self, locator: &Locator) -> Result<(), SessionError> {
        let key = locator.to_string();
        let mut state = self.state.lock().unwrap();
        if !state.present.contains(&key) {
            return Err(SessionError::ElementNotFound(key));
        }
        state.actions.push(format!("click {key}"));
        if let Some(appearing) = state.appear_on_click.remove(&key) {
            state.present.extend(appearing);
        }
        Ok(())
    }

    async fn read_text(&self, locator: &Locator) -> Result<String, SessionError> {
        let key = locator.to_string();
        let state = self.state.lock().unwrap();
        state
            .texts
            .get(&key)
            .cloned()
            .ok_or(SessionError::ElementNotFound(key))
    }
}

fn call_config() -> Config {
    serde_json::from_str(
        r#"{
            "email": "a@x.com",
            "password": "p",
            "type": "call",
            "phone": "1234",
            "profiles": ["dev", "prod"]
        }"#,
    )
    .unwrap()
}

fn app_config() -> Config {
    serde_json::from_str(
        r#"{
            "email": "a@x.com",
            "password": "p",
            "type": "app",
            "profiles": ["dev", "prod"]
        }"#,
    )
    .unwrap()
}

fn auth_url() -> Url {
    "https://device.example/auth?user_code=ABC-123".parse().unwrap()
}

#[tokio::test(start_paused = true)]
async fn call_mfa_runs_the_full_default_path() {
    let session = FakeSession::new(&[
        CONFIRM_CODE,
        EMAIL,
        PASSWORD,
        SUBMIT,
        SIGN_IN_ANOTHER_WAY,
        METHOD_LIST,
        PHONE_CALL,
        STAY_SIGNED_IN,
        COOKIE_ACCEPT,
        ALLOW_ACCESS,
    ])
    .appearing_on_click(ALLOW_ACCESS, REQUEST_APPROVED);
    let config = call_config();

    LoginFlow::new(&session, &config).run(&auth_url()).await.unwrap();

    assert_eq!(
        session.actions(),
        vec![
            format!("navigate {}", auth_url()),
            format!("click {CONFIRM_CODE}"),
            format!("type {EMAIL}=a@x.com"),
            format!("click {SUBMIT}"),
            format!("type {PASSWORD}=p"),
            format!("click {SUBMIT}"),
            format!("click {SIGN_IN_ANOTHER_WAY}"),
            format!("click {PHONE_CALL}"),
            format!("click {SUBMIT}"),
            format!("click {COOKIE_ACCEPT}"),
            format!("click {ALLOW_ACCESS}"),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn call_mfa_skips_the_absent_interstitial() {
    let session = FakeSession::new(&[
        CONFIRM_CODE,
        EMAIL,
        PASSWORD,
        SUBMIT,
        METHOD_LIST,
        PHONE_CALL,
        STAY_SIGNED_IN,
        REQUEST_APPROVED,
    ]);
    let config = call_config();

    LoginFlow::new(&session, &config).run(&auth_url()).await.unwrap();

    assert_eq!(session.clicks_of(SIGN_IN_ANOTHER_WAY), 0);
    assert_eq!(session.clicks_of(PHONE_CALL), 1);
}

#[tokio::test(start_paused = true)]
async fn early_approval_skips_consent_and_allow_access() {
    let session = FakeSession::new(&[
        CONFIRM_CODE,
        EMAIL,
        PASSWORD,
        SUBMIT,
        APP_CODE,
        STAY_SIGNED_IN,
        COOKIE_ACCEPT,
        ALLOW_ACCESS,
        REQUEST_APPROVED,
    ])
    .with_text(APP_CODE, "42");
    let config = app_config();

    LoginFlow::new(&session, &config).run(&auth_url()).await.unwrap();

    assert_eq!(session.clicks_of(COOKIE_ACCEPT), 0);
    assert_eq!(session.clicks_of(ALLOW_ACCESS), 0);
}

#[tokio::test(start_paused = true)]
async fn approval_appearing_with_consent_skips_allow_access() {
    let session = FakeSession::new(&[
        CONFIRM_CODE,
        EMAIL,
        PASSWORD,
        SUBMIT,
        APP_CODE,
        STAY_SIGNED_IN,
        COOKIE_ACCEPT,
        ALLOW_ACCESS,
    ])
    .with_text(APP_CODE, "42")
    .appearing_on_click(COOKIE_ACCEPT, REQUEST_APPROVED);
    let config = app_config();

    LoginFlow::new(&session, &config).run(&auth_url()).await.unwrap();

    assert_eq!(session.clicks_of(COOKIE_ACCEPT), 1);
    assert_eq!(session.clicks_of(ALLOW_ACCESS), 0);
}

#[tokio::test(start_paused = true)]
async fn default_path_performs_consent_and_allow_access_once_each() {
    let session = FakeSession::new(&[
        CONFIRM_CODE,
        EMAIL,
        PASSWORD,
        SUBMIT,
        APP_CODE,
        STAY_SIGNED_IN,
        COOKIE_ACCEPT,
        ALLOW_ACCESS,
    ])
    .with_text(APP_CODE, "42")
    .appearing_on_click(ALLOW_ACCESS, REQUEST_APPROVED);
    let config = app_config();

    LoginFlow::new(&session, &config).run(&auth_url()).await.unwrap();

    assert_eq!(session.clicks_of(COOKIE_ACCEPT), 1);
    assert_eq!(session.clicks_of(ALLOW_ACCESS), 1);
}

#[tokio::test(start_paused = true)]
async fn approval_wait_retries_until_the_prompt_renders() {
    let session = FakeSession::new(&[
        CONFIRM_CODE,
        EMAIL,
        PASSWORD,
        SUBMIT,
        APP_CODE,
        REQUEST_APPROVED,
    ])
    .with_text(APP_CODE, "42")
    .appearing_after_waits(STAY_SIGNED_IN, 3);
    let config = app_config();

    LoginFlow::new(&session, &config).run(&auth_url()).await.unwrap();

    assert_eq!(session.clicks_of(SUBMIT), 3);
}

#[tokio::test(start_paused = true)]
async fn missing_email_input_times_out_in_the_credentials_stage() {
    let session = FakeSession::new(&[CONFIRM_CODE, PASSWORD, SUBMIT]);
    let config = call_config();

    let error = LoginFlow::new(&session, &config)
        .run(&auth_url())
        .await
        .unwrap_err();

    match error {
        LoginError::InteractionTimeout { stage, locator } => {
            assert_eq!(stage, Stage::Credentials);
            assert_eq!(locator, EMAIL);
        }
        other => panic!("expected an interaction timeout, got: {other}"),
    }
}
