//! Makes sure the session is logged in before the feed is scanned.
//!
//! Logging in may require extra verification rounds (a captcha, a one-time
//! code). The values for those come from a [`ChallengeResolver`], normally an
//! operator at the console. When login cannot be completed a screenshot of
//! the page is kept next to the harvested posts for diagnosis.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use harvest_logging::{harvest_info, harvest_warn};
use harvester_core::diagnostic_snapshot_filename;
use thiserror::Error;

use crate::browser::{find_first, find_required, BrowserError, BrowserSession, Locator, ENTER_KEY};
use crate::persist::AtomicFileWriter;
use crate::selectors::LoginSelectors;
use crate::wait::{wait_for_absence, wait_for_any, WaitSettings};

/// Timestamp format used in diagnostic snapshot names.
pub const DIAGNOSTIC_TIME_FORMAT: &str = "%Y_%m_%d_%H_%M_%S";

/// Verification rounds attempted before giving up.
pub const DEFAULT_MAX_CHALLENGE_ROUNDS: u32 = 3;

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeKind {
    Captcha,
    AuthCode,
}

impl fmt::Display for ChallengeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChallengeKind::Captcha => f.write_str("captcha"),
            ChallengeKind::AuthCode => f.write_str("authentication code"),
        }
    }
}

/// Supplies the answer to a verification challenge.
pub trait ChallengeResolver: Send + Sync {
    fn resolve(&self, challenge: ChallengeKind) -> Result<String, AuthError>;
}

/// How the session became ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStatus {
    AlreadyAuthenticated,
    LoggedIn { challenges: u32 },
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("login form is not shown{}", snapshot_note(.snapshot))]
    FormMissing { snapshot: Option<PathBuf> },
    #[error("login not completed after {rounds} verification round(s){}", snapshot_note(.snapshot))]
    Unresolved {
        rounds: u32,
        snapshot: Option<PathBuf>,
    },
    #[error("login failed, no feed and no verification step{}", snapshot_note(.snapshot))]
    Rejected { snapshot: Option<PathBuf> },
    #[error("no answer for the {0} challenge")]
    ChallengeAborted(ChallengeKind),
    #[error("browser failure during login: {0}")]
    Browser(#[from] BrowserError),
}

impl AuthError {
    /// Diagnostic screenshot kept for this failure, if one was taken.
    pub fn snapshot(&self) -> Option<&Path> {
        match self {
            AuthError::FormMissing { snapshot }
            | AuthError::Unresolved { snapshot, .. }
            | AuthError::Rejected { snapshot } => snapshot.as_deref(),
            AuthError::ChallengeAborted(_) | AuthError::Browser(_) => None,
        }
    }
}

fn snapshot_note(snapshot: &Option<PathBuf>) -> String {
    match snapshot {
        Some(path) => format!(" (page saved to {})", path.display()),
        None => String::new(),
    }
}

pub struct AuthenticationGate {
    selectors: LoginSelectors,
    credentials: Credentials,
    challenges: Arc<dyn ChallengeResolver>,
    diagnostics: AtomicFileWriter,
    wait: WaitSettings,
    max_challenge_rounds: u32,
}

impl AuthenticationGate {
    pub fn new(
        selectors: LoginSelectors,
        credentials: Credentials,
        challenges: Arc<dyn ChallengeResolver>,
        diagnostics_dir: PathBuf,
    ) -> Self {
        Self {
            selectors,
            credentials,
            challenges,
            diagnostics: AtomicFileWriter::new(diagnostics_dir),
            wait: WaitSettings::default(),
            max_challenge_rounds: DEFAULT_MAX_CHALLENGE_ROUNDS,
        }
    }

    pub fn with_wait(mut self, wait: WaitSettings) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_max_challenge_rounds(mut self, rounds: u32) -> Self {
        self.max_challenge_rounds = rounds;
        self
    }

    /// Returns once the session is logged in; never leaves it half logged in without an error.
    pub async fn ensure_authenticated(
        &self,
        session: &dyn BrowserSession,
    ) -> Result<GateStatus, AuthError> {
        if find_first(session, None, &self.selectors.profile_link)
            .await?
            .is_some()
        {
            harvest_info!("Already logged in");
            return Ok(GateStatus::AlreadyAuthenticated);
        }

        harvest_info!("Not logged in, login required");
        let Some(email) = find_first(session, None, &self.selectors.email).await? else {
            let snapshot = self.diagnostic_snapshot(session, "login_form_not_shown").await;
            return Err(AuthError::FormMissing { snapshot });
        };
        session.send_keys(&email, &self.credentials.username).await?;
        let password = find_required(session, None, &self.selectors.password).await?;
        session.send_keys(&password, &self.credentials.password).await?;
        let submit = find_required(session, None, &self.selectors.submit).await?;
        session.send_keys(&submit, ENTER_KEY).await?;

        let outcomes = [
            self.selectors.profile_link.clone(),
            self.selectors.captcha_marker.clone(),
            self.selectors.auth_code_input.clone(),
        ];
        let mut rounds = 0;
        loop {
            let challenge = match wait_for_any(session, &outcomes, self.wait).await {
                Ok(0) => {
                    harvest_info!("Logged in after {rounds} verification round(s)");
                    return Ok(GateStatus::LoggedIn { challenges: rounds });
                }
                Ok(1) => ChallengeKind::Captcha,
                Ok(_) => ChallengeKind::AuthCode,
                Err(BrowserError::Timeout(_)) => {
                    let snapshot = self.diagnostic_snapshot(session, "login_failed").await;
                    return Err(AuthError::Rejected { snapshot });
                }
                Err(err) => return Err(err.into()),
            };

            if rounds >= self.max_challenge_rounds {
                let snapshot = self.diagnostic_snapshot(session, "login_failed").await;
                return Err(AuthError::Unresolved { rounds, snapshot });
            }
            rounds += 1;
            harvest_info!("Login asks for a {challenge}");
            self.answer(session, challenge).await?;
        }
    }

    async fn answer(
        &self,
        session: &dyn BrowserSession,
        challenge: ChallengeKind,
    ) -> Result<(), AuthError> {
        let input_locator = self.input_for(challenge);
        let answer = self.challenges.resolve(challenge)?;
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(AuthError::ChallengeAborted(challenge));
        }

        let input = find_required(session, None, input_locator).await?;
        session.send_keys(&input, &format!("{answer}{ENTER_KEY}")).await?;
        // A rejected answer re-renders the same step; the next round picks it up.
        if !wait_for_absence(session, input_locator, self.wait).await? {
            harvest_warn!("{challenge} input still shown after submitting");
        }
        Ok(())
    }

    fn input_for(&self, challenge: ChallengeKind) -> &Locator {
        match challenge {
            ChallengeKind::Captcha => &self.selectors.captcha_input,
            ChallengeKind::AuthCode => &self.selectors.auth_code_input,
        }
    }

    /// Best effort: a failed snapshot never hides the login failure itself.
    async fn diagnostic_snapshot(
        &self,
        session: &dyn BrowserSession,
        label: &str,
    ) -> Option<PathBuf> {
        let timestamp = chrono::Local::now().format(DIAGNOSTIC_TIME_FORMAT).to_string();
        let filename = diagnostic_snapshot_filename(label, &timestamp);

        let body = match find_required(session, None, &self.selectors.page_body).await {
            Ok(body) => body,
            Err(err) => {
                harvest_warn!("no page to snapshot for {label}: {err}");
                return None;
            }
        };
        let png = match session.screenshot(&body).await {
            Ok(png) => png,
            Err(err) => {
                harvest_warn!("snapshot for {label} failed: {err}");
                return None;
            }
        };
        match self.diagnostics.write_bytes(&filename, &png) {
            Ok(path) => {
                harvest_info!("Saved {}", path.display());
                Some(path)
            }
            Err(err) => {
                harvest_warn!("could not save {filename}: {err}");
                None
            }
        }
    }
}
