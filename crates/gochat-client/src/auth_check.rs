//! End-to-end check of the account endpoints.
//!
//! Runs the positive flow (register, login, checkAuth, logout) together with
//! the requests the server must refuse: a duplicate registration, a wrong
//! password, an unknown token and a token that was logged out.

use serde::Serialize;
use tracing::{info, warn};

use gochat_core::error::{Error, Result};

use crate::auth::AuthClient;

/// Token no server should ever have issued.
pub const INVALID_TOKEN: &str = "invalid_token_123456789";

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckStep {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

/// All steps of one run, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuthCheckReport {
    pub steps: Vec<CheckStep>,
}

impl AuthCheckReport {
    pub fn passed(&self) -> usize {
        self.steps.iter().filter(|step| step.passed).count()
    }

    pub fn total(&self) -> usize {
        self.steps.len()
    }

    pub fn all_passed(&self) -> bool {
        self.steps.iter().all(|step| step.passed)
    }

    pub fn step(&self, name: &str) -> Option<&CheckStep> {
        self.steps.iter().find(|step| step.name == name)
    }

    fn push(&mut self, name: &'static str, passed: bool, detail: String) {
        if passed {
            info!(step = name, detail = %detail, "auth check passed");
        } else {
            warn!(step = name, detail = %detail, "auth check failed");
        }
        self.steps.push(CheckStep {
            name,
            passed,
            detail,
        });
    }

    /// Record a request that must succeed; hands back its value when it did.
    fn expect_ok<T>(&mut self, name: &'static str, outcome: Result<T>) -> Option<T> {
        match outcome {
            Ok(value) => {
                self.push(name, true, "ok".to_string());
                Some(value)
            }
            Err(e) => {
                self.push(name, false, e.to_string());
                None
            }
        }
    }

    /// Record a request the server must refuse. Transport failures do not count.
    fn expect_rejected<T>(&mut self, name: &'static str, outcome: Result<T>) {
        match outcome {
            Ok(_) => self.push(name, false, "accepted unexpectedly".to_string()),
            Err(e @ Error::Rejected { .. }) => self.push(name, true, e.to_string()),
            Err(e) => self.push(name, false, e.to_string()),
        }
    }
}

/// Run every step against `client` with a fresh `username`.
pub async fn run(client: &AuthClient, username: &str, password: &str) -> AuthCheckReport {
    let wrong_password = format!("{}-wrong", password);
    let mut report = AuthCheckReport::default();

    let registered = client.register(username, password).await;
    report.expect_ok("register", registered);

    let duplicate = client.register(username, password).await;
    report.expect_rejected("register duplicate", duplicate);

    let wrong = client.login(username, &wrong_password).await;
    report.expect_rejected("login with wrong password", wrong);

    let login = client.login(username, password).await;
    if let Some(session) = report.expect_ok("login", login) {
        let checked = client.check_auth(&session.token).await;
        report.expect_ok("check auth", checked);

        let invalid = client.check_auth(INVALID_TOKEN).await;
        report.expect_rejected("check auth with invalid token", invalid);

        let logout = client.logout(&session.token).await;
        report.expect_ok("logout", logout);

        let after = client.check_auth(&session.token).await;
        report.expect_rejected("check auth after logout", after);
    }

    let invalid_logout = client.logout(INVALID_TOKEN).await;
    report.expect_rejected("logout with invalid token", invalid_logout);

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected() -> Error {
        Error::Rejected {
            status: 200,
            code: 400,
            message: "bad".to_string(),
        }
    }

    #[test]
    fn test_rejection_counts_as_pass() {
        let mut report = AuthCheckReport::default();
        report.expect_rejected::<()>("refused", Err(rejected()));
        report.expect_rejected::<()>("transport", Err(Error::Http("refused".to_string())));
        report.expect_rejected("accepted", Ok(()));

        assert_eq!(report.passed(), 1);
        assert_eq!(report.total(), 3);
        assert!(!report.all_passed());
        assert!(report.step("refused").unwrap().passed);
    }

    #[test]
    fn test_expect_ok_returns_value() {
        let mut report = AuthCheckReport::default();
        assert_eq!(report.expect_ok("ok", Ok(7)), Some(7));
        assert_eq!(report.expect_ok::<i32>("err", Err(rejected())), None);
        assert_eq!(report.passed(), 1);
    }
}
