// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Account signup funnel: validation, auth sign-up, profile row, lead.

use std::sync::Arc;

use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use zapflow_backend::{Lead, LeadNotifier};
use zapflow_core::types::now_timestamp;
use zapflow_core::{AuthAdapter, FieldError, OwnerId, Profile, Session, StorageAdapter, ZapflowError};

/// Minimum accepted password length.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Signup form contents.
#[derive(Debug, Clone, Default)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
    pub full_name: String,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub plan: Option<String>,
}

/// Result of [`SignupFlow::sign_up`].
#[derive(Debug)]
pub struct SignupOutcome {
    pub owner_id: OwnerId,
    /// Present when the auth service does not require email confirmation.
    pub session: Option<Session>,
    pub warnings: Vec<String>,
    /// Background lead delivery. Long-running callers may drop it; short-lived
    /// ones await it so the process does not exit first.
    pub lead_delivery: Option<JoinHandle<()>>,
}

impl SignupOutcome {
    /// Whether the account still has to be confirmed with the emailed code.
    pub fn needs_confirmation(&self) -> bool {
        self.session.is_none()
    }
}

pub struct SignupFlow {
    auth: Arc<dyn AuthAdapter>,
    storage: Arc<dyn StorageAdapter>,
    leads: LeadNotifier,
}

impl SignupFlow {
    pub fn new(
        auth: Arc<dyn AuthAdapter>,
        storage: Arc<dyn StorageAdapter>,
        leads: LeadNotifier,
    ) -> Self {
        Self {
            auth,
            storage,
            leads,
        }
    }

    /// Registers the account, makes sure its profile row exists and forwards
    /// the lead without waiting for delivery.
    pub async fn sign_up(&self, request: SignupRequest) -> Result<SignupOutcome, ZapflowError> {
        let request = validate(request)?;
        let email = request.email.as_str();

        let metadata = json!({
            "full_name": request.full_name,
            "company": request.company,
            "phone": request.phone,
            "plan": request.plan,
        });
        let outcome = self
            .auth
            .sign_up(email, &request.password, metadata)
            .await?;
        info!(owner_id = %outcome.owner_id, "account created");

        let mut warnings = Vec::new();
        if let Err(e) = self.ensure_profile(&outcome.owner_id, &request).await {
            warn!(owner_id = %outcome.owner_id, error = %e, "profile row could not be created");
            warnings.push(format!("profile could not be saved: {e}"));
        }

        let lead_delivery = self.leads.is_enabled().then(|| {
            self.leads.notify_detached(Lead {
                name: request.full_name.clone(),
                email: request.email.clone(),
                phone: request.phone.clone(),
                company: request.company.clone(),
                plan: request.plan.clone(),
            })
        });

        Ok(SignupOutcome {
            owner_id: outcome.owner_id,
            session: outcome.session,
            warnings,
            lead_delivery,
        })
    }

    /// Confirms the email with the one-time code.
    pub async fn verify_otp(&self, email: &str, token: &str) -> Result<Session, ZapflowError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(ZapflowError::invalid("token", "is required"));
        }
        self.auth.verify_otp(email.trim(), token).await
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, ZapflowError> {
        self.auth.sign_in(email.trim(), password).await
    }

    // The backend normally creates the row from a trigger on the auth user.
    async fn ensure_profile(
        &self,
        owner_id: &OwnerId,
        request: &SignupRequest,
    ) -> Result<(), ZapflowError> {
        if self.storage.get_profile(owner_id).await?.is_some() {
            debug!(%owner_id, "profile already present");
            return Ok(());
        }
        self.storage
            .insert_profile(&Profile {
                id: owner_id.clone(),
                full_name: request.full_name.clone(),
                company: request.company.clone(),
                email: request.email.clone(),
                phone: request.phone.clone(),
                created_at: now_timestamp(),
            })
            .await
    }
}

/// Trims the request and collects every field error.
fn validate(mut request: SignupRequest) -> Result<SignupRequest, ZapflowError> {
    request.email = request.email.trim().to_lowercase();
    request.full_name = request.full_name.trim().to_string();
    request.company = trimmed(request.company);
    request.phone = trimmed(request.phone);
    request.plan = trimmed(request.plan);

    let mut fields = Vec::new();
    if request.email.is_empty() {
        fields.push(FieldError::new("email", "is required"));
    } else if !looks_like_email(&request.email) {
        fields.push(FieldError::new("email", "is not a valid address"));
    }
    if request.full_name.is_empty() {
        fields.push(FieldError::new("full_name", "is required"));
    }
    if request.password.is_empty() {
        fields.push(FieldError::new("password", "is required"));
    } else if request.password.chars().count() < MIN_PASSWORD_LEN {
        fields.push(FieldError::new(
            "password",
            format!("must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    if request.password != request.password_confirmation {
        fields.push(FieldError::new("password_confirmation", "does not match"));
    }

    if fields.is_empty() {
        Ok(request)
    } else {
        Err(ZapflowError::Validation { fields })
    }
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use zapflow_config::model::LeadsConfig;
    use zapflow_test_utils::{FlakyStorage, MockAuth, TestHarness};

    fn request() -> SignupRequest {
        SignupRequest {
            email: " Ana@Example.com ".into(),
            password: "secret1".into(),
            password_confirmation: "secret1".into(),
            full_name: "Ana Souza".into(),
            company: Some("Clínica SP".into()),
            phone: Some("+55 11 99999-9999".into()),
            plan: Some("".into()),
        }
    }

    fn no_leads() -> LeadNotifier {
        LeadNotifier::new(&LeadsConfig::default(), Duration::from_secs(1)).unwrap()
    }

    fn field_names(err: ZapflowError) -> Vec<String> {
        match err {
            ZapflowError::Validation { fields } => fields.into_iter().map(|f| f.field).collect(),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn all_field_errors_are_collected() {
        let err = validate(SignupRequest {
            password: "abc".into(),
            password_confirmation: "abd".into(),
            ..SignupRequest::default()
        })
        .unwrap_err();
        assert_eq!(
            field_names(err),
            vec!["email", "full_name", "password", "password_confirmation"]
        );
    }

    #[test]
    fn malformed_email_is_rejected() {
        let err = validate(SignupRequest {
            email: "ana.example.com".into(),
            ..request()
        })
        .unwrap_err();
        assert_eq!(field_names(err), vec!["email"]);
    }

    #[test]
    fn valid_request_is_normalized() {
        let req = validate(request()).unwrap();
        assert_eq!(req.email, "ana@example.com");
        assert!(req.plan.is_none());
    }

    #[tokio::test]
    async fn sign_up_creates_profile_and_needs_confirmation() {
        let harness = TestHarness::new().await.unwrap();
        let auth = Arc::new(MockAuth::new());
        let flow = SignupFlow::new(auth.clone(), harness.storage.clone(), no_leads());

        let outcome = flow.sign_up(request()).await.unwrap();
        assert!(outcome.needs_confirmation());
        assert!(outcome.warnings.is_empty());
        assert!(outcome.lead_delivery.is_none());

        let profile = harness
            .storage
            .get_profile(&outcome.owner_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile.full_name, "Ana Souza");
        assert_eq!(profile.email, "ana@example.com");

        let metadata = auth.account_metadata("ana@example.com").await.unwrap();
        assert_eq!(metadata["company"], "Clínica SP");
    }

    #[tokio::test]
    async fn validation_failure_never_reaches_auth() {
        let harness = TestHarness::new().await.unwrap();
        let auth = Arc::new(MockAuth::new());
        let flow = SignupFlow::new(auth.clone(), harness.storage.clone(), no_leads());

        let err = flow
            .sign_up(SignupRequest {
                password_confirmation: "other1".into(),
                ..request()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ZapflowError::Validation { .. }));
        assert!(auth.account_metadata("ana@example.com").await.is_none());
    }

    #[tokio::test]
    async fn profile_insert_failure_is_a_warning() {
        let harness = TestHarness::new().await.unwrap();
        let storage = Arc::new(FlakyStorage::new(harness.storage.clone()));
        storage.fail_profile_insert(true);
        let flow = SignupFlow::new(Arc::new(MockAuth::new()), storage, no_leads());

        let outcome = flow.sign_up(request()).await.unwrap();
        assert_eq!(outcome.warnings.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_account_is_an_auth_error() {
        let harness = TestHarness::new().await.unwrap();
        let flow = SignupFlow::new(Arc::new(MockAuth::new()), harness.storage.clone(), no_leads());

        flow.sign_up(request()).await.unwrap();
        let err = flow.sign_up(request()).await.unwrap_err();
        assert!(matches!(err, ZapflowError::Auth { .. }));
    }

    #[tokio::test]
    async fn otp_then_sign_in() {
        let harness = TestHarness::new().await.unwrap();
        let flow = SignupFlow::new(Arc::new(MockAuth::new()), harness.storage.clone(), no_leads());
        let outcome = flow.sign_up(request()).await.unwrap();

        assert!(flow.sign_in("ana@example.com", "secret1").await.is_err());
        assert!(matches!(
            flow.verify_otp("ana@example.com", "  ").await,
            Err(ZapflowError::Validation { .. })
        ));

        let session = flow
            .verify_otp("ana@example.com", MockAuth::OTP)
            .await
            .unwrap();
        assert_eq!(session.owner_id, outcome.owner_id);
        let session = flow.sign_in("ana@example.com", "secret1").await.unwrap();
        assert!(session.access_token.is_some());
    }

    #[tokio::test]
    async fn lead_is_forwarded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/leads"))
            .and(body_partial_json(json!({
                "source": "signup",
                "email": "ana@example.com",
                "name": "Ana Souza"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let leads = LeadNotifier::new(
            &LeadsConfig {
                webhook_url: Some(format!("{}/leads", server.uri())),
                ..LeadsConfig::default()
            },
            Duration::from_secs(2),
        )
        .unwrap();
        let harness = TestHarness::new().await.unwrap();
        let flow = SignupFlow::new(Arc::new(MockAuth::new()), harness.storage.clone(), leads);
        let outcome = flow.sign_up(request()).await.unwrap();
        outcome.lead_delivery.expect("lead should be sent").await.unwrap();
    }
}
