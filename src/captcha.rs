//! External CAPTCHA verification collaborator.
//!
//! The moderation gate only sees the boolean outcome; this module owns the
//! HTTP exchange with the verification service (hCaptcha/Turnstile-style
//! `siteverify` endpoint).

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

#[async_trait]
pub trait CaptchaVerifier: Send + Sync {
    async fn verify(&self, token: &str, client_ip: &str) -> bool;
}

/// Used when no verifier is configured. Submissions are only blocked by this
/// when `captcha_required` is toggled on without configuring a service.
pub struct DisabledCaptcha;

#[async_trait]
impl CaptchaVerifier for DisabledCaptcha {
    async fn verify(&self, _token: &str, _client_ip: &str) -> bool {
        false
    }
}

#[derive(Deserialize)]
struct VerifyResponse {
    success: bool,
}

pub struct HttpCaptchaVerifier {
    endpoint: String,
    secret: String,
    client: reqwest::Client,
}

impl HttpCaptchaVerifier {
    pub fn new(endpoint: String, secret: String) -> Self {
        Self {
            endpoint,
            secret,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env() -> Option<Self> {
        let endpoint = std::env::var("CAPTCHA_VERIFY_URL").ok()?;
        let secret = std::env::var("CAPTCHA_SECRET").ok()?;
        Some(Self::new(endpoint, secret))
    }
}

#[async_trait]
impl CaptchaVerifier for HttpCaptchaVerifier {
    // Fail closed: an unreachable verifier means "not verified".
    async fn verify(&self, token: &str, client_ip: &str) -> bool {
        let result = self
            .client
            .post(&self.endpoint)
            .form(&[
                ("secret", self.secret.as_str()),
                ("response", token),
                ("remoteip", client_ip),
            ])
            .send()
            .await;
        match result {
            Ok(resp) => match resp.json::<VerifyResponse>().await {
                Ok(body) => body.success,
                Err(e) => {
                    warn!(error = %e, "CAPTCHA verifier returned malformed response");
                    false
                }
            },
            Err(e) => {
                warn!(error = %e, "CAPTCHA verifier unreachable");
                false
            }
        }
    }
}
