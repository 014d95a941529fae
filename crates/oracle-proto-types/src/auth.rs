//! Authentication context types.
//!
//! Grounded on the credential-redaction idiom used by the teacher's
//! `mssql-auth::Credentials`: a `Debug` impl that never prints secret
//! material, even when the containing struct is logged wholesale.

use std::borrow::Cow;

/// Session purity requested for the authenticated session (Oracle session
/// pooling hint).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPurity {
    /// Let the server decide.
    #[default]
    Default,
    /// Require a brand-new session.
    New,
    /// Allow reuse of a pooled session.
    Self_,
}

/// Authentication mode flags, passed through to the AUTH messages
/// unmodified; the engine does not interpret individual bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuthModeFlags(pub u32);

/// Everything needed to drive the two-phase AUTH exchange.
///
/// Secrets (`password`, `new_password`) are redacted from `Debug` output;
/// callers must not rely on `{:?}` to recover them.
#[derive(Clone)]
pub struct AuthContext {
    /// Database username.
    pub username: Cow<'static, str>,
    /// Current password.
    pub password: Cow<'static, str>,
    /// New password, when this authentication attempt is a password change.
    pub new_password: Option<Cow<'static, str>>,
    /// Numeric authentication mode flags sent to the server.
    pub mode: AuthModeFlags,
    /// Service name the session connects to.
    pub service_name: Cow<'static, str>,
    /// Requested session purity.
    pub session_purity: SessionPurity,
}

impl AuthContext {
    /// Build a plain username/password auth context.
    #[must_use]
    pub fn new(
        username: impl Into<Cow<'static, str>>,
        password: impl Into<Cow<'static, str>>,
        service_name: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            new_password: None,
            mode: AuthModeFlags::default(),
            service_name: service_name.into(),
            session_purity: SessionPurity::default(),
        }
    }

    /// Attach a password-change request, returning `self` for chaining.
    #[must_use]
    pub fn with_new_password(mut self, new_password: impl Into<Cow<'static, str>>) -> Self {
        self.new_password = Some(new_password.into());
        self
    }
}

impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthContext")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field(
                "new_password",
                &self.new_password.as_ref().map(|_| "[REDACTED]"),
            )
            .field("mode", &self.mode)
            .field("service_name", &self.service_name)
            .field("session_purity", &self.session_purity)
            .finish()
    }
}
