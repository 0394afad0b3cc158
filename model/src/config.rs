use rand::Rng;
use std::time::Duration;

pub const DEFAULT_ADMIN_USERNAME: &str = "admin";
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);
pub const MIN_SECRET_LEN: usize = 16;

/// Token signing and login settings. There is no default secret or password;
/// both must be supplied when the process starts. Not serializable, and
/// `Debug` redacts both.
#[derive(Clone)]
pub struct AuthConfig {
    pub secret_key: String,
    pub token_ttl: Duration,
    pub admin_username: String,
    pub admin_password: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret_key", &"<redacted>")
            .field("token_ttl", &self.token_ttl)
            .field("admin_username", &self.admin_username)
            .field("admin_password", &"<redacted>")
            .finish()
    }
}

impl AuthConfig {
    pub fn new(secret_key: impl Into<String>, admin_password: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            token_ttl: DEFAULT_TOKEN_TTL,
            admin_username: DEFAULT_ADMIN_USERNAME.to_string(),
            admin_password: admin_password.into(),
        }
    }

    /// Config with a freshly generated 256-bit secret. Tokens signed with it
    /// do not survive a restart, so this is only suitable for local runs.
    pub fn with_random_secret(admin_password: impl Into<String>) -> Self {
        Self::new(generate_secret(), admin_password)
    }

    pub fn with_token_ttl(mut self, token_ttl: Duration) -> Self {
        self.token_ttl = token_ttl;
        self
    }

    pub fn with_admin_username(mut self, username: impl Into<String>) -> Self {
        self.admin_username = username.into();
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.secret_key.is_empty() {
            return Err("Secret key cannot be empty".to_string());
        }

        if self.secret_key.len() < MIN_SECRET_LEN {
            return Err(format!(
                "Secret key must be at least {} bytes",
                MIN_SECRET_LEN
            ));
        }

        if self.token_ttl.is_zero() {
            return Err("Token lifetime must be greater than 0".to_string());
        }

        if self.admin_username.is_empty() {
            return Err("Admin username cannot be empty".to_string());
        }

        if self.admin_password.is_empty() {
            return Err("Admin password cannot be empty".to_string());
        }

        Ok(())
    }
}

pub fn generate_secret() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
