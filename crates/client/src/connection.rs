use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

/// Authentication mode for an Agora connection.
///
/// The two modes are mutually exclusive and produce different
/// `Authorization` header schemes.
#[derive(Debug, Clone)]
pub enum Connection {
    /// `Authorization: X-Agora-Api-Key <key>`.
    ApiKey(String),
    /// `Authorization: Basic <base64(user:pass)>`.
    Password { username: String, password: String },
}

impl Connection {
    /// Returns the `Authorization` header value, or `None` when the
    /// credentials are empty.
    pub fn authorization(&self) -> Option<String> {
        match self {
            Connection::ApiKey(key) if !key.is_empty() => {
                Some(format!("X-Agora-Api-Key {key}"))
            }
            Connection::Password { username, password }
                if !username.is_empty() && !password.is_empty() =>
            {
                let credentials = BASE64.encode(format!("{username}:{password}"));
                Some(format!("Basic {credentials}"))
            }
            _ => None,
        }
    }
}
