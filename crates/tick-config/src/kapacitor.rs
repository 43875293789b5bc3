use serde::Deserialize;

/// Remote engine endpoint and credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct KapacitorConfig {
    /// Base URL, e.g. `"http://localhost:9092"`.
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl KapacitorConfig {
    pub fn credentials(&self) -> Option<(&str, &str)> {
        self.username
            .as_deref()
            .map(|user| (user, self.password.as_deref().unwrap_or_default()))
    }
}
