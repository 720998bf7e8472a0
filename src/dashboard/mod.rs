//! Dashboard Module
//!
//! Serves the generated HTML reports over HTTP behind a basic-auth login.
//! Only compiled when the `dashboard` feature is enabled.

mod api;
mod types;

pub use api::create_router;
pub use types::*;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crate::config::AppConfig;
use crate::persistence::LatestManifest;
use crate::pipeline::DASHBOARD_KEY;

/// Shared, read-only server state
#[derive(Debug, Clone)]
pub struct ServerState {
    pub output_dir: PathBuf,
    pub dashboard_prefix: String,
    pub allowed_emails: Vec<String>,
    pub password_sha256: Option<String>,
}

impl ServerState {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            output_dir: cfg.output_dir(),
            dashboard_prefix: cfg.output.dashboard_prefix.clone(),
            allowed_emails: cfg.server.allowed_emails.clone(),
            password_sha256: cfg.server.password_sha256.clone(),
        }
    }

    pub fn auth_configured(&self) -> bool {
        self.password_sha256.is_some() && !self.allowed_emails.is_empty()
    }

    /// Check an `Authorization` header value. Without a configured password
    /// every login is refused.
    pub fn authorize(&self, header: &str) -> bool {
        let Some(expected) = &self.password_sha256 else {
            return false;
        };
        let Some((email, password)) = decode_basic(header) else {
            return false;
        };
        let email_ok = self
            .allowed_emails
            .iter()
            .any(|allowed| allowed.trim().eq_ignore_ascii_case(email.trim()));
        email_ok && sha256_hex(&password).eq_ignore_ascii_case(expected.trim())
    }

    pub fn manifest(&self) -> LatestManifest {
        LatestManifest::load(&self.output_dir)
    }

    /// File-name stem a section's outputs start with
    pub fn stem_for(&self, key: &str) -> String {
        if key == DASHBOARD_KEY {
            self.dashboard_prefix.clone()
        } else {
            key.to_string()
        }
    }

    /// Newest HTML output for `key`, falling back to the manifest entry
    pub fn resolve_section(&self, key: &str) -> Option<PathBuf> {
        if !is_valid_key(key) {
            return None;
        }
        newest_matching(&self.output_dir, &self.stem_for(key)).or_else(|| {
            self.manifest()
                .sections
                .get(key)
                .map(|entry| entry.path.clone())
                .filter(|p| p.is_file())
        })
    }
}

pub fn sha256_hex(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// `Basic base64(email:password)` -> (email, password)
pub fn decode_basic(header: &str) -> Option<(String, String)> {
    let encoded = header.trim().strip_prefix("Basic ")?;
    let raw = STANDARD.decode(encoded.trim()).ok()?;
    let text = String::from_utf8(raw).ok()?;
    let (email, password) = text.split_once(':')?;
    Some((email.to_string(), password.to_string()))
}

fn is_valid_key(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Most recently modified `{stem}*.html` in `dir`
pub fn newest_matching(dir: &Path, stem: &str) -> Option<PathBuf> {
    let entries = fs::read_dir(dir).ok()?;
    entries
        .filter_map(|e| e.ok())
        .filter(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            name.starts_with(stem) && name.ends_with(".html")
        })
        .map(|e| {
            let modified = e.metadata().and_then(|m| m.modified()).unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, e.path())
        })
        .max_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
        .map(|(_, path)| path)
}

/// Start the dashboard server
pub async fn start_server(cfg: &AppConfig) -> anyhow::Result<()> {
    let state = Arc::new(ServerState::from_config(cfg));
    if !state.auth_configured() {
        tracing::warn!("server.password_sha256 or server.allowed_emails missing, every login will be refused");
    }
    let app = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], cfg.server.port));

    tracing::info!("🖥️ Dashboard server starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn state(dir: &Path) -> ServerState {
        ServerState {
            output_dir: dir.to_path_buf(),
            dashboard_prefix: "Market_Dashboard".into(),
            allowed_emails: vec!["desk@example.com".into()],
            password_sha256: Some(sha256_hex("hunter2")),
        }
    }

    fn basic(user: &str, pass: &str) -> String {
        format!("Basic {}", STANDARD.encode(format!("{}:{}", user, pass)))
    }

    #[test]
    fn test_authorize() {
        let dir = tempdir().unwrap();
        let s = state(dir.path());
        assert!(s.authorize(&basic("desk@example.com", "hunter2")));
        assert!(s.authorize(&basic("Desk@Example.com", "hunter2")));
        assert!(!s.authorize(&basic("desk@example.com", "wrong")));
        assert!(!s.authorize(&basic("other@example.com", "hunter2")));
        assert!(!s.authorize("Bearer abc"));

        let open = ServerState {
            password_sha256: None,
            ..s
        };
        assert!(!open.authorize(&basic("desk@example.com", "hunter2")));
    }

    #[test]
    fn test_password_with_colon() {
        let (email, password) = decode_basic(&basic("a@b.c", "x:y")).unwrap();
        assert_eq!(email, "a@b.c");
        assert_eq!(password, "x:y");
    }

    #[test]
    fn test_dashboard_stem_uses_prefix() {
        let dir = tempdir().unwrap();
        let s = state(dir.path());
        assert_eq!(s.stem_for(DASHBOARD_KEY), "Market_Dashboard");
        assert_eq!(s.stem_for("spx_vix"), "spx_vix");
    }

    #[test]
    fn test_rejects_path_like_keys() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("spx_vix.html"), "x").unwrap();
        let s = state(dir.path());
        assert!(s.resolve_section("../spx_vix").is_none());
        assert!(s.resolve_section("spx_vix").is_some());
    }
}
