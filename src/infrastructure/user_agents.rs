//! User-agent rotation
//!
//! A pool is built once per process and handed to the fetch strategy. It
//! starts from an optional remote JSON list and always falls back to the
//! built-in browser strings.

use anyhow::{Context, Result, anyhow};
use std::time::Duration;
use tracing::{info, warn};

/// Realistic desktop and mobile browser identities
pub const FALLBACK_USER_AGENTS: [&str; 5] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.0.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) CriOS/124.0.6367.88 Mobile/15E148 Safari/604.1",
];

/// Source of client identities for outbound requests
pub trait UserAgentProvider: Send + Sync {
    fn next_user_agent(&self) -> String;
}

#[derive(Debug, Clone)]
pub struct UserAgentPool {
    agents: Vec<String>,
}

impl UserAgentPool {
    /// Pool over `agents`; an empty list falls back to the built-in strings
    pub fn new(agents: Vec<String>) -> Self {
        let agents: Vec<String> = agents
            .into_iter()
            .map(|agent| agent.trim().to_string())
            .filter(|agent| !agent.is_empty())
            .collect();

        if agents.is_empty() {
            Self::fallback()
        } else {
            Self { agents }
        }
    }

    pub fn fallback() -> Self {
        Self {
            agents: FALLBACK_USER_AGENTS.iter().map(|a| (*a).to_string()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Fetch a JSON array of user-agent strings
    pub async fn fetch_remote(url: &str, timeout: Duration) -> Result<Vec<String>> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

        let response = client
            .get(url)
            .send()
            .await
            .with_context(|| format!("User-agent list request failed: {url}"))?
            .error_for_status()?;

        let agents: Vec<String> = response
            .json()
            .await
            .context("User-agent list is not a JSON array of strings")?;
        Ok(agents)
    }

    /// Build the pool for this process: the remote list when configured and
    /// reachable, the built-in list otherwise
    pub async fn load(remote_url: Option<&str>, timeout: Duration) -> Self {
        let Some(url) = remote_url else {
            return Self::fallback();
        };

        match Self::fetch_remote(url, timeout).await {
            Ok(agents) if !agents.is_empty() => {
                info!("Loaded {} user agents from {}", agents.len(), url);
                Self::new(agents)
            }
            Ok(_) => {
                warn!("User-agent list at {} is empty, using built-in list", url);
                Self::fallback()
            }
            Err(e) => {
                warn!("Failed to load user agents ({}), using built-in list", e);
                Self::fallback()
            }
        }
    }
}

impl UserAgentProvider for UserAgentPool {
    fn next_user_agent(&self) -> String {
        // The pool is never empty; `new` and `fallback` guarantee it
        let index = fastrand::usize(..self.agents.len().max(1));
        self.agents
            .get(index)
            .cloned()
            .unwrap_or_else(|| FALLBACK_USER_AGENTS[0].to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_list_uses_fallback() {
        let pool = UserAgentPool::new(vec![" ".to_string()]);
        assert_eq!(pool.len(), FALLBACK_USER_AGENTS.len());
    }

    #[test]
    fn test_rotation_stays_within_pool() {
        let pool = UserAgentPool::new(vec!["agent-a".to_string(), "agent-b".to_string()]);
        for _ in 0..50 {
            let agent = pool.next_user_agent();
            assert!(agent == "agent-a" || agent == "agent-b");
        }
    }

    #[tokio::test]
    async fn test_load_without_remote_url() {
        let pool = UserAgentPool::load(None, Duration::from_secs(1)).await;
        assert!(!pool.is_empty());
        assert!(FALLBACK_USER_AGENTS.contains(&pool.next_user_agent().as_str()));
    }

    #[tokio::test]
    async fn test_unreachable_remote_falls_back() {
        let pool = UserAgentPool::load(Some("http://127.0.0.1:9/agents.json"), Duration::from_millis(200)).await;
        assert_eq!(pool.len(), FALLBACK_USER_AGENTS.len());
    }
}
