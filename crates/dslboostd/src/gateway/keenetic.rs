//! Keenetic HTTP backend - the real command channel.
//!
//! Talks to the router's web interface: challenge-response login, then CLI
//! commands over `/api/cli`. Status is parsed from the text output of
//! `show interface Dsl0`; parameter writes become CLI commands followed by
//! `system configuration-save`.

use super::{DeviceGateway, GatewayMetrics};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use dslboost_shared::params::{ParameterSet, PARAM_ATTENUATION, PARAM_SNR_MARGIN};
use dslboost_shared::status::{LineStatus, StatusSnapshot};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const AUTH_TIMEOUT: Duration = Duration::from_secs(5);
const CLI_READ_TIMEOUT: Duration = Duration::from_secs(10);
const CLI_WRITE_TIMEOUT: Duration = Duration::from_secs(15);

/// HTTP client for one Keenetic router.
pub struct KeeneticClient {
    base_url: String,
    username: String,
    password: String,
    http: reqwest::Client,
    session_cookie: Option<String>,
    metrics: Arc<GatewayMetrics>,
}

impl KeeneticClient {
    pub fn new(host: &str, username: &str, password: &str, protocol: &str) -> Self {
        Self {
            base_url: format!("{protocol}://{host}"),
            username: username.to_string(),
            password: password.to_string(),
            http: reqwest::Client::new(),
            session_cookie: None,
            metrics: Arc::new(GatewayMetrics::new()),
        }
    }

    fn is_connected(&self) -> bool {
        self.session_cookie.is_some()
    }

    /// Challenge-response login against `/auth`.
    async fn connect(&mut self) -> Result<()> {
        let auth_url = format!("{}/auth", self.base_url);

        let challenge_resp = self
            .http
            .get(&auth_url)
            .timeout(AUTH_TIMEOUT)
            .send()
            .await
            .context("could not reach the router's auth endpoint")?;

        let realm = challenge_resp
            .headers()
            .get("x-ndm-realm")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("Keenetic")
            .to_string();
        let body: serde_json::Value = challenge_resp
            .json()
            .await
            .context("auth endpoint returned no JSON body")?;
        let challenge = body
            .get("challenge")
            .and_then(|c| c.as_str())
            .ok_or_else(|| anyhow!("router sent no challenge string"))?;

        let response_hash = login_digest(&self.username, &realm, &self.password, challenge);

        let login_resp = self
            .http
            .post(&auth_url)
            .timeout(AUTH_TIMEOUT)
            .json(&serde_json::json!({
                "login": self.username,
                "challenge": challenge,
                "response": response_hash,
            }))
            .send()
            .await
            .context("login request failed")?;

        let cookie = login_resp
            .headers()
            .get_all(reqwest::header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|c| c.starts_with("KSESSION"))
            .and_then(|c| c.split(';').next())
            .map(str::to_string);

        match cookie {
            Some(cookie) => {
                info!(host = %self.base_url, "authenticated with router");
                self.session_cookie = Some(cookie);
                Ok(())
            }
            None => bail!("authentication failed, check username and password"),
        }
    }

    async fn ensure_connected(&mut self) -> Result<()> {
        if !self.is_connected() {
            self.connect().await?;
        }
        Ok(())
    }

    /// Run CLI commands and return the per-command output blocks.
    async fn run_cli(&mut self, commands: &[String], timeout: Duration) -> Result<Vec<String>> {
        self.ensure_connected().await?;

        let cli_url = format!("{}/api/cli", self.base_url);
        let cookie = self.session_cookie.clone().unwrap_or_default();

        let resp = self
            .http
            .post(&cli_url)
            .timeout(timeout)
            .header(reqwest::header::COOKIE, cookie)
            .json(&serde_json::json!({ "commands": commands }))
            .send()
            .await
            .context("CLI request failed")?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            // Session expired; one re-login, no retry of the command.
            self.session_cookie = None;
            bail!("router session expired");
        }

        let body: serde_json::Value = resp.json().await.context("CLI response was not JSON")?;
        let responses = body
            .get("responses")
            .and_then(|r| r.as_array())
            .ok_or_else(|| anyhow!("CLI response missing 'responses' array"))?;

        let mut outputs = Vec::with_capacity(responses.len());
        for entry in responses {
            if let Some(level) = entry.pointer("/status/level").and_then(|l| l.as_str()) {
                if level == "error" {
                    let message = entry
                        .pointer("/status/message")
                        .and_then(|m| m.as_str())
                        .unwrap_or("unknown CLI error");
                    bail!("router reported CLI error: {message}");
                }
            }
            outputs.push(
                entry
                    .get("output")
                    .and_then(|o| o.as_str())
                    .unwrap_or_default()
                    .to_string(),
            );
        }
        Ok(outputs)
    }
}

/// Digest for the challenge-response login.
fn login_digest(username: &str, realm: &str, password: &str, challenge: &str) -> String {
    let h1 = hex::encode(Sha256::digest(format!("{username}:{realm}:{password}")));
    let h2 = hex::encode(Sha256::digest("POST:/auth"));
    hex::encode(Sha256::digest(format!("{h1}:{challenge}:{h2}")))
}

/// Parse the text output of `show interface Dsl0` into a snapshot.
fn parse_dsl_status(cli_output: &str) -> StatusSnapshot {
    let mut snap = StatusSnapshot::line_down();
    snap.timestamp_utc = Utc::now();

    for line in cli_output.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();

        match key.as_str() {
            "line status" | "state" => {
                if value.eq_ignore_ascii_case("up") {
                    snap.line_status = LineStatus::Up;
                }
            }
            "downstream rate" | "data rate down" => {
                snap.downstream_rate_kbps = parse_leading_number(value) as u32;
            }
            "upstream rate" | "data rate up" => {
                snap.upstream_rate_kbps = parse_leading_number(value) as u32;
            }
            "snr margin" | "snr margin down" => {
                snap.snr_margin_db = parse_leading_number(value);
            }
            "attenuation" | "attenuation down" => {
                snap.attenuation_db = parse_leading_number(value).max(0.0);
            }
            "crc errors" => {
                snap.crc_error_count = parse_leading_number(value) as u64;
            }
            _ => {}
        }
    }

    snap
}

/// First whitespace-separated token as a number; units like "kbps"/"dB"
/// trail behind it.
fn parse_leading_number(value: &str) -> f64 {
    value
        .split_whitespace()
        .next()
        .and_then(|t| t.parse::<f64>().ok())
        .unwrap_or(0.0)
}

#[async_trait]
impl DeviceGateway for KeeneticClient {
    async fn get_status(&mut self) -> Result<StatusSnapshot> {
        let result = self
            .run_cli(&["show interface Dsl0".to_string()], CLI_READ_TIMEOUT)
            .await;
        match result {
            Ok(outputs) => {
                let output = outputs.first().map(String::as_str).unwrap_or_default();
                if output.is_empty() {
                    self.metrics.record_failure();
                    bail!("empty response from CLI");
                }
                let mut snap = parse_dsl_status(output);
                self.metrics.record_success();
                snap.success_count = self.metrics.success_count();
                snap.failure_count = self.metrics.failure_count();
                Ok(snap)
            }
            Err(e) => {
                self.metrics.record_failure();
                Err(e)
            }
        }
    }

    async fn apply_parameters(&mut self, params: &ParameterSet) -> Result<()> {
        let mut commands = Vec::new();

        // The CLI takes SNR margin and attenuation in tenths of a dB.
        if let Some(snr) = params.get(PARAM_SNR_MARGIN) {
            commands.push(format!("interface Dsl0 snr-margin {}", (snr * 10.0) as i64));
        }
        if let Some(att) = params.get(PARAM_ATTENUATION) {
            commands.push(format!("interface Dsl0 attenuation {}", (att * 10.0) as i64));
        }
        for (name, _) in params.iter() {
            if name != PARAM_SNR_MARGIN && name != PARAM_ATTENUATION {
                warn!(parameter = name, "no CLI mapping for parameter, skipping");
            }
        }

        if commands.is_empty() {
            self.metrics.record_failure();
            bail!("no applicable parameters to set");
        }
        commands.push("system configuration-save".to_string());

        debug!(?commands, "sending parameter commands");
        match self.run_cli(&commands, CLI_WRITE_TIMEOUT).await {
            Ok(_) => {
                self.metrics.record_success();
                Ok(())
            }
            Err(e) => {
                self.metrics.record_failure();
                Err(e)
            }
        }
    }

    async fn get_full_state(&mut self) -> Result<serde_json::Value> {
        match self
            .run_cli(&["show running-config".to_string()], CLI_READ_TIMEOUT)
            .await
        {
            Ok(outputs) => {
                let config = outputs.into_iter().next().unwrap_or_default();
                if config.is_empty() {
                    self.metrics.record_failure();
                    bail!("router returned an empty running-config");
                }
                self.metrics.record_success();
                Ok(serde_json::json!({ "running_config": config }))
            }
            Err(e) => {
                self.metrics.record_failure();
                Err(e)
            }
        }
    }

    async fn set_full_state(&mut self, state: serde_json::Value) -> Result<()> {
        let config = state
            .get("running_config")
            .and_then(|c| c.as_str())
            .ok_or_else(|| anyhow!("state blob has no running_config"))?;

        let mut commands: Vec<String> = config
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('!'))
            .map(str::to_string)
            .collect();
        commands.push("system configuration-save".to_string());

        match self.run_cli(&commands, CLI_WRITE_TIMEOUT).await {
            Ok(_) => {
                self.metrics.record_success();
                Ok(())
            }
            Err(e) => {
                self.metrics.record_failure();
                Err(e)
            }
        }
    }

    fn metrics(&self) -> Arc<GatewayMetrics> {
        Arc::clone(&self.metrics)
    }
}
