//! Title recognizers: turn a prepared title PNG into text.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use base64::Engine;
use cardscan_core::config::RecognizerConfig;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;

use crate::prelude::*;

pub trait Recognizer {
    async fn recognize(&self, png: &[u8]) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Noop
// ---------------------------------------------------------------------------

/// Recognizes nothing; every card gets the unknown label.
pub struct NoopRecognizer;

impl Recognizer for NoopRecognizer {
    async fn recognize(&self, _png: &[u8]) -> Result<String> {
        Ok(String::new())
    }
}

// ---------------------------------------------------------------------------
// External command
// ---------------------------------------------------------------------------

/// Runs a local program with the PNG on stdin and reads text from stdout.
pub struct CommandRecognizer {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandRecognizer {
    pub fn new(command_line: &str, timeout: Duration) -> Result<Self> {
        let parts = shlex::split(command_line)
            .ok_or_else(|| eyre!("Invalid recognizer command: {command_line}"))?;
        let (program, args) = parts
            .split_first()
            .ok_or_eyre("Recognizer command is empty")?;
        let program = which::which(program)
            .wrap_err_with(|| f!("Recognizer program '{program}' not found in PATH"))?;

        Ok(Self {
            program,
            args: args.to_vec(),
            timeout,
        })
    }
}

impl Recognizer for CommandRecognizer {
    async fn recognize(&self, png: &[u8]) -> Result<String> {
        let mut child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .wrap_err_with(|| f!("Failed to start {}", self.program.display()))?;

        let mut stdin = child.stdin.take().ok_or_eyre("Recognizer stdin unavailable")?;
        let write = async move {
            let result = stdin.write_all(png).await;
            drop(stdin);
            result
        };

        let (written, output) = tokio::time::timeout(self.timeout, async {
            tokio::join!(write, child.wait_with_output())
        })
        .await
        .map_err(|_| Error::Recognizer(f!("timed out after {:?}", self.timeout)))?;

        let output = output?;
        if !output.status.success() {
            return Err(Error::Recognizer(f!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ))
            .into());
        }
        // A program that exits successfully without reading all input is fine.
        if let Err(e) = written {
            log::debug!("recognizer closed stdin early: {e}");
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

// ---------------------------------------------------------------------------
// Responses API
// ---------------------------------------------------------------------------

/// Sends the title as a data URL to a multimodal responses endpoint.
pub struct ResponsesRecognizer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    prompt: String,
    max_output_tokens: u32,
}

impl ResponsesRecognizer {
    pub fn new(config: &RecognizerConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .wrap_err_with(|| f!("{} is not set", config.api_key_env))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
            model: config.model.clone(),
            prompt: config.prompt.clone(),
            max_output_tokens: config.max_output_tokens,
        })
    }

    fn request_body(&self, png: &[u8]) -> Value {
        let data = base64::engine::general_purpose::STANDARD.encode(png);
        json!({
            "model": self.model,
            "input": [{
                "role": "user",
                "content": [
                    { "type": "input_text", "text": self.prompt },
                    { "type": "input_image", "image_url": f!("data:image/png;base64,{data}") }
                ]
            }],
            "max_output_tokens": self.max_output_tokens,
        })
    }
}

impl Recognizer for ResponsesRecognizer {
    async fn recognize(&self, png: &[u8]) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(png))
            .send()
            .await
            .map_err(|e| Error::Recognizer(f!("request to {} failed: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::RecognizerHttp {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| Error::Recognizer(f!("invalid response body: {e}")))?;
        Ok(output_text(&value))
    }
}

/// Concatenate every `output_text` part of a responses payload.
pub fn output_text(value: &Value) -> String {
    value["output"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|item| item["content"].as_array())
        .flatten()
        .filter(|part| part["type"] == "output_text")
        .filter_map(|part| part["text"].as_str())
        .collect::<Vec<_>>()
        .join("")
        .trim()
        .to_string()
}
