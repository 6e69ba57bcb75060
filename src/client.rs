//! HTTP gateway client and the interactive `upload` subcommand.

use reqwest::StatusCode;
use serde::Deserialize;
use std::io::Write as _;
use tracing::debug;

use crate::category::Category;
use crate::config::{ConflictPolicy, UploadArgs};
use crate::orchestrator::{
    GatewayError, MediaGateway, SubmitOutcome, UploadEvents, UploadOrchestrator,
};

/// [`MediaGateway`] over the server's JSON API.
pub struct HttpGateway {
    client: reqwest::Client,
    base: String,
}

#[derive(Deserialize)]
struct MessageBody {
    message: Option<String>,
}

#[derive(Deserialize)]
struct UploadBody {
    url: String,
}

impl HttpGateway {
    pub fn new(base: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base: base.trim_end_matches('/').to_string(),
        }
    }

    async fn error_message(response: reqwest::Response) -> String {
        let status = response.status();
        match response.json::<MessageBody>().await {
            Ok(MessageBody {
                message: Some(message),
            }) => message,
            _ => format!("request failed with status {status}"),
        }
    }
}

impl MediaGateway for HttpGateway {
    async fn create(
        &mut self,
        category: Category,
        name: &str,
        payload: &str,
        content_type: &str,
    ) -> Result<String, GatewayError> {
        debug!(category = %category, name, "submit upload");
        let response = self
            .client
            .post(format!("{}/api/upload", self.base))
            .json(&serde_json::json!({
                "type": category.as_str(),
                "name": name,
                "base64": payload,
                "mimetype": content_type,
            }))
            .send()
            .await
            .map_err(|err| GatewayError::Transport(err.to_string()))?;

        if response.status().is_success() {
            let body: UploadBody = response
                .json()
                .await
                .map_err(|err| GatewayError::Transport(err.to_string()))?;
            return Ok(body.url);
        }
        if response.status() == StatusCode::CONFLICT {
            return Err(GatewayError::Conflict(Self::error_message(response).await));
        }
        Err(GatewayError::Rejected(Self::error_message(response).await))
    }

    async fn delete(&mut self, category: Category, name: &str) -> Result<(), GatewayError> {
        debug!(category = %category, name, "delete object");
        let response = self
            .client
            .delete(format!("{}/api/{}/{}", self.base, category, name))
            .send()
            .await
            .map_err(|err| GatewayError::Transport(err.to_string()))?;

        if response.status().is_success() {
            return Ok(());
        }
        Err(GatewayError::Rejected(Self::error_message(response).await))
    }
}

// Console sink for terminal transitions.
struct ConsoleEvents;

impl UploadEvents for ConsoleEvents {
    fn completed(&mut self, url: &str) {
        println!("uploaded: {url}");
    }

    fn failed(&mut self, message: &str) {
        eprintln!("upload failed: {message}");
    }
}

enum Resolution {
    Rename(String),
    Replace,
    Cancel,
}

/// Runs the `upload` subcommand to completion, prompting on duplicate
/// names unless `--on-conflict` was given.
pub async fn run_upload(args: UploadArgs) -> Result<(), std::io::Error> {
    let category = Category::parse(&args.category).ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("unknown category: {}", args.category),
        )
    })?;
    let bytes = tokio::fs::read(&args.file).await?;
    let name = match args.name {
        Some(ref name) => name.clone(),
        None => args
            .file
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "file has no name")
            })?,
    };
    let content_type = mime_guess::from_path(&args.file)
        .first_or_octet_stream()
        .essence_str()
        .to_string();

    let gateway = HttpGateway::new(&args.server);
    let mut orchestrator = UploadOrchestrator::new(gateway, ConsoleEvents, category);

    let mut outcome = orchestrator.submit(&name, &content_type, &bytes).await;
    loop {
        let suggested_name = match outcome {
            SubmitOutcome::Completed { .. } => return Ok(()),
            SubmitOutcome::Failed => {
                return Err(std::io::Error::other("upload failed"));
            }
            SubmitOutcome::Conflict { suggested_name } => suggested_name,
        };

        let resolution = match args.on_conflict {
            Some(ConflictPolicy::Rename) => Resolution::Rename(suggested_name),
            Some(ConflictPolicy::Replace) => Resolution::Replace,
            Some(ConflictPolicy::Cancel) => Resolution::Cancel,
            None => prompt_resolution(&suggested_name)?,
        };

        outcome = match resolution {
            Resolution::Rename(new_name) => orchestrator.resolve_rename(&new_name).await,
            Resolution::Replace => orchestrator.resolve_replace().await,
            Resolution::Cancel => {
                orchestrator.cancel();
                println!("upload cancelled");
                return Ok(());
            }
        };
    }
}

fn prompt_resolution(suggested: &str) -> Result<Resolution, std::io::Error> {
    print!(
        "a file with that name already exists; [r]ename to {suggested}, [o]verwrite, or [c]ancel? "
    );
    std::io::stdout().flush()?;

    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    match line.trim().to_ascii_lowercase().as_str() {
        "" | "r" | "rename" => Ok(Resolution::Rename(suggested.to_string())),
        "o" | "overwrite" | "replace" => Ok(Resolution::Replace),
        _ => Ok(Resolution::Cancel),
    }
}
