//! Chat command - one prompt against a running server, streamed to the
//! terminal.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context as _, Result, anyhow};
use clap::Args;
use console::Style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use parley_client::{ParleyClient, Session, SessionStore, StreamConsumer, StreamOutcome};
use parley_config::ParleyConfig;
use parley_types::{ChatApiRequest, ProviderType, Role, ToolCallState};

use super::Context;

/// Arguments for the chat command.
#[derive(Args, Debug)]
pub struct ChatArgs {
    /// The prompt to send
    #[arg(required = true)]
    pub prompt: String,

    /// Server URL
    #[arg(long, env = "PARLEY_SERVER_URL", default_value = "http://127.0.0.1:8787")]
    pub server: String,

    /// Provider type: openai, anthropic, gemini, siliconflow or custom
    #[arg(long, default_value = "openai")]
    pub provider: String,

    /// Model id as the provider names it
    #[arg(short, long)]
    pub model: String,

    /// Provider base URL (required for custom providers)
    #[arg(long)]
    pub base_url: Option<String>,

    /// API key sent with the request instead of the server's environment
    #[arg(long)]
    pub api_key: Option<String>,

    /// System prompt
    #[arg(short, long)]
    pub system: Option<String>,

    /// JSON Schema file the reply must satisfy
    #[arg(long)]
    pub schema: Option<PathBuf>,

    /// Sampling temperature
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Do not offer the configured tool servers
    #[arg(long)]
    pub no_tools: bool,

    /// Redact sensitive terms and screen for prompt injection on the server
    #[arg(long)]
    pub preprocess: bool,
}

/// Run the chat command.
pub async fn run(args: ChatArgs, ctx: &Context) -> Result<()> {
    let template = build_template(&args, &ctx.loaded.config)?;
    let client = ParleyClient::new(args.server.as_str())
        .with_context(|| format!("invalid server URL {}", args.server))?;

    if ctx.verbose {
        let dim = Style::new().dim();
        eprintln!("{}", dim.apply_to(format!("Sending to: {}", args.server)));
        if let Some(servers) = &template.eligible_tool_servers {
            eprintln!("{}", dim.apply_to(format!("Tool servers: {}", servers.len())));
        }
    }

    let store = SessionStore::new();
    let session_id = store.create_session(Session::new());
    let consumer = StreamConsumer::new(client, store.clone());
    let cancel = CancellationToken::new();
    let mut changes = store.subscribe();

    let mut send = {
        let cancel = cancel.clone();
        let session_id = session_id.clone();
        let prompt = args.prompt.clone();
        tokio::spawn(async move {
            consumer
                .send_text(&session_id, &prompt, template, cancel)
                .await
        })
    };

    let mut renderer = Renderer::new(Some(spinner()?));
    let mut stdout = std::io::stdout();

    let outcome = loop {
        tokio::select! {
            joined = &mut send => break joined.context("chat task failed")?,
            _ = tokio::signal::ctrl_c() => cancel.cancel(),
            _ = changes.changed() => {
                if let Some(session) = store.session(&session_id) {
                    renderer.render(&session, &mut stdout)?;
                }
            }
        }
    };

    if let Some(session) = store.session(&session_id) {
        renderer.render(&session, &mut stdout)?;
    }
    renderer.finish(&mut stdout)?;

    match outcome {
        Ok(StreamOutcome::Completed) | Ok(StreamOutcome::Superseded) => Ok(()),
        Ok(StreamOutcome::Cancelled) => {
            eprintln!("{}", Style::new().dim().apply_to("[cancelled]"));
            Ok(())
        }
        Err(e) => Err(anyhow::Error::new(e).context("chat request failed")),
    }
}

fn spinner() -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.dim} {msg:.dim}")?);
    spinner.set_message("waiting for reply");
    spinner.enable_steady_tick(Duration::from_millis(100));
    Ok(spinner)
}

/// Provider settings for the request; the consumer fills in history and
/// the chat id.
fn build_template(args: &ChatArgs, config: &ParleyConfig) -> Result<ChatApiRequest> {
    let provider = ProviderType::from_name(&args.provider).ok_or_else(|| {
        let known: Vec<&str> = ProviderType::ALL.iter().map(|p| p.name()).collect();
        anyhow!(
            "unknown provider '{}' (expected one of: {})",
            args.provider,
            known.join(", ")
        )
    })?;

    let json_schema = match &args.schema {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading schema {}", path.display()))?;
            let schema: serde_json::Value = serde_json::from_str(&text)
                .with_context(|| format!("parsing schema {}", path.display()))?;
            Some(schema)
        }
        None => None,
    };

    let tool_servers = if args.no_tools {
        None
    } else {
        Some(config.tool_servers()).filter(|servers| !servers.is_empty())
    };

    Ok(ChatApiRequest {
        provider_type: Some(provider.name().to_string()),
        model_id: Some(args.model.clone()),
        base_url: args.base_url.clone(),
        client_provided_api_key: args.api_key.clone(),
        temperature: args.temperature,
        system_prompt: args.system.clone(),
        stream: Some(true),
        json_schema,
        enable_input_preprocessing: args.preprocess.then_some(true),
        eligible_tool_servers: tool_servers,
        ..Default::default()
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Rendering
// ─────────────────────────────────────────────────────────────────────────────

/// Prints whatever changed in the session since the last call.
struct Renderer {
    spinner: Option<ProgressBar>,
    printed: HashMap<String, usize>,
    tool_states: HashMap<String, ToolCallState>,
    reported_errors: HashSet<String>,
    session_error: Option<String>,
    mid_line: bool,
    dim: Style,
    red: Style,
}

impl Renderer {
    fn new(spinner: Option<ProgressBar>) -> Self {
        Self {
            spinner,
            printed: HashMap::new(),
            tool_states: HashMap::new(),
            reported_errors: HashSet::new(),
            session_error: None,
            mid_line: false,
            dim: Style::new().dim(),
            red: Style::new().red(),
        }
    }

    fn clear_spinner(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }

    fn break_line(&mut self, out: &mut impl Write) -> std::io::Result<()> {
        if self.mid_line {
            writeln!(out)?;
            self.mid_line = false;
        }
        Ok(())
    }

    fn render(&mut self, session: &Session, out: &mut impl Write) -> std::io::Result<()> {
        for msg in session.messages.iter().filter(|m| m.role == Role::Assistant) {
            let text = msg.text();
            let done = self.printed.get(&msg.id).copied().unwrap_or(0);
            if let Some(fresh) = text.get(done..)
                && !fresh.is_empty()
            {
                self.clear_spinner();
                write!(out, "{}", fresh)?;
                self.mid_line = !fresh.ends_with('\n');
                self.printed.insert(msg.id.clone(), text.len());
            }

            for status in &msg.tool_call_statuses {
                if self.tool_states.get(&status.tool_call_id) == Some(&status.status) {
                    continue;
                }
                self.tool_states
                    .insert(status.tool_call_id.clone(), status.status);
                self.clear_spinner();
                self.break_line(out)?;
                let line = match status.status {
                    ToolCallState::Calling => {
                        format!("[calling {}/{}]", status.server_name, status.tool_name)
                    }
                    ToolCallState::Success => format!("[{} done]", status.tool_name),
                    ToolCallState::Error => format!(
                        "[{} failed: {}]",
                        status.tool_name,
                        status.error.as_deref().unwrap_or("unknown error")
                    ),
                };
                writeln!(out, "{}", self.dim.apply_to(line))?;
            }

            if let Some(error) = &msg.error
                && self.reported_errors.insert(msg.id.clone())
            {
                self.clear_spinner();
                self.break_line(out)?;
                writeln!(out, "{} {}", self.red.apply_to("Error:"), error)?;
            }
        }

        if session.error != self.session_error {
            if let Some(error) = &session.error {
                self.clear_spinner();
                self.break_line(out)?;
                writeln!(out, "{} {}", self.red.apply_to("Error:"), error)?;
            }
            self.session_error = session.error.clone();
        }

        out.flush()
    }

    fn finish(&mut self, out: &mut impl Write) -> std::io::Result<()> {
        self.clear_spinner();
        self.break_line(out)?;
        out.flush()
    }
}
