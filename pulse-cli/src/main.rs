//! pulse-cli — command-line client for the PulseBridge HTTP API
//!
//! # Subcommands
//! - `consult <text> [--age N] [--history cond ...] [--json]` — full consultation
//! - `route <text> [--age N]`                                — triage routing only
//! - `status`                                                 — show server health

use clap::{Parser, Subcommand};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8767";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "pulse-cli", version, about = "PulseBridge symptom triage client")]
struct Cli {
    /// PulseBridge HTTP server URL (overrides PULSE_HTTP_URL env var)
    #[arg(long, env = "PULSE_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Describe symptoms and wait for the full consultation
    Consult {
        /// Free-text description of the symptoms
        text: String,

        #[arg(long)]
        age: Option<u32>,

        /// Known conditions, e.g. --history hypertension --history diabetes
        #[arg(long)]
        history: Vec<String>,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Ask only which specialty the symptoms belong to
    Route {
        text: String,

        #[arg(long)]
        age: Option<u32>,
    },

    /// Show PulseBridge server status
    Status,
}

// ============================================================================
// API Response Types
// ============================================================================

/// Body of POST /consult
#[derive(Debug, Deserialize)]
pub struct ConsultResult {
    pub success: bool,
    #[serde(rename = "type")]
    pub kind: String,
    pub response: String,
    pub session_id: Option<String>,
    pub took_ms: Option<u64>,
}

/// Body of POST /route
#[derive(Debug, Deserialize)]
pub struct RouteResult {
    pub recommended_specialty: String,
    pub confidence: f64,
    pub urgency_level: String,
    pub reasoning: String,
    pub secondary_specialty: Option<String>,
    #[serde(default)]
    pub routing_fallback: bool,
}

pub fn consult_body(text: &str, age: Option<u32>, history: &[String]) -> serde_json::Value {
    let mut body = serde_json::json!({ "message": text });
    if let Some(age) = age {
        body["age"] = serde_json::json!(age);
    }
    if !history.is_empty() {
        body["history"] = serde_json::json!(history);
    }
    body
}

pub fn format_route(route: &RouteResult) -> String {
    let mut out = format!(
        "Specialty:  {}\nConfidence: {:.0}%\nUrgency:    {}\n",
        route.recommended_specialty,
        route.confidence * 100.0,
        route.urgency_level
    );
    if let Some(secondary) = &route.secondary_specialty {
        out.push_str(&format!("Secondary:  {}\n", secondary));
    }
    if route.routing_fallback {
        out.push_str("(no specialty matched; default routing applied)\n");
    }
    out.push('\n');
    out.push_str(&route.reasoning);
    out
}

/// One line per agent from the /health body.
pub fn format_agents(health: &serde_json::Value) -> Vec<String> {
    health["agents"]
        .as_array()
        .map(|agents| {
            agents
                .iter()
                .map(|a| {
                    format!(
                        "  {:<12} {:<12} {}",
                        a["role"].as_str().unwrap_or("?"),
                        a["address"].as_str().unwrap_or("?"),
                        a["status"].as_str().unwrap_or("unknown"),
                    )
                })
                .collect()
        })
        .unwrap_or_default()
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn post_json(
    server: &str,
    endpoint: &str,
    body: &serde_json::Value,
    timeout_secs: u64,
) -> anyhow::Result<reqwest::blocking::Response> {
    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()?;

    let url = format!("{}{}", server, endpoint);
    let resp = match client.post(&url).json(body).send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("pulse-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        eprintln!("pulse-cli: server returned {}: {}", status, body);
        std::process::exit(1);
    }
    Ok(resp)
}

fn do_consult(
    server: &str,
    text: &str,
    age: Option<u32>,
    history: &[String],
    json_output: bool,
) -> anyhow::Result<()> {
    // The server waits up to its poll timeout for the specialists.
    let resp = post_json(server, "/consult", &consult_body(text, age, history), 90)?;

    if json_output {
        let body: serde_json::Value = resp.json()?;
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let result: ConsultResult = match resp.json() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("pulse-cli: failed to parse consultation response: {}", e);
            std::process::exit(1);
        }
    };
    println!("{}", result.response);
    if let (Some(session), Some(ms)) = (&result.session_id, result.took_ms) {
        eprintln!("\n[{} {} in {} ms]", result.kind, session, ms);
    }
    if !result.success {
        std::process::exit(2);
    }
    Ok(())
}

fn do_route(server: &str, text: &str, age: Option<u32>) -> anyhow::Result<()> {
    let body = serde_json::json!({ "symptoms": text, "age": age });
    let resp = post_json(server, "/route", &body, 30)?;
    let route: RouteResult = match resp.json() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("pulse-cli: failed to parse route response: {}", e);
            std::process::exit(1);
        }
    };
    println!("{}", format_route(&route));
    Ok(())
}

/// Show the server status by calling GET /health.
fn do_status(server: &str) -> anyhow::Result<()> {
    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()?;

    let url = format!("{}/health", server);
    match client.get(&url).send() {
        Ok(r) => {
            let code = r.status();
            let body: serde_json::Value = r.json().unwrap_or_default();
            println!("PulseBridge server: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Version:            {}", body["version"].as_str().unwrap_or("?"));
            println!("Active sessions:    {}", body["active_sessions"]);
            println!("Socket:             {}", body["socket"].as_str().unwrap_or("?"));
            println!("Agents:");
            for line in format_agents(&body) {
                println!("{}", line);
            }
            if !code.is_success() {
                eprintln!("pulse-cli: server unhealthy (HTTP {})", code);
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("pulse-cli: cannot reach {} — {}", url, e);
            std::process::exit(1);
        }
    }

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Consult {
            text,
            age,
            history,
            json,
        } => do_consult(&server, &text, age, &history, json),
        Commands::Route { text, age } => do_route(&server, &text, age),
        Commands::Status => do_status(&server),
    };

    if let Err(e) = result {
        eprintln!("pulse-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
