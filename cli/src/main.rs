mod api;
mod error;
mod jwt;
mod quiz;
mod session;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use reqwest::Method;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::api::ApiClient;
use crate::error::CliError;
use crate::quiz::{QuizWizard, parse_preference};
use crate::session::{SessionStore, unix_now};

#[derive(Parser, Debug)]
#[command(name = "scentmatch-cli", about = "ScentMatch API client")]
struct Cli {
    #[arg(long, env = "SCENTMATCH_BASE_URL", default_value = "http://127.0.0.1:8000")]
    base_url: String,

    #[arg(long, env = "SCENTMATCH_SESSION_FILE")]
    session_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account and log in.
    Signup(SignupArgs),
    Login(LoginArgs),
    Logout,
    /// Show the logged-in user.
    Whoami {
        /// Decode the stored token instead of asking the server.
        #[arg(long)]
        local: bool,
    },
    /// Save quiz answers and print recommendations.
    Quiz(QuizArgs),
    /// Fragrances similar to one or more catalog entries.
    Similar {
        #[arg(required = true, num_args = 1..)]
        ids: Vec<Uuid>,
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
    Search {
        query: String,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    Autocomplete {
        query: String,
        #[arg(long, default_value_t = 8)]
        limit: u32,
    },
    Popular {
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
    /// Profile analytics; defaults to the logged-in user.
    Profile { user_id: Option<Uuid> },
    Catalog(CatalogCommand),
    Health,
}

#[derive(Args, Debug)]
struct SignupArgs {
    email: String,
    #[arg(long, env = "SCENTMATCH_PASSWORD", hide_env_values = true)]
    password: String,
    #[arg(long)]
    first_name: Option<String>,
    #[arg(long)]
    last_name: Option<String>,
}

#[derive(Args, Debug)]
struct LoginArgs {
    email: String,
    #[arg(long, env = "SCENTMATCH_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Args, Debug)]
struct QuizArgs {
    /// NAME=IMPORTANCE, importance 1-10. Repeatable.
    #[arg(long = "note")]
    notes: Vec<String>,
    /// NAME=IMPORTANCE, importance 1-10. Repeatable.
    #[arg(long = "accord")]
    accords: Vec<String>,
    /// Catalog ID of a fragrance you own. Repeatable.
    #[arg(long = "owned")]
    owned: Vec<Uuid>,
    #[arg(long, default_value_t = 10)]
    limit: u32,
}

#[derive(Args, Debug)]
struct CatalogCommand {
    #[command(subcommand)]
    command: CatalogSubcommand,
}

#[derive(Subcommand, Debug)]
enum CatalogSubcommand {
    /// Upsert fragrances from a JSONL file (superuser).
    Import { file: PathBuf },
    /// Rebuild the server's recommendation engines.
    Init,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let store = match cli.session_file {
        Some(path) => SessionStore::new(path),
        None => SessionStore::default_location()?,
    };
    let api = ApiClient::new(&cli.base_url, store)?;

    match cli.command {
        Command::Signup(args) => run_signup(&api, args).await,
        Command::Login(args) => {
            api.login(&args.email, &args.password).await?;
            println!("Logged in as {}", args.email);
            eprintln!("session saved to {}", api.store().path().display());
            Ok(())
        }
        Command::Logout => {
            if api.logout().await? {
                println!("Logged out");
            } else {
                println!("Local session cleared");
            }
            Ok(())
        }
        Command::Whoami { local: true } => run_whoami_local(&api),
        Command::Whoami { local: false } => {
            let me = api.authed(Method::GET, &api.api_url("/auth/me"), None).await?;
            print_json(&me)
        }
        Command::Quiz(args) => run_quiz(&api, args).await,
        Command::Similar { ids, limit } => {
            let ids: Vec<String> = ids.iter().map(Uuid::to_string).collect();
            let body = json!({ "target_fragrance_ids": ids, "limit": limit });
            let result = api.post(&api.api_url("/recommendations/similarity"), &body).await?;
            if let Some(targets) = result.get("target_fragrances").and_then(Value::as_array) {
                let names: Vec<&str> = targets.iter().filter_map(|t| t.get("name").and_then(Value::as_str)).collect();
                println!("Similar to {} ({})", names.join(", "), str_field(&result, "analysis_type"));
            }
            print_recommendations(&result);
            Ok(())
        }
        Command::Search { query, limit } => {
            let url = api.api_url("/recommendations/search");
            let results = api.get_query(&url, &[("q", query), ("limit", limit.to_string())]).await?;
            print_search_results(&results);
            Ok(())
        }
        Command::Autocomplete { query, limit } => {
            let url = api.api_url("/recommendations/autocomplete");
            let results = api.get_query(&url, &[("q", query), ("limit", limit.to_string())]).await?;
            print_search_results(&results);
            Ok(())
        }
        Command::Popular { limit } => {
            let url = api.api_url("/recommendations/popular");
            let results = api.get_query(&url, &[("limit", limit.to_string())]).await?;
            print_search_results(&results);
            Ok(())
        }
        Command::Profile { user_id } => run_profile(&api, user_id).await,
        Command::Catalog(catalog) => run_catalog(&api, catalog).await,
        Command::Health => {
            let health = api.get(&api.root_url("/health/detailed")).await?;
            print_json(&health)
        }
    }
}

// =============================================================================
// ACCOUNT
// =============================================================================

async fn run_signup(api: &ApiClient, args: SignupArgs) -> Result<(), CliError> {
    let body = json!({
        "email": &args.email,
        "password": &args.password,
        "first_name": &args.first_name,
        "last_name": &args.last_name,
    });
    let created = api.post(&api.api_url("/auth/register"), &body).await?;
    let email = created.get("email").and_then(Value::as_str).unwrap_or(&args.email);
    println!("Account created for {email}");

    api.login(&args.email, &args.password).await?;
    println!("Logged in");
    Ok(())
}

fn run_whoami_local(api: &ApiClient) -> Result<(), CliError> {
    let session = api.store().load()?.ok_or(CliError::NotLoggedIn)?;
    let claims = jwt::decode_unverified(&session.access_token)?;
    println!("subject: {}", claims.sub);
    println!("email:   {}", claims.email.as_deref().unwrap_or("-"));
    println!("type:    {}", claims.kind.as_deref().unwrap_or("-"));
    println!("expires: {}", describe_expiry(session.expires_at, unix_now()));
    Ok(())
}

async fn run_profile(api: &ApiClient, user_id: Option<Uuid>) -> Result<(), CliError> {
    let user_id = match user_id {
        Some(id) => id.to_string(),
        None => {
            let me = api.authed(Method::GET, &api.api_url("/auth/me"), None).await?;
            me.get("id")
                .and_then(Value::as_str)
                .map(ToOwned::to_owned)
                .ok_or(CliError::MissingField("id"))?
        }
    };
    let profile = api
        .authed(Method::GET, &api.api_url(&format!("/profile/{user_id}")), None)
        .await?;
    print_json(&profile)
}

// =============================================================================
// QUIZ
// =============================================================================

async fn run_quiz(api: &ApiClient, args: QuizArgs) -> Result<(), CliError> {
    let mut wizard = QuizWizard::new();
    announce(&wizard);
    for raw in &args.notes {
        let (name, importance) = parse_preference(raw)?;
        wizard.add_note(&name, importance)?;
    }
    wizard.advance()?;

    announce(&wizard);
    for raw in &args.accords {
        let (name, importance) = parse_preference(raw)?;
        wizard.add_accord(&name, importance)?;
    }
    wizard.advance()?;

    announce(&wizard);
    for id in &args.owned {
        wizard.add_owned(*id)?;
    }
    wizard.advance()?;

    announce(&wizard);
    eprintln!(
        "  {} notes, {} accords, {} owned",
        wizard.notes().len(),
        wizard.accords().len(),
        wizard.owned().len()
    );
    let submission = wizard.submission()?;

    let saved = api
        .authed(
            Method::POST,
            &api.api_url("/recommendations/save-quiz-profile"),
            Some(&submission.save_quiz_body()),
        )
        .await?;
    eprintln!("{}", str_field(&saved, "message"));

    if let Some(body) = submission.save_owned_body() {
        let saved = api
            .authed(Method::POST, &api.api_url("/recommendations/save-owned-fragrances"), Some(&body))
            .await?;
        eprintln!("{}", str_field(&saved, "message"));
    }

    let result = api
        .post(&api.api_url("/recommendations/note-based"), &submission.note_based_body(args.limit))
        .await?;
    print_recommendations(&result);
    Ok(())
}

fn announce(wizard: &QuizWizard) {
    let step = wizard.step();
    eprintln!("Step {}/4: {}", step.number(), step.title());
}

// =============================================================================
// CATALOG
// =============================================================================

async fn run_catalog(api: &ApiClient, catalog: CatalogCommand) -> Result<(), CliError> {
    match catalog.command {
        CatalogSubcommand::Import { file } => {
            let jsonl = std::fs::read_to_string(&file)
                .map_err(|source| CliError::Input { path: file.display().to_string(), source })?;
            let summary = api
                .authed(
                    Method::POST,
                    &api.api_url("/recommendations/catalog/import"),
                    Some(&json!({ "jsonl": jsonl })),
                )
                .await?;
            println!(
                "imported {} skipped {}",
                summary.get("imported").and_then(Value::as_u64).unwrap_or(0),
                summary.get("skipped").and_then(Value::as_u64).unwrap_or(0)
            );
            Ok(())
        }
        CatalogSubcommand::Init => {
            let result = api
                .post(&api.api_url("/recommendations/debug/initialize"), &json!({}))
                .await?;
            if str_field(&result, "status") == "success" {
                println!("{}", str_field(&result, "message"));
                Ok(())
            } else {
                Err(CliError::Server { status: 200, message: str_field(&result, "message").to_owned() })
            }
        }
    }
}

// =============================================================================
// OUTPUT
// =============================================================================

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

fn print_recommendations(result: &Value) {
    for line in recommendation_lines(result) {
        println!("{line}");
    }
}

fn print_search_results(results: &Value) {
    let Some(items) = results.as_array() else {
        return;
    };
    if items.is_empty() {
        println!("No matches");
    }
    for item in items {
        println!("{}  {}", str_field(item, "id"), str_field(item, "full_name"));
    }
}

/// `1. Name by Brand (0.8123)` followed by indented reason and quality lines.
fn recommendation_lines(result: &Value) -> Vec<String> {
    let Some(recs) = result.get("recommendations").and_then(Value::as_array) else {
        return Vec::new();
    };
    if recs.is_empty() {
        return vec!["No recommendations".to_owned()];
    }
    let mut lines = Vec::with_capacity(recs.len() * 3);
    for rec in recs {
        let fragrance = &rec["fragrance"];
        lines.push(format!(
            "{}. {} by {} ({:.4})",
            rec["rank"].as_u64().unwrap_or(0),
            str_field(fragrance, "name"),
            str_field(fragrance, "brand"),
            rec["score"].as_f64().unwrap_or(0.0)
        ));
        let explanation = &rec["explanation"];
        lines.push(format!("   {}", str_field(explanation, "primary_reason")));
        if let Some(note) = explanation.get("quality_note").and_then(Value::as_str) {
            lines.push(format!("   {note}"));
        }
    }
    lines
}

fn describe_expiry(expires_at: i64, now: i64) -> String {
    let remaining = expires_at - now;
    if remaining <= 0 {
        return format!("expired ({expires_at})");
    }
    let minutes = remaining / 60;
    if minutes == 0 {
        format!("in {remaining}s ({expires_at})")
    } else {
        format!("in {minutes} min ({expires_at})")
    }
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
