//! worktrack - command-line client for the worktrack API.
//!
//! Signs in, runs one command against the API and signs out again. The
//! session exists only for the lifetime of the process.

use std::io::{self, BufRead, Write};

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use worktrack_core::{ApiClient, ApiError, Claims, Config, Method};

/// Environment variables consulted before prompting
const ENV_EMAIL: &str = "WORKTRACK_EMAIL";
const ENV_PASSWORD: &str = "WORKTRACK_PASSWORD";

const USAGE: &str = "\
Usage:
  worktrack login
  worktrack whoami
  worktrack request <METHOD> <PATH> [JSON_BODY]
  worktrack signup <DISPLAY_NAME>

Credentials are read from WORKTRACK_EMAIL / WORKTRACK_PASSWORD or prompted for.";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

enum Command {
    Login,
    WhoAmI,
    Request {
        method: Method,
        path: String,
        body: Option<serde_json::Value>,
    },
    Signup {
        display_name: String,
    },
}

fn parse_args(args: &[String]) -> Result<Command> {
    match args.first().map(String::as_str) {
        Some("login") => Ok(Command::Login),
        Some("whoami") => Ok(Command::WhoAmI),
        Some("request") => {
            let (Some(method), Some(path)) = (args.get(1), args.get(2)) else {
                bail!("request needs a METHOD and a PATH\n\n{}", USAGE);
            };
            let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                .with_context(|| format!("Invalid HTTP method: {}", method))?;
            let body = args
                .get(3)
                .map(|raw| serde_json::from_str(raw).context("Body must be valid JSON"))
                .transpose()?;
            Ok(Command::Request {
                method,
                path: path.clone(),
                body,
            })
        }
        Some("signup") => {
            let Some(display_name) = args.get(1) else {
                bail!("signup needs a DISPLAY_NAME\n\n{}", USAGE);
            };
            Ok(Command::Signup {
                display_name: display_name.clone(),
            })
        }
        _ => bail!("{}", USAGE),
    }
}

fn read_email() -> Result<String> {
    if let Ok(email) = std::env::var(ENV_EMAIL) {
        return Ok(email);
    }
    eprint!("Email: ");
    io::stderr().flush()?;
    let mut email = String::new();
    io::stdin().lock().read_line(&mut email)?;
    Ok(email.trim().to_string())
}

fn read_password() -> Result<String> {
    if let Ok(password) = std::env::var(ENV_PASSWORD) {
        return Ok(password);
    }
    rpassword::prompt_password("Password: ").context("Failed to read password")
}

async fn run(client: &ApiClient, command: Command) -> Result<()> {
    let email = read_email()?;
    let password = read_password()?;

    let user = match command {
        Command::Signup { ref display_name } => {
            client.signup(&email, &password, display_name).await?
        }
        _ => client.login(&email, &password).await?,
    };
    info!(subject = %user.subject_id, "Session started");
    let renewal = client.spawn_background_renewal();

    let result = execute(client, command, &user).await;
    renewal.abort();
    result
}

async fn execute(client: &ApiClient, command: Command, user: &Claims) -> Result<()> {
    match command {
        Command::Login => {
            println!(
                "Signed in as {} ({})",
                user.display_name_or_email(),
                user.subject_id
            );
        }
        Command::WhoAmI | Command::Signup { .. } => {
            println!("{}", serde_json::to_string_pretty(user)?);
        }
        Command::Request { method, path, body } => {
            let response = client.request(method, &path, body).await?;
            if !response.is_success() {
                eprintln!("HTTP {}", response.status);
            }
            match serde_json::from_str::<serde_json::Value>(&response.body) {
                Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
                Err(_) => println!("{}", response.body),
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = parse_args(&args)?;

    let config = Config::load()?;
    info!(api = %config.api_base_url, "worktrack starting");
    let client = ApiClient::new(&config)?;

    let result = run(&client, command).await;

    if client.is_logged_in() {
        client.logout().await;
    }

    if let Err(ref e) = result {
        if matches!(e.downcast_ref::<ApiError>(), Some(err) if err.requires_login()) {
            eprintln!("Not signed in: {}", e);
            std::process::exit(2);
        }
    }
    result
}
