use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;

use scrape_check::api::{self, AppState};
use scrape_check::checker::check_with_engine;
use scrape_check::config::{AppConfig, CheckOverrides, Engine};
use scrape_check::report::format_report;
use scrape_check::utils::{extract_url_from_text, format_error_for_user};

#[derive(Debug, Parser)]
#[command(
    name = "scrape-check",
    version,
    about = "Checks whether a web page can be reliably scraped."
)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging (RUST_LOG still wins when set)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check a single URL and print a report
    Check(CheckArgs),
    /// Serve the HTTP API
    Serve {
        #[arg(long, env = "HOST", default_value = "127.0.0.1")]
        host: String,
        #[arg(long, env = "PORT", default_value_t = 8080)]
        port: u16,
    },
    /// Configuration helpers
    Config {
        /// Print the default configuration as TOML
        #[arg(long)]
        print_default: bool,

        /// Launch and close Chromium to confirm it is usable
        #[arg(long)]
        check_browser: bool,
    },
}

#[derive(Debug, clap::Args)]
struct CheckArgs {
    /// URL, bare host name, or any text containing a URL
    target: String,

    /// Print the result as JSON instead of a report
    #[arg(long)]
    json: bool,

    /// Navigation timeout in milliseconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Page-loading engine
    #[arg(long, value_enum)]
    engine: Option<Engine>,

    #[arg(long)]
    user_agent: Option<String>,

    #[arg(long)]
    no_screenshot: bool,

    /// Skip every detector
    #[arg(long)]
    no_detections: bool,

    #[arg(long)]
    skip_anti_bot: bool,

    #[arg(long)]
    skip_rate_limit: bool,

    #[arg(long)]
    skip_robots_txt: bool,

    #[arg(long)]
    skip_authentication: bool,
}

impl CheckArgs {
    fn overrides(&self) -> CheckOverrides {
        CheckOverrides {
            timeout_ms: self.timeout,
            engine: self.engine,
            user_agent: self.user_agent.clone(),
            no_screenshot: self.no_screenshot,
            no_detections: self.no_detections,
            skip_anti_bot: self.skip_anti_bot,
            skip_rate_limit: self.skip_rate_limit,
            skip_robots_txt: self.skip_robots_txt,
            skip_authentication: self.skip_authentication,
        }
    }
}

#[actix_web::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(default_filter));

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Check(args) => {
            let passed = run_check(config, &args).await?;
            if !passed {
                process::exit(1);
            }
            Ok(())
        }
        Command::Serve { host, port } => serve(config, host, port).await,
        Command::Config {
            print_default,
            check_browser,
        } => {
            if check_browser {
                return check_browser_installation(&config).await;
            }
            let config = if print_default { AppConfig::default() } else { config };
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

#[cfg(feature = "chromium")]
async fn check_browser_installation(config: &AppConfig) -> Result<()> {
    use scrape_check::browser::chromium::is_browser_available;

    if is_browser_available(&config.browser).await {
        println!("✅ Chromium is available");
        Ok(())
    } else {
        anyhow::bail!("Failed to launch browser. Is Chromium installed?")
    }
}

#[cfg(not(feature = "chromium"))]
async fn check_browser_installation(_config: &AppConfig) -> Result<()> {
    anyhow::bail!("this build has no Chromium support")
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Ok(AppConfig::default()),
    }
}

async fn run_check(mut config: AppConfig, args: &CheckArgs) -> Result<bool> {
    let url = extract_url_from_text(&args.target)
        .with_context(|| format!("No valid URL found in \"{}\"", args.target))?;

    args.overrides().apply(&mut config);
    config.ensure_valid().context("Invalid configuration")?;

    let base_dir = std::env::current_dir().context("Failed to read working directory")?;
    let options = config.to_check_options(&base_dir);

    log::info!("🔍 Checking {}", url);
    let result = check_with_engine(&config.browser, &url, &options).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", format_report(&result));
        if let Some(error) = &result.error {
            eprintln!("{}", format_error_for_user(error));
        }
    }

    Ok(result.success)
}

async fn serve(config: AppConfig, host: String, port: u16) -> Result<()> {
    config.ensure_valid().context("Invalid configuration")?;

    let base_dir = std::env::current_dir().context("Failed to read working directory")?;
    let state = web::Data::new(AppState { config, base_dir });

    log::info!("🚀 Starting scrape-check API");
    log::info!("🌐 Server running at http://{}:{}", host, port);
    log::info!("📖 Health check at http://{}:{}/api/health", host, port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .wrap(cors)
            .configure(api::configure)
    })
    .bind((host.as_str(), port))
    .with_context(|| format!("Failed to bind {}:{}", host, port))?
    .run()
    .await
    .context("HTTP server failed")
}
