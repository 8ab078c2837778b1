use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use food_scanner_lib::actors::SourceReply;
use food_scanner_lib::api::MealType;
use food_scanner_lib::capture::{FilePicker, ImageSource, NoCamera, PermissionStatus, StaticPermission};
use food_scanner_lib::event_bus::ScanEvent;
use food_scanner_lib::logger::{self, LogBroadcaster};
use food_scanner_lib::models::AppConfig;
use food_scanner_lib::scan::presenter;
use food_scanner_lib::settings::{default_settings_path, SettingsManager};
use food_scanner_lib::ScannerApp;

#[derive(Parser)]
#[command(name = "food-scanner")]
#[command(about = "Scan a food photo and log its calories", long_about = None)]
struct Cli {
    /// Settings file (default: platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a food photo
    Scan {
        /// Image file to analyze
        image: PathBuf,
        /// Save the result to the food log
        #[arg(long)]
        commit: bool,
        /// Meal type used when committing (breakfast, lunch, dinner, snack)
        #[arg(long)]
        meal_type: Option<MealType>,
    },
    /// List logged food
    Logs {
        /// Day to list (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
    /// Show or change settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Show,
    Set {
        #[arg(long)]
        api_url: Option<String>,
        /// Bearer token, empty string clears it
        #[arg(long)]
        token: Option<String>,
        #[arg(long)]
        timeout_secs: Option<u64>,
        #[arg(long)]
        meal_type: Option<MealType>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Arc::new(
        SettingsManager::new(cli.config.clone().unwrap_or_else(default_settings_path)).await?,
    );

    // 命令行本身不订阅推送，日志只写 stderr 和文件
    let broadcaster = Arc::new(LogBroadcaster::new(256));
    broadcaster.set_enabled(settings.get().await.log_broadcast);
    let _guard = logger::init_with_broadcaster(broadcaster, cli.verbose)?;

    match cli.command {
        Commands::Scan {
            image,
            commit,
            meal_type,
        } => scan(settings, image, commit, meal_type).await,
        Commands::Logs { date, limit } => logs(settings, date, limit).await,
        Commands::Config { action } => config(settings, action).await,
    }
}

async fn scan(
    settings: Arc<SettingsManager>,
    image: PathBuf,
    commit: bool,
    meal_type: Option<MealType>,
) -> Result<()> {
    let app = ScannerApp::new(settings).await?;
    let mut events = app.events().subscribe();

    // 命令行没有相机，只能从文件选图
    let source = ImageSource::new(
        Arc::new(StaticPermission(PermissionStatus::Denied)),
        Arc::new(NoCamera),
        Arc::new(FilePicker::new(Some(image))),
    );
    let session = app.open_session(source).await;

    if let SourceReply::Started(snapshot) = session.pick().await? {
        println!("{}", snapshot.status);
    }

    loop {
        match events.recv().await? {
            ScanEvent::RetryScheduled {
                attempt, reason, ..
            } => {
                let snapshot = session.snapshot().await?;
                println!("{} [{}] ({})", snapshot.status, attempt, reason);
            }
            ScanEvent::AnalysisSucceeded { result, .. } => {
                println!("{}", presenter::render_result(&result));
                break;
            }
            ScanEvent::NotFoodDetected { message, .. } => {
                return Err(anyhow!(message.unwrap_or_else(|| {
                    "Sorry, this picture is not food related. Please take a photo of your meal."
                        .to_string()
                })));
            }
            ScanEvent::AnalysisFailed { reason, .. } => {
                return Err(anyhow!(
                    "Unable to analyze the image. Please try with a clearer photo. ({})",
                    reason
                ));
            }
            _ => {}
        }
    }

    if commit {
        let logged = session.commit(meal_type).await?;
        println!(
            "Food logged successfully: {} ({:.0} kcal)",
            logged.food_name, logged.calories
        );
    }

    Ok(())
}

async fn logs(settings: Arc<SettingsManager>, date: Option<NaiveDate>, limit: u32) -> Result<()> {
    let app = ScannerApp::new(settings).await?;
    let entries = app.food_logs().list_logs(date, limit).await?;

    if entries.is_empty() {
        println!("No food logged");
    }
    for entry in entries {
        println!(
            "{:<25} {:>6.0} kcal  {}  {}",
            entry.food_name,
            entry.calories,
            entry.meal_type.as_deref().unwrap_or("-"),
            entry.consumed_at.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

async fn config(settings: Arc<SettingsManager>, action: ConfigAction) -> Result<()> {
    let current = match action {
        ConfigAction::Show => settings.get().await,
        ConfigAction::Set {
            api_url,
            token,
            timeout_secs,
            meal_type,
        } => {
            settings
                .update(AppConfig {
                    api_url,
                    auth_token: token,
                    timeout_secs,
                    default_meal_type: meal_type,
                    ..Default::default()
                })
                .await?
        }
    };

    println!("{}", settings.path().display());
    println!("{}", serde_json::to_string_pretty(&current)?);
    Ok(())
}
