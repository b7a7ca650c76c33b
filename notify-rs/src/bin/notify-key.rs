//! CLI tool for managing API keys and daily counters
//!
//! # Usage
//!
//! ```bash
//! # Issue a key
//! notify-key issue 09171234567 "My Shop" --email owner@example.com --db sqlite://notify.db
//!
//! # Show a key's state
//! notify-key show sk-0123456789abcdef01234567
//!
//! # Deactivate a key
//! notify-key deactivate sk-0123456789abcdef01234567
//!
//! # Show today's counters
//! notify-key counters
//!
//! # Reset a counter to zero for today
//! notify-key reset-counter daily_sms_counter
//! ```

use clap::{Parser, Subcommand};
use notify_rs::config::LimitsConfig;
use notify_rs::counter::{
    DailyCounter, SqliteCounterStore, EMAIL_COUNTER, PRIMARY_COUNTER, REGISTRATION_COUNTER,
};
use notify_rs::credential::{CredentialGuard, SqliteCredentialStore};
use notify_rs::utils::SystemClock;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "notify-key")]
#[command(about = "Manage notify-rs API keys and counters", long_about = None)]
struct Cli {
    /// Database URL (e.g., sqlite://notify.db)
    #[arg(short, long, default_value = "sqlite://notify.db?mode=rwc")]
    db: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Issue a new API key
    Issue {
        /// Owner phone number
        phone: String,
        /// Project name shown to recipients
        project: String,
        /// Owner email, enables the email fallback
        #[arg(long)]
        email: Option<String>,
    },
    /// Show a key's state
    Show {
        api_key: String,
    },
    /// Deactivate a key
    Deactivate {
        api_key: String,
    },
    /// Show today's counters
    Counters,
    /// Reset a counter to zero for today
    ResetCounter {
        /// Counter name (daily_sms_counter, daily_email_counter or daily_registration_counter)
        name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&cli.db)
        .await?;

    let credentials = SqliteCredentialStore::new(pool.clone());
    credentials.init_db().await?;
    let counters = SqliteCounterStore::new(pool);
    counters.init_db().await?;

    let limits = LimitsConfig::default();
    let clock = Arc::new(SystemClock);
    let guard = CredentialGuard::new(Arc::new(credentials), clock.clone(), limits.ban_threshold);
    let counters = Arc::new(counters);
    let primary = DailyCounter::new(
        PRIMARY_COUNTER,
        limits.primary_daily,
        counters.clone(),
        clock.clone(),
    );
    let email = DailyCounter::new(
        EMAIL_COUNTER,
        limits.email_daily,
        counters.clone(),
        clock.clone(),
    );
    let registration = DailyCounter::new(
        REGISTRATION_COUNTER,
        limits.registration_daily,
        counters,
        clock,
    );

    match cli.command {
        Commands::Issue {
            phone,
            project,
            email,
        } => {
            let record = guard.issue(&phone, email.as_deref(), &project).await?;
            println!("✓ API key issued for {}", record.project_name);
            println!("   Key:     {}", record.api_key);
            println!("   User id: {}", record.user_id);
            println!("   Phone:   {}", record.phone_number);
            if let Some(email) = &record.email {
                println!("   Email:   {}", email);
            }
        }
        Commands::Show { api_key } => {
            let record = guard.lookup(&api_key).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            println!("\nUsage today: {}/{}", guard.usage_today(&record), limits.per_key_daily);
        }
        Commands::Deactivate { api_key } => {
            guard.deactivate(&api_key).await?;
            println!("✓ API key deactivated");
        }
        Commands::Counters => {
            println!(
                "{:<28} {:<12} {:>8} {:>8} {:>8}",
                "Counter", "Date", "Sent", "Limit", "Used %"
            );
            println!("{:-<68}", "");
            for counter in [&primary, &email, &registration] {
                let s = counter.snapshot().await?;
                println!(
                    "{:<28} {:<12} {:>8} {:>8} {:>7.2}%",
                    s.name, s.date, s.sent_today, s.daily_limit, s.percentage_used
                );
            }
        }
        Commands::ResetCounter { name } => {
            let counter = match name.as_str() {
                PRIMARY_COUNTER => &primary,
                EMAIL_COUNTER => &email,
                REGISTRATION_COUNTER => &registration,
                other => {
                    eprintln!("Error: unknown counter {}", other);
                    std::process::exit(1);
                }
            };
            let record = counter.reset().await?;
            println!("✓ Counter {} reset for {}", record.name, record.date);
        }
    }

    Ok(())
}
