use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use famsync::{
    config::Config,
    models::{
        calendar::{parse_date, Span},
        notification::SettingsPatch,
        school::SchoolFilter,
        user::UserProfile,
    },
    AppState, Platform,
};

#[derive(Parser)]
#[command(name = "famsync", about = "Family organizer client: session, resources and push registration")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and store the session
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Create an account and store the session
    Signup {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Send a password reset email
    ForgotPassword {
        #[arg(long)]
        email: String,
    },
    /// List albums and media of the family gallery
    Gallery,
    /// List calendar events, optionally only those on one day
    Calendar {
        /// YYYY-MM-DD
        #[arg(long)]
        date: Option<String>,
    },
    /// Search schools
    Schools {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        city: Option<String>,
        /// Number of pages to load
        #[arg(long, default_value_t = 1)]
        pages: u32,
    },
    /// Register this device's push token with the backend
    RegisterPush,
    /// Show or change local notification settings
    Settings {
        /// key=true|false, e.g. photoUpdates=false
        #[arg(long = "set", value_parser = parse_setting)]
        set: Vec<(String, bool)>,
    },
    /// Check that the API is reachable
    Health,
    /// Check the API, refresh resources and print the metrics exposition
    Metrics,
}

fn parse_setting(raw: &str) -> Result<(String, bool), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=bool, got {raw}"))?;
    let value = value
        .parse::<bool>()
        .map_err(|_| format!("expected true or false for {key}"))?;
    Ok((key.to_string(), value))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;
    let platform = Platform::from_config(&config).await?;
    let app = AppState::new(config, platform)?;

    app.auth.check_auth_status().await;
    app.notifications.load_settings().await;

    match args.command {
        Command::Login { email, password } => {
            app.auth.login(&email, &password).await?;
            print_user(app.auth.current_user());
        }
        Command::Signup {
            name,
            email,
            password,
        } => {
            app.auth.signup(&name, &email, &password).await?;
            print_user(app.auth.current_user());
        }
        Command::Logout => {
            if let Some(token) = app.auth.token() {
                app.notifications.unregister_token_with_backend(&token).await;
            }
            app.auth.logout().await;
            println!("Signed out");
        }
        Command::Whoami => print_user(app.auth.current_user()),
        Command::ForgotPassword { email } => {
            app.auth.forgot_password(&email).await?;
            println!("Password reset email sent to {email}");
        }
        Command::Gallery => gallery(&app).await?,
        Command::Calendar { date } => calendar(&app, date.as_deref()).await?,
        Command::Schools {
            search,
            city,
            pages,
        } => {
            schools(
                &app,
                SchoolFilter {
                    search,
                    city,
                    limit: None,
                },
                pages,
            )
            .await?
        }
        Command::RegisterPush => {
            let token = app.auth.token().context("Not signed in")?;
            match app.notifications.register_for_push_notifications(Some(&token)).await {
                Some(push_token) => println!(
                    "Push token {} (registered: {})",
                    push_token,
                    app.notifications.registration().is_registered
                ),
                None => println!("Push notifications are not available on this device"),
            }
        }
        Command::Settings { set } => {
            let settings = if set.is_empty() {
                app.notifications.settings()
            } else {
                let mut patch = SettingsPatch::default();
                for (key, value) in &set {
                    patch.set(key, *value).map_err(anyhow::Error::msg)?;
                }
                app.notifications.update_settings(patch).await?
            };
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        Command::Health => {
            if app.api.check_connectivity().await {
                println!("API reachable at {}", app.config.api_root());
            } else {
                anyhow::bail!("API unreachable at {}", app.config.api_root());
            }
        }
        Command::Metrics => {
            app.api.check_connectivity().await;
            if app.auth.token().is_some() {
                app.gallery.refetch().await;
                app.calendar.refetch().await;
            }
            print!("{}", app.metrics.render());
        }
    }

    Ok(())
}

fn print_user(user: Option<UserProfile>) {
    match user {
        Some(user) => println!("{} <{}> ({})", user.full_name, user.email, user.id),
        None => println!("Not signed in"),
    }
}

async fn gallery(app: &AppState) -> anyhow::Result<()> {
    app.gallery.refetch().await;
    let state = app.gallery.snapshot();
    if let Some(error) = state.error {
        anyhow::bail!(error);
    }
    if state.needs_gallery_creation {
        println!("No gallery yet for this family");
        return Ok(());
    }
    for album in &state.albums {
        let count = state
            .media
            .iter()
            .filter(|m| m.album_id.as_deref() == Some(album.id.as_str()))
            .count();
        println!("[{}] {} ({} items)", album.id, album.name, count);
    }
    let loose = state.media.iter().filter(|m| m.album_id.is_none()).count();
    println!("{} media total, {} outside albums", state.media.len(), loose);
    Ok(())
}

async fn calendar(app: &AppState, date: Option<&str>) -> anyhow::Result<()> {
    app.calendar.refetch().await;
    let state = app.calendar.snapshot();
    if let Some(error) = state.error {
        anyhow::bail!(error);
    }

    let events = match date {
        Some(raw) => {
            let day: NaiveDate = parse_date(raw).with_context(|| format!("Invalid date: {raw}"))?;
            app.calendar.events_on(day)
        }
        None => {
            let mut events = state.events;
            events.sort_by_key(|e| e.starts_at());
            events
        }
    };

    let today = Local::now().date_naive();
    for event in events {
        let when = match event.kind.span() {
            Span::Day(timing) => match &timing.start_time {
                Some(start) => format!("{} {}", timing.event_date, start),
                None => timing.event_date.to_string(),
            },
            Span::Range(range) => format!("{} .. {}", range.start_date, range.end_date),
        };
        let marker = if event.covers(today) { "*" } else { " " };
        println!("{marker} {when:<24} {:<14} {}", event.kind.name(), event.title);
    }
    Ok(())
}

async fn schools(app: &AppState, filter: SchoolFilter, pages: u32) -> anyhow::Result<()> {
    app.schools.fetch_schools(filter).await;
    for _ in 1..pages {
        if !app.schools.load_more().await {
            break;
        }
    }
    let state = app.schools.snapshot();
    if let Some(error) = state.error {
        anyhow::bail!(error);
    }
    for school in &state.schools {
        println!(
            "{:<36} {} ({})",
            school.id,
            school.name,
            school.city.as_deref().unwrap_or("-")
        );
    }
    info!(
        "Loaded page {} of {} ({} schools total)",
        state.pagination.page, state.pagination.total_pages, state.pagination.total
    );
    Ok(())
}
