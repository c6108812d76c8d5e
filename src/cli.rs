use clap::{Args, Parser, Subcommand, ValueEnum};
use coldwatch::config::{AppConfig, ConfigOverrides, parse_duration};
use coldwatch::error::{AppError, SessionError};
use coldwatch::mutes::MuteApplied;
use coldwatch::notifications::NotificationPager;
use coldwatch::scheduler::SweepOutcome;
use coldwatch::types::{Credentials, NotificationRecord};
use coldwatch::ColdwatchApp;
use std::path::PathBuf;
use time::format_description::well_known::Rfc3339;

#[allow(clippy::large_enum_variant)]
pub(crate) enum RunOutcome {
    Run(AppConfig, Command),
    Exit(i32),
}

pub(crate) fn run() -> RunOutcome {
    let cli = Cli::parse();
    match resolve_config(&cli) {
        Ok(config) => RunOutcome::Run(config, cli.command),
        Err(err) => {
            eprintln!("error: {err}");
            RunOutcome::Exit(2)
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "coldwatch",
    version,
    about = "Sensor monitoring client: sessions, sweeps, mutes and notifications"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// TOML file with base_url, data_dir, page_size, offline_after, request_timeout.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true, env = "COLDWATCH_BASE_URL")]
    base_url: Option<String>,
    #[arg(long, global = true, env = "COLDWATCH_DATA_DIR")]
    data_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    page_size: Option<u32>,
    /// Reading age after which a sensor counts as offline, e.g. `15m`.
    #[arg(long, global = true)]
    offline_after: Option<String>,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    Login(LoginArgs),
    Logout,
    /// Cold start: restore the session, refresh mutes and sweep once.
    Start,
    /// Manual refresh sweep.
    Sync,
    Notifications(NotificationsArgs),
    Mute(MuteArgs),
    Status,
}

#[derive(Args, Debug)]
pub(crate) struct LoginArgs {
    #[arg(long)]
    email: String,
    #[arg(long, env = "COLDWATCH_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Args, Debug)]
pub(crate) struct NotificationsArgs {
    #[arg(long, conflicts_with_all = ["all", "local"])]
    page: Option<u32>,
    #[arg(long, conflicts_with = "local")]
    all: bool,
    /// Show the on-device log instead of the server history.
    #[arg(long)]
    local: bool,
}

#[derive(Args, Debug)]
pub(crate) struct MuteArgs {
    #[command(subcommand)]
    target: MuteTarget,
}

#[derive(Subcommand, Debug)]
enum MuteTarget {
    Global { state: Toggle },
    Sensor { name: String, state: Toggle },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Toggle {
    On,
    Off,
}

impl Toggle {
    fn muted(self) -> bool {
        matches!(self, Toggle::On)
    }
}

fn resolve_config(cli: &Cli) -> Result<AppConfig, String> {
    let offline_after = cli
        .offline_after
        .as_deref()
        .map(parse_duration)
        .transpose()?;
    let overrides = ConfigOverrides {
        base_url: cli.base_url.clone(),
        data_dir: cli.data_dir.clone(),
        page_size: cli.page_size,
        offline_after,
    };
    AppConfig::load(cli.config.as_deref(), overrides).map_err(|err| err.to_string())
}

pub(crate) async fn execute(config: AppConfig, command: Command) -> i32 {
    let app = match ColdwatchApp::from_config(&config) {
        Ok(app) => app,
        Err(err) => {
            eprintln!("error: {err}");
            return 1;
        }
    };

    let result = match command {
        Command::Login(args) => run_login(&app, args).await,
        Command::Logout => run_logout(&app).await,
        Command::Start => run_start(&app).await,
        Command::Sync => run_sync(&app).await,
        Command::Notifications(args) => run_notifications(&app, args).await,
        Command::Mute(args) => run_mute(&app, args).await,
        Command::Status => run_status(&app),
    };

    match result {
        Ok(()) => 0,
        Err(AppError::NotAuthenticated) => {
            eprintln!("not logged in; run `coldwatch login` first");
            1
        }
        Err(err) => {
            eprintln!("error: {err}");
            1
        }
    }
}

async fn run_login(app: &ColdwatchApp, args: LoginArgs) -> Result<(), AppError> {
    app.session().restore_session()?;
    let credentials = Credentials {
        email: args.email,
        password: args.password,
    };
    let session = app.login(&credentials).await?;
    println!(
        "logged in as user {} ({})",
        session.user_id,
        session.role.as_str()
    );
    Ok(())
}

async fn run_logout(app: &ColdwatchApp) -> Result<(), AppError> {
    app.session().restore_session()?;
    match app.session().logout().await {
        Ok(()) => println!("logged out"),
        Err(SessionError::LogoutFailed(err)) => {
            println!("logged out on this device; the server did not confirm ({err})");
        }
        Err(err) => return Err(err.into()),
    }
    Ok(())
}

async fn run_start(app: &ColdwatchApp) -> Result<(), AppError> {
    let Some(start) = app.start().await? else {
        println!("no saved session; run `coldwatch login`");
        return Ok(());
    };
    println!("session restored for user {}", start.session.user_id);
    if !start.mutes.failed.is_empty() {
        println!("mute flags kept from cache: {}", start.mutes.failed.join(", "));
    }
    match start.sweep {
        Some(outcome) => print!("{}", format_outcome(&outcome)),
        None => println!("startup sweep already ran for this session"),
    }
    Ok(())
}

async fn run_sync(app: &ColdwatchApp) -> Result<(), AppError> {
    let outcome = app.refresh().await?;
    print!("{}", format_outcome(&outcome));
    Ok(())
}

async fn run_notifications(app: &ColdwatchApp, args: NotificationsArgs) -> Result<(), AppError> {
    let session = app.require_session()?;
    let user_id = session.user_id.as_str();
    let notifications = app.notifications();

    if args.local {
        for record in notifications.local_log(user_id)? {
            println!("{}", format_record(&record));
        }
    } else if args.all {
        let records = NotificationPager::new(user_id, app.page_size())
            .collect_all(notifications)
            .await?;
        for record in &records {
            println!("{}", format_record(record));
        }
    } else {
        let page = notifications
            .list(user_id, args.page.unwrap_or(1), app.page_size())
            .await?;
        for record in &page.records {
            println!("{}", format_record(record));
        }
        if page.end_of_data {
            println!("(end of notifications)");
        }
    }
    notifications.mark_all_seen(user_id);
    Ok(())
}

async fn run_mute(app: &ColdwatchApp, args: MuteArgs) -> Result<(), AppError> {
    let session = app.require_session()?;
    let user_id = session.user_id.as_str();
    let (label, applied) = match args.target {
        MuteTarget::Global { state } => (
            "all sensors".to_string(),
            app.mutes().set_global_muted(user_id, state.muted()).await?,
        ),
        MuteTarget::Sensor { name, state } => {
            let sensor = app
                .poller()
                .refresh_sensors(user_id)
                .await?
                .into_iter()
                .find(|sensor| sensor.name == name)
                .ok_or(AppError::UnknownSensor(name))?;
            let applied = app
                .mutes()
                .set_sensor_muted(user_id, &sensor, state.muted())
                .await?;
            (sensor.name, applied)
        }
    };
    match applied {
        MuteApplied::LocalAndRemote => println!("updated mute for {label}"),
        MuteApplied::LocalOnly(err) => {
            println!("updated mute for {label} on this device only; will retry on next start ({err})");
        }
    }
    Ok(())
}

fn run_status(app: &ColdwatchApp) -> Result<(), AppError> {
    let session = app.require_session()?;
    let user_id = session.user_id.as_str();
    println!("user {} ({})", user_id, session.role.as_str());
    println!(
        "global mute: {}",
        on_off(app.mutes().is_global_muted(user_id))
    );
    for sensor in app.poller().cached_sensors(user_id)? {
        println!(
            "  {} [{} {}..{}{}] mute: {}",
            sensor.name,
            sensor.kind.as_str(),
            sensor.min_threshold,
            sensor.max_threshold,
            sensor.kind.unit(),
            on_off(app.mutes().is_sensor_muted(user_id, &sensor.name))
        );
    }
    println!("unread: {}", app.notifications().unread_count(user_id));
    Ok(())
}

fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

fn format_outcome(outcome: &SweepOutcome) -> String {
    let mut out = format!(
        "sweep: {} alert(s), {} muted, {} unreachable\n",
        outcome.recorded.len(),
        outcome.suppressed.len(),
        outcome.diagnostics.len()
    );
    for alert in &outcome.recorded {
        out.push_str(&format!("  {}\n", alert.message()));
    }
    out
}

fn format_record(record: &NotificationRecord) -> String {
    let at = record
        .created_at
        .format(&Rfc3339)
        .unwrap_or_else(|_| record.created_at.to_string());
    format!("{at}  {}", record.message)
}
