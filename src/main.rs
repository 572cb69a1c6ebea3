use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use qr_attendance_client::{
    api::HttpBackend,
    config::Config,
    error::AttendanceError,
    issuer::{DurationPrompt, IssuerState, TokenIssuer},
    render::{self, ZoomLevel},
    scanner::{keyboard::KeyboardCamera, ScanClient, ScanSession, ScanStatus},
    token::{ClassId, ScheduleId},
};
use std::cell::RefCell;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "qr-attendance", version, about = "Issue and scan QR attendance codes")]
struct Cli {
    /// Config file to use instead of the one in the app data directory
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a QR code students can scan to check in to a class session
    Issue {
        #[arg(long = "class")]
        class_id: String,
        #[arg(long = "schedule")]
        schedule_id: String,
        /// How long the code stays valid, in whole minutes (default from config)
        #[arg(long)]
        minutes: Option<String>,
        /// Write the QR image here as PNG
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long, default_value_t = 1.0)]
        zoom: f32,
    },
    /// Check in by scanning a QR code (one decoded payload per input line)
    Scan,
    /// Print where the config file is read from
    ConfigPath,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = match &cli.config {
        Some(path) => Config::from_path(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Command::Issue {
            class_id,
            schedule_id,
            minutes,
            out,
            zoom,
        } => {
            issue(
                &config,
                ClassId(class_id),
                ScheduleId(schedule_id),
                minutes,
                out,
                ZoomLevel::from_factor(zoom),
            )
            .await
        }
        Command::Scan => scan(&config).await,
        Command::ConfigPath => {
            match &cli.config {
                Some(path) => println!("{}", path.display()),
                None => println!("{}", Config::default_path()?.display()),
            }
            Ok(())
        }
    }
}

async fn issue(
    config: &Config,
    class_id: ClassId,
    schedule_id: ScheduleId,
    minutes: Option<String>,
    out: Option<PathBuf>,
    zoom: ZoomLevel,
) -> Result<(), Box<dyn Error>> {
    let mut prompt = DurationPrompt::new(config.default_duration_minutes);
    if let Some(minutes) = &minutes {
        prompt.set_input(minutes);
    }
    if let Some(message) = prompt.validation_message() {
        // Nothing has been sent yet, and nothing will be
        return Err(message.into());
    }

    let backend = HttpBackend::new(config)?;
    let issuer = RefCell::new(TokenIssuer::new(class_id, schedule_id));
    issuer.borrow_mut().set_zoom(zoom);

    let validity = issuer.borrow_mut().request_duration(prompt.input())?;
    report(TokenIssuer::issue(&issuer, &backend, validity).await);
    show(&mut issuer.borrow_mut(), out.as_deref())?;

    println!("Enter r to regenerate, a number of minutes to re-issue, + or - to zoom, q to close.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = line.trim();
        match command {
            "" => continue,
            "q" | "quit" => break,
            "r" => report(TokenIssuer::regenerate(&issuer, &backend).await),
            "+" => {
                let zoom = issuer.borrow().zoom().zoom_in();
                issuer.borrow_mut().set_zoom(zoom);
                println!("zoom {:.1}x", zoom.factor());
            }
            "-" => {
                let zoom = issuer.borrow().zoom().zoom_out();
                issuer.borrow_mut().set_zoom(zoom);
                println!("zoom {:.1}x", zoom.factor());
            }
            minutes => {
                prompt.set_input(minutes);
                if let Some(message) = prompt.validation_message() {
                    println!("{}", message);
                    continue;
                }
                let validity = issuer.borrow_mut().request_duration(prompt.input())?;
                report(TokenIssuer::issue(&issuer, &backend, validity).await);
            }
        }
        show(&mut issuer.borrow_mut(), out.as_deref())?;
    }

    issuer.borrow_mut().close();
    Ok(())
}

// Issuance errors are already on the issuer's state, this just logs them
fn report(result: Result<(), AttendanceError>) {
    if let Err(err) = result {
        tracing::debug!(error = %err, "issuance did not produce a code");
    }
}

fn show(issuer: &mut TokenIssuer, out: Option<&Path>) -> Result<(), Box<dyn Error>> {
    if let Some(notice) = issuer.take_notice() {
        eprintln!("{}", notice);
    }

    let artifact = match issuer.state() {
        IssuerState::Displayed(artifact) => artifact,
        IssuerState::Error { message } => {
            println!("Could not create the QR code: {}", message);
            return Ok(());
        }
        IssuerState::NoToken | IssuerState::Requesting { .. } => return Ok(()),
    };

    if let Some(payload) = &artifact.payload {
        println!("{}", render::render_terminal(payload)?);
    }
    if render::decode_data_url(&artifact.image_url).is_some() {
        println!("QR image: inline ({} bytes)", artifact.image_url.len());
    } else {
        println!("QR image: {}", artifact.image_url);
    }

    let remaining = artifact.time_remaining(Utc::now());
    println!(
        "Valid for {}, expires at {} ({} min {} s left)",
        artifact.validity,
        artifact.expires_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
        remaining.num_minutes(),
        remaining.num_seconds() % 60
    );

    if let Some(path) = out {
        let png = match (render::decode_data_url(&artifact.image_url), &artifact.payload) {
            (Some(bytes), _) => bytes?,
            (None, Some(payload)) => render::render_png(payload, issuer.zoom())?,
            (None, None) => {
                println!("The backend only sent an image link, nothing written to {}", path.display());
                return Ok(());
            }
        };
        std::fs::write(path, png)?;
        println!("Wrote {}", path.display());
    }
    Ok(())
}

async fn scan(config: &Config) -> Result<(), Box<dyn Error>> {
    let (tx, rx) = mpsc::channel(32);
    let camera = KeyboardCamera::new();
    camera.attach_stdin(tx);

    let client = ScanClient::with_config(camera, config);
    let session = ScanSession::new(client, HttpBackend::new(config)?);

    println!("Scan a QR code (or paste its text and press Enter). :stop, :start, :reset, :quit");
    // A camera failure lands on the client as a notice
    let _ = session.client_mut().start();
    if let Some(notice) = session.client_mut().take_notice() {
        println!("{}", notice);
    }

    let mut last_status = None;
    let on_update = |client: &mut ScanClient<KeyboardCamera>| {
        if let Some(notice) = client.take_notice() {
            println!("{}", notice);
        }
        let status = client.status();
        if last_status != Some(status) {
            last_status = Some(status);
            match status {
                ScanStatus::Idle => println!("Camera off."),
                ScanStatus::Scanning => println!("Scanning..."),
                ScanStatus::Paused => println!("Checking in..."),
                ScanStatus::Failed => println!("Check-in failed, scan again."),
                ScanStatus::Succeeded => println!("Done. Type :reset to scan for another session."),
            }
        }
    };

    tokio::select! {
        _ = session.run(rx, on_update) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
        }
    }
    // Also covers the interrupted path, where run never got to its teardown
    session.client_mut().stop();
    Ok(())
}
