use argh::FromArgs;
use leafscan::{
    CapturedImage, Controller, ControllerError, Dispatch, EndpointConfig, HttpBackend, Notice,
    PredictionApplied, ResultView, Surface, UiEvent,
    camera::{ReplayCameraSpec, ReplayDevices},
    capture::{DEFAULT_JPEG_QUALITY, ImageOrigin},
    config::{self, DEFAULT_PAGE_ORIGIN},
};
use std::path::PathBuf;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    task::JoinSet,
};

#[derive(FromArgs)]
/// Leafscan captures or loads a leaf photo and asks a backend for a diagnosis.
struct LeafscanArgs {
    /// origin the requests are relative to when no api base is set
    #[argh(option, short = 'o', default = "DEFAULT_PAGE_ORIGIN.to_string()")]
    origin: String,

    /// base url of the prediction backend; empty means same origin
    #[argh(option, short = 'a')]
    api_base_url: Option<String>,

    /// camera as FACING:DIR, replaying the frames found in DIR
    #[argh(option, short = 'c')]
    camera: Vec<ReplayCameraSpec>,

    /// jpeg quality of camera captures
    #[argh(option, default = "DEFAULT_JPEG_QUALITY")]
    jpeg_quality: u8,

    /// command to execute: "session", "predict" or "health"
    #[argh(subcommand)]
    command: LeafscanCommands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum LeafscanCommands {
    Session(SessionCommand),
    Predict(PredictCommand),
    Health(HealthCommand),
}

#[derive(FromArgs)]
/// Run an interactive session
#[argh(subcommand, name = "session")]
struct SessionCommand {}

#[derive(FromArgs)]
/// Diagnose a single image file
#[argh(subcommand, name = "predict")]
struct PredictCommand {
    /// the path to the image
    #[argh(option, short = 'i')]
    image_path: PathBuf,
}

#[derive(FromArgs)]
/// Check that the backend is reachable
#[argh(subcommand, name = "health")]
struct HealthCommand {}

const HELP: &str = "\
commands:
  camera        open the rear camera (any camera if there is none)
  capture       capture the current camera frame
  file <path>   select an image file
  predict       send the active image for diagnosis
  status        show the controller state
  help          show this help
  quit          leave the session";

/// Renders to the terminal.
struct TerminalSurface;

impl Surface for TerminalSurface {
    fn show_camera(&mut self, visible: bool) {
        if visible {
            println!("Camera is live. Type `capture` to take the photo.");
        } else {
            println!("Camera released.");
        }
    }

    fn show_preview(&mut self, image: &CapturedImage) {
        match image.origin() {
            ImageOrigin::Camera => println!("Captured photo ({} bytes).", image.len()),
            ImageOrigin::File(path) => {
                println!("Selected {} ({} bytes).", path.display(), image.len())
            }
        }
    }

    fn hide_result(&mut self) {
        println!("Diagnosing...");
    }

    fn show_result(&mut self, view: &ResultView) {
        println!("{view}");
    }

    fn notify(&mut self, notice: Notice) {
        eprintln!("! {}", notice.text());
    }
}

type LeafController = Controller<ReplayDevices, HttpBackend, TerminalSurface>;

async fn run_session(mut controller: LeafController) -> Result<(), Box<dyn std::error::Error>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pending = JoinSet::new();

    println!("{HELP}");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                let (command, argument) = line.split_once(' ').unwrap_or((line, ""));

                let event = match command {
                    "" => continue,
                    "camera" => UiEvent::OpenCamera,
                    "capture" => UiEvent::Capture,
                    "file" if !argument.trim().is_empty() => {
                        UiEvent::SelectFile(PathBuf::from(argument.trim()))
                    }
                    "predict" => UiEvent::Predict,
                    "status" => {
                        println!(
                            "state: {}, requests in flight: {}",
                            controller.state().as_str(),
                            controller.in_flight()
                        );
                        continue;
                    }
                    "quit" | "exit" => break,
                    _ => {
                        println!("{HELP}");
                        continue;
                    }
                };

                match controller.dispatch(event) {
                    Ok(Dispatch::Pending(prediction)) => {
                        pending.spawn(prediction.run());
                    }
                    Ok(Dispatch::Done) => {}
                    // the user has already been notified
                    Err(ControllerError::NoImageSelected) => {}
                    Err(e) => eprintln!("error: {e}"),
                }
            }
            Some(joined) = pending.join_next(), if !pending.is_empty() => {
                controller.complete_joined(joined);
            }
        }
    }

    // dropping the set would abort the requests still in flight
    if !pending.is_empty() {
        println!("Waiting for {} pending prediction(s)...", pending.len());
        controller.drain(&mut pending).await;
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: LeafscanArgs = argh::from_env();

    let origin = config::parse_origin(&args.origin)?;
    let endpoint = EndpointConfig::resolve(args.api_base_url.as_deref());
    let backend = HttpBackend::new(&endpoint, &origin)?;

    log::info!("Predictions go to {}", backend.predict_url());

    match args.command {
        LeafscanCommands::Session(_) => {
            let controller = Controller::new(
                ReplayDevices::new(args.camera),
                backend,
                TerminalSurface,
            )
            .with_jpeg_quality(args.jpeg_quality);
            run_session(controller).await?;
        }
        LeafscanCommands::Predict(predict_command) => {
            let mut controller = Controller::new(ReplayDevices::default(), backend, TerminalSurface);
            controller.select_file(predict_command.image_path)?;
            if controller.predict().await? == PredictionApplied::Failed {
                return Err("prediction failed".into());
            }
        }
        LeafscanCommands::Health(_) => {
            let result = backend.health().await?;
            println!("Result: {}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}
