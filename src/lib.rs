//! Capture a leaf photo, send it to a plant-disease classification service
//! and render the diagnosis.
//!
//! The [`Controller`] owns the camera stream and the active image, and turns
//! user events into requests against a [`PredictBackend`]. Everything the user
//! sees goes through a [`Surface`].

pub mod backend;
pub mod camera;
pub mod capture;
pub mod config;
pub mod messages;
pub mod render;

pub use backend::{HttpBackend, PredictBackend, PredictError};
pub use camera::{CameraError, MediaDevices, VideoStream};
pub use capture::{CaptureError, CapturedImage};
pub use config::EndpointConfig;
pub use messages::PredictionResult;
pub use render::ResultView;

use std::{
    path::PathBuf,
    time::{Duration, Instant},
};
use tokio::task::{JoinError, JoinSet};

/// Represents the current state of the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControllerState {
    /// Nothing captured or selected yet.
    Idle,
    /// The camera is streaming and waiting for a capture.
    CameraActive,
    /// An image is ready to be submitted.
    ImageCaptured,
    /// At least one prediction request is in flight.
    Predicting,
    /// The latest prediction has been rendered.
    ResultShown,
}

impl ControllerState {
    /// Returns the state as a string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ControllerState::Idle => "idle",
            ControllerState::CameraActive => "camera-active",
            ControllerState::ImageCaptured => "image-captured",
            ControllerState::Predicting => "predicting",
            ControllerState::ResultShown => "result-shown",
        }
    }
}

/// User actions the controller reacts to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UiEvent {
    /// Open the rear camera, or any camera if there is none.
    OpenCamera,
    /// Take the current camera frame as the active image.
    Capture,
    /// Use the given file as the active image.
    SelectFile(PathBuf),
    /// Submit the active image for diagnosis.
    Predict,
}

/// Blocking notices shown to the user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Notice {
    /// Predict was requested before any image was captured or selected.
    NoImageSelected,
    /// The prediction request failed or its response could not be read.
    PredictionFailed,
}

impl Notice {
    /// Returns the message shown to the user.
    pub fn text(&self) -> &'static str {
        match self {
            Notice::NoImageSelected => "Please upload or capture a leaf image first!",
            Notice::PredictionFailed => "Prediction failed. Check backend connection.",
        }
    }
}

/// Where the controller renders what the user sees.
pub trait Surface {
    /// Shows or hides the live camera view and its capture action.
    fn show_camera(&mut self, visible: bool);

    /// Shows the newly active image.
    fn show_preview(&mut self, image: &CapturedImage);

    /// Hides the previous result while a prediction is pending.
    fn hide_result(&mut self);

    /// Renders a prediction.
    fn show_result(&mut self, view: &ResultView);

    /// Shows a blocking notice.
    fn notify(&mut self, notice: Notice);
}

/// Errors returned by controller operations.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// No camera could be opened, or the stream failed.
    #[error(transparent)]
    Camera(#[from] CameraError),
    /// The frame could not be encoded or the file could not be read.
    #[error(transparent)]
    Capture(#[from] CaptureError),
    /// Predict was requested without an active image.
    #[error("no image has been captured or selected")]
    NoImageSelected,
}

/// A prediction request that has been scheduled but not sent yet.
///
/// It owns a copy of the image, so several of them can run concurrently
/// while the controller keeps handling events.
pub struct PendingPrediction<B> {
    id: u64,
    backend: B,
    image: CapturedImage,
}

impl<B: PredictBackend> PendingPrediction<B> {
    /// Identifier of the request, increasing with every prediction.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Sends the request and waits for the response.
    pub async fn run(self) -> PredictionOutcome {
        let start_time = Instant::now();
        let result = self.backend.predict(self.image).await;

        log::debug!("Prediction #{} completed", self.id);

        PredictionOutcome {
            id: self.id,
            start_time,
            duration: start_time.elapsed(),
            result,
        }
    }
}

/// Response of a prediction request, with telemetry.
pub struct PredictionOutcome {
    /// Identifier matching the pending request.
    pub id: u64,
    /// Timestamp when the request was sent.
    pub start_time: Instant,
    /// Total time the request took.
    pub duration: Duration,
    /// The parsed response, or why there is none.
    pub result: Result<PredictionResult, PredictError>,
}

/// What the controller did with a completed prediction.
#[derive(Debug, PartialEq)]
pub enum PredictionApplied {
    /// The result was rendered.
    Shown(ResultView),
    /// The request failed and the user was notified.
    Failed,
    /// A newer request already completed; this one was discarded.
    Stale,
}

/// What dispatching an event produced.
pub enum Dispatch<B> {
    /// The event was handled synchronously.
    Done,
    /// A prediction the caller must run and hand back to
    /// [`Controller::complete_predict`].
    Pending(PendingPrediction<B>),
}

/// The capture-and-predict controller.
///
/// Overlapping predictions are allowed. Responses are applied in the order
/// they arrive, except that a response older than the last applied one is
/// dropped.
pub struct Controller<D, B, S> {
    devices: D,
    backend: B,
    surface: S,
    stream: Option<Box<dyn VideoStream>>,
    active_image: Option<CapturedImage>,
    state: ControllerState,
    settled_state: ControllerState,
    jpeg_quality: u8,
    id_counter: u64,
    in_flight: usize,
    latest_applied: Option<u64>,
}

impl<D: MediaDevices, B: PredictBackend, S: Surface> Controller<D, B, S> {
    /// Creates an idle controller.
    ///
    /// # Arguments
    /// * `devices` - Where camera streams are requested from
    /// * `backend` - The service predictions are sent to
    /// * `surface` - Where everything the user sees is rendered
    pub fn new(devices: D, backend: B, surface: S) -> Self {
        Self {
            devices,
            backend,
            surface,
            stream: None,
            active_image: None,
            state: ControllerState::Idle,
            settled_state: ControllerState::Idle,
            jpeg_quality: capture::DEFAULT_JPEG_QUALITY,
            id_counter: 0,
            in_flight: 0,
            latest_applied: None,
        }
    }

    /// Sets the JPEG quality of camera captures, clamped to 1..=100.
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    /// Returns the current state of the controller.
    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Number of prediction requests sent and not yet completed.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Returns the image the next prediction would submit.
    pub fn active_image(&self) -> Option<&CapturedImage> {
        self.active_image.as_ref()
    }

    /// Whether a camera stream is currently held.
    pub fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    /// Returns the surface the controller renders to.
    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Returns the surface mutably.
    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    /// Handles a user event.
    ///
    /// # Returns
    /// * `Done` - The event was fully handled
    /// * `Pending` - A prediction to run and pass back to [`Controller::complete_predict`]
    pub fn dispatch(&mut self, event: UiEvent) -> Result<Dispatch<B>, ControllerError> {
        log::debug!("Dispatching {event:?} in state {}", self.state.as_str());
        match event {
            UiEvent::OpenCamera => self.start_camera()?,
            UiEvent::Capture => self.capture_frame()?,
            UiEvent::SelectFile(path) => self.select_file(path)?,
            UiEvent::Predict => return Ok(Dispatch::Pending(self.begin_predict()?)),
        }
        Ok(Dispatch::Done)
    }

    /// Opens the rear camera, or any camera if there is no rear one.
    ///
    /// A failure to open any camera is returned to the caller.
    pub fn start_camera(&mut self) -> Result<(), ControllerError> {
        if let Some(mut previous) = self.stream.take() {
            previous.stop();
            self.surface.show_camera(false);
            self.state = self.resting_state();
        }

        let stream = camera::open_rear_camera(&mut self.devices)?;
        log::info!(
            "Camera started (facing: {})",
            stream.facing().map_or("unspecified", |facing| facing.as_str())
        );

        self.stream = Some(stream);
        self.surface.show_camera(true);
        self.state = ControllerState::CameraActive;
        Ok(())
    }

    /// Encodes the current frame as the active image and releases the camera.
    pub fn capture_frame(&mut self) -> Result<(), ControllerError> {
        let stream = self.stream.as_mut().ok_or(CameraError::NotStreaming)?;
        let frame = stream.grab_frame()?;
        let image = CapturedImage::from_frame(&frame, self.jpeg_quality)?;

        stream.stop();
        log::debug!("Camera stopped ({} active tracks)", stream.active_tracks());
        self.stream = None;
        self.surface.show_camera(false);

        self.set_active_image(image);
        Ok(())
    }

    /// Makes the file at `path` the active image, without validating it.
    pub fn select_file(&mut self, path: impl Into<PathBuf>) -> Result<(), ControllerError> {
        let image = CapturedImage::from_file(path.into())?;
        self.set_active_image(image);
        Ok(())
    }

    /// Replaces the active image.
    ///
    /// The state stays `Predicting` while requests are in flight.
    pub fn set_active_image(&mut self, image: CapturedImage) {
        log::debug!("Active image replaced ({} bytes)", image.len());
        self.surface.show_preview(&image);
        self.active_image = Some(image);
        self.settled_state = ControllerState::ImageCaptured;
        if self.in_flight == 0 {
            self.state = ControllerState::ImageCaptured;
        }
    }

    /// Schedules a prediction of the active image.
    ///
    /// Without an active image the user is notified and nothing is sent.
    pub fn begin_predict(&mut self) -> Result<PendingPrediction<B>, ControllerError> {
        let Some(image) = self.active_image.clone() else {
            self.surface.notify(Notice::NoImageSelected);
            return Err(ControllerError::NoImageSelected);
        };

        let id = self.id_counter;
        self.id_counter += 1;
        self.in_flight += 1;

        log::debug!("Scheduling prediction #{id} ({} bytes)", image.len());

        self.surface.hide_result();
        self.state = ControllerState::Predicting;

        Ok(PendingPrediction {
            id,
            backend: self.backend.clone(),
            image,
        })
    }

    /// Applies the outcome of a prediction started with [`Controller::begin_predict`].
    pub fn complete_predict(&mut self, outcome: PredictionOutcome) -> PredictionApplied {
        self.in_flight = self.in_flight.saturating_sub(1);

        if self.latest_applied.is_some_and(|latest| latest > outcome.id) {
            log::warn!(
                "Discarding stale response of prediction #{} ({:?})",
                outcome.id,
                outcome.duration
            );
            if self.in_flight == 0 {
                self.state = self.settled_state;
            }
            return PredictionApplied::Stale;
        }
        self.latest_applied = Some(outcome.id);

        let applied = match outcome.result {
            Ok(result) => {
                let view = ResultView::from_prediction(&result);
                log::info!(
                    "Prediction #{}: {} ({}) in {:?}",
                    outcome.id,
                    view.disease_name,
                    view.confidence,
                    outcome.duration
                );
                self.surface.show_result(&view);
                self.settled_state = ControllerState::ResultShown;
                PredictionApplied::Shown(view)
            }
            Err(e) => {
                log::error!(
                    "Prediction #{} failed after {:?}: {e}",
                    outcome.id,
                    outcome.duration
                );
                self.surface.notify(Notice::PredictionFailed);
                self.settled_state = ControllerState::ImageCaptured;
                PredictionApplied::Failed
            }
        };

        self.state = if self.in_flight > 0 {
            ControllerState::Predicting
        } else {
            self.settled_state
        };
        applied
    }

    /// Applies a prediction joined from a [`JoinSet`].
    ///
    /// A task that panicked or was aborted still counts as completed.
    pub fn complete_joined(
        &mut self,
        joined: Result<PredictionOutcome, JoinError>,
    ) -> PredictionApplied {
        match joined {
            Ok(outcome) => self.complete_predict(outcome),
            Err(e) => {
                log::error!("Prediction task failed: {e}");
                self.in_flight = self.in_flight.saturating_sub(1);
                self.surface.notify(Notice::PredictionFailed);
                if self.in_flight == 0 {
                    self.state = self.settled_state;
                }
                PredictionApplied::Failed
            }
        }
    }

    /// Waits for every prediction in `pending` and applies each as it completes.
    ///
    /// # Returns
    /// The number of predictions applied
    pub async fn drain(&mut self, pending: &mut JoinSet<PredictionOutcome>) -> usize {
        let mut applied = 0;
        while let Some(joined) = pending.join_next().await {
            self.complete_joined(joined);
            applied += 1;
        }
        applied
    }

    /// Runs one prediction to completion.
    pub async fn predict(&mut self) -> Result<PredictionApplied, ControllerError> {
        let pending = self.begin_predict()?;
        let outcome = pending.run().await;
        Ok(self.complete_predict(outcome))
    }

    fn resting_state(&self) -> ControllerState {
        if self.active_image.is_some() {
            self.settled_state
        } else {
            ControllerState::Idle
        }
    }
}

impl<D, B, S> Drop for Controller<D, B, S> {
    fn drop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
        }
    }
}
