use kornia_image::{Image, allocator::CpuAllocator};
use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

/// An RGB frame grabbed from a video stream.
pub type Frame = Image<u8, 3, CpuAllocator>;

/// Which way a camera points.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FacingMode {
    /// Rear camera, pointing away from the user.
    Environment,
    /// Front camera, pointing at the user.
    User,
}

impl FacingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FacingMode::Environment => "environment",
            FacingMode::User => "user",
        }
    }
}

impl FromStr for FacingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "environment" | "rear" | "back" => Ok(FacingMode::Environment),
            "user" | "front" => Ok(FacingMode::User),
            other => Err(format!("unknown facing mode: {other}")),
        }
    }
}

/// Video constraint passed when requesting a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VideoConstraint {
    /// Only a camera with exactly this facing mode is acceptable.
    Exact(FacingMode),
    /// Any camera that can produce video.
    Any,
}

impl fmt::Display for VideoConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoConstraint::Exact(facing) => write!(f, "exact facing mode `{}`", facing.as_str()),
            VideoConstraint::Any => f.write_str("any camera"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    #[error("no camera satisfies {0}")]
    NotFound(VideoConstraint),
    #[error("camera access denied")]
    PermissionDenied,
    #[error("the camera is not streaming")]
    NotStreaming,
    #[error("failed to read frame: {0}")]
    Frame(String),
}

/// Source of camera streams.
pub trait MediaDevices {
    /// Opens a video stream satisfying `constraint`.
    fn get_user_media(
        &mut self,
        constraint: VideoConstraint,
    ) -> Result<Box<dyn VideoStream>, CameraError>;
}

/// A live camera stream. The hardware is held until [`VideoStream::stop`] is called.
pub trait VideoStream: Send {
    fn facing(&self) -> Option<FacingMode>;

    /// Returns the frame currently shown by the stream.
    fn grab_frame(&mut self) -> Result<Frame, CameraError>;

    /// Stops every track of the stream.
    fn stop(&mut self);

    fn active_tracks(&self) -> usize;
}

/// Requests the rear camera, falling back to any camera when it cannot be had.
///
/// The error of the fallback request is returned as is.
pub fn open_rear_camera(
    devices: &mut dyn MediaDevices,
) -> Result<Box<dyn VideoStream>, CameraError> {
    match devices.get_user_media(VideoConstraint::Exact(FacingMode::Environment)) {
        Ok(stream) => Ok(stream),
        Err(e) => {
            log::warn!("Rear camera unavailable ({e}), falling back to any camera");
            devices.get_user_media(VideoConstraint::Any)
        }
    }
}

/// One camera of [`ReplayDevices`], given on the command line as `FACING:DIR`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplayCameraSpec {
    pub facing: FacingMode,
    pub frames_dir: PathBuf,
}

impl FromStr for ReplayCameraSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (facing, dir) = s
            .split_once(':')
            .ok_or_else(|| format!("expected FACING:DIR, got `{s}`"))?;
        if dir.is_empty() {
            return Err(format!("missing frames directory in `{s}`"));
        }
        Ok(Self {
            facing: facing.parse()?,
            frames_dir: PathBuf::from(dir),
        })
    }
}

/// Cameras that replay JPEG/PNG frames from a directory, in file name order.
///
/// Each grab returns the next frame, wrapping around at the end like a live feed.
#[derive(Default)]
pub struct ReplayDevices {
    cameras: Vec<ReplayCameraSpec>,
}

impl ReplayDevices {
    pub fn new(cameras: Vec<ReplayCameraSpec>) -> Self {
        Self { cameras }
    }

    fn open(&self, spec: &ReplayCameraSpec) -> Result<ReplayStream, CameraError> {
        let mut frames = std::fs::read_dir(&spec.frames_dir)
            .map_err(|e| CameraError::Frame(format!("{}: {e}", spec.frames_dir.display())))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_frame_file(path))
            .collect::<Vec<_>>();
        frames.sort();

        if frames.is_empty() {
            return Err(CameraError::Frame(format!(
                "no frames in {}",
                spec.frames_dir.display()
            )));
        }

        log::debug!(
            "Opened {} camera with {} frames",
            spec.facing.as_str(),
            frames.len()
        );

        Ok(ReplayStream {
            facing: spec.facing,
            frames,
            cursor: 0,
            live: true,
        })
    }
}

impl MediaDevices for ReplayDevices {
    fn get_user_media(
        &mut self,
        constraint: VideoConstraint,
    ) -> Result<Box<dyn VideoStream>, CameraError> {
        let spec = self
            .cameras
            .iter()
            .find(|camera| match constraint {
                VideoConstraint::Exact(facing) => camera.facing == facing,
                VideoConstraint::Any => true,
            })
            .ok_or(CameraError::NotFound(constraint))?;

        Ok(Box::new(self.open(spec)?))
    }
}

struct ReplayStream {
    facing: FacingMode,
    frames: Vec<PathBuf>,
    cursor: usize,
    live: bool,
}

impl VideoStream for ReplayStream {
    fn facing(&self) -> Option<FacingMode> {
        Some(self.facing)
    }

    fn grab_frame(&mut self) -> Result<Frame, CameraError> {
        if !self.live {
            return Err(CameraError::NotStreaming);
        }
        let path = &self.frames[self.cursor];
        self.cursor = (self.cursor + 1) % self.frames.len();
        read_frame(path)
    }

    fn stop(&mut self) {
        self.live = false;
    }

    fn active_tracks(&self) -> usize {
        usize::from(self.live)
    }
}

fn is_frame_file(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref(),
        Some("jpg" | "jpeg" | "png")
    )
}

fn read_frame(path: &Path) -> Result<Frame, CameraError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .ok_or_else(|| CameraError::Frame("Invalid file extension".to_string()))?;

    match extension.as_str() {
        "jpg" | "jpeg" => kornia_io::jpeg::read_image_jpeg_rgb8(path)
            .map_err(|e| CameraError::Frame(e.to_string())),
        "png" => kornia_io::png::read_image_png_rgb8(path)
            .map_err(|e| CameraError::Frame(e.to_string())),
        _ => Err(CameraError::Frame(format!(
            "Unsupported image format: {extension}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeStream;

    impl VideoStream for FakeStream {
        fn facing(&self) -> Option<FacingMode> {
            None
        }
        fn grab_frame(&mut self) -> Result<Frame, CameraError> {
            Err(CameraError::NotStreaming)
        }
        fn stop(&mut self) {}
        fn active_tracks(&self) -> usize {
            1
        }
    }

    /// Grants only the constraints listed in `grants`, recording every request.
    struct FakeDevices {
        grants: Vec<VideoConstraint>,
        requests: Vec<VideoConstraint>,
    }

    impl MediaDevices for FakeDevices {
        fn get_user_media(
            &mut self,
            constraint: VideoConstraint,
        ) -> Result<Box<dyn VideoStream>, CameraError> {
            self.requests.push(constraint);
            if self.grants.contains(&constraint) {
                Ok(Box::new(FakeStream))
            } else {
                Err(CameraError::NotFound(constraint))
            }
        }
    }

    #[test]
    fn rear_camera_is_requested_first() {
        let mut devices = FakeDevices {
            grants: vec![VideoConstraint::Exact(FacingMode::Environment)],
            requests: vec![],
        };
        assert!(open_rear_camera(&mut devices).is_ok());
        assert_eq!(
            devices.requests,
            vec![VideoConstraint::Exact(FacingMode::Environment)]
        );
    }

    #[test]
    fn falls_back_to_any_camera() {
        let mut devices = FakeDevices {
            grants: vec![VideoConstraint::Any],
            requests: vec![],
        };
        assert!(open_rear_camera(&mut devices).is_ok());
        assert_eq!(
            devices.requests,
            vec![
                VideoConstraint::Exact(FacingMode::Environment),
                VideoConstraint::Any
            ]
        );
    }

    #[test]
    fn no_camera_propagates_fallback_error() {
        let mut devices = FakeDevices {
            grants: vec![],
            requests: vec![],
        };
        let err = open_rear_camera(&mut devices).err().unwrap();
        assert!(matches!(err, CameraError::NotFound(VideoConstraint::Any)));
    }

    #[test]
    fn replay_devices_match_facing_mode() {
        let mut devices = ReplayDevices::new(vec![ReplayCameraSpec {
            facing: FacingMode::User,
            frames_dir: PathBuf::from("/nonexistent"),
        }]);
        let err = devices
            .get_user_media(VideoConstraint::Exact(FacingMode::Environment))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            CameraError::NotFound(VideoConstraint::Exact(FacingMode::Environment))
        ));
    }

    #[test]
    fn parses_camera_spec() {
        let spec: ReplayCameraSpec = "rear:/tmp/frames".parse().unwrap();
        assert_eq!(spec.facing, FacingMode::Environment);
        assert_eq!(spec.frames_dir, PathBuf::from("/tmp/frames"));

        assert!("rear".parse::<ReplayCameraSpec>().is_err());
        assert!("sideways:/tmp".parse::<ReplayCameraSpec>().is_err());
        assert!("user:".parse::<ReplayCameraSpec>().is_err());
    }
}
