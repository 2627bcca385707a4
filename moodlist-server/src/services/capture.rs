//! Frame capture
//!
//! The camera is an exclusively held resource: one session at a time,
//! started and stopped explicitly. The device is released when the session
//! is stopped, when a grab fails fatally, and when the session is dropped.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Capture errors
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Capture device permission denied: {0}")]
    PermissionDenied(String),

    #[error("Capture device unavailable: {0}")]
    Unavailable(String),

    #[error("Camera already started")]
    AlreadyActive,

    #[error("Camera not started")]
    NotActive,

    #[error("Empty frame from capture device")]
    EmptyFrame,
}

impl CaptureError {
    /// Whether the device should be released after this error
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CaptureError::PermissionDenied(_) | CaptureError::Unavailable(_)
        )
    }

    fn from_io(context: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => {
                CaptureError::PermissionDenied(format!("{context}: {err}"))
            }
            _ => CaptureError::Unavailable(format!("{context}: {err}")),
        }
    }
}

/// One still image from the capture device
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub content_type: String,
    pub captured_at: DateTime<Utc>,
}

/// An opened capture device
#[async_trait]
pub trait CaptureDevice: Send {
    async fn grab_frame(&mut self) -> Result<Frame, CaptureError>;

    /// Release the underlying device; called exactly once
    fn release(&mut self);
}

/// Something that can open a capture device
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn open(&self) -> Result<Box<dyn CaptureDevice>, CaptureError>;
}

/// Frame source backed by a snapshot file kept current by an external
/// capture tool
pub struct SnapshotFrameSource {
    path: PathBuf,
}

impl SnapshotFrameSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl FrameSource for SnapshotFrameSource {
    async fn open(&self) -> Result<Box<dyn CaptureDevice>, CaptureError> {
        // Opening once up front surfaces permission problems at start time
        tokio::fs::File::open(&self.path)
            .await
            .map_err(|e| CaptureError::from_io(&self.path.display().to_string(), e))?;

        Ok(Box::new(SnapshotDevice {
            path: self.path.clone(),
            content_type: content_type_for(&self.path),
        }))
    }
}

struct SnapshotDevice {
    path: PathBuf,
    content_type: String,
}

#[async_trait]
impl CaptureDevice for SnapshotDevice {
    async fn grab_frame(&mut self) -> Result<Frame, CaptureError> {
        let data = tokio::fs::read(&self.path)
            .await
            .map_err(|e| CaptureError::from_io(&self.path.display().to_string(), e))?;
        if data.is_empty() {
            return Err(CaptureError::EmptyFrame);
        }
        Ok(Frame {
            data,
            content_type: self.content_type.clone(),
            captured_at: Utc::now(),
        })
    }

    fn release(&mut self) {
        debug!(path = %self.path.display(), "Snapshot device released");
    }
}

fn content_type_for(path: &std::path::Path) -> String {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
    .to_string()
}

/// Active capture session; releases the device on drop
struct CaptureSession {
    device: Box<dyn CaptureDevice>,
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.device.release();
    }
}

/// Owner of the single capture session
pub struct Camera {
    source: Box<dyn FrameSource>,
    session: Mutex<Option<CaptureSession>>,
    active: AtomicBool,
}

impl Camera {
    pub fn new(source: Box<dyn FrameSource>) -> Self {
        Self {
            source,
            session: Mutex::new(None),
            active: AtomicBool::new(false),
        }
    }

    /// Whether a session is open
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Open the capture device
    pub async fn start(&self) -> Result<(), CaptureError> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            return Err(CaptureError::AlreadyActive);
        }

        let device = self.source.open().await.map_err(|e| {
            warn!(error = %e, "Failed to open capture device");
            e
        })?;
        *session = Some(CaptureSession { device });
        self.active.store(true, Ordering::Release);
        info!("Camera started");
        Ok(())
    }

    /// Release the capture device
    pub async fn stop(&self) -> Result<(), CaptureError> {
        let mut session = self.session.lock().await;
        match session.take() {
            Some(released) => {
                self.active.store(false, Ordering::Release);
                drop(released);
                info!("Camera stopped");
                Ok(())
            }
            None => Err(CaptureError::NotActive),
        }
    }

    /// Grab one frame from the open session
    ///
    /// A fatal device error closes the session.
    pub async fn grab_frame(&self) -> Result<Frame, CaptureError> {
        let mut session = self.session.lock().await;
        let Some(active) = session.as_mut() else {
            return Err(CaptureError::NotActive);
        };

        match active.device.grab_frame().await {
            Ok(frame) => Ok(frame),
            Err(e) => {
                if e.is_fatal() {
                    warn!(error = %e, "Capture device failed, releasing session");
                    self.active.store(false, Ordering::Release);
                    session.take();
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    struct CountingSource {
        opened: Arc<AtomicUsize>,
        released: Arc<AtomicUsize>,
        fail_grab: bool,
    }

    struct CountingDevice {
        released: Arc<AtomicUsize>,
        fail_grab: bool,
    }

    #[async_trait]
    impl FrameSource for CountingSource {
        async fn open(&self) -> Result<Box<dyn CaptureDevice>, CaptureError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(CountingDevice {
                released: Arc::clone(&self.released),
                fail_grab: self.fail_grab,
            }))
        }
    }

    #[async_trait]
    impl CaptureDevice for CountingDevice {
        async fn grab_frame(&mut self) -> Result<Frame, CaptureError> {
            if self.fail_grab {
                return Err(CaptureError::Unavailable("unplugged".to_string()));
            }
            Ok(Frame {
                data: vec![1, 2, 3],
                content_type: "image/jpeg".to_string(),
                captured_at: Utc::now(),
            })
        }

        fn release(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn camera(fail_grab: bool) -> (Camera, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let opened = Arc::new(AtomicUsize::new(0));
        let released = Arc::new(AtomicUsize::new(0));
        let camera = Camera::new(Box::new(CountingSource {
            opened: Arc::clone(&opened),
            released: Arc::clone(&released),
            fail_grab,
        }));
        (camera, opened, released)
    }

    #[tokio::test]
    async fn test_start_grab_stop_releases_once() {
        let (camera, opened, released) = camera(false);

        camera.start().await.unwrap();
        assert!(camera.is_active());
        let frame = camera.grab_frame().await.unwrap();
        assert_eq!(frame.data, vec![1, 2, 3]);

        camera.stop().await.unwrap();
        assert!(!camera.is_active());
        assert_eq!(opened.load(Ordering::SeqCst), 1);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_second_start_rejected() {
        let (camera, opened, _) = camera(false);
        camera.start().await.unwrap();
        assert!(matches!(camera.start().await, Err(CaptureError::AlreadyActive)));
        assert_eq!(opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_without_start() {
        let (camera, _, released) = camera(false);
        assert!(matches!(camera.stop().await, Err(CaptureError::NotActive)));
        assert!(matches!(camera.grab_frame().await, Err(CaptureError::NotActive)));
        assert_eq!(released.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fatal_grab_error_releases_device() {
        let (camera, _, released) = camera(true);
        camera.start().await.unwrap();

        let err = camera.grab_frame().await.unwrap_err();
        assert!(err.is_fatal());
        assert!(!camera.is_active());
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drop_releases_device() {
        let (camera, _, released) = camera(false);
        camera.start().await.unwrap();
        drop(camera);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_snapshot_source_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.jpg");
        std::fs::write(&path, b"jpegbytes").unwrap();

        let camera = Camera::new(Box::new(SnapshotFrameSource::new(&path)));
        camera.start().await.unwrap();
        let frame = camera.grab_frame().await.unwrap();
        assert_eq!(frame.data, b"jpegbytes");
        assert_eq!(frame.content_type, "image/jpeg");
    }

    #[tokio::test]
    async fn test_snapshot_source_missing_file_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let camera = Camera::new(Box::new(SnapshotFrameSource::new(dir.path().join("none.png"))));
        let err = camera.start().await.unwrap_err();
        assert!(matches!(err, CaptureError::Unavailable(_)));
        assert!(!camera.is_active());
    }
}
