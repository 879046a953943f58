use std::collections::HashMap;
use std::io::Cursor;
use std::sync::RwLock;

use base64::{Engine, engine::general_purpose::STANDARD};
use derive_more::Display;
use image::{ImageEncoder, ImageReader, Limits, codecs::jpeg::JpegEncoder, imageops::FilterType};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

const MIN_JPEG_QUALITY: u8 = 50;
/// Largest frame side accepted from a client, enough for 4K sensors.
const MAX_FRAME_SIDE: u32 = 4096;
const MAX_DECODE_ALLOC: u64 = 128 * 1024 * 1024;

/// Output geometry and size bound of a captured selfie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhotoSettings {
    pub width: u32,
    pub height: u32,
    pub quality: u8,
    pub max_bytes: usize,
}

impl Default for PhotoSettings {
    fn default() -> Self {
        Self {
            width: 600,
            height: 800,
            quality: 90,
            max_bytes: 512 * 1024,
        }
    }
}

/// Exclusive handle on an open camera stream. Not `Clone`: `stop` consumes it.
#[derive(Debug, PartialEq, Eq, Hash, Display)]
#[display(fmt = "stream-{}", _0)]
pub struct StreamHandle(Uuid);

impl StreamHandle {
    pub fn id(&self) -> Uuid {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct CapturedPhoto {
    /// `data:image/jpeg;base64,...`
    pub data_url: String,
    pub width: u32,
    pub height: u32,
    pub bytes: usize,
}

#[allow(async_fn_in_trait)]
pub trait CameraCapturer {
    /// Opens a front-facing video stream.
    async fn start(&self) -> AppResult<StreamHandle>;
    /// Samples the current frame of an open stream.
    async fn capture(&self, stream: &StreamHandle) -> AppResult<CapturedPhoto>;
    /// Releases the stream and everything it holds.
    fn stop(&self, stream: StreamHandle);
}

/// Camera whose frames are pushed by the client page.
pub struct FrameCamera {
    streams: RwLock<HashMap<Uuid, Option<Vec<u8>>>>,
    settings: PhotoSettings,
}

impl FrameCamera {
    pub fn new(settings: PhotoSettings) -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            settings,
        }
    }

    /// Replaces the latest frame of a live stream.
    pub fn feed(&self, stream_id: Uuid, frame: Vec<u8>) -> AppResult<()> {
        let mut streams = self
            .streams
            .write()
            .map_err(|_| anyhow::anyhow!("camera registry poisoned"))?;
        match streams.get_mut(&stream_id) {
            Some(slot) => {
                *slot = Some(frame);
                Ok(())
            }
            None => Err(AppError::NotFound(format!("camera stream {stream_id}"))),
        }
    }

    pub fn active_streams(&self) -> usize {
        self.streams.read().map(|s| s.len()).unwrap_or(0)
    }
}

impl CameraCapturer for FrameCamera {
    async fn start(&self) -> AppResult<StreamHandle> {
        let id = Uuid::new_v4();
        self.streams
            .write()
            .map_err(|_| anyhow::anyhow!("camera registry poisoned"))?
            .insert(id, None);
        tracing::debug!(stream = %id, "camera stream opened");
        Ok(StreamHandle(id))
    }

    async fn capture(&self, stream: &StreamHandle) -> AppResult<CapturedPhoto> {
        let frame = self
            .streams
            .read()
            .map_err(|_| anyhow::anyhow!("camera registry poisoned"))?
            .get(&stream.id())
            .cloned()
            .ok_or_else(|| AppError::CameraUnavailable("camera stream was released".into()))?
            .ok_or_else(|| AppError::CameraUnavailable("no frame received from the camera yet".into()))?;

        let settings = self.settings;
        actix_web::web::block(move || encode_photo(&frame, &settings))
            .await
            .map_err(|e| anyhow::anyhow!("photo encoding was cancelled: {e}"))?
    }

    fn stop(&self, stream: StreamHandle) {
        if let Ok(mut streams) = self.streams.write() {
            streams.remove(&stream.id());
        }
        tracing::debug!(stream = %stream, "camera stream released");
    }
}

/// Source rectangle `(x, y, w, h)` center-cropping `src` to the target aspect.
pub fn center_crop(src_w: u32, src_h: u32, target_w: u32, target_h: u32) -> (u32, u32, u32, u32) {
    let target_aspect = target_w as f64 / target_h as f64;
    let current_aspect = src_w as f64 / src_h as f64;

    if current_aspect > target_aspect {
        let w = ((src_h as f64 * target_aspect).round() as u32).clamp(1, src_w);
        ((src_w - w) / 2, 0, w, src_h)
    } else {
        let h = ((src_w as f64 / target_aspect).round() as u32).clamp(1, src_h);
        (0, (src_h - h) / 2, src_w, h)
    }
}

fn unreadable(e: impl std::fmt::Display) -> AppError {
    AppError::CameraUnavailable(format!("unreadable camera frame: {e}"))
}

/// Decodes a raw frame, crops and resizes it, and re-encodes it as a bounded JPEG.
pub fn encode_photo(frame: &[u8], settings: &PhotoSettings) -> AppResult<CapturedPhoto> {
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_FRAME_SIDE);
    limits.max_image_height = Some(MAX_FRAME_SIDE);
    limits.max_alloc = Some(MAX_DECODE_ALLOC);

    let mut reader = ImageReader::new(Cursor::new(frame))
        .with_guessed_format()
        .map_err(unreadable)?;
    reader.limits(limits);
    let img = reader.decode().map_err(unreadable)?;

    let (x, y, w, h) = center_crop(img.width(), img.height(), settings.width, settings.height);
    let rgb = img
        .crop_imm(x, y, w, h)
        .resize_exact(settings.width, settings.height, FilterType::Triangle)
        .to_rgb8();

    let mut quality = settings.quality;
    let jpeg = loop {
        let mut buf = Vec::new();
        JpegEncoder::new_with_quality(&mut buf, quality)
            .write_image(
                rgb.as_raw(),
                rgb.width(),
                rgb.height(),
                image::ExtendedColorType::Rgb8,
            )
            .map_err(|e| anyhow::anyhow!("jpeg encoding failed: {e}"))?;

        if buf.len() <= settings.max_bytes || quality <= MIN_JPEG_QUALITY {
            break buf;
        }
        quality = quality.saturating_sub(10).max(MIN_JPEG_QUALITY);
    };

    Ok(CapturedPhoto {
        bytes: jpeg.len(),
        data_url: format!("data:image/jpeg;base64,{}", STANDARD.encode(&jpeg)),
        width: settings.width,
        height: settings.height,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};

    /// A PNG frame of the given size with a gradient so the encoder has work to do.
    pub(crate) fn png_frame(width: u32, height: u32) -> Vec<u8> {
        let buf = ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(buf)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    /// Camera that never gets device permission.
    pub(crate) struct DeniedCamera;

    impl CameraCapturer for DeniedCamera {
        async fn start(&self) -> AppResult<StreamHandle> {
            Err(AppError::CameraUnavailable("permission denied".into()))
        }

        async fn capture(&self, _stream: &StreamHandle) -> AppResult<CapturedPhoto> {
            Err(AppError::CameraUnavailable("permission denied".into()))
        }

        fn stop(&self, _stream: StreamHandle) {}
    }

    #[test]
    fn crops_landscape_to_portrait() {
        // 1280x720 is wider than 3:4, full height kept
        assert_eq!(center_crop(1280, 720, 600, 800), (370, 0, 540, 720));
    }

    #[test]
    fn crops_tall_frame_vertically() {
        assert_eq!(center_crop(600, 1000, 600, 800), (0, 100, 600, 800));
    }

    #[test]
    fn exact_aspect_is_untouched() {
        assert_eq!(center_crop(1200, 1600, 600, 800), (0, 0, 1200, 1600));
    }

    #[test]
    fn encodes_jpeg_data_url() {
        let photo = encode_photo(&png_frame(640, 480), &PhotoSettings::default()).unwrap();
        assert!(photo.data_url.starts_with("data:image/jpeg;base64,"));
        assert_eq!((photo.width, photo.height), (600, 800));
        assert!(photo.bytes <= PhotoSettings::default().max_bytes);
    }

    #[test]
    fn garbage_frame_is_camera_unavailable() {
        let err = encode_photo(b"not an image", &PhotoSettings::default()).unwrap_err();
        assert!(matches!(err, AppError::CameraUnavailable(_)));
    }

    #[test]
    fn oversized_frame_is_refused_before_decoding() {
        let frame = png_frame(MAX_FRAME_SIDE + 1, 4);
        let err = encode_photo(&frame, &PhotoSettings::default()).unwrap_err();
        assert!(matches!(err, AppError::CameraUnavailable(_)));
    }

    #[actix_web::test]
    async fn capture_requires_a_frame_and_stop_releases() {
        let camera = FrameCamera::new(PhotoSettings::default());
        let stream = camera.start().await.unwrap();
        assert_eq!(camera.active_streams(), 1);

        assert!(matches!(
            camera.capture(&stream).await,
            Err(AppError::CameraUnavailable(_))
        ));

        camera.feed(stream.id(), png_frame(300, 400)).unwrap();
        assert!(camera.capture(&stream).await.is_ok());

        let id = stream.id();
        camera.stop(stream);
        assert_eq!(camera.active_streams(), 0);
        assert!(matches!(
            camera.feed(id, png_frame(10, 10)),
            Err(AppError::NotFound(_))
        ));
    }
}
