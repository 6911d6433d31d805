use crate::model::{ActionToken, Emotion};
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    future::Future,
    io,
    path::PathBuf,
    time::Duration,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct DisplaySize {
    pub(crate) width: u32,
    pub(crate) height: u32,
}

/// Which sheet a window wants on screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum SheetKey {
    Action(ActionToken),
    Emotion(Emotion),
}

impl SheetKey {
    pub(crate) fn file_name(self) -> String {
        format!("{self}.png")
    }
}

impl fmt::Display for SheetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SheetKey::Action(a) => f.write_str(a.name()),
            SheetKey::Emotion(e) => f.write_str(e.name()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum SpriteError {
    #[error("sprite loading timed out after {}ms: {sheet}", .after.as_millis())]
    Timeout { sheet: SheetKey, after: Duration },
    #[error("failed to read sprite {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to decode sprite {sheet}: {reason}")]
    Decode { sheet: SheetKey, reason: String },
    #[error("sprite loader is no longer running")]
    LoaderClosed,
}

/// Fixed frame layout shared by every sheet.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SheetGrid {
    pub(crate) frames_per_row: u32,
    pub(crate) rows: u32,
    pub(crate) total_frames: u32,
    pub(crate) sheet_width: f32,
    pub(crate) sheet_height: f32,
}

impl Default for SheetGrid {
    fn default() -> Self {
        Self {
            frames_per_row: 6,
            rows: 5,
            total_frames: 29,
            sheet_width: 1280.0,
            sheet_height: 1066.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct SourceRect {
    pub(crate) x: f32,
    pub(crate) y: f32,
    pub(crate) w: f32,
    pub(crate) h: f32,
}

impl SheetGrid {
    pub(crate) fn frame_width(&self) -> f32 {
        self.sheet_width / self.frames_per_row as f32
    }

    pub(crate) fn frame_height(&self) -> f32 {
        self.sheet_height / self.rows as f32
    }

    /// (row, col) of a frame. Cells past the last real frame on the
    /// partially filled bottom row fold back to the first frame.
    pub(crate) fn cell(&self, frame: u32) -> (u32, u32) {
        let row = frame / self.frames_per_row;
        let col = frame % self.frames_per_row;
        let last_row_len = self.total_frames % self.frames_per_row;
        if row >= self.rows || (row == self.rows - 1 && last_row_len != 0 && col >= last_row_len) {
            return (0, 0);
        }
        (row, col)
    }

    pub(crate) fn source_rect(&self, frame: u32) -> SourceRect {
        let (row, col) = self.cell(frame);
        let w = self.frame_width();
        let h = self.frame_height();
        SourceRect {
            x: col as f32 * w,
            y: row as f32 * h,
            w,
            h,
        }
    }
}

pub(crate) struct SpriteSheet {
    pub(crate) key: SheetKey,
    pub(crate) image: image::RgbaImage,
}

impl fmt::Debug for SpriteSheet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpriteSheet")
            .field("key", &self.key)
            .field("width", &self.image.width())
            .field("height", &self.image.height())
            .finish()
    }
}

impl SpriteSheet {
    /// RGBA at sheet coordinates, clamped to the decoded image so a sheet
    /// smaller than the nominal grid still draws.
    pub(crate) fn sample(&self, x: f32, y: f32) -> [u8; 4] {
        let w = self.image.width();
        let h = self.image.height();
        if w == 0 || h == 0 {
            return [0, 0, 0, 0];
        }
        let px = (x.max(0.0) as u32).min(w - 1);
        let py = (y.max(0.0) as u32).min(h - 1);
        self.image.get_pixel(px, py).0
    }
}

/// Where sheets come from. The loader task owns one of these and calls it
/// for one sheet at a time.
pub(crate) trait SheetSource: Send + Sync + 'static {
    fn fetch(&self, key: SheetKey) -> impl Future<Output = Result<SpriteSheet, SpriteError>> + Send;
}

pub(crate) struct FileSheetSource {
    dir: PathBuf,
}

impl FileSheetSource {
    pub(crate) fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl SheetSource for FileSheetSource {
    fn fetch(&self, key: SheetKey) -> impl Future<Output = Result<SpriteSheet, SpriteError>> + Send {
        let path = self.dir.join(key.file_name());
        async move {
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|source| SpriteError::Io { path, source })?;
            let image = tokio::task::spawn_blocking(move || {
                image::load_from_memory_with_format(&bytes, ImageFormat::Png).map(|i| i.to_rgba8())
            })
            .await
            .map_err(|e| SpriteError::Decode {
                sheet: key,
                reason: e.to_string(),
            })?
            .map_err(|e| SpriteError::Decode {
                sheet: key,
                reason: e.to_string(),
            })?;
            Ok(SpriteSheet { key, image })
        }
    }
}
