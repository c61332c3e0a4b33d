//! 图片序列目录 - 每个图片文件为一帧, 按文件名排序, 读取时才解码

use std::fs;
use std::path::{Path, PathBuf};

use super::{has_image_extension, Frame, SourceInfo, SourceKind, VideoSource};
use crate::error::{Result, SentinelError};

/// 图片序列的名义帧率
pub const DEFAULT_SEQUENCE_FPS: f64 = 30.0;

pub struct ImageSequenceSource {
    info: SourceInfo,
    files: Vec<PathBuf>,
    cursor: usize,
}

impl ImageSequenceSource {
    pub fn open(dir: &Path) -> Result<Self> {
        let id = dir.display().to_string();
        let mut files: Vec<PathBuf> = fs::read_dir(dir)
            .map_err(|e| SentinelError::source_unavailable(&id, e))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && has_image_extension(p))
            .collect();
        files.sort();

        let first = files
            .first()
            .ok_or_else(|| SentinelError::source_unavailable(&id, "directory has no image frames"))?;
        let (width, height) = image::image_dimensions(first)
            .map_err(|e| SentinelError::source_unavailable(&id, e))?;

        Ok(Self {
            info: SourceInfo {
                id,
                kind: SourceKind::File,
                width,
                height,
                fps: DEFAULT_SEQUENCE_FPS,
                total_frames: Some(files.len() as u64),
            },
            files,
            cursor: 0,
        })
    }
}

impl VideoSource for ImageSequenceSource {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.files.get(self.cursor) else {
            return Ok(None);
        };
        let index = self.cursor as u64;
        // 无论成功与否都前进, 坏帧不会卡住循环
        self.cursor += 1;

        let image = image::open(path)
            .map_err(|e| SentinelError::unreadable(index, e))?
            .to_rgb8();
        if image.dimensions() != (self.info.width, self.info.height) {
            return Err(SentinelError::unreadable(
                index,
                format!(
                    "frame is {}x{}, expected {}x{}",
                    image.width(),
                    image.height(),
                    self.info.width,
                    self.info.height
                ),
            ));
        }
        Ok(Some(Frame { index, image }))
    }

    fn seek(&mut self, index: u64) -> Result<()> {
        if self.files.is_empty() {
            return Err(SentinelError::unreadable(index, "sequence is empty"));
        }
        self.cursor = (index % self.files.len() as u64) as usize;
        Ok(())
    }

    fn close(&mut self) {
        self.files.clear();
        self.cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_sorted_sequence() {
        let dir = tempfile::tempdir().unwrap();
        for (name, value) in [("frame_002.png", 2u8), ("frame_000.png", 0), ("frame_001.png", 1)] {
            RgbImage::from_pixel(4, 3, Rgb([value, 0, 0]))
                .save(dir.path().join(name))
                .unwrap();
        }
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut source = ImageSequenceSource::open(dir.path()).unwrap();
        assert_eq!(source.info().total_frames, Some(3));
        for expected in 0..3u8 {
            let frame = source.read().unwrap().unwrap();
            assert_eq!(frame.image.get_pixel(0, 0)[0], expected);
        }
        assert!(source.read().unwrap().is_none());

        source.seek(4).unwrap();
        assert_eq!(source.read().unwrap().unwrap().index, 1);
    }

    #[test]
    fn test_mismatched_frame_is_unreadable_but_advances() {
        let dir = tempfile::tempdir().unwrap();
        RgbImage::new(4, 3).save(dir.path().join("a.png")).unwrap();
        RgbImage::new(8, 8).save(dir.path().join("b.png")).unwrap();
        RgbImage::new(4, 3).save(dir.path().join("c.png")).unwrap();

        let mut source = ImageSequenceSource::open(dir.path()).unwrap();
        assert!(source.read().unwrap().is_some());
        let err = source.read().unwrap_err();
        assert_eq!(err.cause_tag(), "unreadable_frame");
        assert_eq!(source.read().unwrap().unwrap().index, 2);
    }

    #[test]
    fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ImageSequenceSource::open(dir.path()).is_err());
    }
}
