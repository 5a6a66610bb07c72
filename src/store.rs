use crate::error::OcrError;
use chrono::Utc;
use image::{ImageFormat, RgbaImage};
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Extra names tried when a same-microsecond file already exists
const MAX_NAME_ATTEMPTS: u32 = 16;

/// Write-once store for rendered images.
///
/// Files are named `{prefix}_{YYYYMMDDHHMMSSffffff}.png` and created with
/// exclusive-create, so concurrent saves never overwrite each other. On a
/// collision a `_{n}` counter is appended to the timestamp.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn save(&self, image: &RgbaImage, prefix: &str) -> Result<PathBuf, OcrError> {
        fs::create_dir_all(&self.root).map_err(|e| {
            OcrError::Storage(format!(
                "Failed to create artifact directory {:?}: {}",
                self.root, e
            ))
        })?;

        let stamp = Utc::now().format("%Y%m%d%H%M%S%6f").to_string();
        self.save_stamped(image, prefix, &stamp)
    }

    fn save_stamped(
        &self,
        image: &RgbaImage,
        prefix: &str,
        stamp: &str,
    ) -> Result<PathBuf, OcrError> {
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let filename = match attempt {
                0 => format!("{}_{}.png", prefix, stamp),
                n => format!("{}_{}_{}.png", prefix, stamp, n),
            };
            let path = self.root.join(filename);

            let file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(OcrError::Storage(format!(
                        "Failed to create {:?}: {}",
                        path, e
                    )))
                }
            };

            let mut writer = BufWriter::new(file);
            let written = image
                .write_to(&mut writer, ImageFormat::Png)
                .map_err(|e| e.to_string())
                .and_then(|_| writer.flush().map_err(|e| e.to_string()));
            if let Err(e) = written {
                drop(writer);
                let _ = fs::remove_file(&path);
                return Err(OcrError::Storage(format!(
                    "Failed to write {:?}: {}",
                    path, e
                )));
            }

            tracing::info!("Saved annotated image to {:?}", path);
            return Ok(path);
        }

        Err(OcrError::Storage(format!(
            "No free file name for prefix {:?} at {}",
            prefix, stamp
        )))
    }
}
