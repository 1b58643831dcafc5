use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use image::ImageFormat;
use pagescribe_core::{decode_data_url, split_data_url, CompressedImage};
use tracing::debug;

use crate::error::{Result, StoreError};

/// Raw-image upload collaborator: stores a compressed page under a
/// namespacing key and returns a stable reference to it.
pub trait ImageUploader {
    fn upload(&self, namespace: &str, image: &CompressedImage) -> Result<String>;
}

/// Content-addressed uploader writing to `<root>/<namespace>/<blake3>.<ext>`.
/// Uploading the same bytes twice yields the same reference.
#[derive(Debug, Clone)]
pub struct LocalUploader {
    root: PathBuf,
}

impl LocalUploader {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ImageUploader for LocalUploader {
    fn upload(&self, namespace: &str, image: &CompressedImage) -> Result<String> {
        validate_namespace(namespace)?;
        let (mime, _) = split_data_url(&image.data_url)
            .ok_or_else(|| StoreError::Validation("image is not a base64 data url".to_string()))?;
        let bytes = decode_data_url(&image.data_url)
            .map_err(|e| StoreError::Validation(e.to_string()))?;
        let dir = self.root.join(namespace);
        fs::create_dir_all(&dir)?;
        let name = format!(
            "{}.{}",
            blake3::hash(&bytes).to_hex(),
            extension_for(&bytes, mime)
        );
        let target = dir.join(&name);
        if !target.exists() {
            let partial = dir.join(format!(".{name}.partial"));
            {
                let mut file = File::create(&partial)?;
                file.write_all(&bytes)?;
                file.sync_all()?;
            }
            fs::rename(&partial, &target)?;
        }
        debug!(namespace, reference = %target.display(), "stored page image");
        Ok(target.display().to_string())
    }
}

fn validate_namespace(namespace: &str) -> Result<()> {
    let invalid = namespace.is_empty()
        || namespace == "."
        || namespace == ".."
        || namespace.contains(['/', '\\'])
        || namespace.chars().any(char::is_control);
    if invalid {
        return Err(StoreError::Validation(format!(
            "invalid upload namespace {namespace:?}"
        )));
    }
    Ok(())
}

/// Extension of the sniffed format, falling back to the declared mime type.
fn extension_for(bytes: &[u8], mime: &str) -> &'static str {
    image::guess_format(bytes)
        .ok()
        .or_else(|| ImageFormat::from_mime_type(mime))
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or("bin")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagescribe_core::{compress, encode_data_url, CompressionTier};

    fn image(bytes: &[u8]) -> CompressedImage {
        compress(&encode_data_url("image/jpeg", bytes), CompressionTier::None)
    }

    #[test]
    fn uploads_are_content_addressed_and_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let uploader = LocalUploader::new(dir.path());
        let first = uploader.upload("u1", &image(b"page one")).unwrap();
        let again = uploader.upload("u1", &image(b"page one")).unwrap();
        let other = uploader.upload("u1", &image(b"page two")).unwrap();
        assert_eq!(first, again);
        assert_ne!(first, other);
        assert_eq!(std::fs::read(&first).unwrap(), b"page one");
        assert!(first.ends_with(".jpg"));
        assert!(Path::new(&first).starts_with(dir.path().join("u1")));
    }

    #[test]
    fn extension_follows_the_image_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let uploader = LocalUploader::new(dir.path());
        let mut png = std::io::Cursor::new(Vec::new());
        image::DynamicImage::new_rgb8(2, 2)
            .write_to(&mut png, ImageFormat::Png)
            .unwrap();
        let mislabelled = image(png.get_ref());
        assert!(mislabelled.data_url.starts_with("data:image/jpeg;"));
        let reference = uploader.upload("u1", &mislabelled).unwrap();
        assert!(reference.ends_with(".png"), "{reference}");

        let unknown = compress(
            &encode_data_url("application/x-scan", b"raw"),
            CompressionTier::None,
        );
        assert!(uploader.upload("u1", &unknown).unwrap().ends_with(".bin"));
    }

    #[test]
    fn namespaces_cannot_escape_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let uploader = LocalUploader::new(dir.path());
        for bad in ["", "..", "a/b", "a\\b"] {
            assert!(matches!(
                uploader.upload(bad, &image(b"x")),
                Err(StoreError::Validation(_))
            ));
        }
        assert!(uploader.upload("someone@example.com", &image(b"x")).is_ok());
    }
}
