use std::path::Path;

use crate::core::message::ImageSource;

/// Read an image file into an inline source, typed from its extension.
pub fn load_image(path: &Path) -> Result<ImageSource, Box<dyn std::error::Error>> {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if mime.type_() != mime_guess::mime::IMAGE {
        return Err(format!("{} is not an image ({mime})", path.display()).into());
    }

    let data = std::fs::read(path)
        .map_err(|err| format!("Failed to read image {}: {err}", path.display()))?;
    Ok(ImageSource::inline(mime.essence_str(), data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn png_files_become_inline_images() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("figure.png");
        std::fs::write(&path, [0x89, b'P', b'N', b'G']).unwrap();

        let image = load_image(&path).unwrap();
        assert_eq!(image.to_uri(), "data:image/png;base64,iVBORw==");
    }

    #[test]
    fn non_images_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "hi").unwrap();
        assert!(load_image(&path).is_err());
    }
}
