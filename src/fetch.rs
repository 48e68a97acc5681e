use crate::http::{fetch_error, Transport};
use crate::Result;
use std::io::Write;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Downloaded { path: PathBuf, bytes: u64 },
    /// The file was already on disk; it was left untouched.
    AlreadyPresent { path: PathBuf },
}

impl FetchOutcome {
    pub fn path(&self) -> &Path {
        match self {
            Self::Downloaded { path, .. } | Self::AlreadyPresent { path } => path,
        }
    }
}

/// Streams `image_url` into `dest_dir/filename` via a `.part` file that is
/// renamed into place once the body has been fully written.
pub fn fetch_image<T: Transport + ?Sized>(
    transport: &T,
    image_url: &Url,
    dest_dir: &Path,
    filename: &str,
) -> Result<FetchOutcome> {
    let final_path = dest_dir.join(filename);
    if final_path.exists() {
        return Ok(FetchOutcome::AlreadyPresent { path: final_path });
    }
    std::fs::create_dir_all(dest_dir)?;

    let temp_path = dest_dir.join(format!("{filename}.part"));
    let _ = std::fs::remove_file(&temp_path);

    match stream_to(transport, image_url, &temp_path) {
        Ok(0) => {
            let _ = std::fs::remove_file(&temp_path);
            Err(fetch_error(image_url, "downloaded image is empty"))
        }
        Ok(bytes) => {
            if let Err(err) = std::fs::rename(&temp_path, &final_path) {
                let _ = std::fs::remove_file(&temp_path);
                return Err(err.into());
            }
            Ok(FetchOutcome::Downloaded {
                path: final_path,
                bytes,
            })
        }
        Err(err) => {
            let _ = std::fs::remove_file(&temp_path);
            Err(err)
        }
    }
}

fn stream_to<T: Transport + ?Sized>(transport: &T, image_url: &Url, temp_path: &Path) -> Result<u64> {
    let mut body = transport.get_stream(image_url)?;
    let mut output = std::fs::File::create(temp_path)?;
    let bytes = std::io::copy(&mut body, &mut output).map_err(|err| {
        fetch_error(image_url, format!("failed reading response body: {err}"))
    })?;
    output.flush()?;
    output.sync_all()?;
    Ok(bytes)
}
