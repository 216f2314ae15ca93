use super::static_files::StaticConfig;
use super::HandlerResult;
use crate::errors::RouteError;
use crate::server::{Request, Response};
use bytes::Bytes;
use chrono::Local;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Called after uploads are stored, with the saved paths
pub type UploadCallback =
    Arc<dyn Fn(&mut Response, &mut Request, &[PathBuf]) -> HandlerResult + Send + Sync>;

/// Serializes directory creation and name-collision checks across requests.
static UPLOAD_LOCK: Mutex<()> = Mutex::new(());

fn upload_lock() -> MutexGuard<'static, ()> {
    match UPLOAD_LOCK.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Upload behaviour for a static route
#[derive(Clone)]
pub struct UploadConfig {
    /// Multipart field carrying the files
    pub file_key: String,
    /// Files larger than this are rejected with 400
    pub max_size: Option<u64>,
    /// Keep client file names instead of generating ULID names
    pub disable_random_name: bool,
    /// Invoked with the stored paths; a JSON list is returned when unset
    pub callback: Option<UploadCallback>,
}

impl fmt::Debug for UploadConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadConfig")
            .field("file_key", &self.file_key)
            .field("max_size", &self.max_size)
            .field("disable_random_name", &self.disable_random_name)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            file_key: "file".to_string(),
            max_size: None,
            disable_random_name: false,
            callback: None,
        }
    }
}

impl UploadConfig {
    /// Accept files under the `file` field with random names
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read files from another multipart field
    #[must_use]
    pub fn file_key(mut self, key: impl Into<String>) -> Self {
        self.file_key = key.into();
        self
    }

    /// Reject files larger than `bytes`
    #[must_use]
    pub fn max_size(mut self, bytes: u64) -> Self {
        self.max_size = Some(bytes);
        self
    }

    /// Keep the client-supplied file names
    #[must_use]
    pub fn keep_names(mut self) -> Self {
        self.disable_random_name = true;
        self
    }

    /// Run `callback` with the stored paths
    #[must_use]
    pub fn callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&mut Response, &mut Request, &[PathBuf]) -> HandlerResult + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }
}

/// One file part pulled from the multipart body
struct Part {
    file_name: String,
    data: Bytes,
}

fn multipart_boundary(req: &Request) -> Option<Result<String, RouteError>> {
    let content_type = req.header("content-type")?;
    if !content_type
        .trim_start()
        .to_ascii_lowercase()
        .starts_with("multipart/form-data")
    {
        return None;
    }
    Some(multer::parse_boundary(content_type).map_err(|e| RouteError::bad_request(e.to_string())))
}

fn read_parts(body: Vec<u8>, boundary: String, key: &str) -> Result<Vec<Part>, RouteError> {
    let stream = futures::stream::once(async move { Ok::<Bytes, io::Error>(Bytes::from(body)) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    futures::executor::block_on(async {
        let mut parts = Vec::new();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| RouteError::bad_request(e.to_string()))?
        {
            if field.name() != Some(key) {
                continue;
            }
            let Some(file_name) = field.file_name().map(str::to_string) else {
                continue;
            };
            let data = field
                .bytes()
                .await
                .map_err(|e| RouteError::bad_request(e.to_string()))?;
            parts.push(Part { file_name, data });
        }
        Ok::<Vec<Part>, RouteError>(parts)
    })
}

/// Client names are reduced to their last path component.
fn sanitize_name(raw: &str) -> Option<String> {
    let name = Path::new(raw.rsplit(['/', '\\']).next().unwrap_or(raw))
        .file_name()?
        .to_string_lossy()
        .into_owned();
    if name.is_empty() || name == "." || name == ".." {
        None
    } else {
        Some(name)
    }
}

fn stored_name(part: &Part, upload: &UploadConfig) -> Option<String> {
    let original = sanitize_name(&part.file_name)?;
    if upload.disable_random_name {
        return Some(original);
    }
    let id = ulid::Ulid::new().to_string().to_ascii_lowercase();
    Some(match Path::new(&original).extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{id}.{ext}"),
        None => id,
    })
}

fn collision_name(name: &str) -> String {
    let path = Path::new(name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string());
    let suffix = format!(
        "_{}{}",
        Local::now().timestamp_millis(),
        &ulid::Ulid::new().to_string()[18..]
    );
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}{suffix}.{ext}"),
        None => format!("{stem}{suffix}"),
    }
}

/// Create the target file, renaming on collision, while holding the upload lock
fn create_unique(dir: &Path, name: &str) -> io::Result<(PathBuf, fs::File)> {
    let _guard = upload_lock();
    let mut target = dir.join(name);
    if target.exists() {
        target = dir.join(collision_name(name));
    }
    let file = OpenOptions::new().write(true).create_new(true).open(&target)?;
    Ok((target, file))
}

/// Store multipart files from `req` under `<root>/<YYYY-MM-DD>/`
///
/// Returns the stored paths, or an empty list when the request carries no
/// multipart body or no acceptable files. Files with disallowed extensions
/// are skipped; a file over the size limit rejects the whole request.
pub(crate) fn receive_uploads(
    req: &mut Request,
    config: &StaticConfig,
    upload: &UploadConfig,
) -> Result<Vec<PathBuf>, RouteError> {
    let Some(boundary) = multipart_boundary(req) else {
        return Ok(Vec::new());
    };
    let boundary = boundary?;
    let body = req.body_bytes()?.to_vec();

    let parts: Vec<Part> = read_parts(body, boundary, &upload.file_key)?
        .into_iter()
        .filter(|p| {
            let allowed = config.type_allowed(Path::new(&p.file_name));
            if !allowed {
                debug!(file = %p.file_name, "Upload skipped, type not allowed");
            }
            allowed
        })
        .collect();
    if parts.is_empty() {
        return Ok(Vec::new());
    }

    if let Some(max) = upload.max_size.filter(|m| *m > 0) {
        if let Some(big) = parts.iter().find(|p| p.data.len() as u64 > max) {
            return Err(RouteError::bad_request(format!(
                "file '{}' exceeds the upload size limit",
                big.file_name
            )));
        }
    }

    let dir = config
        .root
        .join(Local::now().format("%Y-%m-%d").to_string());
    {
        let _guard = upload_lock();
        fs::create_dir_all(&dir)?;
    }

    let mut saved = Vec::with_capacity(parts.len());
    for part in &parts {
        let Some(name) = stored_name(part, upload) else {
            warn!(file = %part.file_name, "Upload skipped, unusable file name");
            continue;
        };
        let (path, mut file) = create_unique(&dir, &name)?;
        file.write_all(&part.data)?;
        debug!(path = %path.display(), bytes = part.data.len(), "Upload stored");
        saved.push(path);
    }
    Ok(saved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_name_strips_directories() {
        assert_eq!(sanitize_name("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(sanitize_name("C:\\temp\\a.png").as_deref(), Some("a.png"));
        assert_eq!(sanitize_name(".."), None);
    }

    #[test]
    fn test_collision_name_keeps_extension() {
        let renamed = collision_name("photo.png");
        assert!(renamed.starts_with("photo_"));
        assert!(renamed.ends_with(".png"));
        assert_ne!(renamed, "photo.png");
    }

    #[test]
    fn test_random_names_keep_extension() {
        let part = Part {
            file_name: "cat.JPG".to_string(),
            data: Bytes::new(),
        };
        let name = stored_name(&part, &UploadConfig::new()).unwrap();
        assert!(name.ends_with(".JPG"));
        assert_eq!(name.len(), 26 + 4);

        let kept = stored_name(&part, &UploadConfig::new().keep_names()).unwrap();
        assert_eq!(kept, "cat.JPG");
    }
}
