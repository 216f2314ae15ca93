use super::upload::{receive_uploads, UploadConfig};
use super::{run_pre_handler, Handler};
use crate::errors::RouteError;
use crate::router::FILEPATH_PARAM;
use crate::server::{Request, Response};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Read-only view of a directory tree with traversal-safe path mapping
#[derive(Debug, Clone)]
pub struct StaticFiles {
    base_dir: PathBuf,
}

impl StaticFiles {
    /// Serve files below `base`
    pub fn new<P: Into<PathBuf>>(base: P) -> Self {
        Self {
            base_dir: base.into(),
        }
    }

    /// Root directory
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Map an already-decoded URL path below the root
    ///
    /// Returns `None` when the path would leave the root (`..`, absolute
    /// components, prefixes).
    #[must_use]
    pub fn map_path(&self, url_path: &str) -> Option<PathBuf> {
        let mut pb = self.base_dir.clone();
        for comp in Path::new(url_path.trim_start_matches('/')).components() {
            match comp {
                Component::Normal(s) => pb.push(s),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(pb)
    }

    /// Content type by file extension
    #[must_use]
    pub fn content_type(path: &Path) -> &'static str {
        match path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_ascii_lowercase()
            .as_str()
        {
            "html" | "htm" => "text/html; charset=utf-8",
            "css" => "text/css; charset=utf-8",
            "js" | "mjs" => "application/javascript; charset=utf-8",
            "json" | "map" => "application/json",
            "txt" | "log" => "text/plain; charset=utf-8",
            "csv" => "text/csv; charset=utf-8",
            "xml" => "application/xml",
            "svg" => "image/svg+xml",
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "gif" => "image/gif",
            "webp" => "image/webp",
            "ico" => "image/x-icon",
            "woff" => "font/woff",
            "woff2" => "font/woff2",
            "wasm" => "application/wasm",
            "pdf" => "application/pdf",
            "zip" => "application/zip",
            "mp4" => "video/mp4",
            "mp3" => "audio/mpeg",
            _ => "application/octet-stream",
        }
    }

    /// Read a file by URL path
    pub fn load(&self, url_path: &str) -> io::Result<(Vec<u8>, &'static str)> {
        let path = self
            .map_path(url_path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "invalid path"))?;
        if !path.is_file() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "file not found"));
        }
        let bytes = fs::read(&path)?;
        Ok((bytes, Self::content_type(&path)))
    }
}

/// Download behaviour for a static route
#[derive(Debug, Clone, Default)]
pub struct DownloadConfig {
    /// Files larger than this are refused with 403
    pub max_size: Option<u64>,
}

impl DownloadConfig {
    /// Serve files as attachments with no size limit
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse files larger than `bytes`
    #[must_use]
    pub fn max_size(mut self, bytes: u64) -> Self {
        self.max_size = Some(bytes);
        self
    }
}

/// Static route configuration
#[derive(Debug, Clone)]
pub struct StaticConfig {
    /// Directory served; must exist at request time
    pub root: PathBuf,
    /// Permit directory listings and any trailing path
    pub allow_dir: bool,
    /// Allowed file extensions (lower-case, without the dot); empty allows all
    pub allow_types: Vec<String>,
    /// Serve files as attachments
    pub download: Option<DownloadConfig>,
    /// Accept multipart uploads into the root
    pub upload: Option<UploadConfig>,
}

impl StaticConfig {
    /// Serve `root` with defaults: no listings, any type, inline files, no uploads
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            allow_dir: false,
            allow_types: Vec::new(),
            download: None,
            upload: None,
        }
    }

    /// Toggle directory listings
    #[must_use]
    pub fn allow_dir(mut self, allow: bool) -> Self {
        self.allow_dir = allow;
        self
    }

    /// Restrict served and uploaded files to these extensions
    #[must_use]
    pub fn allow_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allow_types = types
            .into_iter()
            .map(|t| t.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    /// Serve files as downloads
    #[must_use]
    pub fn download(mut self, download: DownloadConfig) -> Self {
        self.download = Some(download);
        self
    }

    /// Accept uploads
    #[must_use]
    pub fn upload(mut self, upload: UploadConfig) -> Self {
        self.upload = Some(upload);
        self
    }

    pub(crate) fn type_allowed(&self, name: &Path) -> bool {
        if self.allow_types.is_empty() {
            return true;
        }
        let ext = name
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        self.allow_types.iter().any(|t| *t == ext)
    }
}

/// Parse a human-readable size such as `512`, `64KB`, `10MB` or `1.5GB`
///
/// Units are binary multiples and case-insensitive.
pub fn parse_size(raw: &str) -> Result<u64, String> {
    let trimmed = raw.trim();
    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);
    let number: f64 = number
        .parse()
        .map_err(|_| format!("'{raw}' does not start with a number"))?;
    let multiplier: u64 = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" => 1 << 10,
        "M" | "MB" => 1 << 20,
        "G" | "GB" => 1 << 30,
        "T" | "TB" => 1 << 40,
        other => return Err(format!("unknown size unit '{other}'")),
    };
    Ok((number * multiplier as f64) as u64)
}

fn file_path_param(req: &Request) -> Option<String> {
    req.param_str(FILEPATH_PARAM)
        .filter(|p| !p.is_empty() && *p != "/")
        .map(str::to_string)
}

/// Build the terminal handler for a static route
///
/// Order of work:
///
/// 1. the root must be a directory, otherwise 500
/// 2. the optional pre-handler runs; early-break stops here
/// 3. with a trailing file path: type check (403), existence (404),
///    download size limit (403), then the file is served
/// 4. without one: multipart uploads are received when configured
/// 5. otherwise a directory listing when `allow_dir`, else 403
pub fn static_server(pre: Option<Handler>, config: Arc<StaticConfig>) -> Handler {
    let files = StaticFiles::new(config.root.clone());
    Arc::new(move |res, req| {
        if !config.root.is_dir() {
            return Err(RouteError::internal(
                "directory does not exist or is not configured",
            ));
        }
        if run_pre_handler(pre.as_ref(), res, req)? {
            return Ok(());
        }

        if let Some(rel) = file_path_param(req) {
            return serve_path(&files, &config, &rel, req.path(), res);
        }

        if let Some(upload) = &config.upload {
            let saved = receive_uploads(req, &config, upload)?;
            if !saved.is_empty() {
                info!(count = saved.len(), root = %config.root.display(), "Files uploaded");
                match &upload.callback {
                    Some(callback) => callback(res, req, &saved)?,
                    None => {
                        let names: Vec<String> =
                            saved.iter().map(|p| p.display().to_string()).collect();
                        res.json_status(201, &serde_json::json!({ "files": names }));
                    }
                }
                return Ok(());
            }
        }

        if config.allow_dir {
            return list_directory(&config.root, req.path(), res);
        }
        Err(RouteError::forbidden("directory listing is disabled"))
    })
}

fn serve_path(
    files: &StaticFiles,
    config: &StaticConfig,
    rel: &str,
    url_path: &str,
    res: &mut Response,
) -> Result<(), RouteError> {
    let Some(path) = files.map_path(rel) else {
        return Err(RouteError::forbidden("path escapes the static root"));
    };

    if path.is_dir() && config.allow_dir {
        return list_directory(&path, url_path, res);
    }
    if !config.type_allowed(&path) {
        debug!(path = %path.display(), "File type not allowed");
        return Err(RouteError::forbidden("file type not allowed"));
    }
    if !path.is_file() {
        return Err(RouteError::NotFound {
            path: rel.to_string(),
        });
    }

    if let Some(download) = &config.download {
        let size = fs::metadata(&path)?.len();
        if download.max_size.is_some_and(|max| max > 0 && size > max) {
            return Err(RouteError::forbidden("file exceeds the download size limit"));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        res.set_header(
            "content-disposition",
            format!("attachment; filename=\"{}\"", name.replace('"', "")),
        );
    }

    let bytes = fs::read(&path)?;
    res.set_header("content-type", StaticFiles::content_type(&path));
    res.write(&bytes);
    Ok(())
}

fn list_directory(dir: &Path, url_path: &str, res: &mut Response) -> Result<(), RouteError> {
    let mut entries: Vec<(String, bool)> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|e| {
            let is_dir = e.file_type().map(|t| t.is_dir()).unwrap_or(false);
            (e.file_name().to_string_lossy().into_owned(), is_dir)
        })
        .collect();
    entries.sort();

    let base = url_path
        .trim_end_matches('/')
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");
    let mut html = String::from("<!doctype html>\n<pre>\n");
    for (name, is_dir) in entries {
        let suffix = if is_dir { "/" } else { "" };
        let escaped = escape_html(&name);
        html.push_str(&format!(
            "<a href=\"{base}/{href}{suffix}\">{escaped}{suffix}</a>\n",
            href = urlencoding::encode(&name),
        ));
    }
    html.push_str("</pre>\n");
    res.html(&html);
    Ok(())
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_path_prevents_traversal() {
        let sf = StaticFiles::new("/srv/www");
        assert!(sf.map_path("../Cargo.toml").is_none());
        assert!(sf.map_path("/a/../../etc/passwd").is_none());
        assert!(sf.map_path("./../secret").is_none());
        assert_eq!(
            sf.map_path("/css/site.css"),
            Some(PathBuf::from("/srv/www/css/site.css"))
        );
    }

    #[test]
    fn test_map_path_does_not_decode_twice() {
        let sf = StaticFiles::new("/srv");
        assert_eq!(
            sf.map_path("/my file.txt"),
            Some(PathBuf::from("/srv/my file.txt"))
        );
        assert_eq!(
            sf.map_path("/%2e%2e/secret"),
            Some(PathBuf::from("/srv/%2e%2e/secret"))
        );
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("512"), Ok(512));
        assert_eq!(parse_size("64KB"), Ok(64 * 1024));
        assert_eq!(parse_size("10mb"), Ok(10 * 1024 * 1024));
        assert_eq!(parse_size("1.5G"), Ok(1_610_612_736));
        assert!(parse_size("ten").is_err());
        assert!(parse_size("3PB").is_err());
    }

    #[test]
    fn test_type_allowed() {
        let cfg = StaticConfig::new("/srv").allow_types([".PNG", "jpg"]);
        assert!(cfg.type_allowed(Path::new("a.png")));
        assert!(cfg.type_allowed(Path::new("b.JPG")));
        assert!(!cfg.type_allowed(Path::new("c.exe")));
        assert!(!cfg.type_allowed(Path::new("noext")));
    }
}
