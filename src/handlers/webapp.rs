use super::static_files::StaticFiles;
use super::{run_pre_handler, Handler};
use crate::errors::RouteError;
use crate::router::FILEPATH_PARAM;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

/// Single-page app configuration
#[derive(Debug, Clone)]
pub struct WebappConfig {
    /// Index document served for app routes
    pub index: String,
    /// Directory holding the app
    pub root: PathBuf,
    /// Separate directory for asset files, when the build splits them out
    pub assets_root: Option<PathBuf>,
    /// Answer unknown paths with 404 instead of the index
    pub disable_spa: bool,
}

impl Default for WebappConfig {
    fn default() -> Self {
        Self {
            index: "index.html".to_string(),
            root: PathBuf::from("./web"),
            assets_root: None,
            disable_spa: false,
        }
    }
}

impl WebappConfig {
    /// Serve the app in `root` with `index.html`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Use another index document
    #[must_use]
    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.index = index.into();
        self
    }

    /// Look up asset files in a separate directory
    #[must_use]
    pub fn assets_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.assets_root = Some(dir.into());
        self
    }

    /// Disable the index fallback
    #[must_use]
    pub fn disable_spa(mut self) -> Self {
        self.disable_spa = true;
        self
    }
}

/// Build the terminal handler for a webapp route
///
/// Existing files below the route are served as-is (from `assets_root` when
/// set). Any other path gets the index document, so client-side routing
/// works, unless `disable_spa` is set, which turns misses into 404.
pub fn webapp_server(pre: Option<Handler>, config: Arc<WebappConfig>) -> Handler {
    let assets = StaticFiles::new(
        config
            .assets_root
            .clone()
            .unwrap_or_else(|| config.root.clone()),
    );
    let app = StaticFiles::new(config.root.clone());

    Arc::new(move |res, req| {
        if run_pre_handler(pre.as_ref(), res, req)? {
            return Ok(());
        }

        if let Some(rel) = req.param_str(FILEPATH_PARAM).filter(|p| !p.is_empty() && *p != "/") {
            if let Ok((bytes, content_type)) = assets.load(rel) {
                res.set_header("content-type", content_type);
                res.write(&bytes);
                return Ok(());
            }
            if config.disable_spa {
                return Err(RouteError::NotFound {
                    path: req.path().to_string(),
                });
            }
        }

        let index = app
            .map_path(config.index.trim_start_matches('/'))
            .filter(|p| p.is_file())
            .ok_or_else(|| RouteError::NotFound {
                path: config.index.clone(),
            })?;
        let html = fs::read(&index)?;
        res.set_header("content-type", StaticFiles::content_type(&index));
        res.write(&html);
        Ok(())
    })
}
