//! Swagger 文档与 UI

use std::path::{Path, PathBuf};

use axum::Router;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use tracing::{info, warn};

const SWAGGER_SUFFIX: &str = ".swagger.json";

/// Swagger 选项
#[derive(Debug, Clone)]
pub struct SwaggerConfig {
    pub dir: PathBuf,
    pub base_path: String,
}

/// 查找目录中第一个（按文件名排序）`*.swagger.json`
pub fn find_swagger_file(dir: &Path) -> std::io::Result<Option<PathBuf>> {
    let mut files = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(SWAGGER_SUFFIX))
        })
        .collect::<Vec<_>>();
    files.sort();
    Ok(files.into_iter().next())
}

/// 挂载 `/swagger/doc.json` 与 `/swagger/`
///
/// 目录不存在或没有文档时只记录警告，返回原路由。
pub fn register(router: Router, config: &SwaggerConfig) -> Router {
    let file = match find_swagger_file(&config.dir) {
        Ok(Some(file)) => file,
        Ok(None) => {
            warn!(dir = %config.dir.display(), "No swagger file found");
            return router;
        }
        Err(e) => {
            warn!(dir = %config.dir.display(), error = %e, "Swagger directory not readable");
            return router;
        }
    };

    info!(file = %file.display(), "📚 Serving swagger document");
    let page = Html(swagger_page(&config.base_path));

    router
        .route(
            "/swagger/doc.json",
            get(move || {
                let file = file.clone();
                async move { serve_doc(&file).await }
            }),
        )
        .route(
            "/swagger",
            get({
                let page = page.clone();
                move || async move { page }
            }),
        )
        .route("/swagger/", get(move || async move { page }))
}

async fn serve_doc(file: &Path) -> Response {
    match tokio::fs::read(file).await {
        Ok(body) => (StatusCode::OK, [(CONTENT_TYPE, "application/json")], body).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

fn swagger_page(base_path: &str) -> String {
    let base_path = if base_path.ends_with('/') {
        base_path.to_string()
    } else {
        format!("{base_path}/")
    };
    format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <title>Swagger UI</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
  <script>
    window.onload = function () {{
      window.ui = SwaggerUIBundle({{
        url: "{base_path}swagger/doc.json",
        dom_id: "#swagger-ui",
      }});
    }};
  </script>
</body>
</html>
"##
    )
}
