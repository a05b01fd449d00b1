//! OpenAPI description of the versioned API and its docs page.

use utoipa::openapi::{server::Server, OpenApi as OpenApiDoc};
use utoipa::OpenApi;

use super::handlers;
use super::types::{ChatRequest, ChatResponse, ErrorResponse, Message, Role};
use crate::config::Config;

#[derive(OpenApi)]
#[openapi(
    paths(handlers::chat, handlers::chat_stream, handlers::health),
    components(schemas(ChatRequest, ChatResponse, ErrorResponse, Message, Role))
)]
struct ApiDoc;

/// OpenAPI document for the configured prefix.
///
/// Paths are relative to a single server entry whose URL is the API prefix.
pub fn api_doc(config: &Config) -> OpenApiDoc {
    let mut doc = ApiDoc::openapi();
    doc.info.title = config.api.project_name.clone();
    doc.info.version = env!("CARGO_PKG_VERSION").to_string();
    doc.servers = Some(vec![Server::new(config.api.prefix.as_str())]);
    doc
}

/// Swagger UI page that renders `{prefix}/openapi.json`.
pub fn docs_page(config: &Config) -> String {
    format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>{title}</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css">
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
  <script>
    window.ui = SwaggerUIBundle({{ url: "{prefix}/openapi.json", dom_id: "#swagger-ui" }});
  </script>
</body>
</html>
"##,
        title = config.api.project_name,
        prefix = config.api.prefix,
    )
}
