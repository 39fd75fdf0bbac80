//! `GET /text-selector`: the dialog Confluence opens from the page menu.
//!
//! The page id, space key, and the JWT the guard verified are written into
//! `data-` attributes on the form; the script posts them back to
//! `/add-to-homepage?jwt=...` so the submission passes the same guard.

use std::sync::Arc;

use axum::extract::{Extension, Query};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

use crate::middleware::ConnectContext;
use crate::state::AppState;

/// Build the dialog router. Must sit behind the JWT guard.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/text-selector", get(text_selector))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogQuery {
    #[serde(default)]
    pub page_id: String,
    #[serde(default)]
    pub space_key: String,
}

const TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>Save to My Homepage</title>
  <script src="https://connect-cdn.atl-paas.net/all.js"></script>
  <style>
    body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; margin: 20px; color: #172b4d; }
    label { display: block; margin-bottom: 5px; font-weight: 600; }
    input, textarea { width: 100%; padding: 8px; margin-bottom: 15px; border: 2px solid #dfe1e6; border-radius: 4px; box-sizing: border-box; font-family: inherit; }
    textarea { min-height: 120px; resize: vertical; }
    .buttons { display: flex; gap: 10px; justify-content: flex-end; }
    button { padding: 8px 16px; border: none; border-radius: 4px; font-weight: 600; cursor: pointer; }
    .primary { background: #0052cc; color: #fff; }
  </style>
</head>
<body>
  <p>Paste the text you want to keep, give it a title, and it will be added to "My Saved Content" in your personal space.</p>
  <form id="textForm" data-page-id="{{PAGE_ID}}" data-space-key="{{SPACE_KEY}}" data-jwt="{{JWT}}">
    <label for="title">Title</label>
    <input type="text" id="title" name="title" required>
    <label for="selectedText">Text</label>
    <textarea id="selectedText" name="selectedText" required></textarea>
    <div class="buttons">
      <button type="button" onclick="AP.dialog.close()">Cancel</button>
      <button type="submit" class="primary">Add to Homepage</button>
    </div>
  </form>
  <script>
    const form = document.getElementById('textForm');
    form.addEventListener('submit', function (e) {
      e.preventDefault();
      const title = document.getElementById('title').value;
      const content = document.getElementById('selectedText').value;
      if (!title.trim() || !content.trim()) {
        AP.messages.error({ title: 'Missing input', body: 'Please fill in both title and text.' });
        return;
      }
      const submit = form.querySelector('.primary');
      submit.disabled = true;
      fetch('/add-to-homepage?jwt=' + encodeURIComponent(form.dataset.jwt), {
        method: 'POST',
        headers: { 'Content-Type': 'application/json' },
        body: JSON.stringify({
          title: title,
          content: content,
          sourcePageId: form.dataset.pageId,
          spaceKey: form.dataset.spaceKey
        })
      })
        .then(function (r) { return r.json(); })
        .then(function (data) {
          if (!data.success) { throw new Error(data.error || 'Failed to add content'); }
          AP.messages.success({ title: 'Saved', body: 'Content has been added to your homepage.' });
          AP.dialog.close();
        })
        .catch(function (err) {
          AP.messages.error({ title: 'Error', body: 'Failed to add content: ' + err.message });
          submit.disabled = false;
        });
    });
    document.getElementById('selectedText').focus();
  </script>
</body>
</html>
"#;

/// Escape text for use inside a double-quoted HTML attribute.
fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// Render the dialog for one page.
#[must_use]
pub fn render(page_id: &str, space_key: &str, jwt: &str) -> String {
    TEMPLATE
        .replace("{{PAGE_ID}}", &escape_attr(page_id))
        .replace("{{SPACE_KEY}}", &escape_attr(space_key))
        .replace("{{JWT}}", &escape_attr(jwt))
}

async fn text_selector(
    Extension(ctx): Extension<ConnectContext>,
    Query(query): Query<DialogQuery>,
) -> Html<String> {
    Html(render(&query.page_id, &query.space_key, &ctx.token))
}
