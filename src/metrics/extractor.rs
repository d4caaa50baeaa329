use crate::metrics::snapshot::MetricsSnapshot;
use chrono::{Local, Offset, Utc};
use select::document::Document;
use select::node::Node;
use select::predicate::Name;

/// Elements whose text never reaches the rendered page.
const NON_RENDERED: [&str; 4] = ["script", "style", "noscript", "template"];

/// Extract a metrics snapshot from a page's HTML.
///
/// Counts anchor elements, image elements, and whitespace-delimited tokens of
/// the visible rendered body text. Infallible: an empty or body-less document
/// yields zero counts.
pub fn extract(url: &str, html: &str, tz_offset_hours: f64) -> MetricsSnapshot {
    let document = Document::from(html);

    let link_count = document.find(Name("a")).count() as u64;
    let image_count = document.find(Name("img")).count() as u64;

    let word_count = document
        .find(Name("body"))
        .next()
        .map(|body| {
            let mut text = String::new();
            rendered_text(body, &mut text);
            text.split_whitespace().count() as u64
        })
        .unwrap_or(0);

    MetricsSnapshot {
        url: url.to_string(),
        link_count,
        word_count,
        image_count,
        captured_at: Utc::now(),
        tz_offset_hours,
    }
}

/// Collect text the way the page renders it, skipping script/style content
/// and nodes carrying the `hidden` attribute.
fn rendered_text(node: Node, out: &mut String) {
    if let Some(name) = node.name() {
        if NON_RENDERED.contains(&name) || node.attr("hidden").is_some() {
            return;
        }
    }
    if let Some(text) = node.as_text() {
        out.push_str(text);
        out.push(' ');
    }
    for child in node.children() {
        rendered_text(child, out);
    }
}

/// Host timezone offset in hours east of UTC (e.g. 1.0 for UTC+1, -5.0 for UTC-5).
pub fn local_tz_offset_hours() -> f64 {
    f64::from(Local::now().offset().fix().local_minus_utc()) / 3600.0
}
