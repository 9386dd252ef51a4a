use crate::encyclopedia::Summary;

/// Popup markup for a location. Sections without data are left out.
pub fn render_popup(name: &str, image_url: Option<&str>, summary: Option<&Summary>) -> String {
    let mut html = String::from("<div class=\"infowindow\">");
    html.push_str(&format!(
        "<h3 class=\"infowindow-name\">{}</h3>",
        escape_html(name)
    ));

    if let Some(src) = image_url {
        html.push_str(&format!(
            "<img class=\"infowindow-img\" src=\"{}\" alt=\"{}\">",
            escape_html(src),
            escape_html(name)
        ));
    }

    if let Some(description) = summary.and_then(|s| s.description.as_deref()) {
        html.push_str(&format!(
            "<p class=\"wiki-description\">{}</p>",
            escape_html(description)
        ));
    }

    if let Some(url) = summary.and_then(|s| s.url.as_deref()) {
        html.push_str(&format!(
            "<a class=\"wiki-link\" href=\"{}\" target=\"_blank\">Wikipedia</a>",
            escape_html(url)
        ));
    }

    html.push_str("</div>");
    html
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}
