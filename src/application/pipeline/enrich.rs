//! HTML additions appended to a generated body before routing.

use crate::domain::entities::Candidate;

/// Append the related-link section (when one was found) and the source attribution footer.
pub fn enrich_body(body: &str, related_url: Option<&str>, candidate: &Candidate) -> String {
    let mut enriched = String::with_capacity(body.len() + 256);
    enriched.push_str(body.trim_end());

    if let Some(url) = related_url.map(str::trim).filter(|url| !url.is_empty()) {
        enriched.push_str("\n\n<h2>Related</h2>\n<p><a href=\"");
        enriched.push_str(&escape_attr(url));
        enriched.push_str("\" target=\"_blank\" rel=\"noopener\">More on this topic</a></p>");
    }

    let source_name = if candidate.source_name.trim().is_empty() {
        candidate.locator.as_str()
    } else {
        candidate.source_name.trim()
    };
    enriched.push_str("\n\n<hr>\n<p><strong>Source:</strong> <a href=\"");
    enriched.push_str(&escape_attr(candidate.locator.trim()));
    enriched.push_str("\" target=\"_blank\" rel=\"noopener\">");
    enriched.push_str(&escape_text(source_name));
    enriched.push_str("</a></p>\n");
    enriched
}

fn escape_text(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

fn escape_attr(value: &str) -> String {
    escape_text(value)
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(source_name: &str) -> Candidate {
        Candidate {
            locator: "https://news.example/a?x=1&y=\"2\"".to_string(),
            title: "A".to_string(),
            source_name: source_name.to_string(),
            summary: String::new(),
        }
    }

    #[test]
    fn footer_is_always_appended_and_escaped() {
        let body = enrich_body("<p>text</p>\n", None, &candidate("Tech & <Co>"));
        assert!(body.starts_with("<p>text</p>\n\n<hr>"));
        assert!(body.contains("href=\"https://news.example/a?x=1&amp;y=&quot;2&quot;\""));
        assert!(body.contains(">Tech &amp; &lt;Co&gt;</a>"));
        assert!(!body.contains("<h2>Related</h2>"));
    }

    #[test]
    fn related_link_precedes_footer() {
        let body = enrich_body(
            "<p>text</p>",
            Some("https://video.example/watch?v=1"),
            &candidate("Feed"),
        );
        let related = body.find("<h2>Related</h2>").expect("related section");
        let footer = body.find("<hr>").expect("footer");
        assert!(related < footer);
        assert!(body.contains("https://video.example/watch?v=1"));
    }

    #[test]
    fn blank_source_name_falls_back_to_locator() {
        let body = enrich_body("<p>x</p>", Some("   "), &candidate("  "));
        assert!(body.contains(">https://news.example/a?x=1&amp;y=\"2\"</a>"));
        assert!(!body.contains("Related"));
    }
}
