//! Main-text isolation for fetched HTML pages.

use scraper::{ElementRef, Html, Selector};

/// Text that only appears on provider verification / challenge pages.
pub const INTERSTITIAL_SIGNATURES: &[&str] = &[
    "安全检查",
    "Just a moment...",
    "Attention Required! | Cloudflare",
    "Verify you are human",
    "cf-browser-verification",
];

/// Content containers tried in order before falling back to `<body>`.
const MAIN_SELECTORS: &[&str] = &[
    "article",
    "main",
    "[role=main]",
    "#content",
    ".content",
    ".post-content",
    ".entry-content",
    "#main",
];

const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "nav", "footer", "header", "aside", "noscript", "iframe", "form", "svg",
    "button", "template",
];

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "pre", "blockquote",
    "tr", "table", "section", "figcaption", "dd", "dt",
];

/// A container must hold at least this many characters to win over `<body>`.
const MIN_MAIN_CHARS: usize = 200;

pub fn is_interstitial(body: &str) -> bool {
    INTERSTITIAL_SIGNATURES
        .iter()
        .any(|signature| body.contains(signature))
}

/// Plain text of the page's main content, or `None` when nothing readable
/// is left after stripping boilerplate.
pub fn extract_main_text(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    for selector_str in MAIN_SELECTORS {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };
        if let Some(element) = document.select(&selector).next() {
            let text = clean_text(&element_text(element));
            if text.chars().count() >= MIN_MAIN_CHARS {
                return Some(text);
            }
        }
    }

    let body = Selector::parse("body")
        .ok()
        .and_then(|selector| document.select(&selector).next())
        .unwrap_or_else(|| document.root_element());
    let text = clean_text(&element_text(body));
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn element_text(element: ElementRef) -> String {
    let mut text = String::new();
    collect_text(element, &mut text);
    text
}

fn collect_text(element: ElementRef, out: &mut String) {
    for node in element.children() {
        if let Some(child) = ElementRef::wrap(node) {
            let tag = child.value().name();
            if SKIPPED_TAGS.contains(&tag) {
                continue;
            }
            let is_block = BLOCK_TAGS.contains(&tag);
            if is_block {
                out.push('\n');
            }
            collect_text(child, out);
            if is_block {
                out.push('\n');
            }
        } else if let Some(text) = node.value().as_text() {
            out.push_str(text);
        }
    }
}

/// Collapse whitespace inside lines and drop blank lines.
pub fn clean_text(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_paragraph() -> String {
        "Retrieval keeps answers grounded in sources. ".repeat(8)
    }

    #[test]
    fn article_wins_over_navigation_and_footer() {
        let html = format!(
            r#"<html><head><title>T</title><style>body {{}}</style></head><body>
            <nav>Home | About</nav>
            <article><h1>Heading</h1><p>{}</p><script>var x = 1;</script></article>
            <footer>Copyright</footer></body></html>"#,
            long_paragraph()
        );
        let text = extract_main_text(&html).unwrap();
        assert!(text.starts_with("Heading\nRetrieval keeps answers"));
        assert!(!text.contains("Home"));
        assert!(!text.contains("Copyright"));
        assert!(!text.contains("var x"));
        assert!(!text.contains('<'));
    }

    #[test]
    fn short_containers_fall_back_to_body() {
        let html = r#"<html><body><main>Tiny</main><div><p>Other  body
            text</p></div><footer>f</footer></body></html>"#;
        let text = extract_main_text(html).unwrap();
        assert_eq!(text, "Tiny\nOther body\ntext");
    }

    #[test]
    fn empty_pages_are_not_extractable() {
        assert_eq!(extract_main_text("<html><body><script>x()</script></body></html>"), None);
        assert_eq!(extract_main_text(""), None);
    }

    #[test]
    fn interstitial_signatures_are_detected() {
        assert!(is_interstitial("<title>Just a moment...</title>"));
        assert!(is_interstitial("<p>系统检测到异常，请完成安全检查</p>"));
        assert!(!is_interstitial("<p>An ordinary article</p>"));
    }

    #[test]
    fn clean_text_collapses_whitespace() {
        assert_eq!(clean_text("  a   b \n\n\t c  \n"), "a b\nc");
    }
}
