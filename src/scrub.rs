//! HTML scrubbing of article fields before output.
//!
//! The scrub stage is the last point at which text is sanitized; it runs
//! after every textual field has been finalized and before dedup/score.

use scraper::{Html, Node};

/// Strip all markup from an HTML fragment, returning its text content.
/// `<script>` and `<style>` subtrees are dropped entirely, not flattened.
pub fn strip_html(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut out = String::new();
    collect_text(fragment.tree.root(), &mut out);
    out
}

fn collect_text(node: ego_tree::NodeRef<'_, Node>, out: &mut String) {
    for child in node.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(element) => {
                if !matches!(element.name(), "script" | "style") {
                    collect_text(child, out);
                }
            }
            _ => {}
        }
    }
}

/// Scrub one field: strip markup, then undo the residual double-escaped
/// ampersands some feeds ship (`&amp;amp;` style).
fn scrub_field(value: &str) -> String {
    strip_html(value).replace("&amp;", "&")
}

/// Scrub every textual field of an article in place.
pub fn scrub_article(article: &mut crate::models::Article) {
    article.title = scrub_field(&article.title);
    article.description = scrub_field(&article.description);
    article.category = scrub_field(&article.category);
    article.publisher_name = scrub_field(&article.publisher_name);
    article.creative_instance_id = scrub_field(&article.creative_instance_id);
    article.url = scrub_field(&article.url);
    if let Some(img) = &article.img {
        article.img = Some(scrub_field(img));
    }
    if let Some(padded) = &article.padded_img {
        article.padded_img = Some(scrub_field(padded));
    }
    if let Some(offers) = &article.offers_category {
        article.offers_category = Some(scrub_field(offers));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Article, ContentType};

    fn article_with_title(title: &str) -> Article {
        Article {
            title: title.to_string(),
            description: String::new(),
            url: "https://example.com/a".to_string(),
            url_hash: String::new(),
            img: None,
            padded_img: None,
            publish_time: "2024-01-01 00:00:00".to_string(),
            category: "Tech".to_string(),
            content_type: ContentType::Article,
            publisher_id: "p".to_string(),
            publisher_name: "Example".to_string(),
            creative_instance_id: String::new(),
            score: 0.0,
            enclosures: None,
            offers_category: None,
        }
    }

    #[test]
    fn test_strip_html_removes_tags() {
        assert_eq!(strip_html("<p>Hello <b>world</b></p>"), "Hello world");
    }

    #[test]
    fn test_strip_html_drops_script_content() {
        assert_eq!(
            strip_html("<p>before</p><script>alert('x')</script><p>after</p>"),
            "beforeafter"
        );
    }

    #[test]
    fn test_strip_html_plain_text_untouched() {
        assert_eq!(strip_html("just text"), "just text");
    }

    #[test]
    fn test_scrub_article_cleans_fields() {
        let mut article = article_with_title("<i>Tom</i> &amp; Jerry");
        article.description = "<script>evil()</script>fine".to_string();
        scrub_article(&mut article);
        assert_eq!(article.title, "Tom & Jerry");
        assert_eq!(article.description, "fine");
    }

    #[test]
    fn test_scrub_article_leaves_clean_url_alone() {
        let mut article = article_with_title("t");
        article.url = "https://example.com/path?a=1&b=2".to_string();
        scrub_article(&mut article);
        assert_eq!(article.url, "https://example.com/path?a=1&b=2");
    }
}
