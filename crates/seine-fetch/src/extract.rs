//! HTML to [`Page`] extraction.
//!
//! Pulls the title, outgoing links, images, head metadata, open-graph
//! fields, and visible text out of a fetched document. Relative URLs are
//! resolved against the page URL; unparsable ones are skipped.

use chrono::Utc;
use scraper::{Html, Selector};
use seine_types::{Page, PageMetadata};
use url::Url;

/// Build a [`Page`] from a raw HTML body.
pub fn page_from_html(url: &Url, html: &str) -> Page {
    let document = Html::parse_document(html);

    let text = visible_text(&document);
    let word_count = text.split_whitespace().count();

    Page {
        url: url.clone(),
        title: extract_title(&document),
        content: html.to_string(),
        text,
        markdown: String::new(),
        links: absolutized(&document, url, "a[href]", "href"),
        images: absolutized(&document, url, "img[src]", "src"),
        metadata: PageMetadata {
            description: meta_content(&document, "meta[name=\"description\"]"),
            keywords: meta_content(&document, "meta[name=\"keywords\"]")
                .split(',')
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect(),
            author: meta_content(&document, "meta[name=\"author\"]"),
            word_count,
            og_title: meta_content(&document, "meta[property=\"og:title\"]"),
            og_description: meta_content(&document, "meta[property=\"og:description\"]"),
            og_image: meta_content(&document, "meta[property=\"og:image\"]"),
        },
        crawled_at: Utc::now(),
        processed_at: None,
    }
}

fn extract_title(document: &Html) -> String {
    let Ok(selector) = Selector::parse("title") else {
        return String::new();
    };
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

fn meta_content(document: &Html, selector: &str) -> String {
    let Ok(selector) = Selector::parse(selector) else {
        return String::new();
    };
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn absolutized(document: &Html, base: &Url, selector: &str, attr: &str) -> Vec<String> {
    let Ok(selector) = Selector::parse(selector) else {
        return Vec::new();
    };
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for element in document.select(&selector) {
        let Some(raw) = element.value().attr(attr) else {
            continue;
        };
        let Ok(resolved) = base.join(raw) else {
            continue;
        };
        let resolved = resolved.to_string();
        if seen.insert(resolved.clone()) {
            out.push(resolved);
        }
    }
    out
}

fn visible_text(document: &Html) -> String {
    let mut text = String::new();
    for node in document.root_element().text() {
        let trimmed = node.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(trimmed);
    }
    text
}
