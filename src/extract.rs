use chrono::{DateTime, FixedOffset};
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::types::{CandidateRecord, parse_timestamp};

// Rendered DOM contract of the target timeline, pinned in one place. The
// view is virtualized and re-rendered constantly, so everything below is a
// heuristic over whatever happens to be mounted.
const ITEM_SELECTOR: &str = "article[data-testid=\"tweet\"]";
const TEXT_SELECTOR: &str = "[data-testid=\"tweetText\"]";
const LANG_TEXT_SELECTOR: &str = "[lang]";
const GENERIC_TEXT_SELECTOR: &str = "div, span";
const TIME_SELECTOR: &str = "time[datetime]";
const AUTHOR_SELECTOR: &str = "[data-testid=\"User-Name\"] span";
const THREAD_LINE_SELECTOR: &str = "[data-testid=\"threadline\"]";
const QUOTE_CONTAINER_SELECTOR: &str = "div[role=\"link\"][tabindex=\"0\"]";
const QUOTE_STATUS_LINK_SELECTOR: &str = "a[href*=\"/status/\"]";
const PHOTO_LINK_SELECTOR: &str = "a[href*=\"/photo/\"]";
const VIDEO_LINK_SELECTOR: &str = "a[href*=\"/video/\"]";
const IMAGE_SOURCE_SELECTOR: &str = "img[src*=\"twimg.com\"]";
const VIDEO_POSTER_SELECTOR: &str = "video[poster*=\"twimg.com\"]";
const VIDEO_SOURCE_SELECTOR: &str = "video[src*=\"twimg.com\"], source[src*=\"twimg.com\"]";

const SEPARATOR_GLYPH: char = '·';
const HANDLE_SIGIL: char = '@';

// Closed set of UI-chrome labels that must never be mistaken for post text.
const UI_LABELS: [&str; 14] = [
    "Repost",
    "Reposts",
    "Reply",
    "Replies",
    "Like",
    "Likes",
    "Share",
    "Bookmark",
    "Bookmarks",
    "Views",
    "Show more",
    "Follow",
    "Following",
    "More",
];

fn sel(raw: &str) -> Option<Selector> {
    Selector::parse(raw).ok()
}

fn normalize_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_text(el: &ElementRef) -> String {
    normalize_text(&el.text().collect::<Vec<_>>().join(" "))
}

/// Walks every rendered item node in document order and extracts candidate
/// records. Continuation markers are inherited from the immediately
/// preceding rendered container even when that container itself yielded no
/// record.
pub fn extract_batch(doc: &Html, base_url: &str) -> Vec<CandidateRecord> {
    let Some(item_sel) = sel(ITEM_SELECTOR) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    let mut prev_connector = false;
    for node in doc.select(&item_sel) {
        let connector = has_thread_connector(&node);
        if let Some(mut record) = extract_post(&node, base_url) {
            record.continues_previous = record.continues_previous || prev_connector;
            out.push(record);
        }
        prev_connector = connector;
    }
    out
}

/// Parsed timestamps of the first `limit` rendered items, unreadable slots
/// included as `None`. Used by the date seek and the date stop condition.
pub fn leading_timestamps(doc: &Html, limit: usize) -> Vec<Option<DateTime<FixedOffset>>> {
    let Some(item_sel) = sel(ITEM_SELECTOR) else {
        return Vec::new();
    };

    doc.select(&item_sel)
        .take(limit)
        .map(|node| item_timestamp(&node).as_deref().and_then(parse_timestamp))
        .collect()
}

/// Extracts one candidate record from a rendered item node, or `None` when
/// the node does not resolve to a real post. A miss is not an error: the
/// same node is re-evaluated on a later cycle once more content has
/// rendered.
pub fn extract_post(node: &ElementRef, base_url: &str) -> Option<CandidateRecord> {
    let text = resolve_text(node)?;
    if text.chars().count() < 2 || is_ui_chrome(&text) {
        return None;
    }

    Some(CandidateRecord {
        timestamp: item_timestamp(node),
        author: item_author(node),
        quoted_url: quoted_status_url(node, base_url),
        media_urls: media_urls(node, base_url),
        continues_previous: has_thread_connector(node),
        text,
    })
}

// Three-tier fallback; the first tier that yields text wins.
fn resolve_text(node: &ElementRef) -> Option<String> {
    if let Some(text_sel) = sel(TEXT_SELECTOR) {
        for el in node.select(&text_sel) {
            let text = element_text(&el);
            if !text.is_empty() {
                return Some(text);
            }
        }
    }

    if let Some(lang_sel) = sel(LANG_TEXT_SELECTOR) {
        for el in node.select(&lang_sel) {
            let text = element_text(&el);
            if text.chars().count() > 10
                && !text.contains(SEPARATOR_GLYPH)
                && !text.starts_with(HANDLE_SIGIL)
            {
                return Some(text);
            }
        }
    }

    if let Some(generic_sel) = sel(GENERIC_TEXT_SELECTOR) {
        for el in node.select(&generic_sel) {
            let text = element_text(&el);
            if text.chars().count() > 20
                && !is_action_label(&text)
                && !inside_clickable(&el)
                && !is_count_token(&text)
            {
                return Some(text);
            }
        }
    }

    None
}

fn is_ui_chrome(text: &str) -> bool {
    is_action_label(text)
        || is_count_token(text)
        || is_bare_handle(text)
        || text.chars().all(|c| c == SEPARATOR_GLYPH || c.is_whitespace())
}

fn is_action_label(text: &str) -> bool {
    UI_LABELS.iter().any(|label| label.eq_ignore_ascii_case(text))
}

// Count renders like "3", "1,204" or "1.2K".
fn is_count_token(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return false;
    }
    let mut digits = false;
    for c in trimmed.chars() {
        match c {
            '0'..='9' => digits = true,
            '.' | ',' | '%' | ' ' => {}
            'K' | 'k' | 'M' | 'm' | 'B' | 'b' => {}
            _ => return false,
        }
    }
    digits
}

fn is_bare_handle(text: &str) -> bool {
    text.starts_with(HANDLE_SIGIL) && !text.contains(char::is_whitespace)
}

fn inside_clickable(el: &ElementRef) -> bool {
    el.ancestors().filter_map(ElementRef::wrap).any(|ancestor| {
        let value = ancestor.value();
        (value.name() == "a" && value.attr("href").is_some())
            || value.attr("role") == Some("button")
    })
}

fn item_timestamp(node: &ElementRef) -> Option<String> {
    let time_sel = sel(TIME_SELECTOR)?;
    let raw = node
        .select(&time_sel)
        .next()
        .and_then(|el| el.value().attr("datetime"))?;
    // Malformed datetimes are treated as absent, never fatal.
    parse_timestamp(raw).map(|_| raw.to_string())
}

fn item_author(node: &ElementRef) -> Option<String> {
    let author_sel = sel(AUTHOR_SELECTOR)?;
    for el in node.select(&author_sel) {
        let text = element_text(&el);
        if !text.is_empty() && !text.starts_with(HANDLE_SIGIL) && !is_ui_chrome(&text) {
            return Some(text);
        }
    }
    None
}

fn has_thread_connector(node: &ElementRef) -> bool {
    sel(THREAD_LINE_SELECTOR)
        .map(|s| node.select(&s).next().is_some())
        .unwrap_or(false)
}

fn quoted_status_url(node: &ElementRef, base_url: &str) -> Option<String> {
    let container_sel = sel(QUOTE_CONTAINER_SELECTOR)?;
    let link_sel = sel(QUOTE_STATUS_LINK_SELECTOR)?;
    for container in node.select(&container_sel) {
        for link in container.select(&link_sel) {
            if let Some(href) = link.value().attr("href") {
                if let Some(resolved) = resolve_url(base_url, href) {
                    return Some(resolved);
                }
            }
        }
    }
    None
}

// Union in encounter order of photo permalinks, video permalinks and direct
// media-host sources. Duplicates across the three passes are kept; the
// deduplicator only ever operates on whole items.
fn media_urls(node: &ElementRef, base_url: &str) -> Vec<String> {
    let mut out = Vec::new();

    for raw in [PHOTO_LINK_SELECTOR, VIDEO_LINK_SELECTOR] {
        let Some(link_sel) = sel(raw) else { continue };
        for link in node.select(&link_sel) {
            if let Some(href) = link.value().attr("href") {
                if let Some(resolved) = resolve_url(base_url, href) {
                    out.push(resolved);
                }
            }
        }
    }

    for (raw, attr) in [
        (IMAGE_SOURCE_SELECTOR, "src"),
        (VIDEO_POSTER_SELECTOR, "poster"),
        (VIDEO_SOURCE_SELECTOR, "src"),
    ] {
        let Some(source_sel) = sel(raw) else { continue };
        for source in node.select(&source_sel) {
            if let Some(value) = source.value().attr(attr) {
                if let Some(resolved) = resolve_url(base_url, value) {
                    out.push(resolved);
                }
            }
        }
    }

    out
}

fn resolve_url(base_url: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("mailto:")
        || href.starts_with("javascript:")
        || href.starts_with("data:")
    {
        return None;
    }

    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    let base = Url::parse(base_url).ok()?;
    base.join(href).ok().map(|u| u.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://x.com";

    fn doc(body: &str) -> Html {
        Html::parse_document(&format!("<html><body>{body}</body></html>"))
    }

    fn first_item(doc: &Html) -> Option<CandidateRecord> {
        extract_batch(doc, BASE).into_iter().next()
    }

    fn article(inner: &str) -> String {
        format!("<article data-testid=\"tweet\">{inner}</article>")
    }

    #[test]
    fn canonical_text_marker_wins() {
        let html = doc(&article(
            "<div data-testid=\"tweetText\">Canonical body text</div>\
             <div lang=\"en\">Language tagged alternative body</div>",
        ));
        let record = first_item(&html).unwrap();
        assert_eq!(record.text, "Canonical body text");
    }

    #[test]
    fn falls_back_to_language_tagged_text() {
        let html = doc(&article(
            "<div lang=\"en\">A post without the canonical marker</div>",
        ));
        let record = first_item(&html).unwrap();
        assert_eq!(record.text, "A post without the canonical marker");
    }

    #[test]
    fn language_tier_skips_short_handle_and_separator_text() {
        let html = doc(&article(
            "<span lang=\"en\">@someone</span>\
             <span lang=\"en\">short one</span>\
             <span lang=\"en\">name · 2h · something</span>\
             <div lang=\"en\">The actual body of the rendered post</div>",
        ));
        let record = first_item(&html).unwrap();
        assert_eq!(record.text, "The actual body of the rendered post");
    }

    #[test]
    fn generic_tier_skips_labels_clickables_and_counts() {
        let html = doc(&article(
            "<span>Repost</span>\
             <a href=\"/x/status/1\"><span>clickable text long enough to qualify</span></a>\
             <span>1,204</span>\
             <div>A long enough plain rendition of the body</div>",
        ));
        let record = first_item(&html).unwrap();
        assert_eq!(record.text, "A long enough plain rendition of the body");
    }

    #[test]
    fn chrome_only_nodes_yield_nothing() {
        let html = doc(&article("<span>Like</span><span>42</span>"));
        assert!(first_item(&html).is_none());
    }

    #[test]
    fn short_text_is_rejected() {
        let html = doc(&article("<div data-testid=\"tweetText\">y</div>"));
        assert!(first_item(&html).is_none());
    }

    #[test]
    fn timestamp_comes_from_first_time_marker() {
        let html = doc(&article(
            "<time datetime=\"2024-01-15T10:30:00.000Z\">Jan 15</time>\
             <time datetime=\"2023-01-01T00:00:00.000Z\">old</time>\
             <div data-testid=\"tweetText\">Timestamped post</div>",
        ));
        let record = first_item(&html).unwrap();
        assert_eq!(
            record.timestamp.as_deref(),
            Some("2024-01-15T10:30:00.000Z")
        );
    }

    #[test]
    fn malformed_timestamp_is_absent() {
        let html = doc(&article(
            "<time datetime=\"yesterday\">Jan 15</time>\
             <div data-testid=\"tweetText\">Post with a broken time render</div>",
        ));
        let record = first_item(&html).unwrap();
        assert_eq!(record.timestamp, None);
    }

    #[test]
    fn author_skips_handle_spans() {
        let html = doc(&article(
            "<div data-testid=\"User-Name\"><span>@handle</span><span>Display Name</span></div>\
             <div data-testid=\"tweetText\">Post body goes here</div>",
        ));
        let record = first_item(&html).unwrap();
        assert_eq!(record.author.as_deref(), Some("Display Name"));
    }

    #[test]
    fn quoted_status_link_is_resolved_absolute() {
        let html = doc(&article(
            "<div data-testid=\"tweetText\">Commentary on a quote</div>\
             <div role=\"link\" tabindex=\"0\">\
               <a href=\"/other/status/123456\">Show more</a>\
             </div>",
        ));
        let record = first_item(&html).unwrap();
        assert_eq!(
            record.quoted_url.as_deref(),
            Some("https://x.com/other/status/123456")
        );
    }

    #[test]
    fn media_urls_keep_encounter_order_without_dedup() {
        let html = doc(&article(
            "<div data-testid=\"tweetText\">Post with media attached</div>\
             <a href=\"/u/status/1/photo/1\">photo</a>\
             <a href=\"/u/status/1/video/1\">video</a>\
             <img src=\"https://pbs.twimg.com/media/abc.jpg\">\
             <video poster=\"https://pbs.twimg.com/thumb/def.jpg\"></video>",
        ));
        let record = first_item(&html).unwrap();
        assert_eq!(
            record.media_urls,
            vec![
                "https://x.com/u/status/1/photo/1",
                "https://x.com/u/status/1/video/1",
                "https://pbs.twimg.com/media/abc.jpg",
                "https://pbs.twimg.com/thumb/def.jpg",
            ]
        );
    }

    #[test]
    fn connector_is_inherited_from_previous_container() {
        let html = doc(&format!(
            "{}{}",
            article(
                "<div data-testid=\"threadline\"></div>\
                 <div data-testid=\"tweetText\">First part of the thread</div>"
            ),
            article("<div data-testid=\"tweetText\">Second part, marker inherited</div>"),
        ));
        let records = extract_batch(&html, BASE);
        assert_eq!(records.len(), 2);
        assert!(records[0].continues_previous);
        assert!(records[1].continues_previous);
    }

    #[test]
    fn no_marker_means_no_continuation() {
        let html = doc(&format!(
            "{}{}",
            article("<div data-testid=\"tweetText\">A standalone post</div>"),
            article("<div data-testid=\"tweetText\">Another standalone post</div>"),
        ));
        let records = extract_batch(&html, BASE);
        assert!(!records[0].continues_previous);
        assert!(!records[1].continues_previous);
    }

    #[test]
    fn leading_timestamps_report_unreadable_slots() {
        let html = doc(&format!(
            "{}{}{}",
            article(
                "<time datetime=\"2024-03-10T12:00:00.000Z\">t</time>\
                 <div data-testid=\"tweetText\">First rendered item</div>"
            ),
            article("<div data-testid=\"tweetText\">No time rendered yet</div>"),
            article(
                "<time datetime=\"2024-03-09T12:00:00.000Z\">t</time>\
                 <div data-testid=\"tweetText\">Third rendered item</div>"
            ),
        ));
        let sampled = leading_timestamps(&html, 3);
        assert_eq!(sampled.len(), 3);
        assert!(sampled[0].is_some());
        assert!(sampled[1].is_none());
        assert!(sampled[2].is_some());
    }
}
