//! Field extraction from success-story pages.
//!
//! Extraction is scoped to the page's content container so navigation,
//! footers and share widgets never leak into the story. Each field is an
//! ordered list of pure rules; the first rule that yields a value wins.
//!
//! | Field | Rules, in order |
//! |-------|-----------------|
//! | title | first `<h1>`, `og:title`, `<title>` minus site suffix, URL slug, `"Untitled"` |
//! | date | `article:published_time`, date-classed element, `Published:` label, any date in the page |
//! | description | `og:description`, `meta[name=description]`, first paragraph (truncated) |
//! | hero image | first content image that is not an icon, logo or tracking pixel |
//!
//! Only a page without any content container is an extraction failure;
//! every other field degrades to its default.

use crate::models::{StoryRecord, UNTITLED};
use crate::utils::{safe_text, truncate_words, upcase};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

/// Maximum length of a description derived from the first paragraph.
pub const DESCRIPTION_MAX_CHARS: usize = 300;

/// Blocks shorter than this are treated as stray markup, not paragraphs.
const MIN_BLOCK_CHARS: usize = 3;

/// Images declared smaller than this (in either dimension) are icons.
const MIN_IMAGE_PX: u32 = 100;

const IMAGE_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg", ".gif", ".webp"];

const IMAGE_SKIP_PATTERNS: &[&str] = &[
    "facebook.com/tr",
    "google-analytics",
    "pixel",
    "doubleclick",
    "logo",
    "icon",
    "avatar",
    "_layouts",
    "spcommon",
    "siteassets",
];

const BOILERPLATE_TAGS: &[&str] = &["nav", "footer", "aside", "header", "script", "style", "noscript"];
const BOILERPLATE_CLASSES: &[&str] = &["share", "social", "breadcrumb"];

const MONTHS: &str = r"(Jan(?:uary)?|Feb(?:ruary)?|Mar(?:ch)?|Apr(?:il)?|May|June?|July?|Aug(?:ust)?|Sep(?:t(?:ember)?)?|Oct(?:ober)?|Nov(?:ember)?|Dec(?:ember)?)";

static ISO_DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").unwrap());

// Timestamps such as `2023-11-20T08:00:00Z` have no word boundary after the day.
static TIMESTAMP_DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}").unwrap());

static MONTH_FIRST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\b{MONTHS}\.?\s+(\d{{1,2}})(?:st|nd|rd|th)?,?\s+(\d{{4}})\b")).unwrap()
});

static DAY_FIRST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\b(\d{{1,2}})(?:st|nd|rd|th)?\s+{MONTHS}\.?,?\s+(\d{{4}})\b")).unwrap()
});

static DATE_LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:published|posted|date)\b\s*(?:on\b)?\s*[:\-–]?\s*").unwrap());

static TITLE_SUFFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+[|–—-]\s+").unwrap());

/// Selectors tried in order to locate the content container.
const CONTAINER_SELECTORS: &[&str] = &["div.ContentMain", "div.MainContentZone"];
const LATE_CONTAINER_SELECTORS: &[&str] = &["article", "main", "[role=main]"];

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("no content container found in {url}")]
    NoContentContainer { url: String },
    #[error("content container in {url} holds no text")]
    EmptyContainer { url: String },
}

/// A parsed page scoped to its content container.
///
/// Rules receive a `&Page` and return `Some(value)` when they apply.
pub struct Page<'a> {
    document: &'a Html,
    container: ElementRef<'a>,
    base: Option<Url>,
    paragraphs: Vec<String>,
}

/// A single extraction rule for one field.
pub type Rule = for<'a> fn(&Page<'a>) -> Option<String>;

pub const TITLE_RULES: &[Rule] = &[title_from_heading, title_from_og, title_from_title_tag, title_from_url];
pub const DATE_RULES: &[Rule] = &[date_from_meta, date_from_dated_element, date_from_label, date_from_page_text];
pub const DESCRIPTION_RULES: &[Rule] = &[description_from_og, description_from_meta, description_from_first_paragraph];
pub const HERO_IMAGE_RULES: &[Rule] = &[hero_from_content_images];

/// Run `rules` in order and return the first value produced.
pub fn first_match(page: &Page<'_>, rules: &[Rule]) -> Option<String> {
    rules.iter().find_map(|rule| rule(page))
}

/// Extract a [`StoryRecord`] from a page's HTML.
///
/// `hero_image` holds the absolute remote URL of the image; downloading it
/// is left to the caller.
///
/// # Errors
///
/// Returns [`ExtractionError`] when the page has no recognizable content
/// container, or the container is empty.
#[instrument(level = "debug", skip_all, fields(%source_url))]
pub fn extract_story(html: &str, source_url: &str) -> Result<StoryRecord, ExtractionError> {
    let document = Html::parse_document(html);
    let container = find_container(&document).ok_or_else(|| ExtractionError::NoContentContainer {
        url: source_url.to_string(),
    })?;

    let mut paragraphs = body_blocks(container);
    if paragraphs.is_empty() {
        let text = safe_text(&container.text().collect::<String>());
        if text.is_empty() {
            return Err(ExtractionError::EmptyContainer {
                url: source_url.to_string(),
            });
        }
        paragraphs.push(text);
    }

    let page = Page {
        document: &document,
        container,
        base: Url::parse(source_url).ok(),
        paragraphs,
    };

    let story = StoryRecord {
        source_url: source_url.to_string(),
        title: first_match(&page, TITLE_RULES).unwrap_or_else(|| UNTITLED.to_string()),
        date: first_match(&page, DATE_RULES),
        description: first_match(&page, DESCRIPTION_RULES),
        body_text: page.paragraphs.join("\n\n"),
        hero_image: first_match(&page, HERO_IMAGE_RULES),
    };
    debug!(
        title = %story.title,
        date = ?story.date,
        paragraphs = page.paragraphs.len(),
        has_image = story.hero_image.is_some(),
        "Extracted story"
    );
    Ok(story)
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap()
}

fn find_container(document: &Html) -> Option<ElementRef<'_>> {
    let first = |css: &str| document.select(&selector(css)).next();

    CONTAINER_SELECTORS
        .iter()
        .find_map(|&css| first(css))
        .or_else(|| {
            document.select(&selector("div[class]")).find(|div| {
                div.value()
                    .attr("class")
                    .is_some_and(|class| class.to_lowercase().contains("content"))
            })
        })
        .or_else(|| LATE_CONTAINER_SELECTORS.iter().find_map(|&css| first(css)))
}

fn is_boilerplate(element: &ElementRef<'_>) -> bool {
    let value = element.value();
    if BOILERPLATE_TAGS.contains(&value.name()) {
        return true;
    }
    value.attr("class").is_some_and(|class| {
        let class = class.to_lowercase();
        BOILERPLATE_CLASSES.iter().any(|needle| class.contains(needle))
    })
}

/// Element ancestors of `element`, stopping before `container`.
fn ancestors_within<'a>(element: ElementRef<'a>, container: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    element
        .ancestors()
        .take_while(move |node| node.id() != container.id())
        .filter_map(ElementRef::wrap)
}

/// Paragraph-like blocks of the container, in document order.
///
/// `<em>` runs are kept as blocks of their own unless they sit inside a
/// paragraph (or another emphasis run) whose text already includes them.
fn body_blocks(container: ElementRef<'_>) -> Vec<String> {
    container
        .select(&selector("p, em"))
        .filter(|block| {
            let nested_em = block.value().name() == "em"
                && ancestors_within(*block, container).any(|a| matches!(a.value().name(), "p" | "em"));
            !nested_em
                && !is_boilerplate(block)
                && !ancestors_within(*block, container).any(|a| is_boilerplate(&a))
        })
        .map(|block| safe_text(&block.text().collect::<String>()))
        .filter(|text| text.chars().count() >= MIN_BLOCK_CHARS)
        .collect()
}

fn meta_content(document: &Html, attr: &str, key: &str) -> Option<String> {
    document
        .select(&selector(&format!("meta[{attr}]")))
        .filter(|meta| meta.value().attr(attr).is_some_and(|v| v.eq_ignore_ascii_case(key)))
        .filter_map(|meta| meta.value().attr("content"))
        .map(safe_text)
        .find(|content| !content.is_empty())
}

fn first_text(scope: impl Iterator<Item = String>) -> Option<String> {
    scope.map(|t| safe_text(&t)).find(|t| !t.is_empty())
}

// ---- title ----

pub fn title_from_heading(page: &Page<'_>) -> Option<String> {
    first_text(page.document.select(&selector("h1")).map(|h| h.text().collect()))
}

pub fn title_from_og(page: &Page<'_>) -> Option<String> {
    meta_content(page.document, "property", "og:title")
}

pub fn title_from_title_tag(page: &Page<'_>) -> Option<String> {
    let title = first_text(page.document.select(&selector("title")).map(|t| t.text().collect()))?;
    let head = match TITLE_SUFFIX_RE.find_iter(&title).last() {
        Some(sep) => title[..sep.start()].trim(),
        None => title.as_str(),
    };
    if head.is_empty() {
        Some(title)
    } else {
        Some(head.to_string())
    }
}

pub fn title_from_url(page: &Page<'_>) -> Option<String> {
    let url = page.base.as_ref()?;
    let segment = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let decoded = urlencoding::decode(segment).map(|s| s.into_owned()).unwrap_or_else(|_| segment.to_string());
    let stem = match decoded.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()) => stem,
        _ => decoded.as_str(),
    };
    if matches!(stem.to_lowercase().as_str(), "default" | "index") {
        return None;
    }
    let words = safe_text(&stem.replace(['-', '_'], " "));
    if words.is_empty() {
        return None;
    }
    Some(words.split(' ').map(upcase).collect::<Vec<_>>().join(" "))
}

// ---- date ----

fn month_number(name: &str) -> Option<u32> {
    let prefix: String = name.chars().take(3).collect::<String>().to_lowercase();
    let idx = ["jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec"]
        .iter()
        .position(|m| *m == prefix)?;
    Some(idx as u32 + 1)
}

fn normalize_date(year: &str, month: u32, day: &str, raw: &str) -> String {
    let parsed = year
        .parse()
        .ok()
        .zip(day.parse().ok())
        .and_then(|(y, d)| NaiveDate::from_ymd_opt(y, month, d));
    match parsed {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => raw.to_string(),
    }
}

/// Earliest date-like substring of `text`, with its byte offset.
///
/// Textual dates are normalized to `YYYY-MM-DD` when they name a real day.
pub fn find_date(text: &str) -> Option<(usize, String)> {
    let iso = ISO_DATE_RE.captures(text).map(|c| {
        let m = c.get(0).unwrap();
        let month = c[2].parse().unwrap_or(0);
        (m.start(), normalize_date(&c[1], month, &c[3], m.as_str()))
    });
    let month_first = MONTH_FIRST_RE.captures(text).and_then(|c| {
        let m = c.get(0).unwrap();
        Some((m.start(), normalize_date(&c[3], month_number(&c[1])?, &c[2], m.as_str())))
    });
    let day_first = DAY_FIRST_RE.captures(text).and_then(|c| {
        let m = c.get(0).unwrap();
        Some((m.start(), normalize_date(&c[3], month_number(&c[2])?, &c[1], m.as_str())))
    });
    [iso, month_first, day_first].into_iter().flatten().min_by_key(|(start, _)| *start)
}

pub fn date_from_meta(page: &Page<'_>) -> Option<String> {
    let content = meta_content(page.document, "property", "article:published_time")?;
    TIMESTAMP_DATE_RE.find(&content).map(|m| m.as_str().to_string())
}

pub fn date_from_dated_element(page: &Page<'_>) -> Option<String> {
    page.document
        .select(&selector("span[class], div[class], time, p[class]"))
        .filter(|el| {
            el.value().name() == "time"
                || el.value().attr("class").is_some_and(|class| {
                    let class = class.to_lowercase();
                    ["date", "published", "modified"].iter().any(|d| class.contains(d))
                })
        })
        .find_map(|el| {
            let text = safe_text(&el.text().collect::<String>());
            find_date(&text)
                .or_else(|| el.value().attr("datetime").and_then(find_date))
                .map(|(_, date)| date)
        })
}

pub fn date_from_label(page: &Page<'_>) -> Option<String> {
    let text = safe_text(&page.container.text().collect::<Vec<_>>().join(" "));
    DATE_LABEL_RE.find_iter(&text).find_map(|label| match find_date(&text[label.end()..]) {
        Some((0, date)) => Some(date),
        _ => None,
    })
}

pub fn date_from_page_text(page: &Page<'_>) -> Option<String> {
    let body = page.document.select(&selector("body")).next()?;
    let text = safe_text(&body.text().collect::<Vec<_>>().join(" "));
    find_date(&text).map(|(_, date)| date)
}

// ---- description ----

pub fn description_from_og(page: &Page<'_>) -> Option<String> {
    meta_content(page.document, "property", "og:description")
}

pub fn description_from_meta(page: &Page<'_>) -> Option<String> {
    meta_content(page.document, "name", "description")
}

pub fn description_from_first_paragraph(page: &Page<'_>) -> Option<String> {
    page.paragraphs
        .first()
        .map(|p| truncate_words(p, DESCRIPTION_MAX_CHARS))
}

// ---- hero image ----

/// Pixel size from a `width`/`height` attribute. Percentages say nothing
/// about the rendered size and yield `None`.
fn declared_px(value: Option<&str>) -> Option<u32> {
    let value = value?.trim();
    if value.ends_with('%') {
        return None;
    }
    let digits: String = value.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

fn is_content_image(src: &str, width: Option<u32>, height: Option<u32>) -> bool {
    let lower = src.to_lowercase();
    if lower.starts_with("data:") || IMAGE_SKIP_PATTERNS.iter().any(|p| lower.contains(p)) {
        return false;
    }
    let path = lower.split(['?', '#']).next().unwrap_or_default();
    if !IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        return false;
    }
    !(width.is_some_and(|w| w < MIN_IMAGE_PX) || height.is_some_and(|h| h < MIN_IMAGE_PX))
}

pub fn hero_from_content_images(page: &Page<'_>) -> Option<String> {
    page.container.select(&selector("img")).find_map(|img| {
        let value = img.value();
        // Lazy-loaded images carry an empty or `data:` placeholder in `src`.
        let src = value
            .attr("src")
            .map(str::trim)
            .filter(|s| !s.is_empty() && !s.to_ascii_lowercase().starts_with("data:"))
            .or_else(|| value.attr("data-src").map(str::trim))?;
        if !is_content_image(src, declared_px(value.attr("width")), declared_px(value.attr("height"))) {
            return None;
        }
        match &page.base {
            Some(base) => base.join(src).ok().map(String::from),
            None => Url::parse(src).ok().map(String::from),
        }
    })
}
