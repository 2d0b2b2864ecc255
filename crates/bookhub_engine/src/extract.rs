use std::collections::HashSet;
use std::sync::LazyLock;

use bookhub_core::{normalize_text, Record, RecordKey, MAX_TITLE_CHARS, PLACEHOLDER_TITLE};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b([A-Z0-9]{10})\b").expect("valid regex"));
static PRODUCT_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)/(?:dp|gp/product)/([A-Z0-9]{10})").expect("valid regex")
});

const CANDIDATE_SELECTORS: &[&str] = &[
    "[data-asin]",
    "[data-testid*='book']",
    "[data-testid*='item']",
    "[data-testid*='library']",
    "a[href*='/dp/']",
    "a[href*='/gp/product/']",
    "a[href*='asin=']",
    "a[href*='kindle-library']",
    "div[role='listitem']",
    "[role='gridcell']",
    "li",
];

const BOOK_NODE_SELECTORS: &[&str] = &[
    "[data-asin]",
    "[data-testid*='book']",
    "[data-testid*='item']",
    "[role='listitem']",
    "[role='gridcell']",
    "li",
];

const TITLE_SELECTORS: &[&str] = &[
    "[data-testid*='title']",
    "[aria-label]",
    "[title]",
    "h1",
    "h2",
    "h3",
    "p",
];

const ANCHOR_SELECTORS: &[&str] = &[
    "a[href*='asin=']",
    "a[href*='/dp/']",
    "a[href*='/gp/product/']",
    "a[href]",
];

const PRODUCT_TITLE_SELECTORS: &[&str] = &["#productTitle", "#ebooksProductTitle"];
const PRODUCT_IDENTIFIER_SELECTORS: &[&str] = &["input[name='ASIN']", "#ASIN"];
const PRODUCT_COVER_SELECTORS: &[&str] = &["#imgBlkFront", "#landingImage", "#ebooksImgBlkFront"];

const LIBRARY_HOST: &str = "read.amazon.co.jp";
const LIBRARY_PATH_PREFIX: &str = "/kindle-library";

pub trait Extractor: Send + Sync {
    /// Candidate records in document order; never fails, may be empty.
    fn extract(&self, html: &str, base_url: Option<&Url>) -> Vec<Record>;
}

struct Selectors {
    candidates: Vec<Selector>,
    book_nodes: Vec<Selector>,
    titles: Vec<Selector>,
    anchors: Vec<Selector>,
    image: Option<Selector>,
}

impl Selectors {
    fn new() -> Self {
        Self {
            candidates: parse_all(CANDIDATE_SELECTORS),
            book_nodes: parse_all(BOOK_NODE_SELECTORS),
            titles: parse_all(TITLE_SELECTORS),
            anchors: parse_all(ANCHOR_SELECTORS),
            image: Selector::parse("img").ok(),
        }
    }
}

/// Heuristic extractor for the cloud reader's library grid.
pub struct LibraryExtractor {
    selectors: Selectors,
}

impl Default for LibraryExtractor {
    fn default() -> Self {
        Self {
            selectors: Selectors::new(),
        }
    }
}

impl LibraryExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    fn book_nodes<'a>(&self, doc: &'a Html) -> Vec<ElementRef<'a>> {
        let mut seen = HashSet::new();
        let mut nodes = Vec::new();
        for selector in &self.selectors.candidates {
            for element in doc.select(selector) {
                let node = self.closest_book_node(element);
                if seen.insert(node.id()) {
                    nodes.push(node);
                }
            }
        }
        nodes
    }

    fn closest_book_node<'a>(&self, element: ElementRef<'a>) -> ElementRef<'a> {
        self.selectors
            .book_nodes
            .iter()
            .find_map(|selector| closest(element, selector))
            .unwrap_or(element)
    }

    fn pick_title(&self, node: ElementRef<'_>) -> Option<String> {
        for selector in &self.selectors.titles {
            let text = node
                .select(selector)
                .next()
                .and_then(|element| normalize_text(&element.text().collect::<String>()));
            if let Some(text) = text.filter(|t| t.chars().count() > 1) {
                return Some(text);
            }
        }
        self.first_image(node)
            .and_then(|img| img.value().attr("alt"))
            .and_then(normalize_text)
    }

    fn first_image<'a>(&self, node: ElementRef<'a>) -> Option<ElementRef<'a>> {
        self.selectors
            .image
            .as_ref()
            .and_then(|selector| node.select(selector).next())
    }

    fn record_for(&self, node: ElementRef<'_>, base_url: Option<&Url>) -> Option<Record> {
        let anchor = self
            .selectors
            .anchors
            .iter()
            .find_map(|selector| node.select(selector).next());
        let image = self.first_image(node);

        let href = anchor.and_then(|a| a.value().attr("href"));
        let src = image.and_then(|img| img.value().attr("src"));
        let detail_url = href.and_then(|h| resolve_url(h, base_url));

        let element = node.value();
        let identifier = [
            element.attr("data-asin"),
            element.attr("id"),
            element.attr("data-testid"),
            element.attr("aria-label"),
            detail_url.as_deref().or(href),
            src,
        ]
        .into_iter()
        .flatten()
        .find_map(find_identifier);

        let image_url = src
            .or_else(|| {
                image
                    .and_then(|img| img.value().attr("srcset"))
                    .and_then(|srcset| srcset.split_whitespace().next())
            })
            .and_then(|raw| resolve_url(raw, base_url));

        let title = self
            .pick_title(node)
            .or_else(|| {
                anchor
                    .and_then(|a| a.value().attr("aria-label"))
                    .and_then(normalize_text)
            })
            .or_else(|| normalize_text(&node.text().collect::<String>()));

        if title.is_none() && identifier.is_none() {
            return None;
        }
        let title = title.unwrap_or_else(|| PLACEHOLDER_TITLE.to_string());
        if title.chars().count() > MAX_TITLE_CHARS {
            return None;
        }
        Record::new(title, identifier, image_url, detail_url).ok()
    }
}

impl Extractor for LibraryExtractor {
    fn extract(&self, html: &str, base_url: Option<&Url>) -> Vec<Record> {
        let doc = Html::parse_document(html);
        let mut seen: HashSet<RecordKey> = HashSet::new();
        self.book_nodes(&doc)
            .into_iter()
            .filter_map(|node| self.record_for(node, base_url))
            .filter(|record| seen.insert(record.key()))
            .collect()
    }
}

/// The book shown on a store product page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductInfo {
    pub title: String,
    pub identifier: Option<String>,
    pub image_url: Option<String>,
}

/// `None` when the page carries no product title.
pub fn extract_product(html: &str, page_url: &Url) -> Option<ProductInfo> {
    let doc = Html::parse_document(html);
    let title = first_match(&doc, PRODUCT_TITLE_SELECTORS)
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|title| !title.is_empty())?;

    let identifier = PRODUCT_PATH
        .captures(page_url.path())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_ascii_uppercase())
        .or_else(|| {
            first_match(&doc, PRODUCT_IDENTIFIER_SELECTORS)
                .and_then(|input| input.value().attr("value"))
                .filter(|value| !value.is_empty())
                .map(str::to_ascii_uppercase)
        });

    let image_url = first_match(&doc, PRODUCT_COVER_SELECTORS)
        .and_then(|img| img.value().attr("src"))
        .and_then(|src| resolve_url(src, Some(page_url)));

    Some(ProductInfo {
        title,
        identifier,
        image_url,
    })
}

pub fn is_library_page(url: &Url) -> bool {
    url.host_str() == Some(LIBRARY_HOST) && url.path().starts_with(LIBRARY_PATH_PREFIX)
}

fn find_identifier(raw: &str) -> Option<String> {
    IDENTIFIER
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_ascii_uppercase())
}

fn closest<'a>(element: ElementRef<'a>, selector: &Selector) -> Option<ElementRef<'a>> {
    std::iter::once(element)
        .chain(element.ancestors().filter_map(ElementRef::wrap))
        .find(|candidate| selector.matches(candidate))
}

fn first_match<'a>(doc: &'a Html, selectors: &[&str]) -> Option<ElementRef<'a>> {
    parse_all(selectors)
        .iter()
        .find_map(|selector| doc.select(selector).next())
}

fn parse_all(selectors: &[&str]) -> Vec<Selector> {
    selectors
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .collect()
}

fn resolve_url(raw: &str, base: Option<&Url>) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with("data:") {
        return None;
    }
    match base {
        Some(base) => base.join(raw).ok().map(|u| u.to_string()),
        None => Url::parse(raw).ok().map(|u| u.to_string()),
    }
}
