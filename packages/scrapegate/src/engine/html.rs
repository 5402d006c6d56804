//! Heuristic DOM-to-record mapping.
//!
//! Parses rendered markup with `scraper` and fills a [`ScrapedRecord`]:
//! page metadata first, then items according to the extraction type.

use indexmap::{IndexMap, IndexSet};
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{RenderError, RenderResult};
use crate::types::options::{ExtractionOptions, ExtractionType};
use crate::types::record::{ProductInfo, RecordItem, RenderedPage, ScrapedRecord};

lazy_static! {
    // Currency symbol followed by an amount with optional grouping and decimals
    static ref PRICE_REGEX: Regex = Regex::new(
        r"(?P<symbol>[$€£¥])\s*(?P<amount>\d+(?:[.,\s]\d{3})*(?:[.,]\d{1,2})?)"
    ).unwrap();
}

/// Containers tried in order when looking for the main content.
const MAIN_CONTENT_SELECTORS: &[&str] = &[
    "main",
    "article",
    "[role='main']",
    "#content",
    "#main",
    ".content",
    ".post-content",
    ".entry-content",
];

/// Page chrome never treated as a listing.
const CHROME_TAGS: &[&str] = &["nav", "header", "footer", "aside"];

/// Tags whose repeated siblings count as listing items.
const LISTING_ITEM_TAGS: &[&str] = &["li", "tr", "article", "div", "section"];

/// Maps rendered HTML to a structured record.
#[derive(Debug, Clone)]
pub struct HtmlExtractor {
    min_paragraph_chars: usize,
    min_listing_items: usize,
}

impl Default for HtmlExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl HtmlExtractor {
    pub fn new() -> Self {
        Self {
            min_paragraph_chars: 20,
            min_listing_items: 3,
        }
    }

    /// Paragraphs shorter than this are ignored for articles.
    pub fn with_min_paragraph_chars(mut self, chars: usize) -> Self {
        self.min_paragraph_chars = chars;
        self
    }

    /// Repeated siblings needed before `Auto` settles on a listing.
    pub fn with_min_listing_items(mut self, items: usize) -> Self {
        self.min_listing_items = items.max(1);
        self
    }

    pub fn extract(
        &self,
        page: &RenderedPage,
        options: &ExtractionOptions,
    ) -> RenderResult<ScrapedRecord> {
        let base = Url::parse(&page.final_url)
            .map_err(|e| RenderError::Extraction(format!("invalid page URL {}: {e}", page.final_url)))?;

        let document = Html::parse_document(&page.html);
        let root = document.root_element();

        let product = detect_product(root);
        let listing = self.detect_listing(root, &base);

        let extraction_type = match options.extraction_type {
            ExtractionType::Auto if product.is_some() => ExtractionType::Product,
            ExtractionType::Auto if listing.len() >= self.min_listing_items => ExtractionType::Listing,
            ExtractionType::Auto => ExtractionType::Article,
            explicit => explicit,
        };

        let mut record = ScrapedRecord::new(&page.url, extraction_type, &page.html);
        record.title = first_attr(root, "meta[property='og:title']", "content")
            .or_else(|| first_text(root, "title"));
        record.description = first_attr(root, "meta[name='description']", "content")
            .or_else(|| first_attr(root, "meta[property='og:description']", "content"));
        record.canonical_url = first_attr(root, "link[rel='canonical']", "href")
            .and_then(|href| resolve(&base, &href));
        record.language = root
            .value()
            .attr("lang")
            .map(str::trim)
            .filter(|lang| !lang.is_empty())
            .map(str::to_string);
        record.headings = select_all(root, "h1, h2, h3")
            .into_iter()
            .map(text_of)
            .filter(|t| !t.is_empty())
            .collect();
        record.links = collect_urls(root, &base, "a[href]", "href");
        record.images = collect_urls(root, &base, "img[src]", "src");

        if extraction_type == ExtractionType::Product {
            let mut info = product.unwrap_or(ProductInfo {
                name: None,
                price: None,
                currency: None,
            });
            if info.name.is_none() {
                info.name = record.title.clone();
            }
            record.product = Some(info);
        }

        record.items = match &options.selector {
            Some(css) => {
                let selector = Selector::parse(css)
                    .map_err(|e| RenderError::Extraction(format!("invalid selector {css:?}: {e}")))?;
                root.select(&selector).map(|el| item_from(el, &base)).collect()
            }
            None => match extraction_type {
                ExtractionType::Listing => listing,
                ExtractionType::Product => vec![RecordItem {
                    text: record
                        .product
                        .as_ref()
                        .and_then(|p| p.name.clone())
                        .unwrap_or_default(),
                    link: Some(page.final_url.clone()),
                    image: record.images.first().cloned(),
                }],
                _ => self.paragraphs(root),
            },
        };

        Ok(record)
    }

    fn paragraphs(&self, root: ElementRef<'_>) -> Vec<RecordItem> {
        let main = MAIN_CONTENT_SELECTORS
            .iter()
            .find_map(|css| select_all(root, css).into_iter().next())
            .unwrap_or(root);

        select_all(main, "p")
            .into_iter()
            .map(text_of)
            .filter(|text| text.chars().count() >= self.min_paragraph_chars)
            .map(RecordItem::text)
            .collect()
    }

    /// Largest group of same-shaped siblings outside page chrome.
    fn detect_listing(&self, root: ElementRef<'_>, base: &Url) -> Vec<RecordItem> {
        let mut best: Vec<ElementRef<'_>> = Vec::new();

        for container in select_all(root, "body *") {
            if in_chrome(container) {
                continue;
            }

            let mut groups: IndexMap<String, Vec<ElementRef<'_>>> = IndexMap::new();
            for child in container.children().filter_map(ElementRef::wrap) {
                if let Some(signature) = listing_signature(child) {
                    groups.entry(signature).or_default().push(child);
                }
            }

            for group in groups.into_values() {
                if group.len() > best.len() {
                    best = group;
                }
            }
        }

        if best.len() < self.min_listing_items {
            return Vec::new();
        }

        best.into_iter()
            .map(|el| item_from(el, base))
            .filter(|item| !item.text.is_empty())
            .collect()
    }
}

/// Grouping key for a candidate listing item, `None` if it cannot be one.
fn listing_signature(el: ElementRef<'_>) -> Option<String> {
    let name = el.value().name();
    if !LISTING_ITEM_TAGS.contains(&name) || text_of(el).is_empty() {
        return None;
    }

    // Block containers only count when each one links somewhere
    if !matches!(name, "li" | "tr") && select_all(el, "a[href]").is_empty() {
        return None;
    }

    let mut classes: Vec<&str> = el.value().classes().collect();
    classes.sort_unstable();
    Some(format!("{name}.{}", classes.join(".")))
}

fn in_chrome(el: ElementRef<'_>) -> bool {
    CHROME_TAGS.contains(&el.value().name())
        || el.ancestors().any(|node| {
            node.value()
                .as_element()
                .is_some_and(|e| CHROME_TAGS.contains(&e.name()))
        })
}

fn detect_product(root: ElementRef<'_>) -> Option<ProductInfo> {
    let meta_amount = first_attr(root, "meta[property='product:price:amount']", "content")
        .or_else(|| first_attr(root, "[itemprop='price']", "content"))
        .or_else(|| first_text(root, "[itemprop='price']"))
        .and_then(|raw| parse_amount(&raw));

    let mut currency = first_attr(root, "meta[property='product:price:currency']", "content")
        .or_else(|| first_attr(root, "[itemprop='priceCurrency']", "content"));

    let price = match meta_amount {
        Some(amount) => Some(amount),
        None => select_all(root, "[class*='price']")
            .into_iter()
            .map(text_of)
            .find_map(|text| {
                let caps = PRICE_REGEX.captures(&text)?;
                let amount = parse_amount(&caps["amount"])?;
                if currency.is_none() {
                    currency = currency_for_symbol(&caps["symbol"]).map(str::to_string);
                }
                Some(amount)
            }),
    }?;

    let name = first_text(root, "[itemprop='name']").or_else(|| first_text(root, "h1"));

    Some(ProductInfo {
        name,
        price: Some(price),
        currency,
    })
}

/// Parse `1,299.00`, `1.299,00` or `24.90` into a number.
fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let decimal_at = cleaned
        .rfind(|c: char| c == '.' || c == ',')
        .filter(|&i| cleaned.len() - i - 1 <= 2);

    let normalized: String = match decimal_at {
        Some(i) => cleaned[..i]
            .chars()
            .filter(char::is_ascii_digit)
            .chain(std::iter::once('.'))
            .chain(cleaned[i + 1..].chars())
            .collect(),
        None => cleaned.chars().filter(char::is_ascii_digit).collect(),
    };

    normalized.parse().ok()
}

fn currency_for_symbol(symbol: &str) -> Option<&'static str> {
    match symbol {
        "$" => Some("USD"),
        "€" => Some("EUR"),
        "£" => Some("GBP"),
        "¥" => Some("JPY"),
        _ => None,
    }
}

fn item_from(el: ElementRef<'_>, base: &Url) -> RecordItem {
    let link = if el.value().name() == "a" {
        el.value().attr("href").and_then(|href| resolve(base, href))
    } else {
        select_all(el, "a[href]")
            .into_iter()
            .find_map(|a| a.value().attr("href").and_then(|href| resolve(base, href)))
    };

    let image = select_all(el, "img[src]")
        .into_iter()
        .find_map(|img| img.value().attr("src").and_then(|src| resolve(base, src)));

    RecordItem {
        text: text_of(el),
        link,
        image,
    }
}

fn collect_urls(root: ElementRef<'_>, base: &Url, css: &str, attr: &str) -> Vec<String> {
    select_all(root, css)
        .into_iter()
        .filter_map(|el| el.value().attr(attr))
        .filter_map(|raw| resolve(base, raw))
        .collect::<IndexSet<_>>()
        .into_iter()
        .collect()
}

/// Absolute http(s) URL without fragment.
fn resolve(base: &Url, raw: &str) -> Option<String> {
    let mut url = base.join(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    Some(url.to_string())
}

fn select_all<'a>(root: ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => root.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

fn first_text(root: ElementRef<'_>, css: &str) -> Option<String> {
    select_all(root, css)
        .into_iter()
        .map(text_of)
        .find(|t| !t.is_empty())
}

fn first_attr(root: ElementRef<'_>, css: &str, attr: &str) -> Option<String> {
    select_all(root, css)
        .into_iter()
        .filter_map(|el| el.value().attr(attr))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

/// Element text with whitespace collapsed.
fn text_of(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
