//! General-purpose article parsing for pages without configured selectors.
//!
//! The rendered strategy only knows where the listing links are; for the
//! article pages themselves it relies on [`parse_article`], which reads:
//!
//! - the headline from `og:title`, JSON-LD `headline`, the first `<h1>` or `<title>`
//! - the body from the paragraphs of the first `article`, `[itemprop=articleBody]`
//!   or `main` container (falling back to every `<p>` on the page)
//! - publish date, authors and keywords from JSON-LD and meta tags
//!
//! Missing pieces are `None`/empty rather than errors.

use crate::normalize::{element_text, normalize_text};
use chrono::{DateTime, NaiveDate, Utc};
use itertools::Itertools;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

static JSON_LD: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).unwrap());
static META: Lazy<Selector> = Lazy::new(|| Selector::parse("meta[content]").unwrap());
static H1: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").unwrap());
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());
static TIME: Lazy<Selector> = Lazy::new(|| Selector::parse("time[datetime]").unwrap());
static CONTAINERS: Lazy<Vec<Selector>> = Lazy::new(|| {
    ["article", r#"[itemprop="articleBody"]"#, "main"]
        .iter()
        .map(|s| Selector::parse(s).unwrap())
        .collect()
});

const ARTICLE_TYPES: &[&str] = &["Article", "NewsArticle", "ReportageNewsArticle", "AnalysisNewsArticle", "OpinionNewsArticle", "BlogPosting"];

/// What could be read from one article page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedArticle {
    pub title: Option<String>,
    pub text: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub authors: Vec<String>,
    pub keywords: Vec<String>,
}

/// Publish date, authors and keywords of a page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageMetadata {
    pub headline: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub authors: Vec<String>,
    pub keywords: Vec<String>,
}

pub fn parse_article(html: &str) -> ParsedArticle {
    let document = Html::parse_document(html);
    let metadata = read_metadata(&document);

    let title = meta_content(&document, "og:title")
        .or(metadata.headline.clone())
        .or_else(|| first_text(&document, &H1))
        .or_else(|| first_text(&document, &TITLE))
        .filter(|t| !t.is_empty());

    ParsedArticle {
        title,
        text: body_text(&document),
        published_at: metadata.published_at,
        authors: metadata.authors,
        keywords: metadata.keywords,
    }
}

/// Metadata only, for pages whose title/body come from configured selectors.
pub fn page_metadata(html: &str) -> PageMetadata {
    read_metadata(&Html::parse_document(html))
}

fn read_metadata(document: &Html) -> PageMetadata {
    let mut metadata = PageMetadata::default();

    for node in json_ld_articles(document) {
        if metadata.headline.is_none() {
            metadata.headline = node
                .get("headline")
                .and_then(Value::as_str)
                .map(normalize_text)
                .filter(|h| !h.is_empty());
        }
        if metadata.published_at.is_none() {
            metadata.published_at = node
                .get("datePublished")
                .and_then(Value::as_str)
                .and_then(parse_date);
        }
        if let Some(author) = node.get("author") {
            metadata.authors.extend(author_names(author));
        }
        if let Some(keywords) = node.get("keywords") {
            metadata.keywords.extend(keyword_list(keywords));
        }
    }

    if metadata.published_at.is_none() {
        metadata.published_at = ["article:published_time", "pubdate", "publish-date", "date", "dc.date"]
            .iter()
            .filter_map(|key| meta_content(document, key))
            .find_map(|value| parse_date(&value))
            .or_else(|| {
                document
                    .select(&TIME)
                    .filter_map(|t| t.value().attr("datetime"))
                    .find_map(parse_date)
            });
    }

    if metadata.authors.is_empty() {
        metadata.authors = ["author", "article:author"]
            .iter()
            .filter_map(|key| meta_content(document, key))
            .filter(|value| !value.starts_with("http"))
            .flat_map(|value| split_list(&value))
            .collect();
    }

    if metadata.keywords.is_empty() {
        metadata.keywords = ["news_keywords", "keywords"]
            .iter()
            .filter_map(|key| meta_content(document, key))
            .flat_map(|value| split_list(&value))
            .collect();
    }

    metadata.authors = metadata.authors.into_iter().unique().collect();
    metadata.keywords = metadata.keywords.into_iter().unique().collect();
    metadata
}

/// Article-typed JSON-LD objects, including those inside `@graph` and arrays.
fn json_ld_articles(document: &Html) -> Vec<Value> {
    let mut found = Vec::new();
    for script in document.select(&JSON_LD) {
        let raw = script.text().collect::<String>();
        let Ok(parsed) = serde_json::from_str::<Value>(raw.trim()) else {
            continue;
        };
        collect_articles(parsed, &mut found);
    }
    found
}

fn collect_articles(value: Value, found: &mut Vec<Value>) {
    match value {
        Value::Array(items) => items.into_iter().for_each(|item| collect_articles(item, found)),
        Value::Object(mut map) => {
            if let Some(graph) = map.remove("@graph") {
                collect_articles(graph, found);
            }
            let is_article = match map.get("@type") {
                Some(Value::String(t)) => ARTICLE_TYPES.contains(&t.as_str()),
                Some(Value::Array(types)) => types
                    .iter()
                    .filter_map(Value::as_str)
                    .any(|t| ARTICLE_TYPES.contains(&t)),
                _ => false,
            };
            if is_article {
                found.push(Value::Object(map));
            }
        }
        _ => {}
    }
}

fn author_names(author: &Value) -> Vec<String> {
    match author {
        Value::String(name) => split_list(name),
        Value::Object(map) => map
            .get("name")
            .and_then(Value::as_str)
            .map(normalize_text)
            .filter(|n| !n.is_empty())
            .into_iter()
            .collect(),
        Value::Array(items) => items.iter().flat_map(author_names).collect(),
        _ => Vec::new(),
    }
}

fn keyword_list(keywords: &Value) -> Vec<String> {
    match keywords {
        Value::String(list) => split_list(list),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(normalize_text)
            .filter(|k| !k.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(normalize_text)
        .filter(|item| !item.is_empty())
        .collect()
}

/// RFC 3339 timestamps, or bare `YYYY-MM-DD` dates taken as midnight UTC.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let date_part = raw.get(..10)?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// `content` of the first `<meta>` whose `property` or `name` equals `key`.
fn meta_content(document: &Html, key: &str) -> Option<String> {
    document
        .select(&META)
        .find(|meta| {
            let el = meta.value();
            el.attr("property")
                .or_else(|| el.attr("name"))
                .is_some_and(|k| k.eq_ignore_ascii_case(key))
        })
        .and_then(|meta| meta.value().attr("content"))
        .map(normalize_text)
        .filter(|c| !c.is_empty())
}

fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .map(|el| element_text(&el))
        .find(|t| !t.is_empty())
}

fn body_text(document: &Html) -> Option<String> {
    let container = CONTAINERS
        .iter()
        .filter_map(|selector| document.select(selector).next())
        .find(|el| el.select(&PARAGRAPH).next().is_some());

    let text = match container {
        Some(container) => paragraphs(container),
        None => paragraphs(document.root_element()),
    };
    Some(text).filter(|t| !t.is_empty())
}

fn paragraphs(scope: ElementRef<'_>) -> String {
    let text = scope
        .select(&PARAGRAPH)
        .map(|p| element_text(&p))
        .filter(|t| !t.is_empty())
        .join(" ");
    normalize_text(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const PAGE: &str = r#"
<html>
<head>
  <title>Ny aftale om skat | Avisen</title>
  <meta property="og:title" content="Ny aftale om skattelettelser">
  <meta name="keywords" content="skat, politik , Folketinget">
  <script type="application/ld+json">
  {
    "@context": "https://schema.org",
    "@graph": [
      { "@type": "WebSite", "name": "Avisen" },
      {
        "@type": "NewsArticle",
        "headline": "Ny aftale",
        "datePublished": "2024-05-06T08:30:00+02:00",
        "author": [{ "@type": "Person", "name": "Jens Hansen" }, { "name": "Mette Jensen" }]
      }
    ]
  }
  </script>
</head>
<body>
  <nav><p>Forside</p></nav>
  <article>
    <h1>Ny aftale</h1>
    <p>Regeringen har indgået en aftale.</p>
    <p>  Oppositionen   kritiserer den. </p>
  </article>
</body>
</html>
"#;

    #[test]
    fn test_parse_article_reads_everything() {
        let parsed = parse_article(PAGE);
        assert_eq!(parsed.title.as_deref(), Some("Ny aftale om skattelettelser"));
        assert_eq!(
            parsed.text.as_deref(),
            Some("Regeringen har indgået en aftale. Oppositionen kritiserer den.")
        );
        assert_eq!(
            parsed.published_at,
            Some(Utc.with_ymd_and_hms(2024, 5, 6, 6, 30, 0).unwrap())
        );
        assert_eq!(parsed.authors, vec!["Jens Hansen", "Mette Jensen"]);
        assert_eq!(parsed.keywords, vec!["skat", "politik", "Folketinget"]);
    }

    #[test]
    fn test_meta_fallbacks() {
        let html = r#"
<html><head>
  <meta property="article:published_time" content="2023-11-02">
  <meta name="author" content="Anne Berg, Peter Lund">
</head>
<body><h1>Overskrift</h1><div><p>Kun et afsnit.</p></div></body></html>
"#;
        let parsed = parse_article(html);
        assert_eq!(parsed.title.as_deref(), Some("Overskrift"));
        assert_eq!(parsed.text.as_deref(), Some("Kun et afsnit."));
        assert_eq!(
            parsed.published_at,
            Some(Utc.with_ymd_and_hms(2023, 11, 2, 0, 0, 0).unwrap())
        );
        assert_eq!(parsed.authors, vec!["Anne Berg", "Peter Lund"]);
        assert!(parsed.keywords.is_empty());
    }

    #[test]
    fn test_page_without_body_has_no_text() {
        let parsed = parse_article("<html><head><title>Tom</title></head><body><div>menu</div></body></html>");
        assert_eq!(parsed.title.as_deref(), Some("Tom"));
        assert_eq!(parsed.text, None);
    }

    #[test]
    fn test_time_element_date() {
        let meta = page_metadata(r#"<html><body><time datetime="2022-01-15T10:00:00Z">15. jan</time></body></html>"#);
        assert_eq!(
            meta.published_at,
            Some(Utc.with_ymd_and_hms(2022, 1, 15, 10, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_parse_date_rejects_garbage() {
        assert_eq!(parse_date("i går"), None);
        assert_eq!(parse_date(""), None);
    }
}
