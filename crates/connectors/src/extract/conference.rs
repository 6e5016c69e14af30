use crate::{
    error::{ConnectorError, PageFailure},
    extract::Extractor,
    transport::PageTransport,
};
use async_trait::async_trait;
use engine_core::rate_limiter::RateLimiter;
use lazy_static::lazy_static;
use model::{
    core::identifiers::ItemId,
    execution::{fetch_result::FailureKind, work_item::WorkItem},
    records::{record::Record, schema::Schema},
};
use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

lazy_static! {
    static ref LISTING: Selector = Selector::parse("ul#articleLists").expect("listing selector");
    static ref LISTING_ITEM: Selector = Selector::parse("li").expect("item selector");
    static ref LISTING_LINK: Selector = Selector::parse("h2 a").expect("link selector");
    static ref ABSTRACT: Selector =
        Selector::parse("div.prose.max-w-none.my-6.text-color-black.text-justify > div")
            .expect("abstract selector");
    static ref CITATION: Selector =
        Selector::parse("blockquote.container.mx-auto.mb-8").expect("citation selector");
    static ref PARAGRAPH: Selector = Selector::parse("p").expect("paragraph selector");
    static ref AUTHOR_BLOCK: Selector =
        Selector::parse("div.my-2.flex.flex-row.items-center").expect("author selector");
    static ref AUTHOR_NAME: Selector =
        Selector::parse("div.flex.flex-col > a").expect("author name selector");
    static ref AUTHOR_PLACE: Selector =
        Selector::parse("div.flex.flex-col > p").expect("author place selector");
    static ref VIEW_COUNT: Selector =
        Selector::parse("span.text-color-muted").expect("view count selector");
    static ref KEYWORD_BOX: Selector =
        Selector::parse("div.text-color-base.pt-2.p-4.my-4.bg-white.border.rounded")
            .expect("keyword selector");
    static ref DIV: Selector = Selector::parse("div").expect("div selector");
    static ref TITLE: Selector = Selector::parse("title").expect("title selector");

    static ref ORDINAL_PREFIX: Regex = Regex::new(r"^\d+\.\s*").unwrap();
    static ref AUTHORS_RE: Regex = Regex::new(r"(?s)نوشته شده توسط(.*?)نویسنده مسئول").unwrap();
    static ref CONFERENCE_RE: Regex = Regex::new(r"(?s)کمیته علمی (.*?) پذیرفته شده است").unwrap();
    static ref YEAR_RE: Regex = Regex::new(r"در سال (\d{4})").unwrap();
    static ref VIEWS_RE: Regex = Regex::new(r"تاکنون (\d+) بار").unwrap();
    static ref PAGES_RE: Regex = Regex::new(r"با (\d+) صفحه").unwrap();
    static ref DIGITS: Regex = Regex::new(r"\d+").unwrap();
}

const KEYWORDS_MARK: &str = "کلمات کلیدی";
const KEYWORDS_END: &str = "هستند";
const NOT_FOUND_MARK: &str = "یافت نشد";

/// An entry of a conference listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArticleLink {
    pub title: String,
    pub link: String,
}

/// Fields parsed out of an article's citation sentence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CitationDetails {
    pub authors: String,
    pub conference: String,
    pub year: String,
    pub keywords: String,
    pub view_count: Option<u64>,
    pub page_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Article {
    pub title: String,
    pub link: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub citation: String,
    pub authors: String,
    pub conference_name: String,
    pub year: String,
    pub keywords: String,
    pub view_count: u64,
    pub page_count: Option<u32>,
    pub authors_map: BTreeMap<String, String>,
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Article links of a listing page, or `None` when the page has no listing at all.
pub fn parse_listing(html: &str, base: &Url) -> Option<Vec<ArticleLink>> {
    let doc = Html::parse_document(html);
    let list = doc.select(&LISTING).next()?;

    let links = list
        .select(&LISTING_ITEM)
        .filter_map(|li| li.select(&LISTING_LINK).next())
        .filter_map(|a| {
            let href = a.value().attr("href")?;
            let link = base.join(href).ok()?;
            let title = ORDINAL_PREFIX.replace(&text_of(a), "").into_owned();
            Some(ArticleLink {
                title,
                link: link.to_string(),
            })
        })
        .collect();
    Some(links)
}

pub fn parse_citation(text: &str) -> CitationDetails {
    let mut details = CitationDetails::default();
    if text.is_empty() {
        return details;
    }

    let capture = |re: &Regex| {
        re.captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
    };

    details.authors = capture(&*AUTHORS_RE).unwrap_or_default();
    details.conference = capture(&*CONFERENCE_RE).unwrap_or_default();
    details.year = capture(&*YEAR_RE).unwrap_or_default();
    details.view_count = capture(&*VIEWS_RE).and_then(|v| v.parse().ok());
    details.page_count = capture(&*PAGES_RE).and_then(|v| v.parse().ok());

    if let Some((_, rest)) = text.split_once(KEYWORDS_MARK) {
        if let Some((keywords, _)) = rest.split_once(KEYWORDS_END) {
            details.keywords = keywords.trim().to_string();
        }
    }
    details
}

/// Parses an article page. Missing parts are left blank.
pub fn parse_article(html: &str, link: ArticleLink) -> Article {
    let doc = Html::parse_document(html);

    let abstract_text = doc.select(&ABSTRACT).next().map(text_of).unwrap_or_default();
    let citation = doc
        .select(&CITATION)
        .next()
        .and_then(|bq| bq.select(&PARAGRAPH).next())
        .map(text_of)
        .unwrap_or_default();

    let mut authors_map = BTreeMap::new();
    for block in doc.select(&AUTHOR_BLOCK) {
        let Some(name) = block.select(&AUTHOR_NAME).next().map(text_of) else {
            continue;
        };
        let place = block.select(&AUTHOR_PLACE).next().map(text_of).unwrap_or_default();
        authors_map.insert(name, place);
    }

    let details = parse_citation(&citation);

    let view_count = details.view_count.or_else(|| {
        doc.select(&VIEW_COUNT)
            .next()
            .map(text_of)
            .and_then(|t| DIGITS.find(&t).and_then(|m| m.as_str().parse().ok()))
    });

    let page_keywords: Vec<String> = doc
        .select(&KEYWORD_BOX)
        .next()
        .map(|box_el| {
            box_el
                .select(&DIV)
                .map(text_of)
                .filter(|k| !k.is_empty())
                .collect()
        })
        .unwrap_or_default();
    let keywords = if page_keywords.is_empty() {
        details.keywords
    } else {
        page_keywords.join(", ")
    };

    Article {
        title: link.title,
        link: link.link,
        abstract_text,
        citation,
        authors: details.authors,
        conference_name: details.conference,
        year: details.year,
        keywords,
        view_count: view_count.unwrap_or(0),
        page_count: details.page_count,
        authors_map,
    }
}

fn looks_like_not_found(html: &str) -> bool {
    let doc = Html::parse_document(html);
    doc.select(&TITLE)
        .next()
        .map(text_of)
        .is_some_and(|t| t.contains("404") || t.contains(NOT_FOUND_MARK))
}

/// Walks every listing page of a conference and every article on it.
///
/// Produces one record per conference; `papers` holds the articles as a JSON array.
pub struct ConferenceExtractor {
    base: Url,
    max_pages: u32,
    pacing: RateLimiter,
    schema: Schema,
}

impl ConferenceExtractor {
    pub fn new(base: Url, max_pages: u32, pacing: RateLimiter) -> Self {
        Self {
            base,
            max_pages: max_pages.max(1),
            pacing,
            schema: Schema::new("conference_id")
                .optional("conference_name")
                .optional("year")
                .required("paper_count")
                .required("papers"),
        }
    }

    /// Parses `base_url`, treating it as a directory so listing paths join under it.
    pub fn from_base_url(
        base_url: &str,
        max_pages: u32,
        pacing: RateLimiter,
    ) -> Result<Self, ConnectorError> {
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base = Url::parse(&normalized).map_err(|e| ConnectorError::InvalidBaseUrl {
            url: base_url.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self::new(base, max_pages, pacing))
    }

    fn listing_url(&self, id: &str, page: u32) -> Result<Url, PageFailure> {
        self.base
            .join(&format!("l/{id}/pgn-{page}/"))
            .map_err(|e| PageFailure::not_found(format!("malformed id {id}: {e}")))
    }
}

#[async_trait]
impl Extractor for ConferenceExtractor {
    fn name(&self) -> &'static str {
        "conference"
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn validate_id(&self, id: &ItemId) -> Result<(), String> {
        let id = id.as_str();
        if id.is_empty() {
            return Err("empty id".into());
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(format!("`{id}` is not a conference id"));
        }
        Ok(())
    }

    async fn extract(
        &self,
        transport: &dyn PageTransport,
        item: &WorkItem,
    ) -> Result<Record, PageFailure> {
        let id = item.id.as_str();
        let mut papers: Vec<Article> = Vec::new();
        let mut last_page_seen = false;

        for page in 1..=self.max_pages {
            let url = self.listing_url(id, page)?;
            if page > 1 {
                self.pacing.wait().await;
            }

            let listing = match transport.get(url.as_str()).await {
                Ok(resp) => match parse_listing(&resp.body, &self.base) {
                    Some(links) => links,
                    None if page == 1 && looks_like_not_found(&resp.body) => {
                        return Err(PageFailure::not_found(format!("conference {id} not found")));
                    }
                    None if page == 1 => {
                        return Err(PageFailure::parse(format!(
                            "{url} has no article listing"
                        )));
                    }
                    None => Vec::new(),
                },
                Err(failure) if failure.kind == FailureKind::NotFound && page > 1 => Vec::new(),
                Err(failure) => return Err(failure),
            };

            if listing.is_empty() {
                if page == 1 {
                    return Err(PageFailure::not_found(format!(
                        "conference {id} lists no articles"
                    )));
                }
                debug!(conference = id, pages = page - 1, "Reached the last listing page");
                last_page_seen = true;
                break;
            }

            for link in listing {
                self.pacing.wait().await;
                match transport.get(&link.link).await {
                    Ok(resp) => papers.push(parse_article(&resp.body, link)),
                    Err(failure) if failure.kind == FailureKind::NotFound => {
                        warn!(conference = id, link = %link.link, "Article page missing, skipping");
                    }
                    Err(failure) => return Err(failure),
                }
            }
        }

        if !last_page_seen {
            warn!(
                conference = id,
                max_pages = self.max_pages,
                "Page limit reached, later listing pages not fetched"
            );
        }

        let conference_name = papers
            .iter()
            .map(|p| p.conference_name.as_str())
            .find(|n| !n.is_empty())
            .unwrap_or_default()
            .to_string();
        let year = papers
            .iter()
            .map(|p| p.year.as_str())
            .find(|y| !y.is_empty())
            .unwrap_or_default()
            .to_string();
        let paper_count = papers.len();
        let papers_json = serde_json::to_string(&papers)
            .map_err(|e| PageFailure::parse(format!("failed to encode articles: {e}")))?;

        Ok(Record::new(item.id.clone())
            .with("conference_name", conference_name)
            .with("year", year)
            .with("paper_count", paper_count)
            .with("papers", papers_json))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::PageResponse;
    use std::collections::HashMap;
    use tracing_test::traced_test;

    const LISTING_HTML: &str = r#"
        <html><body>
        <ul id="articleLists">
          <li><h2><a href="/paper-ABC-1/">1. First paper</a></h2></li>
          <li><h2><a href="https://civilica.com/paper-ABC-2/">2.  Second   paper</a></h2></li>
          <li><span>no link</span></li>
        </ul>
        </body></html>"#;

    const ARTICLE_HTML: &str = r#"
        <html><body>
        <div class="prose max-w-none my-6 text-color-black text-justify"><div>  An abstract. </div></div>
        <blockquote class="container mx-auto mb-8"><p>مقاله نوشته شده توسط علی رضایی نویسنده مسئول است و در کمیته علمی همایش ملی عمران پذیرفته شده است. در سال 1398 منتشر شد. کلمات کلیدی پل، فولاد هستند. تاکنون 42 بار دیده شده و با 8 صفحه است.</p></blockquote>
        <div class="my-2 flex flex-row items-center">
          <div class="flex flex-col"><a href="/a/1">علی رضایی</a><p>دانشگاه تهران</p></div>
        </div>
        <div class="my-2 flex flex-row items-center">
          <div class="flex flex-col"><span>no name</span></div>
        </div>
        </body></html>"#;

    fn base() -> Url {
        Url::parse("https://civilica.com/").unwrap()
    }

    #[test]
    fn listing_strips_ordinals_and_resolves_links() {
        let links = parse_listing(LISTING_HTML, &base()).unwrap();
        assert_eq!(
            links,
            vec![
                ArticleLink {
                    title: "First paper".into(),
                    link: "https://civilica.com/paper-ABC-1/".into()
                },
                ArticleLink {
                    title: "Second paper".into(),
                    link: "https://civilica.com/paper-ABC-2/".into()
                },
            ]
        );
        assert!(parse_listing("<html><p>nothing</p></html>", &base()).is_none());
    }

    #[test]
    fn citation_details() {
        let d = parse_citation(
            "نوشته شده توسط  الف و ب نویسنده مسئول ... کمیته علمی کنفرانس X پذیرفته شده است در سال 1401 کلمات کلیدی: بتن هستند تاکنون 7 بار با 12 صفحه",
        );
        assert_eq!(d.authors, "الف و ب");
        assert_eq!(d.conference, "کنفرانس X");
        assert_eq!(d.year, "1401");
        assert_eq!(d.keywords, ": بتن");
        assert_eq!(d.view_count, Some(7));
        assert_eq!(d.page_count, Some(12));
        assert_eq!(parse_citation(""), CitationDetails::default());
    }

    #[test]
    fn article_page() {
        let article = parse_article(
            ARTICLE_HTML,
            ArticleLink {
                title: "T".into(),
                link: "L".into(),
            },
        );
        assert_eq!(article.abstract_text, "An abstract.");
        assert_eq!(article.authors, "علی رضایی");
        assert_eq!(article.conference_name, "همایش ملی عمران");
        assert_eq!(article.year, "1398");
        assert_eq!(article.keywords, "پل، فولاد");
        assert_eq!(article.view_count, 42);
        assert_eq!(article.page_count, Some(8));
        assert_eq!(article.authors_map.len(), 1);
        assert_eq!(article.authors_map["علی رضایی"], "دانشگاه تهران");
    }

    struct Pages(HashMap<String, Result<String, PageFailure>>);

    #[async_trait]
    impl PageTransport for Pages {
        async fn get(&self, url: &str) -> Result<PageResponse, PageFailure> {
            match self.0.get(url) {
                Some(Ok(body)) => Ok(PageResponse {
                    status: Some(200),
                    final_url: url.to_string(),
                    body: body.clone(),
                }),
                Some(Err(failure)) => Err(failure.clone()),
                None => Err(PageFailure::not_found(url.to_string())),
            }
        }
    }

    fn extractor() -> ConferenceExtractor {
        ConferenceExtractor::new(base(), 10, RateLimiter::disabled())
    }

    #[traced_test]
    #[tokio::test]
    async fn walks_pages_until_the_listing_runs_out() {
        let mut pages = HashMap::new();
        pages.insert(
            "https://civilica.com/l/77/pgn-1/".to_string(),
            Ok(LISTING_HTML.to_string()),
        );
        pages.insert(
            "https://civilica.com/l/77/pgn-2/".to_string(),
            Ok(r#"<ul id="articleLists"></ul>"#.to_string()),
        );
        pages.insert(
            "https://civilica.com/paper-ABC-1/".to_string(),
            Ok(ARTICLE_HTML.to_string()),
        );

        let record = extractor()
            .extract(&Pages(pages), &WorkItem::new("77"))
            .await
            .unwrap();

        assert_eq!(record.get("paper_count").unwrap().to_string(), "1");
        assert_eq!(
            record.get("conference_name").unwrap().to_string(),
            "همایش ملی عمران"
        );
        let papers: serde_json::Value =
            serde_json::from_str(&record.get("papers").unwrap().to_string()).unwrap();
        assert_eq!(papers[0]["title"], "First paper");
        assert_eq!(papers[0]["abstract"], "An abstract.");
        assert!(!logs_contain("Page limit reached"));
    }

    #[traced_test]
    #[tokio::test]
    async fn page_limit_is_reported_only_when_it_cuts_the_walk() {
        let mut pages = HashMap::new();
        pages.insert(
            "https://civilica.com/l/77/pgn-1/".to_string(),
            Ok(LISTING_HTML.to_string()),
        );
        pages.insert(
            "https://civilica.com/paper-ABC-1/".to_string(),
            Ok(ARTICLE_HTML.to_string()),
        );

        let capped = ConferenceExtractor::new(base(), 1, RateLimiter::disabled());
        let record = capped
            .extract(&Pages(pages), &WorkItem::new("77"))
            .await
            .unwrap();

        assert_eq!(record.get("paper_count").unwrap().to_string(), "1");
        assert!(logs_contain("Page limit reached"));
    }

    #[tokio::test]
    async fn first_page_failures_are_classified() {
        let ex = extractor();

        let missing = ex
            .extract(&Pages(HashMap::new()), &WorkItem::new("5"))
            .await
            .unwrap_err();
        assert_eq!(missing.kind, FailureKind::NotFound);

        let mut pages = HashMap::new();
        pages.insert(
            "https://civilica.com/l/6/pgn-1/".to_string(),
            Ok("<html><title>Civilica</title><body>maintenance</body></html>".to_string()),
        );
        let parse = ex.extract(&Pages(pages), &WorkItem::new("6")).await.unwrap_err();
        assert_eq!(parse.kind, FailureKind::ParseError);

        let mut pages = HashMap::new();
        pages.insert(
            "https://civilica.com/l/8/pgn-1/".to_string(),
            Err(PageFailure::timeout("slow")),
        );
        let timeout = ex.extract(&Pages(pages), &WorkItem::new("8")).await.unwrap_err();
        assert_eq!(timeout.kind, FailureKind::Timeout);
    }

    #[test]
    fn ids_must_be_path_safe() {
        let ex = extractor();
        assert!(ex.validate_id(&ItemId::from("12345")).is_ok());
        assert!(ex.validate_id(&ItemId::from("../etc")).is_err());
        assert!(ex.validate_id(&ItemId::from("")).is_err());
    }

    #[test]
    fn base_url_gets_a_trailing_slash() {
        let ex = ConferenceExtractor::from_base_url(
            "https://civilica.com/sub",
            3,
            RateLimiter::disabled(),
        )
        .unwrap();
        assert_eq!(
            ex.listing_url("7", 2).unwrap().as_str(),
            "https://civilica.com/sub/l/7/pgn-2/"
        );
        assert!(matches!(
            ConferenceExtractor::from_base_url("not a url", 3, RateLimiter::disabled()),
            Err(ConnectorError::InvalidBaseUrl { .. })
        ));
    }
}
