//! Link discovery on the chart listing pages.
//!
//! The VFR page groups archives into tabs (one `div` per tab); the IFR page
//! lists one chart per table row with the code in the first cell and the
//! edition date plus download links in the second.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};

use crate::domain::{ChartLink, ChartType};
use crate::error::ChartError;

const ARCHIVE_EXT: &str = ".zip";
const GEO_TIFF_LABEL: &str = "geo-tiff";

static PUBLISHED_DATE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"([A-Z][a-z]{2} \d{1,2} \d{4})").ok());

/// Chart-code prefix rules for one IFR chart type.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IfrRules {
    pub allow: Vec<String>,
    pub deny: Vec<String>,
}

impl IfrRules {
    pub fn accepts(&self, chart_code: &str) -> bool {
        self.allow.iter().any(|prefix| chart_code.starts_with(prefix.as_str()))
            && !self.deny.iter().any(|prefix| chart_code.starts_with(prefix.as_str()))
    }
}

pub fn extract_vfr_links(
    html: &str,
    base_url: &str,
    tabs: &[String],
) -> Result<Vec<ChartLink>, ChartError> {
    let document = Html::parse_document(html);
    let tab_selector = selector("div[id]")?;
    let anchor_selector = selector("a[href]")?;

    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for tab_id in tabs {
        let Some(tab) = document
            .select(&tab_selector)
            .find(|div| div.value().attr("id") == Some(tab_id.as_str()))
        else {
            continue;
        };
        for anchor in tab.select(&anchor_selector) {
            let Some(href) = anchor.value().attr("href").map(str::trim) else {
                continue;
            };
            if !is_archive(href) {
                continue;
            }
            let url = make_absolute_url(base_url, href)?;
            if seen.insert(url.clone()) {
                links.push(ChartLink::vfr(url));
            }
        }
    }
    Ok(links)
}

pub fn extract_ifr_links(
    html: &str,
    base_url: &str,
    chart_type: ChartType,
    rules: &IfrRules,
) -> Result<Vec<ChartLink>, ChartError> {
    let document = Html::parse_document(html);
    let row_selector = selector("table tr")?;
    let cell_selector = selector("td")?;
    let anchor_selector = selector("a[href]")?;

    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for row in document.select(&row_selector) {
        let cells: Vec<ElementRef<'_>> = row.select(&cell_selector).collect();
        if cells.len() < 2 {
            continue;
        }
        let chart_code = stripped_text(cells[0]);
        if !rules.accepts(&chart_code) {
            continue;
        }

        let published_date = parse_published_date(&cells[1].text().collect::<String>());
        for anchor in cells[1].select(&anchor_selector) {
            let label = stripped_text(anchor).to_lowercase();
            let Some(href) = anchor.value().attr("href").map(str::trim) else {
                continue;
            };
            if !label.contains(GEO_TIFF_LABEL) || !is_archive(href) {
                continue;
            }
            let link = ChartLink {
                chart_type,
                url: make_absolute_url(base_url, href)?,
                chart_code: Some(chart_code.clone()),
                published_date: published_date.clone(),
            };
            if seen.insert(link.identity()) {
                links.push(link);
            }
        }
    }
    Ok(links)
}

/// First `Mon D YYYY` date in `text`, as `YYYY-MM-DD`.
pub fn parse_published_date(text: &str) -> Option<String> {
    let raw = PUBLISHED_DATE.as_ref()?.captures(text)?.get(1)?.as_str();
    NaiveDate::parse_from_str(raw, "%b %d %Y")
        .ok()
        .map(|date| date.format("%Y-%m-%d").to_string())
}

pub fn make_absolute_url(base_url: &str, href: &str) -> Result<String, ChartError> {
    if href.starts_with("http://") || href.starts_with("https://") {
        return Ok(href.to_string());
    }
    let base = if base_url.ends_with('/') {
        base_url.to_string()
    } else {
        format!("{base_url}/")
    };
    let base = Url::parse(&base)
        .map_err(|err| ChartError::Html(format!("invalid base url {base_url}: {err}")))?;
    base.join(href)
        .map(|url| url.to_string())
        .map_err(|err| ChartError::Html(format!("invalid link {href}: {err}")))
}

fn is_archive(href: &str) -> bool {
    href.to_ascii_lowercase().ends_with(ARCHIVE_EXT)
}

fn stripped_text(element: ElementRef<'_>) -> String {
    element.text().map(str::trim).collect()
}

fn selector(css: &str) -> Result<Selector, ChartError> {
    Selector::parse(css).map_err(|err| ChartError::Html(format!("selector {css}: {err:?}")))
}
