use engine_logging::engine_trace;
use prospector_core::ListingRecord;
use scraper::{Html, Selector};
use tokio_util::sync::CancellationToken;

use crate::PageDocument;

/// Error shape for an extractor that produced no record at all.
///
/// Partial records are not faults; they come back as records and the
/// completeness check decides whether to retry.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionFault {
    #[error("extraction cancelled")]
    Cancelled,
    #[error("page is not a listing: {0}")]
    NotAListing(String),
}

/// Pulls the listing fields out of one loaded detail page.
///
/// Implementations must honor the cancellation token at their checkpoints;
/// a forced close cancels it mid-extraction.
pub trait ListingExtractor: Send + Sync {
    fn extract(
        &self,
        document: &PageDocument,
        cancel: &CancellationToken,
    ) -> Result<ListingRecord, ExtractionFault>;
}

/// Selector-based extractor for common listing markup:
/// - `#productTitle` (fallback `<title>`) for the title
/// - the best-sellers-rank block for the numeric rank
/// - the star-rating widget for the rating
/// - variation swatches for the variant count
/// - price and review count as non-key extras.
///
/// Field selectors are heuristics over one family of page layouts; any field
/// that does not match is simply left unset.
#[derive(Debug, Default)]
pub struct SelectorExtractor;

impl ListingExtractor for SelectorExtractor {
    fn extract(
        &self,
        document: &PageDocument,
        cancel: &CancellationToken,
    ) -> Result<ListingRecord, ExtractionFault> {
        if cancel.is_cancelled() {
            return Err(ExtractionFault::Cancelled);
        }
        let doc = Html::parse_document(&document.html);
        if cancel.is_cancelled() {
            // Parsing large pages is the expensive half; re-check before
            // walking the tree.
            return Err(ExtractionFault::Cancelled);
        }

        let mut record = ListingRecord {
            title: select_text(&doc, "#productTitle").or_else(|| select_text(&doc, "title")),
            sales_rank: select_text(&doc, "#SalesRank, .sales-rank, #detailBullets_feature_div")
                .and_then(|text| parse_rank(&text)),
            rating: select_attr(&doc, "#acrPopover", "title")
                .or_else(|| select_text(&doc, ".a-icon-star .a-icon-alt, .rating"))
                .and_then(|text| parse_leading_number(&text).map(|v| v as f32)),
            variant_count: Some(count_matches(
                &doc,
                "#variation_color_name li, #variation_size_name li, .variant",
            ))
            .filter(|count| *count > 0),
            price_cents: select_text(&doc, ".a-price .a-offscreen, #priceblock_ourprice, .price")
                .and_then(|text| parse_price_cents(&text)),
            review_count: select_text(&doc, "#acrCustomerReviewText, .review-count")
                .and_then(|text| parse_grouped_integer(&text)),
            estimated_monthly_sales: None,
        };
        record.estimated_monthly_sales = record.sales_rank.and_then(estimate_monthly_sales);

        engine_trace!(
            "extracted {} (rank {:?}, rating {:?})",
            document.url,
            record.sales_rank,
            record.rating
        );
        Ok(record)
    }
}

/// Power-law estimate of monthly sales from a best-sellers rank.
///
/// The curve constants are a coarse industry heuristic carried over from the
/// report layer; the orchestrator treats the value as opaque.
pub fn estimate_monthly_sales(sales_rank: u64) -> Option<u64> {
    if sales_rank == 0 {
        return None;
    }
    let estimate = 145_000.0 * (sales_rank as f64).powf(-0.9);
    Some(estimate.round() as u64)
}

fn select_text(doc: &Html, selectors: &str) -> Option<String> {
    let selector = Selector::parse(selectors).ok()?;
    doc.select(&selector)
        .map(|node| node.text().collect::<String>().trim().to_string())
        .find(|text| !text.is_empty())
}

fn select_attr(doc: &Html, selectors: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(selectors).ok()?;
    doc.select(&selector)
        .find_map(|node| node.value().attr(attr))
        .map(|value| value.to_string())
}

fn count_matches(doc: &Html, selectors: &str) -> u32 {
    Selector::parse(selectors)
        .map(|selector| doc.select(&selector).count() as u32)
        .unwrap_or(0)
}

/// Pulls the first `#N,NNN` group out of a best-sellers-rank blurb.
fn parse_rank(text: &str) -> Option<u64> {
    let after_hash = text.split('#').nth(1)?;
    parse_grouped_integer(after_hash)
}

/// Parses a leading integer, tolerating `,` and `.` grouping separators.
fn parse_grouped_integer(text: &str) -> Option<u64> {
    let trimmed = text.trim_start();
    let digits: String = trimmed
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .filter(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Parses a leading decimal number ("4.4 out of 5 stars" -> 4.4).
fn parse_leading_number(text: &str) -> Option<f64> {
    let trimmed = text.trim_start();
    let end = trimmed
        .char_indices()
        .take_while(|(_, c)| c.is_ascii_digit() || *c == '.')
        .map(|(i, c)| i + c.len_utf8())
        .last()?;
    trimmed[..end].parse().ok()
}

/// Parses a displayed price into cents ("$19.99" -> 1999).
fn parse_price_cents(text: &str) -> Option<u64> {
    let stripped: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let value: f64 = stripped.parse().ok()?;
    Some((value * 100.0).round() as u64)
}
