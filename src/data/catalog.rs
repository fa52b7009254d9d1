//! Remote listing discovery.
//!
//! The publication page is plain HTML with download links. We do not parse the
//! document tree; we scan `href` attributes and keep the ones whose file name
//! matches the archive pattern. That survives most cosmetic markup changes
//! (quoting style, nesting, extra attributes).

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use tracing::{debug, info, warn};
use url::Url;

use crate::data::http::Transport;
use crate::data::retry::{RetryFailure, RetryPolicy, Sleeper};
use crate::domain::RemoteFileRef;
use crate::domain::calendar::{is_month_end, month_end};
use crate::error::DiscoveryError;

/// How far (in days) `find_by_date` may drift from the requested date.
pub const DATE_TOLERANCE_DAYS: i64 = 5;

static HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)href\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#).expect("href pattern is valid")
});
static ARCHIVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:[A-Za-z0-9]+_)*RFR_(\d{8})\.zip$").expect("archive pattern is valid"));

pub struct SourceCatalog<'a> {
    transport: &'a dyn Transport,
    sleeper: &'a dyn Sleeper,
    retry: &'a RetryPolicy,
    listing_url: &'a str,
}

impl<'a> SourceCatalog<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        sleeper: &'a dyn Sleeper,
        retry: &'a RetryPolicy,
        listing_url: &'a str,
    ) -> Self {
        Self {
            transport,
            sleeper,
            retry,
            listing_url,
        }
    }

    /// All archives on the listing, ascending by reference date.
    pub fn list_available(&self) -> Result<Vec<RemoteFileRef>, DiscoveryError> {
        info!(url = self.listing_url, "fetching publication listing");

        let body = self
            .retry
            .run(self.sleeper, |_| self.transport.get(self.listing_url), |e| e.is_transient())
            .map_err(|failure| {
                let source = match failure {
                    RetryFailure::Exhausted { last, .. } => last,
                    RetryFailure::Fatal { error, .. } => error,
                };
                DiscoveryError::Unreachable {
                    url: self.listing_url.to_string(),
                    source,
                }
            })?;

        let html = String::from_utf8_lossy(&body);
        let refs = parse_listing(&html, self.listing_url);
        if refs.is_empty() {
            return Err(DiscoveryError::NoEntries {
                url: self.listing_url.to_string(),
            });
        }
        info!(count = refs.len(), "archives listed");
        Ok(refs)
    }

    pub fn latest(&self) -> Result<RemoteFileRef, DiscoveryError> {
        let refs = self.list_available()?;
        refs.into_iter().last().ok_or_else(|| DiscoveryError::NoEntries {
            url: self.listing_url.to_string(),
        })
    }

    /// The archive for `target`, or the closest one within `DATE_TOLERANCE_DAYS`.
    pub fn find_by_date(&self, target: NaiveDate) -> Result<RemoteFileRef, DiscoveryError> {
        let refs = self.list_available()?;
        select_by_date(refs, target)
    }
}

pub fn select_by_date(refs: Vec<RemoteFileRef>, target: NaiveDate) -> Result<RemoteFileRef, DiscoveryError> {
    let closest = refs
        .into_iter()
        .min_by_key(|r| ((r.reference_date - target).num_days().abs(), r.reference_date));

    match closest {
        Some(r) if r.reference_date == target => Ok(r),
        Some(r) if (r.reference_date - target).num_days().abs() <= DATE_TOLERANCE_DAYS => {
            warn!(
                requested = %target,
                using = %r.reference_date,
                file = %r.filename,
                "no exact match, using closest archive"
            );
            Ok(r)
        }
        other => Err(DiscoveryError::NotListed {
            target,
            closest: other.map(|r| r.reference_date),
        }),
    }
}

/// Extract archive references from listing HTML.
///
/// Links are resolved against `base_url`. Duplicates (same file name) keep
/// the first occurrence. Output is ascending by reference date.
pub fn parse_listing(html: &str, base_url: &str) -> Vec<RemoteFileRef> {
    let base = Url::parse(base_url).ok();

    let mut by_name: BTreeMap<String, RemoteFileRef> = BTreeMap::new();
    for cap in HREF_RE.captures_iter(html) {
        let Some(raw) = cap.get(1).or_else(|| cap.get(2)).or_else(|| cap.get(3)) else {
            continue;
        };
        let href = raw.as_str().replace("&amp;", "&");

        let Some(filename) = link_filename(&href) else {
            continue;
        };
        let Some(date) = ARCHIVE_RE
            .captures(&filename)
            .and_then(|c| c.get(1))
            .and_then(|m| NaiveDate::parse_from_str(m.as_str(), "%Y%m%d").ok())
        else {
            continue;
        };

        let url = match &base {
            Some(base) => match base.join(&href) {
                Ok(u) => u.to_string(),
                Err(e) => {
                    debug!(%href, error = %e, "skipping unresolvable link");
                    continue;
                }
            },
            None => href.clone(),
        };

        let reference_date = month_end(date);
        if !is_month_end(date) {
            debug!(%filename, %date, %reference_date, "archive date is not a month end, normalized");
        }

        by_name.entry(filename.clone()).or_insert(RemoteFileRef {
            filename,
            url,
            reference_date,
        });
    }

    let mut refs: Vec<RemoteFileRef> = by_name.into_values().collect();
    refs.sort_by(|a, b| a.reference_date.cmp(&b.reference_date).then_with(|| a.filename.cmp(&b.filename)));
    refs
}

/// File name a link points at: the `filename=` query value if present,
/// otherwise the last path segment.
fn link_filename(href: &str) -> Option<String> {
    let (path, query) = match href.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (href, None),
    };

    if let Some(query) = query {
        for pair in query.split('&') {
            if let Some(value) = pair.strip_prefix("filename=") {
                let decoded = url::form_urlencoded::parse(format!("f={value}").as_bytes())
                    .next()
                    .map(|(_, v)| v.into_owned())
                    .unwrap_or_else(|| value.to_string());
                return Some(decoded);
            }
        }
    }

    let path = path.split('#').next().unwrap_or(path);
    path.rsplit('/').next().filter(|s| !s.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::data::http::TransportError;
    use crate::data::retry::RecordingSleeper;

    const LISTING: &str = r##"
        <html><body>
        <ul>
          <li><a href="/document/download/abc?filename=EIOPA_RFR_20241130.zip">November</a></li>
          <li><a class="btn" href='https://cdn.example.org/files/EIOPA_RFR_20241031.zip'>October</a></li>
          <li><a href="/document/download/def?filename=EIOPA_RFR_20241130.zip&amp;x=1">dup</a></li>
          <li><a href=/document/download/ghi?filename=EIOPA_RFR_20240930.zip>September</a></li>
          <li><a href="/document/download/xyz?filename=Technical_documentation.pdf">docs</a></li>
          <li><a href="#top">top</a></li>
        </ul>
        </body></html>
    "##;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn parses_links_across_quoting_styles() {
        let refs = parse_listing(LISTING, "https://www.eiopa.europa.eu/tools/rfr_en");
        let dates: Vec<_> = refs.iter().map(|r| r.reference_date).collect();
        assert_eq!(dates, vec![d(2024, 9, 30), d(2024, 10, 31), d(2024, 11, 30)]);

        assert_eq!(
            refs[0].url,
            "https://www.eiopa.europa.eu/document/download/ghi?filename=EIOPA_RFR_20240930.zip"
        );
        assert_eq!(refs[1].url, "https://cdn.example.org/files/EIOPA_RFR_20241031.zip");
        assert_eq!(refs[2].filename, "EIOPA_RFR_20241130.zip");
    }

    #[test]
    fn archive_pattern_accepts_prefixes_only_before_rfr() {
        for (name, ok) in [
            ("EIOPA_RFR_20241130.zip", true),
            ("rfr_20241130.ZIP", true),
            ("EIOPA_RFR_20241130_Term_Structures.zip", false),
            ("RFR_2024113.zip", false),
        ] {
            assert_eq!(ARCHIVE_RE.is_match(name), ok, "{name}");
        }
        assert_eq!(HREF_RE.captures_iter(LISTING).count(), 6);
    }

    #[test]
    fn unrelated_markup_yields_nothing() {
        assert!(parse_listing("<p>maintenance</p>", "https://example.org/").is_empty());
    }

    #[test]
    fn date_selection_prefers_exact_then_tolerance() {
        let refs = parse_listing(LISTING, "https://example.org/");
        assert_eq!(select_by_date(refs.clone(), d(2024, 10, 31)).unwrap().reference_date, d(2024, 10, 31));
        assert_eq!(select_by_date(refs.clone(), d(2024, 11, 28)).unwrap().reference_date, d(2024, 11, 30));
        let err = select_by_date(refs, d(2024, 12, 31)).unwrap_err();
        assert!(matches!(err, DiscoveryError::NotListed { closest: Some(c), .. } if c == d(2024, 11, 30)));
    }

    struct StaticTransport {
        body: Result<Vec<u8>, TransportError>,
        calls: Cell<usize>,
    }

    impl Transport for StaticTransport {
        fn get(&self, _url: &str) -> Result<Vec<u8>, TransportError> {
            self.calls.set(self.calls.get() + 1);
            self.body.clone()
        }
    }

    #[test]
    fn network_and_format_failures_are_distinct() {
        let retry = RetryPolicy::default();
        let sleeper = RecordingSleeper::default();

        let down = StaticTransport {
            body: Err(TransportError::Status(503)),
            calls: Cell::new(0),
        };
        let err = SourceCatalog::new(&down, &sleeper, &retry, "https://example.org/")
            .list_available()
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::Unreachable { .. }));
        assert_eq!(down.calls.get(), 3);

        let empty = StaticTransport {
            body: Ok(b"<html></html>".to_vec()),
            calls: Cell::new(0),
        };
        let err = SourceCatalog::new(&empty, &sleeper, &retry, "https://example.org/")
            .list_available()
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::NoEntries { .. }));
    }

    #[test]
    fn latest_is_newest_entry() {
        let retry = RetryPolicy::default();
        let sleeper = RecordingSleeper::default();
        let transport = StaticTransport {
            body: Ok(LISTING.as_bytes().to_vec()),
            calls: Cell::new(0),
        };
        let latest = SourceCatalog::new(&transport, &sleeper, &retry, "https://example.org/")
            .latest()
            .unwrap();
        assert_eq!(latest.reference_date, d(2024, 11, 30));
    }
}
