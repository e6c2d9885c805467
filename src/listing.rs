//! Read-through cache for the rendered most-read listing.
//!
//! A miss queries the store and renders, then races other handlers to
//! create the cache entry. Losing that race means serving whatever the
//! winner stored, so concurrent misses converge on one rendering.

use crate::cache::SharedCache;
use crate::clock::Clock;
use crate::config::Config;
use crate::metrics::ListingMetrics;
use crate::store::{HitStore, PopularItem};
use chrono::Days;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const EMPTY_MESSAGE: &str = "There are no most popular posts just now.  Try again later.";

/// Where a rendering came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderingSource {
    /// Read from the shared cache.
    Cached,
    /// Rendered by this call and stored in the shared cache.
    Fresh,
    /// Rendered by this call but not cached.
    Uncached,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendering {
    pub html: String,
    pub source: RenderingSource,
}

pub struct MostReadCache {
    cache: Arc<dyn SharedCache>,
    store: Arc<dyn HitStore>,
    clock: Arc<dyn Clock>,
    metrics: Arc<ListingMetrics>,
    key: String,
    ttl: Duration,
    window_days: u32,
    limit: usize,
    title: String,
}

impl MostReadCache {
    pub fn new(
        config: &Config,
        cache: Arc<dyn SharedCache>,
        store: Arc<dyn HitStore>,
        clock: Arc<dyn Clock>,
        metrics: Arc<ListingMetrics>,
    ) -> Self {
        Self {
            cache,
            store,
            clock,
            metrics,
            key: config.keys().rendering,
            ttl: config.listing_ttl(),
            window_days: config.listing.most_read_in_x_days,
            limit: config.listing.posts_to_display,
            title: config.listing.title.clone(),
        }
    }

    /// The listing fragment. Never fails: store and cache problems degrade
    /// to an uncached or empty listing.
    pub async fn get_rendering(&self) -> String {
        self.fetch().await.html
    }

    pub async fn fetch(&self) -> Rendering {
        if let Some(html) = self.read_cached().await {
            self.metrics.record_hit();
            debug!(key = %self.key, "Using cached output");
            return Rendering {
                html,
                source: RenderingSource::Cached,
            };
        }
        self.metrics.record_miss();

        let (html, cacheable) = self.render_fresh().await;
        if !cacheable {
            self.metrics.record_uncached();
            return Rendering {
                html,
                source: RenderingSource::Uncached,
            };
        }

        match self
            .cache
            .add(&self.key, Value::String(html.clone()), self.ttl)
            .await
        {
            Ok(true) => {
                info!(key = %self.key, ttl_secs = self.ttl.as_secs(), "Cached the output");
                Rendering {
                    html,
                    source: RenderingSource::Fresh,
                }
            }
            Ok(false) => match self.read_cached().await {
                Some(winner) => Rendering {
                    html: winner,
                    source: RenderingSource::Cached,
                },
                None => {
                    warn!(key = %self.key, "Could not get rendering from cache, used the store instead");
                    self.uncached(html)
                }
            },
            Err(e) => {
                warn!(key = %self.key, error = %e, "Could not cache rendering");
                self.uncached(html)
            }
        }
    }

    fn uncached(&self, html: String) -> Rendering {
        self.metrics.record_uncached();
        Rendering {
            html,
            source: RenderingSource::Uncached,
        }
    }

    async fn read_cached(&self) -> Option<String> {
        match self.cache.get(&self.key).await {
            Ok(Some(Value::String(html))) => Some(html),
            Ok(Some(other)) => {
                warn!(key = %self.key, found = %other, "Cached rendering is not a string");
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!(key = %self.key, error = %e, "Could not read cached rendering");
                None
            }
        }
    }

    /// Query and render. The flag is false when the query failed and the
    /// empty listing is only a stand-in that must not be cached.
    async fn render_fresh(&self) -> (String, bool) {
        let today = self.clock.today();
        let after = today
            .checked_sub_days(Days::new(u64::from(self.window_days)))
            .unwrap_or(chrono::NaiveDate::MIN);

        match self.store.top_items(after, self.limit).await {
            Ok(items) => {
                debug!(rows = items.len(), %after, "Got output from store");
                self.metrics.record_render(items.len());
                (render(&self.title, &items), true)
            }
            Err(e) => {
                warn!(error = %e, %after, limit = self.limit, "Most-read query failed");
                self.metrics.record_query_failure(&e.to_string());
                (render(&self.title, &[]), false)
            }
        }
    }
}

/// Render the listing fragment for `items`, in the order given.
pub fn render(title: &str, items: &[PopularItem]) -> String {
    let title = escape_html(title);
    let mut out = format!("<div class=\"link\">\n<h2>{title}</h2>\n<nav title=\"{title} Recently\">\n");
    if items.is_empty() {
        out.push_str(&format!("<p class=\"most_read_no_results\">{EMPTY_MESSAGE}</p>\n"));
    } else {
        out.push_str("<ul class=\"most_read\">\n");
        for item in items {
            out.push_str(&format!(
                "<li>\n<a href=\"{}\">{}</a>\n</li>\n",
                escape_html(&item.permalink),
                escape_html(&item.title)
            ));
        }
        out.push_str("</ul>\n");
    }
    out.push_str("</nav></div>\n");
    out
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
