use std::fmt;

use url::Url;

/// Storefronts the collector knows how to build listing URLs for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marketplace {
    Com,
    CoUk,
    De,
    Fr,
    It,
    Es,
    Ca,
}

/// Returned when a source URL does not belong to a recognized storefront.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedSource {
    pub input: String,
}

impl fmt::Display for UnsupportedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported source: {}", self.input)
    }
}

impl std::error::Error for UnsupportedSource {}

impl Marketplace {
    /// Parses the storefront out of a source URL.
    ///
    /// Accepts any subdomain of a recognized host (`www.`, `smile.`, ...).
    pub fn from_url(source_url: &str) -> Result<Self, UnsupportedSource> {
        let unsupported = || UnsupportedSource {
            input: source_url.to_string(),
        };
        let parsed = Url::parse(source_url).map_err(|_| unsupported())?;
        let host = parsed.host_str().ok_or_else(unsupported)?;
        Self::from_host(host).ok_or_else(unsupported)
    }

    fn from_host(host: &str) -> Option<Self> {
        let host = host.to_ascii_lowercase();
        for market in Self::ALL {
            let domain = market.domain();
            if host == domain || host.ends_with(&format!(".{domain}")) {
                return Some(*market);
            }
        }
        None
    }

    const ALL: &'static [Marketplace] = &[
        Marketplace::Com,
        Marketplace::CoUk,
        Marketplace::De,
        Marketplace::Fr,
        Marketplace::It,
        Marketplace::Es,
        Marketplace::Ca,
    ];

    pub fn domain(&self) -> &'static str {
        match self {
            Marketplace::Com => "amazon.com",
            Marketplace::CoUk => "amazon.co.uk",
            Marketplace::De => "amazon.de",
            Marketplace::Fr => "amazon.fr",
            Marketplace::It => "amazon.it",
            Marketplace::Es => "amazon.es",
            Marketplace::Ca => "amazon.ca",
        }
    }

    /// Detail-page URL for one item id on this storefront.
    pub fn listing_url(&self, item_id: &str) -> String {
        format!("https://www.{}/dp/{}", self.domain(), item_id)
    }
}

impl fmt::Display for Marketplace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.domain())
    }
}
